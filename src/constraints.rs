use crate::constants;
use crate::size_limit::SizeLimit;
use crate::storage::StoragePolicy;
use std::path::{Path, PathBuf};

/// Limits and storage choices applied while decoding a multipart body.
///
/// # Examples
///
/// ```
/// use connector_mime::{Constraints, SizeLimit, StoragePolicy};
///
/// let constraints = Constraints::new()
///     .allowed_fields(vec!["name", "avatar"])
///     .size_limit(SizeLimit::new().whole_stream(15 * 1024 * 1024).for_field("name", 1024))
///     .storage_policy(StoragePolicy::Threshold(256 * 1024))
///     .max_nesting_depth(2);
/// ```
#[derive(Debug, Clone)]
pub struct Constraints {
    pub(crate) size_limit: SizeLimit,
    pub(crate) allowed_fields: Option<Vec<String>>,
    pub(crate) storage_policy: StoragePolicy,
    pub(crate) spool_dir: Option<PathBuf>,
    pub(crate) max_nesting_depth: usize,
}

impl Constraints {
    /// Creates a set of rules with default behaviour.
    pub fn new() -> Constraints {
        Constraints::default()
    }

    /// Applies rules on the size of the whole stream and of individual parts.
    pub fn size_limit(mut self, size_limit: SizeLimit) -> Constraints {
        self.size_limit = size_limit;
        self
    }

    /// Only the named fields are accepted; any other part fails the decode
    /// with [`Error::UnknownField`](crate::Error::UnknownField).
    pub fn allowed_fields<N: Into<String>>(mut self, allowed_fields: Vec<N>) -> Constraints {
        let allowed_fields = allowed_fields.into_iter().map(|item| item.into()).collect();
        self.allowed_fields = Some(allowed_fields);
        self
    }

    pub fn storage_policy(mut self, storage_policy: StoragePolicy) -> Constraints {
        self.storage_policy = storage_policy;
        self
    }

    /// Directory for spooled parts, instead of the system temporary directory.
    pub fn spool_dir<P: Into<PathBuf>>(mut self, dir: P) -> Constraints {
        self.spool_dir = Some(dir.into());
        self
    }

    /// How many `multipart/*` parts may be nested inside each other.
    pub fn max_nesting_depth(mut self, depth: usize) -> Constraints {
        self.max_nesting_depth = depth;
        self
    }

    pub(crate) fn spool_dir_path(&self) -> Option<&Path> {
        self.spool_dir.as_deref()
    }

    pub(crate) fn is_it_allowed(&self, field: Option<&str>) -> bool {
        match self.allowed_fields {
            Some(ref allowed_fields) => field
                .map(|field| allowed_fields.iter().any(|item| item == field))
                .unwrap_or(false),
            None => true,
        }
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            size_limit: SizeLimit::default(),
            allowed_fields: None,
            storage_policy: StoragePolicy::default(),
            spool_dir: None,
            max_nesting_depth: constants::DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_it_allowed() {
        let constraints = Constraints::new();
        assert!(constraints.is_it_allowed(None));

        let constraints = Constraints::new().allowed_fields(vec!["a"]);
        assert!(constraints.is_it_allowed(Some("a")));
        assert!(!constraints.is_it_allowed(Some("b")));
        assert!(!constraints.is_it_allowed(None));
    }
}
