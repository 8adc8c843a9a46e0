use lazy_static::lazy_static;
use regex::bytes::Regex;

pub(crate) const DEFAULT_WHOLE_STREAM_SIZE_LIMIT: u64 = u64::MAX;
pub(crate) const DEFAULT_PER_FIELD_SIZE_LIMIT: u64 = u64::MAX;

/// Parts larger than this are spooled when they look like file uploads.
pub(crate) const DEFAULT_MEMORY_THRESHOLD: u64 = 64 * 1024;
pub(crate) const DEFAULT_MAX_NESTING_DEPTH: usize = 8;

pub(crate) const SPOOL_FILE_PREFIX: &str = "part.";

pub(crate) const MAX_HEADERS: usize = 32;
pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CR: u8 = b'\r';
pub(crate) const CRLF: &str = "\r\n";
pub(crate) const CRLF_CRLF: &str = "\r\n\r\n";

pub(crate) const CONTENT_TRANSFER_ENCODING: &str = "content-transfer-encoding";
pub(crate) const TRANSFER_ENCODING_7BIT: &str = "7bit";
pub(crate) const TRANSFER_ENCODING_8BIT: &str = "8bit";

lazy_static! {
    pub(crate) static ref CONTENT_DISPOSITION_TYPE_RE: Regex = Regex::new(r#"(?-u)^\s*([^;\s]+)"#).unwrap();
    pub(crate) static ref CONTENT_DISPOSITION_FIELD_NAME_RE: Regex =
        Regex::new(r#"(?i-u)(?:^|;)\s*name\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^;\s]+))"#).unwrap();
    pub(crate) static ref CONTENT_DISPOSITION_FILE_NAME_RE: Regex =
        Regex::new(r#"(?i-u)(?:^|;)\s*filename\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^;\s]+))"#).unwrap();
    pub(crate) static ref QUOTED_PAIR_RE: Regex = Regex::new(r#"(?-u)\\(.)"#).unwrap();
}
