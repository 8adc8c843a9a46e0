use crate::constants;
use http::header::{self, HeaderMap};
use regex::bytes::Regex;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ContentDisposition {
    pub(crate) disposition: Option<String>,
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
}

impl ContentDisposition {
    pub fn parse(headers: &HeaderMap) -> ContentDisposition {
        headers
            .get(header::CONTENT_DISPOSITION)
            .map(|val| Self::parse_value(val.as_bytes()))
            .unwrap_or_default()
    }

    fn parse_value(value: &[u8]) -> ContentDisposition {
        let disposition = constants::CONTENT_DISPOSITION_TYPE_RE
            .captures(value)
            .and_then(|cap| cap.get(1))
            .map(|m| String::from_utf8_lossy(m.as_bytes()).to_ascii_lowercase());

        let field_name = param(&constants::CONTENT_DISPOSITION_FIELD_NAME_RE, value);
        let file_name = param(&constants::CONTENT_DISPOSITION_FILE_NAME_RE, value);

        ContentDisposition {
            disposition,
            field_name,
            file_name,
        }
    }
}

/// Value of the parameter matched by `re`; group 1 is a quoted string, group 2 a token.
fn param(re: &Regex, value: &[u8]) -> Option<String> {
    let cap = re.captures(value)?;

    if let Some(quoted) = cap.get(1) {
        let unescaped = constants::QUOTED_PAIR_RE.replace_all(quoted.as_bytes(), &b"$1"[..]);
        return Some(String::from_utf8_lossy(&unescaped).into_owned());
    }

    cap.get(2).map(|token| String::from_utf8_lossy(token.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(val: &str) -> ContentDisposition {
        ContentDisposition::parse_value(val.as_bytes())
    }

    #[test]
    fn test_content_disposition_field_name() {
        let cd = parse(r#"form-data; name="my_field""#);
        assert_eq!(cd.disposition.as_deref(), Some("form-data"));
        assert_eq!(cd.field_name.as_deref(), Some("my_field"));
        assert_eq!(cd.file_name, None);

        let cd = parse(r#"form-data; name="my field"; filename="file abc.txt""#);
        assert_eq!(cd.field_name.as_deref(), Some("my field"));
        assert_eq!(cd.file_name.as_deref(), Some("file abc.txt"));

        let cd = parse("form-data; name=\"你好\"; filename=\"file abc.txt\"");
        assert_eq!(cd.field_name.as_deref(), Some("你好"));

        let cd = parse("form-data; NAME=plain_token");
        assert_eq!(cd.field_name.as_deref(), Some("plain_token"));
    }

    #[test]
    fn test_content_disposition_file_name() {
        let cd = parse(r#"form-data; filename="file-name.txt""#);
        assert_eq!(cd.field_name, None);
        assert_eq!(cd.file_name.as_deref(), Some("file-name.txt"));

        let cd = parse("form-data; filename=\"কখগ-你好.txt\"; name=\"upload\"");
        assert_eq!(cd.field_name.as_deref(), Some("upload"));
        assert_eq!(cd.file_name.as_deref(), Some("কখগ-你好.txt"));
    }

    #[test]
    fn test_content_disposition_quoted_separators() {
        let cd = parse(r#"attachment; filename="a;b \"c\".txt"; name="x""#);
        assert_eq!(cd.disposition.as_deref(), Some("attachment"));
        assert_eq!(cd.file_name.as_deref(), Some(r#"a;b "c".txt"#));
        assert_eq!(cd.field_name.as_deref(), Some("x"));
    }

    #[test]
    fn test_content_disposition_missing() {
        assert_eq!(ContentDisposition::parse(&HeaderMap::new()), ContentDisposition::default());
    }
}
