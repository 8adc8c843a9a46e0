use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use httparse::Header;
use std::convert::TryFrom;

pub(crate) fn convert_raw_headers_to_header_map(raw_headers: &[Header]) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw_headers.len());

    for raw_header in raw_headers {
        let name = HeaderName::try_from(raw_header.name).map_err(|err| crate::Error::DecodeHeaderName {
            name: raw_header.name.to_owned(),
            cause: err.into(),
        })?;

        let value = HeaderValue::try_from(raw_header.value).map_err(|err| crate::Error::DecodeHeaderValue {
            value: raw_header.value.to_owned(),
            cause: err.into(),
        })?;

        headers.append(name, value);
    }

    Ok(headers)
}

/// The declared media type, falling back to `text/plain` when absent or unparsable.
pub(crate) fn parse_content_type(headers: &HeaderMap) -> mime::Mime {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<mime::Mime>().ok())
        .unwrap_or(mime::TEXT_PLAIN)
}

pub(crate) fn is_multipart(content_type: &mime::Mime) -> bool {
    content_type.type_() == mime::MULTIPART
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_raw_headers_keeps_duplicates() {
        let raw = [
            Header {
                name: "X-Tag",
                value: b"a",
            },
            Header {
                name: "x-tag",
                value: b"b",
            },
        ];
        let headers = convert_raw_headers_to_header_map(&raw).unwrap();
        let values: Vec<_> = headers.get_all("x-tag").iter().collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_convert_raw_headers_rejects_bad_name() {
        let raw = [Header {
            name: "bad name",
            value: b"a",
        }];
        assert!(matches!(
            convert_raw_headers_to_header_map(&raw),
            Err(crate::Error::DecodeHeaderName { .. })
        ));
    }

    #[test]
    fn test_parse_content_type_default() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_content_type(&headers), mime::TEXT_PLAIN);

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert_eq!(parse_content_type(&headers), mime::APPLICATION_JSON);

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("not a mime"));
        assert_eq!(parse_content_type(&headers), mime::TEXT_PLAIN);
    }
}
