use crate::constants;
use crate::content_disposition::ContentDisposition;
use crate::helpers;
use crate::storage::{PartSink, SpooledFile, StoragePolicy};
use crate::MultipartMessage;
use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use http::header::{HeaderMap, HeaderValue};
#[cfg(feature = "json")]
use serde::de::DeserializeOwned;
use std::path::Path;

/// The octet encoding a part declares through `Content-Transfer-Encoding`.
///
/// None of the variants transforms the bytes: `7bit` and `8bit` only describe
/// what is already on the wire, and unknown encodings are passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Other(String),
}

impl TransferEncoding {
    fn parse(headers: &HeaderMap) -> TransferEncoding {
        let value = match headers.get(constants::CONTENT_TRANSFER_ENCODING) {
            Some(val) => String::from_utf8_lossy(val.as_bytes()).trim().to_ascii_lowercase(),
            None => return TransferEncoding::SevenBit,
        };

        match value.as_str() {
            constants::TRANSFER_ENCODING_7BIT => TransferEncoding::SevenBit,
            constants::TRANSFER_ENCODING_8BIT => TransferEncoding::EightBit,
            _ => TransferEncoding::Other(value),
        }
    }
}

/// The content of a decoded part.
#[derive(Debug)]
pub enum PartContent {
    /// Held fully in memory.
    Memory(Bytes),
    /// Written to a temporary file that lives as long as the part.
    Spooled(SpooledFile),
    /// A `multipart/*` part decoded into its own message.
    Nested(MultipartMessage),
}

#[derive(Debug)]
struct PartMeta {
    disposition: Option<String>,
    name: Option<String>,
    file_name: Option<String>,
    content_type: mime::Mime,
    transfer_encoding: TransferEncoding,
    idx: usize,
}

impl PartMeta {
    fn new(headers: &HeaderMap, idx: usize) -> PartMeta {
        let content_disposition = ContentDisposition::parse(headers);

        PartMeta {
            disposition: content_disposition.disposition,
            name: content_disposition.field_name,
            file_name: content_disposition.file_name,
            content_type: helpers::parse_content_type(headers),
            transfer_encoding: TransferEncoding::parse(headers),
            idx,
        }
    }
}

/// A part whose body is still being read.
#[derive(Debug)]
pub(crate) struct PartBuilder {
    headers: HeaderMap,
    meta: PartMeta,
    sink: PartSink,
}

impl PartBuilder {
    pub fn new(headers: HeaderMap, idx: usize) -> Self {
        let meta = PartMeta::new(&headers, idx);

        PartBuilder {
            headers,
            meta,
            sink: PartSink::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.meta.name.as_deref()
    }

    pub fn len(&self) -> u64 {
        self.sink.len()
    }

    /// Boundary of a nested multipart body, if this part carries one.
    pub fn nested_boundary(&self) -> Option<String> {
        if !helpers::is_multipart(&self.meta.content_type) {
            return None;
        }

        self.meta
            .content_type
            .get_param(mime::BOUNDARY)
            .map(|boundary| boundary.as_str().to_owned())
    }

    fn is_file_like(&self) -> bool {
        self.meta.file_name.is_some() && !helpers::is_multipart(&self.meta.content_type)
    }

    fn should_spool(&self, policy: &StoragePolicy, size: u64) -> bool {
        !helpers::is_multipart(&self.meta.content_type) && policy.should_spool(self.is_file_like(), size)
    }

    pub fn write(&mut self, data: &[u8], policy: &StoragePolicy, spool_dir: Option<&Path>) -> crate::Result<()> {
        let spool = self.should_spool(policy, self.sink.len() + data.len() as u64);
        self.sink.write(data, spool, spool_dir)?;
        Ok(())
    }

    /// Settles the storage of the body and freezes the part.
    pub fn finish(mut self, policy: &StoragePolicy, spool_dir: Option<&Path>) -> crate::Result<BodyPart> {
        let spool = self.should_spool(policy, self.sink.len());
        self.sink.write(&[], spool, spool_dir)?;

        let content = match self.sink {
            PartSink::Memory(buf) => PartContent::Memory(buf.freeze()),
            PartSink::Spooled(mut file) => {
                file.flush()?;
                PartContent::Spooled(file)
            }
        };

        Ok(BodyPart {
            headers: self.headers,
            meta: self.meta,
            content,
        })
    }

    /// Freezes the part with content produced elsewhere, e.g. a nested message.
    pub fn finish_with(self, content: PartContent) -> BodyPart {
        BodyPart {
            headers: self.headers,
            meta: self.meta,
            content,
        }
    }

    /// Takes the in-memory body out of the builder.
    pub fn take_bytes(&mut self) -> crate::Result<Bytes> {
        match std::mem::replace(&mut self.sink, PartSink::new()) {
            PartSink::Memory(buf) => Ok(buf.freeze()),
            PartSink::Spooled(mut file) => {
                file.flush()?;
                Ok(file.read_all()?)
            }
        }
    }
}

/// A single decoded part of a multipart message.
///
/// # Examples
///
/// ```
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\n\
///     abcd\r\n--X-BOUNDARY--\r\n";
/// let message = connector_mime::decode(data.as_bytes(), "X-BOUNDARY").unwrap();
///
/// let part = &message[0];
/// assert_eq!(part.name(), Some("my_text_field"));
/// assert_eq!(part.content_type(), &mime::TEXT_PLAIN);
/// assert_eq!(part.text().unwrap(), "abcd");
/// ```
#[derive(Debug)]
pub struct BodyPart {
    headers: HeaderMap,
    meta: PartMeta,
    content: PartContent,
}

impl BodyPart {
    /// The disposition type, e.g. `form-data` or `attachment`, lowercased.
    pub fn disposition(&self) -> Option<&str> {
        self.meta.disposition.as_deref()
    }

    /// The field name found in the `Content-Disposition` header.
    pub fn name(&self) -> Option<&str> {
        self.meta.name.as_deref()
    }

    /// The file name found in the `Content-Disposition` header.
    pub fn file_name(&self) -> Option<&str> {
        self.meta.file_name.as_deref()
    }

    /// The declared media type, `text/plain` when the part declares none.
    pub fn content_type(&self) -> &mime::Mime {
        &self.meta.content_type
    }

    pub fn transfer_encoding(&self) -> &TransferEncoding {
        &self.meta.transfer_encoding
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Position of the part in wire order, starting at zero.
    pub fn index(&self) -> usize {
        self.meta.idx
    }

    pub fn content(&self) -> &PartContent {
        &self.content
    }

    pub fn into_content(self) -> PartContent {
        self.content
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self.content, PartContent::Memory(_))
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self.content, PartContent::Spooled(_))
    }

    pub fn nested(&self) -> Option<&MultipartMessage> {
        match &self.content {
            PartContent::Nested(message) => Some(message),
            _ => None,
        }
    }

    /// Size of the body in bytes; zero for nested messages.
    pub fn len(&self) -> u64 {
        match &self.content {
            PartContent::Memory(bytes) => bytes.len() as u64,
            PartContent::Spooled(file) => file.len(),
            PartContent::Nested(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw body, read back from spooled storage when needed.
    pub fn bytes(&self) -> crate::Result<Bytes> {
        match &self.content {
            PartContent::Memory(bytes) => Ok(bytes.clone()),
            PartContent::Spooled(file) => Ok(file.read_all()?),
            PartContent::Nested(_) => Err(crate::Error::NestedContent {
                field_name: self.meta.name.clone(),
            }),
        }
    }

    /// Decodes the body as JSON.
    #[cfg(feature = "json")]
    #[cfg_attr(nightly, doc(cfg(feature = "json")))]
    pub fn json<T: DeserializeOwned>(&self) -> crate::Result<T> {
        let bytes = self.bytes()?;
        serde_json::from_slice(&bytes).map_err(crate::Error::DecodeJson)
    }

    /// The body as text, decoded with the declared charset or UTF-8.
    pub fn text(&self) -> crate::Result<String> {
        self.text_with_charset("utf-8")
    }

    /// The body as text, decoded with the declared charset or `default_encoding`.
    pub fn text_with_charset(&self, default_encoding: &str) -> crate::Result<String> {
        let encoding_name = self
            .content_type()
            .get_param(mime::CHARSET)
            .map(|charset| charset.as_str())
            .unwrap_or(default_encoding);

        let encoding = Encoding::for_label(encoding_name.as_bytes()).unwrap_or(UTF_8);

        let bytes = self.bytes()?;

        let (text, _, _) = encoding.decode(&bytes);

        Ok(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse(&HeaderMap::new()), TransferEncoding::SevenBit);
        assert_eq!(
            TransferEncoding::parse(&headers(&[("content-transfer-encoding", "8BIT")])),
            TransferEncoding::EightBit
        );
        assert_eq!(
            TransferEncoding::parse(&headers(&[("content-transfer-encoding", "base64")])),
            TransferEncoding::Other("base64".to_owned())
        );
    }

    #[test]
    fn test_builder_keeps_small_file_in_memory() {
        let h = headers(&[
            ("content-disposition", "form-data; name=\"f\"; filename=\"a.txt\""),
            ("content-type", "text/plain"),
        ]);
        let mut builder = PartBuilder::new(h, 0);
        let policy = StoragePolicy::Threshold(8);
        builder.write(b"tiny", &policy, None).unwrap();

        let part = builder.finish(&policy, None).unwrap();
        assert!(part.is_in_memory());
        assert_eq!(part.file_name(), Some("a.txt"));
        assert_eq!(part.text().unwrap(), "tiny");
    }

    #[test]
    fn test_builder_spools_large_file() {
        let h = headers(&[("content-disposition", "form-data; name=\"f\"; filename=\"a.bin\"")]);
        let mut builder = PartBuilder::new(h, 3);
        let policy = StoragePolicy::Threshold(4);
        builder.write(b"abc", &policy, None).unwrap();
        builder.write(b"defgh", &policy, None).unwrap();

        let part = builder.finish(&policy, None).unwrap();
        assert!(part.is_spooled());
        assert_eq!(part.index(), 3);
        assert_eq!(part.len(), 8);
        assert_eq!(part.bytes().unwrap(), Bytes::from_static(b"abcdefgh"));
    }

    #[test]
    fn test_builder_forced_spool_of_empty_part() {
        let builder = PartBuilder::new(HeaderMap::new(), 0);
        let part = builder.finish(&StoragePolicy::Spooled, None).unwrap();
        assert!(part.is_spooled());
        assert!(part.is_empty());
        assert_eq!(part.text().unwrap(), "");
    }

    #[test]
    fn test_text_with_declared_charset() {
        let h = headers(&[("content-type", "text/plain; charset=iso-8859-1")]);
        let mut builder = PartBuilder::new(h, 0);
        builder.write(&[0xe8, b'i', b'i'], &StoragePolicy::InMemory, None).unwrap();

        let part = builder.finish(&StoragePolicy::InMemory, None).unwrap();
        assert_eq!(part.text().unwrap(), "èii");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json() {
        #[derive(serde::Deserialize)]
        struct Payload {
            #[serde(rename = "bodyPart")]
            body_part: String,
        }

        let h = headers(&[("content-type", "application/json")]);
        let mut builder = PartBuilder::new(h, 0);
        builder.write(br#"{"bodyPart":"jsonPart"}"#, &StoragePolicy::InMemory, None).unwrap();

        let part = builder.finish(&StoragePolicy::InMemory, None).unwrap();
        let payload: Payload = part.json().unwrap();
        assert_eq!(payload.body_part, "jsonPart");

        let mut builder = PartBuilder::new(HeaderMap::new(), 1);
        builder.write(b"{not json", &StoragePolicy::InMemory, None).unwrap();
        let part = builder.finish(&StoragePolicy::InMemory, None).unwrap();
        assert!(matches!(part.json::<Payload>(), Err(crate::Error::DecodeJson(_))));
    }

    #[test]
    fn test_nested_boundary() {
        let h = headers(&[("content-type", "multipart/mixed; boundary=inner")]);
        let builder = PartBuilder::new(h, 0);
        assert_eq!(builder.nested_boundary().as_deref(), Some("inner"));

        let builder = PartBuilder::new(HeaderMap::new(), 0);
        assert_eq!(builder.nested_boundary(), None);
    }
}
