//! Transport-side building blocks for HTTP/WebSocket connectors: single-fire
//! completion of pending writes and decoding of `multipart/*` bodies.
//!
//! # Examples
//!
//! ```
//! use connector_mime::{Constraints, MultipartDecoder, StoragePolicy};
//!
//! let content_type = "multipart/form-data; boundary=X-BOUNDARY";
//! let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\n\
//!     abcd\r\n--X-BOUNDARY--\r\n";
//!
//! let boundary = connector_mime::parse_boundary(content_type).unwrap();
//! let constraints = Constraints::new().storage_policy(StoragePolicy::Threshold(1024));
//!
//! let mut decoder = MultipartDecoder::with_constraints(boundary, constraints);
//! decoder.feed(data.as_bytes()).unwrap();
//!
//! for part in &decoder.finish().unwrap() {
//!     println!("{:?}: {}", part.name(), part.text().unwrap());
//! }
//! ```
//!
//! Write completion is covered by the [`completion`] module.
//!
//! ## Features
//!
//! - `json`: adds [`BodyPart::json`] through `serde_json`.
//! - `tokio-io`: adds [`decode_reader`] for any `tokio::io::AsyncRead`.
//! - `all`: enables every feature above.

#![forbid(unsafe_code)]
#![cfg_attr(nightly, feature(doc_cfg))]

pub use bytes;
pub use constraints::Constraints;
pub use error::Error;
pub use message::MultipartMessage;
#[cfg(feature = "tokio-io")]
pub use multipart::decode_reader;
pub use multipart::{decode, decode_stream, decode_with_constraints, MultipartDecoder};
pub use part::{BodyPart, PartContent, TransferEncoding};
pub use size_limit::SizeLimit;
pub use storage::{SpooledFile, StoragePolicy};

mod buffer;
pub mod completion;
mod constants;
mod constraints;
mod content_disposition;
mod error;
mod helpers;
mod message;
mod multipart;
mod part;
mod size_limit;
mod state;
mod storage;

/// A Result type often returned from methods that can have `connector_mime` errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
///
/// Any `multipart/*` subtype is accepted.
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(Error::DecodeContentType)?;

    if m.type_() != mime::MULTIPART {
        return Err(Error::NoMultipart);
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .ok_or(Error::NoBoundary)
}
