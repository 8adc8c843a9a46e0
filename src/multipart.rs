use crate::buffer::StreamBuffer;
use crate::constants;
use crate::constraints::Constraints;
use crate::helpers;
use crate::part::{PartBuilder, PartContent};
use crate::state::{MultipartState, StreamingStage};
use crate::MultipartMessage;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use std::sync::Arc;
#[cfg(feature = "tokio-io")]
use tokio::io::AsyncRead;
#[cfg(feature = "tokio-io")]
use tokio_util::io::ReaderStream;

/// Decodes a `multipart/*` body into a [`MultipartMessage`](crate::MultipartMessage).
///
/// Input is handed over chunk by chunk through [`feed`](MultipartDecoder::feed);
/// the decoder keeps its position in the body between calls, so chunks may be
/// split anywhere. [`finish`](MultipartDecoder::finish) signals the end of input
/// and yields the message only if the whole body was well formed.
///
/// Parts are never exposed before the decode succeeds. On any error the decoder
/// drops the parts collected so far, including their spooled files, and refuses
/// further input. Dropping the decoder early releases the same storage.
///
/// # Examples
///
/// ```
/// use connector_mime::MultipartDecoder;
///
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\n\
///     abcd\r\n--X-BOUNDARY--\r\n";
/// let mut decoder = MultipartDecoder::new("X-BOUNDARY");
///
/// for chunk in data.as_bytes().chunks(7) {
///     decoder.feed(chunk).unwrap();
/// }
///
/// let message = decoder.finish().unwrap();
/// assert_eq!(message.len(), 1);
/// assert_eq!(message[0].text().unwrap(), "abcd");
/// ```
#[derive(Debug)]
pub struct MultipartDecoder {
    state: MultipartState,
    constraints: Arc<Constraints>,
}

impl MultipartDecoder {
    /// Construct a new `MultipartDecoder` for the given boundary with default constraints.
    pub fn new<B: Into<String>>(boundary: B) -> MultipartDecoder {
        MultipartDecoder::with_constraints(boundary, Constraints::default())
    }

    /// Construct a new `MultipartDecoder` for the given boundary and constraints.
    pub fn with_constraints<B: Into<String>>(boundary: B, constraints: Constraints) -> MultipartDecoder {
        MultipartDecoder::at_depth(boundary.into(), Arc::new(constraints), 0)
    }

    fn at_depth(boundary: String, constraints: Arc<Constraints>, depth: usize) -> MultipartDecoder {
        let state = MultipartState {
            buffer: StreamBuffer::new(constraints.size_limit.whole_stream),
            boundary,
            stage: StreamingStage::FindingFirstBoundary,
            depth,
            next_field_idx: 0,
            curr_part: None,
            curr_field_size_limit: constraints.size_limit.per_field,
            parts: Vec::new(),
        };

        MultipartDecoder { state, constraints }
    }

    /// Appends the next chunk of the body and decodes as far as it allows.
    pub fn feed(&mut self, chunk: &[u8]) -> crate::Result<()> {
        self.run(|decoder| {
            // Epilogue.
            if decoder.state.stage == StreamingStage::Eof {
                return Ok(());
            }

            decoder.state.buffer.extend(chunk)?;
            decoder.advance()
        })
    }

    /// Signals the end of the body and returns the decoded message.
    ///
    /// Fails with [`Error::IncompleteStream`](crate::Error::IncompleteStream) if the
    /// terminal boundary was never seen. A decoder that never received a byte
    /// yields an empty message.
    pub fn finish(mut self) -> crate::Result<MultipartMessage> {
        self.run(|decoder| {
            decoder.state.buffer.eof = true;

            if decoder.state.buffer.stream_size_counter == 0 {
                decoder.state.stage = StreamingStage::Eof;
                return Ok(());
            }

            decoder.advance()?;

            if decoder.state.stage != StreamingStage::Eof {
                return Err(crate::Error::IncompleteStream);
            }

            Ok(())
        })?;

        let parts = std::mem::take(&mut self.state.parts);
        let boundary = std::mem::take(&mut self.state.boundary);

        Ok(MultipartMessage::new(boundary, parts))
    }

    /// Whether the terminal boundary has been seen.
    pub fn is_done(&self) -> bool {
        self.state.stage == StreamingStage::Eof
    }

    /// Number of parts closed so far.
    pub fn parts_decoded(&self) -> usize {
        self.state.parts.len()
    }

    fn run<F>(&mut self, f: F) -> crate::Result<()>
    where
        F: FnOnce(&mut MultipartDecoder) -> crate::Result<()>,
    {
        if self.state.stage == StreamingStage::Failed {
            return Err(crate::Error::DecoderAborted);
        }

        f(self).map_err(|err| {
            self.abort(&err);
            err
        })
    }

    fn abort(&mut self, err: &crate::Error) {
        log::debug!(
            "aborting multipart decode after {} parts: {}",
            self.state.parts.len(),
            err
        );

        self.state.stage = StreamingStage::Failed;
        self.state.parts.clear();
        self.state.curr_part = None;
        self.state.buffer.read_full_buf();
    }

    fn set_stage(&mut self, stage: StreamingStage) {
        log::trace!("multipart stage {:?} -> {:?}", self.state.stage, stage);
        self.state.stage = stage;
    }

    fn boundary_marker(&self) -> String {
        format!("{}{}", constants::BOUNDARY_EXT, self.state.boundary)
    }

    fn advance(&mut self) -> crate::Result<()> {
        loop {
            let progressed = match self.state.stage {
                StreamingStage::FindingFirstBoundary => self.find_first_boundary()?,
                StreamingStage::ReadingBoundary => self.read_boundary()?,
                StreamingStage::DeterminingBoundaryType => self.determine_boundary_type()?,
                StreamingStage::ReadingTransportPadding => self.read_transport_padding()?,
                StreamingStage::ReadingFieldHeaders => self.read_field_headers()?,
                StreamingStage::ReadingFieldData => self.read_field_data()?,
                StreamingStage::Eof | StreamingStage::Failed => return Ok(()),
            };

            if !progressed {
                return Ok(());
            }
        }
    }

    /// Returns `Ok(false)` when more input is needed, or the error if none will come.
    fn need_more(&self, err: crate::Error) -> crate::Result<bool> {
        if self.state.buffer.eof {
            Err(err)
        } else {
            Ok(false)
        }
    }

    fn find_first_boundary(&mut self) -> crate::Result<bool> {
        let marker = self.boundary_marker();
        let buffer = &mut self.state.buffer;

        match buffer.read_to(marker.as_bytes()) {
            Some(preamble) => {
                if !preamble.is_empty() {
                    log::trace!("discarding {} bytes of preamble", preamble.len());
                }
                self.set_stage(StreamingStage::ReadingBoundary);
                Ok(true)
            }
            None => {
                // Only a tail shorter than the marker can still begin it.
                let keep = marker.len() - 1;
                if buffer.buf.len() > keep {
                    let discard = buffer.buf.len() - keep;
                    drop(buffer.buf.split_to(discard));
                }
                self.need_more(crate::Error::IncompleteStream)
            }
        }
    }

    fn read_boundary(&mut self) -> crate::Result<bool> {
        let marker = self.boundary_marker();

        match self.state.buffer.read_exact(marker.len()) {
            Some(bytes) if bytes[..] == *marker.as_bytes() => {
                self.set_stage(StreamingStage::DeterminingBoundaryType);
                Ok(true)
            }
            Some(_) => Err(crate::Error::IncompleteStream),
            None => self.need_more(crate::Error::IncompleteStream),
        }
    }

    fn determine_boundary_type(&mut self) -> crate::Result<bool> {
        let ext = constants::BOUNDARY_EXT.as_bytes();

        let is_terminal = self.state.buffer.peek_exact(ext.len()).map(|bytes| bytes == ext);

        match is_terminal {
            Some(true) => {
                drop(self.state.buffer.read_exact(ext.len()));
                log::debug!("terminal boundary reached after {} parts", self.state.parts.len());
                self.set_stage(StreamingStage::Eof);
                Ok(true)
            }
            Some(false) => {
                self.set_stage(StreamingStage::ReadingTransportPadding);
                Ok(true)
            }
            None => self.need_more(crate::Error::IncompleteStream),
        }
    }

    fn read_transport_padding(&mut self) -> crate::Result<bool> {
        match self.state.buffer.read_until(constants::CRLF.as_bytes()) {
            Some(line) => {
                let padding = &line[..line.len() - constants::CRLF.len()];
                if !padding.iter().all(|b| *b == b' ' || *b == b'\t') {
                    return Err(crate::Error::IncompleteStream);
                }
                self.set_stage(StreamingStage::ReadingFieldHeaders);
                Ok(true)
            }
            None => self.need_more(crate::Error::IncompleteStream),
        }
    }

    fn read_field_headers(&mut self) -> crate::Result<bool> {
        let buffer = &mut self.state.buffer;

        let header_bytes = if buffer.peek_exact(constants::CRLF.len()) == Some(constants::CRLF.as_bytes()) {
            buffer.read_exact(constants::CRLF.len())
        } else {
            buffer.read_until(constants::CRLF_CRLF.as_bytes())
        };

        let header_bytes = match header_bytes {
            Some(bytes) => bytes,
            None => return self.need_more(crate::Error::IncompleteHeaders),
        };

        let mut headers = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];

        let headers = match httparse::parse_headers(&header_bytes, &mut headers) {
            Ok(httparse::Status::Complete((_, raw_headers))) => {
                helpers::convert_raw_headers_to_header_map(raw_headers)?
            }
            Ok(httparse::Status::Partial) => return Err(crate::Error::IncompleteHeaders),
            Err(err) => return Err(crate::Error::ReadHeaderFailed(err)),
        };

        let field_idx = self.state.next_field_idx;
        self.state.next_field_idx += 1;

        let part = PartBuilder::new(headers, field_idx);

        // Field rules name top-level form fields; nested parts only get `per_field`.
        if self.state.depth == 0 {
            if !self.constraints.is_it_allowed(part.name()) {
                return Err(crate::Error::UnknownField {
                    field_name: part.name().map(|name| name.to_owned()),
                });
            }

            self.state.curr_field_size_limit = self.constraints.size_limit.extract_size_limit_for(part.name());
        } else {
            self.state.curr_field_size_limit = self.constraints.size_limit.per_field;
        }
        log::trace!("reading part {} ({:?})", field_idx, part.name());
        self.state.curr_part = Some(part);
        self.set_stage(StreamingStage::ReadingFieldData);

        Ok(true)
    }

    fn read_field_data(&mut self) -> crate::Result<bool> {
        let state = &mut self.state;
        let part = match state.curr_part.as_mut() {
            Some(part) => part,
            None => return Err(crate::Error::IncompleteStream),
        };

        let (done, bytes) = match state.buffer.read_field_data(&state.boundary, part.name())? {
            Some(data) => data,
            None => return Ok(false),
        };

        if part.len() + bytes.len() as u64 > state.curr_field_size_limit {
            return Err(crate::Error::FieldSizeExceeded {
                limit: state.curr_field_size_limit,
                field_name: part.name().map(|name| name.to_owned()),
            });
        }

        part.write(&bytes, &self.constraints.storage_policy, self.constraints.spool_dir_path())?;

        if done {
            self.close_part()?;
            self.set_stage(StreamingStage::ReadingBoundary);
        }

        Ok(true)
    }

    fn close_part(&mut self) -> crate::Result<()> {
        let mut part = match self.state.curr_part.take() {
            Some(part) => part,
            None => return Ok(()),
        };

        let part = match part.nested_boundary() {
            Some(boundary) => {
                let depth = self.state.depth + 1;
                if depth > self.constraints.max_nesting_depth {
                    return Err(crate::Error::NestingTooDeep {
                        limit: self.constraints.max_nesting_depth,
                    });
                }

                let body = part.take_bytes()?;
                let mut nested = MultipartDecoder::at_depth(boundary, Arc::clone(&self.constraints), depth);
                nested.feed(&body)?;
                part.finish_with(PartContent::Nested(nested.finish()?))
            }
            None => part.finish(&self.constraints.storage_policy, self.constraints.spool_dir_path())?,
        };

        log::debug!(
            "closed part {} ({:?}, {} bytes, spooled: {})",
            part.index(),
            part.name(),
            part.len(),
            part.is_spooled()
        );

        self.state.parts.push(part);
        Ok(())
    }
}

/// Decodes a fully buffered multipart body with default constraints.
pub fn decode<B: Into<String>>(body: &[u8], boundary: B) -> crate::Result<MultipartMessage> {
    decode_with_constraints(body, boundary, Constraints::default())
}

/// Decodes a fully buffered multipart body.
pub fn decode_with_constraints<B: Into<String>>(
    body: &[u8],
    boundary: B,
    constraints: Constraints,
) -> crate::Result<MultipartMessage> {
    let mut decoder = MultipartDecoder::with_constraints(boundary, constraints);
    decoder.feed(body)?;
    decoder.finish()
}

/// Decodes a multipart body delivered as a [`Stream`] of byte chunks.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use connector_mime::Constraints;
/// use futures_util::stream::once;
/// use std::convert::Infallible;
///
/// # async fn run() {
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\n\
///     abcd\r\n--X-BOUNDARY--\r\n";
/// let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });
///
/// let message = connector_mime::decode_stream(stream, "X-BOUNDARY", Constraints::default())
///     .await
///     .unwrap();
/// assert_eq!(message[0].name(), Some("my_text_field"));
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
pub async fn decode_stream<S, O, E, B>(
    stream: S,
    boundary: B,
    constraints: Constraints,
) -> crate::Result<MultipartMessage>
where
    S: Stream<Item = Result<O, E>>,
    O: Into<Bytes>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
    B: Into<String>,
{
    let mut decoder = MultipartDecoder::with_constraints(boundary, constraints);

    futures_util::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk.map_err(|err| crate::Error::StreamReadFailed(err.into()))?.into();
        decoder.feed(&chunk)?;
    }

    decoder.finish()
}

/// Decodes a multipart body read from an [`AsyncRead`] source.
///
/// # Optional
///
/// This requires the optional `tokio-io` feature to be enabled.
#[cfg(feature = "tokio-io")]
#[cfg_attr(nightly, doc(cfg(feature = "tokio-io")))]
pub async fn decode_reader<R, B>(reader: R, boundary: B, constraints: Constraints) -> crate::Result<MultipartMessage>
where
    R: AsyncRead,
    B: Into<String>,
{
    decode_stream(ReaderStream::new(reader), boundary, constraints).await
}
