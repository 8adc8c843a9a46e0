use crate::constants;
use bytes::{Bytes, BytesMut};
use memchr::memmem;

/// Bytes received so far but not yet consumed by the decoder.
#[derive(Debug)]
pub(crate) struct StreamBuffer {
    pub(crate) eof: bool,
    pub(crate) buf: BytesMut,
    pub(crate) whole_stream_size_limit: u64,
    pub(crate) stream_size_counter: u64,
}

impl StreamBuffer {
    pub fn new(whole_stream_size_limit: u64) -> Self {
        StreamBuffer {
            eof: false,
            buf: BytesMut::new(),
            whole_stream_size_limit,
            stream_size_counter: 0,
        }
    }

    pub fn extend(&mut self, data: &[u8]) -> crate::Result<()> {
        self.stream_size_counter += data.len() as u64;

        if self.stream_size_counter > self.whole_stream_size_limit {
            return Err(crate::Error::StreamSizeExceeded {
                limit: self.whole_stream_size_limit,
            });
        }

        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn read_exact(&mut self, size: usize) -> Option<Bytes> {
        if size <= self.buf.len() {
            Some(self.buf.split_to(size).freeze())
        } else {
            None
        }
    }

    pub fn peek_exact(&self, size: usize) -> Option<&[u8]> {
        self.buf.get(..size)
    }

    /// Reads up to and including `pattern`.
    pub fn read_until(&mut self, pattern: &[u8]) -> Option<Bytes> {
        memmem::find(&self.buf, pattern).map(|idx| self.buf.split_to(idx + pattern.len()).freeze())
    }

    /// Reads up to, but not including, `pattern`.
    pub fn read_to(&mut self, pattern: &[u8]) -> Option<Bytes> {
        memmem::find(&self.buf, pattern).map(|idx| self.buf.split_to(idx).freeze())
    }

    /// Reads the body of the current part.
    ///
    /// Returns `(true, bytes)` once the `\r\n--boundary` delimiter is found; the
    /// delimiter itself, minus its leading CRLF, is left in the buffer. Otherwise
    /// yields whatever cannot belong to a delimiter split across two chunks.
    pub fn read_field_data(
        &mut self,
        boundary: &str,
        field_name: Option<&str>,
    ) -> crate::Result<Option<(bool, Bytes)>> {
        log::trace!("finding next field: {:?}", field_name);

        if self.buf.is_empty() && self.eof {
            return Err(crate::Error::IncompleteFieldData {
                field_name: field_name.map(|s| s.to_owned()),
            });
        }

        let boundary_deriv = format!("{}{}{}", constants::CRLF, constants::BOUNDARY_EXT, boundary);

        match memmem::find(&self.buf, boundary_deriv.as_bytes()) {
            Some(idx) => {
                let bytes = self.buf.split_to(idx).freeze();

                // discard \r\n.
                drop(self.buf.split_to(constants::CRLF.len()));

                Ok(Some((true, bytes)))
            }
            None if self.eof => Err(crate::Error::IncompleteFieldData {
                field_name: field_name.map(|s| s.to_owned()),
            }),
            None => {
                let buf_len = self.buf.len();
                let rem_boundary_part_max_len = boundary_deriv.len() - 1;
                let rem_boundary_part_idx = buf_len.saturating_sub(rem_boundary_part_max_len);

                // A delimiter can only start at a CR and the boundary itself never
                // contains one, so the last CR is the only candidate.
                let hold_from = memchr::memrchr(constants::CR, &self.buf[rem_boundary_part_idx..])
                    .map(|rel_idx| rel_idx + rem_boundary_part_idx)
                    .filter(|&idx| boundary_deriv.as_bytes().starts_with(&self.buf[idx..]))
                    .unwrap_or(buf_len);

                if hold_from == 0 {
                    Ok(None)
                } else {
                    Ok(Some((false, self.buf.split_to(hold_from).freeze())))
                }
            }
        }
    }

    pub fn read_full_buf(&mut self) -> Bytes {
        self.buf.split_to(self.buf.len()).freeze()
    }
}
