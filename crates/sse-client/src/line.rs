//! Line splitting for the SSE byte stream
//!
//! Normalizes `LF`, `CR` and `CRLF` into a single line boundary, including a
//! `CRLF` pair whose two bytes arrive in separate [`LineBuffer::feed`] calls.

use bytes::{Buf, Bytes, BytesMut};

/// Newline byte
pub(crate) const LF: u8 = b'\n';
/// Carriage return byte
pub(crate) const CR: u8 = b'\r';
/// UTF-8 encoded byte order mark
pub(crate) const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Incremental line splitter
///
/// Bytes handed to [`feed`](Self::feed) are buffered; lines are cut out of the
/// buffer lazily as the returned iterator is advanced. Lines that are not
/// pulled before the iterator is dropped stay buffered and come out of the
/// next `feed` or `flush`.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
    /// Prefix of `buf` known not to contain a terminator
    scanned: usize,
    /// The previous boundary was a CR, so a leading LF belongs to it
    saw_cr: bool,
    /// The first line has been emitted (BOM handling is done)
    started: bool,
}

impl LineBuffer {
    /// Create an empty line buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and iterate over the lines they complete
    pub fn feed(&mut self, bytes: &[u8]) -> Lines<'_> {
        self.buf.extend_from_slice(bytes);
        Lines {
            buffer: self,
            flushing: false,
        }
    }

    /// Iterate over every remaining line, including unterminated content
    ///
    /// Used when the byte source is exhausted.
    pub fn flush(&mut self) -> Lines<'_> {
        Lines {
            buffer: self,
            flushing: true,
        }
    }

    /// Number of buffered bytes not yet emitted as a line
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    fn next_line(&mut self, flushing: bool) -> Option<Bytes> {
        if self.saw_cr && !self.buf.is_empty() {
            self.saw_cr = false;
            if self.buf[0] == LF {
                self.buf.advance(1);
                self.scanned = self.scanned.saturating_sub(1);
            }
        }

        let line = match memchr::memchr2(CR, LF, &self.buf[self.scanned..]) {
            Some(offset) => {
                let end = self.scanned + offset;
                let line = self.buf.split_to(end).freeze();
                self.saw_cr = self.buf[0] == CR;
                self.buf.advance(1);
                self.scanned = 0;
                line
            }
            None if flushing && !self.buf.is_empty() => {
                self.scanned = 0;
                self.saw_cr = false;
                self.buf.split().freeze()
            }
            None => {
                self.scanned = self.buf.len();
                if flushing {
                    self.saw_cr = false;
                }
                return None;
            }
        };

        Some(self.strip_bom(line))
    }

    fn strip_bom(&mut self, mut line: Bytes) -> Bytes {
        if !self.started {
            self.started = true;
            if line.starts_with(BOM) {
                line.advance(BOM.len());
            }
        }
        line
    }
}

/// Lazy iterator over the lines completed by a [`LineBuffer`] operation
#[derive(Debug)]
pub struct Lines<'a> {
    buffer: &'a mut LineBuffer,
    flushing: bool,
}

impl Iterator for Lines<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.next_line(self.flushing)
    }
}
