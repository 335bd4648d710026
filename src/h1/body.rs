use bytes::BytesMut;
use httparse::{parse_chunk_size, Status};

use super::error::Error;

/// The body-length algorithm result (RFC 9112 §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    None,
    Fixed(u64),
    Chunked,
}

/// Decides the body mode for a request from its `Content-Length` and
/// `Transfer-Encoding` headers, already scanned into these two optionals.
///
/// `content_lengths` carries every numeric value seen, in header order, so
/// the caller can detect disagreeing duplicates; this function only
/// consumes a boolean "present" plus the first parsed value for brevity.
pub fn resolve(content_length: Option<u64>, chunked: bool) -> Result<BodyMode, Error> {
    match (chunked, content_length) {
        (true, Some(_)) => Err(Error::ConflictingBodyLength),
        (true, None) => Ok(BodyMode::Chunked),
        (false, Some(n)) => Ok(BodyMode::Fixed(n)),
        (false, None) => Ok(BodyMode::None),
    }
}

/// Parses a `Content-Length` header value, collapsing repeated *equal*
/// values into one and rejecting disagreeing, non-numeric, or negative
/// ones.
pub fn merge_content_length(existing: &mut Option<u64>, value: &[u8]) -> Result<(), Error> {
    let s = std::str::from_utf8(value).map_err(|_| Error::ContentLengthInvalid)?;
    let n: u64 = s.trim().parse().map_err(|_| Error::ContentLengthInvalid)?;
    match *existing {
        None => {
            *existing = Some(n);
            Ok(())
        }
        Some(prev) if prev == n => Ok(()),
        Some(_) => Err(Error::DuplicateContentLength),
    }
}

/// Where `ChunkedDecoder` is within one chunk's framing. Every chunk is
/// `size CRLF payload CRLF`; the terminal chunk is `0 CRLF` followed
/// directly by the trailer-part's closing CRLF (trailers themselves aren't
/// supported, so that trailer-part is always treated as empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Size,
    Data(usize),
    DataCrlf,
    TrailerCrlf,
    Done,
}

/// Incremental decoder for `Transfer-Encoding: chunked` bodies.
///
/// Tracks how many already-parsed payload bytes are sitting at the front of
/// the caller's buffer (`buffered`) and whether the terminating `0\r\n\r\n`
/// chunk has been seen (`is_done`). Chunk-size framing and the CRLFs that
/// delimit it are stripped out of the buffer as they're recognized, so
/// `buffered` always counts pure payload bytes.
#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    buffered: usize,
    phase: Phase,
}

impl Default for ChunkedDecoder {
    fn default() -> ChunkedDecoder {
        ChunkedDecoder { buffered: 0, phase: Phase::Size }
    }
}

impl ChunkedDecoder {
    pub fn new() -> ChunkedDecoder {
        ChunkedDecoder::default()
    }

    /// Scans as much of `buf` as currently forms complete chunk framing,
    /// stripping it out of `buf` and advancing `buffered` past each chunk's
    /// payload bytes. Returns once the buffer is exhausted or the terminal
    /// chunk has been seen.
    ///
    /// The CRLF that trails each chunk's payload, and the one that closes
    /// the (empty) trailer-part after the terminal chunk, are consumed
    /// explicitly rather than left for the next `parse_chunk_size` call to
    /// stumble into — otherwise a read that ends exactly on a chunk
    /// boundary can mistake that CRLF for a zero-size terminal chunk and
    /// drop every chunk after it.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<(), Error> {
        loop {
            match self.phase {
                Phase::Done => return Ok(()),
                Phase::Size => {
                    match parse_chunk_size(&buf[self.buffered..]).map_err(|_| Error::ChunkSize)? {
                        Status::Complete((consumed, 0)) => {
                            remove_range(buf, self.buffered, self.buffered + consumed);
                            self.phase = Phase::TrailerCrlf;
                        }
                        Status::Complete((consumed, size)) => {
                            remove_range(buf, self.buffered, self.buffered + consumed);
                            self.phase = Phase::Data(size as usize);
                        }
                        Status::Partial => return Ok(()),
                    }
                }
                Phase::Data(remaining) => {
                    let available = buf.len() - self.buffered;
                    if available == 0 {
                        return Ok(());
                    }
                    let take = available.min(remaining);
                    self.buffered += take;
                    self.phase = if take == remaining { Phase::DataCrlf } else { Phase::Data(remaining - take) };
                }
                Phase::DataCrlf | Phase::TrailerCrlf => {
                    if buf.len() - self.buffered < 2 {
                        return Ok(());
                    }
                    if &buf[self.buffered..self.buffered + 2] != b"\r\n" {
                        return Err(Error::ChunkSize);
                    }
                    remove_range(buf, self.buffered, self.buffered + 2);
                    self.phase = if self.phase == Phase::DataCrlf { Phase::Size } else { Phase::Done };
                }
            }
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn consume(&mut self, n: usize) {
        assert!(self.buffered >= n);
        self.buffered -= n;
    }
}

/// Remove `buf[start..end]` in place, shifting trailing bytes down.
fn remove_range(buf: &mut BytesMut, start: usize, end: usize) {
    let tail = buf.split_off(end);
    buf.truncate(start);
    buf.unsplit(tail);
}
