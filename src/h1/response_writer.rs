use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::adapter::policy;
use crate::status::reason_phrase;
use crate::version::Version;

use super::error::Error;

/// Tracks how much of a response has been written, mirroring the
/// teacher crate's `MessageState` but specialized to a `ResponseSpec`
/// that already knows its whole body shape up front.
enum State {
    /// Nothing written yet.
    Start,
    /// Status line + headers written; body may still follow.
    HeadersSent { chunked: bool, body_allowed: bool },
    /// `done()` has been called; no further writes are valid.
    Done,
}

/// Buffers one HTTP/1 response, applying the `Content-Length` policy from
/// `adapter::policy` and inserting `Date:` when absent. Holds no reference
/// to the socket itself — `flush` takes it by the call — so the same
/// connection-owned `IO` can also be borrowed for body reads between
/// writes.
pub struct ResponseWriter {
    out: BytesMut,
    version: Version,
    is_head: bool,
    state: State,
}

impl ResponseWriter {
    pub fn new(version: Version, is_head: bool) -> Self {
        ResponseWriter { out: BytesMut::with_capacity(256), version, is_head, state: State::Start }
    }

    /// Write the status line and header block. `content_length` is the
    /// caller's supplied `Content-Length` header, if any, before policy is
    /// applied; `computed_body_len` is `Some(n)` when the transport already
    /// knows the exact body size (full-body and file responses); `None`
    /// means streaming (chunked) where the length is unknowable up front.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        status: u16,
        reason: Option<&str>,
        headers: &[(String, Vec<u8>)],
        content_length: Option<u64>,
        computed_body_len: Option<u64>,
        date: Option<&str>,
        close: bool,
    ) -> Result<bool, Error> {
        if !matches!(self.state, State::Start) {
            return Err(Error::AlreadySent);
        }
        let reason = reason.unwrap_or_else(|| reason_phrase(status));
        write!(
            LineWriter(&mut self.out),
            "{} {} {}\r\n",
            self.version, status, reason
        )
        .expect("writing to BytesMut never fails");

        let mut wrote_date = false;
        let mut wrote_length = false;
        let mut wrote_connection = false;
        for (name, value) in headers {
            if name == "content-length" {
                continue; // re-derived below per policy
            }
            if name == "connection" {
                wrote_connection = true;
            }
            if name == "date" {
                wrote_date = true;
            }
            write_header(&mut self.out, name, value);
        }

        let chunked = computed_body_len.is_none() && !policy::omits_content_length(status) && status != 304;
        if policy::omits_content_length(status) {
            // no Content-Length at all
        } else if policy::preserves_caller_length(status, self.is_head) {
            if let Some(n) = content_length {
                let mut buf = itoa::Buffer::new();
                write_header(&mut self.out, "content-length", buf.format(n).as_bytes());
                wrote_length = true;
            }
        } else if let Some(n) = computed_body_len {
            let mut buf = itoa::Buffer::new();
            write_header(&mut self.out, "content-length", buf.format(n).as_bytes());
            wrote_length = true;
        } else {
            write_header(&mut self.out, "transfer-encoding", b"chunked");
            wrote_length = true;
        }
        let _ = wrote_length;

        if !wrote_connection && close {
            write_header(&mut self.out, "connection", b"close");
        }
        if !wrote_date {
            if let Some(d) = date {
                write_header(&mut self.out, "date", d.as_bytes());
            }
        }
        self.out.extend_from_slice(b"\r\n");

        let body_allowed = policy::body_is_sent(status, self.is_head);
        self.state = State::HeadersSent { chunked, body_allowed };
        Ok(body_allowed)
    }

    /// Write raw body bytes for a non-chunked (full or file) response.
    pub fn write_body(&mut self, data: &[u8]) -> Result<(), Error> {
        match self.state {
            State::HeadersSent { body_allowed, .. } if body_allowed => {
                self.out.extend_from_slice(data);
                Ok(())
            }
            State::HeadersSent { .. } => Ok(()), // HEAD/204/304: discard silently
            _ => Err(Error::AlreadySent),
        }
    }

    /// Write one chunk for a `Transfer-Encoding: chunked` response. An
    /// empty chunk commits the terminator.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<(), Error> {
        match self.state {
            State::HeadersSent { chunked: true, body_allowed } => {
                if !body_allowed {
                    return Ok(());
                }
                if data.is_empty() {
                    self.out.extend_from_slice(b"0\r\n\r\n");
                } else {
                    write!(LineWriter(&mut self.out), "{:x}\r\n", data.len()).unwrap();
                    self.out.extend_from_slice(data);
                    self.out.extend_from_slice(b"\r\n");
                }
                Ok(())
            }
            _ => Err(Error::AlreadySent),
        }
    }

    pub async fn flush<IO: AsyncWrite + Unpin>(&mut self, io: &mut IO) -> Result<(), Error> {
        if !self.out.is_empty() {
            io.write_all(&self.out).await?;
            self.out.clear();
        }
        io.flush().await?;
        Ok(())
    }

    pub fn done(&mut self) {
        self.state = State::Done;
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

fn write_header(out: &mut BytesMut, name: &str, value: &[u8]) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

/// Adapter so `write!()` works against a `BytesMut` without pulling in
/// `std::io::Write` (which would require a fallible sink).
struct LineWriter<'a>(&'a mut BytesMut);

impl std::fmt::Write for LineWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.0.put_slice(s.as_bytes());
        Ok(())
    }
}

use std::fmt::Write as _;

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn ok_response_has_date_and_length() {
        let mut sink = Vec::new();
        let mut w = ResponseWriter::new(Version::Http11, false);
        let body_allowed = w
            .start(200, None, &[], None, Some(2), Some("Tue, 15 Nov 1994 08:12:31 GMT"), false)
            .unwrap();
        assert!(body_allowed);
        w.write_body(b"OK").unwrap();
        w.flush(&mut sink).await.unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-length: 2\r\n"));
        assert!(text.contains("date: "));
        assert!(text.ends_with("\r\n\r\nOK"));
    }

    #[tokio::test]
    async fn head_preserves_caller_length_without_body() {
        let mut sink = Vec::new();
        let mut w = ResponseWriter::new(Version::Http11, true);
        let body_allowed = w.start(200, None, &[], Some(42), None, None, false).unwrap();
        assert!(!body_allowed);
        w.flush(&mut sink).await.unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert!(text.contains("content-length: 42\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn no_content_status_omits_length() {
        let mut sink = Vec::new();
        let mut w = ResponseWriter::new(Version::Http11, false);
        w.start(204, None, &[], Some(5), None, None, false).unwrap();
        w.flush(&mut sink).await.unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert!(!text.contains("content-length"));
    }

    #[tokio::test]
    async fn chunked_round_trip() {
        let mut sink = Vec::new();
        let mut w = ResponseWriter::new(Version::Http11, false);
        w.start(200, None, &[], None, None, None, false).unwrap();
        w.write_chunk(b"foo").unwrap();
        w.write_chunk(b"bar").unwrap();
        w.write_chunk(b"").unwrap();
        w.flush(&mut sink).await.unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert!(text.contains("transfer-encoding: chunked"));
        assert!(text.ends_with("3\r\nfoo\r\n3\r\nbar\r\n0\r\n\r\n"));
    }
}
