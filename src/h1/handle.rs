use std::sync::Arc;

use bytes::{Bytes, BytesMut};
#[cfg(feature = "sendfile")]
use tokio::io::AsyncSeekExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::adapter::{ReadOutcome, ResponseBody, ResponseSpec};
use crate::config::Config;
use crate::version::Version;

use super::body::{BodyMode, ChunkedDecoder};
use super::error::Error;
use super::response_writer::ResponseWriter;

/// The handle an application callback uses to read the request body and
/// write the response for one HTTP/1 request, borrowed from the
/// connection task for the request's lifetime (HTTP/1 has no concurrent
/// in-flight bodies on one connection, so this never needs to be `'static`
/// or `Send` across tasks the way the HTTP/2 handle does).
pub struct Handle<'a, IO> {
    io: &'a mut IO,
    buf: &'a mut BytesMut,
    body_mode: BodyMode,
    chunked: ChunkedDecoder,
    remaining_fixed: u64,
    body_done: bool,
    writer: ResponseWriter,
    close: bool,
    date: Option<Arc<str>>,
    config: &'a Config,
}

impl<'a, IO: AsyncRead + AsyncWrite + Unpin> Handle<'a, IO> {
    pub(crate) fn new(
        io: &'a mut IO,
        buf: &'a mut BytesMut,
        body_mode: BodyMode,
        version: Version,
        is_head: bool,
        close: bool,
        date: Option<Arc<str>>,
        config: &'a Config,
    ) -> Self {
        let body_done = matches!(body_mode, BodyMode::None);
        Handle {
            io,
            buf,
            body_mode,
            chunked: ChunkedDecoder::new(),
            remaining_fixed: match body_mode {
                BodyMode::Fixed(n) => n,
                _ => 0,
            },
            body_done,
            writer: ResponseWriter::new(version, is_head),
            close,
            date,
            config,
        }
    }

    pub fn close_requested(&self) -> bool {
        self.close
    }

    /// Reads the next piece of the request body.
    pub async fn read_body(&mut self) -> Result<ReadOutcome, Error> {
        if self.body_done {
            return Ok(ReadOutcome::End(Bytes::new()));
        }
        match self.body_mode {
            BodyMode::None => {
                self.body_done = true;
                Ok(ReadOutcome::End(Bytes::new()))
            }
            BodyMode::Fixed(_) => loop {
                if self.remaining_fixed == 0 {
                    self.body_done = true;
                    return Ok(ReadOutcome::End(Bytes::new()));
                }
                if !self.buf.is_empty() {
                    let take = self.buf.len().min(self.remaining_fixed as usize);
                    let chunk = self.buf.split_to(take).freeze();
                    self.remaining_fixed -= take as u64;
                    if self.remaining_fixed == 0 {
                        self.body_done = true;
                        return Ok(ReadOutcome::End(chunk));
                    }
                    return Ok(ReadOutcome::More(chunk));
                }
                if !self.fill_more().await? {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed mid-body",
                    )));
                }
            },
            BodyMode::Chunked => loop {
                self.chunked.parse(self.buf)?;
                if self.chunked.buffered() > 0 {
                    let n = self.chunked.buffered();
                    let chunk = self.buf.split_to(n).freeze();
                    self.chunked.consume(n);
                    let end = self.chunked.is_done();
                    self.body_done = end;
                    return Ok(if end { ReadOutcome::End(chunk) } else { ReadOutcome::More(chunk) });
                }
                if self.chunked.is_done() {
                    self.body_done = true;
                    return Ok(ReadOutcome::End(Bytes::new()));
                }
                if !self.fill_more().await? {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed mid-body",
                    )));
                }
            },
        }
    }

    async fn fill_more(&mut self) -> Result<bool, Error> {
        let n = self.io.read_buf(self.buf).await?;
        Ok(n > 0)
    }

    /// Drains and discards any request body the application never read, so
    /// the connection can be reused for the next request.
    pub async fn discard_body(&mut self) -> Result<(), Error> {
        while !matches!(self.read_body().await?, ReadOutcome::End(_)) {}
        Ok(())
    }

    pub async fn send_response(&mut self, spec: ResponseSpec) -> Result<(), Error> {
        let content_length: Option<u64> = spec
            .headers
            .iter()
            .find(|(n, _)| n == "content-length")
            .and_then(|(_, v)| std::str::from_utf8(v).ok().and_then(|s| s.parse().ok()));
        let computed_len = match &spec.body {
            ResponseBody::FullBody(b) => Some(b.len() as u64),
            ResponseBody::File { length, .. } => Some(*length),
            ResponseBody::Chunked => None,
        };
        let date = self.date.clone();
        let body_allowed = self.writer.start(
            spec.status,
            spec.reason.as_deref(),
            &spec.headers,
            content_length,
            computed_len,
            date.as_deref(),
            self.close,
        )?;
        match spec.body {
            ResponseBody::FullBody(data) => {
                if body_allowed {
                    self.writer.write_body(&data)?;
                }
                self.writer.done();
            }
            ResponseBody::File { path, offset, length } => {
                #[cfg(feature = "sendfile")]
                {
                    if body_allowed {
                        stream_file(&mut self.writer, self.io, &path, offset, length).await?;
                    }
                    self.writer.done();
                }
                #[cfg(not(feature = "sendfile"))]
                {
                    let _ = (path, offset, length);
                    self.writer.done();
                    return Err(Error::FileServingDisabled);
                }
            }
            ResponseBody::Chunked => {}
        }
        self.writer.flush(self.io).await
    }

    pub async fn send_chunk(&mut self, data: &[u8]) -> Result<(), Error> {
        self.writer.write_chunk(data)?;
        self.writer.flush(self.io).await
    }

    pub async fn finish(&mut self) -> Result<(), Error> {
        if !self.writer.is_done() {
            self.writer.write_chunk(&[])?;
            self.writer.done();
            self.writer.flush(self.io).await?;
        }
        Ok(())
    }
}

/// Streams `length` bytes of `path` starting at `offset` directly into the
/// response, one buffered read at a time. A thin portable stand-in for a
/// platform `sendfile(2)`: this crate has no access to the connection's raw
/// fd (the glue layer owns that), so it can't offer true zero-copy transfer
/// itself, only the buffered-copy fallback the teacher crate's `tk-sendfile`
/// would also fall back to off its disk pool thread.
#[cfg(feature = "sendfile")]
async fn stream_file<IO: AsyncWrite + Unpin>(
    writer: &mut ResponseWriter,
    io: &mut IO,
    path: &std::path::Path,
    offset: u64,
    length: u64,
) -> Result<(), Error> {
    let mut file = tokio::fs::File::open(path).await?;
    if offset != 0 {
        file.seek(std::io::SeekFrom::Start(offset)).await?;
    }
    let mut buf = vec![0u8; 64 * 1024];
    let mut remaining = length;
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "file shorter than advertised length",
            )));
        }
        writer.write_body(&buf[..n])?;
        writer.flush(io).await?;
        remaining -= n as u64;
    }
    Ok(())
}
