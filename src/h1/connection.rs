//! The per-connection HTTP/1 task: read one request, run the callback
//! inline, write the response, and either keep the connection alive for
//! the next request or close it (§4.1, §6).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::adapter::{PeerAddr, RequestView, Scheme};
use crate::config::Config;
use crate::date::DateCache;

use super::error::Error;
use super::handle::Handle;
use super::parser;

/// Serves one HTTP/1 connection to completion: parses requests off `io`
/// one at a time, invokes `handler` inline for each, and loops until a
/// close condition is reached (`Connection: close`, HTTP/1.0 without
/// `Connection: keep-alive`, the configured request cap, an idle-read
/// timeout, or a protocol error).
///
/// `handler` returns a boxed future borrowing the `Handle` it was given,
/// rather than a plain associated `Fut: Future`: the handle is borrowed
/// fresh each call from state `serve` owns, so the returned future's type
/// must be free to vary with that call's lifetime. A bare `Fn(..) -> Fut`
/// bound can't express that (`Fut` would have to be one fixed type across
/// every call); boxing is the usual way around it for a borrow-taking
/// callback. `+ Send` on the boxed future lets callers run `serve` itself
/// inside `tokio::spawn`.
pub async fn serve<IO, F>(
    mut io: IO,
    config: Arc<Config>,
    date: DateCache,
    peer_address: PeerAddr,
    local_address: PeerAddr,
    scheme: Scheme,
    handler: F,
) -> Result<(), Error>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send,
    F: for<'h> Fn(RequestView, &'h mut Handle<'h, IO>) -> Pin<Box<dyn Future<Output = ()> + Send + 'h>>,
{
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut served = 0u32;

    loop {
        let head = match read_head(&mut io, &mut buf, &config).await? {
            Some(head) => head,
            None => return Ok(()), // peer closed between requests
        };

        if head.expect_continue {
            io.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        }

        served += 1;
        let close = head.connection_close || served >= config.max_requests;
        let date_value = if config.date_header { Some(date.get()) } else { None };

        let view = RequestView {
            method: head.method.clone(),
            scheme,
            authority: head.host.clone(),
            path: head.path.clone(),
            query: head.query.clone(),
            version: head.version,
            headers: head.headers.clone(),
            peer_address: peer_address.clone(),
            local_address: local_address.clone(),
            peer_certificate: None,
        };

        let mut handle = Handle::new(&mut io, &mut buf, head.body_mode, head.version, head.is_head, close, date_value, &config);
        handler(view, &mut handle).await;
        handle.discard_body().await?;
        let should_close = close || handle.close_requested();
        debug!("HTTP/1 request #{} served, close={}", served, should_close);
        if should_close {
            return Ok(());
        }
    }
}

/// Reads and parses one request line + headers, waiting up to
/// `config.read_timeout` for more bytes between reads. Returns `Ok(None)`
/// only when the peer closes cleanly with no partial request pending.
///
/// A parse/limit error (bad request line, oversized headers, conflicting
/// `Content-Length`, ...) gets a best-effort status line written before the
/// error is returned, per §7 ("close connection after writing `400 Bad
/// Request` when possible"); an I/O error or read timeout does not, since
/// the socket is already in no shape to carry a response.
async fn read_head<IO: AsyncRead + AsyncWrite + Unpin>(
    io: &mut IO,
    buf: &mut BytesMut,
    config: &Config,
) -> Result<Option<parser::ParsedHead>, Error> {
    loop {
        match parser::parse_head(buf, config) {
            Ok(Some((head, consumed))) => {
                let _ = buf.split_to(consumed);
                return Ok(Some(head));
            }
            Ok(None) => {}
            Err(err) => {
                write_best_effort_error(io, &err).await;
                return Err(err);
            }
        }
        let read = tokio::time::timeout(config.read_timeout, io.read_buf(buf)).await;
        let n = match read {
            Ok(result) => result?,
            Err(_) => return Err(Error::ReadTimeout),
        };
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            warn!("connection closed mid-request");
            return Err(Error::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "partial request")));
        }
    }
}

/// Writes a minimal `<status> <reason>` response for an error `serve` is
/// about to give up on, best-effort: the write itself isn't allowed to
/// fail the caller, since by this point the connection is closing anyway.
async fn write_best_effort_error<IO: AsyncWrite + Unpin>(io: &mut IO, err: &Error) {
    if matches!(err, Error::Io(_) | Error::ReadTimeout) {
        return;
    }
    let status = err.status_hint();
    let line = format!(
        "HTTP/1.1 {} {}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
        status,
        crate::status::reason_phrase(status)
    );
    let _ = io.write_all(line.as_bytes()).await;
}
