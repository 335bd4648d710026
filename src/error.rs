use crate::h1;
use crate::h2;

/// Top-level error for either transport.
///
/// HTTP/1 errors carry the status that should be written before the
/// connection closes, when a response is still writable. HTTP/2 errors
/// carry the RFC 9113 error code and whether they are stream- or
/// connection-scoped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Http1(#[from] h1::Error),
    #[error(transparent)]
    Http2(#[from] h2::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
