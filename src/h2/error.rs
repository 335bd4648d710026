/// An HTTP/2 error, scoped either to the whole connection (fatal: GOAWAY)
/// or to a single stream (recoverable: RST_STREAM), per §7.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection error: {code:#x}")]
    Connection { code: u32 },
    #[error("stream {stream_id} error: {code:#x}")]
    Stream { stream_id: u32, code: u32 },
    #[error("HPACK decompression error")]
    Hpack,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn connection(code: u32) -> Error {
        Error::Connection { code }
    }

    pub fn stream(stream_id: u32, code: u32) -> Error {
        Error::Stream { stream_id, code }
    }

    /// The RFC 9113 §7 error code to report, regardless of scope.
    pub fn code(&self) -> u32 {
        match *self {
            Error::Connection { code } => code,
            Error::Stream { code, .. } => code,
            Error::Hpack => super::frame::error_code::COMPRESSION_ERROR,
            Error::Io(_) => super::frame::error_code::INTERNAL_ERROR,
        }
    }

    /// Whether this error must close the whole connection (GOAWAY) rather
    /// than just the offending stream (RST_STREAM). HPACK errors are always
    /// connection-fatal because the decoder's dynamic table state is now
    /// unrecoverable (§6.2).
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(self, Error::Stream { .. })
    }

    pub fn stream_id(&self) -> Option<u32> {
        match *self {
            Error::Stream { stream_id, .. } => Some(stream_id),
            _ => None,
        }
    }
}
