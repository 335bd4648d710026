/// HTTP/1 transport error.
///
/// Every variant carries the status that should be written if the response
/// hasn't been committed yet; the connection is always closed afterwards
/// (§7: "one malformed request on a keep-alive connection ends only that
/// request by closing the connection").
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request line or headers: {0:?}")]
    Parse(httparse::Error),
    #[error("malformed chunk size")]
    ChunkSize,
    #[error("request line exceeds the configured limit")]
    RequestLineTooLong,
    #[error("headers exceed the configured limit")]
    HeadersTooLarge,
    #[error("unparsable request target")]
    BadRequestTarget,
    #[error("invalid Host header")]
    HostInvalid,
    #[error("duplicate Host header")]
    DuplicateHost,
    #[error("invalid or conflicting Content-Length header")]
    ContentLengthInvalid,
    #[error("duplicate Content-Length header")]
    DuplicateContentLength,
    #[error("both Content-Length and Transfer-Encoding present")]
    ConflictingBodyLength,
    #[error("idle read timed out")]
    ReadTimeout,
    #[error("response already sent for this request")]
    AlreadySent,
    #[error("file serving is disabled (build without the `sendfile` feature)")]
    FileServingDisabled,
}

impl Error {
    /// The status that should be reported to the peer for this error, when
    /// no response has been written yet.
    pub fn status_hint(&self) -> u16 {
        match self {
            Error::RequestLineTooLong => 414,
            Error::HeadersTooLarge => 431,
            Error::Io(_) | Error::ReadTimeout => 500,
            Error::FileServingDisabled => 500,
            _ => 400,
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(e: httparse::Error) -> Error {
        Error::Parse(e)
    }
}
