//! The shared request/response contract honored identically by the HTTP/1
//! and HTTP/2 transports (§4.6).
//!
//! There is no single Rust type straddling both transports — HTTP/1 drives
//! its callback inline over a borrowed socket, HTTP/2 drives it from a
//! spawned stream-worker task talking back to the connection task over
//! channels — but both transports' `Handle` types expose the same method
//! set with the same rules, and both build their outgoing headers through
//! the `policy` helpers below so the two write paths can't drift apart.

pub mod policy;

use std::net::SocketAddr;
use std::path::PathBuf;

use bytes::Bytes;

use crate::version::Version;

/// `http` or `https`, as seen by this connection (not necessarily what the
/// client wrote in an absolute-form request target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// Either endpoint of a connection: a TCP peer, or a Unix-domain path
/// (reported with port 0 per §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

/// An ordered header sequence. Duplicates are preserved; names are
/// lowercase.
pub type HeaderList = Vec<(String, Vec<u8>)>;

/// Request metadata and header view, built once per request and handed to
/// the application callback alongside a `Handle`.
#[derive(Debug, Clone)]
pub struct RequestView {
    pub method: String,
    pub scheme: Scheme,
    pub authority: Option<String>,
    pub path: String,
    pub query: Option<String>,
    pub version: Version,
    pub headers: HeaderList,
    pub peer_address: PeerAddr,
    pub local_address: PeerAddr,
    pub peer_certificate: Option<Vec<u8>>,
}

impl RequestView {
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }
}

/// How the callback wants to supply the response body.
pub enum ResponseBody {
    FullBody(Bytes),
    /// Streamed body; the caller follows `send_response` with zero or more
    /// `send_chunk` calls and a final empty chunk to commit.
    Chunked,
    File { path: PathBuf, offset: u64, length: u64 },
}

/// What the callback returns to start a response.
pub struct ResponseSpec {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: HeaderList,
    pub body: ResponseBody,
}

impl ResponseSpec {
    pub fn new(status: u16, body: ResponseBody) -> ResponseSpec {
        ResponseSpec { status, reason: None, headers: Vec::new(), body }
    }
}

/// The only upgrade this adapter recognizes at the decision point; full
/// frame handling after the 101 response is out of scope (§1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeProtocol {
    WebSocket,
}

/// Outcome of a body read (§4.1, §4.6): either more data is expected, or
/// this is the last chunk of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    More(Bytes),
    End(Bytes),
}

impl ReadOutcome {
    pub fn bytes(&self) -> &Bytes {
        match self {
            ReadOutcome::More(b) | ReadOutcome::End(b) => b,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, ReadOutcome::End(_))
    }
}
