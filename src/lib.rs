//! Core HTTP/1.1 and HTTP/2 server transports: connection-level parsing,
//! framing, flow control, and a shared request/response adapter.
//!
//! Socket acceptance, TLS/ALPN negotiation, and application routing live
//! outside this crate — it takes an already-accepted `AsyncRead +
//! AsyncWrite` stream and a per-request callback, and drives the wire
//! protocol to completion.
//!
//! - [`h1`] serves one connection inline, sequentially, one request at a
//!   time.
//! - [`h2`] serves one connection by spawning a worker task per stream,
//!   talking to the connection task over channels.
//! - [`adapter`] holds the request/response types and header policy both
//!   transports share.
//! - [`upgrade`] resolves the two upgrade decision points this crate
//!   supports: h2c prior knowledge, and the WebSocket handshake check.

pub mod adapter;
pub mod config;
pub mod date;
pub mod error;
pub mod h1;
pub mod h2;
pub mod headers;
pub mod status;
pub mod upgrade;
pub mod version;

pub use adapter::{PeerAddr, ReadOutcome, RequestView, Scheme, ResponseBody, ResponseSpec, UpgradeProtocol};
pub use config::Config;
pub use date::DateCache;
pub use error::Error;
pub use version::Version;
