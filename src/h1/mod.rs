//! HTTP/1.0 and HTTP/1.1 transport: incremental request parsing, chunked
//! transfer coding, and the sequential per-connection task (§4.1).

pub mod body;
pub mod connection;
mod error;
pub mod handle;
pub mod parser;
pub mod request_target;
mod response_writer;

pub use error::Error;
pub use handle::Handle;

pub use connection::serve;
