//! HTTP/2 transport: frame codec, HPACK, flow control, per-stream state
//! machine and the connection task that drives them (§4.2–§4.4).

pub mod connection;
mod error;
pub mod flow;
pub mod frame;
pub mod handle;
pub mod hpack;
pub mod settings;
pub mod stream;
pub mod validation;

pub use error::Error;
pub use handle::Handle;

pub use connection::{read_preface, serve, serve_upgraded};
