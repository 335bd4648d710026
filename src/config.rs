use std::sync::Arc;
use std::time::Duration;

use crate::h2::settings::Settings;

/// Fine-grained configuration of the HTTP server core.
///
/// Build one with `Config::new()`, apply the setters you need (each returns
/// `&mut Self` for chaining), then call `.done()` to get the `Arc<Config>`
/// that the HTTP/1 and HTTP/2 connection entry points take.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) read_timeout: Duration,
    pub(crate) max_request_line_length: usize,
    pub(crate) max_header_length: usize,
    pub(crate) max_header_count: usize,
    pub(crate) inflight_request_limit: usize,
    pub(crate) default_local_settings: Settings,
    pub(crate) max_requests: u32,
    pub(crate) max_header_key_length: usize,
    pub(crate) max_header_value_length: usize,
    pub(crate) websocket_enabled: bool,
    pub(crate) compress_enabled: bool,
    pub(crate) date_header: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            read_timeout: Duration::from_secs(30),
            max_request_line_length: 10_000,
            max_header_length: 10_000,
            max_header_count: 50,
            inflight_request_limit: 2,
            default_local_settings: Settings::default(),
            max_requests: 100,
            max_header_key_length: 64,
            max_header_value_length: 8_192,
            websocket_enabled: true,
            compress_enabled: true,
            date_header: cfg!(feature = "date_header"),
        }
    }
}

impl Config {
    /// Create a config with defaults matching §6 of the specification.
    pub fn new() -> Config {
        Config::default()
    }

    /// Idle-read timeout: how long the transport waits for more bytes
    /// before treating the connection as dead.
    pub fn read_timeout(&mut self, value: Duration) -> &mut Self {
        self.read_timeout = value;
        self
    }

    /// HTTP/1: maximum bytes in the request line before failing with 414.
    pub fn max_request_line_length(&mut self, value: usize) -> &mut Self {
        self.max_request_line_length = value;
        self
    }

    /// HTTP/1: maximum bytes in a single header line before failing with 431.
    pub fn max_header_length(&mut self, value: usize) -> &mut Self {
        self.max_header_length = value;
        self
    }

    /// HTTP/1: maximum number of header lines before failing with 431.
    pub fn max_header_count(&mut self, value: usize) -> &mut Self {
        self.max_header_count = value;
        self
    }

    /// HTTP/1: number of in-flight (received but not yet committed)
    /// responses the connection queues before it stops reading more
    /// requests off the wire. Reserved for pipelined request handling;
    /// the current transport runs one request to completion before
    /// reading the next, so this has no effect yet.
    pub fn inflight_request_limit(&mut self, value: usize) -> &mut Self {
        self.inflight_request_limit = value;
        self
    }

    /// HTTP/2: the local SETTINGS this server advertises on connect.
    pub fn default_local_settings(&mut self, value: Settings) -> &mut Self {
        self.default_local_settings = value;
        self
    }

    /// HTTP/1: number of requests served on one keep-alive connection
    /// before the transport closes it regardless of `Connection: close`.
    pub fn max_requests(&mut self, value: u32) -> &mut Self {
        self.max_requests = value;
        self
    }

    /// HTTP/2: `max_concurrent_streams` advertised and enforced locally.
    pub fn max_concurrent_streams(&mut self, value: u32) -> &mut Self {
        self.default_local_settings.max_concurrent_streams = Some(value);
        self
    }

    /// HTTP/2: maximum bytes in a single decoded header name.
    pub fn max_header_key_length(&mut self, value: usize) -> &mut Self {
        self.max_header_key_length = value;
        self
    }

    /// HTTP/2: maximum bytes in a single decoded header value.
    pub fn max_header_value_length(&mut self, value: usize) -> &mut Self {
        self.max_header_value_length = value;
        self
    }

    /// Gate the `websocket` upgrade decision point (HTTP/1.1 only).
    pub fn websocket_enabled(&mut self, value: bool) -> &mut Self {
        self.websocket_enabled = value;
        self
    }

    /// Gate response compression negotiation (handled outside this crate;
    /// recorded here so the adapter can report the setting to the glue
    /// layer that wraps response bodies).
    pub fn compress_enabled(&mut self, value: bool) -> &mut Self {
        self.compress_enabled = value;
        self
    }

    /// Toggle automatic `Date:` header insertion.
    pub fn date_header(&mut self, value: bool) -> &mut Self {
        self.date_header = value;
        self
    }

    /// Finish building and wrap in an `Arc` for sharing across connections.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }

    /// Whether the glue layer should attempt [`crate::upgrade::detect_websocket`]
    /// on this connection at all. Neither this crate's transports nor
    /// `upgrade::detect_websocket` itself consult this flag — it's recorded
    /// here purely so the layer that owns the raw socket and decides
    /// whether to call that function has one place to read the setting.
    pub fn is_websocket_enabled(&self) -> bool {
        self.websocket_enabled
    }

    /// Whether the glue layer should negotiate response compression for
    /// this connection. This crate's transports never compress a body
    /// themselves; this flag exists only so the layer that does can read
    /// the operator's choice from the same `Config` it already threads
    /// through to `h1::serve`/`h2::serve`.
    pub fn is_compress_enabled(&self) -> bool {
        self.compress_enabled
    }
}
