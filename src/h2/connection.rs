//! The per-connection HTTP/2 state machine: handshake, frame dispatch,
//! per-stream worker tasks and the pending-sends pump that retries
//! flow-control-deferred writes once a WINDOW_UPDATE arrives.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::adapter::{PeerAddr, RequestView, ResponseBody, Scheme};
use crate::config::Config;
use crate::date::DateCache;

use super::flow::FlowWindow;
use super::frame::{self, error_code, frame_type, FrameHeader};
use super::handle::Handle;
use super::hpack;
use super::settings::Settings;
use super::stream::{FromWorker, Stream, StreamState, ToWorker};
use super::validation::validate_request;
use super::Error;

const WORKER_CHANNEL_CAPACITY: usize = 32;

/// Serves one HTTP/2 connection to completion, assuming the caller has
/// already read (and, for `h2c` Upgrade, possibly replayed) the client
/// connection preface. `handler` is invoked once per stream, in a freshly
/// spawned task, with a `RequestView` and the `Handle` it uses to read the
/// body and write the response.
pub async fn serve<IO, F, Fut>(
    io: IO,
    seed: BytesMut,
    config: Arc<Config>,
    date: DateCache,
    peer_address: PeerAddr,
    local_address: PeerAddr,
    scheme: Scheme,
    handler: F,
) -> Result<(), Error>
where
    IO: AsyncRead + AsyncWrite + Unpin,
    F: Fn(RequestView, Handle) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut conn = Connection::new(io, seed, config, date, peer_address, local_address, scheme);
    conn.send_initial_settings().await?;
    conn.run(handler).await
}

struct Connection<IO> {
    io: IO,
    read_buf: BytesMut,
    write_buf: Vec<u8>,
    hpack_decoder: hpack::Decoder,
    hpack_encoder: hpack::Encoder,
    local_settings: Settings,
    remote_settings: Settings,
    send_window: FlowWindow,
    recv_window: FlowWindow,
    streams: HashMap<u32, Stream>,
    last_peer_stream_id: u32,
    pending_sends: VecDeque<(u32, Bytes, bool)>,
    from_workers_tx: mpsc::Sender<FromWorker>,
    from_workers_rx: mpsc::Receiver<FromWorker>,
    config: Arc<Config>,
    date: DateCache,
    peer_address: PeerAddr,
    local_address: PeerAddr,
    scheme: Scheme,
    goaway_sent: bool,
}

enum Event {
    Frame(Option<(FrameHeader, Bytes)>),
    Worker(Option<FromWorker>),
}

impl<IO: AsyncRead + AsyncWrite + Unpin> Connection<IO> {
    fn new(
        io: IO,
        seed: BytesMut,
        config: Arc<Config>,
        date: DateCache,
        peer_address: PeerAddr,
        local_address: PeerAddr,
        scheme: Scheme,
    ) -> Self {
        let (from_workers_tx, from_workers_rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
        let local_settings = config.default_local_settings.clone();
        Connection {
            io,
            read_buf: seed,
            write_buf: Vec::with_capacity(4096),
            hpack_decoder: hpack::Decoder::new(),
            hpack_encoder: hpack::Encoder::new(),
            send_window: FlowWindow::new(Settings::default().initial_window_size),
            recv_window: FlowWindow::new(local_settings.initial_window_size),
            local_settings,
            remote_settings: Settings::default(),
            streams: HashMap::new(),
            last_peer_stream_id: 0,
            pending_sends: VecDeque::new(),
            from_workers_tx,
            from_workers_rx,
            config,
            date,
            peer_address,
            local_address,
            scheme,
            goaway_sent: false,
        }
    }

    async fn send_initial_settings(&mut self) -> Result<(), Error> {
        frame::encode_settings(&mut self.write_buf, &self.local_settings.to_pairs());
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), Error> {
        if !self.write_buf.is_empty() {
            self.io.write_all(&self.write_buf).await.map_err(Error::Io)?;
            self.write_buf.clear();
        }
        self.io.flush().await.map_err(Error::Io)?;
        Ok(())
    }

    async fn goaway(&mut self, code: u32) -> Result<(), Error> {
        if !self.goaway_sent {
            frame::encode_goaway(&mut self.write_buf, self.last_peer_stream_id, code, b"");
            self.goaway_sent = true;
            let _ = self.flush().await;
        }
        Ok(())
    }

    async fn run<F, Fut>(&mut self, handler: F) -> Result<(), Error>
    where
        F: Fn(RequestView, Handle) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            let event = {
                let io = &mut self.io;
                let read_buf = &mut self.read_buf;
                let max_frame_size = self.local_settings.max_frame_size;
                let from_workers_rx = &mut self.from_workers_rx;
                tokio::select! {
                    biased;
                    msg = from_workers_rx.recv() => Event::Worker(msg),
                    frame = read_frame(io, read_buf, max_frame_size) => Event::Frame(frame?),
                }
            };
            match event {
                Event::Frame(None) => return Ok(()), // clean EOF
                Event::Frame(Some((header, payload))) => {
                    if let Err(err) = self.dispatch_frame(header, payload, &handler).await {
                        return self.fail(err).await;
                    }
                }
                Event::Worker(None) => {} // all handles dropped; keep serving remaining streams
                Event::Worker(Some(msg)) => {
                    if let Err(err) = self.handle_worker_message(msg).await {
                        return self.fail(err).await;
                    }
                }
            }
            self.pump_pending_sends().await?;
            if self.goaway_sent && self.streams.is_empty() {
                return Ok(());
            }
        }
    }

    async fn fail(&mut self, err: Error) -> Result<(), Error> {
        match &err {
            Error::Stream { stream_id, code } => {
                frame::encode_rst_stream(&mut self.write_buf, *stream_id, *code);
                self.streams.remove(stream_id);
                let _ = self.flush().await;
                Ok(())
            }
            _ => {
                warn!("closing HTTP/2 connection: {}", err);
                let _ = self.goaway(err.code()).await;
                Err(err)
            }
        }
    }

    async fn dispatch_frame<F, Fut>(&mut self, header: FrameHeader, payload: Bytes, handler: &F) -> Result<(), Error>
    where
        F: Fn(RequestView, Handle) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        trace!("h2 frame type={} stream={} len={}", header.frame_type, header.stream_id, header.length);
        match header.frame_type {
            frame_type::SETTINGS => self.on_settings(header, &payload).await,
            frame_type::WINDOW_UPDATE => self.on_window_update(header, &payload),
            frame_type::PING => self.on_ping(header, &payload).await,
            frame_type::GOAWAY => {
                self.goaway_sent = true; // peer is shutting down; stop accepting new streams
                Ok(())
            }
            frame_type::RST_STREAM => {
                self.streams.remove(&header.stream_id);
                Ok(())
            }
            frame_type::PRIORITY => Ok(()), // scheduling hints are out of scope
            frame_type::HEADERS => self.on_headers(header, payload, handler).await,
            frame_type::CONTINUATION => Err(Error::connection(error_code::PROTOCOL_ERROR)), // only after a held HEADERS, handled inline
            frame_type::DATA => self.on_data(header, payload).await,
            frame_type::PUSH_PROMISE => Err(Error::connection(error_code::PROTOCOL_ERROR)), // clients never send this
            _ => Ok(()), // unknown frame type, §4.1: ignore
        }
    }

    async fn on_settings(&mut self, header: FrameHeader, payload: &[u8]) -> Result<(), Error> {
        if header.is_ack() {
            return Ok(());
        }
        if payload.len() % 6 != 0 {
            return Err(Error::connection(error_code::FRAME_SIZE_ERROR));
        }
        let old_initial_window = self.remote_settings.initial_window_size;
        for (id, value) in frame::parse_settings_payload(payload) {
            self.remote_settings.apply(id, value)?;
        }
        let delta = self.remote_settings.initial_window_size as i64 - old_initial_window as i64;
        if delta != 0 {
            for stream in self.streams.values_mut() {
                stream.send_window.apply_initial_window_delta(delta)?;
            }
        }
        frame::encode_settings_ack(&mut self.write_buf);
        self.flush().await
    }

    fn on_window_update(&mut self, header: FrameHeader, payload: &[u8]) -> Result<(), Error> {
        if payload.len() < 4 {
            return Err(Error::connection(error_code::FRAME_SIZE_ERROR));
        }
        let increment = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        if increment == 0 {
            return Err(Error::connection(error_code::PROTOCOL_ERROR));
        }
        if header.stream_id == 0 {
            self.send_window.increment(increment)?;
        } else if let Some(stream) = self.streams.get_mut(&header.stream_id) {
            stream.send_window.increment(increment)?;
        }
        Ok(())
    }

    async fn on_ping(&mut self, header: FrameHeader, payload: &[u8]) -> Result<(), Error> {
        if payload.len() != 8 {
            return Err(Error::connection(error_code::FRAME_SIZE_ERROR));
        }
        if !header.is_ack() {
            let mut data = [0u8; 8];
            data.copy_from_slice(payload);
            frame::encode_ping(&mut self.write_buf, data, true);
            self.flush().await?;
        }
        Ok(())
    }

    async fn on_headers<F, Fut>(&mut self, header: FrameHeader, payload: Bytes, handler: &F) -> Result<(), Error>
    where
        F: Fn(RequestView, Handle) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if header.stream_id == 0 || header.stream_id % 2 == 0 {
            return Err(Error::connection(error_code::PROTOCOL_ERROR));
        }
        if header.stream_id <= self.last_peer_stream_id {
            return Err(Error::connection(error_code::PROTOCOL_ERROR));
        }
        if let Some(limit) = self.local_settings.max_concurrent_streams {
            if self.streams.len() as u32 >= limit {
                frame::encode_rst_stream(&mut self.write_buf, header.stream_id, error_code::REFUSED_STREAM);
                self.flush().await?;
                return Ok(());
            }
        }
        self.last_peer_stream_id = header.stream_id;

        let (block, _priority) = frame::strip_headers_padding(&header, &payload)?;
        let block = if header.is_end_headers() {
            block.to_vec()
        } else {
            self.read_continuations(header.stream_id, block.to_vec()).await?
        };
        let raw = self.hpack_decoder.decode(&block)?;
        let request = match validate_request(header.stream_id, raw) {
            Ok(req) => req,
            Err(err) => {
                frame::encode_rst_stream(&mut self.write_buf, header.stream_id, err.code());
                self.flush().await?;
                return Ok(());
            }
        };

        self.spawn_stream(header.stream_id, request, header.is_end_stream(), handler);
        Ok(())
    }

    /// Spawns the worker task for one stream's already-validated request.
    /// Shared by an ordinary HEADERS frame and the request carried over
    /// from an `h2c` Upgrade, which arrives pre-validated as stream 1
    /// instead of through `on_headers`.
    fn spawn_stream<F, Fut>(&mut self, stream_id: u32, request: super::validation::Request, remote_closed: bool, handler: &F)
    where
        F: Fn(RequestView, Handle) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (to_worker_tx, to_worker_rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
        let mut stream =
            Stream::new(stream_id, self.remote_settings.initial_window_size, self.local_settings.initial_window_size, to_worker_tx);
        if remote_closed {
            let _ = stream.recv_end_stream(); // Open -> HalfClosedRemote, never fails
        }
        self.streams.insert(stream_id, stream);

        let view = RequestView {
            method: request.method,
            scheme: self.scheme,
            authority: request.authority,
            path: request.path,
            query: None,
            version: crate::version::Version::Http2,
            headers: request.headers,
            peer_address: self.peer_address.clone(),
            local_address: self.local_address.clone(),
            peer_certificate: None,
        };
        let handle = Handle::new(stream_id, self.from_workers_tx.clone(), to_worker_rx);
        let handler = handler.clone();
        tokio::spawn(async move { handler(view, handle).await });
    }

    /// Reads CONTINUATION frames directly off the wire until END_HEADERS,
    /// per §6.10 (no other frame type may appear in between).
    async fn read_continuations(&mut self, stream_id: u32, mut block: Vec<u8>) -> Result<Vec<u8>, Error> {
        loop {
            let max_frame_size = self.local_settings.max_frame_size;
            let (header, payload) = read_frame(&mut self.io, &mut self.read_buf, max_frame_size)
                .await?
                .ok_or_else(|| Error::connection(error_code::PROTOCOL_ERROR))?;
            if header.frame_type != frame_type::CONTINUATION || header.stream_id != stream_id {
                return Err(Error::connection(error_code::PROTOCOL_ERROR));
            }
            block.extend_from_slice(&payload);
            if header.is_end_headers() {
                return Ok(block);
            }
        }
    }

    async fn on_data(&mut self, header: FrameHeader, payload: Bytes) -> Result<(), Error> {
        self.recv_window.consume(header.length)?;
        let body = frame::strip_data_padding(&header, &payload)?.to_vec();
        let stream = self
            .streams
            .get_mut(&header.stream_id)
            .ok_or_else(|| Error::connection(error_code::STREAM_CLOSED))?;
        stream.recv_data(header.length)?;
        let end_stream = header.is_end_stream();
        if end_stream {
            stream.recv_end_stream()?;
        }
        // Replenish the stream's own window to match the stream-level
        // WINDOW_UPDATE advertised below; otherwise our accounting thinks
        // the window stays exhausted even though the peer was told it
        // reopened, and a long-running upload eventually trips a false
        // FLOW_CONTROL_ERROR.
        stream.recv_window.increment(header.length)?;
        let sender = stream.to_worker.clone();
        let closed = stream.is_closed();
        if closed {
            self.streams.remove(&header.stream_id);
        }
        let _ = sender.send(ToWorker::Data { chunk: Bytes::from(body), end_stream }).await;

        // Replenish connection- and stream-level receive windows once a
        // reasonable amount has been consumed (RFC 9113 §6.9 leaves the
        // threshold to the implementation).
        frame::encode_window_update(&mut self.write_buf, 0, header.length);
        self.recv_window.increment(header.length)?;
        frame::encode_window_update(&mut self.write_buf, header.stream_id, header.length);
        self.flush().await
    }

    async fn handle_worker_message(&mut self, msg: FromWorker) -> Result<(), Error> {
        match msg {
            FromWorker::SendResponse { stream_id, spec, done } => {
                let headers_end_stream = self.send_response_headers(stream_id, &spec).await?;
                match spec.body {
                    // `send_response_headers` already set END_STREAM on the
                    // HEADERS frame for an empty body; queuing a DATA frame
                    // too would send it after the stream is already closed.
                    ResponseBody::FullBody(_body) if headers_end_stream => {
                        if let Some(stream) = self.streams.get_mut(&stream_id) {
                            stream.send_end_stream();
                            if stream.is_closed() {
                                self.streams.remove(&stream_id);
                            }
                        }
                    }
                    ResponseBody::FullBody(body) => self.queue_data(stream_id, body, true),
                    ResponseBody::File { path, offset, length } => {
                        #[cfg(feature = "sendfile")]
                        {
                            let body = read_file_range(&path, offset, length).await?;
                            self.queue_data(stream_id, body, true);
                        }
                        #[cfg(not(feature = "sendfile"))]
                        {
                            let _ = (path, offset, length);
                            return Err(Error::connection(error_code::INTERNAL_ERROR));
                        }
                    }
                    ResponseBody::Chunked => {}
                }
                let _ = done.send(());
                Ok(())
            }
            FromWorker::SendDataFrame { stream_id, chunk, end_stream } => {
                self.queue_data(stream_id, chunk, end_stream);
                Ok(())
            }
            FromWorker::Finished { stream_id } => {
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.send_end_stream();
                    if stream.is_closed() {
                        self.streams.remove(&stream_id);
                    }
                }
                Ok(())
            }
        }
    }

    /// Encodes and sends the response HEADERS frame, returning whether it
    /// carried END_STREAM itself (true exactly when the body is an empty
    /// `FullBody`, per §4.5).
    async fn send_response_headers(&mut self, stream_id: u32, spec: &crate::adapter::ResponseSpec) -> Result<bool, Error> {
        let mut status_buf = itoa::Buffer::new();
        let mut headers = vec![(":status".to_string(), status_buf.format(spec.status).as_bytes().to_vec())];
        headers.extend(spec.headers.iter().cloned());
        if self.config.date_header {
            headers.push(("date".to_string(), self.date.get().as_bytes().to_vec()));
        }
        let block = self.hpack_encoder.encode(&headers);
        let end_stream = matches!(spec.body, ResponseBody::FullBody(ref b) if b.is_empty());
        frame::encode_headers(&mut self.write_buf, stream_id, &block, end_stream, true);
        self.flush().await?;
        Ok(end_stream)
    }

    /// Queues response body bytes for `stream_id`, splitting on both the
    /// connection and stream send windows; whatever doesn't fit is kept in
    /// `pending_sends` for `pump_pending_sends` to retry after the next
    /// WINDOW_UPDATE.
    fn queue_data(&mut self, stream_id: u32, chunk: Bytes, end_stream: bool) {
        self.pending_sends.push_back((stream_id, chunk, end_stream));
    }

    async fn pump_pending_sends(&mut self) -> Result<(), Error> {
        let mut remaining = VecDeque::new();
        while let Some((stream_id, chunk, end_stream)) = self.pending_sends.pop_front() {
            let allowed = self.send_window.available().max(0) as usize;
            let stream_allowed = self
                .streams
                .get(&stream_id)
                .map(|s| s.send_window.available().max(0) as usize)
                .unwrap_or(0);
            let send_now = allowed.min(stream_allowed).min(chunk.len());
            if send_now == 0 && !chunk.is_empty() {
                remaining.push_back((stream_id, chunk, end_stream));
                continue;
            }
            let (head, tail) = chunk.split_at(send_now);
            let head = Bytes::copy_from_slice(head);
            let tail = Bytes::copy_from_slice(tail);
            let frame_ends_stream = end_stream && tail.is_empty();
            frame::encode_data(&mut self.write_buf, stream_id, &head, frame_ends_stream);
            self.send_window.consume(send_now as u32)?;
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.send_window.consume(send_now as u32)?;
                if frame_ends_stream {
                    stream.send_end_stream();
                }
            }
            if !tail.is_empty() || (end_stream && !frame_ends_stream) {
                remaining.push_back((stream_id, tail, end_stream));
            }
        }
        self.pending_sends = remaining;
        self.flush().await
    }
}

/// Reads exactly one frame (header + payload) off `io`, buffering partial
/// reads in `read_buf`. Returns `Ok(None)` on a clean EOF with no
/// in-progress frame.
async fn read_frame<IO: AsyncRead + Unpin>(
    io: &mut IO,
    read_buf: &mut BytesMut,
    max_frame_size: u32,
) -> Result<Option<(FrameHeader, Bytes)>, Error> {
    while read_buf.len() < frame::FRAME_HEADER_LEN {
        let n = io.read_buf(read_buf).await.map_err(Error::Io)?;
        if n == 0 && read_buf.is_empty() {
            return Ok(None);
        }
        if n == 0 {
            return Err(Error::connection(error_code::PROTOCOL_ERROR));
        }
    }
    let header = FrameHeader::parse(read_buf).expect("checked length above");
    if header.length > max_frame_size {
        return Err(Error::connection(error_code::FRAME_SIZE_ERROR));
    }
    let total = frame::FRAME_HEADER_LEN + header.length as usize;
    while read_buf.len() < total {
        let n = io.read_buf(read_buf).await.map_err(Error::Io)?;
        if n == 0 {
            return Err(Error::connection(error_code::PROTOCOL_ERROR));
        }
    }
    let mut frame_bytes = read_buf.split_to(total);
    let payload = frame_bytes.split_off(frame::FRAME_HEADER_LEN).freeze();
    Ok(Some((header, payload)))
}

/// Reads and validates the client connection preface (§3.4), returning
/// whatever bytes were read past it so the caller can seed `serve`'s frame
/// buffer with them instead of losing them. `prefix` is any bytes the
/// caller already peeked off the socket while deciding h2c-vs-h1.
pub async fn read_preface<IO: AsyncRead + Unpin>(io: &mut IO, prefix: &[u8]) -> Result<BytesMut, Error> {
    let mut buf = BytesMut::from(prefix);
    while buf.len() < frame::CONNECTION_PREFACE.len() {
        let n = io.read_buf(&mut buf).await.map_err(Error::Io)?;
        if n == 0 {
            return Err(Error::connection(error_code::PROTOCOL_ERROR));
        }
    }
    if &buf[..frame::CONNECTION_PREFACE.len()] != frame::CONNECTION_PREFACE {
        return Err(Error::connection(error_code::PROTOCOL_ERROR));
    }
    debug!("HTTP/2 connection preface verified");
    Ok(buf.split_off(frame::CONNECTION_PREFACE.len()))
}

/// Serves one HTTP/2 connection that began life as an HTTP/1.1 request
/// upgraded via `Upgrade: h2c` (§3.2, §4.3). The caller (the glue layer)
/// has already written the `101 Switching Protocols` response; `upgrade`
/// is the client's initial SETTINGS, decoded from the request's
/// `HTTP2-Settings` header, and `request` is that same HTTP/1.1 request,
/// re-delivered here as stream 1, already half-closed (remote) since the
/// client completed it as HTTP/1.1 and sends no more of it over HTTP/2.
pub async fn serve_upgraded<IO, F, Fut>(
    io: IO,
    config: Arc<Config>,
    date: DateCache,
    peer_address: PeerAddr,
    local_address: PeerAddr,
    upgrade: crate::upgrade::Http2Upgrade,
    request: super::validation::Request,
    handler: F,
) -> Result<(), Error>
where
    IO: AsyncRead + AsyncWrite + Unpin,
    F: Fn(RequestView, Handle) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut conn = Connection::new(io, BytesMut::new(), config, date, peer_address, local_address, Scheme::Http);
    conn.send_initial_settings().await?;
    for (id, value) in upgrade.settings {
        conn.remote_settings.apply(id, value)?;
    }
    // The client still sends the ordinary connection preface (§3.5) after
    // a successful upgrade; nothing has been read off this socket yet, so
    // there's no leftover prefix to seed it with.
    conn.read_buf = read_preface(&mut conn.io, b"").await?;
    conn.last_peer_stream_id = 1;
    conn.spawn_stream(1, request, true, &handler);
    conn.run(handler).await
}

/// Reads `length` bytes of `path` starting at `offset` into memory so they
/// can be queued as one DATA-frame source, the same way a `FullBody` is.
/// Like the HTTP/1 side, this is a buffered stand-in for a true zero-copy
/// transfer: the connection task has no access to the glue layer's raw fd.
#[cfg(feature = "sendfile")]
async fn read_file_range(path: &std::path::Path, offset: u64, length: u64) -> Result<Bytes, Error> {
    use tokio::io::{AsyncReadExt as _, AsyncSeekExt};

    let mut file = tokio::fs::File::open(path).await?;
    if offset != 0 {
        file.seek(std::io::SeekFrom::Start(offset)).await?;
    }
    let mut out = vec![0u8; length as usize];
    file.read_exact(&mut out).await?;
    Ok(Bytes::from(out))
}
