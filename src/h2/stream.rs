//! Per-stream state machine (§3, RFC 9113 §5.1) and the message types a
//! connection task exchanges with a stream's worker task.
//!
//! This crate never sends PUSH_PROMISE, so a stream's lifecycle only ever
//! passes through the subset of RFC 9113's state diagram reachable without
//! `reserved (local)`: a stream is born `Open` on the incoming HEADERS and
//! moves towards `Closed` from there.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::adapter::ResponseSpec;

use super::flow::FlowWindow;
use super::frame::error_code;
use super::validation::Request;
use super::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    HalfClosedRemote,
    HalfClosedLocal,
    Closed,
}

/// One HTTP/2 stream's lifecycle and flow-control bookkeeping, owned by
/// the connection task. The application-facing side of the same stream
/// runs in a separate worker task and only ever reaches this state through
/// the message channel below.
pub struct Stream {
    pub id: u32,
    pub state: StreamState,
    pub send_window: FlowWindow,
    pub recv_window: FlowWindow,
    pub to_worker: mpsc::Sender<ToWorker>,
}

impl Stream {
    pub fn new(id: u32, send_initial: u32, recv_initial: u32, to_worker: mpsc::Sender<ToWorker>) -> Stream {
        Stream {
            id,
            state: StreamState::Open,
            send_window: FlowWindow::new(send_initial),
            recv_window: FlowWindow::new(recv_initial),
            to_worker,
        }
    }

    /// The peer set END_STREAM: no more DATA/HEADERS/trailers will arrive.
    pub fn recv_end_stream(&mut self) -> Result<(), Error> {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            StreamState::HalfClosedRemote | StreamState::Closed => {
                return Err(Error::stream(self.id, error_code::STREAM_CLOSED))
            }
        };
        Ok(())
    }

    /// We are sending END_STREAM: no more response bytes will be written.
    pub fn send_end_stream(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            other => other,
        };
    }

    pub fn recv_data(&mut self, len: u32) -> Result<(), Error> {
        if matches!(self.state, StreamState::HalfClosedRemote | StreamState::Closed) {
            return Err(Error::stream(self.id, error_code::STREAM_CLOSED));
        }
        self.recv_window.consume(len)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, StreamState::Closed)
    }
}

/// Message sent from the connection task into a stream's worker task.
pub enum ToWorker {
    Request(Request),
    Data { chunk: Bytes, end_stream: bool },
    Reset { error_code: u32 },
}

/// Message sent from a stream's worker task back to the connection task.
pub enum FromWorker {
    SendResponse { stream_id: u32, spec: ResponseSpec, done: oneshot::Sender<()> },
    SendDataFrame { stream_id: u32, chunk: Bytes, end_stream: bool },
    Finished { stream_id: u32 },
}
