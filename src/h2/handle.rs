//! The per-stream handle an application callback uses to read the request
//! body and write a response, running from that stream's worker task.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::adapter::{ReadOutcome, ResponseSpec};

use super::frame::error_code;
use super::stream::{FromWorker, ToWorker};
use super::Error;

pub struct Handle {
    stream_id: u32,
    to_connection: mpsc::Sender<FromWorker>,
    from_connection: mpsc::Receiver<ToWorker>,
}

impl Handle {
    pub(crate) fn new(
        stream_id: u32,
        to_connection: mpsc::Sender<FromWorker>,
        from_connection: mpsc::Receiver<ToWorker>,
    ) -> Handle {
        Handle { stream_id, to_connection, from_connection }
    }

    fn wire_down() -> Error {
        Error::connection(error_code::INTERNAL_ERROR)
    }

    /// Commits the response status and headers. Must be called exactly
    /// once, before any `send_chunk`.
    pub async fn send_response(&mut self, spec: ResponseSpec) -> Result<(), Error> {
        let (done, wait) = oneshot::channel();
        self.to_connection
            .send(FromWorker::SendResponse { stream_id: self.stream_id, spec, done })
            .await
            .map_err(|_| Self::wire_down())?;
        wait.await.map_err(|_| Self::wire_down())
    }

    /// Sends one body chunk for a response whose body is streamed.
    pub async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), Error> {
        self.to_connection
            .send(FromWorker::SendDataFrame { stream_id: self.stream_id, chunk, end_stream: false })
            .await
            .map_err(|_| Self::wire_down())
    }

    /// Commits end-of-stream: an empty DATA frame with END_STREAM set.
    pub async fn finish(&mut self) -> Result<(), Error> {
        self.to_connection
            .send(FromWorker::SendDataFrame { stream_id: self.stream_id, chunk: Bytes::new(), end_stream: true })
            .await
            .map_err(|_| Self::wire_down())?;
        self.to_connection
            .send(FromWorker::Finished { stream_id: self.stream_id })
            .await
            .map_err(|_| Self::wire_down())
    }

    /// Reads the next piece of the request body, in the order the
    /// connection task received it.
    pub async fn read_body(&mut self) -> Result<ReadOutcome, Error> {
        match self.from_connection.recv().await {
            Some(ToWorker::Data { chunk, end_stream }) => {
                Ok(if end_stream { ReadOutcome::End(chunk) } else { ReadOutcome::More(chunk) })
            }
            Some(ToWorker::Reset { error_code }) => Err(Error::stream(self.stream_id, error_code)),
            Some(ToWorker::Request(_)) | None => Err(Self::wire_down()),
        }
    }
}
