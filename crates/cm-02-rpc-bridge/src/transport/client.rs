//! # RPC Client
//!
//! One `RpcClient` owns one connection and multiplexes any number of
//! streams over it. A writer task drains the outbound queue; a reader task
//! routes inbound frames to per-stream queues.
//!
//! The reader never waits on a single stream. A stream whose consumer falls
//! more than `STREAM_BUFFER` frames behind is detached: it ends with
//! `End(Failed(TransportUnavailable))` and the server is sent `Cancel`.
//!
//! When the connection ends for any reason (EOF, I/O error, `close()`),
//! every open stream receives exactly one
//! `End(Failed(TransportUnavailable))`. The connection is also closed once
//! every `RpcClient` clone and every `ClientStream` has been dropped.

use crate::errors::RpcError;
use crate::transport::frame::{Frame, FrameBody, FrameCodec, StreamEnd, StreamEvent};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Frames buffered per stream before the stream is detached as too slow.
pub const STREAM_BUFFER: usize = 1024;

/// Frames buffered for the writer task.
const OUTBOUND_BUFFER: usize = 256;

struct Shared {
    next_stream_id: AtomicU64,
    streams: DashMap<u64, mpsc::Sender<StreamEvent>>,
    outbound: mpsc::Sender<Frame>,
    closed: CancellationToken,
    close_reason: Mutex<Option<String>>,
}

impl Shared {
    fn close(&self, reason: &str) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason.to_string());
            }
        }
        self.closed.cancel();
    }

    fn reason(&self) -> String {
        self.close_reason
            .lock()
            .clone()
            .unwrap_or_else(|| "connection closed".to_string())
    }

    /// Terminate every remaining stream with a transport failure.
    fn fail_all_streams(&self) {
        let reason = self.reason();
        let ids: Vec<u64> = self.streams.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            // `remove` hands the sender to exactly one caller.
            if let Some((_, tx)) = self.streams.remove(&id) {
                deliver_end(tx, StreamEnd::Failed(RpcError::TransportUnavailable(reason.clone())));
            }
        }
    }
}

/// Deliver the terminal event without stalling the reader.
fn deliver_end(tx: mpsc::Sender<StreamEvent>, end: StreamEnd) {
    match tx.try_send(StreamEvent::End(end)) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Closed(_)) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            tokio::spawn(async move {
                let _ = tx.send(event).await;
            });
        }
    }
}

/// Closes the connection when the last user-facing handle goes away.
/// The reader and writer tasks hold `Shared` but never this.
struct Owner(Arc<Shared>);

impl Drop for Owner {
    fn drop(&mut self) {
        self.0.close("all client handles dropped");
    }
}

/// Client half of a bridged connection.
#[derive(Clone)]
pub struct RpcClient {
    shared: Arc<Shared>,
    owner: Arc<Owner>,
}

impl RpcClient {
    /// Take ownership of `io` and start the reader and writer tasks.
    pub fn connect<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut sink, mut source) = Framed::new(io, FrameCodec::new()).split();
        let (outbound, mut outbound_rx) = mpsc::channel::<Frame>(OUTBOUND_BUFFER);

        let shared = Arc::new(Shared {
            next_stream_id: AtomicU64::new(1),
            streams: DashMap::new(),
            outbound,
            closed: CancellationToken::new(),
            close_reason: Mutex::new(None),
        });

        let writer = shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer.closed.cancelled() => break,
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = sink.send(frame).await {
                            writer.close(&e.to_string());
                            break;
                        }
                    }
                }
            }
            let _ = sink.close().await;
            trace!("[Bridge] Client writer stopped");
        });

        let reader = shared.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = reader.closed.cancelled() => break,
                    next = source.next() => next,
                };
                match next {
                    Some(Ok(frame)) => route_inbound(&reader, frame),
                    Some(Err(e)) => {
                        reader.close(&e.to_string());
                        break;
                    }
                    None => {
                        reader.close("connection closed by peer");
                        break;
                    }
                }
            }
            reader.fail_all_streams();
            debug!(reason = %reader.reason(), "[Bridge] Client connection closed");
        });

        let owner = Arc::new(Owner(shared.clone()));
        Self { shared, owner }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Resolves when the connection has ended.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await
    }

    /// Close the connection; open streams end with a transport failure.
    pub fn close(&self) {
        self.shared.close("connection closed by client");
    }

    pub fn open_streams(&self) -> usize {
        self.shared.streams.len()
    }

    /// Open a stream by sending `Open { method, payload }`.
    pub async fn open(&self, method: &str, payload: Value) -> Result<ClientStream, RpcError> {
        let shared = &self.shared;
        let stream_id = shared.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        shared.streams.insert(stream_id, tx);

        // Re-check after inserting: a concurrent close has either seen the
        // entry or already cancelled the token.
        if shared.closed.is_cancelled() {
            shared.streams.remove(&stream_id);
            return Err(RpcError::TransportUnavailable(shared.reason()));
        }

        let frame = Frame::new(
            stream_id,
            FrameBody::Open {
                method: method.to_string(),
                payload,
            },
        );
        if shared.outbound.send(frame).await.is_err() {
            shared.streams.remove(&stream_id);
            return Err(RpcError::TransportUnavailable(shared.reason()));
        }
        trace!(stream_id, method, "[Bridge] Stream opened");

        Ok(ClientStream {
            stream_id,
            rx,
            shared: shared.clone(),
            _owner: self.owner.clone(),
            finished: false,
        })
    }

    /// Call a method that answers with exactly one item.
    pub async fn unary<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.unary_cancellable(method, request, &CancellationToken::new())
            .await
    }

    /// Like [`Self::unary`]; cancelling `cancel` sends `Cancel` to the server
    /// and returns `RpcError::Cancelled`.
    pub async fn unary_cancellable<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let mut stream = self.open(method, payload).await?;
        let mut reply = None;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => None,
                event = stream.recv() => Some(event),
            };
            let Some(event) = event else {
                stream.cancel().await;
                return Err(RpcError::Cancelled);
            };

            match event {
                Some(StreamEvent::Item(value)) => {
                    if reply.is_some() {
                        return Err(RpcError::Protocol(format!(
                            "{method} returned more than one item"
                        )));
                    }
                    reply = Some(value);
                }
                Some(StreamEvent::End(StreamEnd::Done)) | None => break,
                Some(StreamEvent::End(StreamEnd::Failed(err))) => return Err(err),
            }
        }

        let value =
            reply.ok_or_else(|| RpcError::Protocol(format!("{method} returned no reply")))?;
        Ok(serde_json::from_value(value)?)
    }
}

fn route_inbound(shared: &Shared, frame: Frame) {
    let stream_id = frame.stream_id;
    match frame.body {
        FrameBody::Item(value) => {
            let tx = shared.streams.get(&stream_id).map(|entry| entry.clone());
            let Some(tx) = tx else {
                trace!(stream_id, "[Bridge] Item for unknown stream dropped");
                return;
            };
            match tx.try_send(StreamEvent::Item(value)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    shared.streams.remove(&stream_id);
                }
                Err(mpsc::error::TrySendError::Full(_)) => overflow(shared, stream_id),
            }
        }
        FrameBody::End => {
            if let Some((_, tx)) = shared.streams.remove(&stream_id) {
                deliver_end(tx, StreamEnd::Done);
            }
        }
        FrameBody::Failure(err) => {
            if let Some((_, tx)) = shared.streams.remove(&stream_id) {
                deliver_end(tx, StreamEnd::Failed(RpcError::Remote(err)));
            }
        }
        FrameBody::Open { .. } | FrameBody::Cancel => {
            warn!(stream_id, "[Bridge] Server sent a client-only frame, ignoring");
        }
    }
}

/// Detach a stream whose consumer stopped keeping up.
fn overflow(shared: &Shared, stream_id: u64) {
    let Some((_, tx)) = shared.streams.remove(&stream_id) else {
        return;
    };
    warn!(stream_id, buffered = STREAM_BUFFER, "[Bridge] Stream consumer too slow, detaching");
    deliver_end(
        tx,
        StreamEnd::Failed(RpcError::TransportUnavailable(format!(
            "stream {stream_id} fell more than {STREAM_BUFFER} items behind"
        ))),
    );

    let cancel = Frame::new(stream_id, FrameBody::Cancel);
    if let Err(mpsc::error::TrySendError::Full(cancel)) = shared.outbound.try_send(cancel) {
        let outbound = shared.outbound.clone();
        tokio::spawn(async move {
            let _ = outbound.send(cancel).await;
        });
    }
}

/// Receiving side of one stream.
///
/// Dropping it detaches the stream locally without telling the server.
pub struct ClientStream {
    stream_id: u64,
    rx: mpsc::Receiver<StreamEvent>,
    shared: Arc<Shared>,
    _owner: Arc<Owner>,
    finished: bool,
}

impl ClientStream {
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Next event; `None` once the terminal `End` has been returned.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        let event = match self.rx.recv().await {
            Some(event) => event,
            None => StreamEvent::End(StreamEnd::Failed(RpcError::TransportUnavailable(
                self.shared.reason(),
            ))),
        };
        if matches!(event, StreamEvent::End(_)) {
            self.finished = true;
        }
        Some(event)
    }

    /// Ask the server to stop the handler behind this stream.
    pub async fn cancel(mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.shared.streams.remove(&self.stream_id);
        let _ = self
            .shared
            .outbound
            .send(Frame::new(self.stream_id, FrameBody::Cancel))
            .await;
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        self.shared.streams.remove(&self.stream_id);
    }
}
