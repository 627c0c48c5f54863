//! # RPC Server
//!
//! `serve_connection` drives the server half of one connection. Each `Open`
//! frame spawns a handler task running [`RpcService::call`]; the handler
//! writes items through its [`Responder`] and its return value becomes the
//! terminal frame (`End` on `Ok`, `Failure` on `Err`).
//!
//! Every handler gets a cancellation token that fires on a `Cancel` frame
//! for its stream, when the connection ends, or when the endpoint shuts
//! down. Long-running handlers must select over it.

use crate::errors::RpcError;
use crate::transport::frame::{Frame, FrameBody, FrameCodec};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use shared_types::CapabilityError;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const OUTBOUND_BUFFER: usize = 256;

/// A service reachable over the bridge.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    /// Handle one stream. Items go out through `call.responder`.
    async fn call(&self, call: InboundCall) -> Result<(), CapabilityError>;
}

/// One opened stream, as seen by the server.
pub struct InboundCall {
    pub method: String,
    pub payload: Value,
    pub responder: Responder,
    /// Fires on client `Cancel`, disconnect or endpoint shutdown.
    pub cancelled: CancellationToken,
}

/// Writes items onto one stream.
#[derive(Clone)]
pub struct Responder {
    stream_id: u64,
    outbound: mpsc::Sender<Frame>,
    connection: CancellationToken,
    call: CancellationToken,
}

impl Responder {
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Queue one item. Fails once the connection is gone or the stream
    /// was cancelled.
    pub async fn send<T: Serialize + ?Sized>(&self, item: &T) -> Result<(), RpcError> {
        let value = serde_json::to_value(item)?;
        let frame = Frame::new(self.stream_id, FrameBody::Item(value));
        tokio::select! {
            _ = self.connection.cancelled() => {
                Err(RpcError::TransportUnavailable("connection closed".into()))
            }
            _ = self.call.cancelled() => Err(RpcError::Cancelled),
            sent = self.outbound.send(frame) => sent
                .map_err(|_| RpcError::TransportUnavailable("connection closed".into())),
        }
    }

    async fn finish(&self, body: FrameBody) {
        let frame = Frame::new(self.stream_id, body);
        tokio::select! {
            _ = self.connection.cancelled() => {}
            _ = self.outbound.send(frame) => {}
        }
    }
}

/// Serve one connection until the peer disconnects or `shutdown` fires.
pub async fn serve_connection<T>(io: T, service: Arc<dyn RpcService>, shutdown: CancellationToken)
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut sink, mut source) = Framed::new(io, FrameCodec::new()).split();
    let (outbound, mut outbound_rx) = mpsc::channel::<Frame>(OUTBOUND_BUFFER);
    let connection = shutdown.child_token();
    let calls: Arc<DashMap<u64, CancellationToken>> = Arc::new(DashMap::new());

    let writer_token = connection.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_token.cancelled() => break,
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = sink.send(frame).await {
                        debug!(error = %e, "[Bridge] Server write failed");
                        writer_token.cancel();
                        break;
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    loop {
        let next = tokio::select! {
            _ = connection.cancelled() => break,
            next = source.next() => next,
        };
        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!(error = %e, "[Bridge] Dropping connection after bad frame");
                break;
            }
            None => break,
        };

        let stream_id = frame.stream_id;
        match frame.body {
            FrameBody::Open { method, payload } => {
                let cancelled = connection.child_token();
                if calls.insert(stream_id, cancelled.clone()).is_some() {
                    warn!(stream_id, "[Bridge] Stream id reused by client");
                }
                let call = InboundCall {
                    method,
                    payload,
                    responder: Responder {
                        stream_id,
                        outbound: outbound.clone(),
                        connection: connection.clone(),
                        call: cancelled.clone(),
                    },
                    cancelled,
                };
                let service = service.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    let responder = call.responder.clone();
                    let result = service.call(call).await;
                    calls.remove(&stream_id);
                    let body = match result {
                        Ok(()) => FrameBody::End,
                        Err(err) => FrameBody::Failure(err),
                    };
                    responder.finish(body).await;
                });
            }
            FrameBody::Cancel => {
                if let Some((_, token)) = calls.remove(&stream_id) {
                    trace!(stream_id, "[Bridge] Stream cancelled by client");
                    token.cancel();
                }
            }
            FrameBody::Item(_) | FrameBody::End | FrameBody::Failure(_) => {
                warn!(stream_id, "[Bridge] Client sent a server-only frame, ignoring");
            }
        }
    }

    // Stops the writer and every handler of this connection.
    connection.cancel();
    let _ = writer.await;
    debug!("[Bridge] Server connection closed");
}
