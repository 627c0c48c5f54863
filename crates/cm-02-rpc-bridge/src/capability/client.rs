//! # Capability Client
//!
//! Implements the capability contracts by calling a remote
//! [`CapabilityService`](crate::capability::CapabilityService).
//!
//! `register_trigger` returns a local channel fed by a forwarding task:
//!
//! - stream ends cleanly: the channel closes with no trailing error
//! - transport fails: exactly one `TriggerResponse::Error` (code
//!   `Unavailable`), then the channel closes
//! - the caller's token passed to
//!   [`CapabilityClient::register_trigger_with_cancellation`] fires: the
//!   forwarding task stops and the channel closes; the server-side
//!   registration stays alive until an explicit `unregister_trigger`
//!
//! Cancellation is scoped to one call. A cancelled registration or execution
//! leaves the client usable for acks, unregistration and further calls.

use crate::capability::wire::{
    ExecuteReply, TriggerStreamItem, METHOD_ACK_EVENT, METHOD_EXECUTE, METHOD_INFO,
    METHOD_REGISTER_TO_WORKFLOW, METHOD_REGISTER_TRIGGER, METHOD_UNREGISTER_FROM_WORKFLOW,
    METHOD_UNREGISTER_TRIGGER,
};
use crate::errors::RpcError;
use crate::transport::{ClientStream, RpcClient, StreamEnd, StreamEvent};
use async_trait::async_trait;
use shared_types::{
    AckEventRequest, BaseCapability, CapabilityError, CapabilityInfo, CapabilityRequest,
    CapabilityResponse, ErrorCode, ExecutableCapability, RegistrationRequest, TriggerCapability,
    TriggerRegistrationRequest, TriggerResponse, TRIGGER_CHANNEL_CAPACITY,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CapabilityClient {
    rpc: RpcClient,
}

impl CapabilityClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// Close the underlying connection.
    pub fn close(&self) {
        self.rpc.close();
    }

    pub fn is_closed(&self) -> bool {
        self.rpc.is_closed()
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, CapabilityError>
    where
        Req: serde::Serialize + ?Sized,
        Resp: serde::de::DeserializeOwned,
    {
        self.rpc.unary(method, request).await.map_err(CapabilityError::from)
    }

    /// Execute, abandoning the remote call when `cancel` fires.
    pub async fn execute_with_cancellation(
        &self,
        request: CapabilityRequest,
        cancel: &CancellationToken,
    ) -> Result<CapabilityResponse, CapabilityError> {
        let reply: ExecuteReply = self
            .rpc
            .unary_cancellable(METHOD_EXECUTE, &request, cancel)
            .await
            .map_err(CapabilityError::from)?;
        reply.into_result()
    }

    /// Register a trigger whose forwarding stops when `cancel` fires.
    ///
    /// Cancelling only detaches this caller. The server keeps the
    /// registration until `unregister_trigger` is called.
    pub async fn register_trigger_with_cancellation(
        &self,
        request: TriggerRegistrationRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TriggerResponse>, CapabilityError> {
        let payload = serde_json::to_value(&request)
            .map_err(|e| CapabilityError::from(RpcError::from(e)))?;
        let mut stream = self
            .rpc
            .open(METHOD_REGISTER_TRIGGER, payload)
            .await
            .map_err(CapabilityError::from)?;

        // Wait for the server to accept before handing out the channel.
        let first = tokio::select! {
            _ = cancel.cancelled() => None,
            event = stream.recv() => Some(event),
        };
        let Some(first) = first else {
            return Err(RpcError::Cancelled.into());
        };
        match first {
            Some(StreamEvent::Item(value)) => match serde_json::from_value(value) {
                Ok(TriggerStreamItem::Registered) => {}
                Ok(TriggerStreamItem::Response(_)) | Err(_) => {
                    return Err(RpcError::Protocol(
                        "trigger stream did not start with a registration ack".into(),
                    )
                    .into());
                }
            },
            Some(StreamEvent::End(StreamEnd::Failed(err))) => return Err(err.into()),
            Some(StreamEvent::End(StreamEnd::Done)) | None => {
                return Err(RpcError::Protocol("trigger stream ended before registration".into()).into());
            }
        }

        let (tx, rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
        tokio::spawn(forward_trigger_stream(request.trigger_id, stream, tx, cancel));
        Ok(rx)
    }
}

#[async_trait]
impl BaseCapability for CapabilityClient {
    async fn info(&self) -> Result<CapabilityInfo, CapabilityError> {
        self.call(METHOD_INFO, &()).await
    }
}

#[async_trait]
impl TriggerCapability for CapabilityClient {
    async fn register_trigger(
        &self,
        request: TriggerRegistrationRequest,
    ) -> Result<mpsc::Receiver<TriggerResponse>, CapabilityError> {
        self.register_trigger_with_cancellation(request, CancellationToken::new())
            .await
    }

    async fn unregister_trigger(
        &self,
        request: TriggerRegistrationRequest,
    ) -> Result<(), CapabilityError> {
        self.call(METHOD_UNREGISTER_TRIGGER, &request).await
    }

    async fn ack_event(&self, request: AckEventRequest) -> Result<(), CapabilityError> {
        self.call(METHOD_ACK_EVENT, &request).await
    }
}

#[async_trait]
impl ExecutableCapability for CapabilityClient {
    async fn register_to_workflow(&self, request: RegistrationRequest) -> Result<(), CapabilityError> {
        self.call(METHOD_REGISTER_TO_WORKFLOW, &request).await
    }

    async fn unregister_from_workflow(
        &self,
        request: RegistrationRequest,
    ) -> Result<(), CapabilityError> {
        self.call(METHOD_UNREGISTER_FROM_WORKFLOW, &request).await
    }

    async fn execute(&self, request: CapabilityRequest) -> Result<CapabilityResponse, CapabilityError> {
        self.execute_with_cancellation(request, &CancellationToken::new())
            .await
    }
}

/// Republish stream items onto the caller's channel.
async fn forward_trigger_stream(
    trigger_id: String,
    mut stream: ClientStream,
    tx: mpsc::Sender<TriggerResponse>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(trigger_id = %trigger_id, "[Bridge] Trigger forwarding cancelled");
                return;
            }
            event = stream.recv() => event,
        };

        let response = match event {
            Some(StreamEvent::Item(value)) => match serde_json::from_value(value) {
                Ok(TriggerStreamItem::Response(response)) => response,
                Ok(TriggerStreamItem::Registered) => continue,
                Err(e) => {
                    warn!(trigger_id = %trigger_id, error = %e, "[Bridge] Undecodable trigger item");
                    TriggerResponse::Error(RpcError::from(e).into())
                }
            },
            Some(StreamEvent::End(StreamEnd::Done)) | None => {
                debug!(trigger_id = %trigger_id, "[Bridge] Trigger stream completed");
                return;
            }
            Some(StreamEvent::End(StreamEnd::Failed(err))) => {
                debug!(trigger_id = %trigger_id, error = %err, "[Bridge] Trigger stream failed");
                let failure = match err {
                    RpcError::Remote(remote) => remote,
                    other => CapabilityError::public_system(ErrorCode::Unavailable, other.to_string()),
                };
                let _ = tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(TriggerResponse::Error(failure)) => sent,
                };
                return;
            }
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => return,
            sent = tx.send(response) => sent,
        };
        if sent.is_err() {
            debug!(trigger_id = %trigger_id, "[Bridge] Trigger subscriber dropped its channel");
            return;
        }
    }
}
