//! # Capability Server
//!
//! Exposes one [`Capability`] as an [`RpcService`].
//!
//! ## Trigger streams
//!
//! After the capability accepts a registration the handler pumps its
//! response channel onto the stream until one of:
//!
//! - the capability closes the channel (stream ends with `End`)
//! - an `UnregisterTrigger` call for the same trigger id
//! - the connection ends (peer crash, client close, endpoint shutdown)
//!
//! Whatever the cause, `unregister_trigger` is then called exactly once
//! with the original registration request.

use crate::capability::wire::{
    ExecuteReply, TriggerStreamItem, METHOD_ACK_EVENT, METHOD_EXECUTE, METHOD_INFO,
    METHOD_REGISTER_TO_WORKFLOW, METHOD_REGISTER_TRIGGER, METHOD_UNREGISTER_FROM_WORKFLOW,
    METHOD_UNREGISTER_TRIGGER,
};
use crate::transport::{InboundCall, RpcService};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared_types::metrics::names;
use shared_types::{
    AckEventRequest, Capability, CapabilityError, CapabilityRequest, ErrorCode,
    ExecutableCapability, MetricsSink, NoopMetrics, RegistrationRequest, TriggerCapability,
    TriggerRegistrationRequest, TriggerResponse,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerOptions {
    /// Serialise errors for a remote peer: private messages are replaced
    /// by the redaction text. Enable on bridges that cross node boundaries.
    pub redact_private_errors: bool,
}

struct ActiveTrigger {
    registration: u64,
    stop: CancellationToken,
    released: CancellationToken,
}

pub struct CapabilityService {
    capability: Capability,
    options: ServerOptions,
    metrics: Arc<dyn MetricsSink>,
    active_triggers: DashMap<String, ActiveTrigger>,
    next_registration: AtomicU64,
}

impl CapabilityService {
    pub fn new(capability: Capability, options: ServerOptions) -> Self {
        Self {
            capability,
            options,
            metrics: NoopMetrics::shared(),
            active_triggers: DashMap::new(),
            next_registration: AtomicU64::new(1),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Trigger ids with a live stream on this server.
    pub fn active_trigger_count(&self) -> usize {
        self.active_triggers.len()
    }

    fn outgoing(&self, err: CapabilityError) -> CapabilityError {
        if self.options.redact_private_errors {
            err.redacted()
        } else {
            err
        }
    }

    fn trigger(&self) -> Result<&Arc<dyn TriggerCapability>, CapabilityError> {
        self.capability.as_trigger().ok_or_else(|| {
            CapabilityError::public_user(
                ErrorCode::Unimplemented,
                format!("{} capability does not accept trigger calls", self.capability.shape()),
            )
        })
    }

    fn executable(&self) -> Result<&Arc<dyn ExecutableCapability>, CapabilityError> {
        self.capability.as_executable().ok_or_else(|| {
            CapabilityError::public_user(
                ErrorCode::Unimplemented,
                format!("{} capability does not accept execute calls", self.capability.shape()),
            )
        })
    }

    async fn dispatch(&self, call: InboundCall) -> Result<(), CapabilityError> {
        match call.method.as_str() {
            METHOD_INFO => {
                let info = self.capability.info().await?;
                reply(&call, &info).await
            }
            METHOD_EXECUTE => self.execute(call).await,
            METHOD_REGISTER_TRIGGER => self.register_trigger(call).await,
            METHOD_UNREGISTER_TRIGGER => self.unregister_trigger(call).await,
            METHOD_ACK_EVENT => {
                let request: AckEventRequest = decode(&call.payload)?;
                self.trigger()?.ack_event(request).await?;
                reply(&call, &()).await
            }
            METHOD_REGISTER_TO_WORKFLOW => {
                let request: RegistrationRequest = decode(&call.payload)?;
                self.executable()?.register_to_workflow(request).await?;
                reply(&call, &()).await
            }
            METHOD_UNREGISTER_FROM_WORKFLOW => {
                let request: RegistrationRequest = decode(&call.payload)?;
                self.executable()?.unregister_from_workflow(request).await?;
                reply(&call, &()).await
            }
            other => Err(CapabilityError::public_system(
                ErrorCode::Unimplemented,
                format!("unknown method {other}"),
            )),
        }
    }

    async fn execute(&self, call: InboundCall) -> Result<(), CapabilityError> {
        let request: CapabilityRequest = decode(&call.payload)?;
        let executable = self.executable()?;

        let result = tokio::select! {
            _ = call.cancelled.cancelled() => {
                debug!(workflow_id = %request.metadata.workflow_id, "[Bridge] Execute cancelled");
                return Ok(());
            }
            result = executable.execute(request.clone()) => result,
        };
        let reply_item = ExecuteReply::from_result(result.map_err(|e| self.outgoing(e)));
        reply(&call, &reply_item).await
    }

    async fn register_trigger(&self, call: InboundCall) -> Result<(), CapabilityError> {
        let request: TriggerRegistrationRequest = decode(&call.payload)?;
        let trigger = self.trigger()?.clone();
        let trigger_id = request.trigger_id.clone();

        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let stop = CancellationToken::new();
        let released = CancellationToken::new();
        match self.active_triggers.entry(trigger_id.clone()) {
            Entry::Occupied(_) => {
                return Err(CapabilityError::public_user(
                    ErrorCode::AlreadyExists,
                    format!("trigger {trigger_id} is already registered"),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(ActiveTrigger {
                    registration,
                    stop: stop.clone(),
                    released: released.clone(),
                });
            }
        }

        let mut responses = match trigger.register_trigger(request.clone()).await {
            Ok(rx) => rx,
            Err(err) => {
                self.release(&trigger_id, registration, &released);
                return Err(err);
            }
        };
        info!(trigger_id = %trigger_id, "[Bridge] Trigger stream opened");

        let mut open = pump_item(&call, &stop, &TriggerStreamItem::Registered).await;
        while open {
            let next = tokio::select! {
                _ = call.cancelled.cancelled() => break,
                _ = stop.cancelled() => break,
                next = responses.recv() => next,
            };
            let Some(response) = next else { break };
            let response = match response {
                TriggerResponse::Error(err) => TriggerResponse::Error(self.outgoing(err)),
                event => event,
            };
            open = pump_item(&call, &stop, &TriggerStreamItem::Response(response)).await;
        }
        drop(responses);

        if let Err(err) = trigger.unregister_trigger(request).await {
            warn!(trigger_id = %trigger_id, error = %err, "[Bridge] UnregisterTrigger after stream end failed");
        }
        self.release(&trigger_id, registration, &released);
        info!(trigger_id = %trigger_id, "[Bridge] Trigger stream closed");
        Ok(())
    }

    fn release(&self, trigger_id: &str, registration: u64, released: &CancellationToken) {
        self.active_triggers
            .remove_if(trigger_id, |_, active| active.registration == registration);
        released.cancel();
    }

    async fn unregister_trigger(&self, call: InboundCall) -> Result<(), CapabilityError> {
        let request: TriggerRegistrationRequest = decode(&call.payload)?;
        let active = self
            .active_triggers
            .get(&request.trigger_id)
            .map(|active| (active.stop.clone(), active.released.clone()));

        match active {
            Some((stop, released)) => {
                // The stream handler performs the capability-side release.
                stop.cancel();
                tokio::select! {
                    _ = released.cancelled() => {}
                    _ = call.cancelled.cancelled() => return Ok(()),
                }
            }
            None => {
                self.trigger()?.unregister_trigger(request).await?;
            }
        }
        reply(&call, &()).await
    }
}

#[async_trait]
impl RpcService for CapabilityService {
    async fn call(&self, call: InboundCall) -> Result<(), CapabilityError> {
        let method = call.method.clone();
        let started = Instant::now();
        let result = self.dispatch(call).await;

        let labels = [("method", method.as_str())];
        self.metrics.increment(names::RPC_CALLS, &labels);
        self.metrics
            .observe(names::RPC_CALL_DURATION, &labels, started.elapsed().as_secs_f64());
        result.map_err(|err| {
            self.metrics.increment(names::RPC_CALL_FAILURES, &labels);
            debug!(method = %method, error = %err, "[Bridge] Call failed");
            self.outgoing(err)
        })
    }
}

/// Write one trigger item unless the stream is stopped first. Returns
/// whether the stream is still open.
async fn pump_item(call: &InboundCall, stop: &CancellationToken, item: &TriggerStreamItem) -> bool {
    tokio::select! {
        _ = call.cancelled.cancelled() => false,
        _ = stop.cancelled() => false,
        sent = call.responder.send(item) => sent.is_ok(),
    }
}

fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T, CapabilityError> {
    serde_json::from_value(payload.clone()).map_err(|e| {
        CapabilityError::public_user(
            ErrorCode::InvalidArgument,
            format!("malformed request payload: {e}"),
        )
    })
}

async fn reply<T: serde::Serialize + ?Sized>(
    call: &InboundCall,
    item: &T,
) -> Result<(), CapabilityError> {
    call.responder.send(item).await.map_err(CapabilityError::from)
}
