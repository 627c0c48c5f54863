//! # Base Trigger Capability
//!
//! A ready-made `TriggerCapability` whose events go through the reliable
//! delivery engine. Concrete triggers (cron, heartbeat, log watchers) hold
//! one and call [`BaseTriggerCapability::fire`] whenever they produce an
//! event; fan-out, persistence, retransmission and acks are handled here.
//!
//! Each registration is keyed by its `trigger_id` and bound to the workflow
//! named in its metadata. Unregistering detaches the subscriber sink, which
//! closes the subscriber's channel.

use crate::adapters::sink::ChannelSink;
use crate::domain::errors::DeliveryError;
use crate::service::engine::ReliableDeliveryEngine;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{
    AckEventRequest, BaseCapability, CapabilityError, CapabilityInfo, ErrorCode, TriggerCapability,
    TriggerEvent, TriggerRegistrationRequest, TriggerResponse, TRIGGER_CHANNEL_CAPACITY,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct BaseTriggerCapability {
    info: CapabilityInfo,
    engine: Arc<ReliableDeliveryEngine>,
    /// trigger_id -> workflow_id
    registrations: RwLock<HashMap<String, String>>,
}

impl BaseTriggerCapability {
    /// Fails unless `info` describes a trigger (or combined) capability.
    pub fn new(
        info: CapabilityInfo,
        engine: Arc<ReliableDeliveryEngine>,
    ) -> Result<Self, CapabilityError> {
        if !info.capability_type.is_trigger() {
            return Err(CapabilityError::public_user(
                ErrorCode::InvalidArgument,
                format!(
                    "capability {} has type {}, expected a trigger",
                    info.id, info.capability_type
                ),
            ));
        }
        Ok(Self {
            info,
            engine,
            registrations: RwLock::new(HashMap::new()),
        })
    }

    pub fn engine(&self) -> &Arc<ReliableDeliveryEngine> {
        &self.engine
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.read().len()
    }

    /// Hand `event` to every current registration.
    ///
    /// Every registration is attempted even when one of them fails. Returns
    /// the number of registrations the event was persisted for, or the
    /// first failure once all of them have been tried.
    pub async fn fire(&self, event: TriggerEvent) -> Result<usize, DeliveryError> {
        let targets: Vec<(String, String)> = self
            .registrations
            .read()
            .iter()
            .map(|(t, w)| (t.clone(), w.clone()))
            .collect();

        let mut delivered = 0;
        let mut first_failure = None;
        for (trigger_id, workflow_id) in &targets {
            match self
                .engine
                .deliver_event(trigger_id, event.clone(), std::slice::from_ref(workflow_id))
                .await
            {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(
                        capability_id = %self.info.id,
                        trigger_id = %trigger_id,
                        event_id = %event.id,
                        error = %err,
                        "[Delivery] Fire failed for registration"
                    );
                    first_failure.get_or_insert(err);
                }
            }
        }
        debug!(
            capability_id = %self.info.id,
            event_id = %event.id,
            registrations = targets.len(),
            delivered,
            "[Delivery] Trigger fired"
        );
        match first_failure {
            Some(err) => Err(err),
            None => Ok(delivered),
        }
    }

    /// Hand `event` to a single registration.
    pub async fn fire_to(&self, trigger_id: &str, event: TriggerEvent) -> Result<(), CapabilityError> {
        let workflow_id = self.registrations.read().get(trigger_id).cloned();
        let Some(workflow_id) = workflow_id else {
            return Err(CapabilityError::public_user(
                ErrorCode::NotFound,
                format!("trigger {trigger_id} is not registered"),
            ));
        };
        self.engine
            .deliver_event(trigger_id, event, &[workflow_id])
            .await
            .map_err(CapabilityError::from)
    }
}

#[async_trait]
impl BaseCapability for BaseTriggerCapability {
    async fn info(&self) -> Result<CapabilityInfo, CapabilityError> {
        Ok(self.info.clone())
    }
}

#[async_trait]
impl TriggerCapability for BaseTriggerCapability {
    async fn register_trigger(
        &self,
        request: TriggerRegistrationRequest,
    ) -> Result<mpsc::Receiver<TriggerResponse>, CapabilityError> {
        if request.trigger_id.is_empty() {
            return Err(CapabilityError::public_user(
                ErrorCode::InvalidArgument,
                "trigger id must not be empty",
            ));
        }
        let workflow_id = request.metadata.workflow_id.clone();
        {
            let mut registrations = self.registrations.write();
            if registrations.contains_key(&request.trigger_id) {
                return Err(CapabilityError::public_user(
                    ErrorCode::AlreadyExists,
                    format!("trigger {} is already registered", request.trigger_id),
                ));
            }
            registrations.insert(request.trigger_id.clone(), workflow_id.clone());
        }

        let (tx, rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
        self.engine
            .register(&request.trigger_id, &workflow_id, Arc::new(ChannelSink::new(tx)))
            .await;

        info!(
            capability_id = %self.info.id,
            trigger_id = %request.trigger_id,
            workflow_id = %workflow_id,
            "[Delivery] Trigger registered"
        );
        Ok(rx)
    }

    async fn unregister_trigger(
        &self,
        request: TriggerRegistrationRequest,
    ) -> Result<(), CapabilityError> {
        let removed = self.registrations.write().remove(&request.trigger_id);
        if let Some(workflow_id) = removed {
            self.engine.unregister(&request.trigger_id, &workflow_id);
            info!(
                capability_id = %self.info.id,
                trigger_id = %request.trigger_id,
                "[Delivery] Trigger unregistered"
            );
        }
        Ok(())
    }

    async fn ack_event(&self, request: AckEventRequest) -> Result<(), CapabilityError> {
        self.engine
            .ack_event(&request.trigger_id, &request.workflow_id, &request.event_id)
            .await
            .map_err(CapabilityError::from)
    }
}
