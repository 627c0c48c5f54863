//! # Capability Contracts
//!
//! Two contracts cover every capability kind:
//!
//! - [`TriggerCapability`]: long-lived subscriptions that push events
//! - [`ExecutableCapability`]: the callback contract shared by actions,
//!   consensus steps and targets, distinguished only by
//!   [`CapabilityInfo::capability_type`]
//!
//! [`Capability`] is the closed set of shapes a registry can publish.
//! Adding a shape is a compile error at every `match` until handled.
//!
//! ## Example Implementation
//!
//! ```rust,ignore
//! use shared_types::{BaseCapability, ExecutableCapability, CapabilityInfo};
//! use async_trait::async_trait;
//!
//! struct Echo { info: CapabilityInfo }
//!
//! #[async_trait]
//! impl BaseCapability for Echo {
//!     async fn info(&self) -> Result<CapabilityInfo, CapabilityError> { Ok(self.info.clone()) }
//! }
//!
//! #[async_trait]
//! impl ExecutableCapability for Echo {
//!     async fn execute(&self, req: CapabilityRequest) -> Result<CapabilityResponse, CapabilityError> {
//!         Ok(CapabilityResponse::new(req.inputs))
//!     }
//! }
//! ```

use crate::entities::{CapabilityInfo, CapabilityType};
use crate::errors::{CapabilityError, ErrorCode};
use crate::messages::{
    AckEventRequest, CapabilityRequest, CapabilityResponse, RegistrationRequest,
    TriggerRegistrationRequest, TriggerResponse,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Buffer size of trigger response channels.
pub const TRIGGER_CHANNEL_CAPACITY: usize = 1000;

/// Contract shared by every capability.
#[async_trait]
pub trait BaseCapability: Send + Sync {
    /// Describe the capability.
    async fn info(&self) -> Result<CapabilityInfo, CapabilityError>;
}

/// A capability that pushes events to subscribers.
#[async_trait]
pub trait TriggerCapability: BaseCapability {
    /// Subscribe a workflow trigger.
    ///
    /// The returned channel yields responses in emission order and is closed
    /// by the capability when the subscription ends.
    async fn register_trigger(
        &self,
        request: TriggerRegistrationRequest,
    ) -> Result<mpsc::Receiver<TriggerResponse>, CapabilityError>;

    /// Release everything allocated by [`Self::register_trigger`].
    async fn unregister_trigger(
        &self,
        request: TriggerRegistrationRequest,
    ) -> Result<(), CapabilityError>;

    /// Confirm that a workflow received an event.
    ///
    /// Triggers without delivery guarantees accept and ignore acks.
    async fn ack_event(&self, _request: AckEventRequest) -> Result<(), CapabilityError> {
        Ok(())
    }
}

/// The callback contract of action, consensus and target capabilities.
#[async_trait]
pub trait ExecutableCapability: BaseCapability {
    /// Called once when a workflow using this capability is deployed.
    async fn register_to_workflow(&self, _request: RegistrationRequest) -> Result<(), CapabilityError> {
        Ok(())
    }

    /// Called once when a workflow using this capability is removed.
    async fn unregister_from_workflow(
        &self,
        _request: RegistrationRequest,
    ) -> Result<(), CapabilityError> {
        Ok(())
    }

    /// Run one step.
    async fn execute(&self, request: CapabilityRequest) -> Result<CapabilityResponse, CapabilityError>;
}

/// A capability in one of the shapes that can be published.
#[derive(Clone)]
pub enum Capability {
    Trigger(Arc<dyn TriggerCapability>),
    Executable(Arc<dyn ExecutableCapability>),
    /// Both contracts, backed by the same instance.
    Combined {
        trigger: Arc<dyn TriggerCapability>,
        executable: Arc<dyn ExecutableCapability>,
    },
}

impl Capability {
    pub fn trigger<C: TriggerCapability + 'static>(capability: Arc<C>) -> Self {
        Self::Trigger(capability)
    }

    pub fn executable<C: ExecutableCapability + 'static>(capability: Arc<C>) -> Self {
        Self::Executable(capability)
    }

    pub fn combined<C>(capability: Arc<C>) -> Self
    where
        C: TriggerCapability + ExecutableCapability + 'static,
    {
        Self::Combined {
            trigger: capability.clone(),
            executable: capability,
        }
    }

    /// Describe the underlying capability.
    pub async fn info(&self) -> Result<CapabilityInfo, CapabilityError> {
        match self {
            Self::Trigger(trigger) => trigger.info().await,
            Self::Executable(executable) => executable.info().await,
            Self::Combined { trigger, .. } => trigger.info().await,
        }
    }

    /// Short name of the shape, for logs.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Trigger(_) => "trigger",
            Self::Executable(_) => "executable",
            Self::Combined { .. } => "combined",
        }
    }

    /// Whether a capability reporting `capability_type` may use this shape.
    pub fn accepts(&self, capability_type: CapabilityType) -> bool {
        match self {
            Self::Trigger(_) => capability_type == CapabilityType::Trigger,
            Self::Executable(_) => matches!(
                capability_type,
                CapabilityType::Action | CapabilityType::Consensus | CapabilityType::Target
            ),
            Self::Combined { .. } => capability_type == CapabilityType::Combined,
        }
    }

    /// Fail unless `info` is compatible with this shape.
    pub fn check_info(&self, info: &CapabilityInfo) -> Result<(), CapabilityError> {
        if self.accepts(info.capability_type) {
            return Ok(());
        }
        Err(CapabilityError::public_user(
            ErrorCode::InvalidArgument,
            format!(
                "capability {} reports type {} which cannot be served as {}",
                info.id,
                info.capability_type,
                self.shape()
            ),
        ))
    }

    pub fn as_trigger(&self) -> Option<&Arc<dyn TriggerCapability>> {
        match self {
            Self::Trigger(trigger) | Self::Combined { trigger, .. } => Some(trigger),
            Self::Executable(_) => None,
        }
    }

    pub fn as_executable(&self) -> Option<&Arc<dyn ExecutableCapability>> {
        match self {
            Self::Executable(executable) | Self::Combined { executable, .. } => Some(executable),
            Self::Trigger(_) => None,
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Capability").field(&self.shape()).finish()
    }
}
