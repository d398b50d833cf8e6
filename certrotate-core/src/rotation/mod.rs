//! The three phases of certificate rotation.
//!
//! 1. [`issue_and_bind`]: create a pending certificate from the device's CSR
//!    and replicate the old certificate's bindings onto it.
//! 2. [`activate`]: activate it once the device confirms receipt.
//! 3. [`deactivate`]: deactivate the old certificate once the device is
//!    connected with the new one.
//!
//! No state is kept between phases. Each one is reconstructed from the
//! inbound event and the registry.

use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use strum::{Display, EnumString};

use crate::config::RotationConfig;
use crate::error::{ConfigError, RotationError};
use crate::notifier::ResponseNotifier;
use crate::registry::{HttpRegistry, Registry};
use crate::request::{self, ActivateRequest, DeactivateRequest, IssueRequest};
use crate::response::{ResponsePayload, RotationSuccess};

mod activate;
mod deactivate;
mod issue;

pub use activate::activate;
pub use deactivate::deactivate;
pub use issue::{issue_and_bind, list_bindings, replicate_bindings, Bindings};

/// Prefix of the topics devices publish rotation requests on.
pub const REQUEST_TOPIC_PREFIX: &str = "certificate/rotation/";

/// A rotation phase, as named in the device's request topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum RotationOperation {
    /// Issue and bind a new certificate.
    #[strum(serialize = "attach")]
    Issue,
    /// Activate the new certificate.
    #[strum(serialize = "activate")]
    Activate,
    /// Deactivate the old certificate.
    #[strum(serialize = "detach")]
    Deactivate,
}

impl RotationOperation {
    /// Resolves a request topic of the form
    /// `certificate/rotation/<attach|activate|detach>/<client>`.
    ///
    /// # Errors
    /// Returns [`RotationError::InvalidField`] for `topic` if it does not name
    /// a rotation phase.
    pub fn from_topic(topic: &str) -> Result<Self, RotationError> {
        let invalid = |reason: &str| RotationError::InvalidField {
            field: "topic".to_string(),
            reason: format!("{topic} {reason}"),
        };

        let rest = topic
            .strip_prefix(REQUEST_TOPIC_PREFIX)
            .ok_or_else(|| invalid("is not a certificate rotation topic"))?;
        let (operation, client) = rest.split_once('/').unwrap_or((rest, ""));
        if client.is_empty() {
            return Err(invalid("does not name a client"));
        }
        Self::from_str(operation).map_err(|_| invalid("does not name a rotation phase"))
    }

    /// The request topic a client publishes this phase on.
    #[must_use]
    pub fn topic_for(self, client_id: &str) -> String {
        format!("{REQUEST_TOPIC_PREFIX}{self}/{client_id}")
    }
}

/// Runs rotation phases against a registry and reports every outcome to the
/// requesting device.
#[derive(Clone)]
pub struct RotationService {
    registry: Arc<dyn Registry>,
    notifier: ResponseNotifier,
}

impl RotationService {
    /// Creates a service from its collaborators.
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>, notifier: ResponseNotifier) -> Self {
        Self { registry, notifier }
    }

    /// Creates a service talking to the configured HTTP endpoints.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if either endpoint configuration is invalid.
    pub fn from_config(config: &RotationConfig) -> Result<Self, ConfigError> {
        let registry = HttpRegistry::new(&config.registry)?;
        let notifier = ResponseNotifier::from_config(&config.notifier)?;
        Ok(Self::new(Arc::new(registry), notifier))
    }

    /// Handles an issuance request.
    ///
    /// # Errors
    /// Returns the [`RotationError`] that was also published to the device.
    pub async fn handle_issue(&self, event: &Value) -> Result<RotationSuccess, RotationError> {
        let outcome = match IssueRequest::from_event(event) {
            Ok(request) => issue_and_bind(self.registry.as_ref(), &request).await,
            Err(e) => Err(e),
        };
        self.respond(event, "create and attach the new certificate", outcome)
            .await
    }

    /// Handles an activation request.
    ///
    /// # Errors
    /// Returns the [`RotationError`] that was also published to the device.
    pub async fn handle_activate(&self, event: &Value) -> Result<RotationSuccess, RotationError> {
        let outcome = match ActivateRequest::from_event(event) {
            Ok(request) => activate(self.registry.as_ref(), &request).await,
            Err(e) => Err(e),
        };
        self.respond(event, "activate certificate", outcome).await
    }

    /// Handles a deactivation request.
    ///
    /// # Errors
    /// Returns the [`RotationError`] that was also published to the device.
    pub async fn handle_deactivate(
        &self,
        event: &Value,
    ) -> Result<RotationSuccess, RotationError> {
        let outcome = match DeactivateRequest::from_event(event) {
            Ok(request) => deactivate(self.registry.as_ref(), &request).await,
            Err(e) => Err(e),
        };
        self.respond(event, "deactivate certificate", outcome).await
    }

    /// Handles a request for the given phase.
    ///
    /// # Errors
    /// Returns the [`RotationError`] that was also published to the device.
    pub async fn handle(
        &self,
        operation: RotationOperation,
        event: &Value,
    ) -> Result<RotationSuccess, RotationError> {
        match operation {
            RotationOperation::Issue => self.handle_issue(event).await,
            RotationOperation::Activate => self.handle_activate(event).await,
            RotationOperation::Deactivate => self.handle_deactivate(event).await,
        }
    }

    /// Handles a request received on a device request topic.
    ///
    /// # Errors
    /// Returns the [`RotationError`] that was also published to the device,
    /// including the rejection of an unknown topic.
    pub async fn handle_topic(
        &self,
        topic: &str,
        event: &Value,
    ) -> Result<RotationSuccess, RotationError> {
        match RotationOperation::from_topic(topic) {
            Ok(operation) => self.handle(operation, event).await,
            Err(e) => self.respond(event, "route request", Err(e)).await,
        }
    }

    /// Logs the outcome and publishes it exactly once.
    async fn respond(
        &self,
        event: &Value,
        step: &str,
        outcome: Result<RotationSuccess, RotationError>,
    ) -> Result<RotationSuccess, RotationError> {
        if let Err(e) = &outcome {
            if e.is_rejection() {
                log::error!("rejected request: {e}");
            } else {
                log::error!("raised error {e}. Failed to {step}");
            }
        }

        let client_id = request::client_id(event).ok();
        self.notifier
            .notify(client_id.as_deref(), &ResponsePayload::from(&outcome))
            .await;
        outcome
    }
}

impl std::fmt::Debug for RotationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationService")
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}
