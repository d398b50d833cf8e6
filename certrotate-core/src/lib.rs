//! Zero-downtime rotation of a device's X.509 certificate while it stays
//! connected to a managed message bus.
//!
//! Rotation runs in three independently invoked phases. Each phase gets its
//! correlation state from the inbound event (the authenticating certificate
//! and the ids the device carries forward), never from memory of a previous
//! phase:
//!
//! 1. **Issue**: create a certificate from the device's CSR, pending
//!    activation, and bind it to every policy and thing the current
//!    certificate is bound to.
//! 2. **Activate**: activate the new certificate once the device has it.
//! 3. **Deactivate**: deactivate the old certificate, but never the one the
//!    request authenticated with.
//!
//! Every outcome is published to the device on `certificate/rotation/result/<clientId>`.
//!
//! ```rust,no_run
//! use certrotate_core::{RotationConfig, RotationService};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RotationConfig::for_region(
//!     "eu-west-1",
//!     "https://a1b2c3-ats.iot.eu-west-1.amazonaws.com",
//! );
//! let service = RotationService::from_config(&config)?;
//!
//! let event = json!({
//!     "principal": "4f1e0a6a6f3b7d3c2e9a0d8f5b6c7a1e2d3f4a5b6c7d8e9f0a1b2c3d4e5f6a7b",
//!     "clientId": "sensor-42",
//!     "response": { "csr": "-----BEGIN CERTIFICATE REQUEST-----\n..." },
//! });
//! service
//!     .handle_topic("certificate/rotation/attach/sensor-42", &event)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod certificate;
pub use certificate::{CertificateDescription, CertificateStatus, IssuedCertificate};

pub mod config;
pub use config::{NotifierConfig, RegistryConfig, RotationConfig};

mod error;
pub use error::*;

pub mod notifier;
pub use notifier::{HttpPublisher, Publisher, ResponseNotifier};

pub mod registry;
pub use registry::{HttpRegistry, InMemoryRegistry, Registry};

pub mod request;
pub use request::{ActivateRequest, DeactivateRequest, IssueRequest};

pub mod response;
pub use response::{ResponsePayload, RotationSuccess};

pub mod rotation;
pub use rotation::{RotationOperation, RotationService};

// private modules
mod http_request;
