//! Common test utilities shared across integration tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use certrotate_core::{
    CertificateStatus, InMemoryRegistry, PublishError, Publisher, ResponseNotifier,
    ResponsePayload, RotationService,
};

pub const RESULT_PREFIX: &str = "certificate/rotation/result/";

pub const CSR: &str = "-----BEGIN CERTIFICATE REQUEST-----
MIICvDCCAaQCAQAwdzELMAkGA1UEBhMCVVMxDTALBgNVBAgMBFV0YWgxDzANBgNV
-----END CERTIFICATE REQUEST-----";

/// A published message as seen by the bus.
#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub qos: u8,
    pub payload: ResponsePayload,
}

#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<Published>>,
    fail: Mutex<bool>,
}

impl RecordingPublisher {
    pub fn messages(&self) -> Vec<Published> {
        self.messages.lock().unwrap().clone()
    }

    #[allow(dead_code, reason = "used in tests")]
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, qos: u8, payload: Vec<u8>) -> Result<(), PublishError> {
        let payload = serde_json::from_slice(&payload).map_err(|e| PublishError::Serialization {
            error: e.to_string(),
        })?;
        self.messages.lock().unwrap().push(Published {
            topic: topic.to_string(),
            qos,
            payload,
        });
        if *self.fail.lock().unwrap() {
            return Err(PublishError::Network {
                url: "memory://bus".to_string(),
                status: Some(503),
                error: "bus unavailable".to_string(),
            });
        }
        Ok(())
    }
}

pub struct Harness {
    pub registry: Arc<InMemoryRegistry>,
    pub publisher: Arc<RecordingPublisher>,
    pub service: RotationService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_registry(InMemoryRegistry::new())
    }

    pub fn with_registry(registry: InMemoryRegistry) -> Self {
        let registry = Arc::new(registry);
        let publisher = Arc::new(RecordingPublisher::default());
        let notifier = ResponseNotifier::new(publisher.clone(), RESULT_PREFIX, 1);
        let service = RotationService::new(registry.clone(), notifier);
        Self {
            registry,
            publisher,
            service,
        }
    }

    /// Registers an active certificate bound to the given policies and things.
    pub async fn seed_device(
        &self,
        certificate_id: &str,
        policies: &[&str],
        things: &[&str],
    ) -> String {
        use certrotate_core::Registry;

        let arn = self
            .registry
            .register_certificate(certificate_id, CertificateStatus::Active);
        for policy in policies {
            self.registry.create_policy(policy);
            self.registry.attach_policy(policy, &arn).await.unwrap();
        }
        for thing in things {
            self.registry.create_thing(thing);
            self.registry.attach_thing_principal(thing, &arn).await.unwrap();
        }
        arn
    }
}

/// A 64 character certificate id made of one repeated hex digit.
pub fn certificate_id(digit: char) -> String {
    digit.to_string().repeat(64)
}
