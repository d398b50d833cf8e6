//! Best-effort delivery of rotation results to the requesting device.
//!
//! Registry calls retry and then surface their failure. Publishing is the
//! opposite: one attempt, and a failure is logged and dropped. By the time a
//! result is published the registry side effects have already happened.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, Url};

use crate::config::NotifierConfig;
use crate::error::{ConfigError, PublishError};
use crate::http_request::Request;
use crate::response::ResponsePayload;

/// Delivers a message on a named channel of the message bus.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `payload` on `topic` with the given quality of service.
    ///
    /// # Errors
    /// Returns [`PublishError`] if the bus does not accept the message.
    async fn publish(&self, topic: &str, qos: u8, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Publishes through the message bus data-plane HTTP API, one attempt per message.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    base_url: Url,
    request: Request,
}

impl HttpPublisher {
    /// Creates a publisher from validated configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: &NotifierConfig) -> Result<Self, ConfigError> {
        let base_url = config.validate()?;
        Ok(Self {
            base_url,
            request: Request::new(config.timeout, 1),
        })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, topic: &str, qos: u8, payload: Vec<u8>) -> Result<(), PublishError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| PublishError::Network {
                url: self.base_url.to_string(),
                status: None,
                error: "data endpoint cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(["topics", topic]);
        url.query_pairs_mut().append_pair("qos", &qos.to_string());

        let request_builder = self
            .request
            .req(Method::POST, url)
            .header("Content-Type", "application/json")
            .body(payload);
        let response = self
            .request
            .send_once(request_builder)
            .await
            .map_err(|failure| PublishError::Network {
                url: failure.url,
                status: failure.status,
                error: failure.error,
            })?;

        let status = response.status();
        if !status.is_success() {
            let url = response.url().to_string();
            let error_body = response.text().await.unwrap_or_default();
            return Err(PublishError::Network {
                url,
                status: Some(status.as_u16()),
                error: format!("publish failed: {error_body}"),
            });
        }
        Ok(())
    }
}

/// Channel on which results for `client_id` are published.
#[must_use]
pub fn result_topic(prefix: &str, client_id: &str) -> String {
    format!("{prefix}{client_id}")
}

/// Reports rotation outcomes back to the device on its result channel.
#[derive(Clone)]
pub struct ResponseNotifier {
    publisher: Arc<dyn Publisher>,
    topic_prefix: String,
    qos: u8,
}

impl ResponseNotifier {
    /// Creates a notifier publishing through `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn Publisher>, topic_prefix: impl Into<String>, qos: u8) -> Self {
        Self {
            publisher,
            topic_prefix: topic_prefix.into(),
            qos,
        }
    }

    /// Creates a notifier backed by an [`HttpPublisher`].
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn from_config(config: &NotifierConfig) -> Result<Self, ConfigError> {
        let publisher = HttpPublisher::new(config)?;
        Ok(Self::new(
            Arc::new(publisher),
            config.topic_prefix.clone(),
            config.qos,
        ))
    }

    /// The result channel for `client_id`.
    #[must_use]
    pub fn topic_for(&self, client_id: &str) -> String {
        result_topic(&self.topic_prefix, client_id)
    }

    /// Publishes `payload` to the client's result channel.
    ///
    /// Never fails: without a client id there is no channel to publish on, and
    /// publish failures are only logged.
    pub async fn notify(&self, client_id: Option<&str>, payload: &ResponsePayload) {
        let Some(client_id) = client_id else {
            log::error!("cannot publish rotation result without a client id: {payload:?}");
            return;
        };

        let topic = self.topic_for(client_id);
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = PublishError::Serialization {
                    error: e.to_string(),
                };
                log::error!("raised error {error}. Failed to publish message");
                return;
            }
        };

        log::info!("publishing to topic {topic}");
        if let Err(error) = self.publisher.publish(&topic, self.qos, bytes).await {
            log::error!("raised error {error}. Failed to publish message");
        }
    }
}

impl std::fmt::Debug for ResponseNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseNotifier")
            .field("topic_prefix", &self.topic_prefix)
            .field("qos", &self.qos)
            .finish_non_exhaustive()
    }
}
