//! Endpoints, timeouts and retry settings for the registry and notifier clients.

use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;

/// Total attempts for each registry call, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Prefix of the per-client channel rotation results are published on.
pub const DEFAULT_RESULT_TOPIC_PREFIX: &str = "certificate/rotation/result/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for the identity registry client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Base URL of the registry control-plane API.
    pub endpoint: String,
    /// Timeout applied to each individual HTTP request.
    pub timeout: Duration,
    /// Total attempts per call; transient failures are retried up to this bound.
    pub max_attempts: u32,
    /// Permit plain `http` endpoints (local registries and tests).
    pub allow_insecure_http: bool,
}

impl RegistryConfig {
    /// Registry settings with defaults for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            allow_insecure_http: false,
        }
    }

    /// Checks the endpoint and retry bound.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the endpoint is unusable or `max_attempts` is zero.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(self.max_attempts));
        }
        parse_endpoint(&self.endpoint, self.allow_insecure_http)
    }
}

/// Settings for publishing rotation results back to devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Base URL of the message bus data-plane API.
    pub endpoint: String,
    /// Prefix prepended to the client id to form the result channel.
    pub topic_prefix: String,
    /// Delivery quality level; 1 is at-least-once.
    pub qos: u8,
    /// Timeout for the single publish attempt.
    pub timeout: Duration,
    /// Permit plain `http` endpoints (local brokers and tests).
    pub allow_insecure_http: bool,
}

impl NotifierConfig {
    /// Notifier settings with defaults for the given data endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            topic_prefix: DEFAULT_RESULT_TOPIC_PREFIX.to_string(),
            qos: 1,
            timeout: DEFAULT_TIMEOUT,
            allow_insecure_http: false,
        }
    }

    /// Checks the endpoint and QoS level.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the endpoint is unusable or the QoS is not 0 or 1.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.qos > 1 {
            return Err(ConfigError::InvalidQos(self.qos));
        }
        parse_endpoint(&self.endpoint, self.allow_insecure_http)
    }
}

/// Complete configuration for a rotation deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationConfig {
    /// Registry client settings.
    pub registry: RegistryConfig,
    /// Result publishing settings.
    pub notifier: NotifierConfig,
}

impl RotationConfig {
    /// Configuration for a regional registry.
    ///
    /// The data endpoint is account specific, so it has to be supplied.
    #[must_use]
    pub fn for_region(region: &str, data_endpoint: &str) -> Self {
        Self {
            registry: RegistryConfig::new(format!("https://iot.{region}.amazonaws.com")),
            notifier: NotifierConfig::new(data_endpoint),
        }
    }

    /// Allows or forbids plain `http` endpoints on both clients.
    #[must_use]
    pub const fn with_insecure_http(mut self, allow: bool) -> Self {
        self.registry.allow_insecure_http = allow;
        self.notifier.allow_insecure_http = allow;
        self
    }
}

fn parse_endpoint(endpoint: &str, allow_insecure_http: bool) -> Result<Url, ConfigError> {
    let url = Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = url.scheme();
    if scheme == "https" || (scheme == "http" && allow_insecure_http) {
        return Ok(url);
    }
    Err(ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: format!("scheme {scheme} is not allowed"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regional_endpoint() {
        let config = RotationConfig::for_region(
            "eu-west-1",
            "https://a1b2c3-ats.iot.eu-west-1.amazonaws.com",
        );
        assert_eq!(config.registry.endpoint, "https://iot.eu-west-1.amazonaws.com");
        assert_eq!(config.registry.max_attempts, 4);
        assert_eq!(config.notifier.topic_prefix, "certificate/rotation/result/");
        assert_eq!(config.notifier.qos, 1);
        assert!(config.registry.validate().is_ok());
        assert!(config.notifier.validate().is_ok());
    }

    #[test]
    fn test_rejects_plain_http_unless_allowed() {
        let config = RegistryConfig::new("http://localhost:8080");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        let config = RotationConfig {
            registry: config,
            notifier: NotifierConfig::new("http://localhost:8081"),
        }
        .with_insecure_http(true);
        assert!(config.registry.validate().is_ok());
        assert!(config.notifier.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_bounds() {
        let mut registry = RegistryConfig::new("https://iot.us-east-1.amazonaws.com");
        registry.max_attempts = 0;
        assert_eq!(registry.validate(), Err(ConfigError::InvalidMaxAttempts(0)));

        let mut notifier = NotifierConfig::new("https://data.example.com");
        notifier.qos = 2;
        assert_eq!(notifier.validate(), Err(ConfigError::InvalidQos(2)));
    }

    #[test]
    fn test_rejects_unparseable_endpoint() {
        let config = RegistryConfig::new("not a url");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }
}
