//! Blocking HTTP clients for the data-collect and activation endpoints.
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use url::Url;

use crate::hits::{ActivationHit, Hit};
use crate::{Error, Result};

/// Default base URL for hit delivery.
pub const DEFAULT_TRACKING_URL: &str = "https://ariane.abtasty.com";
/// Default base URL for the decision API (campaign activation).
pub const DEFAULT_DECISION_URL: &str = "https://decision-api.flagship.io";

const ACTIVATION_ENDPOINT: &str = "/v1/activate";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Delivery contract consumed by the dispatcher. Implemented by [`TrackingApiClient`] for
/// real network delivery and by mocks in tests.
pub trait HitSender: Send + Sync {
    /// Deliver one hit (usually a batch) to the collector. Non-success statuses are errors.
    fn send_hit(&self, hit: &Hit) -> Result<()>;
}

/// Configuration for [`TrackingApiClient`].
#[derive(Debug, Clone)]
pub struct TrackingApiConfig {
    /// Environment the client reports for.
    pub environment_id: String,
    /// Optional API key sent as `x-api-key` on decision API calls.
    pub api_key: Option<String>,
    /// Base URL for hit delivery. Defaults to [`DEFAULT_TRACKING_URL`].
    pub tracking_url: String,
    /// Base URL for the decision API. Defaults to [`DEFAULT_DECISION_URL`].
    pub decision_url: String,
    /// Request timeout. Defaults to 2 seconds.
    pub timeout: Duration,
}

impl TrackingApiConfig {
    /// Create a configuration with default endpoints for the given environment.
    pub fn new(environment_id: impl Into<String>) -> TrackingApiConfig {
        TrackingApiConfig {
            environment_id: environment_id.into(),
            api_key: None,
            tracking_url: DEFAULT_TRACKING_URL.to_owned(),
            decision_url: DEFAULT_DECISION_URL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the decision API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> TrackingApiConfig {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the hit delivery base URL.
    pub fn with_tracking_url(mut self, url: impl Into<String>) -> TrackingApiConfig {
        self.tracking_url = url.into();
        self
    }

    /// Override the decision API base URL.
    pub fn with_decision_url(mut self, url: impl Into<String>) -> TrackingApiConfig {
        self.decision_url = url.into();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> TrackingApiConfig {
        self.timeout = timeout;
        self
    }
}

/// A client for the data-collect and activation APIs.
pub struct TrackingApiClient {
    // Client holds a connection pool internally, so we're reusing it between requests.
    client: reqwest::blocking::Client,
    config: TrackingApiConfig,
}

impl TrackingApiClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(config: TrackingApiConfig) -> Result<Arc<TrackingApiClient>> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Arc::new(TrackingApiClient { client, config }))
    }

    /// Activate a campaign variation for a visitor on the decision API. The server answers
    /// 204 on success.
    pub fn activate_campaign(&self, mut activation: ActivationHit) -> Result<()> {
        activation.environment_id = self.config.environment_id.clone();

        let hit = Hit::Activation(activation);
        let errors = hit.validate();
        if !errors.is_empty() {
            for err in &errors {
                log::error!(target: "flagship", "activation hit validation error: {err}");
            }
            return Err(Error::InvalidHit(errors));
        }

        let url = Url::parse(&self.config.decision_url)
            .and_then(|url| url.join(ACTIVATION_ENDPOINT))
            .map_err(Error::InvalidBaseUrl)?;

        let mut request = self.client.post(url.clone()).json(&hit);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("x-api-key", api_key);
        }
        let response = request.send()?;

        if response.status() != StatusCode::NO_CONTENT {
            log::warn!(
                target: "flagship",
                "received status {} while activating a campaign", response.status()
            );
            return Err(Error::UnexpectedStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(())
    }
}

impl HitSender for TrackingApiClient {
    fn send_hit(&self, hit: &Hit) -> Result<()> {
        let errors = hit.validate();
        if !errors.is_empty() {
            for err in &errors {
                log::error!(target: "flagship", "hit validation error: {err}");
            }
            return Err(Error::InvalidHit(errors));
        }

        let url = Url::parse(&self.config.tracking_url).map_err(Error::InvalidBaseUrl)?;

        log::debug!(target: "flagship", "sending hit to collect");
        let response = self.client.post(url.clone()).json(hit).send()?;

        if response.status() != StatusCode::OK {
            log::warn!(
                target: "flagship",
                "received status {} while sending a hit", response.status()
            );
            return Err(Error::UnexpectedStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(())
    }
}
