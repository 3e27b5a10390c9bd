//! An HTTP client that fetches the bucketing configuration from the CDN.
use std::time::Duration;

use reqwest::{StatusCode, Url};

use crate::bucketing::Configuration;
use crate::{Error, Result};

/// Where bucketing configurations are served from.
pub const DEFAULT_BASE_URL: &str = "https://cdn.flagship.io";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_RETRIES: u32 = 1;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Anything that can produce a bucketing [`Configuration`]. The decision engine pulls its
/// configuration through this trait, so the CDN client can be swapped out in tests.
pub trait ConfigurationSource: Send + Sync {
    /// Fetch a fresh configuration.
    fn fetch_configuration(&self) -> Result<Configuration>;
}

/// Configuration for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Environment the configuration is fetched for.
    pub environment_id: String,
    /// API key sent with every request.
    pub api_key: String,
    /// Base URL of the CDN.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How many times a failed request is retried before giving up.
    pub retries: u32,
}

impl ApiClientConfig {
    /// Create a config for the given environment with default base URL, timeout, and
    /// retry count.
    pub fn new(environment_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        ApiClientConfig {
            environment_id: environment_id.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the retry count.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// A client that fetches the bucketing file from the Flagship CDN.
pub struct ApiClient {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    url: Url,
    api_key: String,
    retries: u32,
}

impl ApiClient {
    /// Create a new client. Fails if the base URL cannot be parsed.
    pub fn new(config: ApiClientConfig) -> Result<ApiClient> {
        let url = Url::parse(&format!(
            "{}/{}/bucketing.json",
            config.base_url, config.environment_id
        ))
        .map_err(Error::InvalidBaseUrl)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(ApiClient {
            client,
            url,
            api_key: config.api_key,
            retries: config.retries,
        })
    }

    fn fetch_once(&self) -> Result<Configuration> {
        log::debug!(target: "flagship", "fetching bucketing configuration");
        let response = self
            .client
            .get(self.url.clone())
            .header("x-api-key", &self.api_key)
            .send()?;

        match response.status() {
            StatusCode::OK | StatusCode::NOT_MODIFIED => {}
            status => {
                log::warn!(target: "flagship", "received non-200 response while fetching bucketing configuration: {}", status);
                return Err(Error::UnexpectedStatus {
                    status: status.as_u16(),
                    url: self.url.to_string(),
                });
            }
        }

        let configuration = response.json()?;

        log::debug!(target: "flagship", "successfully fetched bucketing configuration");

        Ok(configuration)
    }
}

impl ConfigurationSource for ApiClient {
    fn fetch_configuration(&self) -> Result<Configuration> {
        let mut attempt = 0;
        loop {
            match self.fetch_once() {
                Ok(configuration) => return Ok(configuration),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    log::warn!(target: "flagship", "bucketing request failed, retrying ({}/{}): {}", attempt, self.retries, err);
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_bucketing_url_from_environment() {
        let client = ApiClient::new(ApiClientConfig::new("env_1", "key")).unwrap();
        assert_eq!(client.url.as_str(), "https://cdn.flagship.io/env_1/bucketing.json");
    }

    #[test]
    fn custom_base_url() {
        let config = ApiClientConfig::new("env_1", "key").with_base_url("http://localhost:8080");
        let client = ApiClient::new(config).unwrap();
        assert_eq!(client.url.as_str(), "http://localhost:8080/env_1/bucketing.json");
    }

    #[test]
    fn rejects_unparsable_base_url() {
        let config = ApiClientConfig::new("env_1", "key").with_base_url("not a url");
        assert!(matches!(ApiClient::new(config), Err(Error::InvalidBaseUrl(_))));
    }
}
