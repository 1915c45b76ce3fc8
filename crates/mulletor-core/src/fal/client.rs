//! ============================================================================
//! fal Transport - HTTP plumbing for the fal.ai queue
//! ============================================================================
//! The queue client talks through the `FalTransport` trait so the polling
//! protocol can be tested against a scripted transport. The production
//! implementation is a thin reqwest wrapper with fixed timeouts and the
//! `Key` authentication scheme fal expects.
//! ============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::types::{MulletorError, Result};

const USER_AGENT: &str = "mulletor-fal-client/0.1 (rust)";

/// Connect and transfer timeout for every queue call
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Raw request/response transport for the fal queue
#[async_trait]
pub trait FalTransport: Send + Sync {
    /// POST a JSON body, returning the raw response body
    async fn post_json(&self, url: &str, body: String) -> Result<String>;

    /// GET a URL, returning the raw response body
    async fn get(&self, url: &str) -> Result<String>;
}

/// Production transport backed by reqwest
pub struct FalHttpClient {
    client: reqwest::Client,
    api_key: String,
}

impl FalHttpClient {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build fal http client");

        Self { client, api_key }
    }

    async fn read_success(url: &str, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MulletorError::Transport(format!("could not read body of {url}: {e}")))?;

        if !status.is_success() {
            return Err(MulletorError::Transport(format!(
                "{url} returned {status}: {body}"
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl FalTransport for FalHttpClient {
    async fn post_json(&self, url: &str, body: String) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Key {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| MulletorError::Transport(format!("POST {url} failed: {e}")))?;

        Self::read_success(url, response).await
    }

    async fn get(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Key {}", self.api_key))
            .send()
            .await
            .map_err(|e| MulletorError::Transport(format!("GET {url} failed: {e}")))?;

        Self::read_success(url, response).await
    }
}
