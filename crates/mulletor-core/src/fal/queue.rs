//! ============================================================================
//! fal Queue Client - Submit and poll asynchronous generation runs
//! ============================================================================
//! Every long-running generation job goes through `wait_for_run`: submit a
//! run, then poll its status once per second until it reaches a terminal
//! state or the wait budget runs out. Terminal failures fail fast; errors
//! from the status check itself are surfaced immediately, not retried.
//! ============================================================================

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::fal::client::FalTransport;
use crate::types::{MulletorError, Result};

/// fal queue base URL; model paths are appended verbatim
pub const FAL_QUEUE_URL: &str = "https://queue.fal.run";

/// Status endpoint suffix appended to a run's response URL
const STATUS_SUFFIX: &str = "/status";

/// Delay between status polls
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Flux Pro text-to-image model path
const FLUX_PRO_MODEL: &str = "/fal-ai/flux-pro";

/// Default wait budget for text-to-image runs (10 minutes)
const FLUX_WAIT_SECS: u64 = 600;

/// Identifiers returned by the queue at submission
#[derive(Debug, Clone, Deserialize)]
pub struct QueuedRun {
    pub request_id: String,
    pub response_url: String,
}

/// Polled run state; monotonic toward a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RunState {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    /// States this client does not know are treated as "still running"
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStatus {
    pub status: RunState,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneratedImage {
    #[serde(default)]
    pub url: Option<String>,
}

/// Result of a completed generation run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationResult {
    #[serde(default)]
    pub images: Vec<GeneratedImage>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Options for flux-pro text-to-image runs
#[derive(Debug, Clone)]
pub struct TextToImageOptions {
    pub image_size: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub num_images: u32,
    pub safety_tolerance: String,
    /// Defaults to a uniformly random 32-bit value when unset
    pub seed: Option<u32>,
}

impl Default for TextToImageOptions {
    fn default() -> Self {
        Self {
            image_size: "square_hd".to_string(),
            num_inference_steps: 28,
            guidance_scale: 3.5,
            num_images: 1,
            safety_tolerance: "5".to_string(),
            seed: None,
        }
    }
}

/// Client for the fal asynchronous job queue
pub struct FalQueue {
    transport: Arc<dyn FalTransport>,
}

impl FalQueue {
    pub fn new(transport: Arc<dyn FalTransport>) -> Self {
        Self { transport }
    }

    /// Submit a run to the queue
    pub async fn create_run(&self, model: &str, input: &serde_json::Value) -> Result<QueuedRun> {
        let url = format!("{FAL_QUEUE_URL}{model}");
        let body = serde_json::to_string(input)
            .map_err(|e| MulletorError::Serialization(format!("could not encode run input: {e}")))?;

        debug!("Submitting run to {url}");
        let response = self.transport.post_json(&url, body).await?;

        parse_response(&response)
    }

    /// Fetch the current status of a run
    pub async fn run_status(&self, response_url: &str) -> Result<RunStatus> {
        let response = self
            .transport
            .get(&format!("{response_url}{STATUS_SUFFIX}"))
            .await?;

        parse_response(&response)
    }

    /// Fetch the result of a completed run
    pub async fn run_result(&self, response_url: &str) -> Result<GenerationResult> {
        let response = self.transport.get(response_url).await?;

        parse_response(&response)
    }

    /// Poll a run to completion, checking once per second for at most
    /// `wait_for` iterations.
    ///
    /// A FAILED status fails immediately with `JobFailed`; a COMPLETED
    /// status fetches and returns the result. An error from the status
    /// check itself is not retried and surfaces as `StatusCheckFailed`.
    pub async fn wait_for_run(
        &self,
        request_id: &str,
        response_url: &str,
        wait_for: u64,
    ) -> Result<GenerationResult> {
        for _ in 0..wait_for {
            let status = self.run_status(response_url).await.map_err(|e| {
                MulletorError::StatusCheckFailed {
                    request_id: request_id.to_string(),
                    message: e.to_string(),
                }
            })?;

            match status.status {
                RunState::Failed => {
                    return Err(MulletorError::JobFailed {
                        request_id: request_id.to_string(),
                        reason: status.error.unwrap_or_else(|| "Unknown error".to_string()),
                    });
                }
                RunState::Completed => {
                    debug!("Run {request_id} completed");
                    return self.run_result(response_url).await;
                }
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }

        Err(MulletorError::JobTimeout {
            request_id: request_id.to_string(),
            waited: wait_for,
        })
    }

    /// Generate an image from a text prompt via flux-pro
    pub async fn text_to_image(
        &self,
        prompt: &str,
        options: TextToImageOptions,
    ) -> Result<GenerationResult> {
        let seed = options
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen::<u32>());

        let input = json!({
            "prompt": prompt,
            "image_size": options.image_size,
            "num_inference_steps": options.num_inference_steps,
            "guidance_scale": options.guidance_scale,
            "num_images": options.num_images,
            "safety_tolerance": options.safety_tolerance,
            "seed": seed,
        });

        let run = self.create_run(FLUX_PRO_MODEL, &input).await?;
        info!("Flux run started, request_id: {}", run.request_id);

        self.wait_for_run(&run.request_id, &run.response_url, FLUX_WAIT_SECS)
            .await
    }
}

fn parse_response<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| MulletorError::Protocol(format!("could not parse fal response: {e}")))
}
