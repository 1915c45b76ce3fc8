//! ============================================================================
//! Mullet Orchestrator - One call from photo URL to generation result
//! ============================================================================
//! Wraps the fal queue behind a single domain operation: submit the
//! nano-banana edit run for a photo and poll it to completion.
//! ============================================================================

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::fal::{FalQueue, GenerationResult};
use crate::types::{MulletorError, Result};

/// nano-banana image edit model path
const MULLET_MODEL: &str = "/fal-ai/nano-banana/edit";

/// Prompt used when the caller does not supply one
const DEFAULT_PROMPT: &str =
    "give this person a spectacular 1980s mullet hairstyle and gorgeous mustache";

/// Default wait budget for one transformation (5 minutes)
pub const DEFAULT_WAIT_SECS: u64 = 300;

/// Seam between the payment pipeline and the generation backend
#[async_trait]
pub trait MulletGenerator: Send + Sync {
    /// Transform the image at `image_url`, waiting at most `wait_for` seconds
    async fn add_mullet(
        &self,
        image_url: &str,
        prompt: Option<&str>,
        wait_for: u64,
    ) -> Result<GenerationResult>;
}

/// Production orchestrator backed by the fal queue
pub struct MulletService {
    queue: FalQueue,
}

impl MulletService {
    pub fn new(queue: FalQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl MulletGenerator for MulletService {
    async fn add_mullet(
        &self,
        image_url: &str,
        prompt: Option<&str>,
        wait_for: u64,
    ) -> Result<GenerationResult> {
        let prompt = prompt.unwrap_or(DEFAULT_PROMPT);

        // sync_mode off: completion is always observed through polling
        let input = json!({
            "prompt": prompt,
            "image_urls": [image_url],
            "num_images": 1,
            "output_format": "png",
            "sync_mode": false,
        });

        let run = self.queue.create_run(MULLET_MODEL, &input).await?;
        info!("Mullet run started, request_id: {}", run.request_id);

        self.queue
            .wait_for_run(&run.request_id, &run.response_url, wait_for)
            .await
    }
}

/// URL of the first generated image.
///
/// An empty image list, a missing url field and an empty url string are all
/// `NoImageProduced`; a successful run is expected to yield at least one.
pub fn first_image_url(result: &GenerationResult) -> Result<&str> {
    result
        .images
        .first()
        .and_then(|image| image.url.as_deref())
        .filter(|url| !url.is_empty())
        .ok_or(MulletorError::NoImageProduced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fal::{FalTransport, GeneratedImage};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_first_image_url_returns_the_literal_url() {
        let result = GenerationResult {
            images: vec![GeneratedImage {
                url: Some("https://x/y.png".to_string()),
            }],
            description: None,
        };

        assert_eq!(first_image_url(&result).unwrap(), "https://x/y.png");
    }

    #[test]
    fn test_first_image_url_fails_on_empty_list() {
        let result = GenerationResult::default();
        assert!(matches!(
            first_image_url(&result),
            Err(MulletorError::NoImageProduced)
        ));
    }

    #[test]
    fn test_first_image_url_fails_on_missing_or_empty_url() {
        let missing = GenerationResult {
            images: vec![GeneratedImage { url: None }],
            description: None,
        };
        assert!(matches!(
            first_image_url(&missing),
            Err(MulletorError::NoImageProduced)
        ));

        let empty = GenerationResult {
            images: vec![GeneratedImage {
                url: Some(String::new()),
            }],
            description: None,
        };
        assert!(matches!(
            first_image_url(&empty),
            Err(MulletorError::NoImageProduced)
        ));
    }

    /// Transport that records the submission and completes immediately
    struct RecordingTransport {
        posts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl FalTransport for RecordingTransport {
        async fn post_json(&self, url: &str, body: String) -> Result<String> {
            self.posts.lock().unwrap().push((url.to_string(), body));
            Ok(r#"{"request_id":"run-9","response_url":"https://queue.fal.run/r/run-9"}"#
                .to_string())
        }

        async fn get(&self, url: &str) -> Result<String> {
            if url.ends_with("/status") {
                Ok(r#"{"status":"COMPLETED"}"#.to_string())
            } else {
                Ok(r#"{"images":[{"url":"https://fal.media/mullet.png"}]}"#.to_string())
            }
        }
    }

    fn service() -> (MulletService, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport {
            posts: Mutex::new(Vec::new()),
        });
        let queue = FalQueue::new(transport.clone() as Arc<dyn FalTransport>);
        (MulletService::new(queue), transport)
    }

    #[tokio::test]
    async fn test_add_mullet_submits_the_expected_run() {
        let (service, transport) = service();
        let result = service
            .add_mullet("https://files.test/photo.jpg", None, DEFAULT_WAIT_SECS)
            .await
            .unwrap();

        assert_eq!(first_image_url(&result).unwrap(), "https://fal.media/mullet.png");

        let posts = transport.posts.lock().unwrap().clone();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.ends_with(MULLET_MODEL));

        let input: serde_json::Value = serde_json::from_str(&posts[0].1).unwrap();
        assert_eq!(input["prompt"], DEFAULT_PROMPT);
        assert_eq!(input["image_urls"][0], "https://files.test/photo.jpg");
        assert_eq!(input["num_images"], 1);
        assert_eq!(input["output_format"], "png");
        assert_eq!(input["sync_mode"], false);
    }

    #[tokio::test]
    async fn test_add_mullet_honors_a_custom_prompt() {
        let (service, transport) = service();
        service
            .add_mullet("https://files.test/photo.jpg", Some("perm instead"), 10)
            .await
            .unwrap();

        let posts = transport.posts.lock().unwrap().clone();
        let input: serde_json::Value = serde_json::from_str(&posts[0].1).unwrap();
        assert_eq!(input["prompt"], "perm instead");
    }
}
