//! ============================================================================
//! fal.ai Integration - Queue submission and polling
//! ============================================================================

pub mod client;
pub mod queue;

pub use client::{FalHttpClient, FalTransport};
pub use queue::{
    FalQueue, GeneratedImage, GenerationResult, QueuedRun, RunState, RunStatus,
    TextToImageOptions, FAL_QUEUE_URL,
};
