//! ============================================================================
//! Mulletor Core - Payment-gated photo transformation
//! ============================================================================
//! Core library for the Mulletor Telegram bot: a photo comes in, a Telegram
//! Stars invoice goes out, a paid photo is pushed through the fal.ai queue,
//! the result is watermarked and delivered, and any post-payment failure is
//! compensated with a refund.
//!
//! Module map:
//! - `config`        - environment-based startup settings
//! - `payment_store` - transient context between invoice and payment
//! - `fal`           - fal.ai queue client (submit, poll, fetch result)
//! - `mullet`        - the one domain operation: photo URL in, result out
//! - `watermark`     - post-processing of generated images
//! - `telegram`      - Bot API types and client
//! - `pipeline`      - the state machine tying it all together
//! ============================================================================

pub mod config;
pub mod fal;
pub mod mullet;
pub mod payment_store;
pub mod pipeline;
pub mod telegram;
pub mod types;
pub mod watermark;

pub use config::Config;
pub use pipeline::PaymentPipeline;
pub use types::{MulletorError, PaymentContext, PaymentOutcome, Result};
