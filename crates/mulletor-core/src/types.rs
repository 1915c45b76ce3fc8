//! ============================================================================
//! Shared Types - Payment context, pipeline outcomes, error taxonomy
//! ============================================================================
//! Everything the pipeline and its collaborators exchange lives here:
//! - PaymentContext bridging "invoice issued" and "payment confirmed"
//! - PaymentOutcome, the terminal state of one paid transformation
//! - MulletorError, the single error enum for the whole core
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Transient state stored between invoice issuance and payment confirmation.
///
/// The Telegram payment callback only carries an opaque payload, so the
/// source photo and reply target are parked here under the payment id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentContext {
    /// Telegram file id of the photo to transform
    pub file_id: String,
    /// Message to reply to when delivering the result
    pub message_id: Option<i64>,
    /// Chat the photo came from
    pub chat_id: i64,
    /// Unix timestamp of invoice issuance, drives the TTL sweep
    pub created_at: i64,
}

/// Terminal state of one paid transformation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Photo delivered, payment context consumed
    Delivered,
    /// Processing failed, charge reversed
    Refunded,
    /// Processing failed and the refund failed too; operator escalated
    RefundFailed,
    /// Payload did not match a live payment context; nothing to refund against
    ContextExpired,
}

/// Error types for the bot core
#[derive(Debug, thiserror::Error)]
pub enum MulletorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not serialize request body: {0}")]
    Serialization(String),

    #[error("unexpected response shape: {0}")]
    Protocol(String),

    #[error("run {request_id} failed: {reason}")]
    JobFailed { request_id: String, reason: String },

    #[error("run {request_id} did not complete in {waited} seconds")]
    JobTimeout { request_id: String, waited: u64 },

    #[error("status check for run {request_id} failed: {message}")]
    StatusCheckFailed { request_id: String, message: String },

    #[error("no image URL found in result")]
    NoImageProduced,

    #[error("payment context {0} not found or expired")]
    PaymentContextExpired(String),

    #[error("refund failed: {0}")]
    RefundFailed(String),

    #[error("telegram api error: {0}")]
    Api(String),

    #[error("image processing error: {0}")]
    Image(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MulletorError>;
