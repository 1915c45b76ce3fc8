//! ============================================================================
//! Configuration - Environment-based startup settings
//! ============================================================================

use crate::types::{MulletorError, Result};

/// Operator group that receives failure reports and refund escalations
const DEFAULT_DEV_CHAT_ID: i64 = -4576716287;

/// Bot configuration, read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram Bot API token
    pub bot_token: String,
    /// fal.ai API key
    pub fal_api_key: String,
    /// Chat id for operator notifications
    pub dev_chat_id: i64,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// `TELEGRAM_BOT_TOKEN` and `FAL_API_KEY` are required and must be
    /// non-empty. `DEV_CHAT_ID` is optional.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading through `lookup` so tests never have
    /// to mutate process-wide environment state.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = required(&lookup, "TELEGRAM_BOT_TOKEN")?;
        let fal_api_key = required(&lookup, "FAL_API_KEY")?;

        let dev_chat_id = match lookup("DEV_CHAT_ID") {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                MulletorError::Config(format!("DEV_CHAT_ID is not a valid chat id: {raw}"))
            })?,
            None => DEFAULT_DEV_CHAT_ID,
        };

        Ok(Self {
            bot_token,
            fal_api_key,
            dev_chat_id,
        })
    }
}

fn required(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MulletorError::Config(format!("{name} must be set"))),
    }
}
