//! ============================================================================
//! Telegram Gateway - Bot API types and client
//! ============================================================================

pub mod api;
pub mod types;

pub use api::{BotApi, TelegramApi};
pub use types::{
    concerns_bot, image_source, Chat, Document, File, ImageSource, LabeledPrice, Message,
    PhotoSize, PreCheckoutQuery, ReplyParameters, SuccessfulPayment, Update, User,
};
