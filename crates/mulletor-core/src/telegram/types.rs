//! ============================================================================
//! Telegram Types - Bot API subset + inbound image resolution
//! ============================================================================
//! Serde types for the handful of Bot API objects the bot touches, plus the
//! pure functions that decide whether a message concerns the bot and which
//! image it should transform.
//! ============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub pre_checkout_query: Option<PreCheckoutQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
    #[serde(default)]
    pub successful_payment: Option<SuccessfulPayment>,
}

impl Message {
    /// Text or caption, whichever the message carries
    pub fn text_or_caption(&self) -> &str {
        self.text
            .as_deref()
            .or(self.caption.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreCheckoutQuery {
    pub id: String,
    pub from: User,
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuccessfulPayment {
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
    pub telegram_payment_charge_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabeledPrice {
    pub label: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyParameters {
    pub message_id: i64,
    pub allow_sending_without_reply: bool,
}

impl ReplyParameters {
    pub fn to(message_id: i64) -> Self {
        Self {
            message_id,
            allow_sending_without_reply: true,
        }
    }
}

/// The image a message offers for transformation, resolved once per event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Largest rendition of an attached photo
    Photo { file_id: String },
    /// Attached document with an image mime type
    Document { file_id: String },
}

impl ImageSource {
    pub fn file_id(&self) -> &str {
        match self {
            ImageSource::Photo { file_id } | ImageSource::Document { file_id } => file_id,
        }
    }
}

/// Resolve the best image in a message, falling back to the replied-to
/// message when the message itself has none.
pub fn image_source(message: &Message) -> Option<ImageSource> {
    own_image(message).or_else(|| {
        message
            .reply_to_message
            .as_deref()
            .and_then(own_image)
    })
}

fn own_image(message: &Message) -> Option<ImageSource> {
    if let Some(sizes) = &message.photo {
        // widened so hostile dimensions cannot overflow the area
        if let Some(largest) = sizes
            .iter()
            .max_by_key(|size| size.width as u64 * size.height as u64)
        {
            return Some(ImageSource::Photo {
                file_id: largest.file_id.clone(),
            });
        }
    }

    if let Some(document) = &message.document {
        if document
            .mime_type
            .as_deref()
            .unwrap_or("")
            .starts_with("image/")
        {
            return Some(ImageSource::Document {
                file_id: document.file_id.clone(),
            });
        }
    }

    None
}

/// Whether a photo-bearing message is addressed to this bot: an image must
/// be present (directly or via reply), and the message must be a direct
/// chat, mention the bot, reply to the bot, or carry the /mullet command.
pub fn concerns_bot(message: &Message, bot_username: &str) -> bool {
    if image_source(message).is_none() {
        return false;
    }

    let is_direct = message.chat.kind == "private";
    let text = message.text_or_caption();
    let is_mentioned = text.contains(bot_username);
    let is_reply_to_bot = message
        .reply_to_message
        .as_deref()
        .and_then(|replied| replied.from.as_ref())
        .and_then(|user| user.username.as_deref())
        == Some(bot_username);
    let has_command = text.contains("/mullet");

    is_direct || is_mentioned || is_reply_to_bot || has_command
}
