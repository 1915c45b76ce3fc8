//! ============================================================================
//! Payment Pipeline - Invoice, payment, generation, delivery, refund
//! ============================================================================
//! The state machine tying the bot together:
//!
//!   photo -> invoice -> pre-checkout (auto-approved) -> payment ->
//!   generation -> watermark -> delivery
//!
//! Any failure after the payment lands funnels into a compensating sequence
//! that refunds the charge and notifies the operator chat. That sequence is
//! the terminal handler: every step is individually guarded and nothing
//! propagates past it.
//! ============================================================================

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::mullet::{first_image_url, MulletGenerator, DEFAULT_WAIT_SECS};
use crate::payment_store::PaymentStore;
use crate::telegram::{
    concerns_bot, image_source, LabeledPrice, Message, PreCheckoutQuery, SuccessfulPayment,
    TelegramApi, Update,
};
use crate::types::{MulletorError, PaymentContext, PaymentOutcome, Result};
use crate::watermark::PostProcessor;

pub const BOT_USERNAME: &str = "mulletor_bot";

const INVOICE_TITLE: &str = "🎸 Маллет-трансформация";
const INVOICE_DESCRIPTION: &str = "Превращение в легенду 80-х!";
const INVOICE_CURRENCY: &str = "XTR";
const INVOICE_PRICE_LABEL: &str = "Маллет";
const INVOICE_PRICE_STARS: i64 = 5;

const MSG_NO_PHOTO: &str = "❌ Не вижу тут фотки";
const MSG_PROCESSING: &str = "🎸 Ваш маллет готовится... Минутку!";
const MSG_CONTEXT_EXPIRED: &str =
    "❌ Платёж получен, но фотка уже потерялась. Напиши в поддержку";
const MSG_REFUND_FAILED: &str =
    "❌ Не получилось создать маллет. Напиши в поддержку для возврата денег";

const RESULT_CAPTION: &str =
    "🎸 Готово! Спереди — бизнес, сзади — вечеринка 🎸\n\n Сделано с помощью @mulletor_bot";

const WELCOME: &str = "🎸 Привет! Я — Mulletor Bot!\n\n\
    Превращаю обычные фото в легенды 80-х! Спереди — бизнес, сзади — вечеринка 🎸\n\n\
    Как пользоваться:\n\
    1️⃣ Отправь мне фото человека\n\
    2️⃣ Оплати 5 звёзд ⭐️\n\
    3️⃣ Получи шикарный маллет!\n\n\
    Работаю в личке и в группах (упомяни меня или используй команду /mullet)\n\n\
    Поехали! 🚀";

/// The payment-gated transformation pipeline
pub struct PaymentPipeline {
    api: Arc<dyn TelegramApi>,
    generator: Arc<dyn MulletGenerator>,
    post_processor: Arc<dyn PostProcessor>,
    store: Arc<PaymentStore>,
    dev_chat_id: i64,
}

impl PaymentPipeline {
    pub fn new(
        api: Arc<dyn TelegramApi>,
        generator: Arc<dyn MulletGenerator>,
        post_processor: Arc<dyn PostProcessor>,
        store: Arc<PaymentStore>,
        dev_chat_id: i64,
    ) -> Self {
        Self {
            api,
            generator,
            post_processor,
            store,
            dev_chat_id,
        }
    }

    /// Route one inbound update to its handler
    pub async fn handle_update(&self, update: Update) {
        if let Some(query) = update.pre_checkout_query {
            self.handle_pre_checkout(&query).await;
            return;
        }

        let Some(message) = update.message else { return };

        if let Some(payment) = message.successful_payment.clone() {
            self.handle_successful_payment(&message, &payment).await;
        } else if message.text_or_caption().starts_with("/start") {
            self.handle_start(&message).await;
        } else if concerns_bot(&message, BOT_USERNAME) {
            self.handle_photo(&message).await;
        }
    }

    /// /start: send the welcome message
    pub async fn handle_start(&self, message: &Message) {
        self.reply_best_effort(message.chat.id, WELCOME, Some(message.message_id))
            .await;
        info!("Start command answered in chat {}", message.chat.id);
    }

    /// AWAITING_PHOTO -> INVOICED: mint a payment context and send an
    /// invoice carrying its id. Nothing persists if either step fails.
    pub async fn handle_photo(&self, message: &Message) {
        let chat_id = message.chat.id;
        let reply_to = Some(message.message_id);

        let Some(source) = image_source(message) else {
            warn!("No usable photo in message {} (chat {chat_id})", message.message_id);
            self.reply_best_effort(chat_id, MSG_NO_PHOTO, reply_to).await;
            return;
        };

        let payment_id = self
            .store
            .store(source.file_id(), Some(message.message_id), chat_id);

        let prices = [LabeledPrice {
            label: INVOICE_PRICE_LABEL.to_string(),
            amount: INVOICE_PRICE_STARS,
        }];

        match self
            .api
            .send_invoice(
                chat_id,
                INVOICE_TITLE,
                INVOICE_DESCRIPTION,
                &payment_id,
                INVOICE_CURRENCY,
                &prices,
                reply_to,
            )
            .await
        {
            Ok(_) => {
                info!(
                    "Invoice sent for photo {} (payment {payment_id})",
                    source.file_id()
                );
            }
            Err(e) => {
                error!("Failed to send invoice: {e}");
                self.store.remove(&payment_id);
                self.reply_best_effort(
                    chat_id,
                    &format!("❌ Что-то пошло не так, попробуй ещё раз\nОшибка: {e}"),
                    reply_to,
                )
                .await;
            }
        }
    }

    /// INVOICED -> PAID: every pre-checkout query is approved; the minted
    /// payment id is the only gate.
    pub async fn handle_pre_checkout(&self, query: &PreCheckoutQuery) {
        info!(
            "Pre-checkout query {} from user {}: {} {} (payload {})",
            query.id, query.from.id, query.total_amount, query.currency, query.invoice_payload
        );

        if let Err(e) = self.api.answer_pre_checkout_query(&query.id, true).await {
            error!("Failed to answer pre-checkout query {}: {e}", query.id);
        }
    }

    /// PAID -> PROCESSING -> {DELIVERED | REFUNDED | REFUND_FAILED}
    pub async fn handle_successful_payment(
        &self,
        message: &Message,
        payment: &SuccessfulPayment,
    ) -> PaymentOutcome {
        let chat_id = message.chat.id;
        info!(
            "Successful payment in chat {chat_id}: {} {}, charge {}, payload {}",
            payment.total_amount,
            payment.currency,
            payment.telegram_payment_charge_id,
            payment.invoice_payload
        );

        let payment_id = &payment.invoice_payload;
        let Some(context) = self.store.retrieve(payment_id) else {
            // Without the context there is neither a source photo nor an
            // audit trail to refund against: fatal but logged, no refund.
            let e = MulletorError::PaymentContextExpired(payment_id.clone());
            error!("{e}; charge {} is unrecoverable", payment.telegram_payment_charge_id);
            self.reply_best_effort(chat_id, MSG_CONTEXT_EXPIRED, None).await;
            return PaymentOutcome::ContextExpired;
        };

        match self.process_paid_photo(chat_id, &context).await {
            Ok(()) => {
                self.store.remove(payment_id);
                info!("Mullet delivered to chat {chat_id}");
                PaymentOutcome::Delivered
            }
            Err(e) => self.compensate(message, payment, e).await,
        }
    }

    /// The guarded section: everything here may fail and will be
    /// compensated with a refund.
    async fn process_paid_photo(&self, chat_id: i64, context: &PaymentContext) -> Result<()> {
        let status = self
            .api
            .send_message(chat_id, MSG_PROCESSING, context.message_id)
            .await?;

        let file = self.api.get_file(&context.file_id).await?;
        let file_path = file.file_path.ok_or_else(|| {
            MulletorError::Protocol("getFile response without file_path".to_string())
        })?;
        let file_url = self.api.file_url(&file_path);

        info!("Processing mullet for paid photo: {file_url}");
        let result = self
            .generator
            .add_mullet(&file_url, None, DEFAULT_WAIT_SECS)
            .await?;
        let image_url = first_image_url(&result)?;
        info!("Mullet created: {image_url}");

        let local_path = self.post_processor.apply(image_url).await?;
        info!("Watermark added: {}", local_path.display());

        let delivery = self
            .deliver(chat_id, &local_path, status.message_id, context.message_id)
            .await;

        // the temp file goes away on success and failure alike
        if let Err(e) = tokio::fs::remove_file(&local_path).await {
            warn!("Could not remove temp file {}: {e}", local_path.display());
        }

        delivery
    }

    async fn deliver(
        &self,
        chat_id: i64,
        local_path: &Path,
        status_message_id: i64,
        reply_to: Option<i64>,
    ) -> Result<()> {
        self.api.delete_message(chat_id, status_message_id).await?;
        self.api
            .send_photo(chat_id, local_path, RESULT_CAPTION, reply_to)
            .await?;
        Ok(())
    }

    /// PROCESSING -> {REFUNDED | REFUND_FAILED}: the compensating sequence.
    /// Each step is guarded on its own so a failing notification can never
    /// block the refund, and a failing refund can never block telling the
    /// user. Nothing propagates out of here.
    async fn compensate(
        &self,
        message: &Message,
        payment: &SuccessfulPayment,
        cause: MulletorError,
    ) -> PaymentOutcome {
        let chat_id = message.chat.id;
        let charge_id = &payment.telegram_payment_charge_id;

        error!("Failed to create mullet after payment: {cause} (chat {chat_id}, charge {charge_id})");

        if let Err(e) = self.notify_failure(message, payment, &cause).await {
            error!("Failed to notify operator chat: {e}");
        }

        let Some(user_id) = message.from.as_ref().map(|user| user.id) else {
            error!("Payment message without a sender, cannot refund charge {charge_id}");
            self.escalate_refund_failure(0, charge_id, "payment message without a sender")
                .await;
            self.reply_best_effort(chat_id, MSG_REFUND_FAILED, None).await;
            return PaymentOutcome::RefundFailed;
        };

        match self.api.refund_star_payment(user_id, charge_id).await {
            Ok(()) => {
                info!("Payment refunded: user {user_id}, charge {charge_id}");
                self.reply_best_effort(
                    chat_id,
                    &format!("❌ Не получилось создать маллет, деньги вернули\n\nОшибка: {cause}"),
                    None,
                )
                .await;
                PaymentOutcome::Refunded
            }
            Err(refund_error) => {
                error!(
                    "Failed to refund charge {charge_id}: {refund_error} (original error: {cause})"
                );
                self.escalate_refund_failure(user_id, charge_id, &refund_error.to_string())
                    .await;
                self.reply_best_effort(chat_id, MSG_REFUND_FAILED, None).await;
                PaymentOutcome::RefundFailed
            }
        }
    }

    async fn notify_failure(
        &self,
        message: &Message,
        payment: &SuccessfulPayment,
        cause: &MulletorError,
    ) -> Result<()> {
        let user = message
            .from
            .as_ref()
            .map(|user| {
                user.username
                    .as_ref()
                    .map(|name| format!("@{name}"))
                    .or_else(|| user.first_name.clone())
                    .map(|name| format!("{name} (ID: {})", user.id))
                    .unwrap_or_else(|| format!("ID: {}", user.id))
            })
            .unwrap_or_else(|| "Unknown".to_string());

        let text = format!(
            "❌ Mullet generation failed after payment\n\n\
             User: {user}\n\
             Chat: {}\n\
             Payment ID: {}\n\
             Amount: {} stars\n\n\
             Error: {cause}",
            message.chat.id, payment.telegram_payment_charge_id, payment.total_amount
        );

        self.api.send_message(self.dev_chat_id, &text, None).await?;
        Ok(())
    }

    async fn escalate_refund_failure(&self, user_id: i64, charge_id: &str, reason: &str) {
        let text = format!(
            "🚨 CRITICAL: Failed to refund payment!\n\n\
             User: {user_id}\n\
             Payment ID: {charge_id}\n\
             Refund error: {reason}"
        );

        if let Err(e) = self.api.send_message(self.dev_chat_id, &text, None).await {
            error!("Failed to escalate refund failure to operator chat: {e}");
        }
    }

    async fn reply_best_effort(&self, chat_id: i64, text: &str, reply_to: Option<i64>) {
        if let Err(e) = self.api.send_message(chat_id, text, reply_to).await {
            error!("Failed to send message to chat {chat_id}: {e}");
        }
    }
}
