// ============================================================================
// mulletor-bot — Telegram bot turning photos into 1980s mullets, for Stars
// ============================================================================
// Wires the core services together and runs the getUpdates long-poll loop.
// Each update is handled on its own task; a periodic sweep drops stale
// payment contexts. First Ctrl-C stops polling and drains in-flight
// handlers, second Ctrl-C exits immediately.
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mulletor_core::fal::{FalHttpClient, FalQueue, FalTransport};
use mulletor_core::mullet::MulletService;
use mulletor_core::payment_store::{Clock, PaymentStore, SystemClock};
use mulletor_core::telegram::BotApi;
use mulletor_core::watermark::ImageWatermarkService;
use mulletor_core::{Config, PaymentPipeline};

/// getUpdates long-poll window in seconds
const POLL_TIMEOUT_SECS: u64 = 50;

/// Backoff after a failed getUpdates call
const POLL_RETRY_SECS: u64 = 5;

/// Interval between payment store TTL sweeps (10 minutes)
const CLEANUP_INTERVAL_SECS: u64 = 600;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let api = Arc::new(BotApi::new(config.bot_token.clone()));
    let transport = Arc::new(FalHttpClient::new(config.fal_api_key.clone())) as Arc<dyn FalTransport>;
    let generator = Arc::new(MulletService::new(FalQueue::new(transport)));
    let post_processor = Arc::new(ImageWatermarkService::new());
    let store = Arc::new(PaymentStore::new(Arc::new(SystemClock) as Arc<dyn Clock>));

    let pipeline = Arc::new(PaymentPipeline::new(
        api.clone(),
        generator,
        post_processor,
        store.clone(),
        config.dev_chat_id,
    ));

    let sweeper = tokio::spawn(cleanup_loop(store));

    info!("Mulletor bot started");
    run(api, pipeline).await;

    sweeper.abort();
    info!("Mulletor bot stopped");
    Ok(())
}

async fn run(api: Arc<BotApi>, pipeline: Arc<PaymentPipeline>) {
    let mut offset = 0i64;
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, draining in-flight handlers");
                break;
            }
            polled = api.get_updates(offset, POLL_TIMEOUT_SECS) => {
                match polled {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            let pipeline = pipeline.clone();
                            handlers.spawn(async move {
                                pipeline.handle_update(update).await;
                            });
                        }
                    }
                    Err(e) => {
                        warn!("getUpdates failed: {e}, retrying in {POLL_RETRY_SECS}s");
                        tokio::time::sleep(Duration::from_secs(POLL_RETRY_SECS)).await;
                    }
                }
            }
        }

        // reap finished handlers so the set does not grow unbounded
        while let Some(finished) = handlers.try_join_next() {
            if let Err(e) = finished {
                error!("Update handler panicked: {e}");
            }
        }
    }

    tokio::select! {
        _ = drain(&mut handlers) => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Second Ctrl-C, exiting without draining");
            std::process::exit(1);
        }
    }
}

async fn drain(handlers: &mut JoinSet<()>) {
    while let Some(finished) = handlers.join_next().await {
        if let Err(e) = finished {
            error!("Update handler panicked: {e}");
        }
    }
}

async fn cleanup_loop(store: Arc<PaymentStore>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
    ticker.tick().await; // first tick fires immediately

    loop {
        ticker.tick().await;
        let dropped = store.cleanup();
        if dropped > 0 {
            info!("Dropped {dropped} expired payment contexts");
        }
    }
}
