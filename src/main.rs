use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use tracing::{error, info};

mod config;
mod db;
mod engine;
mod handlers;
mod llm;
mod state;
#[cfg(test)]
mod testkit;
mod utils;

use config::{Settings, CONFIG};
use db::ledger::ChatLedger;
use db::store::FileStore;
use handlers::access::spawn_hourly_reset;
use handlers::inbound::InboundMessage;
use handlers::pipeline::handle_inbound;
use handlers::transport::{TelegramTransport, Transport};
use llm::LiveServices;
use state::AppState;
use utils::logging::init_logging;

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging();

    if CONFIG.bot_token.trim().is_empty() {
        return Err("BOT_TOKEN is required".into());
    }

    let bot = Bot::new(CONFIG.bot_token.clone());
    info!("Starting paywall chat bot");

    let store = Arc::new(FileStore::open(&CONFIG.data_dir)?);
    let ledger = ChatLedger::load(store)?;
    let state = AppState::new(ledger, Arc::new(LiveServices), Settings::from_config(&CONFIG));
    let _hourly_reset = spawn_hourly_reset(state.guard.clone());

    let message_handler = Update::filter_message().endpoint(handle_message);
    let checkout_handler = Update::filter_pre_checkout_query().endpoint(handle_pre_checkout);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(checkout_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    let inbound = InboundMessage::from_telegram(&message);
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot));
    tokio::spawn(handle_inbound(state, transport, inbound));
    Ok(())
}

async fn handle_pre_checkout(bot: Bot, query: PreCheckoutQuery) -> HandlerResult {
    info!(
        "Pre-checkout from {:?} ({}) payload={}",
        query.from.username, query.from.id, query.invoice_payload
    );
    if let Err(err) = bot.answer_pre_checkout_query(query.id.clone(), true).await {
        error!("answer_pre_checkout_query failed: {err}");
    }
    Ok(())
}
