use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::engine::context;
use crate::engine::entitlement::{classify, Nudge, Verdict};
use crate::handlers::commands::{apply, build_invoice, parse_command, CommandContext, Reply};
use crate::handlers::inbound::InboundMessage;
use crate::handlers::payments::credit_payment;
use crate::handlers::router::{classify_capability, Route};
use crate::handlers::transport::Transport;
use crate::state::AppState;
use crate::utils::locale::texts;
use crate::utils::timing::start_handling_timer;

async fn send_reply(transport: &dyn Transport, chat_id: i64, reply: Reply) -> Result<()> {
    match reply {
        Reply::Text(text) => transport.send_text(chat_id, &text).await,
        Reply::Invoice(invoice) => transport.send_invoice(chat_id, &invoice).await,
    }
}

async fn send_link(transport: &dyn Transport, chat_id: i64, link: &str) -> Result<()> {
    if link.trim().is_empty() {
        return Ok(());
    }
    transport.send_text(chat_id, link).await
}

async fn relay(transport: &dyn Transport, partner: i64, message: &InboundMessage) -> Result<()> {
    if let Some(file_id) = message.photo_file_id.as_deref() {
        transport.forward_photo(partner, file_id).await?;
    }
    if let Some(text) = message.text.as_deref() {
        transport.send_text(partner, text).await?;
    }
    Ok(())
}

/// Runs one message through guard, commands, payment, entitlement, context
/// and routing. Returns a short outcome label for the timing log.
pub async fn process_message(
    state: &AppState,
    transport: Arc<dyn Transport>,
    message: &InboundMessage,
    now: DateTime<Utc>,
) -> Result<&'static str> {
    let chat_id = message.chat_id;
    let locale = message.locale();
    let settings = state.settings.as_ref();
    let strings = texts(locale);

    let decision = {
        let mut ledger = state.ledger.lock();
        state.guard.check(message, &mut ledger, settings, now)?
    };
    if decision.is_blocked() {
        return Ok("blocked");
    }

    if let Some(command) = message
        .text
        .as_deref()
        .and_then(|text| parse_command(text, settings))
    {
        let replies = {
            let mut ledger = state.ledger.lock();
            let ctx = CommandContext {
                chat_id,
                username: message.username.as_deref(),
                locale,
                settings,
                now,
            };
            apply(&command, &mut ledger, &ctx)?
        };
        info!(
            "Command {} in chat {} from {:?}",
            command.name(),
            chat_id,
            message.username
        );
        for reply in replies {
            send_reply(transport.as_ref(), chat_id, reply).await?;
        }
        return Ok("command");
    }

    if let Some(notice) = &message.payment {
        let credit = {
            let mut ledger = state.ledger.lock();
            credit_payment(
                &mut ledger,
                notice,
                chat_id,
                message.username.as_deref(),
                locale,
                settings,
                now,
            )?
        };
        transport.send_text(chat_id, &credit.thanks).await?;
        if let Some((admin, body)) = credit.admin_notice {
            if let Err(err) = transport.send_text(admin, &body).await {
                warn!("Failed to notify admin about payment: {err}");
            }
        }
        return Ok("payment");
    }

    if message.text.is_none() && message.photo_file_id.is_none() {
        return Ok("ignored");
    }

    let verdict = {
        let mut ledger = state.ledger.lock();
        classify(&mut ledger, chat_id, settings, now)?
    };
    match verdict {
        Verdict::Allow => {}
        Verdict::PaymentRequired => {
            transport.send_text(chat_id, strings.trial_unavailable).await?;
            let invoice = build_invoice(chat_id, locale, settings);
            transport.send_invoice(chat_id, &invoice).await?;
            return Ok(verdict.label());
        }
        Verdict::QuotaExceeded => {
            transport.send_text(chat_id, strings.quota_exceeded).await?;
            return Ok(verdict.label());
        }
        Verdict::Nudge(Nudge::PromoLink) => {
            send_link(transport.as_ref(), chat_id, &settings.promo_link).await?;
            return Ok(verdict.label());
        }
        Verdict::Nudge(Nudge::Invoice) => {
            let invoice = build_invoice(chat_id, locale, settings);
            transport.send_invoice(chat_id, &invoice).await?;
            return Ok(verdict.label());
        }
        Verdict::Nudge(Nudge::HelpLink) => {
            send_link(transport.as_ref(), chat_id, &settings.payment_help_link).await?;
            return Ok(verdict.label());
        }
        Verdict::RelayToHuman { partner } => {
            relay(transport.as_ref(), partner, message).await?;
            return Ok(verdict.label());
        }
        Verdict::Unpaired => return Ok(verdict.label()),
    }

    let max_length = {
        let mut ledger = state.ledger.lock();
        context::touch(&mut ledger, chat_id, settings, now)?;
        context::max_text_length(&ledger, chat_id, settings, now)
    };
    let text = message
        .text
        .as_deref()
        .map(|value| context::truncate_chars(value, max_length));
    let Some(capability) = classify_capability(message.photo_file_id.as_deref(), text.as_deref())
    else {
        return Ok("ignored");
    };

    let route = Route {
        state,
        transport,
        chat_id,
        locale,
        now,
    };
    route.dispatch(&capability).await
}

/// Entry point for every Telegram message. Errors are logged, never raised.
pub async fn handle_inbound(state: AppState, transport: Arc<dyn Transport>, message: InboundMessage) {
    let mut timer = start_handling_timer(&message);
    let _chat_guard = state.lock_chat(message.chat_id).await;
    match process_message(&state, transport, &message, Utc::now()).await {
        Ok(outcome) => timer.mark_outcome(outcome),
        Err(err) => {
            timer.mark_outcome("error");
            error!(
                "Failed to handle message in chat {} from {:?}: {err:#}",
                message.chat_id, message.username
            );
        }
    }
    timer.log_completed();
}
