use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::Settings;
use crate::db::ledger::ChatLedger;
use crate::db::store::StoreError;

fn premium_factor(ledger: &ChatLedger, chat_id: i64, settings: &Settings, now: DateTime<Utc>) -> usize {
    if chat_id > 0 && ledger.is_entitled(chat_id, now) {
        settings.premium_multiplier.max(1)
    } else {
        1
    }
}

pub fn window_size(ledger: &ChatLedger, chat_id: i64, settings: &Settings, now: DateTime<Utc>) -> usize {
    let depth = ledger
        .context_depth(chat_id)
        .unwrap_or(settings.context_size);
    depth * premium_factor(ledger, chat_id, settings, now)
}

pub fn max_text_length(
    ledger: &ChatLedger,
    chat_id: i64,
    settings: &Settings,
    now: DateTime<Utc>,
) -> usize {
    settings.max_message_length * premium_factor(ledger, chat_id, settings, now)
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Keeps the trailing `max_chars` characters.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let skip = total - max_chars;
    match text.char_indices().nth(skip) {
        Some((index, _)) => &text[index..],
        None => "",
    }
}

/// Clears the buffer after a long silence, records the activity, and trims
/// the buffer to the chat's current window. Returns true when the buffer
/// was expired.
pub fn touch(
    ledger: &mut ChatLedger,
    chat_id: i64,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let idle_limit = Duration::seconds(settings.context_idle_timeout_seconds);
    let expired = ledger
        .last_activity(chat_id)
        .map(|last| now - last > idle_limit)
        .unwrap_or(false);

    if expired {
        debug!("Context for chat {} expired after idle period", chat_id);
        ledger.set_context(chat_id, String::new())?;
    } else {
        let window = window_size(ledger, chat_id, settings, now);
        let current = ledger.context(chat_id);
        let trimmed = tail_chars(current, window);
        if trimmed.len() != current.len() || !ledger.has_context(chat_id) {
            let trimmed = trimmed.to_string();
            ledger.set_context(chat_id, trimmed)?;
        }
    }
    ledger.set_last_activity(chat_id, now)?;
    Ok(expired)
}

pub fn append(
    ledger: &mut ChatLedger,
    chat_id: i64,
    text: &str,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    if text.is_empty() {
        return Ok(());
    }
    let window = window_size(ledger, chat_id, settings, now);
    let mut buffer = ledger.context(chat_id).to_string();
    buffer.push_str(text);
    let trimmed = tail_chars(&buffer, window).to_string();
    ledger.set_context(chat_id, trimmed)
}

pub fn reset(ledger: &mut ChatLedger, chat_id: i64) -> Result<(), StoreError> {
    ledger.set_context(chat_id, String::new())
}
