use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::Settings;
use crate::db::ledger::ChatLedger;
use crate::db::store::StoreError;

fn is_waiting(ledger: &ChatLedger, chat_id: i64, count: u64, settings: &Settings) -> bool {
    chat_id > 0
        && count > settings.trial_allowance(chat_id) + 2
        && ledger.partner(chat_id).is_none()
        && !ledger.was_ever_entitled(chat_id)
}

/// Smallest private chat that has walked past every nudge and is still
/// waiting for someone to talk to.
pub fn find_candidate(
    ledger: &ChatLedger,
    requester: i64,
    settings: &Settings,
) -> Option<i64> {
    ledger
        .request_counts()
        .filter(|(chat_id, _)| *chat_id != requester)
        .find(|(chat_id, count)| is_waiting(ledger, *chat_id, *count, settings))
        .map(|(chat_id, _)| chat_id)
}

pub fn pair_random(
    ledger: &mut ChatLedger,
    requester: i64,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<Option<i64>, StoreError> {
    if requester <= 0 || ledger.partner(requester).is_some() || ledger.is_entitled(requester, now)
    {
        return Ok(ledger.partner(requester));
    }
    let Some(candidate) = find_candidate(ledger, requester, settings) else {
        return Ok(None);
    };
    ledger.pair(requester, candidate)?;
    info!("Paired chat {} with waiting chat {}", requester, candidate);
    Ok(Some(candidate))
}

/// Partner to relay to, unless the partner has since subscribed.
pub fn relay_target(ledger: &ChatLedger, chat_id: i64, now: DateTime<Utc>) -> Option<i64> {
    ledger
        .partner(chat_id)
        .filter(|partner| !ledger.is_entitled(*partner, now))
}
