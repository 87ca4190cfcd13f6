use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::db::ledger::ChatLedger;
use crate::db::store::StoreError;
use crate::engine::add_months;
use crate::handlers::inbound::InboundMessage;

const PROMO_WINDOW_SECONDS: i64 = 60;
const HOURLY_RESET_INTERVAL: StdDuration = StdDuration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Blacklisted,
    HourlyLimit,
    MinuteLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Blocked(BlockReason),
}

impl GuardDecision {
    pub fn is_blocked(self) -> bool {
        matches!(self, GuardDecision::Blocked(_))
    }
}

#[derive(Debug, Default)]
pub struct AbuseState {
    window: VecDeque<DateTime<Utc>>,
    hourly: HashMap<i64, u32>,
}

impl AbuseState {
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(PROMO_WINDOW_SECONDS);
        while let Some(front) = self.window.front() {
            if *front <= cutoff {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct AbuseGuard {
    state: Mutex<AbuseState>,
}

fn is_blacklisted(message: &InboundMessage, settings: &Settings) -> bool {
    if settings.blacklist.is_empty() {
        return false;
    }
    let username = message
        .username
        .as_deref()
        .map(|name| name.trim_start_matches('@').to_lowercase());
    let sender_id = message.sender_id.map(|id| id.to_string());
    settings.blacklist.iter().any(|entry| {
        username.as_deref() == Some(entry.as_str()) || sender_id.as_deref() == Some(entry.as_str())
    })
}

impl AbuseGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs before anything else touches the message. May extend the
    /// owner's subscription or end a promotional chat's free run.
    pub fn check(
        &self,
        message: &InboundMessage,
        ledger: &mut ChatLedger,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<GuardDecision, StoreError> {
        let chat_id = message.chat_id;

        if settings.is_owner(message.username.as_deref()) {
            let granted = add_months(now, 1);
            if ledger.subscription_expiry(chat_id).map_or(true, |expiry| expiry < granted) {
                ledger.set_subscription_expiry(chat_id, granted)?;
                debug!("Owner message in chat {}; subscription extended", chat_id);
            }
            return Ok(GuardDecision::Allow);
        }

        if is_blacklisted(message, settings) {
            info!(
                "Blocked blacklisted sender {:?} ({:?}) in chat {}",
                message.username, message.sender_id, chat_id
            );
            return Ok(GuardDecision::Blocked(BlockReason::Blacklisted));
        }

        if !settings.is_promo_chat(chat_id) {
            return Ok(GuardDecision::Allow);
        }

        let sender_key = message.sender_id.unwrap_or(chat_id);
        let mut state = self.state.lock();

        let hourly = state.hourly.entry(sender_key).or_insert(0);
        *hourly += 1;
        if *hourly > settings.promo_hourly_limit {
            info!(
                "Hourly limit reached for sender {} in promotional chat {} ({} calls)",
                sender_key, chat_id, *hourly
            );
            return Ok(GuardDecision::Blocked(BlockReason::HourlyLimit));
        }

        state.prune(now);
        if state.window.len() >= settings.promo_minute_limit {
            let in_window = state.window.len();
            drop(state);
            warn!(
                "Promotional minute limit reached ({} calls); closing chat {}",
                in_window, chat_id
            );
            ledger.set_subscription_expiry(chat_id, now)?;
            return Ok(GuardDecision::Blocked(BlockReason::MinuteLimit));
        }
        state.window.push_back(now);
        Ok(GuardDecision::Allow)
    }

    pub fn reset_hourly(&self) {
        let mut state = self.state.lock();
        let senders = state.hourly.len();
        state.hourly.clear();
        debug!("Cleared hourly counters for {} sender(s)", senders);
    }
}

pub fn spawn_hourly_reset(guard: Arc<AbuseGuard>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HOURLY_RESET_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            guard.reset_hourly();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{ledger, text_from};

    const PROMO_CHAT: i64 = -1001;

    fn promo_settings() -> Settings {
        Settings {
            promo_chat_ids: vec![PROMO_CHAT],
            blacklist: vec!["spammer".to_string(), "666".to_string()],
            owner_username: "boss".to_string(),
            ..Settings::default()
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn blacklisted_sender_is_always_blocked() {
        let guard = AbuseGuard::new();
        let mut ledger = ledger();
        let settings = promo_settings();
        ledger
            .set_subscription_expiry(50, now() + Duration::days(30))
            .unwrap();

        let by_name = text_from(50, 1, Some("SpamMer"), "hi");
        let by_id = text_from(50, 666, None, "hi");
        assert_eq!(
            guard.check(&by_name, &mut ledger, &settings, now()).unwrap(),
            GuardDecision::Blocked(BlockReason::Blacklisted)
        );
        assert_eq!(
            guard.check(&by_id, &mut ledger, &settings, now()).unwrap(),
            GuardDecision::Blocked(BlockReason::Blacklisted)
        );
    }

    #[test]
    fn owner_is_never_blocked_and_gets_a_month() {
        let guard = AbuseGuard::new();
        let mut ledger = ledger();
        let settings = promo_settings();
        let message = text_from(PROMO_CHAT, 1, Some("Boss"), "hello");
        for _ in 0..50 {
            assert_eq!(
                guard.check(&message, &mut ledger, &settings, now()).unwrap(),
                GuardDecision::Allow
            );
        }
        assert_eq!(
            ledger.subscription_expiry(PROMO_CHAT),
            Some(add_months(now(), 1))
        );
    }

    #[test]
    fn owner_message_never_shortens_a_paid_subscription() {
        let guard = AbuseGuard::new();
        let mut ledger = ledger();
        let settings = promo_settings();
        let paid = add_months(now(), 2);
        ledger.set_subscription_expiry(-500, paid).unwrap();
        ledger
            .set_subscription_expiry(-501, now() + Duration::days(3))
            .unwrap();

        guard
            .check(&text_from(-500, 1, Some("boss"), "hi"), &mut ledger, &settings, now())
            .unwrap();
        guard
            .check(&text_from(-501, 1, Some("boss"), "hi"), &mut ledger, &settings, now())
            .unwrap();
        assert_eq!(ledger.subscription_expiry(-500), Some(paid));
        assert_eq!(
            ledger.subscription_expiry(-501),
            Some(add_months(now(), 1))
        );
    }

    #[test]
    fn other_chats_are_not_rate_limited() {
        let guard = AbuseGuard::new();
        let mut ledger = ledger();
        let settings = promo_settings();
        let message = text_from(-42, 1, Some("someone"), "hello");
        for _ in 0..100 {
            assert!(!guard
                .check(&message, &mut ledger, &settings, now())
                .unwrap()
                .is_blocked());
        }
    }

    #[test]
    fn sixteenth_promo_call_in_a_minute_is_blocked_and_closes_the_chat() {
        let guard = AbuseGuard::new();
        let mut ledger = ledger();
        let settings = promo_settings();
        ledger
            .set_subscription_expiry(PROMO_CHAT, now() + Duration::days(10))
            .unwrap();

        for index in 0..15 {
            let sender = 100 + (index % 4);
            let message = text_from(PROMO_CHAT, sender, None, "hi");
            let at = now() + Duration::seconds(index);
            assert_eq!(
                guard.check(&message, &mut ledger, &settings, at).unwrap(),
                GuardDecision::Allow,
                "call {} should pass",
                index + 1
            );
        }

        let at = now() + Duration::seconds(20);
        let message = text_from(PROMO_CHAT, 200, None, "hi");
        assert_eq!(
            guard.check(&message, &mut ledger, &settings, at).unwrap(),
            GuardDecision::Blocked(BlockReason::MinuteLimit)
        );
        assert_eq!(ledger.subscription_expiry(PROMO_CHAT), Some(at));
        assert!(!ledger.is_entitled(PROMO_CHAT, at));
    }

    #[test]
    fn window_entries_older_than_a_minute_are_pruned() {
        let guard = AbuseGuard::new();
        let mut ledger = ledger();
        let settings = promo_settings();
        for index in 0..15 {
            let message = text_from(PROMO_CHAT, 100 + (index % 4), None, "hi");
            guard.check(&message, &mut ledger, &settings, now()).unwrap();
        }
        let later = now() + Duration::seconds(61);
        let message = text_from(PROMO_CHAT, 300, None, "hi");
        assert_eq!(
            guard.check(&message, &mut ledger, &settings, later).unwrap(),
            GuardDecision::Allow
        );
    }

    #[test]
    fn hourly_limit_is_per_sender_and_wiped_by_reset() {
        let guard = AbuseGuard::new();
        let mut ledger = ledger();
        let settings = promo_settings();
        let message = text_from(PROMO_CHAT, 7, None, "hi");
        for minute in 0..5 {
            let at = now() + Duration::minutes(minute * 2);
            assert_eq!(
                guard.check(&message, &mut ledger, &settings, at).unwrap(),
                GuardDecision::Allow
            );
        }
        let at = now() + Duration::minutes(12);
        assert_eq!(
            guard.check(&message, &mut ledger, &settings, at).unwrap(),
            GuardDecision::Blocked(BlockReason::HourlyLimit)
        );

        let other = text_from(PROMO_CHAT, 8, None, "hi");
        assert_eq!(
            guard.check(&other, &mut ledger, &settings, at).unwrap(),
            GuardDecision::Allow
        );

        guard.reset_hourly();
        assert_eq!(
            guard.check(&message, &mut ledger, &settings, at).unwrap(),
            GuardDecision::Allow
        );
    }
}
