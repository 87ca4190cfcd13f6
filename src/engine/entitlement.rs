use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::{Settings, TrialPolicy};
use crate::db::ledger::ChatLedger;
use crate::db::store::StoreError;
use crate::engine::pairing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nudge {
    PromoLink,
    Invoice,
    HelpLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Trial spent: send the invoice and the "trial unavailable" notice.
    PaymentRequired,
    /// Lifetime ceiling hit: counter reset and subscription closed.
    QuotaExceeded,
    Nudge(Nudge),
    RelayToHuman { partner: i64 },
    /// Legacy policy with nobody to relay to. Nothing is sent.
    Unpaired,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::PaymentRequired => "payment_required",
            Verdict::QuotaExceeded => "quota_exceeded",
            Verdict::Nudge(Nudge::PromoLink) => "nudge_promo",
            Verdict::Nudge(Nudge::Invoice) => "nudge_invoice",
            Verdict::Nudge(Nudge::HelpLink) => "nudge_help",
            Verdict::RelayToHuman { .. } => "relay",
            Verdict::Unpaired => "unpaired",
        }
    }
}

/// Counts the message against the chat and decides whether it may reach
/// the AI services. Must run once per non-command, non-payment message.
pub fn classify(
    ledger: &mut ChatLedger,
    chat_id: i64,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<Verdict, StoreError> {
    let count = ledger.increment_requests(chat_id)?;
    let allowance = settings.trial_allowance(chat_id);

    if !ledger.is_entitled(chat_id, now) && count > allowance {
        return match settings.trial_policy {
            TrialPolicy::ImmediatePayment => {
                ledger.decrement_requests(chat_id)?;
                info!(
                    "Trial exhausted for chat {} ({} > {}); payment required",
                    chat_id, count, allowance
                );
                Ok(Verdict::PaymentRequired)
            }
            TrialPolicy::LegacyNudge => {
                legacy_verdict(ledger, chat_id, count - allowance, settings, now)
            }
        };
    }

    if !settings.is_promo_chat(chat_id) && count > settings.lifetime_ceiling(chat_id) {
        warn!(
            "Chat {} exceeded lifetime ceiling ({} > {}); closing subscription",
            chat_id,
            count,
            settings.lifetime_ceiling(chat_id)
        );
        ledger.reset_requests(chat_id)?;
        ledger.set_subscription_expiry(chat_id, now)?;
        return Ok(Verdict::QuotaExceeded);
    }

    Ok(Verdict::Allow)
}

fn legacy_verdict(
    ledger: &mut ChatLedger,
    chat_id: i64,
    over_allowance: u64,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<Verdict, StoreError> {
    match over_allowance {
        1 => return Ok(Verdict::Nudge(Nudge::PromoLink)),
        2 => return Ok(Verdict::Nudge(Nudge::Invoice)),
        3 => return Ok(Verdict::Nudge(Nudge::HelpLink)),
        _ => {}
    }
    if chat_id <= 0 {
        return Ok(Verdict::Unpaired);
    }

    if ledger.partner(chat_id).is_none() {
        pairing::pair_random(ledger, chat_id, settings, now)?;
    }
    match pairing::relay_target(ledger, chat_id, now) {
        Some(partner) => Ok(Verdict::RelayToHuman { partner }),
        None => {
            info!("No partner available for chat {}; relay skipped", chat_id);
            Ok(Verdict::Unpaired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::add_months;
    use crate::testkit::ledger;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn legacy() -> Settings {
        Settings {
            trial_policy: TrialPolicy::LegacyNudge,
            trial_count_private: 2,
            ..Settings::default()
        }
    }

    #[test]
    fn first_message_without_trial_requires_payment_and_leaves_counter_at_zero() {
        let mut ledger = ledger();
        let settings = Settings::default();
        assert_eq!(
            classify(&mut ledger, 100, &settings, now()).unwrap(),
            Verdict::PaymentRequired
        );
        assert_eq!(ledger.request_count(100), 0);
    }

    #[test]
    fn counter_never_exceeds_allowance_while_unentitled() {
        for allowance in [0_u64, 1, 3, 10] {
            let mut ledger = ledger();
            let settings = Settings {
                trial_count_private: allowance,
                ..Settings::default()
            };
            for turn in 1..=(allowance + 20) {
                let verdict = classify(&mut ledger, 100, &settings, now()).unwrap();
                if turn <= allowance {
                    assert_eq!(verdict, Verdict::Allow);
                } else {
                    assert_eq!(verdict, Verdict::PaymentRequired);
                }
                assert!(ledger.request_count(100) <= allowance);
            }
            assert_eq!(ledger.request_count(100), allowance);
        }
    }

    #[test]
    fn groups_use_their_own_allowance() {
        let mut ledger = ledger();
        let settings = Settings {
            trial_count_private: 5,
            trial_count_group: 0,
            ..Settings::default()
        };
        assert_eq!(
            classify(&mut ledger, -300, &settings, now()).unwrap(),
            Verdict::PaymentRequired
        );
        assert_eq!(
            classify(&mut ledger, 300, &settings, now()).unwrap(),
            Verdict::Allow
        );
    }

    #[test]
    fn subscribed_chat_is_allowed_until_the_lifetime_ceiling() {
        let mut ledger = ledger();
        let settings = Settings {
            max_requests_private: 3,
            ..Settings::default()
        };
        ledger
            .set_subscription_expiry(100, add_months(now(), 2))
            .unwrap();
        for _ in 0..3 {
            assert_eq!(
                classify(&mut ledger, 100, &settings, now()).unwrap(),
                Verdict::Allow
            );
        }
        assert_eq!(
            classify(&mut ledger, 100, &settings, now()).unwrap(),
            Verdict::QuotaExceeded
        );
        assert_eq!(ledger.request_count(100), 0);
        assert_eq!(ledger.subscription_expiry(100), Some(now()));
        assert_eq!(
            classify(&mut ledger, 100, &settings, now()).unwrap(),
            Verdict::PaymentRequired
        );
    }

    #[test]
    fn promotional_chats_skip_the_lifetime_ceiling() {
        let mut ledger = ledger();
        let settings = Settings {
            max_requests_group: 2,
            promo_chat_ids: vec![-77],
            ..Settings::default()
        };
        ledger
            .set_subscription_expiry(-77, add_months(now(), 1))
            .unwrap();
        for _ in 0..10 {
            assert_eq!(
                classify(&mut ledger, -77, &settings, now()).unwrap(),
                Verdict::Allow
            );
        }
        assert_eq!(ledger.request_count(-77), 10);
    }

    #[test]
    fn legacy_policy_walks_the_nudges_then_relays() {
        let mut ledger = ledger();
        let settings = legacy();
        for _ in 0..5 {
            classify(&mut ledger, 10, &settings, now()).unwrap();
        }
        assert_eq!(ledger.request_count(10), 5);

        let verdicts: Vec<Verdict> = (0..6)
            .map(|_| classify(&mut ledger, 20, &settings, now()).unwrap())
            .collect();
        assert_eq!(
            verdicts,
            vec![
                Verdict::Allow,
                Verdict::Allow,
                Verdict::Nudge(Nudge::PromoLink),
                Verdict::Nudge(Nudge::Invoice),
                Verdict::Nudge(Nudge::HelpLink),
                Verdict::RelayToHuman { partner: 10 },
            ]
        );
        assert_eq!(ledger.request_count(20), 6);
        assert_eq!(ledger.partner(10), Some(20));
    }

    #[test]
    fn legacy_relay_is_skipped_once_partner_subscribes() {
        let mut ledger = ledger();
        let settings = legacy();
        ledger.pair(10, 20).unwrap();
        for _ in 0..6 {
            classify(&mut ledger, 20, &settings, now()).unwrap();
        }
        ledger
            .set_subscription_expiry(10, add_months(now(), 1))
            .unwrap();
        assert_eq!(
            classify(&mut ledger, 20, &settings, now()).unwrap(),
            Verdict::Unpaired
        );
    }

    #[test]
    fn legacy_groups_are_never_paired() {
        let mut ledger = ledger();
        let settings = legacy();
        let verdicts: Vec<Verdict> = (0..5)
            .map(|_| classify(&mut ledger, -5, &settings, now()).unwrap())
            .collect();
        assert_eq!(verdicts[3], Verdict::Unpaired);
        assert_eq!(verdicts[4], Verdict::Unpaired);
        assert_eq!(ledger.partner(-5), None);
    }
}
