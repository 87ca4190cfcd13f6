use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::db::ledger::ChatLedger;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentUsage {
    pub chats: usize,
    pub requests: u64,
    pub cost: f64,
}

impl SegmentUsage {
    fn add(&mut self, requests: u64, price: f64) {
        self.chats += 1;
        self.requests += requests;
        self.cost += requests as f64 * price;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageReport {
    pub known_chats: usize,
    pub advertising: SegmentUsage,
    pub operational: SegmentUsage,
    pub paying_chats: usize,
    pub revenue: f64,
    pub conversion_percent: f64,
}

pub fn build_report(ledger: &ChatLedger, settings: &Settings, now: DateTime<Utc>) -> UsageReport {
    let mut report = UsageReport::default();
    let known = ledger.known_chat_ids();
    report.known_chats = known.len();

    let mut ever_entitled = 0_usize;
    for chat_id in known {
        let requests = ledger.request_count(chat_id);
        let entitled = ledger.is_entitled(chat_id, now);
        let promoted = settings.is_promo_chat(chat_id);
        if ledger.was_ever_entitled(chat_id) {
            ever_entitled += 1;
        }
        if (ledger.has_context(chat_id) && !entitled) || promoted {
            report.advertising.add(requests, settings.usage_request_price);
        }
        if entitled && !promoted {
            report.operational.add(requests, settings.usage_request_price);
        }
    }

    report.paying_chats = ever_entitled.saturating_sub(settings.usage_offset);
    report.revenue = report.paying_chats as f64 * settings.usage_subscription_price;
    report.conversion_percent = if report.known_chats == 0 {
        0.0
    } else {
        report.paying_chats as f64 / report.known_chats as f64 * 100.0
    };
    report
}

impl UsageReport {
    pub fn render(&self) -> String {
        format!(
            "Chats: {}\nAdvertising: {} chats, {} requests, cost ${:.2}\nOperational: {} chats, {} requests, cost ${:.2}\nPaying chats: {}\nRevenue: ${:.2}\nConversion: {:.2}%",
            self.known_chats,
            self.advertising.chats,
            self.advertising.requests,
            self.advertising.cost,
            self.operational.chats,
            self.operational.requests,
            self.operational.cost,
            self.paying_chats,
            self.revenue,
            self.conversion_percent
        )
    }
}
