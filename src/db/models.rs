use std::fmt;

use chrono::{DateTime, Utc};

/// Named maps the bot keeps per chat. Each one is persisted as its own
/// document so a mutation only rewrites the map it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Opened,
    Trial,
    Skip,
    Temperature,
    Mode,
    Context,
    Time,
    Humans,
}

impl StoreKey {
    pub fn name(self) -> &'static str {
        match self {
            StoreKey::Opened => "opened",
            StoreKey::Trial => "trial",
            StoreKey::Skip => "skip",
            StoreKey::Temperature => "temperature",
            StoreKey::Mode => "mode",
            StoreKey::Context => "context",
            StoreKey::Time => "time",
            StoreKey::Humans => "humans",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.name())
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only view of everything known about one chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatAccount {
    pub chat_id: i64,
    pub subscription_expiry: Option<DateTime<Utc>>,
    pub request_count: u64,
    pub skip_factor: u32,
    pub temperature: Option<f32>,
    pub mode_suffix: String,
    pub last_activity: Option<DateTime<Utc>>,
    pub context_buffer: String,
    pub last_artifact: Option<String>,
    pub paired_with: Option<i64>,
}

impl ChatAccount {
    pub fn is_entitled(&self, now: DateTime<Utc>) -> bool {
        self.subscription_expiry
            .map(|expiry| now < expiry)
            .unwrap_or(false)
    }
}
