use std::env;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialPolicy {
    /// Prompt for payment as soon as the free allowance is spent.
    ImmediatePayment,
    /// Three nudge turns, then relay the chat to another waiting human.
    LegacyNudge,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub data_dir: PathBuf,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub completion_max_tokens: u32,
    pub stability_api_key: String,
    pub stability_endpoint: String,
    pub replicate_api_key: String,
    pub replicate_base_url: String,
    pub replicate_caption_version: String,
    pub google_api_key: String,
    pub google_search_cx: String,
    pub google_search_endpoint: String,
    pub payment_provider_token: String,
    pub payment_currency: String,
    pub price_private_minor: u32,
    pub price_group_minor: u32,
    pub invoice_photo_url: String,
    pub payment_help_link: String,
    pub promo_link: String,
    pub support_contact: String,
    pub admin_chat_id: Option<i64>,
    pub owner_username: String,
    pub blacklist: Vec<String>,
    pub promo_chat_ids: Vec<i64>,
    pub trial_count_private: u64,
    pub trial_count_group: u64,
    pub context_size: usize,
    pub context_idle_timeout_seconds: i64,
    pub max_message_length: usize,
    pub premium_multiplier: usize,
    pub max_requests_private: u64,
    pub max_requests_group: u64,
    pub promo_hourly_limit: u32,
    pub promo_minute_limit: usize,
    pub subscription_months: u32,
    pub unlock_phrase: String,
    pub unlock_until: DateTime<Utc>,
    pub trial_policy: TrialPolicy,
    pub default_temperature: f32,
    pub usage_request_price: f64,
    pub usage_subscription_price: f64,
    pub usage_offset: usize,
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::load);

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().replace(',', ".").parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().replace(',', ".").parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_optional_i64(name: &str) -> Option<i64> {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
}

fn env_csv_lowercase(name: &str, default: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|value| value.trim().trim_start_matches('@').to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

fn env_i64_list(name: &str) -> Vec<i64> {
    let raw = env::var(name).unwrap_or_default();
    let mut ids = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        match entry.parse::<i64>() {
            Ok(id) => ids.push(id),
            Err(_) => warn!("Ignoring invalid chat id '{}' in {}", entry, name),
        }
    }
    ids
}

fn parse_trial_policy(value: &str) -> TrialPolicy {
    match value.trim().to_lowercase().as_str() {
        "payment" | "" => TrialPolicy::ImmediatePayment,
        "legacy" | "nudge" | "pairing" => TrialPolicy::LegacyNudge,
        other => {
            warn!("Unknown TRIAL_POLICY value '{}'; defaulting to payment.", other);
            TrialPolicy::ImmediatePayment
        }
    }
}

fn default_unlock_until() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn parse_unlock_until(value: Option<String>) -> DateTime<Utc> {
    let Some(value) = value else {
        return default_unlock_until();
    };
    match DateTime::parse_from_rfc3339(value.trim()) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(err) => {
            warn!("Invalid UNLOCK_UNTIL value '{}': {}", value, err);
            default_unlock_until()
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Config {
            bot_token: env_string("BOT_TOKEN", ""),
            data_dir: PathBuf::from(env_string("DATA_DIR", "data")),
            openai_api_key: env_string("OPENAI_API_KEY", ""),
            openai_base_url: env_string("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: env_string("OPENAI_MODEL", "gpt-3.5-turbo"),
            completion_max_tokens: env_u32("COMPLETION_MAX_TOKENS", 800),
            stability_api_key: env_string("STABILITY_API_KEY", ""),
            stability_endpoint: env_string(
                "STABILITY_ENDPOINT",
                "https://api.stability.ai/v1/generation/stable-diffusion-v1-6/text-to-image",
            ),
            replicate_api_key: env_string("REPLICATE_API_KEY", ""),
            replicate_base_url: env_string("REPLICATE_BASE_URL", "https://api.replicate.com/v1"),
            replicate_caption_version: env_string(
                "REPLICATE_CAPTION_VERSION",
                "50adaf2d3ad20a6f911a8a9e3ccf777b263b8596fbd2c8fc26e8888f8a0edbb5",
            ),
            google_api_key: env_string("GOOGLE_API_KEY", ""),
            google_search_cx: env_string("GOOGLE_SEARCH_CX", ""),
            google_search_endpoint: env_string(
                "GOOGLE_SEARCH_ENDPOINT",
                "https://www.googleapis.com/customsearch/v1",
            ),
            payment_provider_token: env_string("PAYMENT_PROVIDER_TOKEN", ""),
            payment_currency: env_string("PAYMENT_CURRENCY", "USD").to_uppercase(),
            price_private_minor: env_u32("PRICE_PRIVATE_MINOR", 300),
            price_group_minor: env_u32("PRICE_GROUP_MINOR", 1000),
            invoice_photo_url: env_string("INVOICE_PHOTO_URL", ""),
            payment_help_link: env_string("PAYMENT_HELP_LINK", ""),
            promo_link: env_string("PROMO_LINK", ""),
            support_contact: env_string("SUPPORT_CONTACT", ""),
            admin_chat_id: env_optional_i64("ADMIN_CHAT_ID"),
            owner_username: env_string("OWNER_USERNAME", "")
                .trim()
                .trim_start_matches('@')
                .to_lowercase(),
            blacklist: env_csv_lowercase("BLACKLIST", ""),
            promo_chat_ids: env_i64_list("PROMO_CHAT_IDS"),
            trial_count_private: env_u64("TRIAL_COUNT_PRIVATE", 0),
            trial_count_group: env_u64("TRIAL_COUNT_GROUP", 0),
            context_size: env_usize("CONTEXT_SIZE", 200),
            context_idle_timeout_seconds: env_u64("CONTEXT_IDLE_TIMEOUT_SECONDS", 3600) as i64,
            max_message_length: env_usize("MAX_MESSAGE_LENGTH", 300),
            premium_multiplier: env_usize("PREMIUM_MULTIPLIER", 2).max(1),
            max_requests_private: env_u64("MAX_REQUESTS_PRIVATE", 1000),
            max_requests_group: env_u64("MAX_REQUESTS_GROUP", 3000),
            promo_hourly_limit: env_u32("PROMO_HOURLY_LIMIT", 5),
            promo_minute_limit: env_usize("PROMO_MINUTE_LIMIT", 15),
            subscription_months: env_u32("SUBSCRIPTION_MONTHS", 2).max(1),
            unlock_phrase: env_string("UNLOCK_PHRASE", "сезам приоткройся")
                .trim()
                .to_lowercase(),
            unlock_until: parse_unlock_until(env::var("UNLOCK_UNTIL").ok()),
            trial_policy: parse_trial_policy(&env_string("TRIAL_POLICY", "payment")),
            default_temperature: env_f32("DEFAULT_TEMPERATURE", 36.6),
            usage_request_price: env_f64("USAGE_REQUEST_PRICE", 0.02),
            usage_subscription_price: env_f64("USAGE_SUBSCRIPTION_PRICE", 3.0),
            usage_offset: env_usize("USAGE_OFFSET", 0),
        }
    }
}

/// Engine-facing limits and prices, derived once from [`Config`] so the
/// entitlement and context logic never reach for the global.
#[derive(Debug, Clone)]
pub struct Settings {
    pub trial_policy: TrialPolicy,
    pub trial_count_private: u64,
    pub trial_count_group: u64,
    pub max_requests_private: u64,
    pub max_requests_group: u64,
    pub promo_chat_ids: Vec<i64>,
    pub context_size: usize,
    pub context_idle_timeout_seconds: i64,
    pub max_message_length: usize,
    pub premium_multiplier: usize,
    pub subscription_months: u32,
    pub owner_username: String,
    pub blacklist: Vec<String>,
    pub promo_hourly_limit: u32,
    pub promo_minute_limit: usize,
    pub unlock_phrase: String,
    pub unlock_until: DateTime<Utc>,
    pub default_temperature: f32,
    pub completion_max_tokens: u32,
    pub admin_chat_id: Option<i64>,
    pub payment_currency: String,
    pub payment_provider_token: String,
    pub price_private_minor: u32,
    pub price_group_minor: u32,
    pub invoice_photo_url: String,
    pub payment_help_link: String,
    pub promo_link: String,
    pub support_contact: String,
    pub usage_request_price: f64,
    pub usage_subscription_price: f64,
    pub usage_offset: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            trial_policy: TrialPolicy::ImmediatePayment,
            trial_count_private: 0,
            trial_count_group: 0,
            max_requests_private: 1000,
            max_requests_group: 3000,
            promo_chat_ids: Vec::new(),
            context_size: 200,
            context_idle_timeout_seconds: 3600,
            max_message_length: 300,
            premium_multiplier: 2,
            subscription_months: 2,
            owner_username: String::new(),
            blacklist: Vec::new(),
            promo_hourly_limit: 5,
            promo_minute_limit: 15,
            unlock_phrase: "сезам приоткройся".to_string(),
            unlock_until: default_unlock_until(),
            default_temperature: 36.6,
            completion_max_tokens: 800,
            admin_chat_id: None,
            payment_currency: "USD".to_string(),
            payment_provider_token: String::new(),
            price_private_minor: 300,
            price_group_minor: 1000,
            invoice_photo_url: String::new(),
            payment_help_link: String::new(),
            promo_link: String::new(),
            support_contact: String::new(),
            usage_request_price: 0.02,
            usage_subscription_price: 3.0,
            usage_offset: 0,
        }
    }
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Settings {
            trial_policy: config.trial_policy,
            trial_count_private: config.trial_count_private,
            trial_count_group: config.trial_count_group,
            max_requests_private: config.max_requests_private,
            max_requests_group: config.max_requests_group,
            promo_chat_ids: config.promo_chat_ids.clone(),
            context_size: config.context_size,
            context_idle_timeout_seconds: config.context_idle_timeout_seconds,
            max_message_length: config.max_message_length,
            premium_multiplier: config.premium_multiplier,
            subscription_months: config.subscription_months,
            owner_username: config.owner_username.clone(),
            blacklist: config.blacklist.clone(),
            promo_hourly_limit: config.promo_hourly_limit,
            promo_minute_limit: config.promo_minute_limit,
            unlock_phrase: config.unlock_phrase.clone(),
            unlock_until: config.unlock_until,
            default_temperature: config.default_temperature,
            completion_max_tokens: config.completion_max_tokens,
            admin_chat_id: config.admin_chat_id,
            payment_currency: config.payment_currency.clone(),
            payment_provider_token: config.payment_provider_token.clone(),
            price_private_minor: config.price_private_minor,
            price_group_minor: config.price_group_minor,
            invoice_photo_url: config.invoice_photo_url.clone(),
            payment_help_link: config.payment_help_link.clone(),
            promo_link: config.promo_link.clone(),
            support_contact: config.support_contact.clone(),
            usage_request_price: config.usage_request_price,
            usage_subscription_price: config.usage_subscription_price,
            usage_offset: config.usage_offset,
        }
    }

    pub fn is_promo_chat(&self, chat_id: i64) -> bool {
        self.promo_chat_ids.contains(&chat_id)
    }

    pub fn trial_allowance(&self, chat_id: i64) -> u64 {
        if chat_id > 0 {
            self.trial_count_private
        } else {
            self.trial_count_group
        }
    }

    pub fn lifetime_ceiling(&self, chat_id: i64) -> u64 {
        if chat_id > 0 {
            self.max_requests_private
        } else {
            self.max_requests_group
        }
    }

    pub fn is_owner(&self, username: Option<&str>) -> bool {
        if self.owner_username.is_empty() {
            return false;
        }
        username
            .map(|name| name.trim_start_matches('@').eq_ignore_ascii_case(&self.owner_username))
            .unwrap_or(false)
    }
}

pub const DRAW_STYLE_SUFFIX: &str = ", deep focus, highly detailed, digital painting, artstation, 4K, smooth, sharp focus, illustration";
