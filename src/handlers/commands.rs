use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::ledger::ChatLedger;
use crate::db::store::StoreError;
use crate::engine::context;
use crate::engine::usage::build_report;
use crate::handlers::transport::Invoice;
use crate::utils::language::is_english;
use crate::utils::locale::{fill, texts, Locale};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    Start,
    TermsGroup,
    Terms,
    Payment,
    Support,
    Usage,
    Status,
    Unlock,
    Reset,
    Skip(String),
    Mode(String),
    Temperature(String),
    ContextDepth(String),
}

impl ChatCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ChatCommand::Help => "help",
            ChatCommand::Start => "start",
            ChatCommand::TermsGroup => "terms_group",
            ChatCommand::Terms => "terms",
            ChatCommand::Payment => "payment",
            ChatCommand::Support => "support",
            ChatCommand::Usage => "usage",
            ChatCommand::Status => "status",
            ChatCommand::Unlock => "unlock",
            ChatCommand::Reset => "reset",
            ChatCommand::Skip(_) => "skip",
            ChatCommand::Mode(_) => "mode",
            ChatCommand::Temperature(_) => "temperature",
            ChatCommand::ContextDepth(_) => "context_depth",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("skip factor must be a whole number of 1 or more, got '{0}'")]
    InvalidSkip(String),
    #[error("temperature must be a finite number, got '{0}'")]
    InvalidTemperature(String),
    #[error("context depth must be a whole number of 1 or more, got '{0}'")]
    InvalidContextDepth(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Invoice(Invoice),
}

struct CommandInput<'a> {
    lowered: &'a str,
    original: &'a str,
    settings: &'a Settings,
}

type Matcher = fn(&CommandInput<'_>) -> Option<ChatCommand>;

fn starts_with_any(lowered: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| lowered.starts_with(prefix))
}

/// Matches `keyword` alone or followed by whitespace and returns the rest of
/// the original text, trimmed.
fn keyword_argument(input: &CommandInput<'_>, keywords: &[&str]) -> Option<String> {
    keywords.iter().find_map(|keyword| {
        let rest = input.lowered.strip_prefix(keyword)?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let skip = keyword.chars().count();
        Some(input.original.chars().skip(skip).collect::<String>().trim().to_string())
    })
}

fn match_help(input: &CommandInput<'_>) -> Option<ChatCommand> {
    starts_with_any(input.lowered, &["/help", "/commands"]).then_some(ChatCommand::Help)
}

fn match_start(input: &CommandInput<'_>) -> Option<ChatCommand> {
    input.lowered.starts_with("/start").then_some(ChatCommand::Start)
}

fn match_terms_group(input: &CommandInput<'_>) -> Option<ChatCommand> {
    starts_with_any(input.lowered, &["/terms_group", "/termsgroup"])
        .then_some(ChatCommand::TermsGroup)
}

fn match_terms(input: &CommandInput<'_>) -> Option<ChatCommand> {
    input.lowered.starts_with("/terms").then_some(ChatCommand::Terms)
}

fn match_payment(input: &CommandInput<'_>) -> Option<ChatCommand> {
    input.lowered.starts_with("/payment").then_some(ChatCommand::Payment)
}

fn match_support(input: &CommandInput<'_>) -> Option<ChatCommand> {
    input.lowered.starts_with("/support").then_some(ChatCommand::Support)
}

fn match_usage(input: &CommandInput<'_>) -> Option<ChatCommand> {
    starts_with_any(input.lowered, &["/usage", "/report"]).then_some(ChatCommand::Usage)
}

fn match_status(input: &CommandInput<'_>) -> Option<ChatCommand> {
    input.lowered.starts_with("/status").then_some(ChatCommand::Status)
}

fn match_unlock(input: &CommandInput<'_>) -> Option<ChatCommand> {
    let phrase = input.settings.unlock_phrase.as_str();
    (!phrase.is_empty() && input.lowered == phrase).then_some(ChatCommand::Unlock)
}

fn match_reset(input: &CommandInput<'_>) -> Option<ChatCommand> {
    matches!(input.lowered, "reset" | "сброс" | "/reset").then_some(ChatCommand::Reset)
}

fn match_skip(input: &CommandInput<'_>) -> Option<ChatCommand> {
    keyword_argument(input, &["skip", "пропуск", "отвечать раз в"]).map(ChatCommand::Skip)
}

fn match_mode(input: &CommandInput<'_>) -> Option<ChatCommand> {
    keyword_argument(input, &["mode", "режим"]).map(ChatCommand::Mode)
}

fn match_temperature(input: &CommandInput<'_>) -> Option<ChatCommand> {
    keyword_argument(input, &["temperature", "температура"]).map(ChatCommand::Temperature)
}

fn match_context_depth(input: &CommandInput<'_>) -> Option<ChatCommand> {
    keyword_argument(input, &["глубина контекста", "context depth"]).map(ChatCommand::ContextDepth)
}

// First match wins.
const COMMAND_TABLE: &[Matcher] = &[
    match_help,
    match_start,
    match_terms_group,
    match_terms,
    match_payment,
    match_support,
    match_usage,
    match_status,
    match_unlock,
    match_reset,
    match_skip,
    match_mode,
    match_temperature,
    match_context_depth,
];

pub fn parse_command(text: &str, settings: &Settings) -> Option<ChatCommand> {
    let original = text.trim();
    if original.is_empty() {
        return None;
    }
    let lowered = original.to_lowercase();
    let input = CommandInput {
        lowered: &lowered,
        original,
        settings,
    };
    COMMAND_TABLE.iter().find_map(|matcher| matcher(&input))
}

pub fn parse_skip_factor(raw: &str) -> Result<u32, CommandError> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(CommandError::InvalidSkip(raw.to_string())),
    }
}

pub fn parse_context_depth(raw: &str) -> Result<usize, CommandError> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(CommandError::InvalidContextDepth(raw.to_string())),
    }
}

pub fn parse_temperature(raw: &str) -> Result<f32, CommandError> {
    match raw.trim().replace(',', ".").parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(CommandError::InvalidTemperature(raw.to_string())),
    }
}

pub fn build_invoice(chat_id: i64, locale: Locale, settings: &Settings) -> Invoice {
    let strings = texts(locale);
    let (label, amount) = if chat_id > 0 {
        (strings.invoice_label_private, settings.price_private_minor)
    } else {
        (strings.invoice_label_group, settings.price_group_minor)
    };
    Invoice {
        title: strings.invoice_title.to_string(),
        description: strings.invoice_description.to_string(),
        payload: chat_id.to_string(),
        currency: settings.payment_currency.clone(),
        label: label.to_string(),
        amount,
        provider_token: settings.payment_provider_token.clone(),
        photo_url: (!settings.invoice_photo_url.is_empty())
            .then(|| settings.invoice_photo_url.clone()),
    }
}

pub fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub struct CommandContext<'a> {
    pub chat_id: i64,
    pub username: Option<&'a str>,
    pub locale: Locale,
    pub settings: &'a Settings,
    pub now: DateTime<Utc>,
}

/// Applies a parsed command to the ledger. Commands never touch the
/// request counter.
pub fn apply(
    command: &ChatCommand,
    ledger: &mut ChatLedger,
    ctx: &CommandContext<'_>,
) -> Result<Vec<Reply>, StoreError> {
    let strings = texts(ctx.locale);
    let chat_id = ctx.chat_id;
    let settings = ctx.settings;

    let replies = match command {
        ChatCommand::Help => vec![Reply::Text(strings.commands.to_string())],
        ChatCommand::Start => vec![Reply::Text(strings.welcome.to_string())],
        ChatCommand::TermsGroup => vec![Reply::Text(strings.terms_group.to_string())],
        ChatCommand::Terms => {
            let terms = if chat_id > 0 {
                strings.terms_private
            } else {
                strings.terms_group
            };
            vec![Reply::Text(terms.to_string())]
        }
        ChatCommand::Payment => {
            let mut replies = Vec::new();
            if !settings.payment_help_link.is_empty() && !is_english(ledger.context(chat_id)) {
                replies.push(Reply::Text(settings.payment_help_link.clone()));
            }
            replies.push(Reply::Invoice(build_invoice(chat_id, ctx.locale, settings)));
            replies
        }
        ChatCommand::Support => vec![Reply::Text(fill(
            strings.support,
            "value",
            &settings.support_contact,
        ))],
        ChatCommand::Usage => {
            if settings.is_owner(ctx.username) {
                vec![Reply::Text(build_report(ledger, settings, ctx.now).render())]
            } else {
                info!(
                    "Ignoring usage report request from non-admin {:?} in chat {}",
                    ctx.username, chat_id
                );
                Vec::new()
            }
        }
        ChatCommand::Status => {
            let account = ledger.account(chat_id);
            let text = match account.subscription_expiry {
                Some(expiry) if account.is_entitled(ctx.now) => {
                    fill(strings.status_active, "date", &format_date(expiry))
                }
                Some(expiry) => fill(strings.status_expired, "date", &format_date(expiry)),
                None => strings.status_none.to_string(),
            };
            vec![Reply::Text(text)]
        }
        ChatCommand::Unlock => {
            ledger.set_subscription_expiry(chat_id, settings.unlock_until)?;
            info!(
                "Chat {} unlocked until {} by {:?}",
                chat_id, settings.unlock_until, ctx.username
            );
            vec![Reply::Text(fill(
                strings.unlocked,
                "date",
                &format_date(settings.unlock_until),
            ))]
        }
        ChatCommand::Reset => {
            context::reset(ledger, chat_id)?;
            vec![Reply::Text(strings.context_cleared.to_string())]
        }
        ChatCommand::Skip(raw) => match parse_skip_factor(raw) {
            Ok(factor) => {
                ledger.set_skip_factor(chat_id, factor)?;
                vec![Reply::Text(fill(strings.skip_set, "n", &factor.to_string()))]
            }
            Err(err) => {
                warn!("Rejected skip command in chat {}: {}", chat_id, err);
                vec![Reply::Text(strings.skip_invalid.to_string())]
            }
        },
        ChatCommand::Mode(suffix) => {
            ledger.set_mode_suffix(chat_id, suffix)?;
            if suffix.trim().is_empty() {
                vec![Reply::Text(strings.mode_cleared.to_string())]
            } else {
                vec![Reply::Text(fill(strings.mode_set, "value", suffix.trim()))]
            }
        }
        ChatCommand::Temperature(raw) => match parse_temperature(raw) {
            Ok(value) => {
                ledger.set_temperature(chat_id, value)?;
                vec![Reply::Text(fill(
                    strings.temperature_set,
                    "value",
                    &value.to_string(),
                ))]
            }
            Err(err) => {
                warn!("Rejected temperature command in chat {}: {}", chat_id, err);
                vec![Reply::Text(strings.temperature_invalid.to_string())]
            }
        },
        ChatCommand::ContextDepth(raw) => match parse_context_depth(raw) {
            Ok(depth) => {
                ledger.set_context_depth(chat_id, depth);
                vec![Reply::Text(fill(strings.context_depth_set, "n", &depth.to_string()))]
            }
            Err(err) => {
                warn!("Rejected context depth command in chat {}: {}", chat_id, err);
                vec![Reply::Text(strings.context_depth_invalid.to_string())]
            }
        },
    };
    Ok(replies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ledger;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn ctx<'a>(chat_id: i64, username: Option<&'a str>, settings: &'a Settings) -> CommandContext<'a> {
        CommandContext {
            chat_id,
            username,
            locale: Locale::En,
            settings,
            now: now(),
        }
    }

    fn parse(text: &str) -> Option<ChatCommand> {
        parse_command(text, &Settings::default())
    }

    #[test]
    fn table_order_resolves_overlapping_prefixes() {
        assert_eq!(parse("/terms_group"), Some(ChatCommand::TermsGroup));
        assert_eq!(parse("/termsgroup@paybot"), Some(ChatCommand::TermsGroup));
        assert_eq!(parse("/terms"), Some(ChatCommand::Terms));
        assert_eq!(parse("/commands"), Some(ChatCommand::Help));
        assert_eq!(parse("/report"), Some(ChatCommand::Usage));
        assert_eq!(parse("  Сброс "), Some(ChatCommand::Reset));
        assert_eq!(parse("Сезам приоткройся"), Some(ChatCommand::Unlock));
    }

    #[test]
    fn keyword_commands_keep_original_argument_case() {
        assert_eq!(parse("Skip 3"), Some(ChatCommand::Skip("3".into())));
        assert_eq!(parse("отвечать раз в 4"), Some(ChatCommand::Skip("4".into())));
        assert_eq!(
            parse("Mode Answer Like A Pirate"),
            Some(ChatCommand::Mode("Answer Like A Pirate".into()))
        );
        assert_eq!(parse("режим"), Some(ChatCommand::Mode(String::new())));
        assert_eq!(
            parse("температура 36,6"),
            Some(ChatCommand::Temperature("36,6".into()))
        );
        assert_eq!(
            parse("Глубина контекста 500"),
            Some(ChatCommand::ContextDepth("500".into()))
        );
        assert_eq!(
            parse("context depth 80"),
            Some(ChatCommand::ContextDepth("80".into()))
        );
    }

    #[test]
    fn ordinary_text_is_not_a_command() {
        assert_eq!(parse("modern art is fun"), None);
        assert_eq!(parse("skipping rope"), None);
        assert_eq!(parse("Нарисуй кота"), None);
        assert_eq!(parse("reset everything please"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn numeric_arguments_are_validated() {
        assert_eq!(parse_skip_factor("3"), Ok(3));
        assert!(parse_skip_factor("0").is_err());
        assert!(parse_skip_factor("abc").is_err());
        assert_eq!(parse_temperature("36,6"), Ok(36.6));
        assert!(parse_temperature("NaN").is_err());
        assert!(parse_temperature("warm").is_err());
        assert_eq!(parse_context_depth(" 500 "), Ok(500));
        assert!(parse_context_depth("0").is_err());
        assert!(parse_context_depth("-5").is_err());
    }

    #[test]
    fn context_depth_resizes_the_window_without_costing_quota() {
        let mut ledger = ledger();
        let settings = Settings::default();
        let replies = apply(
            &ChatCommand::ContextDepth("500".into()),
            &mut ledger,
            &ctx(-30, None, &settings),
        )
        .unwrap();
        assert_eq!(ledger.context_depth(-30), Some(500));
        assert_eq!(context::window_size(&ledger, -30, &settings, now()), 500);
        assert_eq!(ledger.request_count(-30), 0);
        assert_eq!(
            replies,
            vec![Reply::Text("Context depth set to 500".to_string())]
        );

        apply(
            &ChatCommand::ContextDepth("deep".into()),
            &mut ledger,
            &ctx(-30, None, &settings),
        )
        .unwrap();
        assert_eq!(ledger.context_depth(-30), Some(500));
        assert_eq!(ledger.context_depth(-31), None);
        assert_eq!(
            context::window_size(&ledger, -31, &settings, now()),
            settings.context_size
        );
    }

    #[test]
    fn invalid_skip_leaves_state_unchanged() {
        let mut ledger = ledger();
        let settings = Settings::default();
        ledger.set_skip_factor(7, 2).unwrap();
        let replies = apply(
            &ChatCommand::Skip("lots".into()),
            &mut ledger,
            &ctx(7, None, &settings),
        )
        .unwrap();
        assert_eq!(ledger.skip_factor(7), 2);
        assert_eq!(
            replies,
            vec![Reply::Text(texts(Locale::En).skip_invalid.to_string())]
        );
    }

    #[test]
    fn skip_and_temperature_update_the_chat() {
        let mut ledger = ledger();
        let settings = Settings::default();
        apply(&ChatCommand::Skip("3".into()), &mut ledger, &ctx(7, None, &settings)).unwrap();
        apply(
            &ChatCommand::Temperature("40,5".into()),
            &mut ledger,
            &ctx(7, None, &settings),
        )
        .unwrap();
        assert_eq!(ledger.skip_factor(7), 3);
        assert_eq!(ledger.temperature(7), Some(40.5));
        assert_eq!(ledger.request_count(7), 0);
    }

    #[test]
    fn payment_sends_help_link_for_non_english_conversations() {
        let mut ledger = ledger();
        let settings = Settings {
            payment_help_link: "https://help.example/pay".into(),
            ..Settings::default()
        };
        ledger
            .set_context(-20, "Привет! Как оплатить подписку на этого бота?".into())
            .unwrap();
        let replies = apply(&ChatCommand::Payment, &mut ledger, &ctx(-20, None, &settings)).unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], Reply::Text("https://help.example/pay".into()));
        match &replies[1] {
            Reply::Invoice(invoice) => {
                assert_eq!(invoice.payload, "-20");
                assert_eq!(invoice.amount, 1000);
            }
            other => panic!("expected invoice, got {other:?}"),
        }

        ledger
            .set_context(21, "Could you tell me how the subscription payment works here?".into())
            .unwrap();
        let replies = apply(&ChatCommand::Payment, &mut ledger, &ctx(21, None, &settings)).unwrap();
        assert_eq!(replies.len(), 1);
        assert!(matches!(&replies[0], Reply::Invoice(invoice) if invoice.amount == 300));
    }

    #[test]
    fn usage_report_is_admin_only() {
        let mut ledger = ledger();
        let settings = Settings {
            owner_username: "boss".into(),
            ..Settings::default()
        };
        let hidden = apply(&ChatCommand::Usage, &mut ledger, &ctx(1, Some("guest"), &settings)).unwrap();
        assert!(hidden.is_empty());
        let shown = apply(&ChatCommand::Usage, &mut ledger, &ctx(1, Some("@Boss"), &settings)).unwrap();
        assert!(matches!(&shown[0], Reply::Text(body) if body.contains("Revenue")));
    }

    #[test]
    fn unlock_and_status_report_expiry() {
        let mut ledger = ledger();
        let settings = Settings::default();
        let status = apply(&ChatCommand::Status, &mut ledger, &ctx(3, None, &settings)).unwrap();
        assert_eq!(
            status,
            vec![Reply::Text(texts(Locale::En).status_none.to_string())]
        );

        apply(&ChatCommand::Unlock, &mut ledger, &ctx(3, None, &settings)).unwrap();
        assert_eq!(ledger.subscription_expiry(3), Some(settings.unlock_until));
        let status = apply(&ChatCommand::Status, &mut ledger, &ctx(3, None, &settings)).unwrap();
        assert_eq!(
            status,
            vec![Reply::Text("Subscription active until 2030-01-01 00:00 UTC".into())]
        );

        ledger
            .set_subscription_expiry(3, now() - Duration::days(1))
            .unwrap();
        let status = apply(&ChatCommand::Status, &mut ledger, &ctx(3, None, &settings)).unwrap();
        assert!(matches!(&status[0], Reply::Text(body) if body.starts_with("Subscription expired")));
    }

    #[test]
    fn mode_sets_and_clears_the_persona() {
        let mut ledger = ledger();
        let settings = Settings::default();
        apply(
            &ChatCommand::Mode("Answer in rhymes".into()),
            &mut ledger,
            &ctx(4, None, &settings),
        )
        .unwrap();
        assert_eq!(ledger.mode_suffix(4), "Answer in rhymes");
        let replies = apply(&ChatCommand::Mode(String::new()), &mut ledger, &ctx(4, None, &settings)).unwrap();
        assert_eq!(ledger.mode_suffix(4), "");
        assert_eq!(
            replies,
            vec![Reply::Text(texts(Locale::En).mode_cleared.to_string())]
        );
    }
}
