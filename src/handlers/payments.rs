use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::ledger::ChatLedger;
use crate::db::store::StoreError;
use crate::engine::add_months;
use crate::handlers::commands::format_date;
use crate::handlers::inbound::PaymentNotice;
use crate::utils::locale::{fill, texts, Locale};

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentCredit {
    pub chat_id: i64,
    pub expiry: DateTime<Utc>,
    pub thanks: String,
    pub admin_notice: Option<(i64, String)>,
}

fn payload_chat_id(payload: &str, fallback: i64) -> i64 {
    match payload.trim().parse::<i64>() {
        Ok(chat_id) => chat_id,
        Err(_) => {
            warn!(
                "Unreadable invoice payload '{}'; crediting chat {} instead",
                payload, fallback
            );
            fallback
        }
    }
}

/// Opens the paid period for the chat named in the invoice payload.
pub fn credit_payment(
    ledger: &mut ChatLedger,
    notice: &PaymentNotice,
    message_chat_id: i64,
    username: Option<&str>,
    locale: Locale,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<PaymentCredit, StoreError> {
    let chat_id = payload_chat_id(&notice.payload, message_chat_id);
    let expiry = add_months(now, settings.subscription_months);
    ledger.set_subscription_expiry(chat_id, expiry)?;
    info!(
        "Payment received for chat {} from {:?}; active until {}",
        chat_id, username, expiry
    );

    let admin_notice = settings.admin_chat_id.map(|admin| {
        (
            admin,
            format!(
                "Payment received: chat {} user {} until {}",
                chat_id,
                username.unwrap_or("unknown"),
                format_date(expiry)
            ),
        )
    });

    Ok(PaymentCredit {
        chat_id,
        expiry,
        thanks: fill(texts(locale).payment_complete, "date", &format_date(expiry)),
        admin_notice,
    })
}
