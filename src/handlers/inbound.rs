use teloxide::types::Message;

use crate::utils::locale::Locale;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotice {
    pub payload: String,
}

/// Transport-independent view of an incoming Telegram message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub text: Option<String>,
    pub photo_file_id: Option<String>,
    pub payment: Option<PaymentNotice>,
}

impl InboundMessage {
    pub fn from_telegram(message: &Message) -> Self {
        let sender = message.from.as_ref();
        InboundMessage {
            chat_id: message.chat.id.0,
            sender_id: sender.and_then(|user| i64::try_from(user.id.0).ok()),
            username: sender.and_then(|user| user.username.clone()),
            language_code: sender.and_then(|user| user.language_code.clone()),
            text: message.text().map(str::to_string),
            photo_file_id: message
                .photo()
                .and_then(|sizes| sizes.last())
                .map(|photo| photo.file.id.0.clone()),
            payment: message.successful_payment().map(|payment| PaymentNotice {
                payload: payment.invoice_payload.clone(),
            }),
        }
    }

    pub fn locale(&self) -> Locale {
        Locale::from_language_code(self.language_code.as_deref())
    }

    pub fn kind_label(&self) -> &'static str {
        if self.payment.is_some() {
            "payment"
        } else if self.photo_file_id.is_some() {
            "photo"
        } else if self.text.is_some() {
            "text"
        } else {
            "other"
        }
    }
}
