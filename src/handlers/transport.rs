use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, InputFile, LabeledPrice};
use teloxide::RequestError;
use tracing::warn;

use crate::config::CONFIG;

const TELEGRAM_RETRY_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    pub payload: String,
    pub currency: String,
    pub label: String,
    pub amount: u32,
    pub provider_token: String,
    pub photo_url: Option<String>,
}

/// Outbound side of the bot. Chat ids are raw Telegram ids.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
    async fn send_photo(&self, chat_id: i64, photo: Vec<u8>) -> Result<()>;
    async fn forward_photo(&self, chat_id: i64, file_id: &str) -> Result<()>;
    async fn send_typing(&self, chat_id: i64) -> Result<()>;
    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> Result<()>;
    async fn file_url(&self, file_id: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        TelegramTransport { bot }
    }
}

fn telegram_retryable_error(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Network(_) | RequestError::RetryAfter(_) | RequestError::Io(_)
    )
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let mut delay = Duration::from_secs_f32(1.5);
        for attempt in 0..TELEGRAM_RETRY_ATTEMPTS {
            match self.bot.send_message(ChatId(chat_id), text.to_string()).await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    if !telegram_retryable_error(&err) || attempt + 1 == TELEGRAM_RETRY_ATTEMPTS {
                        return Err(err.into());
                    }
                    warn!("send_message attempt {} failed: {err}", attempt + 1);
                    if let RequestError::RetryAfter(wait) = err {
                        tokio::time::sleep(wait.duration()).await;
                    } else {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, photo: Vec<u8>) -> Result<()> {
        self.bot
            .send_photo(ChatId(chat_id), InputFile::memory(photo).file_name("image.png"))
            .await?;
        Ok(())
    }

    async fn forward_photo(&self, chat_id: i64, file_id: &str) -> Result<()> {
        self.bot
            .send_photo(ChatId(chat_id), InputFile::file_id(FileId(file_id.to_string())))
            .await?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<()> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await?;
        Ok(())
    }

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> Result<()> {
        let prices = vec![LabeledPrice {
            label: invoice.label.clone(),
            amount: invoice.amount,
        }];
        let mut request = self.bot.send_invoice(
            ChatId(chat_id),
            invoice.title.clone(),
            invoice.description.clone(),
            invoice.payload.clone(),
            invoice.currency.clone(),
            prices,
        );
        if !invoice.provider_token.is_empty() {
            request.provider_token = Some(invoice.provider_token.clone());
        }
        request.photo_url = invoice
            .photo_url
            .as_deref()
            .and_then(|value| url::Url::parse(value).ok());
        request.need_name = Some(false);
        request.need_phone_number = Some(false);
        request.need_email = Some(false);
        request.need_shipping_address = Some(false);
        request.await?;
        Ok(())
    }

    async fn file_url(&self, file_id: &str) -> Result<String> {
        let file = self.bot.get_file(FileId(file_id.to_string())).await?;
        if file.path.is_empty() {
            return Err(anyhow!("Telegram returned an empty path for file {file_id}"));
        }
        Ok(format!(
            "https://api.telegram.org/file/bot{}/{}",
            CONFIG.bot_token, file.path
        ))
    }
}
