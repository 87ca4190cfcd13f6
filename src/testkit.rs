use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::db::ledger::ChatLedger;
use crate::db::models::StoreKey;
use crate::db::store::{KvStore, StoreError};
use crate::handlers::inbound::InboundMessage;
use crate::handlers::transport::{Invoice, Transport};
use crate::llm::{AiServices, CompletionError, CompletionRequest};
use crate::utils::locale::Locale;

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    pub fn document(&self, key: StoreKey) -> Option<String> {
        self.documents.lock().get(&key).cloned()
    }
}

impl KvStore for MemoryStore {
    fn read_raw(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        Ok(self.documents.lock().get(&key).cloned())
    }

    fn write_raw(&self, key: StoreKey, body: &str) -> Result<(), StoreError> {
        self.documents.lock().insert(key, body.to_string());
        Ok(())
    }
}

pub fn ledger() -> ChatLedger {
    ChatLedger::load(Arc::new(MemoryStore::default())).unwrap()
}

pub fn text_from(chat_id: i64, sender_id: i64, username: Option<&str>, text: &str) -> InboundMessage {
    InboundMessage {
        chat_id,
        sender_id: Some(sender_id),
        username: username.map(str::to_string),
        text: Some(text.to_string()),
        ..InboundMessage::default()
    }
}

pub fn text(chat_id: i64, text: &str) -> InboundMessage {
    text_from(chat_id, chat_id.abs(), None, text)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(i64, String),
    Photo(i64, usize),
    ForwardPhoto(i64, String),
    Typing(i64),
    Invoice(i64, Invoice),
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    /// Everything sent so far, typing indicators excluded.
    pub fn sent(&self) -> Vec<Sent> {
        self.sent
            .lock()
            .iter()
            .filter(|item| !matches!(item, Sent::Typing(_)))
            .cloned()
            .collect()
    }

    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|item| match item {
                Sent::Text(target, body) if target == chat_id => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn invoices_to(&self, chat_id: i64) -> Vec<Invoice> {
        self.sent()
            .into_iter()
            .filter_map(|item| match item {
                Sent::Invoice(target, invoice) if target == chat_id => Some(invoice),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().push(Sent::Text(chat_id, text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, photo: Vec<u8>) -> Result<()> {
        self.sent.lock().push(Sent::Photo(chat_id, photo.len()));
        Ok(())
    }

    async fn forward_photo(&self, chat_id: i64, file_id: &str) -> Result<()> {
        self.sent
            .lock()
            .push(Sent::ForwardPhoto(chat_id, file_id.to_string()));
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<()> {
        self.sent.lock().push(Sent::Typing(chat_id));
        Ok(())
    }

    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> Result<()> {
        self.sent
            .lock()
            .push(Sent::Invoice(chat_id, invoice.clone()));
        Ok(())
    }

    async fn file_url(&self, file_id: &str) -> Result<String> {
        Ok(format!("https://files.test/{file_id}.jpg"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    Complete(CompletionRequest),
    Image(String),
    Caption(String),
    Search(String, Locale),
}

/// Replies are consumed in order; once the queue is empty every completion
/// answers with `default_reply`.
#[derive(Debug)]
pub struct ScriptedServices {
    calls: Mutex<Vec<ServiceCall>>,
    replies: Mutex<VecDeque<String>>,
    default_reply: Option<String>,
    rate_limited: bool,
    image: Option<Vec<u8>>,
    caption: Result<String, String>,
    search_result: String,
}

impl Default for ScriptedServices {
    fn default() -> Self {
        ScriptedServices {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            default_reply: Some("Sure.".to_string()),
            rate_limited: false,
            image: Some(vec![0x89, b'P', b'N', b'G']),
            caption: Ok("a cat sitting on a sofa".to_string()),
            search_result: "Result one\nhttps://example.com".to_string(),
        }
    }
}

impl ScriptedServices {
    pub fn with_replies(replies: &[&str]) -> Self {
        ScriptedServices {
            replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
            ..ScriptedServices::default()
        }
    }

    pub fn silent() -> Self {
        ScriptedServices {
            default_reply: None,
            ..ScriptedServices::default()
        }
    }

    pub fn rate_limited() -> Self {
        ScriptedServices {
            rate_limited: true,
            ..ScriptedServices::default()
        }
    }

    pub fn failing_captions() -> Self {
        ScriptedServices {
            caption: Err("caption backend down".to_string()),
            ..ScriptedServices::default()
        }
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    pub fn completion_prompts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ServiceCall::Complete(request) => Some(request.prompt),
                _ => None,
            })
            .collect()
    }

    pub fn image_prompts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ServiceCall::Image(prompt) => Some(prompt),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl AiServices for ScriptedServices {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<Option<String>, CompletionError> {
        self.calls.lock().push(ServiceCall::Complete(request));
        if self.rate_limited {
            return Err(CompletionError::RateLimited("quota exhausted".to_string()));
        }
        let queued = self.replies.lock().pop_front();
        Ok(queued.or_else(|| self.default_reply.clone()))
    }

    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>> {
        self.calls.lock().push(ServiceCall::Image(prompt.to_string()));
        Ok(self.image.clone())
    }

    async fn caption_image(&self, image_url: &str) -> Result<String> {
        self.calls
            .lock()
            .push(ServiceCall::Caption(image_url.to_string()));
        self.caption.clone().map_err(|err| anyhow!(err))
    }

    async fn search(&self, query: &str, locale: Locale) -> Result<String> {
        self.calls
            .lock()
            .push(ServiceCall::Search(query.to_string(), locale));
        Ok(self.search_result.clone())
    }
}
