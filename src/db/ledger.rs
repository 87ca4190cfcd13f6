use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::db::models::{ChatAccount, StoreKey};
use crate::db::store::{read_map, write_map, KvStore, StoreError};

/// In-memory source of truth for every per-chat map. All maps are loaded
/// once; each mutation rewrites the affected map before returning.
pub struct ChatLedger {
    store: Arc<dyn KvStore>,
    opened: BTreeMap<i64, DateTime<Utc>>,
    trial: BTreeMap<i64, u64>,
    skip: BTreeMap<i64, u32>,
    temperature: BTreeMap<i64, f32>,
    mode: BTreeMap<i64, String>,
    context: BTreeMap<i64, String>,
    time: BTreeMap<i64, DateTime<Utc>>,
    humans: BTreeMap<i64, i64>,
    last_artifact: HashMap<i64, String>,
    skip_phase: HashMap<i64, u32>,
    context_depth: HashMap<i64, usize>,
}

impl ChatLedger {
    pub fn load(store: Arc<dyn KvStore>) -> Result<Self, StoreError> {
        let ledger = ChatLedger {
            opened: read_map(store.as_ref(), StoreKey::Opened)?,
            trial: read_map(store.as_ref(), StoreKey::Trial)?,
            skip: read_map(store.as_ref(), StoreKey::Skip)?,
            temperature: read_map(store.as_ref(), StoreKey::Temperature)?,
            mode: read_map(store.as_ref(), StoreKey::Mode)?,
            context: read_map(store.as_ref(), StoreKey::Context)?,
            time: read_map(store.as_ref(), StoreKey::Time)?,
            humans: read_map(store.as_ref(), StoreKey::Humans)?,
            last_artifact: HashMap::new(),
            skip_phase: HashMap::new(),
            context_depth: HashMap::new(),
            store,
        };
        info!(
            "Ledger loaded: chats={} subscriptions={} pairs={}",
            ledger.known_chat_ids().len(),
            ledger.opened.len(),
            ledger.humans.len() / 2
        );
        Ok(ledger)
    }

    fn persist(&self, key: StoreKey) -> Result<(), StoreError> {
        let store = self.store.as_ref();
        match key {
            StoreKey::Opened => write_map(store, key, &self.opened),
            StoreKey::Trial => write_map(store, key, &self.trial),
            StoreKey::Skip => write_map(store, key, &self.skip),
            StoreKey::Temperature => write_map(store, key, &self.temperature),
            StoreKey::Mode => write_map(store, key, &self.mode),
            StoreKey::Context => write_map(store, key, &self.context),
            StoreKey::Time => write_map(store, key, &self.time),
            StoreKey::Humans => write_map(store, key, &self.humans),
        }
    }

    pub fn account(&self, chat_id: i64) -> ChatAccount {
        ChatAccount {
            chat_id,
            subscription_expiry: self.subscription_expiry(chat_id),
            request_count: self.request_count(chat_id),
            skip_factor: self.skip_factor(chat_id),
            temperature: self.temperature(chat_id),
            mode_suffix: self.mode_suffix(chat_id).to_string(),
            last_activity: self.last_activity(chat_id),
            context_buffer: self.context(chat_id).to_string(),
            last_artifact: self.last_artifact(chat_id).map(str::to_string),
            paired_with: self.partner(chat_id),
        }
    }

    pub fn subscription_expiry(&self, chat_id: i64) -> Option<DateTime<Utc>> {
        self.opened.get(&chat_id).copied()
    }

    pub fn is_entitled(&self, chat_id: i64, now: DateTime<Utc>) -> bool {
        self.subscription_expiry(chat_id)
            .map(|expiry| now < expiry)
            .unwrap_or(false)
    }

    pub fn was_ever_entitled(&self, chat_id: i64) -> bool {
        self.opened.contains_key(&chat_id)
    }

    pub fn set_subscription_expiry(
        &mut self,
        chat_id: i64,
        expiry: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.opened.insert(chat_id, expiry);
        self.persist(StoreKey::Opened)
    }

    pub fn request_count(&self, chat_id: i64) -> u64 {
        self.trial.get(&chat_id).copied().unwrap_or(0)
    }

    pub fn increment_requests(&mut self, chat_id: i64) -> Result<u64, StoreError> {
        let count = self.trial.entry(chat_id).or_insert(0);
        *count = count.saturating_add(1);
        let value = *count;
        self.persist(StoreKey::Trial)?;
        Ok(value)
    }

    pub fn decrement_requests(&mut self, chat_id: i64) -> Result<u64, StoreError> {
        let count = self.trial.entry(chat_id).or_insert(0);
        *count = count.saturating_sub(1);
        let value = *count;
        self.persist(StoreKey::Trial)?;
        Ok(value)
    }

    pub fn reset_requests(&mut self, chat_id: i64) -> Result<(), StoreError> {
        self.trial.insert(chat_id, 0);
        self.persist(StoreKey::Trial)
    }

    pub fn skip_factor(&self, chat_id: i64) -> u32 {
        self.skip.get(&chat_id).copied().unwrap_or(1).max(1)
    }

    pub fn set_skip_factor(&mut self, chat_id: i64, factor: u32) -> Result<(), StoreError> {
        self.skip.insert(chat_id, factor.max(1));
        self.skip_phase.remove(&chat_id);
        self.persist(StoreKey::Skip)
    }

    /// Counts one plain-text turn and reports whether it lands on the
    /// answering beat of the chat's skip factor.
    pub fn advance_skip_phase(&mut self, chat_id: i64) -> bool {
        let factor = self.skip_factor(chat_id);
        let phase = self.skip_phase.entry(chat_id).or_insert(0);
        *phase = (*phase + 1) % factor;
        *phase == 0
    }

    pub fn temperature(&self, chat_id: i64) -> Option<f32> {
        self.temperature.get(&chat_id).copied()
    }

    pub fn set_temperature(&mut self, chat_id: i64, value: f32) -> Result<(), StoreError> {
        self.temperature.insert(chat_id, value);
        self.persist(StoreKey::Temperature)
    }

    pub fn mode_suffix(&self, chat_id: i64) -> &str {
        self.mode.get(&chat_id).map(String::as_str).unwrap_or("")
    }

    pub fn set_mode_suffix(&mut self, chat_id: i64, suffix: &str) -> Result<(), StoreError> {
        let suffix = suffix.trim();
        if suffix.is_empty() {
            self.mode.remove(&chat_id);
        } else {
            self.mode.insert(chat_id, suffix.to_string());
        }
        self.persist(StoreKey::Mode)
    }

    pub fn context(&self, chat_id: i64) -> &str {
        self.context.get(&chat_id).map(String::as_str).unwrap_or("")
    }

    pub fn context_depth(&self, chat_id: i64) -> Option<usize> {
        self.context_depth.get(&chat_id).copied()
    }

    pub fn set_context_depth(&mut self, chat_id: i64, depth: usize) {
        self.context_depth.insert(chat_id, depth.max(1));
    }

    pub fn has_context(&self, chat_id: i64) -> bool {
        self.context.contains_key(&chat_id)
    }

    pub fn set_context(&mut self, chat_id: i64, buffer: String) -> Result<(), StoreError> {
        self.context.insert(chat_id, buffer);
        self.persist(StoreKey::Context)
    }

    pub fn last_activity(&self, chat_id: i64) -> Option<DateTime<Utc>> {
        self.time.get(&chat_id).copied()
    }

    pub fn set_last_activity(
        &mut self,
        chat_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.time.insert(chat_id, at);
        self.persist(StoreKey::Time)
    }

    pub fn last_artifact(&self, chat_id: i64) -> Option<&str> {
        self.last_artifact.get(&chat_id).map(String::as_str)
    }

    pub fn set_last_artifact(&mut self, chat_id: i64, artifact: &str) {
        let artifact = artifact.trim();
        if !artifact.is_empty() {
            self.last_artifact.insert(chat_id, artifact.to_string());
        }
    }

    pub fn partner(&self, chat_id: i64) -> Option<i64> {
        self.humans.get(&chat_id).copied()
    }

    /// Links two chats in both directions with a single write.
    pub fn pair(&mut self, first: i64, second: i64) -> Result<(), StoreError> {
        self.humans.insert(first, second);
        self.humans.insert(second, first);
        self.persist(StoreKey::Humans)
    }

    pub fn request_counts(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.trial.iter().map(|(chat_id, count)| (*chat_id, *count))
    }

    pub fn known_chat_ids(&self) -> BTreeSet<i64> {
        self.trial
            .keys()
            .chain(self.context.keys())
            .chain(self.opened.keys())
            .copied()
            .collect()
    }
}
