use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::Settings;
use crate::db::ledger::ChatLedger;
use crate::handlers::access::AbuseGuard;
use crate::llm::AiServices;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Mutex<ChatLedger>>,
    pub guard: Arc<AbuseGuard>,
    pub services: Arc<dyn AiServices>,
    pub settings: Arc<Settings>,
    chat_locks: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl AppState {
    pub fn new(ledger: ChatLedger, services: Arc<dyn AiServices>, settings: Settings) -> Self {
        AppState {
            ledger: Arc::new(Mutex::new(ledger)),
            guard: Arc::new(AbuseGuard::new()),
            services,
            settings: Arc::new(settings),
            chat_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serializes handling per chat. Different chats proceed concurrently.
    /// Locks nobody holds or waits on are dropped from the map.
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.chat_locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(chat_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{ledger, ScriptedServices};
    use std::time::Duration;

    #[tokio::test]
    async fn same_chat_waits_while_other_chats_proceed() {
        let state = AppState::new(
            ledger(),
            Arc::new(ScriptedServices::default()),
            Settings::default(),
        );
        let held = state.lock_chat(1).await;

        let other = tokio::time::timeout(Duration::from_millis(200), state.lock_chat(2)).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), state.lock_chat(1)).await;
        assert!(same.is_err());

        drop(held);
        let same = tokio::time::timeout(Duration::from_millis(200), state.lock_chat(1)).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn idle_chat_locks_are_released() {
        let state = AppState::new(
            ledger(),
            Arc::new(ScriptedServices::default()),
            Settings::default(),
        );
        for chat_id in 0..50 {
            drop(state.lock_chat(chat_id).await);
        }
        let held = state.lock_chat(100).await;
        assert_eq!(state.chat_locks.lock().len(), 1);

        let _other = state.lock_chat(101).await;
        assert_eq!(state.chat_locks.lock().len(), 2);
        drop(held);
    }
}
