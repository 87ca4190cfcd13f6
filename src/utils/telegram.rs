use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::handlers::transport::Transport;

const TYPING_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

/// Keeps a "typing" indicator alive until dropped.
pub struct TypingHeartbeat {
    task_handle: Option<JoinHandle<()>>,
}

impl Drop for TypingHeartbeat {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

pub fn start_typing_heartbeat(transport: Arc<dyn Transport>, chat_id: i64) -> TypingHeartbeat {
    let task_handle = tokio::spawn(async move {
        loop {
            if let Err(err) = transport.send_typing(chat_id).await {
                warn!("send_chat_action failed: {err}");
            }
            tokio::time::sleep(TYPING_HEARTBEAT_INTERVAL).await;
        }
    });

    TypingHeartbeat {
        task_handle: Some(task_handle),
    }
}
