use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::handlers::inbound::InboundMessage;

/// Logs a received/completed pair on the `bot.timing` target for one
/// inbound message.
#[derive(Debug)]
pub struct HandlingTimer {
    chat_id: i64,
    sender_id: Option<i64>,
    username: Option<String>,
    kind: &'static str,
    text: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    outcome: String,
    completed: bool,
}

impl HandlingTimer {
    pub fn from_inbound(message: &InboundMessage) -> Self {
        let text = message.text.as_ref().map(|value| {
            let flattened = value.replace('\n', " ");
            if flattened.chars().count() > 300 {
                flattened.chars().take(300).collect()
            } else {
                flattened
            }
        });

        HandlingTimer {
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            username: message.username.clone(),
            kind: message.kind_label(),
            text,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            outcome: "unfinished".to_string(),
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: "bot.timing",
            "event=message_received chat_id={} user_id={:?} username={:?} kind={} received_at={} text={:?}",
            self.chat_id,
            self.sender_id,
            self.username,
            self.kind,
            self.started_at.to_rfc3339(),
            self.text
        );
    }

    pub fn mark_outcome(&mut self, outcome: &str) {
        self.outcome = outcome.to_string();
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "bot.timing",
            "event=message_completed chat_id={} kind={} started_at={} completed_at={} duration_s={:.3} outcome={}",
            self.chat_id,
            self.kind,
            self.started_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            duration,
            self.outcome
        );
    }
}

impl Drop for HandlingTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_handling_timer(message: &InboundMessage) -> HandlingTimer {
    let timer = HandlingTimer::from_inbound(message);
    timer.log_received();
    timer
}

pub async fn log_llm_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "bot.timing",
        "event=service_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_err() { "error" } else { "success" };

    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "bot.timing",
        "event=service_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        Utc::now().to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}
