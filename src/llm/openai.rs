use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::llm::{CompletionError, CompletionRequest};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const COMPLETION_TIMEOUT_SECONDS: u64 = 90;

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
            return message.to_string();
        }
        return truncate_for_log(&value.to_string(), 2000);
    }
    truncate_for_log(trimmed, 2000)
}

/// Maps the per-chat "body temperature" setting onto a sampling
/// temperature: 36.5 is neutral (0.5), every degree adds 0.1.
pub fn sampling_temperature(body_temperature: f32) -> f32 {
    let value = (body_temperature - 36.5) / 10.0 + 0.5;
    if value.is_finite() {
        value.clamp(0.0, 2.0)
    } else {
        0.5
    }
}

fn extract_completion(value: &Value) -> Option<String> {
    let choice = value.get("choices").and_then(|v| v.get(0))?;
    let content = choice
        .pointer("/message/content")
        .or_else(|| choice.get("text"))
        .and_then(|v| v.as_str())?
        .trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

pub async fn complete(request: &CompletionRequest) -> Result<Option<String>> {
    if CONFIG.openai_api_key.trim().is_empty() {
        return Err(anyhow!("OPENAI_API_KEY is not configured."));
    }

    let payload = json!({
        "model": CONFIG.openai_model,
        "messages": [{ "role": "user", "content": request.prompt }],
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });

    log_llm_timing("openai", &CONFIG.openai_model, "completion", None, || async {
        debug!(
            "Completion request: model={} prompt_chars={} temperature={}",
            CONFIG.openai_model,
            request.prompt.chars().count(),
            request.temperature
        );
        let response = get_http_client()
            .post(format!(
                "{}/chat/completions",
                CONFIG.openai_base_url.trim_end_matches('/')
            ))
            .bearer_auth(&CONFIG.openai_api_key)
            .timeout(Duration::from_secs(COMPLETION_TIMEOUT_SECONDS))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = summarize_error_body(&body);
            warn!("Completion API error: status={}, body={}", status, detail);
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(CompletionError::RateLimited(detail).into());
            }
            return Err(anyhow!(
                "Completion request failed with status {}: {}",
                status,
                detail
            ));
        }

        let value = response.json::<Value>().await?;
        let completion = extract_completion(&value);
        if completion.is_none() {
            warn!(
                "Completion response had no content: {}",
                truncate_for_log(&value.to_string(), 2000)
            );
        }
        Ok(completion)
    })
    .await
}
