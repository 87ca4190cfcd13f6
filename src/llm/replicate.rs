use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::CONFIG;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLL_ATTEMPTS: usize = 90;

#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    output: Option<Value>,
    error: Option<Value>,
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

fn output_text(output: &Value) -> Option<String> {
    let text = match output {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(""),
        _ => return None,
    };
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

async fn fetch_prediction(url: &str) -> Result<Prediction> {
    let response = get_http_client()
        .get(url)
        .bearer_auth(&CONFIG.replicate_api_key)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(anyhow!(
            "Caption prediction poll failed with status {}",
            response.status()
        ));
    }
    response
        .json::<Prediction>()
        .await
        .map_err(|err| anyhow!("Invalid caption prediction: {err}"))
}

async fn run_prediction(image_url: &str) -> Result<String> {
    let response = get_http_client()
        .post(format!(
            "{}/predictions",
            CONFIG.replicate_base_url.trim_end_matches('/')
        ))
        .bearer_auth(&CONFIG.replicate_api_key)
        .json(&json!({
            "version": CONFIG.replicate_caption_version,
            "input": { "image": image_url },
        }))
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!(
            "Caption prediction failed with status {}: {}",
            status,
            body
        ));
    }

    let mut prediction: Prediction = response
        .json()
        .await
        .map_err(|err| anyhow!("Invalid caption prediction: {err}"))?;
    let poll_url = prediction
        .urls
        .as_ref()
        .and_then(|urls| urls.get.clone())
        .ok_or_else(|| anyhow!("Caption prediction has no poll URL"))?;

    for attempt in 0..MAX_POLL_ATTEMPTS {
        match prediction.status.as_str() {
            "succeeded" => {
                return prediction
                    .output
                    .as_ref()
                    .and_then(output_text)
                    .ok_or_else(|| anyhow!("Caption prediction returned no text"));
            }
            "failed" | "canceled" => {
                return Err(anyhow!(
                    "Caption prediction {}: {}",
                    prediction.status,
                    prediction.error.map(|v| v.to_string()).unwrap_or_default()
                ));
            }
            status => {
                debug!("Caption prediction {status} (poll {})", attempt + 1);
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
        prediction = fetch_prediction(&poll_url).await?;
    }

    Err(anyhow!("Caption prediction did not finish in time"))
}

pub async fn caption_image(image_url: &str) -> Result<String> {
    if CONFIG.replicate_api_key.trim().is_empty() {
        return Err(anyhow!("REPLICATE_API_KEY is not configured."));
    }
    info!("Requesting caption for {}", image_url);
    log_llm_timing(
        "replicate",
        &CONFIG.replicate_caption_version,
        "caption",
        None,
        || run_prediction(image_url),
    )
    .await
}
