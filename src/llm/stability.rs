use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::CONFIG;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const IMAGE_SIZE: u32 = 512;
const IMAGE_STEPS: u32 = 30;
const IMAGE_CFG_SCALE: u32 = 7;
const GENERATION_TIMEOUT_SECONDS: u64 = 120;

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    artifacts: Option<Vec<GenerationArtifact>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationArtifact {
    base64: Option<String>,
    finish_reason: Option<String>,
}

fn decode_first_image(payload: GenerationResponse) -> Result<Option<Vec<u8>>> {
    for artifact in payload.artifacts.unwrap_or_default() {
        if artifact.finish_reason.as_deref() == Some("CONTENT_FILTERED") {
            warn!("Image generation artifact was content filtered");
            continue;
        }
        let Some(encoded) = artifact.base64 else {
            continue;
        };
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| anyhow!("Invalid base64 image artifact: {err}"))?;
        if !infer::is_image(&bytes) {
            warn!("Image generation artifact is not a recognised image");
            continue;
        }
        return Ok(Some(bytes));
    }
    Ok(None)
}

pub async fn generate_image(prompt: &str) -> Result<Option<Vec<u8>>> {
    if CONFIG.stability_api_key.trim().is_empty() {
        return Err(anyhow!("STABILITY_API_KEY is not configured."));
    }
    if prompt.trim().is_empty() {
        return Ok(None);
    }

    let payload = json!({
        "cfg_scale": IMAGE_CFG_SCALE,
        "clip_guidance_preset": "FAST_BLUE",
        "height": IMAGE_SIZE,
        "width": IMAGE_SIZE,
        "samples": 1,
        "steps": IMAGE_STEPS,
        "text_prompts": [{ "text": prompt, "weight": 1 }],
    });

    log_llm_timing(
        "stability",
        &CONFIG.stability_endpoint,
        "text_to_image",
        None,
        || async {
            info!("Calling image generation endpoint {}", CONFIG.stability_endpoint);
            let response = get_http_client()
                .post(&CONFIG.stability_endpoint)
                .bearer_auth(&CONFIG.stability_api_key)
                .header("Accept", "application/json")
                .timeout(Duration::from_secs(GENERATION_TIMEOUT_SECONDS))
                .json(&payload)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!(
                    "Image generation failed with status {}: {}",
                    status,
                    body
                ));
            }

            let data: GenerationResponse = response
                .json()
                .await
                .map_err(|err| anyhow!("Invalid image generation response: {err}"))?;
            decode_first_image(data)
        },
    )
    .await
}
