use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::info;

use crate::config::CONFIG;
use crate::utils::http::get_http_client;
use crate::utils::locale::Locale;
use crate::utils::timing::log_llm_timing;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const MAX_RESULTS: usize = 3;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Option<Vec<SearchItem>>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

fn format_results(payload: SearchResponse) -> String {
    let mut blocks = Vec::new();
    for item in payload.items.unwrap_or_default() {
        let link = item.link.unwrap_or_default();
        if link.trim().is_empty() {
            continue;
        }
        let title = item.title.unwrap_or_else(|| link.clone());
        let snippet = item.snippet.unwrap_or_default().replace('\n', " ");
        let snippet = snippet.trim();
        if snippet.is_empty() {
            blocks.push(format!("{title}\n{link}"));
        } else {
            blocks.push(format!("{title}\n{snippet}\n{link}"));
        }
        if blocks.len() == MAX_RESULTS {
            break;
        }
    }
    blocks.join("\n\n")
}

pub async fn search(query: &str, locale: Locale) -> Result<String> {
    if CONFIG.google_api_key.trim().is_empty() || CONFIG.google_search_cx.trim().is_empty() {
        return Err(anyhow!("GOOGLE_API_KEY / GOOGLE_SEARCH_CX are not configured."));
    }
    let query = query.trim();
    if query.is_empty() {
        return Err(anyhow!("query must not be empty"));
    }

    log_llm_timing("google", "customsearch", "search", None, || async {
        info!(
            "Calling search endpoint {} with query: {}",
            CONFIG.google_search_endpoint, query
        );
        let num = MAX_RESULTS.to_string();
        let response = get_http_client()
            .get(&CONFIG.google_search_endpoint)
            .query(&[
                ("key", CONFIG.google_api_key.as_str()),
                ("cx", CONFIG.google_search_cx.as_str()),
                ("q", query),
                ("hl", locale.code()),
                ("num", num.as_str()),
            ])
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
            .send()
            .await
            .map_err(|err| anyhow!("Search request failed: {err}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Search request failed with status {}",
                response.status()
            ));
        }

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|err| anyhow!("Invalid search response: {err}"))?;
        Ok(format_results(data))
    })
    .await
}
