pub mod google_search;
pub mod openai;
pub mod replicate;
pub mod stability;

use anyhow::Result;
use async_trait::async_trait;

use crate::utils::locale::Locale;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion rate limited: {0}")]
    RateLimited(String),
    #[error(transparent)]
    Request(#[from] anyhow::Error),
}

impl CompletionError {
    fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<CompletionError>() {
            Ok(typed) => typed,
            Err(other) => CompletionError::Request(other),
        }
    }
}

/// External AI collaborators. `Ok(None)` means the service answered with
/// nothing usable, which callers treat as "no reply".
#[async_trait]
pub trait AiServices: Send + Sync {
    async fn complete(&self, request: CompletionRequest)
        -> Result<Option<String>, CompletionError>;
    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>>;
    async fn caption_image(&self, image_url: &str) -> Result<String>;
    async fn search(&self, query: &str, locale: Locale) -> Result<String>;
}

/// Services backed by the configured HTTP endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveServices;

#[async_trait]
impl AiServices for LiveServices {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<Option<String>, CompletionError> {
        openai::complete(&request)
            .await
            .map_err(CompletionError::from_anyhow)
    }

    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>> {
        stability::generate_image(prompt).await
    }

    async fn caption_image(&self, image_url: &str) -> Result<String> {
        replicate::caption_image(image_url).await
    }

    async fn search(&self, query: &str, locale: Locale) -> Result<String> {
        google_search::search(query, locale).await
    }
}
