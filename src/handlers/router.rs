use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::DRAW_STYLE_SUFFIX;
use crate::engine::context;
use crate::handlers::transport::Transport;
use crate::llm::openai::sampling_temperature;
use crate::llm::{CompletionError, CompletionRequest};
use crate::state::AppState;
use crate::utils::locale::Locale;
use crate::utils::telegram::start_typing_heartbeat;

const SEARCH_KEYWORDS: [&str; 3] = ["погугли", "загугли", "google"];
const TRANSLATED_DRAW_KEYWORDS: [&str; 1] = ["нарисуй"];
const DRAW_KEYWORDS: [&str; 2] = ["draw", "paint"];
const ALWAYS_ANSWER_PREFIXES: [&str; 2] = ["отвечай", "answer"];
const SCRUBBED_SUBJECT_WORDS: [&str; 2] = ["ребенка", "child"];
const TRANSLATE_TO_ENGLISH_PROMPT: &str = "Translate to English: ";
const TRANSLATE_TO_RUSSIAN_PROMPT: &str = "Переведи на русский: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Search(String),
    Draw { subject: String, translate: bool },
    Caption(String),
    Converse(String),
}

fn keyword_rest(text: &str, keywords: &[&str]) -> Option<String> {
    let lowered = text.to_lowercase();
    keywords.iter().find_map(|keyword| {
        let rest = lowered.strip_prefix(keyword)?;
        if !rest.is_empty() && !rest.starts_with(|ch: char| ch.is_whitespace() || ch.is_ascii_punctuation()) {
            return None;
        }
        let skip = keyword.chars().count();
        let rest: String = text.chars().skip(skip).collect();
        Some(
            rest.trim_start_matches(|ch: char| ch.is_whitespace() || ch.is_ascii_punctuation())
                .trim_end()
                .to_string(),
        )
    })
}

pub fn classify_capability(photo_file_id: Option<&str>, text: Option<&str>) -> Option<Capability> {
    if let Some(file_id) = photo_file_id {
        return Some(Capability::Caption(file_id.to_string()));
    }
    let text = text.map(str::trim).filter(|value| !value.is_empty())?;
    if let Some(query) = keyword_rest(text, &SEARCH_KEYWORDS) {
        return Some(Capability::Search(query));
    }
    if let Some(subject) = keyword_rest(text, &TRANSLATED_DRAW_KEYWORDS) {
        return Some(Capability::Draw {
            subject,
            translate: true,
        });
    }
    if let Some(subject) = keyword_rest(text, &DRAW_KEYWORDS) {
        return Some(Capability::Draw {
            subject,
            translate: false,
        });
    }
    Some(Capability::Converse(text.to_string()))
}

fn is_explicitly_addressed(text: &str) -> bool {
    let lowered = text.trim_start().to_lowercase();
    ALWAYS_ANSWER_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

fn scrub_subject(subject: &str) -> String {
    let mut scrubbed = subject.to_string();
    for word in SCRUBBED_SUBJECT_WORDS {
        scrubbed = scrubbed.replace(word, "");
    }
    scrubbed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One routed message: the chat, its locale and the moment the pipeline
/// started handling it.
pub struct Route<'a> {
    pub state: &'a AppState,
    pub transport: Arc<dyn Transport>,
    pub chat_id: i64,
    pub locale: Locale,
    pub now: DateTime<Utc>,
}

impl Route<'_> {
    fn remember(&self, artifact: Option<&str>, context_text: &str) -> Result<()> {
        let mut ledger = self.state.ledger.lock();
        if let Some(artifact) = artifact {
            ledger.set_last_artifact(self.chat_id, artifact);
        }
        context::append(
            &mut ledger,
            self.chat_id,
            context_text,
            &self.state.settings,
            self.now,
        )?;
        Ok(())
    }

    async fn reply(&self, text: &str) {
        if let Err(err) = self.transport.send_text(self.chat_id, text).await {
            warn!("Failed to send reply to chat {}: {err}", self.chat_id);
        }
    }

    async fn notify_admin(&self, text: &str) {
        let Some(admin) = self.state.settings.admin_chat_id else {
            return;
        };
        if let Err(err) = self.transport.send_text(admin, text).await {
            warn!("Failed to notify admin chat {}: {err}", admin);
        }
    }

    async fn complete(&self, prompt: String) -> Option<String> {
        let settings = &self.state.settings;
        let body_temperature = self
            .state
            .ledger
            .lock()
            .temperature(self.chat_id)
            .unwrap_or(settings.default_temperature);
        let request = CompletionRequest {
            prompt,
            max_tokens: settings.completion_max_tokens,
            temperature: sampling_temperature(body_temperature),
        };
        match self.state.services.complete(request).await {
            Ok(Some(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                debug!("Completion for chat {} returned nothing", self.chat_id);
                None
            }
            Err(CompletionError::RateLimited(detail)) => {
                warn!("Completion rate limited for chat {}: {}", self.chat_id, detail);
                self.notify_admin(&format!(
                    "Completion rate limit hit (chat {}): {}",
                    self.chat_id, detail
                ))
                .await;
                None
            }
            Err(err) => {
                warn!("Completion failed for chat {}: {err}", self.chat_id);
                None
            }
        }
    }

    async fn search(&self, query: &str) -> Result<&'static str> {
        let _typing = start_typing_heartbeat(self.transport.clone(), self.chat_id);
        let result = match self.state.services.search(query, self.locale).await {
            Ok(result) => result,
            Err(err) => {
                warn!("Search failed for chat {}: {err}", self.chat_id);
                return Ok("no_reply");
            }
        };
        let result = result.trim();
        if result.is_empty() {
            return Ok("no_reply");
        }
        self.remember(Some(result), result)?;
        self.reply(result).await;
        Ok("searched")
    }

    async fn draw(&self, subject: &str, translate: bool) -> Result<&'static str> {
        let subject = if subject.trim().is_empty() {
            self.state
                .ledger
                .lock()
                .last_artifact(self.chat_id)
                .map(str::to_string)
        } else {
            Some(subject.to_string())
        };
        let Some(subject) = subject.map(|value| scrub_subject(&value)) else {
            debug!("Nothing to draw for chat {}", self.chat_id);
            return Ok("no_subject");
        };
        if subject.is_empty() {
            return Ok("no_subject");
        }

        let _typing = start_typing_heartbeat(self.transport.clone(), self.chat_id);
        let english = if translate {
            match self
                .complete(format!("{TRANSLATE_TO_ENGLISH_PROMPT}{subject}"))
                .await
            {
                Some(translated) => translated,
                None => return Ok("no_reply"),
            }
        } else {
            subject
        };

        self.remember(None, &english)?;
        let prompt = format!("{english}{DRAW_STYLE_SUFFIX}");
        match self.state.services.generate_image(&prompt).await {
            Ok(Some(image)) => {
                if let Err(err) = self.transport.send_photo(self.chat_id, image).await {
                    warn!("Failed to send image to chat {}: {err}", self.chat_id);
                }
                Ok("drew")
            }
            Ok(None) => {
                info!("Image generation returned nothing for chat {}", self.chat_id);
                Ok("no_reply")
            }
            Err(err) => {
                warn!("Image generation failed for chat {}: {err}", self.chat_id);
                Ok("no_reply")
            }
        }
    }

    async fn caption(&self, file_id: &str) -> Result<&'static str> {
        let _typing = start_typing_heartbeat(self.transport.clone(), self.chat_id);
        let url = match self.transport.file_url(file_id).await {
            Ok(url) => url,
            Err(err) => {
                warn!("Could not resolve photo for chat {}: {err}", self.chat_id);
                return Ok("no_reply");
            }
        };
        let caption = match self.state.services.caption_image(&url).await {
            Ok(caption) => caption.trim().to_string(),
            Err(err) => {
                warn!("Captioning failed for chat {}: {err}", self.chat_id);
                return Ok("no_reply");
            }
        };
        if caption.is_empty() {
            return Ok("no_reply");
        }

        let shown = match self.locale {
            Locale::Ru => {
                let prompt = format!("{TRANSLATE_TO_RUSSIAN_PROMPT}{caption}");
                self.complete(prompt).await.unwrap_or_else(|| caption.clone())
            }
            Locale::En => caption.clone(),
        };
        self.remember(Some(&caption), &shown)?;
        self.reply(&shown).await;
        Ok("captioned")
    }

    async fn converse(&self, text: &str) -> Result<&'static str> {
        let prompt = {
            let mut ledger = self.state.ledger.lock();
            context::append(
                &mut ledger,
                self.chat_id,
                &format!("{text}."),
                &self.state.settings,
                self.now,
            )?;
            let on_beat = ledger.advance_skip_phase(self.chat_id);
            if !on_beat && !is_explicitly_addressed(text) {
                let count = ledger.decrement_requests(self.chat_id)?;
                debug!(
                    "Skipping turn in chat {} (skip factor {}, count now {})",
                    self.chat_id,
                    ledger.skip_factor(self.chat_id),
                    count
                );
                return Ok("skipped");
            }
            let mode = ledger.mode_suffix(self.chat_id);
            let buffer = ledger.context(self.chat_id);
            if mode.is_empty() {
                buffer.to_string()
            } else {
                format!("{buffer}\n{mode}")
            }
        };

        let _typing = start_typing_heartbeat(self.transport.clone(), self.chat_id);
        let Some(answer) = self.complete(prompt).await else {
            return Ok("no_reply");
        };
        self.remember(Some(&answer), &answer)?;
        self.reply(&answer).await;
        Ok("answered")
    }

    /// Runs the capability and relays its output. Service failures end in
    /// silence; only store failures surface as errors.
    pub async fn dispatch(&self, capability: &Capability) -> Result<&'static str> {
        match capability {
            Capability::Search(query) => self.search(query).await,
            Capability::Draw { subject, translate } => self.draw(subject, *translate).await,
            Capability::Caption(file_id) => self.caption(file_id).await,
            Capability::Converse(text) => self.converse(text).await,
        }
    }
}
