//! Prompt building and the generation-service client.
//!
//! The generative model is external and opaque: the core builds the full
//! prompt (system instructions, assembled context with numbered citations,
//! conversation history, question) and hands it to a
//! [`GenerationProvider`]. Nothing downstream of the prompt is interpreted
//! beyond being the answer text.

use crate::assemble::AnswerContext;
use crate::error::{AnswerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable consulted for the generation service API key.
pub const API_KEY_ENV: &str = "TENDER_AI_LLM_API_KEY";

/// A single turn of prior conversation included in the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Trait for text generation services.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate an answer for the fully built prompt.
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: usize) -> Result<String>;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Configuration for the remote generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Chat-completions style endpoint URL.
    pub endpoint: String,
    pub model: String,
    /// API key, usually populated from [`API_KEY_ENV`].
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Backoff before the single retry the orchestrator performs.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> usize {
    700
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_retry_backoff_ms() -> u64 {
    500
}

impl GenerationConfig {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }

    /// Pull the API key from [`API_KEY_ENV`] if it is not already set.
    pub fn with_api_key_from_env(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var(API_KEY_ENV).ok();
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(AnswerError::configuration("generation endpoint is empty"));
        }
        if self.model.trim().is_empty() {
            return Err(AnswerError::configuration("generation model is empty"));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// HTTP client for a chat-completions style generation endpoint.
pub struct RemoteGenerationProvider {
    config: GenerationConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl RemoteGenerationProvider {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl GenerationProvider for RemoteGenerationProvider {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: usize) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnswerError::generation(
                1,
                format!("status {status}: {message}"),
            ));
        }

        let payload: ChatCompletionResponse = response.json().await?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AnswerError::generation(1, "response contained no choices"))
    }

    fn provider_name(&self) -> &str {
        "remote-http"
    }
}

/// Renders the full prompt: system instructions, numbered context, prior
/// turns, question.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_instructions: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            system_instructions: "You are a procurement analyst assistant. Answer the question \
                using ONLY the numbered context entries below. Cite entries as [n]. If the \
                context does not contain the answer, say that the indexed data is insufficient \
                instead of guessing. Quote prices with their currency and year."
                .to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new(system_instructions: impl Into<String>) -> Self {
        Self {
            system_instructions: system_instructions.into(),
        }
    }

    /// Build the prompt for one question over an assembled context.
    pub fn build(&self, context: &AnswerContext, history: &[ChatTurn], question: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.system_instructions);
        prompt.push_str("\n\nContext:\n");
        for (index, result) in context.results.iter().enumerate() {
            prompt.push_str(&format!(
                "[{}] ({}) {}\n",
                index + 1,
                result.source(),
                result.text()
            ));
        }

        if !history.is_empty() {
            prompt.push_str("\nConversation so far:\n");
            for turn in history {
                let role = match turn.role {
                    ChatRole::User => "User",
                    ChatRole::Assistant => "Assistant",
                };
                prompt.push_str(&format!("{role}: {}\n", turn.content));
            }
        }

        prompt.push_str(&format!("\nQuestion: {question}\nAnswer:"));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::ContextAssembler;
    use chrono::Utc;
    use tender_ai_retriever::retrieval::types::{
        SearchResult, StructuredResult, StructuredSource,
    };

    fn context_with_one_fact() -> AnswerContext {
        let assembler = ContextAssembler::new(500);
        assembler.assemble(vec![SearchResult::Structured(StructuredResult {
            source: StructuredSource::AwardItems,
            row_id: Some(1),
            text: "surgical drapes — 2024: avg price 150.00 KZT".to_string(),
            score: 0.85,
            effective_at: Utc::now(),
            citation: "award_items #1".to_string(),
        })])
    }

    #[test]
    fn prompt_numbers_context_entries_with_sources() {
        let builder = PromptBuilder::default();
        let prompt = builder.build(&context_with_one_fact(), &[], "past prices for drapes?");
        assert!(prompt.contains("[1] (award_items #1) surgical drapes"));
        assert!(prompt.contains("Question: past prices for drapes?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn prompt_includes_history_between_context_and_question() {
        let builder = PromptBuilder::default();
        let history = vec![
            ChatTurn {
                role: ChatRole::User,
                content: "And for 2023?".to_string(),
            },
            ChatTurn {
                role: ChatRole::Assistant,
                content: "The 2023 average was 165 KZT.".to_string(),
            },
        ];
        let prompt = builder.build(&context_with_one_fact(), &history, "and 2024?");
        let context_at = prompt.find("Context:").expect("context section");
        let history_at = prompt.find("Conversation so far:").expect("history section");
        let question_at = prompt.find("Question:").expect("question section");
        assert!(context_at < history_at && history_at < question_at);
        assert!(prompt.contains("User: And for 2023?"));
    }

    #[test]
    fn generation_config_validation() {
        assert!(GenerationConfig::new("", "model").validate().is_err());
        assert!(GenerationConfig::new("https://llm.example", "")
            .validate()
            .is_err());
        assert!(
            GenerationConfig::new("https://llm.example/v1/chat/completions", "answerer-v2")
                .validate()
                .is_ok()
        );
    }
}
