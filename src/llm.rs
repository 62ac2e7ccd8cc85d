//! Chat-completion language model client.
//!
//! [`LanguageModel`] is the seam the answerer depends on.
//! [`ChatCompletionsClient`] talks to any OpenAI-compatible
//! `POST {url}/chat/completions` endpoint; by default Together AI running
//! `meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo`.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::LlmConfig;
use crate::http;

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model's reply text. An empty string means the model
    /// produced no content.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub struct ChatCompletionsClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl ChatCompletionsClient {
    /// Fails if the API key variable named by `llm.api_key_env` is unset or empty.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("{} environment variable not set", config.api_key_env)
            })?;

        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: config.url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let json = http::post_json(
            &self.client,
            &http::endpoint(&self.url, "chat/completions"),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "Chat completions",
        )
        .await?;

        Ok(parse_completion(&json))
    }
}

/// `choices[0].message.content`, or empty when absent.
fn parse_completion(json: &serde_json::Value) -> String {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Forty-two." } },
                { "message": { "role": "assistant", "content": "Other." } }
            ]
        });
        assert_eq!(parse_completion(&json), "Forty-two.");
    }

    #[test]
    fn missing_content_is_empty() {
        assert_eq!(parse_completion(&serde_json::json!({ "choices": [] })), "");
        assert_eq!(
            parse_completion(&serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": null } }]
            })),
            ""
        );
    }

    #[test]
    fn messages_serialize_as_role_content() {
        let value = serde_json::to_value(vec![
            ChatMessage::system("context"),
            ChatMessage::user("q?"),
        ])
        .unwrap();
        assert_eq!(value[0]["role"], "system");
        assert_eq!(value[1]["content"], "q?");
    }

    #[test]
    fn missing_api_key_fails() {
        let config = LlmConfig {
            api_key_env: "DOCQA_TEST_UNSET_LLM_KEY".to_string(),
            ..LlmConfig::default()
        };
        let err = ChatCompletionsClient::new(&config).err().unwrap();
        assert!(err.to_string().contains("DOCQA_TEST_UNSET_LLM_KEY"));
    }
}
