//! Hosted chat model providers.
//!
//! - [`CohereChat`]: Cohere v2 chat API (`POST {base_url}/v2/chat`).
//! - [`OpenAiChat`]: any OpenAI-compatible `POST {base_url}/chat/completions`.
//! - [`DisabledChat`]: always fails.
//!
//! Both HTTP providers share the retry policy of the embedding provider.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use docchat_core::chat::{ChatMessage, ChatModel};
use docchat_core::error::ProviderError;

use crate::config::{secret_from_env, ChatConfig};
use crate::embedding::send_with_retry;

const SERVICE: &str = "chat";

/// Answer text used when the model returns no text content.
const EMPTY_ANSWER: &str = "No response";

/// Instantiate the chat model named by `config.provider`.
pub fn create_chat_model(config: &ChatConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat)),
        "cohere" => Ok(Arc::new(CohereChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        other => anyhow::bail!("Unknown chat provider: {}", other),
    }
}

pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
        Err(ProviderError::Disabled(SERVICE.to_string()))
    }
}

/// Connection settings shared by the HTTP chat providers.
struct HttpChat {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key_env: String,
    max_retries: u32,
}

impl HttpChat {
    fn new(config: &ChatConfig, path: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if secret_from_env(&config.api_key_env).is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "chat API key is not set; chat requests will fail"
            );
        }

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), path),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn post(&self, messages: &[ChatMessage]) -> Result<serde_json::Value, ProviderError> {
        let api_key = secret_from_env(&self.api_key_env).ok_or_else(|| ProviderError::Config {
            service: SERVICE.to_string(),
            message: format!("{} is not set", self.api_key_env),
        })?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body);
        send_with_retry(SERVICE, request, self.max_retries).await
    }
}

// ============ Cohere ============

pub struct CohereChat {
    http: HttpChat,
}

impl CohereChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Ok(Self {
            http: HttpChat::new(config, "/v2/chat")?,
        })
    }
}

#[async_trait]
impl ChatModel for CohereChat {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let json = self.http.post(messages).await?;
        parse_cohere_response(&json)
    }
}

#[derive(Deserialize)]
struct CohereResponse {
    message: CohereMessage,
}

#[derive(Deserialize)]
struct CohereMessage {
    #[serde(default)]
    content: Vec<CohereContent>,
}

#[derive(Deserialize)]
struct CohereContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Join every text content item with single spaces.
fn parse_cohere_response(json: &serde_json::Value) -> Result<String, ProviderError> {
    let parsed: CohereResponse =
        serde_json::from_value(json.clone()).map_err(|e| ProviderError::decode(SERVICE, e))?;
    let text = parsed
        .message
        .content
        .into_iter()
        .filter(|c| c.kind == "text")
        .filter_map(|c| c.text)
        .collect::<Vec<_>>()
        .join(" ");
    Ok(non_empty_answer(text))
}

// ============ OpenAI-compatible ============

pub struct OpenAiChat {
    http: HttpChat,
}

impl OpenAiChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Ok(Self {
            http: HttpChat::new(config, "/chat/completions")?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let json = self.http.post(messages).await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String, ProviderError> {
    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| ProviderError::decode(SERVICE, "missing choices array"))?;
    let text = choices
        .first()
        .and_then(|c| c.pointer("/message/content"))
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string();
    Ok(non_empty_answer(text))
}

fn non_empty_answer(text: String) -> String {
    if text.trim().is_empty() {
        EMPTY_ANSWER.to_string()
    } else {
        text
    }
}
