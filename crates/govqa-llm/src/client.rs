use async_trait::async_trait;
use futures::TryStreamExt;
use std::time::Duration;

use govqa_core::config::LlmConfig;
use govqa_core::{ChatMessage, ChatModel, Error, Result, TextStream};

use crate::sse::text_stream;

/// Chat-completions client for OpenAI-compatible endpoints (Groq by default).
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    config: LlmConfig,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::InvalidConfig("llm.api_key is required".to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {}", e)))?;
        tracing::info!(model = %config.model, base_url = %config.base_url, "LLM client initialized");
        Ok(Self { http, config, api_key })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn body(&self, messages: &[ChatMessage], stream: bool) -> serde_json::Value {
        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": api_messages,
            "temperature": self.config.temperature,
            "max_completion_tokens": self.config.max_tokens,
            "top_p": 1,
            "stream": stream,
        });
        if let Some(effort) = &self.config.reasoning_effort {
            body["reasoning_effort"] = serde_json::json!(effort);
        }
        body
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        tracing::debug!(messages = messages.len(), stream, model = %self.config.model, "calling LLM");
        let resp = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&self.body(messages, stream))
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::Generation(format!("API error {}: {}", status, error_body)));
        }
        Ok(resp)
    }
}

pub fn parse_completion(body: &serde_json::Value) -> Result<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Generation(format!("response has no message content: {}", body)))
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        if self.config.stream {
            let text: String = self.generate_stream(messages).await?.try_collect().await?;
            tracing::debug!(chars = text.chars().count(), "LLM streaming response received");
            return Ok(text);
        }

        let resp = self.send(messages, false).await?;
        let body: serde_json::Value = resp.json().await.map_err(|e| Error::Generation(e.to_string()))?;
        let text = parse_completion(&body)?;
        tracing::debug!(chars = text.chars().count(), "LLM response received");
        Ok(text)
    }

    async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let resp = self.send(messages, true).await?;
        Ok(text_stream(resp.bytes_stream()))
    }
}
