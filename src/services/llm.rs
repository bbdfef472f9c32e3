use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when calling the generation or embedding API
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Generative text collaborator: prompt in, array of JSON objects out
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<Value>, LlmError>;
}

/// Embedding collaborator: text in, fixed-dimension vector out
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Client for an OpenAI-compatible API (`/chat/completions`, `/embeddings`)
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        embedding_model: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            model,
            embedding_model,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, LlmError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(LlmError::Unauthorized);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            tracing::error!("LLM API call to {} failed: {} - {}", path, status, body);
            return Err(LlmError::ApiError(format!("{} returned {}", path, status)));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<Value>, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.7,
        });

        let response = self.post_json("chat/completions", &body).await?;

        let content = response
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| LlmError::InvalidResponse("Missing choices[0].message.content".into()))?;

        tracing::debug!("Generation returned {} chars", content.len());

        parse_object_array(content)
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = json!({
            "model": self.embedding_model,
            "input": text,
        });

        let response = self.post_json("embeddings", &body).await?;

        let values = response
            .pointer("/data/0/embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| LlmError::InvalidResponse("Missing data[0].embedding".into()))?;

        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| LlmError::InvalidResponse("Non-numeric embedding value".into()))
            })
            .collect()
    }
}

/// Extract an array of JSON objects from model output.
///
/// Accepts a bare array, a single object, or either wrapped in a fenced
/// code block or surrounding prose. Non-object array items are dropped.
pub fn parse_object_array(content: &str) -> Result<Vec<Value>, LlmError> {
    let trimmed = strip_code_fence(content.trim());

    let parsed = serde_json::from_str::<Value>(trimmed).ok().or_else(|| {
        let start = trimmed.find(['[', '{'])?;
        let end = trimmed.rfind([']', '}'])?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
    });

    match parsed {
        Some(Value::Array(items)) => Ok(items.into_iter().filter(Value::is_object).collect()),
        Some(obj @ Value::Object(_)) => Ok(vec![obj]),
        _ => Err(LlmError::InvalidResponse(
            "Generation output is not a JSON array of objects".into(),
        )),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line, e.g. ```json
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim_end().trim_end_matches("```").trim()
}
