use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::models::DeliveryAddress;

/// Errors that can occur when delivering a message to the front end
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("No bot token configured for agent {0:?}")]
    MissingToken(Option<String>),
}

/// Front-end delivery collaborator.
///
/// `Ok(false)` means the platform cannot be reached through this messenger.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(
        &self,
        platform: &str,
        address: &DeliveryAddress,
        text: &str,
    ) -> Result<bool, DeliveryError>;
}

/// Telegram Bot API delivery with per-agent bot tokens
pub struct TelegramMessenger {
    api_base: String,
    default_token: Option<String>,
    agent_tokens: HashMap<String, String>,
    client: Client,
}

impl TelegramMessenger {
    pub fn new(
        api_base: String,
        default_token: Option<String>,
        agent_tokens: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;

        let agent_tokens = agent_tokens
            .into_iter()
            .map(|(agent, token)| (sanitize_agent(&agent), token))
            .collect();

        Ok(Self {
            api_base,
            default_token: default_token.filter(|t| !t.is_empty()),
            agent_tokens,
            client,
        })
    }

    /// Token for the agent that captured the address, else the default bot
    pub fn bot_token_for(&self, agent_username: Option<&str>) -> Option<&str> {
        agent_username
            .map(sanitize_agent)
            .and_then(|key| self.agent_tokens.get(&key))
            .or(self.default_token.as_ref())
            .map(String::as_str)
    }
}

/// Agent name as used in token lookups: upper-cased, alphanumerics only
pub fn sanitize_agent(agent: &str) -> String {
    agent
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_message(
        &self,
        platform: &str,
        address: &DeliveryAddress,
        text: &str,
    ) -> Result<bool, DeliveryError> {
        if !platform.eq_ignore_ascii_case("telegram") {
            tracing::debug!("No delivery channel for platform {}", platform);
            return Ok(false);
        }

        let agent = address.agent_username.as_deref();
        let token = self
            .bot_token_for(agent)
            .ok_or_else(|| DeliveryError::MissingToken(agent.map(str::to_string)))?;

        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            token
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": address.chat_id, "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            return Err(DeliveryError::ApiError(format!(
                "sendMessage returned {}: {}",
                status, body
            )));
        }

        tracing::debug!("Delivered message to chat {}", address.chat_id);
        Ok(true)
    }
}
