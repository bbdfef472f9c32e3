use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::core::prompt::{TemplateError, IDEAL_MATCH};
use crate::models::Profile;
use crate::services::llm::TextGenerator;

const DESCRIPTION_FIELD: &str = "ideal_match_description";

#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The collaborator answered but produced no usable description
    #[error("Generation returned no ideal match description")]
    Empty,

    #[error("Generation failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Turns a profile into a prose description of its ideal counterpart
#[derive(Clone)]
pub struct IdealMatchSynthesizer {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl IdealMatchSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn synthesize(
        &self,
        profile: &Profile,
        context: Option<&str>,
    ) -> Result<String, SynthesisError> {
        let profile_json = serde_json::to_string_pretty(&profile.without_embedding())
            .map_err(|e| SynthesisError::Transport(e.to_string()))?;

        let mut values = HashMap::new();
        values.insert("user_profile", profile_json);
        values.insert(
            "recent_messages",
            context.unwrap_or("(no recent messages)").to_string(),
        );
        let prompt = IDEAL_MATCH.render(&values)?;

        let items = match timeout(self.timeout, self.generator.generate(&prompt)).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => return Err(SynthesisError::Transport(e.to_string())),
            Err(_) => {
                return Err(SynthesisError::Transport(format!(
                    "timed out after {:?}",
                    self.timeout
                )))
            }
        };

        extract_description(&items).ok_or(SynthesisError::Empty)
    }
}

fn extract_description(items: &[Value]) -> Option<String> {
    items
        .first()?
        .get(DESCRIPTION_FIELD)?
        .as_str()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}
