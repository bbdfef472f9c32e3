use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::core::prompt::{TemplateError, MATCH_INTRODUCTION};
use crate::models::{Candidate, Identity, Profile, Selection};
use crate::services::llm::TextGenerator;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Selection returned no introduction post")]
    NoPost,

    #[error("Selection failed: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Picks one candidate from the ranked list and drafts the introduction
#[async_trait]
pub trait CandidateSelector: Send + Sync {
    async fn select(
        &self,
        observer: &Identity,
        profile: &Profile,
        candidates: &[Candidate],
    ) -> Result<Selection, SelectionError>;
}

/// Candidate selection through the generative collaborator
pub struct LlmCandidateSelector {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl LlmCandidateSelector {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }
}

#[async_trait]
impl CandidateSelector for LlmCandidateSelector {
    async fn select(
        &self,
        observer: &Identity,
        profile: &Profile,
        candidates: &[Candidate],
    ) -> Result<Selection, SelectionError> {
        let stripped: Vec<Candidate> = candidates
            .iter()
            .map(|c| Candidate {
                profile: c.profile.without_embedding(),
                ..c.clone()
            })
            .collect();

        let mut values = HashMap::new();
        values.insert(
            "user_profile",
            serde_json::to_string_pretty(&profile.without_embedding())?,
        );
        values.insert("candidates", serde_json::to_string_pretty(&stripped)?);
        values.insert("username", observer.username.clone());
        values.insert("platform", observer.platform.clone());
        let prompt = MATCH_INTRODUCTION.render(&values)?;

        let items = match timeout(self.timeout, self.generator.generate(&prompt)).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => return Err(SelectionError::Transport(e.to_string())),
            Err(_) => {
                return Err(SelectionError::Transport(format!(
                    "timed out after {:?}",
                    self.timeout
                )))
            }
        };

        let first = items.first().ok_or(SelectionError::NoPost)?;
        parse_selection(first, candidates).ok_or(SelectionError::NoPost)
    }
}

/// Read `{post, matchUsername, matchPlatform}` from one generated object.
///
/// The named user must be one of `candidates`; the candidate's stored
/// identity is used so that casing in the generated text never leaks into
/// match history. A name that matches no candidate yields no identity.
pub fn parse_selection(item: &Value, candidates: &[Candidate]) -> Option<Selection> {
    let post = item
        .get("post")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty())?
        .to_string();

    let username = item
        .get("matchUsername")
        .and_then(Value::as_str)
        .map(|u| u.trim().trim_start_matches('@'))
        .filter(|u| !u.is_empty());
    let platform = item
        .get("matchPlatform")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let matched = username.and_then(|username| {
        let found = resolve_candidate(candidates, username, platform).cloned();
        if found.is_none() {
            tracing::warn!("Selected user @{} is not among the candidates", username);
        }
        found
    });

    Some(Selection { matched, post })
}

/// Find the candidate a generated handle refers to, ignoring case. The
/// platform narrows the search when given.
pub fn resolve_candidate<'a>(
    candidates: &'a [Candidate],
    username: &str,
    platform: Option<&str>,
) -> Option<&'a Identity> {
    let username = username.trim_start_matches('@');
    candidates
        .iter()
        .map(|c| &c.identity)
        .find(|identity| {
            identity.username.eq_ignore_ascii_case(username)
                && platform.map_or(true, |p| identity.platform.eq_ignore_ascii_case(p))
        })
}
