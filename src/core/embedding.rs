use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::models::Profile;
use crate::services::llm::{Embedder, LlmError};

/// Canonical embedding text for a profile.
///
/// Fields are concatenated in a fixed order; absent fields contribute
/// nothing. Returns `None` when the result is blank.
pub fn canonical_text(profile: &Profile) -> Option<String> {
    let public = &profile.public;
    let private = &profile.private;
    let project = private.project.as_ref();

    let desired = public.desired_connections.as_ref().map(|d| d.joined());

    let parts = [
        public.summary.as_deref(),
        public.intent_category.as_deref(),
        public.project_description.as_deref(),
        private.background.as_deref(),
        private.knowledge_domain.as_deref(),
        project.and_then(|p| p.domain.as_deref()),
        project.and_then(|p| p.description.as_deref()),
        desired.as_deref(),
    ];

    let text = parts
        .iter()
        .map(|part| part.unwrap_or("").trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Wraps the embedding collaborator. Failures and timeouts become `None`.
#[derive(Clone)]
pub struct EmbeddingGateway {
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
}

impl EmbeddingGateway {
    pub fn new(embedder: Arc<dyn Embedder>, timeout: Duration) -> Self {
        Self { embedder, timeout }
    }

    pub async fn embed_profile(&self, profile: &Profile) -> Option<Vec<f32>> {
        let text = canonical_text(profile)?;
        self.embed_text(&text).await
    }

    pub async fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
        if text.trim().is_empty() {
            tracing::debug!("Skipping embedding of blank text");
            return None;
        }

        match self.call(text).await {
            Ok(vector) if vector.is_empty() => {
                tracing::warn!("Embedding collaborator returned an empty vector");
                None
            }
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::error!("Embedding failed: {}", e);
                None
            }
        }
    }

    /// Embed a fixed probe string and return the dimension, for the startup
    /// check against the index's configured dimension
    pub async fn probe_dimension(&self) -> Result<usize, LlmError> {
        self.call("dimension probe").await.map(|v| v.len())
    }

    async fn call(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        match timeout(self.timeout, self.embedder.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::ApiError(format!(
                "embedding timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PrivateAttrs, ProjectAttrs, PublicAttrs, TextOrList};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LlmError::ApiError("down".to_string()));
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn gateway(fail: bool) -> (EmbeddingGateway, Arc<CountingEmbedder>) {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            fail,
        });
        (
            EmbeddingGateway::new(embedder.clone(), Duration::from_secs(1)),
            embedder,
        )
    }

    #[test]
    fn test_canonical_text_order() {
        let public = PublicAttrs {
            summary: Some("Building an AI coach".to_string()),
            intent_category: Some("partnership".to_string()),
            desired_connections: Some(TextOrList::List(vec![
                "marketer".to_string(),
                "designer".to_string(),
            ])),
            ..Default::default()
        };
        let private = PrivateAttrs {
            background: Some("ex-athlete".to_string()),
            project: Some(ProjectAttrs {
                domain: Some("fitness".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let text = canonical_text(&Profile::new(public, private)).unwrap();
        assert_eq!(
            text,
            "Building an AI coach partnership ex-athlete fitness marketer designer"
        );
    }

    #[tokio::test]
    async fn test_empty_profile_skips_collaborator() {
        let (gateway, embedder) = gateway(false);
        let empty = Profile::new(PublicAttrs::default(), PrivateAttrs::default());

        assert!(gateway.embed_profile(&empty).await.is_none());
        assert!(gateway.embed_text("   ").await.is_none());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_becomes_none() {
        let (gateway, embedder) = gateway(true);
        assert!(gateway.embed_text("designer").await.is_none());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert!(gateway.probe_dimension().await.is_err());
    }

    #[tokio::test]
    async fn test_probe_dimension() {
        let (gateway, _) = gateway(false);
        assert_eq!(gateway.probe_dimension().await.unwrap(), 2);
    }
}
