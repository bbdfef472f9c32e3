use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::core::similarity::SimilarityMetric;
use crate::models::{Candidate, ExclusionSet};
use crate::services::store::VectorIndex;

/// Nearest-neighbour recall over the profile index with exclusion post-filtering
#[derive(Clone)]
pub struct SimilaritySearcher {
    index: Arc<dyn VectorIndex>,
    num_candidates: usize,
    limit: usize,
    metric: SimilarityMetric,
    timeout: Duration,
}

impl SimilaritySearcher {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        num_candidates: usize,
        limit: usize,
        metric: SimilarityMetric,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            num_candidates,
            limit,
            metric,
            timeout,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Ranked candidates not in `exclude`, at most `limit` of them.
    ///
    /// Index failures and timeouts yield an empty result.
    pub async fn search(&self, query: &[f32], exclude: &ExclusionSet) -> Vec<Candidate> {
        if query.is_empty() {
            return Vec::new();
        }

        // Over-fetch by the exclusion count so filtering can still fill `limit`
        let fetch = (self.limit + exclude.len()).min(self.num_candidates);

        let hits = match timeout(
            self.timeout,
            self.index
                .nearest(query, self.num_candidates, fetch, self.metric),
        )
        .await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                tracing::error!("Vector search failed: {}", e);
                return Vec::new();
            }
            Err(_) => {
                tracing::error!("Vector search timed out after {:?}", self.timeout);
                return Vec::new();
            }
        };

        let fetched = hits.len();
        let results = apply_exclusions(hits, exclude, self.limit);

        tracing::debug!(
            "Vector search ({}) fetched {} hits, {} after exclusions",
            self.metric.identifier(),
            fetched,
            results.len()
        );

        results
    }
}

/// Drop excluded identities, keep ranking order, truncate to `limit`
pub fn apply_exclusions(hits: Vec<Candidate>, exclude: &ExclusionSet, limit: usize) -> Vec<Candidate> {
    hits.into_iter()
        .filter(|hit| !exclude.contains(&hit.identity))
        .take(limit)
        .collect()
}
