// Core matchmaking exports
pub mod embedding;
pub mod ledger;
pub mod matcher;
pub mod notifier;
pub mod profiles;
pub mod prompt;
pub mod searcher;
pub mod selector;
pub mod similarity;
pub mod synthesizer;

pub use embedding::{canonical_text, EmbeddingGateway};
pub use ledger::{evaluate_window, MatchLedger};
pub use matcher::{MatchOptions, MatchOutcome, Matchmaker, PublishAndMatch, PublishOutcome};
pub use notifier::{render_notification, NotificationDispatcher};
pub use profiles::{LookupTtl, ProfileStore};
pub use prompt::{PromptTemplate, TemplateError};
pub use searcher::{apply_exclusions, SimilaritySearcher};
pub use selector::{resolve_candidate, CandidateSelector, LlmCandidateSelector, SelectionError};
pub use similarity::{cosine_similarity, dot_product, SimilarityMetric};
pub use synthesizer::{IdealMatchSynthesizer, SynthesisError};
