//! Matchbrew - intent matchmaking service
//!
//! Users describe what they are working on and who they want to meet. The
//! engine keeps a versioned profile per user, asks a language model what the
//! ideal counterpart looks like, embeds that description, recalls the nearest
//! profiles from a vector index and has the model pick and introduce one.
//! Match history and a rolling daily quota keep introductions fresh and rare.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{MatchOptions, MatchOutcome, Matchmaker, PublishOutcome};
pub use models::{Identity, Profile, ProfileUpdate, PrivateAttrs, PublicAttrs};
