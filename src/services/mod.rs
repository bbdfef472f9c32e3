// Service exports
pub mod cache;
pub mod llm;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod telegram;

pub use cache::{CacheError, CacheKey, CacheManager};
pub use llm::{Embedder, LlmError, OpenAiClient, TextGenerator};
pub use memory::InMemoryStore;
pub use postgres::PostgresClient;
pub use store::{ProfileRepository, StoreError, VectorIndex};
pub use telegram::{DeliveryError, Messenger, TelegramMessenger};
