// Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use matchbrew::core::{MatchOptions, Matchmaker};
use matchbrew::models::{DeliveryAddress, Identity, MatchType, PrivateAttrs, ProfileUpdate, PublicAttrs};
use matchbrew::services::llm::{Embedder, LlmError, TextGenerator};
use matchbrew::services::telegram::{DeliveryError, Messenger};
use matchbrew::services::InMemoryStore;

const VOCABULARY: [&str; 6] = ["fitness", "marketing", "design", "ai", "finance", "music"];

/// Bag-of-keywords embedder; the last dimension keeps vectors non-zero
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl KeywordEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LlmError::ApiError("embedding service down".to_string()));
        }

        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect();
        vector.push(0.1);
        Ok(vector)
    }
}

/// Generator answering from a queue of canned outputs, recording prompts
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<Vec<Value>, String>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn push(&self, reply: Vec<Value>) {
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn push_failure(&self, reason: &str) {
        self.replies.lock().unwrap().push_back(Err(reason.to_string()));
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Queue a synthesis answer followed by a selection answer
    pub fn script_match(&self, description: &str, post: &str, username: &str, platform: &str) {
        self.push(vec![json!({ "ideal_match_description": description })]);
        self.push(vec![json!({
            "post": post,
            "matchUsername": username,
            "matchPlatform": platform,
        })]);
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<Value>, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(LlmError::ApiError(reason)),
            None => Err(LlmError::ApiError("no scripted reply".to_string())),
        }
    }
}

/// Messenger that accepts everything and records what was sent
#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        platform: &str,
        address: &DeliveryAddress,
        text: &str,
    ) -> Result<bool, DeliveryError> {
        self.sent.lock().unwrap().push((
            platform.to_string(),
            address.chat_id.clone(),
            text.to_string(),
        ));
        Ok(true)
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub embedder: Arc<KeywordEmbedder>,
    pub generator: Arc<ScriptedGenerator>,
    pub messenger: Arc<RecordingMessenger>,
    pub matchmaker: Matchmaker,
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(KeywordEmbedder::default());
    let generator = Arc::new(ScriptedGenerator::default());
    let messenger = Arc::new(RecordingMessenger::default());

    let options = MatchOptions {
        collaborator_timeout: Duration::from_secs(2),
        index_settle: Duration::from_millis(200),
        index_poll: Duration::from_millis(10),
        ..MatchOptions::default()
    };

    let matchmaker = Matchmaker::new(
        store.clone(),
        store.clone(),
        generator.clone(),
        embedder.clone(),
        messenger.clone(),
        options,
    );

    Harness {
        store,
        embedder,
        generator,
        messenger,
        matchmaker,
    }
}

pub fn telegram(username: &str) -> Identity {
    Identity::new("telegram", username)
}

pub fn update(summary: &str, background: &str, chat_id: Option<&str>) -> ProfileUpdate {
    ProfileUpdate {
        public: PublicAttrs {
            summary: Some(summary.to_string()),
            ..Default::default()
        },
        private: PrivateAttrs {
            background: Some(background.to_string()),
            ..Default::default()
        },
        analysis: Some(MatchType::NewInformation),
        address: chat_id.map(|id| DeliveryAddress {
            chat_id: id.to_string(),
            agent_username: None,
        }),
    }
}
