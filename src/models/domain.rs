use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A user on a given chat platform, unique per `(platform, username)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub platform: String,
    pub username: String,
}

impl Identity {
    /// Build an identity, dropping a leading `@` from the username
    pub fn new(platform: impl Into<String>, username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            platform: platform.into(),
            username: username.trim_start_matches('@').to_string(),
        }
    }

    /// Like [`Identity::new`], but rejects a blank platform or a username
    /// that is blank once the leading `@` is gone
    pub fn parse(platform: &str, username: &str) -> Option<Self> {
        let who = Self::new(platform.trim(), username.trim());
        if who.platform.is_empty() || who.username.trim().is_empty() {
            return None;
        }
        Some(who)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.platform, self.username)
    }
}

/// A JSON-LD field that may hold a single string or a list of strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl TextOrList {
    /// Whitespace-joined text form
    pub fn joined(&self) -> String {
        match self {
            TextOrList::Text(text) => text.clone(),
            TextOrList::List(items) => items.join(" "),
        }
    }
}

/// Anonymized intent, shareable with third parties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicAttrs {
    #[serde(rename = "datalatte:summary", default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "datalatte:intentCategory", default, skip_serializing_if = "Option::is_none")]
    pub intent_category: Option<String>,
    #[serde(rename = "datalatte:desiredConnections", default, skip_serializing_if = "Option::is_none")]
    pub desired_connections: Option<TextOrList>,
    #[serde(rename = "datalatte:projectDescription", default, skip_serializing_if = "Option::is_none")]
    pub project_description: Option<String>,
    #[serde(rename = "datalatte:challenge", default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    /// Remaining JSON-LD keys (`@context`, `@id`, urls, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PublicAttrs {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.intent_category.is_none()
            && self.desired_connections.is_none()
            && self.project_description.is_none()
            && self.challenge.is_none()
            && self.extra.is_empty()
    }
}

/// Project details nested under the private attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectAttrs {
    #[serde(rename = "foaf:name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "schema:description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "datalatte:type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(
        rename = "datalatte:projectDomain",
        alias = "datalatte:domain",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub domain: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Identifying and biographical detail. Only surfaced back to its owner or
/// folded into introduction text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrivateAttrs {
    #[serde(rename = "foaf:name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "datalatte:background", default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(rename = "datalatte:knowledgeDomain", default, skip_serializing_if = "Option::is_none")]
    pub knowledge_domain: Option<String>,
    #[serde(rename = "datalatte:hasProject", default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectAttrs>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PrivateAttrs {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.background.is_none()
            && self.knowledge_domain.is_none()
            && self.project.is_none()
            && self.extra.is_empty()
    }
}

/// One immutable, timestamped revision of a user's intent data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub public: PublicAttrs,
    pub private: PrivateAttrs,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Profile {
    pub fn new(public: PublicAttrs, private: PrivateAttrs) -> Self {
        Self {
            public,
            private,
            timestamp: Utc::now(),
            embedding: None,
        }
    }

    /// A placeholder revision carrying no information yet
    pub fn is_empty(&self) -> bool {
        self.public.is_empty() && self.private.is_empty()
    }

    /// Copy without the embedding vector, for prompts and API responses
    pub fn without_embedding(&self) -> Profile {
        Profile {
            embedding: None,
            ..self.clone()
        }
    }
}

/// Result of a latest-profile lookup.
///
/// `Missing` means no profile has ever been stored; `Empty` means a
/// placeholder revision exists but carries no information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "profile", rename_all = "snake_case")]
pub enum ProfileLookup {
    Missing,
    Empty(Profile),
    Present(Profile),
}

impl ProfileLookup {
    pub fn from_latest(latest: Option<Profile>) -> Self {
        match latest {
            None => ProfileLookup::Missing,
            Some(profile) if profile.is_empty() => ProfileLookup::Empty(profile),
            Some(profile) => ProfileLookup::Present(profile),
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            ProfileLookup::Missing => None,
            ProfileLookup::Empty(profile) | ProfileLookup::Present(profile) => Some(profile),
        }
    }

    pub fn into_profile(self) -> Option<Profile> {
        match self {
            ProfileLookup::Missing => None,
            ProfileLookup::Empty(profile) | ProfileLookup::Present(profile) => Some(profile),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, ProfileLookup::Present(_))
    }
}

/// A surfaced match, scoped to the observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub observer: Identity,
    pub matched: Identity,
    pub timestamp: DateTime<Utc>,
}

/// One counted match request in the rolling rate-limit window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub timestamp: DateTime<Utc>,
    pub count: u32,
}

impl RateLimitEntry {
    pub fn single(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, count: 1 }
    }
}

/// Rate-limit verdict for an observer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LimitStatus {
    Allowed {
        remaining: u32,
    },
    Limited {
        #[serde(rename = "resetAt")]
        reset_at: DateTime<Utc>,
    },
}

impl LimitStatus {
    pub fn remaining(&self) -> u32 {
        match self {
            LimitStatus::Allowed { remaining } => *remaining,
            LimitStatus::Limited { .. } => 0,
        }
    }

    pub fn is_limited(&self) -> bool {
        matches!(self, LimitStatus::Limited { .. })
    }
}

/// Identities a search must never return for one observer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    members: HashSet<Identity>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: Identity) -> bool {
        self.members.insert(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.members.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.members.iter()
    }
}

impl FromIterator<Identity> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = Identity>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

/// Where the front end can reach a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    #[serde(rename = "agentUsername", default, skip_serializing_if = "Option::is_none")]
    pub agent_username: Option<String>,
}

/// A search hit: who, their latest profile snapshot and the similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(rename = "profileData")]
    pub profile: Profile,
    pub score: f32,
}

/// The judged pick among ranked candidates, plus the introduction prose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub matched: Option<Identity>,
    pub post: String,
}

/// How the extraction step classified new conversation data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExactMatch,
    UpdateExisting,
    NewInformation,
}

/// Newly extracted intent data for one user, as handed over by the front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub public: PublicAttrs,
    pub private: PrivateAttrs,
    #[serde(rename = "matchType", default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<MatchType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<DeliveryAddress>,
}

/// Full stored document for one identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDocument {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(rename = "latestProfile")]
    pub latest_profile: Option<Profile>,
    #[serde(rename = "profileVersions", default)]
    pub profile_versions: Vec<Profile>,
    #[serde(rename = "matchHistory", default)]
    pub match_history: Vec<MatchRecord>,
    #[serde(rename = "matchRequests", default)]
    pub match_requests: Vec<RateLimitEntry>,
    pub created: DateTime<Utc>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
    #[serde(rename = "resolvedAddress", default)]
    pub resolved_address: Option<DeliveryAddress>,
}

impl ProfileDocument {
    pub fn new(identity: Identity) -> Self {
        let now = Utc::now();
        Self {
            identity,
            latest_profile: None,
            profile_versions: Vec::new(),
            match_history: Vec::new(),
            match_requests: Vec::new(),
            created: now,
            last_updated: now,
            resolved_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_strips_at_prefix() {
        let who = Identity::new("telegram", "@alice");
        assert_eq!(who.username, "alice");
        assert_eq!(who.to_string(), "telegram:alice");
    }

    #[test]
    fn test_identity_parse_rejects_blank_handles() {
        assert_eq!(Identity::parse("telegram", " @bob "), Some(Identity::new("telegram", "bob")));
        assert!(Identity::parse("telegram", "@").is_none());
        assert!(Identity::parse("telegram", "@@ ").is_none());
        assert!(Identity::parse(" ", "bob").is_none());
    }

    #[test]
    fn test_public_attrs_parse_jsonld() {
        let json = serde_json::json!({
            "@type": "datalatte:Intent",
            "datalatte:summary": "Seeking a growth marketer",
            "datalatte:desiredConnections": ["marketer", "growth hacker"],
        });

        let attrs: PublicAttrs = serde_json::from_value(json).unwrap();
        assert_eq!(attrs.summary.as_deref(), Some("Seeking a growth marketer"));
        assert_eq!(
            attrs.desired_connections.unwrap().joined(),
            "marketer growth hacker"
        );
        assert!(attrs.extra.contains_key("@type"));
    }

    #[test]
    fn test_project_domain_keeps_its_key() {
        let json = serde_json::json!({
            "datalatte:hasProject": { "datalatte:projectDomain": "fitness" }
        });

        let attrs: PrivateAttrs = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(attrs.project.as_ref().unwrap().domain.as_deref(), Some("fitness"));
        assert_eq!(serde_json::to_value(&attrs).unwrap(), json);

        let short = serde_json::json!({
            "datalatte:hasProject": { "datalatte:domain": "health" }
        });
        let attrs: PrivateAttrs = serde_json::from_value(short).unwrap();
        assert_eq!(
            serde_json::to_value(&attrs).unwrap()["datalatte:hasProject"]["datalatte:projectDomain"],
            "health"
        );
    }

    #[test]
    fn test_lookup_distinguishes_missing_and_empty() {
        assert_eq!(ProfileLookup::from_latest(None), ProfileLookup::Missing);

        let placeholder = Profile::new(PublicAttrs::default(), PrivateAttrs::default());
        assert!(matches!(
            ProfileLookup::from_latest(Some(placeholder)),
            ProfileLookup::Empty(_)
        ));

        let public = PublicAttrs {
            summary: Some("Building an AI fitness coach".to_string()),
            ..Default::default()
        };
        let filled = Profile::new(public, PrivateAttrs::default());
        assert!(ProfileLookup::from_latest(Some(filled)).is_present());
    }

    #[test]
    fn test_limit_status_remaining() {
        assert_eq!(LimitStatus::Allowed { remaining: 2 }.remaining(), 2);
        let limited = LimitStatus::Limited { reset_at: Utc::now() };
        assert_eq!(limited.remaining(), 0);
        assert!(limited.is_limited());
    }
}
