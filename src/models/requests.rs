use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::{DeliveryAddress, MatchType, PrivateAttrs, ProfileUpdate, PublicAttrs};

/// Request to run the matching pipeline for one user
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FindMatchRequest {
    #[validate(length(min = 1, max = 64))]
    pub platform: String,
    #[validate(length(min = 1, max = 256))]
    pub username: String,
    /// Recent conversation, forwarded to ideal-match synthesis
    #[validate(length(max = 20000))]
    pub context: Option<String>,
}

/// Request body for publishing a profile revision
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PublishProfileRequest {
    #[serde(default)]
    pub public: PublicAttrs,
    #[serde(default)]
    pub private: PrivateAttrs,
    #[serde(alias = "match_type", rename = "matchType", default)]
    pub match_type: Option<MatchType>,
    #[validate(nested)]
    pub address: Option<AddressRequest>,
}

impl PublishProfileRequest {
    pub fn into_update(self) -> ProfileUpdate {
        ProfileUpdate {
            public: self.public,
            private: self.private,
            analysis: self.match_type,
            address: self.address.map(AddressRequest::into_address),
        }
    }
}

/// Publish a revision, then run the matching pipeline
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PublishAndMatchRequest {
    #[validate(length(min = 1, max = 64))]
    pub platform: String,
    #[validate(length(min = 1, max = 256))]
    pub username: String,
    #[validate(length(max = 20000))]
    pub context: Option<String>,
    #[serde(flatten)]
    #[validate(nested)]
    pub profile: PublishProfileRequest,
}

/// Where the front end can reach a user
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "chat_id", rename = "chatId")]
    pub chat_id: String,
    #[serde(alias = "agent_username", rename = "agentUsername", default)]
    pub agent_username: Option<String>,
}

impl AddressRequest {
    pub fn into_address(self) -> DeliveryAddress {
        DeliveryAddress {
            chat_id: self.chat_id,
            agent_username: self.agent_username.filter(|a| !a.is_empty()),
        }
    }
}

/// Query for the current rate-limit status
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LimitQuery {
    #[validate(length(min = 1))]
    pub platform: String,
    #[validate(length(min = 1))]
    pub username: String,
}
