// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    Candidate, DeliveryAddress, ExclusionSet, Identity, LimitStatus, MatchRecord, MatchType,
    PrivateAttrs, Profile, ProfileDocument, ProfileLookup, ProfileUpdate, ProjectAttrs,
    PublicAttrs, RateLimitEntry, Selection, TextOrList,
};
pub use requests::{
    AddressRequest, FindMatchRequest, LimitQuery, PublishAndMatchRequest, PublishProfileRequest,
};
pub use responses::{
    ErrorResponse, HealthResponse, HistoryResponse, LimitResponse, MatchResponse,
    ProfileResponse, PublishAndMatchResponse, PublishResponse,
};
