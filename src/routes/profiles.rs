use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::models::{
    AddressRequest, ErrorResponse, HistoryResponse, Identity, ProfileLookup, ProfileResponse,
    PublishProfileRequest, PublishResponse,
};
use crate::routes::{parse_identity, store_unavailable, validation_failed, AppState};

/// Configure profile routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/profiles/{platform}/{username}", web::put().to(publish_profile))
        .route("/profiles/{platform}/{username}", web::get().to(get_profile))
        .route("/profiles/{platform}/{username}/history", web::get().to(get_history))
        .route("/profiles/{platform}/{username}/address", web::put().to(set_address));
}

fn identity(path: web::Path<(String, String)>) -> Result<Identity, HttpResponse> {
    let (platform, username) = path.into_inner();
    parse_identity(&platform, &username)
}

/// Publish a profile revision
///
/// PUT /api/v1/profiles/{platform}/{username}
///
/// Request body:
/// ```json
/// {
///   "public": { "datalatte:summary": "..." },
///   "private": { "datalatte:background": "..." },
///   "matchType": "exact_match|update_existing|new_information",
///   "address": { "chatId": "string", "agentUsername": "string" }
/// }
/// ```
async fn publish_profile(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    req: web::Json<PublishProfileRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let who = match identity(path) {
        Ok(who) => who,
        Err(response) => return response,
    };

    match state
        .matchmaker
        .publish(&who, req.into_inner().into_update())
        .await
    {
        Ok(outcome) => HttpResponse::Ok().json(PublishResponse::from(outcome)),
        Err(e) => store_unavailable(e),
    }
}

/// Latest profile, embedding stripped
///
/// GET /api/v1/profiles/{platform}/{username}
async fn get_profile(state: web::Data<AppState>, path: web::Path<(String, String)>) -> impl Responder {
    let who = match identity(path) {
        Ok(who) => who,
        Err(response) => return response,
    };

    match state.matchmaker.profiles().get_latest(&who).await {
        Ok(ProfileLookup::Missing) => HttpResponse::NotFound().json(ErrorResponse {
            error: "Profile not found".to_string(),
            message: format!("No profile stored for {}", who),
            status_code: 404,
        }),
        Ok(lookup) => match lookup.into_profile() {
            Some(profile) => HttpResponse::Ok().json(ProfileResponse {
                identity: who,
                profile: profile.without_embedding(),
            }),
            None => HttpResponse::NotFound().finish(),
        },
        Err(e) => store_unavailable(e),
    }
}

/// Profile revisions, oldest first
///
/// GET /api/v1/profiles/{platform}/{username}/history
async fn get_history(state: web::Data<AppState>, path: web::Path<(String, String)>) -> impl Responder {
    let who = match identity(path) {
        Ok(who) => who,
        Err(response) => return response,
    };

    match state.matchmaker.profiles().get_history(&who).await {
        Ok(versions) => HttpResponse::Ok().json(HistoryResponse {
            identity: who,
            total: versions.len(),
            versions,
        }),
        Err(e) => store_unavailable(e),
    }
}

/// Record where the front end can reach a user
///
/// PUT /api/v1/profiles/{platform}/{username}/address
async fn set_address(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    req: web::Json<AddressRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let who = match identity(path) {
        Ok(who) => who,
        Err(response) => return response,
    };
    let address = req.into_inner().into_address();

    match state.matchmaker.profiles().set_address(&who, &address).await {
        Ok(()) => {
            tracing::debug!("Stored delivery address for {}", who);
            HttpResponse::NoContent().finish()
        }
        Err(e) => store_unavailable(e),
    }
}
