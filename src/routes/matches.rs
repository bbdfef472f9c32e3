use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::models::{
    FindMatchRequest, HealthResponse, LimitQuery, LimitResponse, MatchResponse,
    PublishAndMatchRequest, PublishAndMatchResponse,
};
use crate::routes::{parse_identity, store_unavailable, validation_failed, AppState};

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/matches/find", web::post().to(find_match))
        .route("/matches/publish", web::post().to(publish_and_match))
        .route("/matches/limit", web::get().to(get_limit));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let store_healthy = state
        .matchmaker
        .profiles()
        .health_check()
        .await
        .unwrap_or(false);

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Find a match endpoint
///
/// POST /api/v1/matches/find
///
/// Request body:
/// ```json
/// {
///   "platform": "telegram",
///   "username": "string",
///   "context": "recent conversation (optional)"
/// }
/// ```
async fn find_match(state: web::Data<AppState>, req: web::Json<FindMatchRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for find_match request: {:?}", errors);
        return validation_failed(errors);
    }

    let observer = match parse_identity(&req.platform, &req.username) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    tracing::info!("Finding match for {}", observer);

    match state
        .matchmaker
        .find_match(&observer, req.context.as_deref())
        .await
    {
        Ok(outcome) => {
            tracing::info!("Match request for {} ended with {}", observer, outcome.kind());
            HttpResponse::Ok().json(MatchResponse::from_outcome(&outcome, outcome.message()))
        }
        Err(e) => store_unavailable(e),
    }
}

/// Publish a profile revision and search right after
///
/// POST /api/v1/matches/publish
async fn publish_and_match(
    state: web::Data<AppState>,
    req: web::Json<PublishAndMatchRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let req = req.into_inner();
    let who = match parse_identity(&req.platform, &req.username) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    match state
        .matchmaker
        .publish_and_match(&who, req.profile.into_update(), req.context.as_deref())
        .await
    {
        Ok(result) => {
            let message = if matches!(result.publish, crate::core::PublishOutcome::Published { .. }) {
                result.outcome.message_after_update()
            } else {
                result.outcome.message()
            };

            HttpResponse::Ok().json(PublishAndMatchResponse {
                publish: result.publish.into(),
                match_result: MatchResponse::from_outcome(&result.outcome, message),
            })
        }
        Err(e) => store_unavailable(e),
    }
}

/// Current rate-limit status
///
/// GET /api/v1/matches/limit?platform={platform}&username={username}
async fn get_limit(state: web::Data<AppState>, query: web::Query<LimitQuery>) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_failed(errors);
    }

    let who = match parse_identity(&query.platform, &query.username) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let ledger = state.matchmaker.ledger();

    match ledger.check_limit(&who).await {
        Ok(status) => HttpResponse::Ok().json(LimitResponse::new(who, ledger.daily_limit(), status)),
        Err(e) => store_unavailable(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MatchOptions, Matchmaker};
    use crate::models::DeliveryAddress;
    use crate::services::llm::{Embedder, LlmError, TextGenerator};
    use crate::services::telegram::{DeliveryError, Messenger};
    use crate::services::InMemoryStore;
    use actix_web::{http::StatusCode, test, App};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    struct Silent;

    #[async_trait]
    impl TextGenerator for Silent {
        async fn generate(&self, _prompt: &str) -> Result<Vec<Value>, LlmError> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl Embedder for Silent {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[async_trait]
    impl Messenger for Silent {
        async fn send_message(
            &self,
            _platform: &str,
            _address: &DeliveryAddress,
            _text: &str,
        ) -> Result<bool, DeliveryError> {
            Ok(false)
        }
    }

    fn state() -> AppState {
        let store = Arc::new(InMemoryStore::new());
        let silent = Arc::new(Silent);
        AppState {
            matchmaker: Matchmaker::new(
                store.clone(),
                store,
                silent.clone(),
                silent.clone(),
                silent,
                MatchOptions::default(),
            ),
        }
    }

    #[actix_web::test]
    async fn test_health_check_response() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let body: HealthResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.status, "healthy");
    }

    #[actix_web::test]
    async fn test_find_without_profile_is_insufficient() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/matches/find")
            .set_json(serde_json::json!({ "platform": "telegram", "username": "@nobody" }))
            .to_request();
        let body: MatchResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.outcome, "insufficient_profile");
    }

    #[actix_web::test]
    async fn test_invalid_request_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/matches/find")
            .set_json(serde_json::json!({ "platform": "", "username": "alice" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_bare_at_sign_handle_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        for body in [
            serde_json::json!({ "platform": "telegram", "username": "@" }),
            serde_json::json!({ "platform": "telegram", "username": "@@" }),
        ] {
            let req = test::TestRequest::post()
                .uri("/api/v1/matches/find")
                .set_json(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }

        let req = test::TestRequest::get()
            .uri("/api/v1/matches/limit?platform=telegram&username=%40")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_limit_endpoint_reports_full_quota() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/matches/limit?platform=telegram&username=alice")
            .to_request();
        let body: LimitResponse = test::call_and_read_body_json(&app, req).await;
        assert!(!body.limited);
        assert_eq!(body.remaining, 2);
        assert_eq!(body.daily_limit, 2);
    }
}
