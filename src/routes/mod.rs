// Route exports
pub mod matches;
pub mod profiles;

use actix_web::{web, HttpResponse};

use crate::core::matcher::{Matchmaker, STORE_UNAVAILABLE_MESSAGE};
use crate::models::{ErrorResponse, Identity};
use crate::services::StoreError;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub matchmaker: Matchmaker,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(matches::configure)
            .configure(profiles::configure),
    );
}

/// 400 with the validator's field errors
pub(crate) fn validation_failed(errors: validator::ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "Validation failed".to_string(),
        message: errors.to_string(),
        status_code: 400,
    })
}

/// Identity from request fields, or a 400 when the handle is blank after
/// dropping its leading `@`
pub(crate) fn parse_identity(platform: &str, username: &str) -> Result<Identity, HttpResponse> {
    Identity::parse(platform, username).ok_or_else(|| {
        HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: format!("Invalid user handle {:?} on platform {:?}", username, platform),
            status_code: 400,
        })
    })
}

/// 503 with a short apology; the cause is only logged
pub(crate) fn store_unavailable(e: StoreError) -> HttpResponse {
    tracing::error!("Store unavailable: {}", e);
    HttpResponse::ServiceUnavailable().json(ErrorResponse {
        error: "Store unavailable".to_string(),
        message: STORE_UNAVAILABLE_MESSAGE.to_string(),
        status_code: 503,
    })
}
