use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use matchbrew::config::{Settings, StoreBackend};
use matchbrew::core::Matchmaker;
use matchbrew::routes::{self, AppState};
use matchbrew::services::{
    CacheManager, InMemoryStore, OpenAiClient, PostgresClient, ProfileRepository,
    TelegramMessenger, VectorIndex,
};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Initialize logging
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&log_level))
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }

    info!("Starting Matchbrew matchmaking service...");

    // Load and validate configuration
    let settings = Settings::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        panic!("Configuration error: {}", e);
    });
    settings.validate().unwrap_or_else(|e| {
        error!("Invalid configuration: {}", e);
        panic!("Configuration error: {}", e);
    });

    info!("Configuration loaded successfully");

    // Durable store
    let (repo, index): (Arc<dyn ProfileRepository>, Arc<dyn VectorIndex>) = match settings.store.backend {
        StoreBackend::Postgres => {
            let postgres = Arc::new(
                PostgresClient::from_settings(
                    &settings.database.url,
                    settings.database.max_connections,
                    settings.database.min_connections,
                    settings.database.acquire_timeout_secs,
                    settings.database.idle_timeout_secs,
                )
                .await
                .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?,
            );
            info!(
                "PostgreSQL store initialized (max: {} connections)",
                settings.database.max_connections.unwrap_or(10)
            );

            let index_dimension = postgres
                .embedding_dimension()
                .await
                .map_err(|e| startup_error("Failed to read index dimension", e))?;
            settings
                .check_index_dimension(index_dimension)
                .map_err(|e| startup_error("Embedding dimension mismatch", e))?;
            let repo: Arc<dyn ProfileRepository> = postgres.clone();
            let index: Arc<dyn VectorIndex> = postgres;
            (repo, index)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, profiles will not survive a restart");
            let memory = Arc::new(InMemoryStore::new());
            let repo: Arc<dyn ProfileRepository> = memory.clone();
            let index: Arc<dyn VectorIndex> = memory;
            (repo, index)
        }
    };

    // Generation + embedding collaborator
    let llm = Arc::new(
        OpenAiClient::new(
            settings.llm.endpoint.clone(),
            settings.llm.api_key.clone(),
            settings.llm.model.clone(),
            settings.llm.embedding_model.clone(),
            Duration::from_secs(settings.llm.timeout_secs),
        )
        .map_err(|e| startup_error("Failed to build LLM client", e))?,
    );

    info!(
        "LLM client initialized (model: {}, embeddings: {})",
        settings.llm.model, settings.llm.embedding_model
    );

    // Front-end delivery
    let messenger = Arc::new(
        TelegramMessenger::new(
            settings.telegram.api_base.clone(),
            settings.telegram.bot_token.clone(),
            settings.telegram.agent_tokens.clone(),
            Duration::from_secs(settings.matching.collaborator_timeout_secs),
        )
        .map_err(|e| startup_error("Failed to build Telegram client", e))?,
    );

    if settings.telegram.bot_token.is_none() && settings.telegram.agent_tokens.is_empty() {
        warn!("No Telegram bot token configured, match notifications will not be delivered");
    }

    let mut matchmaker = Matchmaker::new(
        repo,
        index,
        llm.clone(),
        llm,
        messenger,
        settings.match_options(),
    );

    // Initialize cache manager (optional - app can work without it)
    if settings.cache.enabled {
        let l1_cache_size = settings.cache.l1_cache_size.unwrap_or(1000);
        match CacheManager::new(&settings.cache.redis_url, l1_cache_size, settings.cache.ttl_secs).await {
            Ok(cache) => {
                info!(
                    "Cache manager initialized (L1: {} entries, TTL: {}s / {}s empty)",
                    l1_cache_size, settings.cache.ttl_secs, settings.cache.empty_ttl_secs
                );
                matchmaker = matchmaker.with_cache(Arc::new(cache), settings.lookup_ttl());
            }
            Err(e) => {
                error!("Failed to connect to Redis ({}), running without cache", e);
            }
        }
    }

    // The model must produce vectors of the configured (and indexed) size
    match matchmaker.embedding().probe_dimension().await {
        Ok(dimension) if dimension != settings.llm.embedding_dimension => {
            return Err(startup_error(
                "Embedding dimension mismatch",
                format!(
                    "model returns {}, index expects {}",
                    dimension, settings.llm.embedding_dimension
                ),
            ));
        }
        Ok(dimension) => info!("Embedding dimension verified ({})", dimension),
        Err(e) => warn!("Could not probe embedding dimension: {}", e),
    }

    let app_state = AppState { matchmaker };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
