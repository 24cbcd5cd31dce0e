//! HTTP and WebSocket transport
//!
//! # Routes
//!
//! - `GET /` - service status
//! - `POST /frames?candidate_id=` - analyze one webcam frame (raw image body)
//! - `POST /audio` - audio upload (acknowledged only)
//! - `GET /heartbeat/:candidate_id` - WebSocket, `"ping"` → `"pong"`
//! - `GET /status/:candidate_id` - connectivity
//! - `POST /attempts` - start an attempt
//! - `POST /answers` - store an answer
//! - `POST /incidents` - store a client-side incident
//! - `POST /finish/:candidate_id` - grade the latest attempt
//! - `GET /results/:candidate_id` - stored summary and grading detail

mod error;
mod heartbeat_ws;
mod routes;

pub use error::ApiError;

use crate::config::{Config, ServerConfig};
use crate::exam::{CatalogCache, ExamService};
use crate::grading::{AiGrader, AiGradingSettings, Grader};
use crate::heartbeat::HeartbeatTracker;
use crate::llm::openai::OpenAIProvider;
use crate::llm::LLMProvider;
use crate::proctoring::ProctorService;
use crate::rate_limiter::RateLimiter;
use crate::store::{MemoryStore, SessionStore};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use sdk::errors::EngineError;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Webcam frames are small, but leave room for full-resolution captures
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Services shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub proctor: Arc<ProctorService>,
    pub heartbeat: Arc<HeartbeatTracker>,
    pub exams: Arc<ExamService>,
    pub grader: Arc<Grader>,
}

impl AppState {
    /// Wire every service from configuration around a session store
    pub fn from_config(
        config: &Config,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, EngineError> {
        let provider: Option<Arc<dyn LLMProvider>> = match OpenAIProvider::from_config(&config.llm)
            .map_err(|e| EngineError::LLMProvider(e.to_string()))?
        {
            Some(provider) => {
                info!("AI grading enabled via {}", config.llm.base_url);
                Some(Arc::new(provider))
            }
            None => {
                warn!(
                    "{} not set, AI grading disabled",
                    config.llm.api_key_env
                );
                None
            }
        };

        Self::with_provider(config, sessions, provider)
    }

    /// Same as [`AppState::from_config`] with an explicit model provider
    pub fn with_provider(
        config: &Config,
        sessions: Arc<dyn SessionStore>,
        provider: Option<Arc<dyn LLMProvider>>,
    ) -> Result<Self, EngineError> {
        let grader = Arc::new(Grader::new(AiGrader::new(
            provider,
            Arc::new(RateLimiter::per_minute(config.llm.max_calls_per_minute)),
            AiGradingSettings::from_config(&config.llm, &config.grading),
        )));

        let detector = ProctorService::detector_from_config(&config.proctoring)?;
        if detector.is_none() {
            warn!("No landmark detector configured, frame analysis unavailable");
        }

        let exams = Arc::new(ExamService::new(
            sessions,
            Arc::new(CatalogCache::from_config(&config.grading)),
            Arc::clone(&grader),
        ));
        let proctor = ProctorService::new(detector, &config.proctoring, Arc::clone(&exams));
        let heartbeat = HeartbeatTracker::new(
            Arc::new(MemoryStore::new()),
            config.heartbeat.timeout(),
        );

        Ok(Self {
            proctor: Arc::new(proctor),
            heartbeat: Arc::new(heartbeat),
            exams,
            grader,
        })
    }
}

fn cors_layer(config: &ServerConfig) -> Result<CorsLayer, EngineError> {
    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| {
                EngineError::Config(format!("Invalid CORS origin '{}'", origin))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

pub fn router(state: AppState, config: &ServerConfig) -> Result<Router, EngineError> {
    let router = Router::new()
        .route("/", get(routes::root))
        .route("/frames", post(routes::analyze_frame))
        .route("/audio", post(routes::analyze_audio))
        .route("/heartbeat/:candidate_id", get(heartbeat_ws::heartbeat_handler))
        .route("/status/:candidate_id", get(routes::connection_status))
        .route("/attempts", post(routes::start_attempt))
        .route("/answers", post(routes::submit_answer))
        .route("/incidents", post(routes::record_incident))
        .route("/finish/:candidate_id", post(routes::finish_exam))
        .route("/results/:candidate_id", get(routes::results))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
                .layer(cors_layer(config)?),
        )
        .with_state(state);

    Ok(router)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    config: &ServerConfig,
    shutdown: F,
) -> Result<(), EngineError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state, config)?;

    if let Ok(addr) = listener.local_addr() {
        info!("Proctor server listening on http://{}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| EngineError::Network(format!("Server error: {}", e)))?;

    info!("Proctor server stopped");
    Ok(())
}
