use crate::clients::{FlexibleClient, OpenAIConfig};
use crate::config::AppConfig;
use crate::core::{QueryResolver, ResolverConfig};
use crate::interceptors::FileInterceptor;
use crate::quiz::{QuizGenerator, QuizGrader};
use crate::server::handlers::{generate, health_check, submit};
use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<QuizGenerator<FlexibleClient>>,
    pub grader: Arc<QuizGrader<FlexibleClient>>,
}

impl AppState {
    pub fn new(resolver: QueryResolver<FlexibleClient>) -> Self {
        Self {
            generator: Arc::new(QuizGenerator::new(resolver.clone())),
            grader: Arc::new(QuizGrader::new(resolver)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let client = FlexibleClient::from_type(
            config.client,
            OpenAIConfig {
                model: config.model.clone(),
                ..OpenAIConfig::default()
            },
        );
        let mut resolver = QueryResolver::new(client, ResolverConfig::default());
        if let Some(dir) = &config.transcript_dir {
            info!(dir = %dir.display(), "Recording model exchanges");
            resolver = resolver.with_interceptor(Arc::new(FileInterceptor::new(dir.clone())));
        }
        Self::new(resolver)
    }
}

pub fn create_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/submit", post(submit))
        .route("/health", get(health_check))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
