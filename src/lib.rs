// lib.rs - real-time chat and notification core for tutoring sessions
pub mod auth;
pub mod config;
pub mod conversations;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod membership;
pub mod middleware;
pub mod models;
pub mod store;
pub mod tutoring_client;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    Extension, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use auth::JwtVerifier;
use config::Config;
use conversations::ConversationAggregator;
use gateway::Gateway;
use membership::MembershipResolver;
use store::MessageStore;
use tutoring_client::TutoringDirectory;

// Shared by the socket gateway and every HTTP handler
pub struct AppState {
    pub config: Config,
    pub verifier: JwtVerifier,
    pub gateway: Arc<Gateway>,
    pub conversations: ConversationAggregator,
    pub store: Arc<dyn MessageStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn MessageStore>, directory: Arc<dyn TutoringDirectory>) -> Self {
        let membership = MembershipResolver::new(directory, config.dependency_timeout);
        let gateway = Gateway::new(
            store.clone(),
            membership.clone(),
            config.dependency_timeout,
            config.history_limit,
        );
        let conversations = ConversationAggregator::new(store.clone(), membership, config.dependency_timeout);

        Self {
            verifier: JwtVerifier::new(&config.jwt_secret),
            gateway: Arc::new(gateway),
            conversations,
            store,
            config,
        }
    }
}

/// `/ws` and `/health` sit at the root; the message API under the base path.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = handlers::messages::message_routes();
    let api = if state.config.base_path.is_empty() {
        api
    } else {
        Router::new().nest(&state.config.base_path, api)
    };

    Router::new()
        .merge(handlers::ws::ws_routes())
        .merge(handlers::health::health_routes())
        .merge(api)
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(Extension(state))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unparsable allowed origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
