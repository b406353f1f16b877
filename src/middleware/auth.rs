use std::sync::Arc;

use axum::{
    extract::{Extension, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::{forwarded_identity, request_token, AuthError};
use crate::error::ChatError;
use crate::models::auth::Identity;
use crate::AppState;

/// Resolves the caller and stores its [`Identity`] in the request extensions.
///
/// Gateway-forwarded identity headers are honoured only when the deployment
/// trusts them; otherwise a bearer token or token cookie is required.
pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ChatError> {
    let identity = authenticate(&state, &headers).map_err(|e| {
        tracing::warn!(path = %request.uri().path(), error = %e, "request authentication failed");
        e
    })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, AuthError> {
    if state.config.trust_forwarded_identity {
        if let Some(identity) = forwarded_identity(headers)? {
            return Ok(identity);
        }
    }
    let token = request_token(None, headers).ok_or(AuthError::MissingToken)?;
    state.verifier.verify(&token)
}
