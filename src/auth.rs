//! Credential verification for sockets and HTTP requests.
//!
//! Tokens are minted by the identity service; this crate only verifies them
//! with the shared secret. A handshake credential may arrive as an explicit
//! auth payload (`?token=`), an `Authorization: Bearer` header, or a cookie.

use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::models::auth::{Claims, Identity, Role};

const TOKEN_COOKIES: [&str; 3] = ["token", "access_token", "jwt"];

pub const FORWARDED_USER_ID: &str = "x-user-id";
pub const FORWARDED_USER_NAME: &str = "x-user-name";
pub const FORWARDED_USER_ROLE: &str = "x-user-role";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing credential")]
    MissingToken,
    #[error("invalid credential: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("malformed forwarded identity headers")]
    MalformedForwardedIdentity,
    #[error("connection is not registered")]
    UnknownConnection,
}

#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Checks signature and expiry and returns the caller identity.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let token_data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(Identity::from(token_data.claims))
    }
}

/// Signs a token the way the identity service does. Used by the developer
/// tooling and tests; production tokens come from the identity service.
pub fn issue_token(secret: &str, identity: &Identity, ttl: Duration) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub: identity.user_id.clone(),
        name: Some(identity.display_name.clone()),
        role: identity.role,
        exp: (now + ttl).timestamp().max(0) as usize,
        iat: now.timestamp().max(0) as usize,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Extracts the token from a raw `Cookie` header string.
pub fn cookie_token(cookie_header: &str) -> Option<String> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| TOKEN_COOKIES.contains(&name.trim()) && !value.trim().is_empty())
        .map(|(_, value)| {
            let value = value.trim().trim_matches('"');
            urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
}

/// Credential lookup order: auth payload, bearer header, cookie.
pub fn request_token(payload_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = payload_token.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    if let Some(token) = bearer_token(headers) {
        return Some(token.to_string());
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(cookie_token)
}

/// Identity forwarded by the API gateway, if the request carries one.
pub fn forwarded_identity(headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
    let Some(user_id) = headers.get(FORWARDED_USER_ID) else {
        return Ok(None);
    };
    let user_id = user_id
        .to_str()
        .map_err(|_| AuthError::MalformedForwardedIdentity)?
        .trim();
    let role = headers
        .get(FORWARDED_USER_ROLE)
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse)
        .ok_or(AuthError::MalformedForwardedIdentity)?;
    if user_id.is_empty() {
        return Err(AuthError::MalformedForwardedIdentity);
    }

    let display_name = headers
        .get(FORWARDED_USER_NAME)
        .and_then(|value| value.to_str().ok())
        .map(|name| urlencoding::decode(name).map(|n| n.into_owned()).unwrap_or_else(|_| name.to_string()))
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| user_id.to_string());

    Ok(Some(Identity::new(user_id, display_name, role)))
}
