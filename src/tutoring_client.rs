// src/tutoring_client.rs
//! Read-only client for the tutoring/enrollment service, which owns sessions,
//! enrollment requests and user profiles.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::models::tutoring::{Enrollment, Participant, SessionInfo};

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {status} from {path}")]
    Status { status: u16, path: String },
    #[error("could not decode response from {path}: {reason}")]
    Decode { path: String, reason: String },
}

/// Membership facts the chat core needs. Implementations must not cache
/// across calls; enrollment can change at any time.
#[async_trait]
pub trait TutoringDirectory: Send + Sync {
    async fn session(&self, session_id: &str) -> Result<Option<SessionInfo>, DirectoryError>;

    /// Every enrollment request of a session, whatever its status.
    async fn enrollments(&self, session_id: &str) -> Result<Vec<Enrollment>, DirectoryError>;

    async fn sessions_taught_by(&self, tutor_id: &str) -> Result<Vec<SessionInfo>, DirectoryError>;

    /// Every enrollment request made by a student.
    async fn enrollments_of(&self, student_id: &str) -> Result<Vec<Enrollment>, DirectoryError>;

    async fn user(&self, user_id: &str) -> Result<Option<Participant>, DirectoryError>;
}

// The tutoring service wraps most payloads as `{ success, data }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Payload<T> {
    fn into_inner(self) -> T {
        match self {
            Payload::Wrapped { data } => data,
            Payload::Bare(data) => data,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTutoringClient {
    client: Client,
    base_url: String,
    retry_budget: Duration,
}

impl HttpTutoringClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_budget: timeout,
        })
    }

    /// GETs a JSON resource, retrying transient failures. 404 is `None`.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, DirectoryError> {
        let url = format!("{}{}", self.base_url, path);
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_elapsed_time: Some(self.retry_budget),
            ..Default::default()
        };

        let client = &self.client;
        let url = url.as_str();
        let operation = move || async move {
            let response = client.get(url).send().await.map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    tracing::warn!("Tutoring service connection error (retrying): {}", e);
                    backoff::Error::transient(DirectoryError::Request(e))
                } else {
                    backoff::Error::permanent(DirectoryError::Request(e))
                }
            })?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!("Tutoring service returned {} for {} (retrying)", status, path);
                return Err(backoff::Error::transient(DirectoryError::Status {
                    status: status.as_u16(),
                    path: path.to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DirectoryError::Status {
                    status: status.as_u16(),
                    path: path.to_string(),
                }));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| backoff::Error::permanent(DirectoryError::Request(e)))?;
            serde_json::from_slice::<Payload<T>>(&bytes)
                .map(|payload| Some(payload.into_inner()))
                .map_err(|e| {
                    backoff::Error::permanent(DirectoryError::Decode {
                        path: path.to_string(),
                        reason: e.to_string(),
                    })
                })
        };

        retry(policy, operation).await
    }
}

fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

#[async_trait]
impl TutoringDirectory for HttpTutoringClient {
    async fn session(&self, session_id: &str) -> Result<Option<SessionInfo>, DirectoryError> {
        self.get_json(&format!("/tutorias/{}", segment(session_id))).await
    }

    async fn enrollments(&self, session_id: &str) -> Result<Vec<Enrollment>, DirectoryError> {
        Ok(self
            .get_json(&format!("/tutorias/{}/solicitudes", segment(session_id)))
            .await?
            .unwrap_or_default())
    }

    async fn sessions_taught_by(&self, tutor_id: &str) -> Result<Vec<SessionInfo>, DirectoryError> {
        Ok(self
            .get_json(&format!("/tutorias/tutor/{}", segment(tutor_id)))
            .await?
            .unwrap_or_default())
    }

    async fn enrollments_of(&self, student_id: &str) -> Result<Vec<Enrollment>, DirectoryError> {
        Ok(self
            .get_json(&format!("/solicitudes/estudiante/{}", segment(student_id)))
            .await?
            .unwrap_or_default())
    }

    async fn user(&self, user_id: &str) -> Result<Option<Participant>, DirectoryError> {
        self.get_json(&format!("/usuarios/{}", segment(user_id))).await
    }
}
