//! Boundary to the remote analysis backend.
//!
//! The pipeline only sees the `AnalysisService` and `AuthService` traits, so
//! the HTTP client can be swapped for a scripted one in tests.

pub mod http;
pub mod mock;

pub use http::HttpClient;
pub use mock::{MockAnalysisService, MockAuthService};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{ReportUpload, SessionState};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Analysis service is not reachable at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Analysis service rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response payload: {0}")]
    MalformedPayload(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// One entry of `GET /api/reports`, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReport {
    pub id: Option<String>,
    pub timestamp: Option<Value>,
    pub results: Value,
}

/// Result of a successful login or signup.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResponse {
    pub user: SessionState,
    pub token: Option<String>,
}

/// Report submission and history.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// `POST /predict`. Returns the raw JSON object on success.
    async fn predict(&self, upload: &ReportUpload, email: Option<&str>)
        -> Result<Value, ServiceError>;

    /// `GET /api/reports?email=`. Order is whatever the backend sends.
    async fn fetch_reports(&self, email: &str) -> Result<Vec<RawReport>, ServiceError>;
}

/// Account endpoints.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ServiceError>;

    async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ServiceError>;
}

/// Split a `{reports: [...]}` body into raw reports. Items that are not
/// objects are skipped; a missing `reports` field is an empty history.
pub fn parse_reports_body(body: &Value) -> Result<Vec<RawReport>, ServiceError> {
    let Some(obj) = body.as_object() else {
        return Err(ServiceError::MalformedPayload(
            "reports response is not a JSON object".into(),
        ));
    };

    let items = match obj.get("reports") {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => return Ok(vec![]),
        Some(_) => {
            return Err(ServiceError::MalformedPayload(
                "`reports` is not an array".into(),
            ))
        }
    };

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .map(|item| RawReport {
            id: item
                .get("_id")
                .or_else(|| item.get("id"))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
            timestamp: item.get("timestamp").cloned(),
            results: item.get("results").cloned().unwrap_or(Value::Null),
        })
        .collect())
}

/// Build an `AuthResponse` from a `{user, token?}` body.
pub fn parse_auth_body(body: &Value, email: &str) -> Result<AuthResponse, ServiceError> {
    let user = body
        .get("user")
        .filter(|u| u.is_object())
        .ok_or_else(|| ServiceError::MalformedPayload("auth response has no `user` object".into()))?;
    let token = body
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    Ok(AuthResponse {
        user: SessionState::from_backend_user(user, email),
        token,
    })
}
