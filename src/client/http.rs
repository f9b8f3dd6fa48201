use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;

use super::{
    parse_auth_body, parse_reports_body, AnalysisService, AuthResponse, AuthService, RawReport,
    ServiceError,
};
use crate::config::ClientConfig;
use crate::models::ReportUpload;

/// Longest error body echoed back when the backend sends no JSON message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// reqwest-backed client for the analysis backend.
pub struct HttpClient {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
    token: Option<String>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ServiceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: config.request_timeout_secs,
            token: None,
        })
    }

    /// Attach `Authorization: Bearer` to report requests.
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_connect() {
            ServiceError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            ServiceError::Timeout(self.timeout_secs)
        } else {
            ServiceError::HttpClient(e.to_string())
        }
    }

    /// Send, reject non-2xx with the backend's message, and parse JSON.
    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ServiceError> {
        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Rejected {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout(self.timeout_secs)
            } else {
                ServiceError::MalformedPayload(e.to_string())
            }
        })
    }

    async fn post_auth<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        email: &str,
    ) -> Result<AuthResponse, ServiceError> {
        let request = self.client.post(self.url(path)).json(body);
        let value = self.send_json(request).await?;
        parse_auth_body(&value, email)
    }
}

/// Pull a human-readable message out of an error body: `{error}`, then
/// `{message}`, then the (truncated) raw text, then the status reason.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message"] {
            if let Some(msg) = value.get(key).and_then(Value::as_str) {
                if !msg.trim().is_empty() {
                    return msg.to_string();
                }
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignupRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[async_trait]
impl AnalysisService for HttpClient {
    async fn predict(
        &self,
        upload: &ReportUpload,
        email: Option<&str>,
    ) -> Result<Value, ServiceError> {
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)
            .map_err(|e| ServiceError::HttpClient(e.to_string()))?;

        let mut form = Form::new().part("file", part);
        if let Some(email) = email.filter(|e| !e.is_empty()) {
            form = form.text("email", email.to_string());
        }

        let request = self.authorize(self.client.post(self.url("/predict")).multipart(form));
        let value = self.send_json(request).await?;

        if !value.is_object() {
            return Err(ServiceError::MalformedPayload(
                "prediction response is not a JSON object".into(),
            ));
        }
        Ok(value)
    }

    async fn fetch_reports(&self, email: &str) -> Result<Vec<RawReport>, ServiceError> {
        let request = self.authorize(
            self.client
                .get(self.url("/api/reports"))
                .query(&[("email", email)]),
        );
        let value = self.send_json(request).await?;
        parse_reports_body(&value)
    }
}

#[async_trait]
impl AuthService for HttpClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ServiceError> {
        self.post_auth("/api/auth/login", &LoginRequest { email, password }, email)
            .await
    }

    async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ServiceError> {
        self.post_auth(
            "/api/auth/signup",
            &SignupRequest {
                username,
                email,
                password,
            },
            email,
        )
        .await
    }
}
