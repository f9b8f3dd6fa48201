//! Scripted backends for tests and `--demo` runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{AnalysisService, AuthResponse, AuthService, RawReport, ServiceError};
use crate::models::{ReportUpload, SessionState};

/// Returns a fixed `/predict` result after an optional delay.
pub struct MockAnalysisService {
    response: Result<Value, ServiceError>,
    reports: Result<Vec<RawReport>, ServiceError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_email: Mutex<Option<String>>,
}

impl MockAnalysisService {
    pub fn new(response: Value) -> Self {
        Self {
            response: Ok(response),
            reports: Ok(vec![]),
            delay: None,
            calls: AtomicUsize::new(0),
            last_email: Mutex::new(None),
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            response: Err(error),
            ..Self::new(Value::Null)
        }
    }

    /// Canned payload used by the CLI's offline mode.
    pub fn demo() -> Self {
        let sample = demo_payload();
        Self::new(sample.clone())
            .with_delay(Duration::from_millis(3500))
            .with_reports(vec![
                RawReport {
                    id: Some("demo-2".into()),
                    timestamp: Some(json!("2026-03-14T10:30:00Z")),
                    results: sample,
                },
                RawReport {
                    id: Some("demo-1".into()),
                    timestamp: Some(json!("2026-01-09T08:15:00Z")),
                    results: json!({
                        "disease_predictions": [{"disease": "Healthy", "probability": 0.91}],
                        "risk_assessment": {"risk_level": "LOW", "risk_score": 0.12},
                        "abnormal_labs": [],
                        "summary": {"summary_text": "All values within reference ranges."},
                        "abnormal_count": 0
                    }),
                },
            ])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_reports(mut self, reports: Vec<RawReport>) -> Self {
        self.reports = Ok(reports);
        self
    }

    pub fn with_reports_error(mut self, error: ServiceError) -> Self {
        self.reports = Err(error);
        self
    }

    /// Number of `predict` calls that reached the service.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_email(&self) -> Option<String> {
        self.last_email.lock().ok().and_then(|e| e.clone())
    }
}

#[async_trait]
impl AnalysisService for MockAnalysisService {
    async fn predict(
        &self,
        _upload: &ReportUpload,
        email: Option<&str>,
    ) -> Result<Value, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_email.lock() {
            *last = email.map(str::to_string);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }

    async fn fetch_reports(&self, _email: &str) -> Result<Vec<RawReport>, ServiceError> {
        self.reports.clone()
    }
}

/// Accepts any credentials unless scripted to fail.
pub struct MockAuthService {
    failure: Option<ServiceError>,
    token: Option<String>,
}

impl MockAuthService {
    pub fn new() -> Self {
        Self {
            failure: None,
            token: Some("demo-token".into()),
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            failure: Some(error),
            token: None,
        }
    }

    pub fn without_token(mut self) -> Self {
        self.token = None;
        self
    }

    fn respond(&self, username: Option<&str>, email: &str) -> Result<AuthResponse, ServiceError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let mut user = json!({"id": format!("mock-{email}"), "email": email});
        if let Some(name) = username {
            user["username"] = json!(name);
        }
        Ok(AuthResponse {
            user: SessionState::from_backend_user(&user, email),
            token: self.token.clone(),
        })
    }
}

impl Default for MockAuthService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthService for MockAuthService {
    async fn login(&self, email: &str, _password: &str) -> Result<AuthResponse, ServiceError> {
        self.respond(None, email)
    }

    async fn signup(
        &self,
        username: &str,
        email: &str,
        _password: &str,
    ) -> Result<AuthResponse, ServiceError> {
        self.respond(Some(username), email)
    }
}

fn demo_payload() -> Value {
    json!({
        "disease_predictions": [
            {
                "disease": "Iron Deficiency Anemia",
                "probability": 0.72,
                "details": {
                    "description": "Low hemoglobin with reduced iron stores.",
                    "precautions": ["Avoid tea with meals"],
                    "foods_to_eat": ["Spinach", "Lentils"],
                    "recommended_tests": ["Serum ferritin"]
                }
            },
            {"disease": "Vitamin B12 Deficiency", "probability": 0.18}
        ],
        "risk_assessment": {"risk_level": "MEDIUM", "risk_score": 0.54},
        "abnormal_labs": [
            {"test": "Hemoglobin", "value": 10.2, "status": "LOW"},
            {"test": "Ferritin", "value": 8, "status": "CRITICAL"}
        ],
        "summary": {
            "summary_text": "Findings are consistent with iron deficiency.",
            "recommendations": ["Recheck CBC in 6 weeks", "Discuss iron supplementation"]
        },
        "abnormal_count": 2,
        "model_version": "biobert-health-v1.0"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_counts_calls_and_records_email() {
        let mock = MockAnalysisService::new(json!({"abnormal_count": 1}));
        let upload = ReportUpload::new("a.pdf", vec![1]);

        let value = mock.predict(&upload, Some("x@y.z")).await.unwrap();
        assert_eq!(value["abnormal_count"], 1);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.last_email().as_deref(), Some("x@y.z"));
    }

    #[tokio::test]
    async fn failing_mock_returns_error() {
        let mock = MockAnalysisService::failing(ServiceError::Timeout(5));
        let err = mock
            .predict(&ReportUpload::new("a.pdf", vec![1]), None)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Timeout(5));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_honored() {
        let mock = MockAnalysisService::new(json!({})).with_delay(Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        mock.predict(&ReportUpload::new("a.pdf", vec![1]), None)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn demo_has_history() {
        let reports = MockAnalysisService::demo().fetch_reports("any").await.unwrap();
        assert_eq!(reports.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn demo_payload_uses_backend_risk_levels() {
        use crate::models::RiskStatus;
        use crate::pipeline::normalizer::normalize_value;

        let value = MockAnalysisService::demo()
            .predict(&ReportUpload::new("a.pdf", vec![1]), None)
            .await;
        let bundle = normalize_value(&value.unwrap());
        assert_eq!(bundle.risk.status, RiskStatus::Moderate);
        assert_eq!(bundle.risk.score, 0.54);

        let reports = MockAnalysisService::demo().fetch_reports("any").await.unwrap();
        assert_eq!(normalize_value(&reports[1].results).risk.status, RiskStatus::Low);
    }

    #[tokio::test]
    async fn mock_auth_signup_keeps_username() {
        let auth = MockAuthService::new()
            .signup("robin", "robin@example.org", "pw")
            .await
            .unwrap();
        assert_eq!(auth.user.username, "robin");
        assert_eq!(auth.user.email, "robin@example.org");
        assert_eq!(auth.token.as_deref(), Some("demo-token"));
    }

    #[tokio::test]
    async fn mock_auth_failure() {
        let err = MockAuthService::failing(ServiceError::Rejected {
            status: 401,
            message: "Invalid credentials".into(),
        })
        .login("a@b.c", "bad")
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { status: 401, .. }));
    }
}
