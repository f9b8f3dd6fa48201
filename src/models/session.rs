use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The signed-in user as persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub reports_analyzed: u32,
    #[serde(default)]
    pub last_upload_date: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Build from the `user` object of an auth response.
    ///
    /// Accepts `id` or `_id`; a missing username falls back to the email's
    /// local part and missing counters start at zero.
    pub fn from_backend_user(user: &Value, fallback_email: &str) -> Self {
        let text = |key: &str| {
            user.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let email = text("email").unwrap_or_else(|| fallback_email.trim().to_string());
        let username = text("username")
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        let id = text("id")
            .or_else(|| text("_id"))
            .or_else(|| user.get("id").and_then(Value::as_i64).map(|n| n.to_string()))
            .unwrap_or_default();
        let reports_analyzed = user
            .get("reportsAnalyzed")
            .or_else(|| user.get("reports_analyzed"))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        let last_upload_date = text("lastUploadDate")
            .or_else(|| text("last_upload_date"))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Self {
            id,
            username,
            email,
            reports_analyzed,
            last_upload_date,
        }
    }

    /// Count one more analyzed report.
    pub fn record_upload(&mut self, at: DateTime<Utc>) {
        self.reports_analyzed = self.reports_analyzed.saturating_add(1);
        self.last_upload_date = Some(at);
    }
}

/// What the session repository holds: the user blob plus an optional token.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub user: SessionState,
    pub token: Option<String>,
}
