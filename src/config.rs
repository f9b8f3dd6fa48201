use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Application-level constants
pub const APP_NAME: &str = "MedTrail";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Storage key for the serialized session user.
pub const USER_KEY: &str = "medtrailmatch_user";

/// Storage key for the optional bearer token.
pub const TOKEN_KEY: &str = "medtrailmatch_token";

/// Confidence reported when the payload carries no disease predictions.
pub const DEFAULT_CONFIDENCE: f64 = 0.85;

/// Model version reported when the payload does not name one.
pub const DEFAULT_MODEL_VERSION: &str = "biobert-health-v1.0";

const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STAGE_INTERVAL_MS: u64 = 1200;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "medtrail=info,medtrail_lib=info"
}

/// Get the application data directory
/// ~/.medtrail/ on all platforms
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".medtrail")
}

// ═══════════════════════════════════════════════════════════
// ClientConfig
// ═══════════════════════════════════════════════════════════

/// Runtime configuration for the analysis client.
#[derive(Debug, Clone, Serialize)]
pub struct ClientConfig {
    /// Base URL of the analysis backend, without trailing slash.
    pub api_base_url: String,
    /// Whole-request timeout for backend calls.
    pub request_timeout_secs: u64,
    /// TCP connect timeout for backend calls.
    pub connect_timeout_secs: u64,
    /// Pacing of the simulated analysis stages.
    pub stage_interval_ms: u64,
    /// Where the file session repository keeps its keys.
    pub data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            stage_interval_ms: DEFAULT_STAGE_INTERVAL_MS,
            data_dir: app_data_dir(),
        }
    }
}

impl ClientConfig {
    /// Build from `MEDTRAIL_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: lookup("MEDTRAIL_API_URL")
                .map(|url| normalize_base_url(&url))
                .filter(|url| !url.is_empty())
                .unwrap_or(defaults.api_base_url),
            request_timeout_secs: parse_u64(
                &lookup,
                "MEDTRAIL_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
            connect_timeout_secs: defaults.connect_timeout_secs,
            stage_interval_ms: parse_u64(
                &lookup,
                "MEDTRAIL_STAGE_INTERVAL_MS",
                defaults.stage_interval_ms,
            ),
            data_dir: lookup("MEDTRAIL_DATA_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        }
    }

    /// Replace the base URL (CLI `--api-url`).
    pub fn with_api_base_url(mut self, url: &str) -> Self {
        self.api_base_url = normalize_base_url(url);
        self
    }

    pub fn stage_interval(&self) -> Duration {
        Duration::from_millis(self.stage_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => value,
            _ => {
                tracing::warn!(key, value = %raw, default, "Ignoring invalid configuration value");
                default
            }
        },
    }
}
