//! Raw analysis payload as returned by `/predict` and embedded in report history.
//!
//! The backend schema drifts between model versions, so every field is optional
//! and parsing never fails: anything that does not have the expected shape is
//! dropped here and defaulted later by the normalizer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Loosely-typed analysis payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAnalysisResponse {
    #[serde(deserialize_with = "lenient_vec")]
    pub disease_predictions: Vec<RawDiseasePrediction>,
    #[serde(deserialize_with = "lenient_option")]
    pub risk_assessment: Option<RawRiskAssessment>,
    #[serde(deserialize_with = "lenient_vec")]
    pub abnormal_labs: Vec<RawAbnormalLab>,
    #[serde(deserialize_with = "lenient_option")]
    pub summary: Option<RawSummary>,
    #[serde(deserialize_with = "lenient_integer")]
    pub abnormal_count: Option<i64>,
    #[serde(deserialize_with = "lenient_option")]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDiseasePrediction {
    #[serde(deserialize_with = "lenient_option")]
    pub disease: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub probability: Option<f64>,
    #[serde(deserialize_with = "lenient_option")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_option")]
    pub details: Option<DiseaseDetails>,
}

/// Structured per-disease guidance. Rendered separately from free-text
/// recommendations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiseaseDetails {
    #[serde(deserialize_with = "lenient_option")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub precautions: Vec<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub medicines: Vec<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub foods_to_avoid: Vec<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub foods_to_eat: Vec<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub recommended_tests: Vec<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub related_diseases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRiskAssessment {
    #[serde(deserialize_with = "lenient_option")]
    pub risk_level: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub risk_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAbnormalLab {
    #[serde(deserialize_with = "lenient_option")]
    pub test: Option<String>,
    #[serde(deserialize_with = "lenient_option")]
    pub value: Option<LabValue>,
    #[serde(deserialize_with = "lenient_option")]
    pub status: Option<String>,
}

/// Lab values arrive either as numbers or as free text ("<0.5", "positive").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabValue {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for LabValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSummary {
    #[serde(deserialize_with = "lenient_option")]
    pub summary_text: Option<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub recommendations: Vec<String>,
}

impl RawAnalysisResponse {
    /// Parse a JSON value, keeping whatever fields have a usable shape.
    /// A non-object value yields an empty response.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════
// Lenient field deserializers
// ═══════════════════════════════════════════════════════════
//
// Each helper reads the field as a plain `Value` first, so a field with the
// wrong shape degrades to its empty form instead of failing the payload.

/// Parse an array leniently, skipping items that fail to deserialize.
fn parse_array_lenient<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => parse_array_lenient(items),
        _ => vec![],
    })
}

fn lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let n = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(n.filter(|n| n.is_finite()))
}

fn lenient_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// A bare string counts as a one-item list; non-string items are skipped.
fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => parse_array_lenient(items),
        Value::String(s) => vec![s],
        _ => vec![],
    })
}
