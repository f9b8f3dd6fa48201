//! Stable view-model types shared by the live analysis screen and report history.

use serde::{Deserialize, Serialize};

use super::raw::DiseaseDetails;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDiseasePrediction {
    pub name: String,
    /// `round(probability * 100)`, clamped to 0..=100.
    pub probability_percent: u8,
    pub description: String,
    pub details: Option<DiseaseDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskStatus {
    Low,
    Moderate,
    High,
}

impl RiskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Moderate => "MODERATE",
            Self::High => "HIGH",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::Moderate => "Moderate Risk",
            Self::High => "High Risk",
        }
    }
}

impl std::fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub severity: Severity,
}

/// Overall risk. `risk_factors` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRiskAssessment {
    pub status: RiskStatus,
    pub score: f64,
    pub risk_factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSummary {
    pub summary_text: String,
    /// Free-text recommendations; category-prefixed lines are removed.
    pub recommendations: Vec<String>,
    /// In 0.0..=1.0.
    pub confidence: f64,
    pub model_version: String,
}

/// Everything a consumer needs to render one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisBundle {
    pub diseases: Vec<NormalizedDiseasePrediction>,
    pub risk: NormalizedRiskAssessment,
    pub summary: NormalizedSummary,
    pub abnormal_count: u32,
}

impl AnalysisBundle {
    pub fn top_disease(&self) -> Option<&NormalizedDiseasePrediction> {
        self.diseases.first()
    }
}
