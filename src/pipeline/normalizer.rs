//! Raw analysis payload → stable view model.
//!
//! Pure and total: no I/O, no errors. Missing or unrecognized optional fields
//! degrade to fixed defaults so a drifting backend schema never fails the
//! pipeline.
//!
//! Two defaults are known approximations and are kept deliberately:
//! - an unrecognized or missing `risk_level` maps to `LOW`, which can
//!   understate risk if the backend introduces a new level;
//! - when there are no abnormal labs but risk is elevated, a single
//!   "Potential <disease> Detected" factor is synthesized from the top
//!   prediction. It is a heuristic, not a finding.

use crate::config::{DEFAULT_CONFIDENCE, DEFAULT_MODEL_VERSION};
use crate::models::{
    AnalysisBundle, NormalizedDiseasePrediction, NormalizedRiskAssessment, NormalizedSummary,
    RawAbnormalLab, RawAnalysisResponse, RawDiseasePrediction, RiskFactor, RiskStatus, Severity,
};

/// Shown when neither the details nor the prediction carry a description.
pub const DESCRIPTION_PLACEHOLDER: &str = "No description available for this condition.";

/// Name used for predictions that arrive without a disease name.
pub const UNKNOWN_DISEASE: &str = "Unknown condition";

/// Sole factor when nothing supports an elevated risk.
pub const NO_RISK_FACTORS: &str = "No major risk factors found";

/// Recommendation lines starting with these are rendered from structured
/// disease details instead.
pub const CATEGORY_PREFIXES: [&str; 5] = [
    "Precautions:",
    "Recommended Foods:",
    "Avoid Foods:",
    "Common Medicines:",
    "Recommended Tests:",
];

// ═══════════════════════════════════════════════════════════
// Entry point
// ═══════════════════════════════════════════════════════════

/// Normalize a full payload.
pub fn normalize(raw: &RawAnalysisResponse) -> AnalysisBundle {
    let diseases: Vec<NormalizedDiseasePrediction> =
        raw.disease_predictions.iter().map(normalize_disease).collect();
    let risk = normalize_risk(raw);
    let summary = normalize_summary(raw, risk.status);

    AnalysisBundle {
        diseases,
        risk,
        summary,
        abnormal_count: abnormal_count(raw),
    }
}

/// Normalize straight from JSON (history records, `/predict` bodies).
pub fn normalize_value(value: &serde_json::Value) -> AnalysisBundle {
    normalize(&RawAnalysisResponse::from_value(value))
}

// ═══════════════════════════════════════════════════════════
// Diseases
// ═══════════════════════════════════════════════════════════

pub fn normalize_disease(raw: &RawDiseasePrediction) -> NormalizedDiseasePrediction {
    let description = raw
        .details
        .as_ref()
        .and_then(|d| non_blank(d.description.as_deref()))
        .or_else(|| non_blank(raw.description.as_deref()))
        .unwrap_or(DESCRIPTION_PLACEHOLDER)
        .to_string();

    NormalizedDiseasePrediction {
        name: disease_name(raw).to_string(),
        probability_percent: probability_percent(raw.probability.unwrap_or(0.0)),
        description,
        details: raw.details.clone(),
    }
}

/// `round(probability * 100)`, clamped to 0..=100.
pub fn probability_percent(probability: f64) -> u8 {
    if !probability.is_finite() {
        return 0;
    }
    (probability * 100.0).round().clamp(0.0, 100.0) as u8
}

fn disease_name(raw: &RawDiseasePrediction) -> &str {
    non_blank(raw.disease.as_deref()).unwrap_or(UNKNOWN_DISEASE)
}

// ═══════════════════════════════════════════════════════════
// Risk
// ═══════════════════════════════════════════════════════════

/// LOW→LOW, MEDIUM→MODERATE, HIGH→HIGH, CRITICAL→HIGH, anything else→LOW.
pub fn map_risk_level(level: Option<&str>) -> RiskStatus {
    let Some(level) = level else {
        return RiskStatus::Low;
    };
    match level.trim().to_ascii_uppercase().as_str() {
        "LOW" => RiskStatus::Low,
        "MEDIUM" => RiskStatus::Moderate,
        "HIGH" | "CRITICAL" => RiskStatus::High,
        other => {
            tracing::debug!(risk_level = other, "Unrecognized risk level, defaulting to LOW");
            RiskStatus::Low
        }
    }
}

pub fn normalize_risk(raw: &RawAnalysisResponse) -> NormalizedRiskAssessment {
    let assessment = raw.risk_assessment.as_ref();
    let status = map_risk_level(assessment.and_then(|r| r.risk_level.as_deref()));
    let score = assessment.and_then(|r| r.risk_score).unwrap_or(0.0);

    NormalizedRiskAssessment {
        status,
        score,
        risk_factors: extract_risk_factors(raw, status),
    }
}

/// One factor per abnormal lab; falls back to a synthesized factor from the
/// top prediction, then to the "no major risk factors" sentinel. Never empty.
pub fn extract_risk_factors(raw: &RawAnalysisResponse, status: RiskStatus) -> Vec<RiskFactor> {
    let mut factors: Vec<RiskFactor> = raw.abnormal_labs.iter().map(lab_factor).collect();

    if factors.is_empty() && status != RiskStatus::Low {
        if let Some(top) = raw.disease_predictions.first() {
            let name = disease_name(top);
            tracing::debug!(disease = name, status = %status, "Synthesizing risk factor from top prediction");
            factors.push(RiskFactor {
                name: format!("Potential {name} Detected"),
                severity: if status == RiskStatus::High {
                    Severity::High
                } else {
                    Severity::Moderate
                },
            });
        }
    }

    if factors.is_empty() {
        factors.push(RiskFactor {
            name: NO_RISK_FACTORS.to_string(),
            severity: Severity::Low,
        });
    }

    factors
}

fn lab_factor(lab: &RawAbnormalLab) -> RiskFactor {
    let test = non_blank(lab.test.as_deref()).unwrap_or("Unnamed test");
    let value = lab
        .value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "n/a".to_string());
    let severe = lab
        .status
        .as_deref()
        .map(|s| matches!(s.trim().to_ascii_uppercase().as_str(), "HIGH" | "CRITICAL"))
        .unwrap_or(false);

    RiskFactor {
        name: format!("{test} ({value})"),
        severity: if severe { Severity::High } else { Severity::Moderate },
    }
}

// ═══════════════════════════════════════════════════════════
// Summary
// ═══════════════════════════════════════════════════════════

pub fn normalize_summary(raw: &RawAnalysisResponse, status: RiskStatus) -> NormalizedSummary {
    let summary = raw.summary.as_ref();

    let summary_text = summary
        .and_then(|s| non_blank(s.summary_text.as_deref()))
        .map(str::to_string)
        .unwrap_or_else(|| {
            let level = raw
                .risk_assessment
                .as_ref()
                .and_then(|r| non_blank(r.risk_level.as_deref()))
                .unwrap_or(status.as_str());
            format!(
                "Analysis complete. Found {} abnormal lab results. Risk level assessed as {}.",
                abnormal_count(raw),
                level
            )
        });

    let recommendations = summary
        .map(|s| filter_recommendations(&s.recommendations))
        .unwrap_or_default();

    let confidence = raw
        .disease_predictions
        .first()
        .and_then(|top| top.probability)
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    let model_version = non_blank(raw.model_version.as_deref())
        .unwrap_or(DEFAULT_MODEL_VERSION)
        .to_string();

    NormalizedSummary {
        summary_text,
        recommendations,
        confidence,
        model_version,
    }
}

/// Drop every recommendation that starts with a category prefix.
pub fn filter_recommendations(recommendations: &[String]) -> Vec<String> {
    recommendations
        .iter()
        .filter(|line| !CATEGORY_PREFIXES.iter().any(|prefix| line.starts_with(prefix)))
        .cloned()
        .collect()
}

fn abnormal_count(raw: &RawAnalysisResponse) -> u32 {
    match raw.abnormal_count {
        Some(n) => u32::try_from(n.max(0)).unwrap_or(u32::MAX),
        None => u32::try_from(raw.abnormal_labs.len()).unwrap_or(u32::MAX),
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle(value: serde_json::Value) -> AnalysisBundle {
        normalize_value(&value)
    }

    #[test]
    fn risk_level_table() {
        let cases = [
            (Some("LOW"), RiskStatus::Low),
            (Some("MEDIUM"), RiskStatus::Moderate),
            (Some("HIGH"), RiskStatus::High),
            (Some("CRITICAL"), RiskStatus::High),
            (Some("SEVERE"), RiskStatus::Low),
            (Some(""), RiskStatus::Low),
            (None, RiskStatus::Low),
        ];
        for (level, expected) in cases {
            assert_eq!(map_risk_level(level), expected, "risk_level {level:?}");
        }
    }

    #[test]
    fn risk_level_ignores_case_and_whitespace() {
        assert_eq!(map_risk_level(Some(" medium ")), RiskStatus::Moderate);
        assert_eq!(map_risk_level(Some("Critical")), RiskStatus::High);
    }

    #[test]
    fn probability_rounding() {
        assert_eq!(probability_percent(0.426), 43);
        assert_eq!(probability_percent(0.005), 1);
        assert_eq!(probability_percent(0.0), 0);
        assert_eq!(probability_percent(1.0), 100);
        assert_eq!(probability_percent(0.87), 87);
    }

    #[test]
    fn probability_out_of_range_is_clamped() {
        assert_eq!(probability_percent(1.7), 100);
        assert_eq!(probability_percent(-0.2), 0);
        assert_eq!(probability_percent(f64::NAN), 0);
    }

    #[test]
    fn medium_risk_without_labs_synthesizes_factor() {
        let b = bundle(json!({
            "risk_assessment": {"risk_level": "MEDIUM"},
            "abnormal_labs": [],
            "disease_predictions": [{"disease": "Anemia", "probability": 0.87}]
        }));
        assert_eq!(b.risk.status, RiskStatus::Moderate);
        assert_eq!(
            b.risk.risk_factors,
            vec![RiskFactor {
                name: "Potential Anemia Detected".into(),
                severity: Severity::Moderate,
            }]
        );
    }

    #[test]
    fn high_risk_synthesized_factor_is_high() {
        let b = bundle(json!({
            "risk_assessment": {"risk_level": "CRITICAL"},
            "disease_predictions": [
                {"disease": "Sepsis", "probability": 0.7},
                {"disease": "Anemia", "probability": 0.9}
            ]
        }));
        assert_eq!(b.risk.risk_factors.len(), 1);
        assert_eq!(b.risk.risk_factors[0].name, "Potential Sepsis Detected");
        assert_eq!(b.risk.risk_factors[0].severity, Severity::High);
    }

    #[test]
    fn abnormal_lab_becomes_factor() {
        let b = bundle(json!({
            "abnormal_labs": [{"test": "Hemoglobin", "value": 10.2, "status": "HIGH"}]
        }));
        assert_eq!(
            b.risk.risk_factors,
            vec![RiskFactor {
                name: "Hemoglobin (10.2)".into(),
                severity: Severity::High,
            }]
        );
    }

    #[test]
    fn lab_severity_depends_on_status() {
        let b = bundle(json!({
            "abnormal_labs": [
                {"test": "Potassium", "value": 6.8, "status": "CRITICAL"},
                {"test": "Ferritin", "value": "8", "status": "LOW"},
                {"test": "TSH", "value": 5.1}
            ]
        }));
        let severities: Vec<Severity> = b.risk.risk_factors.iter().map(|f| f.severity).collect();
        assert_eq!(severities, vec![Severity::High, Severity::Moderate, Severity::Moderate]);
        assert_eq!(b.risk.risk_factors[1].name, "Ferritin (8)");
    }

    #[test]
    fn low_risk_without_labs_gets_sentinel() {
        let b = bundle(json!({
            "risk_assessment": {"risk_level": "LOW"},
            "disease_predictions": [{"disease": "Anemia", "probability": 0.2}]
        }));
        assert_eq!(
            b.risk.risk_factors,
            vec![RiskFactor {
                name: NO_RISK_FACTORS.into(),
                severity: Severity::Low,
            }]
        );
    }

    #[test]
    fn elevated_risk_without_predictions_gets_sentinel() {
        let b = bundle(json!({"risk_assessment": {"risk_level": "HIGH"}}));
        assert_eq!(b.risk.risk_factors.len(), 1);
        assert_eq!(b.risk.risk_factors[0].name, NO_RISK_FACTORS);
    }

    #[test]
    fn risk_factors_never_empty() {
        let payloads = [
            json!({}),
            json!(null),
            json!({"abnormal_labs": []}),
            json!({"risk_assessment": {"risk_level": "MEDIUM"}}),
            json!({"risk_assessment": {"risk_level": "UNKNOWN"}, "disease_predictions": [{}]}),
            json!({"disease_predictions": "garbage", "abnormal_labs": [42]}),
        ];
        for payload in payloads {
            let b = bundle(payload.clone());
            assert!(!b.risk.risk_factors.is_empty(), "payload {payload}");
        }
    }

    #[test]
    fn recommendation_filter_removes_only_prefixed_lines() {
        let input = vec![
            "Take rest".to_string(),
            "Precautions: avoid smoking".to_string(),
        ];
        assert_eq!(filter_recommendations(&input), vec!["Take rest"]);
    }

    #[test]
    fn recommendation_filter_covers_every_prefix() {
        let mut input: Vec<String> = CATEGORY_PREFIXES
            .iter()
            .map(|p| format!("{p} something"))
            .collect();
        input.push("Recommended follow-up in 6 weeks".into());
        input.push(" Precautions: leading space is not a prefix match".into());
        assert_eq!(
            filter_recommendations(&input),
            vec![
                "Recommended follow-up in 6 weeks",
                " Precautions: leading space is not a prefix match"
            ]
        );
    }

    #[test]
    fn summary_text_fallback() {
        let b = bundle(json!({
            "risk_assessment": {"risk_level": "HIGH"},
            "abnormal_count": 3
        }));
        assert_eq!(
            b.summary.summary_text,
            "Analysis complete. Found 3 abnormal lab results. Risk level assessed as HIGH."
        );
    }

    #[test]
    fn summary_fallback_counts_labs_when_count_missing() {
        let b = bundle(json!({
            "abnormal_labs": [{"test": "LDL", "value": 190, "status": "HIGH"}]
        }));
        assert_eq!(
            b.summary.summary_text,
            "Analysis complete. Found 1 abnormal lab results. Risk level assessed as LOW."
        );
        assert_eq!(b.abnormal_count, 1);
    }

    #[test]
    fn summary_text_is_kept_when_present() {
        let b = bundle(json!({"summary": {"summary_text": "Low hemoglobin."}}));
        assert_eq!(b.summary.summary_text, "Low hemoglobin.");
    }

    #[test]
    fn confidence_from_top_prediction_or_default() {
        let with = bundle(json!({"disease_predictions": [{"disease": "Anemia", "probability": 0.91}]}));
        let without = bundle(json!({}));
        assert_eq!(with.summary.confidence, 0.91);
        assert_eq!(without.summary.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn model_version_default() {
        assert_eq!(bundle(json!({})).summary.model_version, DEFAULT_MODEL_VERSION);
        assert_eq!(
            bundle(json!({"model_version": "v9"})).summary.model_version,
            "v9"
        );
    }

    #[test]
    fn description_fallback_chain() {
        let from_details = normalize_disease(&RawDiseasePrediction {
            disease: Some("Anemia".into()),
            probability: Some(0.5),
            description: Some("short".into()),
            details: Some(crate::models::DiseaseDetails {
                description: Some("detailed".into()),
                ..Default::default()
            }),
        });
        let from_prediction = normalize_disease(&RawDiseasePrediction {
            disease: Some("Anemia".into()),
            description: Some("short".into()),
            ..Default::default()
        });
        let placeholder = normalize_disease(&RawDiseasePrediction::default());

        assert_eq!(from_details.description, "detailed");
        assert_eq!(from_prediction.description, "short");
        assert_eq!(placeholder.description, DESCRIPTION_PLACEHOLDER);
        assert_eq!(placeholder.name, UNKNOWN_DISEASE);
        assert_eq!(placeholder.probability_percent, 0);
    }

    #[test]
    fn details_are_carried_through() {
        let b = bundle(json!({
            "disease_predictions": [{
                "disease": "Diabetes",
                "probability": 0.66,
                "details": {"medicines": ["Metformin"], "recommended_tests": ["HbA1c"]}
            }]
        }));
        let details = b.diseases[0].details.as_ref().unwrap();
        assert_eq!(details.medicines, vec!["Metformin"]);
        assert_eq!(details.recommended_tests, vec!["HbA1c"]);
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = RawAnalysisResponse::from_value(&json!({
            "risk_assessment": {"risk_level": "MEDIUM", "risk_score": 0.5},
            "disease_predictions": [{"disease": "Anemia", "probability": 0.87}]
        }));
        assert_eq!(normalize(&raw), normalize(&raw));
    }
}
