//! Past reports for the signed-in user.
//!
//! Records are sorted newest first on every fetch; the backend order is not
//! trusted. Each record normalizes its raw results on first access and keeps
//! the view for its lifetime.

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::normalizer;
use crate::client::{AnalysisService, RawReport, ServiceError};
use crate::models::AnalysisBundle;

// ═══════════════════════════════════════════════════════════
// ReportRecord
// ═══════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct ReportRecord {
    id: String,
    timestamp: Option<DateTime<Utc>>,
    raw_results: Value,
    view: OnceLock<AnalysisBundle>,
}

impl ReportRecord {
    pub fn new(id: impl Into<String>, timestamp: Option<DateTime<Utc>>, raw_results: Value) -> Self {
        Self {
            id: id.into(),
            timestamp,
            raw_results,
            view: OnceLock::new(),
        }
    }

    /// `None` when the report has no id to address it by.
    fn from_raw(raw: RawReport) -> Option<Self> {
        let id = raw.id.filter(|id| !id.trim().is_empty())?;
        let timestamp = raw.timestamp.as_ref().and_then(parse_timestamp);
        Some(Self::new(id, timestamp, raw.results))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `None` when the backend sent no timestamp or one that does not parse.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn raw_results(&self) -> &Value {
        &self.raw_results
    }

    /// Normalized view, computed once.
    pub fn normalized_view(&self) -> &AnalysisBundle {
        self.view
            .get_or_init(|| normalizer::normalize_value(&self.raw_results))
    }

    pub fn is_normalized(&self) -> bool {
        self.view.get().is_some()
    }
}

/// RFC 3339 strings, a few common naive layouts (read as UTC), or epoch
/// milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%a, %d %b %Y %H:%M:%S GMT"]
                .iter()
                .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Newest first; records without a timestamp go last, ties keep fetch order.
fn newest_first(a: &ReportRecord, b: &ReportRecord) -> Ordering {
    match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ═══════════════════════════════════════════════════════════
// HistoryAggregator
// ═══════════════════════════════════════════════════════════

pub struct HistoryAggregator {
    service: Arc<dyn AnalysisService>,
    records: Vec<ReportRecord>,
}

impl HistoryAggregator {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self {
            service,
            records: Vec::new(),
        }
    }

    /// Replace the cached list with a fresh fetch. On error the previous
    /// list is kept.
    pub async fn fetch_history(&mut self, email: &str) -> Result<&[ReportRecord], ServiceError> {
        let raw = self.service.fetch_reports(email).await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to fetch report history");
            e
        })?;

        let fetched = raw.len();
        let mut records: Vec<ReportRecord> = raw
            .into_iter()
            .filter_map(|report| {
                let record = ReportRecord::from_raw(report);
                if record.is_none() {
                    tracing::warn!("Skipping history entry without an id");
                }
                record
            })
            .collect();
        records.sort_by(newest_first);

        tracing::info!(fetched, kept = records.len(), "Report history loaded");
        self.records = records;
        Ok(&self.records)
    }

    pub fn records(&self) -> &[ReportRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&ReportRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn latest(&self) -> Option<&ReportRecord> {
        self.records.first()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
