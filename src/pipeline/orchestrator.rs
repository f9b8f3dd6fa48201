//! UploadOrchestrator: owns the single in-flight analysis.
//!
//! ```text
//! Idle ─submit─▶ Submitting ─ok─▶ Finalizing ─▶ Complete(bundle)
//!                    │
//!                    └─err─▶ Failed(error)
//! ```
//!
//! Every state write goes through `watch::Sender::send_if_modified` and
//! re-checks both the expected source state and the submission's
//! cancellation token under the channel lock. A response that arrives after
//! `dispose()` therefore finds its token cancelled and changes nothing.
//! `submit` and `dispose` both hold the `current` lock for their whole
//! transition, so a dispose never lands between a submission's state change
//! and the publication of its token.
//! Progress is forced to its final stage (or cancelled) before the terminal
//! state is published.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::progress::{ProgressSimulator, ProgressSnapshot, ANALYSIS_STAGES};
use super::{normalizer, AnalysisError, ValidationError};
use crate::client::{AnalysisService, ServiceError};
use crate::models::{AnalysisBundle, ReportUpload};
use crate::session::{SessionContext, SessionError};

// ═══════════════════════════════════════════════════════════
// State
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisState {
    Idle,
    Submitting,
    Finalizing,
    Complete(Arc<AnalysisBundle>),
    Failed(ServiceError),
}

impl AnalysisState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Finalizing => "finalizing",
            Self::Complete(_) => "complete",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitting | Self::Finalizing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Failed(_))
    }

    /// User-facing message for a failed submission.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Failed(err) => Some(err.to_string()),
            _ => None,
        }
    }
}

/// Everything the background submission task needs.
struct Submission {
    id: Uuid,
    service: Arc<dyn AnalysisService>,
    session: Arc<SessionContext>,
    progress: Arc<ProgressSimulator>,
    state: Arc<watch::Sender<AnalysisState>>,
    token: CancellationToken,
}

/// The live submission's cancellation handle and background task.
struct ActiveRun {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

// ═══════════════════════════════════════════════════════════
// UploadOrchestrator
// ═══════════════════════════════════════════════════════════

pub struct UploadOrchestrator {
    service: Arc<dyn AnalysisService>,
    session: Arc<SessionContext>,
    progress: Arc<ProgressSimulator>,
    state: Arc<watch::Sender<AnalysisState>>,
    current: Mutex<Option<ActiveRun>>,
}

impl UploadOrchestrator {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        session: Arc<SessionContext>,
        stage_interval: Duration,
    ) -> Self {
        let (tx, _rx) = watch::channel(AnalysisState::Idle);
        Self {
            service,
            session,
            progress: Arc::new(ProgressSimulator::new(stage_interval)),
            state: Arc::new(tx),
            current: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AnalysisState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisState> {
        self.state.subscribe()
    }

    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    pub fn progress_snapshot(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Accept a report for analysis and start it in the background.
    ///
    /// Rejected without any state change when the file is missing, empty or
    /// not an image/PDF, or while another submission is in flight. A
    /// finished result is discarded by a new submission.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(
        &self,
        file: Option<ReportUpload>,
        session_email: Option<&str>,
    ) -> Result<(), ValidationError> {
        let upload = file.ok_or(ValidationError::MissingFile)?;
        if upload.bytes.is_empty() {
            return Err(ValidationError::EmptyFile(upload.file_name));
        }
        if !upload.is_supported_type() {
            return Err(ValidationError::UnsupportedFileType(upload.mime_type));
        }

        // Held until the run is published so `dispose` sees all of it or none.
        let mut current = self.lock_current();

        let accepted = self.state.send_if_modified(|s| {
            if s.is_in_flight() {
                return false;
            }
            *s = AnalysisState::Submitting;
            true
        });
        if !accepted {
            tracing::debug!(file = %upload.file_name, "Submission rejected: analysis in flight");
            return Err(ValidationError::AlreadyInFlight);
        }

        let token = CancellationToken::new();
        let submission = Submission {
            id: Uuid::new_v4(),
            service: self.service.clone(),
            session: self.session.clone(),
            progress: self.progress.clone(),
            state: self.state.clone(),
            token: token.clone(),
        };

        tracing::info!(
            submission_id = %submission.id,
            file = %upload.file_name,
            mime = %upload.mime_type,
            size_bytes = upload.size_bytes(),
            state = "submitting",
            "Report submitted"
        );

        self.progress.start(ANALYSIS_STAGES.len());
        let email = session_email.map(str::to_string);
        let task = tokio::spawn(run_submission(submission, upload, email));
        *current = Some(ActiveRun {
            token,
            task: Some(task),
        });
        Ok(())
    }

    /// Wait for the last submission's background task to finish, including
    /// the session write that follows a completed analysis.
    pub async fn settle(&self) {
        let task = self.lock_current().as_mut().and_then(|run| run.task.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::debug!(error = %e, "Submission task ended abnormally");
            }
        }
    }

    /// Resolve once the current submission ends.
    ///
    /// `Cancelled` when the orchestrator is disposed (or idle) instead.
    pub async fn wait_for_outcome(&self) -> Result<Arc<AnalysisBundle>, AnalysisError> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| !s.is_in_flight())
            .await
            .map_err(|_| AnalysisError::Cancelled)?
            .clone();

        match state {
            AnalysisState::Complete(bundle) => Ok(bundle),
            AnalysisState::Failed(err) => Err(AnalysisError::Transport(err)),
            AnalysisState::Idle | AnalysisState::Submitting | AnalysisState::Finalizing => {
                Err(AnalysisError::Cancelled)
            }
        }
    }

    pub async fn submit_and_wait(
        &self,
        file: ReportUpload,
        session_email: Option<&str>,
    ) -> Result<Arc<AnalysisBundle>, AnalysisError> {
        self.submit(Some(file), session_email)?;
        let outcome = self.wait_for_outcome().await;
        self.settle().await;
        outcome
    }

    /// Read a report from disk and analyze it.
    pub async fn analyze_path(
        &self,
        path: &Path,
        session_email: Option<&str>,
    ) -> Result<Arc<AnalysisBundle>, AnalysisError> {
        let upload = ReportUpload::from_path(path).await?;
        self.submit_and_wait(upload, session_email).await
    }

    /// Leave `Complete`/`Failed` for `Idle`, dropping the result.
    pub fn reset(&self) -> Result<(), ValidationError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|s| match s {
            AnalysisState::Idle => false,
            AnalysisState::Complete(_) | AnalysisState::Failed(_) => {
                *s = AnalysisState::Idle;
                true
            }
            AnalysisState::Submitting | AnalysisState::Finalizing => {
                outcome = Err(ValidationError::NotTerminal);
                false
            }
        });
        outcome
    }

    /// Abandon any in-flight submission. Its response, if it still arrives,
    /// is discarded.
    pub fn dispose(&self) {
        let mut current = self.lock_current();
        if let Some(run) = current.take() {
            run.token.cancel();
        }
        self.progress.cancel();

        let abandoned = self.state.send_if_modified(|s| {
            if !s.is_in_flight() {
                return false;
            }
            *s = AnalysisState::Idle;
            true
        });
        drop(current);
        if abandoned {
            tracing::info!(state = "idle", "In-flight analysis abandoned");
        }
    }
}

impl Drop for UploadOrchestrator {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ═══════════════════════════════════════════════════════════
// Background submission
// ═══════════════════════════════════════════════════════════

async fn run_submission(sub: Submission, upload: ReportUpload, email: Option<String>) {
    let started = Instant::now();

    let result = tokio::select! {
        biased;
        _ = sub.token.cancelled() => {
            tracing::debug!(submission_id = %sub.id, "Submission cancelled before response");
            return;
        }
        result = sub.service.predict(&upload, email.as_deref()) => result,
    };

    match result {
        Ok(payload) => finish_success(&sub, &payload, started).await,
        Err(err) => finish_failure(&sub, err, started),
    }
}

async fn finish_success(sub: &Submission, payload: &Value, started: Instant) {
    let finalizing = sub.state.send_if_modified(|s| {
        if sub.token.is_cancelled() || *s != AnalysisState::Submitting {
            return false;
        }
        *s = AnalysisState::Finalizing;
        true
    });
    if !finalizing {
        tracing::debug!(submission_id = %sub.id, "Late response discarded");
        return;
    }

    sub.progress.force_final();
    let bundle = Arc::new(normalizer::normalize_value(payload));

    let mut credited = false;
    let completed = sub.state.send_if_modified(|s| {
        if sub.token.is_cancelled() || *s != AnalysisState::Finalizing {
            return false;
        }
        credited = credit_session(sub);
        *s = AnalysisState::Complete(bundle.clone());
        true
    });

    if completed {
        tracing::info!(
            submission_id = %sub.id,
            state = "complete",
            risk = %bundle.risk.status,
            abnormal_count = bundle.abnormal_count,
            stage = sub.progress.snapshot().stage,
            duration_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );
    }
    if credited {
        persist_session(sub).await;
    }
}

fn finish_failure(sub: &Submission, err: ServiceError, started: Instant) {
    if sub.token.is_cancelled() {
        tracing::debug!(submission_id = %sub.id, "Late failure discarded");
        return;
    }

    sub.progress.cancel();
    let failed = sub.state.send_if_modified(|s| {
        if sub.token.is_cancelled() || *s != AnalysisState::Submitting {
            return false;
        }
        *s = AnalysisState::Failed(err.clone());
        true
    });

    if failed {
        tracing::warn!(
            submission_id = %sub.id,
            state = "failed",
            error = %err,
            stage = sub.progress.snapshot().stage,
            duration_ms = started.elapsed().as_millis() as u64,
            "Analysis request failed"
        );
    }
}

/// In-memory only: runs under the state lock so it happens exactly once per
/// completed submission and never after disposal.
fn credit_session(sub: &Submission) -> bool {
    match sub.session.credit_upload(Utc::now()) {
        Ok(stored) => {
            tracing::debug!(
                submission_id = %sub.id,
                reports_analyzed = stored.user.reports_analyzed,
                "Session upload recorded"
            );
            true
        }
        Err(SessionError::NotAuthenticated) => {
            tracing::debug!(submission_id = %sub.id, "No signed-in user to credit");
            false
        }
        Err(e) => {
            tracing::warn!(submission_id = %sub.id, error = %e, "Failed to credit session");
            false
        }
    }
}

/// Session storage is blocking I/O, so it runs off the runtime and after the
/// state lock is released.
async fn persist_session(sub: &Submission) {
    let session = sub.session.clone();
    let result = tokio::task::spawn_blocking(move || session.persist()).await;
    match result {
        Ok(Ok(_)) => tracing::debug!(submission_id = %sub.id, "Session persisted"),
        Ok(Err(SessionError::NotAuthenticated)) => {
            tracing::debug!(submission_id = %sub.id, "Signed out before session write");
        }
        Ok(Err(e)) => tracing::warn!(
            submission_id = %sub.id,
            error = %e,
            "Failed to persist session after analysis"
        ),
        Err(e) => tracing::warn!(submission_id = %sub.id, error = %e, "Session write task failed"),
    }
}
