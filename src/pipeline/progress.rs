//! Simulated analysis progress.
//!
//! The backend gives no progress signal, so the stage indicator advances on a
//! fixed interval while the request is outstanding. Ticks stop one short of
//! the final stage; only `force_final()` reaches it, and `cancel()` stops
//! without reaching it.
//!
//! All writes go through `watch::Sender::send_if_modified`, which serializes
//! them. Once a run has left the `Ticking` phase every later tick is refused
//! under the same lock, so a tick already in flight cannot land after
//! `force_final()` or `cancel()`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Stage labels shown while a report is being analyzed.
pub const ANALYSIS_STAGES: [(&str, &str); 4] = [
    ("Extracting text from report", "OCR Processing"),
    ("Analyzing clinical data", "NLP Analysis"),
    ("Predicting diseases", "BioBERT Model"),
    ("Assessing health risks", "Risk Calculation"),
];

/// Fewer than two stages leaves no room between "ticking" and "final".
const MIN_STAGE_COUNT: usize = 2;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Idle,
    Ticking,
    Finalized,
    Cancelled,
}

/// What observers see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub stage: usize,
    pub stage_count: usize,
    pub phase: ProgressPhase,
}

impl ProgressSnapshot {
    fn idle() -> Self {
        Self {
            stage: 0,
            stage_count: ANALYSIS_STAGES.len(),
            phase: ProgressPhase::Idle,
        }
    }

    /// Highest stage reachable by ticking alone.
    pub fn tick_ceiling(&self) -> usize {
        self.stage_count.saturating_sub(2)
    }

    pub fn final_stage(&self) -> usize {
        self.stage_count.saturating_sub(1)
    }

    /// Share of the bar to fill, in 0.0..=1.0.
    pub fn fraction(&self) -> f64 {
        if self.stage_count == 0 {
            return 0.0;
        }
        ((self.stage + 1) as f64 / self.stage_count as f64).min(1.0)
    }

    /// Label for the current stage, when it is one of the named analysis stages.
    pub fn label(&self) -> Option<(&'static str, &'static str)> {
        if self.stage_count == ANALYSIS_STAGES.len() {
            ANALYSIS_STAGES.get(self.stage).copied()
        } else {
            None
        }
    }
}

struct TickerRun {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

// ═══════════════════════════════════════════════════════════
// ProgressSimulator
// ═══════════════════════════════════════════════════════════

/// Cancellable stage ticker, independent of the real request.
pub struct ProgressSimulator {
    interval: Duration,
    tx: Arc<watch::Sender<ProgressSnapshot>>,
    run: Mutex<Option<TickerRun>>,
}

impl ProgressSimulator {
    pub fn new(interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot::idle());
        Self {
            interval,
            tx: Arc::new(tx),
            run: Mutex::new(None),
        }
    }

    /// Observe stage changes.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.tx.borrow()
    }

    /// Begin a new run at stage 0. Any previous run is stopped first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, stage_count: usize) {
        let stage_count = stage_count.max(MIN_STAGE_COUNT);
        self.stop_ticker();

        self.tx.send_modify(|s| {
            *s = ProgressSnapshot {
                stage: 0,
                stage_count,
                phase: ProgressPhase::Ticking,
            };
        });

        let token = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(self.tx.clone(), self.interval, token.clone()));

        if let Ok(mut run) = self.run.lock() {
            *run = Some(TickerRun { token, handle });
        } else {
            token.cancel();
        }
    }

    /// Jump to the final stage and stop ticking. No-op unless ticking.
    pub fn force_final(&self) {
        self.stop_ticker();
        self.tx.send_if_modified(|s| {
            if s.phase != ProgressPhase::Ticking {
                return false;
            }
            s.stage = s.final_stage();
            s.phase = ProgressPhase::Finalized;
            true
        });
    }

    /// Stop ticking and keep the current stage. No-op unless ticking.
    pub fn cancel(&self) {
        self.stop_ticker();
        self.tx.send_if_modified(|s| {
            if s.phase != ProgressPhase::Ticking {
                return false;
            }
            s.phase = ProgressPhase::Cancelled;
            true
        });
    }

    pub fn is_ticking(&self) -> bool {
        self.tx.borrow().phase == ProgressPhase::Ticking
    }

    fn stop_ticker(&self) {
        let run = match self.run.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(run) = run {
            run.token.cancel();
            run.handle.abort();
        }
    }
}

impl Drop for ProgressSimulator {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

async fn tick_loop(
    tx: Arc<watch::Sender<ProgressSnapshot>>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // Consume initial immediate tick

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let mut at_ceiling = false;
                tx.send_if_modified(|s| {
                    if token.is_cancelled() || s.phase != ProgressPhase::Ticking {
                        at_ceiling = true;
                        return false;
                    }
                    if s.stage >= s.tick_ceiling() {
                        at_ceiling = true;
                        return false;
                    }
                    s.stage += 1;
                    at_ceiling = s.stage >= s.tick_ceiling();
                    true
                });
                if at_ceiling {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn ticks_stop_one_short_of_final() {
        let sim = ProgressSimulator::new(TICK);
        sim.start(4);
        assert_eq!(sim.snapshot().stage, 0);

        tokio::time::sleep(TICK * 10).await;
        let snap = sim.snapshot();
        assert_eq!(snap.stage, 2);
        assert_eq!(snap.phase, ProgressPhase::Ticking);
    }

    #[tokio::test(start_paused = true)]
    async fn stage_sequence_is_monotonic_and_final_once() {
        let sim = ProgressSimulator::new(TICK);
        let mut rx = sim.subscribe();

        sim.start(4);
        let mut seen = vec![rx.borrow_and_update().stage];
        while seen.last() != Some(&2) {
            rx.changed().await.unwrap();
            seen.push(rx.borrow_and_update().stage);
        }

        sim.force_final();
        rx.changed().await.unwrap();
        seen.push(rx.borrow_and_update().stage);

        tokio::time::sleep(TICK * 5).await;
        sim.force_final();
        sim.cancel();
        assert!(!rx.has_changed().unwrap());

        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(sim.snapshot().phase, ProgressPhase::Finalized);
    }

    #[tokio::test(start_paused = true)]
    async fn force_final_mid_run_jumps_to_last_stage() {
        let sim = ProgressSimulator::new(TICK);
        sim.start(5);
        tokio::time::sleep(TICK + Duration::from_millis(10)).await;
        assert_eq!(sim.snapshot().stage, 1);

        sim.force_final();
        assert_eq!(sim.snapshot().stage, 4);

        tokio::time::sleep(TICK * 10).await;
        assert_eq!(sim.snapshot().stage, 4);
        assert!(!sim.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_freezes_stage() {
        let sim = ProgressSimulator::new(TICK);
        sim.start(4);
        tokio::time::sleep(TICK + Duration::from_millis(10)).await;
        sim.cancel();

        let frozen = sim.snapshot();
        assert_eq!(frozen.stage, 1);
        assert_eq!(frozen.phase, ProgressPhase::Cancelled);

        tokio::time::sleep(TICK * 10).await;
        assert_eq!(sim.snapshot(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn force_final_after_cancel_is_ignored() {
        let sim = ProgressSimulator::new(TICK);
        sim.start(4);
        sim.cancel();
        sim.force_final();
        let snap = sim.snapshot();
        assert_eq!(snap.stage, 0);
        assert_eq!(snap.phase, ProgressPhase::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resets_to_zero() {
        let sim = ProgressSimulator::new(TICK);
        sim.start(4);
        tokio::time::sleep(TICK * 3).await;
        sim.force_final();

        sim.start(4);
        let snap = sim.snapshot();
        assert_eq!(snap.stage, 0);
        assert_eq!(snap.phase, ProgressPhase::Ticking);
    }

    #[tokio::test(start_paused = true)]
    async fn tiny_stage_counts_are_clamped() {
        let sim = ProgressSimulator::new(TICK);
        sim.start(0);
        assert_eq!(sim.snapshot().stage_count, 2);
        tokio::time::sleep(TICK * 3).await;
        assert_eq!(sim.snapshot().stage, 0);
        sim.force_final();
        assert_eq!(sim.snapshot().stage, 1);
    }

    #[test]
    fn snapshot_fraction_and_labels() {
        let snap = ProgressSnapshot {
            stage: 1,
            stage_count: 4,
            phase: ProgressPhase::Ticking,
        };
        assert_eq!(snap.fraction(), 0.5);
        assert_eq!(snap.label(), Some(("Analyzing clinical data", "NLP Analysis")));

        let other = ProgressSnapshot { stage_count: 7, ..snap };
        assert_eq!(other.label(), None);
    }

    #[test]
    fn new_simulator_is_idle() {
        let sim = ProgressSimulator::new(TICK);
        assert_eq!(sim.snapshot().phase, ProgressPhase::Idle);
        assert!(!sim.is_ticking());
    }
}
