//! Upload progress simulator.
//!
//! Neither the upload request nor server-side parsing reports fine-grained
//! progress, so each selected file gets a fabricated progress value:
//!
//! 1. While the request is in flight, progress approaches a ceiling below 100
//!    with a decaying step (fast at first, slower near the ceiling).
//! 2. Once the request resolves, a linear closeout drives it to 100 over a
//!    short fixed duration.
//! 3. After a grace delay at 100 the task leaves the active set and joins the
//!    background-processing set until the real bill shows up.
//!
//! All timing is a function of the `Instant` passed to [`UploadSimulator::tick`];
//! nothing runs on its own. Stopping a task means no longer advancing it.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::ApiError;
use crate::config::SimulatorConfig;
use crate::models::BillRecord;

/// Distance kept from the ceiling while simulating.
const HOLD_MARGIN: f64 = 0.1;

pub const FINALIZING_LABEL: &str = "Finalizing…";
pub const DONE_LABEL: &str = "Done";
pub const WAITING_LABEL: &str = "Waiting to upload";

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadPhase {
    Selected,
    Uploading,
    Simulating,
    Finalizing,
    Done,
    Failed,
}

/// One in-flight file upload/parse cycle.
#[derive(Debug, Clone, Serialize)]
pub struct UploadTask {
    pub id: Uuid,
    pub file_name: String,
    pub progress: f64,
    pub current_step_index: usize,
    pub phase: UploadPhase,
    #[serde(skip)]
    last_step_at: Option<Instant>,
    #[serde(skip)]
    closeout: Option<Closeout>,
}

#[derive(Debug, Clone, Copy)]
struct Closeout {
    from: f64,
    started_at: Instant,
}

/// A finished simulation waiting for the server to confirm the parsed bill.
#[derive(Debug, Clone, Serialize)]
pub struct BackgroundTask {
    pub id: Uuid,
    pub file_name: String,
    pub completed_at: DateTime<Utc>,
}

/// Handed out by `start`; consumed by `finish` so a task closes out once.
#[derive(Debug)]
#[must_use = "the upload never closes out unless the token is passed to finish()"]
pub struct FinishToken {
    id: Uuid,
}

impl FinishToken {
    pub fn task_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum UploadEvent {
    Progress {
        id: Uuid,
        progress: f64,
        step_index: usize,
        label: String,
    },
    Completed { id: Uuid, file_name: String },
    Failed { id: Uuid, file_name: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum UploadError {
    #[error("Upload task not found: {0}")]
    NotFound(Uuid),

    #[error("Upload task already active: {0}")]
    AlreadyActive(Uuid),

    #[error("Cannot {action} upload task {id} in phase {phase:?}")]
    InvalidTransition {
        id: Uuid,
        phase: UploadPhase,
        action: &'static str,
    },
}

// ═══════════════════════════════════════════════════════════
// Simulator
// ═══════════════════════════════════════════════════════════

/// Registry of active upload simulations, keyed by task id.
pub struct UploadSimulator<R: Rng = StdRng> {
    config: SimulatorConfig,
    tasks: Vec<UploadTask>,
    background: Vec<BackgroundTask>,
    rng: R,
}

impl UploadSimulator<StdRng> {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> UploadSimulator<R> {
    pub fn with_rng(config: SimulatorConfig, rng: R) -> Self {
        Self {
            config,
            tasks: Vec::new(),
            background: Vec::new(),
            rng,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Active tasks in selection order.
    pub fn active(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn background(&self) -> &[BackgroundTask] {
        &self.background
    }

    pub fn get(&self, id: Uuid) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Register a newly selected file.
    pub fn select(&mut self, file_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tasks.push(UploadTask {
            id,
            file_name: file_name.to_string(),
            progress: 0.0,
            current_step_index: 0,
            phase: UploadPhase::Selected,
            last_step_at: None,
            closeout: None,
        });
        tracing::debug!(task_id = %id, "Upload task selected");
        id
    }

    /// The user pressed upload.
    pub fn submit(&mut self, id: Uuid) -> Result<(), UploadError> {
        let task = self.task_mut(id)?;
        match task.phase {
            UploadPhase::Selected => {
                task.phase = UploadPhase::Uploading;
                Ok(())
            }
            phase => Err(UploadError::InvalidTransition {
                id,
                phase,
                action: "submit",
            }),
        }
    }

    /// Begin decaying growth; the request is now in flight.
    pub fn start(&mut self, id: Uuid, now: Instant) -> Result<FinishToken, UploadError> {
        let task = self.task_mut(id)?;
        match task.phase {
            UploadPhase::Selected | UploadPhase::Uploading => {
                task.phase = UploadPhase::Simulating;
                task.last_step_at = Some(now);
                tracing::info!(task_id = %id, "Upload simulation started");
                Ok(FinishToken { id })
            }
            UploadPhase::Simulating | UploadPhase::Finalizing => Err(UploadError::AlreadyActive(id)),
            phase => Err(UploadError::InvalidTransition {
                id,
                phase,
                action: "start",
            }),
        }
    }

    /// The real request resolved: switch to the linear closeout.
    pub fn finish(&mut self, token: FinishToken, now: Instant) -> Result<(), UploadError> {
        let ceiling = self.config.ceiling;
        let task = self.task_mut(token.id)?;
        if task.phase != UploadPhase::Simulating {
            return Err(UploadError::InvalidTransition {
                id: token.id,
                phase: task.phase,
                action: "finish",
            });
        }
        let from = task.progress.max(ceiling).min(100.0);
        task.progress = from;
        task.phase = UploadPhase::Finalizing;
        task.last_step_at = None;
        task.closeout = Some(Closeout {
            from,
            started_at: now,
        });
        tracing::info!(task_id = %token.id, "Upload resolved, finalizing");
        Ok(())
    }

    /// The request was rejected: evict the task without closing out.
    pub fn fail(&mut self, id: Uuid) -> Result<UploadTask, UploadError> {
        let pos = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(UploadError::NotFound(id))?;
        let mut task = self.tasks.remove(pos);
        task.phase = UploadPhase::Failed;
        tracing::warn!(task_id = %id, "Upload failed, task evicted");
        Ok(task)
    }

    /// Advance every task to `now`. This is the only place progress moves.
    pub fn tick(&mut self, now: Instant) -> Vec<UploadEvent> {
        let mut events = Vec::new();
        let mut completed = Vec::new();

        for i in 0..self.tasks.len() {
            match self.tasks[i].phase {
                UploadPhase::Simulating => {
                    if self.advance_decay(i, now) {
                        events.push(self.progress_event(i));
                    }
                }
                UploadPhase::Finalizing => {
                    let before = self.tasks[i].progress;
                    let done_at = self.advance_closeout(i, now);
                    if self.tasks[i].progress > before {
                        events.push(self.progress_event(i));
                    }
                    if done_at.is_some_and(|at| now >= at + self.config.grace_delay) {
                        completed.push(self.tasks[i].id);
                    }
                }
                _ => {}
            }
        }

        for id in completed {
            if let Some(pos) = self.tasks.iter().position(|t| t.id == id) {
                let mut task = self.tasks.remove(pos);
                task.phase = UploadPhase::Done;
                tracing::info!(task_id = %id, "Upload simulation done, moved to background");
                self.background.push(BackgroundTask {
                    id,
                    file_name: task.file_name.clone(),
                    completed_at: Utc::now(),
                });
                events.push(UploadEvent::Completed {
                    id,
                    file_name: task.file_name,
                });
            }
        }
        events
    }

    /// Human-readable stage for a task.
    pub fn step_label(&self, id: Uuid) -> Option<&str> {
        self.get(id).map(|task| self.label_for(task))
    }

    /// Drop background entries whose bill has arrived in the reconciled list.
    /// Returns how many were settled.
    pub fn settle_background(&mut self, bills: &[BillRecord]) -> usize {
        let before = self.background.len();
        self.background
            .retain(|task| !bills.iter().any(|bill| bill.file_name == task.file_name));
        before - self.background.len()
    }

    /// Component teardown: forget every active task.
    pub fn teardown(&mut self) {
        if !self.tasks.is_empty() {
            tracing::debug!(count = self.tasks.len(), "Clearing active upload simulations");
        }
        self.tasks.clear();
    }

    // ── internals ───────────────────────────────────────────

    fn task_mut(&mut self, id: Uuid) -> Result<&mut UploadTask, UploadError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(UploadError::NotFound(id))
    }

    fn label_for(&self, task: &UploadTask) -> &str {
        match task.phase {
            UploadPhase::Selected => WAITING_LABEL,
            UploadPhase::Finalizing if task.progress >= 100.0 => DONE_LABEL,
            UploadPhase::Finalizing => FINALIZING_LABEL,
            UploadPhase::Done => DONE_LABEL,
            _ => self
                .config
                .stages
                .get(task.current_step_index)
                .map(String::as_str)
                .unwrap_or(WAITING_LABEL),
        }
    }

    fn progress_event(&self, i: usize) -> UploadEvent {
        let task = &self.tasks[i];
        UploadEvent::Progress {
            id: task.id,
            progress: task.progress,
            step_index: task.current_step_index,
            label: self.label_for(task).to_string(),
        }
    }

    /// Apply every decay step that fell due since the last sample.
    fn advance_decay(&mut self, i: usize, now: Instant) -> bool {
        let interval = self.config.tick_interval.max(Duration::from_millis(1));
        let Some(last) = self.tasks[i].last_step_at else {
            return false;
        };
        let elapsed = now.saturating_duration_since(last);
        let steps = (elapsed.as_nanos() / interval.as_nanos()).min(u128::from(u32::MAX)) as u32;
        if steps == 0 {
            return false;
        }

        let mut progress = self.tasks[i].progress;
        for _ in 0..steps {
            progress = self.decay_step(progress);
        }

        let task = &mut self.tasks[i];
        task.progress = task.progress.max(progress);
        task.last_step_at = Some(last + interval * steps);
        task.current_step_index = step_index(task.progress, self.config.stages.len());
        true
    }

    fn decay_step(&mut self, progress: f64) -> f64 {
        let limit = (self.config.ceiling - HOLD_MARGIN).max(0.0);
        let gap = (self.config.ceiling - progress).max(0.0);
        let jitter = if self.config.jitter_max > 0.0 {
            self.rng.gen_range(0.0..self.config.jitter_max)
        } else {
            0.0
        };
        let delta = (gap * self.config.decay_factor).max(self.config.min_step) + jitter;
        (progress + delta).min(limit).max(progress)
    }

    /// Linear closeout. Returns when the task reached 100, if it has.
    fn advance_closeout(&mut self, i: usize, now: Instant) -> Option<Instant> {
        let duration = self.config.finalize_duration;
        let task = &mut self.tasks[i];
        let closeout = task.closeout?;
        let elapsed = now.saturating_duration_since(closeout.started_at);
        let fraction = if duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0)
        };
        let progress = closeout.from + (100.0 - closeout.from) * fraction;
        task.progress = task.progress.max(progress).min(100.0);
        (task.progress >= 100.0).then(|| closeout.started_at + duration)
    }
}

/// Stage index for a progress value: `floor(progress/100 * count)`, clamped.
pub fn step_index(progress: f64, stage_count: usize) -> usize {
    if stage_count == 0 {
        return 0;
    }
    let raw = ((progress / 100.0) * stage_count as f64).floor().max(0.0) as usize;
    raw.min(stage_count - 1)
}

// ═══════════════════════════════════════════════════════════
// Driver
// ═══════════════════════════════════════════════════════════

/// Run a blocking upload call while ticking the simulator.
///
/// The call runs on the blocking pool. Every tick's events are forwarded to
/// `events`. On success the task closes out and the driver keeps ticking until
/// it has moved to the background set; on failure the task is evicted and the
/// error returned.
pub async fn drive_upload<T, F>(
    simulator: Arc<Mutex<UploadSimulator>>,
    task_id: Uuid,
    upload: F,
    events: mpsc::UnboundedSender<UploadEvent>,
) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    let (token, interval) = {
        let mut sim = lock(&simulator)?;
        if sim.get(task_id).is_some_and(|t| t.phase == UploadPhase::Selected) {
            sim.submit(task_id).map_err(simulation_error)?;
        }
        let token = sim.start(task_id, Instant::now()).map_err(simulation_error)?;
        (token, sim.config().tick_interval.max(Duration::from_millis(1)))
    };

    let mut ticker = tokio::time::interval(interval);
    let mut call = tokio::task::spawn_blocking(upload);

    let outcome = loop {
        tokio::select! {
            joined = &mut call => {
                break joined.unwrap_or_else(|e| Err(ApiError::Transport(format!("upload task aborted: {e}"))));
            }
            _ = ticker.tick() => {
                forward(&simulator, &events)?;
            }
        }
    };

    match outcome {
        Ok(value) => {
            {
                let mut sim = lock(&simulator)?;
                if sim.get(task_id).is_none() {
                    tracing::debug!(task_id = %task_id, "Upload finished after teardown, skipping closeout");
                    return Ok(value);
                }
                sim.finish(token, Instant::now()).map_err(simulation_error)?;
            }
            loop {
                ticker.tick().await;
                let done = forward(&simulator, &events)?;
                if done.contains(&task_id) || lock(&simulator)?.get(task_id).is_none() {
                    break;
                }
            }
            Ok(value)
        }
        Err(e) => {
            if let Ok(task) = lock(&simulator)?.fail(task_id) {
                let _ = events.send(UploadEvent::Failed {
                    id: task.id,
                    file_name: task.file_name,
                });
            }
            Err(e)
        }
    }
}

/// Tick once and forward events; returns ids that completed on this tick.
fn forward(
    simulator: &Mutex<UploadSimulator>,
    events: &mpsc::UnboundedSender<UploadEvent>,
) -> Result<Vec<Uuid>, ApiError> {
    let ticked = lock(simulator)?.tick(Instant::now());
    let mut completed = Vec::new();
    for event in ticked {
        if let UploadEvent::Completed { id, .. } = &event {
            completed.push(*id);
        }
        let _ = events.send(event);
    }
    Ok(completed)
}

fn lock(simulator: &Mutex<UploadSimulator>) -> Result<std::sync::MutexGuard<'_, UploadSimulator>, ApiError> {
    simulator
        .lock()
        .map_err(|_| ApiError::Transport("upload simulator lock poisoned".into()))
}

fn simulation_error(e: UploadError) -> ApiError {
    ApiError::Transport(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(config: SimulatorConfig) -> UploadSimulator {
        UploadSimulator::with_rng(config, StdRng::seed_from_u64(7))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn lifecycle_phases() {
        let mut sim = seeded(SimulatorConfig::default());
        let id = sim.select("bill.pdf");
        assert_eq!(sim.get(id).unwrap().phase, UploadPhase::Selected);
        sim.submit(id).unwrap();
        assert_eq!(sim.get(id).unwrap().phase, UploadPhase::Uploading);
        let t0 = Instant::now();
        let token = sim.start(id, t0).unwrap();
        assert_eq!(sim.get(id).unwrap().phase, UploadPhase::Simulating);
        sim.finish(token, t0 + ms(400)).unwrap();
        assert_eq!(sim.get(id).unwrap().phase, UploadPhase::Finalizing);
    }

    #[test]
    fn progress_is_monotonic_and_below_ceiling() {
        let config = SimulatorConfig::default();
        let ceiling = config.ceiling;
        let interval = config.tick_interval;
        let mut sim = seeded(config);
        let id = sim.select("bill.pdf");
        let t0 = Instant::now();
        let _token = sim.start(id, t0).unwrap();

        let mut last = 0.0;
        for step in 1..=2_000u32 {
            sim.tick(t0 + interval * step);
            let p = sim.get(id).unwrap().progress;
            assert!(p >= last, "progress went backwards: {last} -> {p}");
            assert!(p < ceiling, "progress reached ceiling before finish: {p}");
            last = p;
        }
        assert!(last > 90.0, "progress should approach the ceiling, got {last}");
    }

    #[test]
    fn early_growth_faster_than_late_growth() {
        let config = SimulatorConfig {
            jitter_max: 0.0,
            ..SimulatorConfig::default()
        };
        let interval = config.tick_interval;
        let mut sim = seeded(config);
        let id = sim.select("bill.pdf");
        let t0 = Instant::now();
        let _token = sim.start(id, t0).unwrap();

        sim.tick(t0 + interval);
        let first = sim.get(id).unwrap().progress;
        sim.tick(t0 + interval * 100);
        let before = sim.get(id).unwrap().progress;
        sim.tick(t0 + interval * 101);
        let late = sim.get(id).unwrap().progress - before;
        assert!(first > late);
    }

    #[test]
    fn sub_interval_ticks_do_not_advance() {
        let mut sim = seeded(SimulatorConfig::default());
        let id = sim.select("bill.pdf");
        let t0 = Instant::now();
        let _token = sim.start(id, t0).unwrap();
        assert!(sim.tick(t0 + ms(100)).is_empty());
        assert_eq!(sim.get(id).unwrap().progress, 0.0);
    }

    #[test]
    fn step_label_tracks_progress() {
        assert_eq!(step_index(0.0, 6), 0);
        assert_eq!(step_index(50.0, 6), 3);
        assert_eq!(step_index(98.9, 6), 5);
        assert_eq!(step_index(100.0, 6), 5);
        assert_eq!(step_index(10.0, 0), 0);
    }

    #[test]
    fn upload_scenario_runs_to_background() {
        let config = SimulatorConfig::default();
        let stages = config.stages.clone();
        let interval = config.tick_interval;
        let mut sim = seeded(config);
        let id = sim.select("er-visit.pdf");
        let t0 = Instant::now();
        let token = sim.start(id, t0).unwrap();

        let t1 = t0 + interval * 20;
        sim.tick(t1);
        let task = sim.get(id).unwrap();
        assert!(task.progress > 0.0 && task.progress < 99.0);
        let label = sim.step_label(id).unwrap();
        assert!(stages.iter().any(|s| s == label));

        sim.finish(token, t1).unwrap();
        assert_eq!(sim.step_label(id), Some(FINALIZING_LABEL));
        sim.tick(t1 + ms(400));
        let mid = sim.get(id).unwrap().progress;
        assert!(mid > 99.0 && mid < 100.0);

        sim.tick(t1 + ms(800));
        assert_eq!(sim.get(id).unwrap().progress, 100.0);
        assert_eq!(sim.step_label(id), Some(DONE_LABEL));

        let events = sim.tick(t1 + ms(1_400));
        assert!(events
            .iter()
            .any(|e| matches!(e, UploadEvent::Completed { id: done, .. } if *done == id)));
        assert!(sim.get(id).is_none());
        assert_eq!(sim.background().len(), 1);
        assert_eq!(sim.background()[0].file_name, "er-visit.pdf");
    }

    #[test]
    fn progress_never_exceeds_hundred() {
        let config = SimulatorConfig::default();
        let mut sim = seeded(config);
        let id = sim.select("a.pdf");
        let t0 = Instant::now();
        let token = sim.start(id, t0).unwrap();
        sim.finish(token, t0).unwrap();
        for n in 0..50 {
            sim.tick(t0 + ms(n * 50));
            if let Some(task) = sim.get(id) {
                assert!(task.progress <= 100.0);
            }
        }
    }

    #[test]
    fn failure_evicts_without_finalizing() {
        let mut sim = seeded(SimulatorConfig::default());
        let id = sim.select("bad.pdf");
        let t0 = Instant::now();
        let token = sim.start(id, t0).unwrap();
        let failed = sim.fail(id).unwrap();
        assert_eq!(failed.phase, UploadPhase::Failed);
        assert!(sim.active().is_empty());
        assert_eq!(sim.finish(token, t0), Err(UploadError::NotFound(id)));
        assert!(sim.background().is_empty());
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut sim = seeded(SimulatorConfig::default());
        let id = sim.select("a.pdf");
        let t0 = Instant::now();
        let _token = sim.start(id, t0).unwrap();
        assert_eq!(sim.start(id, t0).unwrap_err(), UploadError::AlreadyActive(id));
    }

    #[test]
    fn tasks_advance_independently() {
        let config = SimulatorConfig::default();
        let interval = config.tick_interval;
        let mut sim = seeded(config);
        let a = sim.select("a.pdf");
        let b = sim.select("b.pdf");
        let t0 = Instant::now();
        let _ta = sim.start(a, t0).unwrap();
        let _tb = sim.start(b, t0 + interval * 10).unwrap();
        sim.tick(t0 + interval * 10);
        assert!(sim.get(a).unwrap().progress > 0.0);
        assert_eq!(sim.get(b).unwrap().progress, 0.0);
    }

    #[test]
    fn teardown_clears_active_tasks() {
        let mut sim = seeded(SimulatorConfig::default());
        let id = sim.select("a.pdf");
        let _token = sim.start(id, Instant::now()).unwrap();
        sim.select("b.pdf");
        sim.teardown();
        assert!(sim.active().is_empty());
    }

    #[test]
    fn background_settles_when_bill_arrives() {
        let config = SimulatorConfig {
            finalize_duration: Duration::ZERO,
            grace_delay: Duration::ZERO,
            ..SimulatorConfig::default()
        };
        let mut sim = seeded(config);
        let id = sim.select("er-visit.pdf");
        let t0 = Instant::now();
        let token = sim.start(id, t0).unwrap();
        sim.finish(token, t0).unwrap();
        sim.tick(t0);
        assert_eq!(sim.background().len(), 1);

        let bill: BillRecord = serde_json::from_value(serde_json::json!({
            "id": "b1", "fileName": "other.pdf", "status": "parsing"
        }))
        .unwrap();
        assert_eq!(sim.settle_background(&[bill.clone()]), 0);

        let matching = BillRecord {
            file_name: "er-visit.pdf".into(),
            ..bill
        };
        assert_eq!(sim.settle_background(&[matching]), 1);
        assert!(sim.background().is_empty());
    }

    fn fast_config() -> SimulatorConfig {
        SimulatorConfig {
            tick_interval: ms(5),
            finalize_duration: ms(20),
            grace_delay: ms(10),
            ..SimulatorConfig::default()
        }
    }

    #[tokio::test]
    async fn driver_completes_successful_upload() {
        let simulator = Arc::new(Mutex::new(UploadSimulator::new(fast_config())));
        let id = simulator.lock().unwrap().select("bill.pdf");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = drive_upload(
            simulator.clone(),
            id,
            || {
                std::thread::sleep(Duration::from_millis(40));
                Ok::<_, ApiError>("uploaded")
            },
            tx,
        )
        .await
        .unwrap();
        assert_eq!(result, "uploaded");

        let mut saw_progress = false;
        let mut saw_completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                UploadEvent::Progress { progress, .. } => {
                    assert!(progress <= 100.0);
                    saw_progress = true;
                }
                UploadEvent::Completed { id: done, .. } => saw_completed = done == id,
                UploadEvent::Failed { .. } => panic!("unexpected failure"),
            }
        }
        assert!(saw_progress && saw_completed);
        let sim = simulator.lock().unwrap();
        assert!(sim.active().is_empty());
        assert_eq!(sim.background().len(), 1);
    }

    #[tokio::test]
    async fn driver_evicts_on_rejection() {
        let simulator = Arc::new(Mutex::new(UploadSimulator::new(fast_config())));
        let id = simulator.lock().unwrap().select("bill.pdf");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = drive_upload::<(), _>(
            simulator.clone(),
            id,
            || Err(ApiError::Status {
                status: 500,
                message: "boom".into(),
            }),
            tx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));

        let mut saw_failed = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, UploadEvent::Failed { id: failed, .. } if failed == id) {
                saw_failed = true;
            }
        }
        assert!(saw_failed);
        let sim = simulator.lock().unwrap();
        assert!(sim.active().is_empty());
        assert!(sim.background().is_empty());
    }

    #[tokio::test]
    async fn driver_keeps_success_when_torn_down_mid_upload() {
        let simulator = Arc::new(Mutex::new(UploadSimulator::new(fast_config())));
        let id = simulator.lock().unwrap().select("bill.pdf");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let shared = simulator.clone();
        let result = drive_upload(
            simulator.clone(),
            id,
            move || {
                shared.lock().unwrap().teardown();
                Ok::<_, ApiError>("stored")
            },
            tx,
        )
        .await
        .unwrap();
        assert_eq!(result, "stored");

        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, UploadEvent::Failed { .. }));
        }
        assert!(simulator.lock().unwrap().active().is_empty());
    }
}
