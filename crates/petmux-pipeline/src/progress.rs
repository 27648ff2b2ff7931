//! Progress tracking and callbacks for pipeline stages.
//!
//! Stages report their start, each finished item and their completion to a
//! [`ProgressTracker`], which fans the events out to every registered
//! [`ProgressCallback`]. Items may finish on any worker thread.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::align::AlignmentStage;

/// Top-level stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Compliance,
    Reslice,
    Segmentation,
    Consolidation,
    CommonFov,
    Alignment,
    Evaluation,
    Multiplexing,
    DicomExport,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Compliance => "compliance check",
            Stage::Reslice => "anatomical reslicing",
            Stage::Segmentation => "segmentation",
            Stage::Consolidation => "consolidation",
            Stage::CommonFov => "common field of view",
            Stage::Alignment => "alignment",
            Stage::Evaluation => "label evaluation",
            Stage::Multiplexing => "multiplexing",
            Stage::DicomExport => "DICOM export",
        };
        f.write_str(name)
    }
}

/// One finished item of a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    pub stage: Stage,
    /// Acquisition id or file the item refers to.
    pub item: String,
    pub completed: usize,
    pub total: Option<usize>,
    pub elapsed: Duration,
}

impl ProgressInfo {
    pub fn progress_percent(&self) -> Option<f64> {
        self.total
            .filter(|&total| total > 0)
            .map(|total| (self.completed as f64 / total as f64) * 100.0)
    }
}

/// Receives pipeline progress events.
pub trait ProgressCallback: Send + Sync {
    fn on_stage_start(&self, _stage: Stage, _total: Option<usize>) {}

    fn on_item(&self, info: &ProgressInfo);

    /// A moving acquisition entered a new alignment state.
    fn on_alignment(&self, _moving: &str, _state: AlignmentStage) {}

    fn on_stage_complete(&self, _stage: Stage, _elapsed: Duration) {}

    fn on_error(&self, _stage: Stage, _error: &str) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_stage_start(&self, stage: Stage, total: Option<usize>) {
        match total {
            Some(total) => tracing::info!("Starting {stage} ({total} items)"),
            None => tracing::info!("Starting {stage}"),
        }
    }

    fn on_item(&self, info: &ProgressInfo) {
        tracing::info!(
            "{}: {} done ({}/{})",
            info.stage,
            info.item,
            info.completed,
            info.total.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string())
        );
    }

    fn on_alignment(&self, moving: &str, state: AlignmentStage) {
        tracing::debug!(moving, state = ?state, "Alignment state");
    }

    fn on_stage_complete(&self, stage: Stage, elapsed: Duration) {
        tracing::info!("Finished {stage} in {:.2}s", elapsed.as_secs_f64());
    }

    fn on_error(&self, stage: Stage, error: &str) {
        tracing::error!("{stage} failed: {error}");
    }
}

/// Recorded progress event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageStart(Stage),
    Item(ProgressInfo),
    Alignment(String, AlignmentStage),
    StageComplete(Stage),
    Error(Stage, String),
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<ProgressEvent> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Items reported for `stage`.
    pub fn items(&self, stage: Stage) -> Vec<String> {
        self.history()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Item(info) if info.stage == stage => Some(info.item),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ProgressEvent) {
        if let Ok(mut history) = self.history.lock() {
            history.push(event);
        }
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_stage_start(&self, stage: Stage, _total: Option<usize>) {
        self.push(ProgressEvent::StageStart(stage));
    }

    fn on_item(&self, info: &ProgressInfo) {
        self.push(ProgressEvent::Item(info.clone()));
    }

    fn on_alignment(&self, moving: &str, state: AlignmentStage) {
        self.push(ProgressEvent::Alignment(moving.to_string(), state));
    }

    fn on_stage_complete(&self, stage: Stage, _elapsed: Duration) {
        self.push(ProgressEvent::StageComplete(stage));
    }

    fn on_error(&self, stage: Stage, error: &str) {
        self.push(ProgressEvent::Error(stage, error.to_string()));
    }
}

/// Fans progress events out to registered callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.add_callback(callback);
        self
    }

    /// Begin a stage of `total` items.
    pub fn start(&self, stage: Stage, total: Option<usize>) -> StageProgress<'_> {
        for callback in &self.callbacks {
            callback.on_stage_start(stage, total);
        }
        StageProgress {
            tracker: self,
            stage,
            total,
            completed: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    pub fn alignment(&self, moving: &str, state: AlignmentStage) {
        for callback in &self.callbacks {
            callback.on_alignment(moving, state);
        }
    }

    pub fn error(&self, stage: Stage, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(stage, error);
        }
    }
}

/// Handle of a running stage; shared across the stage's workers.
pub struct StageProgress<'a> {
    tracker: &'a ProgressTracker,
    stage: Stage,
    total: Option<usize>,
    completed: AtomicUsize,
    started: Instant,
}

impl StageProgress<'_> {
    pub fn item(&self, item: impl Into<String>) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let info = ProgressInfo {
            stage: self.stage,
            item: item.into(),
            completed,
            total: self.total,
            elapsed: self.started.elapsed(),
        };
        for callback in &self.tracker.callbacks {
            callback.on_item(&info);
        }
    }

    /// Pass `result` through, reporting an error when it failed.
    pub fn check<T, E: fmt::Display>(&self, result: Result<T, E>) -> Result<T, E> {
        if let Err(err) = &result {
            self.tracker.error(self.stage, &err.to_string());
        }
        result
    }

    pub fn complete(self) {
        let elapsed = self.started.elapsed();
        for callback in &self.tracker.callbacks {
            callback.on_stage_complete(self.stage, elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_progress_percent() {
        let info = ProgressInfo {
            stage: Stage::Reslice,
            item: "FDG".to_string(),
            completed: 1,
            total: Some(4),
            elapsed: Duration::ZERO,
        };
        assert_eq!(info.progress_percent(), Some(25.0));
        assert_eq!(ProgressInfo { total: Some(0), ..info }.progress_percent(), None);
    }

    #[test]
    fn test_history_records_parallel_items() {
        let history = Arc::new(HistoryCallback::new());
        let tracker = ProgressTracker::new().with_callback(history.clone());

        let stage = tracker.start(Stage::Reslice, Some(8));
        (0..8).into_par_iter().for_each(|i| stage.item(format!("acq{i}")));
        stage.complete();

        let events = history.history();
        assert_eq!(events.first(), Some(&ProgressEvent::StageStart(Stage::Reslice)));
        assert_eq!(events.last(), Some(&ProgressEvent::StageComplete(Stage::Reslice)));
        assert_eq!(history.items(Stage::Reslice).len(), 8);

        let max_completed = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Item(info) => Some(info.completed),
                _ => None,
            })
            .max();
        assert_eq!(max_completed, Some(8));
    }

    #[test]
    fn test_check_reports_errors() {
        let history = Arc::new(HistoryCallback::new());
        let tracker = ProgressTracker::new().with_callback(history.clone());
        let stage = tracker.start(Stage::CommonFov, None);

        let failed: Result<(), String> = stage.check(Err("empty".to_string()));
        assert!(failed.is_err());
        assert!(history
            .history()
            .contains(&ProgressEvent::Error(Stage::CommonFov, "empty".to_string())));
    }
}
