//! Terminal progress bars for pipeline stages.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use petmux_pipeline::{ProgressCallback, Stage};
use petmux_pipeline::progress::ProgressInfo;

/// One bar per running stage.
#[derive(Default)]
pub struct BarProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgressCallback {
    pub fn new() -> Self {
        Self::default()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {prefix:>22} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }
}

impl ProgressCallback for BarProgressCallback {
    fn on_stage_start(&self, stage: Stage, total: Option<usize>) {
        let bar = match total {
            Some(total) => ProgressBar::new(total as u64).with_style(Self::style()),
            None => ProgressBar::new_spinner(),
        };
        bar.set_prefix(stage.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_item(&self, info: &ProgressInfo) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_message(info.item.clone());
                bar.set_position(info.completed as u64);
            }
        }
    }

    fn on_stage_complete(&self, stage: Stage, elapsed: Duration) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_with_message(format!("{stage} done in {:.1}s", elapsed.as_secs_f64()));
            }
        }
    }

    fn on_error(&self, stage: Stage, error: &str) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.abandon_with_message(format!("{stage} failed: {error}"));
            }
        }
    }
}
