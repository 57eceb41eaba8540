use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ledgeriolib::task::{Progress, TaskId, TaskObserver, TaskState};
use parking_lot::Mutex;

/// Рисует по бару на каждую задачу в stderr.
pub struct ProgressObserver {
    multi: MultiProgress,
    bars: Mutex<HashMap<TaskId, ProgressBar>>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix} {wide_bar:.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }
}

impl TaskObserver for ProgressObserver {
    fn on_started(&self, id: TaskId, description: &str) {
        let bar = self.multi.add(ProgressBar::new(100));
        bar.set_style(Self::bar_style());
        bar.set_prefix(description.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bars.lock().insert(id, bar);
    }

    fn on_progress(&self, id: TaskId, progress: &Progress) {
        if let Some(bar) = self.bars.lock().get(&id) {
            if let Some(percent) = progress.percent {
                bar.set_position(u64::from(percent));
            }
            bar.set_message(progress.message.clone());
        }
    }

    fn on_finished(&self, id: TaskId, state: TaskState) {
        if let Some(bar) = self.bars.lock().remove(&id) {
            match state {
                TaskState::Completed => bar.finish_and_clear(),
                TaskState::Cancelled => bar.abandon_with_message("cancelled"),
                _ => bar.abandon_with_message("failed"),
            }
        }
    }
}
