//! Progress reporting seam.
//!
//! The orchestrator reports per-unit lifecycle events through
//! [`ProgressReporter`]; nothing in core logic consumes a return value
//! from it. The default console implementation renders one spinner per
//! in-flight unit; tests substitute [`RecordingReporter`] and assert on
//! the captured events.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Side-effecting sink for deployment lifecycle events.
pub trait ProgressReporter: Send + Sync {
    fn begin(&self, task_id: &str, text: &str);
    fn succeed(&self, task_id: &str, text: &str);
    fn fail(&self, task_id: &str, text: &str);
}

/// A cloneable, type-erased reporter handle.
pub type DynReporter = Arc<dyn ProgressReporter>;

// ---------------------------------------------------------------------------
// Console reporter
// ---------------------------------------------------------------------------

/// Spinner-per-task console reporter.
pub struct ConsoleReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn finish(&self, task_id: &str, prefix: &str, text: &str) {
        let bar = self.bars.lock().unwrap().remove(task_id);
        match bar {
            Some(bar) => bar.finish_with_message(format!("{prefix} {text}")),
            None => {
                // Completion without a begin still gets printed.
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.finish_with_message(format!("{prefix} {text}"));
            }
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleReporter {
    fn begin(&self, task_id: &str, text: &str) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template("{spinner:.white} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(text.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        self.bars.lock().unwrap().insert(task_id.to_string(), bar);
    }

    fn succeed(&self, task_id: &str, text: &str) {
        self.finish(task_id, "🟢", text);
    }

    fn fail(&self, task_id: &str, text: &str) {
        self.finish(task_id, "🔴", text);
    }
}

// ---------------------------------------------------------------------------
// Silent and recording reporters
// ---------------------------------------------------------------------------

/// Reporter that drops every event. Used when running non-interactively.
#[derive(Debug, Default, Clone)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn begin(&self, _task_id: &str, _text: &str) {}
    fn succeed(&self, _task_id: &str, _text: &str) {}
    fn fail(&self, _task_id: &str, _text: &str) {}
}

/// A recorded lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Begin { task_id: String, text: String },
    Succeed { task_id: String, text: String },
    Fail { task_id: String, text: String },
}

/// Reporter that records events for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of recorded failure events.
    pub fn failure_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, ProgressEvent::Fail { .. }))
            .count()
    }
}

impl ProgressReporter for RecordingReporter {
    fn begin(&self, task_id: &str, text: &str) {
        self.events.lock().unwrap().push(ProgressEvent::Begin {
            task_id: task_id.to_string(),
            text: text.to_string(),
        });
    }

    fn succeed(&self, task_id: &str, text: &str) {
        self.events.lock().unwrap().push(ProgressEvent::Succeed {
            task_id: task_id.to_string(),
            text: text.to_string(),
        });
    }

    fn fail(&self, task_id: &str, text: &str) {
        self.events.lock().unwrap().push(ProgressEvent::Fail {
            task_id: task_id.to_string(),
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_reporter_captures_order() {
        let reporter = RecordingReporter::new();
        reporter.begin("amazon-endpoint_hello", "deploying");
        reporter.fail("amazon-endpoint_hello", "boom");

        let events = reporter.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ProgressEvent::Begin { .. }));
        assert_eq!(reporter.failure_count(), 1);
    }
}
