use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Trait for reporting pipeline progress
/// This allows different interfaces (CLI, GUI) to implement their own progress display
/// and to request cooperative cancellation.
pub trait ProgressReporter: Send + Sync {
    /// Announce the phase and the number of work units, if known
    fn begin_task(&self, phase: &str, total: Option<usize>);

    /// Describe the unit of work about to start
    fn sub_task(&self, _label: &str) {}

    /// Update the number of completed units
    fn worked(&self, completed: usize);

    /// Queried before every unit of work
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Report that the pipeline has stopped, finished or cancelled
    fn done(&self) {}
}

/// Shared cancellation request
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A no-op progress reporter for when progress reporting is not needed
#[derive(Debug, Clone, Default)]
pub struct NoOpProgressReporter {
    cancel: CancelFlag,
}

impl NoOpProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter that honours the given cancellation flag
    pub fn with_cancel_flag(cancel: CancelFlag) -> Self {
        Self { cancel }
    }
}

impl ProgressReporter for NoOpProgressReporter {
    fn begin_task(&self, _phase: &str, _total: Option<usize>) {}
    fn worked(&self, _completed: usize) {}

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Console-based progress reporter using indicatif
#[cfg(feature = "cli")]
pub struct ConsoleProgressReporter {
    progress_bar: indicatif::ProgressBar,
    cancel: CancelFlag,
}

#[cfg(feature = "cli")]
impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new(CancelFlag::new())
    }
}

#[cfg(feature = "cli")]
impl ConsoleProgressReporter {
    pub fn new(cancel: CancelFlag) -> Self {
        let progress_bar = indicatif::ProgressBar::new_spinner();
        progress_bar.enable_steady_tick(std::time::Duration::from_millis(120));

        Self {
            progress_bar,
            cancel,
        }
    }

    /// Hide the bar while `f` talks to the terminal
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.progress_bar.suspend(f)
    }
}

#[cfg(feature = "cli")]
impl ProgressReporter for ConsoleProgressReporter {
    fn begin_task(&self, phase: &str, total: Option<usize>) {
        match total {
            Some(total) => {
                self.progress_bar.set_length(total as u64);
                if let Ok(style) = indicatif::ProgressStyle::default_bar().template(
                    "{spinner:.green} [{elapsed_precise}] {prefix} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                ) {
                    self.progress_bar.set_style(style.progress_chars("#>-"));
                }
            }
            None => {
                if let Ok(style) = indicatif::ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {prefix} {pos} {msg}")
                {
                    self.progress_bar.set_style(style);
                }
            }
        }
        self.progress_bar.set_prefix(phase.to_string());
        self.progress_bar.set_position(0);
    }

    fn sub_task(&self, label: &str) {
        self.progress_bar.set_message(label.to_string());
    }

    fn worked(&self, completed: usize) {
        self.progress_bar.set_position(completed as u64);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn done(&self) {
        if self.cancel.is_cancelled() {
            self.progress_bar.abandon_with_message("cancelled");
        } else {
            self.progress_bar.finish_with_message("done");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let reporter = NoOpProgressReporter::with_cancel_flag(flag.clone());
        assert!(!reporter.is_cancelled());
        flag.cancel();
        assert!(reporter.is_cancelled());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_console_reporter_follows_cancel_flag() {
        let flag = CancelFlag::new();
        let reporter = ConsoleProgressReporter::new(flag.clone());
        reporter.begin_task("Renaming images", Some(3));
        reporter.worked(1);
        assert!(!reporter.is_cancelled());

        flag.cancel();
        assert!(reporter.is_cancelled());
        reporter.done();
    }
}
