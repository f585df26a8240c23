//! Progress reporting module

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner on stderr counting written sentences
pub struct ProgressReporter {
    progress_bar: Option<ProgressBar>,
}

impl ProgressReporter {
    /// Create a reporter; a disabled reporter draws nothing
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self { progress_bar: None };
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner} [{elapsed_precise}] {pos} sentences {msg}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            progress_bar: Some(pb),
        }
    }

    /// Whether anything is drawn
    pub fn is_enabled(&self) -> bool {
        self.progress_bar.is_some()
    }

    /// Report the number of sentences written so far
    pub fn update(&self, sentences: u64) {
        if let Some(pb) = &self.progress_bar {
            pb.set_position(sentences);
        }
    }

    /// Finish progress reporting
    pub fn finish(&self, failed: u64) {
        if let Some(pb) = &self.progress_bar {
            if failed > 0 {
                pb.finish_with_message(format!("done, {failed} failed"));
            } else {
                pb.finish_with_message("done");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_reporter_is_inert() {
        let reporter = ProgressReporter::new(false);
        assert!(!reporter.is_enabled());
        reporter.update(10);
        reporter.finish(0);
    }

    #[test]
    fn test_enabled_reporter_tracks_position() {
        let reporter = ProgressReporter::new(true);
        reporter.update(3);
        assert_eq!(reporter.progress_bar.as_ref().map(|pb| pb.position()), Some(3));
        reporter.finish(1);
    }
}
