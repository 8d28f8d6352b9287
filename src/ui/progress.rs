use crate::pipeline::BatchProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Resolution of the batch bar; fractions are mapped onto `0..=BATCH_STEPS`.
const BATCH_STEPS: u64 = 1000;

pub struct ProgressManager {
    multi_progress: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            enabled,
        }
    }

    pub fn create_batch_progress(&self, archives: usize) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new(BATCH_STEPS));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {wide_msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_message(format!("Preparing {} archive(s)...", archives));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn suspend<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if self.enabled {
            self.multi_progress.suspend(f)
        } else {
            f()
        }
    }

    pub fn clear(&self) {
        if self.enabled {
            self.multi_progress.clear().ok();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new(true)
    }
}

pub fn update_batch_progress(pb: &ProgressBar, progress: &BatchProgress) {
    let position = (progress.fraction.clamp(0.0, 1.0) * BATCH_STEPS as f64).round() as u64;
    // Never move backwards.
    if position > pb.position() {
        pb.set_position(position);
    }
    pb.set_message(progress.text.clone());
}

pub fn finish_progress_with_summary(pb: &ProgressBar, message: &str, duration: Duration) {
    let final_message = format!("{} (completed in {})", message, format_duration(duration));
    pb.finish_with_message(final_message);
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_manager_creation() {
        let manager = ProgressManager::new(true);
        assert!(manager.is_enabled());

        let disabled_manager = ProgressManager::new(false);
        assert!(!disabled_manager.is_enabled());
    }

    #[test]
    fn test_disabled_progress_bars() {
        let manager = ProgressManager::new(false);
        let pb = manager.create_batch_progress(3);
        assert!(pb.is_hidden());
    }

    #[test]
    fn test_batch_progress_updates() {
        let pb = ProgressBar::hidden();
        pb.set_length(BATCH_STEPS);

        update_batch_progress(
            &pb,
            &BatchProgress {
                fraction: 0.45,
                text: "lib.jar: Foo.class".to_string(),
            },
        );
        assert_eq!(pb.position(), 450);
        assert_eq!(pb.message(), "lib.jar: Foo.class");

        update_batch_progress(
            &pb,
            &BatchProgress {
                fraction: 0.2,
                text: "late".to_string(),
            },
        );
        assert_eq!(pb.position(), 450);

        update_batch_progress(
            &pb,
            &BatchProgress {
                fraction: 1.5,
                text: "done".to_string(),
            },
        );
        assert_eq!(pb.position(), BATCH_STEPS);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "61m 1s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
    }
}
