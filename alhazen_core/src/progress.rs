//! Progress Reporter - completed-participant counter with an optional bar.

use indicatif::{ProgressBar, ProgressStyle};

/// Counts completed participants out of `participants × conditions`.
///
/// The count only moves forward. When disabled no bar is created and
/// nothing is drawn.
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
    completed: u64,
    total: u64,
}

impl ProgressReporter {
    /// Creates a reporter for `total` participants.
    pub fn new(total: u64, enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} participants ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });

        Self {
            bar,
            completed: 0,
            total,
        }
    }

    /// A reporter that never draws.
    pub fn disabled() -> Self {
        Self::new(0, false)
    }

    pub fn is_enabled(&self) -> bool {
        self.bar.is_some()
    }

    /// Records one finished participant.
    pub fn advance(&mut self) {
        self.completed += 1;
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Leaves the bar at its final position.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }

    /// Stops drawing without completing the bar (failed run).
    pub fn abandon(&self) {
        if let Some(bar) = &self.bar {
            bar.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_reporter_counts_silently() {
        let mut progress = ProgressReporter::new(12, false);
        assert!(!progress.is_enabled());

        for _ in 0..12 {
            progress.advance();
        }
        progress.finish();

        assert_eq!(progress.completed(), 12);
        assert_eq!(progress.total(), 12);
    }

    #[test]
    fn test_enabled_reporter_tracks_bar() {
        let mut progress = ProgressReporter::new(3, true);
        assert!(progress.is_enabled());

        progress.advance();
        progress.advance();
        assert_eq!(progress.completed(), 2);
        assert_eq!(progress.bar.as_ref().map(|b| b.position()), Some(2));
        progress.abandon();
    }
}
