//! Progress accounting for file transfers.

use std::time::{Duration, Instant};

use tracing::info;

use super::Direction;

/// Format bytes in human-readable form.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Cumulative byte count against the declared size of one transfer.
///
/// Counting always happens; reporting only when `verbose` is set, and then
/// at most once per `interval`.
#[derive(Debug)]
pub struct TransferProgress {
    name: String,
    direction: Direction,
    total: u64,
    current: u64,
    verbose: bool,
    started: Instant,
    last_report: Instant,
    interval: Duration,
}

impl TransferProgress {
    pub fn new(name: impl Into<String>, direction: Direction, total: u64, verbose: bool) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            direction,
            total,
            current: 0,
            verbose,
            started: now,
            last_report: now,
            interval: Duration::from_millis(100),
        }
    }

    /// Add bytes to current progress.
    pub fn advance(&mut self, bytes: u64) {
        self.current += bytes;
        if self.verbose && self.last_report.elapsed() >= self.interval {
            self.report();
            self.last_report = Instant::now();
        }
    }

    pub fn transferred(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Completion in percent. An empty file is complete from the start.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.current as f64 / self.total as f64) * 100.0
        }
    }

    /// Emit the final line (verbose mode only).
    pub fn finish(&self) {
        if self.verbose {
            let secs = self.started.elapsed().as_secs_f64().max(0.001);
            info!(
                file = %self.name,
                direction = %self.direction,
                bytes = self.current,
                rate = %format!("{}/s", format_bytes((self.current as f64 / secs) as u64)),
                "transfer complete"
            );
        }
    }

    fn report(&self) {
        info!(
            file = %self.name,
            direction = %self.direction,
            progress = %format!(
                "{} / {} ({:.1}%)",
                format_bytes(self.current),
                format_bytes(self.total),
                self.percent()
            ),
            "transfer in progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_progress_counts_without_verbose() {
        let mut progress = TransferProgress::new("a.bin", Direction::Send, 200, false);
        progress.advance(50);
        progress.advance(50);
        assert_eq!(progress.transferred(), 100);
        assert!((progress.percent() - 50.0).abs() < f64::EPSILON);
        progress.finish();
    }

    #[test]
    fn test_progress_empty_file() {
        let progress = TransferProgress::new("empty", Direction::Receive, 0, true);
        assert_eq!(progress.percent(), 100.0);
        assert_eq!(progress.total(), 0);
    }
}
