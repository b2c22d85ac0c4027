use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

/// Thread-safe progress counter for batch fits
///
/// Every [ProgressTracker::inc] reports the completed fraction to a callback and, when
/// enabled, advances an [indicatif] progress bar. Progress is also logged at every 5%.
pub struct ProgressTracker<'a> {
    counter: Arc<AtomicUsize>,
    total: usize,
    start_time: Instant,
    bar: Option<ProgressBar>,
    callback: &'a (dyn Fn(f64) + Sync),
}

impl<'a> ProgressTracker<'a> {
    pub fn new(total: usize, show_bar: bool, callback: &'a (dyn Fn(f64) + Sync)) -> Self {
        let bar = show_bar.then(|| {
            let style = ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} residues (ETA {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            ProgressBar::new(total as u64).with_style(style)
        });
        Self {
            counter: Arc::new(AtomicUsize::new(0)),
            total,
            start_time: Instant::now(),
            bar,
            callback,
        }
    }

    /// Count `n` finished items
    pub fn inc(&self, n: usize) {
        let before = self.counter.fetch_add(n, Ordering::Relaxed);
        let current = before + n;
        if let Some(bar) = &self.bar {
            bar.inc(n as u64);
        }
        if self.total == 0 {
            return;
        }
        (self.callback)(current as f64 / self.total as f64);

        // Log each time a 5% step is crossed
        if (current * 20) / self.total > (before * 20) / self.total {
            let percent = (current * 100) / self.total;
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let remaining = elapsed * (self.total as f64) / (current as f64) - elapsed;
            tracing::info!(
                done = current,
                total = self.total,
                "Progress {}%, ETA {}",
                percent,
                format_duration(remaining.max(0.0))
            );
        }
    }

    pub fn done(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        tracing::info!(
            done = self.done(),
            total = self.total,
            "Batch finished in {}",
            format_duration(self.start_time.elapsed().as_secs_f64())
        );
    }
}

fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
