use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the volumes of one batch.
pub struct BatchProgress {
    bar: ProgressBar,
    started: Instant,
}

impl BatchProgress {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(bar_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            started: Instant::now(),
        }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            started: Instant::now(),
        }
    }

    pub fn advance(&self, image: &str) {
        self.bar.set_message(image.to_string());
        self.bar.inc(1);
    }

    pub fn finish(&self, compared: usize, skipped: usize) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            (compared + skipped) as f64 / elapsed
        } else {
            0.0
        };
        let message = if skipped == 0 {
            format!("compared {compared} volumes @ {rate:.2}/s")
        } else {
            format!("compared {compared} volumes, skipped {skipped} @ {rate:.2}/s")
        };
        self.bar.finish_with_message(message);
    }

    pub fn abandon(&self, reason: &str) {
        self.bar.abandon_with_message(reason.to_string());
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{bar:40.cyan/blue} {percent:>3}% {pos}/{len} volumes [{elapsed_precise}<{eta_precise}] {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}
