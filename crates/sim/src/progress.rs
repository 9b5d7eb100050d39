use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use swfsim_engine::Notice;

/// Progress reporting for one simulation: a terminal bar tracking completed
/// jobs, plus optional periodic log lines for non-interactive runs.
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
    report_every: Option<Duration>,
    last_report: Instant,
}

impl ProgressReporter {
    pub fn new(total_jobs: u64, show_bar: bool, report_every: Option<Duration>) -> Self {
        Self {
            bar: show_bar.then(|| ProgressBar::new(total_jobs)),
            report_every,
            last_report: Instant::now(),
        }
    }

    pub fn observe(&mut self, notice: &Notice) {
        let Notice::JobFinished { time, completed, total, .. } = notice else {
            return;
        };
        if let Some(bar) = &self.bar {
            bar.set_position(*completed as u64);
        }
        if let Some(every) = self.report_every {
            if self.last_report.elapsed() >= every {
                self.last_report = Instant::now();
                log::info!(
                    "progress: {completed}/{total} jobs completed, simulated time {time}"
                );
            }
        }
    }

    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
