//! Prediction correctors.
//!
//! When a running job reaches its predicted end without terminating, the
//! corrector produces the revised prediction. Corrector state is fed on
//! every termination by the scheduler scaffolding, and every revision is
//! kept within `(elapsed, user_estimated_run_time]` so the new prediction
//! both makes progress and respects the user bound.

use std::collections::HashMap;

use swfsim_core::{CorrectorConfig, CorrectorName, Job, Time};

/// Quantile used by the "ninetynine" corrector, fixed by the corrector's
/// name rather than estimated from data.
const NINETYNINE_QUANTILE: f64 = 0.99;

/// Empirical quantile estimator over `actual / user_estimated` ratios.
#[derive(Debug, Default)]
pub struct RatioQuantileEstimator {
    /// Observed ratios, kept sorted.
    ratios: Vec<f64>,
}

impl RatioQuantileEstimator {
    /// Records one completed job's ratio.
    pub fn fit(&mut self, ratio: f64) {
        let idx = self.ratios.partition_point(|r| *r < ratio);
        self.ratios.insert(idx, ratio);
    }

    /// The ratio at `quantile`, or `None` before any observation.
    pub fn quantile(&self, quantile: f64) -> Option<f64> {
        if self.ratios.is_empty() {
            return None;
        }
        let rank = (quantile * self.ratios.len() as f64).ceil() as usize;
        Some(self.ratios[rank.clamp(1, self.ratios.len()) - 1])
    }
}

/// The corrector variants, resolved from configuration at startup.
#[derive(Debug)]
pub enum Corrector {
    /// Jump straight to the user estimate.
    Reqtime,
    /// Two-prior per-user average when available, else the user estimate.
    Tsafrir {
        /// Last two actual run times per user.
        last_two: HashMap<i64, (Option<Time>, Option<Time>)>,
    },
    /// Over-threshold estimate from the run/estimate ratio distribution.
    Ninetynine(RatioQuantileEstimator),
}

impl Corrector {
    /// Builds the configured corrector.
    pub fn from_config(cfg: &CorrectorConfig) -> Self {
        match cfg.name {
            CorrectorName::Reqtime => Corrector::Reqtime,
            CorrectorName::Tsafrir => Corrector::Tsafrir { last_two: HashMap::new() },
            CorrectorName::Ninetynine => Corrector::Ninetynine(RatioQuantileEstimator::default()),
        }
    }

    /// Feeds the corrector one completed job.
    pub fn observe_termination(&mut self, job: &Job) {
        match self {
            Corrector::Reqtime => {}
            Corrector::Tsafrir { last_two } => {
                let entry = last_two.entry(job.user_id).or_default();
                entry.0 = entry.1;
                entry.1 = Some(job.actual_run_time);
            }
            Corrector::Ninetynine(estimator) => {
                if job.user_estimated_run_time > 0 {
                    estimator
                        .fit(job.actual_run_time as f64 / job.user_estimated_run_time as f64);
                }
            }
        }
    }

    /// Produces the revised prediction for an under-predicted job.
    pub fn correct(&self, job: &Job, now: Time) -> Time {
        let estimate = job.user_estimated_run_time;
        let elapsed = job.start_time.map_or(0, |s| now - s);
        let raw = match self {
            Corrector::Reqtime => estimate,
            Corrector::Tsafrir { last_two } => match last_two.get(&job.user_id) {
                Some((Some(prev), Some(last))) => (prev + last) / 2,
                _ => estimate,
            },
            Corrector::Ninetynine(estimator) => match estimator.quantile(NINETYNINE_QUANTILE) {
                Some(ratio) => (ratio * estimate as f64).ceil() as Time,
                None => estimate,
            },
        };
        raw.max(elapsed + 1).min(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrector(name: CorrectorName) -> Corrector {
        Corrector::from_config(&CorrectorConfig { name })
    }

    fn running_job(actual: Time, estimate: Time, start: Time) -> Job {
        let mut j = Job::new(1, 0, 2, actual, estimate, 5, 1, 1);
        j.start_time = Some(start);
        j
    }

    #[test]
    fn reqtime_jumps_to_the_estimate() {
        let c = corrector(CorrectorName::Reqtime);
        let job = running_job(400, 600, 0);
        assert_eq!(c.correct(&job, 100), 600);
    }

    #[test]
    fn tsafrir_uses_two_priors_with_progress_clamp() {
        let mut c = corrector(CorrectorName::Tsafrir);
        let job = running_job(400, 600, 0);
        // No history yet: behaves like reqtime.
        assert_eq!(c.correct(&job, 100), 600);

        c.observe_termination(&running_job(200, 600, 0));
        c.observe_termination(&running_job(300, 600, 0));
        // Average 250, and the job has only run 100s.
        assert_eq!(c.correct(&job, 100), 250);
        // At 300s elapsed the average is already behind; move past it.
        assert_eq!(c.correct(&job, 300), 301);
    }

    #[test]
    fn ninetynine_scales_the_estimate_by_the_ratio_quantile() {
        let mut c = corrector(CorrectorName::Ninetynine);
        for _ in 0..99 {
            c.observe_termination(&running_job(300, 600, 0));
        }
        c.observe_termination(&running_job(600, 600, 0));
        let job = running_job(500, 1000, 0);
        // 0.99-quantile of the ratios is 1.0 only at the very top rank.
        let corrected = c.correct(&job, 100);
        assert_eq!(corrected, 500); // ratio 0.5 * estimate 1000
    }

    #[test]
    fn quantile_ranks() {
        let mut e = RatioQuantileEstimator::default();
        assert_eq!(e.quantile(0.99), None);
        for r in [0.1, 0.2, 0.3, 0.4] {
            e.fit(r);
        }
        assert_eq!(e.quantile(0.99), Some(0.4));
        assert_eq!(e.quantile(0.5), Some(0.2));
    }
}
