//! Run-time predictors.
//!
//! A predictor proposes a run time for a job (`predict`) and learns from
//! revealed run times (`fit`). A predictor may decline to predict; the
//! scheduler scaffolding is the single place that falls back to the user
//! estimate, so every variant here simply returns `None` when it has
//! nothing to say.

mod moments;
mod top_percent;

use std::collections::HashMap;

use swfsim_core::{Job, PredictorConfig, PredictorName, Time};

pub use moments::{MomentPredictor, TagMode};
pub use top_percent::{ConditionalPercentPredictor, TopPercentPredictor};

/// Composite prediction context: `(executable, user, requested time,
/// requested processors)`, with `None` marking a blanked component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    /// Executable identifier, or blank.
    pub executable: Option<i64>,
    /// User identifier, or blank.
    pub user: Option<i64>,
    /// User-estimated run time, or blank.
    pub req_time: Option<Time>,
    /// Requested processor count, or blank.
    pub req_procs: Option<u32>,
}

impl Tag {
    /// The fully specific tag of a job.
    pub fn exact(job: &Job) -> Self {
        Self {
            executable: Some(job.executable_id),
            user: Some(job.user_id),
            req_time: Some(job.user_estimated_run_time),
            req_procs: Some(job.num_required_processors),
        }
    }
}

/// The predictor variants, resolved from configuration at startup.
#[derive(Debug)]
pub enum Predictor {
    /// `predicted = actual * multiplier` (stress scenarios).
    Clairvoyant {
        /// Multiplier, `>= 1`.
        multiplier: f64,
    },
    /// `predicted = user_estimated_run_time`.
    Reqtime,
    /// Per-user average of the two most recent run times.
    Tsafrir(TsafrirPredictor),
    /// Decayed weighted moments over exact or blanked tags.
    Moments(MomentPredictor),
    /// Weighted run-time quantile.
    TopPercent(TopPercentPredictor),
    /// Quantile conditioned on the time a job has already run.
    ConditionalPercent(ConditionalPercentPredictor),
}

impl Predictor {
    /// Builds the configured predictor.
    pub fn from_config(cfg: &PredictorConfig) -> Self {
        match cfg.name {
            PredictorName::Clairvoyant => Predictor::Clairvoyant {
                multiplier: cfg.predict_multiplier.unwrap_or(1.0),
            },
            PredictorName::Reqtime => Predictor::Reqtime,
            PredictorName::Tsafrir => Predictor::Tsafrir(TsafrirPredictor::default()),
            PredictorName::Exact => {
                Predictor::Moments(MomentPredictor::new(TagMode::Exact, cfg))
            }
            PredictorName::Complete => {
                Predictor::Moments(MomentPredictor::new(TagMode::Complete, cfg))
            }
            PredictorName::TopPercent => {
                Predictor::TopPercent(TopPercentPredictor::new(cfg))
            }
            PredictorName::ConditionalPercent => {
                Predictor::ConditionalPercent(ConditionalPercentPredictor::new(cfg))
            }
        }
    }

    /// Proposes a run time for the job, or `None` when the predictor has no
    /// data for it.
    pub fn predict(&mut self, job: &Job, now: Time) -> Option<Time> {
        match self {
            Predictor::Clairvoyant { multiplier } => {
                Some((job.actual_run_time as f64 * *multiplier).round() as Time)
            }
            Predictor::Reqtime => Some(job.user_estimated_run_time),
            Predictor::Tsafrir(p) => p.predict(job),
            Predictor::Moments(p) => p.predict(job),
            Predictor::TopPercent(p) => p.predict(job),
            Predictor::ConditionalPercent(p) => p.predict(job, now),
        }
    }

    /// Learns from the job's revealed run time. Returns the updated
    /// `(prediction, error)` estimate where the variant computes one.
    pub fn fit(&mut self, job: &Job, now: Time) -> Option<(f64, f64)> {
        let _ = now;
        match self {
            Predictor::Clairvoyant { .. } | Predictor::Reqtime => None,
            Predictor::Tsafrir(p) => {
                p.fit(job);
                None
            }
            Predictor::Moments(p) => p.fit(job),
            Predictor::TopPercent(p) => p.fit(job),
            Predictor::ConditionalPercent(p) => {
                p.fit(job);
                None
            }
        }
    }
}

/// The Tsafrir two-prior predictor: the average of a user's two most recent
/// actual run times, once two are known.
#[derive(Debug, Default)]
pub struct TsafrirPredictor {
    last_two: HashMap<i64, (Option<Time>, Option<Time>)>,
}

impl TsafrirPredictor {
    fn predict(&self, job: &Job) -> Option<Time> {
        let (prev, last) = self.last_two.get(&job.user_id)?;
        match (prev, last) {
            (Some(p), Some(l)) => Some((p + l) / 2),
            _ => None,
        }
    }

    fn fit(&mut self, job: &Job) {
        let entry = self.last_two.entry(job.user_id).or_default();
        entry.0 = entry.1;
        entry.1 = Some(job.actual_run_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swfsim_core::Job;

    fn job(user: i64, actual: Time, estimate: Time) -> Job {
        Job::new(1, 0, 2, actual, estimate, user, 1, 7)
    }

    #[test]
    fn clairvoyant_scales_ground_truth() {
        let mut p = Predictor::Clairvoyant { multiplier: 1.5 };
        assert_eq!(p.predict(&job(1, 100, 1000), 0), Some(150));
    }

    #[test]
    fn reqtime_returns_the_estimate() {
        let mut p = Predictor::Reqtime;
        assert_eq!(p.predict(&job(1, 100, 1000), 0), Some(1000));
    }

    #[test]
    fn tsafrir_needs_two_priors() {
        let mut p = Predictor::Tsafrir(TsafrirPredictor::default());
        assert_eq!(p.predict(&job(5, 80, 1000), 0), None);
        p.fit(&job(5, 100, 1000), 0);
        assert_eq!(p.predict(&job(5, 80, 1000), 0), None);
        p.fit(&job(5, 200, 1000), 0);
        assert_eq!(p.predict(&job(5, 80, 1000), 0), Some(150));
        // A different user has no history.
        assert_eq!(p.predict(&job(6, 80, 1000), 0), None);
    }
}
