//! Moment predictors over composite tags.
//!
//! Every tag keeps exponentially-decayed weighted moments
//! `(w_count, w_sum, w_sqsum)`; the prediction is
//! `avg + sigma_factor * stddev`, read from the most specific tag that has
//! data. Variance occasionally comes out slightly negative through
//! round-off and is clamped to zero with a warning.

use std::collections::HashMap;

use swfsim_core::{Job, PredictorConfig, Time};

use super::Tag;

/// Which tag family a moment predictor maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    /// Only the fully specific `(executable, user, req_time, req_procs)` tag.
    Exact,
    /// All 15 tags formed by blanking subsets of the components, most
    /// specific first; the empty tag is excluded.
    Complete,
}

#[derive(Debug, Clone, Copy, Default)]
struct MomentRecord {
    avg: f64,
    sqsum: f64,
    count: f64,
    sum: f64,
}

impl MomentRecord {
    fn variance(&self) -> f64 {
        debug_assert!(self.count > 1.0);
        let var = (self.sqsum - self.avg * self.sum) / (self.count - 1.0);
        if var < 0.0 {
            log::warn!("moment variance round-off below zero ({var}); clamping");
            return 0.0;
        }
        var
    }
}

/// The exact-tag / complete-tag moment predictor.
#[derive(Debug)]
pub struct MomentPredictor {
    mode: TagMode,
    records: HashMap<Tag, MomentRecord>,
    decay: f64,
    sigma_factor: Option<f64>,
    use_weights: bool,
}

impl MomentPredictor {
    /// Builds from predictor configuration (`decay` defaults to 0.2).
    pub fn new(mode: TagMode, cfg: &PredictorConfig) -> Self {
        Self {
            mode,
            records: HashMap::new(),
            decay: cfg.decay.unwrap_or(0.2),
            sigma_factor: cfg.sigma_factor,
            use_weights: cfg.use_weights.unwrap_or(false),
        }
    }

    /// Tags of `job`, most specific first.
    fn tags(&self, job: &Job) -> Vec<Tag> {
        let exact = Tag::exact(job);
        match self.mode {
            TagMode::Exact => vec![exact],
            TagMode::Complete => {
                let mut tags = Vec::with_capacity(15);
                // Blanking priority: processors vary fastest, executable
                // slowest, so specificity decreases monotonically.
                for mask in 0u8..15 {
                    tags.push(Tag {
                        executable: if mask & 0b1000 == 0 { exact.executable } else { None },
                        user: if mask & 0b0100 == 0 { exact.user } else { None },
                        req_time: if mask & 0b0010 == 0 { exact.req_time } else { None },
                        req_procs: if mask & 0b0001 == 0 { exact.req_procs } else { None },
                    });
                }
                tags
            }
        }
    }

    /// Proposes a run time from the most specific tag with data.
    pub fn predict(&self, job: &Job) -> Option<Time> {
        for tag in self.tags(job) {
            let Some(record) = self.records.get(&tag) else { continue };
            match self.sigma_factor {
                None => return Some(record.avg.round() as Time),
                Some(sigma) => {
                    if record.count > 1.0 {
                        let value = record.avg + sigma * record.variance().sqrt();
                        return Some(value.round() as Time);
                    }
                    // A single weighted point has no spread; try a coarser tag.
                }
            }
        }
        None
    }

    /// Folds the revealed run time into every tag of the job. Returns the
    /// updated `(avg, stddev)` of the most specific tag once it has more
    /// than one weighted point.
    pub fn fit(&mut self, job: &Job) -> Option<(f64, f64)> {
        let value = job.actual_run_time as f64;
        let alpha = self.decay;
        let point_weight = if self.use_weights { value } else { 1.0 };
        let mut result = None;
        for (i, tag) in self.tags(job).into_iter().enumerate() {
            let record = self.records.entry(tag).or_default();
            record.count = point_weight + (1.0 - alpha) * record.count;
            record.sum = value * point_weight + (1.0 - alpha) * record.sum;
            record.sqsum = value * value * point_weight + (1.0 - alpha) * record.sqsum;
            record.avg = record.sum / record.count;
            if i == 0 && record.count > 1.0 {
                result = Some((record.avg, record.variance().sqrt()));
            }
        }
        result
    }
}
