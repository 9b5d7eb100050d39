//! Quantile predictors.
//!
//! Per tag, a weighted ordered multiset of observed run times, seeded with
//! one artificial point at the user estimate. Weights decay by `1 - alpha`
//! with every new observation; the prediction is the smallest value with at
//! least `confidence` of the total weight at or below it.
//!
//! [`TopPercentPredictor`] decays lazily (each point carries the count at
//! which its weight was last refreshed); [`ConditionalPercentPredictor`]
//! decays eagerly and additionally restricts the quantile search to the
//! tail above a running job's elapsed time.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

use swfsim_core::{Job, PredictorConfig, Time};

use super::Tag;

const DEFAULT_ALPHA: f64 = 0.1;
const DEFAULT_START_WEIGHT: f64 = 0.1;
const DEFAULT_CONFIDENCE: f64 = 0.97;

#[derive(Debug, Clone, Copy)]
struct QuantileOptions {
    /// Multiplier applied to every existing weight per new point (`1 - alpha`).
    decay: f64,
    start_weight: f64,
    confidence: f64,
    use_weights: bool,
}

impl QuantileOptions {
    fn from_config(cfg: &PredictorConfig) -> Self {
        Self {
            decay: 1.0 - cfg.alpha.unwrap_or(DEFAULT_ALPHA),
            start_weight: cfg.start_weight.unwrap_or(DEFAULT_START_WEIGHT),
            confidence: cfg.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            use_weights: cfg.use_weights.unwrap_or(true),
        }
    }

    fn point_weight(&self, value: Time) -> f64 {
        if self.use_weights { value as f64 } else { 1.0 }
    }
}

/// One tag's distribution with a tracked threshold position.
#[derive(Debug)]
struct ThresholdRecord {
    /// value -> (weight, count at which the weight was last refreshed).
    points: BTreeMap<Time, (f64, u64)>,
    count: u64,
    threshold_value: Time,
    over_weight: f64,
    under_weight: f64,
}

impl ThresholdRecord {
    fn new(start_value: Time, opts: &QuantileOptions) -> Self {
        let seed_weight = if opts.use_weights {
            opts.start_weight * start_value as f64
        } else {
            opts.start_weight
        };
        let mut points = BTreeMap::new();
        points.insert(start_value, (seed_weight, 0));
        Self {
            points,
            count: 0,
            threshold_value: start_value,
            over_weight: 0.0,
            under_weight: 1.0,
        }
    }

    fn refreshed_weight(&mut self, value: Time, decay: f64) -> f64 {
        let (weight, stamp) = self.points[&value];
        let fresh = weight * decay.powi((self.count - stamp) as i32);
        self.points.insert(value, (fresh, self.count));
        fresh
    }

    fn next_value(&self, value: Time) -> Option<Time> {
        self.points
            .range((Excluded(value), Unbounded))
            .next()
            .map(|(&v, _)| v)
    }

    fn prev_value(&self, value: Time) -> Option<Time> {
        self.points
            .range((Unbounded, Excluded(value)))
            .next_back()
            .map(|(&v, _)| v)
    }

    fn max_value(&self) -> Time {
        *self.points.keys().next_back().expect("record is never empty")
    }

    fn min_value(&self) -> Time {
        *self.points.keys().next().expect("record is never empty")
    }

    fn add(&mut self, value: Time, opts: &QuantileOptions) {
        let decay = opts.decay;
        let point_weight = opts.point_weight(value);
        let new_weight = match self.points.get(&value) {
            Some(&(weight, stamp)) => {
                point_weight + weight * decay.powi((self.count - stamp) as i32)
            }
            None => point_weight,
        };
        self.points.insert(value, (new_weight, self.count));
        self.over_weight *= decay;
        self.under_weight *= decay;

        if value > self.threshold_value {
            self.over_weight += point_weight;
            while self.under_weight / (self.under_weight + self.over_weight) <= opts.confidence {
                let Some(next) = self.next_value(self.threshold_value) else { break };
                self.threshold_value = next;
                let weight = self.refreshed_weight(next, decay);
                self.under_weight += weight;
                self.over_weight -= weight;
                if self.threshold_value == self.max_value() {
                    // Nothing is above the top point; reset accumulated error.
                    self.over_weight = 0.0;
                }
            }
        } else {
            self.under_weight += point_weight;
            if value < self.threshold_value {
                let mut weight = self.refreshed_weight(self.threshold_value, decay);
                while (self.under_weight - weight) / (self.under_weight + self.over_weight)
                    > opts.confidence
                {
                    let Some(prev) = self.prev_value(self.threshold_value) else { break };
                    self.under_weight -= weight;
                    self.over_weight += weight;
                    self.threshold_value = prev;
                    weight = self.refreshed_weight(prev, decay);
                    if self.threshold_value == self.min_value() {
                        self.under_weight = weight;
                        break;
                    }
                }
            }
        }
        self.count += 1;
    }
}

/// The top-percent quantile predictor.
#[derive(Debug)]
pub struct TopPercentPredictor {
    records: HashMap<Tag, ThresholdRecord>,
    opts: QuantileOptions,
}

impl TopPercentPredictor {
    /// Builds from predictor configuration.
    pub fn new(cfg: &PredictorConfig) -> Self {
        Self {
            records: HashMap::new(),
            opts: QuantileOptions::from_config(cfg),
        }
    }

    /// The tracked quantile for the job's tag, if any run completed with it.
    pub fn predict(&self, job: &Job) -> Option<Time> {
        self.records
            .get(&Tag::exact(job))
            .map(|r| r.threshold_value)
    }

    /// Inserts the revealed run time. Returns the updated prediction.
    pub fn fit(&mut self, job: &Job) -> Option<(f64, f64)> {
        let opts = self.opts;
        let record = self
            .records
            .entry(Tag::exact(job))
            .or_insert_with(|| ThresholdRecord::new(job.user_estimated_run_time, &opts));
        record.add(job.actual_run_time, &opts);
        Some((record.threshold_value as f64, 0.0))
    }
}

/// One tag's distribution with eager decay, for conditional prediction.
#[derive(Debug)]
struct SurvivalRecord {
    points: BTreeMap<Time, f64>,
    total_weight: f64,
}

impl SurvivalRecord {
    fn new(start_value: Time, opts: &QuantileOptions) -> Self {
        let seed_weight = if opts.use_weights {
            opts.start_weight * start_value as f64
        } else {
            opts.start_weight
        };
        let mut points = BTreeMap::new();
        points.insert(start_value, seed_weight);
        Self { points, total_weight: seed_weight }
    }

    fn add(&mut self, value: Time, opts: &QuantileOptions) {
        for weight in self.points.values_mut() {
            *weight *= opts.decay;
        }
        let point_weight = opts.point_weight(value);
        *self.points.entry(value).or_insert(0.0) += point_weight;
        self.total_weight = opts.decay * self.total_weight + point_weight;
    }

    /// The smallest recorded value above the threshold mass, searching only
    /// past `time_already_running`. `None` means the caller should fall
    /// back to the default.
    fn predict(&self, time_already_running: Time, confidence: f64) -> Option<Time> {
        let items: Vec<(Time, f64)> = self.points.iter().map(|(&t, &w)| (t, w)).collect();
        let last_index = items.len() - 1;
        let mut index = items.partition_point(|&(t, _)| t <= time_already_running);
        let threshold_weight = confidence * self.total_weight;
        let mut weight_sum = 0.0;
        while index < last_index {
            weight_sum += items[index].1;
            if weight_sum > threshold_weight {
                return Some(items[index + 1].0);
            }
            index += 1;
        }
        None
    }
}

/// The conditional top-percent predictor.
#[derive(Debug)]
pub struct ConditionalPercentPredictor {
    records: HashMap<Tag, SurvivalRecord>,
    opts: QuantileOptions,
}

impl ConditionalPercentPredictor {
    /// Builds from predictor configuration.
    pub fn new(cfg: &PredictorConfig) -> Self {
        Self {
            records: HashMap::new(),
            opts: QuantileOptions::from_config(cfg),
        }
    }

    /// Predicts conditioned on how long the job has already been running
    /// (zero for queued jobs).
    pub fn predict(&self, job: &Job, now: Time) -> Option<Time> {
        let record = self.records.get(&Tag::exact(job))?;
        let time_running = job.start_time.map_or(0, |s| now - s);
        record.predict(time_running, self.opts.confidence)
    }

    /// Inserts the revealed run time.
    pub fn fit(&mut self, job: &Job) {
        let opts = self.opts;
        let record = self
            .records
            .entry(Tag::exact(job))
            .or_insert_with(|| SurvivalRecord::new(job.user_estimated_run_time, &opts));
        record.add(job.actual_run_time, &opts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swfsim_core::PredictorName;

    fn cfg() -> PredictorConfig {
        PredictorConfig {
            name: PredictorName::TopPercent,
            predict_multiplier: None,
            alpha: Some(0.1),
            start_weight: Some(0.1),
            confidence: Some(0.97),
            use_weights: Some(true),
            sigma_factor: None,
            decay: None,
        }
    }

    fn job(actual: Time, estimate: Time) -> Job {
        Job::new(1, 0, 4, actual, estimate, 3, 1, 9)
    }

    #[test]
    fn unknown_tag_has_no_prediction() {
        let p = TopPercentPredictor::new(&cfg());
        assert_eq!(p.predict(&job(100, 1000)), None);
    }

    #[test]
    fn seed_point_dominates_at_first() {
        let mut p = TopPercentPredictor::new(&cfg());
        p.fit(&job(100, 1000));
        // One real observation cannot yet outweigh 97% confidence against
        // the seeded estimate.
        assert_eq!(p.predict(&job(100, 1000)), Some(1000));
    }

    #[test]
    fn distribution_collapses_onto_the_observed_value() {
        let mut p = TopPercentPredictor::new(&cfg());
        for _ in 0..100 {
            p.fit(&job(100, 1000));
        }
        // The artificial 1000-point has decayed below the 97% threshold.
        assert_eq!(p.predict(&job(100, 1000)), Some(100));
    }

    #[test]
    fn threshold_climbs_toward_long_observations() {
        let mut p = TopPercentPredictor::new(&cfg());
        for _ in 0..100 {
            p.fit(&job(900, 1000));
        }
        assert_eq!(p.predict(&job(900, 1000)), Some(900));
    }

    #[test]
    fn conditional_search_skips_the_elapsed_prefix() {
        let mut p = ConditionalPercentPredictor::new(&cfg());
        for _ in 0..100 {
            p.fit(&job(100, 1000));
        }
        for _ in 0..10 {
            p.fit(&job(500, 1000));
        }
        // Queued job: prediction considers the whole distribution.
        let queued = job(100, 1000);
        let all = p.predict(&queued, 0);
        assert!(all.is_some());

        // A job that already ran 200s can only end at a later point.
        let mut running = job(100, 1000);
        running.start_time = Some(0);
        let conditional = p.predict(&running, 200);
        assert!(conditional.is_none() || conditional.unwrap() > 200);
    }

    #[test]
    fn conditional_with_no_tail_falls_back() {
        let mut p = ConditionalPercentPredictor::new(&cfg());
        p.fit(&job(100, 1000));
        let mut running = job(100, 1000);
        running.start_time = Some(0);
        // Elapsed beyond every recorded point except the maximum.
        assert_eq!(p.predict(&running, 999), None);
    }
}
