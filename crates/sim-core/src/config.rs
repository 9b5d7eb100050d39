//! Simulation configuration.
//!
//! The descriptor is a JSON document. Unknown keys are rejected rather than
//! silently ignored, and options that do not apply to the selected
//! scheduler are configuration errors, caught before any event is
//! processed.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors constructing a usable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Could not read the descriptor file.
    #[error("reading config {path}: {source}")]
    Io {
        /// Descriptor path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Malformed JSON, unknown key, or unknown scheduler/predictor/
    /// corrector/sorter/objective name.
    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),
    /// An option that the selected scheduler does not understand.
    #[error("option '{option}' does not apply to scheduler '{scheduler}'")]
    OptionNotApplicable {
        /// The offending key.
        option: &'static str,
        /// The configured scheduler name.
        scheduler: &'static str,
    },
    /// A required path is missing.
    #[error("missing required path: {0}")]
    MissingPath(&'static str),
    /// A value outside its documented range.
    #[error("option '{option}' {reason}")]
    InvalidValue {
        /// The offending key.
        option: &'static str,
        /// Why the value is rejected.
        reason: &'static str,
    },
}

/// Queue ordering policies shared by presorts and postsorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SortPolicy {
    /// Small area (`processors * predicted_run_time`) first.
    #[serde(rename = "SAF")]
    Saf,
    /// Large area first.
    #[serde(rename = "LAF")]
    Laf,
    /// Shortest predicted run time first.
    #[serde(rename = "SJF")]
    Sjf,
    /// Longest predicted run time first.
    #[serde(rename = "LJF")]
    Ljf,
    /// Smallest processor request first.
    #[serde(rename = "SRF")]
    Srf,
    /// Largest processor request first.
    #[serde(rename = "LRF")]
    Lrf,
    /// `p*r^2` then `p*r` then submit time, ascending.
    #[serde(rename = "SRD2F")]
    Srd2f,
    /// The WFP utility order of Tang et al.
    #[serde(rename = "WFP")]
    Wfp,
    /// Keep submission order (FCFS).
    #[serde(rename = "None")]
    None,
}

/// Objective functions for the CP schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ObjectiveName {
    /// Sum of flows.
    #[serde(rename = "AF")]
    Af,
    /// Area-weighted sum of flows.
    #[serde(rename = "AWF")]
    Awf,
    /// Sum of bounded slowdowns.
    #[serde(rename = "BSLD")]
    Bsld,
    /// Area-weighted slowdown family with exponent 2.
    #[serde(rename = "ASpWAS")]
    AspWas,
}

/// The scheduling policies the simulator can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerName {
    /// EASY backfill with configurable presort/postsort.
    EasyBackfill,
    /// Plan-and-start backfill over the usage tracker.
    PureBackfill,
    /// Immediate-fit list scheduling in presort order.
    ListPrediction,
    /// Single CP optimization with pure-backfill fallback.
    CpTuned,
    /// CP optimization compared against list-order plans.
    CpBestOfN,
}

impl SchedulerName {
    /// Configuration-facing identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerName::EasyBackfill => "easy_backfill",
            SchedulerName::PureBackfill => "pure_backfill",
            SchedulerName::ListPrediction => "list_prediction",
            SchedulerName::CpTuned => "cp_tuned",
            SchedulerName::CpBestOfN => "cp_best_of_n",
        }
    }
}

/// Run-time predictor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorName {
    /// Ground truth times an optional multiplier.
    Clairvoyant,
    /// The user estimate, unchanged.
    Reqtime,
    /// Per-user average of the two most recent run times.
    Tsafrir,
    /// Decayed weighted moments for the exact composite tag.
    Exact,
    /// Moment predictor over all 15 blanked-subset tags.
    Complete,
    /// Weighted quantile of observed run times.
    TopPercent,
    /// Quantile restricted to the survival tail of a running job.
    ConditionalPercent,
}

/// Corrector applied when a running job outlives its prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectorName {
    /// Jump straight to the user estimate.
    Reqtime,
    /// Two-prior per-user average, else the user estimate.
    Tsafrir,
    /// Quantile of observed run/estimate ratios.
    Ninetynine,
}

/// Predictor options. Which keys are read depends on the predictor.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictorConfig {
    /// Predictor selection.
    pub name: PredictorName,
    /// Clairvoyant stress multiplier (`>= 1`).
    pub predict_multiplier: Option<f64>,
    /// New-point weight for the quantile predictors.
    pub alpha: Option<f64>,
    /// Weight of the artificial seed point for the quantile predictors.
    pub start_weight: Option<f64>,
    /// Target fraction of mass below the prediction.
    pub confidence: Option<f64>,
    /// Weigh observations by their durations.
    pub use_weights: Option<bool>,
    /// Standard deviations added on top of the mean (moment predictors).
    pub sigma_factor: Option<f64>,
    /// Exponential decay for the moment predictors.
    pub decay: Option<f64>,
}

/// Corrector options.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectorConfig {
    /// Corrector selection.
    pub name: CorrectorName,
}

/// The `scheduler` subtree.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Scheduler selection.
    pub name: SchedulerName,
    /// Queue order before the scheduling pass.
    pub presorter: Option<SortPolicy>,
    /// Backfill order (EASY only).
    pub postsorter: Option<SortPolicy>,
    /// CP objective.
    pub objective_function: Option<ObjectiveName>,
    /// Slowdown bound in seconds for the BSLD objective.
    #[serde(rename = "BSLD_bound")]
    pub bsld_bound: Option<i64>,
    /// CP solver wall-clock budget in seconds.
    pub scheduling_timelimit: Option<f64>,
    /// How deep into the queue a planning pass reaches.
    pub limit_n_scheduled: Option<usize>,
    /// List-order candidates for the best-of-N scheduler.
    pub alternative_presorter: Option<Vec<SortPolicy>>,
    /// Refresh predictions of running jobs during planning (experimental;
    /// interacts poorly with correctors, see the pure-backfill scheduler).
    pub running_jobs_prediction_enabled: Option<bool>,
    /// Predictor subtree.
    pub predictor: PredictorConfig,
    /// Corrector subtree.
    pub corrector: CorrectorConfig,
}

/// Root configuration tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Input trace path. Overridden by the CLI when present there.
    pub input_file: Option<PathBuf>,
    /// Output trace path. Overridden by the CLI when present there.
    pub output_swf: Option<PathBuf>,
    /// Cluster size override; otherwise the trace header is used.
    pub num_processors: Option<u32>,
    /// Emit aggregate metrics at the end of the run.
    #[serde(default)]
    pub stats: bool,
    /// Journal scheduling decisions and fast-forward on restart (CP only).
    #[serde(default)]
    pub use_checkpointing: bool,
    /// Scheduler subtree.
    pub scheduler: SchedulerConfig,
}

impl SimConfig {
    /// Loads and validates a JSON descriptor.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SimConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects option combinations the selected scheduler cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use SchedulerName::*;
        let s = &self.scheduler;
        let name = s.name.as_str();
        let inapplicable = |option| ConfigError::OptionNotApplicable { option, scheduler: name };

        if s.postsorter.is_some() && s.name != EasyBackfill {
            return Err(inapplicable("postsorter"));
        }
        if s.presorter.is_some() && !matches!(s.name, EasyBackfill | PureBackfill | ListPrediction)
        {
            return Err(inapplicable("presorter"));
        }
        if s.alternative_presorter.is_some() && s.name != CpBestOfN {
            return Err(inapplicable("alternative_presorter"));
        }
        let is_cp = matches!(s.name, CpTuned | CpBestOfN);
        if !is_cp {
            if s.objective_function.is_some() {
                return Err(inapplicable("objective_function"));
            }
            if s.bsld_bound.is_some() {
                return Err(inapplicable("BSLD_bound"));
            }
            if s.scheduling_timelimit.is_some() {
                return Err(inapplicable("scheduling_timelimit"));
            }
            if self.use_checkpointing {
                return Err(inapplicable("use_checkpointing"));
            }
        }
        if s.limit_n_scheduled.is_some() && !matches!(s.name, PureBackfill | CpTuned) {
            return Err(inapplicable("limit_n_scheduled"));
        }
        if s.running_jobs_prediction_enabled.is_some() && s.name != PureBackfill {
            return Err(inapplicable("running_jobs_prediction_enabled"));
        }
        if s.limit_n_scheduled == Some(0) {
            return Err(ConfigError::InvalidValue {
                option: "limit_n_scheduled",
                reason: "must be positive (omit it for an unbounded pass)",
            });
        }
        if s.scheduling_timelimit.is_some_and(|t| !t.is_finite() || t < 0.0) {
            return Err(ConfigError::InvalidValue {
                option: "scheduling_timelimit",
                reason: "must be a non-negative number of seconds",
            });
        }
        if s.predictor.predict_multiplier.is_some_and(|m| m < 1.0) {
            return Err(ConfigError::InvalidValue {
                option: "predict_multiplier",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}
