//! Scheduling policies.
//!
//! Every scheduler implements the four kernel hooks; the shared
//! [`SchedulerBase`] carries the predictor, the corrector, and the
//! run-coalescing flag, and is the single place where a predictor that
//! declines to predict falls back to the user estimate.

mod cp_best_of_n;
mod cp_support;
mod cp_tuned;
mod easy;
mod list;
mod pure_bf;

use std::path::Path;

use swfsim_core::{
    ConfigError, Job, JobId, ObjectiveName, SchedulerName, SimConfig, SortPolicy, Time,
};

pub use cp_best_of_n::CpBestOfNScheduler;
pub use cp_tuned::CpTunedScheduler;
pub use easy::EasyBackfillScheduler;
pub use list::ListPredictionScheduler;
pub use pure_bf::PureBackfillScheduler;

use crate::correct::Corrector;
use crate::error::SchedulingError;
use crate::event::{Event, EventKind};
use crate::predict::Predictor;
use crate::table::JobTable;

/// The hooks the kernel drives.
pub trait SchedulerPolicy {
    /// A job entered the system.
    fn on_job_submission(&mut self, jobs: &mut JobTable, job: JobId, now: Time) -> Vec<Event>;

    /// A running job completed; its `actual_run_time` is now visible.
    fn on_job_termination(
        &mut self,
        jobs: &mut JobTable,
        job: JobId,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError>;

    /// A running job reached its predicted end without terminating.
    fn on_job_under_prediction(
        &mut self,
        jobs: &mut JobTable,
        job: JobId,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError>;

    /// A coalesced scheduling pass.
    fn on_run_scheduler(
        &mut self,
        jobs: &mut JobTable,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError>;
}

/// State and behavior shared by every scheduler.
#[derive(Debug)]
pub(crate) struct SchedulerBase {
    pub(crate) predictor: Predictor,
    pub(crate) corrector: Corrector,
    pub(crate) num_processors: u32,
    run_already_scheduled: bool,
}

impl SchedulerBase {
    pub(crate) fn new(config: &SimConfig, num_processors: u32) -> Self {
        Self {
            predictor: Predictor::from_config(&config.scheduler.predictor),
            corrector: Corrector::from_config(&config.scheduler.corrector),
            num_processors,
            run_already_scheduled: false,
        }
    }

    /// Runs the predictor and applies the user-estimate fallback. This is
    /// the only place that fallback exists.
    pub(crate) fn apply_prediction(&mut self, job: &mut Job, now: Time) {
        let predicted = self
            .predictor
            .predict(job, now)
            .unwrap_or(job.user_estimated_run_time);
        job.set_predicted_run_time(predicted);
    }

    /// Submission-time work: predict and pin the one-time initial prediction.
    pub(crate) fn note_submission(&mut self, job: &mut Job, now: Time) {
        self.apply_prediction(job, now);
        if job.initial_prediction.is_none() {
            job.initial_prediction = Some(job.predicted_run_time());
        }
    }

    /// Termination-time work: teach the predictor and the corrector.
    pub(crate) fn note_termination(&mut self, job: &Job, now: Time) {
        self.predictor.fit(job, now);
        self.corrector.observe_termination(job);
    }

    /// Under-prediction work: bump the counter and revise the prediction.
    pub(crate) fn apply_correction(&mut self, job: &mut Job, now: Time) {
        job.num_underpredict += 1;
        let revised = self.corrector.correct(job, now);
        job.set_predicted_run_time(revised);
    }

    /// Requests one scheduling pass, coalescing repeated requests.
    pub(crate) fn request_pass(&mut self, now: Time) -> Vec<Event> {
        if self.run_already_scheduled {
            Vec::new()
        } else {
            self.run_already_scheduled = true;
            vec![Event::new(now, EventKind::RunScheduler)]
        }
    }

    /// Marks the pass as running; new requests will queue a fresh pass.
    pub(crate) fn begin_pass(&mut self) {
        self.run_already_scheduled = false;
    }

    /// Wraps started jobs into start events.
    pub(crate) fn start_events(now: Time, started: Vec<JobId>) -> Vec<Event> {
        started
            .into_iter()
            .map(|id| Event::new(now, EventKind::JobStart(id)))
            .collect()
    }
}

/// CP options shared by the two CP schedulers.
#[derive(Debug, Clone)]
pub(crate) struct CpOptions {
    pub(crate) objective: ObjectiveName,
    pub(crate) bsld_bound: i64,
    pub(crate) timelimit_secs: f64,
}

impl CpOptions {
    fn from_config(config: &SimConfig) -> Self {
        Self {
            objective: config
                .scheduler
                .objective_function
                .unwrap_or(ObjectiveName::AspWas),
            bsld_bound: config.scheduler.bsld_bound.unwrap_or(10),
            timelimit_secs: config.scheduler.scheduling_timelimit.unwrap_or(1.0),
        }
    }
}

/// The schedulers as one tagged dispatch type, resolved once at startup.
#[derive(Debug)]
pub enum AnyScheduler {
    /// EASY backfill.
    Easy(EasyBackfillScheduler),
    /// Pure plan-and-start backfill.
    PureBackfill(PureBackfillScheduler),
    /// Immediate-fit list scheduling.
    List(ListPredictionScheduler),
    /// Single CP optimization.
    CpTuned(CpTunedScheduler),
    /// CP optimization with list-order comparison.
    CpBestOfN(CpBestOfNScheduler),
}

impl AnyScheduler {
    /// Builds the configured scheduler.
    ///
    /// `output_swf` locates the journal of the CP schedulers when
    /// checkpointing is enabled.
    pub fn from_config(
        config: &SimConfig,
        num_processors: u32,
        output_swf: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let s = &config.scheduler;
        let presorter = s.presorter.unwrap_or(SortPolicy::None);
        let journal_output = if config.use_checkpointing {
            Some(
                output_swf
                    .ok_or(ConfigError::MissingPath("output_swf"))?
                    .to_path_buf(),
            )
        } else {
            None
        };
        Ok(match s.name {
            SchedulerName::EasyBackfill => AnyScheduler::Easy(EasyBackfillScheduler::new(
                config,
                num_processors,
                presorter,
                s.postsorter.unwrap_or(SortPolicy::None),
            )),
            SchedulerName::PureBackfill => AnyScheduler::PureBackfill(
                PureBackfillScheduler::new(config, num_processors, presorter),
            ),
            SchedulerName::ListPrediction => AnyScheduler::List(ListPredictionScheduler::new(
                config,
                num_processors,
                presorter,
            )),
            SchedulerName::CpTuned => AnyScheduler::CpTuned(CpTunedScheduler::new(
                config,
                num_processors,
                CpOptions::from_config(config),
                journal_output.as_deref(),
            )),
            SchedulerName::CpBestOfN => AnyScheduler::CpBestOfN(CpBestOfNScheduler::new(
                config,
                num_processors,
                CpOptions::from_config(config),
                journal_output.as_deref(),
            )),
        })
    }
}

impl SchedulerPolicy for AnyScheduler {
    fn on_job_submission(&mut self, jobs: &mut JobTable, job: JobId, now: Time) -> Vec<Event> {
        match self {
            AnyScheduler::Easy(s) => s.on_job_submission(jobs, job, now),
            AnyScheduler::PureBackfill(s) => s.on_job_submission(jobs, job, now),
            AnyScheduler::List(s) => s.on_job_submission(jobs, job, now),
            AnyScheduler::CpTuned(s) => s.on_job_submission(jobs, job, now),
            AnyScheduler::CpBestOfN(s) => s.on_job_submission(jobs, job, now),
        }
    }

    fn on_job_termination(
        &mut self,
        jobs: &mut JobTable,
        job: JobId,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError> {
        match self {
            AnyScheduler::Easy(s) => s.on_job_termination(jobs, job, now),
            AnyScheduler::PureBackfill(s) => s.on_job_termination(jobs, job, now),
            AnyScheduler::List(s) => s.on_job_termination(jobs, job, now),
            AnyScheduler::CpTuned(s) => s.on_job_termination(jobs, job, now),
            AnyScheduler::CpBestOfN(s) => s.on_job_termination(jobs, job, now),
        }
    }

    fn on_job_under_prediction(
        &mut self,
        jobs: &mut JobTable,
        job: JobId,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError> {
        match self {
            AnyScheduler::Easy(s) => s.on_job_under_prediction(jobs, job, now),
            AnyScheduler::PureBackfill(s) => s.on_job_under_prediction(jobs, job, now),
            AnyScheduler::List(s) => s.on_job_under_prediction(jobs, job, now),
            AnyScheduler::CpTuned(s) => s.on_job_under_prediction(jobs, job, now),
            AnyScheduler::CpBestOfN(s) => s.on_job_under_prediction(jobs, job, now),
        }
    }

    fn on_run_scheduler(
        &mut self,
        jobs: &mut JobTable,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError> {
        match self {
            AnyScheduler::Easy(s) => s.on_run_scheduler(jobs, now),
            AnyScheduler::PureBackfill(s) => s.on_run_scheduler(jobs, now),
            AnyScheduler::List(s) => s.on_run_scheduler(jobs, now),
            AnyScheduler::CpTuned(s) => s.on_run_scheduler(jobs, now),
            AnyScheduler::CpBestOfN(s) => s.on_run_scheduler(jobs, now),
        }
    }
}
