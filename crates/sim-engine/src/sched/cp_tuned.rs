//! Single-optimization CP scheduler.
//!
//! Each pass builds a resource-constrained optimization over the queue and
//! solves it under a wall-clock budget, retrying once with a doubled limit
//! before falling back to the plain backfill planner. Jobs whose optimized
//! start is now are launched.

use std::path::Path;
use std::time::Duration;

use swfsim_core::{JobId, SimConfig, Time};

use crate::cp::{self, Objective};
use crate::error::SchedulingError;
use crate::event::{Event, EventKind};
use crate::table::JobTable;

use super::cp_support::{CpCore, Replay};
use super::{CpOptions, SchedulerBase, SchedulerPolicy};

const DEFAULT_LIMIT_N_SCHEDULED: usize = 100;

/// The tuned CP scheduler.
#[derive(Debug)]
pub struct CpTunedScheduler {
    base: SchedulerBase,
    core: CpCore,
    options: CpOptions,
    limit_n_scheduled: usize,
}

impl CpTunedScheduler {
    /// Builds the scheduler for a cluster of `num_processors`.
    pub(super) fn new(
        config: &SimConfig,
        num_processors: u32,
        options: CpOptions,
        journal_output: Option<&Path>,
    ) -> Self {
        Self {
            base: SchedulerBase::new(config, num_processors),
            core: CpCore::new(num_processors, journal_output),
            options,
            limit_n_scheduled: config
                .scheduler
                .limit_n_scheduled
                .unwrap_or(DEFAULT_LIMIT_N_SCHEDULED),
        }
    }

    fn objective(&self) -> Objective {
        Objective::from_config(self.options.objective, self.options.bsld_bound)
    }

    fn schedule_jobs(
        &mut self,
        jobs: &mut JobTable,
        now: Time,
    ) -> Result<Vec<JobId>, SchedulingError> {
        let mut replayed = match self.core.replay(jobs, now) {
            Replay::Covered(started) => return Ok(started),
            Replay::Solve(started) => started,
        };
        let queue: Vec<JobId> = self.core.pool.pending().to_vec();
        if queue.is_empty() {
            return Ok(replayed);
        }
        match self.core.pool.min_pending_processors() {
            Some(p) if self.core.nodes.is_enough_available(p) => {}
            _ => return Ok(replayed),
        }
        if let [only] = queue[..] {
            // The capacity gate above already proved it fits.
            if !self.core.start_job(jobs, only, now) {
                return Err(SchedulingError::StartRejected { job: only, time: now });
            }
            replayed.push(only);
            return Ok(replayed);
        }

        let mut queue = queue;
        queue.truncate(self.limit_n_scheduled);
        for &id in &queue {
            self.base.apply_prediction(jobs.get_mut(id), now);
        }
        let instance = self.core.build_instance(jobs, &queue, now);

        let base_limit = Duration::from_secs_f64(self.options.timelimit_secs);
        for (attempt, limit) in [base_limit, base_limit * 2].into_iter().enumerate() {
            if attempt > 0 {
                log::info!("retrying CP optimization at time {now} with a doubled time limit");
            }
            match cp::solve(&instance, self.objective(), limit, None) {
                Ok(plan) => {
                    let absolute: Vec<(Time, JobId)> = instance
                        .tasks
                        .iter()
                        .zip(&plan.starts)
                        .map(|(task, &start)| (now + start, task.job))
                        .collect();
                    replayed.extend(self.core.start_plan(jobs, &absolute, now)?);
                    return Ok(replayed);
                }
                Err(err) => log::warn!("CP optimization failed at time {now}: {err}"),
            }
        }

        log::warn!("CP attempts exhausted at time {now}; using the backfill planner");
        replayed.extend(self.fallback_schedule(jobs, now)?);
        Ok(replayed)
    }

    /// The plain backfill plan over the whole pending queue, in submission
    /// order.
    fn fallback_schedule(
        &mut self,
        jobs: &mut JobTable,
        now: Time,
    ) -> Result<Vec<JobId>, SchedulingError> {
        let queue: Vec<JobId> = self.core.pool.pending().to_vec();
        let instance = self.core.build_instance(jobs, &queue, now);
        let order: Vec<usize> = (0..instance.tasks.len()).collect();
        let starts = cp::pack(&instance, &order)
            .map_err(|cp::SolveError::Infeasible { job }| SchedulingError::NeverRuns { job })?;
        let absolute: Vec<(Time, JobId)> = instance
            .tasks
            .iter()
            .zip(&starts)
            .map(|(task, &start)| (now + start, task.job))
            .collect();
        self.core.start_plan(jobs, &absolute, now)
    }
}

impl SchedulerPolicy for CpTunedScheduler {
    fn on_job_submission(&mut self, jobs: &mut JobTable, job: JobId, now: Time) -> Vec<Event> {
        self.core
            .pool
            .add_pending(job, jobs.get(job).num_required_processors);
        self.base.note_submission(jobs.get_mut(job), now);
        self.base.request_pass(now)
    }

    fn on_job_termination(
        &mut self,
        jobs: &mut JobTable,
        job: JobId,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError> {
        self.core.finish_job(jobs, job);
        self.base.note_termination(jobs.get(job), now);
        Ok(self.base.request_pass(now))
    }

    fn on_job_under_prediction(
        &mut self,
        jobs: &mut JobTable,
        job: JobId,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError> {
        self.base.apply_correction(jobs.get_mut(job), now);
        Ok(vec![Event::new(now, EventKind::JobStart(job))])
    }

    fn on_run_scheduler(
        &mut self,
        jobs: &mut JobTable,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError> {
        self.base.begin_pass();
        let started = self.schedule_jobs(jobs, now)?;
        Ok(SchedulerBase::start_events(now, started))
    }
}
