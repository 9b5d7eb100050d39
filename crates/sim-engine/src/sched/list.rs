//! Immediate-fit list scheduling.
//!
//! Every pass re-predicts the queue, orders it by the configured policy,
//! and launches every job that fits right now. Used standalone as a
//! baseline and as the template for the best-of-N candidate plans.

use swfsim_core::{JobId, SimConfig, SortPolicy, Time};

use crate::error::SchedulingError;
use crate::event::{Event, EventKind};
use crate::pool::{JobPool, Resource};
use crate::sorters;
use crate::table::JobTable;

use super::{SchedulerBase, SchedulerPolicy};

/// The list-prediction scheduler.
#[derive(Debug)]
pub struct ListPredictionScheduler {
    base: SchedulerBase,
    nodes: Resource,
    pool: JobPool,
    presorter: SortPolicy,
}

impl ListPredictionScheduler {
    /// Builds the scheduler for a cluster of `num_processors`.
    pub fn new(config: &SimConfig, num_processors: u32, presorter: SortPolicy) -> Self {
        Self {
            base: SchedulerBase::new(config, num_processors),
            nodes: Resource::new(num_processors),
            pool: JobPool::new(),
            presorter,
        }
    }

    fn schedule_jobs(&mut self, jobs: &mut JobTable, now: Time) -> Vec<JobId> {
        let mut queue: Vec<JobId> = self.pool.pending().to_vec();
        if queue.is_empty() {
            return Vec::new();
        }
        for &id in &queue {
            self.base.apply_prediction(jobs.get_mut(id), now);
        }
        sorters::sort_queue(self.presorter, &mut queue, jobs, now);

        let mut started = Vec::new();
        for id in queue {
            let processors = jobs.get(id).num_required_processors;
            if self.nodes.is_enough_available(processors) {
                self.nodes.claim(processors);
                jobs.get_mut(id).start_time = Some(now);
                self.pool.move_to_running(id, processors);
                started.push(id);
            }
        }
        started
    }
}

impl SchedulerPolicy for ListPredictionScheduler {
    fn on_job_submission(&mut self, jobs: &mut JobTable, job: JobId, now: Time) -> Vec<Event> {
        self.pool
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
        self.nodes.release(jobs.get(job).num_required_processors);
        self.pool.remove_from_running(job);
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
        let started = self.schedule_jobs(jobs, now);
        Ok(SchedulerBase::start_events(now, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swfsim_core::Job;

    fn config() -> SimConfig {
        serde_json::from_str(
            r#"{
              "scheduler": {
                "name": "list_prediction",
                "presorter": "LAF",
                "predictor": { "name": "reqtime" },
                "corrector": { "name": "reqtime" }
              }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn starts_everything_that_fits_in_priority_order() {
        let cfg = config();
        let mut s = ListPredictionScheduler::new(&cfg, 4, SortPolicy::Laf);
        let mut jobs = JobTable::new();
        for (id, procs, estimate) in [(1, 1, 10), (2, 2, 600), (3, 3, 400)] {
            jobs.insert(Job::new(id, 0, procs, estimate, estimate, 1, 1, 1));
            s.on_job_submission(&mut jobs, id, 0);
        }
        // Areas: 1 -> 10, 2 -> 1200, 3 -> 1200. LAF order is 2, 3, 1; job 3
        // no longer fits after job 2, job 1 does.
        let started: Vec<JobId> = s
            .on_run_scheduler(&mut jobs, 0)
            .unwrap()
            .into_iter()
            .map(|e| match e.kind {
                EventKind::JobStart(id) => id,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(started, vec![2, 1]);
    }
}
