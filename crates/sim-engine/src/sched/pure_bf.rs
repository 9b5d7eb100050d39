//! Pure plan-and-start backfill over the usage tracker.
//!
//! Each pass packs the presorted queue onto the earliest feasible start
//! times against a skyline of running jobs and launches every job whose
//! planned start is now. `limit_n_scheduled` caps how deep into the queue
//! a pass reaches.

use std::collections::BTreeSet;

use swfsim_core::{JobId, SimConfig, SortPolicy, Time};

use crate::error::SchedulingError;
use crate::event::{Event, EventKind};
use crate::pool::{JobPool, Resource};
use crate::sorters;
use crate::table::JobTable;
use crate::usage::UsageTracker;

use super::{SchedulerBase, SchedulerPolicy};

const DEFAULT_LIMIT_N_SCHEDULED: usize = 1_000_000;

/// The pure-backfill scheduler.
#[derive(Debug)]
pub struct PureBackfillScheduler {
    base: SchedulerBase,
    nodes: Resource,
    pool: JobPool,
    presorter: SortPolicy,
    limit_n_scheduled: usize,
    // Experimental: refreshing running-job predictions interferes with the
    // corrector cycle, which assumes predictions only move at
    // under-prediction events.
    running_jobs_prediction_enabled: bool,
}

impl PureBackfillScheduler {
    /// Builds the scheduler for a cluster of `num_processors`.
    pub fn new(config: &SimConfig, num_processors: u32, presorter: SortPolicy) -> Self {
        Self {
            base: SchedulerBase::new(config, num_processors),
            nodes: Resource::new(num_processors),
            pool: JobPool::new(),
            presorter,
            limit_n_scheduled: config
                .scheduler
                .limit_n_scheduled
                .unwrap_or(DEFAULT_LIMIT_N_SCHEDULED),
            running_jobs_prediction_enabled: config
                .scheduler
                .running_jobs_prediction_enabled
                .unwrap_or(false),
        }
    }

    fn start_job(&mut self, jobs: &mut JobTable, id: JobId, now: Time) -> bool {
        let job = jobs.get_mut(id);
        if !self.nodes.is_enough_available(job.num_required_processors) {
            return false;
        }
        self.nodes.claim(job.num_required_processors);
        job.start_time = Some(now);
        self.pool.move_to_running(id, job.num_required_processors);
        true
    }

    fn finish_job(&mut self, jobs: &JobTable, id: JobId) {
        self.nodes.release(jobs.get(id).num_required_processors);
        self.pool.remove_from_running(id);
    }

    /// Skyline of the running jobs in minus-available convention, built
    /// from their finish times in ascending order. A job already past its
    /// predicted end (it overran and the prediction cannot grow further)
    /// counts as finishing imminently.
    fn running_skyline(&self, jobs: &JobTable, now: Time) -> UsageTracker {
        let start_value = -i64::from(self.nodes.available());
        let mut running: Vec<(Time, u32)> = self
            .pool
            .running()
            .iter()
            .map(|&id| {
                let job = jobs.get(id);
                let finish = job.predicted_finish_time().expect("running job has a start");
                (finish.max(now + 1), job.num_required_processors)
            })
            .collect();
        running.sort_unstable();
        let mut steps = Vec::new();
        let mut value = start_value;
        for (finish, processors) in running {
            value -= i64::from(processors);
            match steps.last_mut() {
                Some((t, v)) if *t == finish => *v = value,
                _ => steps.push((finish, value)),
            }
        }
        UsageTracker::with_initial(start_value, steps)
    }

    fn schedule_jobs(
        &mut self,
        jobs: &mut JobTable,
        now: Time,
    ) -> Result<Vec<JobId>, SchedulingError> {
        let mut queue: Vec<JobId> = self.pool.pending().to_vec();
        if queue.is_empty() {
            return Ok(Vec::new());
        }
        queue.truncate(self.limit_n_scheduled);
        let mut by_procs: BTreeSet<(u32, JobId)> = queue
            .iter()
            .map(|&id| (jobs.get(id).num_required_processors, id))
            .collect();
        let smallest = |set: &BTreeSet<(u32, JobId)>| set.iter().next().map(|&(p, _)| p);
        match smallest(&by_procs) {
            Some(p) if self.nodes.is_enough_available(p) => {}
            _ => return Ok(Vec::new()),
        }

        if self.running_jobs_prediction_enabled {
            let running: Vec<JobId> = self.pool.running().iter().copied().collect();
            for id in running {
                let job = jobs.get_mut(id);
                self.base.apply_prediction(job, now);
                // A refreshed prediction must not end in the past.
                let job = jobs.get_mut(id);
                if job.predicted_finish_time().expect("running job has a start") <= now {
                    let start = job.start_time.expect("running job has a start");
                    job.set_predicted_run_time(1 + now - start);
                }
            }
        }
        for &id in &queue {
            self.base.apply_prediction(jobs.get_mut(id), now);
        }

        sorters::sort_queue(self.presorter, &mut queue, jobs, now);
        let mut tracker = self.running_skyline(jobs, now);
        let mut started = Vec::new();
        for id in queue {
            match smallest(&by_procs) {
                Some(p) if self.nodes.is_enough_available(p) => {}
                _ => break,
            }
            let job = jobs.get(id);
            by_procs.remove(&(job.num_required_processors, id));
            let duration = job.predicted_run_time().max(1);
            let processors = i64::from(job.num_required_processors);
            let sched_time = tracker
                .when_not_above(now, duration, -processors)
                .ok_or(SchedulingError::NeverRuns { job: id })?;
            tracker.add_usage(sched_time, sched_time + duration, processors);
            if sched_time <= now {
                debug_assert_eq!(sched_time, now);
                if !self.start_job(jobs, id, now) {
                    return Err(SchedulingError::StartRejected { job: id, time: now });
                }
                started.push(id);
            }
        }
        Ok(started)
    }
}

impl SchedulerPolicy for PureBackfillScheduler {
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
        self.finish_job(jobs, job);
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

#[cfg(test)]
mod tests {
    use super::*;
    use swfsim_core::Job;

    fn config(presorter: Option<&str>, limit: Option<usize>) -> SimConfig {
        let presorter = presorter
            .map(|p| format!("\"presorter\": \"{p}\","))
            .unwrap_or_default();
        let limit = limit
            .map(|l| format!("\"limit_n_scheduled\": {l},"))
            .unwrap_or_default();
        serde_json::from_str(&format!(
            r#"{{
              "scheduler": {{
                "name": "pure_backfill",
                {presorter}
                {limit}
                "predictor": {{ "name": "reqtime" }},
                "corrector": {{ "name": "reqtime" }}
              }}
            }}"#
        ))
        .unwrap()
    }

    fn build(cfg: &SimConfig, procs: u32) -> PureBackfillScheduler {
        let presorter = cfg.scheduler.presorter.unwrap_or(SortPolicy::None);
        PureBackfillScheduler::new(cfg, procs, presorter)
    }

    fn submit(
        s: &mut PureBackfillScheduler,
        jobs: &mut JobTable,
        id: JobId,
        procs: u32,
        estimate: Time,
        now: Time,
    ) {
        jobs.insert(Job::new(id, now, procs, estimate, estimate, 1, 1, 1));
        s.on_job_submission(jobs, id, now);
    }

    fn pass(s: &mut PureBackfillScheduler, jobs: &mut JobTable, now: Time) -> Vec<JobId> {
        s.on_run_scheduler(jobs, now)
            .unwrap()
            .into_iter()
            .map(|e| match e.kind {
                EventKind::JobStart(id) => id,
                other => panic!("unexpected event {other:?}"),
            })
            .collect()
    }

    #[test]
    fn plans_around_the_queue_head() {
        let cfg = config(None, None);
        let mut s = build(&cfg, 4);
        let mut jobs = JobTable::new();
        submit(&mut s, &mut jobs, 1, 2, 1000, 0);
        submit(&mut s, &mut jobs, 2, 4, 1000, 0);
        submit(&mut s, &mut jobs, 3, 2, 500, 0);
        // FCFS plan: 1 now, 2 at 1000, 3 fits beside 1 before 2's slot.
        assert_eq!(pass(&mut s, &mut jobs, 0), vec![1, 3]);
    }

    #[test]
    fn sjf_presort_reorders_the_plan() {
        let cfg = config(Some("SJF"), None);
        let mut s = build(&cfg, 2);
        let mut jobs = JobTable::new();
        submit(&mut s, &mut jobs, 1, 2, 100, 0);
        submit(&mut s, &mut jobs, 2, 2, 10, 0);
        // The short job goes first under SJF.
        assert_eq!(pass(&mut s, &mut jobs, 0), vec![2]);
    }

    #[test]
    fn limit_caps_planning_depth() {
        let cfg = config(None, Some(1));
        let mut s = build(&cfg, 4);
        let mut jobs = JobTable::new();
        submit(&mut s, &mut jobs, 1, 2, 100, 0);
        submit(&mut s, &mut jobs, 2, 2, 100, 0);
        // Only the first queue entry is even considered.
        assert_eq!(pass(&mut s, &mut jobs, 0), vec![1]);
    }

    #[test]
    fn no_pass_when_the_smallest_job_cannot_fit() {
        let cfg = config(None, None);
        let mut s = build(&cfg, 4);
        let mut jobs = JobTable::new();
        submit(&mut s, &mut jobs, 1, 4, 1000, 0);
        assert_eq!(pass(&mut s, &mut jobs, 0), vec![1]);
        submit(&mut s, &mut jobs, 2, 3, 50, 0);
        assert_eq!(pass(&mut s, &mut jobs, 0), Vec::<JobId>::new());
    }
}
