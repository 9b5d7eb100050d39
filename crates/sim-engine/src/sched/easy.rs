//! EASY backfill with configurable presort and postsort.
//!
//! The presorted queue is started head-first while capacity allows; the
//! first job that cannot start receives a reservation at its earliest
//! feasible time, and the rest of the queue, in postsort order, backfills
//! wherever an immediate start provably does not delay that reservation.
//! The head reservation is dropped again at the end of the pass.

use swfsim_core::{JobId, SimConfig, SortPolicy, Time};

use crate::error::SchedulingError;
use crate::event::{Event, EventKind};
use crate::snapshot::CpuSnapshot;
use crate::sorters;
use crate::table::JobTable;

use super::{SchedulerBase, SchedulerPolicy};

/// The EASY-family scheduler.
#[derive(Debug)]
pub struct EasyBackfillScheduler {
    base: SchedulerBase,
    snapshot: CpuSnapshot,
    queue: Vec<JobId>,
    presorter: SortPolicy,
    postsorter: SortPolicy,
}

impl EasyBackfillScheduler {
    /// Builds the scheduler for a cluster of `num_processors`.
    pub fn new(
        config: &SimConfig,
        num_processors: u32,
        presorter: SortPolicy,
        postsorter: SortPolicy,
    ) -> Self {
        Self {
            base: SchedulerBase::new(config, num_processors),
            snapshot: CpuSnapshot::new(num_processors),
            queue: Vec::new(),
            presorter,
            postsorter,
        }
    }

    fn schedule_jobs(
        &mut self,
        jobs: &mut JobTable,
        now: Time,
    ) -> Result<Vec<JobId>, SchedulingError> {
        let mut started = self.schedule_head_of_list(jobs, now)?;
        started.extend(self.backfill_jobs(jobs, now)?);
        Ok(started)
    }

    /// Starts queue-head jobs while they fit right now.
    fn schedule_head_of_list(
        &mut self,
        jobs: &mut JobTable,
        now: Time,
    ) -> Result<Vec<JobId>, SchedulingError> {
        sorters::sort_queue(self.presorter, &mut self.queue, jobs, now);
        let mut started = Vec::new();
        while let Some(&head) = self.queue.first() {
            let job = jobs.get(head);
            if self.snapshot.free_processors_available_at(now) < job.num_required_processors {
                break;
            }
            self.snapshot
                .assign_job(job, now)
                .map_err(|_| SchedulingError::StartRejected { job: head, time: now })?;
            self.queue.remove(0);
            started.push(head);
        }
        Ok(started)
    }

    /// Reserves the blocked head and backfills around it.
    fn backfill_jobs(
        &mut self,
        jobs: &mut JobTable,
        now: Time,
    ) -> Result<Vec<JobId>, SchedulingError> {
        if self.queue.len() <= 1 {
            return Ok(Vec::new());
        }
        let head = self.queue[0];
        self.snapshot.assign_job_earliest(jobs.get(head), now)?;

        let tail = sorters::sorted_queue(self.postsorter, &self.queue[1..], jobs, now);
        let mut started = Vec::new();
        for id in tail {
            if self.snapshot.can_job_start_now(jobs.get(id), now) {
                let job = jobs.get_mut(id);
                job.backfilled = true;
                self.snapshot
                    .assign_job(job, now)
                    .map_err(|_| SchedulingError::StartRejected { job: id, time: now })?;
                self.queue.retain(|&q| q != id);
                started.push(id);
            }
        }

        self.snapshot.del_job(jobs.get(head));
        Ok(started)
    }
}

impl SchedulerPolicy for EasyBackfillScheduler {
    fn on_job_submission(&mut self, jobs: &mut JobTable, job: JobId, now: Time) -> Vec<Event> {
        self.snapshot.archive_old_slices(now);
        self.base.note_submission(jobs.get_mut(job), now);
        self.queue.push(job);
        self.base.request_pass(now)
    }

    fn on_job_termination(
        &mut self,
        jobs: &mut JobTable,
        job: JobId,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError> {
        self.base.note_termination(jobs.get(job), now);
        self.snapshot.archive_old_slices(now);
        self.snapshot.del_tail_of_job(jobs.get(job), now);
        Ok(self.base.request_pass(now))
    }

    fn on_job_under_prediction(
        &mut self,
        jobs: &mut JobTable,
        job: JobId,
        now: Time,
    ) -> Result<Vec<Event>, SchedulingError> {
        self.base.apply_correction(jobs.get_mut(job), now);
        let revised = jobs.get(job);
        self.snapshot
            .assign_tail_of_job(revised, revised.predicted_run_time())?;
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
