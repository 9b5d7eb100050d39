//! State shared by the CP schedulers: the pool/capacity pair, the optional
//! decision journal with its fast-forward, and instance construction.

use std::path::Path;

use swfsim_core::{JobId, Time};

use crate::cp::{CpInstance, CpTask};
use crate::error::SchedulingError;
use crate::journal::Journal;
use crate::pool::{JobPool, Resource};
use crate::table::JobTable;

/// What a replay attempt decided.
pub(super) enum Replay {
    /// Solve normally, keeping any jobs replayed before the replay ended.
    Solve(Vec<JobId>),
    /// This pass is covered by the journal; start exactly these jobs.
    Covered(Vec<JobId>),
}

#[derive(Debug)]
pub(super) struct CpCore {
    pub(super) nodes: Resource,
    pub(super) pool: JobPool,
    journal: Option<Journal>,
}

impl CpCore {
    pub(super) fn new(num_processors: u32, journal_output: Option<&Path>) -> Self {
        Self {
            nodes: Resource::new(num_processors),
            pool: JobPool::new(),
            journal: journal_output.map(Journal::open),
        }
    }

    /// Starts a job the scheduler picked, journaling the decision.
    pub(super) fn start_job(&mut self, jobs: &mut JobTable, id: JobId, now: Time) -> bool {
        let job = jobs.get_mut(id);
        if !self.nodes.is_enough_available(job.num_required_processors) {
            return false;
        }
        self.nodes.claim(job.num_required_processors);
        job.start_time = Some(now);
        self.pool.move_to_running(id, job.num_required_processors);
        if let Some(journal) = &mut self.journal {
            journal.record_start(now, id);
        }
        true
    }

    pub(super) fn finish_job(&mut self, jobs: &JobTable, id: JobId) {
        self.nodes.release(jobs.get(id).num_required_processors);
        self.pool.remove_from_running(id);
    }

    /// Fast-forwards through the saved journal. Any discrepancy aborts the
    /// replay permanently; whatever was replayed before the abort is kept
    /// and the pass resumes solving from that point.
    pub(super) fn replay(&mut self, jobs: &mut JobTable, now: Time) -> Replay {
        let Some(journal) = &mut self.journal else {
            return Replay::Solve(Vec::new());
        };
        if !journal.is_replaying() {
            return Replay::Solve(Vec::new());
        }
        match journal.peek() {
            None => {
                log::info!("journal replay exhausted at time {now}");
                journal.stop_replay(true);
                Replay::Solve(Vec::new())
            }
            Some((t, id)) if t < now => {
                log::warn!(
                    "journal has job {id} starting at {t} but the simulation is already at {now}; aborting replay"
                );
                journal.stop_replay(false);
                Replay::Solve(Vec::new())
            }
            Some((t, _)) if t > now => Replay::Covered(Vec::new()),
            Some(_) => self.replay_instant(jobs, now),
        }
    }

    /// Starts every journaled job recorded for this instant.
    fn replay_instant(&mut self, jobs: &mut JobTable, now: Time) -> Replay {
        let mut started = Vec::new();
        loop {
            let head = self
                .journal
                .as_ref()
                .and_then(|j| j.peek())
                .filter(|&(t, _)| t == now);
            let Some((_, id)) = head else { break };
            if !self.pool.pending().contains(&id) {
                log::warn!("journal job {id} is not pending at time {now}; aborting replay");
                self.abort_replay();
                return Replay::Solve(started);
            }
            if !self.start_job(jobs, id, now) {
                log::warn!("journal job {id} no longer fits at time {now}; aborting replay");
                self.abort_replay();
                return Replay::Solve(started);
            }
            log::debug!("replayed job {id} at time {now}");
            started.push(id);
            if let Some(journal) = &mut self.journal {
                journal.advance();
            }
        }
        Replay::Covered(started)
    }

    fn abort_replay(&mut self) {
        if let Some(journal) = &mut self.journal {
            journal.stop_replay(false);
        }
    }

    /// Builds an optimization instance over `queue` (in queue order).
    pub(super) fn build_instance(
        &self,
        jobs: &JobTable,
        queue: &[JobId],
        now: Time,
    ) -> CpInstance {
        let mut running: Vec<(Time, u32)> = self
            .pool
            .running()
            .iter()
            .map(|&id| {
                let job = jobs.get(id);
                let finish = job.predicted_finish_time().expect("running job has a start");
                ((finish - now).max(1), job.num_required_processors)
            })
            .collect();
        running.sort_unstable();
        let tasks = queue
            .iter()
            .map(|&id| {
                let job = jobs.get(id);
                CpTask {
                    job: id,
                    duration: job.predicted_run_time().max(1),
                    processors: job.num_required_processors,
                    submit_time: job.submit_time,
                }
            })
            .collect();
        CpInstance {
            capacity: self.nodes.max(),
            now,
            running,
            tasks,
        }
    }

    /// Starts the jobs a plan schedules at or before `now`, in submit
    /// order, propagating a start the machine cannot honor.
    pub(super) fn start_plan(
        &mut self,
        jobs: &mut JobTable,
        plan: &[(Time, JobId)],
        now: Time,
    ) -> Result<Vec<JobId>, SchedulingError> {
        let mut to_start: Vec<(Time, JobId)> = plan
            .iter()
            .copied()
            .filter(|&(start, _)| start <= now)
            .collect();
        // Stable: equal submit times keep the plan's order.
        to_start.sort_by_key(|&(_, id)| jobs.get(id).submit_time);
        let mut started = Vec::new();
        for (_, id) in to_start {
            if !self.start_job(jobs, id, now) {
                return Err(SchedulingError::StartRejected { job: id, time: now });
            }
            started.push(id);
        }
        Ok(started)
    }
}
