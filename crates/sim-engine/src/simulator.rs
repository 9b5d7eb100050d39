//! The event-driven driver.
//!
//! Owns the jobs, the event queue, and the machine; dispatches each event
//! to the scheduler's hooks and drains the events they return. Every
//! started job gets exactly one completion event: a termination at its true
//! end when the prediction covers it, otherwise an under-prediction at the
//! predicted end, which the scheduler revises before the cycle repeats.

use swfsim_core::{Job, JobId, Time};

use crate::error::SchedulingError;
use crate::event::{Event, EventKind, EventQueue};
use crate::machine::Machine;
use crate::sched::{AnyScheduler, SchedulerPolicy};
use crate::table::JobTable;

/// Progress callbacks emitted while the simulation runs.
#[derive(Debug, Clone, Copy)]
pub enum Notice {
    /// A job started running.
    JobStarted {
        /// The job.
        job: JobId,
        /// Simulated start time.
        time: Time,
    },
    /// A job completed.
    JobFinished {
        /// The job.
        job: JobId,
        /// Simulated completion time.
        time: Time,
        /// Jobs completed so far.
        completed: usize,
        /// Jobs submitted in total.
        total: usize,
    },
}

/// One simulation run.
#[derive(Debug)]
pub struct Simulator {
    queue: EventQueue,
    jobs: JobTable,
    machine: Machine,
    scheduler: AnyScheduler,
    submitted: Vec<JobId>,
    completed: usize,
    now: Time,
}

impl Simulator {
    /// Creates a simulator over an idle cluster.
    pub fn new(num_processors: u32, scheduler: AnyScheduler) -> Self {
        Self {
            queue: EventQueue::new(),
            jobs: JobTable::new(),
            machine: Machine::new(num_processors),
            scheduler,
            submitted: Vec::new(),
            completed: 0,
            now: 0,
        }
    }

    /// Queues a job's submission event. Jobs wider than the machine can
    /// never run and are skipped with a warning.
    pub fn submit(&mut self, job: Job) {
        if job.num_required_processors > self.machine.capacity() {
            log::warn!(
                "job {} requests {} of {} processors; skipping",
                job.id,
                job.num_required_processors,
                self.machine.capacity()
            );
            return;
        }
        let id = job.id;
        let submit_time = job.submit_time;
        self.jobs.insert(job);
        self.submitted.push(id);
        self.queue.push(Event::new(submit_time, EventKind::JobSubmission(id)));
    }

    /// Number of submitted jobs.
    pub fn total_jobs(&self) -> usize {
        self.submitted.len()
    }

    /// The completion event for a job that (re-)registered at `now`.
    fn completion_event(job: &Job, now: Time) -> Event {
        let start = job.start_time.expect("completion of a job that never started");
        let actual_end = start + job.actual_run_time;
        let predicted_end = start + job.predicted_run_time();
        if predicted_end >= actual_end
            || job.predicted_run_time() >= job.user_estimated_run_time
        {
            // Either the prediction covers the true end, or it has no room
            // left to grow and revising again would be busywork.
            Event::new(actual_end, EventKind::JobTermination(job.id))
        } else {
            Event::new(predicted_end.max(now + 1), EventKind::JobUnderPrediction(job.id))
        }
    }

    /// Runs the simulation to completion, invoking `notice` as jobs start
    /// and finish.
    pub fn run(&mut self, mut notice: impl FnMut(Notice)) -> Result<(), SchedulingError> {
        while let Some(event) = self.queue.pop() {
            debug_assert!(event.time >= self.now, "time must be monotone");
            self.now = event.time;
            let produced = match event.kind {
                EventKind::JobSubmission(id) => {
                    self.scheduler.on_job_submission(&mut self.jobs, id, self.now)
                }
                EventKind::JobStart(id) => {
                    if self.machine.is_running(id) {
                        // Re-registration after an under-prediction revision.
                        vec![Self::completion_event(self.jobs.get(id), self.now)]
                    } else {
                        let job = self.jobs.get_mut(id);
                        let processors = job.num_required_processors;
                        if job.start_time.is_none() {
                            job.start_time = Some(self.now);
                        }
                        debug_assert_eq!(job.start_time, Some(self.now));
                        self.machine.start(id, processors, self.now)?;
                        notice(Notice::JobStarted { job: id, time: self.now });
                        vec![Self::completion_event(self.jobs.get(id), self.now)]
                    }
                }
                EventKind::JobTermination(id) => {
                    let processors = self.jobs.get(id).num_required_processors;
                    self.machine.finish(id, processors);
                    self.completed += 1;
                    notice(Notice::JobFinished {
                        job: id,
                        time: self.now,
                        completed: self.completed,
                        total: self.submitted.len(),
                    });
                    self.scheduler.on_job_termination(&mut self.jobs, id, self.now)?
                }
                EventKind::JobUnderPrediction(id) => {
                    self.scheduler
                        .on_job_under_prediction(&mut self.jobs, id, self.now)?
                }
                EventKind::RunScheduler => {
                    self.scheduler.on_run_scheduler(&mut self.jobs, self.now)?
                }
            };
            for event in produced {
                self.queue.push(event);
            }
        }
        Ok(())
    }

    /// Jobs in submission order, for trace emission.
    pub fn results(&self) -> Vec<&Job> {
        self.submitted.iter().map(|&id| self.jobs.get(id)).collect()
    }
}
