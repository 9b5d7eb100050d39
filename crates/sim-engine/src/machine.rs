//! Cluster occupancy from the kernel's point of view.
//!
//! Claims happen only on job start, releases only on job termination, and
//! `claimed <= capacity` holds at every instant; a claim that would break
//! the invariant rejects the start.

use std::collections::HashSet;

use swfsim_core::{JobId, Time};

use crate::error::SchedulingError;

/// Processor accounting for one simulated cluster.
#[derive(Debug)]
pub struct Machine {
    capacity: u32,
    claimed: u32,
    running: HashSet<JobId>,
}

impl Machine {
    /// Creates an idle machine of the given size.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            claimed: 0,
            running: HashSet::new(),
        }
    }

    /// Total processor count.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Processors currently claimed by running jobs.
    pub fn claimed(&self) -> u32 {
        self.claimed
    }

    /// Whether the job is currently running.
    pub fn is_running(&self, id: JobId) -> bool {
        self.running.contains(&id)
    }

    /// Claims processors for a starting job.
    pub fn start(&mut self, id: JobId, processors: u32, now: Time) -> Result<(), SchedulingError> {
        if self.claimed + processors > self.capacity || !self.running.insert(id) {
            return Err(SchedulingError::StartRejected { job: id, time: now });
        }
        self.claimed += processors;
        Ok(())
    }

    /// Releases a completed job's processors.
    pub fn finish(&mut self, id: JobId, processors: u32) {
        if self.running.remove(&id) {
            debug_assert!(self.claimed >= processors);
            self.claimed = self.claimed.saturating_sub(processors);
        } else {
            log::error!("finish for job {id} that is not running");
        }
    }
}
