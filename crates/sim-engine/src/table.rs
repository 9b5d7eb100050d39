//! The job arena.
//!
//! The simulator owns every job; schedulers and predictors refer to jobs by
//! id and borrow them from here for the duration of a hook.

use std::collections::BTreeMap;

use swfsim_core::{Job, JobId};

/// Jobs keyed by id.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<JobId, Job>,
}

impl JobTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a job, replacing any previous job with the same id.
    pub fn insert(&mut self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    /// Borrows a job.
    ///
    /// # Panics
    /// The id must be present; schedulers only hold ids of jobs the
    /// simulator owns.
    pub fn get(&self, id: JobId) -> &Job {
        self.jobs.get(&id).expect("job id not in table")
    }

    /// Mutably borrows a job.
    ///
    /// # Panics
    /// The id must be present.
    pub fn get_mut(&mut self, id: JobId) -> &mut Job {
        self.jobs.get_mut(&id).expect("job id not in table")
    }

}
