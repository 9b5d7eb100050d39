//! The job record.
//!
//! Every per-job auxiliary field the scheduling layers touch (prediction
//! counters, backfill flag, start time) is an explicit, default-initialized
//! member, and the prediction is only mutable through a setter that keeps
//! `predicted_run_time <= user_estimated_run_time`.

/// Stable job identifier taken from column 1 of the SWF trace.
pub type JobId = u64;

/// Simulated time, in whole seconds.
pub type Time = i64;

/// SWF columns the simulator carries through unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarriedColumns {
    /// Average CPU time used (column 6).
    pub avg_cpu_time: i64,
    /// Used memory (column 7).
    pub used_memory: i64,
    /// Requested memory (column 10).
    pub requested_memory: i64,
    /// Completion status (column 11).
    pub status: i64,
    /// Queue number (column 15).
    pub queue: i64,
    /// Partition number (column 16).
    pub partition: i64,
}

/// A single batch job.
///
/// The simulator owns all jobs; schedulers refer to them by [`JobId`].
/// `actual_run_time` is ground truth and is only consulted by the
/// completion machinery and by the clairvoyant predictor.
#[derive(Debug, Clone)]
pub struct Job {
    /// Stable identifier.
    pub id: JobId,
    /// Submission time.
    pub submit_time: Time,
    /// Processors the job occupies while running.
    pub num_required_processors: u32,
    /// True run time, revealed on completion.
    pub actual_run_time: Time,
    /// User-supplied upper bound on the run time.
    pub user_estimated_run_time: Time,
    /// Opaque user identifier (column 12).
    pub user_id: i64,
    /// Opaque group identifier (column 13).
    pub group_id: i64,
    /// Opaque executable identifier (column 14).
    pub executable_id: i64,
    /// First prediction made at submission, kept for reporting.
    pub initial_prediction: Option<Time>,
    /// How many times the job outlived its prediction.
    pub num_underpredict: u32,
    /// Set when the job starts to run.
    pub start_time: Option<Time>,
    /// Set when the job was started by a backfill move.
    pub backfilled: bool,
    /// Columns re-emitted verbatim.
    pub carried: CarriedColumns,

    predicted_run_time: Time,
}

impl Job {
    /// Creates a queued job. The prediction starts at the user estimate
    /// until a predictor revises it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: JobId,
        submit_time: Time,
        num_required_processors: u32,
        actual_run_time: Time,
        user_estimated_run_time: Time,
        user_id: i64,
        group_id: i64,
        executable_id: i64,
    ) -> Self {
        Self {
            id,
            submit_time,
            num_required_processors,
            actual_run_time,
            user_estimated_run_time,
            user_id,
            group_id,
            executable_id,
            initial_prediction: None,
            num_underpredict: 0,
            start_time: None,
            backfilled: false,
            carried: CarriedColumns::default(),
            predicted_run_time: user_estimated_run_time,
        }
    }

    /// Current run-time prediction.
    pub fn predicted_run_time(&self) -> Time {
        self.predicted_run_time
    }

    /// Revises the prediction, clamped into `[0, user_estimated_run_time]`.
    pub fn set_predicted_run_time(&mut self, predicted: Time) {
        self.predicted_run_time = predicted.clamp(0, self.user_estimated_run_time);
    }

    /// Predicted completion time. Only meaningful once the job started.
    pub fn predicted_finish_time(&self) -> Option<Time> {
        self.start_time.map(|s| s + self.predicted_run_time)
    }

    /// `processors * predicted_run_time`, the usual scheduling priority
    /// quantity.
    pub fn area(&self) -> i64 {
        i64::from(self.num_required_processors) * self.predicted_run_time
    }

    /// Wait time once started.
    pub fn wait_time(&self) -> Option<Time> {
        self.start_time.map(|s| s - self.submit_time)
    }
}

#[cfg(test)]
mod tests {
    use super::Job;

    fn job() -> Job {
        Job::new(7, 100, 4, 300, 600, 1, 1, 42)
    }

    #[test]
    fn prediction_clamps_to_user_estimate() {
        let mut j = job();
        assert_eq!(j.predicted_run_time(), 600);

        j.set_predicted_run_time(10_000);
        assert_eq!(j.predicted_run_time(), 600);

        j.set_predicted_run_time(-5);
        assert_eq!(j.predicted_run_time(), 0);

        j.set_predicted_run_time(250);
        assert_eq!(j.predicted_run_time(), 250);
    }

    #[test]
    fn derived_times() {
        let mut j = job();
        assert_eq!(j.predicted_finish_time(), None);
        j.start_time = Some(150);
        j.set_predicted_run_time(200);
        assert_eq!(j.predicted_finish_time(), Some(350));
        assert_eq!(j.wait_time(), Some(50));
        assert_eq!(j.area(), 800);
    }
}
