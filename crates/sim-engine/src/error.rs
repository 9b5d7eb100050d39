//! Invariant violations that abort a simulation.

use swfsim_core::{JobId, Time};

/// A scheduling decision the cluster state cannot honor.
///
/// Solver timeouts and journal replay problems are handled inside the
/// schedulers; anything surfacing here terminates the run with a diagnostic
/// naming the job and the simulated time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    /// A job chosen to start now does not actually fit.
    #[error(
        "job {job} could not start at time {time}; possibly a running job exceeded its time limit"
    )]
    StartRejected {
        /// The job that failed to start.
        job: JobId,
        /// Simulated time of the attempt.
        time: Time,
    },
    /// No point in the future has enough capacity for the job.
    #[error("job {job} can never run on this machine")]
    NeverRuns {
        /// The unplaceable job.
        job: JobId,
    },
    /// A reservation or reservation extension does not fit.
    #[error("reservation for job {job} does not fit at time {time}")]
    ReservationUnfit {
        /// The job being reserved.
        job: JobId,
        /// Requested reservation start.
        time: Time,
    },
}
