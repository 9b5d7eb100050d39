#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Core data model for `swfsim`: the job record, the Standard Workload
//! Format (SWF) reader/writer, and the simulation configuration tree.

/// Simulation configuration descriptor.
pub mod config;
/// The job record shared by the kernel and the schedulers.
pub mod job;
/// SWF trace parsing and augmented re-emission.
pub mod swf;

pub use config::{
    ConfigError, CorrectorConfig, CorrectorName, ObjectiveName, PredictorConfig, PredictorName,
    SchedulerConfig, SchedulerName, SimConfig, SortPolicy,
};
pub use job::{Job, JobId, Time};
pub use swf::{Trace, TraceError};
