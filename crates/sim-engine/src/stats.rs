//! End-of-run aggregate metrics, printed when `stats` is enabled.

use std::fmt;

use swfsim_core::Job;

const BSLD_BOUND: i64 = 10;

/// Aggregate metrics over the simulated execution.
#[derive(Debug, Clone, Copy)]
pub struct RunStats {
    /// Jobs that ran.
    pub jobs: usize,
    /// Last completion minus first submission.
    pub makespan: i64,
    /// Mean wait time in seconds.
    pub mean_wait: f64,
    /// Mean bounded slowdown (10s bound).
    pub mean_bounded_slowdown: f64,
    /// Fraction of processor-seconds used over the makespan.
    pub utilization: f64,
}

impl RunStats {
    /// Computes metrics from finished jobs.
    pub fn compute<'a>(jobs: impl IntoIterator<Item = &'a Job>, capacity: u32) -> Self {
        let mut count = 0usize;
        let mut first_submit = i64::MAX;
        let mut last_end = i64::MIN;
        let mut wait_sum = 0.0;
        let mut bsld_sum = 0.0;
        let mut used_area = 0.0;
        for job in jobs {
            let Some(start) = job.start_time else { continue };
            count += 1;
            let end = start + job.actual_run_time;
            first_submit = first_submit.min(job.submit_time);
            last_end = last_end.max(end);
            let wait = (start - job.submit_time) as f64;
            wait_sum += wait;
            let flow = wait + job.actual_run_time as f64;
            bsld_sum += (flow / BSLD_BOUND.max(job.actual_run_time) as f64).max(1.0);
            used_area += f64::from(job.num_required_processors) * job.actual_run_time as f64;
        }
        let makespan = if count == 0 { 0 } else { last_end - first_submit };
        let denom = count.max(1) as f64;
        let capacity_area = f64::from(capacity) * makespan as f64;
        RunStats {
            jobs: count,
            makespan,
            mean_wait: wait_sum / denom,
            mean_bounded_slowdown: bsld_sum / denom,
            utilization: if capacity_area > 0.0 { used_area / capacity_area } else { 0.0 },
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "jobs:                 {}", self.jobs)?;
        writeln!(f, "makespan:             {}s", self.makespan)?;
        writeln!(f, "mean wait:            {:.2}s", self.mean_wait)?;
        writeln!(f, "mean bounded slowdown: {:.4}", self.mean_bounded_slowdown)?;
        write!(f, "utilization:          {:.4}", self.utilization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swfsim_core::Job;

    #[test]
    fn metrics_over_two_jobs() {
        let mut a = Job::new(1, 0, 2, 100, 100, 1, 1, 1);
        a.start_time = Some(0);
        let mut b = Job::new(2, 0, 2, 100, 100, 1, 1, 1);
        b.start_time = Some(100);

        let stats = RunStats::compute([&a, &b], 2);
        assert_eq!(stats.jobs, 2);
        assert_eq!(stats.makespan, 200);
        assert_eq!(stats.mean_wait, 50.0);
        // Both jobs use the full machine while running.
        assert!((stats.utilization - 1.0).abs() < 1e-9);
        // b waited 100s over a 100s run: slowdown 2; a: 1.
        assert!((stats.mean_bounded_slowdown - 1.5).abs() < 1e-9);
    }
}
