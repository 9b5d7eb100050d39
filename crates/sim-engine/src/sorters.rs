//! Queue ordering policies.
//!
//! All orders tie-break on `(submit_time, id)` so runs are deterministic.

use swfsim_core::{Job, JobId, SortPolicy, Time};

use crate::table::JobTable;

fn wfp_key(job: &Job, now: Time) -> f64 {
    // W. Tang, Z. Lan, N. Desai, D. Buettner, "Fault-aware, utility-based
    // job scheduling on Blue Gene/P systems", CLUSTER 2009.
    let r = job.predicted_run_time().max(1) as f64;
    let age = (job.submit_time - now) as f64 / r;
    f64::from(job.num_required_processors) * age.powi(3)
}

/// Sorts `queue` in place according to `policy`.
pub fn sort_queue(policy: SortPolicy, queue: &mut [JobId], jobs: &JobTable, now: Time) {
    match policy {
        SortPolicy::None => {}
        SortPolicy::Saf => sort_by_int(queue, jobs, |j| j.area()),
        SortPolicy::Laf => sort_by_int(queue, jobs, |j| -j.area()),
        SortPolicy::Sjf => {
            sort_by_int(queue, jobs, |j| {
                (j.predicted_run_time(), i64::from(j.num_required_processors))
            });
        }
        SortPolicy::Ljf => {
            sort_by_int(queue, jobs, |j| {
                (-j.predicted_run_time(), -i64::from(j.num_required_processors))
            });
        }
        SortPolicy::Srf => {
            sort_by_int(queue, jobs, |j| {
                (i64::from(j.num_required_processors), j.predicted_run_time())
            });
        }
        SortPolicy::Lrf => {
            sort_by_int(queue, jobs, |j| {
                (-i64::from(j.num_required_processors), -j.predicted_run_time())
            });
        }
        SortPolicy::Srd2f => {
            sort_by_int(queue, jobs, |j| (j.area() * j.predicted_run_time(), j.area()));
        }
        SortPolicy::Wfp => {
            queue.sort_by(|&a, &b| {
                let (ja, jb) = (jobs.get(a), jobs.get(b));
                wfp_key(ja, now)
                    .total_cmp(&wfp_key(jb, now))
                    .then_with(|| (ja.submit_time, ja.id).cmp(&(jb.submit_time, jb.id)))
            });
        }
    }
}

fn sort_by_int<K: Ord>(queue: &mut [JobId], jobs: &JobTable, key: impl Fn(&Job) -> K) {
    queue.sort_by(|&a, &b| {
        let (ja, jb) = (jobs.get(a), jobs.get(b));
        key(ja)
            .cmp(&key(jb))
            .then_with(|| (ja.submit_time, ja.id).cmp(&(jb.submit_time, jb.id)))
    });
}

/// A freshly sorted copy of `queue`.
pub fn sorted_queue(
    policy: SortPolicy,
    queue: &[JobId],
    jobs: &JobTable,
    now: Time,
) -> Vec<JobId> {
    let mut out = queue.to_vec();
    sort_queue(policy, &mut out, jobs, now);
    out
}
