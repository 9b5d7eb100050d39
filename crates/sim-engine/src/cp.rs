//! Deterministic plan optimizer for the CP schedulers.
//!
//! The model: one interval per queued job with
//! `size = max(1, predicted_run_time)`, fixed intervals for running jobs, a
//! cumulative capacity constraint, submit-order symmetry breaking for jobs
//! of identical shape, and one of four objectives. The search is
//! an anytime optimizer under a wall-clock budget: list orders (plus an
//! optional warm start) are packed to earliest feasible starts against the
//! running-job skyline and improved by pairwise reordering until the
//! deadline; the best plan found is returned. Running out of budget is not
//! a failure — only a job that can never fit is.

use std::time::{Duration, Instant};

use swfsim_core::{JobId, ObjectiveName, Time};

use crate::usage::UsageTracker;

/// A queued job as the optimizer sees it.
#[derive(Debug, Clone)]
pub(crate) struct CpTask {
    pub(crate) job: JobId,
    pub(crate) duration: Time,
    pub(crate) processors: u32,
    pub(crate) submit_time: Time,
}

/// One scheduling problem: the running skyline plus the queue.
#[derive(Debug)]
pub(crate) struct CpInstance {
    pub(crate) capacity: u32,
    pub(crate) now: Time,
    /// `(remaining duration, processors)` per running job.
    pub(crate) running: Vec<(Time, u32)>,
    pub(crate) tasks: Vec<CpTask>,
}

/// Start offsets from `now`, aligned with [`CpInstance::tasks`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CpPlan {
    pub(crate) starts: Vec<Time>,
    pub(crate) cost: f64,
}

/// Why no plan exists.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SolveError {
    /// The job exceeds total capacity; no start time can ever work.
    #[error("job {job} can never be placed")]
    Infeasible {
        /// The unplaceable job.
        job: JobId,
    },
}

/// Objective to minimize.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Objective {
    Af,
    Awf,
    Bsld { bound: i64 },
    AspWas,
}

impl Objective {
    pub(crate) fn from_config(name: ObjectiveName, bsld_bound: i64) -> Self {
        match name {
            ObjectiveName::Af => Objective::Af,
            ObjectiveName::Awf => Objective::Awf,
            ObjectiveName::Bsld => Objective::Bsld { bound: bsld_bound },
            ObjectiveName::AspWas => Objective::AspWas,
        }
    }
}

fn skyline(inst: &CpInstance) -> UsageTracker {
    let used: u32 = inst.running.iter().map(|&(_, p)| p).sum();
    let free = i64::from(inst.capacity) - i64::from(used);
    // Minus-available convention: zero means fully used.
    let mut tracker = UsageTracker::new(-free);
    for &(remaining, processors) in &inst.running {
        tracker.remove_till_end(remaining.max(1), i64::from(processors));
    }
    tracker
}

/// Packs the queue in `order` onto the earliest feasible start times.
pub(crate) fn pack(inst: &CpInstance, order: &[usize]) -> Result<Vec<Time>, SolveError> {
    let mut tracker = skyline(inst);
    let mut starts = vec![0; inst.tasks.len()];
    for &idx in order {
        let task = &inst.tasks[idx];
        let duration = task.duration.max(1);
        let start = tracker
            .when_not_above(0, duration, -i64::from(task.processors))
            .ok_or(SolveError::Infeasible { job: task.job })?;
        tracker.add_usage(start, start + duration, i64::from(task.processors));
        starts[idx] = start;
    }
    Ok(starts)
}

/// Scores a plan under the objective (lower is better).
pub(crate) fn score(inst: &CpInstance, objective: Objective, starts: &[Time]) -> f64 {
    match objective {
        Objective::Af => inst
            .tasks
            .iter()
            .zip(starts)
            .map(|(t, &s)| (inst.now - t.submit_time + s + t.duration) as f64)
            .sum(),
        Objective::Awf => inst
            .tasks
            .iter()
            .zip(starts)
            .map(|(t, &s)| {
                f64::from(t.processors)
                    * t.duration as f64
                    * (inst.now - t.submit_time + s + t.duration) as f64
            })
            .sum(),
        Objective::Bsld { bound } => inst
            .tasks
            .iter()
            .zip(starts)
            .map(|(t, &s)| {
                let flow = (inst.now - t.submit_time + s + t.duration) as f64;
                (flow / bound.max(t.duration) as f64).max(1.0)
            })
            .sum(),
        Objective::AspWas => {
            let mut m2 = 0.0;
            let mut m3 = 0.0;
            for (t, &s) in inst.tasks.iter().zip(starts) {
                let wait = (inst.now + s - t.submit_time) as f64;
                let flow = wait + t.duration as f64;
                let p = f64::from(t.processors);
                m2 += p * (flow.powi(3) - wait.powi(3));
                m3 += p * (flow.powi(4) - wait.powi(4));
            }
            if m2 == 0.0 { 0.0 } else { m3 / m2 }
        }
    }
}

/// Reassigns starts inside groups of identical `(duration, processors)`
/// tasks so they run in submit order. The interval multiset is unchanged,
/// so feasibility is preserved.
fn break_symmetry(inst: &CpInstance, starts: &mut [Time]) {
    let mut order: Vec<usize> = (0..inst.tasks.len()).collect();
    order.sort_by_key(|&i| {
        let t = &inst.tasks[i];
        (t.duration, t.processors, t.submit_time, t.job)
    });
    let mut group = 0;
    while group < order.len() {
        let shape = {
            let t = &inst.tasks[order[group]];
            (t.duration, t.processors)
        };
        let mut end = group + 1;
        while end < order.len() {
            let t = &inst.tasks[order[end]];
            if (t.duration, t.processors) != shape {
                break;
            }
            end += 1;
        }
        if end - group > 1 {
            let mut assigned: Vec<Time> = order[group..end].iter().map(|&i| starts[i]).collect();
            assigned.sort_unstable();
            for (&idx, start) in order[group..end].iter().zip(assigned) {
                starts[idx] = start;
            }
        }
        group = end;
    }
}

fn seed_orders(inst: &CpInstance, warm_start: Option<&[Time]>) -> Vec<Vec<usize>> {
    let n = inst.tasks.len();
    let by_key = |key: fn(&CpTask) -> (i64, i64, Time, JobId)| -> Vec<usize> {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| key(&inst.tasks[i]));
        order
    };
    let mut orders = vec![
        by_key(|t| (t.submit_time, t.job as i64, 0, 0)),
        by_key(|t| (t.duration, i64::from(t.processors), t.submit_time, t.job)),
        by_key(|t| (t.duration * i64::from(t.processors), t.submit_time, 0, t.job)),
        by_key(|t| (i64::from(t.processors), t.duration, t.submit_time, t.job)),
    ];
    if let Some(warm) = warm_start {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| (warm[i], inst.tasks[i].submit_time, inst.tasks[i].job));
        orders.push(order);
    }
    orders
}

/// Solves one instance within `time_limit`.
pub(crate) fn solve(
    inst: &CpInstance,
    objective: Objective,
    time_limit: Duration,
    warm_start: Option<&[Time]>,
) -> Result<CpPlan, SolveError> {
    let deadline = Instant::now() + time_limit;
    let evaluate = |order: &[usize]| -> Result<(Vec<Time>, f64), SolveError> {
        let mut starts = pack(inst, order)?;
        break_symmetry(inst, &mut starts);
        let cost = score(inst, objective, &starts);
        Ok((starts, cost))
    };

    let mut best_order: Vec<usize> = Vec::new();
    let mut best: Option<(Vec<Time>, f64)> = None;
    for order in seed_orders(inst, warm_start) {
        let (starts, cost) = evaluate(&order)?;
        if best.as_ref().is_none_or(|(_, c)| cost < *c) {
            best = Some((starts, cost));
            best_order = order;
        }
    }
    let (mut best_starts, mut best_cost) = best.expect("at least one seed order");

    // Pairwise-reorder local search, first improvement, until the deadline.
    let n = inst.tasks.len();
    'search: loop {
        let mut improved = false;
        for i in 0..n {
            for j in i + 1..n {
                if Instant::now() >= deadline {
                    break 'search;
                }
                best_order.swap(i, j);
                match evaluate(&best_order) {
                    Ok((starts, cost)) if cost + 1e-9 < best_cost => {
                        best_starts = starts;
                        best_cost = cost;
                        improved = true;
                    }
                    _ => best_order.swap(i, j),
                }
            }
        }
        if !improved {
            break;
        }
    }

    Ok(CpPlan { starts: best_starts, cost: best_cost })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(job: JobId, duration: Time, processors: u32, submit: Time) -> CpTask {
        CpTask { job, duration, processors, submit_time: submit }
    }

    #[test]
    fn pack_respects_capacity() {
        let inst = CpInstance {
            capacity: 4,
            now: 0,
            running: vec![(10, 2)],
            tasks: vec![task(1, 5, 2, 0), task(2, 5, 4, 0)],
        };
        let starts = pack(&inst, &[0, 1]).unwrap();
        // Task 1 fits next to the running job; task 2 needs the whole
        // machine once everything else is done.
        assert_eq!(starts, vec![0, 10]);
    }

    #[test]
    fn infeasible_task_is_reported() {
        let inst = CpInstance {
            capacity: 4,
            now: 0,
            running: vec![],
            tasks: vec![task(9, 5, 8, 0)],
        };
        assert!(matches!(pack(&inst, &[0]), Err(SolveError::Infeasible { job: 9 })));
    }

    #[test]
    fn af_prefers_short_job_first() {
        // Capacity 2; job 1 needs both processors for 10s, job 2 one for 5s.
        let inst = CpInstance {
            capacity: 2,
            now: 0,
            running: vec![],
            tasks: vec![task(1, 10, 2, 0), task(2, 5, 1, 0)],
        };
        let plan = solve(&inst, Objective::Af, Duration::from_millis(50), None).unwrap();
        // Flows: (2 first) 5 + 15 = 20 beats (1 first) 10 + 15 = 25.
        assert_eq!(plan.starts, vec![5, 0]);
        assert_eq!(plan.cost, 20.0);
    }

    #[test]
    fn symmetry_broken_by_submit_order() {
        let inst = CpInstance {
            capacity: 2,
            now: 100,
            running: vec![],
            tasks: vec![task(5, 10, 2, 60), task(4, 10, 2, 50)],
        };
        let plan = solve(&inst, Objective::Bsld { bound: 10 }, Duration::from_millis(20), None)
            .unwrap();
        // Identical shapes: the earlier submit (job 4) must start first.
        assert_eq!(plan.starts, vec![10, 0]);
    }

    #[test]
    fn warm_start_is_a_candidate() {
        let inst = CpInstance {
            capacity: 2,
            now: 0,
            running: vec![],
            tasks: vec![task(1, 10, 2, 0), task(2, 5, 1, 0)],
        };
        // A warm start already encoding the good plan, with no search time.
        let warm = vec![5, 0];
        let plan = solve(&inst, Objective::Af, Duration::ZERO, Some(&warm)).unwrap();
        assert_eq!(plan.starts, vec![5, 0]);
    }

    #[test]
    fn awf_weighs_by_area() {
        let inst = CpInstance {
            capacity: 1,
            now: 0,
            running: vec![],
            tasks: vec![task(1, 10, 1, 0), task(2, 10, 1, 0)],
        };
        let starts = pack(&inst, &[0, 1]).unwrap();
        // 10 * (10) + 10 * (20)
        assert_eq!(score(&inst, Objective::Awf, &starts), 300.0);
    }

    #[test]
    fn bsld_saturates_at_one() {
        let inst = CpInstance {
            capacity: 4,
            now: 0,
            running: vec![],
            tasks: vec![task(1, 100, 1, 0)],
        };
        let starts = pack(&inst, &[0]).unwrap();
        assert_eq!(score(&inst, Objective::Bsld { bound: 10 }, &starts), 1.0);
    }
}
