//! Temporal slice map of reserved future occupancy.
//!
//! A piecewise-constant step function of free processors on `[now, +inf)`,
//! with the tail slice extending to infinity, plus one reservation record
//! per job so reservations can be cancelled or extended. Slices wholly in
//! the past are collapsed by [`CpuSnapshot::archive_old_slices`].

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Included, Unbounded};

use swfsim_core::{Job, JobId, Time};

use crate::error::SchedulingError;

#[derive(Debug, Clone, Copy)]
struct Reservation {
    start: Time,
    end: Time,
    processors: u32,
}

/// Free-capacity step function with per-job reservations.
#[derive(Debug)]
pub struct CpuSnapshot {
    capacity: u32,
    /// Free processors on `[key, next key)`; the last entry extends forever.
    slices: BTreeMap<Time, u32>,
    reservations: HashMap<JobId, Reservation>,
    base: Time,
}

fn duration_of(job: &Job) -> Time {
    // Zero-duration jobs occupy one second.
    job.predicted_run_time().max(1)
}

impl CpuSnapshot {
    /// A fully free snapshot.
    pub fn new(capacity: u32) -> Self {
        let mut slices = BTreeMap::new();
        slices.insert(0, capacity);
        Self {
            capacity,
            slices,
            reservations: HashMap::new(),
            base: 0,
        }
    }

    /// Free processors at instant `t`.
    pub fn free_processors_available_at(&self, t: Time) -> u32 {
        let t = t.max(self.base);
        *self
            .slices
            .range((Unbounded, Included(t)))
            .next_back()
            .expect("snapshot always covers its base")
            .1
    }

    fn min_free_in(&self, start: Time, end: Time) -> u32 {
        let mut min = self.free_processors_available_at(start);
        for (_, &free) in self.slices.range((Excluded(start), Excluded(end))) {
            min = min.min(free);
        }
        min
    }

    fn split_at(&mut self, t: Time) {
        if t > self.base && !self.slices.contains_key(&t) {
            let v = self.free_processors_available_at(t);
            self.slices.insert(t, v);
        }
    }

    fn coalesce_at(&mut self, t: Time) {
        if t <= self.base {
            return;
        }
        let Some(&v) = self.slices.get(&t) else { return };
        let prev = *self
            .slices
            .range((Unbounded, Excluded(t)))
            .next_back()
            .expect("base entry precedes any boundary")
            .1;
        if prev == v {
            self.slices.remove(&t);
        }
    }

    fn apply(&mut self, start: Time, end: Time, delta: i64) {
        let start = start.max(self.base);
        if end <= start {
            return;
        }
        self.split_at(start);
        self.split_at(end);
        let keys: Vec<Time> = self
            .slices
            .range((Included(start), Excluded(end)))
            .map(|(k, _)| *k)
            .collect();
        for k in keys {
            let v = self.slices.get_mut(&k).expect("key just listed");
            let next = i64::from(*v) - delta;
            debug_assert!((0..=i64::from(self.capacity)).contains(&next));
            *v = next.clamp(0, i64::from(self.capacity)) as u32;
        }
        self.coalesce_at(end);
        self.coalesce_at(start);
    }

    /// Reserves the job over `[start, start + predicted_run_time)`.
    ///
    /// Fails when free capacity is insufficient anywhere in the interval or
    /// when the prediction exceeds the user estimate.
    pub fn assign_job(&mut self, job: &Job, start: Time) -> Result<(), SchedulingError> {
        if job.predicted_run_time() > job.user_estimated_run_time {
            return Err(SchedulingError::ReservationUnfit { job: job.id, time: start });
        }
        let end = start + duration_of(job);
        if self.min_free_in(start.max(self.base), end) < job.num_required_processors {
            return Err(SchedulingError::ReservationUnfit { job: job.id, time: start });
        }
        self.apply(start, end, i64::from(job.num_required_processors));
        self.reservations.insert(
            job.id,
            Reservation { start, end, processors: job.num_required_processors },
        );
        Ok(())
    }

    /// Feasibility of an immediate start, without mutating anything.
    pub fn can_job_start_now(&self, job: &Job, now: Time) -> bool {
        let start = now.max(self.base);
        self.min_free_in(start, start + duration_of(job)) >= job.num_required_processors
    }

    /// Reserves the job at the earliest `t >= now` where it fits and
    /// returns that time.
    pub fn assign_job_earliest(&mut self, job: &Job, now: Time) -> Result<Time, SchedulingError> {
        let duration = duration_of(job);
        let procs = job.num_required_processors;
        let mut t = now.max(self.base);
        loop {
            if self.free_processors_available_at(t) < procs {
                match self
                    .slices
                    .range((Excluded(t), Unbounded))
                    .find(|&(_, &free)| free >= procs)
                {
                    Some((&k, _)) => t = k,
                    None => return Err(SchedulingError::NeverRuns { job: job.id }),
                }
                continue;
            }
            match self
                .slices
                .range((Excluded(t), Excluded(t + duration)))
                .find(|&(_, &free)| free < procs)
            {
                None => break,
                Some((&k, _)) => t = k,
            }
        }
        self.assign_job(job, t)?;
        Ok(t)
    }

    /// Cancels the job's whole reservation.
    pub fn del_job(&mut self, job: &Job) {
        if let Some(r) = self.reservations.remove(&job.id) {
            self.apply(r.start, r.end, -i64::from(r.processors));
        } else {
            log::error!("cancelling a reservation that does not exist for job {}", job.id);
        }
    }

    /// Cancels the portion of the job's reservation from `now` onward.
    /// Used when a job terminates earlier than its reserved end.
    pub fn del_tail_of_job(&mut self, job: &Job, now: Time) {
        if let Some(r) = self.reservations.remove(&job.id) {
            if now < r.end {
                self.apply(now.max(r.start), r.end, -i64::from(r.processors));
            }
        }
    }

    /// Lengthens (or shortens) an existing reservation to cover
    /// `new_predicted_run_time` from its original start.
    pub fn assign_tail_of_job(
        &mut self,
        job: &Job,
        new_predicted_run_time: Time,
    ) -> Result<(), SchedulingError> {
        let Some(r) = self.reservations.get(&job.id).copied() else {
            return Err(SchedulingError::ReservationUnfit { job: job.id, time: 0 });
        };
        let new_end = r.start + new_predicted_run_time.max(1);
        if new_end > r.end {
            if self.min_free_in(r.end.max(self.base), new_end) < r.processors {
                return Err(SchedulingError::ReservationUnfit { job: job.id, time: r.end });
            }
            self.apply(r.end, new_end, i64::from(r.processors));
        } else if new_end < r.end {
            self.apply(new_end, r.end, -i64::from(r.processors));
        }
        self.reservations
            .insert(job.id, Reservation { end: new_end, ..r });
        Ok(())
    }

    /// Collapses slices wholly in the past.
    pub fn archive_old_slices(&mut self, now: Time) {
        if now <= self.base {
            return;
        }
        let current = self.free_processors_available_at(now);
        let old: Vec<Time> = self
            .slices
            .range((Unbounded, Excluded(now)))
            .map(|(k, _)| *k)
            .collect();
        for k in old {
            self.slices.remove(&k);
        }
        self.slices.insert(now, current);
        self.base = now;
    }
}
