//! Bounded task pool used to run the jobs of one batch.
//!
//! The pool takes an ordered list of job factories and runs them with at most
//! `limit` in flight. Two concerns are kept separate:
//!
//! - **Admission** is driven by completion: whenever any in-flight job
//!   settles, the next job in submission order is started.
//! - **Placement** is driven by index: every outcome is written into a slot
//!   pre-allocated for its submitted position, so `results[i]` always belongs
//!   to `jobs[i]` whatever order the jobs finished in.
//!
//! All jobs are polled from the future returned by [`TaskPool::run`]; the
//! bookkeeping in [`PoolState`] is only touched by that scheduling loop and
//! jobs report back exclusively through their return value. There is no
//! cancellation and no per-job timeout: a job that never resolves keeps its
//! slot for as long as the pool is polled.

use futures_util::stream::{FuturesUnordered, StreamExt};
use log::debug;
use std::collections::HashSet;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("concurrency limit must be at least 1, got {0}")]
    InvalidLimit(usize),
}

/// Final outcome of one job.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<T, E> {
    Success(T),
    /// `index` is the position of the job in the submitted list.
    Failure { index: usize, error: E },
}

impl<T, E> Settled<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Settled::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Settled::Success(value) => Some(value),
            Settled::Failure { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&E> {
        match self {
            Settled::Success(_) => None,
            Settled::Failure { error, .. } => Some(error),
        }
    }
}

/// Counters owned by a single `run` call.
#[derive(Debug)]
struct PoolState {
    total: usize,
    completed: usize,
    in_flight: HashSet<usize>,
    peak_in_flight: usize,
}

impl PoolState {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            in_flight: HashSet::new(),
            peak_in_flight: 0,
        }
    }

    fn admit(&mut self, index: usize) {
        self.in_flight.insert(index);
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight.len());
    }

    fn settle(&mut self, index: usize) {
        if self.in_flight.remove(&index) {
            self.completed += 1;
        }
    }

    fn is_drained(&self) -> bool {
        self.completed == self.total
    }
}

/// Runs job lists under a fixed concurrency ceiling.
#[derive(Debug, Clone, Copy)]
pub struct TaskPool {
    limit: usize,
}

impl TaskPool {
    pub fn new(limit: usize) -> Result<Self, PoolError> {
        if limit < 1 {
            return Err(PoolError::InvalidLimit(limit));
        }
        Ok(Self { limit })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Runs every job and resolves once all of them settled.
    ///
    /// `on_progress(completed, total)` is called from the scheduling loop
    /// right after each job settles: exactly `jobs.len()` times, with
    /// `completed` going 1, 2, ..., total. An empty list resolves immediately
    /// without calling it.
    pub async fn run<J, Fut, T, E, P>(
        &self,
        jobs: Vec<J>,
        mut on_progress: P,
    ) -> Vec<Settled<T, E>>
    where
        J: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(usize, usize),
    {
        let total = jobs.len();
        let mut state = PoolState::new(total);
        let mut slots: Vec<Option<Settled<T, E>>> = (0..total).map(|_| None).collect();
        let mut pending = jobs.into_iter().enumerate();
        let mut running = FuturesUnordered::new();

        while !state.is_drained() {
            while state.in_flight.len() < self.limit {
                let Some((index, job)) = pending.next() else {
                    break;
                };
                state.admit(index);
                debug!("pool: admitted job {} ({} in flight)", index, state.in_flight.len());
                let fut = job();
                running.push(async move { (index, fut.await) });
            }

            let Some((index, outcome)) = running.next().await else {
                break;
            };
            state.settle(index);
            slots[index] = Some(match outcome {
                Ok(value) => Settled::Success(value),
                Err(error) => Settled::Failure { index, error },
            });
            debug!("pool: job {} settled ({}/{})", index, state.completed, state.total);
            on_progress(state.completed, state.total);
        }

        debug!(
            "pool: drained {} jobs, peak {} in flight (limit {})",
            state.total, state.peak_in_flight, self.limit
        );
        slots.into_iter().flatten().collect()
    }
}

/// Validates `limit` and runs `jobs` on a fresh [`TaskPool`].
pub async fn run_bounded<J, Fut, T, E, P>(
    jobs: Vec<J>,
    limit: usize,
    on_progress: P,
) -> Result<Vec<Settled<T, E>>, PoolError>
where
    J: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(usize, usize),
{
    let pool = TaskPool::new(limit)?;
    Ok(pool.run(jobs, on_progress).await)
}
