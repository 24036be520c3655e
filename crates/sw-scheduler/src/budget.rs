//! Resizable counting permit pools.
//!
//! A [`ConcurrencyBudget`] hands out [`BudgetPermit`]s from the pool that is
//! current at acquire time. Each permit keeps its own handle to that pool, so
//! a release always lands in the generation it came from, even when the
//! budget was resized while the permit was out. A retired pool is closed so
//! its waiters retry against the new generation, and it is freed once the
//! last permit referencing it drops.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

use sw_core::{Error, Result};

/// One generation of permits.
#[derive(Debug)]
struct Pool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    generation: u64,
}

impl Pool {
    fn new(capacity: usize, generation: u64) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            generation,
        }
    }
}

/// A resizable counting permit pool shared across workers.
#[derive(Debug)]
pub struct ConcurrencyBudget {
    name: &'static str,
    pool: RwLock<Arc<Pool>>,
    in_flight: Arc<AtomicUsize>,
    next_generation: AtomicU64,
}

impl ConcurrencyBudget {
    /// Create a budget with `capacity` permits (at least one).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            pool: RwLock::new(Arc::new(Pool::new(capacity.max(1), 0))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Capacity of the current generation.
    pub fn capacity(&self) -> usize {
        self.pool.read().capacity
    }

    /// Free permits in the current generation.
    pub fn available(&self) -> usize {
        self.pool.read().semaphore.available_permits()
    }

    /// Permits currently held, across all generations.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Generation counter; bumped by every effective [`resize`](Self::resize).
    pub fn generation(&self) -> u64 {
        self.pool.read().generation
    }

    fn current(&self) -> Arc<Pool> {
        self.pool.read().clone()
    }

    fn grant(&self, permit: OwnedSemaphorePermit, pool: Arc<Pool>) -> BudgetPermit {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        BudgetPermit {
            _permit: permit,
            pool,
            in_flight: self.in_flight.clone(),
        }
    }

    /// Wait for a permit, or return [`Error::Cancelled`] once `cancel` fires.
    ///
    /// If the pool being waited on is retired by a concurrent resize, the
    /// wait restarts against the new generation.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<BudgetPermit> {
        loop {
            let pool = self.current();
            let acquired = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                acquired = pool.semaphore.clone().acquire_owned() => acquired,
            };

            match acquired {
                Ok(permit) => return Ok(self.grant(permit, pool)),
                Err(_) => {
                    tracing::trace!(
                        budget = self.name,
                        generation = pool.generation,
                        "Pool retired while waiting; retrying"
                    );
                }
            }
        }
    }

    /// Take a permit without waiting, if one is free.
    pub fn try_acquire(&self) -> Option<BudgetPermit> {
        loop {
            let pool = self.current();
            match pool.semaphore.clone().try_acquire_owned() {
                Ok(permit) => return Some(self.grant(permit, pool)),
                Err(TryAcquireError::NoPermits) => return None,
                Err(TryAcquireError::Closed) => continue,
            }
        }
    }

    /// Swap in a fresh pool of `capacity` permits (at least one).
    ///
    /// Returns `false` when the capacity is unchanged. Permits already granted
    /// stay valid and are returned to the pool they were taken from.
    pub fn resize(&self, capacity: usize) -> bool {
        let capacity = capacity.max(1);
        let retired = {
            let mut current = self.pool.write();
            if current.capacity == capacity {
                return false;
            }
            let generation = self.next_generation.fetch_add(1, Ordering::AcqRel);
            std::mem::replace(&mut *current, Arc::new(Pool::new(capacity, generation)))
        };
        retired.semaphore.close();

        tracing::info!(
            budget = self.name,
            from = retired.capacity,
            to = capacity,
            "Concurrency budget resized"
        );
        true
    }
}

/// A granted permit. Dropping it returns the permit to the generation it was
/// acquired from.
#[derive(Debug)]
pub struct BudgetPermit {
    _permit: OwnedSemaphorePermit,
    pool: Arc<Pool>,
    in_flight: Arc<AtomicUsize>,
}

impl BudgetPermit {
    /// Generation this permit was taken from.
    pub fn generation(&self) -> u64 {
        self.pool.generation
    }

    /// Capacity of the generation this permit was taken from.
    pub fn capacity(&self) -> usize {
        self.pool.capacity
    }
}

impl Drop for BudgetPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
