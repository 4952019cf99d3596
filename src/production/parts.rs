//! Bounded raw-material stock.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::ProductionError;

/// Counting guard over the raw material available to every station.
///
/// The available count lives in `[0, capacity]`: parts are only ever handed
/// back through a [`PartGuard`], so a release can never exceed what was taken.
/// Waiters are served in FIFO order and one released part wakes exactly one
/// waiter.
pub struct PartsPool {
    capacity: usize,
    parts: Semaphore,
    waiting: AtomicUsize,
}

/// One part taken from the pool. Dropping it (or calling
/// [`PartGuard::release`]) returns the part.
#[must_use = "dropping the guard returns the part immediately"]
pub struct PartGuard<'a> {
    _permit: SemaphorePermit<'a>,
}

impl PartGuard<'_> {
    pub fn release(self) {}
}

impl PartsPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            parts: Semaphore::new(capacity),
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Parts currently on the shelf.
    pub fn available(&self) -> usize {
        self.parts.available_permits()
    }

    /// Callers currently parked in [`PartsPool::acquire`].
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Takes one part, waiting while the pool is depleted.
    ///
    /// # Errors
    /// Returns [`ProductionError::Cancelled`] if `cancel` fires while waiting.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<PartGuard<'_>, ProductionError> {
        if let Some(guard) = self.try_acquire() {
            return Ok(guard);
        }

        let _waiting = WaitingMark::new(&self.waiting);
        trace!(available = self.available(), "Waiting for a part");
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProductionError::Cancelled),
            permit = self.parts.acquire() => permit,
        };
        permit
            .map(|permit| PartGuard { _permit: permit })
            .map_err(|_| ProductionError::ResourceClosed("parts pool"))
    }

    /// Takes one part if any is available, without waiting.
    pub fn try_acquire(&self) -> Option<PartGuard<'_>> {
        self.parts
            .try_acquire()
            .ok()
            .map(|permit| PartGuard { _permit: permit })
    }
}

/// Counts a parked caller for as long as it is alive, including when the
/// waiting future is dropped.
struct WaitingMark<'a>(&'a AtomicUsize);

impl<'a> WaitingMark<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingMark<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
