//! # Conveyor Belt
//!
//! The bounded FIFO shared by every assembly worker (producers) and every
//! distribution handler (consumers). It is the only synchronization point
//! between production and distribution.
//!
//! ## Layout
//!
//! Two counting semaphores track the belt state alongside the queue:
//! - `free_slots` starts at `capacity` and is consumed by `enqueue`.
//! - `queued` starts at zero and is consumed by `dequeue`.
//!
//! A permit is taken *before* the queue lock and handed to the other semaphore
//! *after* it, so the queue length never leaves `[0, capacity]` and a woken
//! consumer always finds a unit at the head.
//!
//! Both waits are cancel-safe: a dropped `enqueue`/`dequeue` future that has
//! not yet won its permit leaves the belt untouched.

mod error;

pub use error::*;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::Unit;

pub struct ConveyorBelt {
    capacity: usize,
    queue: Mutex<VecDeque<Unit>>,
    free_slots: Semaphore,
    queued: Semaphore,
    peak: AtomicUsize,
}

impl ConveyorBelt {
    /// Creates an empty belt holding at most `capacity` units.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            free_slots: Semaphore::new(capacity),
            queued: Semaphore::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current occupancy. The value is a snapshot and may be stale by the
    /// time the caller acts on it.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest occupancy ever observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Places a unit at the tail, waiting while the belt is full.
    ///
    /// Returns the occupancy right after insertion.
    ///
    /// # Errors
    /// - [`BeltError::EnqueueCancelled`] carrying the unit back if `cancel` fires first
    /// - [`BeltError::Closed`] if the belt was closed
    pub async fn enqueue(&self, unit: Unit, cancel: &CancellationToken) -> Result<usize, BeltError> {
        let slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BeltError::EnqueueCancelled(Box::new(unit))),
            slot = self.free_slots.acquire() => slot,
        };
        let Ok(slot) = slot else {
            return Err(BeltError::Closed);
        };
        slot.forget();

        let occupancy = {
            let mut queue = self.lock();
            queue.push_back(unit);
            queue.len()
        };
        self.peak.fetch_max(occupancy, Ordering::SeqCst);
        self.queued.add_permits(1);
        debug!(occupancy, capacity = self.capacity, "Enqueued");
        Ok(occupancy)
    }

    /// Removes the unit at the head, waiting while the belt is empty.
    ///
    /// # Errors
    /// - [`BeltError::Cancelled`] if `cancel` fires first
    /// - [`BeltError::Closed`] if the belt was closed
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Result<Unit, BeltError> {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BeltError::Cancelled),
            item = self.queued.acquire() => item,
        };
        let Ok(item) = item else {
            return Err(BeltError::Closed);
        };
        item.forget();
        self.pop_front()
    }

    /// Removes the head unit if one is queued, without waiting.
    pub fn try_dequeue(&self) -> Option<Unit> {
        let item = self.queued.try_acquire().ok()?;
        item.forget();
        self.pop_front().ok()
    }

    /// Closes the belt: parked and future `enqueue`/`dequeue` calls fail with
    /// [`BeltError::Closed`]. Units already queued stay retrievable via
    /// [`ConveyorBelt::drain`].
    pub fn close(&self) {
        self.free_slots.close();
        self.queued.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queued.is_closed()
    }

    /// Takes every queued unit, oldest first.
    pub fn drain(&self) -> Vec<Unit> {
        self.lock().drain(..).collect()
    }

    fn pop_front(&self) -> Result<Unit, BeltError> {
        // `queued` permits mirror the queue length, so the head exists unless
        // a concurrent drain emptied a closed belt.
        let unit = self.lock().pop_front().ok_or(BeltError::Closed)?;
        self.free_slots.add_permits(1);
        debug!(unit_id = unit.id(), "Dequeued");
        Ok(unit)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Unit>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnitIdIssuer;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn unit(ids: &UnitIdIssuer, station: usize) -> Unit {
        Unit::assemble(ids, station, 0, 0)
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let belt = ConveyorBelt::new(4);
        let cancel = CancellationToken::new();
        let ids = UnitIdIssuer::new();

        for _ in 0..4 {
            belt.enqueue(unit(&ids, 0), &cancel).await.unwrap();
        }
        assert_eq!(belt.len(), 4);

        let mut out = Vec::new();
        for _ in 0..4 {
            out.push(belt.dequeue(&cancel).await.unwrap().id());
        }
        assert_eq!(out, vec![1, 2, 3, 4]);
        assert!(belt.is_empty());
    }

    #[tokio::test]
    async fn enqueue_waits_while_full() {
        let belt = Arc::new(ConveyorBelt::new(1));
        let cancel = CancellationToken::new();
        let ids = UnitIdIssuer::new();

        belt.enqueue(unit(&ids, 0), &cancel).await.unwrap();

        let blocked = {
            let belt = belt.clone();
            let cancel = cancel.clone();
            let next = unit(&ids, 1);
            tokio::spawn(async move { belt.enqueue(next, &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished(), "enqueue should block on a full belt");
        assert_eq!(belt.len(), 1);

        let first = belt.dequeue(&cancel).await.unwrap();
        assert_eq!(first.id(), 1);

        let occupancy = timeout(Duration::from_secs(2), blocked)
            .await
            .expect("enqueue should resume once a slot frees")
            .unwrap()
            .unwrap();
        assert_eq!(occupancy, 1);
        assert_eq!(belt.peak(), 1);
    }

    #[tokio::test]
    async fn dequeue_waits_for_a_unit() {
        let belt = Arc::new(ConveyorBelt::new(2));
        let cancel = CancellationToken::new();
        let ids = UnitIdIssuer::new();

        let consumer = {
            let belt = belt.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { belt.dequeue(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!consumer.is_finished());

        belt.enqueue(unit(&ids, 0), &cancel).await.unwrap();
        let got = timeout(Duration::from_secs(2), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got.id(), 1);
    }

    #[tokio::test]
    async fn cancelled_enqueue_returns_the_unit() {
        let belt = ConveyorBelt::new(1);
        let cancel = CancellationToken::new();
        let ids = UnitIdIssuer::new();
        belt.enqueue(unit(&ids, 0), &cancel).await.unwrap();

        let pending = unit(&ids, 0);
        let pending_id = pending.id();
        let stop = CancellationToken::new();
        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.cancel();
        });

        match belt.enqueue(pending, &stop).await {
            Err(BeltError::EnqueueCancelled(unit)) => assert_eq!(unit.id(), pending_id),
            other => panic!("expected EnqueueCancelled, got {:?}", other),
        }
        assert_eq!(belt.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_dequeue_leaves_belt_usable() {
        let belt = ConveyorBelt::new(1);
        let stop = CancellationToken::new();
        stop.cancel();
        assert_eq!(belt.dequeue(&stop).await, Err(BeltError::Cancelled));

        let cancel = CancellationToken::new();
        let ids = UnitIdIssuer::new();
        belt.enqueue(unit(&ids, 0), &cancel).await.unwrap();
        assert_eq!(belt.dequeue(&cancel).await.unwrap().id(), 1);
    }

    #[tokio::test]
    async fn close_wakes_parked_consumers_and_keeps_leftovers() {
        let belt = Arc::new(ConveyorBelt::new(2));
        let cancel = CancellationToken::new();

        let consumer = {
            let belt = belt.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { belt.dequeue(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        belt.close();
        let result = timeout(Duration::from_secs(2), consumer).await.unwrap().unwrap();
        assert_eq!(result, Err(BeltError::Closed));
        assert!(belt.is_closed());

        let ids = UnitIdIssuer::new();
        assert!(matches!(
            belt.enqueue(unit(&ids, 0), &cancel).await,
            Err(BeltError::Closed)
        ));
        assert!(belt.drain().is_empty());
    }

    #[test]
    fn try_dequeue_on_empty_belt_returns_none() {
        let belt = ConveyorBelt::new(3);
        assert!(belt.try_dequeue().is_none());
    }
}
