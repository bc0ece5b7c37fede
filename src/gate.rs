//! Concurrency Gate
//!
//! Bounds how many upstream fetches are in flight across the whole process,
//! whatever resource type or key they are for. Admission is a
//! `tokio::sync::Semaphore` permit wrapped in [`GatePermit`], which returns its
//! slot when dropped, so release happens on every exit path: success, error,
//! panic unwind, or the holding future being cancelled.
//!
//! Waiting in [`ConcurrencyGate::acquire`] is cancel-safe: dropping the future
//! before it resolves never consumes a slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info};

use crate::error::CacheError;

/// Process-wide admission control for upstream calls
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `capacity` concurrent holders
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConfigurationInvalid` if `capacity` is zero or
    /// exceeds what the underlying semaphore supports.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::config(
                "concurrency budget must be a positive integer",
            ));
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(CacheError::config(format!(
                "concurrency budget {capacity} exceeds {}",
                Semaphore::MAX_PERMITS
            )));
        }

        info!(max_concurrent = capacity, "Concurrency gate initialized");

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Wait for a free slot
    ///
    /// # Errors
    ///
    /// Returns `CacheError::GateClosed` once [`close`](Self::close) was called.
    pub async fn acquire(&self) -> Result<GatePermit, CacheError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| CacheError::GateClosed)?;
        Ok(self.admit(permit))
    }

    /// Take a slot only if one is free right now
    #[must_use]
    pub fn try_acquire(&self) -> Option<GatePermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(self.admit(permit)),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => None,
        }
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> GatePermit {
        let held = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(in_flight = held, capacity = self.capacity, "Acquired concurrency slot");
        GatePermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Stop admitting: waiting and future `acquire` calls fail with
    /// `GateClosed`. Permits already held stay valid until dropped.
    pub fn close(&self) {
        info!("Concurrency gate closed");
        self.semaphore.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// One admitted upstream call; the slot is returned when this is dropped
#[must_use = "the slot is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl GatePermit {
    /// Return the slot explicitly
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        // runs before the semaphore permit field is dropped
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            ConcurrencyGate::new(0),
            Err(CacheError::ConfigurationInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_acquire_and_release_restore_slots() {
        let gate = ConcurrencyGate::new(2).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(gate.available(), 2);

        let first = gate.acquire().await.ok();
        let second = gate.acquire().await.ok();
        assert_eq!(gate.available(), 0);
        assert_eq!(gate.in_flight(), 2);
        assert!(gate.try_acquire().is_none());

        if let Some(permit) = first {
            permit.release();
        }
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.in_flight(), 1);

        drop(second);
        assert_eq!(gate.available(), 2);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_does_not_leak() {
        let gate = ConcurrencyGate::new(1).unwrap_or_else(|e| panic!("{e}"));
        let held = gate.acquire().await.ok();

        let waited = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(waited.is_err(), "second acquire must wait");

        drop(held);
        assert_eq!(gate.available(), 1);
        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_panicking_holder_releases() {
        let gate = Arc::new(ConcurrencyGate::new(1).unwrap_or_else(|e| panic!("{e}")));

        let task_gate = Arc::clone(&gate);
        let joined = tokio::spawn(async move {
            let _permit = task_gate.acquire().await;
            panic!("fetch blew up");
        })
        .await;

        assert!(joined.is_err());
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_waiters() {
        let gate = ConcurrencyGate::new(1).unwrap_or_else(|e| panic!("{e}"));
        let held = gate.acquire().await.ok();
        gate.close();

        assert!(matches!(gate.acquire().await, Err(CacheError::GateClosed)));
        assert!(gate.try_acquire().is_none());
        assert!(gate.is_closed());
        drop(held);
    }
}
