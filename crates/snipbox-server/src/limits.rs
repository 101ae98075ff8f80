//! Two-level concurrency limiting.
//!
//! Admission first: a plain counter against `max_requests` that rejects
//! excess load outright, so a flood never queues inside the semaphore.
//! Then the worker semaphore: `max_workers` permits, acquisition awaits
//! until a slot frees. The admission lock is never held across the worker
//! acquire.

use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct Limiter {
    max_requests: usize,
    current: Arc<Mutex<usize>>,
    workers: Arc<Semaphore>,
}

impl Limiter {
    pub fn new(max_requests: usize, max_workers: usize) -> Self {
        Self {
            max_requests,
            current: Arc::new(Mutex::new(0)),
            workers: Arc::new(Semaphore::new(max_workers)),
        }
    }

    /// Try to pass the admission gate. `None` means the caller must answer
    /// 503 immediately; the returned guard releases the slot on drop.
    pub fn try_admit(&self) -> Option<AdmissionGuard> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if *current >= self.max_requests {
            return None;
        }
        *current += 1;
        Some(AdmissionGuard {
            current: Arc::clone(&self.current),
        })
    }

    /// Wait for a worker slot. Called only after admission succeeded.
    pub async fn acquire_worker(&self) -> OwnedSemaphorePermit {
        Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .expect("worker semaphore closed")
    }
}

pub struct AdmissionGuard {
    current: Arc<Mutex<usize>>,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn admission_rejects_over_capacity() {
        let limiter = Limiter::new(2, 4);
        let a = limiter.try_admit();
        let b = limiter.try_admit();
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(limiter.try_admit().is_none());

        drop(a);
        assert!(limiter.try_admit().is_some());
    }

    #[tokio::test]
    async fn workers_block_instead_of_rejecting() {
        let limiter = Arc::new(Limiter::new(10, 1));
        let first = limiter.acquire_worker().await;

        // The second acquire must wait, not fail.
        let waiting = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire_worker().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        drop(first);
        let _second = waiting.await.unwrap();
    }
}
