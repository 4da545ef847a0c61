//! Bounded pools of outbound transport handles.
//!
//! # Responsibilities
//! - Pre-create handles up to capacity
//! - Hand out one handle per in-flight request
//! - Return handles on guard drop, closing any beyond capacity
//!
//! # Design Decisions
//! - An empty pool creates a fresh handle instead of waiting
//! - The mutex only guards list mutation; handles are built outside it
//! - `Pooled<T>` releases on drop so no completion path can leak a handle

pub mod client;
pub mod endpoint;

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::observability::metrics;

pub use client::{http_client_pool, HttpClient, HttpClientPool};
pub use endpoint::{coap_endpoint_pool, CoapEndpointPool};

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// A pool of reusable handles of type `T`.
pub struct ResourcePool<T> {
    name: &'static str,
    capacity: usize,
    idle: Mutex<VecDeque<T>>,
    factory: Factory<T>,
}

impl<T: Send + 'static> ResourcePool<T> {
    /// Create a pool holding `capacity` handles built by `factory`.
    pub fn new(
        name: &'static str,
        capacity: usize,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> Arc<Self> {
        let idle = (0..capacity).map(|_| factory()).collect();
        tracing::debug!(pool = name, capacity, "Resource pool created");
        Arc::new(Self {
            name,
            capacity,
            idle: Mutex::new(idle),
            factory: Box::new(factory),
        })
    }

    /// Take a handle, creating a new one when none is idle.
    pub fn acquire(self: &Arc<Self>) -> Pooled<T> {
        let handle = self.lock().pop_front();
        let handle = match handle {
            Some(h) => h,
            None => {
                tracing::warn!(
                    pool = self.name,
                    capacity = self.capacity,
                    "Pool exhausted, creating a new handle"
                );
                metrics::record_pool_exhausted(self.name);
                (self.factory)()
            }
        };
        Pooled {
            handle: Some(handle),
            pool: self.clone(),
        }
    }

    /// Give a handle back; it is dropped if the pool is already full.
    pub fn release(&self, handle: T) {
        let overflow = {
            let mut idle = self.lock();
            if idle.len() < self.capacity {
                idle.push_back(handle);
                None
            } else {
                Some(handle)
            }
        };
        if let Some(handle) = overflow {
            tracing::debug!(pool = self.name, "Pool full, closing handle");
            drop(handle);
        }
    }

    /// Number of handles currently waiting in the pool.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // The list is always left consistent, so a poisoned lock is still usable.
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// A handle on loan from a pool; returned when dropped.
pub struct Pooled<T: Send + 'static> {
    handle: Option<T>,
    pool: Arc<ResourcePool<T>>,
}

impl<T: Send + 'static> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `drop` takes the handle.
        match &self.handle {
            Some(h) => h,
            None => unreachable!("pooled handle used after release"),
        }
    }
}

impl<T: Send + 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_pool(capacity: usize) -> (Arc<ResourcePool<usize>>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let pool = ResourcePool::new("test", capacity, move || {
            counter.fetch_add(1, Ordering::SeqCst)
        });
        (pool, created)
    }

    #[test]
    fn precreates_up_to_capacity() {
        let (pool, created) = counting_pool(3);
        assert_eq!(pool.idle(), 3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn guard_returns_handle_on_drop() {
        let (pool, _) = counting_pool(2);
        {
            let handle = pool.acquire();
            assert_eq!(*handle, 0);
            assert_eq!(pool.idle(), 1);
        }
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn exhaustion_creates_and_overflow_is_closed() {
        let (pool, created) = counting_pool(1);
        let first = pool.acquire();
        let second = pool.acquire();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle(), 0);
        assert_ne!(*first, *second);

        drop(first);
        drop(second);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn never_exceeds_capacity_under_concurrency() {
        let (pool, _) = counting_pool(4);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let a = pool.acquire();
                        let b = pool.acquire();
                        assert_ne!(*a, *b);
                        assert!(pool.idle() <= pool.capacity());
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(pool.idle(), 4);
    }
}
