// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Memory pooling for reducing allocation churn
//!
//! Short-lived objects that are created every frame (event invocations,
//! collision records) are recycled through a [`Pool`] instead of being
//! dropped. A pool is a free list guarded by a mutex whose critical section
//! is a single push or pop, so it is safe to share across threads.

use crate::sync::lock;
use log::debug;
use std::sync::Mutex;

/// Configuration for pool behavior
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of free slots reserved up front
    pub initial_capacity: usize,
    /// Maximum number of idle objects kept for reuse
    pub max_pool_size: usize,
    /// Whether to log when the pool has to allocate a fresh object
    pub log_resize_events: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            initial_capacity: 64,
            max_pool_size: 1024,
            log_resize_events: false,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with custom settings
    pub fn new(initial_capacity: usize, max_pool_size: usize) -> Self {
        PoolConfig {
            initial_capacity,
            max_pool_size,
            log_resize_events: false,
        }
    }

    /// Enable logging for allocation events
    pub fn with_logging(mut self) -> Self {
        self.log_resize_events = true;
        self
    }
}

/// Statistics for monitoring pool performance
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of times an object was reused from the pool
    pub hits: usize,
    /// Number of times a new object had to be created
    pub misses: usize,
    /// Number of objects dropped because the pool was full
    pub discarded: usize,
    /// Current number of idle objects in the pool
    pub pool_size: usize,
    /// Peak number of idle objects ever held
    pub peak_size: usize,
}

impl PoolStats {
    /// Calculate the hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct PoolState<T> {
    free: Vec<T>,
    stats: PoolStats,
}

/// Thread-safe free list of reusable objects
///
/// Objects are handed out by [`Pool::acquire_with`] and handed back with
/// [`Pool::release`]. The caller is responsible for resetting an object
/// before it is released.
pub struct Pool<T> {
    state: Mutex<PoolState<T>>,
    config: PoolConfig,
}

impl<T> Pool<T> {
    /// Create a new pool with default configuration
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a new pool with custom configuration
    pub fn with_config(config: PoolConfig) -> Self {
        Pool {
            state: Mutex::new(PoolState {
                free: Vec::with_capacity(config.initial_capacity.min(config.max_pool_size)),
                stats: PoolStats::default(),
            }),
            config,
        }
    }

    /// Take an idle object, or build a new one with `create`
    pub fn acquire_with(&self, create: impl FnOnce() -> T) -> T {
        let reused = {
            let mut state = lock(&self.state);
            let item = state.free.pop();
            if item.is_some() {
                state.stats.hits += 1;
            } else {
                state.stats.misses += 1;
            }
            state.stats.pool_size = state.free.len();
            item
        };

        match reused {
            Some(item) => item,
            None => {
                if self.config.log_resize_events {
                    debug!(
                        "Pool<{}>: allocating new object (hit rate: {:.1}%)",
                        std::any::type_name::<T>(),
                        self.stats().hit_rate()
                    );
                }
                create()
            }
        }
    }

    /// Return an object for reuse
    ///
    /// Dropped instead when the pool already holds `max_pool_size` objects.
    pub fn release(&self, item: T) {
        let mut state = lock(&self.state);
        if state.free.len() < self.config.max_pool_size {
            state.free.push(item);
            state.stats.pool_size = state.free.len();
            if state.stats.pool_size > state.stats.peak_size {
                state.stats.peak_size = state.stats.pool_size;
            }
        } else {
            state.stats.discarded += 1;
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        lock(&self.state).stats.clone()
    }

    /// Drop every idle object
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.free.clear();
        state.stats.pool_size = 0;
    }

    /// Get the current number of idle objects
    pub fn len(&self) -> usize {
        lock(&self.state).free.len()
    }

    /// Check if the pool holds no idle objects
    pub fn is_empty(&self) -> bool {
        lock(&self.state).free.is_empty()
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_capacity, 64);
        assert_eq!(config.max_pool_size, 1024);
        assert!(!config.log_resize_events);
    }

    #[test]
    fn test_pool_config_custom() {
        let config = PoolConfig::new(128, 16).with_logging();
        assert_eq!(config.initial_capacity, 128);
        assert_eq!(config.max_pool_size, 16);
        assert!(config.log_resize_events);
    }

    #[test]
    fn test_acquire_and_release() {
        let pool: Pool<Vec<u32>> = Pool::new();
        assert!(pool.is_empty());

        let mut buffer = pool.acquire_with(Vec::new);
        buffer.push(42);
        buffer.clear();
        pool.release(buffer);

        assert_eq!(pool.len(), 1);
        let stats = pool.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_reuse_skips_factory() {
        let pool: Pool<Vec<u32>> = Pool::new();
        pool.release(Vec::with_capacity(32));

        let buffer = pool.acquire_with(|| panic!("factory must not run on a hit"));
        assert!(buffer.capacity() >= 32);

        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate(), 100.0);
    }

    #[test]
    fn test_max_size() {
        let pool: Pool<u32> = Pool::with_config(PoolConfig::new(2, 2));
        pool.release(1);
        pool.release(2);
        pool.release(3);

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stats().discarded, 1);
        assert_eq!(pool.stats().peak_size, 2);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let pool: Arc<Pool<u64>> = Arc::new(Pool::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let item = pool.acquire_with(|| i);
                        pool.release(item);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.hits + stats.misses, 400);
        assert!(pool.len() <= 4);
    }

    #[test]
    fn test_clear() {
        let pool: Pool<u8> = Pool::new();
        pool.release(1);
        pool.release(2);
        pool.clear();
        assert!(pool.is_empty());
    }
}
