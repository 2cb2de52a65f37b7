// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deduplicating work queue with delayed and rate-limited re-adds.
//!
//! A key is in at most one of three places: waiting in `ready`, being
//! processed by a worker, or idle. Adding a key that is already waiting is a
//! no-op. Adding a key that is being processed marks it dirty so it is queued
//! once more when the worker calls [`WorkQueue::done`]. A key is therefore
//! never handed to two workers at the same time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Idle,
    Queued,
    Running,
    /// Running, and queued again for when it finishes
    RunningAndQueued,
}

struct QueueState<K> {
    ready: VecDeque<K>,
    /// Keys waiting to be processed, whether in `ready` or behind a running worker
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(backoff_base: Duration, backoff_max: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            backoff_base,
            backoff_max,
        })
    }

    pub async fn add(&self, key: K) {
        {
            let mut state = self.state.lock().await;
            if state.shutting_down || !state.dirty.insert(key.clone()) {
                return;
            }
            if state.processing.contains(&key) {
                trace!("Key is running, will be queued again when it finishes");
                return;
            }
            state.ready.push_back(key);
        }
        self.notify.notify_one();
    }

    /// Add `key` once `delay` has passed, without holding a worker meanwhile
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            queue.add(key).await;
        });
    }

    /// Requeue after a delay that doubles with each consecutive failure of `key`
    pub async fn add_rate_limited(self: &Arc<Self>, key: K) -> Duration {
        let failures = {
            let mut state = self.state.lock().await;
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };
        let delay = backoff_delay(self.backoff_base, self.backoff_max, failures);
        self.add_after(key, delay);
        delay
    }

    /// Reset the failure count of `key`
    pub async fn forget(&self, key: &K) {
        self.state.lock().await.failures.remove(key);
    }

    pub async fn failures(&self, key: &K) -> u32 {
        self.state
            .lock()
            .await
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.ready.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as finished; requeue it if it was added while running
    pub async fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.state.lock().await;
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.ready.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker
    pub async fn shutdown(&self) {
        self.state.lock().await.shutting_down = true;
        self.notify.notify_waiters();
    }

    pub async fn state_of(&self, key: &K) -> KeyState {
        let state = self.state.lock().await;
        match (state.processing.contains(key), state.dirty.contains(key)) {
            (true, true) => KeyState::RunningAndQueued,
            (true, false) => KeyState::Running,
            (false, true) => KeyState::Queued,
            (false, false) => KeyState::Idle,
        }
    }

    /// Number of keys ready to be handed out
    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// `base * 2^(failures - 1)`, capped at `max`
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1);
    2u32.checked_pow(exponent)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}
