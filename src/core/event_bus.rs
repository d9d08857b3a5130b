// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Motion event delivery
//!
//! Two boundaries: callbacks run synchronously on the detecting task, and a
//! bounded broadcast channel feeds asynchronous consumers. Publishing never
//! blocks; a subscriber that falls behind sees `RecvError::Lagged(n)` and
//! loses the oldest events.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::detection::CoordinatorResult;

/// Synchronous motion listener
pub type MotionCallback = Box<dyn Fn(&CoordinatorResult) + Send + Sync + 'static>;

/// Fan-out of detected-motion results
pub struct EventBus {
    motion_tx: broadcast::Sender<CoordinatorResult>,
    callbacks: RwLock<Vec<MotionCallback>>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (motion_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            motion_tx,
            callbacks: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
        }
    }

    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&CoordinatorResult) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Box::new(callback));
    }

    pub fn publish_motion(&self, result: &CoordinatorResult) {
        self.published.fetch_add(1, Ordering::Relaxed);

        for callback in self.callbacks.read().iter() {
            callback(result);
        }

        // No receivers is not an error
        if self.motion_tx.send(result.clone()).is_err() {
            debug!("No motion subscribers for result {}", result.id);
        }
    }

    pub fn subscribe_motion(&self) -> broadcast::Receiver<CoordinatorResult> {
        self.motion_tx.subscribe()
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
