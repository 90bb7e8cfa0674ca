// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Asynchronous rate update queue.

Rate updates arrive from callback contexts that pre-empt the timer (fabric
packets and host messages). The queue lets those paths stay short and
non-blocking: they push, and the tick scheduler drains everything pending at
the start of the next tick. No atomicity across multiple sources is
promised; an update enqueued mid-tick takes effect from the following tick.

Copyright 2025 Neuraville Inc.
Licensed under the Apache License, Version 2.0
*/

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A single rate update command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateUpdate {
    /// Global source id (before windowing to this instance).
    pub source_id: u32,
    /// New rate in hertz.
    pub rate_hz: f64,
}

/// Thread-safe queue of pending rate updates.
///
/// Intake paths push (non-blocking, just a mutex on the queue); the tick
/// thread consumes between sweeps.
pub struct RateUpdateQueue {
    queue: Arc<Mutex<VecDeque<RateUpdate>>>,
}

impl RateUpdateQueue {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(16))),
        }
    }

    /// Push a rate update (called from an intake callback).
    pub fn push(&self, update: RateUpdate) {
        self.queue.lock().unwrap().push_back(update);
    }

    /// Drain all pending updates (called from the tick thread).
    pub fn drain_all(&self) -> Vec<RateUpdate> {
        self.queue.lock().unwrap().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

impl Default for RateUpdateQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RateUpdateQueue {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}
