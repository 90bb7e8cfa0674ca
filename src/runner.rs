// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Timer-driven tick loop.
//!
//! Runs the engine's tick callback from a dedicated thread at the period
//! read from the system region. One thread means the timer is non-reentrant
//! by construction; intake callbacks stay decoupled through the rate update
//! queue, so they never contend for the core lock while a tick is running.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::core::SpikeSourceCore;
use crate::error::SpikeSourceError;

/// Background driver for a [`SpikeSourceCore`].
pub struct TickRunner {
    core: Arc<Mutex<SpikeSourceCore>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl TickRunner {
    pub fn new(core: SpikeSourceCore) -> Self {
        Self {
            core: Arc::new(Mutex::new(core)),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Shared handle to the core, for resume and host-side inspection while
    /// the loop is stopped.
    pub fn core(&self) -> Arc<Mutex<SpikeSourceCore>> {
        Arc::clone(&self.core)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start ticking in a background thread. The loop exits on its own when
    /// the core pauses at the end of the configured run.
    pub fn start(&mut self) -> Result<(), SpikeSourceError> {
        if self.running.load(Ordering::Acquire) {
            return Err(SpikeSourceError::AlreadyRunning);
        }
        let period = self.core.lock().timer_period();
        info!("starting tick loop with period {:?}", period);
        self.running.store(true, Ordering::Release);

        let core = Arc::clone(&self.core);
        let running = Arc::clone(&self.running);
        self.thread_handle = Some(
            thread::Builder::new()
                .name("spike-source-ticks".to_string())
                .spawn(move || {
                    let mut next_tick = Instant::now();
                    while running.load(Ordering::Acquire) {
                        {
                            let mut core = core.lock();
                            match core.on_timer_tick() {
                                Ok(()) => {
                                    if core.is_paused() {
                                        info!("core paused, tick loop exiting");
                                        break;
                                    }
                                }
                                Err(e) => {
                                    error!("tick failed: {e}");
                                    break;
                                }
                            }
                        }
                        next_tick += period;
                        let now = Instant::now();
                        if next_tick > now {
                            thread::sleep(next_tick - now);
                        } else {
                            // fell behind; tick immediately and rebase
                            next_tick = now;
                        }
                    }
                    running.store(false, Ordering::Release);
                })
                .map_err(SpikeSourceError::Io)?,
        );
        Ok(())
    }

    /// Stop the loop and wait for the thread to finish.
    pub fn stop(&mut self) {
        if self.thread_handle.is_none() {
            return;
        }
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("tick thread panicked during shutdown");
            } else {
                info!("tick loop stopped");
            }
        }
    }
}

impl Drop for TickRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
