// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Per-tick spike recording buffer.
//!
//! Key semantics:
//! - Ragged bitfield: layer `k` holds one bit per source, meaning "emitted
//!   at least `k + 1` spikes this tick".
//! - Monotonic growth: capacity only increases, doubling on demand so
//!   reallocations amortise.
//! - Serialized form is `{time, n_layers, layers[0..n_layers]}` as
//!   little-endian words; layers above `n_layers` are never emitted.
//! - One transfer in flight: `flush` waits out any outstanding write before
//!   submitting, and the writer's completion callback clears the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Asynchronous block-write primitive supplied by the recording subsystem.
pub trait RecordingChannel: Send {
    /// Submit one serialized tick payload. `on_complete` must be invoked
    /// once the transfer has finished; it may be invoked from a different
    /// context than the caller's.
    fn record_and_notify(&mut self, payload: Vec<u8>, on_complete: Box<dyn FnOnce() + Send>);

    /// End-of-tick notification, sent after any flush for that tick.
    fn timestep_update(&mut self, time: u32);
}

/// Growable ragged bitfield of per-tick spike counts.
pub struct SpikeRecorder {
    enabled: bool,
    words_per_layer: usize,
    /// Bit-plane layers; `layers.len()` is the allocated capacity.
    layers: Vec<Vec<u32>>,
    /// Layers populated this tick.
    n_layers: usize,
    in_progress: Arc<AtomicBool>,
    flushes: u32,
}

impl SpikeRecorder {
    /// A recorder for `n_sources` sources. Starts unallocated; layers are
    /// created the first time a spike count needs them.
    pub fn new(n_sources: u32, enabled: bool) -> Self {
        Self {
            enabled,
            words_per_layer: (n_sources as usize).div_ceil(32),
            layers: Vec::new(),
            n_layers: 0,
            in_progress: Arc::new(AtomicBool::new(false)),
            flushes: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Allocated layer capacity.
    pub fn capacity(&self) -> usize {
        self.layers.len()
    }

    /// Layers populated since the last flush.
    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    /// Completed flush count, for provenance.
    pub fn flushes(&self) -> u32 {
        self.flushes
    }

    /// Record that `source` emitted `count` spikes this tick: bits are set
    /// in layers `0..count`, growing the buffer if `count` exceeds the
    /// current capacity.
    pub fn mark(&mut self, source: u32, count: u32) {
        if !self.enabled || count == 0 {
            return;
        }
        let count = count as usize;
        if count > self.layers.len() {
            let target = count.max(self.layers.len() * 2);
            debug!(
                "growing spike buffer from {} to {} layers",
                self.layers.len(),
                target
            );
            let words_per_layer = self.words_per_layer;
            self.layers
                .resize_with(target, || vec![0u32; words_per_layer]);
        }
        if self.n_layers < count {
            self.n_layers = count;
        }
        let word = source as usize / 32;
        let bit = 1u32 << (source % 32);
        for layer in &mut self.layers[..count] {
            layer[word] |= bit;
        }
    }

    /// Hand the populated layers to the writer and clear them.
    ///
    /// Waits out any outstanding transfer first, so the payload handed over
    /// is never mutated while a previous one is still in flight. Does
    /// nothing when no spikes were marked this tick.
    pub fn flush(&mut self, time: u32, channel: &mut dyn RecordingChannel) {
        if !self.enabled {
            return;
        }
        while self.in_progress.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
        if self.n_layers == 0 {
            return;
        }

        let payload = self.serialize(time);
        self.in_progress.store(true, Ordering::Release);
        let flag = Arc::clone(&self.in_progress);
        channel.record_and_notify(
            payload,
            Box::new(move || flag.store(false, Ordering::Release)),
        );
        self.flushes += 1;
        self.reset();
    }

    /// Block until any in-flight transfer has completed, then flush what
    /// remains. Used on the pause path so no write is abandoned.
    pub fn finalise(&mut self, time: u32, channel: &mut dyn RecordingChannel) {
        self.flush(time, channel);
        while self.in_progress.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
    }

    /// Clear the populated layers. Layers above `n_layers` are already
    /// zero, so only the populated prefix is touched.
    pub fn reset(&mut self) {
        for layer in &mut self.layers[..self.n_layers] {
            layer.fill(0);
        }
        self.n_layers = 0;
    }

    fn serialize(&self, time: u32) -> Vec<u8> {
        let n_words = 2 + self.n_layers * self.words_per_layer;
        let mut payload = Vec::with_capacity(n_words * 4);
        payload.extend_from_slice(&time.to_le_bytes());
        payload.extend_from_slice(&(self.n_layers as u32).to_le_bytes());
        for layer in &self.layers[..self.n_layers] {
            for word in layer {
                payload.extend_from_slice(&word.to_le_bytes());
            }
        }
        payload
    }
}
