// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! The per-run parameter block.
//!
//! Loaded from the parameters region at initialise and resume, written back
//! at pause so the host reads a complete, current block. The seed words
//! double as the live random-stream state across a pause.

use tracing::info;

use crate::fixed_point::{
    s1615_from_f64, s1615_to_f64, u032_from_f64, u032_to_f64,
};
use crate::random::SeedWords;

/// Words in the serialized parameter block.
pub const PARAMETER_WORDS: usize = 14;

/// Immutable-per-run configuration for one engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceParameters {
    /// Whether spikes are emitted onto the fabric at all.
    pub has_key: bool,
    /// ORed with the local source index to form the multicast routing key.
    pub base_key: u32,
    /// AND mask extracting a global source id from a rate-update key.
    pub rate_update_mask: u32,
    /// Maximum random start-of-tick delay, microseconds.
    pub random_backoff_us: u32,
    /// Hardware-counter ticks to leave between consecutive dispatches.
    pub inter_spike_gap_ticks: u32,
    /// Seconds of real time per simulation tick (U0.32 grid).
    pub seconds_per_tick: f64,
    /// Simulation ticks per second of real time (S16.15 grid).
    pub ticks_per_second: f64,
    /// Per-tick rate at or below which a source uses the slow lane
    /// (S16.15 grid).
    pub slow_fast_cutoff: f64,
    /// Global index of this instance's first source.
    pub first_source_id: u32,
    /// Number of sources owned by this instance.
    pub n_sources: u32,
    /// Four-word random-stream state.
    pub seed: SeedWords,
}

impl SourceParameters {
    /// Decode the block from its shared-memory word layout.
    pub fn decode(words: &[u32; PARAMETER_WORDS]) -> Self {
        Self {
            has_key: words[0] != 0,
            base_key: words[1],
            rate_update_mask: words[2],
            random_backoff_us: words[3],
            inter_spike_gap_ticks: words[4],
            seconds_per_tick: u032_to_f64(words[5]),
            ticks_per_second: s1615_to_f64(words[6] as i32),
            slow_fast_cutoff: s1615_to_f64(words[7] as i32),
            first_source_id: words[8],
            n_sources: words[9],
            seed: [words[10], words[11], words[12], words[13]],
        }
    }

    /// Encode the block into its shared-memory word layout.
    pub fn encode(&self, words: &mut [u32; PARAMETER_WORDS]) {
        words[0] = u32::from(self.has_key);
        words[1] = self.base_key;
        words[2] = self.rate_update_mask;
        words[3] = self.random_backoff_us;
        words[4] = self.inter_spike_gap_ticks;
        words[5] = u032_from_f64(self.seconds_per_tick);
        words[6] = s1615_from_f64(self.ticks_per_second) as u32;
        words[7] = s1615_from_f64(self.slow_fast_cutoff) as u32;
        words[8] = self.first_source_id;
        words[9] = self.n_sources;
        words[10..14].copy_from_slice(&self.seed);
    }

    /// Convert a rate in hertz to a per-tick rate.
    pub fn rate_per_tick(&self, rate_hz: f64) -> f64 {
        rate_hz * self.seconds_per_tick
    }

    /// Local index for a global source id, if this instance owns it.
    pub fn local_index(&self, global_id: u32) -> Option<usize> {
        let local = global_id.checked_sub(self.first_source_id)?;
        (local < self.n_sources).then_some(local as usize)
    }

    /// Log the block the way it is logged when first read.
    pub fn log_contents(&self) {
        info!(
            "parameters: key = {:#010x}, backoff = {} us, gap = {} ticks",
            self.base_key, self.random_backoff_us, self.inter_spike_gap_ticks
        );
        info!(
            "parameters: seed = {} {} {} {}",
            self.seed[0], self.seed[1], self.seed[2], self.seed[3]
        );
        info!(
            "parameters: {} sources from global id {}",
            self.n_sources, self.first_source_id
        );
        info!(
            "parameters: seconds_per_tick = {}, ticks_per_second = {}, cutoff = {}",
            self.seconds_per_tick, self.ticks_per_second, self.slow_fast_cutoff
        );
    }
}
