// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Shared fixtures: an engine wired to in-process fakes of the fabric, the
//! pacing counter, and the recording writer, plus payload parsing helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use spike_source_engine::fixed_point::{quantize_s1615, quantize_u032};
use spike_source_engine::{
    compose_initial_image, FabricSender, HardwareCounter, RecordingChannel, SeedWords,
    SharedMemory, SourceParameters, SourceRegime, SpikeSource, SpikeSourceCore, SystemConfig,
};

pub const BASE_KEY: u32 = 0x1140_0000;
pub const RATE_UPDATE_MASK: u32 = 0xff;
pub const DEFAULT_SEED: SeedWords = [0xdead_beef, 0x0bad_cafe, 42, 77];

pub fn seconds_per_tick() -> f64 {
    quantize_u032(0.001)
}

pub fn ticks_per_second() -> f64 {
    quantize_s1615(1000.0)
}

pub fn slow_fast_cutoff() -> f64 {
    quantize_s1615(0.25)
}

/// Fabric fake: accepts every packet and logs its key in order.
pub struct LogFabric {
    keys: Arc<Mutex<Vec<u32>>>,
}

impl FabricSender for LogFabric {
    fn try_send(&self, key: u32) -> bool {
        self.keys.lock().unwrap().push(key);
        true
    }
}

/// Counter fake: the throttle sees an already-expired dispatch target, so
/// tests never wait.
pub struct IdleCounter;

impl HardwareCounter for IdleCounter {
    fn now(&self) -> u32 {
        0
    }
}

/// Recording writer fake: captures payloads and completes synchronously.
pub struct CaptureChannel {
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    tick_updates: Arc<AtomicU32>,
}

impl RecordingChannel for CaptureChannel {
    fn record_and_notify(&mut self, payload: Vec<u8>, on_complete: Box<dyn FnOnce() + Send>) {
        self.payloads.lock().unwrap().push(payload);
        on_complete();
    }

    fn timestep_update(&mut self, _time: u32) {
        self.tick_updates.fetch_add(1, Ordering::Relaxed);
    }
}

/// An engine plus handles into its fakes.
pub struct TestEngine {
    pub core: SpikeSourceCore,
    pub keys: Arc<Mutex<Vec<u32>>>,
    pub payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    pub tick_updates: Arc<AtomicU32>,
}

/// A source active for the whole run, in the fast regime at `rate_hz`.
pub fn fast_source(rate_hz: f64) -> SpikeSource {
    let r_tick = rate_hz * seconds_per_tick();
    SpikeSource {
        start_tick: 0,
        end_tick: u32::MAX,
        regime: SourceRegime::Fast {
            exp_minus_lambda: quantize_u032((-r_tick).exp()),
        },
    }
}

/// A source active for the whole run, in the slow regime at `rate_hz`
/// (zero means silent).
pub fn slow_source(rate_hz: f64) -> SpikeSource {
    let mean_isi_ticks = if rate_hz > 0.0 {
        quantize_s1615(ticks_per_second() / rate_hz)
    } else {
        0.0
    };
    SpikeSource {
        start_tick: 0,
        end_tick: u32::MAX,
        regime: SourceRegime::Slow {
            mean_isi_ticks,
            time_to_spike_ticks: 0.0,
        },
    }
}

pub fn windowed(mut source: SpikeSource, start_tick: u32, end_tick: u32) -> SpikeSource {
    source.start_tick = start_tick;
    source.end_tick = end_tick;
    source
}

/// Build an engine over the given sources. `total_ticks` of `None` runs
/// forever.
pub fn build_engine(
    sources: Vec<SpikeSource>,
    total_ticks: Option<u32>,
    has_key: bool,
    recording: bool,
    seed: SeedWords,
) -> TestEngine {
    let params = SourceParameters {
        has_key,
        base_key: BASE_KEY,
        rate_update_mask: RATE_UPDATE_MASK,
        random_backoff_us: 0,
        inter_spike_gap_ticks: 0,
        seconds_per_tick: seconds_per_tick(),
        ticks_per_second: ticks_per_second(),
        slow_fast_cutoff: slow_fast_cutoff(),
        first_source_id: 0,
        n_sources: sources.len() as u32,
        seed,
    };
    let system = SystemConfig {
        timer_period_us: 1000,
        total_ticks: total_ticks.unwrap_or(0),
        infinite_run: total_ticks.is_none(),
        sdp_priority: 1,
        dma_priority: 0,
    };
    let image = compose_initial_image(&system, &params, &sources, 256);
    let shm = SharedMemory::from_image(&image).unwrap();

    let keys = Arc::new(Mutex::new(Vec::new()));
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let tick_updates = Arc::new(AtomicU32::new(0));

    let core = SpikeSourceCore::initialise(
        shm,
        Arc::new(LogFabric {
            keys: Arc::clone(&keys),
        }),
        Arc::new(IdleCounter),
        Box::new(CaptureChannel {
            payloads: Arc::clone(&payloads),
            tick_updates: Arc::clone(&tick_updates),
        }),
        recording,
    )
    .unwrap();

    TestEngine {
        core,
        keys,
        payloads,
        tick_updates,
    }
}

/// Drive `n` ticks.
pub fn run_ticks(core: &mut SpikeSourceCore, n: usize) {
    for _ in 0..n {
        core.on_timer_tick().unwrap();
    }
}

/// Drive ticks until the core pauses, with a safety bound.
pub fn run_until_paused(core: &mut SpikeSourceCore, max_ticks: usize) {
    for _ in 0..max_ticks {
        core.on_timer_tick().unwrap();
        if core.is_paused() {
            return;
        }
    }
    panic!("core did not pause within {max_ticks} ticks");
}

/// Decode a recording payload into its tick and bit-plane layers.
pub fn parse_payload(payload: &[u8], n_sources: u32) -> (u32, Vec<Vec<u32>>) {
    let words: Vec<u32> = payload
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect();
    let time = words[0];
    let n_layers = words[1] as usize;
    let words_per_layer = (n_sources as usize).div_ceil(32);
    assert_eq!(words.len(), 2 + n_layers * words_per_layer);
    let layers = (0..n_layers)
        .map(|layer| {
            let start = 2 + layer * words_per_layer;
            words[start..start + words_per_layer].to_vec()
        })
        .collect();
    (time, layers)
}

/// Spikes a payload attributes to one source: the number of layers with its
/// bit set.
pub fn spikes_for_source(layers: &[Vec<u32>], source: u32) -> u32 {
    let word = source as usize / 32;
    let bit = 1u32 << (source % 32);
    layers.iter().filter(|layer| layer[word] & bit != 0).count() as u32
}

/// Total spikes a payload records across all sources.
pub fn total_spikes(layers: &[Vec<u32>]) -> u32 {
    layers
        .iter()
        .map(|layer| layer.iter().map(|w| w.count_ones()).sum::<u32>())
        .sum()
}
