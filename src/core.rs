// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! The spike source engine core.
//!
//! `SpikeSourceCore` owns every piece of per-instance state — parameters,
//! source table, random stream, recorder, dispatch throttle — and exposes
//! the callbacks the embedding wires up: the timer tick, and the two rate
//! update intakes. All state is mutated from the tick thread only, with two
//! exceptions whose single-word nature makes them safe without locks: the
//! rate update queue (interior mutex, held only to push or drain) and the
//! recorder's in-progress flag (set by the tick path, cleared by the
//! writer's completion callback).

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, trace, warn};

use crate::dispatch::{DispatchThrottle, FabricSender, HardwareCounter};
use crate::error::SpikeSourceError;
use crate::fixed_point::{quantize_s1615, quantize_u032, s1615_to_f64};
use crate::parameters::SourceParameters;
use crate::random::SpikeSourceRng;
use crate::rate_update_queue::{RateUpdate, RateUpdateQueue};
use crate::recorder::{RecordingChannel, SpikeRecorder};
use crate::shm::{ProvenanceData, SharedMemory, SystemConfig};
use crate::source::{SourceRegime, SpikeSource};

/// Cloneable handle decoding rate-update messages into the queue.
///
/// Both entry points are short and non-blocking, so they can run from
/// contexts that pre-empt the timer. Recreate the handle after a resume:
/// the host may have rewritten the id mask while the engine was paused.
#[derive(Clone)]
pub struct MessageIntake {
    queue: RateUpdateQueue,
    rate_update_mask: u32,
}

impl MessageIntake {
    /// Fabric-delivered rate update: the masked key is the global source
    /// id, the payload an S16.15 rate in hertz.
    pub fn multicast_packet(&self, key: u32, payload: u32) {
        let source_id = key & self.rate_update_mask;
        let rate_hz = s1615_to_f64(payload as i32);
        self.queue.push(RateUpdate { source_id, rate_hz });
    }

    /// Host-delivered batch: word 0 is the pair count, then
    /// `{id, rate}` pairs with S16.15 rates.
    pub fn host_message(&self, words: &[u32]) {
        let Some((&n_items, rest)) = words.split_first() else {
            warn!("empty rate update message dropped");
            return;
        };
        let pairs = rest.chunks_exact(2).take(n_items as usize);
        if pairs.len() < n_items as usize {
            warn!(
                "rate update message declares {} items but carries {}",
                n_items,
                rest.len() / 2
            );
        }
        for pair in pairs {
            self.queue.push(RateUpdate {
                source_id: pair[0],
                rate_hz: s1615_to_f64(pair[1] as i32),
            });
        }
    }
}

/// One processing core's worth of Poisson spike sources.
pub struct SpikeSourceCore {
    shm: SharedMemory,
    system: SystemConfig,
    params: SourceParameters,
    sources: Vec<SpikeSource>,
    rng: SpikeSourceRng,
    recorder: SpikeRecorder,
    throttle: DispatchThrottle,
    rate_updates: RateUpdateQueue,
    fabric: Arc<dyn FabricSender>,
    counter: Arc<dyn HardwareCounter>,
    recording: Box<dyn RecordingChannel>,
    time: u32,
    paused: bool,
    provenance: ProvenanceData,
}

impl SpikeSourceCore {
    /// First-time initialisation from a loader-written image: read the
    /// system and parameter regions, validate the seed, and roll the first
    /// inter-spike interval for every slow source.
    pub fn initialise(
        shm: SharedMemory,
        fabric: Arc<dyn FabricSender>,
        counter: Arc<dyn HardwareCounter>,
        recording: Box<dyn RecordingChannel>,
        recording_enabled: bool,
    ) -> Result<Self, SpikeSourceError> {
        info!("initialise: starting");
        let system = shm.read_system()?;
        let (mut params, mut sources) = shm.read_parameters()?;
        params.log_contents();

        let mut rng = SpikeSourceRng::from_seed(params.seed);
        params.seed = rng.state();

        for source in &mut sources {
            if let SourceRegime::Slow {
                mean_isi_ticks,
                time_to_spike_ticks,
            } = &mut source.regime
            {
                *time_to_spike_ticks = rng.slow_isi_ticks(*mean_isi_ticks);
            }
        }

        let recorder = SpikeRecorder::new(params.n_sources, recording_enabled);
        let throttle = DispatchThrottle::new(params.inter_spike_gap_ticks);
        let core = Self {
            shm,
            system,
            params,
            sources,
            rng,
            recorder,
            throttle,
            rate_updates: RateUpdateQueue::new(),
            fabric,
            counter,
            recording,
            // one increment before the first tick lands it on zero
            time: u32::MAX,
            paused: false,
            provenance: ProvenanceData::default(),
        };
        core.log_source_states();
        info!("initialise: completed successfully");
        Ok(core)
    }

    /// Intake handle for wiring up the fabric and host-message callbacks.
    pub fn rate_intake(&self) -> MessageIntake {
        MessageIntake {
            queue: self.rate_updates.clone(),
            rate_update_mask: self.params.rate_update_mask,
        }
    }

    pub fn current_time(&self) -> u32 {
        self.time
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn timer_period(&self) -> Duration {
        Duration::from_micros(u64::from(self.system.timer_period_us))
    }

    pub fn parameters(&self) -> &SourceParameters {
        &self.params
    }

    pub fn sources(&self) -> &[SpikeSource] {
        &self.sources
    }

    pub fn provenance(&self) -> &ProvenanceData {
        &self.provenance
    }

    /// Host-side access to the mapped image (patching between runs).
    pub fn shared_memory_mut(&mut self) -> &mut SharedMemory {
        &mut self.shm
    }

    /// The timer tick callback. Strictly non-reentrant: the embedding must
    /// not overlap invocations.
    pub fn on_timer_tick(&mut self) -> Result<(), SpikeSourceError> {
        if self.paused {
            return Ok(());
        }
        self.time = self.time.wrapping_add(1);
        trace!("timer tick {}", self.time);

        if !self.system.infinite_run && self.time >= self.system.total_ticks {
            return self.enter_pause();
        }

        self.random_backoff();
        self.throttle.start_tick(&*self.counter);

        // updates that arrived since the last sweep take effect now
        for update in self.rate_updates.drain_all() {
            self.set_source_rate(update.source_id, update.rate_hz);
        }

        for index in 0..self.sources.len() {
            let source = self.sources[index];
            if !source.is_active(self.time) {
                continue;
            }
            match source.regime {
                SourceRegime::Fast { exp_minus_lambda } => {
                    let n_spikes = self.rng.poisson_count(exp_minus_lambda);
                    if n_spikes > 0 {
                        self.recorder.mark(index as u32, n_spikes);
                        if self.params.has_key {
                            let key = self.params.base_key | index as u32;
                            for _ in 0..n_spikes {
                                self.throttle.send(key, &*self.counter, &*self.fabric);
                            }
                            self.provenance.spikes_emitted =
                                self.provenance.spikes_emitted.wrapping_add(n_spikes);
                        }
                    }
                }
                SourceRegime::Slow {
                    mean_isi_ticks,
                    mut time_to_spike_ticks,
                } => {
                    if mean_isi_ticks == 0.0 {
                        continue;
                    }
                    while time_to_spike_ticks <= 0.0 {
                        self.recorder.mark(index as u32, 1);
                        if self.params.has_key {
                            let key = self.params.base_key | index as u32;
                            self.throttle.send(key, &*self.counter, &*self.fabric);
                            self.provenance.spikes_emitted =
                                self.provenance.spikes_emitted.wrapping_add(1);
                        }
                        time_to_spike_ticks += self.rng.slow_isi_ticks(mean_isi_ticks);
                    }
                    time_to_spike_ticks -= 1.0;
                    self.sources[index].regime = SourceRegime::Slow {
                        mean_isi_ticks,
                        time_to_spike_ticks,
                    };
                }
            }
        }

        if self.recorder.is_enabled() {
            self.recorder.flush(self.time, &mut *self.recording);
            self.recording.timestep_update(self.time);
        }
        Ok(())
    }

    /// The rate controller: retarget one source, switching regime at the
    /// per-tick cutoff. Ids outside this instance's window belong to a
    /// sibling core and are ignored.
    pub fn set_source_rate(&mut self, global_id: u32, rate_hz: f64) {
        let Some(local) = self.params.local_index(global_id) else {
            return;
        };
        debug!("setting rate of source {global_id} (local {local}) to {rate_hz} Hz");
        let rate_per_tick = self.params.rate_per_tick(rate_hz);
        let source = &mut self.sources[local];
        if rate_per_tick > self.params.slow_fast_cutoff {
            source.regime = SourceRegime::Fast {
                exp_minus_lambda: quantize_u032((-rate_per_tick).exp()),
            };
        } else {
            let mean_isi_ticks = if rate_hz > 0.0 {
                quantize_s1615(self.params.ticks_per_second / rate_hz)
            } else {
                0.0
            };
            // the countdown is deliberately left alone: a fresh interval is
            // rolled at the next zero crossing, and no stream words are
            // consumed here
            let time_to_spike_ticks = match source.regime {
                SourceRegime::Slow {
                    time_to_spike_ticks,
                    ..
                } => time_to_spike_ticks,
                SourceRegime::Fast { .. } => 0.0,
            };
            source.regime = SourceRegime::Slow {
                mean_isi_ticks,
                time_to_spike_ticks,
            };
        }
        self.provenance.rate_updates_applied = self.provenance.rate_updates_applied.wrapping_add(1);
    }

    /// Resume after a pause: re-read the system and parameter regions (the
    /// host may have extended the run or rewritten parameters) and continue
    /// from the replayed tick.
    pub fn resume(&mut self) -> Result<(), SpikeSourceError> {
        if !self.paused {
            return Err(SpikeSourceError::NotPaused);
        }
        info!("resume: rereading shared memory");
        let system = self.shm.read_system()?;
        let (mut params, sources) = self.shm.read_parameters()?;
        if params.n_sources != self.params.n_sources {
            return Err(SpikeSourceError::SourceCountChanged {
                had: self.params.n_sources,
                now: params.n_sources,
            });
        }
        // seed words equal to the state written at pause mean the host left
        // them alone: keep the live stream rather than revalidating, which
        // would remap the carry word and fork the schedule
        let rng = if params.seed == self.rng.state() {
            self.rng.clone()
        } else {
            SpikeSourceRng::from_seed(params.seed)
        };
        params.seed = rng.state();

        self.system = system;
        self.params = params;
        self.sources = sources;
        self.rng = rng;
        self.throttle = DispatchThrottle::new(self.params.inter_spike_gap_ticks);
        self.recorder.reset();
        self.paused = false;
        Ok(())
    }

    /// Diagnostic dump of every source record.
    pub fn log_source_states(&self) {
        for (index, source) in self.sources.iter().enumerate() {
            match source.regime {
                SourceRegime::Fast { exp_minus_lambda } => trace!(
                    "source {index}: window [{}, {}), fast, exp_minus_lambda = {exp_minus_lambda}",
                    source.start_tick,
                    source.end_tick
                ),
                SourceRegime::Slow {
                    mean_isi_ticks,
                    time_to_spike_ticks,
                } => trace!(
                    "source {index}: window [{}, {}), slow, mean_isi = {mean_isi_ticks}, \
                     time_to_spike = {time_to_spike_ticks}",
                    source.start_tick,
                    source.end_tick
                ),
            }
        }
    }

    /// End of the configured run: persist everything the host reads back,
    /// finish outstanding recording, and rewind the tick counter so this
    /// tick replays after resume.
    fn enter_pause(&mut self) -> Result<(), SpikeSourceError> {
        info!("simulation length reached at tick {}, pausing", self.time);
        self.params.seed = self.rng.state();
        self.shm.write_back(&self.params, &self.sources)?;

        self.recorder
            .finalise(self.time, &mut *self.recording);
        self.provenance.last_tick = self.time;
        self.provenance.recording_flushes = self.recorder.flushes();
        self.shm.write_provenance(&self.provenance)?;

        self.paused = true;
        self.time = self.time.wrapping_sub(1);
        Ok(())
    }

    /// Desynchronising start-of-tick delay, uniform over the configured
    /// window. Drawn from the thread generator so the seeded stream stays a
    /// pure function of seed and parameters.
    fn random_backoff(&self) {
        let max_us = self.params.random_backoff_us;
        if max_us == 0 {
            return;
        }
        let delay_us = rand::thread_rng().gen_range(0..=max_us);
        let deadline = Instant::now() + Duration::from_micros(u64::from(delay_us));
        while Instant::now() < deadline {
            core::hint::spin_loop();
        }
    }
}
