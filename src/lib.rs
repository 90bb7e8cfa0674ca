// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! # Spike Source Engine
//!
//! Real-time Poisson spike generator for one processing core of a
//! many-core neuromorphic substrate. Each engine instance owns a
//! contiguous sub-population of independent Poisson sources; on every
//! fixed-length simulation tick it decides how many spikes each source
//! emits, paces the resulting multicast packets onto the fabric, and
//! maintains a growable bit-plane recording buffer handed to an
//! asynchronous writer at tick end.
//!
//! ## Architecture
//! - Dual-regime sampling: high-rate sources draw a Poisson event count
//!   per tick, low-rate sources sample exponential inter-spike intervals.
//! - Deterministic: the spike schedule is a pure function of the seed and
//!   parameters; the live stream state survives pause and resume.
//! - Shared-memory configured: a loader-written image carries the
//!   parameter block and source table, and receives them back (plus
//!   provenance) when a run pauses.
//! - Hardware seams are traits: the fabric send primitive, the pacing
//!   counter, and the recording writer are supplied by the embedding.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod core;
pub mod dispatch;
pub mod error;
pub mod fixed_point;
pub mod parameters;
pub mod random;
pub mod rate_update_queue;
pub mod recorder;
pub mod runner;
pub mod shm;
pub mod source;

pub use crate::core::{MessageIntake, SpikeSourceCore};
pub use dispatch::{DispatchThrottle, FabricSender, HardwareCounter};
pub use error::SpikeSourceError;
pub use parameters::SourceParameters;
pub use random::{SeedWords, SpikeSourceRng};
pub use rate_update_queue::{RateUpdate, RateUpdateQueue};
pub use recorder::{RecordingChannel, SpikeRecorder};
pub use runner::TickRunner;
pub use shm::{compose_initial_image, ProvenanceData, Region, SharedMemory, SystemConfig};
pub use source::{SourceRegime, SpikeSource};
