// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Hardware-counter-paced packet dispatch.
//!
//! Packet spacing on the fabric is a correctness mechanism: destinations
//! share receive bandwidth, and a burst of back-to-back packets from one
//! core can drop at the far end. The throttle paces each send against the
//! down-counting hardware timer so consecutive packets are at least
//! `inter_spike_gap_ticks` counter ticks apart within the tick period.

use std::time::Duration;
use tracing::trace;

/// Non-blocking multicast send primitive supplied by the fabric driver.
pub trait FabricSender: Send + Sync {
    /// Attempt to send one packet with the given routing key. Returns
    /// `false` when the fabric cannot accept it right now.
    fn try_send(&self, key: u32) -> bool;
}

/// The down-counting hardware timer the throttle paces against. The value
/// decrements toward zero across the tick period and reloads each tick.
pub trait HardwareCounter: Send + Sync {
    fn now(&self) -> u32;
}

/// Evenly spaced packet emitter.
#[derive(Debug)]
pub struct DispatchThrottle {
    gap_ticks: u32,
    expected_time: u32,
}

impl DispatchThrottle {
    pub fn new(gap_ticks: u32) -> Self {
        Self {
            gap_ticks,
            expected_time: 0,
        }
    }

    /// Re-arm for a new tick: the first dispatch target sits one gap below
    /// the counter's current value. Wrapping is intentional — if the gap
    /// exceeds the remaining counter range, every wait degenerates to an
    /// immediate send, never a stall.
    pub fn start_tick(&mut self, counter: &dyn HardwareCounter) {
        self.expected_time = counter.now().wrapping_sub(self.gap_ticks);
    }

    /// Emit one packet: busy-wait until the counter has counted down to the
    /// dispatch target, step the target down by one gap, then retry the
    /// non-blocking send until the fabric accepts it.
    pub fn send(&mut self, key: u32, counter: &dyn HardwareCounter, fabric: &dyn FabricSender) {
        while counter.now() > self.expected_time {
            core::hint::spin_loop();
        }
        self.expected_time = self.expected_time.wrapping_sub(self.gap_ticks);

        trace!("sending spike packet {key:#010x}");
        while !fabric.try_send(key) {
            std::thread::sleep(Duration::from_micros(1));
        }
    }
}
