// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Fixed-point boundary conversions.
//!
//! The substrate's shared-memory image and rate-update payloads carry reals
//! in two formats: unsigned U0.32 fractions (values in `[0, 1)`) and signed
//! S16.15 accums (values in roughly `±65536` with 2⁻¹⁵ resolution). The
//! engine computes in `f64`, but every value that is persisted or received
//! over the wire is quantized onto its fixed-point grid at the point of
//! mutation, so a pause → resume cycle round-trips bit-exactly.

/// Scale factor for U0.32 fractions (2³²).
pub const U032_SCALE: f64 = 4_294_967_296.0;

/// Scale factor for S16.15 accums (2¹⁵).
pub const S1615_SCALE: f64 = 32_768.0;

/// Largest value representable as an S16.15 accum.
pub const S1615_MAX: f64 = i32::MAX as f64 / S1615_SCALE;

/// Encode an `f64` in `[0, 1)` as a U0.32 fraction, saturating at the ends.
pub fn u032_from_f64(value: f64) -> u32 {
    if value <= 0.0 {
        0
    } else if value >= 1.0 {
        u32::MAX
    } else {
        (value * U032_SCALE) as u32
    }
}

/// Decode a U0.32 fraction.
pub fn u032_to_f64(bits: u32) -> f64 {
    bits as f64 / U032_SCALE
}

/// Snap a value onto the U0.32 grid.
pub fn quantize_u032(value: f64) -> f64 {
    u032_to_f64(u032_from_f64(value))
}

/// Encode an `f64` as an S16.15 accum, saturating at the type's range.
pub fn s1615_from_f64(value: f64) -> i32 {
    let scaled = (value * S1615_SCALE).round();
    if scaled >= i32::MAX as f64 {
        i32::MAX
    } else if scaled <= i32::MIN as f64 {
        i32::MIN
    } else {
        scaled as i32
    }
}

/// Decode an S16.15 accum.
pub fn s1615_to_f64(bits: i32) -> f64 {
    bits as f64 / S1615_SCALE
}

/// Snap a value onto the S16.15 grid.
pub fn quantize_s1615(value: f64) -> f64 {
    s1615_to_f64(s1615_from_f64(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u032_round_trip_is_exact() {
        for bits in [0u32, 1, 0x8000_0000, u32::MAX] {
            assert_eq!(u032_from_f64(u032_to_f64(bits)), bits);
        }
    }

    #[test]
    fn test_u032_saturates() {
        assert_eq!(u032_from_f64(-0.5), 0);
        assert_eq!(u032_from_f64(1.5), u32::MAX);
        // exp(-lambda) for an extreme rate underflows to exactly zero
        assert_eq!(u032_from_f64((-80.0f64).exp()), 0);
    }

    #[test]
    fn test_s1615_round_trip_is_exact() {
        for bits in [0i32, 1, -1, 32_768, -32_768, i32::MAX, i32::MIN] {
            assert_eq!(s1615_from_f64(s1615_to_f64(bits)), bits);
        }
    }

    #[test]
    fn test_quantize_is_idempotent() {
        let v = quantize_s1615(1234.56789);
        assert_eq!(quantize_s1615(v), v);
        let u = quantize_u032(0.367879441);
        assert_eq!(quantize_u032(u), u);
    }

    #[test]
    fn test_grid_closed_under_tick_arithmetic() {
        // time_to_spike bookkeeping only ever adds grid values and subtracts
        // 1.0, so the result must stay on the grid without re-quantizing.
        let a = quantize_s1615(4000.125);
        let b = quantize_s1615(17.0312);
        let sum = a + b - 1.0;
        assert_eq!(quantize_s1615(sum), sum);
    }
}
