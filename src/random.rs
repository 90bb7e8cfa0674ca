// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Seeded random stream and the samplers built on it.
//!
//! The generator is a four-word KISS-style combination (linear congruential
//! + xorshift + multiply-with-carry) producing `u32` words. Its state is the
//! four seed words themselves, so the live stream position can be written
//! back into the parameter block at pause and picked up again at resume.
//!
//! Derived samplers:
//! - uniform on the open interval (0, 1),
//! - exponential `−ln(U)`, truncated at the S16.15 representable maximum,
//! - slow-lane inter-spike-interval draw (`exponential · mean_isi`),
//! - fast-lane Poisson count draw by the product-of-uniforms method.

use crate::fixed_point::{quantize_s1615, S1615_MAX, U032_SCALE};

/// The four-word generator state, as laid out in the parameter block.
pub type SeedWords = [u32; 4];

/// Seeded stream of `u32` words with spike-generation samplers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpikeSourceRng {
    seed: SeedWords,
}

/// Repair a seed in place so every generator component is in a valid cycle:
/// the xorshift word must be nonzero and the multiply-with-carry word must
/// stay below its multiplier.
pub fn validate_seed(seed: &mut SeedWords) {
    if seed[1] == 0 {
        seed[1] = 13_031_301;
    }
    seed[3] = seed[3] % 698_769_068 + 1;
}

impl SpikeSourceRng {
    /// Build a stream from raw seed words, repairing them first.
    ///
    /// Validation is not idempotent (the carry word is always remapped into
    /// its safe range), so this is for fresh host-written seeds only; to
    /// continue a captured stream use [`SpikeSourceRng::from_state`].
    pub fn from_seed(seed: SeedWords) -> Self {
        let mut seed = seed;
        validate_seed(&mut seed);
        Self { seed }
    }

    /// Continue a stream from state captured with [`SpikeSourceRng::state`],
    /// without validation. Every state the generator itself produces is
    /// already valid.
    pub fn from_state(state: SeedWords) -> Self {
        Self { seed: state }
    }

    /// Current stream state, suitable for writing back to the seed words.
    pub fn state(&self) -> SeedWords {
        self.seed
    }

    /// Next raw word from the stream.
    pub fn next_u32(&mut self) -> u32 {
        let s = &mut self.seed;
        s[0] = s[0].wrapping_mul(314_527_869).wrapping_add(1_234_567);
        s[1] ^= s[1] << 5;
        s[1] ^= s[1] >> 7;
        s[1] ^= s[1] << 22;
        let t = 4_294_584_393u64 * u64::from(s[2]) + u64::from(s[3]);
        s[3] = (t >> 32) as u32;
        s[2] = t as u32;
        s[0].wrapping_add(s[1]).wrapping_add(s[2])
    }

    /// Uniform variate on the open interval (0, 1).
    pub fn uniform_unit(&mut self) -> f64 {
        (f64::from(self.next_u32()) + 0.5) / U032_SCALE
    }

    /// Exponential variate with unit mean, on the S16.15 grid.
    pub fn exponential_variate(&mut self) -> f64 {
        let variate = -self.uniform_unit().ln();
        quantize_s1615(variate.min(S1615_MAX))
    }

    /// Ticks until the next spike of a slow source with the given mean
    /// inter-spike interval.
    pub fn slow_isi_ticks(&mut self, mean_isi_ticks: f64) -> f64 {
        quantize_s1615((self.exponential_variate() * mean_isi_ticks).min(S1615_MAX))
    }

    /// Number of spikes a fast source emits this tick, distributed as
    /// `Poisson(λ)` for precomputed `exp_minus_lambda = exp(−λ)`.
    ///
    /// Draws uniforms until their running product falls below
    /// `exp_minus_lambda`; the count of draws before that happens is the
    /// variate. An `exp_minus_lambda` of exactly zero means the programmed
    /// rate was beyond the U0.32 range, and the clamp policy for that is to
    /// emit nothing.
    pub fn poisson_count(&mut self, exp_minus_lambda: f64) -> u32 {
        if exp_minus_lambda == 0.0 {
            return 0;
        }
        let mut count = 0u32;
        let mut product = 1.0f64;
        loop {
            product *= self.uniform_unit();
            if product < exp_minus_lambda {
                return count;
            }
            count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = SpikeSourceRng::from_seed([1, 2, 3, 4]);
        let mut b = SpikeSourceRng::from_seed([1, 2, 3, 4]);
        for _ in 0..1000 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_seed_validation_repairs_degenerate_words() {
        let mut seed = [7, 0, 9, u32::MAX];
        validate_seed(&mut seed);
        assert_ne!(seed[1], 0);
        assert!(seed[3] >= 1 && seed[3] <= 698_769_068);
    }

    #[test]
    fn test_state_round_trip_continues_stream() {
        let mut a = SpikeSourceRng::from_seed([11, 22, 33, 44]);
        for _ in 0..57 {
            a.next_u32();
        }
        let mut b = SpikeSourceRng::from_state(a.state());
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_reseeding_through_validation_perturbs_the_stream() {
        // from_seed remaps the carry word, so it must not be used to
        // continue a live stream
        let mut a = SpikeSourceRng::from_seed([11, 22, 33, 44]);
        for _ in 0..17 {
            a.next_u32();
        }
        let b = SpikeSourceRng::from_seed(a.state());
        assert_ne!(a.state(), b.state());
    }

    #[test]
    fn test_uniform_unit_is_open_interval() {
        let mut rng = SpikeSourceRng::from_seed([5, 6, 7, 8]);
        for _ in 0..10_000 {
            let u = rng.uniform_unit();
            assert!(u > 0.0 && u < 1.0);
        }
    }

    #[test]
    fn test_exponential_mean_is_one() {
        let mut rng = SpikeSourceRng::from_seed([13, 17, 19, 23]);
        let n = 200_000;
        let sum: f64 = (0..n).map(|_| rng.exponential_variate()).sum();
        let mean = sum / f64::from(n);
        assert!((mean - 1.0).abs() < 0.02, "mean was {mean}");
    }

    #[test]
    fn test_poisson_count_mean_matches_lambda() {
        let lambda = 1.0f64;
        let p = (-lambda).exp();
        let mut rng = SpikeSourceRng::from_seed([3, 1, 4, 1]);
        let n = 100_000;
        let total: u64 = (0..n).map(|_| u64::from(rng.poisson_count(p))).sum();
        let mean = total as f64 / n as f64;
        assert!((mean - lambda).abs() < 0.05, "mean was {mean}");
    }

    #[test]
    fn test_poisson_count_zero_p_clamps_to_silence() {
        let mut rng = SpikeSourceRng::from_seed([3, 1, 4, 1]);
        let before = rng.state();
        assert_eq!(rng.poisson_count(0.0), 0);
        // the clamp must not consume stream words
        assert_eq!(rng.state(), before);
    }
}
