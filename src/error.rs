// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Error types for the spike source engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpikeSourceError {
    #[error("bad region table magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("unsupported region table version {0}")]
    UnsupportedVersion(u32),

    #[error("region table declares {found} regions, expected {expected}")]
    RegionCountMismatch { expected: usize, found: usize },

    #[error(
        "region {region} out of bounds: needs {needed} bytes at offset {offset}, map is {len} bytes"
    )]
    RegionOutOfBounds {
        region: usize,
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("shared memory map too small for region table: {len} bytes")]
    MapTooSmall { len: usize },

    #[error("source count changed across resume: had {had}, region now declares {now}")]
    SourceCountChanged { had: u32, now: u32 },

    #[error("engine is not paused")]
    NotPaused,

    #[error("tick loop already running")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
