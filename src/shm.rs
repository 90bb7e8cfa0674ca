// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Shared-memory image access.
//!
//! A loader lays out one memory-mapped image per engine instance: a region
//! table header followed by four regions. All words are little-endian.
//!
//! ```text
//! Header (28 bytes):
//!   [0:4]    Magic 0x53504B31 ("SPK1")
//!   [4:8]    Version (u32)
//!   [8:12]   Region count (u32, must be 4)
//!   [12:28]  Byte offset of each region (4 × u32)
//!
//! Region 0, System (20 bytes):
//!   timer_period_us, total_ticks, infinite_run, sdp_priority, dma_priority
//! Region 1, Parameters:
//!   14-word parameter block, then n_sources × 6-word source records
//! Region 2, SpikeHistory:
//!   owned by the recording subsystem; opaque here
//! Region 3, Provenance (16 bytes):
//!   last_tick, spikes_emitted, rate_updates_applied, recording_flushes
//! ```

use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::info;

use crate::error::SpikeSourceError;
use crate::parameters::{SourceParameters, PARAMETER_WORDS};
use crate::source::{SpikeSource, SOURCE_RECORD_WORDS};

pub const REGION_TABLE_MAGIC: u32 = 0x53504b31;
pub const REGION_TABLE_VERSION: u32 = 1;
pub const N_REGIONS: usize = 4;
const HEADER_BYTES: usize = (3 + N_REGIONS) * 4;

/// Region indices in the table, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    System = 0,
    Parameters = 1,
    SpikeHistory = 2,
    Provenance = 3,
}

/// Simulation timing and callback slots, from the system region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemConfig {
    pub timer_period_us: u32,
    pub total_ticks: u32,
    pub infinite_run: bool,
    pub sdp_priority: u32,
    pub dma_priority: u32,
}

pub const SYSTEM_WORDS: usize = 5;

/// Counters written to the provenance region at finalise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvenanceData {
    pub last_tick: u32,
    pub spikes_emitted: u32,
    pub rate_updates_applied: u32,
    pub recording_flushes: u32,
}

pub const PROVENANCE_WORDS: usize = 4;

/// One engine instance's mapped shared-memory image.
#[derive(Debug)]
pub struct SharedMemory {
    map: MmapMut,
    region_offsets: [usize; N_REGIONS],
}

impl SharedMemory {
    /// Map an image file the loader has written.
    pub fn open(path: &Path) -> Result<Self, SpikeSourceError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        info!("mapped shared memory image {:?} ({} bytes)", path, map.len());
        Self::from_map(map)
    }

    /// Adopt an already-populated anonymous map. Used by embeddings and
    /// tests that compose the image in process.
    pub fn from_image(image: &[u8]) -> Result<Self, SpikeSourceError> {
        let mut map = MmapMut::map_anon(image.len())?;
        map.copy_from_slice(image);
        Self::from_map(map)
    }

    fn from_map(map: MmapMut) -> Result<Self, SpikeSourceError> {
        if map.len() < HEADER_BYTES {
            return Err(SpikeSourceError::MapTooSmall { len: map.len() });
        }
        let magic = read_word(&map, 0);
        if magic != REGION_TABLE_MAGIC {
            return Err(SpikeSourceError::BadMagic {
                expected: REGION_TABLE_MAGIC,
                found: magic,
            });
        }
        let version = read_word(&map, 4);
        if version != REGION_TABLE_VERSION {
            return Err(SpikeSourceError::UnsupportedVersion(version));
        }
        let n_regions = read_word(&map, 8) as usize;
        if n_regions != N_REGIONS {
            return Err(SpikeSourceError::RegionCountMismatch {
                expected: N_REGIONS,
                found: n_regions,
            });
        }
        let mut region_offsets = [0usize; N_REGIONS];
        for (index, offset) in region_offsets.iter_mut().enumerate() {
            *offset = read_word(&map, 12 + index * 4) as usize;
        }
        Ok(Self {
            map,
            region_offsets,
        })
    }

    /// Borrow a region's bytes. The length runs to the start of the next
    /// region, or to the end of the map for the last one.
    pub fn region_bytes(&self, region: Region) -> Result<&[u8], SpikeSourceError> {
        let (offset, end) = self.region_extent(region)?;
        Ok(&self.map[offset..end])
    }

    /// Mutably borrow a region's bytes (host-side patching, write-back).
    pub fn region_bytes_mut(&mut self, region: Region) -> Result<&mut [u8], SpikeSourceError> {
        let (offset, end) = self.region_extent(region)?;
        Ok(&mut self.map[offset..end])
    }

    fn region_extent(&self, region: Region) -> Result<(usize, usize), SpikeSourceError> {
        let index = region as usize;
        let offset = self.region_offsets[index];
        let end = if index + 1 < N_REGIONS {
            self.region_offsets[index + 1]
        } else {
            self.map.len()
        };
        if offset > end || end > self.map.len() {
            return Err(SpikeSourceError::RegionOutOfBounds {
                region: index,
                offset,
                needed: end.saturating_sub(offset),
                len: self.map.len(),
            });
        }
        Ok((offset, end))
    }

    fn require(
        &self,
        region: Region,
        needed_words: usize,
    ) -> Result<&[u8], SpikeSourceError> {
        let bytes = self.region_bytes(region)?;
        if bytes.len() < needed_words * 4 {
            return Err(SpikeSourceError::RegionOutOfBounds {
                region: region as usize,
                offset: self.region_offsets[region as usize],
                needed: needed_words * 4,
                len: self.map.len(),
            });
        }
        Ok(bytes)
    }

    /// Read the system region.
    pub fn read_system(&self) -> Result<SystemConfig, SpikeSourceError> {
        let bytes = self.require(Region::System, SYSTEM_WORDS)?;
        Ok(SystemConfig {
            timer_period_us: read_word(bytes, 0),
            total_ticks: read_word(bytes, 4),
            infinite_run: read_word(bytes, 8) != 0,
            sdp_priority: read_word(bytes, 12),
            dma_priority: read_word(bytes, 16),
        })
    }

    /// Read the parameter block and the source records that follow it.
    pub fn read_parameters(
        &self,
    ) -> Result<(SourceParameters, Vec<SpikeSource>), SpikeSourceError> {
        let bytes = self.require(Region::Parameters, PARAMETER_WORDS)?;
        let mut words = [0u32; PARAMETER_WORDS];
        read_words(bytes, 0, &mut words);
        let params = SourceParameters::decode(&words);

        let n_sources = params.n_sources as usize;
        let needed = PARAMETER_WORDS + n_sources * SOURCE_RECORD_WORDS;
        let bytes = self.require(Region::Parameters, needed)?;

        let mut sources = Vec::with_capacity(n_sources);
        let mut record = [0u32; SOURCE_RECORD_WORDS];
        for index in 0..n_sources {
            let offset = (PARAMETER_WORDS + index * SOURCE_RECORD_WORDS) * 4;
            read_words(bytes, offset, &mut record);
            sources.push(SpikeSource::decode(&record));
        }
        Ok((params, sources))
    }

    /// Write the parameter block and source records back for the host.
    pub fn write_back(
        &mut self,
        params: &SourceParameters,
        sources: &[SpikeSource],
    ) -> Result<(), SpikeSourceError> {
        let needed = PARAMETER_WORDS + sources.len() * SOURCE_RECORD_WORDS;
        self.require(Region::Parameters, needed)?;
        let bytes = self.region_bytes_mut(Region::Parameters)?;

        let mut words = [0u32; PARAMETER_WORDS];
        params.encode(&mut words);
        write_words(bytes, 0, &words);

        let mut record = [0u32; SOURCE_RECORD_WORDS];
        for (index, source) in sources.iter().enumerate() {
            source.encode(&mut record);
            let offset = (PARAMETER_WORDS + index * SOURCE_RECORD_WORDS) * 4;
            write_words(bytes, offset, &record);
        }
        self.map.flush()?;
        Ok(())
    }

    /// Write the provenance counters.
    pub fn write_provenance(
        &mut self,
        provenance: &ProvenanceData,
    ) -> Result<(), SpikeSourceError> {
        self.require(Region::Provenance, PROVENANCE_WORDS)?;
        let bytes = self.region_bytes_mut(Region::Provenance)?;
        let words = [
            provenance.last_tick,
            provenance.spikes_emitted,
            provenance.rate_updates_applied,
            provenance.recording_flushes,
        ];
        write_words(bytes, 0, &words);
        self.map.flush()?;
        Ok(())
    }
}

/// Compose a complete initial image the way the loader lays one out.
pub fn compose_initial_image(
    system: &SystemConfig,
    params: &SourceParameters,
    sources: &[SpikeSource],
    history_bytes: usize,
) -> Vec<u8> {
    assert_eq!(params.n_sources as usize, sources.len());

    let system_offset = HEADER_BYTES;
    let params_offset = system_offset + SYSTEM_WORDS * 4;
    let params_bytes = (PARAMETER_WORDS + sources.len() * SOURCE_RECORD_WORDS) * 4;
    let history_offset = params_offset + params_bytes;
    let provenance_offset = history_offset + history_bytes;
    let total = provenance_offset + PROVENANCE_WORDS * 4;

    let mut image = vec![0u8; total];
    let header = [
        REGION_TABLE_MAGIC,
        REGION_TABLE_VERSION,
        N_REGIONS as u32,
        system_offset as u32,
        params_offset as u32,
        history_offset as u32,
        provenance_offset as u32,
    ];
    write_words(&mut image, 0, &header);

    let system_words = [
        system.timer_period_us,
        system.total_ticks,
        u32::from(system.infinite_run),
        system.sdp_priority,
        system.dma_priority,
    ];
    write_words(&mut image, system_offset, &system_words);

    let mut param_words = [0u32; PARAMETER_WORDS];
    params.encode(&mut param_words);
    write_words(&mut image, params_offset, &param_words);

    let mut record = [0u32; SOURCE_RECORD_WORDS];
    for (index, source) in sources.iter().enumerate() {
        source.encode(&mut record);
        let offset = params_offset + (PARAMETER_WORDS + index * SOURCE_RECORD_WORDS) * 4;
        write_words(&mut image, offset, &record);
    }
    image
}

fn read_word(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn read_words(bytes: &[u8], offset: usize, out: &mut [u32]) {
    for (index, word) in out.iter_mut().enumerate() {
        *word = read_word(bytes, offset + index * 4);
    }
}

fn write_words(bytes: &mut [u8], offset: usize, words: &[u32]) {
    for (index, word) in words.iter().enumerate() {
        let at = offset + index * 4;
        bytes[at..at + 4].copy_from_slice(&word.to_le_bytes());
    }
}
