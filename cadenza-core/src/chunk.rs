// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `chunk` module defines the unit of data transported between filters.

use crate::audio::SampleBuf;

/// Payload of a [`Chunk`]: nothing, raw bytes with a read cursor, or planar linear samples.
#[derive(Clone, Debug, Default)]
pub enum ChunkData {
    #[default]
    Empty,
    Raw {
        data: Vec<u8>,
        pos: usize,
    },
    Linear(SampleBuf),
}

/// A unit of transported audio data.
///
/// A chunk owns its payload. Filters consume the input chunk (possibly partially, advancing the
/// raw read cursor) and fill the output chunk, reusing its previous allocation. An optional
/// `sync` timestamp marks the stream time of the first sample or byte of the chunk; `eos` marks
/// the end of the stream.
#[derive(Clone, Debug, Default)]
pub struct Chunk {
    pub data: ChunkData,
    pub sync: bool,
    pub time: f64,
    pub eos: bool,
}

impl Chunk {
    /// An empty chunk.
    pub fn new() -> Self {
        Chunk::default()
    }

    /// Clears payload and markers. Allocations are kept for reuse.
    pub fn clear(&mut self) {
        match &mut self.data {
            ChunkData::Empty => {}
            ChunkData::Raw { data, pos } => {
                data.clear();
                *pos = 0;
            }
            ChunkData::Linear(buf) => buf.resize(0, 0),
        }
        self.sync = false;
        self.time = 0.0;
        self.eos = false;
    }

    /// True when the chunk carries no data and no markers.
    pub fn is_empty(&self) -> bool {
        self.size() == 0 && !self.sync && !self.eos
    }

    /// Payload size: bytes remaining for raw chunks, samples per channel for linear chunks.
    pub fn size(&self) -> usize {
        match &self.data {
            ChunkData::Empty => 0,
            ChunkData::Raw { data, pos } => data.len() - pos,
            ChunkData::Linear(buf) => buf.len(),
        }
    }

    /// Marks the chunk with a timestamp.
    pub fn set_sync(&mut self, time: f64) {
        self.sync = true;
        self.time = time;
    }

    /// Replaces the payload with a copy of `bytes`, reusing the previous raw allocation when
    /// one exists.
    pub fn set_raw(&mut self, bytes: &[u8]) {
        match &mut self.data {
            ChunkData::Raw { data, pos } => {
                data.clear();
                data.extend_from_slice(bytes);
                *pos = 0;
            }
            _ => self.data = ChunkData::Raw { data: bytes.to_vec(), pos: 0 },
        }
    }

    /// Replaces the payload with a copy of planar samples, reusing the previous linear
    /// allocation when one exists.
    pub fn set_linear(&mut self, samples: &SampleBuf) {
        match &mut self.data {
            ChunkData::Linear(buf) => buf.copy_from(samples),
            _ => {
                let mut buf = SampleBuf::default();
                buf.copy_from(samples);
                self.data = ChunkData::Linear(buf);
            }
        }
    }

    /// Unread raw bytes. Empty for non-raw chunks.
    pub fn raw(&self) -> &[u8] {
        match &self.data {
            ChunkData::Raw { data, pos } => &data[*pos..],
            _ => &[],
        }
    }

    /// Advances the raw read cursor.
    pub fn consume_raw(&mut self, n: usize) {
        if let ChunkData::Raw { data, pos } = &mut self.data {
            *pos = (*pos + n).min(data.len());
        }
    }

    /// Linear payload, if any.
    pub fn linear(&self) -> Option<&SampleBuf> {
        match &self.data {
            ChunkData::Linear(buf) => Some(buf),
            _ => None,
        }
    }

    /// Mutable linear payload, if any.
    pub fn linear_mut(&mut self) -> Option<&mut SampleBuf> {
        match &mut self.data {
            ChunkData::Linear(buf) => Some(buf),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_cursor() {
        let mut chunk = Chunk::new();
        chunk.set_raw(&[1, 2, 3, 4]);
        assert_eq!(chunk.size(), 4);
        chunk.consume_raw(3);
        assert_eq!(chunk.raw(), &[4]);
        chunk.consume_raw(10);
        assert!(chunk.is_empty());
    }

    #[test]
    fn clear_keeps_variant_allocation() {
        let mut chunk = Chunk::new();
        chunk.set_raw(&[0; 64]);
        chunk.set_sync(1.5);
        chunk.clear();
        assert!(chunk.is_empty());
        assert!(!chunk.sync);
        if let ChunkData::Raw { data, .. } = &chunk.data {
            assert!(data.capacity() >= 64);
        }
        else {
            panic!("raw allocation dropped");
        }
    }
}
