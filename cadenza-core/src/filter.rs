// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `filter` module defines the processing block contract every Cadenza filter satisfies.

use std::mem;

use crate::audio::Speakers;
use crate::chunk::Chunk;
use crate::errors::Result;

/// The capability contract of a processing block.
///
/// A filter is opened for a negotiated input format, fed chunks through [`Filter::process`],
/// drained with [`Filter::flush`] when input is exhausted, and closed. `process` consumes some
/// of the input chunk and may produce into the output chunk; it returns `true` exactly when the
/// output chunk is non-empty. A filter with buffered state may need several `process` calls for
/// one input chunk, or several input chunks for one output chunk.
pub trait Filter {
    /// The filter's display name, used when printing processing chains.
    fn name(&self) -> &'static str;

    /// Format filter predicate: can the filter be opened for this input format?
    fn can_open(&self, spk: Speakers) -> bool;

    /// Opens the filter for an input format. Opening an already open filter with the same
    /// format is a no-op; a different format closes and reopens it.
    fn open(&mut self, spk: Speakers) -> Result<()>;

    /// Drops all data and releases resources. Configuration parameters survive.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// The negotiated input format, [`Speakers::UNKNOWN`] when closed.
    fn get_input(&self) -> Speakers;

    /// The current output format. May be [`Speakers::UNKNOWN`] while the filter is in a
    /// transitional state and the output format cannot be determined yet.
    fn get_output(&self) -> Speakers;

    /// Consumes some of `input`, possibly producing into `output`. Returns `true` iff `output`
    /// is non-empty.
    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool>;

    /// Called repeatedly after input is exhausted; emits buffered tail data. Returns `true`
    /// iff `output` is non-empty.
    fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
        output.clear();
        Ok(false)
    }

    /// Discards internal processing state, keeping configuration and the open format.
    fn reset(&mut self);

    /// True when the chunk just produced begins a new logical stream.
    fn new_stream(&self) -> bool {
        false
    }
}

/// A filter that passes chunks through unchanged. Accepts any format.
#[derive(Default)]
pub struct Passthrough {
    spk: Speakers,
    open: bool,
}

impl Passthrough {
    pub fn new() -> Self {
        Passthrough::default()
    }
}

impl Filter for Passthrough {
    fn name(&self) -> &'static str {
        "Passthrough"
    }

    fn can_open(&self, _spk: Speakers) -> bool {
        true
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        self.spk = spk;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.spk = Speakers::UNKNOWN;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn get_input(&self) -> Speakers {
        self.spk
    }

    fn get_output(&self) -> Speakers {
        self.spk
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        if input.is_empty() {
            return Ok(false);
        }
        mem::swap(input, output);
        input.clear();
        Ok(true)
    }

    fn reset(&mut self) {}
}
