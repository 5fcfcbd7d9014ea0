// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use cadenza_core::audio::Speakers;
use cadenza_core::chunk::Chunk;
use cadenza_core::errors::{bad_format_error, Result};
use cadenza_core::filter::Filter;
use cadenza_core::filters::ParserFilter;
use cadenza_core::parser::DecoderRegistry;

/// Format-dispatching audio decoder: opens the registered frame decoder for the input format
/// and streams through it. Tracks stream-change events of the underlying parser.
pub struct AudioDecoder {
    registry: Arc<DecoderRegistry>,
    inner: Option<ParserFilter>,
    spk: Speakers,
}

impl AudioDecoder {
    pub fn new(registry: Arc<DecoderRegistry>) -> Self {
        AudioDecoder { registry, inner: None, spk: Speakers::UNKNOWN }
    }

    /// Frame-level decode errors counted so far.
    pub fn errors(&self) -> u32 {
        self.inner.as_ref().map(|p| p.errors()).unwrap_or(0)
    }

    pub fn frames(&self) -> u32 {
        self.inner.as_ref().map(|p| p.frames()).unwrap_or(0)
    }
}

impl Filter for AudioDecoder {
    fn name(&self) -> &'static str {
        "AudioDecoder"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        self.registry.supports(spk.format)
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        let registered = match self.registry.get(spk.format) {
            Some(registered) => registered,
            None => return bad_format_error("decoder: no decoder registered for the format"),
        };

        let mut inner =
            ParserFilter::new((registered.make_header)(), (registered.make_decoder)());
        inner.open(spk)?;
        self.inner = Some(inner);
        self.spk = spk;
        Ok(())
    }

    fn close(&mut self) {
        self.inner = None;
        self.spk = Speakers::UNKNOWN;
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn get_input(&self) -> Speakers {
        self.spk
    }

    fn get_output(&self) -> Speakers {
        self.inner.as_ref().map(|p| p.get_output()).unwrap_or(Speakers::UNKNOWN)
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        match self.inner.as_mut() {
            Some(inner) => inner.process(input, output),
            None => Ok(false),
        }
    }

    fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(output),
            None => Ok(false),
        }
    }

    fn reset(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.reset();
        }
    }

    fn new_stream(&self) -> bool {
        self.inner.as_ref().map(|p| p.new_stream()).unwrap_or(false)
    }
}
