// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::warn;

use crate::audio::{Format, Speakers};
use crate::chunk::Chunk;
use crate::errors::{bad_format_error, Result};
use crate::filter::Filter;
use crate::parser::{FrameParser, HeaderParser};
use crate::streambuf::StreamBuffer;
use crate::timing::SyncTracker;

/// Synchronises a raw byte stream, decodes every frame and emits linear sample chunks.
///
/// Frames that fail to decode are counted and dropped; audio continuity has priority over
/// bit-exact fidelity. The output format is [`Speakers::UNKNOWN`] until the first frame
/// decodes.
pub struct ParserFilter {
    stream: StreamBuffer,
    decoder: Box<dyn FrameParser>,
    tracker: SyncTracker,
    spk: Speakers,
    out_spk: Speakers,
    open: bool,
    is_new_stream: bool,
    pending_new_stream: bool,
    errors: u32,
}

impl ParserFilter {
    pub fn new(header: Box<dyn HeaderParser>, decoder: Box<dyn FrameParser>) -> Self {
        ParserFilter {
            stream: StreamBuffer::new(header),
            decoder,
            tracker: SyncTracker::new(),
            spk: Speakers::UNKNOWN,
            out_spk: Speakers::UNKNOWN,
            open: false,
            is_new_stream: false,
            pending_new_stream: false,
            errors: 0,
        }
    }

    /// Number of frames split from the stream since creation.
    pub fn frames(&self) -> u32 {
        self.stream.frames()
    }

    /// Number of frames that failed header verification or decoding.
    pub fn errors(&self) -> u32 {
        self.errors + self.stream.errors()
    }

    fn load_frame(&mut self, input: &mut Chunk) -> bool {
        let mut cursor = input.raw();
        let before = self.stream.buffered() + cursor.len();

        let loaded = self.stream.load_frame(&mut cursor);

        let consumed = input.raw().len() - cursor.len();
        let after = self.stream.buffered() + cursor.len();
        input.consume_raw(consumed);
        self.tracker.drop_bytes(before - after);

        loaded
    }

    /// Decodes the loaded frame into `output`. Returns false on a decode error.
    fn decode_frame(&mut self, output: &mut Chunk) -> bool {
        self.pending_new_stream |= self.stream.is_new_stream();

        let old_spk = self.decoder.spk();
        match self.decoder.parse_frame(self.stream.frame()) {
            Ok(()) => {
                if self.decoder.new_stream() || self.decoder.spk() != old_spk {
                    self.pending_new_stream = true;
                }
                output.clear();
                output.set_linear(self.decoder.samples());
                self.tracker.stamp(output);

                self.out_spk = self.decoder.spk();
                self.is_new_stream = self.pending_new_stream;
                self.pending_new_stream = false;
                true
            }
            Err(err) => {
                warn!(target: "cadenza::parser", "frame decode failed: {}", err);
                self.errors += 1;
                false
            }
        }
    }
}

impl Filter for ParserFilter {
    fn name(&self) -> &'static str {
        "ParserFilter"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        spk.format == Format::RawData || self.stream.parser().can_parse(spk.format)
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("parser filter: unsupported input format");
        }
        self.reset();
        self.spk = spk;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.reset();
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
        self.out_spk
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        self.tracker.receive(input, self.stream.buffered());

        while self.load_frame(input) {
            if self.decode_frame(output) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
        while self.stream.flush() {
            if self.decode_frame(output) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reset(&mut self) {
        self.stream.reset();
        self.decoder.reset();
        self.tracker.reset();
        self.out_spk = Speakers::UNKNOWN;
        self.is_new_stream = false;
        self.pending_new_stream = false;
    }

    fn new_stream(&self) -> bool {
        self.is_new_stream
    }
}
