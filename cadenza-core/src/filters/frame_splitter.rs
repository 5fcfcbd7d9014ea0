// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::audio::{Format, Speakers};
use crate::chunk::Chunk;
use crate::errors::{bad_format_error, Result};
use crate::filter::Filter;
use crate::parser::HeaderParser;
use crate::streambuf::StreamBuffer;
use crate::timing::SyncTracker;

/// Synchronises a raw byte stream and splits it into frames, one frame per output chunk.
///
/// Accepts [`Format::RawData`] and any format the header parser accepts. The output format is
/// data dependent and determined by the parsed headers.
pub struct FrameSplitter {
    stream: StreamBuffer,
    tracker: SyncTracker,
    spk: Speakers,
    open: bool,
}

impl FrameSplitter {
    pub fn new(parser: Box<dyn HeaderParser>) -> Self {
        FrameSplitter {
            stream: StreamBuffer::new(parser),
            tracker: SyncTracker::new(),
            spk: Speakers::UNKNOWN,
            open: false,
        }
    }

    /// Number of frames split since creation.
    pub fn frames(&self) -> u32 {
        self.stream.frames()
    }

    pub fn errors(&self) -> u32 {
        self.stream.errors()
    }

    /// Loads one frame while keeping the timestamp bookkeeping consistent: every byte that
    /// left the stream (an emitted frame or dropped garbage) moves recorded sync positions
    /// back.
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
}

impl Filter for FrameSplitter {
    fn name(&self) -> &'static str {
        "FrameSplitter"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        spk.format == Format::RawData || self.stream.parser().can_parse(spk.format)
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("frame splitter: unsupported input format");
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
        self.stream.spk()
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        self.tracker.receive(input, self.stream.buffered());

        if self.load_frame(input) {
            output.clear();
            output.set_raw(self.stream.frame());
            self.tracker.stamp(output);
            return Ok(true);
        }

        // Not enough data for a frame.
        Ok(false)
    }

    fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
        let before = self.stream.buffered();
        if self.stream.flush() {
            self.tracker.drop_bytes(before - self.stream.buffered());
            output.clear();
            output.set_raw(self.stream.frame());
            self.tracker.stamp(output);
            return Ok(true);
        }
        Ok(false)
    }

    fn reset(&mut self) {
        self.stream.reset();
        self.tracker.reset();
    }

    fn new_stream(&self) -> bool {
        self.stream.is_new_stream()
    }
}
