// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `streambuf` module reconstructs frame boundaries from an arbitrarily fragmented byte
//! stream.

use log::debug;

use crate::audio::Speakers;
use crate::parser::{FrameInfo, HeaderParser};
use crate::sync::SyncScanner;

/// Outcome of a frame load attempt.
enum Load {
    /// A complete verified frame of the given size sits at the buffer start.
    Loaded(usize),
    /// More input is required.
    NeedData,
    /// The candidate is not a frame.
    Bad,
}

/// `StreamBuffer` turns a byte stream into a sequence of verified frames.
///
/// The buffer is fed through [`StreamBuffer::load_frame`] with a read cursor that advances by
/// exactly the bytes consumed. A frame is exposed only after its boundary is confirmed: when
/// entering sync, a frame must be followed by a header of the same stream; once in sync, a
/// frame must be followed by any valid header (a foreign one starts a new stream on the next
/// load). A stream's final frame is emitted by [`StreamBuffer::flush`].
///
/// Unrecognised bytes are skipped silently. The error counter increments when a frame body
/// fails verification after its header was accepted in sync.
pub struct StreamBuffer {
    parser: Box<dyn HeaderParser>,
    header_size: usize,
    min_frame_size: usize,
    max_frame_size: usize,
    sync_offset: usize,
    scanner: SyncScanner,

    buf: Vec<u8>,
    prev_hdr: Vec<u8>,
    finfo: Option<FrameInfo>,
    frame_size: usize,
    frame_loaded: bool,
    in_sync: bool,
    is_new_stream: bool,
    scan_pos: usize,

    frames: u32,
    errors: u32,
}

impl StreamBuffer {
    pub fn new(parser: Box<dyn HeaderParser>) -> Self {
        let info = parser.sync_info();
        StreamBuffer {
            header_size: parser.header_size(),
            min_frame_size: info.min_frame_size.max(parser.header_size()),
            max_frame_size: info.max_frame_size,
            sync_offset: info.sync_offset,
            scanner: SyncScanner::from_info(&info),
            parser,
            buf: Vec::new(),
            prev_hdr: Vec::new(),
            finfo: None,
            frame_size: 0,
            frame_loaded: false,
            in_sync: false,
            is_new_stream: false,
            scan_pos: 0,
            frames: 0,
            errors: 0,
        }
    }

    pub fn parser(&self) -> &dyn HeaderParser {
        self.parser.as_ref()
    }

    /// Re-initialises all state, including the previous-header memory: the next frame will be
    /// marked as a new stream.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.prev_hdr.clear();
        self.finfo = None;
        self.frame_size = 0;
        self.frame_loaded = false;
        self.in_sync = false;
        self.is_new_stream = false;
        self.scan_pos = 0;
        self.scanner.reset();
    }

    /// Loads the next frame from the stream, consuming bytes from `input`. Returns `true` when
    /// a complete frame is exposed through [`StreamBuffer::frame`].
    pub fn load_frame(&mut self, input: &mut &[u8]) -> bool {
        self.drop_loaded_frame();

        loop {
            if !self.fill(input, self.header_size) {
                return false;
            }

            let hdr = self.parser.parse_header(&self.buf[..self.header_size]);

            if !self.in_sync {
                // Searching for a sync point. A candidate header at the buffer start must be
                // followed by a matching header to enter sync.
                match hdr {
                    Some(fi) => match self.try_load(input, &fi, true) {
                        Load::Loaded(size) => {
                            self.commit(fi, size);
                            return true;
                        }
                        Load::NeedData => return false,
                        Load::Bad => self.drop_bytes(1),
                    },
                    None => self.drop_to_next_candidate(),
                }
            }
            else {
                // In sync: the buffer starts at a frame boundary.
                match hdr {
                    Some(fi) => {
                        let same = self.parser.compare_headers(
                            &self.prev_hdr,
                            &self.buf[..self.header_size],
                        );
                        // A foreign header must be verified like a fresh sync point; a
                        // matching one only needs a valid successor.
                        match self.try_load(input, &fi, !same) {
                            Load::Loaded(size) => {
                                self.commit(fi, size);
                                return true;
                            }
                            Load::NeedData => return false,
                            Load::Bad => {
                                self.errors += 1;
                                self.lose_sync();
                            }
                        }
                    }
                    None => {
                        self.errors += 1;
                        self.lose_sync();
                    }
                }
            }
        }
    }

    /// Emits the stream's final frame from the buffered tail, if a valid one remains. Call
    /// after the input is exhausted.
    pub fn flush(&mut self) -> bool {
        self.drop_loaded_frame();

        if !self.in_sync || self.buf.len() < self.min_frame_size {
            return false;
        }

        let fi = match self.parser.parse_header(&self.buf[..self.header_size]) {
            Some(fi) => fi,
            None => return false,
        };

        let size = if fi.frame_size > 0 { fi.frame_size } else { self.buf.len() };
        if size > self.buf.len() || !self.parser.validate_frame(&self.buf[..size]) {
            return false;
        }

        self.commit(fi, size);
        true
    }

    /// The loaded frame.
    pub fn frame(&self) -> &[u8] {
        if self.frame_loaded {
            &self.buf[..self.frame_size]
        }
        else {
            &[]
        }
    }

    pub fn frame_size(&self) -> usize {
        if self.frame_loaded {
            self.frame_size
        }
        else {
            0
        }
    }

    pub fn frame_info(&self) -> Option<&FrameInfo> {
        self.finfo.as_ref()
    }

    /// Format of the current stream, [`Speakers::UNKNOWN`] before the first frame.
    pub fn spk(&self) -> Speakers {
        self.finfo.as_ref().map(|fi| fi.spk).unwrap_or(Speakers::UNKNOWN)
    }

    pub fn is_in_sync(&self) -> bool {
        self.in_sync
    }

    pub fn is_frame_loaded(&self) -> bool {
        self.frame_loaded
    }

    /// True exactly when the loaded frame is the first of a contiguous compatible-header run.
    pub fn is_new_stream(&self) -> bool {
        self.frame_loaded && self.is_new_stream
    }

    /// Bytes currently held by the buffer, the loaded frame included.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    fn drop_loaded_frame(&mut self) {
        if self.frame_loaded {
            self.buf.drain(..self.frame_size);
            self.frame_loaded = false;
            self.is_new_stream = false;
            self.frame_size = 0;
            self.scan_pos = 0;
        }
    }

    /// Appends bytes from `input` until the buffer holds `need` bytes. Returns false when the
    /// input runs out first.
    fn fill(&mut self, input: &mut &[u8], need: usize) -> bool {
        if self.buf.len() < need {
            let take = (need - self.buf.len()).min(input.len());
            self.buf.extend_from_slice(&input[..take]);
            *input = &input[take..];
        }
        self.buf.len() >= need
    }

    fn drop_bytes(&mut self, n: usize) {
        self.buf.drain(..n.min(self.buf.len()));
        self.scan_pos = 0;
    }

    fn lose_sync(&mut self) {
        debug!(target: "cadenza::streambuf", "sync lost, resynchronising");
        self.in_sync = false;
        self.drop_bytes(1);
    }

    /// Attempts to complete the frame described by `fi` at the buffer start. When `strict` is
    /// set the successor header must also belong to the same stream.
    fn try_load(&mut self, input: &mut &[u8], fi: &FrameInfo, strict: bool) -> Load {
        let hs = self.header_size;

        if fi.frame_size > 0 {
            if fi.frame_size < self.min_frame_size || fi.frame_size > self.max_frame_size {
                return Load::Bad;
            }
            if !self.fill(input, fi.frame_size + hs) {
                return Load::NeedData;
            }

            let frame = &self.buf[..fi.frame_size];
            let tail = &self.buf[fi.frame_size..fi.frame_size + hs];

            if self.parser.parse_header(tail).is_none() {
                return Load::Bad;
            }
            if strict && !self.parser.compare_headers(&self.buf[..hs], tail) {
                return Load::Bad;
            }
            if !self.parser.validate_frame(frame) {
                return Load::Bad;
            }
            Load::Loaded(fi.frame_size)
        }
        else {
            // The header does not carry the frame size: the frame extends to the next valid
            // header. Scan from the minimum frame size onwards, remembering progress across
            // refills.
            if self.scan_pos < self.min_frame_size {
                self.scan_pos = self.min_frame_size;
            }
            loop {
                if self.scan_pos > self.max_frame_size {
                    return Load::Bad;
                }
                if !self.fill(input, self.scan_pos + hs) {
                    return Load::NeedData;
                }
                let at = self.scan_pos;
                if self.parser.parse_header(&self.buf[at..at + hs]).is_some()
                    && self.parser.validate_frame(&self.buf[..at])
                {
                    return Load::Loaded(at);
                }
                self.scan_pos += 1;
            }
        }
    }

    /// Skips unrecognised bytes up to the next possible sync point.
    fn drop_to_next_candidate(&mut self) {
        let keep_tail = 3 + self.sync_offset;
        let start = 1 + self.sync_offset;

        if self.buf.len() <= start {
            self.drop_bytes(1);
            return;
        }

        self.scanner.reset();
        let gone = self.scanner.scan(&self.buf[start..]);

        if self.scanner.has_sync() {
            // The sync word ends at start + gone; the candidate frame starts sync_offset + 4
            // bytes before that.
            let candidate = start + gone - 4 - self.sync_offset;
            self.drop_bytes(candidate.max(1));
        }
        else {
            // No sync pattern in the buffer. Keep only the bytes that may still begin one.
            let drop = self.buf.len().saturating_sub(keep_tail).max(1);
            self.drop_bytes(drop);
        }
    }

    fn commit(&mut self, fi: FrameInfo, size: usize) {
        let hs = self.header_size;

        self.is_new_stream = self.prev_hdr.is_empty()
            || !self.parser.compare_headers(&self.prev_hdr, &self.buf[..hs]);
        self.prev_hdr.clear();
        self.prev_hdr.extend_from_slice(&self.buf[..hs]);

        if self.is_new_stream {
            debug!(target: "cadenza::streambuf", "new stream: {}", fi.spk);
        }

        self.finfo = Some(FrameInfo { frame_size: size, ..fi });
        self.frame_size = size;
        self.frame_loaded = true;
        self.in_sync = true;
        self.frames += 1;
    }
}
