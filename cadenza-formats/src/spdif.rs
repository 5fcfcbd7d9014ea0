// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IEC 61937 (S/PDIF) framing: burst header parsing, wrapping of compressed frames into
//! bursts, and unwrapping back to elementary streams.
//!
//! A burst occupies one frame interval of the 16-bit stereo carrier (4 bytes per sample
//! frame): an 8-byte preamble (Pa = 0xF872, Pb = 0x4E1F, the data-type word Pc and the
//! payload length in bits Pd, all as little-endian words), the payload with byte pairs
//! swapped into the carrier's byte order, and zero padding up to the interval.

use log::warn;

use cadenza_core::audio::{Format, Speakers};
use cadenza_core::chunk::Chunk;
use cadenza_core::errors::{bad_format_error, Result};
use cadenza_core::filter::Filter;
use cadenza_core::parser::{BitstreamType, FrameInfo, HeaderParser};
use cadenza_core::streambuf::StreamBuffer;
use cadenza_core::sync::{SyncInfo, SyncPattern};
use cadenza_core::timing::SyncTracker;

use crate::multi::MultiHeader;

/// S/PDIF burst preamble as it appears in the byte stream.
pub const SPDIF_MAGIC: [u8; 4] = [0x72, 0xf8, 0x1f, 0x4e];

/// Burst preamble size in bytes.
pub const SPDIF_HEADER_SIZE: usize = 8;

const SPDIF_MIN_FRAME_SIZE: usize = 1536;
const SPDIF_MAX_FRAME_SIZE: usize = 8192;

/// Swaps byte pairs, converting between the 8-bit elementary stream order and the 16-bit
/// little-endian carrier order. The odd tail byte, if any, is copied as is.
fn swap_pairs(src: &[u8], dst: &mut Vec<u8>) {
    dst.clear();
    let mut chunks = src.chunks_exact(2);
    for pair in &mut chunks {
        dst.push(pair[1]);
        dst.push(pair[0]);
    }
    dst.extend_from_slice(chunks.remainder());
}

/// IEC 61937 burst header parser. The contained elementary header is parsed as well, so the
/// reported format carries the wrapped stream's speaker configuration and sample rate.
pub struct SpdifHeader {
    inner: MultiHeader,
}

impl Default for SpdifHeader {
    fn default() -> Self {
        SpdifHeader::new()
    }
}

impl SpdifHeader {
    pub fn new() -> Self {
        SpdifHeader { inner: MultiHeader::dvd() }
    }

    /// Parses the wrapped elementary frame header found at the payload start.
    pub fn inner_info(&self, hdr: &[u8]) -> Option<FrameInfo> {
        if hdr.len() < self.header_size() || hdr[..4] != SPDIF_MAGIC {
            return None;
        }
        self.inner.parse_header(&hdr[SPDIF_HEADER_SIZE..])
    }
}

impl HeaderParser for SpdifHeader {
    fn header_size(&self) -> usize {
        SPDIF_HEADER_SIZE + self.inner.header_size()
    }

    fn min_frame_size(&self) -> usize {
        SPDIF_MIN_FRAME_SIZE
    }

    fn max_frame_size(&self) -> usize {
        SPDIF_MAX_FRAME_SIZE
    }

    fn can_parse(&self, format: Format) -> bool {
        format == Format::Spdif
    }

    fn sync_info(&self) -> SyncInfo {
        SyncInfo::new(
            &[SyncPattern::new(0x72f8_1f4e, 0xffff_ffff)],
            self.min_frame_size(),
            self.max_frame_size(),
        )
    }

    fn parse_header(&self, hdr: &[u8]) -> Option<FrameInfo> {
        let inner = self.inner_info(hdr)?;

        let data_type = u16::from_le_bytes([hdr[4], hdr[5]]) & 0x1f;
        if data_type == 0 || inner.spdif_type == 0 || data_type != inner.spdif_type {
            return None;
        }

        if inner.nsamples == 0 {
            return None;
        }
        let frame_size = inner.nsamples * 4;
        if frame_size < SPDIF_MIN_FRAME_SIZE || frame_size > SPDIF_MAX_FRAME_SIZE {
            return None;
        }

        Some(FrameInfo {
            spk: Speakers::new(Format::Spdif, inner.spk.mask, inner.spk.sample_rate),
            frame_size,
            nsamples: inner.nsamples,
            bs_type: BitstreamType::Le16,
            spdif_type: inner.spdif_type,
        })
    }
}

/// Wraps compressed frames into S/PDIF bursts ("spdifer").
///
/// Frames that cannot be carried (no IEC data-type code, or a frame too large for its
/// interval) pass through unwrapped; the output format changes accordingly and downstream
/// planning falls back to the decode path.
pub struct Spdifer {
    stream: StreamBuffer,
    tracker: SyncTracker,
    spk: Speakers,
    out_spk: Speakers,
    open: bool,
    is_new_stream: bool,
    burst: Vec<u8>,
    payload: Vec<u8>,
}

impl Default for Spdifer {
    fn default() -> Self {
        Spdifer::new()
    }
}

impl Spdifer {
    pub fn new() -> Self {
        Spdifer {
            stream: StreamBuffer::new(Box::new(MultiHeader::dvd())),
            tracker: SyncTracker::new(),
            spk: Speakers::UNKNOWN,
            out_spk: Speakers::UNKNOWN,
            open: false,
            is_new_stream: false,
            burst: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn frames(&self) -> u32 {
        self.stream.frames()
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

    /// Builds the output chunk for the loaded frame: an IEC burst, or the naked frame when
    /// it cannot be wrapped.
    fn emit(&mut self, output: &mut Chunk) {
        let finfo = self.stream.frame_info().cloned().unwrap_or_default();
        let frame = self.stream.frame();
        let burst_size = finfo.nsamples * 4;
        let was_spk = self.out_spk;

        output.clear();

        if finfo.spdif_type == 0 || frame.len() + SPDIF_HEADER_SIZE > burst_size {
            if finfo.spdif_type != 0 {
                warn!(
                    target: "cadenza::spdif",
                    "frame of {} bytes does not fit a {} byte burst, passing through",
                    frame.len(), burst_size
                );
            }
            self.out_spk = finfo.spk;
            output.set_raw(frame);
        }
        else {
            // The payload must be in the carrier's 16-bit little-endian order.
            match finfo.bs_type {
                BitstreamType::B8 | BitstreamType::Be16 | BitstreamType::Be14 => {
                    swap_pairs(frame, &mut self.payload)
                }
                _ => {
                    self.payload.clear();
                    self.payload.extend_from_slice(frame);
                }
            }

            self.burst.clear();
            self.burst.extend_from_slice(&SPDIF_MAGIC);
            self.burst.extend_from_slice(&finfo.spdif_type.to_le_bytes());
            self.burst.extend_from_slice(&((frame.len() * 8) as u16).to_le_bytes());
            self.burst.extend_from_slice(&self.payload);
            self.burst.resize(burst_size, 0);

            self.out_spk =
                Speakers::new(Format::Spdif, finfo.spk.mask, finfo.spk.sample_rate);
            output.set_raw(&self.burst);
        }

        self.is_new_stream = self.stream.is_new_stream() || self.out_spk != was_spk;
        self.tracker.stamp(output);
    }
}

impl Filter for Spdifer {
    fn name(&self) -> &'static str {
        "Spdifer"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        spk.format == Format::RawData || self.stream.parser().can_parse(spk.format)
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("spdifer: unsupported input format");
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

        if self.load_frame(input) {
            self.emit(output);
            return Ok(true);
        }
        Ok(false)
    }

    fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
        if self.stream.flush() {
            self.emit(output);
            return Ok(true);
        }
        Ok(false)
    }

    fn reset(&mut self) {
        self.stream.reset();
        self.tracker.reset();
        self.out_spk = Speakers::UNKNOWN;
        self.is_new_stream = false;
    }

    fn new_stream(&self) -> bool {
        self.is_new_stream
    }
}

/// Unwraps S/PDIF bursts back to the contained elementary stream ("despdifer").
pub struct Despdifer {
    stream: StreamBuffer,
    header: SpdifHeader,
    tracker: SyncTracker,
    spk: Speakers,
    out_spk: Speakers,
    open: bool,
    is_new_stream: bool,
    frame: Vec<u8>,
}

impl Default for Despdifer {
    fn default() -> Self {
        Despdifer::new()
    }
}

impl Despdifer {
    pub fn new() -> Self {
        Despdifer {
            stream: StreamBuffer::new(Box::new(SpdifHeader::new())),
            header: SpdifHeader::new(),
            tracker: SyncTracker::new(),
            spk: Speakers::UNKNOWN,
            out_spk: Speakers::UNKNOWN,
            open: false,
            is_new_stream: false,
            frame: Vec::new(),
        }
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

    fn emit(&mut self, output: &mut Chunk) -> bool {
        let burst = self.stream.frame();
        let inner = match self.header.inner_info(burst) {
            Some(inner) => inner,
            None => return false,
        };

        let len_bits = u16::from_le_bytes([burst[6], burst[7]]) as usize;
        let len = len_bits / 8;
        if SPDIF_HEADER_SIZE + len > burst.len() {
            return false;
        }

        // Restore the elementary byte order.
        swap_pairs(&burst[SPDIF_HEADER_SIZE..SPDIF_HEADER_SIZE + len], &mut self.frame);

        let was_spk = self.out_spk;
        self.out_spk = inner.spk;
        self.is_new_stream = self.stream.is_new_stream() || self.out_spk != was_spk;

        output.clear();
        output.set_raw(&self.frame);
        self.tracker.stamp(output);
        true
    }
}

impl Filter for Despdifer {
    fn name(&self) -> &'static str {
        "Despdifer"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        spk.format == Format::Spdif || spk.format == Format::RawData
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("despdifer: input is not an spdif stream");
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
            if self.emit(output) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
        while self.stream.flush() {
            if self.emit(output) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reset(&mut self) {
        self.stream.reset();
        self.tracker.reset();
        self.out_spk = Speakers::UNKNOWN;
        self.is_new_stream = false;
    }

    fn new_stream(&self) -> bool {
        self.is_new_stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_swap_round_trip() {
        let data = [1u8, 2, 3, 4, 5];
        let mut swapped = Vec::new();
        swap_pairs(&data, &mut swapped);
        assert_eq!(swapped, [2, 1, 4, 3, 5]);
        let mut back = Vec::new();
        swap_pairs(&swapped, &mut back);
        assert_eq!(back, data);
    }
}
