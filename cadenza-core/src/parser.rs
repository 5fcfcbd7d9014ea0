// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `parser` module defines the header parser and frame decoder contracts, and the decoder
//! registry.

use crate::audio::{Format, SampleBuf, Speakers};
use crate::errors::Result;
use crate::sync::SyncInfo;

/// Packing of a compressed stream into bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BitstreamType {
    /// Plain byte stream.
    #[default]
    B8,
    /// 16-bit little-endian words.
    Le16,
    /// 16-bit big-endian words.
    Be16,
    /// 14 bits payload per 16-bit big-endian word.
    Be14,
    /// 14 bits payload per 16-bit little-endian word.
    Le14,
}

/// Everything a frame header tells about the frame it starts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameInfo {
    pub spk: Speakers,
    /// Frame size in stream bytes, including the header. Zero when the size is not derivable
    /// from the header; the frame then extends to the next matching header.
    pub frame_size: usize,
    /// Samples per channel carried by the frame. Zero when unknown.
    pub nsamples: usize,
    pub bs_type: BitstreamType,
    /// IEC 61937 data-type code for passthrough, zero when the stream cannot be passed
    /// through.
    pub spdif_type: u16,
}

impl FrameInfo {
    /// Frame interval in seconds, when derivable.
    pub fn duration(&self) -> Option<f64> {
        if self.nsamples != 0 && self.spk.sample_rate != 0 {
            Some(self.nsamples as f64 / self.spk.sample_rate as f64)
        }
        else {
            None
        }
    }
}

/// Frame header recognition for one stream format family.
///
/// Header parsers are stateless: all methods take `&self` and may be called in any order.
pub trait HeaderParser {
    /// Number of bytes needed to parse a header.
    fn header_size(&self) -> usize;

    fn min_frame_size(&self) -> usize;

    fn max_frame_size(&self) -> usize;

    /// Format filter predicate.
    fn can_parse(&self, format: Format) -> bool;

    /// Acceptable frame starts for sync scanning.
    fn sync_info(&self) -> SyncInfo;

    /// Parses a header. `hdr` holds at least [`HeaderParser::header_size`] bytes. Returns
    /// `None` when the bytes do not form a valid header.
    fn parse_header(&self, hdr: &[u8]) -> Option<FrameInfo>;

    /// True when two headers belong to the same logical stream: same sample rate, channel
    /// configuration and bitstream packing. The default accepts headers that parse to the
    /// same stream identity and frame size.
    fn compare_headers(&self, hdr1: &[u8], hdr2: &[u8]) -> bool {
        match (self.parse_header(hdr1), self.parse_header(hdr2)) {
            (Some(a), Some(b)) => {
                a.spk == b.spk && a.bs_type == b.bs_type && a.frame_size == b.frame_size
            }
            _ => false,
        }
    }

    /// Checks a complete candidate frame body for structural validity. Formats without an
    /// internal frame structure accept everything.
    fn validate_frame(&self, _frame: &[u8]) -> bool {
        true
    }
}

/// A pure frame decoder: one validated frame in, one block of planar linear samples out.
pub trait FrameParser {
    /// Discards decoding state. The next frame starts a new stream.
    fn reset(&mut self);

    /// Decodes one frame. On error the decoder state is unchanged and no samples are
    /// produced; the caller counts the error and continues with the next frame.
    fn parse_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Output format of the last decoded frame.
    fn spk(&self) -> Speakers;

    /// Samples of the last decoded frame.
    fn samples(&self) -> &SampleBuf;

    /// Samples per channel in the last decoded frame.
    fn nsamples(&self) -> usize;

    /// True when the last frame's configuration differs from the previous one.
    fn new_stream(&self) -> bool;
}

/// A registered decoder: the format it handles plus factories for its header parser and frame
/// decoder.
#[derive(Copy, Clone)]
pub struct RegisteredDecoder {
    pub format: Format,
    pub make_header: fn() -> Box<dyn HeaderParser>,
    pub make_decoder: fn() -> Box<dyn FrameParser>,
}

/// Maps stream formats to black-box frame decoders.
///
/// The MPEG Audio decoder is registered by the `cadenza` facade crate; AC-3, DTS and MLP
/// decoders are registered the same way by whoever binds one.
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: Vec<RegisteredDecoder>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        DecoderRegistry::default()
    }

    /// Registers a decoder. A decoder registered later for the same format replaces the
    /// earlier one.
    pub fn register(&mut self, decoder: RegisteredDecoder) {
        self.decoders.retain(|d| d.format != decoder.format);
        self.decoders.push(decoder);
    }

    pub fn supports(&self, format: Format) -> bool {
        self.decoders.iter().any(|d| d.format == format)
    }

    pub fn get(&self, format: Format) -> Option<&RegisteredDecoder> {
        self.decoders.iter().find(|d| d.format == format)
    }
}
