// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MPEG Audio (Layer I/II) frame headers.

use cadenza_core::audio::{layout, Format, Speakers};
use cadenza_core::parser::{BitstreamType, FrameInfo, HeaderParser};
use cadenza_core::sync::{SyncInfo, SyncPattern};

/// Samples per Layer I frame.
pub const MPA_NSAMPLES_L1: usize = 384;
/// Samples per Layer II frame.
pub const MPA_NSAMPLES_L2: usize = 1152;

/// The largest possible Layer I/II frame: Layer II at 384 kbps / 32 kHz plus padding.
pub const MPA_MAX_FRAME_SIZE: usize = 1729;

/// Bitrate table in kbps, indexed by `[version][layer][bitrate_index]`. Layer III columns are
/// carried for completeness of the header check.
pub const BITRATE_TBL: [[[u32; 16]; 3]; 2] = [
    // MPEG1
    [
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],
    ],
    // MPEG2 LSF
    [
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
    ],
];

/// Sample rate table indexed by `[version][sampling_frequency]`.
pub const FREQ_TBL: [[u32; 3]; 2] = [[44100, 48000, 32000], [22050, 24000, 16000]];

/// Frame slots per layer (Layer I slots are 4 bytes wide).
pub const SLOTS_TBL: [u32; 3] = [12, 144, 144];

/// The decoded fields of a Layer I/II header, in 8-bit byte order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MpaHeaderBits {
    /// 0 = MPEG1, 1 = MPEG2 LSF.
    pub ver: usize,
    /// 0 = Layer I, 1 = Layer II, 2 = Layer III.
    pub layer: usize,
    pub bitrate_index: usize,
    pub sampling_frequency: usize,
    pub padding: bool,
    pub error_protection: bool,
    /// 0 = stereo, 1 = joint stereo, 2 = dual channel, 3 = single channel.
    pub mode: usize,
    pub mode_ext: usize,
}

impl MpaHeaderBits {
    /// Decodes the four header bytes (sync byte first).
    pub fn parse(hdr: [u8; 4]) -> Option<Self> {
        if hdr[0] != 0xff || hdr[1] & 0xf0 != 0xf0 {
            return None;
        }

        let ver = 1 - ((hdr[1] >> 3) & 1) as usize;
        let layer = 3 - ((hdr[1] >> 1) & 3) as usize;
        let error_protection = hdr[1] & 1 == 0;
        let bitrate_index = (hdr[2] >> 4) as usize;
        let sampling_frequency = ((hdr[2] >> 2) & 3) as usize;
        let padding = hdr[2] & 2 != 0;
        let mode = (hdr[3] >> 6) as usize;
        let mode_ext = ((hdr[3] >> 4) & 3) as usize;

        // Integrity: reserved layer, bad indices, free format.
        if layer == 3 || bitrate_index == 0 || bitrate_index == 15 || sampling_frequency == 3 {
            return None;
        }

        Some(MpaHeaderBits {
            ver,
            layer,
            bitrate_index,
            sampling_frequency,
            padding,
            error_protection,
            mode,
            mode_ext,
        })
    }

    pub fn bitrate(&self) -> u32 {
        BITRATE_TBL[self.ver][self.layer][self.bitrate_index] * 1000
    }

    pub fn sample_rate(&self) -> u32 {
        FREQ_TBL[self.ver][self.sampling_frequency]
    }

    pub fn nch(&self) -> usize {
        if self.mode == 3 {
            1
        }
        else {
            2
        }
    }

    /// Frame size in bytes, the header included.
    pub fn frame_size(&self) -> usize {
        let mut size = (self.bitrate() * SLOTS_TBL[self.layer] / self.sample_rate()) as usize
            + usize::from(self.padding);
        if self.layer == 0 {
            size *= 4;
        }
        size
    }

    pub fn nsamples(&self) -> usize {
        if self.layer == 0 {
            MPA_NSAMPLES_L1
        }
        else {
            MPA_NSAMPLES_L2
        }
    }

    /// Some Layer II bitrate and mode combinations are not allowed.
    pub fn check_layer2_modes(&self) -> bool {
        if self.layer != 1 || self.ver != 0 {
            return true;
        }
        let kbps = BITRATE_TBL[self.ver][self.layer][self.bitrate_index];
        if self.mode == 3 {
            !matches!(kbps, 224 | 256 | 320 | 384)
        }
        else {
            !matches!(kbps, 32 | 48 | 56 | 80)
        }
    }
}

/// Reads the four header bytes out of the stream, detecting the packing. MPEG audio headers
/// are ambiguous between byte orders, so the plain 8-bit order is tried first.
pub fn load_header(buf: &[u8]) -> Option<(MpaHeaderBits, BitstreamType)> {
    if buf.len() < 4 {
        return None;
    }

    // 8-bit or 16-bit little endian stream.
    if buf[0] == 0xff && buf[1] & 0xf0 == 0xf0 {
        if let Some(bits) = MpaHeaderBits::parse([buf[0], buf[1], buf[2], buf[3]]) {
            return Some((bits, BitstreamType::B8));
        }
    }

    // 16-bit big endian stream: byte pairs swapped.
    if buf[1] == 0xff && buf[0] & 0xf0 == 0xf0 {
        if let Some(bits) = MpaHeaderBits::parse([buf[1], buf[0], buf[3], buf[2]]) {
            return Some((bits, BitstreamType::Be16));
        }
    }

    None
}

/// MPEG Audio Layer I/II header parser.
#[derive(Default)]
pub struct MpaHeader;

impl MpaHeader {
    pub fn new() -> Self {
        MpaHeader
    }
}

impl HeaderParser for MpaHeader {
    fn header_size(&self) -> usize {
        4
    }

    fn min_frame_size(&self) -> usize {
        32
    }

    fn max_frame_size(&self) -> usize {
        MPA_MAX_FRAME_SIZE
    }

    fn can_parse(&self, format: Format) -> bool {
        format == Format::Mpa
    }

    fn sync_info(&self) -> SyncInfo {
        SyncInfo::new(
            &[
                // 12-bit sync in 8-bit byte order.
                SyncPattern::new(0xfff0_0000, 0xfff0_0000),
                // The same sync with byte pairs swapped (16-bit big endian packing).
                SyncPattern::new(0xf0ff_0000, 0xf0ff_0000),
            ],
            self.min_frame_size(),
            self.max_frame_size(),
        )
    }

    fn parse_header(&self, hdr: &[u8]) -> Option<FrameInfo> {
        let (bits, bs_type) = load_header(hdr)?;
        if !bits.check_layer2_modes() {
            return None;
        }

        let mask = if bits.nch() == 1 { layout::MONO } else { layout::STEREO };
        Some(FrameInfo {
            spk: Speakers::new(Format::Mpa, mask, bits.sample_rate()),
            frame_size: bits.frame_size(),
            nsamples: bits.nsamples(),
            bs_type,
            spdif_type: if bits.layer == 0 { 4 } else { 5 },
        })
    }

    fn compare_headers(&self, hdr1: &[u8], hdr2: &[u8]) -> bool {
        // The bitrate may change between frames; version, layer, sample rate, channel mode
        // and packing may not.
        match (load_header(hdr1), load_header(hdr2)) {
            (Some((h1, bs1)), Some((h2, bs2))) => {
                bs1 == bs2
                    && h1.ver == h2.ver
                    && h1.layer == h2.layer
                    && h1.sampling_frequency == h2.sampling_frequency
                    && h1.nch() == h2.nch()
            }
            _ => false,
        }
    }
}

/// Builds the four header bytes for the given parameters, used by tests and the frame
/// generators.
pub fn make_header(bits: &MpaHeaderBits) -> [u8; 4] {
    let b1 = 0xff;
    let b2 = 0xf0
        | ((1 - bits.ver as u8) << 3)
        | ((3 - bits.layer as u8) << 1)
        | u8::from(!bits.error_protection);
    let b3 = ((bits.bitrate_index as u8) << 4)
        | ((bits.sampling_frequency as u8) << 2)
        | (u8::from(bits.padding) << 1);
    let b4 = ((bits.mode as u8) << 6) | ((bits.mode_ext as u8) << 4);
    [b1, b2, b3, b4]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer2_stereo_48k() -> MpaHeaderBits {
        MpaHeaderBits {
            ver: 0,
            layer: 1,
            bitrate_index: 12, // 256 kbps
            sampling_frequency: 1,
            padding: false,
            error_protection: false,
            mode: 0,
            mode_ext: 0,
        }
    }

    #[test]
    fn header_round_trip() {
        let bits = layer2_stereo_48k();
        let hdr = make_header(&bits);
        let parsed = MpaHeaderBits::parse(hdr).unwrap();
        assert_eq!(parsed, bits);
    }

    #[test]
    fn frame_size_layer2() {
        // 256 kbps at 48 kHz: 144 * 256000 / 48000 = 768 bytes.
        assert_eq!(layer2_stereo_48k().frame_size(), 768);
    }

    #[test]
    fn parses_both_packings() {
        let parser = MpaHeader::new();
        let hdr = make_header(&layer2_stereo_48k());

        let fi = parser.parse_header(&hdr).unwrap();
        assert_eq!(fi.bs_type, BitstreamType::B8);
        assert_eq!(fi.spk.format, Format::Mpa);
        assert_eq!(fi.spk.sample_rate, 48000);
        assert_eq!(fi.nsamples, 1152);

        let swapped = [hdr[1], hdr[0], hdr[3], hdr[2]];
        let fi = parser.parse_header(&swapped).unwrap();
        assert_eq!(fi.bs_type, BitstreamType::Be16);
        assert_eq!(fi.frame_size, 768);
    }

    #[test]
    fn rejects_bad_headers() {
        let parser = MpaHeader::new();
        assert!(parser.parse_header(&[0x00, 0x00, 0x00, 0x00]).is_none());
        // Free format.
        let mut bits = layer2_stereo_48k();
        bits.bitrate_index = 0;
        assert!(parser.parse_header(&make_header(&bits)).is_none());
        // Reserved sample rate.
        let mut bits = layer2_stereo_48k();
        bits.sampling_frequency = 3;
        assert!(parser.parse_header(&make_header(&bits)).is_none());
    }

    #[test]
    fn bitrate_change_is_same_stream() {
        let parser = MpaHeader::new();
        let h1 = make_header(&layer2_stereo_48k());
        let mut bits = layer2_stereo_48k();
        bits.bitrate_index = 10;
        let h2 = make_header(&bits);
        assert!(parser.compare_headers(&h1, &h2));

        // A sample rate change is not.
        let mut bits = layer2_stereo_48k();
        bits.sampling_frequency = 0;
        let h3 = make_header(&bits);
        assert!(!parser.compare_headers(&h1, &h3));
    }
}
