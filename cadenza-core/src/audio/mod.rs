// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module describes stream formats and provides sample buffers.

pub mod buf;
pub mod channels;

use std::fmt;

pub use buf::SampleBuf;
pub use channels::{layout, ChannelMask, NUM_CHANNELS};

/// The carrier format of an audio stream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// Format is not known yet. Streams in a transitional state use this value.
    #[default]
    Unknown,
    /// An opaque byte stream of undetermined content.
    RawData,
    /// De-interleaved double precision PCM, one planar array per channel. This is the only
    /// format decoded sample data travels in.
    Linear,
    /// Interleaved 16-bit little-endian PCM.
    Pcm16,
    /// Interleaved 24-bit little-endian PCM.
    Pcm24,
    /// Interleaved 32-bit little-endian PCM.
    Pcm32,
    /// Interleaved 16-bit big-endian PCM.
    Pcm16Be,
    /// Interleaved 24-bit big-endian PCM.
    Pcm24Be,
    /// Interleaved 32-bit big-endian PCM.
    Pcm32Be,
    /// Interleaved 32-bit IEEE float PCM.
    PcmFloat,
    /// MPEG Audio (Layer I/II) elementary stream.
    Mpa,
    /// AC-3 elementary stream.
    Ac3,
    /// DTS elementary stream.
    Dts,
    /// MLP elementary stream.
    Mlp,
    /// Dolby TrueHD elementary stream.
    TrueHd,
    /// FLAC stream.
    Flac,
    /// MPEG program stream (PES packets).
    Pes,
    /// IEC 61937 (S/PDIF) framed stream.
    Spdif,
}

impl Format {
    /// Returns true when the format is a compressed or framed byte stream.
    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            Format::Mpa
                | Format::Ac3
                | Format::Dts
                | Format::Mlp
                | Format::TrueHd
                | Format::Flac
                | Format::Spdif
        )
    }

    /// Returns true for interleaved PCM formats.
    pub fn is_pcm(&self) -> bool {
        matches!(
            self,
            Format::Pcm16
                | Format::Pcm24
                | Format::Pcm32
                | Format::Pcm16Be
                | Format::Pcm24Be
                | Format::Pcm32Be
                | Format::PcmFloat
        )
    }

    /// The size of one interleaved sample in bytes. Zero for non-PCM formats.
    pub fn sample_size(&self) -> usize {
        match self {
            Format::Pcm16 | Format::Pcm16Be => 2,
            Format::Pcm24 | Format::Pcm24Be => 3,
            Format::Pcm32 | Format::Pcm32Be | Format::PcmFloat => 4,
            _ => 0,
        }
    }

    /// The nominal peak value of the format.
    pub fn default_level(&self) -> f64 {
        match self {
            Format::Pcm16 | Format::Pcm16Be => 32767.0,
            Format::Pcm24 | Format::Pcm24Be => 8388607.0,
            Format::Pcm32 | Format::Pcm32Be => 2147483647.0,
            _ => 1.0,
        }
    }

    /// A one-bit-per-format mask value, for building sets of formats.
    pub fn mask(&self) -> u32 {
        1 << (*self as u32)
    }
}

/// How the channels of a stream carry the program.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Channels are independent speaker feeds.
    #[default]
    None,
    /// Two channels carry a Dolby Surround/ProLogic downmix.
    Dolby,
    /// Two channels carry a Dolby ProLogic II downmix.
    Dolby2,
    /// Two channels carry sum and difference of the program.
    SumDiff,
}

/// A complete description of an audio stream: carrier format, speaker configuration, sample
/// rate, nominal level and channel relation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Speakers {
    pub format: Format,
    pub mask: ChannelMask,
    pub sample_rate: u32,
    pub level: f64,
    pub relation: Relation,
}

impl Speakers {
    /// The unknown stream format.
    pub const UNKNOWN: Speakers = Speakers {
        format: Format::Unknown,
        mask: ChannelMask::empty(),
        sample_rate: 0,
        level: 1.0,
        relation: Relation::None,
    };

    pub fn new(format: Format, mask: ChannelMask, sample_rate: u32) -> Self {
        Speakers { format, mask, sample_rate, level: format.default_level(), relation: Relation::None }
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = relation;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self.level = format.default_level();
        self
    }

    /// Number of channels.
    #[inline]
    pub fn nch(&self) -> usize {
        self.mask.count()
    }

    /// Returns true when the configuration includes the LFE channel.
    #[inline]
    pub fn lfe(&self) -> bool {
        self.mask.contains(ChannelMask::LFE)
    }

    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.format == Format::Unknown
    }

    #[inline]
    pub fn is_linear(&self) -> bool {
        self.format == Format::Linear
    }
}

impl Default for Speakers {
    fn default() -> Self {
        Speakers::UNKNOWN
    }
}

impl fmt::Display for Speakers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} {}Hz", self.format, self.mask, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_levels() {
        assert_eq!(Speakers::new(Format::Pcm16, layout::STEREO, 48000).level, 32767.0);
        assert_eq!(Speakers::new(Format::Linear, layout::STEREO, 48000).level, 1.0);
    }

    #[test]
    fn unknown() {
        assert!(Speakers::UNKNOWN.is_unknown());
        assert!(!Speakers::new(Format::Ac3, layout::STEREO, 48000).is_unknown());
    }
}
