// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// A bitmask of positional audio channels.
    ///
    /// The bit order is the canonical channel order: whenever channels are stored or transported
    /// planar, channel rows appear in ascending bit order of the mask.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ChannelMask: u32 {
        /// Front-left (left) channel.
        const FRONT_LEFT         = 1 << 0;
        /// Front-center channel. Mono programs use this position.
        const FRONT_CENTER       = 1 << 1;
        /// Front-right (right) channel.
        const FRONT_RIGHT        = 1 << 2;
        /// Side-left (left surround) channel.
        const SIDE_LEFT          = 1 << 3;
        /// Side-right (right surround) channel.
        const SIDE_RIGHT         = 1 << 4;
        /// Low-frequency effects channel.
        const LFE                = 1 << 5;
        /// Front left-of-center channel.
        const FRONT_LEFT_CENTER  = 1 << 6;
        /// Front right-of-center channel.
        const FRONT_RIGHT_CENTER = 1 << 7;
        /// Back-left channel.
        const BACK_LEFT          = 1 << 8;
        /// Back-center (mono surround) channel.
        const BACK_CENTER        = 1 << 9;
        /// Back-right channel.
        const BACK_RIGHT         = 1 << 10;
    }
}

/// Total number of channel positions.
pub const NUM_CHANNELS: usize = 11;

/// Common speaker configurations.
pub mod layout {
    use super::ChannelMask;

    pub const MONO: ChannelMask = ChannelMask::FRONT_CENTER;
    pub const STEREO: ChannelMask = ChannelMask::FRONT_LEFT.union(ChannelMask::FRONT_RIGHT);
    pub const SURROUND_2_1: ChannelMask = STEREO.union(ChannelMask::BACK_CENTER);
    pub const SURROUND_2_2: ChannelMask =
        STEREO.union(ChannelMask::SIDE_LEFT).union(ChannelMask::SIDE_RIGHT);
    pub const SURROUND_3_0: ChannelMask = STEREO.union(ChannelMask::FRONT_CENTER);
    pub const SURROUND_3_1: ChannelMask = SURROUND_3_0.union(ChannelMask::BACK_CENTER);
    pub const SURROUND_3_2: ChannelMask =
        SURROUND_3_0.union(ChannelMask::SIDE_LEFT).union(ChannelMask::SIDE_RIGHT);
    pub const SURROUND_5_1: ChannelMask = SURROUND_3_2.union(ChannelMask::LFE);
}

impl ChannelMask {
    /// Gets the number of channels in the mask.
    #[inline]
    pub fn count(&self) -> usize {
        self.bits().count_ones() as usize
    }

    /// Gets the channel position of the n-th channel in canonical order. The generated
    /// `iter` yields single flags in definition order, which is the canonical bit order.
    pub fn nth(&self, n: usize) -> Option<ChannelMask> {
        self.iter().nth(n)
    }

    /// Gets the row index a channel position occupies in a planar buffer of this mask, or `None`
    /// when the position is not part of the mask.
    pub fn index_of(&self, ch: ChannelMask) -> Option<usize> {
        if !self.contains(ch) {
            return None;
        }
        Some((self.bits() & (ch.bits() - 1)).count_ones() as usize)
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; NUM_CHANNELS] =
            ["L", "C", "R", "SL", "SR", "LFE", "CL", "CR", "BL", "BC", "BR"];

        let mut first = true;
        for b in 0..NUM_CHANNELS {
            if self.bits() & (1 << b) != 0 {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "{}", NAMES[b])?;
                first = false;
            }
        }
        if first {
            write!(f, "-")?;
        }
        Ok(())
    }
}
