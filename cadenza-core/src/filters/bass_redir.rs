// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::mem;

use crate::audio::{ChannelMask, Format, Speakers};
use crate::chunk::Chunk;
use crate::errors::{bad_format_error, Result};
use crate::filter::Filter;
use crate::iir::{IirFilter, IirGen, IirLinkwitzRiley};

const BLOCK_SIZE: usize = 1024;

/// Bass redirection: splits the band at a crossover frequency, sums the low band of all
/// non-bass channels and mixes it into the bass destination channels, while high-passing the
/// non-bass channels in place.
///
/// The low-pass and high-pass are a 4th order Linkwitz-Riley pair, so the split bands sum back
/// to an all-pass response. A `1/sqrt(n)` gain on the low band keeps loudness constant when
/// the bass is sent to several destination channels.
pub struct BassRedir {
    enabled: bool,
    freq: u32,
    gain: f64,
    ch_mask: ChannelMask,

    lpf: IirFilter,
    hpf: Vec<IirFilter>,
    buf: [f64; BLOCK_SIZE],

    spk: Speakers,
    open: bool,
}

impl Default for BassRedir {
    fn default() -> Self {
        BassRedir::new()
    }
}

impl BassRedir {
    pub fn new() -> Self {
        BassRedir {
            enabled: false,
            freq: 80,
            gain: 1.0,
            ch_mask: ChannelMask::LFE,
            lpf: IirFilter::new(),
            hpf: Vec::new(),
            buf: [0.0; BLOCK_SIZE],
            spk: Speakers::UNKNOWN,
            open: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        // Filter state is stale after being disabled for a while.
        if enabled && !self.enabled {
            self.reset();
        }
        self.enabled = enabled;
    }

    pub fn freq(&self) -> u32 {
        self.freq
    }

    pub fn set_freq(&mut self, freq: u32) {
        if self.freq != freq {
            self.freq = freq;
            self.update_filters();
        }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f64) {
        if self.gain != gain {
            self.gain = gain;
            self.update_filters();
        }
    }

    /// The bass destination channels.
    pub fn channels(&self) -> ChannelMask {
        self.ch_mask
    }

    pub fn set_channels(&mut self, ch_mask: ChannelMask) {
        if self.ch_mask != ch_mask {
            self.ch_mask = ch_mask;
            self.update_filters();
        }
    }

    /// True when the filter actually touches the signal: it is open, enabled, and both a bass
    /// destination and a channel to filter exist.
    pub fn is_active(&self) -> bool {
        self.open
            && self.enabled
            && self.spk.mask.intersects(self.ch_mask)
            && !(self.spk.mask - self.ch_mask).is_empty()
    }

    fn update_filters(&mut self) {
        let nch = self.spk.nch();
        let sample_rate = self.spk.sample_rate;

        if sample_rate != 0 {
            let mut lpf_iir = IirLinkwitzRiley::new(4, self.freq, true).make(sample_rate);
            let hpf_iir = IirLinkwitzRiley::new(4, self.freq, false).make(sample_rate);

            // Mixing the bass into several channels raises loudness; compensate on the low
            // band.
            let bass_nch = (self.spk.mask & self.ch_mask).count();
            let ch_gain = if bass_nch > 0 { 1.0 / (bass_nch as f64).sqrt() } else { 1.0 };
            lpf_iir.apply_gain(self.gain * ch_gain);

            let _ = self.lpf.init(&lpf_iir);
            self.hpf.resize_with(nch, IirFilter::new);
            for hpf in self.hpf.iter_mut() {
                let _ = hpf.init(&hpf_iir);
            }
        }
        else {
            self.lpf.drop_sections();
            self.hpf.clear();
        }
    }
}

impl Filter for BassRedir {
    fn name(&self) -> &'static str {
        "BassRedir"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        spk.format == Format::Linear && spk.sample_rate != 0
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("bass redirection requires linear input");
        }
        self.spk = spk;
        self.open = true;
        self.update_filters();
        Ok(())
    }

    fn close(&mut self) {
        self.spk = Speakers::UNKNOWN;
        self.open = false;
        self.hpf.clear();
        self.lpf.drop_sections();
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
        // Pass through, then filter in place.
        if input.is_empty() {
            return Ok(false);
        }
        mem::swap(input, output);
        input.clear();

        if !self.is_active() {
            return Ok(true);
        }

        let mask = self.spk.mask;
        let ch_mask = self.ch_mask;
        let is_bass: Vec<bool> = mask.iter().map(|ch| ch_mask.contains(ch)).collect();

        let samples = match output.linear_mut() {
            Some(buf) => buf,
            None => return bad_format_error("bass redirection: expected linear chunk"),
        };

        let size = samples.len();
        let mut pos = 0;
        while pos < size {
            let block = (size - pos).min(BLOCK_SIZE);
            let work = &mut self.buf[..block];

            // Sum the channels to be filtered, skipping the bass destinations.
            work.iter_mut().for_each(|s| *s = 0.0);
            for (ch, row) in samples.channels().enumerate() {
                if !is_bass[ch] {
                    for (w, s) in work.iter_mut().zip(&row[pos..pos + block]) {
                        *w += s;
                    }
                }
            }

            // Low-pass the bass sum once.
            self.lpf.process(work);

            // High-pass the filtered channels in place and add the bass to the destinations.
            for (ch, row) in samples.channels_mut().enumerate() {
                let row = &mut row[pos..pos + block];
                if !is_bass[ch] {
                    self.hpf[ch].process(row);
                }
                else {
                    for (s, w) in row.iter_mut().zip(work.iter()) {
                        *s += w;
                    }
                }
            }

            pos += block;
        }

        Ok(true)
    }

    fn reset(&mut self) {
        self.lpf.reset();
        for hpf in self.hpf.iter_mut() {
            hpf.reset();
        }
    }
}
