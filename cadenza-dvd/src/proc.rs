// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cadenza_core::audio::{ChannelMask, Format, Speakers};
use cadenza_core::chunk::Chunk;
use cadenza_core::errors::{bad_format_error, Result};
use cadenza_core::filter::Filter;
use cadenza_core::filters::{BassRedir, Converter, Mixer};
use cadenza_core::graph::FilterChain;

/// Resolves the user's requested format against the actual input: unset fields of the user
/// format inherit from the stream.
pub fn user2output(in_spk: Speakers, user_spk: Speakers) -> Speakers {
    if !in_spk.is_linear() && !in_spk.format.is_pcm() {
        return Speakers::UNKNOWN;
    }

    let format = if user_spk.format == Format::Unknown { in_spk.format } else { user_spk.format };
    let mask = if user_spk.mask.is_empty() { in_spk.mask } else { user_spk.mask };
    Speakers::new(format, mask, in_spk.sample_rate)
}

/// Bass redirection settings of the processor.
#[derive(Copy, Clone, Debug)]
pub struct BassSettings {
    pub enabled: bool,
    pub freq: u32,
    pub gain: f64,
    pub channels: ChannelMask,
}

impl Default for BassSettings {
    fn default() -> Self {
        BassSettings { enabled: false, freq: 80, gain: 1.0, channels: ChannelMask::LFE }
    }
}

/// The post-decode processing block: converts PCM input to linear, applies bass redirection,
/// mixes to the user's channel configuration and renders the user's output format.
///
/// The pipeline is realised as an internal filter chain planned at open time from the input
/// format and the user format.
pub struct AudioProcessor {
    chain: FilterChain,
    user_spk: Speakers,
    bass: BassSettings,
    spk: Speakers,
    open: bool,
}

impl Default for AudioProcessor {
    fn default() -> Self {
        AudioProcessor::new()
    }
}

impl AudioProcessor {
    pub fn new() -> Self {
        AudioProcessor {
            chain: FilterChain::new(),
            user_spk: Speakers::UNKNOWN,
            bass: BassSettings::default(),
            spk: Speakers::UNKNOWN,
            open: false,
        }
    }

    /// True when the format is expressible as a processor output.
    pub fn query_user(&self, user_spk: Speakers) -> bool {
        user_spk.format == Format::Unknown
            || user_spk.format == Format::Linear
            || user_spk.format.is_pcm()
    }

    /// Sets the requested output format. When the processor is open, the pipeline is rebuilt
    /// for the new format.
    pub fn set_user(&mut self, user_spk: Speakers) -> Result<()> {
        if !self.query_user(user_spk) {
            return bad_format_error("processor: user format must be linear or pcm");
        }
        self.user_spk = user_spk;
        if self.open {
            let spk = self.spk;
            self.open(spk)?;
        }
        Ok(())
    }

    pub fn user(&self) -> Speakers {
        self.user_spk
    }

    pub fn bass_settings(&self) -> BassSettings {
        self.bass
    }

    pub fn set_bass(&mut self, bass: BassSettings) -> Result<()> {
        self.bass = bass;
        if self.open {
            let spk = self.spk;
            self.open(spk)?;
        }
        Ok(())
    }

    fn build_chain(&mut self, spk: Speakers) -> Result<Speakers> {
        let target = user2output(spk, self.user_spk);
        if target.is_unknown() {
            return bad_format_error("processor: cannot determine the output format");
        }

        self.chain.destroy_chain();

        // Convert PCM input to the linear processing domain.
        if spk.format.is_pcm() {
            self.chain.add_back(Box::new(Converter::new(spk.format)));
        }

        let mut bass_redir = BassRedir::new();
        bass_redir.set_enabled(self.bass.enabled);
        bass_redir.set_freq(self.bass.freq);
        bass_redir.set_gain(self.bass.gain);
        bass_redir.set_channels(self.bass.channels);
        self.chain.add_back(Box::new(bass_redir));

        if target.mask != spk.mask {
            self.chain.add_back(Box::new(Mixer::new(target.mask)));
        }

        if target.format.is_pcm() {
            self.chain.add_back(Box::new(Converter::new(target.format)));
        }

        Ok(target)
    }
}

impl Filter for AudioProcessor {
    fn name(&self) -> &'static str {
        "AudioProcessor"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        (spk.is_linear() || spk.format.is_pcm()) && spk.nch() > 0 && spk.sample_rate != 0
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("processor: input must be linear or pcm");
        }

        self.build_chain(spk)?;
        self.chain.open(spk)?;
        self.spk = spk;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.chain.close();
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
        if self.open {
            self.chain.get_output()
        }
        else {
            Speakers::UNKNOWN
        }
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        self.chain.process(input, output)
    }

    fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
        self.chain.flush(output)
    }

    fn reset(&mut self) {
        self.chain.reset();
    }

    fn new_stream(&self) -> bool {
        self.chain.new_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::audio::{layout, SampleBuf};
    use cadenza_core::generator::NoiseGen;

    #[test]
    fn user_format_inheritance() {
        let input = Speakers::new(Format::Linear, layout::SURROUND_5_1, 48000);
        let user = Speakers::new(Format::Pcm16, ChannelMask::empty(), 0);
        let out = user2output(input, user);
        assert_eq!(out.format, Format::Pcm16);
        assert_eq!(out.mask, layout::SURROUND_5_1);
        assert_eq!(out.sample_rate, 48000);

        assert!(user2output(Speakers::new(Format::Ac3, layout::STEREO, 48000), user).is_unknown());
    }

    #[test]
    fn linear_to_pcm16_stereo_downmix() {
        let input_spk = Speakers::new(Format::Linear, layout::SURROUND_5_1, 48000);
        let mut proc = AudioProcessor::new();
        proc.set_user(Speakers::new(Format::Pcm16, layout::STEREO, 0)).unwrap();
        proc.open(input_spk).unwrap();

        assert_eq!(proc.get_output().format, Format::Pcm16);
        assert_eq!(proc.get_output().mask, layout::STEREO);

        let mut noise = NoiseGen::new(11);
        let mut buf = SampleBuf::new(6, 512);
        noise.fill_buf(&mut buf);
        // Keep headroom: a downmix may exceed full scale otherwise.
        for row in buf.channels_mut() {
            for s in row.iter_mut() {
                *s *= 0.25;
            }
        }

        let mut input = Chunk::new();
        input.set_linear(&buf);
        let mut output = Chunk::new();

        let mut bytes = 0;
        while proc.process(&mut input, &mut output).unwrap() {
            bytes += output.raw().len();
            output.clear();
        }
        let mut out = Chunk::new();
        while proc.flush(&mut out).unwrap() {
            bytes += out.raw().len();
            out.clear();
        }
        assert_eq!(bytes, 512 * 2 * 2);
    }

    #[test]
    fn pcm_input_is_accepted() {
        let mut proc = AudioProcessor::new();
        proc.set_user(Speakers::new(Format::Linear, ChannelMask::empty(), 0)).unwrap();
        proc.open(Speakers::new(Format::Pcm16, layout::STEREO, 44100)).unwrap();
        assert_eq!(proc.get_output().format, Format::Linear);

        // 4 samples of interleaved silence.
        let mut input = Chunk::new();
        input.set_raw(&[0u8; 16]);
        let mut output = Chunk::new();
        assert!(proc.process(&mut input, &mut output).unwrap());
        let linear = output.linear().unwrap();
        assert_eq!(linear.nch(), 2);
        assert_eq!(linear.len(), 4);
    }

    #[test]
    fn rejects_compressed_input() {
        let proc = AudioProcessor::new();
        assert!(!proc.can_open(Speakers::new(Format::Ac3, layout::STEREO, 48000)));
    }
}
