// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::audio::{Format, SampleBuf, Speakers};
use crate::chunk::Chunk;
use crate::errors::{bad_format_error, Result};
use crate::filter::Filter;

/// Converts between planar linear samples and interleaved PCM.
///
/// The converter is configured with a PCM format. Linear input is rendered to that format;
/// input already in that format is decoded back to linear. Samples are scaled between the
/// nominal levels of both sides and clipped at the integer range.
pub struct Converter {
    format: Format,
    spk: Speakers,
    out_spk: Speakers,
    open: bool,
    buf: SampleBuf,
    bytes: Vec<u8>,
}

impl Converter {
    pub fn new(format: Format) -> Self {
        debug_assert!(format.is_pcm());
        Converter {
            format,
            spk: Speakers::UNKNOWN,
            out_spk: Speakers::UNKNOWN,
            open: false,
            buf: SampleBuf::default(),
            bytes: Vec::new(),
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    fn encode(&mut self, samples: &SampleBuf) {
        let nch = samples.nch();
        let len = samples.len();
        let size = self.format.sample_size();
        let scale = self.out_spk.level / self.spk.level;

        self.bytes.clear();
        self.bytes.resize(nch * len * size, 0);

        for (ch, row) in samples.channels().enumerate() {
            for (s, &sample) in row.iter().enumerate() {
                let value = sample * scale;
                let offset = (s * nch + ch) * size;
                let out = &mut self.bytes[offset..offset + size];
                encode_sample(self.format, value, out);
            }
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<()> {
        let nch = self.spk.nch();
        let size = self.format.sample_size();
        let frame = nch * size;
        if frame == 0 {
            return bad_format_error("converter: zero channels");
        }
        let len = bytes.len() / frame;
        let scale = 1.0 / self.spk.level;

        self.buf.resize(nch, len);
        for (ch, row) in self.buf.channels_mut().enumerate() {
            for (s, out) in row.iter_mut().enumerate() {
                let offset = (s * nch + ch) * size;
                *out = decode_sample(self.format, &bytes[offset..offset + size]) * scale;
            }
        }
        Ok(())
    }
}

fn encode_sample(format: Format, value: f64, out: &mut [u8]) {
    match format {
        Format::Pcm16 => {
            let v = value.round().clamp(-32768.0, 32767.0) as i16;
            out.copy_from_slice(&v.to_le_bytes());
        }
        Format::Pcm16Be => {
            let v = value.round().clamp(-32768.0, 32767.0) as i16;
            out.copy_from_slice(&v.to_be_bytes());
        }
        Format::Pcm24 => {
            let v = value.round().clamp(-8388608.0, 8388607.0) as i32;
            out.copy_from_slice(&v.to_le_bytes()[..3]);
        }
        Format::Pcm24Be => {
            let v = value.round().clamp(-8388608.0, 8388607.0) as i32;
            out.copy_from_slice(&v.to_be_bytes()[1..]);
        }
        Format::Pcm32 => {
            let v = value.round().clamp(-2147483648.0, 2147483647.0) as i32;
            out.copy_from_slice(&v.to_le_bytes());
        }
        Format::Pcm32Be => {
            let v = value.round().clamp(-2147483648.0, 2147483647.0) as i32;
            out.copy_from_slice(&v.to_be_bytes());
        }
        Format::PcmFloat => {
            out.copy_from_slice(&(value as f32).to_le_bytes());
        }
        _ => unreachable!("not a pcm format"),
    }
}

fn decode_sample(format: Format, bytes: &[u8]) -> f64 {
    match format {
        Format::Pcm16 => f64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        Format::Pcm16Be => f64::from(i16::from_be_bytes([bytes[0], bytes[1]])),
        Format::Pcm24 => {
            f64::from(i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8)
        }
        Format::Pcm24Be => {
            f64::from(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]) >> 8)
        }
        Format::Pcm32 => f64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        Format::Pcm32Be => f64::from(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        Format::PcmFloat => {
            f64::from(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        _ => unreachable!("not a pcm format"),
    }
}

impl Filter for Converter {
    fn name(&self) -> &'static str {
        "Converter"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        (spk.is_linear() || spk.format == self.format) && spk.nch() > 0
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("converter: unsupported input format");
        }
        self.spk = spk;
        self.out_spk = if spk.is_linear() {
            spk.with_format(self.format)
        }
        else {
            spk.with_format(Format::Linear)
        };
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.spk = Speakers::UNKNOWN;
        self.out_spk = Speakers::UNKNOWN;
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
        if input.is_empty() {
            return Ok(false);
        }

        output.clear();
        output.sync = input.sync;
        output.time = input.time;
        output.eos = input.eos;

        if self.spk.is_linear() {
            match input.linear() {
                Some(buf) => self.encode(buf),
                None => return bad_format_error("converter: expected linear chunk"),
            }
            output.set_raw(&self.bytes);
        }
        else {
            self.decode(input.raw())?;
            output.set_linear(&self.buf);
        }

        input.clear();
        Ok(true)
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::layout;

    fn linear_spk() -> Speakers {
        Speakers::new(Format::Linear, layout::STEREO, 48000)
    }

    #[test]
    fn pcm16_round_trip() {
        let mut enc = Converter::new(Format::Pcm16);
        enc.open(linear_spk()).unwrap();
        assert_eq!(enc.get_output().format, Format::Pcm16);

        let mut samples = SampleBuf::new(2, 4);
        samples.chan_mut(0).copy_from_slice(&[0.0, 0.5, -0.5, 1.0]);
        samples.chan_mut(1).copy_from_slice(&[1.0, -1.0, 0.25, 0.0]);

        let mut input = Chunk::new();
        input.set_linear(&samples);
        let mut pcm = Chunk::new();
        assert!(enc.process(&mut input, &mut pcm).unwrap());
        assert_eq!(pcm.raw().len(), 2 * 4 * 2);

        let mut dec = Converter::new(Format::Pcm16);
        dec.open(Speakers::new(Format::Pcm16, layout::STEREO, 48000)).unwrap();
        assert_eq!(dec.get_output().format, Format::Linear);

        let mut back = Chunk::new();
        assert!(dec.process(&mut pcm, &mut back).unwrap());

        let out = back.linear().unwrap();
        for ch in 0..2 {
            for (a, b) in out.chan(ch).iter().zip(samples.chan(ch)) {
                assert!((a - b).abs() < 1.0 / 32767.0, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn clipping() {
        let mut enc = Converter::new(Format::Pcm16);
        enc.open(linear_spk()).unwrap();

        let mut samples = SampleBuf::new(1, 2);
        samples.chan_mut(0).copy_from_slice(&[2.0, -2.0]);

        let mut input = Chunk::new();
        input.set_linear(&samples);
        let mut pcm = Chunk::new();
        enc.process(&mut input, &mut pcm).unwrap();

        let raw = pcm.raw();
        assert_eq!(i16::from_le_bytes([raw[0], raw[1]]), 32767);
        assert_eq!(i16::from_le_bytes([raw[2], raw[3]]), -32768);
    }

    #[test]
    fn be_formats() {
        let mut enc = Converter::new(Format::Pcm24Be);
        enc.open(Speakers::new(Format::Linear, layout::MONO, 48000)).unwrap();

        let mut samples = SampleBuf::new(1, 1);
        samples.chan_mut(0)[0] = 0.5;

        let mut input = Chunk::new();
        input.set_linear(&samples);
        let mut pcm = Chunk::new();
        enc.process(&mut input, &mut pcm).unwrap();
        assert_eq!(pcm.raw().len(), 3);

        let value = i32::from_be_bytes([pcm.raw()[0], pcm.raw()[1], pcm.raw()[2], 0]) >> 8;
        assert_eq!(value, (0.5f64 * 8388607.0).round() as i32);
    }
}
