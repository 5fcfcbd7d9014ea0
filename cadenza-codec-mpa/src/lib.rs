// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MPEG Audio Layer I and II decoding for Project Cadenza.
//!
//! The decoder accepts one validated frame at a time, in either the plain byte stream or the
//! 16-bit big-endian packing, and produces planar double precision samples.

mod layer1;
mod layer2;
pub mod synthesis;
pub mod tables;

use log::debug;

use cadenza_core::audio::{layout, Format, SampleBuf, Speakers};
use cadenza_core::errors::{decode_error, Result};
use cadenza_core::io::sign_extend;
use cadenza_core::parser::{BitstreamType, FrameParser};

use cadenza_formats::mpa::{load_header, MpaHeaderBits};

use synthesis::SynthFilter;

/// CRC-16 with polynomial 0x8005, fed bit by bit most significant bit first. `nbits` counts
/// the protected bits of `data`.
pub(crate) fn crc16(mut crc: u16, data: &[u8], nbits: usize) -> u16 {
    debug_assert!(nbits <= data.len() * 8);
    for i in 0..nbits {
        let bit = (data[i >> 3] >> (7 - (i & 7))) & 1;
        let feed = ((crc >> 15) as u8 ^ bit) & 1;
        crc <<= 1;
        if feed != 0 {
            crc ^= 0x8005;
        }
    }
    crc
}

/// Reconstructs one sub-band sample: invert the most significant bit, sign extend, scale to a
/// fraction and apply the `c`/`d` constants of the quantiser class.
#[inline]
pub(crate) fn dequantize(raw: u32, bits: u32, c: f64, d: f64) -> f64 {
    let inv = raw ^ (1 << (bits - 1));
    let x = f64::from(sign_extend(inv, bits)) / f64::from(1u32 << (bits - 1));
    c * (x + d)
}

/// MPEG Audio Layer I/II frame decoder.
pub struct MpaDecoder {
    spk: Speakers,
    samples: SampleBuf,
    nsamples: usize,
    synth: [SynthFilter; 2],
    frame: Vec<u8>,
    is_new_stream: bool,
}

impl Default for MpaDecoder {
    fn default() -> Self {
        MpaDecoder::new()
    }
}

impl MpaDecoder {
    pub fn new() -> Self {
        MpaDecoder {
            spk: Speakers::UNKNOWN,
            samples: SampleBuf::default(),
            nsamples: 0,
            synth: [SynthFilter::new(), SynthFilter::new()],
            frame: Vec::new(),
            is_new_stream: false,
        }
    }

    fn decode(&mut self, data_is_self_frame: bool, frame: &[u8], bits: &MpaHeaderBits) -> Result<()> {
        let data: &[u8] = if data_is_self_frame { &self.frame } else { frame };
        match bits.layer {
            0 => layer1::decode(data, bits, &mut self.samples, &mut self.synth),
            1 => layer2::decode(data, bits, &mut self.samples, &mut self.synth),
            _ => decode_error("mpa: layer 3 is not handled by this decoder"),
        }
    }
}

impl FrameParser for MpaDecoder {
    fn reset(&mut self) {
        self.spk = Speakers::UNKNOWN;
        self.nsamples = 0;
        self.is_new_stream = false;
        self.synth[0].reset();
        self.synth[1].reset();
    }

    fn parse_frame(&mut self, frame: &[u8]) -> Result<()> {
        let (bits, bs_type) = match load_header(frame) {
            Some(parsed) => parsed,
            None => return decode_error("mpa: not a frame header"),
        };

        if frame.len() < bits.frame_size() {
            return decode_error("mpa: truncated frame");
        }

        let nch = bits.nch();
        let mask = if nch == 1 { layout::MONO } else { layout::STEREO };
        let spk = Speakers::new(Format::Linear, mask, bits.sample_rate());

        self.samples.resize(nch, bits.nsamples());

        // A big-endian stream is unswapped to plain byte order before bit reading.
        let swapped = bs_type == BitstreamType::Be16;
        if swapped {
            self.frame.clear();
            let mut chunks = frame[..bits.frame_size()].chunks_exact(2);
            for pair in &mut chunks {
                self.frame.push(pair[1]);
                self.frame.push(pair[0]);
            }
            self.frame.extend_from_slice(chunks.remainder());
        }
        self.decode(swapped, frame, &bits)?;

        self.is_new_stream = self.spk != spk;
        if self.is_new_stream {
            debug!(target: "cadenza::mpa", "new stream: {}", spk);
        }
        self.spk = spk;
        self.nsamples = bits.nsamples();
        Ok(())
    }

    fn spk(&self) -> Speakers {
        self.spk
    }

    fn samples(&self) -> &SampleBuf {
        &self.samples
    }

    fn nsamples(&self) -> usize {
        self.nsamples
    }

    fn new_stream(&self) -> bool {
        self.is_new_stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_formats::mpa::make_header;

    fn layer2_bits() -> MpaHeaderBits {
        MpaHeaderBits {
            ver: 0,
            layer: 1,
            bitrate_index: 12, // 256 kbps at 48 kHz
            sampling_frequency: 1,
            padding: false,
            error_protection: false,
            mode: 0,
            mode_ext: 0,
        }
    }

    /// A frame whose body is all zero decodes: every sub-band has allocation zero, which is
    /// digital silence.
    fn silent_frame(bits: &MpaHeaderBits) -> Vec<u8> {
        let mut frame = vec![0u8; bits.frame_size()];
        frame[..4].copy_from_slice(&make_header(bits));
        frame
    }

    #[test]
    fn crc16_properties() {
        // Split updates must compose to the whole.
        let data = [0x12, 0x34, 0x56];
        let whole = crc16(0xffff, &data, 24);
        let split = crc16(crc16(0xffff, &data[..1], 8), &data[1..], 16);
        assert_eq!(whole, split);

        // Any flipped protected bit changes the value.
        let mut other = data;
        other[1] ^= 0x10;
        assert_ne!(whole, crc16(0xffff, &other, 24));

        // Bits beyond the protected count are ignored.
        let mut tail = data;
        tail[2] ^= 0x01;
        assert_eq!(crc16(0xffff, &data, 17), crc16(0xffff, &tail, 17));
    }

    #[test]
    fn dequantize_three_levels() {
        // A 3-level quantiser maps its values onto -2/3, 0, +2/3.
        let c = 4.0 / 3.0;
        let d = 0.5;
        assert!((dequantize(0, 2, c, d) + 2.0 / 3.0).abs() < 1e-12);
        assert!((dequantize(1, 2, c, d)).abs() < 1e-12);
        assert!((dequantize(2, 2, c, d) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn silent_layer2_frame_decodes_to_silence() {
        let bits = layer2_bits();
        let frame = silent_frame(&bits);

        let mut decoder = MpaDecoder::new();
        decoder.parse_frame(&frame).unwrap();

        assert_eq!(decoder.spk().format, Format::Linear);
        assert_eq!(decoder.spk().mask, layout::STEREO);
        assert_eq!(decoder.spk().sample_rate, 48000);
        assert_eq!(decoder.nsamples(), 1152);
        assert!(decoder.new_stream());

        for ch in 0..2 {
            assert!(decoder.samples().chan(ch).iter().all(|&s| s == 0.0));
        }

        // The second identical frame continues the stream.
        decoder.parse_frame(&frame).unwrap();
        assert!(!decoder.new_stream());
    }

    #[test]
    fn silent_layer1_frame_decodes_to_silence() {
        let bits = MpaHeaderBits { layer: 0, bitrate_index: 10, ..layer2_bits() };
        let frame = silent_frame(&bits);

        let mut decoder = MpaDecoder::new();
        decoder.parse_frame(&frame).unwrap();
        assert_eq!(decoder.nsamples(), 384);
        for ch in 0..2 {
            assert!(decoder.samples().chan(ch).iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn big_endian_packing_decodes_identically() {
        let bits = layer2_bits();
        let frame = silent_frame(&bits);
        let mut swapped = frame.clone();
        for pair in swapped.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }

        let mut a = MpaDecoder::new();
        let mut b = MpaDecoder::new();
        a.parse_frame(&frame).unwrap();
        b.parse_frame(&swapped).unwrap();

        assert_eq!(a.spk(), b.spk());
        for ch in 0..2 {
            assert_eq!(a.samples().chan(ch), b.samples().chan(ch));
        }
    }

    #[test]
    fn crc_protected_frame() {
        let mut bits = layer2_bits();
        bits.error_protection = true;
        let mut frame = silent_frame(&bits);

        // A wrong check word is rejected.
        frame[4] = 0x12;
        frame[5] = 0x34;
        let mut decoder = MpaDecoder::new();
        assert!(decoder.parse_frame(&frame).is_err());

        // The correct CRC-16 of the silent frame's protected region.
        frame[4] = 0xe0;
        frame[5] = 0xc6;
        assert!(decoder.parse_frame(&frame).is_ok());
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let bits = layer2_bits();
        let frame = silent_frame(&bits);
        let mut decoder = MpaDecoder::new();
        assert!(decoder.parse_frame(&frame[..100]).is_err());
    }
}
