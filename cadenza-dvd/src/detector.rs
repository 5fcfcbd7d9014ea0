// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::mem;

use log::debug;

use cadenza_core::audio::{Format, Speakers};
use cadenza_core::chunk::Chunk;
use cadenza_core::errors::{bad_format_error, Result};
use cadenza_core::filter::Filter;
use cadenza_core::parser::HeaderParser;
use cadenza_core::streambuf::StreamBuffer;

use cadenza_formats::multi::MultiHeader;
use cadenza_formats::spdif::SpdifHeader;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DetectorState {
    Detecting,
    Stream,
    Pcm,
}

/// Tells IEC 61937 or raw compressed data hidden in a PCM16 stereo carrier from actual PCM.
///
/// The input is scanned with the multi-format stream buffer while being withheld. Finding a
/// verified frame flips the output format to the detected stream; failing to sync within
/// twice the largest frame interval declares the data true PCM. From that point on all bytes
/// pass through unmodified, the withheld ones first.
pub struct FormatDetector {
    stream: StreamBuffer,
    state: DetectorState,
    /// Bytes withheld while detecting.
    pending: Vec<u8>,
    /// How many pending bytes were already fed to the scanning stream buffer.
    fed: usize,
    threshold: usize,
    spk: Speakers,
    out_spk: Speakers,
    open: bool,
    is_new_stream: bool,
}

impl Default for FormatDetector {
    fn default() -> Self {
        FormatDetector::new()
    }
}

impl FormatDetector {
    pub fn new() -> Self {
        let multi = MultiHeader::new(vec![
            Box::new(SpdifHeader::new()),
            Box::new(cadenza_formats::Ac3Header::new()),
            Box::new(cadenza_formats::DtsHeader::new()),
            Box::new(cadenza_formats::MpaHeader::new()),
        ]);
        let threshold = multi.max_frame_size() * 2;
        FormatDetector {
            stream: StreamBuffer::new(Box::new(multi)),
            state: DetectorState::Detecting,
            pending: Vec::new(),
            fed: 0,
            threshold,
            spk: Speakers::UNKNOWN,
            out_spk: Speakers::UNKNOWN,
            open: false,
            is_new_stream: false,
        }
    }

    /// Releases the withheld bytes as the first output chunk of the decided stream.
    fn release(&mut self, output: &mut Chunk) {
        self.is_new_stream = true;
        output.clear();
        output.set_raw(&self.pending);
        self.pending.clear();
        self.fed = 0;
    }
}

impl Filter for FormatDetector {
    fn name(&self) -> &'static str {
        "Detector"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        spk.format == Format::Pcm16 || spk.format == Format::RawData
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("detector: expected a pcm16 carrier");
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
        match self.state {
            DetectorState::Detecting => {
                self.pending.extend_from_slice(input.raw());
                input.clear();

                // Scan the bytes not yet seen by the stream buffer.
                let mut cursor = &self.pending[self.fed..];
                let before = cursor.len();
                let detected = self.stream.load_frame(&mut cursor);
                let consumed = before - cursor.len();
                self.fed += consumed;

                if detected {
                    let spk = self.stream.spk();
                    debug!(target: "cadenza::detector", "detected {} in pcm carrier", spk);
                    self.out_spk = spk;
                    self.state = DetectorState::Stream;
                }
                else if self.pending.len() >= self.threshold {
                    debug!(target: "cadenza::detector", "no sync found, treating as pcm");
                    self.out_spk = self.spk.with_format(Format::Pcm16);
                    self.state = DetectorState::Pcm;
                }
                else {
                    return Ok(false);
                }

                self.release(output);
                Ok(true)
            }
            _ => {
                if input.is_empty() {
                    return Ok(false);
                }
                self.is_new_stream = false;
                mem::swap(input, output);
                input.clear();
                Ok(true)
            }
        }
    }

    fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
        // Data still undecided at end of stream goes out as PCM.
        if self.state == DetectorState::Detecting && !self.pending.is_empty() {
            self.out_spk = self.spk.with_format(Format::Pcm16);
            self.state = DetectorState::Pcm;
            self.release(output);
            return Ok(true);
        }
        Ok(false)
    }

    fn reset(&mut self) {
        self.stream.reset();
        self.state = DetectorState::Detecting;
        self.pending.clear();
        self.fed = 0;
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
    use cadenza_core::audio::layout;
    use cadenza_core::generator::NoiseGen;

    fn pcm16_spk() -> Speakers {
        Speakers::new(Format::Pcm16, layout::STEREO, 48000)
    }

    #[test]
    fn plain_pcm_is_passed_as_pcm() {
        let mut detector = FormatDetector::new();
        detector.open(pcm16_spk()).unwrap();

        // Low-level positive samples: the high carrier bytes stay zero, so no sync pattern
        // can form.
        let mut noise = NoiseGen::new(42);
        let mut data = vec![0u8; detector.threshold + 1000];
        for pair in data.chunks_exact_mut(2) {
            let s = (noise.next_sample().abs() * 255.0) as i16;
            pair.copy_from_slice(&s.to_le_bytes());
        }

        let mut input = Chunk::new();
        input.set_raw(&data);
        let mut output = Chunk::new();
        assert!(detector.process(&mut input, &mut output).unwrap());
        assert_eq!(detector.get_output().format, Format::Pcm16);
        assert!(detector.new_stream());
        assert_eq!(output.raw().len(), data.len());
    }

    #[test]
    fn hidden_ac3_is_detected() {
        let mut detector = FormatDetector::new();
        detector.open(pcm16_spk()).unwrap();

        let mut noise = NoiseGen::new(43);
        let hdr = cadenza_formats::ac3::make_header(0, 30, 7, true);
        let size = cadenza_formats::ac3::frame_size(0, 30).unwrap();
        let mut stream = Vec::new();
        for _ in 0..3 {
            let mut frame = vec![0u8; size];
            frame[..8].copy_from_slice(&hdr);
            noise.fill_bytes(&mut frame[8..]);
            stream.extend_from_slice(&frame);
        }

        let mut input = Chunk::new();
        input.set_raw(&stream);
        let mut output = Chunk::new();
        assert!(detector.process(&mut input, &mut output).unwrap());
        assert_eq!(detector.get_output().format, Format::Ac3);
        // Nothing was dropped: the first chunk returns every withheld byte.
        assert_eq!(output.raw().len(), stream.len());
    }

    #[test]
    fn short_undecided_input_flushes_as_pcm() {
        let mut detector = FormatDetector::new();
        detector.open(pcm16_spk()).unwrap();

        let mut input = Chunk::new();
        input.set_raw(&[0u8; 64]);
        let mut output = Chunk::new();
        assert!(!detector.process(&mut input, &mut output).unwrap());
        assert!(detector.flush(&mut output).unwrap());
        assert_eq!(detector.get_output().format, Format::Pcm16);
        assert_eq!(output.raw().len(), 64);
    }
}
