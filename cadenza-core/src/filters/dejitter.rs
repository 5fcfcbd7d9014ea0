// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::mem;

use log::debug;

use crate::audio::Speakers;
use crate::chunk::Chunk;
use crate::errors::{bad_format_error, Result};
use crate::filter::Filter;

/// Smooths jittery input timestamps.
///
/// Container timestamps wobble around the true time by up to a frame. The filter keeps a
/// linear time that advances with the samples passed through; an incoming timestamp within
/// the threshold of the linear time is replaced by it, a larger jump resynchronises the
/// linear time.
pub struct Dejitter {
    threshold: f64,
    time: f64,
    dejitter: bool,
    spk: Speakers,
    open: bool,
}

impl Default for Dejitter {
    fn default() -> Self {
        Dejitter::new()
    }
}

impl Dejitter {
    pub fn new() -> Self {
        Dejitter { threshold: 0.1, time: 0.0, dejitter: true, spk: Speakers::UNKNOWN, open: false }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    pub fn set_dejitter(&mut self, dejitter: bool) {
        self.dejitter = dejitter;
    }

    /// Duration of a chunk in seconds: by sample count for linear chunks, by byte count for
    /// PCM chunks. Other payloads do not advance time.
    fn chunk_duration(&self, chunk: &Chunk) -> f64 {
        if self.spk.sample_rate == 0 {
            return 0.0;
        }
        let rate = f64::from(self.spk.sample_rate);
        if chunk.linear().is_some() {
            chunk.size() as f64 / rate
        }
        else {
            let frame = self.spk.format.sample_size() * self.spk.nch();
            // S/PDIF and raw data pass at the PCM16 stereo carrier rate.
            let frame = if frame == 0 { 4 } else { frame };
            chunk.size() as f64 / frame as f64 / rate
        }
    }
}

impl Filter for Dejitter {
    fn name(&self) -> &'static str {
        "Dejitter"
    }

    fn can_open(&self, _spk: Speakers) -> bool {
        true
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("dejitter: unsupported format");
        }
        self.spk = spk;
        self.open = true;
        self.time = 0.0;
        Ok(())
    }

    fn close(&mut self) {
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
        self.spk
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        if input.is_empty() {
            return Ok(false);
        }
        mem::swap(input, output);
        input.clear();

        if output.sync && self.dejitter {
            if (output.time - self.time).abs() < self.threshold {
                output.time = self.time;
            }
            else {
                debug!(
                    target: "cadenza::dejitter",
                    "time jump: {:.4} -> {:.4}", self.time, output.time
                );
                self.time = output.time;
            }
        }
        else if !output.sync {
            output.set_sync(self.time);
        }

        self.time += self.chunk_duration(output);
        Ok(true)
    }

    fn reset(&mut self) {
        self.time = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{layout, Format, SampleBuf};

    #[test]
    fn jitter_is_absorbed_jumps_resync() {
        let spk = Speakers::new(Format::Linear, layout::STEREO, 48000);
        let mut f = Dejitter::new();
        f.open(spk).unwrap();

        let samples = SampleBuf::new(2, 4800);
        let mut output = Chunk::new();

        // First chunk establishes time zero.
        let mut input = Chunk::new();
        input.set_linear(&samples);
        input.set_sync(0.0);
        f.process(&mut input, &mut output).unwrap();
        assert_eq!(output.time, 0.0);

        // 0.1 s of samples passed; a slightly off timestamp snaps to the linear time.
        let mut input = Chunk::new();
        input.set_linear(&samples);
        input.set_sync(0.102);
        f.process(&mut input, &mut output).unwrap();
        assert_eq!(output.time, 0.1);

        // A large jump resynchronises.
        let mut input = Chunk::new();
        input.set_linear(&samples);
        input.set_sync(5.0);
        f.process(&mut input, &mut output).unwrap();
        assert_eq!(output.time, 5.0);
    }
}
