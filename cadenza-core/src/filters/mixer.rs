// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::audio::{ChannelMask, Format, SampleBuf, Speakers};
use crate::chunk::Chunk;
use crate::errors::{bad_format_error, Result};
use crate::filter::Filter;

/// Maximum number of channels the mixing matrix covers.
pub const MATRIX_CH: usize = 8;

/// A dense channel mixing matrix: `matrix[i][j]` is the contribution of input channel `i` to
/// output channel `j`, channels in canonical mask order.
pub type MixMatrix = [[f64; MATRIX_CH]; MATRIX_CH];

/// The identity routing for `n` channels.
pub fn identity_matrix(n: usize) -> MixMatrix {
    let mut m = [[0.0; MATRIX_CH]; MATRIX_CH];
    for (i, row) in m.iter_mut().enumerate().take(n) {
        row[i] = 1.0;
    }
    m
}

/// A default channel-routing matrix between two speaker configurations: shared channels route
/// directly, absent front and surround channels fold into left/right at -3 dB, LFE passes only
/// when both sides carry it.
pub fn default_matrix(input: ChannelMask, output: ChannelMask) -> MixMatrix {
    const HALF_SQRT2: f64 = std::f64::consts::FRAC_1_SQRT_2;

    let mut m = [[0.0; MATRIX_CH]; MATRIX_CH];

    let mut route = |from: ChannelMask, to: ChannelMask, gain: f64| {
        if let (Some(i), Some(j)) = (input.index_of(from), output.index_of(to)) {
            if i < MATRIX_CH && j < MATRIX_CH {
                m[i][j] += gain;
            }
        }
    };

    for ch in input.iter() {
        if output.contains(ch) {
            route(ch, ch, 1.0);
        }
        else if ch == ChannelMask::FRONT_CENTER {
            route(ch, ChannelMask::FRONT_LEFT, HALF_SQRT2);
            route(ch, ChannelMask::FRONT_RIGHT, HALF_SQRT2);
        }
        else if ch == ChannelMask::FRONT_LEFT || ch == ChannelMask::FRONT_RIGHT {
            // Mono output.
            route(ch, ChannelMask::FRONT_CENTER, HALF_SQRT2);
        }
        else if ch == ChannelMask::SIDE_LEFT || ch == ChannelMask::BACK_LEFT {
            if output.contains(ChannelMask::SIDE_LEFT) {
                route(ch, ChannelMask::SIDE_LEFT, 1.0);
            }
            else if output.contains(ChannelMask::FRONT_LEFT) {
                route(ch, ChannelMask::FRONT_LEFT, HALF_SQRT2);
            }
            else {
                route(ch, ChannelMask::FRONT_CENTER, 0.5);
            }
        }
        else if ch == ChannelMask::SIDE_RIGHT || ch == ChannelMask::BACK_RIGHT {
            if output.contains(ChannelMask::SIDE_RIGHT) {
                route(ch, ChannelMask::SIDE_RIGHT, 1.0);
            }
            else if output.contains(ChannelMask::FRONT_RIGHT) {
                route(ch, ChannelMask::FRONT_RIGHT, HALF_SQRT2);
            }
            else {
                route(ch, ChannelMask::FRONT_CENTER, 0.5);
            }
        }
        else if ch == ChannelMask::BACK_CENTER {
            if output.contains(ChannelMask::SIDE_LEFT) {
                route(ch, ChannelMask::SIDE_LEFT, HALF_SQRT2);
                route(ch, ChannelMask::SIDE_RIGHT, HALF_SQRT2);
            }
            else {
                route(ch, ChannelMask::FRONT_LEFT, HALF_SQRT2);
                route(ch, ChannelMask::FRONT_RIGHT, HALF_SQRT2);
            }
        }
        else if ch == ChannelMask::FRONT_LEFT_CENTER {
            route(ch, ChannelMask::FRONT_LEFT, HALF_SQRT2);
            route(ch, ChannelMask::FRONT_CENTER, HALF_SQRT2);
        }
        else if ch == ChannelMask::FRONT_RIGHT_CENTER {
            route(ch, ChannelMask::FRONT_RIGHT, HALF_SQRT2);
            route(ch, ChannelMask::FRONT_CENTER, HALF_SQRT2);
        }
        // LFE without an LFE output is dropped.
    }

    m
}

/// One monomorphised inner mixing loop. Accumulates every input channel into every output
/// channel with the matrix coefficients; channel counts are compile-time constants so the
/// compiler can unroll and vectorise each of the 64 variants.
fn mix_io<const IN: usize, const OUT: usize>(
    matrix: &MixMatrix,
    input: &SampleBuf,
    output: &mut SampleBuf,
) {
    let nsamples = input.len();
    output.resize(OUT, nsamples);

    for j in 0..OUT {
        let out = output.chan_mut(j);
        for i in 0..IN {
            let gain = matrix[i][j];
            if gain != 0.0 {
                for (o, s) in out.iter_mut().zip(input.chan(i)) {
                    *o += s * gain;
                }
            }
        }
    }
}

macro_rules! mix_dispatch {
    ($in_nch:expr, $out_nch:expr, $matrix:expr, $input:expr, $output:expr,
     $(($i:literal, $o:literal)),+ $(,)?) => {
        match ($in_nch, $out_nch) {
            $( ($i, $o) => mix_io::<$i, $o>($matrix, $input, $output), )+
            _ => unreachable!("channel counts beyond the matrix size"),
        }
    };
}

/// Mixes planar input into planar output. The kernel is selected once per call from the 64
/// `(in_nch, out_nch)` variants.
pub fn mix(matrix: &MixMatrix, input: &SampleBuf, output: &mut SampleBuf, out_nch: usize) {
    debug_assert!(input.nch() >= 1 && input.nch() <= MATRIX_CH);
    debug_assert!(out_nch >= 1 && out_nch <= MATRIX_CH);

    mix_dispatch!(
        input.nch(), out_nch, matrix, input, output,
        (1, 1), (1, 2), (1, 3), (1, 4), (1, 5), (1, 6), (1, 7), (1, 8),
        (2, 1), (2, 2), (2, 3), (2, 4), (2, 5), (2, 6), (2, 7), (2, 8),
        (3, 1), (3, 2), (3, 3), (3, 4), (3, 5), (3, 6), (3, 7), (3, 8),
        (4, 1), (4, 2), (4, 3), (4, 4), (4, 5), (4, 6), (4, 7), (4, 8),
        (5, 1), (5, 2), (5, 3), (5, 4), (5, 5), (5, 6), (5, 7), (5, 8),
        (6, 1), (6, 2), (6, 3), (6, 4), (6, 5), (6, 6), (6, 7), (6, 8),
        (7, 1), (7, 2), (7, 3), (7, 4), (7, 5), (7, 6), (7, 7), (7, 8),
        (8, 1), (8, 2), (8, 3), (8, 4), (8, 5), (8, 6), (8, 7), (8, 8),
    )
}

/// A matrix mixing filter: LINEAR in, LINEAR out, possibly with a different channel
/// configuration.
///
/// The matrix is owned by the caller's routing policy: either set explicitly through
/// [`Mixer::set_matrix`], or derived with [`default_matrix`] when the output mask is set.
pub struct Mixer {
    matrix: MixMatrix,
    auto_matrix: bool,
    out_mask: ChannelMask,
    spk: Speakers,
    open: bool,
    buf: SampleBuf,
}

impl Mixer {
    pub fn new(out_mask: ChannelMask) -> Self {
        Mixer {
            matrix: identity_matrix(MATRIX_CH),
            auto_matrix: true,
            out_mask,
            spk: Speakers::UNKNOWN,
            open: false,
            buf: SampleBuf::default(),
        }
    }

    /// Sets the matrix explicitly and disables automatic matrix derivation.
    pub fn set_matrix(&mut self, matrix: MixMatrix) {
        self.matrix = matrix;
        self.auto_matrix = false;
    }

    pub fn matrix(&self) -> &MixMatrix {
        &self.matrix
    }

    pub fn out_mask(&self) -> ChannelMask {
        self.out_mask
    }

    pub fn set_out_mask(&mut self, out_mask: ChannelMask) {
        self.out_mask = out_mask;
        if self.auto_matrix && self.open {
            self.matrix = default_matrix(self.spk.mask, self.out_mask);
        }
    }
}

impl Filter for Mixer {
    fn name(&self) -> &'static str {
        "Mixer"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        spk.format == Format::Linear
            && spk.nch() >= 1
            && spk.nch() <= MATRIX_CH
            && self.out_mask.count() >= 1
            && self.out_mask.count() <= MATRIX_CH
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("mixer: input must be linear with up to 8 channels");
        }
        self.spk = spk;
        self.open = true;
        if self.auto_matrix {
            self.matrix = default_matrix(spk.mask, self.out_mask);
        }
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
        if self.open {
            Speakers::new(Format::Linear, self.out_mask, self.spk.sample_rate)
        }
        else {
            Speakers::UNKNOWN
        }
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        if input.is_empty() {
            return Ok(false);
        }

        let samples = match input.linear() {
            Some(buf) => buf,
            None => return bad_format_error("mixer: expected linear chunk"),
        };

        mix(&self.matrix, samples, &mut self.buf, self.out_mask.count());

        output.clear();
        output.set_linear(&self.buf);
        output.sync = input.sync;
        output.time = input.time;
        output.eos = input.eos;
        input.clear();
        Ok(true)
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::layout;

    fn buf_from(rows: &[&[f64]]) -> SampleBuf {
        let mut buf = SampleBuf::new(rows.len(), rows[0].len());
        for (ch, row) in rows.iter().enumerate() {
            buf.chan_mut(ch).copy_from_slice(row);
        }
        buf
    }

    #[test]
    fn identity_copies_channels() {
        let input = buf_from(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let mut output = SampleBuf::default();

        mix(&identity_matrix(2), &input, &mut output, 2);

        assert_eq!(output.chan(0), input.chan(0));
        assert_eq!(output.chan(1), input.chan(1));
    }

    #[test]
    fn identity_prefix_for_smaller_output() {
        let input = buf_from(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        let mut output = SampleBuf::default();

        mix(&identity_matrix(3), &input, &mut output, 1);
        assert_eq!(output.chan(0), input.chan(0));
    }

    #[test]
    fn downmix_accumulates() {
        // Stereo to mono sum.
        let mut m = [[0.0; MATRIX_CH]; MATRIX_CH];
        m[0][0] = 0.5;
        m[1][0] = 0.5;

        let input = buf_from(&[&[1.0, -1.0], &[3.0, 1.0]]);
        let mut output = SampleBuf::default();
        mix(&m, &input, &mut output, 1);
        assert_eq!(output.chan(0), &[2.0, 0.0]);
    }

    #[test]
    fn default_matrix_direct_routes() {
        let m = default_matrix(layout::STEREO, layout::STEREO);
        assert_eq!(m[0][0], 1.0);
        assert_eq!(m[1][1], 1.0);
        assert_eq!(m[0][1], 0.0);
    }

    #[test]
    fn default_matrix_center_fold() {
        // 3/2 to stereo: C folds into L and R at -3 dB.
        let m = default_matrix(layout::SURROUND_3_2, layout::STEREO);
        let c = layout::SURROUND_3_2.index_of(ChannelMask::FRONT_CENTER).unwrap();
        let l = layout::STEREO.index_of(ChannelMask::FRONT_LEFT).unwrap();
        let r = layout::STEREO.index_of(ChannelMask::FRONT_RIGHT).unwrap();
        assert!((m[c][l] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!((m[c][r] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn mixer_filter_identity() {
        let spk = Speakers::new(Format::Linear, layout::STEREO, 48000);
        let mut mixer = Mixer::new(layout::STEREO);
        mixer.open(spk).unwrap();
        assert_eq!(mixer.get_output().mask, layout::STEREO);

        let mut input = Chunk::new();
        input.set_linear(&buf_from(&[&[0.25, 0.5], &[0.75, 1.0]]));
        let mut output = Chunk::new();
        assert!(mixer.process(&mut input, &mut output).unwrap());

        let out = output.linear().unwrap();
        assert_eq!(out.chan(0), &[0.25, 0.5]);
        assert_eq!(out.chan(1), &[0.75, 1.0]);
    }
}
