// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The polyphase synthesis filterbank of the MPEG audio standard: 32 sub-band samples in, 32
//! PCM samples out, with a 1024-word history maintained per channel.

/// Synthesis window D[i], table B.3 of ISO/IEC 11172-3.
#[rustfmt::skip]
const SYNTHESIS_D: [f64; 512] = [
     0.000000000, -0.000015259, -0.000015259, -0.000015259,
    -0.000015259, -0.000015259, -0.000015259, -0.000030518,
    -0.000030518, -0.000030518, -0.000030518, -0.000045776,
    -0.000045776, -0.000061035, -0.000061035, -0.000076294,
    -0.000076294, -0.000091553, -0.000106812, -0.000106812,
    -0.000122070, -0.000137329, -0.000152588, -0.000167847,
    -0.000198364, -0.000213623, -0.000244141, -0.000259399,
    -0.000289917, -0.000320435, -0.000366211, -0.000396729,
    -0.000442505, -0.000473022, -0.000534058, -0.000579834,
    -0.000625610, -0.000686646, -0.000747681, -0.000808716,
    -0.000885010, -0.000961304, -0.001037598, -0.001113892,
    -0.001205444, -0.001296997, -0.001388550, -0.001480103,
    -0.001586914, -0.001693726, -0.001785278, -0.001907349,
    -0.002014160, -0.002120972, -0.002243042, -0.002349854,
    -0.002456665, -0.002578735, -0.002685547, -0.002792358,
    -0.002899170, -0.002990723, -0.003082275, -0.003173828,
     0.003250122,  0.003326416,  0.003387451,  0.003433228,
     0.003463745,  0.003479004,  0.003479004,  0.003463745,
     0.003417969,  0.003372192,  0.003280640,  0.003173828,
     0.003051758,  0.002883911,  0.002700806,  0.002487183,
     0.002227783,  0.001937866,  0.001617432,  0.001266479,
     0.000869751,  0.000442505, -0.000030518, -0.000549316,
    -0.001098633, -0.001693726, -0.002334595, -0.003005981,
    -0.003723145, -0.004486084, -0.005294800, -0.006118774,
    -0.007003784, -0.007919312, -0.008865356, -0.009841919,
    -0.010848999, -0.011886597, -0.012939453, -0.014022827,
    -0.015121460, -0.016235352, -0.017349243, -0.018463135,
    -0.019577026, -0.020690918, -0.021789551, -0.022857666,
    -0.023910522, -0.024932861, -0.025909424, -0.026840210,
    -0.027725220, -0.028533936, -0.029281616, -0.029937744,
    -0.030532837, -0.031005859, -0.031387329, -0.031661987,
    -0.031814575, -0.031845093, -0.031738281, -0.031478882,
     0.031082153,  0.030517578,  0.029785156,  0.028884888,
     0.027801514,  0.026535034,  0.025085449,  0.023422241,
     0.021575928,  0.019531250,  0.017257690,  0.014801025,
     0.012115479,  0.009231567,  0.006134033,  0.002822876,
    -0.000686646, -0.004394531, -0.008316040, -0.012420654,
    -0.016708374, -0.021179199, -0.025817871, -0.030609131,
    -0.035552979, -0.040634155, -0.045837402, -0.051132202,
    -0.056533813, -0.061996460, -0.067520142, -0.073059082,
    -0.078628540, -0.084182739, -0.089706421, -0.095169067,
    -0.100540161, -0.105819702, -0.110946655, -0.115921021,
    -0.120697021, -0.125259399, -0.129562378, -0.133590698,
    -0.137298584, -0.140670776, -0.143676758, -0.146255493,
    -0.148422241, -0.150115967, -0.151306152, -0.151962280,
    -0.152069092, -0.151596069, -0.150497437, -0.148773193,
    -0.146362305, -0.143264771, -0.139450073, -0.134887695,
    -0.129577637, -0.123474121, -0.116577148, -0.108856201,
     0.100311279,  0.090927124,  0.080688477,  0.069595337,
     0.057617187,  0.044784546,  0.031082153,  0.016510010,
     0.001068115, -0.015228271, -0.032379150, -0.050354004,
    -0.069168091, -0.088775635, -0.109161377, -0.130310059,
    -0.152206421, -0.174789429, -0.198059082, -0.221984863,
    -0.246505737, -0.271591187, -0.297210693, -0.323318481,
    -0.349868774, -0.376800537, -0.404083252, -0.431655884,
    -0.459472656, -0.487472534, -0.515609741, -0.543823242,
    -0.572036743, -0.600219727, -0.628295898, -0.656219482,
    -0.683914185, -0.711318970, -0.738372803, -0.765029907,
    -0.791213989, -0.816864014, -0.841949463, -0.866363525,
    -0.890090942, -0.913055420, -0.935195923, -0.956481934,
    -0.976852417, -0.996246338, -1.014617920, -1.031936646,
    -1.048156738, -1.063217163, -1.077117920, -1.089782715,
    -1.101211548, -1.111373901, -1.120223999, -1.127746582,
    -1.133926392, -1.138763428, -1.142211914, -1.144287109,
     1.144989014,  1.144287109,  1.142211914,  1.138763428,
     1.133926392,  1.127746582,  1.120223999,  1.111373901,
     1.101211548,  1.089782715,  1.077117920,  1.063217163,
     1.048156738,  1.031936646,  1.014617920,  0.996246338,
     0.976852417,  0.956481934,  0.935195923,  0.913055420,
     0.890090942,  0.866363525,  0.841949463,  0.816864014,
     0.791213989,  0.765029907,  0.738372803,  0.711318970,
     0.683914185,  0.656219482,  0.628295898,  0.600219727,
     0.572036743,  0.543823242,  0.515609741,  0.487472534,
     0.459472656,  0.431655884,  0.404083252,  0.376800537,
     0.349868774,  0.323318481,  0.297210693,  0.271591187,
     0.246505737,  0.221984863,  0.198059082,  0.174789429,
     0.152206421,  0.130310059,  0.109161377,  0.088775635,
     0.069168091,  0.050354004,  0.032379150,  0.015228271,
    -0.001068115, -0.016510010, -0.031082153, -0.044784546,
    -0.057617187, -0.069595337, -0.080688477, -0.090927124,
     0.100311279,  0.108856201,  0.116577148,  0.123474121,
     0.129577637,  0.134887695,  0.139450073,  0.143264771,
     0.146362305,  0.148773193,  0.150497437,  0.151596069,
     0.152069092,  0.151962280,  0.151306152,  0.150115967,
     0.148422241,  0.146255493,  0.143676758,  0.140670776,
     0.137298584,  0.133590698,  0.129562378,  0.125259399,
     0.120697021,  0.115921021,  0.110946655,  0.105819702,
     0.100540161,  0.095169067,  0.089706421,  0.084182739,
     0.078628540,  0.073059082,  0.067520142,  0.061996460,
     0.056533813,  0.051132202,  0.045837402,  0.040634155,
     0.035552979,  0.030609131,  0.025817871,  0.021179199,
     0.016708374,  0.012420654,  0.008316040,  0.004394531,
     0.000686646, -0.002822876, -0.006134033, -0.009231567,
    -0.012115479, -0.014801025, -0.017257690, -0.019531250,
    -0.021575928, -0.023422241, -0.025085449, -0.026535034,
    -0.027801514, -0.028884888, -0.029785156, -0.030517578,
     0.031082153,  0.031478882,  0.031738281,  0.031845093,
     0.031814575,  0.031661987,  0.031387329,  0.031005859,
     0.030532837,  0.029937744,  0.029281616,  0.028533936,
     0.027725220,  0.026840210,  0.025909424,  0.024932861,
     0.023910522,  0.022857666,  0.021789551,  0.020690918,
     0.019577026,  0.018463135,  0.017349243,  0.016235352,
     0.015121460,  0.014022827,  0.012939453,  0.011886597,
     0.010848999,  0.009841919,  0.008865356,  0.007919312,
     0.007003784,  0.006118774,  0.005294800,  0.004486084,
     0.003723145,  0.003005981,  0.002334595,  0.001693726,
     0.001098633,  0.000549316,  0.000030518, -0.000442505,
    -0.000869751, -0.001266479, -0.001617432, -0.001937866,
    -0.002227783, -0.002487183, -0.002700806, -0.002883911,
    -0.003051758, -0.003173828, -0.003280640, -0.003372192,
    -0.003417969, -0.003463745, -0.003479004, -0.003479004,
    -0.003463745, -0.003433228, -0.003387451, -0.003326416,
     0.003250122,  0.003173828,  0.003082275,  0.002990723,
     0.002899170,  0.002792358,  0.002685547,  0.002578735,
     0.002456665,  0.002349854,  0.002243042,  0.002120972,
     0.002014160,  0.001907349,  0.001785278,  0.001693726,
     0.001586914,  0.001480103,  0.001388550,  0.001296997,
     0.001205444,  0.001113892,  0.001037598,  0.000961304,
     0.000885010,  0.000808716,  0.000747681,  0.000686646,
     0.000625610,  0.000579834,  0.000534058,  0.000473022,
     0.000442505,  0.000396729,  0.000366211,  0.000320435,
     0.000289917,  0.000259399,  0.000244141,  0.000213623,
     0.000198364,  0.000167847,  0.000152588,  0.000137329,
     0.000122070,  0.000106812,  0.000106812,  0.000091553,
     0.000076294,  0.000076294,  0.000061035,  0.000061035,
     0.000045776,  0.000045776,  0.000030518,  0.000030518,
     0.000030518,  0.000030518,  0.000015259,  0.000015259,
     0.000015259,  0.000015259,  0.000015259,  0.000015259,
];

// Butterfly coefficients 0.5 / cos(pi * (2i + 1) / 2N) for the recursive DCT decomposition.
#[rustfmt::skip]
const COS_16: [f64; 16] = [
    0.500_602_998_235_196_3, 0.505_470_959_897_543_6, 0.515_447_309_922_624_6,
    0.531_042_591_089_784_1, 0.553_103_896_034_444_5, 0.582_934_968_206_133_9,
    0.622_504_123_035_664_8, 0.674_808_341_455_005_7, 0.744_536_271_002_298_6,
    0.839_349_645_415_526_8, 0.972_568_237_861_960_8, 1.169_439_933_432_884_7,
    1.484_164_616_314_166_2, 2.057_781_009_953_410_8, 3.407_608_418_468_719_0,
    10.190_008_123_548_032_9,
];

const COS_8: [f64; 8] = [
    0.502_419_286_188_155_7,
    0.522_498_614_939_688_9,
    0.566_944_034_816_357_7,
    0.646_821_783_359_990_1,
    0.788_154_623_451_250_2,
    1.060_677_685_990_347_1,
    1.722_447_098_238_334_2,
    5.101_148_618_689_155_3,
];

const COS_4: [f64; 4] = [
    0.509_795_579_104_159_2,
    0.601_344_886_935_045_3,
    0.899_976_223_136_415_6,
    2.562_915_447_741_505_5,
];

const COS_2: [f64; 2] = [0.541_196_100_146_197_0, 1.306_562_964_876_376_4];

const COS_1: f64 = 0.707_106_781_186_547_5;

#[inline]
fn half_sec(n: usize, i: usize) -> f64 {
    match n {
        32 => COS_16[i],
        16 => COS_8[i],
        8 => COS_4[i],
        4 => COS_2[i],
        _ => COS_1,
    }
}

/// A 32-point DCT-II (unnormalised), by Lee's recursive decomposition. Each level splits the
/// input into a half-size DCT of sums and one of scaled differences, then interleaves.
fn dct(x: &[f64], y: &mut [f64]) {
    let n = x.len();
    if n == 1 {
        y[0] = x[0];
        return;
    }
    let h = n / 2;

    let mut s = [0.0f64; 16];
    let mut d = [0.0f64; 16];
    for i in 0..h {
        s[i] = x[i] + x[n - 1 - i];
        d[i] = (x[i] - x[n - 1 - i]) * half_sec(n, i);
    }

    let mut ys = [0.0f64; 16];
    let mut yd = [0.0f64; 16];
    dct(&s[..h], &mut ys[..h]);
    dct(&d[..h], &mut yd[..h]);

    for i in 0..h - 1 {
        y[2 * i] = ys[i];
        y[2 * i + 1] = yd[i] + yd[i + 1];
    }
    y[n - 2] = ys[h - 1];
    y[n - 1] = yd[h - 1];
}

pub fn dct32(x: &[f64; 32], y: &mut [f64; 32]) {
    dct(x, y);
}

/// Per-channel synthesis state: a FIFO of 16 x 64 matrixed values, 1024 words in total.
pub struct SynthFilter {
    v: [[f64; 64]; 16],
    front: usize,
}

impl Default for SynthFilter {
    fn default() -> Self {
        SynthFilter { v: [[0.0; 64]; 16], front: 0 }
    }
}

impl SynthFilter {
    pub fn new() -> Self {
        SynthFilter::default()
    }

    pub fn reset(&mut self) {
        self.v = [[0.0; 64]; 16];
        self.front = 0;
    }

    /// Synthesises one block of 32 sub-band samples into 32 PCM samples, in place.
    ///
    /// The matrixing of the standard is a 32-point MDCT; its 64 outputs are redundant and
    /// reconstructable from a 32-point DCT of the input, following Konstantinides' method.
    /// The windowing step then runs the 16-slot history against the D window.
    pub fn synth(&mut self, samples: &mut [f64]) {
        debug_assert!(samples.len() >= 32);

        let mut s_vec = [0.0f64; 32];
        let mut d_vec = [0.0f64; 32];
        s_vec.copy_from_slice(&samples[..32]);

        dct32(&s_vec, &mut d_vec);

        // Map the DCT onto the MDCT quadrants.
        let v = &mut self.v[self.front];
        for i in 1..16 {
            v[48 - i] = -d_vec[i];
            v[48 + i] = -d_vec[i];
        }
        for i in 1..16 {
            v[i] = d_vec[16 + i];
            v[16 + i] = -d_vec[32 - i];
        }
        v[0] = d_vec[16];
        v[32] = -d_vec[16];
        v[48] = -d_vec[0];
        v[16] = 0.0;

        // Window the history: even slots contribute their first half, odd slots their
        // second.
        let mut o_vec = [0.0f64; 32];
        for j in 0..8 {
            let v0 = &self.v[(self.front + 2 * j) & 0xf][0..32];
            let v1 = &self.v[(self.front + 2 * j + 1) & 0xf][32..64];
            let k = j << 6;
            for i in 0..32 {
                o_vec[i] += v0[i] * SYNTHESIS_D[k + i] + v1[i] * SYNTHESIS_D[k + i + 32];
            }
        }

        samples[..32].copy_from_slice(&o_vec);

        // The slot overwritten next is the oldest one; move the front back by one.
        self.front = (self.front + 15) & 0xf;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dct32_analytical(x: &[f64; 32]) -> [f64; 32] {
        let mut result = [0f64; 32];
        for (i, item) in result.iter_mut().enumerate() {
            *item = x
                .iter()
                .enumerate()
                .map(|(j, &v)| v * (std::f64::consts::PI / 32.0 * i as f64 * (j as f64 + 0.5)).cos())
                .sum();
        }
        result
    }

    #[test]
    fn verify_dct32() {
        const TEST_VECTOR: [f64; 32] = [
            0.1710, 0.1705, 0.3476, 0.1866, 0.4784, 0.6525, 0.2690, 0.9996, //
            0.1864, 0.7277, 0.1163, 0.6620, 0.0911, 0.3225, 0.1126, 0.5344, //
            0.7839, 0.9741, 0.8757, 0.5763, 0.5926, 0.2756, 0.1757, 0.6531, //
            0.7101, 0.7376, 0.1924, 0.0351, 0.8044, 0.2409, 0.9347, 0.9417, //
        ];

        let mut result = [0f64; 32];
        dct32(&TEST_VECTOR, &mut result);

        let expected = dct32_analytical(&TEST_VECTOR);
        for i in 0..32 {
            assert!((expected[i] - result[i]).abs() < 1e-9, "bin {}", i);
        }
    }

    #[test]
    fn silence_synthesises_to_silence() {
        let mut synth = SynthFilter::new();
        let mut block = [0.0f64; 32];
        for _ in 0..64 {
            synth.synth(&mut block);
            assert!(block.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut synth = SynthFilter::new();

        let mut first = [0.0f64; 32];
        first[0] = 1.0;
        let mut second = first;

        synth.synth(&mut first);
        synth.reset();
        synth.synth(&mut second);
        assert_eq!(first, second);
    }
}
