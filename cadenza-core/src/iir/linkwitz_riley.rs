// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::f64::consts::PI;

use super::butterworth::lowpass_to_highpass;
use super::{Biquad, IirGen, IirInstance};

/// Analog Linkwitz-Riley low-pass prototype of order `m` (rounded up to even).
///
/// A Linkwitz-Riley filter of order 2n is a cascade of two identical Butterworth filters of
/// order n, so every Butterworth section appears twice. The low-pass and high-pass realised at
/// the same cut-off sum to an all-pass response.
pub fn linkwitz_riley_proto(m: u32) -> IirInstance {
    let m = m + (m & 1);
    let n = m / 2;
    let k = (n + 1) / 2;
    let odd = n & 1;

    let mut iir = IirInstance::new(0, 1.0);

    for i in 0..k - odd {
        let biquad = Biquad::new(
            1.0,
            -2.0 * (f64::from(2 * i + n + 1) / f64::from(2 * n) * PI).cos(),
            1.0,
            1.0,
            0.0,
            0.0,
        );
        iir.sections.push(biquad);
        iir.sections.push(biquad);
    }

    if odd != 0 {
        // The first-order Butterworth section squared: (1 + s)^2.
        iir.sections.push(Biquad::new(1.0, 2.0, 1.0, 1.0, 0.0, 0.0));
    }

    iir
}

/// Linkwitz-Riley filter generator.
pub struct IirLinkwitzRiley {
    ver: u32,
    n: u32,
    f: u32,
    is_lpf: bool,
}

impl IirLinkwitzRiley {
    pub fn new(order: u32, freq: u32, lpf: bool) -> Self {
        IirLinkwitzRiley { ver: 0, n: order, f: freq, is_lpf: lpf }
    }

    pub fn set(&mut self, order: u32, freq: u32, lpf: bool) {
        if self.n != order || self.f != freq || self.is_lpf != lpf {
            self.n = order;
            self.f = freq;
            self.is_lpf = lpf;
            self.ver += 1;
        }
    }

    pub fn order(&self) -> u32 {
        self.n
    }

    pub fn freq(&self) -> u32 {
        self.f
    }

    pub fn is_lpf(&self) -> bool {
        self.is_lpf
    }
}

impl IirGen for IirLinkwitzRiley {
    fn version(&self) -> u32 {
        self.ver
    }

    fn make(&self, sample_rate: u32) -> IirInstance {
        let mut iir = linkwitz_riley_proto(self.n);
        iir.sample_rate = sample_rate;

        if !self.is_lpf {
            lowpass_to_highpass(&mut iir);
        }

        let k = 1.0 / (PI * f64::from(self.f) / f64::from(sample_rate)).tan();
        iir.bilinear(k);
        iir
    }
}
