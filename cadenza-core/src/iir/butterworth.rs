// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::f64::consts::PI;

use super::{Biquad, IirGen, IirInstance};

/// Analog Butterworth low-pass prototype of order `n` at unit cut-off.
///
/// Produces ⌈n/2⌉ sections: conjugate pole pairs as biquads, plus one first-order section for
/// odd orders.
pub fn butterworth_proto(n: u32) -> IirInstance {
    let k = (n + 1) / 2;
    let odd = n & 1;

    let mut iir = IirInstance::new(0, 1.0);

    for i in 0..k - odd {
        iir.sections.push(Biquad::new(
            1.0,
            -2.0 * (f64::from(2 * i + n + 1) / f64::from(2 * n) * PI).cos(),
            1.0,
            1.0,
            0.0,
            0.0,
        ));
    }

    if odd != 0 {
        iir.sections.push(Biquad::new(1.0, 1.0, 0.0, 1.0, 0.0, 0.0));
    }

    iir
}

/// Turns a low-pass prototype into a high-pass one with the `s -> 1/s` substitution, realised
/// as a coefficient order reversal per section.
pub(crate) fn lowpass_to_highpass(iir: &mut IirInstance) {
    for q in iir.sections.iter_mut() {
        *q = Biquad::new(q.a[2], q.a[1], q.a[0], q.b[2], q.b[1], q.b[0]);
    }
}

/// Butterworth filter generator.
pub struct IirButterworth {
    ver: u32,
    n: u32,
    f: u32,
    is_lpf: bool,
}

impl IirButterworth {
    pub fn new(order: u32, freq: u32, lpf: bool) -> Self {
        IirButterworth { ver: 0, n: order, f: freq, is_lpf: lpf }
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

impl IirGen for IirButterworth {
    fn version(&self) -> u32 {
        self.ver
    }

    fn make(&self, sample_rate: u32) -> IirInstance {
        let mut iir = butterworth_proto(self.n);
        iir.sample_rate = sample_rate;

        if !self.is_lpf {
            lowpass_to_highpass(&mut iir);
        }

        let k = 1.0 / (PI * f64::from(self.f) / f64::from(sample_rate)).tan();
        iir.bilinear(k);
        iir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iir::IirFilter;

    #[test]
    fn proto_sections() {
        assert_eq!(butterworth_proto(4).sections.len(), 2);
        let proto5 = butterworth_proto(5);
        assert_eq!(proto5.sections.len(), 3);
        // The odd order adds a first-order section, biquad shaped with a2 = b2 = 0.
        let first_order = proto5.sections[2];
        assert_eq!(first_order.a, [1.0, 1.0, 0.0]);
        assert_eq!(first_order.b, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn unit_dc_gain() {
        // A low-pass prototype passes DC unchanged; the realised filter settles to 1 on a
        // unit step.
        let gen = IirButterworth::new(4, 100, true);
        let mut f = IirFilter::from_instance(&gen.make(48000)).unwrap();

        let mut step = vec![1.0; 48000];
        f.process(&mut step);
        assert!((step[47999] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn highpass_blocks_dc() {
        let gen = IirButterworth::new(4, 100, false);
        let mut f = IirFilter::from_instance(&gen.make(48000)).unwrap();

        let mut step = vec![1.0; 48000];
        f.process(&mut step);
        assert!(step[47999].abs() < 1e-6);
    }

    #[test]
    fn version_changes_on_mutation() {
        let mut gen = IirButterworth::new(4, 100, true);
        let v0 = gen.version();
        gen.set(4, 100, true);
        assert_eq!(gen.version(), v0);
        gen.set(4, 120, true);
        assert!(gen.version() != v0);
    }
}
