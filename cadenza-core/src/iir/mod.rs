// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `iir` module provides infinite impulse response filters: the biquad building block,
//! filter instances, prototype generators and the direct form II runtime.

pub mod butterworth;
pub mod linkwitz_riley;

use smallvec::SmallVec;

use crate::errors::{bad_format_error, Result};

pub use butterworth::IirButterworth;
pub use linkwitz_riley::IirLinkwitzRiley;

/// A second-order filter section:
///
/// ```text
/// b0 + b1*z^-1 + b2*z^-2
/// ----------------------
/// a0 + a1*z^-1 + a2*z^-2
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Biquad {
    /// Denominator coefficients.
    pub a: [f64; 3],
    /// Numerator coefficients.
    pub b: [f64; 3],
}

impl Biquad {
    /// An identity biquad: b0 = a0 = 1, everything else zero.
    pub fn identity() -> Self {
        Biquad { a: [1.0, 0.0, 0.0], b: [1.0, 0.0, 0.0] }
    }

    /// A gain biquad: b0 = gain, a0 = 1.
    pub fn gain(gain: f64) -> Self {
        Biquad { a: [1.0, 0.0, 0.0], b: [gain, 0.0, 0.0] }
    }

    pub fn new(a0: f64, a1: f64, a2: f64, b0: f64, b1: f64, b2: f64) -> Self {
        Biquad { a: [a0, a1, a2], b: [b0, b1, b2] }
    }

    /// Applies the bilinear transform substitution `s = k * (1 - z^-1) / (1 + z^-1)`.
    pub fn bilinear(&mut self, k: f64) {
        let (a, b) = (self.a, self.b);
        self.a = [
            a[0] + a[1] * k + a[2] * k * k,
            2.0 * (a[0] - a[2] * k * k),
            a[0] - a[1] * k + a[2] * k * k,
        ];
        self.b = [
            b[0] + b[1] * k + b[2] * k * k,
            2.0 * (b[0] - b[2] * k * k),
            b[0] - b[1] * k + b[2] * k * k,
        ];
    }

    /// Divides all coefficients by a0.
    pub fn normalize(&mut self) {
        let a0 = self.a[0];
        if a0 != 1.0 && a0 != 0.0 {
            self.b[0] /= a0;
            self.b[1] /= a0;
            self.b[2] /= a0;
            self.a[1] /= a0;
            self.a[2] /= a0;
            self.a[0] = 1.0;
        }
    }

    /// Applies gain to the numerator.
    pub fn apply_gain(&mut self, gain: f64) {
        self.b[0] *= gain;
        self.b[1] *= gain;
        self.b[2] *= gain;
    }

    /// The DC-independent gain b0/a0. Zero for an infinity biquad.
    pub fn get_gain(&self) -> f64 {
        if self.a[0] == 0.0 {
            0.0
        }
        else {
            self.b[0] / self.a[0]
        }
    }

    pub fn is_null(&self) -> bool {
        self.b[0] == 0.0
    }

    pub fn is_gain(&self) -> bool {
        self.b[1] == 0.0
            && self.b[2] == 0.0
            && self.a[0] != 0.0
            && self.a[1] == 0.0
            && self.a[2] == 0.0
    }

    pub fn is_identity(&self) -> bool {
        self.is_gain() && self.b[0] == self.a[0]
    }

    pub fn is_infinity(&self) -> bool {
        self.a[0] == 0.0
    }
}

/// An IIR filter instance: an ordered list of biquad sections and a global gain, designed for
/// one sample rate. Sample rate zero marks an analog prototype.
#[derive(Clone, Debug, Default)]
pub struct IirInstance {
    pub sample_rate: u32,
    pub gain: f64,
    pub sections: SmallVec<[Biquad; 4]>,
}

impl IirInstance {
    pub fn new(sample_rate: u32, gain: f64) -> Self {
        IirInstance { sample_rate, gain, sections: SmallVec::new() }
    }

    pub fn bilinear(&mut self, k: f64) {
        for section in self.sections.iter_mut() {
            section.bilinear(k);
        }
    }

    pub fn normalize(&mut self) {
        for section in self.sections.iter_mut() {
            section.normalize();
        }
    }

    pub fn apply_gain(&mut self, gain: f64) {
        self.gain *= gain;
    }

    /// Total gain: the global gain multiplied by each section's gain.
    pub fn get_gain(&self) -> f64 {
        self.sections.iter().fold(self.gain, |acc, s| acc * s.get_gain())
    }

    pub fn is_null(&self) -> bool {
        self.gain == 0.0 || self.sections.iter().any(|s| s.is_null())
    }

    pub fn is_gain(&self) -> bool {
        self.sections.iter().all(|s| s.is_gain())
    }

    pub fn is_identity(&self) -> bool {
        self.is_gain() && self.get_gain() == 1.0
    }

    pub fn is_infinity(&self) -> bool {
        self.sections.iter().any(|s| s.is_infinity())
    }
}

/// An IIR response generator.
///
/// A generator acts as a parameter container; `make` realises the response for a given sample
/// rate. When parameters change, `version` changes with them, so clients know the realised
/// filter is stale. Sample rate is an external parameter and does not affect the version.
pub trait IirGen {
    fn version(&self) -> u32;
    fn make(&self, sample_rate: u32) -> IirInstance;
}

/// Generator of the zero response.
pub struct IirZero;

impl IirGen for IirZero {
    fn version(&self) -> u32 {
        0
    }

    fn make(&self, sample_rate: u32) -> IirInstance {
        IirInstance::new(sample_rate, 0.0)
    }
}

/// Generator of the identity response.
pub struct IirIdentity;

impl IirGen for IirIdentity {
    fn version(&self) -> u32 {
        0
    }

    fn make(&self, sample_rate: u32) -> IirInstance {
        IirInstance::new(sample_rate, 1.0)
    }
}

/// Constant generators, usable wherever a default response is needed.
pub static IIR_ZERO: IirZero = IirZero;
pub static IIR_IDENTITY: IirIdentity = IirIdentity;

/// Generator of a pure gain response.
pub struct IirGain {
    ver: u32,
    gain: f64,
}

impl IirGain {
    pub fn new(gain: f64) -> Self {
        IirGain { ver: 0, gain }
    }

    pub fn set_gain(&mut self, gain: f64) {
        if self.gain != gain {
            self.gain = gain;
            self.ver += 1;
        }
    }

    pub fn get_gain(&self) -> f64 {
        self.gain
    }
}

impl IirGen for IirGain {
    fn version(&self) -> u32 {
        self.ver
    }

    fn make(&self, sample_rate: u32) -> IirInstance {
        IirInstance::new(sample_rate, self.gain)
    }
}

/// One direct form II section with its state words.
#[derive(Copy, Clone, Debug, Default)]
struct Section {
    a1: f64,
    a2: f64,
    b1: f64,
    b2: f64,
    h1: f64,
    h2: f64,
}

/// Runtime realisation of an [`IirInstance`] as a direct form II cascade.
///
/// The default filter is the identity. Gain-only sections of the instance are folded into the
/// global gain and do not become sections.
#[derive(Default)]
pub struct IirFilter {
    gain: f64,
    sections: SmallVec<[Section; 4]>,
}

impl IirFilter {
    pub fn new() -> Self {
        IirFilter { gain: 1.0, sections: SmallVec::new() }
    }

    pub fn from_instance(iir: &IirInstance) -> Result<Self> {
        let mut filter = IirFilter::new();
        filter.init(iir)?;
        Ok(filter)
    }

    /// Initialises the filter from an instance. An infinity response fails and leaves the
    /// filter in identity mode.
    pub fn init(&mut self, iir: &IirInstance) -> Result<()> {
        self.drop_sections();

        if iir.is_infinity() {
            return bad_format_error("iir: infinite response cannot be realised");
        }

        if iir.is_null() {
            self.gain = 0.0;
            return Ok(());
        }

        // The global gain absorbs the instance gain and each section's gain; sections are
        // normalised so their leading coefficients vanish.
        self.gain = iir.get_gain();

        for biquad in iir.sections.iter() {
            if !biquad.is_gain() {
                self.sections.push(Section {
                    a1: biquad.a[1] / biquad.a[0],
                    a2: biquad.a[2] / biquad.a[0],
                    b1: biquad.b[1] / biquad.b[0],
                    b2: biquad.b[2] / biquad.b[0],
                    h1: 0.0,
                    h2: 0.0,
                });
            }
        }

        Ok(())
    }

    /// Returns the filter to the identity response.
    pub fn drop_sections(&mut self) {
        self.gain = 1.0;
        self.sections.clear();
    }

    /// True when the filter passes the signal unchanged.
    pub fn is_identity(&self) -> bool {
        self.sections.is_empty() && self.gain == 1.0
    }

    /// Processes samples in place.
    pub fn process(&mut self, samples: &mut [f64]) {
        if self.sections.is_empty() {
            if self.gain == 1.0 {
                // Identity.
            }
            else if self.gain == 0.0 {
                samples.iter_mut().for_each(|s| *s = 0.0);
            }
            else {
                let g = self.gain;
                samples.iter_mut().for_each(|s| *s *= g);
            }
            return;
        }

        let g = self.gain;
        for sample in samples.iter_mut() {
            let mut y = g * *sample;
            for s in self.sections.iter_mut() {
                let h = y - s.a1 * s.h1 - s.a2 * s.h2;
                y = h + s.b1 * s.h1 + s.b2 * s.h2;
                s.h2 = s.h1;
                s.h1 = h;
            }
            *sample = y;
        }
    }

    /// Zeroes the section state.
    pub fn reset(&mut self) {
        for s in self.sections.iter_mut() {
            s.h1 = 0.0;
            s.h2 = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize, seed: u64) -> Vec<f64> {
        // Simple xorshift noise, enough for filter checks.
        let mut state = seed | 1;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn biquad_constructors() {
        let bi = Biquad::identity();
        assert!(bi.is_identity() && bi.is_gain() && !bi.is_null() && !bi.is_infinity());

        let bi = Biquad::gain(2.0);
        assert_eq!(bi.get_gain(), 2.0);
        assert!(bi.is_gain() && !bi.is_identity());

        let bi = Biquad::new(0.0, 1.0, 1.0, 1.0, 1.0, 1.0);
        assert!(bi.is_infinity());
        assert_eq!(bi.get_gain(), 0.0);
    }

    #[test]
    fn biquad_normalize_keeps_gain() {
        let mut bi = Biquad::new(2.0, 4.0, 6.0, 1.0, 3.0, 5.0);
        let gain = bi.get_gain();
        bi.normalize();
        assert_eq!(bi.a, [1.0, 2.0, 3.0]);
        assert_eq!(bi.b, [0.5, 1.5, 2.5]);
        assert!((bi.get_gain() - gain).abs() < 1e-10);
    }

    #[test]
    fn biquad_bilinear_closed_form() {
        // First order low-pass prototype 1 / (1 + s) at k = 1.
        let mut bi = Biquad::new(1.0, 1.0, 0.0, 1.0, 0.0, 0.0);
        bi.bilinear(1.0);
        assert_eq!(bi.a, [2.0, 2.0, 0.0]);
        assert_eq!(bi.b, [1.0, 2.0, 1.0]);
    }

    #[test]
    fn instance_classification() {
        let mut iir = IirInstance::new(48000, 1.0);
        assert!(iir.is_identity());

        iir.apply_gain(2.0);
        assert!(iir.is_gain() && !iir.is_identity());

        iir.sections.push(Biquad::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        assert!(iir.is_null());

        let mut iir = IirInstance::new(48000, 1.0);
        iir.sections.push(Biquad::new(0.0, 1.0, 0.0, 1.0, 0.0, 0.0));
        assert!(iir.is_infinity());
    }

    #[test]
    fn filter_identity_and_gain() {
        let input = noise(256, 0x1234_5678);

        let mut data = input.clone();
        let mut f = IirFilter::from_instance(&IIR_IDENTITY.make(48000)).unwrap();
        f.process(&mut data);
        assert_eq!(data, input);

        let mut data = input.clone();
        let mut f = IirFilter::from_instance(&IirGain::new(0.5).make(48000)).unwrap();
        f.process(&mut data);
        for (y, x) in data.iter().zip(input.iter()) {
            assert_eq!(*y, *x * 0.5);
        }

        let mut data = input.clone();
        let mut f = IirFilter::from_instance(&IIR_ZERO.make(48000)).unwrap();
        f.process(&mut data);
        assert!(data.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn filter_infinity_fails_to_identity() {
        let mut iir = IirInstance::new(48000, 1.0);
        iir.sections.push(Biquad::new(0.0, 1.0, 1.0, 1.0, 1.0, 1.0));

        let mut f = IirFilter::new();
        assert!(f.init(&iir).is_err());
        assert!(f.is_identity());
    }

    #[test]
    fn running_average_recurrence() {
        // One biquad (a0 = 1, a1 = -0.5, b0 = 0.5) equals the recurrence
        // y[n] = (y[n-1] + x[n]) / 2.
        let mut iir = IirInstance::new(48000, 1.0);
        iir.sections.push(Biquad::new(1.0, -0.5, 0.0, 0.5, 0.0, 0.0));

        let input = noise(1024, 0xdead_beef);
        let mut data = input.clone();
        let mut f = IirFilter::from_instance(&iir).unwrap();
        f.process(&mut data);

        let mut y = 0.0;
        for (got, &x) in data.iter().zip(input.iter()) {
            y = (y + x) / 2.0;
            assert!((got - y).abs() < 1e-7);
        }
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut iir = IirInstance::new(48000, 1.0);
        iir.sections.push(Biquad::new(1.0, -0.5, 0.0, 0.5, 0.0, 0.0));

        let input = noise(128, 0x0bad_cafe);
        let mut f = IirFilter::from_instance(&iir).unwrap();

        let mut first = input.clone();
        f.process(&mut first);
        f.reset();
        let mut second = input.clone();
        f.process(&mut second);
        assert_eq!(first, second);
    }
}
