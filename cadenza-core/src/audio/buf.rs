// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// `SampleBuf` is a planar buffer of double precision samples: `nch` channel rows of `len`
/// samples each in one contiguous allocation.
///
/// Resizing to a smaller or equal `nch * len` product reuses the existing allocation, so a
/// buffer sized once at filter open never allocates on the processing path.
#[derive(Clone, Debug, Default)]
pub struct SampleBuf {
    data: Vec<f64>,
    nch: usize,
    len: usize,
}

impl SampleBuf {
    pub fn new(nch: usize, len: usize) -> Self {
        SampleBuf { data: vec![0.0; nch * len], nch, len }
    }

    /// Resizes the buffer. New samples are zeroed; the channel row layout is not preserved
    /// across a resize.
    pub fn resize(&mut self, nch: usize, len: usize) {
        self.data.clear();
        self.data.resize(nch * len, 0.0);
        self.nch = nch;
        self.len = len;
    }

    #[inline]
    pub fn nch(&self) -> usize {
        self.nch
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nch == 0 || self.len == 0
    }

    pub fn zero(&mut self) {
        self.data.iter_mut().for_each(|s| *s = 0.0);
    }

    /// One channel row.
    #[inline]
    pub fn chan(&self, ch: usize) -> &[f64] {
        &self.data[ch * self.len..(ch + 1) * self.len]
    }

    /// One mutable channel row.
    #[inline]
    pub fn chan_mut(&mut self, ch: usize) -> &mut [f64] {
        &mut self.data[ch * self.len..(ch + 1) * self.len]
    }

    /// Iterates all channel rows.
    pub fn channels(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.len.max(1))
    }

    /// Iterates all channel rows mutably. Rows are disjoint, so every channel can be operated
    /// on in one pass.
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f64]> {
        self.data.chunks_exact_mut(self.len.max(1))
    }

    /// Copies the contents of `src`, taking its dimensions.
    pub fn copy_from(&mut self, src: &SampleBuf) {
        self.resize(src.nch, src.len);
        self.data.copy_from_slice(&src.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_disjoint() {
        let mut buf = SampleBuf::new(3, 4);
        for (ch, row) in buf.channels_mut().enumerate() {
            for s in row.iter_mut() {
                *s = ch as f64;
            }
        }
        assert!(buf.chan(0).iter().all(|&s| s == 0.0));
        assert!(buf.chan(1).iter().all(|&s| s == 1.0));
        assert!(buf.chan(2).iter().all(|&s| s == 2.0));
    }

    #[test]
    fn resize_reuses_allocation() {
        let mut buf = SampleBuf::new(6, 1536);
        let cap = buf.data.capacity();
        buf.resize(2, 1152);
        assert_eq!(buf.data.capacity(), cap);
        assert_eq!(buf.nch(), 2);
        assert_eq!(buf.len(), 1152);
    }
}
