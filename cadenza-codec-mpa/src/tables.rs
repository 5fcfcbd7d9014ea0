// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layer I/II quantisation tables from ISO/IEC 11172-3 and ISO/IEC 13818-3.

use lazy_static::lazy_static;

lazy_static! {
    /// Scale factors, `2^(1 - i/3)` per ISO/IEC 11172-3 table B.1. Index 63 is illegal and
    /// maps to silence.
    pub static ref SCALEFACTORS: [f64; 64] = {
        let mut table = [0f64; 64];
        for (i, s) in table.iter_mut().enumerate().take(63) {
            *s = 2.0 * (-(i as f64) / 3.0).exp2();
        }
        table[63] = 1e-20;
        table
    };
}

/// A quantisation class of a Layer II sub-band sample.
///
/// Positive codes are plain `code`-bit quantisers with `2^code - 1` levels. Negative codes
/// are the grouped quantisers: -5, -7 and -10 encode a triplet of 3-, 5- and 9-level samples
/// in 5, 7 and 10 bits.
pub type AllocCode = i8;

/// Expanded parameters of an allocation code.
#[derive(Copy, Clone, Debug)]
pub struct Quant {
    /// Bits to read from the stream (for the whole triplet when grouped).
    pub read_bits: u32,
    /// Equivalent bits of one raw sample after ungrouping.
    pub eq_bits: u32,
    /// Number of levels of a grouped quantiser; zero when not grouped.
    pub group_levels: u32,
    /// The `c` constant of table B.4.
    pub c: f64,
    /// The `d` constant of table B.4.
    pub d: f64,
}

/// Expands an allocation code into its quantiser parameters.
pub fn quant_of(code: AllocCode) -> Quant {
    match code {
        -5 => Quant { read_bits: 5, eq_bits: 2, group_levels: 3, c: 4.0 / 3.0, d: 0.5 },
        -7 => Quant { read_bits: 7, eq_bits: 3, group_levels: 5, c: 8.0 / 5.0, d: 0.5 },
        -10 => Quant { read_bits: 10, eq_bits: 4, group_levels: 9, c: 16.0 / 9.0, d: 0.5 },
        n => {
            debug_assert!(n >= 2 && n <= 16);
            let n = n as u32;
            let levels = (1u32 << n) - 1;
            Quant {
                read_bits: n,
                eq_bits: n,
                group_levels: 0,
                c: f64::from(levels + 1) / f64::from(levels),
                d: (1.0 - n as f64).exp2(),
            }
        }
    }
}

/// A Layer II bit-allocation table: the sub-band limit, allocation field widths per sub-band,
/// and the quantisation codes selected by each allocation value.
pub struct AllocTable {
    pub sblimit: usize,
    pub bits: [u8; 32],
    pub alloc: [&'static [AllocCode; 16]; 32],
}

// Quantiser rows shared between the tables. Row naming follows the level sequences of the
// standard's tables B.2a-d and ISO 13818-3 table B.1.
const ROW_AB_LOW: [AllocCode; 16] = [0, -5, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
const ROW_AB_MID: [AllocCode; 16] = [0, -5, -7, 3, -10, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 16];
const ROW_AB_HIGH: [AllocCode; 16] = [0, -5, -7, 3, -10, 4, 5, 16, 0, 0, 0, 0, 0, 0, 0, 0];
const ROW_AB_TOP: [AllocCode; 16] = [0, -5, -7, 16, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
const ROW_CD_LOW: [AllocCode; 16] = [0, -5, -7, -10, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
const ROW_CD_HIGH: [AllocCode; 16] = [0, -5, -7, -10, 4, 5, 6, 7, 0, 0, 0, 0, 0, 0, 0, 0];
const ROW_LSF_LOW: [AllocCode; 16] = [0, -5, -7, 3, -10, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14];
const ROW_LSF_MID: [AllocCode; 16] = [0, -5, -7, 3, -10, 4, 5, 6, 0, 0, 0, 0, 0, 0, 0, 0];
const ROW_LSF_HIGH: [AllocCode; 16] = [0, -5, -7, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
const ROW_NONE: [AllocCode; 16] = [0; 16];

macro_rules! rows {
    ($($row:ident x $n:literal),+ $(,)?) => {{
        let mut table: [&'static [AllocCode; 16]; 32] = [&ROW_NONE; 32];
        let mut i = 0;
        $(
            let mut k = 0;
            while k < $n {
                table[i] = &$row;
                i += 1;
                k += 1;
            }
        )+
        let _ = i;
        table
    }};
}

macro_rules! widths {
    ($($w:literal x $n:literal),+ $(,)?) => {{
        let mut bits = [0u8; 32];
        let mut i = 0;
        $(
            let mut k = 0;
            while k < $n {
                bits[i] = $w;
                i += 1;
                k += 1;
            }
        )+
        let _ = i;
        bits
    }};
}

/// Table B.2a: 48 kHz and high bitrates at 32/44.1 kHz.
pub static TABLE_A: AllocTable = AllocTable {
    sblimit: 27,
    bits: widths!(4 x 3, 4 x 8, 3 x 12, 2 x 4),
    alloc: rows!(ROW_AB_LOW x 3, ROW_AB_MID x 8, ROW_AB_HIGH x 12, ROW_AB_TOP x 4),
};

/// Table B.2b: 32/44.1 kHz at the highest bitrates.
pub static TABLE_B: AllocTable = AllocTable {
    sblimit: 30,
    bits: widths!(4 x 3, 4 x 8, 3 x 12, 2 x 7),
    alloc: rows!(ROW_AB_LOW x 3, ROW_AB_MID x 8, ROW_AB_HIGH x 12, ROW_AB_TOP x 7),
};

/// Table B.2c: low bitrates at 48/44.1 kHz.
pub static TABLE_C: AllocTable = AllocTable {
    sblimit: 8,
    bits: widths!(4 x 4, 3 x 4),
    alloc: rows!(ROW_CD_LOW x 4, ROW_CD_HIGH x 4),
};

/// Table B.2d: low bitrates at 32 kHz.
pub static TABLE_D: AllocTable = AllocTable {
    sblimit: 12,
    bits: widths!(4 x 4, 3 x 8),
    alloc: rows!(ROW_CD_LOW x 4, ROW_CD_HIGH x 8),
};

/// ISO 13818-3 table B.1 for MPEG-2 low sampling frequencies.
pub static TABLE_LSF: AllocTable = AllocTable {
    sblimit: 30,
    bits: widths!(4 x 4, 3 x 7, 2 x 19),
    alloc: rows!(ROW_LSF_LOW x 4, ROW_LSF_MID x 7, ROW_LSF_HIGH x 19),
};

/// Selects the Layer II allocation table for a frame.
pub fn alloc_table(ver: usize, sample_rate: u32, bitrate: u32, nch: usize) -> &'static AllocTable {
    if ver != 0 {
        return &TABLE_LSF;
    }

    let kbps_per_ch = bitrate / 1000 / nch as u32;
    if (sample_rate == 48000 && kbps_per_ch >= 56) || (56..=80).contains(&kbps_per_ch) {
        &TABLE_A
    }
    else if sample_rate != 48000 && kbps_per_ch >= 96 {
        &TABLE_B
    }
    else if sample_rate != 32000 && kbps_per_ch <= 48 {
        &TABLE_C
    }
    else {
        &TABLE_D
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalefactors() {
        assert!((SCALEFACTORS[0] - 2.0).abs() < 1e-12);
        assert!((SCALEFACTORS[3] - 1.0).abs() < 1e-12);
        assert!((SCALEFACTORS[6] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn quant_constants_match_the_standard() {
        // Spot checks against ISO 11172-3 table B.4.
        let q = quant_of(-5);
        assert!((q.c - 1.33333333333).abs() < 1e-9);
        assert_eq!(q.d, 0.5);

        let q = quant_of(3); // 7 levels
        assert!((q.c - 1.14285714286).abs() < 1e-9);
        assert_eq!(q.d, 0.25);

        let q = quant_of(4); // 15 levels
        assert!((q.c - 1.06666666666).abs() < 1e-9);
        assert_eq!(q.d, 0.125);

        let q = quant_of(16); // 65535 levels
        assert!((q.c - 1.00001525902).abs() < 1e-9);
        assert!((q.d - 0.000030517578125).abs() < 1e-15);
    }

    #[test]
    fn table_select() {
        // 48 kHz stereo at 256 kbps: 128 kbps per channel -> table A.
        assert_eq!(alloc_table(0, 48000, 256_000, 2).sblimit, TABLE_A.sblimit);
        // 44.1 kHz stereo at 256 kbps -> table B.
        assert_eq!(alloc_table(0, 44100, 256_000, 2).sblimit, TABLE_B.sblimit);
        // 48 kHz mono at 48 kbps -> table C.
        assert_eq!(alloc_table(0, 48000, 48_000, 1).sblimit, TABLE_C.sblimit);
        // 32 kHz mono at 48 kbps -> table D.
        assert_eq!(alloc_table(0, 32000, 48_000, 1).sblimit, TABLE_D.sblimit);
        // MPEG-2 LSF always uses its own table.
        assert_eq!(alloc_table(1, 24000, 64_000, 2).sblimit, TABLE_LSF.sblimit);
    }

    #[test]
    fn widths_match_rows() {
        for table in [&TABLE_A, &TABLE_B, &TABLE_C, &TABLE_D, &TABLE_LSF] {
            for sb in 0..table.sblimit {
                let width = table.bits[sb] as usize;
                assert!(width >= 2 && width <= 4);
                // Every selectable allocation value has a defined quantiser, and value zero
                // means "no samples".
                let row = table.alloc[sb];
                assert_eq!(row[0], 0);
                for v in 1..(1 << width) {
                    assert!(row[v] != 0, "hole in allocation row");
                }
            }
        }
    }
}
