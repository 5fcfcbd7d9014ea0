// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layer I frame decoding: 4-bit allocation, 6-bit scale factors, 12 blocks of 32 sub-band
//! samples.

use cadenza_core::audio::SampleBuf;
use cadenza_core::errors::{decode_error, Result};
use cadenza_core::io::BitReader;

use cadenza_formats::mpa::MpaHeaderBits;

use crate::synthesis::SynthFilter;
use crate::tables::{quant_of, SCALEFACTORS};
use crate::{crc16, dequantize};

pub(crate) fn decode(
    frame: &[u8],
    hdr: &MpaHeaderBits,
    samples: &mut SampleBuf,
    synth: &mut [SynthFilter; 2],
) -> Result<()> {
    let nch = hdr.nch();
    let jsbound = if hdr.mode == 1 { ((hdr.mode_ext + 1) * 4).min(32) } else { 32 };

    let data_start = if hdr.error_protection { 6 } else { 4 };
    let mut bs = BitReader::new_at(frame, data_start * 8);

    // Bit allocation: 4 bits per sub-band, shared above the joint-stereo bound. An
    // allocation value v transmits v + 1 bit samples; value 15 is forbidden.
    let mut alloc = [[0u32; 32]; 2];
    let mut crc_bits = 0usize;

    for sb in 0..32 {
        if sb < jsbound {
            for ch in alloc.iter_mut().take(nch) {
                let v = bs.read_bits(4)?;
                if v == 15 {
                    return decode_error("mpa: invalid layer 1 bit allocation");
                }
                ch[sb] = if v != 0 { v + 1 } else { 0 };
                crc_bits += 4;
            }
        }
        else {
            let v = bs.read_bits(4)?;
            if v == 15 {
                return decode_error("mpa: invalid layer 1 bit allocation");
            }
            let ba = if v != 0 { v + 1 } else { 0 };
            alloc[0][sb] = ba;
            alloc[1][sb] = ba;
            crc_bits += 4;
        }
    }

    if hdr.error_protection {
        let mut crc = crc16(0xffff, &frame[2..4], 16);
        crc = crc16(crc, &frame[6..], crc_bits);
        if crc != u16::from_be_bytes([frame[4], frame[5]]) {
            return decode_error("mpa: layer 1 crc mismatch");
        }
    }

    // Scale factors.
    let mut scale = [[0f64; 32]; 2];
    for sb in 0..32 {
        for ch in 0..nch {
            if alloc[ch][sb] != 0 {
                scale[ch][sb] = SCALEFACTORS[bs.read_bits(6)? as usize];
            }
        }
    }

    // 12 blocks of one sample per sub-band.
    for blk in 0..12 {
        let mut fraction = [[0f64; 32]; 2];

        for sb in 0..32 {
            if sb < jsbound {
                for (ch, fraction) in fraction.iter_mut().enumerate().take(nch) {
                    let ba = alloc[ch][sb];
                    if ba != 0 {
                        let q = quant_of(ba as i8);
                        let raw = bs.read_bits(ba)?;
                        fraction[sb] = dequantize(raw, ba, q.c, q.d) * scale[ch][sb];
                    }
                }
            }
            else {
                let ba = alloc[0][sb];
                if ba != 0 {
                    let q = quant_of(ba as i8);
                    let raw = bs.read_bits(ba)?;
                    let s = dequantize(raw, ba, q.c, q.d);
                    for ch in 0..nch {
                        fraction[ch][sb] = s * scale[ch][sb];
                    }
                }
            }
        }

        for (ch, fraction) in fraction.iter().enumerate().take(nch) {
            let row = samples.chan_mut(ch);
            let out = &mut row[blk * 32..(blk + 1) * 32];
            out.copy_from_slice(fraction);
            synth[ch].synth(out);
        }
    }

    Ok(())
}
