// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layer II frame decoding: table-driven bit allocation, SCFSI, grouped sample triplets.

use cadenza_core::audio::SampleBuf;
use cadenza_core::errors::{decode_error, Result};
use cadenza_core::io::BitReader;

use cadenza_formats::mpa::MpaHeaderBits;

use crate::synthesis::SynthFilter;
use crate::tables::{alloc_table, quant_of, SCALEFACTORS};
use crate::{crc16, dequantize};

pub(crate) fn decode(
    frame: &[u8],
    hdr: &MpaHeaderBits,
    samples: &mut SampleBuf,
    synth: &mut [SynthFilter; 2],
) -> Result<()> {
    let nch = hdr.nch();
    let table = alloc_table(hdr.ver, hdr.sample_rate(), hdr.bitrate(), nch);
    let sblimit = table.sblimit;
    let jsbound = if hdr.mode == 1 { ((hdr.mode_ext + 1) * 4).min(sblimit) } else { sblimit };

    let data_start = if hdr.error_protection { 6 } else { 4 };
    let mut bs = BitReader::new_at(frame, data_start * 8);

    // Bit allocation. Width and quantiser set vary per sub-band; the joint-stereo region
    // shares one allocation between the channels.
    let mut alloc = [[0i8; 32]; 2];
    let mut crc_bits = 0usize;

    for sb in 0..sblimit {
        let width = u32::from(table.bits[sb]);
        if sb < jsbound {
            for ch in alloc.iter_mut().take(nch) {
                let idx = bs.read_bits(width)? as usize;
                ch[sb] = table.alloc[sb][idx];
            }
            crc_bits += width as usize * nch;
        }
        else {
            let idx = bs.read_bits(width)? as usize;
            alloc[0][sb] = table.alloc[sb][idx];
            alloc[1][sb] = alloc[0][sb];
            crc_bits += width as usize;
        }
    }

    // Scale factor selection: 2 bits per allocated sub-band and channel.
    let mut scfsi = [[0u8; 32]; 2];
    for sb in 0..sblimit {
        for ch in 0..nch {
            if alloc[ch][sb] != 0 {
                scfsi[ch][sb] = bs.read_bits(2)? as u8;
                crc_bits += 2;
            }
        }
    }

    // The CRC covers the latter header half plus allocation and SCFSI.
    if hdr.error_protection {
        let mut crc = crc16(0xffff, &frame[2..4], 16);
        crc = crc16(crc, &frame[6..], crc_bits);
        if crc != u16::from_be_bytes([frame[4], frame[5]]) {
            return decode_error("mpa: layer 2 crc mismatch");
        }
    }

    // Scale factors: one per frame third, shared according to SCFSI.
    let mut scale = [[[0f64; 32]; 3]; 2];
    for sb in 0..sblimit {
        for ch in 0..nch {
            if alloc[ch][sb] == 0 {
                continue;
            }
            let mut get = || -> Result<f64> { Ok(SCALEFACTORS[bs.read_bits(6)? as usize]) };
            match scfsi[ch][sb] {
                0 => {
                    scale[ch][0][sb] = get()?;
                    scale[ch][1][sb] = get()?;
                    scale[ch][2][sb] = get()?;
                }
                1 => {
                    let s = get()?;
                    scale[ch][0][sb] = s;
                    scale[ch][1][sb] = s;
                    scale[ch][2][sb] = get()?;
                }
                3 => {
                    scale[ch][0][sb] = get()?;
                    let s = get()?;
                    scale[ch][1][sb] = s;
                    scale[ch][2][sb] = s;
                }
                _ => {
                    let s = get()?;
                    scale[ch][0][sb] = s;
                    scale[ch][1][sb] = s;
                    scale[ch][2][sb] = s;
                }
            }
        }
    }

    // 12 granules of 3 samples per sub-band. Scale factor parts change every 4 granules.
    for gr in 0..12 {
        let part = gr >> 2;
        let mut fraction = [[0f64; 96]; 2];

        for sb in 0..sblimit {
            let joint = nch > 1 && sb >= jsbound;
            let chans = if sb < jsbound { nch } else { 1 };

            for ch in 0..chans {
                let code = alloc[ch][sb];
                if code == 0 {
                    continue;
                }

                let q = quant_of(code);
                let mut s = [0f64; 3];
                if q.group_levels != 0 {
                    // A packed triplet of 3-, 5- or 9-level samples.
                    let mut pack = bs.read_bits(q.read_bits)?;
                    for s in s.iter_mut() {
                        let v = pack % q.group_levels;
                        pack /= q.group_levels;
                        *s = dequantize(v, q.eq_bits, q.c, q.d);
                    }
                }
                else {
                    for s in s.iter_mut() {
                        *s = dequantize(bs.read_bits(q.read_bits)?, q.eq_bits, q.c, q.d);
                    }
                }

                if joint {
                    for (k, &s) in s.iter().enumerate() {
                        fraction[0][sb + 32 * k] = s * scale[0][part][sb];
                        fraction[1][sb + 32 * k] = s * scale[1][part][sb];
                    }
                }
                else {
                    for (k, &s) in s.iter().enumerate() {
                        fraction[ch][sb + 32 * k] = s * scale[ch][part][sb];
                    }
                }
            }
        }

        for (ch, fraction) in fraction.iter().enumerate().take(nch) {
            let row = samples.chan_mut(ch);
            let out = &mut row[gr * 96..(gr + 1) * 96];
            out.copy_from_slice(fraction);
            for k in 0..3 {
                synth[ch].synth(&mut out[32 * k..32 * (k + 1)]);
            }
        }
    }

    Ok(())
}
