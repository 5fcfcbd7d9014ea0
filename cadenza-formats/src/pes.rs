// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MPEG program stream (PES) demultiplexing.
//!
//! The demultiplexer strips pack, system and PES packet headers and extracts the payload of
//! one elementary stream, selected by stream id and, for private stream 1, by substream id.
//! When no stream is selected, the first audio stream found is locked in. Substream tagging
//! follows the DVD convention: 0x80..0x87 AC-3, 0x88..0x8f DTS, 0xa0..0xa7 LPCM.

use log::{debug, warn};

use cadenza_core::audio::{layout, Format, Speakers};
use cadenza_core::chunk::Chunk;
use cadenza_core::errors::{bad_format_error, Result};
use cadenza_core::filter::Filter;

const STREAM_ID_PRIVATE1: u8 = 0xbd;
const STREAM_ID_PADDING: u8 = 0xbe;
const STREAM_ID_PRIVATE2: u8 = 0xbf;

/// Payload format of a PES stream/substream pair.
fn substream_format(stream_id: u8, substream_id: u8) -> Option<Format> {
    match stream_id {
        0xc0..=0xdf => Some(Format::Mpa),
        STREAM_ID_PRIVATE1 => match substream_id {
            0x80..=0x87 => Some(Format::Ac3),
            0x88..=0x8f => Some(Format::Dts),
            0xa0..=0xa7 => Some(Format::Pcm16Be),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DemuxState {
    /// Searching for a packet start code.
    Sync,
    /// Reading the fixed packet header part.
    Header,
    /// Skipping `skip` bytes.
    Skip,
    /// Passing `payload` bytes of the selected stream through.
    Payload,
}

/// PES demultiplexer filter. Accepts [`Format::Pes`] byte streams and produces the selected
/// elementary stream as raw data chunks.
pub struct PesDemux {
    spk: Speakers,
    out_spk: Speakers,
    open: bool,
    is_new_stream: bool,

    stream_id: Option<u8>,
    substream_id: Option<u8>,

    state: DemuxState,
    window: u32,
    hdr: Vec<u8>,
    need: usize,
    skip: usize,
    payload: usize,
    packet_stream: u8,
    out: Vec<u8>,
}

impl Default for PesDemux {
    fn default() -> Self {
        PesDemux::new()
    }
}

impl PesDemux {
    pub fn new() -> Self {
        PesDemux {
            spk: Speakers::UNKNOWN,
            out_spk: Speakers::UNKNOWN,
            open: false,
            is_new_stream: false,
            stream_id: None,
            substream_id: None,
            state: DemuxState::Sync,
            window: 0xffff_ffff,
            hdr: Vec::new(),
            need: 0,
            skip: 0,
            payload: 0,
            packet_stream: 0,
            out: Vec::new(),
        }
    }

    /// Locks demultiplexing to one stream (and substream, for private stream 1).
    pub fn select(&mut self, stream_id: u8, substream_id: Option<u8>) {
        self.stream_id = Some(stream_id);
        self.substream_id = substream_id;
    }

    pub fn selected(&self) -> (Option<u8>, Option<u8>) {
        (self.stream_id, self.substream_id)
    }

    /// Parses the PES header collected in `self.hdr` for the current packet and sets up the
    /// payload pass-through. Returns false when the packet must be skipped.
    fn start_payload(&mut self) -> bool {
        let stream_id = self.packet_stream;
        let packet_len = usize::from(u16::from_be_bytes([self.hdr[0], self.hdr[1]]));
        let body = &self.hdr[2..];

        // Find the end of the PES header: MPEG-2 has an explicit length, MPEG-1 is walked
        // field by field.
        let mut pos = 0;
        if body.is_empty() {
            return false;
        }

        if body[0] & 0xc0 == 0x80 {
            // MPEG-2: flags byte, then the header data length.
            if body.len() < 3 {
                return false;
            }
            pos = 3 + usize::from(body[2]);
        }
        else {
            // MPEG-1: stuffing bytes, optional STD buffer size, then PTS/DTS.
            while pos < body.len() && body[pos] == 0xff {
                pos += 1;
            }
            if pos < body.len() && body[pos] & 0xc0 == 0x40 {
                pos += 2;
            }
            if pos < body.len() {
                match body[pos] >> 4 {
                    0x2 => pos += 5,
                    0x3 => pos += 10,
                    _ => pos += 1, // 0x0f marker byte
                }
            }
        }

        if pos > packet_len || pos > body.len() {
            return false;
        }

        // packet_len counts bytes after the length field; pos bytes of it are PES header.
        let mut payload = packet_len - pos;
        let mut data_start = pos;

        let mut substream_id = 0;
        if stream_id == STREAM_ID_PRIVATE1 {
            // The first payload byte tags the substream; AC-3 and DTS carry three more bytes
            // (frame count and a pointer to the first access unit), LPCM six.
            if data_start >= body.len() {
                return false;
            }
            substream_id = body[data_start];
            let audio_header = match substream_id {
                0x80..=0x8f => 4,
                0xa0..=0xa7 => 7,
                _ => 1,
            };
            if payload < audio_header {
                return false;
            }
            data_start += audio_header;
            payload -= audio_header;
            if data_start > body.len() {
                return false;
            }
        }

        let format = match substream_format(stream_id, substream_id) {
            Some(format) => format,
            None => return false,
        };

        // Auto-select the first audio stream seen.
        if self.stream_id.is_none() {
            debug!(
                target: "cadenza::pes",
                "selected stream {:02x}:{:02x}", stream_id, substream_id
            );
            self.stream_id = Some(stream_id);
            if stream_id == STREAM_ID_PRIVATE1 {
                self.substream_id = Some(substream_id);
            }
        }

        if self.stream_id != Some(stream_id) {
            return false;
        }
        if stream_id == STREAM_ID_PRIVATE1
            && self.substream_id.is_some()
            && self.substream_id != Some(substream_id)
        {
            return false;
        }

        let out_spk = match format {
            Format::Pcm16Be => {
                // LPCM attributes: frame count (1), first access unit (2), audio frame
                // information (3). The sample rate and channel count live in the sixth byte.
                let info = body[data_start - 3..data_start].to_vec();
                let rate = match (info[1] >> 4) & 3 {
                    0 => 48000,
                    1 => 96000,
                    _ => 48000,
                };
                let nch = usize::from(info[1] & 7) + 1;
                let mask = if nch == 1 { layout::MONO } else { layout::STEREO };
                Speakers::new(Format::Pcm16Be, mask, rate)
            }
            _ => Speakers::new(format, cadenza_core::audio::ChannelMask::empty(), 0),
        };

        if out_spk != self.out_spk {
            self.is_new_stream = true;
            self.out_spk = out_spk;
        }

        // Queue any header-trailing payload bytes already collected, then stream the rest.
        if data_start < body.len() {
            let tail = &body[data_start..];
            let take = tail.len().min(payload);
            self.out.extend_from_slice(&tail[..take]);
            payload -= take;
        }
        self.payload = payload;
        true
    }

    /// Feeds bytes into the demultiplexer state machine, collecting payload in `self.out`.
    fn feed(&mut self, data: &[u8]) {
        let mut pos = 0;

        while pos < data.len() {
            match self.state {
                DemuxState::Sync => {
                    // Look for 00 00 01 <id>.
                    while pos < data.len() {
                        self.window = (self.window << 8) | u32::from(data[pos]);
                        pos += 1;
                        if self.window & 0xffff_ff00 == 0x0000_0100 {
                            let id = (self.window & 0xff) as u8;
                            self.window = 0xffff_ffff;
                            match id {
                                0xba => {
                                    // Pack header: the fixed part tells the variant.
                                    self.state = DemuxState::Header;
                                    self.packet_stream = id;
                                    self.hdr.clear();
                                    self.need = 1;
                                }
                                0xbb | STREAM_ID_PRIVATE2 | STREAM_ID_PADDING => {
                                    // System header, private 2 and padding: skip by length.
                                    self.state = DemuxState::Header;
                                    self.packet_stream = id;
                                    self.hdr.clear();
                                    self.need = 2;
                                }
                                0xbd | 0xc0..=0xdf => {
                                    // An audio-bearing PES packet: collect the header.
                                    self.state = DemuxState::Header;
                                    self.packet_stream = id;
                                    self.hdr.clear();
                                    // Length + a generous header prefix; trimmed by the
                                    // parser.
                                    self.need = 2;
                                }
                                0xe0..=0xef => {
                                    // Video: skip by length.
                                    self.state = DemuxState::Header;
                                    self.packet_stream = id;
                                    self.hdr.clear();
                                    self.need = 2;
                                }
                                _ => {}
                            }
                            break;
                        }
                    }
                }

                DemuxState::Header => {
                    while pos < data.len() && self.hdr.len() < self.need {
                        self.hdr.push(data[pos]);
                        pos += 1;
                    }
                    if self.hdr.len() < self.need {
                        return;
                    }

                    match self.packet_stream {
                        0xba => {
                            // MPEG-2 packs start with 01xx; MPEG-1 with 0010. MPEG-2 packs
                            // are 14 bytes past the start code plus stuffing; MPEG-1 packs
                            // are 12.
                            if self.need == 1 {
                                self.need = if self.hdr[0] & 0xc0 == 0x40 { 10 } else { 8 };
                            }
                            else if self.hdr[0] & 0xc0 == 0x40 && self.need == 10 {
                                self.skip = usize::from(self.hdr[9] & 7);
                                self.state =
                                    if self.skip > 0 { DemuxState::Skip } else { DemuxState::Sync };
                            }
                            else {
                                self.state = DemuxState::Sync;
                            }
                        }
                        0xbb | STREAM_ID_PRIVATE2 | STREAM_ID_PADDING | 0xe0..=0xef => {
                            self.skip = usize::from(u16::from_be_bytes([self.hdr[0], self.hdr[1]]));
                            self.state =
                                if self.skip > 0 { DemuxState::Skip } else { DemuxState::Sync };
                        }
                        _ => {
                            if self.need == 2 {
                                // Collect enough of the packet to parse the PES header. The
                                // whole header fits well within 128 bytes; shorter packets
                                // are bounded by the packet length itself.
                                let packet_len =
                                    usize::from(u16::from_be_bytes([self.hdr[0], self.hdr[1]]));
                                if packet_len == 0 {
                                    self.state = DemuxState::Sync;
                                }
                                else {
                                    self.need = 2 + packet_len.min(128);
                                }
                            }
                            else {
                                let packet_len =
                                    usize::from(u16::from_be_bytes([self.hdr[0], self.hdr[1]]));
                                let consumed_body = self.hdr.len() - 2;
                                if self.start_payload() {
                                    // Remaining payload streams directly.
                                    self.state = if self.payload > 0 {
                                        DemuxState::Payload
                                    }
                                    else {
                                        DemuxState::Sync
                                    };
                                }
                                else {
                                    self.skip = packet_len.saturating_sub(consumed_body);
                                    self.state = if self.skip > 0 {
                                        DemuxState::Skip
                                    }
                                    else {
                                        DemuxState::Sync
                                    };
                                }
                            }
                        }
                    }
                }

                DemuxState::Skip => {
                    let take = self.skip.min(data.len() - pos);
                    pos += take;
                    self.skip -= take;
                    if self.skip == 0 {
                        self.state = DemuxState::Sync;
                    }
                }

                DemuxState::Payload => {
                    let take = self.payload.min(data.len() - pos);
                    self.out.extend_from_slice(&data[pos..pos + take]);
                    pos += take;
                    self.payload -= take;
                    if self.payload == 0 {
                        self.state = DemuxState::Sync;
                    }
                }
            }
        }
    }
}

impl Filter for PesDemux {
    fn name(&self) -> &'static str {
        "PesDemux"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        spk.format == Format::Pes
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("demux: input is not a program stream");
        }
        self.reset();
        self.spk = spk;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.reset();
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
        self.out_spk
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        let sync = input.sync;
        let time = input.time;

        self.out.clear();
        self.is_new_stream = false;
        self.feed(input.raw());
        input.clear();

        if self.out.is_empty() {
            if self.is_new_stream {
                warn!(target: "cadenza::pes", "stream change with empty payload");
            }
            return Ok(false);
        }

        output.clear();
        output.set_raw(&self.out);
        if sync {
            output.set_sync(time);
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.state = DemuxState::Sync;
        self.window = 0xffff_ffff;
        self.hdr.clear();
        self.out.clear();
        self.need = 0;
        self.skip = 0;
        self.payload = 0;
        self.out_spk = Speakers::UNKNOWN;
        self.is_new_stream = false;
    }

    fn new_stream(&self) -> bool {
        self.is_new_stream
    }
}
