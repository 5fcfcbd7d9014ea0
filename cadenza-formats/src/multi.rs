// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A header parser over several formats at once, used wherever the stream format is not known
//! in advance.

use cadenza_core::audio::Format;
use cadenza_core::parser::{FrameInfo, HeaderParser};
use cadenza_core::sync::SyncInfo;

/// Combines several header parsers: a header belongs to the first parser that accepts it, and
/// the size bounds are the envelope of all parsers.
pub struct MultiHeader {
    parsers: Vec<Box<dyn HeaderParser>>,
    header_size: usize,
    min_frame_size: usize,
    max_frame_size: usize,
}

impl MultiHeader {
    pub fn new(parsers: Vec<Box<dyn HeaderParser>>) -> Self {
        assert!(!parsers.is_empty());

        let header_size = parsers.iter().map(|p| p.header_size()).max().unwrap();
        let min_frame_size =
            parsers.iter().map(|p| p.min_frame_size()).min().unwrap().max(header_size);
        let max_frame_size = parsers.iter().map(|p| p.max_frame_size()).max().unwrap();

        MultiHeader { parsers, header_size, min_frame_size, max_frame_size }
    }

    /// The multi-format parser for the formats found on DVD media: AC-3, MPEG Audio and DTS.
    pub fn dvd() -> Self {
        MultiHeader::new(vec![
            Box::new(crate::ac3::Ac3Header::new()),
            Box::new(crate::mpa::MpaHeader::new()),
            Box::new(crate::dts::DtsHeader::new()),
        ])
    }

    fn find(&self, hdr: &[u8]) -> Option<&dyn HeaderParser> {
        self.parsers.iter().map(|p| p.as_ref()).find(|p| p.parse_header(hdr).is_some())
    }
}

impl HeaderParser for MultiHeader {
    fn header_size(&self) -> usize {
        self.header_size
    }

    fn min_frame_size(&self) -> usize {
        self.min_frame_size
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn can_parse(&self, format: Format) -> bool {
        self.parsers.iter().any(|p| p.can_parse(format))
    }

    fn sync_info(&self) -> SyncInfo {
        let mut info = SyncInfo::default();
        for parser in &self.parsers {
            // Offset syncs cannot share a scanner with zero-offset syncs; such formats are
            // framed by their own parser instead.
            let pi = parser.sync_info();
            if pi.sync_offset == 0 {
                info.merge(&pi);
            }
        }
        info.min_frame_size = self.min_frame_size;
        info.max_frame_size = self.max_frame_size;
        info
    }

    fn parse_header(&self, hdr: &[u8]) -> Option<FrameInfo> {
        self.parsers.iter().find_map(|p| p.parse_header(hdr))
    }

    fn compare_headers(&self, hdr1: &[u8], hdr2: &[u8]) -> bool {
        match self.find(hdr1) {
            Some(parser) => parser.compare_headers(hdr1, hdr2),
            None => false,
        }
    }

    fn validate_frame(&self, frame: &[u8]) -> bool {
        match self.find(frame) {
            Some(parser) => parser.validate_frame(frame),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::parser::BitstreamType;

    #[test]
    fn envelope_sizes() {
        let multi = MultiHeader::dvd();
        assert_eq!(multi.header_size(), 16);
        assert_eq!(multi.max_frame_size(), crate::dts::DTS_MAX_FRAME_SIZE);
        assert!(multi.can_parse(Format::Ac3));
        assert!(multi.can_parse(Format::Mpa));
        assert!(multi.can_parse(Format::Dts));
        assert!(!multi.can_parse(Format::Flac));
    }

    #[test]
    fn dispatches_by_content() {
        let multi = MultiHeader::dvd();

        let mpa = crate::mpa::make_header(&crate::mpa::MpaHeaderBits {
            ver: 0,
            layer: 1,
            bitrate_index: 12,
            sampling_frequency: 1,
            padding: false,
            error_protection: false,
            mode: 0,
            mode_ext: 0,
        });
        let mut hdr = [0u8; 16];
        hdr[..4].copy_from_slice(&mpa);
        let fi = multi.parse_header(&hdr).unwrap();
        assert_eq!(fi.spk.format, Format::Mpa);
        assert_eq!(fi.bs_type, BitstreamType::B8);
    }
}
