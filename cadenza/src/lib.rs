// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Project Cadenza is a library for decoding, mixing and routing the compressed and linear
//! multichannel audio streams found on DVD media and in broadcast transport.
//!
//! The heavy lifting lives in the member crates; this crate re-exports them and provides the
//! default decoder registry.
//!
//! ```
//! use cadenza::core::audio::{layout, Format, Speakers};
//! use cadenza::core::filter::Filter;
//! use cadenza::dvd::DecoderGraph;
//!
//! let mut graph = DecoderGraph::new(cadenza::default_registry());
//! assert!(graph.can_open(Speakers::new(Format::Mpa, layout::STEREO, 48000)));
//! ```

pub use cadenza_codec_mpa as mpa;
pub use cadenza_core as core;
pub use cadenza_dvd as dvd;
pub use cadenza_formats as formats;

use std::sync::Arc;

use cadenza_core::audio::Format;
use cadenza_core::parser::{DecoderRegistry, FrameParser, HeaderParser, RegisteredDecoder};

fn make_mpa_header() -> Box<dyn HeaderParser> {
    Box::new(cadenza_formats::MpaHeader::new())
}

fn make_mpa_decoder() -> Box<dyn FrameParser> {
    Box::new(cadenza_codec_mpa::MpaDecoder::new())
}

/// Registers every decoder shipped with Cadenza.
///
/// Only the MPEG Audio Layer I/II decoder is native; AC-3, DTS and MLP decoders bind through
/// the same [`RegisteredDecoder`] hook.
pub fn register_default_decoders(registry: &mut DecoderRegistry) {
    registry.register(RegisteredDecoder {
        format: Format::Mpa,
        make_header: make_mpa_header,
        make_decoder: make_mpa_decoder,
    });
}

/// The default decoder registry, shared-ready.
pub fn default_registry() -> Arc<DecoderRegistry> {
    let mut registry = DecoderRegistry::new();
    register_default_decoders(&mut registry);
    Arc::new(registry)
}
