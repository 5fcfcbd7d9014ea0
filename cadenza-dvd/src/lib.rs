// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Top-level decoding and processing graphs for Project Cadenza.

pub mod decoder;
pub mod decoder_graph;
pub mod detector;
pub mod dvd_graph;
pub mod proc;

pub use decoder::AudioDecoder;
pub use decoder_graph::DecoderGraph;
pub use detector::FormatDetector;
pub use dvd_graph::{DvdGraph, DvdPlan, EncoderFactory, Sink, SpdifMode, SpdifReason};
pub use proc::{user2output, AudioProcessor, BassSettings};
