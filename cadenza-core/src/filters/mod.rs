// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `filters` module collects the built-in processing blocks.

pub mod bass_redir;
pub mod convert;
pub mod dejitter;
pub mod frame_splitter;
pub mod mixer;
pub mod parser_filter;

pub use bass_redir::BassRedir;
pub use convert::Converter;
pub use dejitter::Dejitter;
pub use frame_splitter::FrameSplitter;
pub use mixer::{default_matrix, identity_matrix, mix, Mixer, MixMatrix, MATRIX_CH};
pub use parser_filter::ParserFilter;
