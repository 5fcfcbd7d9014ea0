// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame header parsers and container plumbing for Project Cadenza.

pub mod ac3;
pub mod dts;
pub mod mlp;
pub mod mpa;
pub mod multi;
pub mod pes;
pub mod spdif;

pub use ac3::Ac3Header;
pub use dts::DtsHeader;
pub use mlp::{MlpHeader, TruehdHeader};
pub use mpa::MpaHeader;
pub use multi::MultiHeader;
pub use pes::PesDemux;
pub use spdif::{Despdifer, SpdifHeader, Spdifer};
