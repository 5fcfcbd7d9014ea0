// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `timing` module carries timestamps across frame boundaries.

use std::collections::VecDeque;

use crate::chunk::Chunk;

/// Tracks received timestamps against stream positions so that a timestamp entering mid-buffer
/// is attached to the first frame whose head lies at or beyond it.
///
/// Positions are measured in bytes ahead of the next unemitted frame head. When bytes leave
/// the stream (a frame is emitted or garbage is dropped), [`SyncTracker::drop_bytes`] moves all
/// recorded positions back; a timestamp whose position reached zero or less is applied to the
/// next emitted frame.
#[derive(Default)]
pub struct SyncTracker {
    queue: VecDeque<(f64, i64)>,
}

impl SyncTracker {
    pub fn new() -> Self {
        SyncTracker::default()
    }

    pub fn reset(&mut self) {
        self.queue.clear();
    }

    /// Records the timestamp of an incoming chunk. `pos` is the number of bytes buffered ahead
    /// of the chunk's first byte. Clears the chunk's sync marker.
    pub fn receive(&mut self, chunk: &mut Chunk, pos: usize) {
        if chunk.sync {
            self.queue.push_back((chunk.time, pos as i64));
            chunk.sync = false;
            chunk.time = 0.0;
        }
    }

    /// Accounts for `bytes` leaving the stream ahead of all recorded positions.
    pub fn drop_bytes(&mut self, bytes: usize) {
        for entry in self.queue.iter_mut() {
            entry.1 -= bytes as i64;
        }
    }

    /// Stamps an outgoing frame chunk when a recorded timestamp applies to it.
    pub fn stamp(&mut self, chunk: &mut Chunk) {
        if let Some(&(time, pos)) = self.queue.front() {
            if pos <= 0 {
                chunk.set_sync(time);
                self.queue.pop_front();
            }
        }
        // A later timestamp overtaking an unapplied earlier one can only happen when the
        // stream dropped data; keep the earliest.
    }
}
