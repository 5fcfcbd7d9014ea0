// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The simple decoding graph: despdif, decode, process. Use it instead of the DVD graph when
//! no S/PDIF output planning and no sink negotiation is needed.

use std::sync::Arc;

use cadenza_core::audio::{Format, Speakers};
use cadenza_core::chunk::Chunk;
use cadenza_core::errors::{bad_format_error, Result};
use cadenza_core::filter::Filter;
use cadenza_core::graph::{FilterGraph, FilterId, GraphPlan, NextNode, NodeTag};
use cadenza_core::parser::DecoderRegistry;

use cadenza_formats::spdif::Despdifer;

use crate::decoder::AudioDecoder;
use crate::proc::{AudioProcessor, BassSettings};

const NODE_DESPDIF: FilterId = 1;
const NODE_DECODE: FilterId = 2;
const NODE_PROC: FilterId = 3;

pub struct DecoderPlan {
    pub user_spk: Speakers,
    pub bass: BassSettings,
    registry: Arc<DecoderRegistry>,
}

impl DecoderPlan {
    fn can_process(&self, spk: Speakers) -> bool {
        (spk.is_linear() || spk.format.is_pcm()) && spk.nch() > 0 && spk.sample_rate != 0
    }
}

impl GraphPlan for DecoderPlan {
    fn next_id(&self, from: NodeTag, spk: Speakers) -> NextNode {
        match from {
            NodeTag::Start => {
                if spk.format == Format::Spdif {
                    return NextNode::Filter(NODE_DESPDIF);
                }
                if self.registry.supports(spk.format) {
                    return NextNode::Filter(NODE_DECODE);
                }
                if self.can_process(spk) {
                    return NextNode::Filter(NODE_PROC);
                }
                NextNode::Unsupported
            }

            NodeTag::Filter(NODE_DESPDIF) => {
                if self.registry.supports(spk.format) {
                    return NextNode::Filter(NODE_DECODE);
                }
                NextNode::Unsupported
            }

            NodeTag::Filter(NODE_DECODE) => {
                if self.can_process(spk) {
                    return NextNode::Filter(NODE_PROC);
                }
                NextNode::Unsupported
            }

            NodeTag::Filter(NODE_PROC) => NextNode::End,

            _ => NextNode::Unsupported,
        }
    }

    fn init_filter(&mut self, id: FilterId, _spk: Speakers) -> Result<Box<dyn Filter>> {
        match id {
            NODE_DESPDIF => Ok(Box::new(Despdifer::new())),
            NODE_DECODE => Ok(Box::new(AudioDecoder::new(self.registry.clone()))),
            NODE_PROC => {
                let mut proc = AudioProcessor::new();
                proc.set_bass(self.bass)?;
                proc.set_user(self.user_spk)?;
                Ok(Box::new(proc))
            }
            _ => bad_format_error("decoder graph: unknown node"),
        }
    }
}

/// Decoding graph: accepts PCM, S/PDIF and any registered compressed format, produces the
/// user's output format.
pub struct DecoderGraph {
    graph: FilterGraph<DecoderPlan>,
}

impl DecoderGraph {
    pub fn new(registry: Arc<DecoderRegistry>) -> Self {
        DecoderGraph {
            graph: FilterGraph::new(DecoderPlan {
                user_spk: Speakers::UNKNOWN,
                bass: BassSettings::default(),
                registry,
            }),
        }
    }

    /// Sets the requested output format. Takes effect from the next (re)open or stream
    /// change.
    pub fn set_user(&mut self, user_spk: Speakers) {
        self.graph.plan_mut().user_spk = user_spk;
        self.graph.invalidate();
        self.graph.rebuild_node(NODE_PROC);
    }

    pub fn set_bass(&mut self, bass: BassSettings) {
        self.graph.plan_mut().bass = bass;
        self.graph.rebuild_node(NODE_PROC);
    }

    pub fn chain_text(&self) -> String {
        self.graph.chain_text()
    }
}

impl Filter for DecoderGraph {
    fn name(&self) -> &'static str {
        "DecoderGraph"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        self.graph.can_open(spk)
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        self.graph.open(spk)
    }

    fn close(&mut self) {
        self.graph.close()
    }

    fn is_open(&self) -> bool {
        self.graph.is_open()
    }

    fn get_input(&self) -> Speakers {
        self.graph.get_input()
    }

    fn get_output(&self) -> Speakers {
        self.graph.get_output()
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        self.graph.process(input, output)
    }

    fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
        self.graph.flush(output)
    }

    fn reset(&mut self) {
        self.graph.reset()
    }

    fn new_stream(&self) -> bool {
        self.graph.new_stream()
    }
}
