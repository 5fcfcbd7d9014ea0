// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `graph` module implements the dynamic filter chain with graceful rebuilding.
//!
//! A graph is a chain of nodes bracketed by pass-through sentinels. The concrete chain is
//! supplied by a [`GraphPlan`]: given a node and its output format, the plan names the node
//! that must follow and instantiates filters on demand. When the format between two nodes
//! changes, or the plan changes, everything downstream is flushed to completion before the
//! chain tail is rebuilt, so no buffered data is lost across the change.

use std::mem;

use log::debug;

use crate::audio::Speakers;
use crate::chunk::Chunk;
use crate::errors::{bad_format_error, chain_rebuild_error, Error, Result};
use crate::filter::{Filter, Passthrough};

/// Plan-assigned node identifier.
pub type FilterId = u32;

/// Identity of a node in the chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeTag {
    Start,
    End,
    Filter(FilterId),
}

/// The plan's answer to "what follows this node for this format".
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NextNode {
    Filter(FilterId),
    End,
    /// No node can accept the format; planning fails.
    Unsupported,
}

/// Supplies the concrete chain to a [`FilterGraph`].
pub trait GraphPlan {
    /// Given the output format of node `from`, the id of the node that must follow.
    fn next_id(&self, from: NodeTag, spk: Speakers) -> NextNode;

    /// Instantiates the filter for a node about to enter the chain.
    fn init_filter(&mut self, id: FilterId, spk: Speakers) -> Result<Box<dyn Filter>>;

    /// Takes back the filter of a node leaving the chain.
    fn uninit_filter(&mut self, _id: FilterId, _filter: Box<dyn Filter>) {}
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NodeState {
    Init,
    Empty,
    Processing,
    Rebuild,
    DoneFlushing,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Rebuild {
    No,
    Check,
    Do,
}

struct GraphNode {
    tag: NodeTag,
    filter: Box<dyn Filter>,
    input: Chunk,
    output: Chunk,
    state: NodeState,
    rebuild: Rebuild,
    flushing: bool,
}

impl GraphNode {
    fn new(tag: NodeTag, filter: Box<dyn Filter>) -> Self {
        GraphNode {
            tag,
            filter,
            input: Chunk::new(),
            output: Chunk::new(),
            state: NodeState::Init,
            rebuild: Rebuild::No,
            flushing: false,
        }
    }
}

/// A dynamic chain of filters with flush-on-rebuild semantics.
pub struct FilterGraph<P: GraphPlan> {
    plan: P,
    nodes: Vec<GraphNode>,
    is_new_stream: bool,
}

impl<P: GraphPlan> FilterGraph<P> {
    pub fn new(plan: P) -> Self {
        FilterGraph {
            plan,
            nodes: vec![
                GraphNode::new(NodeTag::Start, Box::new(Passthrough::new())),
                GraphNode::new(NodeTag::End, Box::new(Passthrough::new())),
            ],
            is_new_stream: false,
        }
    }

    pub fn plan(&self) -> &P {
        &self.plan
    }

    pub fn plan_mut(&mut self) -> &mut P {
        &mut self.plan
    }

    /// The chain as text, for diagnostics.
    pub fn chain_text(&self) -> String {
        let mut text = String::new();
        for node in &self.nodes[1..self.nodes.len() - 1] {
            text.push('(');
            text.push_str(&node.filter.get_input().to_string());
            text.push_str(") -> ");
            text.push_str(node.filter.name());
            text.push_str(" -> ");
        }
        text.push('(');
        text.push_str(&self.get_output().to_string());
        text.push(')');
        text
    }

    /// Schedules a graceful rebuild of the node with the given id: downstream data is flushed
    /// first, then the chain tail is rebuilt and the filter re-instantiated.
    pub fn rebuild_node(&mut self, id: FilterId) {
        for i in 0..self.nodes.len() - 1 {
            if self.nodes[i + 1].tag == NodeTag::Filter(id) {
                self.nodes[i].rebuild = Rebuild::Do;
                return;
            }
        }
    }

    /// Marks the whole chain suspect: each node re-checks its successor against the plan on
    /// the next processed chunk and rebuilds gracefully when the plan changed.
    pub fn invalidate(&mut self) {
        for node in self.nodes.iter_mut() {
            if node.rebuild == Rebuild::No {
                node.rebuild = Rebuild::Check;
            }
        }
    }

    /// Drops all chain nodes immediately, buffered data included.
    pub fn destroy(&mut self) {
        self.truncate(0);
        self.is_new_stream = false;

        let start = &mut self.nodes[0];
        start.filter.reset();
        start.state = NodeState::Init;
        start.rebuild = Rebuild::Check;
        start.flushing = false;
        start.input.clear();
        start.output.clear();

        let end = self.nodes.last_mut().unwrap();
        end.filter.reset();
        end.state = NodeState::Init;
        end.rebuild = Rebuild::No;
        end.flushing = false;
        end.input.clear();
        end.output.clear();
    }

    fn chain_is_empty(&self) -> bool {
        matches!(self.nodes[0].state, NodeState::Init | NodeState::Empty)
    }

    /// Removes all nodes after `from` (the end sentinel excepted), returning their filters to
    /// the plan.
    fn truncate(&mut self, from: usize) {
        let end = self.nodes.len() - 1;
        if from + 1 >= end {
            return;
        }
        let removed: Vec<GraphNode> = self.nodes.drain(from + 1..end).collect();
        for mut node in removed {
            node.filter.close();
            if let NodeTag::Filter(id) = node.tag {
                self.plan.uninit_filter(id, node.filter);
            }
        }
    }

    /// Rebuilds the chain tail after node `from` (the node itself stays), instantiating and
    /// opening filters until the plan reaches the end or a transitional format.
    fn build_chain(&mut self, from: usize) -> Result<()> {
        let mut i = from;

        while self.nodes[i].tag != NodeTag::End {
            let spk = self.nodes[i].filter.get_output();

            // A format-determining filter that has not yet seen data cannot tell its output
            // format. Planning resumes when the format is known.
            if spk.is_unknown() {
                return Ok(());
            }

            let next = self.plan.next_id(self.nodes[i].tag, spk);

            if self.nodes[i + 1].tag != NodeTag::End {
                self.truncate(i);
            }

            match next {
                NextNode::Unsupported => {
                    return chain_rebuild_error("no filter accepts the stream format");
                }
                NextNode::End => {
                    let end = self.nodes.last_mut().unwrap();
                    end.filter.open(spk)?;
                    end.state = NodeState::Init;
                    end.rebuild = Rebuild::No;
                    end.flushing = false;
                    debug!(target: "cadenza::graph", "chain: {}", self.chain_text());
                    return Ok(());
                }
                NextNode::Filter(id) => {
                    let mut filter = self.plan.init_filter(id, spk)?;
                    if let Err(err) = filter.open(spk) {
                        self.plan.uninit_filter(id, filter);
                        return Err(match err {
                            Error::ChainRebuildError(e) => Error::ChainRebuildError(e),
                            _ => Error::ChainRebuildError("filter refused the format"),
                        });
                    }
                    filter.reset();

                    let node = GraphNode::new(NodeTag::Filter(id), filter);
                    let end = self.nodes.len() - 1;
                    self.nodes.insert(end, node);
                    i += 1;
                }
            }
        }

        Ok(())
    }

    /// Swaps node `i`'s output into node `i + 1`'s input.
    fn pass_down(&mut self, i: usize) {
        let (a, b) = self.nodes.split_at_mut(i + 1);
        mem::swap(&mut a[i].output, &mut b[0].input);
        a[i].output.clear();
    }

    /// Drives the chain. Leaves it either empty (all nodes drained, more input needed) or
    /// processing (the end node holds output, returned in `out`).
    fn process_chain(&mut self, out: &mut Chunk) -> Result<bool> {
        let mut allow_rebuild = false;

        // When the chain is empty processing starts from the head; otherwise the tail holds
        // the current data.
        let mut cursor: isize =
            if self.chain_is_empty() { 0 } else { (self.nodes.len() - 1) as isize };

        // Drop the new stream state once it was reported.
        if !self.chain_is_empty() {
            self.is_new_stream = false;
        }

        while cursor >= 0 {
            let i = cursor as usize;
            let last = self.nodes.len() - 1;

            // Chain rebuild is only initiated from the source end moving down; flushing in
            // the middle of the chain must never trigger another rebuild above it.
            if i == 0 {
                allow_rebuild = true;
            }

            // The end sentinel only hands data out.
            if i == last {
                let node = &mut self.nodes[i];

                if node.flushing {
                    node.state = NodeState::Init;
                    node.flushing = false;
                    cursor -= 1;
                    continue;
                }

                let produced = {
                    let GraphNode { filter, input, output, .. } = node;
                    filter.process(input, output)?
                };
                if !produced {
                    node.state = NodeState::Empty;
                    cursor -= 1;
                    continue;
                }

                node.state = NodeState::Processing;
                mem::swap(out, &mut node.output);
                node.output.clear();
                return Ok(true);
            }

            match self.nodes[i].state {
                NodeState::Init | NodeState::Empty | NodeState::Processing => {
                    if self.nodes[i].flushing {
                        let flushed = {
                            let GraphNode { filter, output, .. } = &mut self.nodes[i];
                            filter.flush(output)?
                        };
                        if !flushed {
                            // Done flushing this node.
                            self.nodes[i].filter.reset();
                            self.nodes[i].flushing = false;
                            if self.nodes[i + 1].state == NodeState::Init {
                                // Nothing to flush downstream, go up.
                                self.nodes[i].state = NodeState::Init;
                                cursor -= 1;
                            }
                            else {
                                self.nodes[i].state = NodeState::DoneFlushing;
                                self.nodes[i + 1].flushing = true;
                                cursor += 1;
                            }
                            continue;
                        }
                    }
                    else {
                        let produced = {
                            let GraphNode { filter, input, output, .. } = &mut self.nodes[i];
                            filter.process(input, output)?
                        };
                        if !produced {
                            // No data, go up for more input.
                            self.nodes[i].state = NodeState::Empty;
                            cursor -= 1;
                            continue;
                        }

                        // Check the chain against the plan.
                        if allow_rebuild && self.nodes[i].rebuild == Rebuild::Check {
                            let desired = self
                                .plan
                                .next_id(self.nodes[i].tag, self.nodes[i].filter.get_output());
                            let actual = self.nodes[i + 1].tag;
                            let same = match desired {
                                NextNode::End => actual == NodeTag::End,
                                NextNode::Filter(id) => actual == NodeTag::Filter(id),
                                NextNode::Unsupported => false,
                            };
                            self.nodes[i].rebuild =
                                if same { Rebuild::No } else { Rebuild::Do };
                        }
                    }

                    // Rebuild the chain tail when the plan demands it or the filter reports a
                    // new stream. Downstream must finish flushing first.
                    if self.nodes[i].rebuild == Rebuild::Do || self.nodes[i].filter.new_stream()
                    {
                        self.nodes[i].state = NodeState::Rebuild;
                        if self.nodes[i + 1].state != NodeState::Init {
                            self.nodes[i + 1].flushing = true;
                            cursor += 1;
                        }
                        continue;
                    }

                    // Pass the data downstream.
                    self.nodes[i].state = NodeState::Processing;
                    self.pass_down(i);
                    cursor += 1;
                }

                NodeState::Rebuild => {
                    // Downstream has finished flushing. Rebuild the tail and send the data of
                    // the new format (left over from the processing state) down.
                    self.build_chain(i)?;

                    self.is_new_stream = true;
                    self.nodes[i].state = NodeState::Processing;
                    self.nodes[i].rebuild = Rebuild::No;
                    self.pass_down(i);
                    cursor += 1;
                }

                NodeState::DoneFlushing => {
                    // Downstream was flushed. Go up for more data.
                    self.nodes[i].state = NodeState::Init;
                    cursor -= 1;
                }
            }
        }

        Ok(false)
    }
}

impl<P: GraphPlan> Filter for FilterGraph<P> {
    fn name(&self) -> &'static str {
        "FilterGraph"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        self.plan.next_id(NodeTag::Start, spk) != NextNode::Unsupported
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("graph: no filter accepts the input format");
        }

        self.destroy();
        self.nodes[0].filter.open(spk)?;
        self.build_chain(0)
    }

    fn close(&mut self) {
        if self.is_open() {
            self.destroy();
            self.nodes[0].filter.close();
            self.nodes.last_mut().unwrap().filter.close();
        }
    }

    fn is_open(&self) -> bool {
        self.nodes[0].filter.is_open()
    }

    fn get_input(&self) -> Speakers {
        self.nodes[0].filter.get_input()
    }

    fn get_output(&self) -> Speakers {
        self.nodes[self.nodes.len() - 2].filter.get_output()
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        if !self.chain_is_empty() && self.process_chain(output)? {
            return Ok(true);
        }

        if input.is_empty() {
            return Ok(false);
        }

        mem::swap(&mut self.nodes[0].input, input);
        input.clear();
        self.process_chain(output)
    }

    fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
        self.nodes[0].flushing = true;
        self.process_chain(output)
    }

    fn reset(&mut self) {
        self.is_new_stream = false;

        let mut i = 0;
        while i < self.nodes.len() {
            self.nodes[i].filter.reset();
            self.nodes[i].state = NodeState::Init;
            self.nodes[i].flushing = false;
            self.nodes[i].input.clear();
            self.nodes[i].output.clear();

            if self.nodes[i].rebuild != Rebuild::No && self.nodes[i].tag != NodeTag::End {
                let desired =
                    self.plan.next_id(self.nodes[i].tag, self.nodes[i].filter.get_output());
                let actual = self.nodes[i + 1].tag;
                let same = match desired {
                    NextNode::End => actual == NodeTag::End,
                    NextNode::Filter(id) => actual == NodeTag::Filter(id),
                    NextNode::Unsupported => false,
                };
                if !same {
                    // A failed rebuild leaves the graph unusable; the caller must reopen.
                    if self.build_chain(i).is_err() {
                        self.destroy();
                    }
                    return;
                }
                self.nodes[i].rebuild = Rebuild::No;
            }
            i += 1;
        }
    }

    fn new_stream(&self) -> bool {
        self.is_new_stream
    }
}

/// A linear chain of user-supplied filters built on [`FilterGraph`].
///
/// Filters may be added and removed while streaming: the change schedules a graceful rebuild,
/// and affected filters are flushed before leaving the chain. [`FilterChain::destroy_chain`]
/// is the immediate variant that interrupts processing and drops buffered data.
pub struct ChainPlan {
    entries: Vec<(FilterId, Option<Box<dyn Filter>>)>,
    counter: FilterId,
}

impl ChainPlan {
    fn position(&self, id: FilterId) -> Option<usize> {
        self.entries.iter().position(|(eid, _)| *eid == id)
    }
}

impl GraphPlan for ChainPlan {
    fn next_id(&self, from: NodeTag, _spk: Speakers) -> NextNode {
        let idx = match from {
            NodeTag::Start => 0,
            NodeTag::Filter(id) => match self.position(id) {
                Some(p) => p + 1,
                None => return NextNode::Unsupported,
            },
            NodeTag::End => return NextNode::Unsupported,
        };
        match self.entries.get(idx) {
            Some((id, _)) => NextNode::Filter(*id),
            None => NextNode::End,
        }
    }

    fn init_filter(&mut self, id: FilterId, _spk: Speakers) -> Result<Box<dyn Filter>> {
        self.entries
            .iter_mut()
            .find(|(eid, _)| *eid == id)
            .and_then(|(_, filter)| filter.take())
            .ok_or(Error::ChainRebuildError("chain filter is not available"))
    }

    fn uninit_filter(&mut self, id: FilterId, filter: Box<dyn Filter>) {
        // A filter removed from the chain while in flight is dropped here.
        if let Some((_, slot)) = self.entries.iter_mut().find(|(eid, _)| *eid == id) {
            *slot = Some(filter);
        }
    }
}

pub struct FilterChain {
    graph: FilterGraph<ChainPlan>,
}

impl Default for FilterChain {
    fn default() -> Self {
        FilterChain::new()
    }
}

impl FilterChain {
    pub fn new() -> Self {
        FilterChain { graph: FilterGraph::new(ChainPlan { entries: Vec::new(), counter: 1 }) }
    }

    /// Appends a filter to the chain tail. Returns its id.
    pub fn add_back(&mut self, filter: Box<dyn Filter>) -> FilterId {
        let plan = self.graph.plan_mut();
        let id = plan.counter;
        plan.counter += 1;
        plan.entries.push((id, Some(filter)));
        self.graph.invalidate();
        id
    }

    /// Inserts a filter at the chain head. Returns its id.
    pub fn add_front(&mut self, filter: Box<dyn Filter>) -> FilterId {
        let plan = self.graph.plan_mut();
        let id = plan.counter;
        plan.counter += 1;
        plan.entries.insert(0, (id, Some(filter)));
        self.graph.invalidate();
        id
    }

    /// Removes a filter. An in-flight filter keeps processing until the scheduled rebuild
    /// flushes it out of the chain.
    pub fn remove(&mut self, id: FilterId) {
        let plan = self.graph.plan_mut();
        if let Some(pos) = plan.position(id) {
            plan.entries.remove(pos);
        }
        self.graph.invalidate();
    }

    /// Removes all filters, scheduling a graceful rebuild.
    pub fn clear(&mut self) {
        self.graph.plan_mut().entries.clear();
        self.graph.invalidate();
    }

    /// Destroys the chain immediately, dropping all buffered data.
    pub fn destroy_chain(&mut self) {
        self.graph.destroy();
        self.graph.plan_mut().entries.clear();
    }

    pub fn chain_text(&self) -> String {
        self.graph.chain_text()
    }
}

impl Filter for FilterChain {
    fn name(&self) -> &'static str {
        "FilterChain"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{layout, Format, SampleBuf};
    use crate::generator::NoiseGen;

    /// Multiplies linear samples by a constant. Stateless.
    struct GainFilter {
        gain: f64,
        spk: Speakers,
        open: bool,
    }

    impl GainFilter {
        fn new(gain: f64) -> Self {
            GainFilter { gain, spk: Speakers::UNKNOWN, open: false }
        }
    }

    impl Filter for GainFilter {
        fn name(&self) -> &'static str {
            "Gain"
        }

        fn can_open(&self, spk: Speakers) -> bool {
            spk.format == Format::Linear
        }

        fn open(&mut self, spk: Speakers) -> Result<()> {
            self.spk = spk;
            self.open = true;
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
            self.spk = Speakers::UNKNOWN;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn get_input(&self) -> Speakers {
            self.spk
        }

        fn get_output(&self) -> Speakers {
            self.spk
        }

        fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
            if input.is_empty() {
                return Ok(false);
            }
            mem::swap(input, output);
            input.clear();
            if let Some(buf) = output.linear_mut() {
                for row in buf.channels_mut() {
                    for s in row.iter_mut() {
                        *s *= self.gain;
                    }
                }
            }
            Ok(true)
        }

        fn reset(&mut self) {}
    }

    /// Accumulates samples and emits fixed-size blocks; the remainder comes out on flush.
    struct Chunker {
        block: usize,
        buf: Vec<f64>,
        out: SampleBuf,
        spk: Speakers,
        open: bool,
    }

    impl Chunker {
        fn new(block: usize) -> Self {
            Chunker {
                block,
                buf: Vec::new(),
                out: SampleBuf::default(),
                spk: Speakers::UNKNOWN,
                open: false,
            }
        }

        fn emit(&mut self, n: usize, output: &mut Chunk) {
            self.out.resize(1, n);
            self.out.chan_mut(0).copy_from_slice(&self.buf[..n]);
            self.buf.drain(..n);
            output.clear();
            output.set_linear(&self.out);
        }
    }

    impl Filter for Chunker {
        fn name(&self) -> &'static str {
            "Chunker"
        }

        fn can_open(&self, spk: Speakers) -> bool {
            spk.format == Format::Linear && spk.nch() == 1
        }

        fn open(&mut self, spk: Speakers) -> Result<()> {
            self.spk = spk;
            self.open = true;
            self.buf.clear();
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
            self.buf.clear();
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn get_input(&self) -> Speakers {
            self.spk
        }

        fn get_output(&self) -> Speakers {
            self.spk
        }

        fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
            if let Some(buf) = input.linear() {
                self.buf.extend_from_slice(buf.chan(0));
            }
            input.clear();

            if self.buf.len() >= self.block {
                let n = self.block;
                self.emit(n, output);
                return Ok(true);
            }
            Ok(false)
        }

        fn flush(&mut self, output: &mut Chunk) -> Result<bool> {
            if self.buf.is_empty() {
                return Ok(false);
            }
            let n = self.buf.len().min(self.block);
            self.emit(n, output);
            Ok(true)
        }

        fn reset(&mut self) {
            self.buf.clear();
        }
    }

    fn mono_spk() -> Speakers {
        Speakers::new(Format::Linear, layout::MONO, 48000)
    }

    fn mono_chunk(data: &[f64]) -> Chunk {
        let mut buf = SampleBuf::new(1, data.len());
        buf.chan_mut(0).copy_from_slice(data);
        let mut chunk = Chunk::new();
        chunk.set_linear(&buf);
        chunk
    }

    /// Drains everything a graph produces for one input chunk.
    fn pump(chain: &mut FilterChain, input: &mut Chunk, collected: &mut Vec<f64>) -> u32 {
        let mut streams = 0;
        let mut output = Chunk::new();
        while chain.process(input, &mut output).unwrap() {
            if chain.new_stream() {
                streams += 1;
            }
            if let Some(buf) = output.linear() {
                collected.extend_from_slice(buf.chan(0));
            }
            output.clear();
        }
        streams
    }

    fn pump_flush(chain: &mut FilterChain, collected: &mut Vec<f64>) -> u32 {
        let mut streams = 0;
        let mut output = Chunk::new();
        while chain.flush(&mut output).unwrap() {
            if chain.new_stream() {
                streams += 1;
            }
            if let Some(buf) = output.linear() {
                collected.extend_from_slice(buf.chan(0));
            }
            output.clear();
        }
        streams
    }

    #[test]
    fn empty_chain_passes_through() {
        let mut chain = FilterChain::new();
        chain.open(mono_spk()).unwrap();

        let data = [1.0, 2.0, 3.0];
        let mut out = Vec::new();
        pump(&mut chain, &mut mono_chunk(&data), &mut out);
        assert_eq!(out, data);
    }

    #[test]
    fn gains_compose() {
        let mut chain = FilterChain::new();
        chain.add_back(Box::new(GainFilter::new(2.0)));
        chain.add_back(Box::new(GainFilter::new(3.0)));
        chain.open(mono_spk()).unwrap();

        let mut out = Vec::new();
        pump(&mut chain, &mut mono_chunk(&[1.0, -1.0]), &mut out);
        assert_eq!(out, [6.0, -6.0]);
    }

    #[test]
    fn open_close_is_reversible() {
        let mut chain = FilterChain::new();
        chain.add_back(Box::new(GainFilter::new(2.0)));

        assert!(chain.can_open(mono_spk()));
        chain.open(mono_spk()).unwrap();
        assert!(chain.is_open());
        chain.close();
        assert!(!chain.is_open());
        chain.open(mono_spk()).unwrap();
        assert!(chain.is_open());
    }

    #[test]
    fn flush_drains_buffered_tail() {
        let mut chain = FilterChain::new();
        chain.add_back(Box::new(Chunker::new(100)));
        chain.open(mono_spk()).unwrap();

        let mut noise = NoiseGen::new(17);
        let mut input = vec![0.0; 250];
        noise.fill(&mut input);

        let mut out = Vec::new();
        pump(&mut chain, &mut mono_chunk(&input[..130]), &mut out);
        pump(&mut chain, &mut mono_chunk(&input[130..]), &mut out);
        assert_eq!(out.len(), 200);

        pump_flush(&mut chain, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn hot_remove_equals_fresh_chain() {
        // A chain A -> B -> C with B removed mid-stream produces, after the rebuild, the
        // same concatenated output as a fresh A -> C chain fed the same data, and raises
        // new_stream exactly once at the rebuild boundary.
        let mut noise = NoiseGen::new(99);
        let mut first = vec![0.0; 300];
        let mut second = vec![0.0; 300];
        noise.fill(&mut first);
        noise.fill(&mut second);

        let mut chain = FilterChain::new();
        let _a = chain.add_back(Box::new(GainFilter::new(2.0)));
        let b = chain.add_back(Box::new(GainFilter::new(3.0)));
        let _c = chain.add_back(Box::new(GainFilter::new(5.0)));
        chain.open(mono_spk()).unwrap();

        let mut out = Vec::new();
        let mut streams = pump(&mut chain, &mut mono_chunk(&first), &mut out);
        assert!(out.iter().zip(first.iter()).all(|(y, x)| *y == x * 30.0));

        chain.remove(b);
        let before = out.len();
        streams += pump(&mut chain, &mut mono_chunk(&second), &mut out);
        streams += pump_flush(&mut chain, &mut out);

        // Reference: a fresh A -> C chain over the second part.
        let mut fresh = FilterChain::new();
        fresh.add_back(Box::new(GainFilter::new(2.0)));
        fresh.add_back(Box::new(GainFilter::new(5.0)));
        fresh.open(mono_spk()).unwrap();
        let mut reference = Vec::new();
        pump(&mut fresh, &mut mono_chunk(&second), &mut reference);

        assert_eq!(&out[before..], &reference[..]);
        assert_eq!(streams, 1);
    }

    #[test]
    fn hot_add_rebuilds_gracefully() {
        let mut chain = FilterChain::new();
        chain.add_back(Box::new(GainFilter::new(2.0)));
        chain.open(mono_spk()).unwrap();

        let mut out = Vec::new();
        pump(&mut chain, &mut mono_chunk(&[1.0]), &mut out);
        assert_eq!(out, [2.0]);

        chain.add_back(Box::new(GainFilter::new(10.0)));
        out.clear();
        pump(&mut chain, &mut mono_chunk(&[1.0]), &mut out);
        pump_flush(&mut chain, &mut out);
        assert_eq!(out, [20.0]);
    }

    #[test]
    fn buffered_data_survives_removal() {
        // Removing a buffering filter flushes it: no sample may be lost across the rebuild.
        let mut noise = NoiseGen::new(5);
        let mut input = vec![0.0; 350];
        noise.fill(&mut input);

        let mut chain = FilterChain::new();
        let chunker = chain.add_back(Box::new(Chunker::new(100)));
        chain.open(mono_spk()).unwrap();

        let mut out = Vec::new();
        pump(&mut chain, &mut mono_chunk(&input[..250]), &mut out);
        assert_eq!(out.len(), 200);

        // 50 samples are buffered inside the chunker. Remove it; they must drain before the
        // chain becomes a straight wire.
        chain.remove(chunker);
        pump(&mut chain, &mut mono_chunk(&input[250..]), &mut out);
        pump_flush(&mut chain, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn reset_produces_identical_run() {
        let mut noise = NoiseGen::new(23);
        let mut input = vec![0.0; 256];
        noise.fill(&mut input);

        let mut chain = FilterChain::new();
        chain.add_back(Box::new(Chunker::new(64)));
        chain.add_back(Box::new(GainFilter::new(0.5)));
        chain.open(mono_spk()).unwrap();

        let mut first = Vec::new();
        pump(&mut chain, &mut mono_chunk(&input), &mut first);
        pump_flush(&mut chain, &mut first);

        chain.reset();
        let mut second = Vec::new();
        pump(&mut chain, &mut mono_chunk(&input), &mut second);
        pump_flush(&mut chain, &mut second);

        assert_eq!(first, second);
    }
}
