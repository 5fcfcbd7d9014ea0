// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The DVD playback graph: demux, detect, decode, process, and the S/PDIF output paths.

use std::cell::Cell;
use std::mem;
use std::sync::Arc;

use log::debug;

use cadenza_core::audio::{layout, Format, Speakers};
use cadenza_core::chunk::Chunk;
use cadenza_core::errors::{bad_format_error, Result};
use cadenza_core::filter::Filter;
use cadenza_core::filters::Dejitter;
use cadenza_core::graph::{FilterGraph, FilterId, GraphPlan, NextNode, NodeTag};
use cadenza_core::parser::DecoderRegistry;

use cadenza_formats::pes::PesDemux;
use cadenza_formats::spdif::{Despdifer, Spdifer};

use crate::decoder::AudioDecoder;
use crate::detector::FormatDetector;
use crate::proc::{user2output, AudioProcessor, BassSettings};

/// Downstream audio sink capabilities, queried during S/PDIF planning and PCM format
/// agreement.
pub trait Sink {
    fn can_open(&self, spk: Speakers) -> bool;

    /// The sink's currently negotiated format, used as a last resort during format
    /// agreement.
    fn get_input(&self) -> Speakers {
        Speakers::UNKNOWN
    }
}

/// Binds an external AC-3 encoder into the S/PDIF encode path.
pub trait EncoderFactory {
    fn can_encode(&self, spk: Speakers) -> bool;
    fn make(&self, spk: Speakers, bitrate: u32) -> Result<Box<dyn Filter>>;
}

/// The S/PDIF output decision for the current stream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SpdifMode {
    /// No data seen yet.
    #[default]
    None,
    /// S/PDIF output is off or rejected; plain decode is used.
    Disabled,
    /// The compressed stream is wrapped and passed through.
    Passthrough,
    /// Decoded audio is re-encoded to AC-3 for S/PDIF output.
    Encode,
}

/// Why S/PDIF output was rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpdifReason {
    /// The format is not allowed for passthrough.
    Format,
    /// The sample rate is not allowed on the S/PDIF output.
    SampleRate,
    /// The sink refused the S/PDIF format.
    Sink,
    /// The AC-3 encoder is disabled.
    EncoderDisabled,
    /// The encoder does not support the format.
    Encoder,
    /// Stereo and mono PCM is configured to stay PCM.
    StereoPcm,
    /// The format to encode could not be determined.
    Proc,
}

type SpdifCheck = std::result::Result<(), SpdifReason>;

const NODE_DEMUX: FilterId = 1;
const NODE_DETECTOR: FilterId = 2;
const NODE_SPDIF_PT: FilterId = 3;
const NODE_DECODE: FilterId = 4;
const NODE_PROC: FilterId = 5;
const NODE_PROC_ENC: FilterId = 6;
const NODE_ENCODE: FilterId = 7;
const NODE_SPDIF_ENC: FilterId = 8;
const NODE_SPDIF2PCM: FilterId = 9;
const NODE_DEJITTER: FilterId = 10;
const NODE_DESPDIF: FilterId = 11;

/// Relabels an S/PDIF stream as its PCM16 stereo carrier, for sinks driven in PCM mode.
struct Spdif2Pcm {
    spk: Speakers,
    open: bool,
}

impl Spdif2Pcm {
    fn new() -> Self {
        Spdif2Pcm { spk: Speakers::UNKNOWN, open: false }
    }
}

impl Filter for Spdif2Pcm {
    fn name(&self) -> &'static str {
        "Spdif2Pcm"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        spk.format == Format::Spdif
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        if !self.can_open(spk) {
            return bad_format_error("spdif2pcm: input is not spdif");
        }
        self.spk = spk;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
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
        if self.open {
            Speakers::new(Format::Pcm16, layout::STEREO, self.spk.sample_rate)
        }
        else {
            Speakers::UNKNOWN
        }
    }

    fn process(&mut self, input: &mut Chunk, output: &mut Chunk) -> Result<bool> {
        if input.is_empty() {
            return Ok(false);
        }
        mem::swap(input, output);
        input.clear();
        Ok(true)
    }

    fn reset(&mut self) {}
}

/// Options and shared filters of the DVD graph plan.
pub struct DvdPlan {
    pub user_spk: Speakers,
    pub use_spdif: bool,
    pub use_detector: bool,
    /// Formats allowed for S/PDIF passthrough, as a bitmask of [`Format::mask`] values.
    pub spdif_pt: u32,
    pub spdif_as_pcm: bool,
    pub spdif_encode: bool,
    pub spdif_stereo_pt: bool,
    pub spdif_bitrate: u32,
    pub spdif_check_sr: bool,
    pub spdif_allow_48: bool,
    pub spdif_allow_44: bool,
    pub spdif_allow_32: bool,
    pub query_sink: bool,
    pub bass: BassSettings,

    registry: Arc<DecoderRegistry>,
    sink: Option<Box<dyn Sink>>,
    encoder: Option<Box<dyn EncoderFactory>>,

    spdif_status: Cell<SpdifMode>,
    spdif_err: Cell<Option<SpdifReason>>,
}

impl DvdPlan {
    pub fn new(registry: Arc<DecoderRegistry>) -> Self {
        DvdPlan {
            user_spk: Speakers::new(Format::Pcm16, Default::default(), 0),
            use_spdif: false,
            use_detector: false,
            spdif_pt: Format::Ac3.mask(),
            spdif_as_pcm: false,
            spdif_encode: true,
            spdif_stereo_pt: true,
            spdif_bitrate: 640_000,
            spdif_check_sr: false,
            spdif_allow_48: true,
            spdif_allow_44: false,
            spdif_allow_32: false,
            query_sink: true,
            bass: BassSettings::default(),
            registry,
            sink: None,
            encoder: None,
            spdif_status: Cell::new(SpdifMode::None),
            spdif_err: Cell::new(None),
        }
    }

    pub fn set_sink(&mut self, sink: Option<Box<dyn Sink>>) {
        self.sink = sink;
    }

    pub fn set_encoder(&mut self, encoder: Option<Box<dyn EncoderFactory>>) {
        self.encoder = encoder;
    }

    fn can_decode(&self, spk: Speakers) -> bool {
        self.registry.supports(spk.format)
    }

    fn can_process(&self, spk: Speakers) -> bool {
        (spk.is_linear() || spk.format.is_pcm()) && spk.nch() > 0 && spk.sample_rate != 0
    }

    fn spdif_rate_allowed(&self, sample_rate: u32) -> bool {
        if !self.spdif_check_sr || sample_rate == 0 {
            return true;
        }
        (self.spdif_allow_48 && sample_rate == 48000)
            || (self.spdif_allow_44 && sample_rate == 44100)
            || (self.spdif_allow_32 && sample_rate == 32000)
    }

    /// S/PDIF check one: can this compressed stream be passed through as is?
    pub fn check_spdif_passthrough(&self, spk: Speakers) -> SpdifCheck {
        if !self.use_spdif {
            return Err(SpdifReason::Format);
        }
        if self.spdif_pt & spk.format.mask() == 0 {
            return Err(SpdifReason::Format);
        }
        if !self.spdif_rate_allowed(spk.sample_rate) {
            return Err(SpdifReason::SampleRate);
        }
        if let Some(sink) = &self.sink {
            if self.query_sink
                && !self.spdif_as_pcm
                && !sink.can_open(Speakers::new(Format::Spdif, spk.mask, spk.sample_rate))
            {
                return Err(SpdifReason::Sink);
            }
        }
        Ok(())
    }

    /// S/PDIF check two: can decoded audio be re-encoded for S/PDIF output?
    pub fn check_spdif_encode(&self, spk: Speakers) -> SpdifCheck {
        if !self.use_spdif {
            return Err(SpdifReason::Format);
        }
        if !self.spdif_encode {
            return Err(SpdifReason::EncoderDisabled);
        }

        let enc_spk = user2output(spk, self.user_spk);
        if enc_spk.is_unknown() {
            return Err(SpdifReason::Proc);
        }
        let enc_spk = enc_spk.with_format(Format::Linear);

        // Plain stereo or mono PCM commonly stays PCM.
        if self.spdif_stereo_pt && (enc_spk.mask == layout::STEREO || enc_spk.mask == layout::MONO)
        {
            return Err(SpdifReason::StereoPcm);
        }

        if !self.spdif_rate_allowed(enc_spk.sample_rate) {
            return Err(SpdifReason::SampleRate);
        }

        match &self.encoder {
            None => return Err(SpdifReason::EncoderDisabled),
            Some(encoder) => {
                if !encoder.can_encode(enc_spk) {
                    return Err(SpdifReason::Encoder);
                }
            }
        }

        if let Some(sink) = &self.sink {
            if self.query_sink
                && !self.spdif_as_pcm
                && !sink.can_open(Speakers::new(
                    Format::Spdif,
                    enc_spk.mask,
                    enc_spk.sample_rate,
                ))
            {
                return Err(SpdifReason::Sink);
            }
        }

        Ok(())
    }

    /// Agrees a PCM output format with the sink: try the user format, then downgrade the
    /// sample format, then drop to stereo, then take the sink's own format.
    pub fn agree_output_pcm(&self, spk: Speakers, user_spk: Speakers) -> Speakers {
        let sink = match (&self.sink, self.query_sink) {
            (Some(sink), true) => sink,
            _ => return user_spk,
        };

        let mut want = spk;
        if user_spk.format != Format::Unknown {
            want.format = user_spk.format;
            want.level = user_spk.level;
        }
        if !user_spk.mask.is_empty() {
            want.mask = user_spk.mask;
        }
        if user_spk.sample_rate != 0 {
            want.sample_rate = user_spk.sample_rate;
        }
        want.relation = user_spk.relation;

        if sink.can_open(want) {
            return want;
        }

        // Downgrade the sample format, then also the channel configuration.
        for pass in 0..2 {
            let mut e = want;
            if pass > 0 {
                e.mask = layout::STEREO;
            }
            loop {
                if sink.can_open(e) {
                    return e;
                }
                e.format = match e.format {
                    Format::Linear => Format::PcmFloat,
                    Format::PcmFloat => Format::Pcm32,
                    Format::Pcm32 => Format::Pcm24,
                    Format::Pcm24 => Format::Pcm16,
                    Format::Pcm32Be => Format::Pcm24Be,
                    Format::Pcm24Be => Format::Pcm16Be,
                    _ => Format::Unknown,
                };
                if e.format == Format::Unknown {
                    break;
                }
                e.level = e.format.default_level();
            }
        }

        // Surrender to whatever the sink already runs at.
        let sink_spk = sink.get_input();
        if !sink_spk.is_unknown() {
            return sink_spk;
        }
        user_spk
    }

    fn check_spdif_passthrough_tracked(&self, spk: Speakers) -> bool {
        match self.check_spdif_passthrough(spk) {
            Ok(()) => true,
            Err(reason) => {
                self.spdif_err.set(Some(reason));
                false
            }
        }
    }

    fn check_spdif_encode_tracked(&self, spk: Speakers) -> bool {
        match self.check_spdif_encode(spk) {
            Ok(()) => true,
            Err(reason) => {
                self.spdif_err.set(Some(reason));
                false
            }
        }
    }
}

impl GraphPlan for DvdPlan {
    fn next_id(&self, from: NodeTag, spk: Speakers) -> NextNode {
        // Planning runs top down: when a node is asked for its successor, every upstream
        // filter is already initialised, so the S/PDIF status written by init_filter is
        // valid here.
        match from {
            NodeTag::Start => {
                if spk.format == Format::Pes {
                    return NextNode::Filter(NODE_DEMUX);
                }
                if self.use_detector
                    && spk.format == Format::Pcm16
                    && spk.mask == layout::STEREO
                {
                    return NextNode::Filter(NODE_DETECTOR);
                }
                self.route_stream(spk)
            }

            NodeTag::Filter(NODE_DEMUX) | NodeTag::Filter(NODE_DETECTOR) => {
                // PCM16 may have been detected as a program stream carrier.
                if spk.format == Format::Pes {
                    return NextNode::Filter(NODE_DEMUX);
                }
                self.route_stream(spk)
            }

            NodeTag::Filter(NODE_SPDIF_PT) | NodeTag::Filter(NODE_SPDIF_ENC) => {
                // The spdifer falls back to the naked stream when a frame cannot be
                // wrapped; decode it then.
                if spk.format != Format::Spdif {
                    if self.can_decode(spk) {
                        return NextNode::Filter(NODE_DECODE);
                    }
                    return NextNode::Unsupported;
                }
                if self.spdif_as_pcm {
                    NextNode::Filter(NODE_SPDIF2PCM)
                }
                else {
                    NextNode::Filter(NODE_DEJITTER)
                }
            }

            NodeTag::Filter(NODE_DECODE) => {
                if self.can_process(spk) {
                    if self.check_spdif_encode_tracked(spk) {
                        return NextNode::Filter(NODE_PROC_ENC);
                    }
                    return NextNode::Filter(NODE_PROC);
                }
                NextNode::Unsupported
            }

            NodeTag::Filter(NODE_PROC) => NextNode::Filter(NODE_DEJITTER),

            NodeTag::Filter(NODE_PROC_ENC) => NextNode::Filter(NODE_ENCODE),

            NodeTag::Filter(NODE_ENCODE) => NextNode::Filter(NODE_SPDIF_ENC),

            NodeTag::Filter(NODE_SPDIF2PCM) => NextNode::Filter(NODE_DEJITTER),

            NodeTag::Filter(NODE_DEJITTER) => NextNode::End,

            NodeTag::Filter(NODE_DESPDIF) => self.route_stream(spk),

            _ => NextNode::Unsupported,
        }
    }

    fn init_filter(&mut self, id: FilterId, spk: Speakers) -> Result<Box<dyn Filter>> {
        match id {
            NODE_DEMUX => Ok(Box::new(PesDemux::new())),
            NODE_DETECTOR => Ok(Box::new(FormatDetector::new())),
            NODE_SPDIF_PT => {
                self.spdif_status.set(SpdifMode::Passthrough);
                debug!(target: "cadenza::dvd", "spdif passthrough for {}", spk);
                Ok(Box::new(Spdifer::new()))
            }
            NODE_DECODE => Ok(Box::new(AudioDecoder::new(self.registry.clone()))),
            NODE_PROC => {
                // Reaching the plain processing path means S/PDIF output is off or was
                // rejected for this stream.
                self.spdif_status.set(SpdifMode::Disabled);
                let agreed = self.agree_output_pcm(spk, self.user_spk);
                let mut proc = AudioProcessor::new();
                proc.set_bass(self.bass)?;
                proc.set_user(agreed)?;
                Ok(Box::new(proc))
            }
            NODE_PROC_ENC => {
                self.spdif_status.set(SpdifMode::Encode);
                let user = self.user_spk.with_format(Format::Linear);
                let mut proc = AudioProcessor::new();
                proc.set_bass(self.bass)?;
                proc.set_user(user)?;
                Ok(Box::new(proc))
            }
            NODE_ENCODE => match &self.encoder {
                Some(encoder) => encoder.make(spk, self.spdif_bitrate),
                None => bad_format_error("dvd graph: no encoder bound"),
            },
            NODE_SPDIF_ENC => Ok(Box::new(Spdifer::new())),
            NODE_SPDIF2PCM => Ok(Box::new(Spdif2Pcm::new())),
            NODE_DESPDIF => Ok(Box::new(Despdifer::new())),
            NODE_DEJITTER => Ok(Box::new(Dejitter::new())),
            _ => bad_format_error("dvd graph: unknown node"),
        }
    }
}

impl DvdPlan {
    /// Routes a concrete elementary stream: passthrough, decode, or straight processing.
    fn route_stream(&self, spk: Speakers) -> NextNode {
        // Data already carrying IEC 61937 framing is unwrapped first; the elementary stream
        // is then routed like any other.
        if spk.format == Format::Spdif {
            return NextNode::Filter(NODE_DESPDIF);
        }
        if self.check_spdif_passthrough_tracked(spk) {
            return NextNode::Filter(NODE_SPDIF_PT);
        }
        if self.can_decode(spk) {
            return NextNode::Filter(NODE_DECODE);
        }
        if self.can_process(spk) {
            if self.check_spdif_encode_tracked(spk) {
                return NextNode::Filter(NODE_PROC_ENC);
            }
            return NextNode::Filter(NODE_PROC);
        }
        NextNode::Unsupported
    }
}

/// The complete DVD playback graph.
pub struct DvdGraph {
    graph: FilterGraph<DvdPlan>,
}

impl DvdGraph {
    pub fn new(registry: Arc<DecoderRegistry>) -> Self {
        DvdGraph { graph: FilterGraph::new(DvdPlan::new(registry)) }
    }

    pub fn plan(&self) -> &DvdPlan {
        self.graph.plan()
    }

    /// The S/PDIF decision taken for the current stream.
    pub fn spdif_status(&self) -> SpdifMode {
        self.graph.plan().spdif_status.get()
    }

    /// Why S/PDIF output was last rejected, if it was.
    pub fn spdif_err(&self) -> Option<SpdifReason> {
        self.graph.plan().spdif_err.get()
    }

    pub fn set_user(&mut self, user_spk: Speakers) {
        if self.graph.plan().user_spk != user_spk {
            self.graph.plan_mut().user_spk = user_spk;
            self.graph.rebuild_node(NODE_PROC);
            self.graph.rebuild_node(NODE_PROC_ENC);
            self.graph.rebuild_node(NODE_DETECTOR);
        }
    }

    pub fn user(&self) -> Speakers {
        self.graph.plan().user_spk
    }

    pub fn set_use_spdif(&mut self, use_spdif: bool) {
        self.graph.plan_mut().use_spdif = use_spdif;
        self.graph.invalidate();
    }

    pub fn set_spdif_pt(&mut self, spdif_pt: u32) {
        self.graph.plan_mut().spdif_pt = spdif_pt;
        self.graph.invalidate();
    }

    pub fn set_use_detector(&mut self, use_detector: bool) {
        self.graph.plan_mut().use_detector = use_detector;
        self.graph.invalidate();
    }

    pub fn set_spdif_options(
        &mut self,
        as_pcm: bool,
        encode: bool,
        stereo_pt: bool,
        bitrate: u32,
    ) {
        let plan = self.graph.plan_mut();
        plan.spdif_as_pcm = as_pcm;
        plan.spdif_encode = encode;
        plan.spdif_stereo_pt = stereo_pt;
        plan.spdif_bitrate = bitrate;
        self.graph.invalidate();
    }

    pub fn set_spdif_sample_rates(
        &mut self,
        check: bool,
        allow_48: bool,
        allow_44: bool,
        allow_32: bool,
    ) {
        let plan = self.graph.plan_mut();
        plan.spdif_check_sr = check;
        plan.spdif_allow_48 = allow_48;
        plan.spdif_allow_44 = allow_44;
        plan.spdif_allow_32 = allow_32;
        self.graph.invalidate();
    }

    pub fn set_bass(&mut self, bass: BassSettings) {
        self.graph.plan_mut().bass = bass;
        self.graph.rebuild_node(NODE_PROC);
        self.graph.rebuild_node(NODE_PROC_ENC);
    }

    pub fn set_sink(&mut self, sink: Option<Box<dyn Sink>>) {
        self.graph.plan_mut().set_sink(sink);
        self.graph.invalidate();
    }

    pub fn set_encoder(&mut self, encoder: Option<Box<dyn EncoderFactory>>) {
        self.graph.plan_mut().set_encoder(encoder);
        self.graph.invalidate();
    }

    pub fn chain_text(&self) -> String {
        self.graph.chain_text()
    }
}

impl Filter for DvdGraph {
    fn name(&self) -> &'static str {
        "DvdGraph"
    }

    fn can_open(&self, spk: Speakers) -> bool {
        self.graph.can_open(spk)
    }

    fn open(&mut self, spk: Speakers) -> Result<()> {
        self.graph.plan().spdif_status.set(SpdifMode::None);
        self.graph.plan().spdif_err.set(None);
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
        let mode =
            if self.graph.plan().use_spdif { SpdifMode::None } else { SpdifMode::Disabled };
        self.graph.plan().spdif_status.set(mode);
        self.graph.plan().spdif_err.set(None);
        self.graph.reset()
    }

    fn new_stream(&self) -> bool {
        self.graph.new_stream()
    }
}
