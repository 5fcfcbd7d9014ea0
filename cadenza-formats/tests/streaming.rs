// Cadenza
// Copyright (c) 2024-2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stream buffer and frame splitter properties over synthetic streams.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use cadenza_core::audio::{Format, Speakers};
use cadenza_core::chunk::Chunk;
use cadenza_core::filter::Filter;
use cadenza_core::filters::FrameSplitter;
use cadenza_core::generator::NoiseGen;
use cadenza_core::parser::HeaderParser;

use cadenza_formats::{ac3, mlp, mpa, Ac3Header, MlpHeader, MpaHeader};

/// Builds one AC-3 frame: a valid header and a noise body. The final body byte stays clear
/// of the sync prefixes, so a boundary shifted by a stream error can never look like a
/// header.
fn ac3_frame(noise: &mut NoiseGen, acmod: u8, lfe: bool) -> Vec<u8> {
    let hdr = ac3::make_header(0, 30, acmod, lfe);
    let size = ac3::frame_size(0, 30).unwrap();
    let mut frame = vec![0u8; size];
    frame[..8].copy_from_slice(&hdr);
    noise.fill_bytes(&mut frame[8..]);
    frame[size - 1] = 0;
    frame
}

/// Builds one MPEG Audio Layer II frame with a noise body.
fn mpa_frame(noise: &mut NoiseGen, bitrate_index: usize) -> Vec<u8> {
    let bits = mpa::MpaHeaderBits {
        ver: 0,
        layer: 1,
        bitrate_index,
        sampling_frequency: 1,
        padding: false,
        error_protection: false,
        mode: 0,
        mode_ext: 0,
    };
    let mut frame = vec![0u8; bits.frame_size()];
    frame[..4].copy_from_slice(&mpa::make_header(&bits));
    noise.fill_bytes(&mut frame[4..]);
    frame
}

/// Builds one MLP frame of `size` bytes: the major sync header followed by filler
/// sub-packets.
fn mlp_frame(noise: &mut NoiseGen, size: usize) -> Vec<u8> {
    let mut frame = vec![0u8; size];
    frame[..12].copy_from_slice(&mlp::make_mlp_header(0, 12, size));
    noise.fill_bytes(&mut frame[12..]);
    // First access unit spans the whole frame; rewrite its length prefix accordingly.
    frame[..2].copy_from_slice(&(((size / 2) & 0xfff) as u16).to_be_bytes());
    frame
}

/// Runs a byte stream through a frame splitter in the given partition, returning the emitted
/// frames and the number of new streams.
fn split(
    parser: Box<dyn HeaderParser>,
    stream: &[u8],
    partition: &[usize],
) -> (Vec<Vec<u8>>, u32) {
    let mut splitter = FrameSplitter::new(parser);
    splitter.open(Speakers::new(Format::RawData, Default::default(), 0)).unwrap();

    let mut frames = Vec::new();
    let mut streams = 0;

    let mut pos = 0;
    for &size in partition {
        let mut input = Chunk::new();
        input.set_raw(&stream[pos..(pos + size).min(stream.len())]);
        pos = (pos + size).min(stream.len());

        let mut output = Chunk::new();
        while splitter.process(&mut input, &mut output).unwrap() {
            if splitter.new_stream() {
                streams += 1;
            }
            frames.push(output.raw().to_vec());
        }
    }

    let mut output = Chunk::new();
    while splitter.flush(&mut output).unwrap() {
        if splitter.new_stream() {
            streams += 1;
        }
        frames.push(output.raw().to_vec());
    }

    (frames, streams)
}

/// Random partition of `total` bytes into chunks of 1 to `max` bytes.
fn random_partition(rng: &mut SmallRng, total: usize, max: usize) -> Vec<usize> {
    let mut partition = Vec::new();
    let mut left = total;
    while left > 0 {
        let size = rng.gen_range(1..=max.min(left));
        partition.push(size);
        left -= size;
    }
    partition
}

#[test]
fn ac3_frames_survive_any_partition() {
    let mut noise = NoiseGen::new(0x0001);
    let frames: Vec<Vec<u8>> = (0..20).map(|_| ac3_frame(&mut noise, 7, true)).collect();
    let stream: Vec<u8> = frames.iter().flatten().copied().collect();

    let mut rng = SmallRng::seed_from_u64(0x0002);
    for _ in 0..10 {
        let partition = random_partition(&mut rng, stream.len(), 4096);
        let (out, streams) = split(Box::new(Ac3Header::new()), &stream, &partition);

        assert_eq!(out.len(), frames.len());
        for (a, b) in out.iter().zip(frames.iter()) {
            assert_eq!(a, b);
        }
        assert_eq!(streams, 1);
    }
}

#[test]
fn mixed_streams_are_counted() {
    // Three runs of compatible headers: framing must deliver every frame and raise
    // new_stream exactly three times.
    let mut noise = NoiseGen::new(0x0003);
    let mut frames: Vec<Vec<u8>> = Vec::new();
    for _ in 0..50 {
        frames.push(ac3_frame(&mut noise, 7, true));
    }
    for _ in 0..50 {
        frames.push(ac3_frame(&mut noise, 2, false));
    }
    for _ in 0..50 {
        frames.push(ac3_frame(&mut noise, 7, false));
    }
    let stream: Vec<u8> = frames.iter().flatten().copied().collect();

    let (out, streams) = split(Box::new(Ac3Header::new()), &stream, &[stream.len()]);
    assert_eq!(out.len(), 150);
    assert_eq!(streams, 3);
}

#[test]
fn leading_garbage_is_skipped() {
    let mut noise = NoiseGen::new(0x0004);
    let frames: Vec<Vec<u8>> = (0..5).map(|_| ac3_frame(&mut noise, 7, true)).collect();

    let mut stream = vec![0u8; 1000];
    noise.fill_bytes(&mut stream);
    // Make sure the garbage does not start with a frame sync.
    stream[0] = 0;
    stream.extend(frames.iter().flatten());

    let (out, _) = split(Box::new(Ac3Header::new()), &stream, &[stream.len()]);
    assert_eq!(out.len(), 5);
    for (a, b) in out.iter().zip(frames.iter()) {
        assert_eq!(a, b);
    }
}

#[test]
fn inserted_byte_causes_one_error_and_no_corrupted_frame() {
    let mut noise = NoiseGen::new(0x0005);
    let frames: Vec<Vec<u8>> = (0..20).map(|_| ac3_frame(&mut noise, 7, true)).collect();
    let mut stream: Vec<u8> = frames.iter().flatten().copied().collect();

    // Inject one byte in the middle of frame 10.
    let frame_size = frames[0].len();
    stream.insert(10 * frame_size + 100, 0x55);

    let mut splitter = FrameSplitter::new(Box::new(Ac3Header::new()));
    splitter.open(Speakers::new(Format::RawData, Default::default(), 0)).unwrap();

    let mut out: Vec<Vec<u8>> = Vec::new();
    let mut input = Chunk::new();
    input.set_raw(&stream);
    let mut output = Chunk::new();
    while splitter.process(&mut input, &mut output).unwrap() {
        out.push(output.raw().to_vec());
    }
    while splitter.flush(&mut output).unwrap() {
        out.push(output.raw().to_vec());
    }

    // The mangled frame is counted exactly once; resynchronisation over its remains is
    // silent.
    assert_eq!(splitter.errors(), 1);

    // Every emitted frame is one of the original frames, bit for bit; at most two frames
    // are lost around the error.
    assert!(out.len() >= frames.len() - 2);
    for frame in &out {
        assert!(frames.iter().any(|f| f == frame), "corrupted frame emitted");
    }
}

#[test]
fn short_input_emits_nothing() {
    let (out, _) = split(Box::new(Ac3Header::new()), &[0x0b, 0x77, 0x00], &[3]);
    assert!(out.is_empty());
}

#[test]
fn mpa_bitrate_switch_is_one_stream() {
    // A bitrate change mid-stream (VBR) must not raise a new stream.
    let mut noise = NoiseGen::new(0x0006);
    let mut frames: Vec<Vec<u8>> = Vec::new();
    for _ in 0..10 {
        frames.push(mpa_frame(&mut noise, 12));
    }
    for _ in 0..10 {
        frames.push(mpa_frame(&mut noise, 10));
    }
    let stream: Vec<u8> = frames.iter().flatten().copied().collect();

    let (out, streams) = split(Box::new(MpaHeader::new()), &stream, &[stream.len()]);
    assert_eq!(out.len(), 20);
    assert_eq!(streams, 1);
}

#[test]
fn mlp_frames_are_found_by_sync_scan() {
    // MLP headers carry no frame size: the framer must find the next major sync on its own.
    let mut noise = NoiseGen::new(0x0007);
    let frames: Vec<Vec<u8>> = (0..30).map(|_| mlp_frame(&mut noise, 1280)).collect();
    let stream: Vec<u8> = frames.iter().flatten().copied().collect();

    let mut rng = SmallRng::seed_from_u64(0x0008);
    let partition = random_partition(&mut rng, stream.len(), 512);
    let (out, streams) = split(Box::new(MlpHeader::new()), &stream, &partition);

    assert_eq!(out.len(), 30);
    assert_eq!(streams, 1);
    for (a, b) in out.iter().zip(frames.iter()) {
        assert_eq!(a, b);
    }
}

#[test]
fn splitter_reset_replays_identically() {
    let mut noise = NoiseGen::new(0x0009);
    let frames: Vec<Vec<u8>> = (0..10).map(|_| ac3_frame(&mut noise, 7, true)).collect();
    let stream: Vec<u8> = frames.iter().flatten().copied().collect();

    let mut splitter = FrameSplitter::new(Box::new(Ac3Header::new()));
    splitter.open(Speakers::new(Format::RawData, Default::default(), 0)).unwrap();

    let run = |splitter: &mut FrameSplitter| {
        let mut out = Vec::new();
        let mut input = Chunk::new();
        input.set_raw(&stream);
        let mut output = Chunk::new();
        while splitter.process(&mut input, &mut output).unwrap() {
            out.push(output.raw().to_vec());
        }
        while splitter.flush(&mut output).unwrap() {
            out.push(output.raw().to_vec());
        }
        out
    };

    let first = run(&mut splitter);
    splitter.reset();
    let second = run(&mut splitter);
    assert_eq!(first, second);
    assert_eq!(first.len(), 10);
}

#[test]
fn timestamps_carry_to_frames() {
    let mut noise = NoiseGen::new(0x000a);
    let frames: Vec<Vec<u8>> = (0..4).map(|_| ac3_frame(&mut noise, 7, true)).collect();
    let frame_size = frames[0].len();
    let stream: Vec<u8> = frames.iter().flatten().copied().collect();

    let mut splitter = FrameSplitter::new(Box::new(Ac3Header::new()));
    splitter.open(Speakers::new(Format::RawData, Default::default(), 0)).unwrap();

    // First chunk carries a timestamp and ends exactly at a frame boundary; the second
    // timestamp then belongs to the third frame.
    let mut times = Vec::new();
    let mut output = Chunk::new();

    let mut input = Chunk::new();
    input.set_raw(&stream[..2 * frame_size]);
    input.set_sync(1.0);
    while splitter.process(&mut input, &mut output).unwrap() {
        times.push(output.sync.then_some(output.time));
    }

    let mut input = Chunk::new();
    input.set_raw(&stream[2 * frame_size..]);
    input.set_sync(2.0);
    while splitter.process(&mut input, &mut output).unwrap() {
        times.push(output.sync.then_some(output.time));
    }
    while splitter.flush(&mut output).unwrap() {
        times.push(output.sync.then_some(output.time));
    }

    assert_eq!(times.len(), 4);
    assert_eq!(times[0], Some(1.0));
    assert_eq!(times[1], None);
    assert_eq!(times[2], Some(2.0));
    assert_eq!(times[3], None);
}

#[test]
fn spdif_wrap_unwrap_round_trip() {
    use cadenza_formats::{Despdifer, Spdifer};

    let mut noise = NoiseGen::new(0x000b);
    let frames: Vec<Vec<u8>> = (0..6).map(|_| ac3_frame(&mut noise, 7, true)).collect();
    let stream: Vec<u8> = frames.iter().flatten().copied().collect();

    // Wrap into IEC 61937 bursts.
    let mut spdifer = Spdifer::new();
    spdifer.open(Speakers::new(Format::Ac3, Default::default(), 0)).unwrap();

    let mut bursts = Vec::new();
    let mut input = Chunk::new();
    input.set_raw(&stream);
    let mut output = Chunk::new();
    while spdifer.process(&mut input, &mut output).unwrap() {
        assert_eq!(output.raw().len(), 1536 * 4);
        bursts.extend_from_slice(output.raw());
        output.clear();
    }
    while spdifer.flush(&mut output).unwrap() {
        bursts.extend_from_slice(output.raw());
        output.clear();
    }
    assert_eq!(spdifer.get_output().format, Format::Spdif);
    assert_eq!(bursts.len(), 6 * 1536 * 4);

    // Unwrap back to the elementary stream.
    let mut despdifer = Despdifer::new();
    despdifer.open(Speakers::new(Format::Spdif, Default::default(), 0)).unwrap();

    let mut out_frames = Vec::new();
    let mut input = Chunk::new();
    input.set_raw(&bursts);
    while despdifer.process(&mut input, &mut output).unwrap() {
        out_frames.push(output.raw().to_vec());
        output.clear();
    }
    while despdifer.flush(&mut output).unwrap() {
        out_frames.push(output.raw().to_vec());
        output.clear();
    }

    assert_eq!(despdifer.get_output().format, Format::Ac3);
    assert_eq!(out_frames.len(), 6);
    for (a, b) in out_frames.iter().zip(frames.iter()) {
        assert_eq!(a, b);
    }
}
