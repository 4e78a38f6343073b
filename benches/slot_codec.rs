// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Hot path of one request cycle: encode a record, publish it in a slot,
// copy it back out and decode it.
//
// Run with:
//   cargo bench --bench slot_codec
//
// Groups:
//   encode        : Response into a reused buffer
//   slot_publish  : write_slot, then read_slot_into a reused buffer
//   cycle         : decode request, encode response, write, read back

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use playback_ipc::message::{decode_request, encode_into, kind};
use playback_ipc::{Request, Response, SharedRegion, Slot, REGION_SIZE};

const SIZES: &[(&str, usize)] = &[("small_32", 32), ("medium_256", 256), ("full_1020", 1020)];

fn region(tag: &str) -> SharedRegion {
    let name = format!("bench_slot_{tag}_{}", std::process::id());
    SharedRegion::clear_storage(&name);
    SharedRegion::create_or_open(&name, REGION_SIZE).expect("open region")
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let progress = Response::new(kind::PROGRESS, "Current progress retrieved.", "123.456");
    let mut buf = Vec::with_capacity(Slot::Response.capacity());

    group.bench_function("progress_response", |b| {
        b.iter(|| {
            encode_into(black_box(&progress), &mut buf).expect("encode");
            black_box(buf.len())
        });
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Slot copy in / copy out
// ---------------------------------------------------------------------------

fn bench_slot_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_publish");
    let region = region("publish");
    let mut out = Vec::with_capacity(Slot::Request.capacity());

    for &(label, size) in SIZES {
        let payload = vec![b'x'; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &payload, |b, p| {
            b.iter(|| {
                region.write_slot(Slot::Response, black_box(p)).expect("write");
                black_box(region.read_slot_into(Slot::Response, &mut out))
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Full host-side cycle without signalling
// ---------------------------------------------------------------------------

fn bench_cycle(c: &mut Criterion) {
    let region = region("cycle");
    let request = serde_json::to_vec(&Request::new("Volume", "75")).expect("encode request");
    region.write_slot(Slot::Request, &request).expect("write request");

    let mut read_buf = Vec::with_capacity(Slot::Request.capacity());
    let mut write_buf = Vec::with_capacity(Slot::Response.capacity());

    c.bench_function("cycle", |b| {
        b.iter(|| {
            region.read_slot_into(Slot::Request, &mut read_buf).expect("request present");
            let req = decode_request(&read_buf).expect("decode");
            let resp = if req.command == "Volume" {
                Response::new(kind::SUCCESS, "Volume set.", "Volume_Set")
            } else {
                Response::failure("Unknown command", "Error_UnknownCommand")
            };
            encode_into(&resp, &mut write_buf).expect("encode");
            region.write_slot(Slot::Response, &write_buf).expect("write");
            black_box(region.read_slot(Slot::Response))
        });
    });
}

criterion_group!(benches, bench_encode, bench_slot_publish, bench_cycle);
criterion_main!(benches);
