//! Performance benchmarks for tag frame extraction and EPC decoding.
//!
//! The UHF poll loop extracts and decodes every frame of every active-mode
//! read on the driver thread, so both must stay far below the poll
//! interval even for a full reader buffer.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench decode_bench
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use libterm_core::{NormalizationRules, epc};
use libterm_protocol::FrameExtractor;
use std::hint::black_box;

const CARD_EPC: &str = "304DB75F19600005F0000001";

/// Build an active-mode buffer holding `count` library tags.
fn active_mode_buffer(count: u32) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(count as usize * 13);
    for serial in 0..count {
        buffer.push(12);
        buffer.extend_from_slice(&[0x30, 0x4D, 0xB7, 0x5F, 0x19, 0x60, 0x00, 0x05]);
        buffer.extend_from_slice(&serial.to_be_bytes());
    }
    buffer
}

/// Benchmark decoding a single EPC.
fn bench_decode_epc(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_epc");
    group.throughput(Throughput::Elements(1));

    group.bench_function("library_card", |b| {
        b.iter(|| black_box(epc::decode(black_box(CARD_EPC))));
    });

    group.bench_function("foreign_header", |b| {
        b.iter(|| black_box(epc::decode(black_box("E2801160600002085A4C1C33"))));
    });

    group.finish();
}

/// Benchmark extracting frames from buffers of increasing size.
fn bench_extract_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_frames");
    let extractor = FrameExtractor::default();

    for count in [1u32, 16, 256].iter() {
        let buffer = active_mode_buffer(*count);
        group.throughput(Throughput::Elements(u64::from(*count)));

        group.bench_with_input(BenchmarkId::from_parameter(count), &buffer, |b, buffer| {
            b.iter(|| black_box(extractor.hex_frames(black_box(buffer))));
        });
    }

    group.finish();
}

/// Benchmark the full book-key path: extraction, normalization, EPC key.
fn bench_book_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("book_keys");
    let extractor = FrameExtractor::default();
    let rules = NormalizationRules {
        use_epc_book_key: true,
        ..NormalizationRules::default()
    };
    let buffer = active_mode_buffer(16);
    group.throughput(Throughput::Elements(16));

    group.bench_function("resolve_16", |b| {
        b.iter(|| {
            for hex in extractor.hex_frames(black_box(&buffer)) {
                black_box(rules.book_key(&hex));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decode_epc, bench_extract_frames, bench_book_keys);
criterion_main!(benches);
