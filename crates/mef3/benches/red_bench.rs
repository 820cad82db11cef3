//! Benchmarks for mef3 block coding and channel reads.
//!
//! Run with: cargo bench --package mef3
//!
//! ## Benchmark Categories
//!
//! - **RED Coding**: Compress/decompress of single blocks
//! - **Segment Writes**: Full write path into a fresh segment
//! - **Window Reads**: Sample and time windows from a written channel

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mef3::format::red::{self, RedBlock};
use mef3::path::segment_dir_name;
use mef3::{
    write_ts_data, write_ts_metadata, Channel, Credentials, LossyConfig, MefConfig, Section3,
    TimeSeriesSection2, WriteOptions,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SAMPLING_FREQUENCY: f64 = 1000.0;

/// Generate an EEG-like signal: a slow rhythm plus a faster component.
fn generate_signal(count: usize) -> Vec<i32> {
    (0..count)
        .map(|i| {
            let t = i as f64 / SAMPLING_FREQUENCY;
            let value = 800.0 * (t * 10.0 * std::f64::consts::TAU).sin()
                + 120.0 * (t * 47.0 * std::f64::consts::TAU).sin();
            value as i32
        })
        .collect()
}

fn write_channel(root: &Path, samples: &[i32]) -> PathBuf {
    let channel = root.join("bench.mefd").join("Cz.timd");
    let segment = channel.join(segment_dir_name("Cz", 0));
    let config = MefConfig::default();
    write_ts_metadata(
        &segment,
        &Credentials::unencrypted(),
        0,
        0,
        TimeSeriesSection2::with_sampling(SAMPLING_FREQUENCY, 0),
        Section3::default(),
        &config,
    )
    .unwrap();
    write_ts_data(
        &segment,
        &Credentials::unencrypted(),
        samples,
        WriteOptions::new(1000),
        &config,
    )
    .unwrap();
    channel
}

// ============================================================================
// RED Coding Benchmarks
// ============================================================================

fn bench_red_compress(c: &mut Criterion) {
    let samples = generate_signal(1000);

    c.bench_function("red_compress_1k", |b| {
        b.iter(|| RedBlock::compress(black_box(&samples), 0, false, None).unwrap())
    });
}

fn bench_red_compress_lossy(c: &mut Criterion) {
    let samples = generate_signal(1000);
    let lossy = LossyConfig::default();

    c.bench_function("red_compress_lossy_1k", |b| {
        b.iter(|| RedBlock::compress(black_box(&samples), 0, false, Some(&lossy)).unwrap())
    });
}

fn bench_red_decompress_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("red_decompress");

    for size in [100, 1_000, 10_000].iter() {
        let samples = generate_signal(*size);
        let block = RedBlock::compress(&samples, 0, false, None).unwrap();
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &block, |b, block| {
            b.iter(|| red::decompress(black_box(&block.bytes)).unwrap())
        });
    }

    group.finish();
}

// ============================================================================
// Segment Write Benchmarks
// ============================================================================

fn bench_segment_write(c: &mut Criterion) {
    let samples = generate_signal(100_000);
    let mut group = c.benchmark_group("segment_write");
    group.throughput(Throughput::Elements(samples.len() as u64));
    group.sample_size(20);

    group.bench_function("100k_samples", |b| {
        b.iter_batched(
            || TempDir::new().unwrap(),
            |temp_dir| {
                write_channel(temp_dir.path(), &samples);
                temp_dir
            },
            criterion::BatchSize::PerIteration,
        )
    });

    group.finish();
}

// ============================================================================
// Window Read Benchmarks
// ============================================================================

fn bench_window_reads(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let channel_dir = write_channel(temp_dir.path(), &generate_signal(600_000));
    let config = MefConfig::default().with_keep_files_open(true);
    let mut channel = Channel::open(&channel_dir, None, &config).unwrap();

    let mut group = c.benchmark_group("window_read");
    for seconds in [1i64, 10, 60].iter() {
        let width = seconds * SAMPLING_FREQUENCY as i64;
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::new("by_sample", seconds), &width, |b, &width| {
            b.iter(|| {
                channel
                    .read_by_sample(black_box(250_000), 250_000 + width, &config)
                    .unwrap()
            })
        });
        group.bench_with_input(BenchmarkId::new("by_time", seconds), seconds, |b, &seconds| {
            b.iter(|| {
                channel
                    .read_by_time(black_box(250_000_000), 250_000_000 + seconds * 1_000_000, &config)
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    // RED coding
    bench_red_compress,
    bench_red_compress_lossy,
    bench_red_decompress_sizes,
    // Writes
    bench_segment_write,
    // Reads
    bench_window_reads,
);
criterion_main!(benches);
