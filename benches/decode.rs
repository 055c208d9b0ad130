//! Decoding benchmarks
//!
//! Measures volume assembly over a synthetic SA/SB file and Archive II chunk
//! inflation, the two costs paid on every open.

use bzip2::write::BzEncoder;
use cinrad2::compression::ArchiveDecompressor;
use cinrad2::{DecoderConfig, Decompressor, Dialect, GateRange, Moment, RadarVolume, VolumeScanAssembler};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::io::{Cursor, Write};

const RECORD_SIZE: usize = 2432;

fn sa_record(elevation_num: u16, radial_num: u16) -> Vec<u8> {
    let mut buf = vec![0u8; RECORD_SIZE];
    let mut put = |offset: usize, value: u16| buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    put(14, 1);
    put(32, 14_423);
    put(36, radial_num.wrapping_mul(91));
    put(38, radial_num);
    put(44, elevation_num);
    put(50, 1000);
    put(52, 250);
    put(54, 460);
    put(56, 920);
    put(64, 100);
    put(66, 560);
    put(68, 1480);
    put(70, 2);
    put(72, 21);
    for b in &mut buf[128..RECORD_SIZE - 4] {
        *b = 90;
    }
    buf
}

fn sa_volume(sweeps: u16, radials: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(sweeps as usize * radials as usize * RECORD_SIZE);
    for e in 1..=sweeps {
        for r in 1..=radials {
            out.extend_from_slice(&sa_record(e, r));
        }
    }
    out
}

fn ar2v_volume(plain: &[u8], records_per_chunk: usize) -> Vec<u8> {
    let mut out = b"AR2V0001.001".to_vec();
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(b"CHGZ");
    let chunks: Vec<&[u8]> = plain.chunks(records_per_chunk * RECORD_SIZE).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::fast());
        encoder.write_all(chunk).unwrap();
        let compressed = encoder.finish().unwrap();
        let len = compressed.len() as i32;
        let len = if i + 1 == chunks.len() { -len } else { len };
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&compressed);
    }
    out
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    let config = DecoderConfig::default().with_disk_cache(false);

    for sweeps in [1u16, 9].iter() {
        let file = sa_volume(*sweeps, 360);
        group.throughput(Throughput::Bytes(file.len() as u64));
        group.bench_with_input(BenchmarkId::new("sa", sweeps), &file, |b, file| {
            b.iter(|| {
                let mut assembler = VolumeScanAssembler::new(Dialect::SaSb, config.clone());
                let scan = assembler.assemble(&mut Cursor::new(file.as_slice())).unwrap();
                black_box(scan.max_radials())
            });
        });
    }
    group.finish();
}

fn bench_archive(c: &mut Criterion) {
    let plain = sa_volume(3, 360);
    let archive = ar2v_volume(&plain, 120);

    let mut group = c.benchmark_group("archive");
    group.throughput(Throughput::Bytes(plain.len() as u64));
    group.bench_function("inflate_chunks", |b| {
        b.iter(|| black_box(ArchiveDecompressor.decompress(&archive).unwrap().len()));
    });
    group.finish();
}

fn bench_read_cube(c: &mut Criterion) {
    let config = DecoderConfig::default().with_disk_cache(false);
    let volume = RadarVolume::from_bytes(sa_volume(3, 360), Dialect::SaSb, &config).unwrap();

    c.bench_function("read_cube_reflectivity", |b| {
        b.iter(|| {
            let cube = volume
                .read_cube(Moment::Reflectivity, 0..3, 0..360, GateRange::all(460))
                .unwrap();
            black_box(cube.len())
        });
    });
}

criterion_group!(benches, bench_assemble, bench_archive, bench_read_cube);
criterion_main!(benches);
