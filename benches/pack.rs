//! Criterion benchmarks for the N-bit packer hot path.
//!
//! Run with:
//!   cargo bench --bench pack
//!
//! The widths cover the three encoder paths: the general scatter encoder
//! (N = 4), the 8–15 gather path (N = 10, 12), and the 16–31 gather path
//! (N = 16, 24).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use gt3::pack::{pack32_len, pack_bits_into32, unpack_bits_from32};

fn bench_pack_unpack(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_unpack");

    // one 640x320 plane, the usual atmospheric grid size
    let nelem = 640 * 320;

    for &nbit in &[4u32, 10, 12, 16, 24] {
        let data: Vec<u32> = (0..nelem as u32)
            .map(|i| i.wrapping_mul(2654435761) % (1u32 << nbit))
            .collect();
        let words = pack32_len(nelem, nbit);
        let mut packed = vec![0u32; words];

        group.throughput(Throughput::Elements(nelem as u64));
        group.bench_with_input(BenchmarkId::new("pack", nbit), &data, |b, data| {
            b.iter(|| pack_bits_into32(&mut packed, data, nbit))
        });

        pack_bits_into32(&mut packed, &data, nbit);
        let mut out = vec![0u32; nelem];
        group.throughput(Throughput::Elements(nelem as u64));
        group.bench_with_input(BenchmarkId::new("unpack", nbit), &packed, |b, packed| {
            b.iter(|| unpack_bits_from32(&mut out, packed, nbit))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pack_unpack);
criterion_main!(benches);
