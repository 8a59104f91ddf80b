use criterion::{criterion_group, criterion_main, Criterion};
use sessioncore::timeline::{AudioFormat, ContinuousBuffer};

fn bench_append_16khz_mono(c: &mut Criterion) {
    let format = AudioFormat::new(16_000, 1);
    let chunk: Vec<Vec<f32>> = (0..1_600).map(|i| vec![(i % 100) as f32 * 0.01]).collect();

    c.bench_function("continuous_buffer_append_100ms_chunk", |b| {
        b.iter_batched(
            || ContinuousBuffer::new(format),
            |buf| {
                buf.append(chunk.clone());
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_read_from_growing_buffer(c: &mut Criterion) {
    let format = AudioFormat::new(16_000, 1);
    let buf = ContinuousBuffer::new(format);
    buf.append((0..160_000).map(|i| vec![(i % 100) as f32 * 0.01]));

    c.bench_function("continuous_buffer_read_1s_window", |b| {
        b.iter(|| {
            let _ = buf.read(80_000, 16_000).unwrap();
        })
    });
}

criterion_group!(benches, bench_append_16khz_mono, bench_read_from_growing_buffer);
criterion_main!(benches);
