use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::thread::scope;
use tally::{FIELD_NAME, GeneratorProperties, IncrementGenerator, MemoryStore};

fn generator(key: &str) -> IncrementGenerator<MemoryStore> {
    let props = GeneratorProperties::new().with(FIELD_NAME, key);
    let generator = IncrementGenerator::new("bench", &props, MemoryStore::new());
    generator.allocate(1).expect("memory store never fails");
    generator
}

fn bench_next(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory");
    group.throughput(Throughput::Elements(1));

    let single = generator("single");
    group.bench_function("next", |b| {
        b.iter(|| black_box(single.next().unwrap()));
    });

    group.bench_function("current", |b| {
        b.iter(|| black_box(single.current().unwrap()));
    });

    const THREADS: usize = 4;
    const PER_THREAD: u64 = 1_000;
    group.throughput(Throughput::Elements(THREADS as u64 * PER_THREAD));
    let contended = generator("contended");
    group.bench_function("next/contended", |b| {
        b.iter(|| {
            scope(|s| {
                for _ in 0..THREADS {
                    s.spawn(|| {
                        for _ in 0..PER_THREAD {
                            black_box(contended.next().unwrap());
                        }
                    });
                }
            });
        });
    });

    group.finish();
}

criterion_group!(benches, bench_next);
criterion_main!(benches);
