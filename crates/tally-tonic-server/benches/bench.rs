use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::{
    net::TcpStream,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use tally_tonic_core::{
    ClientConfig, RemoteConnector,
    tally::{FIELD_NAME, GeneratorProperties, IncrementGenerator},
};

const ADDR: &str = "127.0.0.1:50061";

fn generator(key: &str) -> IncrementGenerator<RemoteConnector> {
    let props = GeneratorProperties::new().with(FIELD_NAME, key);
    let connector = RemoteConnector::new(ClientConfig::new(format!("http://{ADDR}")));
    let generator = IncrementGenerator::new("bench", &props, connector);
    generator.allocate(1).expect("failed to initialize generator");
    generator
}

fn grpc_bench(c: &mut Criterion) {
    // Start the server. This may require a full compilation so set the timeout
    // high. Each case runs with and without a flush per write.
    for sync_writes in [false, true] {
        let mut server = Command::new("cargo")
            .args([
                "run",
                "--bin",
                "tally-tonic-server",
                "--release",
                "--",
                "--temporary",
                "--server-addr",
                ADDR,
                "--sync-writes",
                if sync_writes { "true" } else { "false" },
            ])
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .expect("Failed to start tally-tonic-server");
        wait_for_port(ADDR, 300);

        let mut group = c.benchmark_group(format!("grpc/sync_writes/{sync_writes}"));
        group.throughput(Throughput::Elements(1));

        let single = generator("single");
        group.bench_function("next", |b| {
            b.iter(|| black_box(single.next().unwrap()));
        });

        const THREADS: usize = 8;
        const PER_THREAD: u64 = 100;
        group.throughput(Throughput::Elements(THREADS as u64 * PER_THREAD));
        let generators: Vec<_> = (0..THREADS).map(|_| generator("contended")).collect();
        group.bench_function("next/contended", |b| {
            b.iter(|| {
                thread::scope(|s| {
                    for generator in &generators {
                        s.spawn(move || {
                            for _ in 0..PER_THREAD {
                                black_box(generator.next().unwrap());
                            }
                        });
                    }
                });
            });
        });

        group.finish();
        drop(generators);
        drop(single);

        if server.kill().is_err() {
            eprintln!("failed to kill server");
        }
        let _ = server.wait();
    }
}

pub fn wait_for_port(addr: &str, timeout_secs: u64) {
    let start = Instant::now();
    while start.elapsed().as_secs() < timeout_secs {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Server did not start listening on {}", addr);
}

criterion_group!(grpc_benches, grpc_bench);
criterion_main!(grpc_benches);
