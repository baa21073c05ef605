use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use temp_dir::TempDir;

use caelan_logger::{common::LoggerConfig, BackendWriter, Level};

/// Keeps the engine's own diagnostics from polluting benchmark output while
/// still exercising the tracing call sites.
fn init_instrumentation() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .try_init();
}

fn bench_record_append(c: &mut Criterion) {
    init_instrumentation();

    let mut group = c.benchmark_group("record_append");
    for payload_len in [16_u64, 128, 960] {
        group.throughput(Throughput::Bytes(payload_len));
        group.bench_with_input(
            BenchmarkId::from_parameter(payload_len),
            &payload_len,
            |b, &payload_len| {
                let dir = TempDir::new().expect("could not make bench dir");
                let config = LoggerConfig::builder()
                    .buffer_size(16 * 1024)
                    .queue_capacity(1024)
                    .data_dir(dir.path())
                    .build()
                    .expect("bench config is valid");
                let writer = BackendWriter::new(config);
                writer.start();

                let mut producer = writer.producer();
                let payload = "x".repeat(usize::try_from(payload_len).expect("small payload"));

                b.iter(|| {
                    producer
                        .record(Level::Info)
                        .append(payload.as_str());
                });

                writer.stop();
            },
        );
    }
    group.finish();
}

fn bench_handoff_exchange(c: &mut Criterion) {
    init_instrumentation();

    c.bench_function("handoff_exchange", |b| {
        let dir = TempDir::new().expect("could not make bench dir");
        let config = LoggerConfig::builder()
            .buffer_size(4096)
            .queue_capacity(1024)
            .data_dir(dir.path())
            .build()
            .expect("bench config is valid");
        let writer = BackendWriter::new(config);
        writer.start();

        let mut producer = writer.producer();
        b.iter(|| {
            producer.record(Level::Info).append("ping");
            producer.handoff();
        });

        writer.stop();
    });
}

criterion_group!(benches, bench_record_append, bench_handoff_exchange);
criterion_main!(benches);
