#[cfg(not(feature = "loom"))]
mod benches {
    use criterion::{Criterion, Throughput, black_box};
    use seqring::RingBuffer;

    const MESSAGE: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

    pub fn bench_push_back(c: &mut Criterion) {
        let buffer: RingBuffer<8, 1024> = RingBuffer::new();
        let mut writer = buffer.try_lock().expect("fresh buffer");

        let mut group = c.benchmark_group("spmc");
        group.throughput(Throughput::Elements(1));

        group.bench_function("push_back", |b| {
            b.iter(|| writer.push_back(black_box(MESSAGE)));
        });

        group.finish();
    }

    pub fn bench_pop_front_empty(c: &mut Criterion) {
        let buffer: RingBuffer<8, 1024> = RingBuffer::new();
        let _writer = buffer.try_lock().expect("fresh buffer");
        let reader = buffer.reader();

        let mut group = c.benchmark_group("spmc");
        group.throughput(Throughput::Elements(1));

        group.bench_function("pop_front (empty)", |b| {
            b.iter(|| black_box(reader.pop_front()));
        });

        group.finish();
    }

    pub fn bench_round_trip(c: &mut Criterion) {
        let buffer: RingBuffer<8, 1024> = RingBuffer::new();
        let mut writer = buffer.try_lock().expect("fresh buffer");
        let reader = buffer.reader();

        let mut group = c.benchmark_group("spmc");
        group.throughput(Throughput::Elements(1));

        group.bench_function("round_trip", |b| {
            b.iter(|| {
                writer.push_back(black_box(MESSAGE));
                black_box(reader.pop_front());
            });
        });

        group.finish();
    }

    pub fn bench_round_trip_capacities(c: &mut Criterion) {
        fn run<const N: usize>(group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
            let buffer: RingBuffer<8, N> = RingBuffer::new();
            let mut writer = buffer.try_lock().expect("fresh buffer");
            let reader = buffer.reader();

            group.bench_function(format!("round_trip_cap_{N}"), |b| {
                b.iter(|| {
                    writer.push_back(black_box(MESSAGE));
                    black_box(reader.pop_front());
                });
            });
        }

        let mut group = c.benchmark_group("spmc_capacity");
        group.throughput(Throughput::Elements(1));

        run::<256>(&mut group);
        run::<1024>(&mut group);
        run::<4096>(&mut group);

        group.finish();
    }
}

#[cfg(not(feature = "loom"))]
criterion::criterion_group!(
    spmc,
    benches::bench_push_back,
    benches::bench_pop_front_empty,
    benches::bench_round_trip,
    benches::bench_round_trip_capacities,
);

#[cfg(not(feature = "loom"))]
criterion::criterion_main!(spmc);

#[cfg(feature = "loom")]
fn main() {}
