// benches/codec_bench.rs
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use trail_link::transport::{decode, encode, encode_into, BufferPool};
use trail_link::{Appearance, PrimaryFrame, RoomKey, SecondaryFrame, Session, Track, Vec2};

/// A session shaped like a few seconds of play: a moving actor with a
/// handful of poses and some accessories trailing behind it
fn sample_session(frames: usize) -> Session {
    let mut session = Session::new(&RoomKey::new("Celeste/2-OldSite", "d-04"));
    let poses: Vec<u32> = (0..6)
        .map(|i| {
            session
                .registry
                .intern(&Appearance::new(format!("characters/player/run{:02}", i)))
                .unwrap()
        })
        .collect();
    let berry = session
        .registry
        .intern(&Appearance::new("collectables/strawberry/normal00"))
        .unwrap();

    for i in 0..frames {
        let t = i as f64 * 0.133;
        session.primary.push(PrimaryFrame {
            t,
            pos: Vec2::new(24.0 + i as f32 * 3.25, 160.0 - (i % 7) as f32 * 1.5),
            appearance: poses[i % poses.len()],
            color: if i % 11 == 0 { 0x44B7_FFFF } else { 0xAC32_32FF },
            aux: Vec2::new(20.0 + i as f32 * 3.25, 150.0),
        });
    }

    for k in 0..3 {
        let mut track = Track::new();
        for i in 0..frames / 2 {
            track.push(SecondaryFrame {
                t: i as f64 * 0.266,
                appearance: berry,
                pos: Vec2::new(k as f32 * 8.0 + i as f32 * 2.0, 140.0),
            });
        }
        session.secondary.push(track);
    }
    session
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let pool = BufferPool::new(4);

    for frames in [16, 128, 1024] {
        let session = sample_session(frames);
        let bytes = encode(&session).unwrap().len();
        group.throughput(Throughput::Bytes(bytes as u64));

        group.bench_with_input(BenchmarkId::new("string", frames), &session, |b, s| {
            b.iter(|| encode(black_box(s)).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("pooled", frames), &session, |b, s| {
            b.iter(|| {
                let mut buf = pool.acquire();
                encode_into(black_box(s), &mut buf).unwrap();
                pool.release(buf);
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for frames in [16, 128, 1024] {
        let line = encode(&sample_session(frames)).unwrap();
        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frames), &line, |b, line| {
            b.iter(|| decode::<Session>(black_box(line)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
