use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use gait_core::pipeline::run_pipeline;
use gait_core::types::{SessionMeta, GRAVITY, SAMPLE_RATE_HZ};

// Tiny PRNG, no external dependency needed for deterministic bench noise.
fn synth_walking_bytes(duration_s: f64, seed: u32) -> Vec<u8> {
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        (x as f64) / (u32::MAX as f64 + 1.0)
    };

    let n = (duration_s * SAMPLE_RATE_HZ) as usize;
    let mut buf = Vec::with_capacity(n * 61);
    for i in 0..n {
        let t = i as f64 / SAMPLE_RATE_HZ;
        let noise = (next_f64() * 2.0 - 1.0) * 0.05;
        let gyro_z = 200.0 * (2.0 * std::f64::consts::PI * t).sin() + noise * 10.0;
        let acc_z = GRAVITY + 2.0 * (2.0 * std::f64::consts::PI * t - 1.0).sin() + noise;

        buf.push(0u8);
        buf.extend_from_slice(&t.to_le_bytes());
        for v in [
            0.0f32,
            0.0,
            GRAVITY as f32,
            0.0,
            0.0,
            (gyro_z * 0.5) as f32,
            0.0,
            0.0,
            acc_z as f32,
            0.0,
            gyro_z as f32,
            0.0,
        ] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }
    buf
}

pub fn bench_full_pipeline(c: &mut Criterion) {
    let mut g = c.benchmark_group("pipeline");
    // Quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=10 cargo bench -p gait_core --bench pipeline
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(10));
        }
    } else {
        g.sample_size(10);
    }

    for &duration_s in &[20.0f64, 60.0] {
        let raw = synth_walking_bytes(duration_s, 0xC0FFEE);
        g.bench_function(format!("walking_{duration_s}s"), |b| {
            b.iter_batched(
                || raw.clone(),
                |buf| {
                    let summary =
                        run_pipeline(black_box(&buf), None, SessionMeta::default()).unwrap();
                    black_box(summary);
                },
                BatchSize::LargeInput,
            )
        });
    }
    g.finish();
}

criterion_group!(pipeline, bench_full_pipeline);
criterion_main!(pipeline);
