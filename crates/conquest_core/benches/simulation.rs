//! Simulation benchmarks for conquest_core.
//!
//! Run with: `cargo bench -p conquest_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use conquest_core::action::Action;
use conquest_core::faction::FactionId;
use conquest_core::map::LayoutConfig;
use conquest_core::simulation::ConquestSim;

/// Four factions, each with a detachment on the road.
fn busy_sim() -> ConquestSim {
    let config = LayoutConfig {
        factions: 4,
        ..LayoutConfig::default()
    };
    let mut sim = ConquestSim::new(&config);
    for faction in 0..4u8 {
        let source = faction as usize;
        let target = (source + 1) % 4;
        let action = Action::SendUnits {
            source,
            target,
            percentage: 50,
            seed: u64::from(faction) + 1,
        };
        sim.apply_action(FactionId(faction), &action)
            .expect("benchmark dispatch should be valid");
    }
    sim
}

pub fn simulation_benchmark(c: &mut Criterion) {
    let sim = busy_sim();

    c.bench_function("tick_with_marching_detachments", |b| {
        b.iter_batched(
            || sim.clone(),
            |mut s| {
                s.tick();
                s
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("state_hash", |b| {
        b.iter(|| black_box(sim.state_hash()));
    });

    c.bench_function("serialize_full_state", |b| {
        b.iter(|| black_box(sim.serialize().expect("serialize")));
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
