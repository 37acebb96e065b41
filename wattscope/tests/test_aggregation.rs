//! Aggregator properties: the worked example, energy conservation and
//! frame-windowed statistics.

use std::collections::HashMap;
use wattscope::cfg::Cfg;
use wattscope::profile::{Aggregator, FrameBoundary, IdGen, Location, Summary};
use wattscope::store::Measurement;
use wattscope::symbols::{ResolvePc, SymbolInfo};
use wattscope_common::{MAX_CORES, MAX_SENSORS, PC_SHIFT};

/// Table-backed resolver; anything not in the table is unknown.
struct FakeResolver {
    table: HashMap<u64, SymbolInfo>,
}

impl FakeResolver {
    fn new() -> Self {
        Self { table: HashMap::new() }
    }

    /// Map a byte address to an instrumented basic block marker.
    fn map_block(&mut self, byte_addr: u64, module: &str, function: &str, bb: u64) {
        self.table.insert(
            byte_addr,
            SymbolInfo {
                function: function.to_string(),
                filename: format!("@{module}"),
                elf: "app.elf".to_string(),
                line: bb,
            },
        );
    }
}

impl ResolvePc for FakeResolver {
    fn resolve_pc(&mut self, pc: u64) -> SymbolInfo {
        self.table.get(&pc).cloned().unwrap_or_else(SymbolInfo::unknown)
    }
}

fn test_cfg() -> Cfg {
    Cfg::from_json(
        r#"{
            "modules": [{
                "id": "main.c",
                "functions": [
                    {"id": "main", "basic_blocks": [{"id": "1"}, {"id": "2"}]}
                ]
            }]
        }"#,
    )
    .unwrap()
}

/// Build a core-0 measurement; other cores idle at PC 0.
fn sample(time: i64, time_since_last: i64, byte_addr: u64, power0: f64) -> Measurement {
    let mut pc = [0u64; MAX_CORES];
    pc[0] = byte_addr >> PC_SHIFT;
    let mut power = [0.0; MAX_SENSORS];
    power[0] = power0;
    Measurement { time, time_since_last, pc, power }
}

fn run_samples(
    resolver: &mut FakeResolver,
    cfg: &mut Cfg,
    frames: Vec<FrameBoundary>,
    samples: &[Measurement],
) -> (Vec<Location>, Summary) {
    let mut aggregator =
        Aggregator::new(resolver, cfg, frames, IdGen::starting_after(0), false);
    for m in samples {
        aggregator.add_sample(m);
    }
    aggregator.finalize()
}

fn core0_block<'a>(locations: &'a [Location], bb: &str) -> &'a Location {
    locations
        .iter()
        .find(|l| l.key.core == 0 && l.key.basic_block.as_deref() == Some(bb))
        .expect("block location exists")
}

#[test]
fn worked_example_three_samples() {
    let mut resolver = FakeResolver::new();
    resolver.map_block(0x1000, "main.c", "main", 1);
    let mut cfg = test_cfg();

    let samples = [
        sample(0, 0, 0x1000, 2.0),
        sample(10, 10, 0x1000, 2.0),
        sample(25, 15, 0x1000, 2.0),
    ];
    let (locations, summary) = run_samples(&mut resolver, &mut cfg, Vec::new(), &samples);

    let b1 = core0_block(&locations, "1");
    // First sample contributes no time delta.
    assert_eq!(b1.runtime, 25.0);
    assert_eq!(b1.energy[0], 2.0 * 10.0 + 2.0 * 15.0);

    assert_eq!(summary.samples, 3);
    assert_eq!(summary.min_time, 0);
    assert_eq!(summary.max_time, 25);
    assert_eq!(summary.runtime, 25.0);
    assert_eq!(summary.energy[0], 50.0);
}

#[test]
fn energy_is_conserved_per_core_and_sensor() {
    let mut resolver = FakeResolver::new();
    resolver.map_block(0x1000, "main.c", "main", 1);
    resolver.map_block(0x2000, "main.c", "main", 2);
    let mut cfg = test_cfg();

    // Two mapped blocks plus one foreign PC (placeholder attribution).
    let mut samples = Vec::new();
    let addrs = [0x1000u64, 0x2000, 0x1000, 0xdead_0000, 0x2000, 0x1000];
    let powers = [1.5, 2.25, 0.5, 3.0, 1.0, 0.75];
    let mut time = 0i64;
    for (i, (&addr, &p)) in addrs.iter().zip(&powers).enumerate() {
        let dt = if i == 0 { 0 } else { 3 + (i as i64 % 4) };
        time += dt;
        samples.push(sample(time, dt, addr, p));
    }

    let (locations, summary) = run_samples(&mut resolver, &mut cfg, Vec::new(), &samples);

    let expected: f64 = samples.iter().map(|m| m.power[0] * m.time_since_last as f64).sum();
    let total: f64 =
        locations.iter().filter(|l| l.key.core == 0).map(|l| l.energy[0]).sum();
    assert!((total - expected).abs() < 1e-9, "core 0 sensor 0: {total} != {expected}");
    assert!((summary.energy[0] - expected).abs() < 1e-9);

    // Idle cores attribute their zero-power samples to a placeholder; energy
    // there is zero but runtime still flows.
    for core in 1..MAX_CORES {
        let runtime: f64 =
            locations.iter().filter(|l| l.key.core == core).map(|l| l.runtime).sum();
        assert_eq!(runtime, summary.runtime);
    }
}

#[test]
fn single_frame_statistics_collapse_to_one_value() {
    let mut resolver = FakeResolver::new();
    resolver.map_block(0x1000, "main.c", "main", 1);
    let mut cfg = test_cfg();

    let samples = [
        sample(0, 0, 0x1000, 2.0),
        sample(5, 5, 0x1000, 2.0),
        sample(10, 5, 0x1000, 2.0),
        sample(15, 5, 0x1000, 2.0),
    ];
    let frames = vec![FrameBoundary { time: 10, delay: 0 }];
    let (_, summary) = run_samples(&mut resolver, &mut cfg, frames, &samples);

    let fr = summary.frame_runtime;
    assert_eq!(fr.min, 10.0);
    assert_eq!(fr.min, fr.avg);
    assert_eq!(fr.avg, fr.max);
}

#[test]
fn frame_statistics_are_ordered_with_two_frames() {
    let mut resolver = FakeResolver::new();
    resolver.map_block(0x1000, "main.c", "main", 1);
    let mut cfg = test_cfg();

    let samples = [
        sample(0, 0, 0x1000, 2.0),
        sample(5, 5, 0x1000, 2.0),
        sample(10, 5, 0x1000, 2.0),
        sample(15, 5, 0x1000, 2.0),
        sample(25, 10, 0x1000, 2.0),
    ];
    // Frame 1: 10 - 0 - 0 = 10. Frame 2: 20 - 10 - 2 = 8.
    let frames =
        vec![FrameBoundary { time: 10, delay: 0 }, FrameBoundary { time: 20, delay: 2 }];
    let (locations, summary) = run_samples(&mut resolver, &mut cfg, frames, &samples);

    let fr = summary.frame_runtime;
    assert_eq!(fr.min, 8.0);
    assert_eq!(fr.max, 10.0);
    assert_eq!(fr.avg, 9.0);
    assert!(fr.min <= fr.avg && fr.avg <= fr.max);

    let fe = summary.frame_energy[0];
    assert!(fe.min <= fe.avg && fe.avg <= fe.max);
    // Frame 1 holds the samples at t=0,5,10 (energy 20); frame 2 the sample
    // at t=15 (energy 10).
    assert_eq!(fe.min, 10.0);
    assert_eq!(fe.max, 20.0);

    // Per-location frame average: (20 + 10) / 2 closed frames.
    let b1 = core0_block(&locations, "1");
    assert_eq!(b1.energy_frame_avg[0], 15.0);
    // Frame-scoped runtime never exceeds the cumulative runtime.
    assert!(b1.runtime_frame <= b1.runtime);
}

#[test]
fn foreign_code_gets_core_qualified_placeholders() {
    let mut resolver = FakeResolver::new();
    let mut cfg = test_cfg();

    // All four cores at unresolvable PCs.
    let mut m = sample(10, 10, 0xdead_0000, 1.0);
    m.pc = [0xdead_0000 >> PC_SHIFT; MAX_CORES];
    let samples = [sample(0, 0, 0xdead_0000, 1.0), m];

    let (locations, _) = run_samples(&mut resolver, &mut cfg, Vec::new(), &samples);

    for core in 0..MAX_CORES {
        let loc = locations
            .iter()
            .find(|l| l.key.core == core)
            .unwrap_or_else(|| panic!("placeholder for core {core}"));
        assert_eq!(loc.key.module, "external");
        assert!(loc.key.basic_block.is_none());
        if core == 0 {
            assert_eq!(loc.key.function, "Unknown");
        } else {
            assert_eq!(loc.key.function, format!("Unknown@core{core}"));
        }
    }
}
