//! Full analysis pass: measurements in, locations/arcs/meta out.

use std::collections::HashMap;
use wattscope::cfg::Cfg;
use wattscope::profile::{self, FrameBoundary};
use wattscope::progress::Reporter;
use wattscope::store::{Measurement, ProfSelector, Store};
use wattscope::symbols::{ResolvePc, SymbolInfo};
use wattscope_common::{MAX_CORES, MAX_SENSORS, PC_SHIFT};

struct FakeResolver {
    table: HashMap<u64, SymbolInfo>,
}

impl ResolvePc for FakeResolver {
    fn resolve_pc(&mut self, pc: u64) -> SymbolInfo {
        self.table.get(&pc).cloned().unwrap_or_else(SymbolInfo::unknown)
    }
}

fn block_info(module: &str, function: &str, bb: u64) -> SymbolInfo {
    SymbolInfo {
        function: function.to_string(),
        filename: format!("@{module}"),
        elf: "app.elf".to_string(),
        line: bb,
    }
}

fn measurement(time: i64, time_since_last: i64, byte_addr: u64, power0: f64) -> Measurement {
    let mut pc = [0u64; MAX_CORES];
    pc[0] = byte_addr >> PC_SHIFT;
    let mut power = [0.0; MAX_SENSORS];
    power[0] = power0;
    Measurement { time, time_since_last, pc, power }
}

#[test]
fn analysis_pass_builds_locations_and_summary() {
    let mut store = Store::open_in_memory().unwrap();
    store.begin_bulk().unwrap();
    store.insert_measurement(&measurement(0, 0, 0x1000, 2.0)).unwrap();
    store.insert_measurement(&measurement(10, 10, 0x1000, 2.0)).unwrap();
    store.insert_measurement(&measurement(20, 10, 0x2000, 4.0)).unwrap();
    store.insert_measurement(&measurement(30, 10, 0x1000, 2.0)).unwrap();
    store.commit_bulk().unwrap();
    store.create_time_index().unwrap();
    store.insert_frame(FrameBoundary { time: 15, delay: 0 }).unwrap();
    store.insert_frame(FrameBoundary { time: 30, delay: 5 }).unwrap();

    let mut resolver = FakeResolver {
        table: HashMap::from([
            (0x1000, block_info("main.c", "main", 1)),
            (0x2000, block_info("main.c", "main", 2)),
        ]),
    };
    let mut cfg = Cfg::from_json(
        r#"{"modules": [{"id": "main.c", "functions": [
            {"id": "main", "basic_blocks": [{"id": "1"}, {"id": "2"}]}
        ]}]}"#,
    )
    .unwrap();

    let outcome =
        profile::aggregate(&mut store, &mut resolver, &mut cfg, false, &Reporter::new())
            .unwrap();

    assert_eq!(outcome.summary.samples, 4);
    assert_eq!(outcome.frames_closed, 1);

    // Block 1 absorbed the deltas of the samples at t=10 and t=30, block 2
    // the one at t=20.
    let b1 = store.prof_data(0, "main.c", ProfSelector::BasicBlock("1")).unwrap().unwrap();
    let b2 = store.prof_data(0, "main.c", ProfSelector::BasicBlock("2")).unwrap().unwrap();
    assert_eq!(b1.runtime, 20.0);
    assert_eq!(b1.energy[0], 2.0 * 10.0 + 2.0 * 10.0);
    assert_eq!(b2.runtime, 10.0);
    assert_eq!(b2.energy[0], 40.0);

    // Energy conservation through the persisted summary.
    let meta = store.read_meta().unwrap().unwrap();
    assert_eq!(meta.energy[0], b1.energy[0] + b2.energy[0]);
    assert_eq!(meta.runtime, 30.0);
    assert_eq!(meta.min_time, 0);
    assert_eq!(meta.max_time, 30);
    assert_eq!(meta.max_power[0], 4.0);

    // Re-running the pass rebuilds instead of double counting.
    let mut resolver = FakeResolver {
        table: HashMap::from([
            (0x1000, block_info("main.c", "main", 1)),
            (0x2000, block_info("main.c", "main", 2)),
        ]),
    };
    let outcome2 =
        profile::aggregate(&mut store, &mut resolver, &mut cfg, false, &Reporter::new())
            .unwrap();
    assert_eq!(outcome2.summary.samples, 4);
    let b1_again =
        store.prof_data(0, "main.c", ProfSelector::BasicBlock("1")).unwrap().unwrap();
    assert_eq!(b1_again.runtime, b1.runtime);
    assert_eq!(b1_again.energy[0], b1.energy[0]);
}

#[test]
fn foreign_pcs_survive_the_pass_as_placeholders() {
    let mut store = Store::open_in_memory().unwrap();
    store.begin_bulk().unwrap();
    store.insert_measurement(&measurement(0, 0, 0xdead_0000, 1.0)).unwrap();
    store.insert_measurement(&measurement(10, 10, 0xdead_0000, 1.0)).unwrap();
    store.commit_bulk().unwrap();

    let mut resolver = FakeResolver { table: HashMap::new() };
    let mut cfg = Cfg::new();

    profile::aggregate(&mut store, &mut resolver, &mut cfg, false, &Reporter::new()).unwrap();

    // The foreign PC landed under the external module, keyed by function.
    let data = store
        .prof_data(0, "external", ProfSelector::Function("Unknown"))
        .unwrap()
        .expect("placeholder location persisted");
    assert_eq!(data.runtime, 10.0);

    // A fresh CFG seeded from the store reuses the same identity.
    let mut cfg2 = Cfg::new();
    cfg2.seed_external_functions(store.external_locations("external").unwrap());
    assert!(cfg2.function("Unknown").is_some());
}
