//! Location/call-graph aggregation
//!
//! The central data-flow sink: consumes the ordered `(core, pc, power[], Δt)`
//! sample stream and produces [`Location`] accumulators, call arcs and the
//! run [`Summary`] with frame-windowed statistics. Two entry modes share the
//! same location model:
//!
//! - streaming aggregation over the stored measurement series
//!   ([`Aggregator::add_sample`], driven by [`aggregate`]), and
//! - offline call-graph trace import ([`callgraph::import_trace`]).
//!
//! PC attribution follows the CFG collaborator: instrumented PCs carry exact
//! basic-block identity via the `@` marker, known functions attribute to
//! their entry block, and foreign code gets a placeholder identity under the
//! external module (function-only, no basic block).

pub mod callgraph;
pub mod location;

pub use location::{FrameBoundary, Location, LocationKey, MinAvgMax, MinAvgMaxAccum, Summary};

use crate::cfg::{Cfg, NodeId, EXTERNAL_MODULE};
use crate::domain::{LocationId, StoreError};
use crate::progress::Reporter;
use crate::store::{Measurement, ResolvedIdentity, Store};
use crate::symbols::{ResolvePc, SymbolInfo};
use log::warn;
use std::collections::HashMap;
use wattscope_common::{MAX_CORES, MAX_SENSORS, PC_SHIFT};

/// Explicit location-id sequence; ids are unique across the run and continue
/// above the highest persisted id when resuming.
#[derive(Debug)]
pub struct IdGen {
    next: i64,
}

impl IdGen {
    #[must_use]
    pub fn starting_after(max_persisted: i64) -> Self {
        Self { next: max_persisted + 1 }
    }

    pub fn next_id(&mut self) -> LocationId {
        let id = LocationId(self.next);
        self.next += 1;
        id
    }
}

/// Where a resolved PC lands in the profile model.
#[derive(Debug)]
pub struct Attribution {
    pub key: LocationKey,
    /// CFG node of the attributed basic block. Present for instrumented and
    /// known-function code; placeholder blocks for foreign code.
    pub bb: NodeId,
}

/// Map one resolved PC to its location identity, synthesizing a placeholder
/// for foreign code. Returns `None` only for an instrumented marker whose
/// module or block the CFG does not know (logged, sample dropped).
pub fn attribute_pc(
    cfg: &mut Cfg,
    info: &SymbolInfo,
    core: usize,
    multi_image: bool,
) -> Option<Attribution> {
    if info.is_basic_block() {
        let module_id = info.module_id().to_string();
        let bb_id = info.line.to_string();
        let Some(module) = cfg.module(&module_id) else {
            warn!("instrumented PC names unknown module {module_id}");
            return None;
        };
        let Some(bb) = cfg.basic_block(module, &bb_id) else {
            warn!("instrumented PC names unknown block {bb_id} in module {module_id}");
            return None;
        };
        let function = cfg.enclosing_function(bb).map(|f| cfg.node(f).id.clone())?;
        return Some(Attribution {
            key: LocationKey {
                core,
                module: module_id,
                function,
                basic_block: Some(bb_id),
            },
            bb,
        });
    }

    if let Some(function) = cfg.function(&info.function) {
        if let Some(bb) = cfg.first_bb(function) {
            let module = cfg
                .enclosing_module(function)
                .map_or_else(|| EXTERNAL_MODULE.to_string(), |m| cfg.node(m).id.clone());
            return Some(Attribution {
                key: LocationKey {
                    core,
                    module,
                    function: info.function.clone(),
                    basic_block: Some(cfg.node(bb).id.clone()),
                },
                bb,
            });
        }
    }

    // The function is not in the CFG: foreign code. Identity is function-only
    // under the reserved external module.
    let elf = (multi_image && !info.elf.is_empty()).then_some(info.elf.as_str());
    let qualified = Cfg::qualify_external(&info.function, core, elf);
    let (_, bb) = cfg.external_function(&qualified);
    Some(Attribution {
        key: LocationKey {
            core,
            module: EXTERNAL_MODULE.to_string(),
            function: qualified,
            basic_block: None,
        },
        bb,
    })
}

/// Streaming aggregation state over one pass.
pub struct Aggregator<'a, R: ResolvePc> {
    resolver: &'a mut R,
    cfg: &'a mut Cfg,
    multi_image: bool,
    locations: Vec<Location>,
    index: HashMap<LocationKey, usize>,
    ids: IdGen,
    frames: Vec<FrameBoundary>,
    frame_cursor: usize,
    frames_closed: u64,
    /// Close time of the previous frame; the first frame opens at the first
    /// sample's time.
    previous_boundary: Option<i64>,
    first_sample_time: Option<i64>,
    frame_runtime_acc: MinAvgMaxAccum,
    frame_energy_acc: [MinAvgMaxAccum; MAX_SENSORS],
    /// Energy accumulated in the open frame, counted once per sample (not
    /// per core) so frame energy matches the physical rail energy.
    frame_energy_open: [f64; MAX_SENSORS],
    summary: Summary,
}

impl<'a, R: ResolvePc> Aggregator<'a, R> {
    pub fn new(
        resolver: &'a mut R,
        cfg: &'a mut Cfg,
        frames: Vec<FrameBoundary>,
        ids: IdGen,
        multi_image: bool,
    ) -> Self {
        Self {
            resolver,
            cfg,
            multi_image,
            locations: Vec::new(),
            index: HashMap::new(),
            ids,
            frames,
            frame_cursor: 0,
            frames_closed: 0,
            previous_boundary: None,
            first_sample_time: None,
            frame_runtime_acc: MinAvgMaxAccum::default(),
            frame_energy_acc: [MinAvgMaxAccum::default(); MAX_SENSORS],
            frame_energy_open: [0.0; MAX_SENSORS],
            summary: Summary::default(),
        }
    }

    fn location_for(&mut self, key: LocationKey) -> &mut Location {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.locations.len();
                self.locations.push(Location::new(self.ids.next_id(), key.clone()));
                self.index.insert(key, idx);
                idx
            }
        };
        &mut self.locations[idx]
    }

    /// Feed one measurement. Returns the per-core resolved identities for
    /// write-back onto the measurement row.
    #[allow(clippy::cast_precision_loss)]
    pub fn add_sample(&mut self, m: &Measurement) -> [Option<ResolvedIdentity>; MAX_CORES] {
        if self.first_sample_time.is_none() {
            self.first_sample_time = Some(m.time);
        }
        self.close_frames_before(m.time);

        self.summary.samples += 1;
        self.summary.min_time = self.summary.min_time.min(m.time);
        self.summary.max_time = self.summary.max_time.max(m.time);

        let dt = m.time_since_last as f64;
        self.summary.runtime += dt;
        for sensor in 0..MAX_SENSORS {
            let power = m.power[sensor];
            self.summary.min_power[sensor] = self.summary.min_power[sensor].min(power);
            self.summary.max_power[sensor] = self.summary.max_power[sensor].max(power);
            self.summary.energy[sensor] += power * dt;
            self.frame_energy_open[sensor] += power * dt;
        }

        let mut resolved: [Option<ResolvedIdentity>; MAX_CORES] = Default::default();
        for core in 0..MAX_CORES {
            let info = self.resolver.resolve_pc(m.pc[core] << PC_SHIFT);
            let Some(attribution) = attribute_pc(self.cfg, &info, core, self.multi_image) else {
                continue;
            };
            resolved[core] = Some(ResolvedIdentity {
                basic_block: self.cfg.node(attribution.bb).id.clone(),
                module: attribution.key.module.clone(),
            });
            let loc = self.location_for(attribution.key);
            loc.add_runtime(dt);
            for sensor in 0..MAX_SENSORS {
                loc.add_energy(sensor, m.power[sensor] * dt);
            }
        }
        resolved
    }

    #[allow(clippy::cast_precision_loss)]
    fn close_frames_before(&mut self, time: i64) {
        while self.frame_cursor < self.frames.len() && time > self.frames[self.frame_cursor].time {
            let boundary = self.frames[self.frame_cursor];
            let opened =
                self.previous_boundary.or(self.first_sample_time).unwrap_or(boundary.time);
            let frame_runtime = (boundary.time - opened - boundary.delay) as f64;
            self.frame_runtime_acc.record(frame_runtime);

            for sensor in 0..MAX_SENSORS {
                self.frame_energy_acc[sensor].record(self.frame_energy_open[sensor]);
            }
            self.frame_energy_open = [0.0; MAX_SENSORS];
            for loc in &mut self.locations {
                loc.close_frame();
            }

            self.frames_closed += 1;
            self.previous_boundary = Some(boundary.time);
            self.frame_cursor += 1;
        }
    }

    /// Finish the pass: turn per-frame sums into averages and close out the
    /// summary. Consumes the aggregator.
    #[must_use]
    pub fn finalize(mut self) -> (Vec<Location>, Summary) {
        for loc in &mut self.locations {
            loc.finalize_frame_avg(self.frames_closed);
        }
        self.summary.frame_runtime = self.frame_runtime_acc.finish();
        for sensor in 0..MAX_SENSORS {
            self.summary.frame_energy[sensor] = self.frame_energy_acc[sensor].finish();
        }
        if self.summary.samples == 0 {
            self.summary.min_time = 0;
            self.summary.min_power = [0.0; MAX_SENSORS];
        }
        (self.locations, self.summary)
    }

    #[must_use]
    pub fn frames_closed(&self) -> u64 {
        self.frames_closed
    }
}

/// Outcome of a full aggregation pass.
#[derive(Debug)]
pub struct AggregateOutcome {
    pub summary: Summary,
    pub locations: usize,
    pub frames_closed: u64,
}

/// Batch size for writing resolved identities back onto measurement rows.
const RESOLVE_BATCH: usize = 1024;

/// The post-processing pass: scan the measurement series in time order,
/// resolve and attribute every PC, write resolved identities back, and
/// replace the derived `location`/`arc`/`meta` data.
pub fn aggregate<R: ResolvePc>(
    store: &mut Store,
    resolver: &mut R,
    cfg: &mut Cfg,
    multi_image: bool,
    progress: &Reporter,
) -> Result<AggregateOutcome, StoreError> {
    progress.advance(0, "Reading samples");
    let rows = store.measurements()?;
    let frames = store.frames()?;

    // Derived data is rebuilt from scratch; ids restart at 1.
    store.clear_analysis()?;

    let mut aggregator =
        Aggregator::new(resolver, cfg, frames, IdGen::starting_after(0), multi_image);

    progress.advance(1, "Resolving program counters");
    let mut pending: Vec<(i64, [Option<ResolvedIdentity>; MAX_CORES])> =
        Vec::with_capacity(RESOLVE_BATCH);
    for row in &rows {
        let resolved = aggregator.add_sample(&row.measurement);
        pending.push((row.rowid, resolved));
        if pending.len() >= RESOLVE_BATCH {
            store.write_resolved(&pending)?;
            pending.clear();
        }
    }
    if !pending.is_empty() {
        store.write_resolved(&pending)?;
    }

    progress.advance(2, "Writing profile");
    let frames_closed = aggregator.frames_closed();
    let (locations, summary) = aggregator.finalize();
    store.persist_locations(locations.iter())?;
    store.write_meta(&summary)?;

    Ok(AggregateOutcome { summary, locations: locations.len(), frames_closed })
}

/// Call ratio between a basic block and a function, answered from the
/// persisted arc table: calls from `bb` into the function's entry block over
/// all calls into that entry block. 0 when nothing calls the function.
pub fn call_ratio(
    store: &Store,
    cfg: &Cfg,
    core: usize,
    bb: NodeId,
    function: NodeId,
) -> Result<f64, StoreError> {
    use crate::store::ProfSelector;

    let Some(entry) = cfg.first_bb(function) else {
        return Ok(0.0);
    };
    let bb_module = cfg.enclosing_module(bb).map(|m| cfg.node(m).id.clone()).unwrap_or_default();
    let entry_module =
        cfg.enclosing_module(entry).map(|m| cfg.node(m).id.clone()).unwrap_or_default();

    let from = store.location_id(core, &bb_module, ProfSelector::BasicBlock(&cfg.node(bb).id))?;
    let to =
        store.location_id(core, &entry_module, ProfSelector::BasicBlock(&cfg.node(entry).id))?;
    match (from, to) {
        (Some(from), Some(to)) => store.call_ratio(LocationId(from), LocationId(to)),
        _ => Ok(0.0),
    }
}
