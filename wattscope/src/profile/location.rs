//! Location accumulators and run-level summary types.

use crate::domain::LocationId;
use std::collections::BTreeMap;
use wattscope_common::MAX_SENSORS;

/// Identity of a [`Location`]: one per `(core, code identity)`.
///
/// `basic_block == None` is the function-only form used for foreign code
/// discovered at run time; it is a distinct identity from any
/// basic-block-qualified location of the same function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationKey {
    pub core: usize,
    pub module: String,
    pub function: String,
    pub basic_block: Option<String>,
}

/// Per-identity accumulator: cumulative and frame-windowed runtime/energy,
/// trace-supplied loop count, and the callers recorded since the last
/// persist (arc rows are append-only, so only new counts live here).
#[derive(Debug, Clone)]
pub struct Location {
    pub id: LocationId,
    pub key: LocationKey,
    pub runtime: f64,
    pub energy: [f64; MAX_SENSORS],
    /// Running counters of the currently open frame.
    pub runtime_frame: f64,
    pub energy_frame: [f64; MAX_SENSORS],
    /// Sum of per-frame contributions; divided by the closed-frame count in
    /// [`Location::finalize_frame_avg`].
    pub runtime_frame_avg: f64,
    pub energy_frame_avg: [f64; MAX_SENSORS],
    pub loop_count: u64,
    pub callers: BTreeMap<i64, i64>,
    /// Whether a row with this id already exists in the store.
    pub in_db: bool,
}

impl Location {
    #[must_use]
    pub fn new(id: LocationId, key: LocationKey) -> Self {
        Self {
            id,
            key,
            runtime: 0.0,
            energy: [0.0; MAX_SENSORS],
            runtime_frame: 0.0,
            energy_frame: [0.0; MAX_SENSORS],
            runtime_frame_avg: 0.0,
            energy_frame_avg: [0.0; MAX_SENSORS],
            loop_count: 0,
            callers: BTreeMap::new(),
            in_db: false,
        }
    }

    pub fn add_runtime(&mut self, delta: f64) {
        self.runtime += delta;
        self.runtime_frame += delta;
    }

    pub fn add_energy(&mut self, sensor: usize, delta: f64) {
        self.energy[sensor] += delta;
        self.energy_frame[sensor] += delta;
    }

    /// Record a call from `caller`, summing with any existing count.
    pub fn add_caller(&mut self, caller: LocationId, count: i64) {
        *self.callers.entry(caller.0).or_insert(0) += count;
    }

    /// Attach a loop iteration count. A previously recorded positive count is
    /// never regressed to zero.
    pub fn set_loop_count(&mut self, count: u64) {
        if count > 0 {
            self.loop_count = count;
        }
    }

    /// Fold the open frame's counters into the average accumulators and
    /// reset them for the next frame.
    pub fn close_frame(&mut self) {
        self.runtime_frame_avg += self.runtime_frame;
        for sensor in 0..MAX_SENSORS {
            self.energy_frame_avg[sensor] += self.energy_frame[sensor];
        }
        self.runtime_frame = 0.0;
        self.energy_frame = [0.0; MAX_SENSORS];
    }

    /// Divide the accumulated per-frame sums by the closed-frame count.
    /// Called exactly once, at the end of an aggregation pass.
    pub fn finalize_frame_avg(&mut self, frames: u64) {
        if frames == 0 {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let frames = frames as f64;
        self.runtime_frame_avg /= frames;
        for sensor in 0..MAX_SENSORS {
            self.energy_frame_avg[sensor] /= frames;
        }
    }
}

/// One frame boundary: the device time it closes at and the delay spent
/// outside the measured workload (subtracted from the frame's runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBoundary {
    pub time: i64,
    pub delay: i64,
}

/// min/avg/max triple for frame-windowed statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MinAvgMax {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// Streaming min/avg/max accumulator over closed frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinAvgMaxAccum {
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl MinAvgMaxAccum {
    pub fn record(&mut self, value: f64) {
        if self.count == 0 || value < self.min {
            self.min = value;
        }
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.sum += value;
        self.count += 1;
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finish(&self) -> MinAvgMax {
        if self.count == 0 {
            return MinAvgMax::default();
        }
        MinAvgMax { min: self.min, avg: self.sum / self.count as f64, max: self.max }
    }
}

/// Run-level summary, persisted as the single `meta` row.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub samples: u64,
    pub min_time: i64,
    pub max_time: i64,
    pub min_power: [f64; MAX_SENSORS],
    pub max_power: [f64; MAX_SENSORS],
    pub runtime: f64,
    pub energy: [f64; MAX_SENSORS],
    pub frame_runtime: MinAvgMax,
    pub frame_energy: [MinAvgMax; MAX_SENSORS],
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            samples: 0,
            min_time: i64::MAX,
            max_time: 0,
            min_power: [f64::MAX; MAX_SENSORS],
            max_power: [0.0; MAX_SENSORS],
            runtime: 0.0,
            energy: [0.0; MAX_SENSORS],
            frame_runtime: MinAvgMax::default(),
            frame_energy: [MinAvgMax::default(); MAX_SENSORS],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> LocationKey {
        LocationKey {
            core: 0,
            module: "m".to_string(),
            function: "f".to_string(),
            basic_block: Some("1".to_string()),
        }
    }

    #[test]
    fn runtime_updates_both_scopes() {
        let mut loc = Location::new(LocationId(1), key());
        loc.add_runtime(5.0);
        loc.add_runtime(3.0);
        assert_eq!(loc.runtime, 8.0);
        assert_eq!(loc.runtime_frame, 8.0);
        loc.close_frame();
        loc.add_runtime(2.0);
        assert_eq!(loc.runtime, 10.0);
        assert_eq!(loc.runtime_frame, 2.0);
        // Frame runtime never exceeds total runtime.
        assert!(loc.runtime_frame <= loc.runtime);
    }

    #[test]
    fn frame_avg_is_mean_of_closed_frames() {
        let mut loc = Location::new(LocationId(1), key());
        loc.add_runtime(4.0);
        loc.close_frame();
        loc.add_runtime(8.0);
        loc.close_frame();
        loc.finalize_frame_avg(2);
        assert_eq!(loc.runtime_frame_avg, 6.0);
    }

    #[test]
    fn callers_sum_instead_of_overwrite() {
        let mut loc = Location::new(LocationId(2), key());
        loc.add_caller(LocationId(7), 3);
        loc.add_caller(LocationId(7), 4);
        assert_eq!(loc.callers.get(&7), Some(&7));
    }

    #[test]
    fn loop_count_never_regresses_to_zero() {
        let mut loc = Location::new(LocationId(3), key());
        loc.set_loop_count(12);
        loc.set_loop_count(0);
        assert_eq!(loc.loop_count, 12);
    }

    #[test]
    fn min_avg_max_accumulator() {
        let mut acc = MinAvgMaxAccum::default();
        acc.record(2.0);
        let single = acc.finish();
        assert_eq!((single.min, single.avg, single.max), (2.0, 2.0, 2.0));
        acc.record(6.0);
        acc.record(4.0);
        let triple = acc.finish();
        assert_eq!((triple.min, triple.avg, triple.max), (2.0, 4.0, 6.0));
        assert!(triple.min <= triple.avg && triple.avg <= triple.max);
    }
}
