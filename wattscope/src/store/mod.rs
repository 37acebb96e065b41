//! Profile database
//!
//! The relational schema is the durable interchange format of the profiler:
//! raw samples (`measurements`), resolved per-identity accumulators
//! (`location`), call-graph edges (`arc`), frame boundaries (`frames`) and
//! the single run summary (`meta`). Acquisition bulk-inserts measurements
//! inside one transaction per session and only builds the time index after
//! the bulk load; the analysis pass rewrites `location`/`arc`/`meta` and
//! writes resolved identities back onto the measurement rows.

use crate::domain::{LocationId, StoreError};
use crate::profile::{FrameBoundary, Location, LocationKey, MinAvgMax, Summary};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use wattscope_common::{cycles_to_seconds, MAX_CORES, MAX_SENSORS, PC_SHIFT};

/// One raw measurement row: device time, delta to the previous sample, the
/// per-core PCs in device units and the calibrated per-sensor power.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub time: i64,
    pub time_since_last: i64,
    pub pc: [u64; MAX_CORES],
    pub power: [f64; MAX_SENSORS],
}

/// A measurement row read back for the analysis pass.
#[derive(Debug, Clone)]
pub struct MeasurementRow {
    pub rowid: i64,
    pub measurement: Measurement,
}

/// Resolved code identity written back onto a measurement row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub basic_block: String,
    pub module: String,
}

/// Accumulator row answered by [`Store::prof_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProfData {
    pub id: i64,
    pub runtime: f64,
    pub energy: [f64; MAX_SENSORS],
    pub runtime_frame: f64,
    pub energy_frame: [f64; MAX_SENSORS],
    pub loop_count: u64,
    /// Total recorded calls into this location.
    pub calls: i64,
}

/// How to select a location row within `(core, module)`: by basic block for
/// instrumented code, by function for foreign (external-module) code.
#[derive(Debug, Clone, Copy)]
pub enum ProfSelector<'a> {
    BasicBlock(&'a str),
    Function(&'a str),
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) a profile database. Failure to open is
    /// always fatal.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".to_string(),
            source,
        })?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS measurements (
                 time INT, timeSinceLast INT,
                 pc1 INT, pc2 INT, pc3 INT, pc4 INT,
                 basicblock1 TEXT, module1 TEXT,
                 basicblock2 TEXT, module2 TEXT,
                 basicblock3 TEXT, module3 TEXT,
                 basicblock4 TEXT, module4 TEXT,
                 power1 REAL, power2 REAL, power3 REAL, power4 REAL,
                 power5 REAL, power6 REAL, power7 REAL);
             CREATE TABLE IF NOT EXISTS location (
                 id INTEGER PRIMARY KEY, core INT,
                 basicblock TEXT, function TEXT, module TEXT,
                 runtime REAL,
                 energy1 REAL, energy2 REAL, energy3 REAL, energy4 REAL,
                 energy5 REAL, energy6 REAL, energy7 REAL,
                 runtimeFrame REAL,
                 energyFrame1 REAL, energyFrame2 REAL, energyFrame3 REAL,
                 energyFrame4 REAL, energyFrame5 REAL, energyFrame6 REAL,
                 energyFrame7 REAL,
                 loopcount INT);
             CREATE TABLE IF NOT EXISTS arc (fromid INT, selfid INT, num INT);
             CREATE TABLE IF NOT EXISTS frames (time INT, delay INT);
             CREATE TABLE IF NOT EXISTS meta (
                 samples INT, mintime INT, maxtime INT,
                 minpower1 REAL, minpower2 REAL, minpower3 REAL, minpower4 REAL,
                 minpower5 REAL, minpower6 REAL, minpower7 REAL,
                 maxpower1 REAL, maxpower2 REAL, maxpower3 REAL, maxpower4 REAL,
                 maxpower5 REAL, maxpower6 REAL, maxpower7 REAL,
                 runtime REAL,
                 energy1 REAL, energy2 REAL, energy3 REAL, energy4 REAL,
                 energy5 REAL, energy6 REAL, energy7 REAL,
                 frameRuntimeMin REAL, frameRuntimeAvg REAL, frameRuntimeMax REAL,
                 frameEnergyMin1 REAL, frameEnergyAvg1 REAL, frameEnergyMax1 REAL,
                 frameEnergyMin2 REAL, frameEnergyAvg2 REAL, frameEnergyMax2 REAL,
                 frameEnergyMin3 REAL, frameEnergyAvg3 REAL, frameEnergyMax3 REAL,
                 frameEnergyMin4 REAL, frameEnergyAvg4 REAL, frameEnergyMax4 REAL,
                 frameEnergyMin5 REAL, frameEnergyAvg5 REAL, frameEnergyMax5 REAL,
                 frameEnergyMin6 REAL, frameEnergyAvg6 REAL, frameEnergyMax6 REAL,
                 frameEnergyMin7 REAL, frameEnergyAvg7 REAL, frameEnergyMax7 REAL);",
        )?;
        Ok(())
    }

    /// Drop all profile data for a fresh run.
    pub fn clean(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "DELETE FROM measurements;
             DELETE FROM location;
             DELETE FROM arc;
             DELETE FROM frames;
             DELETE FROM meta;",
        )?;
        Ok(())
    }

    /// Drop derived data only; raw measurements and frames stay.
    pub fn clear_analysis(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "DELETE FROM location;
             DELETE FROM arc;
             DELETE FROM meta;",
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Acquisition path
    // ------------------------------------------------------------------

    /// Open the one-per-session bulk transaction.
    pub fn begin_bulk(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    /// Commit the bulk transaction. Called on the sentinel sample and on
    /// error termination alike; partial data is preserved.
    pub fn commit_bulk(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn insert_measurement(&self, m: &Measurement) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO measurements (time, timeSinceLast, pc1, pc2, pc3, pc4,
                 power1, power2, power3, power4, power5, power6, power7)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        stmt.execute(params![
            m.time,
            m.time_since_last,
            as_sql(m.pc[0]),
            as_sql(m.pc[1]),
            as_sql(m.pc[2]),
            as_sql(m.pc[3]),
            m.power[0],
            m.power[1],
            m.power[2],
            m.power[3],
            m.power[4],
            m.power[5],
            m.power[6],
        ])?;
        Ok(())
    }

    /// Build the time index once the bulk load is done; indexing during the
    /// load would cut insert throughput.
    pub fn create_time_index(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("CREATE INDEX IF NOT EXISTS measurements_time ON measurements (time)")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Analysis path
    // ------------------------------------------------------------------

    /// All measurements in time order (the aggregation input).
    pub fn measurements(&self) -> Result<Vec<MeasurementRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT rowid, time, timeSinceLast, pc1, pc2, pc3, pc4,
                    power1, power2, power3, power4, power5, power6, power7
             FROM measurements ORDER BY time",
        )?;
        let rows = stmt.query_map([], |row| {
            let mut pc = [0u64; MAX_CORES];
            for (i, p) in pc.iter_mut().enumerate() {
                *p = from_sql(row.get(3 + i)?);
            }
            let mut power = [0.0; MAX_SENSORS];
            for (i, p) in power.iter_mut().enumerate() {
                *p = row.get(7 + i)?;
            }
            Ok(MeasurementRow {
                rowid: row.get(0)?,
                measurement: Measurement {
                    time: row.get(1)?,
                    time_since_last: row.get(2)?,
                    pc,
                    power,
                },
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Write resolved per-core identities back onto measurement rows, one
    /// transaction for the whole batch.
    pub fn write_resolved(
        &mut self,
        rows: &[(i64, [Option<ResolvedIdentity>; MAX_CORES])],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE measurements SET
                     basicblock1 = ?2, module1 = ?3,
                     basicblock2 = ?4, module2 = ?5,
                     basicblock3 = ?6, module3 = ?7,
                     basicblock4 = ?8, module4 = ?9
                 WHERE rowid = ?1",
            )?;
            for (rowid, identities) in rows {
                let col = |core: usize| -> (Option<&str>, Option<&str>) {
                    identities[core]
                        .as_ref()
                        .map_or((None, None), |r| (Some(r.basic_block.as_str()), Some(r.module.as_str())))
                };
                let (bb1, m1) = col(0);
                let (bb2, m2) = col(1);
                let (bb3, m3) = col(2);
                let (bb4, m4) = col(3);
                stmt.execute(params![rowid, bb1, m1, bb2, m2, bb3, m3, bb4, m4])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Locations and arcs
    // ------------------------------------------------------------------

    /// Rehydrate every persisted location (`in_db = true`); used by the
    /// call-graph import so existing identities keep their ids.
    pub fn load_locations(&self) -> Result<Vec<Location>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, core, basicblock, function, module, runtime,
                    energy1, energy2, energy3, energy4, energy5, energy6, energy7,
                    runtimeFrame,
                    energyFrame1, energyFrame2, energyFrame3, energyFrame4,
                    energyFrame5, energyFrame6, energyFrame7,
                    loopcount
             FROM location",
        )?;
        let rows = stmt.query_map([], |row| {
            let core: i64 = row.get(1)?;
            let key = LocationKey {
                core: usize::try_from(core).unwrap_or(0),
                module: row.get(4)?,
                function: row.get(3)?,
                basic_block: row.get(2)?,
            };
            let mut loc = Location::new(LocationId(row.get(0)?), key);
            loc.runtime = row.get(5)?;
            for (i, e) in loc.energy.iter_mut().enumerate() {
                *e = row.get(6 + i)?;
            }
            loc.runtime_frame_avg = row.get(13)?;
            for (i, e) in loc.energy_frame_avg.iter_mut().enumerate() {
                *e = row.get(14 + i)?;
            }
            let loops: i64 = row.get(21)?;
            loc.loop_count = u64::try_from(loops).unwrap_or(0);
            loc.in_db = true;
            Ok(loc)
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Persist a batch of locations and their newly recorded arcs in one
    /// transaction. New locations insert a full row; locations already in
    /// the store only receive an in-place loop-count update, and only with a
    /// strictly positive count. Arc rows are append-only.
    pub fn persist_locations<'a, I>(&mut self, locations: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = &'a Location>,
    {
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO location (id, core, basicblock, function, module, runtime,
                     energy1, energy2, energy3, energy4, energy5, energy6, energy7,
                     runtimeFrame,
                     energyFrame1, energyFrame2, energyFrame3, energyFrame4,
                     energyFrame5, energyFrame6, energyFrame7,
                     loopcount)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                         ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            )?;
            let mut update_loops =
                tx.prepare_cached("UPDATE location SET loopcount = ?2 WHERE id = ?1")?;
            let mut insert_arc =
                tx.prepare_cached("INSERT INTO arc (fromid, selfid, num) VALUES (?1, ?2, ?3)")?;

            for loc in locations {
                if loc.in_db {
                    if loc.loop_count > 0 {
                        update_loops.execute(params![loc.id.0, as_sql(loc.loop_count)])?;
                    }
                } else {
                    insert.execute(params![
                        loc.id.0,
                        loc.key.core as i64,
                        loc.key.basic_block.as_deref(),
                        loc.key.function,
                        loc.key.module,
                        loc.runtime,
                        loc.energy[0],
                        loc.energy[1],
                        loc.energy[2],
                        loc.energy[3],
                        loc.energy[4],
                        loc.energy[5],
                        loc.energy[6],
                        loc.runtime_frame_avg,
                        loc.energy_frame_avg[0],
                        loc.energy_frame_avg[1],
                        loc.energy_frame_avg[2],
                        loc.energy_frame_avg[3],
                        loc.energy_frame_avg[4],
                        loc.energy_frame_avg[5],
                        loc.energy_frame_avg[6],
                        as_sql(loc.loop_count),
                    ])?;
                }
                for (&caller, &num) in &loc.callers {
                    insert_arc.execute(params![caller, loc.id.0, num])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Highest persisted location id, for seeding the id sequence.
    pub fn max_location_id(&self) -> Result<i64, StoreError> {
        let max: Option<i64> =
            self.conn.query_row("SELECT max(id) FROM location", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    /// `(function, basicblock)` of every location under `module`; used to
    /// re-seed placeholder CFG nodes.
    pub fn external_locations(&self, module: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT function, basicblock FROM location WHERE module = ?1")?;
        let rows = stmt.query_map(params![module], |row| {
            Ok((row.get(0)?, row.get::<_, Option<String>>(1)?.unwrap_or_default()))
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn location_id(
        &self,
        core: usize,
        module: &str,
        selector: ProfSelector<'_>,
    ) -> Result<Option<i64>, StoreError> {
        let (sql, ident) = match selector {
            ProfSelector::BasicBlock(bb) => (
                "SELECT id FROM location WHERE core = ?1 AND module = ?2 AND basicblock = ?3",
                bb,
            ),
            ProfSelector::Function(f) => (
                "SELECT id FROM location WHERE core = ?1 AND module = ?2 AND function = ?3",
                f,
            ),
        };
        let id = self
            .conn
            .query_row(sql, params![core as i64, module, ident], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    pub fn prof_data(
        &self,
        core: usize,
        module: &str,
        selector: ProfSelector<'_>,
    ) -> Result<Option<ProfData>, StoreError> {
        let Some(id) = self.location_id(core, module, selector)? else {
            return Ok(None);
        };
        let mut data = self.conn.query_row(
            "SELECT runtime,
                    energy1, energy2, energy3, energy4, energy5, energy6, energy7,
                    runtimeFrame,
                    energyFrame1, energyFrame2, energyFrame3, energyFrame4,
                    energyFrame5, energyFrame6, energyFrame7,
                    loopcount
             FROM location WHERE id = ?1",
            params![id],
            |row| {
                let mut energy = [0.0; MAX_SENSORS];
                for (i, e) in energy.iter_mut().enumerate() {
                    *e = row.get(1 + i)?;
                }
                let mut energy_frame = [0.0; MAX_SENSORS];
                for (i, e) in energy_frame.iter_mut().enumerate() {
                    *e = row.get(9 + i)?;
                }
                let loops: i64 = row.get(16)?;
                Ok(ProfData {
                    id,
                    runtime: row.get(0)?,
                    energy,
                    runtime_frame: row.get(8)?,
                    energy_frame,
                    loop_count: u64::try_from(loops).unwrap_or(0),
                    calls: 0,
                })
            },
        )?;
        data.calls = self.calls_to(LocationId(id))?;
        Ok(Some(data))
    }

    /// Total recorded calls into a location.
    pub fn calls_to(&self, callee: LocationId) -> Result<i64, StoreError> {
        let sum: Option<i64> = self.conn.query_row(
            "SELECT sum(num) FROM arc WHERE selfid = ?1",
            params![callee.0],
            |row| row.get(0),
        )?;
        Ok(sum.unwrap_or(0))
    }

    fn calls_between(&self, from: LocationId, to: LocationId) -> Result<i64, StoreError> {
        let sum: Option<i64> = self.conn.query_row(
            "SELECT sum(num) FROM arc WHERE fromid = ?1 AND selfid = ?2",
            params![from.0, to.0],
            |row| row.get(0),
        )?;
        Ok(sum.unwrap_or(0))
    }

    /// Fraction of all calls into `to` that originate from `from`; 0 when
    /// `to` has no recorded calls at all.
    #[allow(clippy::cast_precision_loss)]
    pub fn call_ratio(&self, from: LocationId, to: LocationId) -> Result<f64, StoreError> {
        let total = self.calls_to(to)?;
        if total == 0 {
            return Ok(0.0);
        }
        Ok(self.calls_between(from, to)? as f64 / total as f64)
    }

    // ------------------------------------------------------------------
    // Frames and summary
    // ------------------------------------------------------------------

    pub fn insert_frame(&self, frame: FrameBoundary) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO frames (time, delay) VALUES (?1, ?2)",
            params![frame.time, frame.delay],
        )?;
        Ok(())
    }

    pub fn frames(&self) -> Result<Vec<FrameBoundary>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT time, delay FROM frames ORDER BY time")?;
        let rows = stmt.query_map([], |row| {
            Ok(FrameBoundary { time: row.get(0)?, delay: row.get(1)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Replace the single summary row.
    pub fn write_meta(&self, s: &Summary) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM meta", [])?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO meta VALUES (?1, ?2, ?3,
                 ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                 ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18,
                 ?19, ?20, ?21, ?22, ?23, ?24, ?25,
                 ?26, ?27, ?28,
                 ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38, ?39, ?40,
                 ?41, ?42, ?43, ?44, ?45, ?46, ?47, ?48, ?49)",
        )?;
        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(49);
        values.push(as_sql(s.samples).into());
        values.push(s.min_time.into());
        values.push(s.max_time.into());
        for p in s.min_power {
            values.push(p.into());
        }
        for p in s.max_power {
            values.push(p.into());
        }
        values.push(s.runtime.into());
        for e in s.energy {
            values.push(e.into());
        }
        values.push(s.frame_runtime.min.into());
        values.push(s.frame_runtime.avg.into());
        values.push(s.frame_runtime.max.into());
        for fe in s.frame_energy {
            values.push(fe.min.into());
            values.push(fe.avg.into());
            values.push(fe.max.into());
        }
        stmt.execute(rusqlite::params_from_iter(values))?;
        debug!("meta row rewritten ({} samples)", s.samples);
        Ok(())
    }

    pub fn read_meta(&self) -> Result<Option<Summary>, StoreError> {
        let summary = self
            .conn
            .query_row("SELECT * FROM meta", [], |row| {
                let samples: i64 = row.get(0)?;
                let mut s = Summary {
                    samples: u64::try_from(samples).unwrap_or(0),
                    min_time: row.get(1)?,
                    max_time: row.get(2)?,
                    ..Summary::default()
                };
                for i in 0..MAX_SENSORS {
                    s.min_power[i] = row.get(3 + i)?;
                    s.max_power[i] = row.get(10 + i)?;
                }
                s.runtime = row.get(17)?;
                for i in 0..MAX_SENSORS {
                    s.energy[i] = row.get(18 + i)?;
                }
                s.frame_runtime =
                    MinAvgMax { min: row.get(25)?, avg: row.get(26)?, max: row.get(27)? };
                for i in 0..MAX_SENSORS {
                    let base = 28 + i * 3;
                    s.frame_energy[i] = MinAvgMax {
                        min: row.get(base)?,
                        avg: row.get(base + 1)?,
                        max: row.get(base + 2)?,
                    };
                }
                Ok(s)
            })
            .optional()?;
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Export the measurement series as semicolon-separated values; time in
    /// seconds relative to the run start, PCs as byte addresses.
    pub fn export_csv<W: Write>(&self, out: &mut W) -> Result<(), StoreError> {
        let min_time = self.read_meta()?.map_or(0, |s| s.min_time);

        writeln!(
            out,
            "Time;Power 1;Power 2;Power 3;Power 4;Power 5;Power 6;Power 7;pc1;pc2;pc3;pc4"
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT time, power1, power2, power3, power4, power5, power6, power7,
                    pc1, pc2, pc3, pc4
             FROM measurements ORDER BY time",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let time: i64 = row.get(0)?;
            write!(out, "{}", cycles_to_seconds(time - min_time))?;
            for i in 0..MAX_SENSORS {
                let power: f64 = row.get(1 + i)?;
                write!(out, ";{power}")?;
            }
            for i in 0..MAX_CORES {
                let pc = from_sql(row.get(8 + i)?) << PC_SHIFT;
                write!(out, ";{pc}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Number of stored measurements.
    pub fn measurement_count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn.query_row("SELECT count(*) FROM measurements", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Append arcs for a callee without touching its location row.
    pub fn append_arcs(
        &mut self,
        callee: LocationId,
        callers: &BTreeMap<i64, i64>,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT INTO arc (fromid, selfid, num) VALUES (?1, ?2, ?3)")?;
            for (&caller, &num) in callers {
                stmt.execute(params![caller, callee.0, num])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// SQLite integers are i64; store u64 values bit-for-bit.
#[allow(clippy::cast_possible_wrap)]
fn as_sql(value: u64) -> i64 {
    value as i64
}

#[allow(clippy::cast_sign_loss)]
fn from_sql(value: i64) -> u64 {
    value as u64
}
