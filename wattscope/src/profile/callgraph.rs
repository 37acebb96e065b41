//! Offline call-graph trace import
//!
//! A software-instrumented build of the target can record call arcs and loop
//! iteration counts itself and dump them as a trace file. Importing merges
//! that data into the same `location`/`arc` tables the sampling profiler
//! writes: loop counts attach to existing locations, arc counts are additive
//! (re-importing the same trace doubles them, it never overwrites).
//!
//! File layout (all values little-endian):
//!
//! ```text
//! u64 loPc, hiPc, sampleCount, formatVersion, clockRate,
//!     core, loopEntryCount, reserved
//! loopEntryCount × (u64 pc, u64 count)
//! (u64 callerPc, u64 calleePc, i64 count) … until end of file
//! ```
//!
//! `callerPc` is stored pre-decremented by the caller's call-instruction
//! width and is corrected before resolution.

use super::{attribute_pc, IdGen, Location, LocationKey};
use crate::cfg::Cfg;
use crate::domain::ImportError;
use crate::store::Store;
use crate::symbols::ResolvePc;
use log::{debug, warn};
use std::collections::HashMap;
use std::io::Read;
use wattscope_common::MAX_CORES;

/// Width of the target's call instruction; caller PCs in the trace point at
/// the instruction after the call minus this.
pub const CALL_INSTRUCTION_WIDTH: u64 = 4;

/// The only trace layout this importer understands.
pub const TRACE_FORMAT_VERSION: u64 = 1;

#[derive(Debug, Clone, Copy)]
pub struct TraceHeader {
    pub lo_pc: u64,
    pub hi_pc: u64,
    pub sample_count: u64,
    pub format_version: u64,
    pub clock_rate: u64,
    pub core: u64,
    pub loop_entries: u64,
    pub reserved: u64,
}

impl TraceHeader {
    fn read(reader: &mut impl Read) -> Result<Self, ImportError> {
        let mut fields = [0u64; 8];
        for field in &mut fields {
            *field = read_u64(reader)?.ok_or(ImportError::Truncated)?;
        }
        Ok(Self {
            lo_pc: fields[0],
            hi_pc: fields[1],
            sample_count: fields[2],
            format_version: fields[3],
            clock_rate: fields[4],
            core: fields[5],
            loop_entries: fields[6],
            reserved: fields[7],
        })
    }
}

#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub arcs: u64,
    pub loop_counts: u64,
    /// Consistency-check failures; the import still completes.
    pub warnings: u64,
}

/// Merge one call-graph trace into the store.
pub fn import_trace<R: ResolvePc>(
    reader: &mut impl Read,
    store: &mut Store,
    resolver: &mut R,
    cfg: &mut Cfg,
    multi_image: bool,
) -> Result<ImportOutcome, ImportError> {
    let header = TraceHeader::read(reader)?;
    if header.format_version != TRACE_FORMAT_VERSION {
        return Err(ImportError::UnsupportedVersion(header.format_version));
    }
    if header.core >= MAX_CORES as u64 {
        return Err(ImportError::InvalidCore(header.core));
    }
    let core = usize::try_from(header.core).map_err(|_| ImportError::InvalidCore(header.core))?;
    debug!(
        "importing call-graph trace: core {core}, pc range {:#x}..{:#x}, {} loop entries",
        header.lo_pc, header.hi_pc, header.loop_entries
    );

    let mut merge = Merge::load(store, resolver, cfg, multi_image)?;
    let mut outcome = ImportOutcome::default();

    for _ in 0..header.loop_entries {
        let pc = read_u64(reader)?.ok_or(ImportError::Truncated)?;
        let count = read_u64(reader)?.ok_or(ImportError::Truncated)?;
        if merge.apply_loop_count(core, pc, count) {
            outcome.loop_counts += 1;
        }
    }

    loop {
        let Some(caller_pc) = read_u64(reader)? else {
            break; // clean end of file
        };
        let callee_pc = read_u64(reader)?.ok_or(ImportError::Truncated)?;
        let count = read_i64(reader)?.ok_or(ImportError::Truncated)?;
        if count < 0 {
            warn!("negative arc count {count} for caller {caller_pc:#x}, skipped");
            outcome.warnings += 1;
            continue;
        }
        match merge.apply_arc(core, caller_pc + CALL_INSTRUCTION_WIDTH, callee_pc, count) {
            ArcResult::Recorded => outcome.arcs += 1,
            ArcResult::Inconsistent => {
                outcome.arcs += 1;
                outcome.warnings += 1;
            }
            ArcResult::Dropped => outcome.warnings += 1,
        }
    }

    merge.persist(store)?;
    Ok(outcome)
}

enum ArcResult {
    Recorded,
    /// Recorded, but the caller block has no static call to the callee.
    Inconsistent,
    Dropped,
}

/// In-memory merge state: the rehydrated location set plus anything the
/// trace discovers.
struct Merge<'a, R: ResolvePc> {
    resolver: &'a mut R,
    cfg: &'a mut Cfg,
    multi_image: bool,
    locations: Vec<Location>,
    index: HashMap<LocationKey, usize>,
    ids: IdGen,
}

impl<'a, R: ResolvePc> Merge<'a, R> {
    fn load(
        store: &Store,
        resolver: &'a mut R,
        cfg: &'a mut Cfg,
        multi_image: bool,
    ) -> Result<Self, ImportError> {
        let existing = store.load_locations()?;
        let ids = IdGen::starting_after(store.max_location_id()?);
        let mut merge = Merge {
            resolver,
            cfg,
            multi_image,
            locations: Vec::new(),
            index: HashMap::new(),
            ids,
        };
        for loc in existing {
            merge.index.insert(loc.key.clone(), merge.locations.len());
            merge.locations.push(loc);
        }
        Ok(merge)
    }

    fn location_for(&mut self, key: LocationKey) -> usize {
        match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.locations.len();
                self.locations.push(Location::new(self.ids.next_id(), key.clone()));
                self.index.insert(key, idx);
                idx
            }
        }
    }

    fn apply_loop_count(&mut self, core: usize, pc: u64, count: u64) -> bool {
        let info = self.resolver.resolve_pc(pc);
        let Some(attr) = attribute_pc(self.cfg, &info, core, self.multi_image) else {
            return false;
        };
        if count > 0 && !self.cfg.set_loop_count(attr.bb, count) {
            debug!("no enclosing loop for block {} ({})", self.cfg.node(attr.bb).id, pc);
        }
        let idx = self.location_for(attr.key);
        self.locations[idx].set_loop_count(count);
        count > 0
    }

    fn apply_arc(&mut self, core: usize, caller_pc: u64, callee_pc: u64, count: i64) -> ArcResult {
        let caller_info = self.resolver.resolve_pc(caller_pc);
        let callee_info = self.resolver.resolve_pc(callee_pc);
        let Some(caller) = attribute_pc(self.cfg, &caller_info, core, self.multi_image) else {
            return ArcResult::Dropped;
        };
        let Some(callee) = attribute_pc(self.cfg, &callee_info, core, self.multi_image) else {
            return ArcResult::Dropped;
        };

        // Consistency check against the CFG: only meaningful when both ends
        // are instrumented code with known blocks.
        let mut consistent = true;
        if caller.key.basic_block.is_some()
            && callee.key.basic_block.is_some()
            && !self.cfg.block_calls(caller.bb, &callee.key.function)
        {
            warn!(
                "trace arc {} -> {} has no matching call site in block {}",
                caller.key.function,
                callee.key.function,
                self.cfg.node(caller.bb).id
            );
            consistent = false;
        }

        let caller_id = {
            let idx = self.location_for(caller.key);
            self.locations[idx].id
        };
        let callee_idx = self.location_for(callee.key);
        self.locations[callee_idx].add_caller(caller_id, count);

        if consistent {
            ArcResult::Recorded
        } else {
            ArcResult::Inconsistent
        }
    }

    fn persist(self, store: &mut Store) -> Result<(), ImportError> {
        store.persist_locations(self.locations.iter())?;
        Ok(())
    }
}

fn read_u64(reader: &mut impl Read) -> Result<Option<u64>, ImportError> {
    let mut buf = [0u8; 8];
    if read_exact_or_eof(reader, &mut buf)? {
        Ok(Some(u64::from_le_bytes(buf)))
    } else {
        Ok(None)
    }
}

fn read_i64(reader: &mut impl Read) -> Result<Option<i64>, ImportError> {
    let mut buf = [0u8; 8];
    if read_exact_or_eof(reader, &mut buf)? {
        Ok(Some(i64::from_le_bytes(buf)))
    } else {
        Ok(None)
    }
}

/// Fill `buf` completely, distinguishing clean EOF (nothing read) from a
/// truncated record (partial read).
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool, ImportError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(ImportError::Truncated);
        }
        filled += n;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_reads_eight_fields() {
        let mut bytes = Vec::new();
        for v in [0x1000u64, 0x2000, 10, TRACE_FORMAT_VERSION, 48_000_000, 2, 1, 0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let header = TraceHeader::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(header.lo_pc, 0x1000);
        assert_eq!(header.core, 2);
        assert_eq!(header.loop_entries, 1);
    }

    #[test]
    fn truncated_header_is_an_error() {
        let bytes = [0u8; 63];
        assert!(matches!(
            TraceHeader::read(&mut bytes.as_slice()),
            Err(ImportError::Truncated)
        ));
    }

    #[test]
    fn partial_trailing_record_is_truncation() {
        let mut buf = [0u8; 8];
        let mut partial: &[u8] = &[1, 2, 3];
        assert!(matches!(
            read_exact_or_eof(&mut partial, &mut buf),
            Err(ImportError::Truncated)
        ));
        let mut empty: &[u8] = &[];
        assert!(!read_exact_or_eof(&mut empty, &mut buf).unwrap());
    }
}
