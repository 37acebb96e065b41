//! PC-to-symbol resolution
//!
//! Maps raw program-counter values to `(module, function, basic block,
//! source line)` identities. Resolution order:
//!
//! 1. Exact-PC cache, the dominant path; every PC ever resolved is memoized.
//! 2. Per-image `addr2line` invocation, windowed by an externally supplied
//!    load-offset table. The load offset is subtracted only for relocatable
//!    images; fully linked executables keep the PC unmodified.
//! 3. Sorted kernel/static symbol-table fallback (greatest address ≤ PC).
//!
//! The external tool spawn dominates wall-clock cost, which is why the cache
//! is part of the contract rather than an optimization. Instrumented builds
//! encode basic-block identity in the DWARF file name: a name starting with
//! `@` carries the module id, and the line number is the basic-block id.

use crate::domain::ResolveError;
use log::{debug, warn};
use object::{Object, ObjectSymbol};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// File-name marker prefix for instrumented basic-block identities.
pub const BB_MARKER: char = '@';

/// One resolved PC. `function == "Unknown"` with `line == 0` is the
/// unresolved sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub function: String,
    pub filename: String,
    /// Image (or "kallsyms") that resolved this PC.
    pub elf: String,
    pub line: u64,
}

pub const UNKNOWN_FUNCTION: &str = "Unknown";

impl SymbolInfo {
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            function: UNKNOWN_FUNCTION.to_string(),
            filename: String::new(),
            elf: String::new(),
            line: 0,
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.function == UNKNOWN_FUNCTION && self.line == 0
    }

    /// True when the file name carries an instrumented basic-block marker.
    #[must_use]
    pub fn is_basic_block(&self) -> bool {
        self.filename.starts_with(BB_MARKER)
    }

    /// Module id encoded after the marker character.
    #[must_use]
    pub fn module_id(&self) -> &str {
        self.filename.strip_prefix(BB_MARKER).unwrap_or(&self.filename)
    }
}

/// Narrow seam the aggregator consumes; lets tests drive the pipeline with a
/// fixed PC table instead of a toolchain.
pub trait ResolvePc {
    fn resolve_pc(&mut self, pc: u64) -> SymbolInfo;
}

/// Load window of one image in the target address space.
#[derive(Debug, Clone, Copy)]
pub struct ImageWindow {
    pub offset: u64,
    pub size: u64,
}

impl ImageWindow {
    #[must_use]
    pub fn contains(&self, pc: u64) -> bool {
        pc >= self.offset && pc < self.offset + self.size
    }
}

/// Resolution counters, exposed for diagnostics and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolverStats {
    pub cache_hits: u64,
    pub tool_invocations: u64,
}

pub struct SymbolResolver {
    images: Vec<PathBuf>,
    /// Image file name → load window. Images without an entry are treated as
    /// unwindowed (cover every PC at offset 0).
    windows: HashMap<String, ImageWindow>,
    kallsyms_path: Option<PathBuf>,
    /// Lazily parsed, sorted by address.
    kallsyms: Option<Vec<(u64, String)>>,
    cache: HashMap<u64, SymbolInfo>,
    /// Image file name → "fully linked executable" (expensive to compute).
    static_cache: HashMap<String, bool>,
    tool: PathBuf,
    pub stats: ResolverStats,
}

impl Default for SymbolResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolResolver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            images: Vec::new(),
            windows: HashMap::new(),
            kallsyms_path: None,
            kallsyms: None,
            cache: HashMap::new(),
            static_cache: HashMap::new(),
            tool: PathBuf::from("addr2line"),
            stats: ResolverStats::default(),
        }
    }

    /// Override the address-to-line tool (tests point this at a stub).
    pub fn with_tool(mut self, tool: impl Into<PathBuf>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn add_image(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !path.as_os_str().is_empty() {
            self.images.push(path);
        }
    }

    pub fn set_kallsyms(&mut self, path: impl Into<PathBuf>) {
        self.kallsyms_path = Some(path.into());
        self.kallsyms = None;
    }

    /// Parse a load-offset table: one `offset size name` line per image,
    /// offset and size in hex. Unparseable lines are skipped.
    pub fn load_offsets_file(&mut self, path: &Path) -> Result<(), ResolveError> {
        let text = std::fs::read_to_string(path)?;
        for line in text.lines() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 3 {
                continue;
            }
            let (Ok(offset), Ok(size)) =
                (u64::from_str_radix(tokens[0], 16), u64::from_str_radix(tokens[1], 16))
            else {
                continue;
            };
            self.windows.insert(tokens[2].to_string(), ImageWindow { offset, size });
        }
        Ok(())
    }

    /// Resolve a byte-address PC, memoized.
    pub fn resolve(&mut self, pc: u64) -> SymbolInfo {
        if let Some(cached) = self.cache.get(&pc) {
            self.stats.cache_hits += 1;
            return cached.clone();
        }
        let resolved = self.resolve_uncached(pc);
        self.cache.insert(pc, resolved.clone());
        resolved
    }

    fn resolve_uncached(&mut self, pc: u64) -> SymbolInfo {
        let images = self.images.clone();
        for image in &images {
            let name = file_name(image);
            if let Some(window) = self.windows.get(&name).copied() {
                if !window.contains(pc) {
                    continue;
                }
            }
            let offset = if self.is_static(image) {
                0
            } else {
                self.windows.get(&name).map_or(0, |w| w.offset)
            };

            match self.run_tool(pc - offset, image) {
                Ok(info) if !info.is_unknown() => return info,
                Ok(_) => {} // image covered the PC but had no answer; keep looking
                Err(err) => {
                    // Cache the sentinel via the caller so the tool is not
                    // re-invoked for this PC.
                    warn!("addr2line failed for {:#x} in {}: {err}", pc, image.display());
                    return SymbolInfo::unknown();
                }
            }
        }

        if let Some(info) = self.resolve_kallsyms(pc) {
            return info;
        }
        SymbolInfo::unknown()
    }

    /// One external tool invocation against one image.
    fn run_tool(&mut self, addr: u64, image: &Path) -> Result<SymbolInfo, ResolveError> {
        self.stats.tool_invocations += 1;
        let output = Command::new(&self.tool)
            .arg("-C")
            .arg("-f")
            .arg("-a")
            .arg(format!("{addr:x}"))
            .arg("-e")
            .arg(image)
            .output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();

        // Line 1 echoes the address; discard it.
        let (Some(_), Some(function_line), Some(location_line)) =
            (lines.next(), lines.next(), lines.next())
        else {
            return Err(ResolveError::Io(std::io::Error::other("truncated addr2line output")));
        };

        let function = match function_line.trim() {
            "??" | "" => UNKNOWN_FUNCTION.to_string(),
            f => f.to_string(),
        };
        let (filename, line) = match location_line.trim().rsplit_once(':') {
            Some((file, line)) => {
                // addr2line may append " (discriminator N)" after the number.
                let digits: String = line.chars().take_while(char::is_ascii_digit).collect();
                (file.to_string(), digits.parse().unwrap_or(0))
            }
            None => (String::new(), 0),
        };
        Ok(SymbolInfo { function, filename, elf: file_name(image), line })
    }

    fn resolve_kallsyms(&mut self, pc: u64) -> Option<SymbolInfo> {
        let path = self.kallsyms_path.clone()?;
        if self.kallsyms.is_none() {
            self.kallsyms = Some(load_kallsyms(&path).unwrap_or_else(|err| {
                warn!("can't read symbol table {}: {err}", path.display());
                Vec::new()
            }));
        }
        let table = self.kallsyms.as_ref()?;
        // Greatest symbol address <= pc.
        let idx = match table.binary_search_by_key(&pc, |(addr, _)| *addr) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        let (_, symbol) = &table[idx];
        debug!("kallsyms fallback: {pc:#x} -> {symbol}");
        Some(SymbolInfo {
            function: symbol.clone(),
            filename: String::new(),
            elf: "kallsyms".to_string(),
            line: 0,
        })
    }

    /// Is the image a fully linked executable (as opposed to a relocatable /
    /// position-independent one)? Cached per image: answering means parsing
    /// the ELF header from disk.
    pub fn is_static(&mut self, image: &Path) -> bool {
        let name = file_name(image);
        if let Some(&cached) = self.static_cache.get(&name) {
            return cached;
        }
        let is_static = std::fs::read(image)
            .ok()
            .and_then(|data| object::File::parse(&*data).ok().map(|obj| obj.kind()))
            .is_some_and(|kind| kind == object::ObjectKind::Executable);
        self.static_cache.insert(name, is_static);
        is_static
    }

    /// Find a symbol's address across the loaded images, adding the image's
    /// load offset for relocatable images. Used to arm the start/stop
    /// breakpoints from configured function names.
    pub fn lookup_symbol(&mut self, symbol: &str) -> Result<u64, ResolveError> {
        for image in &self.images.clone() {
            let data = std::fs::read(image).map_err(|source| ResolveError::Image {
                path: image.display().to_string(),
                source,
            })?;
            let obj = object::File::parse(&*data).map_err(|source| ResolveError::Parse {
                path: image.display().to_string(),
                source,
            })?;
            let offset = if self.is_static(image) {
                0
            } else {
                self.windows.get(&file_name(image)).map_or(0, |w| w.offset)
            };
            for sym in obj.symbols() {
                if sym.name().is_ok_and(|name| name == symbol) {
                    return Ok(sym.address() + offset);
                }
            }
        }
        Err(ResolveError::SymbolNotFound(symbol.to_string()))
    }
}

impl ResolvePc for SymbolResolver {
    fn resolve_pc(&mut self, pc: u64) -> SymbolInfo {
        self.resolve(pc)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned())
}

fn load_kallsyms(path: &Path) -> std::io::Result<Vec<(u64, String)>> {
    let text = std::fs::read_to_string(path)?;
    let mut table: Vec<(u64, String)> = text
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 3 {
                return None;
            }
            let addr = u64::from_str_radix(tokens[0], 16).ok()?;
            Some((addr, tokens[2].to_string()))
        })
        .collect();
    table.sort_by_key(|(addr, _)| *addr);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unresolvable_pc_is_unknown_and_cached() {
        let mut resolver = SymbolResolver::new();
        let first = resolver.resolve(0x1234);
        assert!(first.is_unknown());
        let hits_before = resolver.stats.cache_hits;
        let second = resolver.resolve(0x1234);
        assert_eq!(first, second);
        assert_eq!(resolver.stats.cache_hits, hits_before + 1);
    }

    #[test]
    fn bb_marker_extracts_module_id() {
        let info = SymbolInfo {
            function: "f".to_string(),
            filename: "@main.c".to_string(),
            elf: "app.elf".to_string(),
            line: 7,
        };
        assert!(info.is_basic_block());
        assert_eq!(info.module_id(), "main.c");
    }

    #[test]
    fn kallsyms_picks_greatest_symbol_at_or_below_pc() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0000000000001000 T first").unwrap();
        writeln!(file, "0000000000002000 T second").unwrap();
        writeln!(file, "malformed line").unwrap();
        writeln!(file, "0000000000003000 T third").unwrap();
        file.flush().unwrap();

        let mut resolver = SymbolResolver::new();
        resolver.set_kallsyms(file.path());

        assert_eq!(resolver.resolve(0x2000).function, "second");
        assert_eq!(resolver.resolve(0x2fff).function, "second");
        assert_eq!(resolver.resolve(0x3000).function, "third");
        assert!(resolver.resolve(0xfff).is_unknown());
        assert_eq!(resolver.resolve(0x2000).elf, "kallsyms");
        assert_eq!(resolver.resolve(0x2000).line, 0);
    }

    #[test]
    fn offsets_file_windows_images() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1000 2000 app.elf").unwrap();
        writeln!(file, "# comment").unwrap();
        file.flush().unwrap();

        let mut resolver = SymbolResolver::new();
        resolver.load_offsets_file(file.path()).unwrap();
        let window = resolver.windows.get("app.elf").unwrap();
        assert!(window.contains(0x1000));
        assert!(window.contains(0x2fff));
        assert!(!window.contains(0x3000));
        assert!(!window.contains(0xfff));
    }
}
