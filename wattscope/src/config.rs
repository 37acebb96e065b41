//! Project configuration
//!
//! A TOML project file describes the measurement setup: per-sensor shunt
//! values and rail voltages, the target images, the optional kernel symbol
//! table and load-offset table, the CFG interchange file, and the start/stop
//! functions framing the sampled region. A missing file falls back to the
//! defaults below; a malformed file is fatal.

use crate::domain::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use wattscope_common::MAX_SENSORS;

/// Default shunt resistances in ohms, one per sensor channel.
const DEFAULT_RL: [f64; MAX_SENSORS] = [0.025, 0.05, 0.05, 0.1, 0.1, 1.0, 10.0];
/// Default rail supply voltage in volts.
const DEFAULT_SUPPLY: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub rl: [f64; MAX_SENSORS],
    pub supply_voltage: [f64; MAX_SENSORS],
    /// Target images, in resolution priority order.
    pub elfs: Vec<PathBuf>,
    /// Kernel/static symbol table used as the resolution fallback.
    pub kallsyms: Option<PathBuf>,
    /// Image load-offset table (`offset size name` per line, hex).
    pub offsets: Option<PathBuf>,
    /// CFG interchange file produced by the instrumentation pipeline.
    pub cfg: Option<PathBuf>,
    pub start_function: String,
    pub start_core: u8,
    pub stop_function: String,
    pub stop_core: u8,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            rl: DEFAULT_RL,
            supply_voltage: [DEFAULT_SUPPLY; MAX_SENSORS],
            elfs: Vec::new(),
            kallsyms: None,
            offsets: None,
            cfg: None,
            start_function: "main".to_string(),
            start_core: 0,
            stop_function: "_exit".to_string(),
            stop_core: 0,
        }
    }
}

/// On-disk shape; every field optional so partial files work.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectFile {
    #[serde(default)]
    probe: ProbeSection,
    #[serde(default)]
    target: TargetSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProbeSection {
    rl: Option<Vec<f64>>,
    supply_voltage: Option<Vec<f64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetSection {
    elfs: Option<Vec<PathBuf>>,
    kallsyms: Option<PathBuf>,
    offsets: Option<PathBuf>,
    cfg: Option<PathBuf>,
    start_function: Option<String>,
    start_core: Option<u8>,
    stop_function: Option<String>,
    stop_core: Option<u8>,
}

fn sensor_array(values: Vec<f64>) -> Result<[f64; MAX_SENSORS], ConfigError> {
    let got = values.len();
    values
        .try_into()
        .map_err(|_| ConfigError::SensorCount { expected: MAX_SENSORS, got })
}

impl ProjectConfig {
    /// Load a project file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let file: ProjectFile = toml::from_str(text)?;
        let mut config = Self::default();
        if let Some(rl) = file.probe.rl {
            config.rl = sensor_array(rl)?;
        }
        if let Some(supply) = file.probe.supply_voltage {
            config.supply_voltage = sensor_array(supply)?;
        }
        let t = file.target;
        if let Some(elfs) = t.elfs {
            config.elfs = elfs;
        }
        config.kallsyms = t.kallsyms;
        config.offsets = t.offsets;
        config.cfg = t.cfg;
        if let Some(f) = t.start_function {
            config.start_function = f;
        }
        if let Some(c) = t.start_core {
            config.start_core = c;
        }
        if let Some(f) = t.stop_function {
            config.stop_function = f;
        }
        if let Some(c) = t.stop_core {
            config.stop_core = c;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_board() {
        let config = ProjectConfig::default();
        assert_eq!(config.rl[0], 0.025);
        assert_eq!(config.rl[6], 10.0);
        assert_eq!(config.supply_voltage, [5.0; MAX_SENSORS]);
        assert_eq!(config.start_function, "main");
        assert_eq!(config.stop_function, "_exit");
    }

    #[test]
    fn parses_partial_file() {
        let config = ProjectConfig::parse(
            r#"
            [target]
            elfs = ["app.elf"]
            start_function = "app_main"
            stop_core = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.elfs, vec![PathBuf::from("app.elf")]);
        assert_eq!(config.start_function, "app_main");
        assert_eq!(config.stop_core, 1);
        // Untouched sections keep their defaults.
        assert_eq!(config.rl, DEFAULT_RL);
    }

    #[test]
    fn rejects_wrong_sensor_count() {
        let err = ProjectConfig::parse(
            r"
            [probe]
            rl = [1.0, 2.0]
            ",
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected 7"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(ProjectConfig::parse("[probe]\nshunt = [1.0]\n").is_err());
    }
}
