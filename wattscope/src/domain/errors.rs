//! Structured error types for wattscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Fatal conditions (device/claim failures, version or calibration
//! rejection, non-timeout transport errors, store open failure) surface as
//! variants here. Degraded conditions are logged at their site and never
//! become errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe not found (vendor {vendor:#06x}, product {product:#06x})")]
    NotFound { vendor: u16, product: u16 },

    #[error("could not claim probe interface {interface}: {source}")]
    Claim { interface: u8, source: rusb::Error },

    #[error("no bulk endpoint pair on the probe interface")]
    MissingEndpoints,

    #[error("unsupported probe hardware version {0:#04x}")]
    UnsupportedHardware(u8),

    #[error("unsupported probe firmware version {0:#04x}")]
    UnsupportedFirmware(u8),

    #[error("suspect calibration value {value} on sensor {sensor}")]
    SuspectCalibration { sensor: usize, value: f64 },

    #[error("reply truncated: expected {expected} bytes, got {got}")]
    ShortReply { expected: usize, got: usize },

    #[error("bulk read returned a partial sample record ({0} trailing bytes)")]
    PartialRecord(usize),

    #[error("sample storage failed: {0}")]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Usb(#[from] rusb::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("can't open profile database {path}: {source}")]
    Open { path: String, source: rusqlite::Error },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("symbol {0:?} not found in any target image")]
    SymbolNotFound(String),

    #[error("failed to read image {path}: {source}")]
    Image { path: String, source: std::io::Error },

    #[error("failed to parse image {path}: {source}")]
    Parse { path: String, source: object::read::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("call-graph trace is truncated")]
    Truncated,

    #[error("unsupported call-graph trace format version {0}")]
    UnsupportedVersion(u64),

    #[error("call-graph trace names core {0}, probe has {max} cores", max = wattscope_common::MAX_CORES)]
    InvalidCore(u64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CfgError {
    #[error("can't read CFG file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("invalid CFG file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't read project file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("invalid project file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("project file lists {got} sensor values, expected {expected}")]
    SensorCount { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_error_display() {
        let err = ProbeError::UnsupportedFirmware(0x42);
        assert_eq!(err.to_string(), "unsupported probe firmware version 0x42");
    }

    #[test]
    fn calibration_error_names_sensor() {
        let err = ProbeError::SuspectCalibration { sensor: 3, value: 0.5 };
        assert!(err.to_string().contains("sensor 3"));
        assert!(err.to_string().contains("0.5"));
    }
}
