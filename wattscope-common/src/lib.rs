//! # Shared Wire Protocol (Probe ↔ Host)
//!
//! Defines the command opcodes and packed record layouts exchanged with the
//! power/performance probe over its bulk USB endpoints. Everything on the wire
//! is little-endian and has no padding; this crate owns the exact byte layout
//! so the host never depends on Rust struct representation for wire data.
//!
//! ## Request/Reply Shapes
//!
//! Every request starts with a one-byte opcode. Replies are fixed-size
//! records; the sample stream is a repetition of [`SampleReply`] records and
//! is terminated by a record whose `time` equals [`SAMPLE_TIME_END`].
//!
//! ## Key Types
//!
//! - [`InitReply`] - hardware/firmware versions plus the calibration vector
//! - [`BreakpointRequest`] - arms a start/stop hardware breakpoint
//! - [`SampleReply`] - one sample: device clock, per-core PCs, raw currents

#![cfg_attr(not(test), no_std)]

// ============================================================================
// Command Opcodes
// ============================================================================

/// Query versions and the stored calibration vector ([`InitReply`]).
pub const USB_CMD_INIT: u8 = b'i';

/// Select the attached hardware revision (flashing/bring-up tooling).
pub const USB_CMD_HW_INIT: u8 = b'h';

/// Initialize the debug link to the target before arming breakpoints.
pub const USB_CMD_JTAG_INIT: u8 = b'j';

/// Arm a hardware breakpoint ([`BreakpointRequest`]).
pub const USB_CMD_BREAKPOINT: u8 = b'b';

/// Begin streaming [`SampleReply`] records.
pub const USB_CMD_START_SAMPLING: u8 = b's';

/// Store a calibration point (production calibration tooling).
pub const USB_CMD_CAL: u8 = b'l';

/// Run a built-in self test (production tooling).
pub const USB_CMD_TEST: u8 = b't';

// ============================================================================
// Protocol Constants
// ============================================================================

/// USB vendor id the probe enumerates with.
pub const VENDOR_ID: u16 = 0x10c4;
/// USB product id the probe enumerates with.
pub const PRODUCT_ID: u16 = 0x8c1e;

/// Number of per-core program counters in every sample.
pub const MAX_CORES: usize = 4;
/// Number of current-sense channels in every sample.
pub const MAX_SENSORS: usize = 7;

/// Device sample clock in Hz; `time` fields count these cycles.
pub const CLOCK_HZ: u64 = 48_000_000;

/// `SampleReply::time` value signalling the end of the sample stream.
/// The sentinel record itself carries no measurement.
pub const SAMPLE_TIME_END: i64 = -1;

/// Breakpoint kind: begin sampling when the core reaches the address.
pub const BP_TYPE_START: u8 = 0;
/// Breakpoint kind: end sampling when the core reaches the address.
pub const BP_TYPE_STOP: u8 = 1;

/// Supported hardware revisions (revision A and B current frontends).
pub const HW_VERSION_2_0: u8 = 0x20;
pub const HW_VERSION_2_1: u8 = 0x21;

/// Supported firmware versions.
pub const SW_VERSION_1_0: u8 = 0x10;
/// This firmware revision is known to drop individual samples under load;
/// hosts tolerate (and log) per-record storage failures for it only.
pub const SW_VERSION_1_1: u8 = 0x11;
pub const SW_VERSION_1_2: u8 = 0x12;

/// Calibration coefficients outside this closed range indicate a
/// miscalibrated or corrupted unit and must abort initialization.
pub const CAL_SANE_MIN: f64 = 0.8;
pub const CAL_SANE_MAX: f64 = 1.2;

/// Stored PCs are in device units; shift left by this to get byte addresses.
pub const PC_SHIFT: u32 = 2;

// ============================================================================
// Records
// ============================================================================

/// Reply to [`USB_CMD_INIT`]: versions plus per-sensor calibration factors.
///
/// Wire layout: `u8 hwVersion, u8 swVersion, f64 calibration[7]` (58 bytes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitReply {
    pub hw_version: u8,
    pub sw_version: u8,
    pub calibration: [f64; MAX_SENSORS],
}

impl InitReply {
    pub const WIRE_SIZE: usize = 2 + 8 * MAX_SENSORS;

    /// Decode from exactly [`Self::WIRE_SIZE`] little-endian bytes.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::WIRE_SIZE {
            return None;
        }
        let mut calibration = [0.0; MAX_SENSORS];
        for (i, cal) in calibration.iter_mut().enumerate() {
            let off = 2 + i * 8;
            *cal = f64::from_le_bytes(bytes[off..off + 8].try_into().ok()?);
        }
        Some(Self { hw_version: bytes[0], sw_version: bytes[1], calibration })
    }

    /// Encode to wire bytes (used by firmware-side tooling and tests).
    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0] = self.hw_version;
        buf[1] = self.sw_version;
        for (i, cal) in self.calibration.iter().enumerate() {
            let off = 2 + i * 8;
            buf[off..off + 8].copy_from_slice(&cal.to_le_bytes());
        }
        buf
    }
}

/// Request arming a start or stop hardware breakpoint on one core.
///
/// Wire layout: `u8 cmd, u8 core, u8 bpType, u64 addr` (11 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointRequest {
    pub core: u8,
    /// [`BP_TYPE_START`] or [`BP_TYPE_STOP`].
    pub bp_type: u8,
    pub addr: u64,
}

impl BreakpointRequest {
    pub const WIRE_SIZE: usize = 3 + 8;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0] = USB_CMD_BREAKPOINT;
        buf[1] = self.core;
        buf[2] = self.bp_type;
        buf[3..11].copy_from_slice(&self.addr.to_le_bytes());
        buf
    }
}

/// One probe sample: device clock, per-core PCs and raw sensor currents.
///
/// Wire layout: `i64 time, u64 pc[4], i16 current[7]` (54 bytes). Batched
/// bulk reads return between 1 and N of these back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleReply {
    /// Monotonic device clock in cycles; [`SAMPLE_TIME_END`] terminates.
    pub time: i64,
    /// Raw per-core program counters in device units (see [`PC_SHIFT`]).
    pub pc: [u64; MAX_CORES],
    /// Signed raw ADC codes, one per sensor channel.
    pub current: [i16; MAX_SENSORS],
}

impl SampleReply {
    pub const WIRE_SIZE: usize = 8 + 8 * MAX_CORES + 2 * MAX_SENSORS;

    /// Decode from exactly [`Self::WIRE_SIZE`] little-endian bytes.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::WIRE_SIZE {
            return None;
        }
        let time = i64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let mut pc = [0u64; MAX_CORES];
        for (i, p) in pc.iter_mut().enumerate() {
            let off = 8 + i * 8;
            *p = u64::from_le_bytes(bytes[off..off + 8].try_into().ok()?);
        }
        let mut current = [0i16; MAX_SENSORS];
        for (i, c) in current.iter_mut().enumerate() {
            let off = 8 + 8 * MAX_CORES + i * 2;
            *c = i16::from_le_bytes(bytes[off..off + 2].try_into().ok()?);
        }
        Some(Self { time, pc, current })
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0..8].copy_from_slice(&self.time.to_le_bytes());
        for (i, p) in self.pc.iter().enumerate() {
            let off = 8 + i * 8;
            buf[off..off + 8].copy_from_slice(&p.to_le_bytes());
        }
        for (i, c) in self.current.iter().enumerate() {
            let off = 8 + 8 * MAX_CORES + i * 2;
            buf[off..off + 2].copy_from_slice(&c.to_le_bytes());
        }
        buf
    }

    /// True for the stream-terminating record.
    #[must_use]
    pub fn is_end_marker(&self) -> bool {
        self.time == SAMPLE_TIME_END
    }

    /// Convert a raw per-core PC to a byte address.
    #[must_use]
    pub fn byte_address(&self, core: usize) -> u64 {
        self.pc[core] << PC_SHIFT
    }
}

/// Encode a bare one-opcode request ([`USB_CMD_INIT`] etc.).
#[must_use]
pub fn encode_request(cmd: u8) -> [u8; 1] {
    [cmd]
}

/// Convert device clock cycles to seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cycles_to_seconds(cycles: i64) -> f64 {
    cycles as f64 / CLOCK_HZ as f64
}
