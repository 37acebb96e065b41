//! Probe protocol client
//!
//! Drives the USB measurement probe: discovery, interface claim, the init
//! handshake (version and calibration validation), breakpoint arming, and
//! the sampling loop. Transport rules per the protocol contract:
//!
//! - writes retry until every byte is transferred;
//! - reads retry indefinitely on a transport timeout (the probe answers
//!   when it answers), but any other transport error is fatal;
//! - a batched read returns between 1 and [`MAX_BATCH`] sample records;
//!   a partial trailing record is a protocol error;
//! - the stream ends at the sentinel record, which is never stored.
//!
//! Dropping the [`Probe`] releases the interface, which also unblocks any
//! transfer still pending in another thread.

use crate::config::ProjectConfig;
use crate::domain::ProbeError;
use crate::power::{calibrate_currents, Calibration};
use crate::progress::Reporter;
use crate::store::{Measurement, Store};
use log::{info, warn};
use rusb::{Direction, GlobalContext, TransferType};
use std::time::Duration;
use wattscope_common::{
    encode_request, BreakpointRequest, InitReply, SampleReply, BP_TYPE_START, BP_TYPE_STOP,
    CAL_SANE_MAX, CAL_SANE_MIN, HW_VERSION_2_0, HW_VERSION_2_1, MAX_SENSORS, PRODUCT_ID,
    SW_VERSION_1_0, SW_VERSION_1_1, SW_VERSION_1_2, USB_CMD_INIT, USB_CMD_JTAG_INIT,
    USB_CMD_START_SAMPLING, VENDOR_ID,
};

/// The probe's bulk interface.
const PROBE_INTERFACE: u8 = 1;
/// Per-attempt bulk read timeout; timeouts are retried, not reported.
const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Unlimited timeout for writes; the transfer loop handles partial writes.
const WRITE_TIMEOUT: Duration = Duration::from_secs(0);
/// Largest number of sample records accepted in one bulk read.
const MAX_BATCH: usize = 1024;
/// Emit a progress line every this many read batches.
const PROGRESS_INTERVAL: u64 = 313;

/// Which edge of the sampled region a breakpoint marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    Start,
    Stop,
}

/// Summary of one acquisition session.
#[derive(Debug, Clone, Copy)]
pub struct CollectStats {
    pub samples: u64,
    pub min_time: i64,
    pub max_time: i64,
    pub min_power: [f64; MAX_SENSORS],
    pub max_power: [f64; MAX_SENSORS],
}

pub struct Probe {
    handle: rusb::DeviceHandle<GlobalContext>,
    out_endpoint: u8,
    in_endpoint: u8,
    detached_kernel_driver: bool,
    pub hw_version: u8,
    pub sw_version: u8,
    pub calibration: [f64; MAX_SENSORS],
    rl: [f64; MAX_SENSORS],
    supply_voltage: [f64; MAX_SENSORS],
}

impl Probe {
    /// Find, claim and initialize the probe. Rejects devices with versions
    /// outside the supported set or calibration outside the sane range.
    pub fn open(config: &ProjectConfig) -> Result<Self, ProbeError> {
        let devices = rusb::devices()?;
        let device = devices
            .iter()
            .find(|dev| {
                dev.device_descriptor().is_ok_and(|desc| {
                    desc.vendor_id() == VENDOR_ID && desc.product_id() == PRODUCT_ID
                })
            })
            .ok_or(ProbeError::NotFound { vendor: VENDOR_ID, product: PRODUCT_ID })?;

        info!("found probe on bus {} address {}", device.bus_number(), device.address());

        let mut handle = device.open()?;
        let mut detached_kernel_driver = false;
        if handle.kernel_driver_active(PROBE_INTERFACE).unwrap_or(false) {
            handle.detach_kernel_driver(PROBE_INTERFACE)?;
            detached_kernel_driver = true;
        }
        handle
            .claim_interface(PROBE_INTERFACE)
            .map_err(|source| ProbeError::Claim { interface: PROBE_INTERFACE, source })?;

        let (in_endpoint, out_endpoint) = find_bulk_endpoints(&device)?;

        let mut probe = Self {
            handle,
            out_endpoint,
            in_endpoint,
            detached_kernel_driver,
            hw_version: 0,
            sw_version: 0,
            calibration: [0.0; MAX_SENSORS],
            rl: config.rl,
            supply_voltage: config.supply_voltage,
        };
        probe.init()?;
        Ok(probe)
    }

    fn init(&mut self) -> Result<(), ProbeError> {
        self.send_bytes(&encode_request(USB_CMD_INIT))?;

        let mut buf = [0u8; InitReply::WIRE_SIZE];
        self.read_exact(&mut buf)?;
        let reply = InitReply::decode(&buf)
            .ok_or(ProbeError::ShortReply { expected: InitReply::WIRE_SIZE, got: buf.len() })?;
        validate_init_reply(&reply)?;

        self.hw_version = reply.hw_version;
        self.sw_version = reply.sw_version;
        self.calibration = reply.calibration;
        info!("probe hardware {:#x} firmware {:#x}", self.hw_version, self.sw_version);
        Ok(())
    }

    /// Write the full buffer, retrying partial transfers.
    fn send_bytes(&self, bytes: &[u8]) -> Result<(), ProbeError> {
        let mut sent = 0;
        while sent < bytes.len() {
            sent += self.handle.write_bulk(self.out_endpoint, &bytes[sent..], WRITE_TIMEOUT)?;
        }
        Ok(())
    }

    /// Fill the buffer, retrying on timeout only.
    fn read_exact(&self, buf: &mut [u8]) -> Result<(), ProbeError> {
        loop {
            match self.handle.read_bulk(self.in_endpoint, buf, READ_TIMEOUT) {
                Ok(n) if n == buf.len() => return Ok(()),
                Ok(n) => return Err(ProbeError::ShortReply { expected: buf.len(), got: n }),
                Err(rusb::Error::Timeout) => {}
                Err(err) => return Err(ProbeError::Usb(err)),
            }
        }
    }

    /// Read a batch of sample records: blocks (retrying timeouts) until at
    /// least one record arrives, then decodes every complete record read.
    fn read_batch(&self, out: &mut Vec<SampleReply>) -> Result<(), ProbeError> {
        let mut buf = vec![0u8; MAX_BATCH * SampleReply::WIRE_SIZE];
        let transferred = loop {
            match self.handle.read_bulk(self.in_endpoint, &mut buf, READ_TIMEOUT) {
                Ok(0) | Err(rusb::Error::Timeout) => {}
                Ok(n) => break n,
                Err(err) => return Err(ProbeError::Usb(err)),
            }
        };
        if transferred % SampleReply::WIRE_SIZE != 0 {
            return Err(ProbeError::PartialRecord(transferred % SampleReply::WIRE_SIZE));
        }
        out.clear();
        for chunk in buf[..transferred].chunks_exact(SampleReply::WIRE_SIZE) {
            let sample =
                SampleReply::decode(chunk).ok_or(ProbeError::PartialRecord(chunk.len()))?;
            out.push(sample);
        }
        Ok(())
    }

    pub fn jtag_init(&self) -> Result<(), ProbeError> {
        self.send_bytes(&encode_request(USB_CMD_JTAG_INIT))
    }

    pub fn set_breakpoint(
        &self,
        core: u8,
        kind: BreakpointKind,
        addr: u64,
    ) -> Result<(), ProbeError> {
        let bp_type = match kind {
            BreakpointKind::Start => BP_TYPE_START,
            BreakpointKind::Stop => BP_TYPE_STOP,
        };
        self.send_bytes(&BreakpointRequest { core, bp_type, addr }.encode())
    }

    pub fn start_sampling(&self) -> Result<(), ProbeError> {
        self.send_bytes(&encode_request(USB_CMD_START_SAMPLING))
    }

    /// Run one acquisition session: arm the start/stop breakpoints, start
    /// sampling, and stream calibrated samples into the store until the
    /// sentinel record arrives. The bulk transaction commits on sentinel and
    /// error alike; partial data is preserved.
    pub fn collect_samples(
        &self,
        store: &Store,
        start: (u8, u64),
        stop: (u8, u64),
        progress: &Reporter,
    ) -> Result<CollectStats, ProbeError> {
        self.jtag_init()?;
        self.set_breakpoint(start.0, BreakpointKind::Start, start.1)?;
        self.set_breakpoint(stop.0, BreakpointKind::Stop, stop.1)?;
        self.start_sampling()?;

        store.begin_bulk()?;
        let result = self.sample_loop(store, progress);
        // Keep whatever made it into the transaction, error or not.
        store.commit_bulk()?;
        result
    }

    fn sample_loop(&self, store: &Store, progress: &Reporter) -> Result<CollectStats, ProbeError> {
        let calibration = Calibration::Factor(self.calibration);
        let mut stats = CollectStats {
            samples: 0,
            min_time: i64::MAX,
            max_time: 0,
            min_power: [f64::MAX; MAX_SENSORS],
            max_power: [0.0; MAX_SENSORS],
        };
        let mut batch = Vec::with_capacity(MAX_BATCH);
        let mut last_time: Option<i64> = None;
        let mut batches: u64 = 0;

        loop {
            self.read_batch(&mut batch)?;
            batches += 1;
            if batches % PROGRESS_INTERVAL == 0 {
                progress.advance(1, &format!("Got {} samples...", stats.samples));
            }

            for sample in &batch {
                if sample.is_end_marker() {
                    info!("sampling done ({} samples)", stats.samples);
                    return Ok(stats);
                }

                let time_since_last = last_time.map_or(0, |last| sample.time - last);
                last_time = Some(sample.time);

                let power = calibrate_currents(
                    self.hw_version,
                    &sample.current,
                    &self.rl,
                    &self.supply_voltage,
                    &calibration,
                );

                stats.samples += 1;
                stats.min_time = stats.min_time.min(sample.time);
                stats.max_time = stats.max_time.max(sample.time);
                for sensor in 0..MAX_SENSORS {
                    stats.min_power[sensor] = stats.min_power[sensor].min(power[sensor]);
                    stats.max_power[sensor] = stats.max_power[sensor].max(power[sensor]);
                }

                let measurement = Measurement {
                    time: sample.time,
                    time_since_last,
                    pc: sample.pc,
                    power,
                };
                if let Err(err) = store.insert_measurement(&measurement) {
                    // One firmware revision drops rows under load; only that
                    // one gets a pass.
                    if self.sw_version == SW_VERSION_1_1 {
                        warn!("failed to insert sample at {}: {err}", sample.time);
                    } else {
                        return Err(err.into());
                    }
                }
            }
        }
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(PROBE_INTERFACE);
        if self.detached_kernel_driver {
            let _ = self.handle.attach_kernel_driver(PROBE_INTERFACE);
        }
    }
}

/// Reject unsupported versions and insane calibration before trusting a
/// device's data.
pub fn validate_init_reply(reply: &InitReply) -> Result<(), ProbeError> {
    if !matches!(reply.sw_version, SW_VERSION_1_0 | SW_VERSION_1_1 | SW_VERSION_1_2) {
        return Err(ProbeError::UnsupportedFirmware(reply.sw_version));
    }
    if !matches!(reply.hw_version, HW_VERSION_2_0 | HW_VERSION_2_1) {
        return Err(ProbeError::UnsupportedHardware(reply.hw_version));
    }
    for (sensor, &value) in reply.calibration.iter().enumerate() {
        if !(CAL_SANE_MIN..=CAL_SANE_MAX).contains(&value) {
            return Err(ProbeError::SuspectCalibration { sensor, value });
        }
    }
    Ok(())
}

/// Find the IN/OUT bulk endpoint pair on the probe interface.
fn find_bulk_endpoints(device: &rusb::Device<GlobalContext>) -> Result<(u8, u8), ProbeError> {
    let config = device.active_config_descriptor()?;
    let mut in_endpoint = None;
    let mut out_endpoint = None;
    for interface in config.interfaces() {
        if interface.number() != PROBE_INTERFACE {
            continue;
        }
        for descriptor in interface.descriptors() {
            for endpoint in descriptor.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }
                match endpoint.direction() {
                    Direction::In => in_endpoint = Some(endpoint.address()),
                    Direction::Out => out_endpoint = Some(endpoint.address()),
                }
            }
        }
    }
    match (in_endpoint, out_endpoint) {
        (Some(input), Some(output)) => Ok((input, output)),
        _ => Err(ProbeError::MissingEndpoints),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_reply() -> InitReply {
        InitReply {
            hw_version: HW_VERSION_2_1,
            sw_version: SW_VERSION_1_2,
            calibration: [1.0; MAX_SENSORS],
        }
    }

    #[test]
    fn accepts_supported_device() {
        assert!(validate_init_reply(&good_reply()).is_ok());
    }

    #[test]
    fn rejects_low_calibration_coefficient() {
        let mut reply = good_reply();
        reply.calibration[0] = 0.5;
        assert!(matches!(
            validate_init_reply(&reply),
            Err(ProbeError::SuspectCalibration { sensor: 0, .. })
        ));
    }

    #[test]
    fn rejects_high_calibration_coefficient() {
        let mut reply = good_reply();
        reply.calibration[6] = 1.3;
        assert!(matches!(
            validate_init_reply(&reply),
            Err(ProbeError::SuspectCalibration { sensor: 6, .. })
        ));
    }

    #[test]
    fn boundary_calibration_values_pass() {
        let mut reply = good_reply();
        reply.calibration[0] = 0.8;
        reply.calibration[1] = 1.2;
        assert!(validate_init_reply(&reply).is_ok());
    }

    #[test]
    fn rejects_unknown_versions() {
        let mut reply = good_reply();
        reply.sw_version = 0x42;
        assert!(matches!(
            validate_init_reply(&reply),
            Err(ProbeError::UnsupportedFirmware(0x42))
        ));

        let mut reply = good_reply();
        reply.hw_version = 0x19;
        assert!(matches!(
            validate_init_reply(&reply),
            Err(ProbeError::UnsupportedHardware(0x19))
        ));
    }
}
