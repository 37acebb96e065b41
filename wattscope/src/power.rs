//! Raw-current-to-power calibration
//!
//! Converts signed ADC codes from the probe's current sensors into watts.
//! The conversion depends on the hardware revision of the analog frontend:
//! revision A (hw 0x20) has a fixed gain chain, revision B (hw 0x21) applies
//! a per-sensor calibration factor and a 1/20 attenuator. Offline traces may
//! carry their own calibration snapshot as per-sensor `{offset, gain}` pairs,
//! which substitute for the device factors.

use wattscope_common::{HW_VERSION_2_0, HW_VERSION_2_1, MAX_SENSORS};

/// ADC reference voltage in volts.
pub const REF_VOLTAGE: f64 = 2.5;
/// Full-scale ADC code magnitude.
pub const MAX_CURRENT_VALUE: f64 = 32768.0;
/// Sense-amplifier series resistance in ohms (revision A chain).
pub const AMPLIFIER_RS: f64 = 8200.0;
/// Fixed attenuation of the revision B frontend.
pub const ATTENUATION: f64 = 20.0;

/// Per-sensor calibration source for the revision B conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Calibration {
    /// Multiplicative factors read from the device at init.
    Factor([f64; MAX_SENSORS]),
    /// Affine correction carried by an offline trace file; applied to the
    /// raw-derived voltage as `offset + gain * v`.
    OffsetGain { offset: [f64; MAX_SENSORS], gain: [f64; MAX_SENSORS] },
}

impl Calibration {
    fn apply(&self, sensor: usize, volts: f64) -> f64 {
        match self {
            Self::Factor(factors) => volts * factors[sensor],
            Self::OffsetGain { offset, gain } => offset[sensor] + gain[sensor] * volts,
        }
    }
}

/// Convert one raw ADC code to watts.
///
/// `rl` is the per-sensor shunt resistance in ohms and `supply_voltage` the
/// per-rail supply in volts, both from the project configuration. An
/// unsupported `hw_version` yields 0.0; initialization rejects such devices
/// before any sample is converted.
#[must_use]
pub fn raw_to_power(
    hw_version: u8,
    sensor: usize,
    raw: i16,
    rl: &[f64; MAX_SENSORS],
    supply_voltage: &[f64; MAX_SENSORS],
    calibration: &Calibration,
) -> f64 {
    let raw = f64::from(raw);
    match hw_version {
        HW_VERSION_2_0 => {
            let vo = raw * REF_VOLTAGE / MAX_CURRENT_VALUE;
            let current = (1000.0 * vo) / (AMPLIFIER_RS * rl[sensor]);
            current * supply_voltage[sensor]
        }
        HW_VERSION_2_1 => {
            let v = calibration.apply(sensor, raw * REF_VOLTAGE / MAX_CURRENT_VALUE);
            let vs = v / ATTENUATION;
            let current = vs / rl[sensor];
            current * supply_voltage[sensor]
        }
        _ => 0.0,
    }
}

/// Convert a full sample's current vector to per-sensor watts.
#[must_use]
pub fn calibrate_currents(
    hw_version: u8,
    currents: &[i16; MAX_SENSORS],
    rl: &[f64; MAX_SENSORS],
    supply_voltage: &[f64; MAX_SENSORS],
    calibration: &Calibration,
) -> [f64; MAX_SENSORS] {
    let mut power = [0.0; MAX_SENSORS];
    for (sensor, raw) in currents.iter().enumerate() {
        power[sensor] = raw_to_power(hw_version, sensor, *raw, rl, supply_voltage, calibration);
    }
    power
}

#[cfg(test)]
mod tests {
    use super::*;

    const RL: [f64; MAX_SENSORS] = [0.025, 0.05, 0.05, 0.1, 0.1, 1.0, 10.0];
    const SUPPLY: [f64; MAX_SENSORS] = [5.0; MAX_SENSORS];

    fn unit_factors() -> Calibration {
        Calibration::Factor([1.0; MAX_SENSORS])
    }

    #[test]
    fn zero_raw_is_zero_power() {
        for hw in [HW_VERSION_2_0, HW_VERSION_2_1] {
            for sensor in 0..MAX_SENSORS {
                let p = raw_to_power(hw, sensor, 0, &RL, &SUPPLY, &unit_factors());
                assert_eq!(p, 0.0, "hw {hw:#x} sensor {sensor}");
            }
        }
    }

    #[test]
    fn power_is_monotonic_in_raw_magnitude() {
        for hw in [HW_VERSION_2_0, HW_VERSION_2_1] {
            let mut last = 0.0;
            for raw in [1i16, 10, 100, 1000, 32767] {
                let p = raw_to_power(hw, 0, raw, &RL, &SUPPLY, &unit_factors());
                assert!(p > last, "hw {hw:#x} raw {raw}");
                last = p;
            }
        }
    }

    #[test]
    fn revision_a_formula() {
        // 1000 * (raw * 2.5 / 32768) / (8200 * 0.025) * 5.0
        let p = raw_to_power(HW_VERSION_2_0, 0, 1024, &RL, &SUPPLY, &unit_factors());
        let expected = 1000.0 * (1024.0 * 2.5 / 32768.0) / (8200.0 * 0.025) * 5.0;
        assert!((p - expected).abs() < 1e-12);
    }

    #[test]
    fn revision_b_applies_factor_and_attenuation() {
        let mut factors = [1.0; MAX_SENSORS];
        factors[2] = 1.1;
        let cal = Calibration::Factor(factors);
        let p = raw_to_power(HW_VERSION_2_1, 2, 2048, &RL, &SUPPLY, &cal);
        let expected = (2048.0 * 2.5 / 32768.0) * 1.1 / 20.0 / 0.05 * 5.0;
        assert!((p - expected).abs() < 1e-12);
    }

    #[test]
    fn offset_gain_shifts_zero() {
        let offset = [0.01; MAX_SENSORS];
        let gain = [1.0; MAX_SENSORS];
        let cal = Calibration::OffsetGain { offset, gain };
        let p0 = raw_to_power(HW_VERSION_2_1, 0, 0, &RL, &SUPPLY, &cal);
        // Zero raw maps to the offset term alone, not to zero.
        let expected = 0.01 / 20.0 / 0.025 * 5.0;
        assert!((p0 - expected).abs() < 1e-12);

        // Still monotonic above the offset.
        let p1 = raw_to_power(HW_VERSION_2_1, 0, 100, &RL, &SUPPLY, &cal);
        assert!(p1 > p0);
    }
}
