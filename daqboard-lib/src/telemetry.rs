//! Raw ADC code → physical units.
//!
//! All monitoring ADCs are 12 bit with a 3.3 V reference. The NTC sits in a
//! divider with a 5.1 kΩ resistor fed from 1.8 V; the supply currents are
//! measured across 0.1 Ω shunts behind a gain-100 amplifier.

/// ADC reference voltage in volts.
pub const ADC_REFERENCE_V: f64 = 3.3;
/// Full-scale count of the 12-bit ADCs.
pub const ADC_FULL_SCALE: f64 = 4096.0;

const NTC_SUPPLY_V: f64 = 1.8;
const NTC_DIVIDER_OHM: f64 = 5100.0;
const NTC_BETA: f64 = 3900.0;
const NTC_R0_OHM: f64 = 10000.0;
const NTC_T0_K: f64 = 273.15 + 25.0;

const SHUNT_OHM: f64 = 0.1;
/// Amplifier gain 100 and A → mA folded into one factor.
const CURRENT_GAIN_FACTOR: f64 = 10.0;

pub const ZERO_CELSIUS_K: f64 = 273.15;

/// NTC temperature in Kelvin.
///
/// Only codes for which the divider resistance is positive and finite give a
/// physical result: `1..=4021`. Outside that range the result is `0`, `-0` or
/// NaN.
pub fn adc_to_temperature(code: u16) -> f64 {
    let voltage = f64::from(code) * ADC_REFERENCE_V / (NTC_SUPPLY_V * ADC_FULL_SCALE);
    // divider between the NTC and the fixed resistor
    let resistance = (NTC_SUPPLY_V / voltage) * NTC_DIVIDER_OHM - NTC_DIVIDER_OHM;
    NTC_BETA / ((resistance / NTC_R0_OHM).ln() + NTC_BETA / NTC_T0_K)
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - ZERO_CELSIUS_K
}

/// Supply current in mA.
pub fn adc_to_current(code: u16) -> f64 {
    f64::from(code) * (ADC_REFERENCE_V / ADC_FULL_SCALE) / SHUNT_OHM * CURRENT_GAIN_FACTOR
}

/// Inverse of [`adc_to_current`], truncated. Not clamped to 12 bits: callers
/// validate the result before writing it anywhere.
pub fn current_to_adc(current_ma: f64) -> i32 {
    (current_ma / (CURRENT_GAIN_FACTOR / SHUNT_OHM) * ADC_FULL_SCALE / ADC_REFERENCE_V) as i32
}

/// Highest code with a positive NTC resistance.
pub const NTC_MAX_CODE: u16 = 4021;
