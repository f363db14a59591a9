use std::fmt;

use serde::{Deserialize, Serialize};
use uom::si::{electric_potential::volt, f32::ElectricPotential};

/// Full scale of the controller's 12 bit ADC.
pub const ADC_MAX: u16 = 4095;

const GOOD_BATTERY_PCT: u8 = 60;
const LOW_BATTERY_PCT: u8 = 30;

/// Converts raw ADC counts from the controller into pack voltage and charge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryCalibration {
    /// ADC reference voltage
    pub adc_reference_volts: f32,
    /// Ratio of the voltage divider in front of the ADC pin
    pub divider_ratio: f32,
    /// Pack voltage considered empty (0%)
    pub empty_volts: f32,
    /// Pack voltage considered full (100%)
    pub full_volts: f32,
}

impl Default for BatteryCalibration {
    fn default() -> Self {
        // 2S Li-ion pack behind a 1:3 divider on a 3.3V ADC
        Self {
            adc_reference_volts: 3.3,
            divider_ratio: 3.,
            empty_volts: 6.,
            full_volts: 8.4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryLevel {
    Good,
    Low,
    Critical,
}

impl BatteryLevel {
    pub fn from_percent(percent: u8) -> Self {
        if percent > GOOD_BATTERY_PCT {
            Self::Good
        } else if percent > LOW_BATTERY_PCT {
            Self::Low
        } else {
            Self::Critical
        }
    }
}

impl fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => f.write_str("good"),
            Self::Low => f.write_str("low"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatteryReading {
    pub voltage: ElectricPotential,
    pub percent: u8,
    pub level: BatteryLevel,
}

impl BatteryReading {
    pub fn volts(&self) -> f32 {
        self.voltage.get::<volt>()
    }

    /// Rough runtime left, one hour per ten percent of charge.
    pub fn estimated_runtime_hours(&self) -> u8 {
        self.percent / 10
    }
}

impl BatteryCalibration {
    pub fn voltage(&self, raw: u16) -> ElectricPotential {
        let ratio = f32::from(raw.min(ADC_MAX)) / f32::from(ADC_MAX);
        ElectricPotential::new::<volt>(ratio * self.adc_reference_volts * self.divider_ratio)
    }

    pub fn percent(&self, voltage: ElectricPotential) -> u8 {
        let volts = voltage.get::<volt>();
        let span = self.full_volts - self.empty_volts;
        if !(span > 0.) {
            return if volts >= self.full_volts { 100 } else { 0 };
        }
        ((volts - self.empty_volts) / span * 100.)
            .clamp(0., 100.)
            .round() as u8
    }

    pub fn reading(&self, raw: u16) -> BatteryReading {
        let voltage = self.voltage(raw);
        let percent = self.percent(voltage);
        BatteryReading {
            voltage,
            percent,
            level: BatteryLevel::from_percent(percent),
        }
    }
}
