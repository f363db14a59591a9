pub mod battery;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::{ConnectionState, StatusReport};

pub use battery::{ADC_MAX, BatteryCalibration, BatteryLevel, BatteryReading};

const NORMAL_CPU_LOAD_PCT: f32 = 50.;
const ELEVATED_CPU_LOAD_PCT: f32 = 80.;

/// Latest known state of the vehicle as reported by the controller.
///
/// The snapshot is replaced as a whole on every status event, readers never observe a
/// partially applied update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Battery voltage in raw ADC counts, 0-4095
    pub battery_voltage_raw: u16,
    /// Whether the controller reports a wifi link
    pub wifi_present: bool,
    /// CPU load of the onboard controller, 0-100
    pub cpu_load_percent: f32,
    pub connection: ConnectionState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuLoadLevel {
    Normal,
    Elevated,
    High,
}

impl CpuLoadLevel {
    pub fn from_percent(percent: f32) -> Self {
        if percent < NORMAL_CPU_LOAD_PCT {
            Self::Normal
        } else if percent < ELEVATED_CPU_LOAD_PCT {
            Self::Elevated
        } else {
            Self::High
        }
    }
}

impl fmt::Display for CpuLoadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Elevated => f.write_str("elevated"),
            Self::High => f.write_str("high"),
        }
    }
}

impl TelemetrySnapshot {
    pub fn cpu_load_level(&self) -> CpuLoadLevel {
        CpuLoadLevel::from_percent(self.cpu_load_percent)
    }
}

#[derive(Debug, Default)]
pub struct TelemetryStore {
    snapshot: TelemetrySnapshot,
    calibration: BatteryCalibration,
    status_updates: u64,
}

impl TelemetryStore {
    pub fn new(calibration: BatteryCalibration) -> Self {
        Self {
            snapshot: TelemetrySnapshot::default(),
            calibration,
            status_updates: 0,
        }
    }

    /// Applies a status report. Missing fields keep their previous value, numeric fields
    /// are clamped into range rather than rejected.
    pub fn apply_status(&mut self, report: &StatusReport) -> TelemetrySnapshot {
        let mut next = self.snapshot;
        if let Some(voltage) = report.voltage {
            next.battery_voltage_raw = voltage.round().clamp(0., f64::from(ADC_MAX)) as u16;
        }
        if let Some(wifi) = report.wifi {
            next.wifi_present = wifi;
        }
        if let Some(cpu) = report.cpu {
            next.cpu_load_percent = cpu.clamp(0., 100.) as f32;
        }
        self.snapshot = next;
        self.status_updates += 1;
        next
    }

    pub fn set_connection(&mut self, state: ConnectionState) {
        self.snapshot = TelemetrySnapshot {
            connection: state,
            ..self.snapshot
        };
    }

    pub fn read(&self) -> TelemetrySnapshot {
        self.snapshot
    }

    /// Number of status reports applied, zero until the controller has reported once.
    pub fn status_updates(&self) -> u64 {
        self.status_updates
    }

    pub fn battery(&self) -> BatteryReading {
        self.calibration.reading(self.snapshot.battery_voltage_raw)
    }

    pub fn calibration(&self) -> &BatteryCalibration {
        &self.calibration
    }
}
