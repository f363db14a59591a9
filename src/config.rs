use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    ConsoleError,
    channel::ChannelSettings,
    control::{DEFAULT_SPEED_PCT, HazardModePolicy},
    event_log::EVENT_LOG_CAPACITY,
    safety::HAZARD_COOLDOWN_MS,
    session::SessionSettings,
    telemetry::BatteryCalibration,
};

const CONFIG_DIR_NAME: &str = "rover-console";
const CONFIG_FILE_NAME: &str = "config.json";

pub(crate) const REFRESH_RATE_MS: u64 = 50;
pub(crate) const DEFAULT_CONTROLLER_ADDR: &str = "192.168.137.183:5000";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// `host:port` of the vehicle controller
    pub controller_addr: String,
    pub refresh_rate_ms: u64,
    pub default_speed: u8,
    pub hazard_cooldown_ms: u64,
    pub hazard_policy: HazardModePolicy,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub connect_timeout_ms: u64,
    pub event_log_capacity: usize,
    pub battery: BatteryCalibration,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        let channel = ChannelSettings::new(DEFAULT_CONTROLLER_ADDR);
        Self {
            controller_addr: channel.addr,
            refresh_rate_ms: REFRESH_RATE_MS,
            default_speed: DEFAULT_SPEED_PCT,
            hazard_cooldown_ms: HAZARD_COOLDOWN_MS,
            hazard_policy: HazardModePolicy::default(),
            reconnect_initial_ms: channel.reconnect_initial.as_millis() as u64,
            reconnect_max_ms: channel.reconnect_max.as_millis() as u64,
            connect_timeout_ms: channel.connect_timeout.as_millis() as u64,
            event_log_capacity: EVENT_LOG_CAPACITY,
            battery: BatteryCalibration::default(),
        }
    }
}

impl ConsoleConfig {
    pub fn default_path() -> Option<PathBuf> {
        Some(
            dirs::config_dir()?
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        )
    }

    /// Loads the config from the user's config directory, `None` if there is none yet.
    pub fn from_local_file() -> Result<Option<Self>, ConsoleError> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => Ok(None),
        }
    }

    pub fn from_path(path: &Path) -> Result<Option<Self>, ConsoleError> {
        if !path.exists() {
            return Ok(None);
        }
        let file = fs::File::open(path).map_err(|e| ConsoleError::ConfigIOError { source: e })?;
        serde_json::from_reader(file)
            .map(Some)
            .map_err(|e| ConsoleError::ConfigSerializeError { source: e })
    }

    /// Applies a command line address over whatever the file said.
    pub fn with_controller_addr(mut self, addr: Option<String>) -> Self {
        if let Some(addr) = addr {
            self.controller_addr = addr;
        }
        self
    }

    /// Writes the config to the user's config directory, creating it if needed.
    pub fn save(&self) -> Result<(), ConsoleError> {
        let config_path = Self::default_path().ok_or(ConsoleError::NoConfigDir)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConsoleError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| ConsoleError::ConfigIOError { source: e })?;
            }
        }

        let file =
            fs::File::create(path).map_err(|e| ConsoleError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| ConsoleError::ConfigSerializeError { source: e })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_ms.max(1))
    }

    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            addr: self.controller_addr.clone(),
            reconnect_initial: Duration::from_millis(self.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(self.reconnect_max_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_speed: self.default_speed,
            hazard_cooldown: Duration::from_millis(self.hazard_cooldown_ms),
            hazard_policy: self.hazard_policy,
            battery: self.battery,
            event_log_capacity: self.event_log_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        assert_eq!(
            ConsoleConfig::from_path(&dir.path().join("config.json")).unwrap(),
            None
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = ConsoleConfig {
            controller_addr: "10.0.0.7:5000".to_string(),
            hazard_policy: HazardModePolicy::BlockAutonomousOnly,
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = ConsoleConfig::from_path(&path).unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_address_override_is_saved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = ConsoleConfig::default().with_controller_addr(None);
        assert_eq!(config.controller_addr, DEFAULT_CONTROLLER_ADDR);

        let config = config.with_controller_addr(Some("127.0.0.1:7000".to_string()));
        assert_eq!(config.channel_settings().addr, "127.0.0.1:7000");
        config.save_to(&path).unwrap();

        let loaded = ConsoleConfig::from_path(&path).unwrap().unwrap();
        assert_eq!(loaded.controller_addr, "127.0.0.1:7000");
        assert_eq!(loaded.refresh_rate_ms, REFRESH_RATE_MS);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"hazard_cooldown_ms": 2500, "hazard_policy": "allow"}"#).unwrap();

        let config = ConsoleConfig::from_path(&path).unwrap().unwrap();
        assert_eq!(config.hazard_cooldown_ms, 2500);
        assert_eq!(config.hazard_policy, HazardModePolicy::Allow);
        assert_eq!(config.default_speed, DEFAULT_SPEED_PCT);
        assert_eq!(
            config.session_settings().hazard_cooldown,
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ConsoleConfig::from_path(&path),
            Err(ConsoleError::ConfigSerializeError { .. })
        ));
    }
}
