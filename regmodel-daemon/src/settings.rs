//! Daemon settings

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use regmodel_server::ServerConfig;
use regmodel_sim::{share, ActivityConfig, RegisterMap, SharedDevice, UartConfig, UartModel};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV: &str = "REGMODEL_CONFIG";

/// Which device model to serve
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSettings {
    /// Register map where every address is readable and writable
    Generic { device_id: u32 },
    /// UART peripheral
    Uart(UartConfig),
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings::Uart(UartConfig::default())
    }
}

impl ModelSettings {
    /// Build a fresh model instance
    pub fn build(&self) -> SharedDevice {
        match self {
            ModelSettings::Generic { device_id } => share(RegisterMap::new(*device_id)),
            ModelSettings::Uart(config) => share(UartModel::from_config(config.clone())),
        }
    }
}

/// One served device
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceSettings {
    /// Endpoint settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Model settings
    #[serde(default)]
    pub model: ModelSettings,
    /// Background activity timing
    #[serde(default)]
    pub activity: ActivityConfig,
}

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Devices to serve, each on its own endpoint
    pub devices: Vec<DeviceSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            devices: vec![DeviceSettings::default()],
        }
    }
}

impl Settings {
    /// Get the XDG config directory for regmodel
    /// Uses $XDG_CONFIG_HOME/regmodel, falls back to ~/.config/regmodel
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("regmodel"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("regmodel"))
    }

    /// Get the settings file path
    fn settings_path() -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(explicit));
        }
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    ///
    /// A missing file is silent; an unreadable or invalid one is logged.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            warn!("Could not determine settings path, using defaults");
            return Self::default();
        };

        if !path.exists() {
            info!("No settings at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring settings at {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load and validate settings from `path`
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let settings: Settings =
            serde_json::from_str(&text).context("failed to parse settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every device has its own endpoint
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.devices.is_empty() {
            bail!("no devices configured");
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(&device.server.socket_path) {
                bail!(
                    "socket path {} is used by more than one device",
                    device.server.socket_path.display()
                );
            }
        }
        Ok(())
    }
}
