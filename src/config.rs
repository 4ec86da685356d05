//! Daemon configuration: which devices to proxy
//!
//! Loaded from a TOML file; a default file is written on first start so a
//! fresh deployment comes up without manual provisioning.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::device::{BackingSpec, FileDeviceResolver};

/// Default backing-store size for devices created on first start (64 MiB).
fn default_device_size() -> u64 {
    64 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Devices to proxy at startup.
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Identifier the device is proxied and published under.
    pub name: String,
    /// Backing file for the device data.
    pub path: PathBuf,
    #[serde(default)]
    pub read_only: bool,
    /// Size used when the backing file has to be created.
    #[serde(default = "default_device_size")]
    pub size: u64,
}

impl Config {
    /// Reject configurations no engine could serve.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            anyhow::bail!("no devices configured");
        }
        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.name.as_str()) {
                anyhow::bail!("duplicate device name '{}'", device.name);
            }
        }
        Ok(())
    }
}

pub fn load_config(config_path: &str) -> Result<Config> {
    let config_content = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", config_path, e))?;

    let config: Config = toml::from_str(&config_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", config_path, e))?;

    config.validate()?;
    Ok(config)
}

pub fn create_default_config() -> Config {
    Config {
        devices: vec![DeviceConfig {
            name: "dev0".to_string(),
            path: PathBuf::from("dev0.img"),
            read_only: false,
            size: default_device_size(),
        }],
    }
}

/// Build the device resolver the proxies will go through.
#[must_use]
pub fn resolver_from(config: &Config) -> FileDeviceResolver {
    let mut resolver = FileDeviceResolver::new();
    for device in &config.devices {
        resolver.insert(
            device.name.clone(),
            BackingSpec {
                path: device.path.clone(),
                read_only: device.read_only,
                create_size: (!device.read_only).then_some(device.size),
            },
        );
    }
    resolver
}
