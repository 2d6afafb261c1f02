//! Device inventory
//!
//! The inventory is a JSON document listing the devices a run binds to,
//! with per-device connection settings. Secrets are wrapped as soon as
//! they leave the parser.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use tracing::info;

use crate::device::eapi::{EapiDevice, EapiOptions};
use crate::device::Device;
use crate::errors::FleetcheckError;

fn default_port() -> u16 {
    443
}

fn default_ssh_port() -> u16 {
    22
}

fn default_timeout_secs() -> u64 {
    10
}

/// One device entry as written in the inventory file
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryRecord {
    /// Display name; defaults to "host:port"
    #[serde(default)]
    pub name: Option<String>,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    pub password: String,

    #[serde(default)]
    pub enable_password: Option<String>,

    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Parsed inventory document
#[derive(Debug, Clone, Deserialize)]
pub struct Inventory {
    pub devices: Vec<InventoryRecord>,
}

impl Inventory {
    /// Load and parse an inventory file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FleetcheckError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let inventory: Inventory = serde_json::from_str(&raw)?;
        if inventory.devices.is_empty() {
            return Err(FleetcheckError::InventoryError(format!(
                "inventory {} contains no devices",
                path.display()
            )));
        }
        info!(
            path = %path.display(),
            devices = inventory.devices.len(),
            "Loaded inventory"
        );
        Ok(inventory)
    }

    /// Build the device bindings described by this inventory.
    pub fn into_devices(self) -> Result<Vec<Arc<dyn Device>>, FleetcheckError> {
        self.devices
            .into_iter()
            .map(|record| {
                let device = EapiDevice::new(record.into_options())?;
                Ok(Arc::new(device) as Arc<dyn Device>)
            })
            .collect()
    }
}

impl InventoryRecord {
    fn into_options(self) -> EapiOptions {
        EapiOptions {
            host: self.host,
            port: self.port,
            name: self.name,
            tags: self.tags,
            username: self.username,
            password: SecretString::from(self.password),
            enable_password: self.enable_password.map(SecretString::from),
            timeout: Duration::from_secs(self.timeout_secs),
            ssh_port: self.ssh_port,
            insecure: self.insecure,
        }
    }
}
