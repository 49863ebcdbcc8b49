//! Configuration loading from TOML
//!
//! # Configuration File Format
//!
//! ```toml
//! [device]
//! kind = "mclean"
//! name = "McLean Extreme"
//! port = "/dev/rfcomm0"
//! baud = 115200
//!
//! [device.mclean]
//! chunk_size = 1000   # lower this for BLE transports with a small MTU
//! retries = 14        # timeout retries while waiting for the packet start
//!
//! [device.garmin]
//! root = "/media/garmin"
//!
//! [device.scubapro]
//! model = 0x32        # G2
//! ```
//!
//! Every table except `[device]` is optional; tuning values default to what
//! the hardware was measured to need.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Garmin,
    Deepblu,
    OceansS1,
    Mclean,
    ScubaproG2,
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
}

/// Device selection plus per-backend tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub kind: BackendKind,
    /// Human-readable device name, for logs only.
    #[serde(default)]
    pub name: Option<String>,
    /// Transport path (serial device, rfcomm node); unused by the Garmin
    /// filesystem backend.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default)]
    pub garmin: GarminConfig,
    #[serde(default)]
    pub mclean: McleanConfig,
    #[serde(default)]
    pub scubapro: ScubaproConfig,
}

/// Garmin USB-storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GarminConfig {
    /// Mount point of the watch's mass-storage volume. The activity
    /// directory `Garmin/Activity` is resolved below it.
    #[serde(default = "default_garmin_root")]
    pub root: PathBuf,
}

impl Default for GarminConfig {
    fn default() -> Self {
        Self { root: default_garmin_root() }
    }
}

/// McLean Extreme settings.
#[derive(Debug, Clone, Deserialize)]
pub struct McleanConfig {
    /// Bulk receive chunk size in bytes. The default matches the serial
    /// transport; BLE transports should lower it toward their MTU.
    #[serde(default = "default_mclean_chunk")]
    pub chunk_size: usize,
    /// Timeout retries while waiting for the slow (6-8 s) packet start.
    #[serde(default = "default_mclean_retries")]
    pub retries: u32,
}

impl Default for McleanConfig {
    fn default() -> Self {
        Self { chunk_size: default_mclean_chunk(), retries: default_mclean_retries() }
    }
}

/// Scubapro G2 settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ScubaproConfig {
    /// Model byte; selects handshake behavior.
    #[serde(default = "default_scubapro_model")]
    pub model: u8,
}

impl Default for ScubaproConfig {
    fn default() -> Self {
        Self { model: default_scubapro_model() }
    }
}

fn default_baud() -> u32 {
    115200
}

fn default_garmin_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_mclean_chunk() -> usize {
    1000
}

fn default_mclean_retries() -> u32 {
    14
}

fn default_scubapro_model() -> u8 {
    0x32 // G2
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::parse(&text)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}
