//! Runner configuration (hil.toml)
//!
//! All bench-specific settings live in one explicit [`HilConfig`] that is
//! threaded through the orchestrator. Every field has a default, so an
//! empty or missing file yields a working configuration for a single
//! Pico bench on `/dev/ttyACM0`.

use crate::error::{HilError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "hil.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HilConfig {
    pub serial: SerialSettings,
    pub build: BuildSettings,
    pub tools: ToolSettings,
    pub timing: TimingSettings,
    pub capture: CaptureSettings,
    /// Extra or overriding SUT entries, keyed by SUT id (TOML keys are strings)
    pub devices: BTreeMap<String, DeviceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout; the overall bound is `timing.verify_timeout_ms`
    pub read_timeout_ms: u64,
    /// Quiet time before an unterminated line is emitted as-is
    pub partial_line_idle_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115200,
            read_timeout_ms: 100,
            partial_line_idle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Top-level CMake source directory
    pub source_dir: PathBuf,
    /// Directory where build artifacts are placed
    pub build_dir: PathBuf,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            build_dir: PathBuf::from("build"),
        }
    }
}

/// Names (or paths) of the external binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub cmake: String,
    pub make: String,
    pub openocd: String,
    pub picotool: String,
    pub sigrok_cli: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            cmake: "cmake".to_string(),
            make: "make".to_string(),
            openocd: "openocd".to_string(),
            picotool: "picotool".to_string(),
            sigrok_cli: "sigrok-cli".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Overall deadline for one verification
    pub verify_timeout_ms: u64,
    /// Delay after flashing before verification starts
    pub post_flash_settle_ms: u64,
    /// Delay between the bootloader reset and the UF2 load
    pub uf2_settle_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            verify_timeout_ms: 10_000,
            post_flash_settle_ms: 0,
            uf2_settle_ms: 2_000,
        }
    }
}

impl TimingSettings {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn post_flash_settle(&self) -> Duration {
        Duration::from_millis(self.post_flash_settle_ms)
    }

    pub fn uf2_settle(&self) -> Duration {
        Duration::from_millis(self.uf2_settle_ms)
    }
}

/// Logic analyzer capture settings (sigrok-cli)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub driver: String,
    pub sample_rate: String,
    pub samples: String,
    pub output: PathBuf,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            driver: "ols".to_string(),
            sample_rate: "1m".to_string(),
            samples: "10k".to_string(),
            output: PathBuf::from("capture.csv"),
        }
    }
}

/// A SUT entry from the `[devices]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub openocd_cfg: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

impl HilConfig {
    /// Parse a config from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| HilError::Config(e.to_string()))
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| HilError::io(path, e))?;
        let config = Self::parse(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, otherwise `hil.toml` when present, otherwise defaults
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load(default)
                } else {
                    log::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }
}
