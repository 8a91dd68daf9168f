//! SUT profile definitions
//!
//! Defines the structure describing one board on the bench and how its
//! debug adapter is addressed.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One system under test wired to the bench
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SutProfile {
    /// Logical SUT id used on the command line
    pub id: u32,
    /// Device name
    pub name: String,
    /// What this board is used for on the bench
    pub description: String,
    /// OpenOCD configuration file for this board's debug adapter
    pub openocd_cfg: PathBuf,
    /// OpenOCD target prefix (`<target>.core0`, `<target>.core1`)
    pub target: String,
    /// Architecture (arm-cortex-m0plus, etc.)
    pub architecture: String,
}

impl SutProfile {
    /// Create a profile with the conventional `cfg/pico-sut<id>.cfg` locator
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: String::new(),
            openocd_cfg: default_openocd_cfg(id),
            target: "rp2040".to_string(),
            architecture: "arm-cortex-m0plus".to_string(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// `cfg/pico-sut<id>.cfg`
pub fn default_openocd_cfg(id: u32) -> PathBuf {
    PathBuf::from(format!("cfg/pico-sut{}.cfg", id))
}
