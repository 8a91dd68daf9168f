//! Device config resolver
//!
//! Maps a logical SUT id to the debug-adapter configuration for that
//! board. The built-in bench profiles can be overridden or extended from
//! the `[devices]` table of the config file.

pub mod pico;
pub mod profile;

pub use pico::{PICO_SUT1, PICO_SUT2};
pub use profile::SutProfile;

use crate::config::HilConfig;
use crate::error::{HilError, Result};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::path::Path;

/// Registry of built-in SUT profiles
pub static DEVICE_PROFILES: Lazy<BTreeMap<u32, &'static SutProfile>> = Lazy::new(|| {
    let mut m = BTreeMap::new();
    m.insert(1, &*PICO_SUT1);
    m.insert(2, &*PICO_SUT2);
    m
});

/// The SUT profiles in effect for one run
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    profiles: BTreeMap<u32, SutProfile>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self {
            profiles: DEVICE_PROFILES
                .iter()
                .map(|(id, p)| (*id, (*p).clone()))
                .collect(),
        }
    }
}

impl DeviceRegistry {
    /// Built-in profiles overlaid with the config file's `[devices]` table
    pub fn from_config(config: &HilConfig) -> Result<Self> {
        let mut registry = Self::default();

        for (key, entry) in &config.devices {
            let id: u32 = key
                .trim()
                .parse()
                .map_err(|_| HilError::Config(format!("device id '{}' is not a number", key)))?;

            let mut profile = registry
                .profiles
                .remove(&id)
                .unwrap_or_else(|| SutProfile::new(id, &format!("SUT {}", id)));
            profile.openocd_cfg = entry.openocd_cfg.clone();
            if let Some(ref name) = entry.name {
                profile.name = name.clone();
            }
            if let Some(ref target) = entry.target {
                profile.target = target.clone();
            }

            log::debug!("SUT {} -> {}", id, profile.openocd_cfg.display());
            registry.profiles.insert(id, profile);
        }

        Ok(registry)
    }

    /// Profile for a SUT id
    pub fn profile(&self, id: u32) -> Result<&SutProfile> {
        self.profiles.get(&id).ok_or(HilError::UnknownDevice(id))
    }

    /// Debug-adapter config locator for a SUT id
    pub fn resolve(&self, id: u32) -> Result<&Path> {
        self.profile(id).map(|p| p.openocd_cfg.as_path())
    }

    /// All profiles, ordered by id
    pub fn list(&self) -> impl Iterator<Item = &SutProfile> {
        self.profiles.values()
    }
}
