//! Firmware build coordination (CMake + Make)
//!
//! Configuration is cached per build directory: CMake only runs when the
//! directory has no generated `Makefile` yet, so repeated runs in one
//! session go straight to `make`.

use crate::config::{BuildSettings, ToolSettings};
use crate::error::{HilError, Result};
use crate::process::{args, CommandRunner};
use std::fs;
use std::path::{Path, PathBuf};

/// File whose presence marks a configured build directory
const CONFIGURED_MARKER: &str = "Makefile";

/// A firmware target to build
#[derive(Debug, Clone)]
pub struct BuildTarget {
    /// Make target name (e.g. `blinky`)
    pub name: String,
    pub build_dir: PathBuf,
    /// Remove the build directory before building
    pub clean: bool,
}

impl BuildTarget {
    pub fn new(name: &str, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            build_dir: build_dir.into(),
            clean: false,
        }
    }

    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }
}

/// Runs configure and build steps through a [`CommandRunner`]
pub struct BuildCoordinator<'a, R: CommandRunner> {
    runner: &'a mut R,
    tools: &'a ToolSettings,
    source_dir: &'a Path,
}

impl<'a, R: CommandRunner> BuildCoordinator<'a, R> {
    pub fn new(runner: &'a mut R, tools: &'a ToolSettings, settings: &'a BuildSettings) -> Self {
        Self {
            runner,
            tools,
            source_dir: &settings.source_dir,
        }
    }

    /// Build `target`, configuring its build directory first if needed
    pub fn build(&mut self, target: &BuildTarget) -> Result<()> {
        log::info!("Building firmware target: {}", target.name);
        let dir = &target.build_dir;

        if target.clean && dir.exists() {
            log::info!("Clean build: removing {}", dir.display());
            fs::remove_dir_all(dir).map_err(|e| HilError::io(dir, e))?;
        }
        fs::create_dir_all(dir).map_err(|e| HilError::io(dir, e))?;

        if is_configured(dir) {
            log::debug!("{} already configured, skipping cmake", dir.display());
        } else {
            self.configure(target)?;
        }

        let output = self.runner.run(
            &self.tools.make,
            &args(["-C".to_string(), path_arg(dir), target.name.clone()]),
        )?;
        if !output.success() {
            return Err(HilError::Build {
                target: target.name.clone(),
                output: output.combined(),
            });
        }

        log::info!("Build successful: {}", target.name);
        Ok(())
    }

    fn configure(&mut self, target: &BuildTarget) -> Result<()> {
        log::info!("Configuring {}", target.build_dir.display());
        let output = self.runner.run(
            &self.tools.cmake,
            &args([
                "-S".to_string(),
                path_arg(self.source_dir),
                "-B".to_string(),
                path_arg(&target.build_dir),
            ]),
        )?;
        if !output.success() {
            return Err(HilError::Build {
                target: target.name.clone(),
                output: output.combined(),
            });
        }
        Ok(())
    }
}

/// Whether CMake has already generated a build graph in `dir`
pub fn is_configured(dir: &Path) -> bool {
    dir.join(CONFIGURED_MARKER).exists()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
