//! Test catalog
//!
//! Each named test case expands into a [`TestPlan`]: what to build, which
//! images go to which SUT, how long to let the board boot and how to judge
//! its behaviour.

use crate::build::BuildTarget;
use crate::config::HilConfig;
use crate::devices::DeviceRegistry;
use crate::error::{HilError, Result};
use crate::flash::{ArtifactKind, FlashJob};
use crate::verify::{PwmAnalyzer, SentinelScanner, SummaryParser, ToggleCounter, Verifier};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Analyzer firmware, shipped prebuilt
pub const ANALYZER_FIRMWARE: &str = "firmware/ula.uf2";
/// SUT the logic analyzer firmware runs on
pub const ANALYZER_SUT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TestCase {
    /// Count LED toggle messages on the UART
    Blinky,
    /// Measure a PWM signal with a second Pico acting as logic analyzer
    LogicAnalyzer,
    /// Check the Unity summary line
    Unity,
    /// Scan Unity output for FAIL/IGNORE/OK up to the end token
    UnitySentinel,
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestCase::Blinky => write!(f, "blinky"),
            TestCase::LogicAnalyzer => write!(f, "logic-analyzer"),
            TestCase::Unity => write!(f, "unity"),
            TestCase::UnitySentinel => write!(f, "unity-sentinel"),
        }
    }
}

/// Command-line adjustments applied on top of a catalog entry
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Flash this image instead of the freshly built one
    pub firmware: Option<PathBuf>,
    /// SUT that runs the firmware under test
    pub sut: u32,
    pub skip_build: bool,
    pub clean: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            firmware: None,
            sut: 1,
            skip_build: false,
            clean: false,
        }
    }
}

/// Everything the orchestrator needs for one run
pub struct TestPlan {
    pub name: String,
    /// `None` skips the build stage
    pub build: Option<BuildTarget>,
    /// Flashed in order
    pub flash: Vec<FlashJob>,
    /// Delay between flashing and verification
    pub settle: Duration,
    pub verifier: Box<dyn Verifier>,
}

impl fmt::Debug for TestPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestPlan")
            .field("name", &self.name)
            .field("build", &self.build)
            .field("flash", &self.flash)
            .field("settle", &self.settle)
            .field("verifier", &self.verifier.name())
            .finish()
    }
}

/// Build target name, its build directory and the default artifact
struct Firmware {
    target: &'static str,
    build_dir: PathBuf,
    artifact: PathBuf,
}

impl TestCase {
    fn firmware(&self, build_root: &Path) -> Firmware {
        match self {
            TestCase::Blinky => {
                let dir = build_root.join("test/sut/pico/blinky");
                Firmware {
                    target: "blinky",
                    artifact: dir.join("blinky.elf"),
                    build_dir: dir,
                }
            }
            TestCase::LogicAnalyzer => Firmware {
                target: "pico_pwm_generator",
                build_dir: build_root.to_path_buf(),
                artifact: build_root.join("test/pico_pwm_generator/pico_pwm_generator.elf"),
            },
            TestCase::Unity | TestCase::UnitySentinel => Firmware {
                target: "test_main",
                build_dir: build_root.to_path_buf(),
                artifact: build_root.join("test/test_main.elf"),
            },
        }
    }

    fn verifier(&self) -> Box<dyn Verifier> {
        match self {
            TestCase::Blinky => Box::new(ToggleCounter::default()),
            TestCase::LogicAnalyzer => Box::new(PwmAnalyzer::default()),
            TestCase::Unity => Box::new(SummaryParser),
            TestCase::UnitySentinel => Box::new(SentinelScanner::default()),
        }
    }

    /// Expand into a runnable plan
    pub fn plan(&self, options: &PlanOptions, config: &HilConfig, registry: &DeviceRegistry) -> Result<TestPlan> {
        let firmware = self.firmware(&config.build.build_dir);

        let build = if options.skip_build {
            None
        } else {
            Some(BuildTarget::new(firmware.target, firmware.build_dir).with_clean(options.clean))
        };

        let artifact = options.firmware.clone().unwrap_or(firmware.artifact);
        let kind = ArtifactKind::from_path(&artifact).ok_or_else(|| {
            HilError::Config(format!(
                "cannot tell the image format of {} (expected .elf or .uf2)",
                artifact.display()
            ))
        })?;

        let mut flash = vec![flash_job(registry, artifact, kind, options.sut)?];
        if *self == TestCase::LogicAnalyzer {
            flash.push(flash_job(
                registry,
                PathBuf::from(ANALYZER_FIRMWARE),
                ArtifactKind::Uf2,
                ANALYZER_SUT,
            )?);
        }

        let plan = TestPlan {
            name: self.to_string(),
            build,
            flash,
            settle: config.timing.post_flash_settle(),
            verifier: self.verifier(),
        };
        log::debug!("{:?}", plan);
        Ok(plan)
    }
}

/// Address `artifact` to SUT `sut` through its resolved debug-adapter config
fn flash_job(registry: &DeviceRegistry, artifact: PathBuf, kind: ArtifactKind, sut: u32) -> Result<FlashJob> {
    let openocd_cfg = registry.resolve(sut)?;
    let target = &registry.profile(sut)?.target;
    Ok(FlashJob::new(artifact, kind, sut, openocd_cfg, target))
}
