//! Firmware flashing
//!
//! Two protocols, picked by artifact kind:
//!
//! - **ELF**: one `openocd program ... verify reset exit` invocation.
//! - **UF2**: reset both cores into the mass-storage bootloader through
//!   OpenOCD, wait for the host to enumerate the drive, load the image with
//!   picotool and reboot into the new firmware.
//!
//! Each protocol is a single attempt; any failing step aborts the rest.

use crate::config::ToolSettings;
use crate::error::{HilError, Result};
use crate::process::{args, CommandOutput, CommandRunner};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Firmware artifact format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Elf,
    Uf2,
}

impl ArtifactKind {
    /// Infer the kind from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "elf" => Some(ArtifactKind::Elf),
            "uf2" => Some(ArtifactKind::Uf2),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Elf => write!(f, "ELF"),
            ArtifactKind::Uf2 => write!(f, "UF2"),
        }
    }
}

/// One firmware image destined for one SUT
#[derive(Debug, Clone)]
pub struct FlashJob {
    pub artifact: PathBuf,
    pub kind: ArtifactKind,
    pub device_id: u32,
    /// Debug-adapter config for the device
    pub openocd_cfg: PathBuf,
    /// OpenOCD target prefix used by the reset handshake
    pub target: String,
}

impl FlashJob {
    pub fn new(
        artifact: impl Into<PathBuf>,
        kind: ArtifactKind,
        device_id: u32,
        openocd_cfg: impl Into<PathBuf>,
        target: &str,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            kind,
            device_id,
            openocd_cfg: openocd_cfg.into(),
            target: target.to_string(),
        }
    }
}

/// Steps of the UF2 reflash handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uf2Step {
    ResetAssert,
    Settle,
    Load,
    Reboot,
}

impl fmt::Display for Uf2Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uf2Step::ResetAssert => write!(f, "bootloader reset"),
            Uf2Step::Settle => write!(f, "settle"),
            Uf2Step::Load => write!(f, "UF2 load"),
            Uf2Step::Reboot => write!(f, "reboot"),
        }
    }
}

pub struct FlashDriver<'a, R: CommandRunner> {
    runner: &'a mut R,
    tools: &'a ToolSettings,
    /// Delay between the bootloader reset and the UF2 load
    uf2_settle: Duration,
}

impl<'a, R: CommandRunner> FlashDriver<'a, R> {
    pub fn new(runner: &'a mut R, tools: &'a ToolSettings, uf2_settle: Duration) -> Self {
        Self {
            runner,
            tools,
            uf2_settle,
        }
    }

    /// Flash `job` with the protocol matching its artifact kind
    pub fn flash(&mut self, job: &FlashJob) -> Result<()> {
        log::info!(
            "Flashing {} ({}) to SUT {}",
            job.artifact.display(),
            job.kind,
            job.device_id
        );

        if !job.artifact.is_file() {
            return Err(HilError::Flash {
                step: "artifact check".to_string(),
                output: format!("firmware image {} does not exist", job.artifact.display()),
            });
        }

        match job.kind {
            ArtifactKind::Elf => self.program_elf(job)?,
            ArtifactKind::Uf2 => self.reflash_uf2(job)?,
        }

        log::info!("Flashing successful");
        Ok(())
    }

    fn program_elf(&mut self, job: &FlashJob) -> Result<()> {
        let command = format!("program {} verify reset exit", job.artifact.display());
        let output = self.runner.run(
            &self.tools.openocd,
            &args([
                "-f".to_string(),
                job.openocd_cfg.to_string_lossy().into_owned(),
                "-c".to_string(),
                command,
            ]),
        )?;
        check("ELF program", output)
    }

    fn reflash_uf2(&mut self, job: &FlashJob) -> Result<()> {
        for step in [Uf2Step::ResetAssert, Uf2Step::Settle, Uf2Step::Load, Uf2Step::Reboot] {
            log::debug!("UF2 step: {}", step);
            match step {
                Uf2Step::ResetAssert => {
                    let output = self
                        .runner
                        .run(&self.tools.openocd, &bootsel_reset_args(job))?;
                    check(&step.to_string(), output)?;
                }
                Uf2Step::Settle => {
                    // No portable enumeration signal; wait a fixed time
                    std::thread::sleep(self.uf2_settle);
                }
                Uf2Step::Load => {
                    let image = job.artifact.to_string_lossy().into_owned();
                    let output = self
                        .runner
                        .run(&self.tools.picotool, &args(["load".to_string(), "-f".to_string(), image]))?;
                    check(&step.to_string(), output)?;
                }
                Uf2Step::Reboot => {
                    let output = self.runner.run(&self.tools.picotool, &args(["reboot"]))?;
                    check(&step.to_string(), output)?;
                }
            }
        }
        Ok(())
    }
}

/// OpenOCD script that holds both cores in reset and pulses the adapter
/// reset line so the RP2040 comes up in its BOOTSEL bootloader
fn bootsel_reset_args(job: &FlashJob) -> Vec<String> {
    let mut out = args(["-f".to_string(), job.openocd_cfg.to_string_lossy().into_owned()]);
    let script = [
        "init".to_string(),
        format!("{}.core0 arp_reset assert 0", job.target),
        format!("{}.core1 arp_reset assert 0", job.target),
        "adapter_nsrst_delay 100".to_string(),
        "adapter_nsrst_assert".to_string(),
        "sleep 100".to_string(),
        "adapter_nsrst_deassert".to_string(),
        "shutdown".to_string(),
    ];
    for command in script {
        out.push("-c".to_string());
        out.push(command);
    }
    out
}

fn check(step: &str, output: CommandOutput) -> Result<()> {
    if output.success() {
        Ok(())
    } else {
        Err(HilError::Flash {
            step: step.to_string(),
            output: output.combined(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{SutProfile, PICO_SUT1, PICO_SUT2};
    use crate::process::fake::FakeRunner;
    use std::fs;

    fn job(artifact: impl Into<PathBuf>, kind: ArtifactKind, device: &SutProfile) -> FlashJob {
        FlashJob::new(artifact, kind, device.id, &device.openocd_cfg, &device.target)
    }

    fn artifact(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"firmware").unwrap();
        path
    }

    #[test]
    fn test_artifact_kind_from_extension() {
        assert_eq!(ArtifactKind::from_path(Path::new("blinky.elf")), Some(ArtifactKind::Elf));
        assert_eq!(ArtifactKind::from_path(Path::new("firmware/ula.UF2")), Some(ArtifactKind::Uf2));
        assert_eq!(ArtifactKind::from_path(Path::new("blinky.bin")), None);
        assert_eq!(ArtifactKind::from_path(Path::new("blinky")), None);
    }

    #[test]
    fn test_elf_program_single_command() {
        let tmp = tempfile::tempdir().unwrap();
        let elf = artifact(tmp.path(), "blinky.elf");
        let tools = ToolSettings::default();
        let mut runner = FakeRunner::new();

        FlashDriver::new(&mut runner, &tools, Duration::ZERO)
            .flash(&job(&elf, ArtifactKind::Elf, &PICO_SUT1))
            .unwrap();

        assert_eq!(runner.calls.len(), 1);
        let call = &runner.calls[0];
        assert_eq!(call.program, "openocd");
        assert_eq!(call.args[1], "cfg/pico-sut1.cfg");
        assert_eq!(
            call.args[3],
            format!("program {} verify reset exit", elf.display())
        );
    }

    #[test]
    fn test_elf_failure_carries_output() {
        let tmp = tempfile::tempdir().unwrap();
        let elf = artifact(tmp.path(), "blinky.elf");
        let tools = ToolSettings::default();
        let mut runner = FakeRunner::new().fail("openocd", 1);

        let err = FlashDriver::new(&mut runner, &tools, Duration::ZERO)
            .flash(&job(&elf, ArtifactKind::Elf, &PICO_SUT1))
            .unwrap_err();

        match err {
            HilError::Flash { step, output } => {
                assert_eq!(step, "ELF program");
                assert!(output.contains("simulated failure"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_openocd() {
        let tmp = tempfile::tempdir().unwrap();
        let elf = artifact(tmp.path(), "blinky.elf");
        let tools = ToolSettings::default();
        let mut runner = FakeRunner::new().missing("openocd");

        let result = FlashDriver::new(&mut runner, &tools, Duration::ZERO)
            .flash(&job(&elf, ArtifactKind::Elf, &PICO_SUT1));
        assert!(matches!(result, Err(HilError::ToolNotFound { tool }) if tool == "openocd"));
    }

    #[test]
    fn test_missing_artifact_invokes_nothing() {
        let tools = ToolSettings::default();
        let mut runner = FakeRunner::new();

        let result = FlashDriver::new(&mut runner, &tools, Duration::ZERO).flash(&job(
            "does/not/exist.elf",
            ArtifactKind::Elf,
            &PICO_SUT1,
        ));

        assert!(matches!(result, Err(HilError::Flash { .. })));
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn test_uf2_handshake_sequence() {
        let tmp = tempfile::tempdir().unwrap();
        let uf2 = artifact(tmp.path(), "ula.uf2");
        let tools = ToolSettings::default();
        let mut runner = FakeRunner::new();

        FlashDriver::new(&mut runner, &tools, Duration::ZERO)
            .flash(&job(&uf2, ArtifactKind::Uf2, &PICO_SUT2))
            .unwrap();

        assert_eq!(runner.programs(), vec!["openocd", "picotool", "picotool"]);

        let reset = runner.calls[0].line();
        assert!(reset.contains("-f cfg/pico-sut2.cfg"));
        assert!(reset.contains("rp2040.core0 arp_reset assert 0"));
        assert!(reset.contains("rp2040.core1 arp_reset assert 0"));
        assert!(reset.contains("adapter_nsrst_assert"));
        assert!(reset.ends_with("-c shutdown"));

        assert_eq!(runner.calls[1].args[0], "load");
        assert_eq!(runner.calls[1].args[2], uf2.to_string_lossy());
        assert_eq!(runner.calls[2].args, vec!["reboot".to_string()]);
    }

    #[test]
    fn test_uf2_reset_failure_aborts_remaining_steps() {
        let tmp = tempfile::tempdir().unwrap();
        let uf2 = artifact(tmp.path(), "ula.uf2");
        let tools = ToolSettings::default();
        let mut runner = FakeRunner::new().fail("openocd", 1);

        let err = FlashDriver::new(&mut runner, &tools, Duration::ZERO)
            .flash(&job(&uf2, ArtifactKind::Uf2, &PICO_SUT2))
            .unwrap_err();

        assert!(matches!(err, HilError::Flash { ref step, .. } if step == "bootloader reset"));
        assert_eq!(runner.programs(), vec!["openocd"]);
    }

    #[test]
    fn test_uf2_load_failure_skips_reboot() {
        let tmp = tempfile::tempdir().unwrap();
        let uf2 = artifact(tmp.path(), "ula.uf2");
        let tools = ToolSettings::default();
        let mut runner = FakeRunner::new().fail("picotool load", 1);

        let err = FlashDriver::new(&mut runner, &tools, Duration::ZERO)
            .flash(&job(&uf2, ArtifactKind::Uf2, &PICO_SUT2))
            .unwrap_err();

        assert!(matches!(err, HilError::Flash { ref step, .. } if step == "UF2 load"));
        assert_eq!(runner.programs(), vec!["openocd", "picotool"]);
    }

    #[test]
    fn test_uf2_missing_picotool() {
        let tmp = tempfile::tempdir().unwrap();
        let uf2 = artifact(tmp.path(), "ula.uf2");
        let tools = ToolSettings::default();
        let mut runner = FakeRunner::new().missing("picotool");

        let result = FlashDriver::new(&mut runner, &tools, Duration::ZERO)
            .flash(&job(&uf2, ArtifactKind::Uf2, &PICO_SUT2));
        assert!(matches!(result, Err(HilError::ToolNotFound { .. })));
    }
}
