//! Test orchestration state machine
//!
//! `Build → Flash → Settle → Verify → Done(verdict)`; a failure in any
//! stage moves straight to `Failed` and nothing after it runs. Exactly one
//! attempt is made per stage.

use crate::build::{BuildCoordinator, BuildTarget};
use crate::capture::{self, CaptureTool};
use crate::config::HilConfig;
use crate::error::{HilError, Result};
use crate::flash::{FlashDriver, FlashJob};
use crate::plan::TestPlan;
use crate::process::CommandRunner;
use crate::serial::{open_lines, LineStream, PortConfig};
use crate::verify::{Channel, Observation, Verdict, Verifier};
use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Flash,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Build => write!(f, "build"),
            Stage::Flash => write!(f, "flash"),
            Stage::Verify => write!(f, "verify"),
        }
    }
}

/// Terminal state of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(Verdict),
    Failed { stage: Stage, reason: String },
}

impl Outcome {
    pub fn passed(&self) -> bool {
        matches!(self, Outcome::Done(v) if v.passed())
    }

    /// 0 for a passing verdict, 1 for anything else
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Outcome::Done(verdict) => verdict.detail().to_string(),
            Outcome::Failed { stage, reason } => format!("{} stage failed: {}", stage, reason),
        }
    }
}

/// Hardware-facing side of the pipeline
pub trait Bench {
    fn build(&mut self, target: &BuildTarget) -> Result<()>;

    fn flash(&mut self, job: &FlashJob) -> Result<()>;

    fn settle(&mut self, delay: Duration);

    /// Acquire the verifier's channel, run it, release the channel
    fn observe(&mut self, verifier: &dyn Verifier) -> Result<Verdict>;
}

/// Pipeline position while a plan is running
#[derive(Debug)]
enum State {
    Build,
    /// Index of the next flash job
    Flash(usize),
    Settle,
    Verify,
    Done(Verdict),
    Failed { stage: Stage, reason: String },
}

pub struct Orchestrator<B: Bench> {
    bench: B,
}

impl<B: Bench> Orchestrator<B> {
    pub fn new(bench: B) -> Self {
        Self { bench }
    }

    #[cfg(test)]
    pub fn bench(&self) -> &B {
        &self.bench
    }

    /// Run `plan` to completion
    pub fn run(&mut self, plan: &TestPlan) -> Outcome {
        log::info!("Running {} test", plan.name);

        let mut state = State::Build;
        loop {
            state = match state {
                State::Done(verdict) => {
                    log::info!("{} test finished: {}", plan.name, verdict);
                    return Outcome::Done(verdict);
                }
                State::Failed { stage, reason } => {
                    log::error!("{} test aborted in {} stage: {}", plan.name, stage, reason);
                    return Outcome::Failed { stage, reason };
                }
                active => self.step(plan, active),
            };
        }
    }

    fn step(&mut self, plan: &TestPlan, state: State) -> State {
        match state {
            State::Build => match plan.build {
                None => {
                    log::info!("Skipping build");
                    State::Flash(0)
                }
                Some(ref target) => match self.bench.build(target) {
                    Ok(()) => State::Flash(0),
                    Err(e) => failed(Stage::Build, e),
                },
            },
            State::Flash(index) => match plan.flash.get(index) {
                None => State::Settle,
                Some(job) => match self.bench.flash(job) {
                    Ok(()) => State::Flash(index + 1),
                    Err(e) => failed(Stage::Flash, e),
                },
            },
            State::Settle => {
                if !plan.settle.is_zero() {
                    log::debug!("Waiting {:?} for the device to boot", plan.settle);
                    self.bench.settle(plan.settle);
                }
                State::Verify
            }
            State::Verify => {
                log::info!("Verifying with {} over {}", plan.verifier.name(), plan.verifier.channel());
                match self.bench.observe(plan.verifier.as_ref()) {
                    Ok(verdict) => State::Done(verdict),
                    Err(e) => failed(Stage::Verify, e),
                }
            }
            terminal => terminal,
        }
    }
}

fn failed(stage: Stage, error: HilError) -> State {
    State::Failed {
        stage,
        reason: error.to_string(),
    }
}

/// The real bench: host tools, the SUT's serial port and the logic analyzer
pub struct HardwareBench<'a, R: CommandRunner> {
    config: &'a HilConfig,
    runner: R,
}

impl<'a, R: CommandRunner> HardwareBench<'a, R> {
    pub fn new(config: &'a HilConfig, runner: R) -> Self {
        Self { config, runner }
    }
}

impl<R: CommandRunner> Bench for HardwareBench<'_, R> {
    fn build(&mut self, target: &BuildTarget) -> Result<()> {
        BuildCoordinator::new(&mut self.runner, &self.config.tools, &self.config.build).build(target)
    }

    fn flash(&mut self, job: &FlashJob) -> Result<()> {
        FlashDriver::new(&mut self.runner, &self.config.tools, self.config.timing.uf2_settle()).flash(job)
    }

    fn settle(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }

    fn observe(&mut self, verifier: &dyn Verifier) -> Result<Verdict> {
        match verifier.channel() {
            Channel::Uart => {
                let port = PortConfig::from(&self.config.serial);
                // Port is closed when `lines` drops at the end of this arm
                let mut lines = open_lines(&port, self.config.timing.verify_timeout())?;
                verify_lines(verifier, &mut lines, &port.port_path)
            }
            Channel::Capture => {
                let path = CaptureTool::new(&mut self.runner, &self.config.tools, &self.config.capture).record()?;
                let samples = capture::load(&path)?;
                verifier.verify(Observation::Capture(&samples))
            }
        }
    }
}

/// Run a UART strategy and report a read error that cut the stream short
fn verify_lines<R: Read>(verifier: &dyn Verifier, lines: &mut LineStream<R>, port: &str) -> Result<Verdict> {
    let result = verifier.verify(Observation::Lines(&mut *lines));
    log::debug!("{} lines read from {}", lines.lines_read(), port);
    match lines.take_read_error() {
        Some(error) => explain_read_error(result, port, error),
        None => result,
    }
}

fn explain_read_error(result: Result<Verdict>, port: &str, error: io::Error) -> Result<Verdict> {
    match result {
        Err(HilError::VerificationTimeout { .. }) => Err(HilError::Serial {
            port: port.to_string(),
            source: error.into(),
        }),
        Ok(verdict) if !verdict.passed() => Ok(Verdict::fail(format!(
            "{} (serial read failed: {})",
            verdict.detail(),
            error
        ))),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::PICO_SUT1;
    use crate::flash::ArtifactKind;
    use crate::serial::lines::tests::{scripted, ScriptedReader};
    use crate::verify::{SentinelScanner, SummaryParser, ToggleCounter};
    use std::io::ErrorKind;

    /// Bench that records stage calls and feeds canned UART lines
    #[derive(Default)]
    struct RecordingBench {
        events: Vec<String>,
        fail_build: bool,
        fail_flash_at: Option<usize>,
        lines: Vec<String>,
        flashed: usize,
    }

    impl Bench for RecordingBench {
        fn build(&mut self, target: &BuildTarget) -> Result<()> {
            self.events.push(format!("build {}", target.name));
            if self.fail_build {
                return Err(HilError::Build {
                    target: target.name.clone(),
                    output: "compile error".to_string(),
                });
            }
            Ok(())
        }

        fn flash(&mut self, job: &FlashJob) -> Result<()> {
            self.events.push(format!("flash {}", job.device_id));
            let index = self.flashed;
            self.flashed += 1;
            if self.fail_flash_at == Some(index) {
                return Err(HilError::Flash {
                    step: "ELF program".to_string(),
                    output: "Error: no device found".to_string(),
                });
            }
            Ok(())
        }

        fn settle(&mut self, delay: Duration) {
            self.events.push(format!("settle {}ms", delay.as_millis()));
        }

        fn observe(&mut self, verifier: &dyn Verifier) -> Result<Verdict> {
            self.events.push(format!("verify {}", verifier.name()));
            let mut lines = self.lines.clone().into_iter();
            verifier.verify(Observation::Lines(&mut lines))
        }
    }

    fn plan(verifier: Box<dyn Verifier>, jobs: usize) -> TestPlan {
        TestPlan {
            name: "blinky".to_string(),
            build: Some(BuildTarget::new("blinky", "build")),
            flash: (0..jobs)
                .map(|_| FlashJob::new(
                    "build/blinky.elf",
                    ArtifactKind::Elf,
                    PICO_SUT1.id,
                    &PICO_SUT1.openocd_cfg,
                    &PICO_SUT1.target,
                ))
                .collect(),
            settle: Duration::from_millis(500),
            verifier,
        }
    }

    fn toggles(n: usize) -> Vec<String> {
        vec!["LED toggled".to_string(); n]
    }

    #[test]
    fn test_happy_path_runs_every_stage() {
        let bench = RecordingBench {
            lines: toggles(20),
            ..Default::default()
        };
        let mut orchestrator = Orchestrator::new(bench);

        let outcome = orchestrator.run(&plan(Box::new(ToggleCounter::default()), 1));

        assert!(outcome.passed());
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(
            orchestrator.bench().events,
            vec!["build blinky", "flash 1", "settle 500ms", "verify toggle counter"]
        );
    }

    #[test]
    fn test_build_failure_skips_flash_and_verify() {
        let bench = RecordingBench {
            fail_build: true,
            lines: toggles(20),
            ..Default::default()
        };
        let mut orchestrator = Orchestrator::new(bench);

        let outcome = orchestrator.run(&plan(Box::new(ToggleCounter::default()), 2));

        assert_eq!(orchestrator.bench().events, vec!["build blinky"]);
        assert_eq!(outcome.exit_code(), 1);
        match outcome {
            Outcome::Failed { stage, reason } => {
                assert_eq!(stage, Stage::Build);
                assert!(reason.contains("compile error"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_flash_failure_skips_later_jobs_and_verify() {
        let bench = RecordingBench {
            fail_flash_at: Some(0),
            lines: toggles(20),
            ..Default::default()
        };
        let mut orchestrator = Orchestrator::new(bench);

        let outcome = orchestrator.run(&plan(Box::new(ToggleCounter::default()), 2));

        assert!(matches!(outcome, Outcome::Failed { stage: Stage::Flash, .. }));
        assert_eq!(orchestrator.bench().events, vec!["build blinky", "flash 1"]);
    }

    #[test]
    fn test_second_flash_failure() {
        let bench = RecordingBench {
            fail_flash_at: Some(1),
            ..Default::default()
        };
        let mut orchestrator = Orchestrator::new(bench);

        let outcome = orchestrator.run(&plan(Box::new(ToggleCounter::default()), 2));

        assert!(matches!(outcome, Outcome::Failed { stage: Stage::Flash, .. }));
        assert_eq!(orchestrator.bench().events.len(), 3);
    }

    #[test]
    fn test_skipped_build_and_zero_settle() {
        let bench = RecordingBench {
            lines: vec!["3 Tests 0 Failures 0 Ignored".to_string()],
            ..Default::default()
        };
        let mut orchestrator = Orchestrator::new(bench);
        let mut plan = plan(Box::new(SummaryParser), 1);
        plan.build = None;
        plan.settle = Duration::ZERO;

        let outcome = orchestrator.run(&plan);

        assert!(outcome.passed());
        assert_eq!(orchestrator.bench().events, vec!["flash 1", "verify summary parser"]);
    }

    #[test]
    fn test_failed_verdict_exits_nonzero() {
        let bench = RecordingBench {
            lines: toggles(5),
            ..Default::default()
        };
        let mut orchestrator = Orchestrator::new(bench);

        let outcome = orchestrator.run(&plan(Box::new(ToggleCounter::default()), 1));

        assert!(matches!(outcome, Outcome::Done(ref v) if !v.passed()));
        assert_eq!(outcome.exit_code(), 1);
        assert!(outcome.detail().contains("5/20"));
    }

    #[test]
    fn test_verification_error_is_verify_failure() {
        let bench = RecordingBench::default();
        let mut orchestrator = Orchestrator::new(bench);

        let outcome = orchestrator.run(&plan(Box::new(SummaryParser), 1));

        assert!(matches!(outcome, Outcome::Failed { stage: Stage::Verify, .. }));
        assert!(outcome.detail().starts_with("verify stage failed: timed out"));
    }

    #[test]
    fn test_hardware_bench_missing_port_fails_verify() {
        let mut config = HilConfig::default();
        config.serial.port = "/dev/hil-runner-no-such-port".to_string();
        let mut bench = HardwareBench::new(&config, crate::process::fake::FakeRunner::new());

        let result = bench.observe(&ToggleCounter::default());
        assert!(matches!(result, Err(HilError::Serial { .. })));
    }

    #[test]
    fn test_read_error_replaces_timeout() {
        let reader = ScriptedReader::new(vec![b"booting\n"]).then_error(ErrorKind::BrokenPipe);
        let mut lines = scripted(reader);

        let err = verify_lines(&SummaryParser, &mut lines, "/dev/ttyACM0").unwrap_err();
        match err {
            HilError::Serial { port, source } => {
                assert_eq!(port, "/dev/ttyACM0");
                assert!(source.to_string().contains("scripted"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_read_error_noted_in_failed_verdict() {
        let reader = ScriptedReader::new(vec![b"LED toggled\n"]).then_error(ErrorKind::BrokenPipe);
        let mut lines = scripted(reader);

        let verdict = verify_lines(&ToggleCounter::default(), &mut lines, "/dev/ttyACM0").unwrap();
        assert!(!verdict.passed());
        assert!(verdict.detail().contains("1/20"));
        assert!(verdict.detail().contains("serial read failed"));
    }

    #[test]
    fn test_plain_timeout_stays_timeout() {
        let mut lines = scripted(ScriptedReader::from_text("booting\n"));
        let err = verify_lines(&SentinelScanner::default(), &mut lines, "/dev/ttyACM0").unwrap_err();
        assert!(matches!(err, HilError::VerificationTimeout { .. }));
    }

    #[test]
    fn test_verdict_reached_before_read_error_stands() {
        let reader = ScriptedReader::new(vec![b"OK\n===END===\n"]).then_error(ErrorKind::BrokenPipe);
        let mut lines = scripted(reader);
        let verdict = verify_lines(&SentinelScanner::default(), &mut lines, "/dev/ttyACM0").unwrap();
        assert!(verdict.passed());
    }
}
