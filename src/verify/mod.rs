//! Verification strategies
//!
//! Each strategy turns one observation of the running firmware into a
//! [`Verdict`]:
//!
//! - [`ToggleCounter`]: counts exact marker lines on the UART
//! - [`SummaryParser`]: evaluates a Unity `N Tests, N Failures, N Ignored` line
//! - [`SentinelScanner`]: collects output up to an end token and looks for
//!   `FAIL`/`IGNORE`/`OK`
//! - [`PwmAnalyzer`]: measures the frequency of a captured waveform
//!
//! The three UART strategies consume a deadline-bounded line iterator and
//! stop pulling as soon as they have an answer.

pub mod pwm;
pub mod sentinel;
pub mod summary;
pub mod toggle;

pub use pwm::PwmAnalyzer;
pub use sentinel::SentinelScanner;
pub use summary::SummaryParser;
pub use toggle::ToggleCounter;

use crate::capture::CaptureSample;
use crate::error::{HilError, Result};
use std::fmt;

/// Final pass/fail result of a verification
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    passed: bool,
    detail: String,
}

impl Verdict {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "PASSED" } else { "FAILED" };
        write!(f, "{}: {}", status, self.detail)
    }
}

/// Where a strategy gets its evidence from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Text lines from the SUT's serial port
    Uart,
    /// A logic analyzer capture of a digital signal
    Capture,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Uart => write!(f, "UART"),
            Channel::Capture => write!(f, "capture"),
        }
    }
}

/// Evidence handed to a strategy for the duration of one verify call
pub enum Observation<'a> {
    Lines(&'a mut dyn Iterator<Item = String>),
    Capture(&'a [CaptureSample]),
}

impl Observation<'_> {
    pub fn channel(&self) -> Channel {
        match self {
            Observation::Lines(_) => Channel::Uart,
            Observation::Capture(_) => Channel::Capture,
        }
    }
}

pub trait Verifier {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// The channel this strategy needs the orchestrator to open
    fn channel(&self) -> Channel;

    fn verify(&self, observation: Observation<'_>) -> Result<Verdict>;
}

/// Unwrap a line observation, rejecting the wrong channel
fn expect_lines<'a>(
    strategy: &str,
    observation: Observation<'a>,
) -> Result<&'a mut dyn Iterator<Item = String>> {
    match observation {
        Observation::Lines(lines) => Ok(lines),
        other => Err(mismatch(strategy, Channel::Uart, other.channel())),
    }
}

fn mismatch(strategy: &str, wanted: Channel, got: Channel) -> HilError {
    HilError::Config(format!(
        "{} verification needs a {} observation, got {}",
        strategy, wanted, got
    ))
}
