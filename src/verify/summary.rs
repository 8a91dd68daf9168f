//! Unity summary line parser
//!
//! Unity ends a run with a line such as `10 Tests 0 Failures 0 Ignored`.
//! The first such line decides the verdict.

use super::{expect_lines, Channel, Observation, Verdict, Verifier};
use crate::error::{HilError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::time::Instant;

static SUMMARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s+Tests?,?\s+(\d+)\s+Failures?,?\s+(\d+)\s+Ignored")
        .expect("summary pattern is valid")
});

/// Counts reported by a Unity summary line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestSummary {
    pub tests: u32,
    pub failures: u32,
    pub ignored: u32,
}

impl TestSummary {
    /// Parse a summary line; `Ok(None)` when the line is not a summary
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let Some(caps) = SUMMARY_RE.captures(line) else {
            return Ok(None);
        };

        let field = |i: usize| -> Result<u32> {
            caps[i]
                .parse()
                .map_err(|e| HilError::Parse(format!("bad count '{}' in '{}': {}", &caps[i], line, e)))
        };

        Ok(Some(Self {
            tests: field(1)?,
            failures: field(2)?,
            ignored: field(3)?,
        }))
    }

    /// At least one test ran and none failed or were ignored
    pub fn is_passing(&self) -> bool {
        self.tests > 0 && self.failures == 0 && self.ignored == 0
    }
}

impl fmt::Display for TestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Tests, {} Failures, {} Ignored",
            self.tests, self.failures, self.ignored
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct SummaryParser;

impl Verifier for SummaryParser {
    fn name(&self) -> &'static str {
        "summary parser"
    }

    fn channel(&self) -> Channel {
        Channel::Uart
    }

    fn verify(&self, observation: Observation<'_>) -> Result<Verdict> {
        let lines = expect_lines(self.name(), observation)?;
        let started = Instant::now();

        for line in lines {
            let Some(summary) = TestSummary::parse(&line)? else {
                continue;
            };

            log::info!("Test summary: {}", summary);
            return Ok(if summary.is_passing() {
                Verdict::pass(summary.to_string())
            } else {
                Verdict::fail(summary.to_string())
            });
        }

        Err(HilError::VerificationTimeout {
            waiting_for: "a test summary line".to_string(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }
}
