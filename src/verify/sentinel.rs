//! Sentinel scanner: free-form output terminated by an end token
//!
//! Output is accumulated until the end token shows up, then the whole
//! transcript is searched for result tokens. `FAIL` and `IGNORE` are
//! case-sensitive substrings (`FAILED`, `IGNORED` count, Unity's
//! `Failures` does not) and dominate `OK`, which must stand as a word.

use super::{expect_lines, Channel, Observation, Verdict, Verifier};
use crate::error::{HilError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;

pub const DEFAULT_TERMINATOR: &str = "===END===";

const FAIL_TOKEN: &str = "FAIL";
const IGNORE_TOKEN: &str = "IGNORE";

static OK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bOK\b").expect("OK pattern is valid"));

/// What the transcript says once the end token has been seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelOutcome {
    Failed,
    Ignored,
    Ok,
    Indeterminate,
}

#[derive(Debug, Clone)]
pub struct SentinelScanner {
    terminator: String,
}

impl Default for SentinelScanner {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINATOR)
    }
}

impl SentinelScanner {
    pub fn new(terminator: &str) -> Self {
        Self {
            terminator: terminator.to_string(),
        }
    }

    /// Classify a complete transcript
    pub fn classify(&self, transcript: &str) -> SentinelOutcome {
        if transcript.contains(FAIL_TOKEN) {
            SentinelOutcome::Failed
        } else if transcript.contains(IGNORE_TOKEN) {
            SentinelOutcome::Ignored
        } else if OK_RE.is_match(transcript) {
            SentinelOutcome::Ok
        } else {
            SentinelOutcome::Indeterminate
        }
    }
}

impl Verifier for SentinelScanner {
    fn name(&self) -> &'static str {
        "sentinel scanner"
    }

    fn channel(&self) -> Channel {
        Channel::Uart
    }

    fn verify(&self, observation: Observation<'_>) -> Result<Verdict> {
        let lines = expect_lines(self.name(), observation)?;
        let started = Instant::now();

        let mut transcript = String::new();
        let mut line_count = 0;
        for line in lines {
            if !transcript.is_empty() {
                transcript.push('\n');
            }
            transcript.push_str(&line);
            line_count += 1;

            if !transcript.contains(&self.terminator) {
                continue;
            }

            let outcome = self.classify(&transcript);
            log::info!("End token seen after {} lines: {:?}", line_count, outcome);
            let detail = format!("{:?} after {} lines of output", outcome, line_count);
            return Ok(match outcome {
                SentinelOutcome::Ok => Verdict::pass(detail),
                _ => Verdict::fail(detail),
            });
        }

        Err(HilError::VerificationTimeout {
            waiting_for: format!("end token '{}' ({} lines received)", self.terminator, line_count),
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }
}
