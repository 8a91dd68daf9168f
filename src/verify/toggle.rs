//! Toggle counter: exact-match marker lines

use super::{expect_lines, Channel, Observation, Verdict, Verifier};
use crate::error::Result;

/// Line printed by the blinky firmware on every LED toggle
pub const DEFAULT_MARKER: &str = "LED toggled";

/// Toggles the blinky firmware performs before it stops printing
pub const DEFAULT_EXPECTED_TOGGLES: usize = 20;

#[derive(Debug, Clone)]
pub struct ToggleCounter {
    pub marker: String,
    pub expected_count: usize,
}

impl Default for ToggleCounter {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER, DEFAULT_EXPECTED_TOGGLES)
    }
}

impl ToggleCounter {
    pub fn new(marker: &str, expected_count: usize) -> Self {
        Self {
            marker: marker.to_string(),
            expected_count,
        }
    }
}

impl Verifier for ToggleCounter {
    fn name(&self) -> &'static str {
        "toggle counter"
    }

    fn channel(&self) -> Channel {
        Channel::Uart
    }

    fn verify(&self, observation: Observation<'_>) -> Result<Verdict> {
        let lines = expect_lines(self.name(), observation)?;
        let expected = self.expected_count;

        let mut count = 0;
        if expected > 0 {
            for line in lines {
                if line != self.marker {
                    continue;
                }
                count += 1;
                log::info!("Received toggle message {}/{}", count, expected);
                if count == expected {
                    break;
                }
            }
        }

        let detail = format!("received {}/{} '{}' messages", count, expected, self.marker);
        if count == expected {
            Ok(Verdict::pass(detail))
        } else {
            Ok(Verdict::fail(detail))
        }
    }
}
