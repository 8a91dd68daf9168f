//! PWM frequency analyzer
//!
//! Works offline on a fully loaded capture. The threshold sits halfway
//! between the lowest and highest sample; a rising edge is a sample at or
//! above the threshold whose predecessor is below it. The frequency is the
//! inverse of the mean edge-to-edge period.

use super::{mismatch, Channel, Observation, Verdict, Verifier};
use crate::capture::CaptureSample;
use crate::error::{HilError, Result};

pub const DEFAULT_EXPECTED_FREQ_HZ: f64 = 1000.0;
pub const DEFAULT_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct PwmAnalyzer {
    pub expected_freq_hz: f64,
    /// Accepted relative deviation (0.05 = ±5%)
    pub tolerance: f64,
}

impl Default for PwmAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_EXPECTED_FREQ_HZ, DEFAULT_TOLERANCE)
    }
}

impl PwmAnalyzer {
    pub fn new(expected_freq_hz: f64, tolerance: f64) -> Self {
        Self {
            expected_freq_hz,
            tolerance,
        }
    }

    /// Accepted frequency band (inclusive)
    pub fn band(&self) -> (f64, f64) {
        (
            self.expected_freq_hz * (1.0 - self.tolerance),
            self.expected_freq_hz * (1.0 + self.tolerance),
        )
    }

    /// Measure the signal frequency in Hz
    pub fn measure(samples: &[CaptureSample]) -> Result<f64> {
        if samples.is_empty() {
            return Err(HilError::Parse("no data found in capture".to_string()));
        }

        let edges = rising_edges(samples, threshold(samples));
        if edges.len() < 2 {
            return Err(HilError::InsufficientEdges { found: edges.len() });
        }

        let periods: Vec<f64> = edges.windows(2).map(|w| w[1] - w[0]).collect();
        let avg_period = periods.iter().sum::<f64>() / periods.len() as f64;
        if avg_period == 0.0 {
            return Err(HilError::DegenerateSignal);
        }

        log::debug!(
            "{} rising edges, average period {:.9}s",
            edges.len(),
            avg_period
        );
        Ok(1.0 / avg_period)
    }

    /// Measure and check against the band; out-of-band is a
    /// [`HilError::ToleranceViolation`]
    pub fn check(&self, samples: &[CaptureSample]) -> Result<f64> {
        let frequency = Self::measure(samples)?;
        log::info!("Detected frequency: {:.2} Hz", frequency);

        let (min, max) = self.band();
        if (min..=max).contains(&frequency) {
            Ok(frequency)
        } else {
            Err(HilError::ToleranceViolation {
                measured: format!("{:.2} Hz", frequency),
                min: format!("{:.2} Hz", min),
                max: format!("{:.2} Hz", max),
            })
        }
    }
}

/// Midpoint between the lowest and highest sampled value
pub fn threshold(samples: &[CaptureSample]) -> f64 {
    let (min, max) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s.value), hi.max(s.value))
    });
    (max + min) / 2.0
}

/// Timestamps of samples where the signal crosses `threshold` upwards
pub fn rising_edges(samples: &[CaptureSample], threshold: f64) -> Vec<f64> {
    samples
        .windows(2)
        .filter(|w| w[0].value < threshold && w[1].value >= threshold)
        .map(|w| w[1].timestamp)
        .collect()
}

impl Verifier for PwmAnalyzer {
    fn name(&self) -> &'static str {
        "PWM analyzer"
    }

    fn channel(&self) -> Channel {
        Channel::Capture
    }

    fn verify(&self, observation: Observation<'_>) -> Result<Verdict> {
        let samples = match observation {
            Observation::Capture(samples) => samples,
            other => return Err(mismatch(self.name(), Channel::Capture, other.channel())),
        };

        let (min, max) = self.band();
        match self.check(samples) {
            Ok(frequency) => Ok(Verdict::pass(format!(
                "{:.2} Hz within expected range ({:.2} - {:.2} Hz)",
                frequency, min, max
            ))),
            Err(violation @ HilError::ToleranceViolation { .. }) => Ok(Verdict::fail(violation.to_string())),
            Err(e) => Err(e),
        }
    }
}
