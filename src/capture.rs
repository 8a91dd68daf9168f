//! Logic analyzer captures
//!
//! Runs `sigrok-cli` against the analyzer board and loads the CSV it
//! writes. Lines starting with `;` are sigrok comments; the first
//! remaining row is the column header. Column 0 is the timestamp in
//! seconds, column 1 the sampled value.

use crate::config::{CaptureSettings, ToolSettings};
use crate::error::{HilError, Result};
use crate::process::{args, CommandRunner};
use std::fs;
use std::path::{Path, PathBuf};

/// One sample of a captured signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSample {
    /// Seconds since capture start
    pub timestamp: f64,
    pub value: f64,
}

impl CaptureSample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Parse capture CSV text into time-ordered samples (order is not checked)
pub fn parse_csv(content: &str) -> Result<Vec<CaptureSample>> {
    let mut samples = Vec::new();
    let mut header_skipped = false;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if !header_skipped {
            header_skipped = true;
            continue;
        }

        let mut columns = line.split(',').map(str::trim);
        let timestamp = parse_field(columns.next(), idx, "timestamp")?;
        let value = parse_field(columns.next(), idx, "value")?;
        samples.push(CaptureSample::new(timestamp, value));
    }

    Ok(samples)
}

fn parse_field(field: Option<&str>, idx: usize, name: &str) -> Result<f64> {
    let text = field.ok_or_else(|| HilError::Parse(format!("line {}: missing {} column", idx + 1, name)))?;
    text.parse()
        .map_err(|_| HilError::Parse(format!("line {}: invalid {} '{}'", idx + 1, name, text)))
}

/// Load a capture file
pub fn load(path: &Path) -> Result<Vec<CaptureSample>> {
    let content = fs::read_to_string(path).map_err(|e| HilError::io(path, e))?;
    let samples = parse_csv(&content)?;
    log::info!("Loaded {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

/// Drives sigrok-cli to record a capture file
pub struct CaptureTool<'a, R: CommandRunner> {
    runner: &'a mut R,
    tools: &'a ToolSettings,
    settings: &'a CaptureSettings,
}

impl<'a, R: CommandRunner> CaptureTool<'a, R> {
    pub fn new(runner: &'a mut R, tools: &'a ToolSettings, settings: &'a CaptureSettings) -> Self {
        Self {
            runner,
            tools,
            settings,
        }
    }

    /// Record a capture, returning the path of the CSV file
    pub fn record(&mut self) -> Result<PathBuf> {
        let output_path = &self.settings.output;
        log::info!(
            "Capturing {} samples at {} with driver {}",
            self.settings.samples,
            self.settings.sample_rate,
            self.settings.driver
        );

        let output = self.runner.run(
            &self.tools.sigrok_cli,
            &args([
                "-d".to_string(),
                self.settings.driver.clone(),
                "--config".to_string(),
                format!("samplerate={}", self.settings.sample_rate),
                "--samples".to_string(),
                self.settings.samples.clone(),
                "-O".to_string(),
                "csv".to_string(),
                "-o".to_string(),
                output_path.to_string_lossy().into_owned(),
            ]),
        )?;

        if !output.success() {
            return Err(HilError::Capture(output.combined()));
        }

        log::info!("Signal captured to {}", output_path.display());
        Ok(output_path.clone())
    }
}
