//! Serial port configuration and acquisition
//!
//! Handles opening the SUT's USB CDC / UART port and listing the ports
//! present on the host.

use super::lines::{LineStream, DEFAULT_PARTIAL_IDLE};
use crate::config::SerialSettings;
use crate::error::{HilError, Result};
use colored::Colorize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;

/// Default Pico stdio baud rate
pub const PICO_DEFAULT_BAUD: u32 = 115200;

/// Configuration for serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyACM0)
    pub port_path: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Per-read timeout
    pub timeout: Duration,
    /// Quiet time before an unterminated line is emitted
    pub partial_idle: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from("/dev/ttyACM0"),
            baud_rate: PICO_DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: Duration::from_millis(100),
            partial_idle: DEFAULT_PARTIAL_IDLE,
        }
    }
}

impl PortConfig {
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the per-read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_partial_idle(mut self, idle: Duration) -> Self {
        self.partial_idle = idle;
        self
    }
}

impl From<&SerialSettings> for PortConfig {
    fn from(settings: &SerialSettings) -> Self {
        PortConfig::new(&settings.port)
            .with_baud_rate(settings.baud_rate)
            .with_timeout(Duration::from_millis(settings.read_timeout_ms))
            .with_partial_idle(Duration::from_millis(settings.partial_line_idle_ms))
    }
}

/// Open the port (8N1, no flow control unless configured otherwise)
pub fn open(config: &PortConfig) -> Result<Box<dyn SerialPort>> {
    serialport::new(&config.port_path, config.baud_rate)
        .data_bits(config.data_bits)
        .parity(config.parity)
        .stop_bits(config.stop_bits)
        .flow_control(config.flow_control)
        .timeout(config.timeout)
        .open()
        .map_err(|source| HilError::Serial {
            port: config.port_path.clone(),
            source,
        })
}

/// Open the port and stream its lines until `timeout` elapses.
///
/// The port is closed when the returned stream is dropped.
pub fn open_lines(config: &PortConfig, timeout: Duration) -> Result<LineStream<Box<dyn SerialPort>>> {
    let port = open(config)?;
    log::info!(
        "Listening on {} at {} baud for up to {:.1}s",
        config.port_path,
        config.baud_rate,
        timeout.as_secs_f64()
    );
    Ok(LineStream::new(port, &config.port_path, timeout).with_partial_idle(config.partial_idle))
}

/// A serial port seen on the host
#[derive(Debug, Clone, PartialEq)]
pub struct PortInfo {
    pub path: String,
    /// USB vendor/product id, `None` for non-USB ports
    pub usb_id: Option<(u16, u16)>,
    /// USB product string
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// Raspberry Pi USB vendor id (Pico stdio CDC and Raspberry Pi debug adapters)
const RASPBERRY_PI_VID: u16 = 0x2e8a;

impl PortInfo {
    /// Whether this looks like a Pico or a Raspberry Pi debug adapter
    pub fn is_raspberry_pi(&self) -> bool {
        matches!(self.usb_id, Some((vid, _)) if vid == RASPBERRY_PI_VID)
    }

    /// Bench markers for the listing
    pub fn tags(&self, sut_port: &str) -> Vec<&'static str> {
        let mut tags = Vec::new();
        if self.path == sut_port {
            tags.push("SUT port");
        }
        if self.is_raspberry_pi() {
            tags.push("Raspberry Pi");
        }
        tags
    }
}

/// Serial ports on the host, sorted by path
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(|source| HilError::Serial {
        port: "<enumeration>".to_string(),
        source,
    })?;

    let mut infos: Vec<PortInfo> = ports
        .into_iter()
        .map(|p| match p.port_type {
            serialport::SerialPortType::UsbPort(usb) => PortInfo {
                path: p.port_name,
                usb_id: Some((usb.vid, usb.pid)),
                product: usb.product,
                serial_number: usb.serial_number,
            },
            _ => PortInfo {
                path: p.port_name,
                usb_id: None,
                product: None,
                serial_number: None,
            },
        })
        .collect();
    infos.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(infos)
}

/// Print the host's serial ports, marking the configured SUT port
pub fn print_ports(sut_port: &str) -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("  Is the Pico plugged in with a data-capable USB cable?");
        println!("  Is your user in the 'dialout' group?");
        return Ok(());
    }

    println!("{}", "Serial ports:".green().bold());
    for port in &ports {
        let tags = port.tags(sut_port);
        let marker = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", ")).green().to_string()
        };
        let usb = port
            .usb_id
            .map(|(vid, pid)| format!("{:04x}:{:04x}", vid, pid))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {:<20} {:<10} {}{}",
            port.path.white().bold(),
            usb,
            port.product.as_deref().unwrap_or(""),
            marker
        );
    }

    if !ports.iter().any(|p| p.path == sut_port) {
        println!("{} configured SUT port {} is not present", "[WARN]".yellow().bold(), sut_port);
    }
    Ok(())
}
