//! Serial line source
//!
//! This module provides:
//! - Opening the SUT's UART under a scoped lifetime
//! - A deadline-bounded stream of decoded text lines
//! - Listing available serial ports

pub mod lines;
pub mod port;

pub use lines::LineStream;
pub use port::{open_lines, PortConfig};
