//! Raspberry Pi Pico bench profiles
//!
//! The default two-board bench: SUT 1 runs the firmware under test (and
//! the PWM generator), SUT 2 runs the logic analyzer firmware.

use super::profile::SutProfile;
use once_cell::sync::Lazy;

/// Primary board running the firmware under test
pub static PICO_SUT1: Lazy<SutProfile> = Lazy::new(|| {
    SutProfile::new(1, "Pico SUT 1")
        .with_description("Firmware under test, PWM signal source")
});

/// Secondary board flashed with the logic analyzer UF2
pub static PICO_SUT2: Lazy<SutProfile> = Lazy::new(|| {
    SutProfile::new(2, "Pico SUT 2")
        .with_description("Logic analyzer (sigrok OLS-compatible)")
});
