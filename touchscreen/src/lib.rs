#![cfg_attr(not(test), no_std)]

//! Resistive touch panel driver.
//!
//! The panel is scanned one ADC conversion at a time from the conversion
//! complete interrupt. Every four conversions yield one raw X/Y pair, which is
//! debounced and converted to screen coordinates before being delivered to a
//! single registered callback as pen down / move / up events.
//!
//! Everything that touches real hardware (pin direction and level, ADC channel
//! selection, the conversion trigger timer) sits behind the [`engine::Panel`]
//! trait and is provided by the board.

pub mod calibrate;
pub mod calibration;
pub mod debounce;
pub mod engine;
pub mod error;

pub use calibration::{Calibration, Orientation, Variant};
pub use engine::{DrivePhase, Panel, TouchEngine};
pub use error::CalibrationError;

/// Kind of pointer event produced by the debouncer
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Down,
    Move,
    Up,
}

/// A debounced pointer event, in screen coordinates
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointerEvent {
    pub kind: EventKind,
    pub x: i32,
    pub y: i32,
}

impl PointerEvent {
    pub const fn new(kind: EventKind, x: i32, y: i32) -> Self {
        Self { kind, x, y }
    }
}

/// Receives pointer events. Called from the conversion complete interrupt, so
/// it must return quickly and never block.
pub type EventCallback = fn(PointerEvent);

/// The most recent raw ADC reading for each axis. Not affected by the screen
/// orientation.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
}

impl RawSample {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    /// Both axes must read at or above `touch_min` for the pen to be down. An
    /// open circuit on either layer reads low.
    pub fn is_touching(&self, touch_min: i16) -> bool {
        self.x >= touch_min && self.y >= touch_min
    }
}

/// Configuration for the touch engine
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Selects which column of the factory calibration tables is used
    pub orientation: Orientation,
    /// Rate at which the conversion trigger fires. One X/Y pair takes four
    /// conversions.
    pub sample_rate_hz: u32,
    /// Overrides the variant's minimum valid reading when set
    pub touch_min: Option<i16>,
}

impl EngineConfig {
    const fn default() -> Self {
        Self {
            orientation: Orientation::LandscapeFlip,
            sample_rate_hz: 1000,
            touch_min: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        DEFAULT_ENGINE_CONFIG
    }
}

pub const DEFAULT_ENGINE_CONFIG: EngineConfig = EngineConfig::default();

/// Number of consecutive agreeing raw samples needed to change pen state
pub const DEBOUNCE_COUNT: u8 = 3;
