//! Core types shared by every stage of the sensing cycle

mod event_bus;

pub use event_bus::{EventBus, MotionCallback};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Environmental snapshot supplied by the caller on every cycle.
///
/// There is intentionally no `Default`: no value is safe to assume for a
/// battery voltage or light level that was never measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalConditions {
    /// Battery voltage in volts
    pub battery_voltage: f32,

    /// Ambient temperature in °C
    pub temperature: f32,

    /// Normalized light level (0 = dark, 1 = full daylight)
    pub light_level: f32,

    /// Wind speed in m/s
    pub wind_speed: f32,

    /// Relative humidity in percent
    pub humidity: f32,

    /// Local hour of day (0-23)
    pub hour_of_day: u8,

    /// Night flag from the platform's light/clock logic
    pub is_night: bool,

    /// Rain, snow or strong wind currently active
    pub active_weather: bool,
}

impl EnvironmentalConditions {
    /// Calm conditions with the given measured values
    pub fn new(battery_voltage: f32, temperature: f32, light_level: f32, hour_of_day: u8) -> Self {
        let hour_of_day = hour_of_day % 24;
        Self {
            battery_voltage,
            temperature,
            light_level,
            wind_speed: 0.0,
            humidity: 50.0,
            hour_of_day,
            is_night: !(6..20).contains(&hour_of_day),
            active_weather: false,
        }
    }

    pub fn is_dark(&self) -> bool {
        self.light_level < 0.1
    }
}

/// Coarse time-of-day bucket used for activity expectations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOfDay {
    DeepNight,
    Dawn,
    Morning,
    Midday,
    Afternoon,
    Dusk,
    Evening,
}

impl TimeOfDay {
    pub fn from_hour(hour: u8) -> Self {
        match hour % 24 {
            0..=4 => TimeOfDay::DeepNight,
            5..=7 => TimeOfDay::Dawn,
            8..=10 => TimeOfDay::Morning,
            11..=14 => TimeOfDay::Midday,
            15..=16 => TimeOfDay::Afternoon,
            17..=19 => TimeOfDay::Dusk,
            _ => TimeOfDay::Evening,
        }
    }
}

/// Opaque camera frame.
///
/// Passed through to the base detector only; nothing in this crate looks at
/// the pixel data.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    pub data: Vec<u8>,
}
