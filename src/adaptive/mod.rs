// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Adaptive processing - trades detection fidelity for battery life
//!
//! Decides, before any expensive work runs, how much of it to run this cycle:
//! the processing tier, whether to skip the frame, and where the activity is
//! likely to be.

mod controller;
mod roi;

pub use controller::AdaptiveController;
pub use roi::RegionOfInterest;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Rolling assessment of how often motion occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActivityLevel {
    Dormant,
    Low,
    Moderate,
    High,
    Peak,
}

impl ActivityLevel {
    /// Classify a detections-per-hour rate
    pub fn from_rate(per_hour: f32) -> Self {
        match per_hour {
            r if r > 15.0 => ActivityLevel::Peak,
            r if r > 5.0 => ActivityLevel::High,
            r if r > 1.0 => ActivityLevel::Moderate,
            r if r > 0.0 => ActivityLevel::Low,
            _ => ActivityLevel::Dormant,
        }
    }
}

/// How much computation a cycle may spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProcessingLevel {
    Minimal,
    Reduced,
    Normal,
    Enhanced,
    Maximum,
}

impl ProcessingLevel {
    /// `(max_processing_time_ms, quality_factor)` for this tier
    pub fn budget(self) -> (u32, f32) {
        match self {
            ProcessingLevel::Minimal => (100, 0.6),
            ProcessingLevel::Reduced => (200, 0.7),
            ProcessingLevel::Normal => (350, 0.85),
            ProcessingLevel::Enhanced => (500, 1.0),
            ProcessingLevel::Maximum => (800, 1.0),
        }
    }
}

/// Controller output for one cycle.
///
/// `max_processing_time_ms` is an advisory budget; nothing here preempts work
/// that overruns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingDecision {
    pub level: ProcessingLevel,
    pub use_roi: bool,
    pub roi: RegionOfInterest,
    pub skip_frame: bool,
    pub max_processing_time_ms: u32,
    pub quality_factor: f32,
    pub activity: ActivityLevel,
    pub reason: String,
}

/// Adaptive controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Battery voltage treated as low
    pub battery_low_threshold: f32,

    /// Window over which the detection rate is computed
    pub activity_window_mins: u32,

    /// Time without detections after which activity is dormant
    pub dormant_threshold_mins: u32,

    /// Frame cadence while dormant
    pub dormant_interval_secs: u32,

    /// Frame cadence at low activity
    pub low_activity_interval_secs: u32,

    /// Comfortable operating temperature range in °C
    pub optimal_temp_min: f32,
    pub optimal_temp_max: f32,

    /// Clamp processing for extreme temperature or darkness
    pub environmental_adaptation: bool,

    /// Track a region of interest
    pub roi_enabled: bool,
    pub roi_width: f32,
    pub roi_height: f32,

    /// Sensor frame size in pixels
    pub frame_width: f32,
    pub frame_height: f32,

    /// Minimum confidence for a detection to confirm the ROI
    pub roi_min_confidence: f32,

    /// Recompute the ROI every N confirmed detections
    pub roi_update_every: u32,

    /// Reference cycle time for the power-savings estimate
    pub baseline_processing_time_ms: f32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            battery_low_threshold: 3.3,
            activity_window_mins: 60,
            dormant_threshold_mins: 30,
            dormant_interval_secs: 30,
            low_activity_interval_secs: 5,
            optimal_temp_min: 5.0,
            optimal_temp_max: 35.0,
            environmental_adaptation: true,
            roi_enabled: true,
            roi_width: 160.0,
            roi_height: 120.0,
            frame_width: 320.0,
            frame_height: 240.0,
            roi_min_confidence: 0.3,
            roi_update_every: 5,
            baseline_processing_time_ms: 500.0,
        }
    }
}

impl AdaptiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.battery_low_threshold <= 0.0 {
            return Err(ConfigError::invalid("battery_low_threshold", "must be positive"));
        }
        if self.activity_window_mins == 0 || self.dormant_threshold_mins == 0 {
            return Err(ConfigError::invalid("activity_window_mins", "windows must be non-zero"));
        }
        if self.dormant_interval_secs == 0 || self.low_activity_interval_secs == 0 {
            return Err(ConfigError::invalid("dormant_interval_secs", "intervals must be non-zero"));
        }
        if self.optimal_temp_min > self.optimal_temp_max {
            return Err(ConfigError::invalid("optimal_temp_min", "must not exceed optimal_temp_max"));
        }
        if self.frame_width <= 0.0 || self.frame_height <= 0.0 {
            return Err(ConfigError::invalid("frame_width", "frame size must be positive"));
        }
        if self.roi_width <= 0.0
            || self.roi_height <= 0.0
            || self.roi_width > self.frame_width
            || self.roi_height > self.frame_height
        {
            return Err(ConfigError::invalid("roi_width", "ROI must fit inside the frame"));
        }
        if !(0.0..=1.0).contains(&self.roi_min_confidence) {
            return Err(ConfigError::invalid("roi_min_confidence", "must be within 0..=1"));
        }
        if self.roi_update_every == 0 {
            return Err(ConfigError::invalid("roi_update_every", "must be non-zero"));
        }
        if self.baseline_processing_time_ms <= 0.0 {
            return Err(ConfigError::invalid("baseline_processing_time_ms", "must be positive"));
        }
        Ok(())
    }
}

/// Controller counters and estimates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveStatistics {
    pub current_level: ProcessingLevel,
    pub activity: ActivityLevel,
    pub level_changes: u64,
    pub total_decisions: u64,
    pub frames_skipped: u64,
    pub detections_recorded: u64,
    pub average_processing_time_ms: f32,
    pub power_savings: f32,
    pub roi: RegionOfInterest,
}
