//! Analysis module - kinematic feature extraction and movement classification

mod features;
mod patterns;

pub use features::*;
pub use patterns::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One timestamped observation of a moving region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub timestamp: DateTime<Utc>,

    /// Region centre in frame pixels
    pub x: f32,
    pub y: f32,

    /// Bounding extent in frame pixels
    pub width: f32,
    pub height: f32,

    /// Normalized motion intensity (0..1)
    pub intensity: f32,

    /// Detector confidence for this region (0..1)
    pub confidence: f32,
}

impl MotionSample {
    pub fn new(timestamp: DateTime<Utc>, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            timestamp,
            x,
            y,
            width,
            height,
            intensity: 0.5,
            confidence: 0.5,
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity.clamp(0.0, 1.0);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Movement classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementPattern {
    Unknown,
    SmallBird,
    LargeBird,
    SmallMammal,
    MediumMammal,
    LargeMammal,
    Insect,
    Vegetation,
    Weather,
    Vehicle,
    Human,
}

impl MovementPattern {
    pub fn is_wildlife(self) -> bool {
        matches!(
            self,
            MovementPattern::SmallBird
                | MovementPattern::LargeBird
                | MovementPattern::SmallMammal
                | MovementPattern::MediumMammal
                | MovementPattern::LargeMammal
        )
    }

    /// Wind-blown vegetation, weather noise and traffic
    pub fn is_environmental(self) -> bool {
        matches!(
            self,
            MovementPattern::Vegetation | MovementPattern::Weather | MovementPattern::Vehicle
        )
    }

    pub fn base_wildlife_score(self) -> f32 {
        match self {
            MovementPattern::SmallBird
            | MovementPattern::LargeBird
            | MovementPattern::SmallMammal
            | MovementPattern::MediumMammal
            | MovementPattern::LargeMammal => 0.9,
            MovementPattern::Insect => 0.3,
            MovementPattern::Human => 0.1,
            MovementPattern::Vegetation
            | MovementPattern::Weather
            | MovementPattern::Vehicle
            | MovementPattern::Unknown => 0.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MovementPattern::Unknown => "unknown",
            MovementPattern::SmallBird => "small bird",
            MovementPattern::LargeBird => "large bird",
            MovementPattern::SmallMammal => "small mammal",
            MovementPattern::MediumMammal => "medium mammal",
            MovementPattern::LargeMammal => "large mammal",
            MovementPattern::Insect => "insect",
            MovementPattern::Vegetation => "vegetation",
            MovementPattern::Weather => "weather",
            MovementPattern::Vehicle => "vehicle",
            MovementPattern::Human => "human",
        }
    }
}

/// Analyzer output, consumed immediately by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub is_valid: bool,
    pub pattern: MovementPattern,
    pub confidence: f32,
    pub wildlife_score: f32,
    pub interest_score: f32,
    pub characteristics: MovementCharacteristics,
    pub is_wildlife: bool,
    pub should_capture: bool,
    pub should_alert: bool,
    pub description: String,
}

impl AnalysisResult {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            pattern: MovementPattern::Unknown,
            confidence: 0.0,
            wildlife_score: 0.0,
            interest_score: 0.0,
            characteristics: MovementCharacteristics::default(),
            is_wildlife: false,
            should_capture: false,
            should_alert: false,
            description: reason.into(),
        }
    }
}

/// Pattern analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Rolling analysis window in seconds
    pub analysis_window_secs: f32,

    /// Minimum samples for a full analysis
    pub min_samples: usize,

    /// Hard cap on buffered samples
    pub max_samples: usize,

    /// Sensor frame size in pixels
    pub frame_width: u32,
    pub frame_height: u32,

    /// Step length below which a sample interval counts as idle
    pub min_movement_px: f32,

    /// Wildlife score needed to flag wildlife
    pub wildlife_threshold: f32,

    /// Interest score needed to request a capture
    pub capture_threshold: f32,

    /// Confidence above which wildlife raises an alert
    pub alert_confidence: f32,

    /// Weight of a new observation in the time-of-day table
    pub time_learning_rate: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            analysis_window_secs: 10.0,
            min_samples: 3,
            max_samples: 50,
            frame_width: 320,
            frame_height: 240,
            min_movement_px: 2.0,
            wildlife_threshold: 0.6,
            capture_threshold: 0.7,
            alert_confidence: 0.8,
            time_learning_rate: 0.1,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.analysis_window_secs.is_finite() && self.analysis_window_secs > 0.0) {
            return Err(ConfigError::invalid("analysis_window_secs", "must be positive"));
        }
        if self.min_samples < 2 || self.max_samples < self.min_samples {
            return Err(ConfigError::invalid(
                "min_samples",
                "need 2 <= min_samples <= max_samples",
            ));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::invalid("frame_width", "frame size must be non-zero"));
        }
        for (field, value) in [
            ("wildlife_threshold", self.wildlife_threshold),
            ("capture_threshold", self.capture_threshold),
            ("alert_confidence", self.alert_confidence),
            ("time_learning_rate", self.time_learning_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "must be within 0..=1"));
            }
        }
        Ok(())
    }

    pub fn frame_area(&self) -> f32 {
        self.frame_width as f32 * self.frame_height as f32
    }
}
