//! Detection module - evidence fusion and the per-cycle coordinator

mod coordinator;
mod fusion;

pub use coordinator::*;
pub use fusion::*;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adaptive::{ProcessingDecision, ProcessingLevel};
use crate::analysis::{AnalysisResult, MotionSample};
use crate::config::MAX_PERIOD_SECS;
use crate::core::Frame;
use crate::error::{ConfigError, DetectorError};

/// Detection strategy.
///
/// Every consumer matches exhaustively, so a new method cannot be added
/// without deciding how each stage treats it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    PirOnly,
    FrameOnly,
    AiOnly,
    HybridBasic,
    HybridAi,
    FullFusion,
    /// Resolved to one of the concrete methods on every cycle
    Adaptive,
}

/// Independent source of motion evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceChannel {
    /// Passive-infrared presence sensor
    Pir,
    /// Frame-difference motion
    Frame,
    /// AI-assisted score from the base detector
    Ai,
    /// Wildlife confirmation from the pattern analyzer
    Pattern,
}

impl DetectionMethod {
    pub const CONCRETE: [DetectionMethod; 6] = [
        DetectionMethod::PirOnly,
        DetectionMethod::FrameOnly,
        DetectionMethod::AiOnly,
        DetectionMethod::HybridBasic,
        DetectionMethod::HybridAi,
        DetectionMethod::FullFusion,
    ];

    /// Evidence channels this method consults; empty for `Adaptive`
    pub fn channels(self) -> &'static [EvidenceChannel] {
        use EvidenceChannel::*;
        match self {
            DetectionMethod::PirOnly => &[Pir],
            DetectionMethod::FrameOnly => &[Frame],
            DetectionMethod::AiOnly => &[Ai],
            DetectionMethod::HybridBasic => &[Pir, Frame],
            DetectionMethod::HybridAi => &[Pir, Frame, Ai],
            DetectionMethod::FullFusion => &[Pir, Frame, Ai, Pattern],
            DetectionMethod::Adaptive => &[],
        }
    }

    pub fn uses(self, channel: EvidenceChannel) -> bool {
        self.channels().contains(&channel)
    }

    /// Whether the pattern analyzer runs under this method
    pub fn runs_pattern_analysis(self) -> bool {
        match self {
            DetectionMethod::HybridAi | DetectionMethod::FullFusion => true,
            DetectionMethod::PirOnly
            | DetectionMethod::FrameOnly
            | DetectionMethod::AiOnly
            | DetectionMethod::HybridBasic
            | DetectionMethod::Adaptive => false,
        }
    }

    /// Method matching a processing tier
    pub fn from_level(level: ProcessingLevel) -> Self {
        match level {
            ProcessingLevel::Minimal => DetectionMethod::PirOnly,
            ProcessingLevel::Reduced => DetectionMethod::HybridBasic,
            ProcessingLevel::Normal => DetectionMethod::HybridAi,
            ProcessingLevel::Enhanced | ProcessingLevel::Maximum => DetectionMethod::FullFusion,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMethod::PirOnly => "pir-only",
            DetectionMethod::FrameOnly => "frame-only",
            DetectionMethod::AiOnly => "ai-only",
            DetectionMethod::HybridBasic => "hybrid-basic",
            DetectionMethod::HybridAi => "hybrid-ai",
            DetectionMethod::FullFusion => "full-fusion",
            DetectionMethod::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "pir-only" | "pir" => Ok(DetectionMethod::PirOnly),
            "frame-only" | "frame" => Ok(DetectionMethod::FrameOnly),
            "ai-only" | "ai" => Ok(DetectionMethod::AiOnly),
            "hybrid-basic" => Ok(DetectionMethod::HybridBasic),
            "hybrid-ai" => Ok(DetectionMethod::HybridAi),
            "full-fusion" | "full" => Ok(DetectionMethod::FullFusion),
            "adaptive" => Ok(DetectionMethod::Adaptive),
            other => Err(format!("unknown detection method '{}'", other)),
        }
    }
}

/// Output of the external base motion detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseDetection {
    pub motion_detected: bool,

    /// Presence sensor fired
    pub sensor_triggered: bool,

    /// Frame-difference analysis found motion
    pub frame_motion_detected: bool,

    /// Frame-difference confidence (0..1)
    pub confidence: f32,

    /// Optional AI-assisted score (0..1)
    pub ai_confidence: Option<f32>,

    /// Moving region, when the detector localized one
    pub sample: Option<MotionSample>,
}

/// External base motion detector.
///
/// Black box: it may fuse a presence sensor and frame differencing however
/// the platform allows. `frame` is `None` when the cycle skips the frame.
pub trait MotionDetector: Send {
    fn detect_base(
        &mut self,
        frame: Option<&Frame>,
        method: DetectionMethod,
    ) -> Result<BaseDetection, DetectorError>;
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Detection strategy
    pub method: DetectionMethod,

    /// Channel weights
    pub pir_weight: f32,
    pub frame_weight: f32,
    pub ai_weight: f32,
    pub pattern_weight: f32,

    /// Minimum fused confidence for a detection
    pub detection_threshold: f32,

    /// Action thresholds
    pub capture_threshold: f32,
    pub transmit_threshold: f32,
    pub alert_threshold: f32,

    /// Discount confidence during active weather
    pub weather_compensation: bool,

    /// Failures in a row before falling back to PIR only
    pub max_consecutive_failures: u32,

    /// Seconds to stay in fallback before adaptive selection resumes
    pub recovery_delay_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            method: DetectionMethod::Adaptive,
            pir_weight: 0.3,
            frame_weight: 0.4,
            ai_weight: 0.3,
            pattern_weight: 0.2,
            detection_threshold: 0.5,
            capture_threshold: 0.7,
            transmit_threshold: 0.8,
            alert_threshold: 0.85,
            weather_compensation: true,
            max_consecutive_failures: 5,
            recovery_delay_secs: 60,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("pir_weight", self.pir_weight),
            ("frame_weight", self.frame_weight),
            ("ai_weight", self.ai_weight),
            ("pattern_weight", self.pattern_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "weight must be within 0..=1"));
            }
        }
        for (field, value) in [
            ("detection_threshold", self.detection_threshold),
            ("capture_threshold", self.capture_threshold),
            ("transmit_threshold", self.transmit_threshold),
            ("alert_threshold", self.alert_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "threshold must be within 0..=1"));
            }
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::invalid("max_consecutive_failures", "must be non-zero"));
        }
        if self.recovery_delay_secs > MAX_PERIOD_SECS {
            return Err(ConfigError::invalid(
                "recovery_delay_secs",
                format!("must not exceed {}", MAX_PERIOD_SECS),
            ));
        }
        Ok(())
    }
}

/// Final fused decision for one cycle; owned by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorResult {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub detected: bool,
    pub fusion_confidence: f32,
    pub method_used: DetectionMethod,
    pub analysis: Option<AnalysisResult>,
    pub processing: ProcessingDecision,
    pub should_capture: bool,
    pub should_save: bool,
    pub should_transmit: bool,
    pub should_alert: bool,
    /// Fallback mode was active for this cycle
    pub degraded: bool,
    pub processing_time_ms: f32,
    pub description: String,
}

/// Coordinator counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorStatistics {
    pub total_cycles: u64,
    pub detections: u64,
    pub captures: u64,
    pub alerts: u64,
    pub failures: u64,
    pub fallbacks: u64,
    pub skipped_frames: u64,
    pub analysis_skipped: u64,
    pub method_usage: HashMap<DetectionMethod, u64>,
    pub last_detection: Option<DateTime<Utc>>,
}
