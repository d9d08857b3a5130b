// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Adaptive processing controller

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::{
    ActivityLevel, AdaptiveConfig, AdaptiveStatistics, ProcessingDecision, ProcessingLevel,
    RegionOfInterest,
};
use crate::error::ConfigError;

const DETECTION_HISTORY: usize = 100;
const PROCESSING_HISTORY: usize = 50;
const CENTROID_HISTORY: usize = 50;
const MIN_ROI_CENTROIDS: usize = 3;

/// Chooses the processing tier for each sensing cycle.
///
/// Activity is derived from the detection history and cannot be set directly;
/// only [`reset`](Self::reset) returns it to dormant.
pub struct AdaptiveController {
    config: AdaptiveConfig,
    activity: ActivityLevel,
    current_level: ProcessingLevel,
    roi: RegionOfInterest,

    detection_times: VecDeque<DateTime<Utc>>,
    detection_confidences: VecDeque<f32>,
    processing_times: VecDeque<f32>,
    centroids: VecDeque<(f32, f32)>,

    confirmed_detections: u64,
    level_changes: u64,
    total_decisions: u64,
    frames_skipped: u64,
    detections_recorded: u64,
}

impl AdaptiveController {
    pub fn new(config: AdaptiveConfig) -> Self {
        let roi = initial_roi(&config);
        Self {
            config,
            activity: ActivityLevel::Dormant,
            current_level: ProcessingLevel::Normal,
            roi,
            detection_times: VecDeque::with_capacity(DETECTION_HISTORY),
            detection_confidences: VecDeque::with_capacity(DETECTION_HISTORY),
            processing_times: VecDeque::with_capacity(PROCESSING_HISTORY),
            centroids: VecDeque::with_capacity(CENTROID_HISTORY),
            confirmed_detections: 0,
            level_changes: 0,
            total_decisions: 0,
            frames_skipped: 0,
            detections_recorded: 0,
        }
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    pub fn activity_level(&self) -> ActivityLevel {
        self.activity
    }

    pub fn current_level(&self) -> ProcessingLevel {
        self.current_level
    }

    pub fn roi(&self) -> &RegionOfInterest {
        &self.roi
    }

    pub fn level_changes(&self) -> u64 {
        self.level_changes
    }

    pub fn get_decision(&mut self, battery_voltage: f32, temperature: f32, light_level: f32) -> ProcessingDecision {
        self.get_decision_at(Utc::now(), battery_voltage, temperature, light_level)
    }

    pub fn get_decision_at(
        &mut self,
        now: DateTime<Utc>,
        battery_voltage: f32,
        temperature: f32,
        light_level: f32,
    ) -> ProcessingDecision {
        self.update_activity(now);

        let mut level = ProcessingLevel::Normal;
        let mut reasons: Vec<String> = Vec::new();

        let low = self.config.battery_low_threshold;
        if battery_voltage < low {
            level = ProcessingLevel::Minimal;
            reasons.push(format!("battery low ({:.2}V)", battery_voltage));
        } else if battery_voltage < low + 0.2 {
            level = ProcessingLevel::Reduced;
            reasons.push(format!("battery marginal ({:.2}V)", battery_voltage));
        }

        match self.activity {
            ActivityLevel::Dormant => {
                level = level.min(ProcessingLevel::Minimal);
                reasons.push("dormant".to_string());
            }
            ActivityLevel::Low => {
                level = level.min(ProcessingLevel::Reduced);
                reasons.push("low activity".to_string());
            }
            ActivityLevel::Moderate => {}
            ActivityLevel::High => {
                if battery_voltage > 3.5 {
                    level = level.max(ProcessingLevel::Enhanced);
                    reasons.push("high activity".to_string());
                }
            }
            ActivityLevel::Peak => {
                if battery_voltage > 3.6 {
                    level = ProcessingLevel::Maximum;
                    reasons.push("peak activity".to_string());
                } else if battery_voltage > 3.5 {
                    level = level.max(ProcessingLevel::Enhanced);
                    reasons.push("peak activity, battery limited".to_string());
                }
            }
        }

        if self.config.environmental_adaptation {
            let too_cold = temperature < self.config.optimal_temp_min - 10.0;
            let too_hot = temperature > self.config.optimal_temp_max + 10.0;
            if too_cold || too_hot {
                level = level.min(ProcessingLevel::Reduced);
                reasons.push(format!("extreme temperature ({:.1}°C)", temperature));
            }
            if light_level < 0.1 {
                level = level.min(ProcessingLevel::Reduced);
                reasons.push("low light".to_string());
            }
        }

        let (max_processing_time_ms, mut quality_factor) = level.budget();
        if self.activity <= ActivityLevel::Low {
            quality_factor *= 0.8;
        }

        let skip_frame = self.should_skip(now);

        if level != self.current_level {
            self.level_changes += 1;
            info!(
                "Processing level {:?} -> {:?} (activity {:?}, battery {:.2}V)",
                self.current_level, level, self.activity, battery_voltage
            );
            self.current_level = level;
        }

        self.total_decisions += 1;
        if skip_frame {
            self.frames_skipped += 1;
        }

        let reason = if reasons.is_empty() {
            "nominal".to_string()
        } else {
            reasons.join("; ")
        };

        ProcessingDecision {
            level,
            use_roi: self.config.roi_enabled && self.roi.enabled,
            roi: self.roi.clone(),
            skip_frame,
            max_processing_time_ms,
            quality_factor,
            activity: self.activity,
            reason,
        }
    }

    /// Degrade sensing cadence instead of stopping it
    fn should_skip(&self, now: DateTime<Utc>) -> bool {
        let interval = match self.activity {
            ActivityLevel::Dormant => self.config.dormant_interval_secs,
            ActivityLevel::Low => self.config.low_activity_interval_secs,
            _ => return false,
        };
        now.timestamp().rem_euclid(interval as i64) != 0
    }

    /// Recompute activity from the detection-time history
    pub fn update_activity(&mut self, now: DateTime<Utc>) -> ActivityLevel {
        let window = Duration::minutes(self.config.activity_window_mins as i64);
        let dormant_after = Duration::minutes(self.config.dormant_threshold_mins as i64);

        let recent = self
            .detection_times
            .iter()
            .filter(|&&t| t <= now && now - t <= window)
            .count();
        let per_hour = recent as f32 * 60.0 / self.config.activity_window_mins as f32;

        let stale = match self.detection_times.back() {
            Some(&last) => now - last > dormant_after,
            None => true,
        };

        let level = if stale {
            ActivityLevel::Dormant
        } else {
            ActivityLevel::from_rate(per_hour)
        };

        if level != self.activity {
            debug!("Activity {:?} -> {:?} ({:.1}/h)", self.activity, level, per_hour);
            self.activity = level;
        }
        level
    }

    /// Feed back a detection; `centroid` is the motion centre in frame pixels
    pub fn record_detection(
        &mut self,
        now: DateTime<Utc>,
        confidence: f32,
        centroid: Option<(f32, f32)>,
        processing_time_ms: Option<f32>,
    ) {
        push_bounded(&mut self.detection_times, now, DETECTION_HISTORY);
        push_bounded(&mut self.detection_confidences, confidence, DETECTION_HISTORY);
        if let Some(c) = centroid {
            push_bounded(&mut self.centroids, c, CENTROID_HISTORY);
        }
        if let Some(ms) = processing_time_ms {
            self.record_processing_time(ms);
        }
        self.detections_recorded += 1;

        if confidence >= self.config.roi_min_confidence {
            self.confirmed_detections += 1;
            if self.confirmed_detections % self.config.roi_update_every as u64 == 0 {
                self.update_roi(now);
            }
        }

        self.update_activity(now);
    }

    pub fn record_processing_time(&mut self, ms: f32) {
        push_bounded(&mut self.processing_times, ms.max(0.0), PROCESSING_HISTORY);
    }

    fn update_roi(&mut self, now: DateTime<Utc>) -> bool {
        if !self.config.roi_enabled || self.centroids.len() < MIN_ROI_CENTROIDS {
            return false;
        }

        let n = self.centroids.len() as f32;
        let (sx, sy) = self
            .centroids
            .iter()
            .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));

        self.roi.confirm(
            (sx / n, sy / n),
            self.config.frame_width,
            self.config.frame_height,
            now,
        );
        debug!(
            "ROI moved to ({:.0}, {:.0}) confidence {:.1}",
            self.roi.x, self.roi.y, self.roi.confidence
        );
        true
    }

    pub fn average_processing_time(&self) -> f32 {
        if self.processing_times.is_empty() {
            return 0.0;
        }
        self.processing_times.iter().sum::<f32>() / self.processing_times.len() as f32
    }

    /// Fraction of the baseline cycle time saved; observability only
    pub fn power_savings(&self) -> f32 {
        if self.processing_times.is_empty() {
            return 0.0;
        }
        let baseline = self.config.baseline_processing_time_ms;
        ((baseline - self.average_processing_time()) / baseline).max(0.0)
    }

    pub fn average_confidence(&self) -> f32 {
        if self.detection_confidences.is_empty() {
            return 0.0;
        }
        self.detection_confidences.iter().sum::<f32>() / self.detection_confidences.len() as f32
    }

    pub fn statistics(&self) -> AdaptiveStatistics {
        AdaptiveStatistics {
            current_level: self.current_level,
            activity: self.activity,
            level_changes: self.level_changes,
            total_decisions: self.total_decisions,
            frames_skipped: self.frames_skipped,
            detections_recorded: self.detections_recorded,
            average_processing_time_ms: self.average_processing_time(),
            power_savings: self.power_savings(),
            roi: self.roi.clone(),
        }
    }

    /// Back to the freshly initialized state
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
        info!("Adaptive controller reset");
    }

    pub fn get_config_json(&self) -> String {
        serde_json::to_string_pretty(&self.config).unwrap_or_default()
    }

    /// Rejected documents leave the current configuration untouched
    pub fn load_config_json(&mut self, json: &str) -> Result<(), ConfigError> {
        let config: AdaptiveConfig = serde_json::from_str(json)?;
        config.validate()?;

        let geometry_changed = config.roi_width != self.config.roi_width
            || config.roi_height != self.config.roi_height
            || config.frame_width != self.config.frame_width
            || config.frame_height != self.config.frame_height;

        self.config = config;
        if geometry_changed {
            self.roi = initial_roi(&self.config);
        }
        info!("Adaptive controller configuration updated");
        Ok(())
    }
}

impl Default for AdaptiveController {
    fn default() -> Self {
        Self::new(AdaptiveConfig::default())
    }
}

fn initial_roi(config: &AdaptiveConfig) -> RegionOfInterest {
    RegionOfInterest::centered(
        config.frame_width,
        config.frame_height,
        config.roi_width,
        config.roi_height,
    )
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, cap: usize) {
    queue.push_back(value);
    while queue.len() > cap {
        queue.pop_front();
    }
}
