// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Evidence fusion - weighted channel average with environmental scaling

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::core::{EnvironmentalConditions, TimeOfDay};

use super::{BaseDetection, CoordinatorConfig, DetectionMethod, EvidenceChannel};

/// Bounds of the environmental multiplier
pub const MULTIPLIER_MIN: f32 = 0.5;
pub const MULTIPLIER_MAX: f32 = 1.2;

/// One fired channel and what it contributed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelContribution {
    pub channel: EvidenceChannel,
    pub weight: f32,
    pub confidence: f32,
}

/// Fusion output for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    /// Weighted average before environmental scaling
    pub raw_confidence: f32,
    pub environmental_multiplier: f32,
    /// Final confidence in 0..=1
    pub confidence: f32,
    pub contributions: Vec<ChannelContribution>,
}

impl FusionResult {
    /// Whether any channel fired
    pub fn has_evidence(&self) -> bool {
        !self.contributions.is_empty()
    }
}

/// Combines channel evidence into a single confidence
#[derive(Debug, Clone)]
pub struct FusionEngine {
    channel_weights: HashMap<EvidenceChannel, f32>,
    weather_compensation: bool,
}

impl FusionEngine {
    pub fn new(config: &CoordinatorConfig) -> Self {
        let mut channel_weights = HashMap::new();
        channel_weights.insert(EvidenceChannel::Pir, config.pir_weight);
        channel_weights.insert(EvidenceChannel::Frame, config.frame_weight);
        channel_weights.insert(EvidenceChannel::Ai, config.ai_weight);
        channel_weights.insert(EvidenceChannel::Pattern, config.pattern_weight);

        Self {
            channel_weights,
            weather_compensation: config.weather_compensation,
        }
    }

    /// Confidence from each channel of `method` that fired this cycle
    pub fn collect_evidence(
        &self,
        method: DetectionMethod,
        base: &BaseDetection,
        analysis: Option<&AnalysisResult>,
    ) -> Vec<ChannelContribution> {
        method
            .channels()
            .iter()
            .filter_map(|&channel| {
                let confidence = match channel {
                    EvidenceChannel::Pir => base.sensor_triggered.then_some(1.0),
                    EvidenceChannel::Frame => base.frame_motion_detected.then_some(base.confidence),
                    EvidenceChannel::Ai => base.ai_confidence,
                    EvidenceChannel::Pattern => analysis
                        .filter(|a| a.is_valid && a.is_wildlife)
                        .map(|a| a.confidence),
                }?;

                Some(ChannelContribution {
                    channel,
                    weight: self.channel_weight(channel),
                    confidence: confidence.clamp(0.0, 1.0),
                })
            })
            .collect()
    }

    /// Weighted average over the fired channels
    pub fn weighted_fusion(&self, evidence: &[ChannelContribution]) -> f32 {
        let (weighted_sum, weight_sum) = evidence
            .iter()
            .fold((0.0f32, 0.0f32), |(ws, w), c| (ws + c.weight * c.confidence, w + c.weight));

        if weight_sum > 1e-6 {
            weighted_sum / weight_sum
        } else {
            0.0
        }
    }

    /// Full fusion for one cycle
    pub fn fuse(
        &self,
        method: DetectionMethod,
        base: &BaseDetection,
        analysis: Option<&AnalysisResult>,
        conditions: &EnvironmentalConditions,
    ) -> FusionResult {
        let contributions = self.collect_evidence(method, base, analysis);
        let raw_confidence = self.weighted_fusion(&contributions);
        let environmental_multiplier = self.environmental_multiplier(conditions);

        FusionResult {
            raw_confidence,
            environmental_multiplier,
            confidence: (raw_confidence * environmental_multiplier).clamp(0.0, 1.0),
            contributions,
        }
    }

    /// Product of the condition factors, clamped to 0.5..=1.2
    pub fn environmental_multiplier(&self, conditions: &EnvironmentalConditions) -> f32 {
        let mut multiplier = 1.0;

        if conditions.battery_voltage < 3.3 {
            multiplier *= 0.9;
        }
        if conditions.temperature < 0.0 || conditions.temperature > 40.0 {
            multiplier *= 0.95;
        }
        if conditions.is_dark() {
            multiplier *= 0.9;
        }
        if conditions.active_weather && self.weather_compensation {
            multiplier *= 0.85;
        }
        multiplier *= Self::time_of_day_multiplier(conditions.hour_of_day);

        multiplier.clamp(MULTIPLIER_MIN, MULTIPLIER_MAX)
    }

    /// Wildlife is most active at dawn and dusk
    pub fn time_of_day_multiplier(hour: u8) -> f32 {
        match TimeOfDay::from_hour(hour) {
            TimeOfDay::Dawn => 1.10,
            TimeOfDay::Dusk => 1.15,
            TimeOfDay::DeepNight => 0.90,
            TimeOfDay::Midday => 0.95,
            TimeOfDay::Morning | TimeOfDay::Afternoon | TimeOfDay::Evening => 1.0,
        }
    }

    pub fn set_channel_weight(&mut self, channel: EvidenceChannel, weight: f32) {
        self.channel_weights.insert(channel, weight.clamp(0.0, 1.0));
    }

    pub fn channel_weight(&self, channel: EvidenceChannel) -> f32 {
        self.channel_weights.get(&channel).copied().unwrap_or(0.0)
    }

    pub fn channel_weights(&self) -> &HashMap<EvidenceChannel, f32> {
        &self.channel_weights
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(&CoordinatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MovementPattern;

    fn daytime() -> EnvironmentalConditions {
        EnvironmentalConditions::new(3.9, 20.0, 0.8, 9)
    }

    fn full_base() -> BaseDetection {
        BaseDetection {
            motion_detected: true,
            sensor_triggered: true,
            frame_motion_detected: true,
            confidence: 0.8,
            ai_confidence: Some(0.6),
            sample: None,
        }
    }

    fn wildlife(confidence: f32) -> AnalysisResult {
        AnalysisResult {
            is_valid: true,
            pattern: MovementPattern::MediumMammal,
            confidence,
            wildlife_score: 0.8,
            interest_score: 0.7,
            is_wildlife: true,
            should_capture: true,
            ..AnalysisResult::invalid("")
        }
    }

    #[test]
    fn test_weighted_average_over_fired_channels() {
        let engine = FusionEngine::default();
        let result = engine.fuse(DetectionMethod::HybridBasic, &full_base(), None, &daytime());

        // (0.3 * 1.0 + 0.4 * 0.8) / 0.7
        let expected = (0.3 + 0.32) / 0.7;
        assert!((result.raw_confidence - expected).abs() < 1e-5);
        assert_eq!(result.contributions.len(), 2);
        assert!((result.environmental_multiplier - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_silent_channels_do_not_dilute() {
        let engine = FusionEngine::default();
        let base = BaseDetection {
            motion_detected: true,
            sensor_triggered: true,
            ..Default::default()
        };

        let result = engine.fuse(DetectionMethod::HybridAi, &base, None, &daytime());
        assert_eq!(result.contributions.len(), 1);
        assert!((result.raw_confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_evidence() {
        let engine = FusionEngine::default();
        let result = engine.fuse(DetectionMethod::FullFusion, &BaseDetection::default(), None, &daytime());
        assert!(!result.has_evidence());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_method_limits_channels() {
        let engine = FusionEngine::default();
        let evidence = engine.collect_evidence(DetectionMethod::PirOnly, &full_base(), None);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].channel, EvidenceChannel::Pir);

        let analysis = wildlife(0.9);
        let evidence = engine.collect_evidence(DetectionMethod::HybridAi, &full_base(), Some(&analysis));
        assert!(evidence.iter().all(|c| c.channel != EvidenceChannel::Pattern));

        let evidence = engine.collect_evidence(DetectionMethod::FullFusion, &full_base(), Some(&analysis));
        assert_eq!(evidence.len(), 4);
    }

    #[test]
    fn test_pattern_channel_needs_wildlife() {
        let engine = FusionEngine::default();
        let mut analysis = wildlife(0.9);
        analysis.is_wildlife = false;
        let evidence = engine.collect_evidence(DetectionMethod::FullFusion, &full_base(), Some(&analysis));
        assert!(evidence.iter().all(|c| c.channel != EvidenceChannel::Pattern));

        let invalid = AnalysisResult::invalid("too few samples");
        let evidence = engine.collect_evidence(DetectionMethod::FullFusion, &full_base(), Some(&invalid));
        assert_eq!(evidence.len(), 3);
    }

    #[test]
    fn test_time_of_day_multiplier() {
        assert_eq!(FusionEngine::time_of_day_multiplier(6), 1.10);
        assert_eq!(FusionEngine::time_of_day_multiplier(18), 1.15);
        assert_eq!(FusionEngine::time_of_day_multiplier(2), 0.90);
        assert_eq!(FusionEngine::time_of_day_multiplier(12), 0.95);
        assert_eq!(FusionEngine::time_of_day_multiplier(9), 1.0);
    }

    #[test]
    fn test_environmental_penalties_stack() {
        let engine = FusionEngine::default();
        let mut conditions = EnvironmentalConditions::new(3.1, -5.0, 0.05, 2);
        conditions.active_weather = true;

        // 0.9 * 0.95 * 0.9 * 0.85 * 0.9 = 0.5886
        let m = engine.environmental_multiplier(&conditions);
        assert!((m - 0.9 * 0.95 * 0.9 * 0.85 * 0.9).abs() < 1e-4);

        let engine = FusionEngine::new(&CoordinatorConfig {
            weather_compensation: false,
            ..Default::default()
        });
        assert!(engine.environmental_multiplier(&conditions) > m);
    }

    #[test]
    fn test_multiplier_and_confidence_bounds() {
        let engine = FusionEngine::default();
        for hour in 0..24u8 {
            for &battery in &[3.0, 3.5, 4.2] {
                for &light in &[0.0, 0.05, 0.5, 1.0] {
                    for &weather in &[false, true] {
                        let mut conditions = EnvironmentalConditions::new(battery, 50.0, light, hour);
                        conditions.active_weather = weather;

                        let m = engine.environmental_multiplier(&conditions);
                        assert!((MULTIPLIER_MIN..=MULTIPLIER_MAX).contains(&m));

                        let result = engine.fuse(
                            DetectionMethod::FullFusion,
                            &full_base(),
                            Some(&wildlife(1.0)),
                            &conditions,
                        );
                        assert!(result.confidence <= 1.0);
                        assert!(result.confidence >= 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_dusk_boost_is_clamped() {
        let engine = FusionEngine::default();
        let base = BaseDetection {
            motion_detected: true,
            sensor_triggered: true,
            ..Default::default()
        };
        let result = engine.fuse(DetectionMethod::PirOnly, &base, None, &EnvironmentalConditions::new(3.9, 20.0, 0.5, 18));
        assert!((result.environmental_multiplier - 1.15).abs() < 1e-6);
        assert_eq!(result.confidence, 1.0);
    }
}
