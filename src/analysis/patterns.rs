// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Movement pattern analyzer - wildlife vs. environmental noise
//!
//! Classification is a fixed, ordered rule list. Environmental artifacts
//! (vegetation, weather, insects, vehicles) are tested before any wildlife
//! bucket because they are the dominant false-positive source of an
//! always-on outdoor sensor.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    extract_characteristics, AnalysisResult, AnalyzerConfig, MotionSample, MovementCharacteristics,
    MovementPattern,
};
use crate::core::TimeOfDay;
use crate::error::ConfigError;

const MAX_EXAMPLES_PER_PATTERN: usize = 20;
const QUICK_CONFIDENCE: f32 = 0.6;

/// Stored example for offline rule tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedExample {
    pub characteristics: MovementCharacteristics,
    pub confidence: f32,
    pub learned_at: DateTime<Utc>,
}

/// Analyzer counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerStatistics {
    pub total_analyses: u64,
    pub quick_analyses: u64,
    pub wildlife_detections: u64,
    pub environmental_rejections: u64,
    pub pattern_counts: HashMap<MovementPattern, u64>,
    pub learned_examples: usize,
    pub average_confidence: f32,
}

/// Rule-based movement classifier over a rolling sample window
pub struct PatternAnalyzer {
    config: AnalyzerConfig,
    samples: VecDeque<MotionSample>,
    time_pattern: [f32; 24],
    learned: HashMap<MovementPattern, VecDeque<LearnedExample>>,
    stats: AnalyzerStatistics,
}

impl PatternAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.max_samples),
            config,
            time_pattern: default_time_pattern(),
            learned: HashMap::new(),
            stats: AnalyzerStatistics::default(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Append a sample, evicting by age and then by count
    pub fn add_sample(&mut self, sample: MotionSample) {
        let window = Duration::milliseconds((self.config.analysis_window_secs * 1000.0) as i64);
        let newest = sample.timestamp;
        self.samples.push_back(sample);

        while let Some(front) = self.samples.front() {
            if newest - front.timestamp > window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        while self.samples.len() > self.config.max_samples {
            self.samples.pop_front();
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn clear_samples(&mut self) {
        self.samples.clear();
    }

    /// Full windowed analysis of the buffered samples
    pub fn analyze(&mut self) -> AnalysisResult {
        let window: Vec<MotionSample> = self.samples.iter().cloned().collect();
        self.analyze_samples(&window)
    }

    /// Full analysis using the caller's local hour for the activity factor
    pub fn analyze_with_hour(&mut self, hour: u8) -> AnalysisResult {
        let window: Vec<MotionSample> = self.samples.iter().cloned().collect();
        self.run_analysis(&window, Some(hour))
    }

    /// Full analysis over an explicit window
    pub fn analyze_samples(&mut self, samples: &[MotionSample]) -> AnalysisResult {
        self.run_analysis(samples, None)
    }

    fn run_analysis(&mut self, samples: &[MotionSample], hour: Option<u8>) -> AnalysisResult {
        if samples.len() < self.config.min_samples {
            return AnalysisResult::invalid(format!(
                "Insufficient samples: {} < {}",
                samples.len(),
                self.config.min_samples
            ));
        }

        let characteristics = extract_characteristics(samples, &self.config);
        let (pattern, rule_confidence) = Self::classify(&characteristics);

        // Longer windows earn more trust, up to 10 samples
        let sufficiency = 0.7 + 0.3 * (samples.len() as f32 / 10.0).min(1.0);
        let confidence = (rule_confidence * sufficiency).clamp(0.0, 1.0);

        let hour = hour.unwrap_or_else(|| newest_hour(samples));
        let result = self.build_result(pattern, confidence, characteristics, hour);

        self.record(&result);
        self.stats.total_analyses += 1;

        debug!(
            "Analysis: {} (conf {:.2}, wildlife {:.2}, interest {:.2})",
            pattern.name(),
            result.confidence,
            result.wildlife_score,
            result.interest_score
        );
        result
    }

    /// Two-point classification for latency-critical gating
    pub fn quick_analysis(&mut self, previous: &MotionSample, current: &MotionSample) -> AnalysisResult {
        let pair = [previous.clone(), current.clone()];
        let characteristics = extract_characteristics(&pair, &self.config);
        let (pattern, _) = Self::classify(&characteristics);

        let result = self.build_result(pattern, QUICK_CONFIDENCE, characteristics, newest_hour(&pair));
        self.stats.quick_analyses += 1;
        result
    }

    /// Ordered rules, first match wins
    pub fn classify(c: &MovementCharacteristics) -> (MovementPattern, f32) {
        if c.periodicity > 0.7 && c.speed < 5.0 && c.direction_stability < 0.3 {
            return (MovementPattern::Vegetation, 0.8);
        }
        if c.relative_size > 0.5 && c.periodicity > 0.4 && c.mean_intensity < 0.4 {
            return (MovementPattern::Weather, 0.75);
        }
        if c.relative_size < 0.05 && c.speed > 15.0 && c.direction_stability < 0.5 {
            return (MovementPattern::Insect, 0.7);
        }
        if c.speed > 30.0 && c.direction_stability > 0.7 && c.periodicity < 0.2 {
            return (MovementPattern::Vehicle, 0.85);
        }

        if c.relative_size > 0.3 && c.speed < 10.0 {
            return (MovementPattern::LargeMammal, 0.75);
        }
        if c.relative_size > 0.2 && c.verticality > 0.6 {
            return (MovementPattern::Human, 0.7);
        }
        if c.speed > 20.0 && c.relative_size < 0.1 && c.verticality > 0.3 {
            return if c.verticality > 0.5 {
                (MovementPattern::SmallBird, 0.7)
            } else {
                (MovementPattern::LargeBird, 0.7)
            };
        }
        if (0.05..=0.3).contains(&c.relative_size) {
            return if c.speed > 10.0 {
                (MovementPattern::SmallMammal, 0.65)
            } else {
                (MovementPattern::MediumMammal, 0.65)
            };
        }

        (MovementPattern::MediumMammal, 0.5)
    }

    fn build_result(
        &self,
        pattern: MovementPattern,
        confidence: f32,
        characteristics: MovementCharacteristics,
        hour: u8,
    ) -> AnalysisResult {
        let wildlife_score = wildlife_score(pattern, &characteristics);
        let interest_score = (wildlife_score * self.activity_factor(hour)).clamp(0.0, 1.0);

        let is_wildlife = wildlife_score >= self.config.wildlife_threshold;
        let should_capture = interest_score >= self.config.capture_threshold;
        let should_alert = is_wildlife && confidence > self.config.alert_confidence;

        let description = format!(
            "{} moving {:.1} px/s over {:.1}s",
            pattern.name(),
            characteristics.speed,
            characteristics.dwell_time
        );

        AnalysisResult {
            is_valid: true,
            pattern,
            confidence,
            wildlife_score,
            interest_score,
            characteristics,
            is_wildlife,
            should_capture,
            should_alert,
            description,
        }
    }

    fn record(&mut self, result: &AnalysisResult) {
        *self.stats.pattern_counts.entry(result.pattern).or_insert(0) += 1;
        if result.is_wildlife {
            self.stats.wildlife_detections += 1;
        }
        if result.pattern.is_environmental() {
            self.stats.environmental_rejections += 1;
        }

        let n = self.stats.total_analyses as f32;
        self.stats.average_confidence = (self.stats.average_confidence * n + result.confidence) / (n + 1.0);
    }

    /// Expected-activity multiplier for an hour
    pub fn activity_factor(&self, hour: u8) -> f32 {
        self.time_pattern[(hour % 24) as usize]
    }

    /// Fold an observed activity level into the time-of-day table
    pub fn update_time_pattern(&mut self, hour: u8, activity: f32) {
        let rate = self.config.time_learning_rate;
        let slot = &mut self.time_pattern[(hour % 24) as usize];
        *slot = ((1.0 - rate) * *slot + rate * activity).clamp(0.1, 1.5);
    }

    /// Store a labelled example for offline rule tuning.
    ///
    /// Data collection only: the rule set in [`classify`](Self::classify) is
    /// not affected.
    pub fn learn_pattern(&mut self, pattern: MovementPattern, characteristics: MovementCharacteristics, confidence: f32) {
        let examples = self.learned.entry(pattern).or_default();
        examples.push_back(LearnedExample {
            characteristics,
            confidence: confidence.clamp(0.0, 1.0),
            learned_at: Utc::now(),
        });
        while examples.len() > MAX_EXAMPLES_PER_PATTERN {
            examples.pop_front();
        }

        self.stats.learned_examples = self.learned.values().map(|v| v.len()).sum();
    }

    pub fn learned_examples(&self, pattern: MovementPattern) -> Vec<LearnedExample> {
        self.learned
            .get(&pattern)
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn statistics(&self) -> AnalyzerStatistics {
        self.stats.clone()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.time_pattern = default_time_pattern();
        self.learned.clear();
        self.stats = AnalyzerStatistics::default();
        info!("Pattern analyzer reset");
    }

    pub fn get_config_json(&self) -> String {
        serde_json::to_string_pretty(&self.config).unwrap_or_default()
    }

    /// Rejected documents leave the current configuration untouched
    pub fn load_config_json(&mut self, json: &str) -> Result<(), ConfigError> {
        let config: AnalyzerConfig = serde_json::from_str(json)?;
        config.validate()?;
        self.config = config;
        info!("Pattern analyzer configuration updated");
        Ok(())
    }
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

fn wildlife_score(pattern: MovementPattern, c: &MovementCharacteristics) -> f32 {
    let base = pattern.base_wildlife_score();
    if base <= 0.0 {
        return 0.0;
    }

    let mut score = base;
    if c.mean_intensity > 0.6 {
        score += 0.05;
    }
    if c.dwell_time > 2.0 {
        score += 0.05;
    }
    if (0.01..=0.4).contains(&c.relative_size) {
        score += 0.05;
    }
    score.clamp(0.0, 1.0)
}

fn newest_hour(samples: &[MotionSample]) -> u8 {
    samples.last().map(|s| s.timestamp.hour() as u8).unwrap_or(12)
}

fn default_time_pattern() -> [f32; 24] {
    let mut table = [1.0; 24];
    for (hour, slot) in table.iter_mut().enumerate() {
        *slot = match TimeOfDay::from_hour(hour as u8) {
            TimeOfDay::DeepNight => 0.6,
            TimeOfDay::Dawn => 1.2,
            TimeOfDay::Morning => 1.0,
            TimeOfDay::Midday => 0.8,
            TimeOfDay::Afternoon => 0.9,
            TimeOfDay::Dusk => 1.3,
            TimeOfDay::Evening => 0.9,
        };
    }
    table
}
