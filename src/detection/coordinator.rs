// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Fusion coordinator - one decision per sensing cycle
//!
//! Pipeline order per cycle:
//! 1. store conditions, leave fallback mode once the recovery delay elapsed
//! 2. adaptive processing decision
//! 3. method resolution
//! 4. base detector (frame withheld on skipped cycles)
//! 5. pattern analysis, admitted only while an analysis pool block can be
//!    leased for the sample window
//! 6. fusion and decision thresholds
//! 7. feedback into the controller and analyzer
//! 8. publish detected motion

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    BaseDetection, CoordinatorConfig, CoordinatorResult, CoordinatorStatistics, DetectionMethod,
    FusionEngine, MotionDetector,
};
use crate::adaptive::{ActivityLevel, AdaptiveController, ProcessingDecision, ProcessingLevel};
use crate::analysis::{AnalysisResult, MotionSample, PatternAnalyzer};
use crate::config::{period_secs, Config, SharedConfig};
use crate::core::{EnvironmentalConditions, EventBus, Frame};
use crate::error::{ConfigError, DetectorError};
use crate::memory::{MemoryManager, PoolType};

/// Battery voltage below which only the presence sensor is used
const CRITICAL_BATTERY_VOLTAGE: f32 = 3.2;

/// Bytes of analysis working memory reserved per buffered sample
const ANALYSIS_BYTES_PER_SAMPLE: usize = std::mem::size_of::<MotionSample>();

/// Coordinator state for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub method: DetectionMethod,
    pub degraded: bool,
    pub degraded_until: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub activity: ActivityLevel,
    pub processing_level: ProcessingLevel,
    pub memory_utilization: f32,
    pub conditions: Option<EnvironmentalConditions>,
    pub statistics: CoordinatorStatistics,
}

/// Combines every evidence source into one decision per cycle.
///
/// Owns the adaptive controller and pattern analyzer; shares the allocator
/// with maintenance tasks.
pub struct DetectionCoordinator {
    config: SharedConfig<CoordinatorConfig>,
    adaptive: AdaptiveController,
    analyzer: PatternAnalyzer,
    memory: Arc<MemoryManager>,
    detector: Box<dyn MotionDetector>,
    events: EventBus,

    conditions: Option<EnvironmentalConditions>,
    consecutive_failures: u32,
    degraded_until: Option<DateTime<Utc>>,
    stats: CoordinatorStatistics,
}

impl DetectionCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        adaptive: AdaptiveController,
        analyzer: PatternAnalyzer,
        memory: Arc<MemoryManager>,
        detector: Box<dyn MotionDetector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        info!("Detection coordinator ready (method {})", config.method);

        Ok(Self {
            config: SharedConfig::new(config),
            adaptive,
            analyzer,
            memory,
            detector,
            events: EventBus::default(),
            conditions: None,
            consecutive_failures: 0,
            degraded_until: None,
            stats: CoordinatorStatistics::default(),
        })
    }

    /// Build every component from an application configuration
    pub fn from_config(config: &Config, detector: Box<dyn MotionDetector>) -> Result<Self, ConfigError> {
        config.validate()?;
        let memory = Arc::new(MemoryManager::new(config.memory.clone())?);

        Self::new(
            config.coordinator.clone(),
            AdaptiveController::new(config.adaptive.clone()),
            PatternAnalyzer::new(config.analyzer.clone()),
            memory,
            detector,
        )
    }

    pub fn detect(&mut self, frame: Option<&Frame>, conditions: &EnvironmentalConditions) -> CoordinatorResult {
        self.detect_at(Utc::now(), frame, conditions)
    }

    /// Run one sensing cycle
    pub fn detect_at(
        &mut self,
        now: DateTime<Utc>,
        frame: Option<&Frame>,
        conditions: &EnvironmentalConditions,
    ) -> CoordinatorResult {
        let started = Instant::now();
        let config = self.config.snapshot();

        self.conditions = Some(conditions.clone());
        self.stats.total_cycles += 1;

        if let Some(until) = self.degraded_until {
            if now >= until {
                info!("Recovery delay elapsed, resuming {} detection", config.method);
                self.degraded_until = None;
                self.consecutive_failures = 0;
            }
        }

        let processing = self.adaptive.get_decision_at(
            now,
            conditions.battery_voltage,
            conditions.temperature,
            conditions.light_level,
        );
        if processing.skip_frame {
            self.stats.skipped_frames += 1;
        }

        let method = self.resolve_method(&config, &processing, conditions);
        *self.stats.method_usage.entry(method).or_insert(0) += 1;

        let frame = if processing.skip_frame { None } else { frame };
        let base = match self.detector.detect_base(frame, method) {
            Ok(base) => {
                self.consecutive_failures = 0;
                base
            }
            Err(e) => return self.handle_failure(now, &config, method, processing, e, started),
        };

        if let Some(sample) = base.sample.clone() {
            self.analyzer.add_sample(sample);
        }
        let analysis = if method.runs_pattern_analysis() && base.motion_detected {
            self.run_analysis(now, conditions.hour_of_day)
        } else {
            None
        };

        let fusion = FusionEngine::new(&config).fuse(method, &base, analysis.as_ref(), conditions);
        let confidence = fusion.confidence;
        let detected = fusion.has_evidence() && confidence >= config.detection_threshold;

        let analysis_agrees = analysis
            .as_ref()
            .map_or(true, |a| !a.is_wildlife || a.should_capture);
        let should_capture = detected && confidence >= config.capture_threshold && analysis_agrees;
        let should_save = should_capture && confidence >= config.capture_threshold;
        let should_transmit = should_save && confidence >= config.transmit_threshold;
        // An analyzer alert stands even below the detection threshold
        let should_alert = fusion.has_evidence()
            && (confidence >= config.alert_threshold
                || analysis.as_ref().map_or(false, |a| a.should_alert));

        let processing_time_ms = started.elapsed().as_secs_f32() * 1000.0;
        self.feedback(now, detected, confidence, &base, analysis.as_ref(), conditions, processing_time_ms);

        let description = describe(detected, method, confidence, analysis.as_ref());
        let result = CoordinatorResult {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            detected,
            fusion_confidence: confidence,
            method_used: method,
            analysis,
            processing,
            should_capture,
            should_save,
            should_transmit,
            should_alert,
            degraded: self.is_degraded(),
            processing_time_ms,
            description,
        };

        if should_alert {
            self.stats.alerts += 1;
        }
        if detected {
            self.stats.detections += 1;
            self.stats.last_detection = Some(now);
            if should_capture {
                self.stats.captures += 1;
            }

            debug!(
                "Motion: {} (raw {:.2} x{:.2})",
                result.description, fusion.raw_confidence, fusion.environmental_multiplier
            );
        }
        if detected || should_alert {
            self.events.publish_motion(&result);
        }

        result
    }

    fn resolve_method(
        &self,
        config: &CoordinatorConfig,
        processing: &ProcessingDecision,
        conditions: &EnvironmentalConditions,
    ) -> DetectionMethod {
        if self.is_degraded() {
            return DetectionMethod::PirOnly;
        }
        match config.method {
            DetectionMethod::Adaptive => {
                Self::adaptive_method(processing.level, conditions, config.weather_compensation)
            }
            fixed => fixed,
        }
    }

    /// Concrete method for a processing tier under the current conditions
    pub fn adaptive_method(
        level: ProcessingLevel,
        conditions: &EnvironmentalConditions,
        weather_compensation: bool,
    ) -> DetectionMethod {
        if conditions.battery_voltage < CRITICAL_BATTERY_VOLTAGE {
            return DetectionMethod::PirOnly;
        }

        let method = DetectionMethod::from_level(level);
        if method == DetectionMethod::PirOnly {
            return method;
        }
        if conditions.active_weather && weather_compensation {
            return DetectionMethod::HybridAi;
        }
        if conditions.is_night && conditions.is_dark() {
            return DetectionMethod::HybridBasic;
        }
        method
    }

    /// The lease is an admission gate: no analysis while the analysis pool is
    /// exhausted or the window outgrows one block.
    fn run_analysis(&mut self, now: DateTime<Utc>, hour: u8) -> Option<AnalysisResult> {
        let bytes = self.analyzer.sample_count().max(1) * ANALYSIS_BYTES_PER_SAMPLE;

        let lease = match self.memory.lease_at(PoolType::Analysis, bytes, now) {
            Ok(lease) => lease,
            Err(e) => {
                warn!("Skipping pattern analysis this cycle: {}", e);
                self.stats.analysis_skipped += 1;
                return None;
            }
        };

        let analysis = self.analyzer.analyze_with_hour(hour);
        lease.release();

        analysis.is_valid.then_some(analysis)
    }

    #[allow(clippy::too_many_arguments)]
    fn feedback(
        &mut self,
        now: DateTime<Utc>,
        detected: bool,
        confidence: f32,
        base: &BaseDetection,
        analysis: Option<&AnalysisResult>,
        conditions: &EnvironmentalConditions,
        processing_time_ms: f32,
    ) {
        if detected {
            let centroid = base.sample.as_ref().map(|s| (s.x, s.y));
            self.adaptive
                .record_detection(now, confidence, centroid, Some(processing_time_ms));
        } else {
            self.adaptive.record_processing_time(processing_time_ms);
        }

        if let Some(a) = analysis.filter(|a| detected && a.is_wildlife) {
            self.analyzer
                .update_time_pattern(conditions.hour_of_day, 1.0 + 0.5 * a.wildlife_score);
        }
    }

    fn handle_failure(
        &mut self,
        now: DateTime<Utc>,
        config: &CoordinatorConfig,
        method: DetectionMethod,
        processing: ProcessingDecision,
        err: DetectorError,
        started: Instant,
    ) -> CoordinatorResult {
        self.consecutive_failures += 1;
        self.stats.failures += 1;
        warn!(
            "Base detector failed ({} in a row): {}",
            self.consecutive_failures, err
        );

        if self.consecutive_failures >= config.max_consecutive_failures {
            let until = now
                .checked_add_signed(period_secs(config.recovery_delay_secs))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if !self.is_degraded() {
                self.stats.fallbacks += 1;
                error!(
                    "{} consecutive detector failures, falling back to PIR only until {}",
                    self.consecutive_failures, until
                );
            }
            self.degraded_until = Some(until);
        }

        let processing_time_ms = started.elapsed().as_secs_f32() * 1000.0;
        self.adaptive.record_processing_time(processing_time_ms);

        CoordinatorResult {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            detected: false,
            fusion_confidence: 0.0,
            method_used: method,
            analysis: None,
            processing,
            should_capture: false,
            should_save: false,
            should_transmit: false,
            should_alert: false,
            degraded: self.is_degraded(),
            processing_time_ms,
            description: format!("{} detection failed: {}", method, err),
        }
    }

    /// Validate and apply; the previous configuration stays on error
    pub fn configure(&mut self, config: CoordinatorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        info!("Coordinator configuration updated (method {})", config.method);
        self.config.replace(config);
        Ok(())
    }

    pub fn set_method(&mut self, method: DetectionMethod) {
        info!("Detection method set to {}", method);
        self.config.update(|c| c.method = method);
    }

    /// Latest conditions for status reporting; each cycle supplies its own
    pub fn update_environment(&mut self, conditions: EnvironmentalConditions) {
        self.conditions = Some(conditions);
    }

    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&CoordinatorResult) + Send + Sync + 'static,
    {
        self.events.register_callback(callback);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorResult> {
        self.events.subscribe_motion()
    }

    /// Handle for pushing configuration from another task
    pub fn config_handle(&self) -> SharedConfig<CoordinatorConfig> {
        self.config.clone()
    }

    pub fn config(&self) -> Arc<CoordinatorConfig> {
        self.config.snapshot()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_until.is_some()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn statistics(&self) -> CoordinatorStatistics {
        self.stats.clone()
    }

    pub fn adaptive(&self) -> &AdaptiveController {
        &self.adaptive
    }

    pub fn adaptive_mut(&mut self) -> &mut AdaptiveController {
        &mut self.adaptive
    }

    pub fn analyzer(&self) -> &PatternAnalyzer {
        &self.analyzer
    }

    pub fn analyzer_mut(&mut self) -> &mut PatternAnalyzer {
        &mut self.analyzer
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn get_config_json(&self) -> String {
        serde_json::to_string_pretty(&*self.config.snapshot()).unwrap_or_default()
    }

    /// Rejected documents leave the current configuration untouched
    pub fn load_config_json(&mut self, json: &str) -> Result<(), ConfigError> {
        let config: CoordinatorConfig = serde_json::from_str(json)?;
        self.configure(config)
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            method: self.config.snapshot().method,
            degraded: self.is_degraded(),
            degraded_until: self.degraded_until,
            consecutive_failures: self.consecutive_failures,
            activity: self.adaptive.activity_level(),
            processing_level: self.adaptive.current_level(),
            memory_utilization: self.memory.utilization(),
            conditions: self.conditions.clone(),
            statistics: self.stats.clone(),
        }
    }

    pub fn status_json(&self) -> String {
        serde_json::to_string_pretty(&self.status()).unwrap_or_default()
    }
}

fn describe(
    detected: bool,
    method: DetectionMethod,
    confidence: f32,
    analysis: Option<&AnalysisResult>,
) -> String {
    if !detected {
        return format!("No motion ({}, confidence {:.2})", method, confidence);
    }
    match analysis {
        Some(a) => format!("{} via {} (confidence {:.2})", a.pattern.name(), method, confidence),
        None => format!("Motion via {} (confidence {:.2})", method, confidence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{Duration, TimeZone};

    use crate::adaptive::AdaptiveConfig;
    use crate::analysis::AnalyzerConfig;
    use crate::memory::{MemoryConfig, PoolConfig};
    use crate::simulation::ScriptedDetector;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn daytime() -> EnvironmentalConditions {
        EnvironmentalConditions::new(3.9, 20.0, 0.8, 9)
    }

    fn strong_motion() -> BaseDetection {
        BaseDetection {
            motion_detected: true,
            sensor_triggered: true,
            frame_motion_detected: true,
            confidence: 0.95,
            ai_confidence: Some(0.9),
            sample: None,
        }
    }

    fn coordinator_with(config: CoordinatorConfig, detector: ScriptedDetector) -> DetectionCoordinator {
        DetectionCoordinator::new(
            config,
            AdaptiveController::default(),
            PatternAnalyzer::default(),
            Arc::new(MemoryManager::default()),
            Box::new(detector),
        )
        .unwrap()
    }

    fn frame() -> Frame {
        Frame {
            sequence: 1,
            width: 320,
            height: 240,
            captured_at: noon(),
            data: vec![0; 16],
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = CoordinatorConfig { detection_threshold: -0.1, ..Default::default() };
        let result = DetectionCoordinator::new(
            config,
            AdaptiveController::default(),
            PatternAnalyzer::default(),
            Arc::new(MemoryManager::default()),
            Box::new(ScriptedDetector::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_strong_motion_detected_and_captured() {
        let detector = ScriptedDetector::new().then_detect(strong_motion());
        let mut coordinator = coordinator_with(CoordinatorConfig::default(), detector);

        let result = coordinator.detect_at(noon(), Some(&frame()), &daytime());
        assert!(result.detected);
        assert!(result.fusion_confidence > 0.9);
        assert!(result.should_capture && result.should_save && result.should_transmit);
        assert!(result.should_alert);
        assert!(!result.degraded);

        let stats = coordinator.statistics();
        assert_eq!(stats.detections, 1);
        assert_eq!(stats.captures, 1);
        assert_eq!(stats.last_detection, Some(noon()));
    }

    #[test]
    fn test_no_motion() {
        let mut coordinator = coordinator_with(CoordinatorConfig::default(), ScriptedDetector::new());
        let result = coordinator.detect_at(noon(), Some(&frame()), &daytime());
        assert!(!result.detected);
        assert!(!result.should_capture && !result.should_alert);
        assert_eq!(coordinator.statistics().detections, 0);
    }

    #[test]
    fn test_weak_motion_below_threshold() {
        let base = BaseDetection {
            motion_detected: true,
            frame_motion_detected: true,
            confidence: 0.3,
            ..Default::default()
        };
        let config = CoordinatorConfig { method: DetectionMethod::FrameOnly, ..Default::default() };
        let mut coordinator = coordinator_with(config, ScriptedDetector::new().then_detect(base));

        let result = coordinator.detect_at(noon(), Some(&frame()), &daytime());
        assert!(!result.detected);
        assert!((result.fusion_confidence - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_action_thresholds_nest() {
        // Frame-only keeps the fused value equal to the detector confidence
        let config = CoordinatorConfig { method: DetectionMethod::FrameOnly, ..Default::default() };
        for &c in &[0.55f32, 0.75, 0.82, 0.9] {
            let base = BaseDetection {
                motion_detected: true,
                frame_motion_detected: true,
                confidence: c,
                ..Default::default()
            };
            let mut coordinator = coordinator_with(config.clone(), ScriptedDetector::new().then_detect(base));
            let r = coordinator.detect_at(noon(), Some(&frame()), &daytime());

            assert!(r.detected);
            assert_eq!(r.should_capture, c >= 0.7);
            assert_eq!(r.should_transmit, c >= 0.8);
            assert_eq!(r.should_alert, c >= 0.85);
            assert!(!r.should_save || r.should_capture);
            assert!(!r.should_transmit || r.should_save);
        }
    }

    #[test]
    fn test_low_battery_dormant_scenario() {
        let mut coordinator = coordinator_with(CoordinatorConfig::default(), ScriptedDetector::new());
        let calls = coordinator_calls(&mut coordinator);
        let conditions = EnvironmentalConditions::new(3.1, 20.0, 0.8, 12);

        let start = noon();
        let mut skipped = 0;
        for s in 0..60 {
            let r = coordinator.detect_at(start + Duration::seconds(s), Some(&frame()), &conditions);
            assert!(r.processing.level <= ProcessingLevel::Reduced);
            assert_eq!(r.method_used, DetectionMethod::PirOnly);
            if r.processing.skip_frame {
                skipped += 1;
            }
        }

        assert!(skipped > 50);
        assert_eq!(coordinator.statistics().skipped_frames, skipped);
        // Skipped cycles still consult the presence sensor, without a frame
        let calls = calls.lock();
        assert_eq!(calls.len(), 60);
        assert_eq!(calls.iter().filter(|c| c.frame_present).count(), 60 - skipped as usize);
    }

    fn coordinator_calls(
        coordinator: &mut DetectionCoordinator,
    ) -> Arc<parking_lot::Mutex<Vec<crate::simulation::DetectorCall>>> {
        let detector = ScriptedDetector::new();
        let calls = detector.calls();
        coordinator.detector = Box::new(detector);
        calls
    }

    #[test]
    fn test_repeated_failures_fall_back_to_pir() {
        let mut detector = ScriptedDetector::new();
        for _ in 0..5 {
            detector = detector.then_fail(DetectorError::Fault("bus timeout".into()));
        }
        let calls = detector.calls();
        let config = CoordinatorConfig { method: DetectionMethod::FullFusion, ..Default::default() };
        let mut coordinator = coordinator_with(config, detector);

        let start = noon();
        for i in 0..5 {
            let r = coordinator.detect_at(start + Duration::seconds(i), Some(&frame()), &daytime());
            assert!(!r.detected);
            assert!(r.description.contains("bus timeout"));
            assert_eq!(r.method_used, DetectionMethod::FullFusion);
        }
        assert!(coordinator.is_degraded());
        assert_eq!(coordinator.consecutive_failures(), 5);
        assert_eq!(coordinator.statistics().fallbacks, 1);

        // Inside the recovery delay only the presence sensor is used
        for i in 5..60 {
            let r = coordinator.detect_at(start + Duration::seconds(i), Some(&frame()), &daytime());
            assert_eq!(r.method_used, DetectionMethod::PirOnly);
            assert!(r.degraded);
        }
        // Successful PIR cycles do not end the fallback early
        assert!(coordinator.is_degraded());
        assert_eq!(coordinator.consecutive_failures(), 0);

        // Fifth failure at +4 s, so the delay runs out at +64 s
        let r = coordinator.detect_at(start + Duration::seconds(64), Some(&frame()), &daytime());
        assert_eq!(r.method_used, DetectionMethod::FullFusion);
        assert!(!r.degraded);
        assert!(!coordinator.is_degraded());

        let calls = calls.lock();
        assert!(calls[5..60].iter().all(|c| c.method == DetectionMethod::PirOnly));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let detector = ScriptedDetector::new()
            .then_fail(DetectorError::SensorUnavailable("pir".into()))
            .then_fail(DetectorError::SensorUnavailable("pir".into()))
            .then_detect(strong_motion())
            .then_fail(DetectorError::SensorUnavailable("pir".into()));
        let mut coordinator = coordinator_with(CoordinatorConfig::default(), detector);

        for i in 0..4 {
            coordinator.detect_at(noon() + Duration::seconds(i), Some(&frame()), &daytime());
        }
        assert_eq!(coordinator.consecutive_failures(), 1);
        assert_eq!(coordinator.statistics().failures, 3);
        assert!(!coordinator.is_degraded());
    }

    #[test]
    fn test_adaptive_method_resolution() {
        let day = daytime();
        assert_eq!(
            DetectionCoordinator::adaptive_method(ProcessingLevel::Maximum, &day, true),
            DetectionMethod::FullFusion
        );
        assert_eq!(
            DetectionCoordinator::adaptive_method(ProcessingLevel::Normal, &day, true),
            DetectionMethod::HybridAi
        );

        let low = EnvironmentalConditions::new(3.15, 20.0, 0.8, 9);
        assert_eq!(
            DetectionCoordinator::adaptive_method(ProcessingLevel::Maximum, &low, true),
            DetectionMethod::PirOnly
        );

        let mut stormy = daytime();
        stormy.active_weather = true;
        assert_eq!(
            DetectionCoordinator::adaptive_method(ProcessingLevel::Maximum, &stormy, true),
            DetectionMethod::HybridAi
        );
        assert_eq!(
            DetectionCoordinator::adaptive_method(ProcessingLevel::Maximum, &stormy, false),
            DetectionMethod::FullFusion
        );
        assert_eq!(
            DetectionCoordinator::adaptive_method(ProcessingLevel::Minimal, &stormy, true),
            DetectionMethod::PirOnly
        );

        let dark_night = EnvironmentalConditions::new(3.9, 10.0, 0.02, 23);
        assert_eq!(
            DetectionCoordinator::adaptive_method(ProcessingLevel::Enhanced, &dark_night, true),
            DetectionMethod::HybridBasic
        );
    }

    #[test]
    fn test_pattern_analysis_feeds_fusion() {
        let start = noon();
        let mut detector = ScriptedDetector::new();
        // Steady medium-sized walk across the frame
        for i in 0..6 {
            let sample = MotionSample::new(start + Duration::milliseconds(500 * i), 60.0 + 10.0 * i as f32, 120.0, 40.0, 30.0)
                .with_intensity(0.6);
            detector = detector.then_detect(BaseDetection {
                sample: Some(sample),
                ..strong_motion()
            });
        }
        let config = CoordinatorConfig { method: DetectionMethod::FullFusion, ..Default::default() };
        let mut coordinator = coordinator_with(config, detector);

        let mut last = None;
        for i in 0..6 {
            last = Some(coordinator.detect_at(start + Duration::milliseconds(500 * i), Some(&frame()), &daytime()));
        }
        let result = last.unwrap();
        let analysis = result.analysis.expect("window is large enough for analysis");
        assert!(analysis.is_valid);
        assert_eq!(coordinator.analyzer().sample_count(), 6);

        // Analysis buffer was returned to its pool
        assert_eq!(coordinator.memory().pool_stats(PoolType::Analysis).used_blocks, 0);
    }

    #[test]
    fn test_analysis_skipped_when_pool_exhausted() {
        let memory = MemoryConfig {
            analysis: PoolConfig { block_size: 8, ..MemoryConfig::default().analysis },
            ..Default::default()
        };
        let start = noon();
        let mut detector = ScriptedDetector::new();
        for i in 0..4 {
            let sample = MotionSample::new(start + Duration::seconds(i), 100.0 + 20.0 * i as f32, 100.0, 30.0, 30.0);
            detector = detector.then_detect(BaseDetection { sample: Some(sample), ..strong_motion() });
        }

        let mut coordinator = DetectionCoordinator::new(
            CoordinatorConfig { method: DetectionMethod::FullFusion, ..Default::default() },
            AdaptiveController::new(AdaptiveConfig::default()),
            PatternAnalyzer::new(AnalyzerConfig::default()),
            Arc::new(MemoryManager::new(memory).unwrap()),
            Box::new(detector),
        )
        .unwrap();

        for i in 0..4 {
            let r = coordinator.detect_at(start + Duration::seconds(i), Some(&frame()), &daytime());
            assert!(r.analysis.is_none());
            assert!(r.detected);
        }
        assert_eq!(coordinator.statistics().analysis_skipped, 4);
    }

    fn coordinator_with_analyzer(
        config: CoordinatorConfig,
        analyzer: AnalyzerConfig,
        detector: ScriptedDetector,
    ) -> DetectionCoordinator {
        DetectionCoordinator::new(
            config,
            AdaptiveController::default(),
            PatternAnalyzer::new(analyzer),
            Arc::new(MemoryManager::default()),
            Box::new(detector),
        )
        .unwrap()
    }

    /// Medium mammal walking 8 px/s across the frame, one sample per second
    fn walking_track(start: DateTime<Utc>, n: i64) -> ScriptedDetector {
        (0..n).fold(ScriptedDetector::new(), |detector, i| {
            let sample = MotionSample::new(start + Duration::seconds(i), 40.0 + 8.0 * i as f32, 150.0, 88.0, 88.0)
                .with_intensity(0.7);
            detector.then_detect(BaseDetection { sample: Some(sample), ..strong_motion() })
        })
    }

    fn deep_night() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 2, 0, 0).unwrap()
    }

    /// Third cycle is the first with enough samples for a full analysis
    fn third_cycle(coordinator: &mut DetectionCoordinator, start: DateTime<Utc>) -> CoordinatorResult {
        let lit_night = EnvironmentalConditions::new(3.9, 20.0, 0.8, 2);
        for i in 0..2 {
            let r = coordinator.detect_at(start + Duration::seconds(i), Some(&frame()), &lit_night);
            assert!(r.analysis.is_none());
        }
        coordinator.detect_at(start + Duration::seconds(2), Some(&frame()), &lit_night)
    }

    #[test]
    fn test_wildlife_capture_needs_analyzer_interest() {
        let start = deep_night();
        let config = CoordinatorConfig { method: DetectionMethod::FullFusion, ..Default::default() };
        let mut coordinator = coordinator_with(config, walking_track(start, 3));

        let r = third_cycle(&mut coordinator, start);
        let analysis = r.analysis.clone().unwrap();
        assert!(analysis.is_wildlife);
        // Low expected activity at night keeps interest under the capture bar
        assert!(!analysis.should_capture);
        assert!(!analysis.should_alert);

        assert!(r.detected);
        assert!(r.fusion_confidence >= 0.7 && r.fusion_confidence < 0.85);
        assert!(!r.should_capture && !r.should_save && !r.should_transmit);
        assert!(!r.should_alert);
    }

    #[test]
    fn test_analyzer_alert_below_alert_threshold() {
        let start = deep_night();
        let analyzer = AnalyzerConfig { alert_confidence: 0.5, ..Default::default() };
        let config = CoordinatorConfig { method: DetectionMethod::FullFusion, ..Default::default() };
        let mut coordinator = coordinator_with_analyzer(config, analyzer, walking_track(start, 3));

        let r = third_cycle(&mut coordinator, start);
        assert!(r.analysis.as_ref().unwrap().should_alert);
        assert!(r.detected);
        assert!(r.fusion_confidence < 0.85);
        assert!(r.should_alert);
    }

    #[test]
    fn test_analyzer_alert_without_detection() {
        let start = deep_night();
        let analyzer = AnalyzerConfig { alert_confidence: 0.5, ..Default::default() };
        let config = CoordinatorConfig {
            method: DetectionMethod::FullFusion,
            detection_threshold: 0.95,
            alert_threshold: 0.9,
            ..Default::default()
        };
        let mut coordinator = coordinator_with_analyzer(config, analyzer, walking_track(start, 3));
        let mut rx = coordinator.subscribe();

        let r = third_cycle(&mut coordinator, start);
        assert!(r.analysis.as_ref().unwrap().should_alert);
        assert!(!r.detected);
        assert!(!r.should_capture);
        assert!(r.should_alert);

        let stats = coordinator.statistics();
        assert_eq!(stats.detections, 0);
        assert_eq!(stats.alerts, 1);
        assert!(rx.try_recv().unwrap().should_alert);
    }

    #[test]
    fn test_recovery_delay_bounded() {
        for delay in [u64::MAX, 10_000_000_000_000_000, crate::config::MAX_PERIOD_SECS + 1] {
            let config = CoordinatorConfig { recovery_delay_secs: delay, ..Default::default() };
            assert!(config.validate().is_err());
        }
        let mut coordinator = coordinator_with(CoordinatorConfig::default(), ScriptedDetector::new());
        assert!(coordinator
            .load_config_json(&format!("{{\"recovery_delay_secs\": {}}}", u64::MAX))
            .is_err());
        assert_eq!(coordinator.config().recovery_delay_secs, 60);
    }

    #[test]
    fn test_unvalidated_recovery_delay_keeps_fallback() {
        let mut detector = ScriptedDetector::new();
        for _ in 0..5 {
            detector = detector.then_fail(DetectorError::Fault("stall".into()));
        }
        let config = CoordinatorConfig { method: DetectionMethod::FullFusion, ..Default::default() };
        let mut coordinator = coordinator_with(config, detector);

        // Pushed through the shared handle, which does not validate
        coordinator.config_handle().update(|c| c.recovery_delay_secs = u64::MAX);

        let start = noon();
        for i in 0..5 {
            coordinator.detect_at(start + Duration::seconds(i), Some(&frame()), &daytime());
        }
        assert!(coordinator.is_degraded());

        let r = coordinator.detect_at(start + Duration::seconds(5), Some(&frame()), &daytime());
        assert_eq!(r.method_used, DetectionMethod::PirOnly);
        let r = coordinator.detect_at(start + Duration::days(30), Some(&frame()), &daytime());
        assert_eq!(r.method_used, DetectionMethod::PirOnly);
        assert!(coordinator.status().degraded_until.unwrap() > start + Duration::days(364));
    }

    #[test]
    fn test_callbacks_and_subscribers() {
        let detector = ScriptedDetector::new()
            .then_detect(strong_motion())
            .then_detect(BaseDetection::default())
            .then_detect(strong_motion());
        let mut coordinator = coordinator_with(CoordinatorConfig::default(), detector);

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        coordinator.register_callback(move |r| {
            assert!(r.detected);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut rx = coordinator.subscribe();

        for i in 0..3 {
            coordinator.detect_at(noon() + Duration::seconds(i), Some(&frame()), &daytime());
        }

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(rx.try_recv().unwrap().detected);
        assert!(rx.try_recv().unwrap().detected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let mut coordinator = coordinator_with(CoordinatorConfig::default(), ScriptedDetector::new());
        let mut config = CoordinatorConfig::default();
        config.method = DetectionMethod::HybridBasic;
        config.alert_threshold = 0.9;
        coordinator.configure(config.clone()).unwrap();

        let json = coordinator.get_config_json();
        let mut other = coordinator_with(CoordinatorConfig::default(), ScriptedDetector::new());
        other.load_config_json(&json).unwrap();
        assert_eq!(*other.config(), config);

        assert!(other.load_config_json("{ not json").is_err());
        assert!(other.load_config_json(r#"{"capture_threshold": 2.0}"#).is_err());
        assert_eq!(*other.config(), config);
    }

    #[test]
    fn test_config_handle_applies_next_cycle() {
        let detector = ScriptedDetector::new().then_detect(strong_motion()).then_detect(strong_motion());
        let mut coordinator = coordinator_with(CoordinatorConfig::default(), detector);
        let handle = coordinator.config_handle();

        let r = coordinator.detect_at(noon(), Some(&frame()), &daytime());
        assert_ne!(r.method_used, DetectionMethod::AiOnly);

        handle.update(|c| c.method = DetectionMethod::AiOnly);
        let r = coordinator.detect_at(noon() + Duration::seconds(1), Some(&frame()), &daytime());
        assert_eq!(r.method_used, DetectionMethod::AiOnly);
    }

    #[test]
    fn test_status_json() {
        let mut coordinator = coordinator_with(CoordinatorConfig::default(), ScriptedDetector::new());
        coordinator.update_environment(daytime());
        coordinator.set_method(DetectionMethod::HybridAi);

        let status: serde_json::Value = serde_json::from_str(&coordinator.status_json()).unwrap();
        assert_eq!(status["method"], "hybrid-ai");
        assert_eq!(status["degraded"], false);
        assert_eq!(status["conditions"]["hour_of_day"], 9);
    }
}
