// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Simulated field inputs for demo/testing

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use rand::prelude::*;

use crate::analysis::MotionSample;
use crate::core::{EnvironmentalConditions, Frame};
use crate::detection::{BaseDetection, DetectionMethod, EvidenceChannel, MotionDetector};
use crate::error::DetectorError;

/// One request seen by a [`ScriptedDetector`]
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorCall {
    pub method: DetectionMethod,
    pub frame_present: bool,
}

/// Replays a fixed script of detector outcomes.
///
/// Once the script runs out every call reports no motion.
pub struct ScriptedDetector {
    script: VecDeque<Result<BaseDetection, DetectorError>>,
    calls: Arc<Mutex<Vec<DetectorCall>>>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn then_detect(mut self, detection: BaseDetection) -> Self {
        self.script.push_back(Ok(detection));
        self
    }

    pub fn then_fail(mut self, error: DetectorError) -> Self {
        self.script.push_back(Err(error));
        self
    }

    /// Shared log of every call, readable after the detector is boxed
    pub fn calls(&self) -> Arc<Mutex<Vec<DetectorCall>>> {
        Arc::clone(&self.calls)
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionDetector for ScriptedDetector {
    fn detect_base(
        &mut self,
        frame: Option<&Frame>,
        method: DetectionMethod,
    ) -> Result<BaseDetection, DetectorError> {
        self.calls.lock().push(DetectorCall {
            method,
            frame_present: frame.is_some(),
        });
        self.script.pop_front().unwrap_or_else(|| Ok(BaseDetection::default()))
    }
}

/// Animal crossing the field of view
#[derive(Debug, Clone)]
struct Visitor {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    size: f32,
    remaining: u32,
}

/// Randomized base detector for the demo binary.
///
/// Animals wander through the frame now and then; wind adds spurious frame
/// motion and the PIR has a small false-trigger rate.
pub struct SimulatedDetector {
    rng: StdRng,
    frame_width: f32,
    frame_height: f32,
    visitor: Option<Visitor>,

    /// Chance per cycle that an animal arrives
    pub arrival_probability: f64,
    /// Chance per cycle of a PIR false trigger
    pub false_trigger_probability: f64,
    /// Chance per call that the detector faults
    pub fault_probability: f64,
}

impl SimulatedDetector {
    pub fn new(seed: Option<u64>, frame_width: u32, frame_height: u32) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            rng,
            frame_width: frame_width as f32,
            frame_height: frame_height as f32,
            visitor: None,
            arrival_probability: 0.08,
            false_trigger_probability: 0.02,
            fault_probability: 0.0,
        }
    }

    fn step_visitor(&mut self) -> Option<Visitor> {
        if self.visitor.is_none() && self.rng.gen_bool(self.arrival_probability) {
            let size = self.rng.gen_range(15.0..90.0);
            let from_left = self.rng.gen_bool(0.5);
            self.visitor = Some(Visitor {
                x: if from_left { 0.0 } else { self.frame_width },
                y: self.rng.gen_range(0.3..0.8) * self.frame_height,
                vx: self.rng.gen_range(4.0..25.0) * if from_left { 1.0 } else { -1.0 },
                vy: self.rng.gen_range(-3.0..3.0),
                size,
                remaining: self.rng.gen_range(5..25),
            });
        }

        let (width, height) = (self.frame_width, self.frame_height);
        let visitor = self.visitor.as_mut()?;
        visitor.x = (visitor.x + visitor.vx).clamp(0.0, width);
        visitor.y = (visitor.y + visitor.vy).clamp(0.0, height);
        visitor.remaining = visitor.remaining.saturating_sub(1);

        let current = visitor.clone();
        if current.remaining == 0 {
            self.visitor = None;
        }
        Some(current)
    }
}

impl MotionDetector for SimulatedDetector {
    fn detect_base(
        &mut self,
        frame: Option<&Frame>,
        method: DetectionMethod,
    ) -> Result<BaseDetection, DetectorError> {
        if self.fault_probability > 0.0 && self.rng.gen_bool(self.fault_probability) {
            return Err(DetectorError::Fault("simulated frame pipeline stall".to_string()));
        }

        let visitor = self.step_visitor();
        let mut detection = BaseDetection {
            sensor_triggered: visitor.is_some() || self.rng.gen_bool(self.false_trigger_probability),
            ..Default::default()
        };

        if let Some(frame) = frame.filter(|_| method.uses(EvidenceChannel::Frame) || method.uses(EvidenceChannel::Ai)) {
            let wind_noise = self.rng.gen_bool(0.05);
            if let Some(v) = &visitor {
                detection.frame_motion_detected = true;
                detection.confidence = self.rng.gen_range(0.6..0.95);
                detection.sample = Some(
                    MotionSample::new(frame.captured_at, v.x, v.y, v.size, v.size * 0.7)
                        .with_intensity(self.rng.gen_range(0.4..0.9))
                        .with_confidence(detection.confidence),
                );
            } else if wind_noise {
                detection.frame_motion_detected = true;
                detection.confidence = self.rng.gen_range(0.2..0.5);
            }

            if method.uses(EvidenceChannel::Ai) {
                detection.ai_confidence = Some(if visitor.is_some() {
                    self.rng.gen_range(0.55..0.98)
                } else {
                    self.rng.gen_range(0.0..0.3)
                });
            }
        }

        detection.motion_detected = detection.sensor_triggered || detection.frame_motion_detected;
        Ok(detection)
    }
}

/// Slowly varying field conditions for the demo binary
pub struct EnvironmentSimulator {
    rng: StdRng,
    battery_voltage: f32,
    weather_cycles: u32,
}

impl EnvironmentSimulator {
    pub fn new(seed: Option<u64>, battery_voltage: f32) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };

        Self {
            rng,
            battery_voltage,
            weather_cycles: 0,
        }
    }

    pub fn sample(&mut self, now: DateTime<Utc>) -> EnvironmentalConditions {
        let hour = now.hour() as u8;
        let phase = (hour as f32 - 6.0) / 24.0 * std::f32::consts::TAU;

        // Slow discharge with occasional solar top-up during the day
        self.battery_voltage -= self.rng.gen_range(0.0..0.002);
        if (8..17).contains(&hour) && self.rng.gen_bool(0.1) {
            self.battery_voltage += 0.01;
        }
        self.battery_voltage = self.battery_voltage.clamp(2.9, 4.2);

        if self.weather_cycles == 0 && self.rng.gen_bool(0.01) {
            self.weather_cycles = self.rng.gen_range(10..60);
        }
        let active_weather = self.weather_cycles > 0;
        self.weather_cycles = self.weather_cycles.saturating_sub(1);

        let mut conditions = EnvironmentalConditions::new(
            self.battery_voltage,
            12.0 + 8.0 * phase.sin() + self.rng.gen_range(-0.5..0.5),
            (phase.sin() * 1.2).clamp(0.0, 1.0),
            hour,
        );
        conditions.active_weather = active_weather;
        conditions.wind_speed = if active_weather {
            self.rng.gen_range(6.0..15.0)
        } else {
            self.rng.gen_range(0.0..4.0)
        };
        conditions.humidity = if active_weather { 95.0 } else { 60.0 };
        conditions
    }
}
