// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Kinematic feature extraction over a window of motion samples

use serde::{Deserialize, Serialize};

use super::{AnalyzerConfig, MotionSample};

/// Derived kinematic summary of a sample window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementCharacteristics {
    /// Path length over elapsed time, px/s
    pub speed: f32,

    /// Bearing from first to last sample, degrees
    pub direction: f32,

    /// 1 = every step points the same way, 0 = no preferred bearing
    pub direction_stability: f32,

    /// Mean bounding-box area over frame area
    pub relative_size: f32,

    /// Peak autocorrelation of the detrended x series
    pub periodicity: f32,

    /// Share of displacement along the vertical axis
    pub verticality: f32,

    /// Seconds between first and last sample
    pub dwell_time: f32,

    /// Seconds spent actually moving
    pub active_time: f32,

    pub mean_intensity: f32,

    pub sample_count: usize,
}

/// Compute characteristics for a time-ordered window
pub fn extract_characteristics(samples: &[MotionSample], config: &AnalyzerConfig) -> MovementCharacteristics {
    let n = samples.len();
    if n == 0 {
        return MovementCharacteristics::default();
    }

    let first = &samples[0];
    let last = &samples[n - 1];
    let dwell_time = seconds_between(first, last);

    let mut path_length = 0.0_f32;
    let mut active_time = 0.0_f32;
    let mut sum_dx = 0.0_f32;
    let mut sum_dy = 0.0_f32;
    let mut bearings = Vec::with_capacity(n.saturating_sub(1));

    for pair in samples.windows(2) {
        let dx = pair[1].x - pair[0].x;
        let dy = pair[1].y - pair[0].y;
        let step = (dx * dx + dy * dy).sqrt();

        path_length += step;
        sum_dx += dx.abs();
        sum_dy += dy.abs();

        if step >= config.min_movement_px {
            active_time += seconds_between(&pair[0], &pair[1]);
        }
        if step > f32::EPSILON {
            bearings.push(dy.atan2(dx));
        }
    }

    let speed = if dwell_time > f32::EPSILON {
        path_length / dwell_time
    } else {
        0.0
    };

    let direction = (last.y - first.y).atan2(last.x - first.x).to_degrees();

    let displacement = sum_dx + sum_dy;
    let verticality = if displacement > f32::EPSILON {
        sum_dy / displacement
    } else {
        0.0
    };

    let mean_area = samples.iter().map(|s| s.area()).sum::<f32>() / n as f32;
    let relative_size = (mean_area / config.frame_area()).clamp(0.0, 1.0);

    let xs: Vec<f32> = samples.iter().map(|s| s.x).collect();

    MovementCharacteristics {
        speed,
        direction,
        direction_stability: direction_stability(&bearings),
        relative_size,
        periodicity: periodicity(&xs),
        verticality,
        dwell_time,
        active_time,
        mean_intensity: samples.iter().map(|s| s.intensity).sum::<f32>() / n as f32,
        sample_count: n,
    }
}

fn seconds_between(a: &MotionSample, b: &MotionSample) -> f32 {
    (b.timestamp - a.timestamp).num_milliseconds().max(0) as f32 / 1000.0
}

/// Mean resultant length of the step bearings (1 - circular variance)
pub fn direction_stability(bearings: &[f32]) -> f32 {
    if bearings.is_empty() {
        return 0.0;
    }
    let n = bearings.len() as f32;
    let (s, c) = bearings
        .iter()
        .fold((0.0_f32, 0.0_f32), |(s, c), b| (s + b.sin(), c + b.cos()));
    ((s / n).powi(2) + (c / n).powi(2)).sqrt().clamp(0.0, 1.0)
}

/// Maximum autocorrelation over lags `2..=n/3`, as a 0..1 score.
///
/// The linear trend is removed first so steady travel across the frame does
/// not read as oscillation.
pub fn periodicity(series: &[f32]) -> f32 {
    let n = series.len();
    let max_lag = n / 3;
    if max_lag < 2 {
        return 0.0;
    }

    let residuals = detrend(series);
    let variance = residuals.iter().map(|r| r * r).sum::<f32>() / n as f32;
    if variance < 1e-6 {
        return 0.0;
    }

    let mut best = 0.0_f32;
    for lag in 2..=max_lag {
        let cov = (0..n - lag)
            .map(|i| residuals[i] * residuals[i + lag])
            .sum::<f32>()
            / (n - lag) as f32;
        best = best.max(cov / variance);
    }

    best.clamp(0.0, 1.0)
}

/// Residuals of a least-squares line fit against sample index
fn detrend(series: &[f32]) -> Vec<f32> {
    let n = series.len() as f32;
    let sum_x: f32 = (0..series.len()).map(|i| i as f32).sum();
    let sum_y: f32 = series.iter().sum();
    let sum_xy: f32 = series.iter().enumerate().map(|(i, &y)| i as f32 * y).sum();
    let sum_xx: f32 = (0..series.len()).map(|i| (i * i) as f32).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    let slope = if denom.abs() > f32::EPSILON {
        (n * sum_xy - sum_x * sum_y) / denom
    } else {
        0.0
    };
    let intercept = (sum_y - slope * sum_x) / n;

    series
        .iter()
        .enumerate()
        .map(|(i, &y)| y - (slope * i as f32 + intercept))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn track(points: &[(f32, f32)], size: f32) -> Vec<MotionSample> {
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 6, 0, 0).unwrap();
        points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| MotionSample::new(t0 + Duration::seconds(i as i64), x, y, size, size))
            .collect()
    }

    #[test]
    fn test_straight_line_features() {
        let points: Vec<_> = (0..6).map(|i| (10.0 + 10.0 * i as f32, 100.0)).collect();
        let c = extract_characteristics(&track(&points, 20.0), &AnalyzerConfig::default());

        assert!((c.speed - 10.0).abs() < 1e-3);
        assert!(c.direction.abs() < 1e-3);
        assert!((c.direction_stability - 1.0).abs() < 1e-3);
        assert!(c.verticality < 1e-3);
        assert!((c.dwell_time - 5.0).abs() < 1e-3);
        assert!((c.active_time - 5.0).abs() < 1e-3);
        assert!(c.periodicity < 0.05);
        assert_eq!(c.sample_count, 6);
    }

    #[test]
    fn test_vertical_motion() {
        let points: Vec<_> = (0..5).map(|i| (50.0, 200.0 - 15.0 * i as f32)).collect();
        let c = extract_characteristics(&track(&points, 10.0), &AnalyzerConfig::default());
        assert!((c.verticality - 1.0).abs() < 1e-3);
        assert!((c.direction + 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_oscillation_is_periodic() {
        let xs: Vec<f32> = (0..15).map(|i| [0.0, 3.0, 0.0, -3.0][i % 4] + 100.0).collect();
        assert!(periodicity(&xs) > 0.7);

        let points: Vec<_> = xs.iter().map(|&x| (x, 50.0)).collect();
        let c = extract_characteristics(&track(&points, 30.0), &AnalyzerConfig::default());
        assert!(c.direction_stability < 0.3);
        assert!(c.speed < 5.0);
    }

    #[test]
    fn test_idle_intervals_not_active() {
        let points = [(10.0, 10.0), (10.5, 10.0), (30.0, 10.0), (30.2, 10.0)];
        let c = extract_characteristics(&track(&points, 10.0), &AnalyzerConfig::default());
        assert!((c.active_time - 1.0).abs() < 1e-3);
        assert!((c.dwell_time - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_short_series_has_no_periodicity() {
        assert_eq!(periodicity(&[1.0, 2.0, 3.0, 4.0, 5.0]), 0.0);
        assert_eq!(direction_stability(&[]), 0.0);
    }
}
