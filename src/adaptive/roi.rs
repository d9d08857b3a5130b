//! Region-of-interest memory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remembered sub-area of the frame likely to contain activity.
///
/// Advisory only: consumers decide whether to crop or prioritize it.
/// Confidence only grows under confirmation and is reset only by
/// re-initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub enabled: bool,

    /// Top-left corner in frame pixels
    pub x: f32,
    pub y: f32,

    pub width: f32,
    pub height: f32,

    /// 0..1
    pub confidence: f32,

    pub last_update: Option<DateTime<Utc>>,
}

impl RegionOfInterest {
    /// Disabled rectangle centred in the frame
    pub fn centered(frame_width: f32, frame_height: f32, width: f32, height: f32) -> Self {
        Self {
            enabled: false,
            x: ((frame_width - width) / 2.0).max(0.0),
            y: ((frame_height - height) / 2.0).max(0.0),
            width,
            height,
            confidence: 0.0,
            last_update: None,
        }
    }

    /// Move the rectangle to a new centre, kept inside the frame, and raise
    /// confidence by one step
    pub fn confirm(&mut self, center: (f32, f32), frame_width: f32, frame_height: f32, now: DateTime<Utc>) {
        let max_x = (frame_width - self.width).max(0.0);
        let max_y = (frame_height - self.height).max(0.0);

        self.x = (center.0 - self.width / 2.0).clamp(0.0, max_x);
        self.y = (center.1 - self.height / 2.0).clamp(0.0, max_y);
        self.confidence = (self.confidence + 0.1).min(1.0);
        self.enabled = true;
        self.last_update = Some(now);
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}
