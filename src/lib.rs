// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! TrailSense - Adaptive Motion-Fusion Core for Wildlife Cameras
//!
//! The decision layer of a battery-powered trail camera:
//! - Fixed-block pooled allocator with stale-block reclamation
//! - Rule-based movement classifier (wildlife vs. vegetation, weather, insects)
//! - Adaptive processing controller trading fidelity for battery life
//! - Fusion coordinator producing capture/save/transmit/alert decisions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Detection Coordinator                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌────────────┐  │
//! │  │ Adaptive │→ │  Base    │→ │ Pattern  │→ │  Fusion    │  │
//! │  │Controller│  │ Detector │  │ Analyzer │  │  Engine    │  │
//! │  └──────────┘  └──────────┘  └──────────┘  └────────────┘  │
//! │       ↑                           ↓              ↓          │
//! │       └──────── feedback ─────────┘        ┌───────────┐   │
//! │                                             │ Event Bus │   │
//! │  ┌─────────────────────────────────────┐   └───────────┘   │
//! │  │   Memory Pools (frame/analysis/...) │                   │
//! │  └─────────────────────────────────────┘                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod adaptive;
pub mod analysis;
pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod memory;
pub mod simulation;

// Re-exports for convenience
pub use adaptive::{AdaptiveController, ProcessingDecision, ProcessingLevel};
pub use analysis::{AnalysisResult, MotionSample, MovementPattern, PatternAnalyzer};
pub use config::{Config, SharedConfig};
pub use core::{EnvironmentalConditions, EventBus, Frame};
pub use detection::{CoordinatorResult, DetectionCoordinator, DetectionMethod, MotionDetector};
pub use error::{AllocError, ConfigError, DetectorError};
pub use memory::{MemoryManager, PoolType};

/// TrailSense version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// TrailSense name
pub const NAME: &str = "TrailSense";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
}
