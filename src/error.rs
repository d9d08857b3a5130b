// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Error types shared across the decision core
//!
//! Nothing on the sensing path panics or aborts: every public operation either
//! returns one of these errors or a result object with a validity flag.

use thiserror::Error;

use crate::memory::PoolType;

/// Configuration document rejected; the previous configuration stays active
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Document could not be parsed
    #[error("Malformed configuration document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value outside its allowed range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Pool allocation failure (resource exhaustion, never fatal)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// Requested size is larger than the pool's fixed block size
    #[error("Requested {requested} bytes exceeds {pool:?} block size of {block_size}")]
    TooLarge {
        pool: PoolType,
        requested: usize,
        block_size: usize,
    },

    /// Every block in the pool is occupied
    #[error("No free block in {pool:?} pool")]
    Exhausted { pool: PoolType },
}

/// Failure reported by the external base motion detector
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectorError {
    /// The frame handed to the detector could not be processed
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The presence sensor or camera did not answer in time
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// Any other detector-side fault
    #[error("Detector fault: {0}")]
    Fault(String),
}
