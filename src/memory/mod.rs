// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Pooled memory allocator
//!
//! Four fixed-size buffer pools (frame, analysis, temp, config) created once at
//! start-up. Allocation never touches the general-purpose heap after that, so a
//! long-running sensor does not fragment its memory.
//!
//! Age-based cleanup is a safety net for leaked allocations. It can reclaim a
//! block that a slow consumer still logically holds; the generation tag on
//! every [`BufferAllocation`] turns any later access through that handle into
//! a `None`/`false` rather than aliasing the new owner's buffer. Prefer
//! [`MemoryManager::lease`] so release happens on drop.

mod pool;

pub use pool::*;

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{period_secs, MAX_PERIOD_SECS};
use crate::error::{AllocError, ConfigError};

/// Buffer purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    /// Large capture-size buffers
    Frame,
    /// Mid-size analysis working memory
    Analysis,
    /// Small scratch buffers
    Temp,
    /// Small configuration documents
    Config,
}

impl PoolType {
    pub const ALL: [PoolType; 4] = [
        PoolType::Frame,
        PoolType::Analysis,
        PoolType::Temp,
        PoolType::Config,
    ];

    fn index(self) -> usize {
        match self {
            PoolType::Frame => 0,
            PoolType::Analysis => 1,
            PoolType::Temp => 2,
            PoolType::Config => 3,
        }
    }
}

/// Placement preference.
///
/// Hosted builds back both regions with the global heap; a board port maps
/// `External` to PSRAM-style memory and `Internal` to fast SRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryRegion {
    Internal,
    External,
}

/// Geometry of one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Usable bytes per block
    pub block_size: usize,

    /// Number of blocks
    pub block_count: usize,

    /// Placement preference
    pub region: MemoryRegion,

    /// Block stride granularity (power of two)
    pub alignment: usize,
}

impl PoolConfig {
    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.block_size == 0 || self.block_count == 0 {
            return Err(ConfigError::invalid(field, "block size and count must be non-zero"));
        }
        if !self.alignment.is_power_of_two() {
            return Err(ConfigError::invalid(field, "alignment must be a power of two"));
        }
        Ok(())
    }
}

/// Allocator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Capture-size buffers
    pub frame: PoolConfig,

    /// Analysis working buffers
    pub analysis: PoolConfig,

    /// Scratch buffers
    pub temp: PoolConfig,

    /// Configuration document buffers
    pub config: PoolConfig,

    /// Run the stale-block sweep opportunistically on allocation
    pub auto_cleanup: bool,

    /// Minimum seconds between sweeps
    pub cleanup_interval_secs: u64,

    /// Overall utilization above which a sweep is worth running
    pub cleanup_utilization_threshold: f32,

    /// Occupancy age after which a block is considered leaked
    pub max_block_age_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            frame: PoolConfig {
                block_size: 100 * 1024,
                block_count: 3,
                region: MemoryRegion::External,
                alignment: 32,
            },
            analysis: PoolConfig {
                block_size: 32 * 1024,
                block_count: 4,
                region: MemoryRegion::Internal,
                alignment: 16,
            },
            temp: PoolConfig {
                block_size: 4 * 1024,
                block_count: 8,
                region: MemoryRegion::Internal,
                alignment: 8,
            },
            config: PoolConfig {
                block_size: 2 * 1024,
                block_count: 4,
                region: MemoryRegion::Internal,
                alignment: 8,
            },
            auto_cleanup: true,
            cleanup_interval_secs: 60,
            cleanup_utilization_threshold: 0.8,
            max_block_age_secs: 300,
        }
    }
}

impl MemoryConfig {
    pub fn pool(&self, pool: PoolType) -> &PoolConfig {
        match pool {
            PoolType::Frame => &self.frame,
            PoolType::Analysis => &self.analysis,
            PoolType::Temp => &self.temp,
            PoolType::Config => &self.config,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.frame.validate("frame")?;
        self.analysis.validate("analysis")?;
        self.temp.validate("temp")?;
        self.config.validate("config")?;

        if !(self.cleanup_utilization_threshold > 0.0 && self.cleanup_utilization_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "cleanup_utilization_threshold",
                "must be within (0, 1]",
            ));
        }
        if !(1..=MAX_PERIOD_SECS).contains(&self.max_block_age_secs) {
            return Err(ConfigError::invalid(
                "max_block_age_secs",
                format!("must be within 1..={}", MAX_PERIOD_SECS),
            ));
        }
        if self.cleanup_interval_secs > MAX_PERIOD_SECS {
            return Err(ConfigError::invalid(
                "cleanup_interval_secs",
                format!("must not exceed {}", MAX_PERIOD_SECS),
            ));
        }
        Ok(())
    }

    fn same_geometry(&self, other: &MemoryConfig) -> bool {
        PoolType::ALL.iter().all(|&p| self.pool(p) == other.pool(p))
    }
}

/// Allocator-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub pools: Vec<PoolStats>,
    pub total_blocks: usize,
    pub used_blocks: usize,
    pub total_bytes: usize,
    pub used_bytes: usize,
    pub allocations: u64,
    pub deallocations: u64,
    pub failures: u64,
    pub reclaimed: u64,
    pub gc_runs: u64,
    pub utilization: f32,
}

/// Owns the four pools; shared as `Arc<MemoryManager>` between tasks
pub struct MemoryManager {
    config: RwLock<MemoryConfig>,
    pools: [MemoryPool; 4],
    next_id: AtomicU64,
    /// `None` until the first sweep check
    last_cleanup: Mutex<Option<DateTime<Utc>>>,
    gc_runs: AtomicU64,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MemoryConfig) -> Self {
        let pools = PoolType::ALL.map(|p| MemoryPool::new(p, config.pool(p).clone()));

        let total: usize = pools
            .iter()
            .map(|p| p.config().block_size * p.config().block_count)
            .sum();
        info!("Memory pools initialized: {} KiB reserved", total / 1024);

        Self {
            config: RwLock::new(config),
            pools,
            next_id: AtomicU64::new(1),
            last_cleanup: Mutex::new(None),
            gc_runs: AtomicU64::new(0),
        }
    }

    pub fn pool(&self, pool: PoolType) -> &MemoryPool {
        &self.pools[pool.index()]
    }

    pub fn allocate(&self, pool: PoolType, size: usize) -> Result<BufferAllocation, AllocError> {
        self.allocate_at(pool, size, Utc::now())
    }

    pub fn allocate_at(
        &self,
        pool: PoolType,
        size: usize,
        now: DateTime<Utc>,
    ) -> Result<BufferAllocation, AllocError> {
        self.maybe_collect_at(now);

        let result = self
            .pool(pool)
            .allocate(size, now, || self.next_id.fetch_add(1, Ordering::Relaxed));

        match &result {
            Ok(alloc) => debug!("Allocated {:?} slot {} (id {}, {} bytes)", pool, alloc.slot, alloc.id, size),
            Err(e) => warn!("Allocation failed: {}", e),
        }
        result
    }

    /// Returns `false` for already-freed, reclaimed or foreign handles
    pub fn deallocate(&self, allocation: &BufferAllocation) -> bool {
        let freed = self.pool(allocation.pool).deallocate(allocation);
        if !freed {
            debug!("Ignoring release of stale allocation {}", allocation.id);
        }
        freed
    }

    /// Allocate a block that is released when the lease drops
    pub fn lease(&self, pool: PoolType, size: usize) -> Result<BufferLease<'_>, AllocError> {
        self.lease_at(pool, size, Utc::now())
    }

    pub fn lease_at(
        &self,
        pool: PoolType,
        size: usize,
        now: DateTime<Utc>,
    ) -> Result<BufferLease<'_>, AllocError> {
        let allocation = self.allocate_at(pool, size, now)?;
        Ok(BufferLease {
            manager: self,
            allocation: Some(allocation),
        })
    }

    pub fn with_buffer<R>(&self, allocation: &BufferAllocation, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.pool(allocation.pool).with_block(allocation, f)
    }

    pub fn with_buffer_mut<R>(
        &self,
        allocation: &BufferAllocation,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Option<R> {
        self.pool(allocation.pool).with_block_mut(allocation, f)
    }

    /// Sweep every pool for blocks older than the configured max age
    pub fn collect_garbage(&self) -> usize {
        self.collect_garbage_at(Utc::now())
    }

    pub fn collect_garbage_at(&self, now: DateTime<Utc>) -> usize {
        let max_age = period_secs(self.config.read().max_block_age_secs);
        self.gc_runs.fetch_add(1, Ordering::Relaxed);

        // One pool lock at a time
        let reclaimed: usize = self
            .pools
            .iter()
            .map(|p| p.reclaim_older_than(now, max_age))
            .sum();

        if reclaimed > 0 {
            warn!("Reclaimed {} stale pool blocks older than {}s", reclaimed, max_age.num_seconds());
        }
        reclaimed
    }

    /// Run the sweep if the interval elapsed and utilization is high
    pub fn maybe_collect_at(&self, now: DateTime<Utc>) -> usize {
        let (auto, interval, threshold) = {
            let config = self.config.read();
            (
                config.auto_cleanup,
                period_secs(config.cleanup_interval_secs),
                config.cleanup_utilization_threshold,
            )
        };
        if !auto {
            return 0;
        }

        {
            // A clock that stepped backwards counts as elapsed
            let mut last = self.last_cleanup.lock();
            if let Some(prev) = *last {
                if now >= prev && now - prev < interval {
                    return 0;
                }
            }
            *last = Some(now);
        }

        if self.utilization() > threshold {
            self.collect_garbage_at(now)
        } else {
            0
        }
    }

    /// Overall fraction of occupied blocks
    pub fn utilization(&self) -> f32 {
        let (used, total) = self
            .pools
            .iter()
            .map(|p| p.usage())
            .fold((0, 0), |(u, t), (pu, pt)| (u + pu, t + pt));
        if total == 0 {
            0.0
        } else {
            used as f32 / total as f32
        }
    }

    pub fn pool_stats(&self, pool: PoolType) -> PoolStats {
        self.pool(pool).stats()
    }

    pub fn stats(&self) -> MemoryStats {
        let pools: Vec<PoolStats> = self.pools.iter().map(|p| p.stats()).collect();
        let total_blocks: usize = pools.iter().map(|s| s.total_blocks).sum();
        let used_blocks: usize = pools.iter().map(|s| s.used_blocks).sum();

        MemoryStats {
            total_blocks,
            used_blocks,
            total_bytes: pools.iter().map(|s| s.total_bytes).sum(),
            used_bytes: pools.iter().map(|s| s.used_bytes).sum(),
            allocations: pools.iter().map(|s| s.allocations).sum(),
            deallocations: pools.iter().map(|s| s.deallocations).sum(),
            failures: pools.iter().map(|s| s.failures).sum(),
            reclaimed: pools.iter().map(|s| s.reclaimed).sum(),
            gc_runs: self.gc_runs.load(Ordering::Relaxed),
            utilization: if total_blocks > 0 {
                used_blocks as f32 / total_blocks as f32
            } else {
                0.0
            },
            pools,
        }
    }

    pub fn reset_stats(&self) {
        for pool in &self.pools {
            pool.reset_stats();
        }
        self.gc_runs.store(0, Ordering::Relaxed);
    }

    pub fn config(&self) -> MemoryConfig {
        self.config.read().clone()
    }

    pub fn get_config_json(&self) -> String {
        serde_json::to_string_pretty(&*self.config.read()).unwrap_or_default()
    }

    /// Apply cleanup policy from a JSON document.
    ///
    /// Pool geometry is fixed for the manager's lifetime; a document that
    /// changes it is rejected.
    pub fn load_config_json(&self, json: &str) -> Result<(), ConfigError> {
        let new: MemoryConfig = serde_json::from_str(json)?;
        new.validate()?;

        let mut config = self.config.write();
        if !config.same_geometry(&new) {
            return Err(ConfigError::invalid("pools", "pool geometry is fixed after initialization"));
        }
        *config = new;
        info!("Memory cleanup policy updated");
        Ok(())
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::build(MemoryConfig::default())
    }
}

/// Pool block released automatically on drop
pub struct BufferLease<'a> {
    manager: &'a MemoryManager,
    allocation: Option<BufferAllocation>,
}

impl<'a> BufferLease<'a> {
    pub fn allocation(&self) -> Option<&BufferAllocation> {
        self.allocation.as_ref()
    }

    /// `None` once the block was reclaimed underneath the lease
    pub fn with_buffer<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let allocation = self.allocation.as_ref()?;
        self.manager.with_buffer(allocation, f)
    }

    pub fn with_buffer_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        let allocation = self.allocation.as_ref()?;
        self.manager.with_buffer_mut(allocation, f)
    }

    pub fn is_live(&self) -> bool {
        self.with_buffer(|_| ()).is_some()
    }

    /// Release now; returns whether the block was still held
    pub fn release(mut self) -> bool {
        self.allocation
            .take()
            .map(|a| self.manager.deallocate(&a))
            .unwrap_or(false)
    }
}

impl Drop for BufferLease<'_> {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.manager.deallocate(&allocation);
        }
    }
}
