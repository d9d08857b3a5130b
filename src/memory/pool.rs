// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Fixed-size block pool backed by a generation-tagged slot table

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::{MemoryRegion, PoolConfig, PoolType};
use crate::error::AllocError;

/// Lease on one pool block.
///
/// The handle is a checked `(pool, slot, generation)` tuple plus the opaque
/// allocation id; it never carries a pointer. Once the block is released or
/// reclaimed the generation moves on and every operation through this handle
/// becomes a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferAllocation {
    pub pool: PoolType,
    pub slot: usize,
    pub generation: u32,
    pub id: u64,
    pub size: usize,
    pub allocated_at: DateTime<Utc>,
}

/// Per-pool statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub pool: PoolType,
    pub region: MemoryRegion,
    pub block_size: usize,
    pub total_blocks: usize,
    pub used_blocks: usize,
    pub peak_used: usize,
    pub allocations: u64,
    pub deallocations: u64,
    pub failures: u64,
    pub reclaimed: u64,
    pub total_bytes: usize,
    pub used_bytes: usize,
    pub utilization: f32,
}

struct Block {
    data: Box<[u8]>,
    occupied: bool,
    generation: u32,
    allocation_id: u64,
    size: usize,
    allocated_at: Option<DateTime<Utc>>,
}

impl Block {
    fn release(&mut self) {
        self.data[..].zeroize();
        self.occupied = false;
        self.generation = self.generation.wrapping_add(1);
        self.allocation_id = 0;
        self.size = 0;
        self.allocated_at = None;
    }

    fn owned_by(&self, allocation: &BufferAllocation) -> bool {
        self.occupied
            && self.generation == allocation.generation
            && self.allocation_id == allocation.id
    }
}

struct PoolState {
    blocks: Vec<Block>,
    used: usize,
    peak_used: usize,
    allocations: u64,
    deallocations: u64,
    failures: u64,
    reclaimed: u64,
}

/// One class of fixed-size buffers.
///
/// All slot-table access is serialized by a single short-held lock.
pub struct MemoryPool {
    pool_type: PoolType,
    config: PoolConfig,
    stride: usize,
    state: Mutex<PoolState>,
}

impl MemoryPool {
    pub fn new(pool_type: PoolType, config: PoolConfig) -> Self {
        let stride = round_up(config.block_size, config.alignment);
        let blocks = (0..config.block_count)
            .map(|_| Block {
                data: vec![0u8; stride].into_boxed_slice(),
                occupied: false,
                generation: 0,
                allocation_id: 0,
                size: 0,
                allocated_at: None,
            })
            .collect();

        Self {
            pool_type,
            config,
            stride,
            state: Mutex::new(PoolState {
                blocks,
                used: 0,
                peak_used: 0,
                allocations: 0,
                deallocations: 0,
                failures: 0,
                reclaimed: 0,
            }),
        }
    }

    pub fn pool_type(&self) -> PoolType {
        self.pool_type
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// First-fit allocation; block sizes are uniform so fit quality is moot
    pub fn allocate(
        &self,
        size: usize,
        now: DateTime<Utc>,
        next_id: impl FnOnce() -> u64,
    ) -> Result<BufferAllocation, AllocError> {
        let mut state = self.state.lock();

        if size > self.config.block_size {
            state.failures += 1;
            return Err(AllocError::TooLarge {
                pool: self.pool_type,
                requested: size,
                block_size: self.config.block_size,
            });
        }

        let Some(slot) = state.blocks.iter().position(|b| !b.occupied) else {
            state.failures += 1;
            return Err(AllocError::Exhausted { pool: self.pool_type });
        };

        let id = next_id();
        let block = &mut state.blocks[slot];
        block.occupied = true;
        block.allocation_id = id;
        block.size = size;
        block.allocated_at = Some(now);
        let generation = block.generation;

        state.used += 1;
        state.peak_used = state.peak_used.max(state.used);
        state.allocations += 1;

        Ok(BufferAllocation {
            pool: self.pool_type,
            slot,
            generation,
            id,
            size,
            allocated_at: now,
        })
    }

    /// Release a block. Stale, double or foreign handles return `false`.
    pub fn deallocate(&self, allocation: &BufferAllocation) -> bool {
        if allocation.pool != self.pool_type {
            return false;
        }

        let mut state = self.state.lock();
        let Some(block) = state.blocks.get_mut(allocation.slot) else {
            return false;
        };
        if !block.owned_by(allocation) {
            return false;
        }

        block.release();
        state.used -= 1;
        state.deallocations += 1;
        true
    }

    /// Force-free every block whose occupancy age exceeds `max_age`
    pub fn reclaim_older_than(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let mut state = self.state.lock();
        let mut reclaimed = 0;

        for block in state.blocks.iter_mut() {
            let expired = block.occupied
                && block
                    .allocated_at
                    .map(|at| now - at > max_age)
                    .unwrap_or(false);
            if expired {
                block.release();
                reclaimed += 1;
            }
        }

        state.used -= reclaimed;
        state.reclaimed += reclaimed as u64;
        reclaimed
    }

    pub fn with_block<R>(&self, allocation: &BufferAllocation, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        if allocation.pool != self.pool_type {
            return None;
        }
        let state = self.state.lock();
        let block = state.blocks.get(allocation.slot)?;
        if !block.owned_by(allocation) {
            return None;
        }
        Some(f(&block.data[..block.size]))
    }

    pub fn with_block_mut<R>(
        &self,
        allocation: &BufferAllocation,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Option<R> {
        if allocation.pool != self.pool_type {
            return None;
        }
        let mut state = self.state.lock();
        let block = state.blocks.get_mut(allocation.slot)?;
        if !block.owned_by(allocation) {
            return None;
        }
        let size = block.size;
        Some(f(&mut block.data[..size]))
    }

    /// `(used, total)` block counts
    pub fn usage(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.used, state.blocks.len())
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let total_blocks = state.blocks.len();
        PoolStats {
            pool: self.pool_type,
            region: self.config.region,
            block_size: self.config.block_size,
            total_blocks,
            used_blocks: state.used,
            peak_used: state.peak_used,
            allocations: state.allocations,
            deallocations: state.deallocations,
            failures: state.failures,
            reclaimed: state.reclaimed,
            total_bytes: total_blocks * self.stride,
            used_bytes: state.used * self.stride,
            utilization: if total_blocks > 0 {
                state.used as f32 / total_blocks as f32
            } else {
                0.0
            },
        }
    }

    pub fn reset_stats(&self) {
        let mut state = self.state.lock();
        state.peak_used = state.used;
        state.allocations = 0;
        state.deallocations = 0;
        state.failures = 0;
        state.reclaimed = 0;
    }
}

fn round_up(size: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return size;
    }
    size.div_ceil(alignment) * alignment
}
