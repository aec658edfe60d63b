//! Tensor storage: one shared arena for the offline static plan plus a
//! budgeted dynamic pool for everything the planner did not place.

use crate::status::{Result, Status};

/// Byte buffer backed by u64 words so that every allocation starts on an
/// 8-byte boundary. Typed slice casts over tensor data require element
/// alignment, which a plain `Box<[u8]>` does not guarantee.
#[derive(Debug, Clone)]
pub struct AlignedBuf {
    words: Box<[u64]>,
    len: usize,
}

impl AlignedBuf {
    pub fn zeroed(len: usize) -> Self {
        let words = vec![0u64; len.div_ceil(8)].into_boxed_slice();
        Self { words, len }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = Self::zeroed(bytes.len());
        buf.bytes_mut().copy_from_slice(bytes);
        buf
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }
}

/// Caller-tunable resource limits.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// Budget for dynamically allocated tensor bytes. Exceeding it is the
    /// primary resource-exhaustion failure mode on small targets and is
    /// surfaced as `OutOfMemory`, never silently truncated.
    pub dynamic_budget: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dynamic_budget: 1 << 20,
        }
    }
}

/// Owns all tensor backing storage for one runtime module.
///
/// Tensors with a precomputed plan offset resolve into `arena` in O(1);
/// the plan comes from the offline optimizer and is trusted, so overlap of
/// concurrently-live tensors is not re-verified here. Unplanned tensors
/// draw from the dynamic pool, accounted against the configured budget.
#[derive(Debug)]
pub struct MemoryManager {
    arena: AlignedBuf,
    budget: usize,
    in_use: usize,
    peak: usize,
}

impl MemoryManager {
    pub fn new(arena_len: usize, config: MemoryConfig) -> Self {
        Self {
            arena: AlignedBuf::zeroed(arena_len),
            budget: config.dynamic_budget,
            in_use: 0,
            peak: 0,
        }
    }

    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    pub fn arena(&self) -> &[u8] {
        self.arena.bytes()
    }

    pub fn arena_mut(&mut self) -> &mut [u8] {
        self.arena.bytes_mut()
    }

    /// Allocate a zeroed dynamic buffer, failing with `OutOfMemory` when the
    /// pool budget would be exceeded.
    pub fn allocate(&mut self, len: usize) -> Result<AlignedBuf> {
        if self.in_use + len > self.budget {
            crate::error!(
                "dynamic pool exhausted: {} in use, {} requested, {} budget",
                self.in_use,
                len,
                self.budget
            );
            return Err(Status::out_of_memory(format!(
                "dynamic pool exhausted: {} bytes in use, {} requested, budget {}",
                self.in_use, len, self.budget
            )));
        }
        self.in_use += len;
        self.peak = self.peak.max(self.in_use);
        Ok(AlignedBuf::zeroed(len))
    }

    /// Return a dynamic buffer's bytes to the budget.
    pub fn release(&mut self, buf: AlignedBuf) {
        self.in_use = self.in_use.saturating_sub(buf.len());
    }

    pub fn dynamic_in_use(&self) -> usize {
        self.in_use
    }

    pub fn dynamic_peak(&self) -> usize {
        self.peak
    }
}
