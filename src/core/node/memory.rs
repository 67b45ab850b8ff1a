// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! DMA memory provider
//!
//! Node memory must be physically addressed so the hardware can follow the
//! NVN chain. The engine does not manage that memory itself; it asks a
//! [`MemoryProvider`] for one region at plane creation and keeps it for the
//! plane's lifetime.

use std::sync::atomic::{AtomicU64, Ordering};

/// A DMA-capable memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    /// Bus address of the first byte
    pub addr: u32,

    /// Length in bytes
    pub size: usize,
}

/// Source of zero-initialized, physically addressed memory
pub trait MemoryProvider: Send + Sync {
    /// Allocate `size` bytes, or `None` if the request cannot be satisfied
    fn allocate(&self, size: usize) -> Option<DmaRegion>;
}

/// Linear allocator over a fixed bus address window
///
/// Hands out page-aligned regions and never reclaims them, matching the
/// lifetime of node memory.
pub struct LinearDmaAllocator {
    end: u64,
    next: AtomicU64,
    align: u64,
}

impl LinearDmaAllocator {
    pub const PAGE_SIZE: u64 = 4096;

    /// Create an allocator for `[base, base + size)`
    pub fn new(base: u32, size: u32) -> Self {
        Self::with_alignment(base, size, Self::PAGE_SIZE)
    }

    /// Create an allocator with a custom alignment (power of two)
    pub fn with_alignment(base: u32, size: u32, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        Self {
            end: base as u64 + size as u64,
            next: AtomicU64::new(base as u64),
            align,
        }
    }

    /// Bytes still available, ignoring alignment padding
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.next.load(Ordering::Acquire))
    }
}

impl MemoryProvider for LinearDmaAllocator {
    fn allocate(&self, size: usize) -> Option<DmaRegion> {
        let mut current = self.next.load(Ordering::Acquire);
        loop {
            let start = (current + self.align - 1) & !(self.align - 1);
            let end = start.checked_add(size as u64)?;
            if end > self.end || start > u32::MAX as u64 || end > u32::MAX as u64 + 1 {
                log::warn!(
                    "DMA window exhausted: {} bytes requested, {} left",
                    size,
                    self.remaining()
                );
                return None;
            }
            match self
                .next
                .compare_exchange(current, end, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    return Some(DmaRegion {
                        addr: start as u32,
                        size,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }
}
