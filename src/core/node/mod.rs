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

//! GDP node pool
//!
//! Each plane owns two banks of nodes. A bank holds a top-field node and a
//! bottom-field node, chained to each other through their NVN words. At most
//! one bank is live (its address is in the NVN register); the other is free
//! for the next build.
//!
//! ```text
//!          bank 0                       bank 1
//!  ┌──────────┐  ┌──────────┐   ┌──────────┐  ┌──────────┐
//!  │ top      │─▶│ bottom   │   │ top      │─▶│ bottom   │
//!  │ NVN=btm  │◀─│ NVN=top  │   │ NVN=btm  │◀─│ NVN=top  │
//!  └──────────┘  └──────────┘   └──────────┘  └──────────┘
//! ```
//!
//! Banks are referred to by slot index; physical addresses only appear when
//! a node is written into the hardware chain.

mod memory;

use std::sync::atomic::{AtomicU32, Ordering};

use super::error::{GdpError, Result};
use super::hw::{GdpPpt, GdpRegister, GdpVariant, RegisterFile};

pub use memory::{DmaRegion, LinearDmaAllocator, MemoryProvider};

/// Number of node banks per plane
pub const GDP_NODE_NB_BANK: usize = 2;

/// Number of nodes per bank (top and bottom field)
pub const GDP_NODE_PER_FIELD: usize = 2;

/// Field of an interlaced frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Top,
    Bottom,
}

/// One hardware node: a register image in DMA memory
///
/// Words are atomics because the hardware consumer reads them concurrently
/// with the control path and the field-event path.
pub struct DescriptorNode {
    addr: u32,
    variant: GdpVariant,
    words: Box<[AtomicU32]>,
}

impl DescriptorNode {
    fn new(addr: u32, variant: GdpVariant) -> Self {
        Self {
            addr,
            variant,
            words: (0..variant.node_words()).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Bus address of this node
    #[inline(always)]
    pub fn addr(&self) -> u32 {
        self.addr
    }

    #[inline(always)]
    pub fn read(&self, reg: GdpRegister) -> u32 {
        self.words[reg.word(self.variant)].load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn write(&self, reg: GdpRegister, value: u32) {
        self.words[reg.word(self.variant)].store(value, Ordering::Release);
    }

    pub fn set_bits(&self, reg: GdpRegister, bits: u32) {
        self.words[reg.word(self.variant)].fetch_or(bits, Ordering::AcqRel);
    }

    pub fn clear_bits(&self, reg: GdpRegister, bits: u32) {
        self.words[reg.word(self.variant)].fetch_and(!bits, Ordering::AcqRel);
    }

    /// Whether the mixer is told to skip this node
    pub fn is_ignored(&self) -> bool {
        GdpPpt::from_bits_retain(self.read(GdpRegister::Ppt)).contains(GdpPpt::IGNORE)
    }

    /// Copy every word of `other` into this node
    pub fn copy_from(&self, other: &DescriptorNode) {
        for (dst, src) in self.words.iter().zip(other.words.iter()) {
            dst.store(src.load(Ordering::Acquire), Ordering::Release);
        }
    }

    /// Point-in-time copy of the node words
    pub fn snapshot(&self) -> Vec<u32> {
        self.words.iter().map(|w| w.load(Ordering::Acquire)).collect()
    }
}

/// Top and bottom node of one bank
pub struct NodeBank {
    top: DescriptorNode,
    bottom: DescriptorNode,
}

impl NodeBank {
    pub fn top(&self) -> &DescriptorNode {
        &self.top
    }

    pub fn bottom(&self) -> &DescriptorNode {
        &self.bottom
    }

    pub fn field(&self, field: Field) -> &DescriptorNode {
        match field {
            Field::Top => &self.top,
            Field::Bottom => &self.bottom,
        }
    }

    /// Whether either node of this bank lives at `addr`
    pub fn contains(&self, addr: u32) -> bool {
        addr == self.top.addr || addr == self.bottom.addr
    }
}

/// The node banks of one plane
pub struct NodePool {
    variant: GdpVariant,
    region: DmaRegion,
    banks: [NodeBank; GDP_NODE_NB_BANK],
}

impl NodePool {
    /// Allocate the node memory of a plane
    ///
    /// All nodes share one region: `node_size × 2 fields × 2 banks`.
    ///
    /// # Errors
    ///
    /// - [`GdpError::NodeAllocation`] if the provider cannot supply the region
    /// - [`GdpError::NodeAlignment`] if any node address has its low 4 bits set
    pub fn new(variant: GdpVariant, provider: &dyn MemoryProvider) -> Result<Self> {
        let node_size = variant.node_size();
        let size = node_size as usize * GDP_NODE_PER_FIELD * GDP_NODE_NB_BANK;

        let region = provider.allocate(size).ok_or_else(|| {
            log::error!("Failed to allocate memory for GDP node");
            GdpError::NodeAllocation { size }
        })?;

        let node = |index: u32| -> Result<DescriptorNode> {
            let addr = region
                .addr
                .checked_add(index * node_size)
                .filter(|addr| addr.checked_add(node_size - 1).is_some())
                .ok_or_else(|| {
                    log::error!("GDP node {} beyond 32-bit bus: 0x{:08X}", index, region.addr);
                    GdpError::NodeAllocation { size }
                })?;
            if addr & 0xF != 0 {
                log::error!("Mem alignment failed: 0x{:08X}", addr);
                return Err(GdpError::NodeAlignment { addr });
            }
            Ok(DescriptorNode::new(addr, variant))
        };

        let banks = [
            NodeBank {
                top: node(0)?,
                bottom: node(1)?,
            },
            NodeBank {
                top: node(2)?,
                bottom: node(3)?,
            },
        ];

        for (i, bank) in banks.iter().enumerate() {
            log::debug!(
                "node[{}].top_field=0x{:08X} node[{}].btm_field=0x{:08X}",
                i,
                bank.top.addr,
                i,
                bank.bottom.addr
            );
        }

        Ok(Self {
            variant,
            region,
            banks,
        })
    }

    pub fn variant(&self) -> GdpVariant {
        self.variant
    }

    /// The DMA region holding every node
    pub fn region(&self) -> DmaRegion {
        self.region
    }

    /// Bank at `slot` (0 or 1)
    pub fn bank(&self, slot: usize) -> &NodeBank {
        &self.banks[slot]
    }

    pub fn banks(&self) -> &[NodeBank; GDP_NODE_NB_BANK] {
        &self.banks
    }

    /// Find a bank the hardware is not reading
    ///
    /// Reads NVN once. A zero NVN (nothing programmed yet) selects bank 0.
    /// If NVN points outside the pool, software has lost track of the
    /// hardware: the hazard is logged and bank 0 is used.
    pub fn free_bank(&self, regs: &dyn RegisterFile, plane: &str) -> usize {
        let hw_nvn = regs.read(GdpRegister::Nvn.offset(self.variant));
        if hw_nvn == 0 {
            return 0;
        }

        if !self.banks.iter().any(|bank| bank.contains(hw_nvn)) {
            // in hazardous cases restart with the first node
            log::error!("inconsistent NVN for {}: 0x{:08X}", plane, hw_nvn);
            return 0;
        }

        self.banks
            .iter()
            .position(|bank| !bank.contains(hw_nvn))
            .unwrap_or(0)
    }

    /// Find the bank the hardware is reading
    ///
    /// Returns `None` before the first commit, or when NVN matches no bank.
    pub fn current_bank(&self, regs: &dyn RegisterFile, plane: &str) -> Option<usize> {
        let hw_nvn = regs.read(GdpRegister::Nvn.offset(self.variant));
        let slot = match hw_nvn {
            0 => None,
            addr => self.banks.iter().position(|bank| bank.contains(addr)),
        };

        if slot.is_none() {
            log::debug!(
                "Warning, NVN 0x{:08X} for {} does not match any node",
                hw_nvn,
                plane
            );
        }
        slot
    }

    /// Bank slot, field and node at bus address `addr`, if it belongs to
    /// this pool
    pub fn node_at(&self, addr: u32) -> Option<(usize, Field, &DescriptorNode)> {
        self.banks.iter().enumerate().find_map(|(slot, bank)| {
            if bank.top.addr == addr {
                Some((slot, Field::Top, &bank.top))
            } else if bank.bottom.addr == addr {
                Some((slot, Field::Bottom, &bank.bottom))
            } else {
                None
            }
        })
    }

    /// Mark every node as "to be ignored on mixer"
    pub fn mark_all_ignored(&self) {
        for bank in &self.banks {
            bank.top.set_bits(GdpRegister::Ppt, GdpPpt::IGNORE.bits());
            bank.bottom.set_bits(GdpRegister::Ppt, GdpPpt::IGNORE.bits());
        }
    }
}
