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

//! GDP register file
//!
//! A GDP is programmed through "nodes": register images in DMA memory that the
//! hardware fetches at every field boundary. The live register block mirrors
//! the node layout; the NVN register holds the address of the next node the
//! hardware will fetch.
//!
//! ## Node layout (byte offsets)
//!
//! ```text
//! Register | GDP  | GDP+ | Description
//! ---------|------|------|----------------------------------------
//! CTL      | 0x00 | 0x00 | Control: color format, WAIT_NEXT_VSYNC
//! AGC      | 0x04 | 0x04 | Alpha gain constant
//! VPO      | 0x0C | 0x08 | Viewport offset (ydo << 16 | xdo)
//! VPS      | 0x10 | 0x0C | Viewport stop   (yds << 16 | xds)
//! PML      | 0x14 | 0x10 | Pixmap memory location
//! PMP      | 0x18 | 0x14 | Pixmap memory pitch
//! SIZE     | 0x1C | 0x18 | Pixmap size (height << 16 | width)
//! NVN      | 0x24 | 0x1C | Next node address
//! KEY1     | 0x28 | 0x20 | Color key 1
//! KEY2     | 0x2C | 0x24 | Color key 2
//! PPT      | 0x34 | 0x2C | Plane properties (ignore-on-mixer bits)
//! CML      | 0x3C | 0x34 | CLUT memory location
//! ```
//!
//! A GDP node is 0x40 bytes; a GDP+ node carries the filter tables and is
//! 0x500 bytes.

mod sim;

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub use sim::{underflow_flagged, FieldScan, ScanoutSimulator};

/// Alpha range 0..255 (CTL bit 5)
pub const GAM_GDP_ALPHARANGE_255: u32 = 1 << 5;

/// Alpha gain: full range on all three components
pub const GAM_GDP_AGC_FULL_RANGE: u32 = 0x0080_8080;

/// Maximum source width the GDP can fetch
pub const GAM_GDP_SIZE_MAX_WIDTH: u32 = 3840;

/// Maximum source height the GDP can fetch
pub const GAM_GDP_SIZE_MAX_HEIGHT: u32 = 2160;

/// Memory status register (underflow flag in bit 0), live registers only
pub const GAM_GDP_MST_OFFSET: u32 = 0x68;

/// Size of the live register window
pub const GAM_GDP_REGS_SIZE: u32 = 0x70;

bitflags! {
    /// CTL register bits outside the color format field
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GdpCtl: u32 {
        const ALPHA_RANGE_255 = GAM_GDP_ALPHARANGE_255;
        const ALPHA_SWITCH = 1 << 6;
        const ENA_COLOR_FILL = 1 << 8;
        const BIG_NOT_LITTLE = 1 << 23;
        const WAIT_NEXT_VSYNC = 1 << 31;

        const _ = !0;
    }
}

bitflags! {
    /// PPT register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GdpPpt: u32 {
        /// Node is not displayed on the mixer
        const IGNORE = 0b11;

        const _ = !0;
    }
}

/// GDP hardware flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GdpVariant {
    /// Plain GDP: 0x40-byte nodes
    #[default]
    Gdp,

    /// GDP+ with scaling filters: 0x500-byte nodes
    GdpPlus,
}

impl GdpVariant {
    /// Size in bytes of one node
    pub fn node_size(self) -> u32 {
        match self {
            GdpVariant::Gdp => 0x40,
            GdpVariant::GdpPlus => 0x500,
        }
    }

    /// Number of 32-bit words in one node
    pub fn node_words(self) -> usize {
        (self.node_size() / 4) as usize
    }
}

/// Registers common to both GDP variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GdpRegister {
    Ctl,
    Agc,
    Vpo,
    Vps,
    Pml,
    Pmp,
    Size,
    Nvn,
    Key1,
    Key2,
    Ppt,
    Cml,
}

impl GdpRegister {
    pub const ALL: [GdpRegister; 12] = [
        GdpRegister::Ctl,
        GdpRegister::Agc,
        GdpRegister::Vpo,
        GdpRegister::Vps,
        GdpRegister::Pml,
        GdpRegister::Pmp,
        GdpRegister::Size,
        GdpRegister::Nvn,
        GdpRegister::Key1,
        GdpRegister::Key2,
        GdpRegister::Ppt,
        GdpRegister::Cml,
    ];

    /// Byte offset of the register for a GDP variant
    pub fn offset(self, variant: GdpVariant) -> u32 {
        match variant {
            GdpVariant::Gdp => match self {
                GdpRegister::Ctl => 0x00,
                GdpRegister::Agc => 0x04,
                GdpRegister::Vpo => 0x0C,
                GdpRegister::Vps => 0x10,
                GdpRegister::Pml => 0x14,
                GdpRegister::Pmp => 0x18,
                GdpRegister::Size => 0x1C,
                GdpRegister::Nvn => 0x24,
                GdpRegister::Key1 => 0x28,
                GdpRegister::Key2 => 0x2C,
                GdpRegister::Ppt => 0x34,
                GdpRegister::Cml => 0x3C,
            },
            GdpVariant::GdpPlus => match self {
                GdpRegister::Ctl => 0x00,
                GdpRegister::Agc => 0x04,
                GdpRegister::Vpo => 0x08,
                GdpRegister::Vps => 0x0C,
                GdpRegister::Pml => 0x10,
                GdpRegister::Pmp => 0x14,
                GdpRegister::Size => 0x18,
                GdpRegister::Nvn => 0x1C,
                GdpRegister::Key1 => 0x20,
                GdpRegister::Key2 => 0x24,
                GdpRegister::Ppt => 0x2C,
                GdpRegister::Cml => 0x34,
            },
        }
    }

    /// Word index of the register inside a node
    #[inline(always)]
    pub fn word(self, variant: GdpVariant) -> usize {
        (self.offset(variant) >> 2) as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            GdpRegister::Ctl => "CTL",
            GdpRegister::Agc => "AGC",
            GdpRegister::Vpo => "VPO",
            GdpRegister::Vps => "VPS",
            GdpRegister::Pml => "PML",
            GdpRegister::Pmp => "PMP",
            GdpRegister::Size => "SIZE",
            GdpRegister::Nvn => "NVN",
            GdpRegister::Key1 => "KEY1",
            GdpRegister::Key2 => "KEY2",
            GdpRegister::Ppt => "PPT",
            GdpRegister::Cml => "CML",
        }
    }
}

/// Word-addressed access to a memory-mapped register block
///
/// Accesses are single non-blocking loads/stores; implementations must be
/// callable from the field-event path.
pub trait RegisterFile: Send + Sync {
    /// Read the 32-bit register at byte `offset`
    fn read(&self, offset: u32) -> u32;

    /// Write the 32-bit register at byte `offset`
    fn write(&self, offset: u32, value: u32);

    /// Human-readable name for logging
    fn name(&self) -> &str {
        "registers"
    }
}

/// Register block backed by plain memory
///
/// Stands in for the memory-mapped register window. Every software write is
/// counted per register so callers can observe exactly which registers a code
/// path touched. Hardware-side updates go through [`MemoryRegisters::load`],
/// which does not count.
pub struct MemoryRegisters {
    name: String,
    words: Box<[AtomicU32]>,
    writes: Box<[AtomicU64]>,
}

impl MemoryRegisters {
    /// Create a zeroed register block of `size` bytes
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        let count = size.div_ceil(4) as usize;
        Self {
            name: name.into(),
            words: (0..count).map(|_| AtomicU32::new(0)).collect(),
            writes: (0..count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Register block sized for a GDP
    pub fn gdp(name: impl Into<String>) -> Self {
        Self::new(name, GAM_GDP_REGS_SIZE)
    }

    /// Hardware-side store; not counted as a software write
    pub fn load(&self, offset: u32, value: u32) {
        if let Some(word) = self.words.get((offset >> 2) as usize) {
            word.store(value, Ordering::Release);
        }
    }

    /// Number of software writes to the register at `offset`
    pub fn write_count(&self, offset: u32) -> u64 {
        self.writes
            .get((offset >> 2) as usize)
            .map_or(0, |c| c.load(Ordering::Acquire))
    }

    /// Number of software writes across the whole block
    pub fn total_writes(&self) -> u64 {
        self.writes.iter().map(|c| c.load(Ordering::Acquire)).sum()
    }
}

impl RegisterFile for MemoryRegisters {
    fn read(&self, offset: u32) -> u32 {
        match self.words.get((offset >> 2) as usize) {
            Some(word) => word.load(Ordering::Acquire),
            None => {
                log::warn!("{}: read outside register window at 0x{:X}", self.name, offset);
                0
            }
        }
    }

    fn write(&self, offset: u32, value: u32) {
        let index = (offset >> 2) as usize;
        match (self.words.get(index), self.writes.get(index)) {
            (Some(word), Some(count)) => {
                word.store(value, Ordering::Release);
                count.fetch_add(1, Ordering::AcqRel);
                log::trace!("{}: [0x{:02X}] <= 0x{:08X}", self.name, offset, value);
            }
            _ => log::warn!(
                "{}: write outside register window at 0x{:X}",
                self.name,
                offset
            ),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_sizes() {
        assert_eq!(GdpVariant::Gdp.node_size(), 0x40);
        assert_eq!(GdpVariant::GdpPlus.node_size(), 0x500);
        assert_eq!(GdpVariant::Gdp.node_words(), 16);
    }

    #[test]
    fn test_register_offsets_per_variant() {
        assert_eq!(GdpRegister::Nvn.offset(GdpVariant::Gdp), 0x24);
        assert_eq!(GdpRegister::Nvn.offset(GdpVariant::GdpPlus), 0x1C);
        assert_eq!(GdpRegister::Ppt.word(GdpVariant::Gdp), 0x34 >> 2);
        assert_eq!(GdpRegister::Ppt.word(GdpVariant::GdpPlus), 0x2C >> 2);
    }

    #[test]
    fn test_registers_fit_inside_node() {
        for variant in [GdpVariant::Gdp, GdpVariant::GdpPlus] {
            for reg in GdpRegister::ALL {
                assert!(
                    reg.offset(variant) < variant.node_size(),
                    "{} outside {:?} node",
                    reg.name(),
                    variant
                );
                assert_eq!(reg.offset(variant) & 3, 0);
            }
        }
    }

    #[test]
    fn test_memory_registers_count_writes() {
        let regs = MemoryRegisters::gdp("gdp0");
        regs.write(0x24, 0x1000);
        regs.write(0x24, 0x1040);
        regs.write(0x14, 0xCAFE);

        assert_eq!(regs.read(0x24), 0x1040);
        assert_eq!(regs.write_count(0x24), 2);
        assert_eq!(regs.write_count(0x14), 1);
        assert_eq!(regs.total_writes(), 3);
    }

    #[test]
    fn test_hardware_load_is_not_counted() {
        let regs = MemoryRegisters::gdp("gdp0");
        regs.load(0x24, 0x2000);
        assert_eq!(regs.read(0x24), 0x2000);
        assert_eq!(regs.total_writes(), 0);
    }

    #[test]
    fn test_out_of_window_access() {
        let regs = MemoryRegisters::new("tiny", 8);
        regs.write(0x40, 1);
        assert_eq!(regs.read(0x40), 0);
        assert_eq!(regs.total_writes(), 0);
    }

    #[test]
    fn test_ctl_flags() {
        let ctl = GdpCtl::WAIT_NEXT_VSYNC | GdpCtl::from_bits_retain(0x05);
        assert!(ctl.contains(GdpCtl::WAIT_NEXT_VSYNC));
        assert_eq!(ctl.bits(), 0x8000_0005);
        assert_eq!(GdpPpt::IGNORE.bits(), 0b11);
    }
}
