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

//! Scanout simulator
//!
//! Plays the part of the GDP fetch engine. At every field boundary the
//! hardware loads the node whose address sits in NVN into its live
//! registers; the NVN word of that node becomes the new NVN, so the
//! hardware keeps following the chain until software changes it.

use super::{GdpPpt, GdpRegister, MemoryRegisters, RegisterFile, GAM_GDP_MST_OFFSET};
use crate::core::node::{Field, NodePool};

/// Underflow flag in the MST register
const MST_UNDERFLOW: u32 = 1 << 0;

/// What the hardware fetched for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldScan {
    /// Bus address of the fetched node
    pub node: u32,
    /// Field the node belongs to within its bank
    pub field: Field,
    /// Bank slot of the node
    pub bank: usize,
    pub ctl: u32,
    pub pml: u32,
    pub size: u32,
    /// Node was marked ignored: nothing reaches the mixer
    pub ignored: bool,
}

/// Software model of the node fetch engine
#[derive(Debug, Default)]
pub struct ScanoutSimulator {
    history: Vec<FieldScan>,
    underflows: u64,
}

impl ScanoutSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the node for the next field
    ///
    /// Returns `None` when nothing is programmed (NVN is zero) or when NVN
    /// points outside the pool, in which case the underflow flag is raised.
    pub fn advance(&mut self, pool: &NodePool, regs: &MemoryRegisters) -> Option<FieldScan> {
        let variant = pool.variant();
        let nvn = regs.read(GdpRegister::Nvn.offset(variant));
        if nvn == 0 {
            return None;
        }

        let Some((bank, field, node)) = pool.node_at(nvn) else {
            log::warn!("{}: fetch from unknown node 0x{:08X}", regs.name(), nvn);
            let mst = regs.read(GAM_GDP_MST_OFFSET);
            regs.load(GAM_GDP_MST_OFFSET, mst | MST_UNDERFLOW);
            self.underflows += 1;
            return None;
        };

        for reg in GdpRegister::ALL {
            regs.load(reg.offset(variant), node.read(reg));
        }

        let scan = FieldScan {
            node: nvn,
            field,
            bank,
            ctl: node.read(GdpRegister::Ctl),
            pml: node.read(GdpRegister::Pml),
            size: node.read(GdpRegister::Size),
            ignored: GdpPpt::from_bits_retain(node.read(GdpRegister::Ppt))
                .contains(GdpPpt::IGNORE),
        };
        log::trace!(
            "{}: fetched {:?} node 0x{:08X} of bank {}",
            regs.name(),
            field,
            nvn,
            bank
        );
        self.history.push(scan);
        Some(scan)
    }

    /// Every field fetched so far, oldest first
    pub fn history(&self) -> &[FieldScan] {
        &self.history
    }

    /// Most recent fetch
    pub fn last(&self) -> Option<&FieldScan> {
        self.history.last()
    }

    pub fn underflows(&self) -> u64 {
        self.underflows
    }
}

/// Whether the MST register reports an underflow
pub fn underflow_flagged(regs: &dyn RegisterFile) -> bool {
    regs.read(GAM_GDP_MST_OFFSET) & MST_UNDERFLOW != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hw::GdpVariant;
    use crate::core::node::LinearDmaAllocator;

    fn setup() -> (NodePool, MemoryRegisters) {
        let alloc = LinearDmaAllocator::new(0x4000_0000, 0x1_0000);
        let pool = NodePool::new(GdpVariant::Gdp, &alloc).unwrap();
        (pool, MemoryRegisters::gdp("GDP0"))
    }

    fn chain(pool: &NodePool, slot: usize) {
        let bank = pool.bank(slot);
        bank.top().write(GdpRegister::Nvn, bank.bottom().addr());
        bank.bottom().write(GdpRegister::Nvn, bank.top().addr());
    }

    #[test]
    fn test_idle_when_nvn_is_zero() {
        let (pool, regs) = setup();
        let mut sim = ScanoutSimulator::new();
        assert!(sim.advance(&pool, &regs).is_none());
        assert!(sim.history().is_empty());
        assert!(!underflow_flagged(&regs));
    }

    #[test]
    fn test_follows_chain() {
        let (pool, regs) = setup();
        chain(&pool, 1);
        pool.bank(1).top().write(GdpRegister::Pml, 0x1000);
        pool.bank(1).bottom().write(GdpRegister::Pml, 0x2000);
        regs.load(GdpRegister::Nvn.offset(GdpVariant::Gdp), pool.bank(1).top().addr());

        let mut sim = ScanoutSimulator::new();
        let first = sim.advance(&pool, &regs).unwrap();
        assert_eq!(first.field, Field::Top);
        assert_eq!(first.bank, 1);
        assert_eq!(first.pml, 0x1000);

        let second = sim.advance(&pool, &regs).unwrap();
        assert_eq!(second.field, Field::Bottom);
        assert_eq!(second.pml, 0x2000);

        let third = sim.advance(&pool, &regs).unwrap();
        assert_eq!(third.node, pool.bank(1).top().addr());
        assert_eq!(sim.history().len(), 3);
    }

    #[test]
    fn test_fetch_loads_live_registers_without_counting_writes() {
        let (pool, regs) = setup();
        chain(&pool, 0);
        pool.bank(0).top().write(GdpRegister::Ctl, 0x8000_0002);
        regs.load(GdpRegister::Nvn.offset(GdpVariant::Gdp), pool.bank(0).top().addr());

        ScanoutSimulator::new().advance(&pool, &regs).unwrap();
        assert_eq!(regs.read(GdpRegister::Ctl.offset(GdpVariant::Gdp)), 0x8000_0002);
        assert_eq!(
            regs.read(GdpRegister::Nvn.offset(GdpVariant::Gdp)),
            pool.bank(0).bottom().addr()
        );
        assert_eq!(regs.total_writes(), 0);
    }

    #[test]
    fn test_unknown_node_raises_underflow() {
        let (pool, regs) = setup();
        regs.load(GdpRegister::Nvn.offset(GdpVariant::Gdp), 0xDEAD_0000);

        let mut sim = ScanoutSimulator::new();
        assert!(sim.advance(&pool, &regs).is_none());
        assert!(underflow_flagged(&regs));
        assert_eq!(sim.underflows(), 1);
    }

    #[test]
    fn test_ignored_node_is_reported() {
        let (pool, regs) = setup();
        chain(&pool, 0);
        pool.mark_all_ignored();
        regs.load(GdpRegister::Nvn.offset(GdpVariant::Gdp), pool.bank(0).bottom().addr());

        let scan = ScanoutSimulator::new().advance(&pool, &regs).unwrap();
        assert!(scan.ignored);
        assert_eq!(scan.field, Field::Bottom);
    }
}
