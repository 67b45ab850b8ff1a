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

//! Field scheduler
//!
//! Decides how a freshly built bank reaches the hardware, and reacts to the
//! field events of the timing generator.
//!
//! ## Publication policy
//!
//! ```text
//! current bank | scan        | current field | action
//! -------------|-------------|---------------|---------------------------------
//! none         | any         | top           | NVN <- fresh bottom
//! none         | any         | bottom        | NVN <- fresh top
//! some         | progressive | any           | NVN <- fresh top
//! some         | interlaced  | top           | current bottom.NVN <- fresh top
//! some         | interlaced  | bottom        | NVN <- fresh top
//! ```
//!
//! While the top field of an interlaced frame is on screen the live
//! register is left alone: the new frame is linked behind the bottom field
//! so the hardware picks it up at the next frame boundary.

use std::sync::atomic::{AtomicBool, Ordering};

use super::hw::{GdpRegister, RegisterFile};
use super::node::NodePool;
use super::plane::{PlaneStatus, StatusCell};
use super::vtg::FieldParity;

/// How a bank was published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishAction {
    /// No bank was live: the address was written to the NVN register
    FirstCommit { written: u32 },
    /// The fresh top node address was written to the NVN register
    Direct { written: u32 },
    /// The fresh top node was linked behind the bottom node of `bank`
    Deferred { bank: usize, chained: u32 },
}

impl PublishAction {
    /// Whether the live NVN register was written
    pub fn wrote_register(&self) -> bool {
        !matches!(self, PublishAction::Deferred { .. })
    }
}

/// Field tracking and publication for one plane
#[derive(Debug)]
pub struct FieldScheduler {
    is_curr_top: AtomicBool,
    finalizing: AtomicBool,
}

impl FieldScheduler {
    pub fn new() -> Self {
        Self {
            is_curr_top: AtomicBool::new(false),
            finalizing: AtomicBool::new(false),
        }
    }

    /// Whether the field currently on screen is a top field
    #[inline(always)]
    pub fn is_current_field_top(&self) -> bool {
        self.is_curr_top.load(Ordering::Acquire)
    }

    /// Handle a field event
    ///
    /// A plane in `Flushing` is finalized first: `finalize` runs exactly
    /// once, then the status becomes `Disabled`. The field parity is then
    /// recorded. An unknown event is logged and leaves the parity as is.
    ///
    /// Never blocks.
    pub fn on_field_event<F>(
        &self,
        event: u32,
        status: &StatusCell,
        plane: &str,
        finalize: F,
    ) -> Option<FieldParity>
    where
        F: FnOnce(),
    {
        if status.get() == PlaneStatus::Flushing && !self.finalizing.swap(true, Ordering::AcqRel) {
            // the status may have been finalized between the load and the swap
            if status.get() == PlaneStatus::Flushing {
                log::debug!("Vsync event received => disable {}", plane);
                finalize();
                status.set(PlaneStatus::Disabled);
            }
            self.finalizing.store(false, Ordering::Release);
        }

        match FieldParity::try_from(event) {
            Ok(parity) => {
                self.is_curr_top
                    .store(parity == FieldParity::Top, Ordering::Release);
                Some(parity)
            }
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }

    /// Make bank `fresh` visible to the hardware
    ///
    /// The live bank is looked up from the NVN register right before the
    /// decision.
    pub fn publish(
        &self,
        pool: &NodePool,
        regs: &dyn RegisterFile,
        fresh: usize,
        interlaced: bool,
        plane: &str,
    ) -> PublishAction {
        let nvn = GdpRegister::Nvn.offset(pool.variant());
        let fresh_top = pool.bank(fresh).top().addr();
        let fresh_btm = pool.bank(fresh).bottom().addr();
        let curr_top = self.is_current_field_top();

        log::trace!("{}: current NVN 0x{:08X}", plane, regs.read(nvn));

        let Some(current) = pool.current_bank(regs, plane) else {
            log::debug!("{} first update (or invalid node)", plane);
            let written = if curr_top { fresh_btm } else { fresh_top };
            regs.write(nvn, written);
            return PublishAction::FirstCommit { written };
        };

        if interlaced && curr_top {
            // postpone until the bottom field has been displayed
            pool.bank(current)
                .bottom()
                .write(GdpRegister::Nvn, fresh_top);
            PublishAction::Deferred {
                bank: current,
                chained: fresh_top,
            }
        } else {
            regs.write(nvn, fresh_top);
            PublishAction::Direct { written: fresh_top }
        }
    }
}

impl Default for FieldScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hw::{GdpVariant, MemoryRegisters};
    use crate::core::node::LinearDmaAllocator;
    use crate::core::vtg::{VTG_BOTTOM_FIELD_EVENT, VTG_TOP_FIELD_EVENT};
    use std::cell::Cell;

    fn setup() -> (NodePool, MemoryRegisters) {
        let alloc = LinearDmaAllocator::new(0x4000_0000, 0x1_0000);
        (
            NodePool::new(GdpVariant::Gdp, &alloc).unwrap(),
            MemoryRegisters::gdp("GDP0"),
        )
    }

    fn nvn() -> u32 {
        GdpRegister::Nvn.offset(GdpVariant::Gdp)
    }

    #[test]
    fn test_parity_tracking() {
        let sched = FieldScheduler::new();
        let status = StatusCell::default();
        assert_eq!(
            sched.on_field_event(VTG_TOP_FIELD_EVENT, &status, "GDP0", || {}),
            Some(FieldParity::Top)
        );
        assert!(sched.is_current_field_top());
        sched.on_field_event(VTG_BOTTOM_FIELD_EVENT, &status, "GDP0", || {});
        assert!(!sched.is_current_field_top());
    }

    #[test]
    fn test_unknown_event_keeps_parity() {
        let sched = FieldScheduler::new();
        let status = StatusCell::default();
        sched.on_field_event(VTG_TOP_FIELD_EVENT, &status, "GDP0", || {});
        assert_eq!(sched.on_field_event(9, &status, "GDP0", || {}), None);
        assert!(sched.is_current_field_top());
    }

    #[test]
    fn test_finalize_runs_once() {
        let sched = FieldScheduler::new();
        let status = StatusCell::new(PlaneStatus::Flushing);
        let calls = Cell::new(0);

        for event in [1, 2, 1, 7] {
            sched.on_field_event(event, &status, "GDP0", || calls.set(calls.get() + 1));
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(status.get(), PlaneStatus::Disabled);
    }

    #[test]
    fn test_unknown_event_still_finalizes() {
        let sched = FieldScheduler::new();
        let status = StatusCell::new(PlaneStatus::Flushing);
        let calls = Cell::new(0);
        sched.on_field_event(0, &status, "GDP0", || calls.set(calls.get() + 1));
        assert_eq!(calls.get(), 1);
        assert_eq!(status.get(), PlaneStatus::Disabled);
    }

    #[test]
    fn test_other_states_never_finalize() {
        let sched = FieldScheduler::new();
        for state in [PlaneStatus::Updated, PlaneStatus::Disabling, PlaneStatus::Disabled] {
            let status = StatusCell::new(state);
            sched.on_field_event(1, &status, "GDP0", || panic!("finalized {}", state));
            assert_eq!(status.get(), state);
        }
    }

    #[test]
    fn test_first_commit_writes_register() {
        let (pool, regs) = setup();
        let sched = FieldScheduler::new();

        let action = sched.publish(&pool, &regs, 0, false, "GDP0");
        assert_eq!(
            action,
            PublishAction::FirstCommit {
                written: pool.bank(0).top().addr()
            }
        );
        assert_eq!(regs.read(nvn()), pool.bank(0).top().addr());
    }

    #[test]
    fn test_first_commit_during_top_field_targets_bottom() {
        let (pool, regs) = setup();
        let sched = FieldScheduler::new();
        sched.on_field_event(1, &StatusCell::default(), "GDP0", || {});

        let action = sched.publish(&pool, &regs, 0, true, "GDP0");
        assert_eq!(
            action,
            PublishAction::FirstCommit {
                written: pool.bank(0).bottom().addr()
            }
        );
    }

    #[test]
    fn test_progressive_writes_directly() {
        let (pool, regs) = setup();
        let sched = FieldScheduler::new();
        regs.load(nvn(), pool.bank(0).bottom().addr());
        sched.on_field_event(1, &StatusCell::default(), "GDP0", || {});

        let action = sched.publish(&pool, &regs, 1, false, "GDP0");
        assert!(action.wrote_register());
        assert_eq!(regs.read(nvn()), pool.bank(1).top().addr());
    }

    #[test]
    fn test_interlaced_top_field_defers() {
        let (pool, regs) = setup();
        let sched = FieldScheduler::new();
        regs.load(nvn(), pool.bank(0).bottom().addr());
        sched.on_field_event(1, &StatusCell::default(), "GDP0", || {});

        let action = sched.publish(&pool, &regs, 1, true, "GDP0");
        assert_eq!(
            action,
            PublishAction::Deferred {
                bank: 0,
                chained: pool.bank(1).top().addr()
            }
        );
        assert_eq!(regs.write_count(nvn()), 0);
        assert_eq!(regs.read(nvn()), pool.bank(0).bottom().addr());
        assert_eq!(
            pool.bank(0).bottom().read(GdpRegister::Nvn),
            pool.bank(1).top().addr()
        );
    }

    #[test]
    fn test_interlaced_bottom_field_writes_directly() {
        let (pool, regs) = setup();
        let sched = FieldScheduler::new();
        regs.load(nvn(), pool.bank(0).top().addr());
        sched.on_field_event(2, &StatusCell::default(), "GDP0", || {});

        let action = sched.publish(&pool, &regs, 1, true, "GDP0");
        assert_eq!(
            action,
            PublishAction::Direct {
                written: pool.bank(1).top().addr()
            }
        );
        assert_eq!(regs.write_count(nvn()), 1);
    }
}
