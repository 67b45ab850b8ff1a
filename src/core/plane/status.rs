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

//! Plane status
//!
//! ```text
//!             update                 disable
//!  Disabled ─────────▶ Updated ──────────────▶ Disabling
//!     ▲                   ▲  ◀────────────────     │
//!     │                   │       update           │ commit_disable
//!     │    field event    │                        ▼
//!     └──────────────────────────────────────── Flushing
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle state of a plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaneStatus {
    /// Nothing scanned out
    Disabled = 0,
    /// Scanning out the last committed request
    Updated = 1,
    /// Disable requested, not yet committed
    Disabling = 2,
    /// Disable committed, finalized on the next field event
    Flushing = 3,
}

impl PlaneStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaneStatus::Updated,
            2 => PlaneStatus::Disabling,
            3 => PlaneStatus::Flushing,
            _ => PlaneStatus::Disabled,
        }
    }
}

impl fmt::Display for PlaneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaneStatus::Disabled => "DISABLED",
            PlaneStatus::Updated => "UPDATED",
            PlaneStatus::Disabling => "DISABLING",
            PlaneStatus::Flushing => "FLUSHING",
        };
        f.write_str(name)
    }
}

/// Plane status shared between the control path and the field handler
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: PlaneStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    #[inline(always)]
    pub fn get(&self) -> PlaneStatus {
        PlaneStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub fn set(&self, status: PlaneStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; returns false if the status was not `from`
    pub fn transition(&self, from: PlaneStatus, to: PlaneStatus) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(PlaneStatus::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_cell_round_trip() {
        let cell = StatusCell::default();
        assert_eq!(cell.get(), PlaneStatus::Disabled);
        for status in [
            PlaneStatus::Updated,
            PlaneStatus::Disabling,
            PlaneStatus::Flushing,
            PlaneStatus::Disabled,
        ] {
            cell.set(status);
            assert_eq!(cell.get(), status);
        }
    }

    #[test]
    fn test_transition_requires_expected_state() {
        let cell = StatusCell::new(PlaneStatus::Updated);
        assert!(!cell.transition(PlaneStatus::Disabling, PlaneStatus::Flushing));
        assert_eq!(cell.get(), PlaneStatus::Updated);
        assert!(cell.transition(PlaneStatus::Updated, PlaneStatus::Disabling));
        assert_eq!(cell.get(), PlaneStatus::Disabling);
    }

    #[test]
    fn test_display() {
        assert_eq!(PlaneStatus::Flushing.to_string(), "FLUSHING");
    }
}
