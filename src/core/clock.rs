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

//! Plane pixel clock
//!
//! Each plane may own a pixel clock. Its parent depends on the mixer the
//! plane is routed to, and its rate follows the display mode. A plane with
//! no clock simply skips every clock operation.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::error::{GdpError, Result};
use super::mixer::MixerId;
use super::mode::DisplayMode;

/// Clock framework operations used by a plane
pub trait ClockControl: Send + Sync {
    fn set_parent(&self, parent: &str) -> std::result::Result<(), String>;
    fn set_rate(&self, rate: u64) -> std::result::Result<(), String>;
    fn prepare_enable(&self) -> std::result::Result<(), String>;
    fn disable_unprepare(&self);
}

/// Pixel clock of one plane
pub struct PixelClock {
    plane: String,
    clock: Option<Arc<dyn ClockControl>>,
    main_parent: Option<String>,
    aux_parent: Option<String>,
}

impl PixelClock {
    pub fn new(
        plane: impl Into<String>,
        clock: Option<Arc<dyn ClockControl>>,
        main_parent: Option<String>,
        aux_parent: Option<String>,
    ) -> Self {
        let plane = plane.into();
        if clock.is_none() {
            log::debug!("{}: no pixel clock", plane);
        }
        Self {
            plane,
            clock,
            main_parent,
            aux_parent,
        }
    }

    /// A plane without pixel clock
    pub fn none(plane: impl Into<String>) -> Self {
        Self::new(plane, None, None, None)
    }

    pub fn is_present(&self) -> bool {
        self.clock.is_some()
    }

    /// Select the parent for `mixer` and program the mode rate
    ///
    /// Does nothing for a mode without clock or a plane without pixel clock.
    /// A parent that cannot be selected is only logged; a refused rate fails.
    pub fn configure(&self, mixer: MixerId, mode: &DisplayMode) -> Result<()> {
        let Some(clock) = &self.clock else {
            return Ok(());
        };
        if mode.clock_khz == 0 {
            return Ok(());
        }

        let parent = match mixer {
            MixerId::Main => self.main_parent.as_deref(),
            MixerId::Aux => self.aux_parent.as_deref(),
        };
        if let Some(parent) = parent {
            if let Err(e) = clock.set_parent(parent) {
                log::warn!("{}: cannot set parent {}: {}", self.plane, parent, e);
            }
        }

        let rate = mode.clock_hz();
        clock.set_rate(rate).map_err(|e| {
            log::error!("Cannot set rate ({}Hz) for {}: {}", rate, self.plane, e);
            GdpError::ClockRate {
                plane: self.plane.clone(),
                rate,
            }
        })
    }

    /// Prepare and enable the clock; a failure is logged
    pub fn enable(&self) {
        if let Some(clock) = &self.clock {
            if let Err(e) = clock.prepare_enable() {
                log::error!("{}: cannot enable pixel clock: {}", self.plane, e);
            }
        }
    }

    pub fn disable(&self) {
        if let Some(clock) = &self.clock {
            clock.disable_unprepare();
        }
    }
}

/// In-memory clock recording every operation
#[derive(Debug)]
pub struct SoftClock {
    max_rate: u64,
    rate: AtomicU64,
    parent: Mutex<Option<String>>,
    enable_count: AtomicU32,
}

impl SoftClock {
    /// A clock accepting rates up to `max_rate` Hz
    pub fn new(max_rate: u64) -> Self {
        Self {
            max_rate,
            rate: AtomicU64::new(0),
            parent: Mutex::new(None),
            enable_count: AtomicU32::new(0),
        }
    }

    pub fn rate(&self) -> u64 {
        self.rate.load(Ordering::Acquire)
    }

    pub fn parent(&self) -> Option<String> {
        self.parent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn enable_count(&self) -> u32 {
        self.enable_count.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        self.enable_count() > 0
    }
}

impl ClockControl for SoftClock {
    fn set_parent(&self, parent: &str) -> std::result::Result<(), String> {
        *self
            .parent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(parent.to_string());
        Ok(())
    }

    fn set_rate(&self, rate: u64) -> std::result::Result<(), String> {
        if rate > self.max_rate {
            return Err(format!("rate {} above maximum {}", rate, self.max_rate));
        }
        self.rate.store(rate, Ordering::Release);
        Ok(())
    }

    fn prepare_enable(&self) -> std::result::Result<(), String> {
        self.enable_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn disable_unprepare(&self) {
        // saturating: an unbalanced disable leaves the count at zero
        let _ = self
            .enable_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}
