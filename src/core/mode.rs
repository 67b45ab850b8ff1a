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

//! Display mode timings
//!
//! Only the fields the plane engine consumes are kept: visible area, the
//! sync positions the timing generator needs for line/pixel conversion, the
//! pixel clock and the interlace flag.

use serde::{Deserialize, Serialize};

/// A display mode, in the usual modeline terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMode {
    /// Pixel clock in kHz (0 = unknown, pixel clock left untouched)
    pub clock_khz: u32,

    pub hdisplay: u32,
    pub hsync_start: u32,
    pub htotal: u32,

    pub vdisplay: u32,
    pub vsync_start: u32,
    pub vtotal: u32,

    /// Interlaced scan: two fields per frame
    #[serde(default)]
    pub interlaced: bool,
}

impl DisplayMode {
    /// CEA 1920x1080 progressive, 60 Hz
    pub const fn cea_1080p60() -> Self {
        Self {
            clock_khz: 148_500,
            hdisplay: 1920,
            hsync_start: 2008,
            htotal: 2200,
            vdisplay: 1080,
            vsync_start: 1084,
            vtotal: 1125,
            interlaced: false,
        }
    }

    /// CEA 1920x1080 interlaced, 60 fields per second
    pub const fn cea_1080i60() -> Self {
        Self {
            clock_khz: 74_250,
            hdisplay: 1920,
            hsync_start: 2008,
            htotal: 2200,
            vdisplay: 1080,
            vsync_start: 1084,
            vtotal: 1125,
            interlaced: true,
        }
    }

    /// CEA 1280x720 progressive, 60 Hz
    pub const fn cea_720p60() -> Self {
        Self {
            clock_khz: 74_250,
            hdisplay: 1280,
            hsync_start: 1390,
            htotal: 1650,
            vdisplay: 720,
            vsync_start: 725,
            vtotal: 750,
            interlaced: false,
        }
    }

    /// Pixel clock in Hz
    pub fn clock_hz(&self) -> u64 {
        self.clock_khz as u64 * 1000
    }

    /// Basic sanity: non-empty visible area inside the totals
    pub fn is_valid(&self) -> bool {
        self.hdisplay > 0
            && self.vdisplay > 0
            && self.hdisplay <= self.hsync_start
            && self.hsync_start <= self.htotal
            && self.vdisplay <= self.vsync_start
            && self.vsync_start <= self.vtotal
    }
}

impl Default for DisplayMode {
    fn default() -> Self {
        Self::cea_1080p60()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cea_modes_are_valid() {
        assert!(DisplayMode::cea_1080p60().is_valid());
        assert!(DisplayMode::cea_1080i60().is_valid());
        assert!(DisplayMode::cea_720p60().is_valid());
        assert!(DisplayMode::cea_1080i60().interlaced);
    }

    #[test]
    fn test_clock_hz() {
        assert_eq!(DisplayMode::cea_1080p60().clock_hz(), 148_500_000);
    }

    #[test]
    fn test_invalid_mode() {
        let mode = DisplayMode {
            hsync_start: 100,
            ..DisplayMode::cea_720p60()
        };
        assert!(!mode.is_valid());
    }
}
