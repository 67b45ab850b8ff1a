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

//! Compositor mixer
//!
//! The mixer blends the enabled planes over a background color inside the
//! active video area. Only the parts the plane engine needs are modeled:
//! background color and area, active video area and the per-plane enable
//! mask in CTL.
//!
//! ## Registers
//!
//! ```text
//! Register | Offset | Description
//! ---------|--------|-------------------------------------
//! CTL      | 0x00   | Enable mask (background, planes)
//! BKC      | 0x04   | Background color 0xRRGGBB
//! BCO      | 0x0C   | Background offset  (ydo << 16 | xdo)
//! BCS      | 0x10   | Background stop    (yds << 16 | xds)
//! AVO      | 0x28   | Active video offset
//! AVS      | 0x2C   | Active video stop
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::hw::RegisterFile;
use super::mode::DisplayMode;
use super::plane::PlaneId;
use super::vtg::TimingGenerator;

pub const GAM_MIXER_CTL: u32 = 0x00;
pub const GAM_MIXER_BKC: u32 = 0x04;
pub const GAM_MIXER_BCO: u32 = 0x0C;
pub const GAM_MIXER_BCS: u32 = 0x10;
pub const GAM_MIXER_AVO: u32 = 0x28;
pub const GAM_MIXER_AVS: u32 = 0x2C;

/// Size of the mixer register window
pub const GAM_MIXER_REGS_SIZE: u32 = 0x40;

/// Background enable bit in CTL
pub const GAM_CTL_BACK_MASK: u32 = 1 << 0;

/// Mixer instance, also used to name the output (CRTC) it drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixerId {
    #[default]
    Main,
    Aux,
}

impl MixerId {
    pub fn index(self) -> usize {
        match self {
            MixerId::Main => 0,
            MixerId::Aux => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MixerId::Main => "MAIN_MIXER",
            MixerId::Aux => "AUX_MIXER",
        }
    }
}

/// Per-instance mixer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Background color 0xRRGGBB
    pub background_color: u32,
}

/// Enable bit of a plane in the mixer CTL register
pub fn plane_mask(plane: PlaneId) -> u32 {
    match plane {
        PlaneId::Gdp0 => 1 << 3,
        PlaneId::Gdp1 => 1 << 4,
        PlaneId::Gdp2 => 1 << 5,
        PlaneId::Gdp3 => 1 << 6,
        PlaneId::Gdp4 => 1 << 7,
        PlaneId::Gdp5 => 1 << 8,
    }
}

/// One mixer instance
pub struct Mixer {
    id: MixerId,
    regs: Arc<dyn RegisterFile>,
    config: MixerConfig,
}

impl Mixer {
    pub fn new(id: MixerId, regs: Arc<dyn RegisterFile>, config: MixerConfig) -> Self {
        log::debug!("{} created", id.name());
        Self { id, regs, config }
    }

    pub fn id(&self) -> MixerId {
        self.id
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Turn the background layer on or off
    pub fn set_background_status(&self, enable: bool) {
        let mut val = self.regs.read(GAM_MIXER_CTL);
        val &= !GAM_CTL_BACK_MASK;
        if enable {
            val |= GAM_CTL_BACK_MASK;
        }
        self.regs.write(GAM_MIXER_CTL, val);
    }

    fn area(mode: &DisplayMode, vtg: &dyn TimingGenerator) -> (u32, u32) {
        let ydo = vtg.line_number(mode, 0);
        let yds = vtg.line_number(mode, mode.vdisplay.saturating_sub(1));
        let xdo = vtg.pixel_number(mode, 0);
        let xds = vtg.pixel_number(mode, mode.hdisplay.saturating_sub(1));
        (ydo << 16 | xdo, yds << 16 | xds)
    }

    /// Program the active video area for `mode`
    ///
    /// Also programs the background color and area from the instance
    /// configuration and enables the background.
    pub fn active_video_area(&self, mode: &DisplayMode, vtg: &dyn TimingGenerator) {
        let (offset, stop) = Self::area(mode, vtg);
        log::debug!(
            "{} active video area xdo:{} ydo:{} xds:{} yds:{}",
            self.id.name(),
            offset & 0xFFFF,
            offset >> 16,
            stop & 0xFFFF,
            stop >> 16
        );
        self.regs.write(GAM_MIXER_AVO, offset);
        self.regs.write(GAM_MIXER_AVS, stop);

        self.regs.write(GAM_MIXER_BKC, self.config.background_color);

        // background covers the full active area
        self.regs.write(GAM_MIXER_BCO, offset);
        self.regs.write(GAM_MIXER_BCS, stop);
        self.set_background_status(true);
    }

    /// Enable or disable a plane on this mixer
    pub fn set_plane_status(&self, plane: PlaneId, enable: bool) {
        log::debug!(
            "{} {} {}",
            if enable { "enable" } else { "disable" },
            self.id.name(),
            plane.name()
        );
        let mask = plane_mask(plane);
        let mut val = self.regs.read(GAM_MIXER_CTL);
        val &= !mask;
        if enable {
            val |= mask;
        }
        self.regs.write(GAM_MIXER_CTL, val);
    }

    /// Whether a plane is enabled in CTL
    pub fn plane_enabled(&self, plane: PlaneId) -> bool {
        self.regs.read(GAM_MIXER_CTL) & plane_mask(plane) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hw::MemoryRegisters;
    use crate::core::vtg::SoftVtg;

    fn mixer(color: u32) -> (Mixer, Arc<MemoryRegisters>) {
        let regs = Arc::new(MemoryRegisters::new("MAIN_MIXER", GAM_MIXER_REGS_SIZE));
        let mixer = Mixer::new(
            MixerId::Main,
            regs.clone(),
            MixerConfig {
                background_color: color,
            },
        );
        (mixer, regs)
    }

    #[test]
    fn test_active_video_area_1080p() {
        let (mixer, regs) = mixer(0x00FF_0000);
        mixer.active_video_area(&DisplayMode::cea_1080p60(), &SoftVtg::new());

        // line 42, pixel 192 / line 42+1079, pixel 192+1919
        assert_eq!(regs.read(GAM_MIXER_AVO), 42 << 16 | 192);
        assert_eq!(regs.read(GAM_MIXER_AVS), 1121 << 16 | 2111);
        assert_eq!(regs.read(GAM_MIXER_BCO), regs.read(GAM_MIXER_AVO));
        assert_eq!(regs.read(GAM_MIXER_BCS), regs.read(GAM_MIXER_AVS));
        assert_eq!(regs.read(GAM_MIXER_BKC), 0x00FF_0000);
        assert_eq!(regs.read(GAM_MIXER_CTL) & GAM_CTL_BACK_MASK, 1);
    }

    #[test]
    fn test_background_color_is_per_instance() {
        let (a, regs_a) = mixer(0x0000_00FF);
        let (b, regs_b) = mixer(0x0000_FF00);
        let vtg = SoftVtg::new();
        a.active_video_area(&DisplayMode::cea_720p60(), &vtg);
        b.active_video_area(&DisplayMode::cea_720p60(), &vtg);
        assert_eq!(regs_a.read(GAM_MIXER_BKC), 0x0000_00FF);
        assert_eq!(regs_b.read(GAM_MIXER_BKC), 0x0000_FF00);
    }

    #[test]
    fn test_plane_status_mask() {
        let (mixer, regs) = mixer(0);
        mixer.set_background_status(true);
        mixer.set_plane_status(PlaneId::Gdp2, true);
        assert_eq!(regs.read(GAM_MIXER_CTL), GAM_CTL_BACK_MASK | 1 << 5);
        assert!(mixer.plane_enabled(PlaneId::Gdp2));

        mixer.set_plane_status(PlaneId::Gdp2, false);
        assert!(!mixer.plane_enabled(PlaneId::Gdp2));
        assert_eq!(regs.read(GAM_MIXER_CTL), GAM_CTL_BACK_MASK);
    }

    #[test]
    fn test_plane_masks() {
        assert_eq!(plane_mask(PlaneId::Gdp0), 0x08);
        assert_eq!(plane_mask(PlaneId::Gdp5), 0x100);
    }

    #[test]
    fn test_names() {
        assert_eq!(MixerId::Main.name(), "MAIN_MIXER");
        assert_eq!(MixerId::Aux.index(), 1);
    }
}
