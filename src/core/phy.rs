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

//! HDMI tx6g0c28 PHY
//!
//! Serializer and PLL setup for the HDMI output. The PLL input divider and
//! output divider are picked from the pixel clock band; source termination,
//! swing and pre-emphasis depend on the TMDS clock.
//!
//! ## PLL dividers
//!
//! ```text
//! Pixel clock       | IDF | ODF
//! ------------------|-----|--------
//! [  0.0,  37.5) MHz|  1  | /16
//! [ 37.5,  75.0) MHz|  2  | /8
//! [ 75.0, 150.0) MHz|  4  | /4
//! [150.0, 300.0) MHz|  8  | /2
//! [300.0, 600.0) MHz| 16  | /1
//! ```
//!
//! Assumes no pixel repetition and 24-bit color: the TMDS clock equals the
//! pixel clock.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::error::{GdpError, Result};
use super::hw::{MemoryRegisters, RegisterFile};
use super::mode::DisplayMode;

pub const HDMI_STA: u32 = 0x10;
pub const HDMI_SRZ_CFG: u32 = 0x504;
pub const HDMI_SRZ_PWR_CFG: u32 = 0x508;
pub const HDMI_SRZ_PLL_CFG: u32 = 0x510;
pub const HDMI_SRZ_STR_1: u32 = 0x518;
pub const HDMI_SRZ_STR_2: u32 = 0x51C;
pub const HDMI_SRZ_CALCODE_EXT: u32 = 0x530;
pub const HDMI_SRZ_TX_RSVR_BITS: u32 = 0x560;

/// Size of the HDMI register window
pub const HDMI_REGS_SIZE: u32 = 0x600;

/// PLL lock status in HDMI_STA
pub const HDMI_STA_DLL_LCK: u32 = 1 << 5;

pub const HDMI_SRZ_CFG_EN: u32 = 1 << 0;
pub const HDMI_SRZ_CFG_EXTERNAL_DATA: u32 = 1 << 16;
pub const HDMI_SRZ_CFG_RBIAS_EXT: u32 = 1 << 17;
pub const HDMI_SRZ_CFG_EN_SINK_TERM_DETECTION: u32 = 1 << 18;

const HDMI_SRZ_CFG_EN_SRC_TERM_SHIFT: u32 = 24;
const HDMI_SRZ_CFG_EN_SRC_TERM_VAL_165_340MHZ: u32 = 0x2;
const HDMI_SRZ_CFG_EN_SRC_TERM_VAL_ABV_340MHZ: u32 = 0x3;
const HDMI_SRZ_CFG_CKCH_LOWSW_EN_SHIFT: u32 = 29;
const HDMI_SRZ_CFG_CKBY10_OR_40_SHIFT: u32 = 30;

pub const HDMI_PLL_CFG_EN: u32 = 1 << 0;
const HDMI_PLL_CFG_NDIV_SHIFT: u32 = 8;
const HDMI_PLL_CFG_IDF_SHIFT: u32 = 16;
const HDMI_PLL_CFG_ODF_SHIFT: u32 = 24;
const HDMI_PLL_NDIV: u32 = 20;

const ODF_DIV_1: u32 = 0;
const ODF_DIV_2: u32 = 1;
const ODF_DIV_4: u32 = 2;
const ODF_DIV_8: u32 = 3;
const ODF_DIV_16: u32 = 4;

const fn genmask(high: u32, low: u32) -> u32 {
    ((!0u32) >> (31 - high)) & ((!0u32) << low)
}

const HDMI_SRZ_CONFIG_0_MASK: u32 =
    genmask(6, 4) | genmask(10, 8) | genmask(14, 12) | genmask(21, 20);
const HDMI_SRZ_CONFIG_1_MASK: u32 = genmask(11, 0) | genmask(27, 16);
const HDMI_SRZ_CONFIG_2_MASK: u32 = 0xFFF;
const HDMI_SRZ_CONFIG_3_MASK: u32 = genmask(27, 0);

const HDMI_SRZ_TX_RSVR_BITS_ABOVE_340MHZ: u32 = 0x0080_0000;

const STM_HDMI_THOLD_CLK_600MHZ: u32 = 600_000_000;
const STM_HDMI_THOLD_CLK_340MHZ: u32 = 340_000_000;
const STM_HDMI_THOLD_CLK_165MHZ: u32 = 165_000_000;

/// PLL lock timeout
pub const HDMI_TIMEOUT_PLL_LOCK: Duration = Duration::from_millis(50);

struct PllDividers {
    min: u32,
    max: u32,
    idf: u32,
    odf: u32,
}

const PLL_DIVIDERS: [PllDividers; 5] = [
    PllDividers {
        min: 0,
        max: 37_500_000,
        idf: 1,
        odf: ODF_DIV_16,
    },
    PllDividers {
        min: 37_500_000,
        max: 75_000_000,
        idf: 2,
        odf: ODF_DIV_8,
    },
    PllDividers {
        min: 75_000_000,
        max: 150_000_000,
        idf: 4,
        odf: ODF_DIV_4,
    },
    PllDividers {
        min: 150_000_000,
        max: 300_000_000,
        idf: 8,
        odf: ODF_DIV_2,
    },
    PllDividers {
        min: 300_000_000,
        max: 600_000_000,
        idf: 16,
        odf: ODF_DIV_1,
    },
];

struct PhyConfig {
    min_tmds: u32,
    max_tmds: u32,
    config: [u32; 4],
}

const PHY_CONFIG: [PhyConfig; 4] = [
    PhyConfig {
        min_tmds: 0,
        max_tmds: 145_000_000,
        config: [0x0, 0x0, 0x0, 0x0],
    },
    PhyConfig {
        min_tmds: 145_000_000,
        max_tmds: 165_000_000,
        config: [0x1110, 0x0, 0x0, 0x0],
    },
    PhyConfig {
        min_tmds: 165_000_000,
        max_tmds: 340_000_000,
        config: [0x1110, 0x30003, 0x3, 0x0],
    },
    PhyConfig {
        min_tmds: 340_000_000,
        max_tmds: 600_000_000,
        config: [0x200000, 0x0, 0x0, 0x0],
    },
];

/// Serializer register values for one pixel clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializerSetup {
    pub tmds_clock: u32,
    pub idf: u32,
    pub odf: u32,
    /// PLL configuration, enable bit excluded
    pub pll_cfg: u32,
    pub srz_cfg: u32,
    pub str1: u32,
    pub str2: u32,
    pub calcode: u32,
    pub tx_rsvr: u32,
    /// A tuning band matched; otherwise the serializer runs untuned and the
    /// PLL is not started
    pub tuned: bool,
}

/// Compute the serializer setup for a pixel clock in Hz
///
/// # Errors
///
/// - [`GdpError::TmdsClockUnsupported`] when no PLL divider band covers the
///   clock
/// - [`GdpError::TmdsClockOutOfRange`] above 600 MHz
pub fn serializer_setup(ckpxpll: u32) -> Result<SerializerSetup> {
    let dividers = PLL_DIVIDERS
        .iter()
        .find(|d| ckpxpll >= d.min && ckpxpll < d.max)
        .ok_or_else(|| {
            log::error!("input TMDS clock speed ({}) not supported", ckpxpll);
            GdpError::TmdsClockUnsupported(ckpxpll)
        })?;

    let tmdsck = ckpxpll;
    if tmdsck > STM_HDMI_THOLD_CLK_600MHZ {
        log::error!("output TMDS clock ({}) out of range", tmdsck);
        return Err(GdpError::TmdsClockOutOfRange(tmdsck));
    }

    let pll_cfg = HDMI_PLL_NDIV << HDMI_PLL_CFG_NDIV_SHIFT
        | dividers.idf << HDMI_PLL_CFG_IDF_SHIFT
        | dividers.odf << HDMI_PLL_CFG_ODF_SHIFT;

    // 10 bits per channel
    let mut srz_cfg = HDMI_SRZ_CFG_EN
        | HDMI_SRZ_CFG_EXTERNAL_DATA
        | HDMI_SRZ_CFG_RBIAS_EXT
        | HDMI_SRZ_CFG_EN_SINK_TERM_DETECTION;
    let mut tx_rsvr = 0;

    if tmdsck > STM_HDMI_THOLD_CLK_340MHZ {
        // 300 mV swing, clock divided by 40
        srz_cfg |= HDMI_SRZ_CFG_EN_SRC_TERM_VAL_ABV_340MHZ << HDMI_SRZ_CFG_EN_SRC_TERM_SHIFT
            | 1 << HDMI_SRZ_CFG_CKCH_LOWSW_EN_SHIFT
            | 1 << HDMI_SRZ_CFG_CKBY10_OR_40_SHIFT;
        tx_rsvr = HDMI_SRZ_TX_RSVR_BITS_ABOVE_340MHZ;
    } else if tmdsck > STM_HDMI_THOLD_CLK_165MHZ {
        srz_cfg |= HDMI_SRZ_CFG_EN_SRC_TERM_VAL_165_340MHZ << HDMI_SRZ_CFG_EN_SRC_TERM_SHIFT;
    }

    let setup = match PHY_CONFIG
        .iter()
        .find(|c| c.min_tmds <= tmdsck && c.max_tmds >= tmdsck)
    {
        Some(band) => SerializerSetup {
            tmds_clock: tmdsck,
            idf: dividers.idf,
            odf: dividers.odf,
            pll_cfg,
            srz_cfg: srz_cfg | (band.config[0] & HDMI_SRZ_CONFIG_0_MASK),
            str1: band.config[1] & HDMI_SRZ_CONFIG_1_MASK,
            str2: band.config[2] & HDMI_SRZ_CONFIG_2_MASK,
            calcode: band.config[3] & HDMI_SRZ_CONFIG_3_MASK,
            tx_rsvr,
            tuned: true,
        },
        // no pre-emphasis or output swing correction
        None => SerializerSetup {
            tmds_clock: tmdsck,
            idf: dividers.idf,
            odf: dividers.odf,
            pll_cfg,
            srz_cfg,
            str1: 0,
            str2: 0,
            calcode: 0,
            tx_rsvr: 0,
            tuned: false,
        },
    };
    Ok(setup)
}

/// Reset line of the PHY
pub trait ResetControl: Send + Sync {
    fn assert_reset(&self);
    fn deassert_reset(&self);
}

/// The tx6g0c28 PHY of one HDMI output
pub struct HdmiPhy {
    regs: Arc<dyn RegisterFile>,
    reset: Option<Arc<dyn ResetControl>>,
    lock_timeout: Duration,
}

impl HdmiPhy {
    pub fn new(regs: Arc<dyn RegisterFile>, reset: Option<Arc<dyn ResetControl>>) -> Self {
        Self {
            regs,
            reset,
            lock_timeout: HDMI_TIMEOUT_PLL_LOCK,
        }
    }

    fn locked(&self) -> bool {
        self.regs.read(HDMI_STA) & HDMI_STA_DLL_LCK != 0
    }

    /// Poll the lock flag until it equals `want` or the timeout expires
    fn wait_lock(&self, want: bool) -> bool {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            if self.locked() == want {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_micros(500));
        }
    }

    /// Configure the serializer and start the PLL for `mode`
    ///
    /// # Errors
    ///
    /// Clock range errors of [`serializer_setup`], and
    /// [`GdpError::PllNotLocked`] when the PLL does not lock within 50 ms.
    pub fn start(&self, mode: &DisplayMode) -> Result<SerializerSetup> {
        let ckpxpll = u32::try_from(mode.clock_hz()).unwrap_or(u32::MAX);
        log::debug!("hdmi phy start: ckpxpll = {}Hz", ckpxpll);

        let setup = serializer_setup(ckpxpll)?;

        self.regs.write(HDMI_SRZ_CFG, setup.srz_cfg);
        self.regs.write(HDMI_SRZ_PWR_CFG, 0);
        self.regs.write(HDMI_SRZ_STR_1, setup.str1);
        self.regs.write(HDMI_SRZ_STR_2, setup.str2);
        self.regs.write(HDMI_SRZ_CALCODE_EXT, setup.calcode);
        self.regs.write(HDMI_SRZ_TX_RSVR_BITS, setup.tx_rsvr);

        if !setup.tuned {
            return Ok(setup);
        }

        self.regs.write(HDMI_SRZ_PLL_CFG, setup.pll_cfg | HDMI_PLL_CFG_EN);
        if !self.wait_lock(true) {
            log::error!("hdmi phy pll not locked");
            return Err(GdpError::PllNotLocked(self.lock_timeout));
        }

        if let Some(reset) = &self.reset {
            reset.assert_reset();
            thread::sleep(Duration::from_micros(15));
            reset.deassert_reset();
        }

        log::info!(
            "hdmi phy started: tmds {}Hz idf {} odf {}",
            setup.tmds_clock,
            setup.idf,
            setup.odf
        );
        Ok(setup)
    }

    /// Power down the serializer and the PLL
    pub fn stop(&self) {
        self.regs
            .write(HDMI_SRZ_CFG, HDMI_SRZ_CFG_EN_SINK_TERM_DETECTION);
        self.regs.write(HDMI_SRZ_PLL_CFG, 0);

        if !self.wait_lock(false) {
            log::error!("hdmi phy pll not well disabled");
        }
    }

    #[cfg(test)]
    fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// HDMI register window whose PLL locks as soon as it is enabled
pub struct SoftHdmiRegisters {
    inner: MemoryRegisters,
}

impl SoftHdmiRegisters {
    pub fn new() -> Self {
        Self {
            inner: MemoryRegisters::new("HDMI", HDMI_REGS_SIZE),
        }
    }

    pub fn write_count(&self, offset: u32) -> u64 {
        self.inner.write_count(offset)
    }
}

impl Default for SoftHdmiRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile for SoftHdmiRegisters {
    fn read(&self, offset: u32) -> u32 {
        self.inner.read(offset)
    }

    fn write(&self, offset: u32, value: u32) {
        self.inner.write(offset, value);
        if offset == HDMI_SRZ_PLL_CFG {
            let sta = self.inner.read(HDMI_STA);
            let sta = if value & HDMI_PLL_CFG_EN != 0 {
                sta | HDMI_STA_DLL_LCK
            } else {
                sta & !HDMI_STA_DLL_LCK
            };
            self.inner.load(HDMI_STA, sta);
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
