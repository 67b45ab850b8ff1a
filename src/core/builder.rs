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

//! Node builder
//!
//! Turns an update request into the register image of a top/bottom node
//! pair. Building is split in two steps so that a request can be fully
//! validated before any node word changes:
//!
//! 1. [`prepare`] computes a [`NodeLayout`] (pure, may fail)
//! 2. [`write`] stores the layout into a free bank (cannot fail)
//!
//! The GDP cannot scale. When source and destination sizes differ, the
//! smaller one wins on each axis:
//!
//! ```text
//! dst == src  ->  exact
//! dst <  src  ->  crop   (source is cut to the destination size)
//! dst >  src  ->  clamp  (destination shrinks to the source size)
//! ```

use super::error::{GdpError, Result};
use super::format::{hw_format_name, map_format, FormatInfo};
use super::hw::{
    GdpCtl, GdpPpt, GdpRegister, GAM_GDP_AGC_FULL_RANGE, GAM_GDP_SIZE_MAX_HEIGHT,
    GAM_GDP_SIZE_MAX_WIDTH,
};
use super::node::NodeBank;
use super::request::{BufferObject, UpdateRequest};
use super::vtg::TimingGenerator;

/// How one axis of the destination relates to the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalePolicy {
    Exact,
    Crop,
    Clamp,
}

impl ScalePolicy {
    pub fn select(dst: u32, src: u32) -> Self {
        match dst.cmp(&src) {
            std::cmp::Ordering::Equal => ScalePolicy::Exact,
            std::cmp::Ordering::Less => ScalePolicy::Crop,
            std::cmp::Ordering::Greater => ScalePolicy::Clamp,
        }
    }

    /// Displayed size on this axis
    pub fn apply(self, dst: u32, src: u32) -> u32 {
        match self {
            ScalePolicy::Exact | ScalePolicy::Crop => dst,
            ScalePolicy::Clamp => src,
        }
    }
}

/// Rectangles after clamping to the mode and to the GDP limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub src_x: u32,
    pub src_y: u32,
    pub src_w: u32,
    pub src_h: u32,
    pub dst_x: u32,
    pub dst_y: u32,
    pub dst_w: u32,
    pub dst_h: u32,
}

impl Geometry {
    /// Clamp the request rectangles
    ///
    /// The destination is cut at the right and bottom edges of the mode; the
    /// source is converted from 16.16 and limited to 3840x2160.
    pub fn clamped(req: &UpdateRequest) -> Self {
        let mode = &req.mode;
        Self {
            src_x: req.src.x >> 16,
            src_y: req.src.y >> 16,
            src_w: (req.src.w >> 16).min(GAM_GDP_SIZE_MAX_WIDTH),
            src_h: (req.src.h >> 16).min(GAM_GDP_SIZE_MAX_HEIGHT),
            dst_x: req.dst.x,
            dst_y: req.dst.y,
            dst_w: req.dst.w.min(mode.hdisplay.saturating_sub(req.dst.x)),
            dst_h: req.dst.h.min(mode.vdisplay.saturating_sub(req.dst.y)),
        }
    }
}

/// Register values of a node pair, ready to be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    pub format: FormatInfo,
    pub geometry: Geometry,
    pub policy_w: ScalePolicy,
    pub policy_h: ScalePolicy,
    /// Displayed width and height
    pub width: u32,
    pub height: u32,

    pub ctl: u32,
    pub agc: u32,
    pub pml: u32,
    pub pmp: u32,
    pub vpo: u32,
    pub vps: u32,
    pub size: u32,

    /// Bottom field starts one line below the top field
    pub interlaced: bool,
}

impl NodeLayout {
    /// PML of the bottom-field node
    pub fn bottom_pml(&self) -> u32 {
        if self.interlaced {
            self.pml.wrapping_add(self.pmp)
        } else {
            self.pml
        }
    }
}

fn log_policy(plane: &str, axis: &str, policy: ScalePolicy) {
    match policy {
        ScalePolicy::Exact => {}
        ScalePolicy::Crop => {
            log::debug!("{}: GDP scale not supported on {}, will crop", plane, axis)
        }
        ScalePolicy::Clamp => {
            log::debug!("{}: GDP scale not supported on {}, will clamp", plane, axis)
        }
    }
}

/// Check the parts of a request that make it unbuildable
///
/// Returns the format description and the buffer object.
pub fn validate(req: &UpdateRequest) -> Result<(FormatInfo, BufferObject)> {
    let format = map_format(req.fourcc).inspect_err(|e| log::error!("{}", e))?;
    let buffer = req.buffer.ok_or_else(|| {
        log::error!("Can't get DMA buffer object for fb");
        GdpError::MissingBuffer
    })?;
    Ok((format, buffer))
}

/// Compute the node layout for `req`
///
/// # Errors
///
/// - [`GdpError::UnsupportedFormat`] for a fourcc the GDP cannot fetch
/// - [`GdpError::MissingBuffer`] when no buffer object backs the framebuffer
/// - [`GdpError::EmptyDestination`] when nothing is left to display
pub fn prepare(req: &UpdateRequest, vtg: &dyn TimingGenerator, plane: &str) -> Result<NodeLayout> {
    let (format, buffer) = validate(req)?;
    let geometry = Geometry::clamped(req);

    let policy_w = ScalePolicy::select(geometry.dst_w, geometry.src_w);
    let policy_h = ScalePolicy::select(geometry.dst_h, geometry.src_h);
    let width = policy_w.apply(geometry.dst_w, geometry.src_w);
    let height = policy_h.apply(geometry.dst_h, geometry.src_h);

    if width == 0 || height == 0 {
        log::error!(
            "{}: empty destination {}x{}@({},{})",
            plane,
            width,
            height,
            geometry.dst_x,
            geometry.dst_y
        );
        return Err(GdpError::EmptyDestination {
            x: geometry.dst_x,
            y: geometry.dst_y,
            width,
            height,
        });
    }
    log_policy(plane, "width", policy_w);
    log_policy(plane, "height", policy_h);

    let mode = &req.mode;
    let ydo = vtg.line_number(mode, geometry.dst_y);
    let yds = vtg.line_number(mode, geometry.dst_y + height - 1);
    let xdo = vtg.pixel_number(mode, geometry.dst_x);
    let xds = vtg.pixel_number(mode, geometry.dst_x + width - 1);

    let pml = buffer
        .dma_addr
        .wrapping_add(buffer.offset)
        .wrapping_add(geometry.src_x.wrapping_mul(format.bytes_per_pixel))
        .wrapping_add(geometry.src_y.wrapping_mul(buffer.pitch));

    let ctl = GdpCtl::WAIT_NEXT_VSYNC.bits() | format.hw_code | format.alpha_range;

    log::debug!(
        "{} {} dst=({}x{})@({},{}) - src=({}x{})@({},{})",
        plane,
        hw_format_name(ctl),
        width,
        height,
        geometry.dst_x,
        geometry.dst_y,
        geometry.src_w,
        geometry.src_h,
        geometry.src_x,
        geometry.src_y
    );

    Ok(NodeLayout {
        format,
        geometry,
        policy_w,
        policy_h,
        width,
        height,
        ctl,
        agc: GAM_GDP_AGC_FULL_RANGE,
        pml,
        pmp: buffer.pitch,
        vpo: ydo << 16 | xdo,
        vps: yds << 16 | xds,
        size: height << 16 | width,
        interlaced: mode.interlaced,
    })
}

/// Store `layout` into both nodes of `bank` and chain them
///
/// The bank must not be read by the hardware.
pub fn write(bank: &NodeBank, layout: &NodeLayout) {
    let top = bank.top();
    let btm = bank.bottom();

    top.write(GdpRegister::Agc, layout.agc);
    top.write(GdpRegister::Ctl, layout.ctl);
    top.clear_bits(GdpRegister::Ppt, GdpPpt::IGNORE.bits());
    top.write(GdpRegister::Pml, layout.pml);
    top.write(GdpRegister::Vpo, layout.vpo);
    top.write(GdpRegister::Vps, layout.vps);
    top.write(GdpRegister::Pmp, layout.pmp);
    top.write(GdpRegister::Size, layout.size);

    // same content and chained together
    btm.copy_from(top);
    top.write(GdpRegister::Nvn, btm.addr());
    btm.write(GdpRegister::Nvn, top.addr());

    if layout.interlaced {
        btm.write(GdpRegister::Pml, layout.bottom_pml());
    }
}

/// Prepare and write in one go
pub fn build(
    bank: &NodeBank,
    req: &UpdateRequest,
    vtg: &dyn TimingGenerator,
    plane: &str,
) -> Result<NodeLayout> {
    let layout = prepare(req, vtg, plane)?;
    write(bank, &layout);
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::{drm_fourcc, gdp_format};
    use crate::core::hw::{GdpVariant, GAM_GDP_ALPHARANGE_255};
    use crate::core::mixer::MixerId;
    use crate::core::mode::DisplayMode;
    use crate::core::node::{LinearDmaAllocator, NodePool};
    use crate::core::request::{DestRect, SourceRect};
    use crate::core::vtg::SoftVtg;
    use proptest::prelude::*;

    const FB_ADDR: u32 = 0x8000_0000;

    fn pool() -> NodePool {
        let alloc = LinearDmaAllocator::new(0x4000_0000, 0x1_0000);
        NodePool::new(GdpVariant::Gdp, &alloc).unwrap()
    }

    fn request(mode: DisplayMode) -> UpdateRequest {
        UpdateRequest {
            fourcc: drm_fourcc::XRGB8888,
            src: SourceRect::from_pixels(0, 0, mode.hdisplay, mode.vdisplay),
            dst: DestRect::new(0, 0, mode.hdisplay, mode.vdisplay),
            buffer: Some(BufferObject {
                dma_addr: FB_ADDR,
                offset: 0,
                pitch: mode.hdisplay * 4,
            }),
            mixer: MixerId::Main,
            mode,
        }
    }

    #[test]
    fn test_full_screen_1080p() {
        let vtg = SoftVtg::new();
        let layout = prepare(&request(DisplayMode::cea_1080p60()), &vtg, "GDP0").unwrap();

        assert_eq!(layout.format.hw_code, gdp_format::RGB888_32);
        assert_eq!(layout.ctl, GdpCtl::WAIT_NEXT_VSYNC.bits() | gdp_format::RGB888_32);
        assert_eq!(layout.ctl & GAM_GDP_ALPHARANGE_255, 0);
        assert_eq!(layout.policy_w, ScalePolicy::Exact);
        assert_eq!(layout.policy_h, ScalePolicy::Exact);
        assert_eq!(layout.agc, GAM_GDP_AGC_FULL_RANGE);
        assert_eq!(layout.pml, FB_ADDR);
        assert_eq!(layout.pmp, 7680);
        assert_eq!(layout.size, 1080 << 16 | 1920);
        assert_eq!(layout.vpo, 42 << 16 | 192);
        assert_eq!(layout.vps, (42 + 1079) << 16 | (192 + 1919));
    }

    #[test]
    fn test_pml_includes_offset_and_source_origin() {
        let mut req = request(DisplayMode::cea_720p60());
        req.src = SourceRect::from_pixels(10, 20, 640, 360);
        req.dst = DestRect::new(0, 0, 640, 360);
        req.buffer = Some(BufferObject {
            dma_addr: FB_ADDR,
            offset: 0x100,
            pitch: 5120,
        });

        let layout = prepare(&req, &SoftVtg::new(), "GDP0").unwrap();
        assert_eq!(layout.pml, FB_ADDR + 0x100 + 10 * 4 + 20 * 5120);
    }

    #[test]
    fn test_alpha_format_sets_alpha_range() {
        let mut req = request(DisplayMode::cea_720p60());
        req.fourcc = drm_fourcc::ARGB8888;
        let layout = prepare(&req, &SoftVtg::new(), "GDP0").unwrap();
        assert_ne!(layout.ctl & GAM_GDP_ALPHARANGE_255, 0);
    }

    #[test]
    fn test_destination_clamped_to_mode() {
        let mut req = request(DisplayMode::cea_720p60());
        req.dst = DestRect::new(1000, 600, 1280, 720);
        let layout = prepare(&req, &SoftVtg::new(), "GDP0").unwrap();

        assert_eq!(layout.geometry.dst_w, 280);
        assert_eq!(layout.geometry.dst_h, 120);
        assert_eq!(layout.policy_w, ScalePolicy::Crop);
        assert_eq!(layout.size, 120 << 16 | 280);
    }

    #[test]
    fn test_small_source_clamps_destination() {
        let mut req = request(DisplayMode::cea_1080p60());
        req.src = SourceRect::from_pixels(0, 0, 320, 240);
        let layout = prepare(&req, &SoftVtg::new(), "GDP0").unwrap();

        assert_eq!(layout.policy_w, ScalePolicy::Clamp);
        assert_eq!(layout.policy_h, ScalePolicy::Clamp);
        assert_eq!(layout.size, 240 << 16 | 320);
        assert_eq!(layout.vps, (42 + 239) << 16 | (192 + 319));
    }

    #[test]
    fn test_source_limited_to_gdp_maximum() {
        let mut req = request(DisplayMode::cea_1080p60());
        req.src = SourceRect::from_pixels(0, 0, 5000, 3000);
        let geometry = Geometry::clamped(&req);
        assert_eq!(geometry.src_w, GAM_GDP_SIZE_MAX_WIDTH);
        assert_eq!(geometry.src_h, GAM_GDP_SIZE_MAX_HEIGHT);
    }

    #[test]
    fn test_destination_outside_mode_is_empty() {
        let mut req = request(DisplayMode::cea_720p60());
        req.dst = DestRect::new(1280, 0, 100, 100);
        assert!(matches!(
            prepare(&req, &SoftVtg::new(), "GDP0"),
            Err(GdpError::EmptyDestination { width: 0, .. })
        ));
    }

    #[test]
    fn test_empty_source_is_rejected() {
        let mut req = request(DisplayMode::cea_720p60());
        req.src = SourceRect::from_pixels(0, 0, 0, 720);
        assert!(matches!(
            prepare(&req, &SoftVtg::new(), "GDP0"),
            Err(GdpError::EmptyDestination { .. })
        ));
    }

    #[test]
    fn test_unsupported_format_and_missing_buffer() {
        let vtg = SoftVtg::new();
        let mut req = request(DisplayMode::cea_720p60());
        req.fourcc = crate::core::format::fourcc(b'N', b'V', b'1', b'2');
        assert!(matches!(
            prepare(&req, &vtg, "GDP0"),
            Err(GdpError::UnsupportedFormat(_))
        ));

        let mut req = request(DisplayMode::cea_720p60());
        req.buffer = None;
        assert!(matches!(
            prepare(&req, &vtg, "GDP0"),
            Err(GdpError::MissingBuffer)
        ));
    }

    #[test]
    fn test_write_chains_progressive_nodes() {
        let pool = pool();
        pool.mark_all_ignored();
        let bank = pool.bank(1);
        let layout = build(bank, &request(DisplayMode::cea_720p60()), &SoftVtg::new(), "GDP0")
            .unwrap();

        assert_eq!(bank.top().read(GdpRegister::Nvn), bank.bottom().addr());
        assert_eq!(bank.bottom().read(GdpRegister::Nvn), bank.top().addr());
        assert!(!bank.top().is_ignored());
        assert!(!bank.bottom().is_ignored());
        assert_eq!(bank.bottom().read(GdpRegister::Pml), layout.pml);
        assert_eq!(bank.bottom().read(GdpRegister::Size), layout.size);
    }

    #[test]
    fn test_interlaced_bottom_starts_one_line_lower() {
        let pool = pool();
        let bank = pool.bank(0);
        let layout = build(bank, &request(DisplayMode::cea_1080i60()), &SoftVtg::new(), "GDP0")
            .unwrap();

        assert_eq!(bank.top().read(GdpRegister::Pml), FB_ADDR);
        assert_eq!(bank.bottom().read(GdpRegister::Pml), FB_ADDR + 7680);
        assert_eq!(layout.vpo >> 16, 84);
    }

    #[test]
    fn test_scale_policy() {
        assert_eq!(ScalePolicy::select(10, 10), ScalePolicy::Exact);
        assert_eq!(ScalePolicy::select(5, 10), ScalePolicy::Crop);
        assert_eq!(ScalePolicy::select(20, 10), ScalePolicy::Clamp);
        assert_eq!(ScalePolicy::Clamp.apply(20, 10), 10);
        assert_eq!(ScalePolicy::Crop.apply(5, 10), 5);
    }

    proptest! {
        #[test]
        fn prop_displayed_size_is_min_of_source_and_destination(
            src_w in 1u32..=GAM_GDP_SIZE_MAX_WIDTH,
            src_h in 1u32..=GAM_GDP_SIZE_MAX_HEIGHT,
            dst_w in 1u32..=1920,
            dst_h in 1u32..=1080,
        ) {
            let mut req = request(DisplayMode::cea_1080p60());
            req.src = SourceRect::from_pixels(0, 0, src_w, src_h);
            req.dst = DestRect::new(0, 0, dst_w, dst_h);

            let layout = prepare(&req, &SoftVtg::new(), "GDP0").unwrap();
            prop_assert_eq!(layout.width, src_w.min(dst_w));
            prop_assert_eq!(layout.height, src_h.min(dst_h));
            prop_assert_eq!(layout.size, layout.height << 16 | layout.width);
        }

        #[test]
        fn prop_written_banks_are_chained(
            slot in 0usize..2,
            x in 0u32..1280,
            y in 0u32..720,
            interlaced in any::<bool>(),
        ) {
            let pool = pool();
            let mode = DisplayMode {
                interlaced,
                ..DisplayMode::cea_720p60()
            };
            let mut req = request(mode);
            req.dst = DestRect::new(x, y, 1280, 720);

            let bank = pool.bank(slot);
            let layout = build(bank, &req, &SoftVtg::new(), "GDP0").unwrap();

            prop_assert_eq!(bank.top().read(GdpRegister::Nvn), bank.bottom().addr());
            prop_assert_eq!(bank.bottom().read(GdpRegister::Nvn), bank.top().addr());
            prop_assert_eq!(bank.bottom().read(GdpRegister::Pml), layout.bottom_pml());
            for reg in [GdpRegister::Ctl, GdpRegister::Vpo, GdpRegister::Vps, GdpRegister::Size] {
                prop_assert_eq!(bank.top().read(reg), bank.bottom().read(reg));
            }
            // the other bank is untouched
            prop_assert_eq!(pool.bank(1 - slot).top().read(GdpRegister::Ctl), 0);
        }
    }
}
