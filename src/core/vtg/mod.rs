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

//! Video timing generator (VTG) interface
//!
//! The VTG drives the display timings and notifies its clients at every
//! field boundary. In progressive modes top and bottom events still
//! alternate; the two fields simply carry the same picture.
//!
//! ## Field events
//!
//! ```text
//! Value | Event
//! ------|--------------------------
//! 1     | VTG_TOP_FIELD_EVENT
//! 2     | VTG_BOTTOM_FIELD_EVENT
//! ```
//!
//! Listeners are called from the VTG interrupt path and must return without
//! blocking.

mod soft;

use std::sync::Weak;

use super::error::GdpError;
use super::mixer::MixerId;
use super::mode::DisplayMode;

pub use soft::SoftVtg;

/// Top field started
pub const VTG_TOP_FIELD_EVENT: u32 = 1;

/// Bottom field started
pub const VTG_BOTTOM_FIELD_EVENT: u32 = 2;

/// Parity of the field being scanned out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldParity {
    Top,
    Bottom,
}

impl FieldParity {
    /// Raw event value for this parity
    pub fn event(self) -> u32 {
        match self {
            FieldParity::Top => VTG_TOP_FIELD_EVENT,
            FieldParity::Bottom => VTG_BOTTOM_FIELD_EVENT,
        }
    }
}

impl TryFrom<u32> for FieldParity {
    type Error = GdpError;

    fn try_from(event: u32) -> Result<Self, Self::Error> {
        match event {
            VTG_TOP_FIELD_EVENT => Ok(FieldParity::Top),
            VTG_BOTTOM_FIELD_EVENT => Ok(FieldParity::Bottom),
            other => Err(GdpError::UnknownFieldEvent(other)),
        }
    }
}

/// Registration handle returned by [`TimingGenerator::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Wrap a raw id; zero is reserved for "no client"
    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(ClientId(raw))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Receiver of field-boundary notifications
pub trait FieldListener: Send + Sync {
    /// Called at every field boundary with the raw event value
    ///
    /// Runs at interrupt priority: no blocking, no waiting.
    fn on_field_event(&self, event: u32);
}

/// Display timing generator service
pub trait TimingGenerator: Send + Sync {
    /// Hardware line number of display line `y`
    fn line_number(&self, mode: &DisplayMode, y: u32) -> u32;

    /// Hardware pixel-clock position of display column `x`
    fn pixel_number(&self, mode: &DisplayMode, x: u32) -> u32;

    /// Subscribe `listener` to field events of the given mixer output
    fn register(&self, listener: Weak<dyn FieldListener>, crtc: MixerId) -> ClientId;

    /// Remove a subscription; false if the client was not registered
    fn unregister(&self, client: ClientId) -> bool;
}

/// Line number computation used by the ST VTG
///
/// Active video starts `vtotal - vsync_start + 1` lines after the sync
/// pulse, counted in field lines, so interlaced modes double the offset.
pub fn vtg_line_number(mode: &DisplayMode, y: u32) -> u32 {
    let mut start_line = mode.vtotal.wrapping_sub(mode.vsync_start).wrapping_add(1);
    if mode.interlaced {
        start_line = start_line.wrapping_mul(2);
    }
    start_line.wrapping_add(y)
}

/// Pixel number computation used by the ST VTG
pub fn vtg_pixel_number(mode: &DisplayMode, x: u32) -> u32 {
    mode.htotal.wrapping_sub(mode.hsync_start).wrapping_add(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_from_event() {
        assert_eq!(FieldParity::try_from(1).unwrap(), FieldParity::Top);
        assert_eq!(FieldParity::try_from(2).unwrap(), FieldParity::Bottom);
        assert!(matches!(
            FieldParity::try_from(3),
            Err(GdpError::UnknownFieldEvent(3))
        ));
        assert!(FieldParity::try_from(0).is_err());
    }

    #[test]
    fn test_parity_event() {
        assert_eq!(FieldParity::Top.event(), VTG_TOP_FIELD_EVENT);
        assert_eq!(FieldParity::Bottom.event(), VTG_BOTTOM_FIELD_EVENT);
    }

    #[test]
    fn test_client_id_zero_is_reserved() {
        assert!(ClientId::from_raw(0).is_none());
        assert_eq!(ClientId::from_raw(5).map(ClientId::raw), Some(5));
    }

    #[test]
    fn test_line_number_progressive() {
        let mode = DisplayMode::cea_1080p60();
        // 1125 - 1084 + 1 = 42
        assert_eq!(vtg_line_number(&mode, 0), 42);
        assert_eq!(vtg_line_number(&mode, 1079), 42 + 1079);
    }

    #[test]
    fn test_line_number_interlaced_doubles_offset() {
        let mode = DisplayMode::cea_1080i60();
        assert_eq!(vtg_line_number(&mode, 0), 84);
    }

    #[test]
    fn test_pixel_number() {
        let mode = DisplayMode::cea_1080p60();
        // 2200 - 2008 = 192
        assert_eq!(vtg_pixel_number(&mode, 0), 192);
        assert_eq!(vtg_pixel_number(&mode, 1919), 192 + 1919);
    }
}
