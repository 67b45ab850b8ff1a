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

//! Pixel format mapping
//!
//! Maps DRM fourcc pixel formats onto the GDP hardware color format codes
//! carried in the node CTL word.
//!
//! ```text
//! fourcc     | GDP code              | bpp | alpha range
//! -----------|-----------------------|-----|------------
//! XRGB8888   | RGB888_32   (0x02)    | 4   | no
//! XBGR8888   | XBGR8888    (swapped) | 4   | no
//! ARGB8888   | ARGB8888    (0x05)    | 4   | 0..255
//! ABGR8888   | ABGR8888    (swapped) | 4   | 0..255
//! ARGB4444   | ARGB4444    (0x07)    | 2   | no
//! ARGB1555   | ARGB1555    (0x06)    | 2   | no
//! RGB565     | RGB565      (0x00)    | 2   | no
//! RGB888     | RGB888      (0x01)    | 3   | no
//! ```
//!
//! The "swapped" codes add the BIGNOTLITTLE and ALPHASWITCH bits to the
//! base 32-bit code.

use super::error::{GdpError, Result};
use super::hw::{GdpCtl, GAM_GDP_ALPHARANGE_255};

/// Build a little-endian fourcc code from its four characters
pub const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

/// Render a fourcc as its four printable characters
pub fn fourcc_to_string(code: u32) -> String {
    code.to_le_bytes()
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

/// DRM fourcc codes accepted by the GDP
pub mod drm_fourcc {
    use super::fourcc;

    pub const XRGB8888: u32 = fourcc(b'X', b'R', b'2', b'4');
    pub const XBGR8888: u32 = fourcc(b'X', b'B', b'2', b'4');
    pub const ARGB8888: u32 = fourcc(b'A', b'R', b'2', b'4');
    pub const ABGR8888: u32 = fourcc(b'A', b'B', b'2', b'4');
    pub const ARGB4444: u32 = fourcc(b'A', b'R', b'1', b'2');
    pub const ARGB1555: u32 = fourcc(b'A', b'R', b'1', b'5');
    pub const RGB565: u32 = fourcc(b'R', b'G', b'1', b'6');
    pub const RGB888: u32 = fourcc(b'R', b'G', b'2', b'4');
}

/// GDP color format codes (CTL bits 0-4, plus byte/alpha swap bits)
pub mod gdp_format {
    use super::GdpCtl;

    pub const RGB565: u32 = 0x00;
    pub const RGB888: u32 = 0x01;
    pub const RGB888_32: u32 = 0x02;
    pub const XBGR8888: u32 =
        RGB888_32 | GdpCtl::BIG_NOT_LITTLE.bits() | GdpCtl::ALPHA_SWITCH.bits();
    pub const ARGB8565: u32 = 0x04;
    pub const ARGB8888: u32 = 0x05;
    pub const ABGR8888: u32 =
        ARGB8888 | GdpCtl::BIG_NOT_LITTLE.bits() | GdpCtl::ALPHA_SWITCH.bits();
    pub const ARGB1555: u32 = 0x06;
    pub const ARGB4444: u32 = 0x07;
}

/// Pixel formats the GDP can scan out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Xrgb8888,
    Xbgr8888,
    Argb8888,
    Abgr8888,
    Argb4444,
    Argb1555,
    Rgb565,
    Rgb888,
}

impl PixelFormat {
    /// Every supported format, in advertisement order
    pub const ALL: [PixelFormat; 8] = [
        PixelFormat::Xrgb8888,
        PixelFormat::Xbgr8888,
        PixelFormat::Argb8888,
        PixelFormat::Abgr8888,
        PixelFormat::Argb4444,
        PixelFormat::Argb1555,
        PixelFormat::Rgb565,
        PixelFormat::Rgb888,
    ];

    /// Look up a format by DRM fourcc
    pub fn from_fourcc(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.fourcc() == code)
    }

    pub fn fourcc(self) -> u32 {
        match self {
            PixelFormat::Xrgb8888 => drm_fourcc::XRGB8888,
            PixelFormat::Xbgr8888 => drm_fourcc::XBGR8888,
            PixelFormat::Argb8888 => drm_fourcc::ARGB8888,
            PixelFormat::Abgr8888 => drm_fourcc::ABGR8888,
            PixelFormat::Argb4444 => drm_fourcc::ARGB4444,
            PixelFormat::Argb1555 => drm_fourcc::ARGB1555,
            PixelFormat::Rgb565 => drm_fourcc::RGB565,
            PixelFormat::Rgb888 => drm_fourcc::RGB888,
        }
    }

    /// GDP hardware color format code
    pub fn hw_code(self) -> u32 {
        match self {
            PixelFormat::Xrgb8888 => gdp_format::RGB888_32,
            PixelFormat::Xbgr8888 => gdp_format::XBGR8888,
            PixelFormat::Argb8888 => gdp_format::ARGB8888,
            PixelFormat::Abgr8888 => gdp_format::ABGR8888,
            PixelFormat::Argb4444 => gdp_format::ARGB4444,
            PixelFormat::Argb1555 => gdp_format::ARGB1555,
            PixelFormat::Rgb565 => gdp_format::RGB565,
            PixelFormat::Rgb888 => gdp_format::RGB888,
        }
    }

    /// Bytes per pixel of the single memory plane
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Xrgb8888
            | PixelFormat::Xbgr8888
            | PixelFormat::Argb8888
            | PixelFormat::Abgr8888 => 4,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Argb4444 | PixelFormat::Argb1555 | PixelFormat::Rgb565 => 2,
        }
    }
}

/// Result of a successful format lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub format: PixelFormat,

    /// GDP color format code for the CTL word
    pub hw_code: u32,

    /// Alpha range control bit (0 or `GAM_GDP_ALPHARANGE_255`)
    pub alpha_range: u32,

    pub bytes_per_pixel: u32,
}

/// Map a DRM fourcc to its GDP format description
///
/// # Errors
///
/// [`GdpError::UnsupportedFormat`] when the fourcc is not one of the eight
/// formats the GDP scans out.
pub fn map_format(code: u32) -> Result<FormatInfo> {
    let format = PixelFormat::from_fourcc(code).ok_or(GdpError::UnsupportedFormat(code))?;
    let hw_code = format.hw_code();

    Ok(FormatInfo {
        format,
        hw_code,
        alpha_range: alpha_range(hw_code),
        bytes_per_pixel: format.bytes_per_pixel(),
    })
}

/// Alpha range control for a GDP format code
///
/// Formats carrying an 8-bit alpha channel use the full 0..255 range.
pub fn alpha_range(hw_code: u32) -> u32 {
    match hw_code {
        gdp_format::ARGB8565 | gdp_format::ARGB8888 | gdp_format::ABGR8888 => {
            GAM_GDP_ALPHARANGE_255
        }
        _ => 0,
    }
}

/// Human readable name of the color format held in a CTL word
pub fn hw_format_name(ctl: u32) -> &'static str {
    // Swapped variants share bits 0-4 with their base format
    let swapped = GdpCtl::BIG_NOT_LITTLE.bits() | GdpCtl::ALPHA_SWITCH.bits();
    let code = ctl & (0x1F | swapped);
    match code {
        gdp_format::RGB565 => "RGB565",
        gdp_format::RGB888 => "RGB888",
        gdp_format::RGB888_32 => "RGB888_32",
        gdp_format::XBGR8888 => "XBGR8888",
        gdp_format::ARGB8565 => "ARGB8565",
        gdp_format::ARGB8888 => "ARGB8888",
        gdp_format::ABGR8888 => "ABGR8888",
        gdp_format::ARGB1555 => "ARGB1555",
        gdp_format::ARGB4444 => "ARGB4444",
        _ => "<UNKNOWN>",
    }
}
