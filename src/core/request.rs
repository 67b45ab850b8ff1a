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

//! Plane update requests

use serde::{Deserialize, Serialize};

use super::mixer::MixerId;
use super::mode::DisplayMode;

/// Source rectangle in the framebuffer, 16.16 fixed point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl SourceRect {
    /// Source rectangle from whole pixels
    pub const fn from_pixels(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            x: x << 16,
            y: y << 16,
            w: w << 16,
            h: h << 16,
        }
    }
}

/// Destination rectangle on the display, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DestRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl DestRect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

/// DMA buffer backing the framebuffer's first plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferObject {
    /// Bus address of the buffer
    pub dma_addr: u32,
    /// Byte offset of the first pixel
    #[serde(default)]
    pub offset: u32,
    /// Bytes per line
    pub pitch: u32,
}

/// A request to show a buffer region on a plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// DRM fourcc of the framebuffer
    pub fourcc: u32,
    pub src: SourceRect,
    pub dst: DestRect,
    pub buffer: Option<BufferObject>,
    #[serde(default)]
    pub mixer: MixerId,
    pub mode: DisplayMode,
}

impl UpdateRequest {
    /// Whether `other` would program the exact same scanout
    ///
    /// Only the framebuffer and both rectangles take part; mode changes go
    /// through a full modeset which disables the plane first.
    pub fn same_scanout(&self, other: &UpdateRequest) -> bool {
        self.fourcc == other.fourcc
            && self.buffer == other.buffer
            && self.src == other.src
            && self.dst == other.dst
    }
}
