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

//! Error types for the scanout engine
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `std::result::Result<T, GdpError>`.
//!
//! Node-list hazards are deliberately absent from this enum: they are logged
//! and recovered from in place, never surfaced to the caller.

use std::time::Duration;

use thiserror::Error;

use super::format::fourcc_to_string;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, GdpError>;

/// Broad classification of a [`GdpError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The commit was rejected; plane state is unchanged
    Validation,

    /// A field event carried an unknown parity
    Protocol,

    /// Requested timing or clock configuration is outside the supported range
    Configuration,

    /// Plane creation could not obtain its node memory
    ResourceExhaustion,

    /// I/O failure (configuration file access)
    Io,
}

/// Scanout engine errors
#[derive(Error, Debug)]
pub enum GdpError {
    /// Pixel format has no GDP hardware equivalent
    #[error("format not supported by GDP: {}", fourcc_to_string(*.0))]
    UnsupportedFormat(u32),

    /// The framebuffer has no DMA buffer object backing plane 0
    #[error("can't get DMA buffer object for framebuffer")]
    MissingBuffer,

    /// Destination rectangle is empty after clamping to the display mode
    #[error("destination {width}x{height}@({x},{y}) is empty once clamped to the mode")]
    EmptyDestination { x: u32, y: u32, width: u32, height: u32 },

    /// A disable is being finalized on the next field event
    #[error("plane {plane} is flushing, update refused until the next field event")]
    PlaneFlushing { plane: String },

    /// The pixel clock refused the requested rate
    #[error("cannot set rate ({rate}Hz) for {plane}")]
    ClockRate { plane: String, rate: u64 },

    /// HDMI serializer input clock is outside every PLL divider band
    #[error("input TMDS clock speed ({0}Hz) not supported")]
    TmdsClockUnsupported(u32),

    /// HDMI serializer output clock exceeds the PHY limit
    #[error("output TMDS clock ({0}Hz) out of range")]
    TmdsClockOutOfRange(u32),

    /// The HDMI PHY PLL did not report lock in time
    #[error("hdmi phy pll not locked after {0:?}")]
    PllNotLocked(Duration),

    /// Invalid configuration contents
    #[error("configuration error: {0}")]
    Config(String),

    /// Node memory could not be allocated
    #[error("failed to allocate {size} bytes for GDP nodes")]
    NodeAllocation { size: usize },

    /// Node memory is not 16-byte aligned
    #[error("node address 0x{addr:08X} is not 16-byte aligned")]
    NodeAlignment { addr: u32 },

    /// Field event with a parity the engine does not know
    #[error("unsupported field event: {0}")]
    UnknownFieldEvent(u32),

    /// Configuration file I/O
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GdpError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GdpError::UnsupportedFormat(_)
            | GdpError::MissingBuffer
            | GdpError::EmptyDestination { .. }
            | GdpError::PlaneFlushing { .. } => ErrorKind::Validation,
            GdpError::UnknownFieldEvent(_) => ErrorKind::Protocol,
            GdpError::ClockRate { .. }
            | GdpError::TmdsClockUnsupported(_)
            | GdpError::TmdsClockOutOfRange(_)
            | GdpError::PllNotLocked(_)
            | GdpError::Config(_) => ErrorKind::Configuration,
            GdpError::NodeAllocation { .. } | GdpError::NodeAlignment { .. } => {
                ErrorKind::ResourceExhaustion
            }
            GdpError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        GdpError::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::fourcc;

    #[test]
    fn test_unsupported_format_message_shows_fourcc() {
        let err = GdpError::UnsupportedFormat(fourcc(b'N', b'V', b'1', b'2'));
        assert_eq!(err.to_string(), "format not supported by GDP: NV12");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(GdpError::MissingBuffer.kind(), ErrorKind::Validation);
        assert_eq!(GdpError::UnknownFieldEvent(7).kind(), ErrorKind::Protocol);
        assert_eq!(
            GdpError::TmdsClockOutOfRange(700_000_000).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            GdpError::NodeAllocation { size: 256 }.kind(),
            ErrorKind::ResourceExhaustion
        );
        assert_eq!(
            GdpError::NodeAlignment { addr: 0x1004 }.kind(),
            ErrorKind::ResourceExhaustion
        );
    }

    #[test]
    fn test_io_error_is_transparent() {
        let err: GdpError = std::io::Error::other("boom").into();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
