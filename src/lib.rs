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

//! gdp-scanout: field-synchronized GDP plane scanout engine
//!
//! This crate drives the GDP planes of a display compositor. A GDP fetches
//! pixels through a chain of register images ("nodes") in DMA memory; the
//! engine builds those nodes from plane update requests and publishes them
//! without tearing against the hardware, in step with the field events of
//! the video timing generator.
//!
//! # Architecture
//!
//! - [`core::format`]: pixel format to GDP format mapping
//! - [`core::node`]: double-banked node pool of a plane
//! - [`core::builder`]: node register layout from an update request
//! - [`core::scheduler`]: field tracking and publication policy
//! - [`core::plane`]: per-plane lifecycle and state machine
//!
//! Around them sit the collaborators a plane talks to: register access and a
//! scanout simulator ([`core::hw`]), the timing generator ([`core::vtg`]),
//! pixel clock ([`core::clock`]), mixer ([`core::mixer`]), HDMI PHY
//! ([`core::phy`]) and the TOML configuration ([`core::config`]).
//!
//! # Error Handling
//!
//! All fallible operations return [`core::error::Result<T>`] which is an alias for
//! `Result<T, GdpError>`.

pub mod core;

// Re-export commonly used types
pub use core::error::{GdpError, Result};
