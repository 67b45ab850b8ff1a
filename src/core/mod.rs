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

//! Scanout engine core
//!
//! Modules are listed leaves first.

pub mod error;
pub mod format;
pub mod hw;
pub mod mode;
pub mod node;
pub mod request;

pub mod clock;
pub mod fps;
pub mod mixer;
pub mod phy;
pub mod vtg;

pub mod builder;
pub mod scheduler;

pub mod plane;

pub mod config;
