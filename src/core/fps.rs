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

//! Plane frame-rate bookkeeping
//!
//! Every commit to a plane counts as a frame, including commits that did
//! not change anything. The rate is recomputed about once per second.

use std::time::{Duration, Instant};

/// Frame counter of one plane
///
/// # Example
///
/// ```
/// use gdp_scanout::core::fps::FpsCounter;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let mut fps = FpsCounter::starting_at(start);
/// for i in 1..=30 {
///     fps.tick_at(start + Duration::from_millis(i * 33));
/// }
/// assert_eq!(fps.frame_count(), 30);
/// ```
#[derive(Debug, Clone)]
pub struct FpsCounter {
    /// Total number of frames counted
    frame_count: u64,
    /// Most recent frame rate
    fps: f32,
    /// Start of the current measurement window
    window_start: Instant,
    /// Frames counted in the current window
    window_frames: u64,
}

impl FpsCounter {
    /// Measurement window length
    pub const WINDOW: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Counter whose first window starts at `start`
    pub fn starting_at(start: Instant) -> Self {
        Self {
            frame_count: 0,
            fps: 0.0,
            window_start: start,
            window_frames: 0,
        }
    }

    /// Count one frame now
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Count one frame at `now`
    ///
    /// Once a full window has elapsed, the rate is recomputed from the frames
    /// of that window and a new window starts.
    pub fn tick_at(&mut self, now: Instant) {
        self.frame_count += 1;
        self.window_frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Self::WINDOW {
            self.fps = self.window_frames as f32 / elapsed.as_secs_f32();
            self.window_frames = 0;
            self.window_start = now;
            log::trace!("{:.1} fps", self.fps);
        }
    }

    #[inline(always)]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline(always)]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}
