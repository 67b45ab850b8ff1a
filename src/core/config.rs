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

//! Compositor configuration
//!
//! Loaded from a TOML file. Every section is optional:
//!
//! ```toml
//! variant = "gdp"
//!
//! [mixer]
//! background_color = 0x000000
//!
//! [clocks]
//! main_parent = "main_parent"
//! aux_parent = "aux_parent"
//! max_rate = 600000000
//!
//! [[planes]]
//! id = "gdp0"
//! mixer = "main"
//!
//! [mode]
//! clock_khz = 148500
//! hdisplay = 1920
//! hsync_start = 2008
//! htotal = 2200
//! vdisplay = 1080
//! vsync_start = 1084
//! vtotal = 1125
//! interlaced = false
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{GdpError, Result};
use super::hw::GdpVariant;
use super::mixer::{MixerConfig, MixerId};
use super::mode::DisplayMode;
use super::plane::PlaneId;

/// Pixel clock parents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Parent clock when the plane feeds the main mixer
    pub main_parent: Option<String>,
    /// Parent clock when the plane feeds the aux mixer
    pub aux_parent: Option<String>,
    /// Highest rate the pixel clocks accept, in Hz
    pub max_rate: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            main_parent: Some("main_parent".to_string()),
            aux_parent: Some("aux_parent".to_string()),
            max_rate: 600_000_000,
        }
    }
}

/// One plane and the mixer it is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneConfig {
    pub id: PlaneId,
    #[serde(default)]
    pub mixer: MixerId,
}

/// Configuration of the whole compositor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub variant: GdpVariant,
    pub mixer: MixerConfig,
    pub clocks: ClockConfig,
    pub planes: Vec<PlaneConfig>,
    pub mode: DisplayMode,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            variant: GdpVariant::Gdp,
            mixer: MixerConfig::default(),
            clocks: ClockConfig::default(),
            planes: vec![PlaneConfig {
                id: PlaneId::Gdp0,
                mixer: MixerId::Main,
            }],
            mode: DisplayMode::default(),
        }
    }
}

impl CompositorConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| GdpError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| GdpError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check the values serde cannot check
    pub fn validate(&self) -> Result<()> {
        if self.mixer.background_color > 0x00FF_FFFF {
            return Err(GdpError::config(format!(
                "background color 0x{:X} is not 0xRRGGBB",
                self.mixer.background_color
            )));
        }
        if !self.mode.is_valid() {
            return Err(GdpError::config("display mode timings are inconsistent"));
        }
        if self.planes.is_empty() {
            return Err(GdpError::config("no plane configured"));
        }

        let mut seen = HashSet::new();
        for plane in &self.planes {
            if !seen.insert(plane.id) {
                return Err(GdpError::config(format!("plane {} configured twice", plane.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_default_config_is_valid() {
        let config = CompositorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.planes.len(), 1);
        assert_eq!(config.mode, DisplayMode::cea_1080p60());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = CompositorConfig::from_toml_str("").unwrap();
        assert_eq!(config, CompositorConfig::default());
    }

    #[test]
    fn test_parse_full_document() {
        let config = CompositorConfig::from_toml_str(
            r#"
            variant = "gdpplus"

            [mixer]
            background_color = 0x102030

            [clocks]
            main_parent = "clk_main"
            max_rate = 300000000

            [[planes]]
            id = "gdp0"

            [[planes]]
            id = "gdp2"
            mixer = "aux"

            [mode]
            clock_khz = 74250
            hdisplay = 1920
            hsync_start = 2008
            htotal = 2200
            vdisplay = 1080
            vsync_start = 1084
            vtotal = 1125
            interlaced = true
            "#,
        )
        .unwrap();

        assert_eq!(config.variant, GdpVariant::GdpPlus);
        assert_eq!(config.mixer.background_color, 0x102030);
        assert_eq!(config.clocks.main_parent.as_deref(), Some("clk_main"));
        assert_eq!(config.clocks.aux_parent.as_deref(), Some("aux_parent"));
        assert_eq!(config.planes[0].mixer, MixerId::Main);
        assert_eq!(config.planes[1].id, PlaneId::Gdp2);
        assert_eq!(config.planes[1].mixer, MixerId::Aux);
        assert_eq!(config.mode, DisplayMode::cea_1080i60());
    }

    #[test]
    fn test_invalid_documents() {
        let bad_color = "[mixer]\nbackground_color = 0x1000000\n";
        let dup = "[[planes]]\nid = \"gdp1\"\n[[planes]]\nid = \"gdp1\"\n";
        let no_planes = "planes = []\n";
        let syntax = "variant = \n";
        for doc in [bad_color, dup, no_planes, syntax] {
            let err = CompositorConfig::from_toml_str(doc).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{}", doc);
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compositor.toml");

        let mut config = CompositorConfig::default();
        config.mixer.background_color = 0x00FF00;
        config.mode = DisplayMode::cea_720p60();
        config.save(&path).unwrap();

        assert_eq!(CompositorConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CompositorConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
