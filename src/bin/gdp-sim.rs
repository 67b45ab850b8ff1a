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

//! GDP scanout simulation
//!
//! Builds the planes of a compositor configuration on top of in-memory
//! registers, flips a set of framebuffers through them for a number of
//! frames, disables them, and prints what the fetch engine scanned out.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;

use gdp_scanout::core::clock::{ClockControl, PixelClock, SoftClock};
use gdp_scanout::core::config::CompositorConfig;
use gdp_scanout::core::format::{drm_fourcc, PixelFormat};
use gdp_scanout::core::hw::{FieldScan, MemoryRegisters, ScanoutSimulator};
use gdp_scanout::core::mixer::{Mixer, MixerId, GAM_MIXER_REGS_SIZE};
use gdp_scanout::core::mode::DisplayMode;
use gdp_scanout::core::node::{Field, LinearDmaAllocator};
use gdp_scanout::core::phy::{HdmiPhy, SoftHdmiRegisters};
use gdp_scanout::core::plane::{GdpPlane, PlaneStatus, UpdateOutcome};
use gdp_scanout::core::request::{BufferObject, DestRect, SourceRect, UpdateRequest};
use gdp_scanout::core::vtg::{SoftVtg, TimingGenerator};

/// Base bus address of the simulated framebuffers
const FB_BASE: u32 = 0x8000_0000;

/// Framebuffers flipped per plane
const FB_COUNT: u32 = 3;

#[derive(Parser, Debug)]
#[command(name = "gdp-sim", about = "Simulate GDP plane scanout over a number of frames")]
struct Args {
    /// Compositor configuration (TOML); falls back to $GDP_SIM_CONFIG, then
    /// to the defaults
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of frames to flip before disabling the planes
    #[arg(long, default_value_t = 6)]
    frames: u32,

    /// Force an interlaced scan of the configured mode
    #[arg(long, action = clap::ArgAction::SetTrue)]
    interlaced: bool,

    /// Write the JSON report to this path instead of stdout
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Save the effective configuration to this path
    #[arg(long, value_name = "PATH")]
    save_config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ScanReport {
    field: &'static str,
    bank: usize,
    pml: String,
    ignored: bool,
}

impl From<&FieldScan> for ScanReport {
    fn from(scan: &FieldScan) -> Self {
        Self {
            field: match scan.field {
                Field::Top => "top",
                Field::Bottom => "bottom",
            },
            bank: scan.bank,
            pml: format!("0x{:08X}", scan.pml),
            ignored: scan.ignored,
        }
    }
}

#[derive(Debug, Serialize)]
struct PlaneReport {
    plane: String,
    mixer: &'static str,
    status: PlaneStatus,
    commits: u64,
    publishes: u64,
    fields: u64,
    underflow: bool,
    scans: Vec<ScanReport>,
}

#[derive(Debug, Serialize)]
struct PhyReport {
    tmds_clock: u32,
    idf: u32,
    odf: u32,
}

#[derive(Debug, Serialize)]
struct SimReport {
    mode: DisplayMode,
    frames: u32,
    phy: Option<PhyReport>,
    planes: Vec<PlaneReport>,
}

struct SimPlane {
    plane: Arc<GdpPlane>,
    mixer: MixerId,
    regs: Arc<MemoryRegisters>,
    sim: ScanoutSimulator,
}

fn framebuffer(mode: &DisplayMode, plane: usize, index: u32) -> BufferObject {
    let pitch = mode.hdisplay * PixelFormat::Xrgb8888.bytes_per_pixel();
    let size = pitch * mode.vdisplay;
    BufferObject {
        dma_addr: FB_BASE + (plane as u32 * FB_COUNT + index) * size,
        offset: 0,
        pitch,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var_os("GDP_SIM_CONFIG").map(PathBuf::from));
    let mut config = match &config_path {
        Some(path) => CompositorConfig::load(path)?,
        None => CompositorConfig::default(),
    };
    if args.interlaced {
        config.mode.interlaced = true;
    }
    config.validate()?;
    if let Some(path) = &args.save_config {
        config.save(path)?;
        log::info!("Configuration saved to {}", path.display());
    }

    let mode = config.mode;
    log::info!(
        "Simulating {}x{}{} with {} plane(s), {} frame(s)",
        mode.hdisplay,
        mode.vdisplay,
        if mode.interlaced { "i" } else { "p" },
        config.planes.len(),
        args.frames
    );

    let vtgs = [Arc::new(SoftVtg::new()), Arc::new(SoftVtg::new())];
    let timing: [Arc<dyn TimingGenerator>; 2] = [vtgs[0].clone(), vtgs[1].clone()];

    let mixers = [MixerId::Main, MixerId::Aux].map(|id| {
        Mixer::new(
            id,
            Arc::new(MemoryRegisters::new(id.name(), GAM_MIXER_REGS_SIZE)),
            config.mixer,
        )
    });
    for mixer in &mixers {
        mixer.active_video_area(&mode, timing[mixer.id().index()].as_ref());
    }

    let phy = HdmiPhy::new(Arc::new(SoftHdmiRegisters::new()), None);
    let phy_report = match phy.start(&mode) {
        Ok(setup) => Some(PhyReport {
            tmds_clock: setup.tmds_clock,
            idf: setup.idf,
            odf: setup.odf,
        }),
        Err(e) => {
            log::warn!("HDMI PHY not started: {}", e);
            None
        }
    };

    let allocator = LinearDmaAllocator::new(0x4000_0000, 0x10_0000);
    let mut planes = Vec::with_capacity(config.planes.len());
    for plane_config in &config.planes {
        let id = plane_config.id;
        let clock = id.clock_name().map(|name| {
            log::debug!("{} uses pixel clock {}", id, name);
            Arc::new(SoftClock::new(config.clocks.max_rate)) as Arc<dyn ClockControl>
        });
        let regs = Arc::new(MemoryRegisters::gdp(id.name()));
        let plane = GdpPlane::new(
            id,
            config.variant,
            regs.clone(),
            &allocator,
            timing.clone(),
            PixelClock::new(
                id.name(),
                clock,
                config.clocks.main_parent.clone(),
                config.clocks.aux_parent.clone(),
            ),
        )?;
        mixers[plane_config.mixer.index()].set_plane_status(id, true);
        planes.push(SimPlane {
            plane,
            mixer: plane_config.mixer,
            regs,
            sim: ScanoutSimulator::new(),
        });
    }

    let run_field = |planes: &mut [SimPlane]| {
        for p in planes.iter_mut() {
            p.sim.advance(p.plane.pool(), &p.regs);
        }
        for vtg in &vtgs {
            vtg.emit_field();
        }
    };

    for frame in 0..args.frames {
        for (index, p) in planes.iter().enumerate() {
            let request = UpdateRequest {
                fourcc: drm_fourcc::XRGB8888,
                src: SourceRect::from_pixels(0, 0, mode.hdisplay, mode.vdisplay),
                dst: DestRect::new(0, 0, mode.hdisplay, mode.vdisplay),
                buffer: Some(framebuffer(&mode, index, frame % FB_COUNT)),
                mixer: p.mixer,
                mode,
            };
            match p.plane.update(&request)? {
                UpdateOutcome::Unchanged => {
                    log::debug!("{} frame {}: unchanged", p.plane.id(), frame)
                }
                UpdateOutcome::Published { bank, action } => {
                    log::debug!("{} frame {}: bank {} {:?}", p.plane.id(), frame, bank, action)
                }
            }
        }
        // one frame is two fields
        run_field(planes.as_mut_slice());
        run_field(planes.as_mut_slice());
    }

    for p in &planes {
        p.plane.disable();
        p.plane.commit_disable();
        mixers[p.mixer.index()].set_plane_status(p.plane.id(), false);
    }
    run_field(planes.as_mut_slice());
    run_field(planes.as_mut_slice());
    phy.stop();

    let report = SimReport {
        mode,
        frames: args.frames,
        phy: phy_report,
        planes: planes
            .iter()
            .map(|p| PlaneReport {
                plane: p.plane.id().to_string(),
                mixer: p.mixer.name(),
                status: p.plane.status(),
                commits: p.plane.frame_count(),
                publishes: p.plane.publish_count(),
                fields: p.plane.field_count(),
                underflow: p.plane.underflow_detected(),
                scans: p.sim.history().iter().map(ScanReport::from).collect(),
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&report)?;
    match &args.json {
        Some(path) => {
            std::fs::write(path, json)?;
            log::info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
