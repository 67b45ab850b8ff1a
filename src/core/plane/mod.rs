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

//! GDP plane
//!
//! This module ties the node pool, node builder and field scheduler into one
//! plane. A plane is driven from two contexts at once:
//!
//! - the control path: [`GdpPlane::check`], [`GdpPlane::update`],
//!   [`GdpPlane::disable`] and [`GdpPlane::commit_disable`]
//! - the timing generator, which calls [`FieldListener::on_field_event`] at
//!   every field boundary
//!
//! # Lifecycle
//!
//! A plane starts `Disabled`. Its first update registers it with the timing
//! generator of the target mixer and enables its pixel clock. A disable is
//! requested (`Disabling`), committed (`Flushing`) and finalized on the next
//! field event: every node is marked ignored, the plane leaves the timing
//! generator and the pixel clock is stopped.
//!
//! # Concurrency
//!
//! The field handler only touches atomics (status, field parity, timing
//! generator registration) and node words. Control state is kept behind a
//! mutex the field handler never takes, which also serializes control calls.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use gdp_scanout::core::clock::PixelClock;
//! use gdp_scanout::core::format::drm_fourcc;
//! use gdp_scanout::core::hw::{GdpVariant, MemoryRegisters};
//! use gdp_scanout::core::mixer::MixerId;
//! use gdp_scanout::core::mode::DisplayMode;
//! use gdp_scanout::core::node::LinearDmaAllocator;
//! use gdp_scanout::core::plane::{GdpPlane, PlaneId, PlaneStatus};
//! use gdp_scanout::core::request::{BufferObject, DestRect, SourceRect, UpdateRequest};
//! use gdp_scanout::core::vtg::SoftVtg;
//!
//! let vtg = Arc::new(SoftVtg::new());
//! let plane = GdpPlane::new(
//!     PlaneId::Gdp0,
//!     GdpVariant::Gdp,
//!     Arc::new(MemoryRegisters::gdp("GDP0")),
//!     &LinearDmaAllocator::new(0x4000_0000, 0x1000),
//!     [vtg.clone(), vtg.clone()],
//!     PixelClock::none("GDP0"),
//! )
//! .unwrap();
//!
//! let mode = DisplayMode::cea_1080p60();
//! plane
//!     .update(&UpdateRequest {
//!         fourcc: drm_fourcc::XRGB8888,
//!         src: SourceRect::from_pixels(0, 0, 1920, 1080),
//!         dst: DestRect::new(0, 0, 1920, 1080),
//!         buffer: Some(BufferObject { dma_addr: 0x8000_0000, offset: 0, pitch: 7680 }),
//!         mixer: MixerId::Main,
//!         mode,
//!     })
//!     .unwrap();
//! assert_eq!(plane.status(), PlaneStatus::Updated);
//!
//! plane.disable();
//! plane.commit_disable();
//! vtg.emit_field();
//! assert_eq!(plane.status(), PlaneStatus::Disabled);
//! ```

mod status;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

use super::builder::{self, NodeLayout};
use super::clock::PixelClock;
use super::error::{GdpError, Result};
use super::fps::FpsCounter;
use super::hw::{underflow_flagged, GdpVariant, RegisterFile};
use super::mixer::MixerId;
use super::node::{MemoryProvider, NodePool};
use super::request::UpdateRequest;
use super::scheduler::{FieldScheduler, PublishAction};
use super::vtg::{ClientId, FieldListener, TimingGenerator};

pub use status::{PlaneStatus, StatusCell};

/// GDP instance of the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaneId {
    Gdp0,
    Gdp1,
    Gdp2,
    Gdp3,
    Gdp4,
    Gdp5,
}

impl PlaneId {
    pub const ALL: [PlaneId; 6] = [
        PlaneId::Gdp0,
        PlaneId::Gdp1,
        PlaneId::Gdp2,
        PlaneId::Gdp3,
        PlaneId::Gdp4,
        PlaneId::Gdp5,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PlaneId::Gdp0 => "GDP0",
            PlaneId::Gdp1 => "GDP1",
            PlaneId::Gdp2 => "GDP2",
            PlaneId::Gdp3 => "GDP3",
            PlaneId::Gdp4 => "GDP4",
            PlaneId::Gdp5 => "GDP5",
        }
    }

    /// Name of the pixel clock feeding this GDP
    ///
    /// Only the first four GDPs have a dedicated pixel clock.
    pub fn clock_name(self) -> Option<&'static str> {
        match self {
            PlaneId::Gdp0 => Some("pix_gdp1"),
            PlaneId::Gdp1 => Some("pix_gdp2"),
            PlaneId::Gdp2 => Some("pix_gdp3"),
            PlaneId::Gdp3 => Some("pix_gdp4"),
            PlaneId::Gdp4 | PlaneId::Gdp5 => None,
        }
    }
}

impl fmt::Display for PlaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a successful [`GdpPlane::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Same scanout as the last commit: nothing was written
    Unchanged,
    /// A bank was built and published
    Published { bank: usize, action: PublishAction },
}

/// Timing generator registration slot (0 = not registered)
const VTG_NONE: u8 = 0;

fn vtg_slot(mixer: MixerId) -> u8 {
    mixer.index() as u8 + 1
}

/// State only the control path touches
struct ControlState {
    last: Option<UpdateRequest>,
    fps: FpsCounter,
    publishes: u64,
}

/// One GDP plane
pub struct GdpPlane {
    id: PlaneId,
    regs: Arc<dyn RegisterFile>,
    pool: NodePool,
    /// Timing generator of each mixer output
    vtgs: [Arc<dyn TimingGenerator>; 2],
    clock: PixelClock,

    status: StatusCell,
    scheduler: FieldScheduler,
    vtg_slot: AtomicU8,
    vtg_client: AtomicU64,
    fields: AtomicU64,

    control: Mutex<ControlState>,
    this: Weak<GdpPlane>,
}

impl GdpPlane {
    /// Create a plane and allocate its nodes
    ///
    /// # Arguments
    ///
    /// * `regs` - Live register window of the GDP
    /// * `provider` - DMA memory for the node banks
    /// * `vtgs` - Timing generators of the main and aux mixer outputs
    /// * `clock` - Pixel clock, possibly absent
    ///
    /// # Errors
    ///
    /// [`GdpError::NodeAllocation`] or [`GdpError::NodeAlignment`] when the
    /// node memory is unusable.
    pub fn new(
        id: PlaneId,
        variant: GdpVariant,
        regs: Arc<dyn RegisterFile>,
        provider: &dyn MemoryProvider,
        vtgs: [Arc<dyn TimingGenerator>; 2],
        clock: PixelClock,
    ) -> Result<Arc<Self>> {
        let pool = NodePool::new(variant, provider)?;
        log::debug!("{} created ({:?})", id, variant);

        Ok(Arc::new_cyclic(|this| Self {
            id,
            regs,
            pool,
            vtgs,
            clock,
            status: StatusCell::default(),
            scheduler: FieldScheduler::new(),
            vtg_slot: AtomicU8::new(VTG_NONE),
            vtg_client: AtomicU64::new(0),
            fields: AtomicU64::new(0),
            control: Mutex::new(ControlState {
                last: None,
                fps: FpsCounter::new(),
                publishes: 0,
            }),
            this: this.clone(),
        }))
    }

    #[inline(always)]
    pub fn id(&self) -> PlaneId {
        self.id
    }

    #[inline(always)]
    pub fn status(&self) -> PlaneStatus {
        self.status.get()
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    /// Whether the field on screen is a top field
    pub fn is_current_field_top(&self) -> bool {
        self.scheduler.is_current_field_top()
    }

    /// Whether the plane is registered with a timing generator
    pub fn is_registered(&self) -> bool {
        self.vtg_slot.load(Ordering::Acquire) != VTG_NONE
    }

    /// Whether the hardware reported a fetch underflow
    pub fn underflow_detected(&self) -> bool {
        underflow_flagged(self.regs.as_ref())
    }

    /// Number of commits, unchanged ones included
    pub fn frame_count(&self) -> u64 {
        self.lock_control().fps.frame_count()
    }

    /// Number of field events received while registered
    pub fn field_count(&self) -> u64 {
        self.fields.load(Ordering::Relaxed)
    }

    pub fn fps(&self) -> f32 {
        self.lock_control().fps.fps()
    }

    /// Number of banks published to the hardware
    pub fn publish_count(&self) -> u64 {
        self.lock_control().publishes
    }

    fn lock_control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate a request and program the pixel clock for it
    ///
    /// Nothing in the plane changes on failure.
    ///
    /// # Errors
    ///
    /// - [`GdpError::UnsupportedFormat`] / [`GdpError::MissingBuffer`]
    /// - [`GdpError::EmptyDestination`] when nothing is left to display
    /// - [`GdpError::ClockRate`] when the pixel clock refuses the mode rate
    pub fn check(&self, req: &UpdateRequest) -> Result<()> {
        self.check_layout(req).map(|_| ())
    }

    fn check_layout(&self, req: &UpdateRequest) -> Result<NodeLayout> {
        let vtg = self.vtgs[req.mixer.index()].as_ref();
        let layout = builder::prepare(req, vtg, self.id.name())?;
        self.clock.configure(req.mixer, &req.mode)?;
        log::debug!("{} on {}", self.id, req.mixer.name());
        Ok(layout)
    }

    /// Show `req` on the plane
    ///
    /// The nodes are built in the bank the hardware is not reading and
    /// published according to the field policy. Committing the same scanout
    /// twice only counts a frame.
    ///
    /// # Errors
    ///
    /// - [`GdpError::PlaneFlushing`] while a disable waits for its field
    ///   event
    /// - any error of [`GdpPlane::check`]
    ///
    /// A rejected request leaves every node and register untouched.
    pub fn update(&self, req: &UpdateRequest) -> Result<UpdateOutcome> {
        let mut control = self.lock_control();

        if self.status.get() == PlaneStatus::Flushing {
            log::debug!("{} flushing, update refused", self.id);
            return Err(GdpError::PlaneFlushing {
                plane: self.id.name().to_string(),
            });
        }

        let layout = self.check_layout(req)?;

        if self.status.get() == PlaneStatus::Updated
            && control.last.as_ref().is_some_and(|last| last.same_scanout(req))
        {
            // no change since last update, do not post cmd
            log::debug!("{}: no change, not posting cmd", self.id);
            control.fps.tick();
            return Ok(UpdateOutcome::Unchanged);
        }

        if !self.is_registered() {
            self.register(req.mixer);
            self.clock.enable();
        }

        let bank = self.pool.free_bank(self.regs.as_ref(), self.id.name());
        self.write_bank(bank, &layout);
        let action = self.scheduler.publish(
            &self.pool,
            self.regs.as_ref(),
            bank,
            layout.interlaced,
            self.id.name(),
        );
        log::debug!("{}: bank {} published: {:?}", self.id, bank, action);

        control.fps.tick();
        control.publishes += 1;
        control.last = Some(*req);
        self.status.set(PlaneStatus::Updated);

        Ok(UpdateOutcome::Published { bank, action })
    }

    fn write_bank(&self, bank: usize, layout: &NodeLayout) {
        let nodes = self.pool.bank(bank);
        log::trace!(
            "{} top_node:0x{:08X} btm_node:0x{:08X}",
            self.id,
            nodes.top().addr(),
            nodes.bottom().addr()
        );
        builder::write(nodes, layout);
    }

    fn register(&self, mixer: MixerId) {
        let listener: Weak<dyn FieldListener> = self.this.clone();
        let client = self.vtgs[mixer.index()].register(listener, mixer);
        self.vtg_client.store(client.raw(), Ordering::Release);
        self.vtg_slot.store(vtg_slot(mixer), Ordering::Release);
    }

    /// Request a disable
    ///
    /// Only an updated plane can be disabled; the hardware keeps scanning
    /// out until the disable is committed and a field event arrives.
    /// Returns whether the plane moved to `Disabling`.
    pub fn disable(&self) -> bool {
        let mut control = self.lock_control();
        if !self.status.transition(PlaneStatus::Updated, PlaneStatus::Disabling) {
            log::debug!("{} not enabled ({})", self.id, self.status.get());
            return false;
        }
        control.last = None;
        log::debug!("{} disabling", self.id);
        true
    }

    /// Commit a requested disable; finalized on the next field event
    pub fn commit_disable(&self) -> bool {
        let _control = self.lock_control();
        let committed = self
            .status
            .transition(PlaneStatus::Disabling, PlaneStatus::Flushing);
        if committed {
            log::debug!("{} flushing", self.id);
        }
        committed
    }

    /// Field-synchronized end of a disable
    fn finalize_disable(&self) {
        log::debug!("{}", self.id);

        // set the nodes as 'to be ignored on mixer'
        self.pool.mark_all_ignored();

        let slot = self.vtg_slot.swap(VTG_NONE, Ordering::AcqRel);
        let client = ClientId::from_raw(self.vtg_client.swap(0, Ordering::AcqRel));
        let unregistered = match (slot, client) {
            (VTG_NONE, _) | (_, None) => false,
            (slot, Some(client)) => self
                .vtgs
                .get(slot as usize - 1)
                .is_some_and(|vtg| vtg.unregister(client)),
        };
        if !unregistered {
            log::debug!("Warning: cannot unregister VTG notifier");
        }

        self.clock.disable();
    }
}

impl FieldListener for GdpPlane {
    fn on_field_event(&self, event: u32) {
        self.fields.fetch_add(1, Ordering::Relaxed);
        self.scheduler
            .on_field_event(event, &self.status, self.id.name(), || self.finalize_disable());
    }
}
