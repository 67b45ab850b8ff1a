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

//! Software timing generator
//!
//! Uses the ST VTG line/pixel arithmetic and delivers field events on
//! demand. Listeners are held weakly: a dropped plane silently falls out of
//! the client list.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::{
    vtg_line_number, vtg_pixel_number, ClientId, FieldListener, FieldParity, TimingGenerator,
};
use crate::core::mixer::MixerId;
use crate::core::mode::DisplayMode;

struct Client {
    id: ClientId,
    crtc: MixerId,
    listener: Weak<dyn FieldListener>,
}

/// Software [`TimingGenerator`]
pub struct SoftVtg {
    clients: Mutex<Vec<Client>>,
    next_id: AtomicU64,
    /// Parity of the next field produced by [`SoftVtg::emit_field`]
    next_top: AtomicBool,
}

impl SoftVtg {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            next_top: AtomicBool::new(true),
        }
    }

    /// Deliver a raw field event to every live client
    ///
    /// The client list is snapshotted first, so a listener may unregister
    /// itself from inside its callback.
    pub fn emit(&self, event: u32) {
        let listeners: Vec<Arc<dyn FieldListener>> = self
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|client| client.listener.upgrade())
            .collect();

        log::trace!("vtg: event {} to {} client(s)", event, listeners.len());
        for listener in listeners {
            listener.on_field_event(event);
        }
    }

    /// Produce the next field, alternating top and bottom
    pub fn emit_field(&self) -> FieldParity {
        let parity = if self.next_top.fetch_xor(true, Ordering::AcqRel) {
            FieldParity::Top
        } else {
            FieldParity::Bottom
        };
        self.emit(parity.event());
        parity
    }

    /// Number of registered clients whose listener is still alive
    pub fn client_count(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|client| client.listener.strong_count() > 0)
            .count()
    }

    /// Number of live clients registered on a given mixer output
    pub fn clients_on(&self, crtc: MixerId) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|client| client.crtc == crtc && client.listener.strong_count() > 0)
            .count()
    }
}

impl Default for SoftVtg {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingGenerator for SoftVtg {
    fn line_number(&self, mode: &DisplayMode, y: u32) -> u32 {
        vtg_line_number(mode, y)
    }

    fn pixel_number(&self, mode: &DisplayMode, x: u32) -> u32 {
        vtg_pixel_number(mode, x)
    }

    fn register(&self, listener: Weak<dyn FieldListener>, crtc: MixerId) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::AcqRel));
        log::debug!("vtg: register client {} on {}", id.0, crtc.name());
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Client { id, crtc, listener });
        id
    }

    fn unregister(&self, client: ClientId) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|c| c.id != client);
        let removed = clients.len() != before;
        if removed {
            log::debug!("vtg: unregister client {}", client.0);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<u32>>,
    }

    impl FieldListener for Recorder {
        fn on_field_event(&self, event: u32) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn weak(listener: &Arc<Recorder>) -> Weak<dyn FieldListener> {
        let as_dyn: Arc<dyn FieldListener> = listener.clone();
        Arc::downgrade(&as_dyn)
    }

    #[test]
    fn test_emit_field_alternates() {
        let vtg = SoftVtg::new();
        let rec = Arc::new(Recorder::default());
        vtg.register(weak(&rec), MixerId::Main);

        assert_eq!(vtg.emit_field(), FieldParity::Top);
        assert_eq!(vtg.emit_field(), FieldParity::Bottom);
        assert_eq!(vtg.emit_field(), FieldParity::Top);
        assert_eq!(*rec.events.lock().unwrap(), vec![1, 2, 1]);
    }

    #[test]
    fn test_unregister() {
        let vtg = SoftVtg::new();
        let rec = Arc::new(Recorder::default());
        let id = vtg.register(weak(&rec), MixerId::Aux);
        assert_eq!(vtg.clients_on(MixerId::Aux), 1);

        assert!(vtg.unregister(id));
        assert!(!vtg.unregister(id));
        vtg.emit(1);
        assert!(rec.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_listener_is_skipped() {
        let vtg = SoftVtg::new();
        let rec = Arc::new(Recorder::default());
        vtg.register(weak(&rec), MixerId::Main);
        assert_eq!(vtg.clients_on(MixerId::Main), 1);
        drop(rec);
        assert_eq!(vtg.client_count(), 0);
        assert_eq!(vtg.clients_on(MixerId::Main), 0);
        vtg.emit(2);
    }

    struct SelfRemoving {
        vtg: Arc<SoftVtg>,
        id: Mutex<Option<ClientId>>,
        calls: AtomicU32,
    }

    impl FieldListener for SelfRemoving {
        fn on_field_event(&self, _event: u32) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = self.id.lock().unwrap().take() {
                self.vtg.unregister(id);
            }
        }
    }

    #[test]
    fn test_listener_may_unregister_from_callback() {
        let vtg = Arc::new(SoftVtg::new());
        let listener = Arc::new(SelfRemoving {
            vtg: vtg.clone(),
            id: Mutex::new(None),
            calls: AtomicU32::new(0),
        });
        let as_dyn: Arc<dyn FieldListener> = listener.clone();
        let id = vtg.register(Arc::downgrade(&as_dyn), MixerId::Main);
        *listener.id.lock().unwrap() = Some(id);

        vtg.emit(1);
        vtg.emit(2);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
        assert_eq!(vtg.client_count(), 0);
    }

    #[test]
    fn test_line_and_pixel_numbers() {
        let vtg = SoftVtg::new();
        let mode = DisplayMode::cea_720p60();
        assert_eq!(vtg.line_number(&mode, 0), 750 - 725 + 1);
        assert_eq!(vtg.pixel_number(&mode, 10), 1650 - 1390 + 10);
    }
}
