//! Per-peripheral session state and the two-slot table that holds it.
//!
//! The table is the only place slot state lives. The session manager mutates
//! it from transport events; the frame pipeline copies delivery targets out
//! of it once per cycle and never writes to the transport while holding the
//! lock.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    config::CharacteristicIds,
    transport::{CharHandle, ConnHandle, PeerAddress},
};

/// Number of peripherals the controller drives.
pub const SLOT_COUNT: usize = 2;

/// Unique per connection attempt; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Empty,
    /// Connection requested, waiting for the link to come up.
    Connecting,
    /// Link is up, characteristics are being enumerated.
    Discovering,
    /// Both characteristics resolved; eligible for packets.
    Ready,
}

/// Which of the two known characteristics a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicRole {
    Rx,
    Tx,
}

/// Device-reported configuration, shown on the status screen only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoiMetadata {
    pub led_count: u8,
    pub protocol_version: u8,
    pub frame_buffer_size: u16,
    pub hardware_buffer_limit: u16,
}

/// One physical peripheral connection and its protocol state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub addr: PeerAddress,
    pub conn: Option<ConnHandle>,
    pub rx: Option<CharHandle>,
    pub tx: Option<CharHandle>,
    pub state: SlotState,
    pub stream_started: bool,
    pub metadata: Option<PoiMetadata>,
}

impl Session {
    fn connecting(id: SessionId, addr: PeerAddress) -> Self {
        Self {
            id,
            addr,
            conn: None,
            rx: None,
            tx: None,
            state: SlotState::Connecting,
            stream_started: false,
            metadata: None,
        }
    }

    /// Characteristics resolved. Implies both handles are present.
    pub fn discovered(&self) -> bool {
        self.state == SlotState::Ready
    }
}

/// Everything the frame pipeline needs to address one ready session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub slot: usize,
    pub id: SessionId,
    pub conn: ConnHandle,
    pub rx: CharHandle,
    pub stream_started: bool,
}

/// Result of the stack reporting the end of characteristic discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Ready { slot: usize },
    /// A required handle was missing; the slot has been cleared.
    Incomplete { slot: usize },
    /// No session owns the connection.
    Unknown,
}

#[derive(Debug, Default)]
pub struct SessionTable {
    slots: Mutex<[Option<Session>; SLOT_COUNT]>,
    next_id: AtomicU64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> [SlotState; SLOT_COUNT] {
        let slots = self.slots.lock();
        std::array::from_fn(|i| slots[i].as_ref().map_or(SlotState::Empty, |s| s.state))
    }

    /// Copy of every slot, for status display.
    pub fn sessions(&self) -> [Option<Session>; SLOT_COUNT] {
        self.slots.lock().clone()
    }

    pub fn occupied(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    /// Both slots hold a session and both are `Ready`.
    pub fn fully_connected(&self) -> bool {
        self.states().iter().all(|s| *s == SlotState::Ready)
    }

    pub fn has_free_slot(&self) -> bool {
        self.slots.lock().iter().any(Option::is_none)
    }

    /// Whether `addr` is already connected or being connected to.
    pub fn tracks(&self, addr: PeerAddress) -> bool {
        self.slots.lock().iter().flatten().any(|s| s.addr == addr)
    }

    /// Claims the first empty slot for a new connection attempt to `addr`.
    pub fn reserve(&self, addr: PeerAddress) -> Option<usize> {
        let mut slots = self.slots.lock();
        if slots.iter().flatten().any(|s| s.addr == addr) {
            return None;
        }
        let slot = slots.iter().position(Option::is_none)?;
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        slots[slot] = Some(Session::connecting(id, addr));
        Some(slot)
    }

    /// Records the link for a pending attempt and moves it to `Discovering`.
    pub fn attach(&self, addr: PeerAddress, conn: ConnHandle) -> Option<usize> {
        let mut slots = self.slots.lock();
        let (slot, session) = slots
            .iter_mut()
            .enumerate()
            .find_map(|(i, s)| match s {
                Some(s) if s.addr == addr && s.state == SlotState::Connecting => Some((i, s)),
                _ => None,
            })?;
        session.conn = Some(conn);
        session.state = SlotState::Discovering;
        Some(slot)
    }

    /// Drops a pending attempt that never produced a link.
    pub fn release_pending(&self, addr: PeerAddress) -> Option<usize> {
        let mut slots = self.slots.lock();
        let slot = slots.iter().position(|s| {
            matches!(s, Some(s) if s.addr == addr && s.state == SlotState::Connecting)
        })?;
        slots[slot] = None;
        Some(slot)
    }

    pub fn record_characteristic(
        &self,
        conn: ConnHandle,
        uuid: u128,
        handle: CharHandle,
        ids: &CharacteristicIds,
    ) -> Option<CharacteristicRole> {
        let mut slots = self.slots.lock();
        let session = slots
            .iter_mut()
            .flatten()
            .find(|s| s.conn == Some(conn) && s.state == SlotState::Discovering)?;
        if uuid == ids.rx {
            session.rx = Some(handle);
            Some(CharacteristicRole::Rx)
        } else if uuid == ids.tx {
            session.tx = Some(handle);
            Some(CharacteristicRole::Tx)
        } else {
            None
        }
    }

    pub fn complete_discovery(&self, conn: ConnHandle) -> DiscoveryOutcome {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.iter().position(|s| {
            matches!(s, Some(s) if s.conn == Some(conn) && s.state == SlotState::Discovering)
        }) else {
            return DiscoveryOutcome::Unknown;
        };

        match slots[slot].as_mut() {
            Some(session) if session.rx.is_some() && session.tx.is_some() => {
                session.state = SlotState::Ready;
                return DiscoveryOutcome::Ready { slot };
            }
            _ => {}
        }
        slots[slot] = None;
        DiscoveryOutcome::Incomplete { slot }
    }

    /// Empties whichever slot owns `conn`, whatever its state.
    pub fn clear_connection(&self, conn: ConnHandle) -> Option<Session> {
        let mut slots = self.slots.lock();
        slots
            .iter_mut()
            .find(|s| matches!(s, Some(s) if s.conn == Some(conn)))
            .and_then(Option::take)
    }

    /// Ready sessions in slot order. Allocation-free for the frame path.
    pub fn delivery_targets(&self) -> [Option<DeliveryTarget>; SLOT_COUNT] {
        let slots = self.slots.lock();
        std::array::from_fn(|slot| {
            let session = slots[slot].as_ref()?;
            if session.state != SlotState::Ready {
                return None;
            }
            Some(DeliveryTarget {
                slot,
                id: session.id,
                conn: session.conn?,
                rx: session.rx?,
                stream_started: session.stream_started,
            })
        })
    }

    /// Attaches device-reported configuration to the session on `conn`.
    pub fn set_metadata(&self, conn: ConnHandle, metadata: PoiMetadata) -> bool {
        let mut slots = self.slots.lock();
        match slots.iter_mut().flatten().find(|s| s.conn == Some(conn)) {
            Some(session) => {
                session.metadata = Some(metadata);
                true
            }
            None => false,
        }
    }

    /// Marks the handshake as sent, provided `slot` still holds session `id`.
    pub fn mark_stream_started(&self, slot: usize, id: SessionId) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(slot).and_then(Option::as_mut) {
            Some(session) if session.id == id && session.state == SlotState::Ready => {
                session.stream_started = true;
                true
            }
            _ => false,
        }
    }
}
