//! Discovery, connection and recovery for the two peripheral slots.
//!
//! The manager reacts to [`TransportEvent`]s one at a time. Every slot
//! transition goes through the shared [`SessionTable`](crate::session::SessionTable),
//! so the frame pipeline always sees a consistent view.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use crate::{
    config::CharacteristicIds,
    session::DiscoveryOutcome,
    transport::{ConnHandle, LinkParams, PeerAddress, Transport, TransportError, TransportEvent},
    AppConfig, AppState, LinkConfig, PoiError, Result,
};

/// How long the event loop blocks before re-checking for shutdown.
const EVENT_POLL: Duration = Duration::from_millis(100);

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    state: Arc<AppState>,
    target_name: Vec<u8>,
    ids: CharacteristicIds,
    link: LinkConfig,
    /// Address of the single connection attempt allowed in flight.
    pending: Mutex<Option<PeerAddress>>,
    stopped: AtomicBool,
}

impl SessionManager {
    pub fn new(config: &AppConfig, transport: Arc<dyn Transport>, state: Arc<AppState>) -> Result<Self> {
        Ok(Self {
            transport,
            state,
            target_name: config.device.target_name.as_bytes().to_vec(),
            ids: config.device.characteristic_ids()?,
            link: config.link,
            pending: Mutex::new(None),
            stopped: AtomicBool::new(false),
        })
    }

    /// Begins scanning for peripherals.
    pub fn start(&self) {
        tracing::info!(
            target_name = %String::from_utf8_lossy(&self.target_name),
            "scanning for peripherals"
        );
        self.resume_scan();
    }

    /// Cancels any scan and prevents further ones. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.transport.cancel_scan() {
            tracing::debug!(%err, "cancelling scan on stop failed");
        }
        tracing::info!("session manager stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Advertisement { addr, name } => self.on_advertisement(addr, &name),
            TransportEvent::ScanComplete => self.resume_scan(),
            TransportEvent::Connected { addr, conn } => self.on_connected(addr, conn),
            TransportEvent::ConnectFailed { addr, status } => {
                self.clear_pending(addr);
                if let Some(slot) = self.state.sessions.release_pending(addr) {
                    tracing::warn!(%addr, slot, status, "connection attempt failed");
                }
                self.resume_scan();
            }
            TransportEvent::CharacteristicFound { conn, uuid, handle } => {
                if let Some(role) = self
                    .state
                    .sessions
                    .record_characteristic(conn, uuid, handle, &self.ids)
                {
                    tracing::debug!(conn = conn.0, handle = handle.0, ?role, "characteristic found");
                }
            }
            TransportEvent::DiscoveryComplete { conn } => self.on_discovery_complete(conn),
            TransportEvent::DiscoveryFailed { conn, status } => {
                if let Some(session) = self.state.sessions.clear_connection(conn) {
                    tracing::warn!(addr = %session.addr, status, "characteristic discovery failed");
                    self.release_link(conn);
                }
                self.resume_scan();
            }
            TransportEvent::Disconnected { conn, reason } => {
                if let Some(session) = self.state.sessions.clear_connection(conn) {
                    tracing::info!(addr = %session.addr, reason, "peripheral disconnected");
                }
                self.resume_scan();
            }
        }
    }

    fn on_advertisement(&self, addr: PeerAddress, name: &[u8]) {
        if self.is_stopped() || name != self.target_name.as_slice() {
            return;
        }

        let mut pending = self.pending.lock();
        if pending.is_some() || self.state.sessions.tracks(addr) {
            return;
        }
        let Some(slot) = self.state.sessions.reserve(addr) else {
            return;
        };
        *pending = Some(addr);
        drop(pending);

        tracing::info!(%addr, slot, "found peripheral, connecting");
        if let Err(err) = self.transport.cancel_scan() {
            tracing::debug!(%err, "cancelling scan before connect failed");
        }
        if let Err(err) = self.transport.connect(addr, self.link.connect_timeout()) {
            tracing::warn!(%addr, %err, "could not start connection");
            self.clear_pending(addr);
            self.state.sessions.release_pending(addr);
            self.resume_scan();
        }
    }

    fn on_connected(&self, addr: PeerAddress, conn: ConnHandle) {
        self.clear_pending(addr);
        let Some(slot) = self.state.sessions.attach(addr, conn) else {
            tracing::warn!(%addr, conn = conn.0, "unexpected connection, releasing it");
            self.release_link(conn);
            return;
        };
        tracing::info!(%addr, slot, conn = conn.0, "connected");

        if let Err(err) = self.transport.exchange_mtu(conn, self.link.preferred_mtu) {
            tracing::debug!(%addr, %err, "mtu exchange failed");
        }
        if let Err(err) = self.transport.update_link_params(conn, LinkParams::from(&self.link)) {
            tracing::debug!(%addr, %err, "link parameter update failed");
        }
        if let Err(err) = self.transport.discover_characteristics(conn) {
            tracing::warn!(%addr, %err, "could not start characteristic discovery");
            self.state.sessions.clear_connection(conn);
            self.release_link(conn);
            self.resume_scan();
        }
    }

    fn on_discovery_complete(&self, conn: ConnHandle) {
        match self.state.sessions.complete_discovery(conn) {
            DiscoveryOutcome::Ready { slot } => {
                tracing::info!(slot, conn = conn.0, "peripheral ready");
                // Once stopped, shutdown owns the flag.
                if !self.is_stopped()
                    && self.state.sessions.fully_connected()
                    && !self.state.streaming_enabled()
                {
                    self.state.set_streaming_enabled(true);
                    tracing::info!("all peripherals connected, streaming enabled");
                }
            }
            DiscoveryOutcome::Incomplete { slot } => {
                tracing::warn!(slot, conn = conn.0, "required characteristics missing");
                self.release_link(conn);
            }
            DiscoveryOutcome::Unknown => {
                tracing::debug!(conn = conn.0, "discovery finished for an untracked connection");
            }
        }
        self.resume_scan();
    }

    /// Scans while a slot is free, nothing is pending and the manager runs.
    fn resume_scan(&self) {
        if self.is_stopped() || self.pending.lock().is_some() || !self.state.sessions.has_free_slot() {
            return;
        }
        if let Err(err) = self.transport.start_scan() {
            tracing::warn!(%err, "could not start scan");
        }
    }

    fn clear_pending(&self, addr: PeerAddress) {
        let mut pending = self.pending.lock();
        if *pending == Some(addr) {
            *pending = None;
        }
    }

    fn release_link(&self, conn: ConnHandle) {
        match self.transport.disconnect(conn) {
            Ok(()) | Err(TransportError::NotConnected) => {}
            Err(err) => tracing::debug!(conn = conn.0, %err, "disconnect failed"),
        }
    }

    /// Drains transport events until shutdown is requested.
    pub fn run(&self, events: Receiver<TransportEvent>) -> Result<()> {
        self.start();
        while !self.state.is_shutting_down() {
            match events.recv_timeout(EVENT_POLL) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if self.state.is_shutting_down() {
                        break;
                    }
                    tracing::error!("transport event channel closed, session manager exiting");
                    return Err(TransportError::Closed.into());
                }
            }
        }
        self.stop();
        Ok(())
    }

    pub fn spawn(
        self: Arc<Self>,
        events: Receiver<TransportEvent>,
    ) -> Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("session-manager".to_string())
            .spawn(move || self.run(events))
            .map_err(|err| PoiError::Thread {
                name: "session-manager",
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        session::SlotState,
        sim::{SimPeripheral, SimulatedRadio},
    };

    const A: PeerAddress = PeerAddress([0xa0, 0, 0, 0, 0, 1]);
    const B: PeerAddress = PeerAddress([0xb0, 0, 0, 0, 0, 2]);
    const C: PeerAddress = PeerAddress([0xc0, 0, 0, 0, 0, 3]);
    const D: PeerAddress = PeerAddress([0xd0, 0, 0, 0, 0, 4]);

    struct Harness {
        radio: Arc<SimulatedRadio>,
        events: Receiver<TransportEvent>,
        state: Arc<AppState>,
        manager: SessionManager,
    }

    impl Harness {
        fn new(peripherals: Vec<SimPeripheral>) -> Self {
            let config = AppConfig::default();
            let (radio, events) = SimulatedRadio::with_channel(&config);
            for peripheral in peripherals {
                radio.add_peripheral(peripheral);
            }
            let state = Arc::new(AppState::new(&config));
            let manager = SessionManager::new(&config, radio.clone(), state.clone()).unwrap();
            Self {
                radio,
                events,
                state,
                manager,
            }
        }

        /// Delivers queued events until the radio goes quiet.
        fn pump(&self) {
            while let Ok(event) = self.events.try_recv() {
                self.manager.handle_event(event);
            }
        }
    }

    #[test]
    fn connects_two_peripherals_and_enables_streaming() {
        let h = Harness::new(vec![SimPeripheral::poi(A), SimPeripheral::poi(B)]);
        h.manager.start();
        h.pump();

        assert_eq!(h.state.sessions.states(), [SlotState::Ready; 2]);
        assert!(h.state.sessions.fully_connected());
        assert!(h.state.streaming_enabled());
        assert!(!h.radio.is_scanning(), "no scan once both slots are taken");
        assert_eq!(h.radio.mtu(A), Some(247));
        assert_eq!(h.radio.link_params(B), Some(LinkParams::from(&LinkConfig::default())));

        let sessions = h.state.sessions.sessions();
        let (a, b) = (sessions[0].clone().unwrap(), sessions[1].clone().unwrap());
        assert_ne!(a.id, b.id);
        assert_ne!(a.addr, b.addr);
        assert!(a.rx.is_some() && a.tx.is_some());
    }

    #[test]
    fn ignores_other_and_truncated_names() {
        let h = Harness::new(vec![
            SimPeripheral::named(A, "Open Pixel"),
            SimPeripheral::named(B, "open pixel poi"),
            SimPeripheral::named(C, "Open Pixel Poi 2"),
            SimPeripheral::named(D, "Open Pixel Po"),
        ]);
        h.manager.start();
        h.pump();

        assert_eq!(h.state.sessions.occupied(), 0);
        assert_eq!(h.radio.connect_attempts(), 0);
        assert!(h.radio.is_scanning());
    }

    #[test]
    fn duplicate_advertisements_yield_one_attempt() {
        let h = Harness::new(Vec::new());
        h.manager.start();
        h.pump();

        let name = b"Open Pixel Poi".to_vec();
        h.radio.add_peripheral(SimPeripheral::poi(A).unresponsive());
        for _ in 0..3 {
            h.manager.handle_event(TransportEvent::Advertisement {
                addr: A,
                name: name.clone(),
            });
        }
        h.manager.handle_event(TransportEvent::Advertisement {
            addr: B,
            name: name.clone(),
        });
        h.pump();

        assert_eq!(h.radio.connect_attempts(), 1, "one attempt in flight at a time");
        assert_eq!(h.state.sessions.states(), [SlotState::Connecting, SlotState::Empty]);
        assert!(!h.radio.is_scanning());
    }

    #[test]
    fn disconnect_frees_the_slot_and_rescans() {
        let h = Harness::new(vec![SimPeripheral::poi(A), SimPeripheral::poi(B)]);
        h.manager.start();
        h.pump();
        let before = h.state.sessions.sessions()[0].clone().unwrap();
        let scans = h.radio.scan_starts();

        h.radio.drop_link(A);
        h.manager.handle_event(h.events.try_recv().unwrap());

        assert_eq!(h.state.sessions.states(), [SlotState::Empty, SlotState::Ready]);
        assert!(!h.state.sessions.fully_connected());
        assert!(h.state.streaming_enabled(), "streaming stays latched");
        assert_eq!(h.radio.scan_starts(), scans + 1, "rescan without backoff");

        // The peripheral keeps advertising and comes back as a fresh session.
        h.pump();
        let after = h.state.sessions.sessions()[0].clone().unwrap();
        assert_eq!(after.addr, A);
        assert_ne!(after.id, before.id);
        assert!(!after.stream_started);
        assert!(h.state.sessions.fully_connected());
    }

    #[test]
    fn missing_characteristic_releases_the_link() {
        let h = Harness::new(vec![SimPeripheral::poi(A).without_rx()]);
        h.manager.start();

        // Advertisement, connected, characteristic, discovery complete.
        for _ in 0..4 {
            h.manager.handle_event(h.events.try_recv().unwrap());
        }

        assert_eq!(h.state.sessions.occupied(), 0);
        assert!(!h.radio.is_connected(A));
        assert!(h.radio.is_scanning());
        assert!(!h.state.streaming_enabled());
    }

    #[test]
    fn discovery_failure_and_connect_failure_recover() {
        let h = Harness::new(vec![SimPeripheral::poi(A).failing_discovery()]);
        h.radio.fail_next_connects(1);
        h.manager.start();

        // Advertisement, then the failed attempt.
        h.manager.handle_event(h.events.try_recv().unwrap());
        h.manager.handle_event(h.events.try_recv().unwrap());
        assert_eq!(h.state.sessions.occupied(), 0);
        assert!(h.radio.is_scanning());

        // Advertisement, connected, discovery failed.
        for _ in 0..3 {
            h.manager.handle_event(h.events.try_recv().unwrap());
        }
        assert_eq!(h.state.sessions.occupied(), 0);
        assert!(!h.radio.is_connected(A));
        assert_eq!(h.radio.connect_attempts(), 2);
    }

    #[test]
    fn stop_is_idempotent_and_blocks_rescans() {
        let h = Harness::new(vec![SimPeripheral::poi(A)]);
        h.manager.start();
        h.pump();
        assert!(h.radio.is_scanning());

        h.manager.stop();
        h.manager.stop();
        assert!(h.manager.is_stopped());
        assert!(!h.radio.is_scanning());

        h.radio.drop_link(A);
        h.pump();
        h.manager.handle_event(TransportEvent::ScanComplete);
        assert!(!h.radio.is_scanning());
        assert_eq!(h.state.sessions.occupied(), 0);
    }

    #[test]
    fn stopped_manager_never_raises_the_streaming_flag() {
        let h = Harness::new(vec![SimPeripheral::poi(A), SimPeripheral::poi(B)]);
        h.manager.start();
        while let Ok(event) = h.events.try_recv() {
            let last_discovery = matches!(event, TransportEvent::DiscoveryComplete { .. })
                && h.state.sessions.states().contains(&SlotState::Ready);
            if last_discovery {
                h.manager.stop();
            }
            h.manager.handle_event(event);
        }

        assert_eq!(h.state.sessions.states(), [SlotState::Ready; 2]);
        assert!(h.manager.is_stopped());
        assert!(!h.state.streaming_enabled());
    }

    #[test]
    fn run_exits_on_shutdown() {
        let h = Harness::new(vec![SimPeripheral::poi(A), SimPeripheral::poi(B)]);
        let Harness {
            events,
            state,
            manager,
            ..
        } = h;
        let manager = Arc::new(manager);
        let handle = manager.clone().spawn(events).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !state.streaming_enabled() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(state.streaming_enabled());

        state.request_shutdown();
        handle.join().unwrap().unwrap();
        assert!(manager.is_stopped());
    }
}
