use std::{collections::VecDeque, sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::{
    config::CharacteristicIds,
    protocol::{self, Command},
    transport::{
        event_channel, CharHandle, ConnHandle, LinkParams, PeerAddress, Transport, TransportError,
        TransportEvent, TransportResult,
    },
    AppConfig,
};

const RX_HANDLE: CharHandle = CharHandle(0x0c);
const TX_HANDLE: CharHandle = CharHandle(0x0e);

/// Status reported for a refused connection attempt.
const CONNECT_REFUSED: i32 = 0x3e;
/// Discovery status reported by a peripheral configured to fail it.
const DISCOVERY_ERROR: i32 = 0x0e;
const REASON_LOCAL_HOST: i32 = 0x16;
const REASON_SUPERVISION_TIMEOUT: i32 = 0x08;

/// Packets kept per peripheral; older ones are discarded.
pub const PACKET_HISTORY: usize = 256;

/// Description of one advertiser known to the simulated radio.
#[derive(Debug, Clone)]
pub struct SimPeripheral {
    pub addr: PeerAddress,
    pub name: Vec<u8>,
    has_rx: bool,
    has_tx: bool,
    fail_discovery: bool,
    responsive: bool,
}

impl SimPeripheral {
    /// A well-behaved POI advertising the default name.
    pub fn poi(addr: PeerAddress) -> Self {
        Self::named(addr, "Open Pixel Poi")
    }

    pub fn named(addr: PeerAddress, name: &str) -> Self {
        Self {
            addr,
            name: name.as_bytes().to_vec(),
            has_rx: true,
            has_tx: true,
            fail_discovery: false,
            responsive: true,
        }
    }

    pub fn without_rx(mut self) -> Self {
        self.has_rx = false;
        self
    }

    pub fn failing_discovery(mut self) -> Self {
        self.fail_discovery = true;
        self
    }

    /// Never answers a connection request.
    pub fn unresponsive(mut self) -> Self {
        self.responsive = false;
        self
    }
}

#[derive(Debug)]
struct PeripheralState {
    info: SimPeripheral,
    conn: Option<ConnHandle>,
    mtu: Option<u16>,
    link: Option<LinkParams>,
    handshake_seen: bool,
    data_before_handshake: usize,
    received: usize,
    handshakes: usize,
    data_packets: usize,
    /// Most recent packets, oldest first, at most `PACKET_HISTORY`.
    packets: VecDeque<Vec<u8>>,
    write_failures: VecDeque<TransportError>,
}

impl PeripheralState {
    fn new(info: SimPeripheral) -> Self {
        Self {
            info,
            conn: None,
            mtu: None,
            link: None,
            handshake_seen: false,
            data_before_handshake: 0,
            received: 0,
            handshakes: 0,
            data_packets: 0,
            packets: VecDeque::new(),
            write_failures: VecDeque::new(),
        }
    }

    fn advertisement(&self) -> TransportEvent {
        TransportEvent::Advertisement {
            addr: self.info.addr,
            name: self.info.name.clone(),
        }
    }

    /// Link loss resets the peripheral's protocol state.
    fn unlink(&mut self) -> Option<ConnHandle> {
        self.handshake_seen = false;
        self.mtu = None;
        self.link = None;
        self.conn.take()
    }
}

#[derive(Debug, Default)]
struct RadioInner {
    peripherals: Vec<PeripheralState>,
    scanning: bool,
    scan_starts: usize,
    connect_attempts: usize,
    connect_failures: usize,
    next_conn: u16,
}

impl RadioInner {
    fn by_addr(&mut self, addr: PeerAddress) -> Option<&mut PeripheralState> {
        self.peripherals.iter_mut().find(|p| p.info.addr == addr)
    }

    fn by_conn(&mut self, conn: ConnHandle) -> TransportResult<&mut PeripheralState> {
        self.peripherals
            .iter_mut()
            .find(|p| p.conn == Some(conn))
            .ok_or(TransportError::NotConnected)
    }
}

/// In-process BLE central with scripted peripherals.
///
/// Every operation completes immediately and reports its outcome on the
/// event channel, so tests can drive the session manager one event at a time.
/// Peripherals record every packet they receive.
#[derive(Debug)]
pub struct SimulatedRadio {
    events: Sender<TransportEvent>,
    ids: CharacteristicIds,
    inner: Mutex<RadioInner>,
}

impl SimulatedRadio {
    pub fn new(events: Sender<TransportEvent>, ids: CharacteristicIds) -> Self {
        Self {
            events,
            ids,
            inner: Mutex::new(RadioInner {
                next_conn: 1,
                ..RadioInner::default()
            }),
        }
    }

    /// Builds a radio for `config`'s characteristic identifiers together with
    /// the receiving end of its event channel.
    pub fn with_channel(config: &AppConfig) -> (Arc<Self>, Receiver<TransportEvent>) {
        let (tx, rx) = event_channel();
        let ids = config.device.characteristic_ids().unwrap_or_default();
        (Arc::new(Self::new(tx, ids)), rx)
    }

    /// Adds an advertiser. It is reported immediately if a scan is running.
    pub fn add_peripheral(&self, peripheral: SimPeripheral) {
        let mut inner = self.inner.lock();
        let state = PeripheralState::new(peripheral);
        if inner.scanning {
            self.emit(state.advertisement());
        }
        inner.peripherals.push(state);
    }

    /// Simulates a link loss initiated by the peripheral.
    pub fn drop_link(&self, addr: PeerAddress) {
        let mut inner = self.inner.lock();
        if let Some(conn) = inner.by_addr(addr).and_then(PeripheralState::unlink) {
            self.emit(TransportEvent::Disconnected {
                conn,
                reason: REASON_SUPERVISION_TIMEOUT,
            });
        }
    }

    /// Makes the next `count` writes to `addr` fail with `err`.
    pub fn fail_next_writes(&self, addr: PeerAddress, count: usize, err: TransportError) {
        if let Some(p) = self.inner.lock().by_addr(addr) {
            p.write_failures.extend(std::iter::repeat(err).take(count));
        }
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.inner.lock().connect_failures += count;
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.lock().scanning
    }

    pub fn scan_starts(&self) -> usize {
        self.inner.lock().scan_starts
    }

    pub fn connect_attempts(&self) -> usize {
        self.inner.lock().connect_attempts
    }

    pub fn is_connected(&self, addr: PeerAddress) -> bool {
        self.peripheral(addr, |p| p.conn.is_some()).unwrap_or(false)
    }

    pub fn mtu(&self, addr: PeerAddress) -> Option<u16> {
        self.peripheral(addr, |p| p.mtu).flatten()
    }

    pub fn link_params(&self, addr: PeerAddress) -> Option<LinkParams> {
        self.peripheral(addr, |p| p.link).flatten()
    }

    /// The most recent packets `addr` received, oldest first. Only the last
    /// `PACKET_HISTORY` are kept; the counters below cover every packet.
    pub fn packets(&self, addr: PeerAddress) -> Vec<Vec<u8>> {
        self.peripheral(addr, |p| p.packets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total packets of any kind `addr` received.
    pub fn received(&self, addr: PeerAddress) -> usize {
        self.peripheral(addr, |p| p.received).unwrap_or(0)
    }

    pub fn handshakes(&self, addr: PeerAddress) -> usize {
        self.peripheral(addr, |p| p.handshakes).unwrap_or(0)
    }

    pub fn data_packets(&self, addr: PeerAddress) -> usize {
        self.peripheral(addr, |p| p.data_packets).unwrap_or(0)
    }

    /// Data packets that arrived on a link before its handshake.
    pub fn data_before_handshake(&self, addr: PeerAddress) -> usize {
        self.peripheral(addr, |p| p.data_before_handshake).unwrap_or(0)
    }

    fn peripheral<R>(&self, addr: PeerAddress, read: impl FnOnce(&PeripheralState) -> R) -> Option<R> {
        let inner = self.inner.lock();
        inner.peripherals.iter().find(|p| p.info.addr == addr).map(read)
    }

    fn emit(&self, event: TransportEvent) {
        // The receiver only disappears during teardown.
        let _ = self.events.send(event);
    }

    fn deliver(&self, conn: ConnHandle, data: &[u8]) -> TransportResult {
        let mut inner = self.inner.lock();
        let p = inner.by_conn(conn)?;
        if let Some(err) = p.write_failures.pop_front() {
            return Err(err);
        }
        match protocol::decode_command(data) {
            Some(Command::StartStream) => {
                p.handshake_seen = true;
                p.handshakes += 1;
            }
            Some(Command::StreamData) => {
                if !p.handshake_seen {
                    p.data_before_handshake += 1;
                }
                p.data_packets += 1;
            }
            _ => {}
        }
        p.received += 1;
        if p.packets.len() == PACKET_HISTORY {
            p.packets.pop_front();
        }
        p.packets.push_back(data.to_vec());
        Ok(())
    }
}

impl Transport for SimulatedRadio {
    fn start_scan(&self) -> TransportResult {
        let mut inner = self.inner.lock();
        if inner.scanning {
            return Ok(());
        }
        inner.scanning = true;
        inner.scan_starts += 1;
        for p in inner.peripherals.iter().filter(|p| p.conn.is_none()) {
            self.emit(p.advertisement());
        }
        Ok(())
    }

    fn cancel_scan(&self) -> TransportResult {
        self.inner.lock().scanning = false;
        Ok(())
    }

    fn connect(&self, addr: PeerAddress, _timeout: Duration) -> TransportResult {
        let mut inner = self.inner.lock();
        inner.connect_attempts += 1;
        if inner.connect_failures > 0 {
            inner.connect_failures -= 1;
            self.emit(TransportEvent::ConnectFailed {
                addr,
                status: CONNECT_REFUSED,
            });
            return Ok(());
        }

        let conn = ConnHandle(inner.next_conn);
        let p = inner.by_addr(addr).ok_or(TransportError::UnknownPeer)?;
        if p.conn.is_some() {
            return Err(TransportError::Rejected { code: CONNECT_REFUSED });
        }
        if !p.info.responsive {
            return Ok(());
        }
        p.conn = Some(conn);
        inner.next_conn = inner.next_conn.wrapping_add(1);
        self.emit(TransportEvent::Connected { addr, conn });
        Ok(())
    }

    fn disconnect(&self, conn: ConnHandle) -> TransportResult {
        let mut inner = self.inner.lock();
        inner.by_conn(conn)?.unlink();
        self.emit(TransportEvent::Disconnected {
            conn,
            reason: REASON_LOCAL_HOST,
        });
        Ok(())
    }

    fn exchange_mtu(&self, conn: ConnHandle, mtu: u16) -> TransportResult {
        self.inner.lock().by_conn(conn)?.mtu = Some(mtu);
        Ok(())
    }

    fn update_link_params(&self, conn: ConnHandle, params: LinkParams) -> TransportResult {
        self.inner.lock().by_conn(conn)?.link = Some(params);
        Ok(())
    }

    fn discover_characteristics(&self, conn: ConnHandle) -> TransportResult {
        let mut inner = self.inner.lock();
        let p = inner.by_conn(conn)?;
        if p.info.fail_discovery {
            self.emit(TransportEvent::DiscoveryFailed {
                conn,
                status: DISCOVERY_ERROR,
            });
            return Ok(());
        }
        let found = [
            (p.info.has_rx, self.ids.rx, RX_HANDLE),
            (p.info.has_tx, self.ids.tx, TX_HANDLE),
        ];
        for (_, uuid, handle) in found.into_iter().filter(|(present, ..)| *present) {
            self.emit(TransportEvent::CharacteristicFound { conn, uuid, handle });
        }
        self.emit(TransportEvent::DiscoveryComplete { conn });
        Ok(())
    }

    fn write(&self, conn: ConnHandle, _handle: CharHandle, data: &[u8]) -> TransportResult {
        self.deliver(conn, data)
    }

    fn write_without_response(&self, conn: ConnHandle, _handle: CharHandle, data: &[u8]) -> TransportResult {
        self.deliver(conn, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HANDSHAKE;

    const A: PeerAddress = PeerAddress([2, 0, 0, 0, 0, 1]);

    #[test]
    fn scan_reports_unconnected_advertisers_once() {
        let (radio, events) = SimulatedRadio::with_channel(&AppConfig::default());
        radio.add_peripheral(SimPeripheral::poi(A));
        radio.start_scan().unwrap();
        radio.start_scan().unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            TransportEvent::Advertisement {
                addr: A,
                name: b"Open Pixel Poi".to_vec()
            }
        );
        assert!(events.try_recv().is_err());
        assert_eq!(radio.scan_starts(), 1);
    }

    #[test]
    fn records_packets_and_flags_data_before_handshake() {
        let (radio, events) = SimulatedRadio::with_channel(&AppConfig::default());
        radio.add_peripheral(SimPeripheral::poi(A));
        radio.connect(A, Duration::from_secs(1)).unwrap();
        let TransportEvent::Connected { conn, .. } = events.try_recv().unwrap() else {
            panic!("expected a connection");
        };

        let data = [protocol::START_BYTE, Command::StreamData.code(), 1, 2, 3];
        radio.write_without_response(conn, RX_HANDLE, &data).unwrap();
        radio.write(conn, RX_HANDLE, &HANDSHAKE).unwrap();
        radio.write_without_response(conn, RX_HANDLE, &data).unwrap();

        assert_eq!(radio.handshakes(A), 1);
        assert_eq!(radio.data_packets(A), 2);
        assert_eq!(radio.data_before_handshake(A), 1);

        radio.fail_next_writes(A, 1, TransportError::BufferFull);
        assert_eq!(
            radio.write_without_response(conn, RX_HANDLE, &data),
            Err(TransportError::BufferFull)
        );
        assert_eq!(radio.packets(A).len(), 3);

        radio.drop_link(A);
        assert!(!radio.is_connected(A));
        assert_eq!(
            radio.write(conn, RX_HANDLE, &HANDSHAKE),
            Err(TransportError::NotConnected)
        );
    }

    #[test]
    fn packet_history_is_bounded_but_counters_are_not() {
        let (radio, events) = SimulatedRadio::with_channel(&AppConfig::default());
        radio.add_peripheral(SimPeripheral::poi(A));
        radio.connect(A, Duration::from_secs(1)).unwrap();
        let TransportEvent::Connected { conn, .. } = events.try_recv().unwrap() else {
            panic!("expected a connection");
        };

        radio.write(conn, RX_HANDLE, &HANDSHAKE).unwrap();
        let total = PACKET_HISTORY + 40;
        for i in 0..total {
            let data = [protocol::START_BYTE, Command::StreamData.code(), i as u8];
            radio.write_without_response(conn, RX_HANDLE, &data).unwrap();
        }

        let packets = radio.packets(A);
        assert_eq!(packets.len(), PACKET_HISTORY);
        assert_eq!(packets.last().unwrap()[2], (total - 1) as u8);
        assert_eq!(radio.received(A), total + 1);
        assert_eq!(radio.handshakes(A), 1);
        assert_eq!(radio.data_packets(A), total);
    }
}
