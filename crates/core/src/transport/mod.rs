//! Seam between the controller and the BLE central stack.
//!
//! Calls on [`Transport`] only *start* operations. Their outcomes arrive
//! later as [`TransportEvent`]s on the channel the transport was built with,
//! which the session manager drains on its own thread.

use std::{fmt, time::Duration};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;

/// Six-byte device address of an advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PeerAddress(pub [u8; 6]);

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Stack-assigned identifier of an open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnHandle(pub u16);

/// Attribute handle of a characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CharHandle(pub u16);

/// Connection timing hints requested after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkParams {
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

impl From<&crate::LinkConfig> for LinkParams {
    fn from(config: &crate::LinkConfig) -> Self {
        Self {
            interval_min: config.interval_min,
            interval_max: config.interval_max,
            latency: config.latency,
            supervision_timeout: config.supervision_timeout,
        }
    }
}

/// Asynchronous notifications from the central stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An advertisement was received while scanning. `name` is the raw
    /// advertised local name, possibly truncated.
    Advertisement { addr: PeerAddress, name: Vec<u8> },
    /// The stack ended a scan on its own.
    ScanComplete,
    Connected { addr: PeerAddress, conn: ConnHandle },
    ConnectFailed { addr: PeerAddress, status: i32 },
    CharacteristicFound {
        conn: ConnHandle,
        uuid: u128,
        handle: CharHandle,
    },
    DiscoveryComplete { conn: ConnHandle },
    DiscoveryFailed { conn: ConnHandle, status: i32 },
    Disconnected { conn: ConnHandle, reason: i32 },
}

/// Errors reported synchronously when an operation cannot be started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Outgoing buffers are exhausted; the write was not queued.
    #[error("transmit buffers are full")]
    BufferFull,
    #[error("operation timed out")]
    Timeout,
    #[error("connection is not open")]
    NotConnected,
    #[error("no such peer")]
    UnknownPeer,
    #[error("stack rejected the request with status {code}")]
    Rejected { code: i32 },
    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    /// Whether the condition clears by itself, so the caller should simply
    /// try again on its next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BufferFull | Self::Timeout)
    }
}

pub type TransportResult<T = ()> = std::result::Result<T, TransportError>;

/// Operations the controller needs from a BLE central.
pub trait Transport: Send + Sync {
    /// Starts active scanning with duplicate filtering. Starting while a scan
    /// is already running is not an error.
    fn start_scan(&self) -> TransportResult;
    fn cancel_scan(&self) -> TransportResult;
    fn connect(&self, addr: PeerAddress, timeout: Duration) -> TransportResult;
    fn disconnect(&self, conn: ConnHandle) -> TransportResult;
    fn exchange_mtu(&self, conn: ConnHandle, mtu: u16) -> TransportResult;
    fn update_link_params(&self, conn: ConnHandle, params: LinkParams) -> TransportResult;
    fn discover_characteristics(&self, conn: ConnHandle) -> TransportResult;
    /// Acknowledged write.
    fn write(&self, conn: ConnHandle, handle: CharHandle, data: &[u8]) -> TransportResult;
    /// Fire-and-forget write. Returns [`TransportError::BufferFull`] instead
    /// of blocking when the stack cannot take more data.
    fn write_without_response(
        &self,
        conn: ConnHandle,
        handle: CharHandle,
        data: &[u8],
    ) -> TransportResult;
}

/// Creates the channel a transport reports its events on.
pub fn event_channel() -> (Sender<TransportEvent>, Receiver<TransportEvent>) {
    unbounded()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_addresses_like_the_stack() {
        let addr = PeerAddress([0xc4, 0x5b, 0xbe, 0x01, 0x02, 0x0a]);
        assert_eq!(addr.to_string(), "c4:5b:be:01:02:0a");
    }

    #[test]
    fn only_backpressure_is_transient() {
        assert!(TransportError::BufferFull.is_transient());
        assert!(TransportError::Timeout.is_transient());
        assert!(!TransportError::NotConnected.is_transient());
        assert!(!TransportError::Rejected { code: 7 }.is_transient());
    }
}
