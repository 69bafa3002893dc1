//! Wire format spoken to the POI peripherals.
//!
//! Every packet starts with [`START_BYTE`] followed by a [`Command`] code.
//! A session must receive [`HANDSHAKE`] once before the peripheral accepts
//! `StreamData` packets.

use crate::frame::{PixelFrame, BYTES_PER_PIXEL};

pub const START_BYTE: u8 = 0xD0;

/// Fixed parameter byte carried by the start-stream command.
pub const START_STREAM_PARAM: u8 = 0xD1;

/// Header length of a data packet (start byte + command code).
pub const HEADER_LEN: usize = 2;

/// Command codes understood by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    StartStream = 21,
    /// Reserved for configuration queries; not sent by the streaming path.
    GetConfig = 23,
    StreamData = 24,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            21 => Ok(Self::StartStream),
            23 => Ok(Self::GetConfig),
            24 => Ok(Self::StreamData),
            other => Err(other),
        }
    }
}

pub const HANDSHAKE: [u8; 3] = [START_BYTE, Command::StartStream as u8, START_STREAM_PARAM];

pub fn data_packet_len(led_count: usize) -> usize {
    HEADER_LEN + led_count * BYTES_PER_PIXEL
}

/// Returns the command carried by a packet, if it is framed correctly.
pub fn decode_command(packet: &[u8]) -> Option<Command> {
    match packet {
        [START_BYTE, code, ..] => Command::try_from(*code).ok(),
        _ => None,
    }
}

/// Reusable `StreamData` packet buffer.
///
/// The header is written once; each cycle only the body is rewritten, so the
/// streaming path does not allocate.
#[derive(Debug, Clone)]
pub struct FramePacket {
    buf: Vec<u8>,
}

impl FramePacket {
    pub fn new(led_count: usize) -> Self {
        let mut buf = vec![0; data_packet_len(led_count)];
        buf[0] = START_BYTE;
        buf[1] = Command::StreamData.code();
        Self { buf }
    }

    /// Copies `frame` into the body, scaling every byte by `brightness`.
    ///
    /// Scaling truncates toward zero, so with `brightness <= 1.0` no channel
    /// ever grows and zero stays zero.
    pub fn load(&mut self, frame: &PixelFrame, brightness: f32) {
        let body = &mut self.buf[HEADER_LEN..];
        for (dst, src) in body.iter_mut().zip(frame.as_bytes()) {
            *dst = scale_byte(*src, brightness);
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.buf[HEADER_LEN..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

pub fn scale_byte(value: u8, factor: f32) -> u8 {
    (f32::from(value) * factor) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::color::Rgb;

    #[test]
    fn handshake_matches_wire_format() {
        assert_eq!(HANDSHAKE, [0xD0, 21, 0xD1]);
        assert_eq!(decode_command(&HANDSHAKE), Some(Command::StartStream));
        assert_eq!(decode_command(&[0xD0, 23]), Some(Command::GetConfig));
        assert_eq!(decode_command(&[0xD1, 24]), None);
        assert_eq!(decode_command(&[0xD0, 99]), None);
        assert_eq!(decode_command(&[0xD0]), None);
    }

    #[test]
    fn data_packet_has_header_and_scaled_body() {
        let mut frame = PixelFrame::new(21);
        frame.fill(Rgb::new(255, 100, 0));

        let mut packet = FramePacket::new(21);
        packet.load(&frame, 0.27);

        let bytes = packet.as_bytes();
        assert_eq!(bytes.len(), 65);
        assert_eq!(&bytes[..2], &[0xD0, 24]);
        assert_eq!(&bytes[2..5], &[68, 27, 0]);
        assert_eq!(decode_command(bytes), Some(Command::StreamData));
    }

    #[test]
    fn brightness_never_increases_a_channel() {
        let mut frame = PixelFrame::new(86);
        for (i, byte) in frame.as_bytes_mut().iter_mut().enumerate() {
            *byte = (i % 256) as u8;
        }
        for factor in [0.0, 0.27, 0.5, 0.999, 1.0] {
            let mut packet = FramePacket::new(86);
            packet.load(&frame, factor);
            for (scaled, original) in packet.body().iter().zip(frame.as_bytes()) {
                assert!(scaled <= original);
                if *original == 0 {
                    assert_eq!(*scaled, 0);
                }
            }
        }
    }

    #[test]
    fn reloading_does_not_compound_scaling() {
        let mut frame = PixelFrame::new(1);
        frame.fill(Rgb::new(200, 200, 200));
        let mut packet = FramePacket::new(1);
        packet.load(&frame, 0.5);
        packet.load(&frame, 0.5);
        assert_eq!(packet.body(), &[100, 100, 100]);
    }
}
