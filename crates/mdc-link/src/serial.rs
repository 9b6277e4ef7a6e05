use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use mdc_proto::packet::{Packet, SNIFFER_ID};
use tokio_serial::SerialPort;
use tracing::{debug, info, trace, warn};

use crate::transport::{Transport, TransportError};

const SYNC: u8 = 0x7E;
const ESCAPE: u8 = 0x7D;
const XOR: u8 = 0x20;

const PROTO_ACK: u8 = 0x43;
const PROTO_PACKET_ACK: u8 = 0x44;
const PROTO_PACKET_NOACK: u8 = 0x45;
const DISPATCH_AM: u8 = 0x00;

const BROADCAST: u16 = 0xFFFF;
const AM_GROUP: u8 = 0x22;
const AM_HEADER_LEN: usize = 7;
const MAX_FRAME: usize = 256;

pub fn default_candidate_devs() -> Vec<String> {
    (0..10).map(|i| format!("/dev/ttyUSB{i}")).collect()
}

pub fn default_baud() -> u32 {
    57600
}

pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &b in data {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}

/// Wraps an AM payload into a complete no-ack serial frame.
pub fn encode_frame(payload: &[u8], am_type: u8) -> Bytes {
    let mut body = BytesMut::with_capacity(2 + AM_HEADER_LEN + payload.len() + 2);
    body.put_u8(PROTO_PACKET_NOACK);
    body.put_u8(DISPATCH_AM);
    body.put_u16(BROADCAST);
    body.put_u16(SNIFFER_ID as u16);
    body.put_u8(payload.len() as u8);
    body.put_u8(AM_GROUP);
    body.put_u8(am_type);
    body.put_slice(payload);
    let crc = crc16(&body);
    body.put_u16_le(crc);

    let mut out = BytesMut::with_capacity(body.len() * 2 + 2);
    out.put_u8(SYNC);
    for &b in body.iter() {
        if b == SYNC || b == ESCAPE {
            out.put_u8(ESCAPE);
            out.put_u8(b ^ XOR);
        } else {
            out.put_u8(b);
        }
    }
    out.put_u8(SYNC);
    out.freeze()
}

/// Incremental frame splitter; yields unescaped, CRC-checked frame bodies
/// (trailing CRC removed).
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    in_frame: bool,
    escaped: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) -> Option<Bytes> {
        if byte == SYNC {
            let done = self.in_frame && self.buf.len() > 2;
            self.in_frame = true;
            self.escaped = false;
            if !done {
                self.buf.clear();
                return None;
            }
            let frame = self.buf.split();
            return check_crc(frame);
        }
        if !self.in_frame {
            return None;
        }
        if self.buf.len() >= MAX_FRAME {
            trace!("serial: oversized frame dropped");
            self.buf.clear();
            self.in_frame = false;
            return None;
        }
        if byte == ESCAPE {
            self.escaped = true;
        } else if self.escaped {
            self.buf.put_u8(byte ^ XOR);
            self.escaped = false;
        } else {
            self.buf.put_u8(byte);
        }
        None
    }
}

fn check_crc(mut frame: BytesMut) -> Option<Bytes> {
    let body_len = frame.len() - 2;
    let got = u16::from_le_bytes([frame[body_len], frame[body_len + 1]]);
    let want = crc16(&frame[..body_len]);
    if got != want {
        trace!("serial: crc mismatch got={:#06x} want={:#06x}", got, want);
        return None;
    }
    frame.truncate(body_len);
    Some(frame.freeze())
}

/// AM payload of a data frame; `None` for acks and non-AM dispatch.
pub fn frame_payload(frame: &[u8]) -> Option<(u8, &[u8])> {
    let rest = match *frame.first()? {
        PROTO_PACKET_NOACK => &frame[1..],
        PROTO_PACKET_ACK => frame.get(2..)?,
        PROTO_ACK => return None,
        other => {
            trace!("serial: unknown protocol byte {:#04x}", other);
            return None;
        }
    };
    if *rest.first()? != DISPATCH_AM {
        return None;
    }
    let header = rest.get(1..1 + AM_HEADER_LEN)?;
    let len = header[4] as usize;
    let am_type = header[6];
    let payload = rest.get(1 + AM_HEADER_LEN..1 + AM_HEADER_LEN + len)?;
    Some((am_type, payload))
}

/// TinyOS serial framing: `0x7E`-delimited, `0x7D` escapes, CRC-16/XMODEM
/// over the unescaped body, appended little-endian.
pub struct SerialTransport {
    dev: String,
    port: Box<dyn SerialPort>,
    decoder: FrameDecoder,
    pending: VecDeque<Packet>,
    timeout: Duration,
}

impl SerialTransport {
    pub fn open(dev: &str, baud: u32) -> Result<Self, TransportError> {
        let timeout = Duration::from_millis(1);
        let port = tokio_serial::new(dev, baud).timeout(timeout).open()?;
        info!("serial: opened mote link {} @ {}", dev, baud);
        Ok(Self {
            dev: dev.to_string(),
            port,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            timeout,
        })
    }

    /// First candidate device that opens.
    pub fn open_first(candidates: &[String], baud: u32) -> Result<Self, TransportError> {
        for dev in candidates {
            match Self::open(dev, baud) {
                Ok(t) => return Ok(t),
                Err(e) => debug!("serial: {} not usable: {}", dev, e),
            }
        }
        Err(TransportError::Unavailable(format!("tried {} device(s)", candidates.len())))
    }

    pub fn device(&self) -> &str {
        &self.dev
    }

    fn ingest(&mut self, bytes: &[u8]) {
        for &b in bytes {
            let Some(frame) = self.decoder.push(b) else { continue };
            let Some((_am_type, payload)) = frame_payload(&frame) else { continue };
            match Packet::decode(payload) {
                Ok(p) => self.pending.push_back(p),
                Err(e) => warn!("serial: undecodable payload from mote: {}", e),
            }
        }
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, packet: &Packet, am_type: u8) -> Result<(), TransportError> {
        let frame = encode_frame(&packet.encode(), am_type);
        self.port.write_all(&frame)?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Packet>, TransportError> {
        if let Some(p) = self.pending.pop_front() {
            return Ok(Some(p));
        }
        if timeout != self.timeout {
            self.port.set_timeout(timeout)?;
            self.timeout = timeout;
        }
        let mut buf = [0u8; 64];
        match self.port.read(&mut buf) {
            Ok(n) => self.ingest(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }
        Ok(self.pending.pop_front())
    }
}
