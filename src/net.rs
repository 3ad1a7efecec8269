//! Packet framing between two peers over a single TCP stream.
//!
//! Every wire record is exactly 1025 bytes: one tag byte followed by a
//! 1024-byte payload. Numbers travel as decimal text, null-padded; byte
//! strings travel as a u64 length followed by payload packets, the last one
//! tagged [`Tag::Final`]. Each send and receive carries its own timeout, and
//! a timed-out or broken receive surfaces as an [`Tag::Error`] packet so the
//! layers above can recover without tearing the connection down.

use std::fmt;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::NetError;

/// Payload bytes per packet.
pub const PACKET_SIZE: usize = 1024;

/// Timeout for data-path sends and receives.
pub const DATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for waits on the operator of the other peer (accepting a
/// connection, answering a request).
pub const OPERATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Metadata tag carried by every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// Something went wrong; synthesized locally on timeout or disconnect.
    Error = 0,
    /// A packet with nothing in it (the ECB mode marker).
    Empty = 1,
    /// A packet of data.
    Data = 2,
    /// A packet containing an HMAC string.
    Hmac = 3,
    /// A packet containing a CTR nonce value.
    Nonce = 4,
    /// A packet containing the GCM IV/nonce.
    Iv = 5,
    /// The final packet of a string transfer.
    Final = 6,
    /// A request to begin a message exchange.
    Message = 7,
    /// An acknowledgement.
    Ack = 8,
    /// A refusal of a request.
    Refused = 9,
    /// A request to regenerate the shared keys.
    Reexchange = 10,
}

impl Tag {
    pub fn from_byte(byte: u8) -> Option<Tag> {
        Some(match byte {
            0 => Tag::Error,
            1 => Tag::Empty,
            2 => Tag::Data,
            3 => Tag::Hmac,
            4 => Tag::Nonce,
            5 => Tag::Iv,
            6 => Tag::Final,
            7 => Tag::Message,
            8 => Tag::Ack,
            9 => Tag::Refused,
            10 => Tag::Reexchange,
            _ => return None,
        })
    }
}

/// One wire record: a tag plus an opaque payload.
pub struct Packet {
    pub tag: Tag,
    pub data: [u8; PACKET_SIZE],
}

impl Packet {
    pub fn new(tag: Tag) -> Self {
        Packet {
            tag,
            data: [0; PACKET_SIZE],
        }
    }

    /// The packet synthesized for a failed receive.
    pub fn error() -> Self {
        Packet::new(Tag::Error)
    }

    /// Parse the payload's null-terminated decimal text back into a value.
    pub fn parse_value<T: FromStr>(&self) -> Result<T, NetError> {
        let end = self.data.iter().position(|&b| b == 0).unwrap_or(PACKET_SIZE);
        let text = std::str::from_utf8(&self.data[..end]).map_err(|_| NetError::Parse)?;
        text.parse().map_err(|_| NetError::Parse)
    }
}

/// The packet channel to a connected peer.
pub struct Channel {
    stream: TcpStream,
}

impl Channel {
    pub fn new(stream: TcpStream) -> Self {
        Channel { stream }
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Send one packet, waiting at most `timeout` for the stream to drain.
    pub fn send_packet(&mut self, p: &Packet, timeout: Duration) -> Result<(), NetError> {
        self.stream
            .set_write_timeout(Some(timeout))
            .map_err(|_| NetError::Send)?;

        let mut buf = [0u8; 1 + PACKET_SIZE];
        buf[0] = p.tag as u8;
        buf[1..].copy_from_slice(&p.data);
        self.stream.write_all(&buf).map_err(|_| NetError::Send)
    }

    /// Receive one packet. A timeout, disconnect, or garbled tag byte comes
    /// back as an [`Tag::Error`] packet rather than an `Err`, so callers that
    /// branch on tags handle failure the same way they handle refusal.
    pub fn recv_packet(&mut self, timeout: Duration) -> Packet {
        if self.stream.set_read_timeout(Some(timeout)).is_err() {
            return Packet::error();
        }

        let mut buf = [0u8; 1 + PACKET_SIZE];
        if let Err(e) = self.stream.read_exact(&mut buf) {
            debug!("receive failed: {e}");
            return Packet::error();
        }

        let Some(tag) = Tag::from_byte(buf[0]) else {
            warn!("peer sent unknown tag byte {:#04x}", buf[0]);
            return Packet::error();
        };

        let mut p = Packet::new(tag);
        p.data.copy_from_slice(&buf[1..]);
        p
    }

    /// Send a value as tagged decimal text. Fails if the text does not fit
    /// in a single payload.
    pub fn send_value<T: fmt::Display>(
        &mut self,
        value: &T,
        tag: Tag,
        timeout: Duration,
    ) -> Result<(), NetError> {
        let text = value.to_string();
        if text.len() > PACKET_SIZE {
            return Err(NetError::Oversize);
        }

        let mut p = Packet::new(tag);
        p.data[..text.len()].copy_from_slice(text.as_bytes());
        self.send_packet(&p, timeout)
    }

    /// Receive a value sent by [`send_value`].
    ///
    /// An error packet is rejected here; a timed-out receive must surface to
    /// the caller, never parse as a value.
    ///
    /// [`send_value`]: Channel::send_value
    pub fn recv_value<T: FromStr>(&mut self, timeout: Duration) -> Result<T, NetError> {
        let p = self.recv_packet(timeout);
        if p.tag == Tag::Error {
            return Err(NetError::Recv);
        }
        p.parse_value()
    }

    /// Send a byte string of any size: a u64 length first, then payload
    /// packets carrying `tag`, the last one tagged [`Tag::Final`].
    pub fn send_string(
        &mut self,
        message: &[u8],
        tag: Tag,
        timeout: Duration,
    ) -> Result<(), NetError> {
        self.send_value(&(message.len() as u64), Tag::Data, timeout)?;

        let mut chunks: Vec<&[u8]> = message.chunks(PACKET_SIZE).collect();
        if chunks.is_empty() {
            // An empty string still needs its closing packet.
            chunks.push(&[]);
        }

        let last = chunks.len() - 1;
        for (i, chunk) in chunks.iter().enumerate() {
            let mut p = Packet::new(if i == last { Tag::Final } else { tag });
            p.data[..chunk.len()].copy_from_slice(chunk);
            self.send_packet(&p, timeout)?;
        }
        Ok(())
    }

    /// Receive a byte string: accumulate payloads until the [`Tag::Final`]
    /// packet, then trim the zero padding back to the declared length.
    pub fn recv_string(&mut self, timeout: Duration) -> Result<Vec<u8>, NetError> {
        let length: u64 = self.recv_value(timeout)?;

        let mut ret = Vec::new();
        loop {
            let p = self.recv_packet(timeout);
            if p.tag == Tag::Error {
                return Err(NetError::Recv);
            }
            ret.extend_from_slice(&p.data);
            if p.tag == Tag::Final {
                break;
            }
        }

        ret.truncate(length as usize);
        Ok(ret)
    }
}

/// Wait up to `timeout` for an inbound peer on `listener`.
pub fn accept_timeout(listener: &TcpListener, timeout: Duration) -> Result<TcpStream, NetError> {
    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + timeout;

    loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("accepted peer {addr}");
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(NetError::Recv);
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
