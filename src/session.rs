//! The peer session: connection lifecycle, key agreement, and the
//! request/acknowledge sub-protocols for messaging and key renewal.
//!
//! A session is IDLE until `listen` or `dial` lands a TCP connection and the
//! four-round key exchange completes; the peer that dialed plays the
//! parameter-generating server side of the exchange. While CONNECTED the
//! operator can wait for the peer's next request, send a message, renew the
//! keys, or terminate. Failures on the data path abort the operation in
//! progress but leave the connection standing so the operator can retry.
//!
//! The message sub-protocol on the wire, initiator on the left:
//!
//! ```text
//!  MESSAGE        -->
//!                 <--   ACK / REFUSED
//!  Nr             -->
//!  ciphertext     -->
//!  EMPTY/NONCE/IV -->         IV: GCM decrypt
//!  HMAC           -->         (ECB and CTR only)
//!                             check HMAC, decrypt
//! ```

use std::net::{SocketAddr, TcpListener, TcpStream};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::aes::{self, Mode};
use crate::crypto;
use crate::error::{NetError, SessionError};
use crate::exchange;
use crate::net::{self, Channel, Packet, Tag, DATA_TIMEOUT, OPERATOR_TIMEOUT};
use crate::Key;

/// Where the session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Connected,
}

/// Which cipher mode a message should use; the session draws the nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Ecb,
    Ctr,
    Gcm,
}

/// A request the peer has initiated. The operator answers it with
/// [`Session::accept_message`], [`Session::accept_reexchange`], or
/// [`Session::refuse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    Message,
    Reexchange,
}

/// A peer-to-peer session over one TCP connection.
pub struct Session {
    listener: Option<TcpListener>,
    channel: Option<Channel>,
    key: Key,
    rng: SmallRng,
}

impl Session {
    pub fn new() -> Self {
        Session {
            listener: None,
            channel: None,
            key: [0; 4],
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn status(&self) -> Status {
        if self.channel.is_some() {
            Status::Connected
        } else {
            Status::Idle
        }
    }

    /// The negotiated session key. All zeros while idle.
    pub fn session_key(&self) -> &Key {
        &self.key
    }

    /// Short fingerprint of the session key (each word mod 100) for the two
    /// operators to compare out loud.
    pub fn key_fingerprint(&self) -> String {
        format!(
            "{}{}{}{}",
            self.key[0] % 100,
            self.key[1] % 100,
            self.key[2] % 100,
            self.key[3] % 100
        )
    }

    /// Bind the listening socket if it is not already bound. The socket is
    /// kept across listen attempts so a timed-out wait can retry on the same
    /// port; [`terminate`] releases it.
    ///
    /// [`terminate`]: Session::terminate
    pub fn bind(&mut self, port: u16) -> Result<(), SessionError> {
        if self.listener.is_none() {
            let listener = TcpListener::bind(("0.0.0.0", port)).map_err(NetError::Io)?;
            info!("listening on {}", listener.local_addr().map_err(NetError::Io)?);
            self.listener = Some(listener);
        }
        Ok(())
    }

    /// The bound listening address, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Wait for an inbound peer, then run the key exchange as the client
    /// side. `port` is only consulted when no socket is bound yet.
    pub fn listen(&mut self, port: u16) -> Result<(), SessionError> {
        self.bind(port)?;
        let listener = self.listener.as_ref().expect("just bound");
        let stream = net::accept_timeout(listener, OPERATOR_TIMEOUT)?;
        self.establish(stream, false)
    }

    /// Connect out to a listening peer, then run the key exchange as the
    /// server side (the dialer generates the public parameters).
    pub fn dial(&mut self, addr: &str, port: u16) -> Result<(), SessionError> {
        let stream = TcpStream::connect((addr, port)).map_err(NetError::Io)?;
        self.establish(stream, true)
    }

    fn establish(&mut self, stream: TcpStream, server: bool) -> Result<(), SessionError> {
        let mut ch = Channel::new(stream);
        match exchange::construct_shared_key(&mut ch, server, &mut self.rng) {
            Ok(key) => {
                self.key = key;
                self.channel = Some(ch);
                info!("connected; key fingerprint {}", self.key_fingerprint());
                Ok(())
            }
            // The connection is dropped and the session stays idle.
            Err(e) => Err(e.into()),
        }
    }

    /// Release both sockets and wipe the session key.
    pub fn terminate(&mut self) {
        self.channel = None;
        self.listener = None;
        self.key.zeroize();
        info!("connection terminated");
    }

    fn channel_mut(&mut self) -> Result<&mut Channel, SessionError> {
        self.channel.as_mut().ok_or(SessionError::NotConnected)
    }

    /// Block (up to the operator timeout) for the peer's next request.
    pub fn await_request(&mut self) -> Result<Inbound, SessionError> {
        let p = self.channel_mut()?.recv_packet(OPERATOR_TIMEOUT);
        match p.tag {
            Tag::Message => Ok(Inbound::Message),
            Tag::Reexchange => Ok(Inbound::Reexchange),
            Tag::Error => Err(NetError::Recv.into()),
            got => Err(SessionError::Protocol {
                got,
                during: "waiting for a request",
            }),
        }
    }

    /// Decline the request most recently returned by [`await_request`].
    ///
    /// [`await_request`]: Session::await_request
    pub fn refuse(&mut self) -> Result<(), SessionError> {
        self.channel_mut()?
            .send_packet(&Packet::new(Tag::Refused), DATA_TIMEOUT)?;
        Ok(())
    }

    /// Encrypt `plaintext` and run the initiator side of the message
    /// sub-protocol.
    pub fn send_message(
        &mut self,
        plaintext: &[u8],
        rounds: u64,
        kind: ModeKind,
    ) -> Result<(), SessionError> {
        let key = self.key;
        let nonce: u64 = self.rng.gen();
        let ch = self.channel_mut()?;

        // Ask first; the peer's operator has to accept the transfer.
        ch.send_packet(&Packet::new(Tag::Message), DATA_TIMEOUT)?;
        let response = ch.recv_packet(OPERATOR_TIMEOUT);
        match response.tag {
            Tag::Ack => {}
            Tag::Refused => return Err(SessionError::Refused),
            Tag::Error => return Err(NetError::Recv.into()),
            Tag::Message => {
                return Err(SessionError::Collision(
                    "cannot send two messages at once; one peer must listen for the request",
                ))
            }
            got => {
                return Err(SessionError::Protocol {
                    got,
                    during: "awaiting acknowledgement of a message",
                })
            }
        }

        let mode = match kind {
            ModeKind::Ecb => Mode::Ecb,
            ModeKind::Ctr => Mode::Ctr(nonce),
            ModeKind::Gcm => Mode::Gcm(nonce),
        };
        let cipher = aes::encrypt(plaintext, &key, rounds, mode)?;

        let ch = self.channel_mut()?;
        ch.send_value(&rounds, Tag::Data, DATA_TIMEOUT)?;
        ch.send_string(&cipher, Tag::Data, DATA_TIMEOUT)?;

        // The mode marker doubles as nonce transport.
        match kind {
            ModeKind::Ecb => ch.send_packet(&Packet::new(Tag::Empty), DATA_TIMEOUT)?,
            ModeKind::Ctr => ch.send_value(&nonce, Tag::Nonce, DATA_TIMEOUT)?,
            ModeKind::Gcm => ch.send_value(&nonce, Tag::Iv, DATA_TIMEOUT)?,
        }

        // GCM authenticates itself; the other modes get an HMAC trailer.
        if kind != ModeKind::Gcm {
            let mac = crypto::message_mac(&cipher, &key, rounds)?;
            self.channel_mut()?
                .send_string(&mac, Tag::Data, DATA_TIMEOUT)?;
        }

        info!("message sent ({} bytes of ciphertext)", cipher.len());
        Ok(())
    }

    /// Accept an inbound message: acknowledge, then run the recipient side
    /// of the sub-protocol and return the decrypted bytes.
    ///
    /// Block modes zero-pad, so the plaintext may carry trailing zero bytes.
    pub fn accept_message(&mut self) -> Result<Vec<u8>, SessionError> {
        let key = self.key;
        let ch = self.channel_mut()?;
        ch.send_packet(&Packet::new(Tag::Ack), DATA_TIMEOUT)?;

        let rounds: u64 = ch.recv_value(DATA_TIMEOUT)?;
        let cipher = ch.recv_string(DATA_TIMEOUT)?;
        let marker = ch.recv_packet(DATA_TIMEOUT);

        match marker.tag {
            // GCM: the tag block carries the integrity check.
            Tag::Iv => {
                let nonce: u64 = marker.parse_value()?;
                Ok(aes::gcm::dec(&cipher, &key, rounds, nonce)?)
            }

            // ECB and CTR: verify the HMAC trailer before decrypting.
            Tag::Nonce | Tag::Empty => {
                let mac = ch.recv_string(DATA_TIMEOUT)?;
                if mac != crypto::message_mac(&cipher, &key, rounds)? {
                    warn!("HMAC mismatch on inbound message");
                    return Err(SessionError::HmacMismatch);
                }

                if marker.tag == Tag::Nonce {
                    let nonce: u64 = marker.parse_value()?;
                    Ok(aes::ctr(&cipher, &key, rounds, nonce)?)
                } else {
                    Ok(aes::inv_cipher(&cipher, &key, rounds)?)
                }
            }

            Tag::Error => Err(NetError::Recv.into()),
            got => Err(SessionError::Protocol {
                got,
                during: "receiving the mode marker",
            }),
        }
    }

    /// Ask the peer to regenerate the shared keys. On acknowledgement both
    /// sides re-run the exchange with the roles reversed: the accepting peer
    /// generates the new parameters.
    pub fn reexchange(&mut self) -> Result<(), SessionError> {
        let ch = self.channel_mut()?;
        ch.send_packet(&Packet::new(Tag::Reexchange), DATA_TIMEOUT)?;

        let response = ch.recv_packet(OPERATOR_TIMEOUT);
        match response.tag {
            Tag::Ack => {}
            Tag::Refused => return Err(SessionError::Refused),
            Tag::Error => return Err(NetError::Recv.into()),
            Tag::Reexchange => {
                return Err(SessionError::Collision(
                    "to perform a re-exchange, one peer must listen for the request",
                ))
            }
            got => {
                return Err(SessionError::Protocol {
                    got,
                    during: "awaiting acknowledgement of a re-exchange",
                })
            }
        }

        self.renew_key(false)
    }

    /// Acknowledge the peer's re-exchange request and run our (serving)
    /// half of it.
    pub fn accept_reexchange(&mut self) -> Result<(), SessionError> {
        self.channel_mut()?
            .send_packet(&Packet::new(Tag::Ack), DATA_TIMEOUT)?;
        self.renew_key(true)
    }

    fn renew_key(&mut self, server: bool) -> Result<(), SessionError> {
        // Split the borrows: the channel and the rng live side by side.
        let Session {
            channel, rng, key, ..
        } = self;
        let ch = channel.as_mut().ok_or(SessionError::NotConnected)?;

        let new = exchange::construct_shared_key(ch, server, rng)?;
        key.zeroize();
        *key = new;
        info!("keys renewed; fingerprint {}", self.key_fingerprint());
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    /// A connected session plus a raw channel playing the peer by script.
    fn scripted_pair(key: Key) -> (Session, Channel) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || listener.accept().unwrap().0);
        let client = TcpStream::connect(addr).unwrap();
        let server = handle.join().unwrap();

        let mut session = Session::new();
        session.channel = Some(Channel::new(client));
        session.key = key;
        (session, Channel::new(server))
    }

    #[test]
    fn refused_message_surfaces() {
        let (mut session, mut peer) = scripted_pair([1, 2, 3, 4]);
        let handle = thread::spawn(move || {
            let p = peer.recv_packet(DATA_TIMEOUT);
            assert_eq!(p.tag, Tag::Message);
            peer.send_packet(&Packet::new(Tag::Refused), DATA_TIMEOUT)
                .unwrap();
        });
        let err = session.send_message(b"hi", 10, ModeKind::Ecb).unwrap_err();
        assert!(matches!(err, SessionError::Refused));
        handle.join().unwrap();
        assert_eq!(session.status(), Status::Connected);
    }

    #[test]
    fn simultaneous_messages_collide() {
        let (mut session, mut peer) = scripted_pair([1, 2, 3, 4]);
        let handle = thread::spawn(move || {
            let p = peer.recv_packet(DATA_TIMEOUT);
            assert_eq!(p.tag, Tag::Message);
            peer.send_packet(&Packet::new(Tag::Message), DATA_TIMEOUT)
                .unwrap();
        });
        let err = session.send_message(b"hi", 10, ModeKind::Ecb).unwrap_err();
        assert!(matches!(err, SessionError::Collision(_)));
        handle.join().unwrap();
    }

    #[test]
    fn simultaneous_reexchanges_collide() {
        let (mut session, mut peer) = scripted_pair([1, 2, 3, 4]);
        let handle = thread::spawn(move || {
            let p = peer.recv_packet(DATA_TIMEOUT);
            assert_eq!(p.tag, Tag::Reexchange);
            peer.send_packet(&Packet::new(Tag::Reexchange), DATA_TIMEOUT)
                .unwrap();
        });
        let err = session.reexchange().unwrap_err();
        assert!(matches!(err, SessionError::Collision(_)));
        handle.join().unwrap();
    }

    #[test]
    fn tampered_hmac_refuses_decryption() {
        let key: Key = [5, 6, 7, 8];
        let (mut session, mut peer) = scripted_pair(key);

        let handle = thread::spawn(move || {
            // Play the initiator by hand with a corrupted trailer.
            peer.send_packet(&Packet::new(Tag::Message), DATA_TIMEOUT)
                .unwrap();
            let ack = peer.recv_packet(DATA_TIMEOUT);
            assert_eq!(ack.tag, Tag::Ack);

            let cipher = aes::cipher(b"secret", &key, 10).unwrap();
            peer.send_value(&10u64, Tag::Data, DATA_TIMEOUT).unwrap();
            peer.send_string(&cipher, Tag::Data, DATA_TIMEOUT).unwrap();
            peer.send_packet(&Packet::new(Tag::Empty), DATA_TIMEOUT)
                .unwrap();

            let mut mac = crypto::message_mac(&cipher, &key, 10).unwrap();
            mac[0] ^= 0xff;
            peer.send_string(&mac, Tag::Data, DATA_TIMEOUT).unwrap();
        });

        assert_eq!(session.await_request().unwrap(), Inbound::Message);
        let err = session.accept_message().unwrap_err();
        assert!(matches!(err, SessionError::HmacMismatch));
        handle.join().unwrap();
    }

    #[test]
    fn unexpected_marker_is_a_protocol_error() {
        let key: Key = [5, 6, 7, 8];
        let (mut session, mut peer) = scripted_pair(key);

        let handle = thread::spawn(move || {
            peer.send_packet(&Packet::new(Tag::Message), DATA_TIMEOUT)
                .unwrap();
            let _ack = peer.recv_packet(DATA_TIMEOUT);
            peer.send_value(&10u64, Tag::Data, DATA_TIMEOUT).unwrap();
            peer.send_string(b"junk", Tag::Data, DATA_TIMEOUT).unwrap();
            // An ACK is never a valid mode marker.
            peer.send_packet(&Packet::new(Tag::Ack), DATA_TIMEOUT)
                .unwrap();
        });

        assert_eq!(session.await_request().unwrap(), Inbound::Message);
        let err = session.accept_message().unwrap_err();
        assert!(matches!(err, SessionError::Protocol { got: Tag::Ack, .. }));
        handle.join().unwrap();
    }

    #[test]
    fn await_request_times_out_cleanly() {
        let (mut session, _peer) = scripted_pair([0; 4]);
        // Shrink the wait by dropping to the data timeout via a raw recv.
        let p = session
            .channel
            .as_mut()
            .unwrap()
            .recv_packet(Duration::from_millis(100));
        assert_eq!(p.tag, Tag::Error);
        assert_eq!(session.status(), Status::Connected);
    }

    #[test]
    fn terminate_wipes_the_key() {
        let (mut session, _peer) = scripted_pair([9, 9, 9, 9]);
        assert_eq!(session.status(), Status::Connected);
        session.terminate();
        assert_eq!(session.status(), Status::Idle);
        assert_eq!(session.session_key(), &[0; 4]);
    }
}
