//! Diffie-Hellman key agreement over the packet channel.
//!
//! One round negotiates a single 64-bit word: the server generates a safe
//! prime `p = 2q + 1` and a generator of the order-`q` subgroup, sends both
//! with its intermediary `g^k mod p`, and each side raises the other's
//! intermediary by its own private scalar. Four rounds back to back assemble
//! the 256-bit session key.

use rand::Rng;
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::error::NetError;
use crate::net::{Channel, Tag, DATA_TIMEOUT};
use crate::prime;
use crate::Key;

/// The value sent across the wire: `g^k mod p`.
///
/// The exponent reduces to `k mod (p - 1)` first; by Fermat's little theorem
/// the `g^(p-1)` factors collapse to 1, so only the remainder matters.
pub fn compute_intermediary(p: u64, g: u64, k: u64) -> u64 {
    prime::raise(g, k % (p - 1), p)
}

/// Pick a generator of the order-`q` subgroup of `(Z/pZ)*`.
///
/// For a safe prime every quadratic non-residue works, so take the smallest
/// `h >= 2` whose `(p-1)/q`-th power is bigger than 1 and use that power as
/// the generator.
pub fn derive_generator(p: u64, q: u64) -> u64 {
    let exp = (p - 1) / q;
    let mut h = 2;
    while prime::raise(h, exp, p) <= 1 {
        h += 1;
    }
    prime::raise(h, exp, p)
}

/// Run one round of the exchange, producing one shared 64-bit word.
///
/// The server generates the public parameters and speaks first; the client
/// answers with its own intermediary. The private scalar never leaves this
/// function and is wiped before returning.
pub fn exchange_keys<R: Rng>(
    ch: &mut Channel,
    server: bool,
    rng: &mut R,
) -> Result<u64, NetError> {
    let mut k: u64 = rng.gen();

    let (a, p) = if server {
        let (p, q) = prime::generate(rng);
        let g = derive_generator(p, q);
        debug!("offering p = {p}, g = {g}");

        ch.send_value(&p, Tag::Data, DATA_TIMEOUT)?;
        ch.send_value(&g, Tag::Data, DATA_TIMEOUT)?;
        ch.send_value(&compute_intermediary(p, g, k), Tag::Data, DATA_TIMEOUT)?;
        let a: u64 = ch.recv_value(DATA_TIMEOUT)?;
        (a, p)
    } else {
        let p: u64 = ch.recv_value(DATA_TIMEOUT)?;
        let g: u64 = ch.recv_value(DATA_TIMEOUT)?;
        let a: u64 = ch.recv_value(DATA_TIMEOUT)?;
        if p < 3 {
            return Err(NetError::Parse);
        }
        debug!("received p = {p}, g = {g}");

        ch.send_value(&compute_intermediary(p, g, k), Tag::Data, DATA_TIMEOUT)?;
        (a, p)
    };

    let shared = prime::raise(a, k, p);
    k.zeroize();
    Ok(shared)
}

/// Assemble the full 256-bit session key by running the exchange four times.
pub fn construct_shared_key<R: Rng>(
    ch: &mut Channel,
    server: bool,
    rng: &mut R,
) -> Result<Key, NetError> {
    info!("exchanging keys as {}", if server { "server" } else { "client" });
    let mut sk: Key = [0; 4];
    for slot in &mut sk {
        *slot = exchange_keys(ch, server, rng)?;
    }
    Ok(sk)
}
