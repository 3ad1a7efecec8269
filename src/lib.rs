//! A teaching implementation of AES and Diffie-Hellman, wired into a
//! peer-to-peer encrypted messenger.
//!
//! Every primitive is built from first principles and kept legible: byte
//! field arithmetic, the key schedule, the round transforms, GHASH, modular
//! exponentiation, safe-prime generation. Where a production implementation
//! would reach for a lookup table or a vetted library, this crate spells the
//! computation out.
//!
//! # This is not production cryptography
//!
//! Do not protect real data with this crate. The limitations are structural
//! and deliberate, because they are the parts worth studying:
//!
//! - Diffie-Hellman runs over 64-bit primes, which a laptop can break.
//! - Nonces, IVs, and private scalars come from a non-cryptographic PRNG.
//! - The GCM counter only increments its low 32 bits.
//! - Key exchange is unauthenticated; an active attacker can sit in the
//!   middle of it.
//!
//! Anything that needs actual secrecy should use a maintained, audited
//! cryptography library instead.

pub mod aes;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod net;
pub mod prime;
pub mod session;

/// The 256-bit session key: four 64-bit words, one per exchange round.
/// AES-128/192/256 consume the first 2, 3, or all 4 words.
pub type Key = [u64; 4];

/// Warning text the binaries print on startup.
pub const SECURITY_DISCLAIMER: &str =
    "This program is a teaching tool. Its cryptography is deliberately weak \
     and must not be used to protect real data.";

/// Pack up to 32 key bytes into the four 64-bit key words, little-endian,
/// zero-filling whatever the input does not cover. Callers are responsible
/// for rejecting inputs longer than the selected key size.
pub fn key_from_bytes(bytes: &[u8]) -> Key {
    let mut key: Key = [0; 4];
    for (i, &byte) in bytes.iter().take(32).enumerate() {
        key[i / 8] |= (byte as u64) << (8 * (i % 8));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_from_bytes_is_little_endian() {
        let key = key_from_bytes(&[0x01, 0x02, 0x03]);
        assert_eq!(key, [0x0003_0201, 0, 0, 0]);
    }

    #[test]
    fn key_from_bytes_fills_all_words() {
        let bytes: Vec<u8> = (0..32).collect();
        let key = key_from_bytes(&bytes);
        assert_eq!(key[0], 0x0706_0504_0302_0100);
        assert_eq!(key[3], 0x1f1e_1d1c_1b1a_1918);
    }

    #[test]
    fn key_from_bytes_ignores_excess() {
        let long = vec![0xff; 40];
        assert_eq!(key_from_bytes(&long), [u64::MAX; 4]);
    }
}
