//! AES from first principles: 128/192/256-bit keys in ECB, CTR, and GCM.
//!
//! Every primitive is computed explicitly (field arithmetic, S-box, key
//! schedule, round transforms) so the algorithm stays legible. None of this
//! is hardened cryptography; see the crate documentation.
//!
//! The round drivers follow the application's historical numbering, in which
//! the closing AddRoundKey reuses round `Nr - 1`. The [`fips`] module holds
//! drivers with the standard FIPS-197 numbering and byte layout, validated
//! against the Appendix C vectors.

pub mod block;
pub mod gcm;
pub mod gf;
pub mod key;
pub mod state;

use crate::error::CryptoError;
use crate::Key;
use self::block::Block;
use self::state::State;

/// Byte order used to encode a 64-bit nonce into the cipher input. The
/// native convention is little-endian; `Big` exists for interoperating with
/// peers that serialized their counters the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    pub fn encode(self, value: u64) -> [u8; 8] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }
}

/// Cipher mode plus its per-mode metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Raw block encryption. No nonce; identical plaintext blocks produce
    /// identical ciphertext blocks.
    Ecb,
    /// Counter mode keyed by a 64-bit starting nonce.
    Ctr(u64),
    /// Galois/Counter mode keyed by a 64-bit nonce; authenticates the
    /// ciphertext with a trailing tag block.
    Gcm(u64),
}

/// Encrypt `input` under the selected mode.
pub fn encrypt(input: &[u8], key: &Key, rounds: u64, mode: Mode) -> Result<Vec<u8>, CryptoError> {
    match mode {
        Mode::Ecb => cipher(input, key, rounds),
        Mode::Ctr(nonce) => ctr(input, key, rounds, nonce),
        Mode::Gcm(nonce) => gcm::enc(input, key, rounds, nonce),
    }
}

/// Decrypt `input` under the selected mode.
///
/// GCM verifies the trailing tag first and fails with
/// [`CryptoError::Authentication`] before touching the payload.
pub fn decrypt(input: &[u8], key: &Key, rounds: u64, mode: Mode) -> Result<Vec<u8>, CryptoError> {
    match mode {
        Mode::Ecb => inv_cipher(input, key, rounds),
        Mode::Ctr(nonce) => ctr(input, key, rounds, nonce),
        Mode::Gcm(nonce) => gcm::dec(input, key, rounds, nonce),
    }
}

/// Encrypt a byte string block by block. On its own this is ECB.
pub fn cipher(input: &[u8], key: &Key, rounds: u64) -> Result<Vec<u8>, CryptoError> {
    let mut s = State::new(input, key, rounds)?;
    s.add_round_key(0);

    for x in 0..rounds - 1 {
        s.sub_bytes();
        s.shift_rows();
        s.mix_columns();
        s.add_round_key(x + 1);
    }

    s.sub_bytes();
    s.shift_rows();
    // The closing AddRoundKey reuses round Nr - 1; fips::cipher applies
    // round Nr here instead.
    s.add_round_key(rounds - 1);

    Ok(s.unravel())
}

/// Invert [`cipher`]. AddRoundKey is plain XOR, so replaying the rounds in
/// reverse undoes it without a dedicated inverse.
pub fn inv_cipher(input: &[u8], key: &Key, rounds: u64) -> Result<Vec<u8>, CryptoError> {
    let mut s = State::new(input, key, rounds)?;
    s.add_round_key(rounds - 1);

    for x in (1..rounds).rev() {
        s.inv_shift_rows();
        s.inv_sub_bytes();
        s.add_round_key(x);
        s.inv_mix_columns();
    }

    s.inv_shift_rows();
    s.inv_sub_bytes();
    s.add_round_key(0);

    Ok(s.unravel())
}

/// Counter mode with the default little-endian nonce encoding.
pub fn ctr(input: &[u8], key: &Key, rounds: u64, nonce: u64) -> Result<Vec<u8>, CryptoError> {
    ctr_with(input, key, rounds, nonce, ByteOrder::default())
}

/// Counter mode: XOR each block against the encryption of an incrementing
/// 64-bit counter. Running the same call twice restores the input, so this
/// one function is both encrypt and decrypt.
///
/// The output is truncated to the input length; the zero padding of the last
/// block never reaches the caller.
pub fn ctr_with(
    input: &[u8],
    key: &Key,
    rounds: u64,
    mut nonce: u64,
    order: ByteOrder,
) -> Result<Vec<u8>, CryptoError> {
    let mut s = State::new(input, key, rounds)?;

    for block in s.blocks_mut().iter_mut() {
        // The eight counter bytes become one zero-padded block; its
        // encryption is the pad for this block.
        let pad = Block::from_chunk(&cipher(&order.encode(nonce), key, rounds)?);
        block.xor(&pad);
        nonce = nonce.wrapping_add(1);
    }

    let mut out = s.unravel();
    out.truncate(input.len());
    Ok(out)
}

/// FIPS-197 conformant drivers.
///
/// Same primitives, standard numbering: the schedule words are read as
/// big-endian groups of the key byte stream, round keys XOR straight down
/// the state columns, and the closing AddRoundKey uses round `Nr`.
pub mod fips {
    use super::key::Seeding;
    use super::{CryptoError, Key, State};

    pub fn cipher(input: &[u8], key: &Key, rounds: u64) -> Result<Vec<u8>, CryptoError> {
        let mut s = State::with_seeding(input, key, rounds, Seeding::BigEndian)?;
        s.add_round_key_fips(0);

        for round in 1..rounds {
            s.sub_bytes();
            s.shift_rows();
            s.mix_columns();
            s.add_round_key_fips(round);
        }

        s.sub_bytes();
        s.shift_rows();
        s.add_round_key_fips(rounds);

        Ok(s.unravel())
    }

    pub fn inv_cipher(input: &[u8], key: &Key, rounds: u64) -> Result<Vec<u8>, CryptoError> {
        let mut s = State::with_seeding(input, key, rounds, Seeding::BigEndian)?;
        s.add_round_key_fips(rounds);

        for round in (1..rounds).rev() {
            s.inv_shift_rows();
            s.inv_sub_bytes();
            s.add_round_key_fips(round);
            s.inv_mix_columns();
        }

        s.inv_shift_rows();
        s.inv_sub_bytes();
        s.add_round_key_fips(0);

        Ok(s.unravel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecb_round_trip_every_key_size() {
        let key: Key = [0xdead_beef, 0xcafe_f00d, 0x0123_4567_89ab_cdef, 42];
        let block = *b"exactly 16 bytes";
        for rounds in [10, 12, 14] {
            let ct = cipher(&block, &key, rounds).unwrap();
            assert_ne!(ct, block.to_vec());
            assert_eq!(inv_cipher(&ct, &key, rounds).unwrap(), block.to_vec());
        }
    }

    #[test]
    fn ecb_pads_and_round_trips_long_input() {
        let key: Key = [1, 2, 3, 4];
        let msg = b"a message spanning multiple blocks, not block aligned";
        let ct = cipher(msg, &key, 14).unwrap();
        assert_eq!(ct.len() % 16, 0);
        let pt = inv_cipher(&ct, &key, 14).unwrap();
        assert_eq!(&pt[..msg.len()], msg.as_slice());
        assert!(pt[msg.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn ctr_is_its_own_inverse() {
        let key: Key = [0, 0, 0, 0];
        let once = ctr(b"abc", &key, 12, 42).unwrap();
        assert_eq!(ctr(&once, &key, 12, 42).unwrap(), b"abc".to_vec());
    }

    #[test]
    fn ctr_preserves_length() {
        let key: Key = [9, 9, 9, 9];
        let msg = vec![0x5a; 100];
        let ct = ctr(&msg, &key, 10, 7).unwrap();
        assert_eq!(ct.len(), 100);
        assert_eq!(ctr(&ct, &key, 10, 7).unwrap(), msg);
    }

    #[test]
    fn ctr_big_endian_nonce_round_trips() {
        let key: Key = [3, 1, 4, 1];
        let msg = b"ordering test";
        let ct = ctr_with(msg, &key, 10, 0x1122_3344, ByteOrder::Big).unwrap();
        assert_ne!(ct, ctr(msg, &key, 10, 0x1122_3344).unwrap());
        assert_eq!(
            ctr_with(&ct, &key, 10, 0x1122_3344, ByteOrder::Big).unwrap(),
            msg.to_vec()
        );
    }

    #[test]
    fn mode_selector_dispatches() {
        let key: Key = [5, 6, 7, 8];
        let msg = b"selector";
        for mode in [Mode::Ecb, Mode::Ctr(99), Mode::Gcm(99)] {
            let ct = encrypt(msg, &key, 10, mode).unwrap();
            let pt = decrypt(&ct, &key, 10, mode).unwrap();
            assert_eq!(&pt[..msg.len()], msg.as_slice());
        }
    }

    #[test]
    fn rejects_invalid_rounds() {
        assert!(matches!(
            cipher(b"x", &[0; 4], 9),
            Err(CryptoError::InvalidRounds(9))
        ));
    }

    mod fips_vectors {
        use crate::aes::fips;
        use crate::key_from_bytes;
        use crate::Key;

        const PLAINTEXT: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];

        fn sequential_key(len: usize) -> Key {
            let bytes: Vec<u8> = (0..len as u8).collect();
            key_from_bytes(&bytes)
        }

        #[test]
        fn aes128_appendix_c1() {
            let out = fips::cipher(&PLAINTEXT, &sequential_key(16), 10).unwrap();
            assert_eq!(
                out,
                vec![
                    0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70,
                    0xb4, 0xc5, 0x5a,
                ]
            );
            assert_eq!(
                fips::inv_cipher(&out, &sequential_key(16), 10).unwrap(),
                PLAINTEXT.to_vec()
            );
        }

        #[test]
        fn aes192_appendix_c2() {
            let out = fips::cipher(&PLAINTEXT, &sequential_key(24), 12).unwrap();
            assert_eq!(
                out,
                vec![
                    0xdd, 0xa9, 0x7c, 0xa4, 0x86, 0x4c, 0xdf, 0xe0, 0x6e, 0xaf, 0x70, 0xa0, 0xec,
                    0x0d, 0x71, 0x91,
                ]
            );
            assert_eq!(
                fips::inv_cipher(&out, &sequential_key(24), 12).unwrap(),
                PLAINTEXT.to_vec()
            );
        }

        #[test]
        fn aes256_appendix_c3() {
            let out = fips::cipher(&PLAINTEXT, &sequential_key(32), 14).unwrap();
            assert_eq!(
                out,
                vec![
                    0x8e, 0xa2, 0xb7, 0xca, 0x51, 0x67, 0x45, 0xbf, 0xea, 0xfc, 0x49, 0x90, 0x4b,
                    0x49, 0x60, 0x89,
                ]
            );
            assert_eq!(
                fips::inv_cipher(&out, &sequential_key(32), 14).unwrap(),
                PLAINTEXT.to_vec()
            );
        }
    }
}
