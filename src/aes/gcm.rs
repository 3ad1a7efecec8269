//! Galois/Counter Mode: counter-mode encryption plus a polynomial MAC over
//! GF(2^128), so a tampered ciphertext is rejected before decryption.
//!
//! The block multiply is computed bit by bit against the reducing polynomial
//! rather than with tables, in the same spirit as the byte field in [`gf`].
//! The counter uses the GCM-specific increment that only touches the last
//! four bytes, which caps a single message at 2^32 blocks.
//!
//! [`gf`]: super::gf

use super::block::Block;
use super::{cipher, ByteOrder};
use crate::error::CryptoError;
use crate::Key;

/// How [`block_mul_with`] advances through the bits of `X`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Advance {
    /// Walk all eight bits of each byte, high bit first.
    #[default]
    PerBit,
    /// Re-sample only the top bit of each byte, eight times. This reproduces
    /// the behavior of earlier releases byte for byte; keep it available so
    /// old captures stay decryptable and regression tests stay exact.
    TopBitOnly,
}

/// Tuning knobs for the GCM entry points. The defaults are what peers on the
/// wire speak.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub order: ByteOrder,
    pub advance: Advance,
}

/// The reducing polynomial of the 128-bit block field: top byte 11100001,
/// everything else zero.
fn reduction() -> Block {
    let mut r = Block::default();
    r.set_cell(0, 0, 0b1110_0001);
    r
}

/// Multiply two blocks in GF(2^128).
pub fn block_mul(x: &Block, y: &Block) -> Block {
    block_mul_with(x, y, Advance::PerBit)
}

/// The same shift-and-add scheme as the byte field multiply, scaled up to a
/// 128-bit operand: walk the bits of `X` in (row, col, bit) order, XOR in a
/// copy of `V` for each set bit, and fold `V` back under the reducing
/// polynomial whenever its low bit would shift out.
pub fn block_mul_with(x: &Block, y: &Block, advance: Advance) -> Block {
    let r = reduction();
    let mut z = Block::default();
    let mut v = *y;

    for row in 0..4 {
        for col in 0..4 {
            let mut byte = x.cell(col, row);
            for _ in 0..8 {
                if byte & 0x80 != 0 {
                    z.xor(&v);
                }
                if v.low_bit() {
                    v.shift_right(1);
                    v.xor(&r);
                } else {
                    v.shift_right(1);
                }
                if advance == Advance::PerBit {
                    byte <<= 1;
                }
            }
        }
    }
    z
}

/// Accumulate a hash over `blocks`, keyed by the hash subkey `H`.
///
/// Works like a MAC: each generation XORs in the next block and multiplies by
/// `H`, so the final block depends on the key and on every input block.
pub fn ghash(blocks: &[Block], h: &Block) -> Block {
    ghash_with(blocks, h, Advance::PerBit)
}

pub fn ghash_with(blocks: &[Block], h: &Block, advance: Advance) -> Block {
    let mut y = Block::default();
    for block in blocks {
        y.xor(block);
        y = block_mul_with(&y, h, advance);
    }
    y
}

/// The counter step: add 1 mod 2^32 to the last four bytes of `J`
/// (most-significant first), leaving the first twelve bytes alone.
pub fn increment(j: &mut Block) {
    let mut lsb = u32::from_be_bytes([j.cell(3, 0), j.cell(3, 1), j.cell(3, 2), j.cell(3, 3)]);
    lsb = lsb.wrapping_add(1);
    for x in (0..4).rev() {
        j.set_cell(3, x, (lsb & 0xff) as u8);
        lsb >>= 8;
    }
}

/// Counter-mode over blocks already in hand: each block XORs against the
/// encryption of the counter block, which then steps by [`increment`].
fn gctr(blocks: &mut [Block], mut icb: Block, key: &Key, rounds: u64) -> Result<(), CryptoError> {
    for block in blocks.iter_mut() {
        let pad = Block::from_chunk(&cipher(&icb.unravel(), key, rounds)?);
        block.xor(&pad);
        increment(&mut icb);
    }
    Ok(())
}

/// Encrypt and authenticate; the tag block is appended to the ciphertext.
pub fn enc(input: &[u8], key: &Key, rounds: u64, nonce: u64) -> Result<Vec<u8>, CryptoError> {
    enc_with(input, key, rounds, nonce, Options::default())
}

pub fn enc_with(
    input: &[u8],
    key: &Key,
    rounds: u64,
    nonce: u64,
    opts: Options,
) -> Result<Vec<u8>, CryptoError> {
    // The hash subkey is the encryption of the all-zero block.
    let h = Block::from_chunk(&cipher(&[0u8; 16], key, rounds)?);

    // J0 comes from hashing the nonce; its increment Jc drives the message
    // counter, so J0 itself stays free for sealing the tag. That lets the
    // receiver check the tag before decrypting anything.
    let j0 = ghash_with(&[Block::from_chunk(&opts.order.encode(nonce))], &h, opts.advance);
    let mut jc = j0;
    increment(&mut jc);

    let mut blocks: Vec<Block> = input.chunks(16).map(Block::from_chunk).collect();
    gctr(&mut blocks, jc, key, rounds)?;

    // Hash the ciphertext, then seal the hash under J0 to form the tag.
    let mut tag = [ghash_with(&blocks, &h, opts.advance)];
    gctr(&mut tag, j0, key, rounds)?;

    let mut out = Vec::with_capacity((blocks.len() + 1) * 16);
    for block in &blocks {
        out.extend_from_slice(&block.unravel());
    }
    out.extend_from_slice(&tag[0].unravel());
    Ok(out)
}

/// Verify the trailing tag, then decrypt.
///
/// Fails with [`CryptoError::Authentication`] when the tag does not match,
/// which means either a wrong key or an altered ciphertext.
pub fn dec(input: &[u8], key: &Key, rounds: u64, nonce: u64) -> Result<Vec<u8>, CryptoError> {
    dec_with(input, key, rounds, nonce, Options::default())
}

pub fn dec_with(
    input: &[u8],
    key: &Key,
    rounds: u64,
    nonce: u64,
    opts: Options,
) -> Result<Vec<u8>, CryptoError> {
    let h = Block::from_chunk(&cipher(&[0u8; 16], key, rounds)?);
    let j0 = ghash_with(&[Block::from_chunk(&opts.order.encode(nonce))], &h, opts.advance);

    // Split the received blocks into ciphertext and the trailing tag.
    let mut blocks: Vec<Block> = input.chunks(16).map(Block::from_chunk).collect();
    let tag = blocks.pop().ok_or(CryptoError::Authentication)?;

    // Unseal the tag under J0; it must equal the ciphertext hash.
    let mut unsealed = [tag];
    gctr(&mut unsealed, j0, key, rounds)?;
    if unsealed[0] != ghash_with(&blocks, &h, opts.advance) {
        return Err(CryptoError::Authentication);
    }

    let mut jc = j0;
    increment(&mut jc);
    gctr(&mut blocks, jc, key, rounds)?;

    let mut out = Vec::with_capacity(blocks.len() * 16);
    for block in &blocks {
        out.extend_from_slice(&block.unravel());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSG: &[u8] = b"hello, world\n";

    #[test]
    fn round_trip() {
        let key: Key = [0, 0, 0, 0];
        let ct = enc(MSG, &key, 10, 1).unwrap();
        // One message block plus the tag block.
        assert_eq!(ct.len(), 32);
        let pt = dec(&ct, &key, 10, 1).unwrap();
        assert_eq!(&pt[..MSG.len()], MSG);
        assert!(pt[MSG.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn round_trip_every_key_size() {
        let key: Key = [7, 8, 9, 10];
        for rounds in [10, 12, 14] {
            let ct = enc(MSG, &key, rounds, 77).unwrap();
            let pt = dec(&ct, &key, rounds, 77).unwrap();
            assert_eq!(&pt[..MSG.len()], MSG);
        }
    }

    #[test]
    fn every_byte_flip_fails_authentication() {
        let key: Key = [0, 0, 0, 0];
        let ct = enc(MSG, &key, 10, 1).unwrap();
        for i in 0..ct.len() {
            let mut bad = ct.clone();
            bad[i] ^= 0x01;
            assert_eq!(
                dec(&bad, &key, 10, 1).unwrap_err(),
                CryptoError::Authentication,
                "flip at byte {i} went unnoticed"
            );
        }
    }

    #[test]
    fn wrong_nonce_fails_authentication() {
        let key: Key = [1, 2, 3, 4];
        let ct = enc(MSG, &key, 10, 5).unwrap();
        assert_eq!(dec(&ct, &key, 10, 6).unwrap_err(), CryptoError::Authentication);
    }

    #[test]
    fn wrong_key_fails_authentication() {
        // Ten rounds only consume the first two key words, so the difference
        // has to sit in one of them.
        let ct = enc(MSG, &[1, 2, 3, 4], 10, 5).unwrap();
        assert_eq!(
            dec(&ct, &[9, 2, 3, 4], 10, 5).unwrap_err(),
            CryptoError::Authentication
        );
    }

    #[test]
    fn empty_message_carries_only_a_tag() {
        let key: Key = [4, 4, 4, 4];
        let ct = enc(b"", &key, 10, 9).unwrap();
        assert_eq!(ct.len(), 16);
        assert_eq!(dec(&ct, &key, 10, 9).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn increment_touches_only_the_tail() {
        let mut j = Block::from_chunk(&[0xab; 16]);
        let before = j.unravel();
        increment(&mut j);
        let after = j.unravel();
        assert_eq!(&before[..12], &after[..12]);
        assert_eq!(&after[12..], &[0xab, 0xab, 0xab, 0xac]);
    }

    #[test]
    fn increment_wraps_the_tail() {
        let mut j = Block::from_chunk(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
        increment(&mut j);
        assert_eq!(&j.unravel()[12..], &[0, 0, 0, 0]);
    }

    #[test]
    fn block_mul_identity_and_commutativity() {
        let a = Block::from_chunk(&[0x66; 16]);
        let mut one = Block::default();
        one.set_cell(0, 0, 0x80); // the polynomial "1" in this bit ordering
        assert_eq!(block_mul(&a, &one), a);
        let b = Block::from_chunk(b"0123456789abcdef");
        assert_eq!(block_mul(&a, &b), block_mul(&b, &a));
    }

    #[test]
    fn top_bit_only_mode_differs_but_round_trips() {
        let key: Key = [11, 12, 13, 14];
        let compat = Options {
            advance: Advance::TopBitOnly,
            ..Options::default()
        };
        let ct = enc_with(MSG, &key, 10, 3, compat).unwrap();
        assert_ne!(ct, enc(MSG, &key, 10, 3).unwrap());
        let pt = dec_with(&ct, &key, 10, 3, compat).unwrap();
        assert_eq!(&pt[..MSG.len()], MSG);
    }
}
