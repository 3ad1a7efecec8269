//! A state: the sequence of blocks carved from an input byte string, plus the
//! expanded key schedule and round count that every transform consults.

use super::block::Block;
use super::key::{self, Seeding};
use crate::error::CryptoError;
use crate::Key;

pub struct State {
    blocks: Vec<Block>,
    schedule: Vec<u32>,
    key: Key,
    rounds: u64,
}

impl State {
    /// Carve `input` into 16-byte blocks (the last one zero-padded) and
    /// expand the key schedule for `rounds`.
    pub fn new(input: &[u8], key: &Key, rounds: u64) -> Result<Self, CryptoError> {
        Self::with_seeding(input, key, rounds, Seeding::Native)
    }

    pub(crate) fn with_seeding(
        input: &[u8],
        key: &Key,
        rounds: u64,
        seeding: Seeding,
    ) -> Result<Self, CryptoError> {
        let blocks = input.chunks(16).map(Block::from_chunk).collect();
        Ok(State {
            blocks,
            schedule: schedule(key, rounds, seeding)?,
            key: *key,
            rounds,
        })
    }

    /// Build a state from blocks already in hand.
    pub fn from_blocks(blocks: Vec<Block>, key: &Key, rounds: u64) -> Result<Self, CryptoError> {
        Ok(State {
            blocks,
            schedule: schedule(key, rounds, Seeding::Native)?,
            key: *key,
            rounds,
        })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Concatenate every block back into a byte string. Output length is
    /// always a multiple of 16.
    pub fn unravel(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.blocks.len() * 16);
        for block in &self.blocks {
            out.extend_from_slice(&block.unravel());
        }
        out
    }

    // Each round step just applies the block transform to every block.

    pub fn add_round_key(&mut self, round: u64) {
        for block in &mut self.blocks {
            block.add_round_key(round, &self.schedule);
        }
    }

    pub(crate) fn add_round_key_fips(&mut self, round: u64) {
        for block in &mut self.blocks {
            block.add_round_key_fips(round, &self.schedule);
        }
    }

    pub fn sub_bytes(&mut self) {
        for block in &mut self.blocks {
            block.sub_bytes();
        }
    }

    pub fn inv_sub_bytes(&mut self) {
        for block in &mut self.blocks {
            block.inv_sub_bytes();
        }
    }

    pub fn shift_rows(&mut self) {
        for block in &mut self.blocks {
            block.shift_rows();
        }
    }

    pub fn inv_shift_rows(&mut self) {
        for block in &mut self.blocks {
            block.inv_shift_rows();
        }
    }

    pub fn mix_columns(&mut self) {
        for block in &mut self.blocks {
            block.mix_columns();
        }
    }

    pub fn inv_mix_columns(&mut self) {
        for block in &mut self.blocks {
            block.inv_mix_columns();
        }
    }
}

/// Expand the schedule for a round count, refusing anything but 10/12/14.
fn schedule(key: &Key, rounds: u64, seeding: Seeding) -> Result<Vec<u32>, CryptoError> {
    let nk = match rounds {
        10 => 4,
        12 => 6,
        14 => 8,
        other => return Err(CryptoError::InvalidRounds(other)),
    };
    Ok(key::expansion(key, nk, seeding))
}
