// src/core/slot.rs

//! Hash-tag extraction and the slot function shared by the engine (which needs
//! it to answer `FirstKeyUnderSlot`/`AllKeysWithTag`) and the migration
//! commands (which need it to answer `SLOTSHASHKEY`/`SLOTSINFO`/etc).

use crc::{CRC_32_ISO_HDLC, Crc};

/// Codis/bitserver-style sharding: 1024 slots, not Redis Cluster's 16384.
pub const NUM_SLOTS: usize = 1024;

const CRC32_ALGO: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Extracts the hash tag from a key: the substring between the first `{` and
/// the next `}`. Falls back to the whole key only when there's no such pair;
/// a pair bracketing nothing (`a{}b`) yields the empty slice.
pub fn hashtag(key: &[u8]) -> &[u8] {
    if let Some(start) = key.iter().position(|&b| b == b'{')
        && let Some(end_offset) = key[start + 1..].iter().position(|&b| b == b'}')
    {
        let end = start + 1 + end_offset;
        return &key[start + 1..end];
    }
    key
}

/// `slot(key) = CRC32_IEEE(hashtag(key)) mod 1024`.
pub fn key_slot(key: &[u8]) -> u16 {
    (CRC32_ALGO.checksum(hashtag(key)) % NUM_SLOTS as u32) as u16
}
