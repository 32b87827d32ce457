// src/engine/mod.rs

//! The storage engine port: the abstract interface the rest of the crate consumes.
//!
//! This module and `engine::bitcask` are the one place where this crate has to
//! invent its own on-disk format, since the append-only log, its in-memory
//! index, TTL evaluation, and compaction are all treated as an external
//! collaborator by the rest of the system (see `SPEC_FULL.md` §3). Nothing
//! outside this module may depend on that format; everything else sees only
//! the `Engine` trait below.

pub mod bitcask;

use crate::core::errors::BitserverError;
use bytes::Bytes;
use std::path::PathBuf;

/// One unit of data as produced by the engine: identified by `(file_id, offset)`,
/// with a `size` in bytes, and the already-encoded bytes that round-trip through
/// that size. Opaque to everything outside `engine::bitcask` beyond these fields.
#[derive(Debug, Clone)]
pub struct Record {
    pub file_id: u64,
    pub offset: u64,
    pub size: u64,
    pub bytes: Bytes,
}

/// A `(file_id, md5)` pair over a fully sealed file's content, used only for
/// pre-sync reconciliation between a master and a reconnecting slave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub file_id: u64,
    pub md5: [u8; 16],
}

/// The storage engine port. Implementations are assumed to be safe for
/// concurrent readers with a single concurrent writer; the trait itself is
/// synchronous, matching that the engine is a blocking collaborator, not an
/// async one, in the system this crate embeds it in.
pub trait Engine: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, BitserverError>;
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), BitserverError>;
    fn set_with_expire(
        &self,
        key: &[u8],
        value: &[u8],
        expire_at_ms: i64,
    ) -> Result<(), BitserverError>;

    /// A replicated delete: removed from the index, tombstoned in the log,
    /// and visible to this node's own slaves via the normal replication stream.
    fn del(&self, key: &[u8]) -> Result<bool, BitserverError>;

    /// A non-replicated delete, used by slot migration (see `SPEC_FULL.md` §9 /
    /// `DESIGN.md`'s Open Question on `DelLocal`). Identical effect on this
    /// node's own data, but this node's slaves never see it happen.
    fn del_local(&self, key: &[u8]) -> Result<bool, BitserverError>;

    fn active_file_id(&self) -> u64;

    /// Returns the next existing file id strictly after `file_id`, or `None`
    /// if `file_id` is the active file or no higher file exists. Allows gaps,
    /// since a real engine's compaction can remove sealed files entirely.
    fn next_data_file_id(&self, file_id: u64) -> Option<u64>;

    fn data_file_path(&self, file_id: u64) -> PathBuf;

    /// Returns the record located at exactly `(file_id, offset)`, or `None` if
    /// `offset` is at or beyond that file's current end (nothing new yet).
    fn ref_record(&self, file_id: u64, offset: u64) -> Result<Option<Record>, BitserverError>;

    /// Writes `bytes` into file `file_id` at `offset` (creating the file if
    /// necessary) and folds any records found in that span into the local
    /// index, exactly mirroring what the master held at the time of the read.
    fn sync_file(&self, file_id: u64, offset: u64, bytes: &[u8]) -> Result<(), BitserverError>;

    /// `(file_id, md5)` for every fully sealed file, in file id order. The
    /// active file has no stable md5 and is never included.
    fn file_metas(&self) -> Result<Vec<FileMeta>, BitserverError>;

    fn first_key_under_slot(&self, slot: u16) -> Result<Option<Bytes>, BitserverError>;

    fn all_keys_with_tag(&self, tag: &[u8]) -> Result<Vec<Bytes>, BitserverError>;

    fn clear_all(&self) -> Result<(), BitserverError>;

    /// Fire-and-forget: starts a merge/compaction pass. The server does not
    /// await its completion.
    fn merge(&self);

    /// Toggles the engine's read cache. Disabled while acting as a slave,
    /// since writes then arrive via `sync_file`, not commands, and a stale
    /// cache entry would never be invalidated by the normal write path.
    fn enable_cache(&self, enabled: bool);
}
