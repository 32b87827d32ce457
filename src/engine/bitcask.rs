// src/engine/bitcask.rs

//! A minimal Bitcask-style append-only engine backing the `Engine` port.
//!
//! Layout, freely chosen here since the on-disk format is outside the scope
//! this crate inherited (`SPEC_FULL.md` §3): each data file is a sequence of
//! records, each a 20-byte header followed by the key then the value.
//!
//! ```text
//! key_len: u32  val_len: u32  expire_at_ms: i64  crc32: u32  key[..]  value[..]
//! ```
//!
//! `val_len == u32::MAX` marks a tombstone (deleted key, no value bytes).
//! `expire_at_ms == 0` means no expiry.

use super::{Engine, FileMeta, Record};
use crate::core::errors::BitserverError;
use crate::core::slot::key_slot;
use bytes::Bytes;
use crc::{CRC_32_ISO_HDLC, Crc};
use dashmap::DashMap;
use md5::{Digest, Md5};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const HEADER_LEN: usize = 4 + 4 + 8 + 4;
const TOMBSTONE: u32 = u32::MAX;
const CRC32_ALGO: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

struct DecodedRecord {
    key: Bytes,
    value: Option<Bytes>,
    expire_at_ms: i64,
}

fn encode_record(key: &[u8], value: Option<&[u8]>, expire_at_ms: i64) -> Vec<u8> {
    let val_len = value.map_or(TOMBSTONE, |v| v.len() as u32);
    let mut crc_input = Vec::with_capacity(key.len() + value.map_or(0, <[u8]>::len));
    crc_input.extend_from_slice(key);
    if let Some(v) = value {
        crc_input.extend_from_slice(v);
    }
    let crc = CRC32_ALGO.checksum(&crc_input);

    let mut buf = Vec::with_capacity(HEADER_LEN + crc_input.len());
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(&val_len.to_be_bytes());
    buf.extend_from_slice(&expire_at_ms.to_be_bytes());
    buf.extend_from_slice(&crc.to_be_bytes());
    buf.extend_from_slice(key);
    if let Some(v) = value {
        buf.extend_from_slice(v);
    }
    buf
}

fn decode_record(buf: &[u8]) -> Result<DecodedRecord, BitserverError> {
    if buf.len() < HEADER_LEN {
        return Err(BitserverError::Engine("truncated record header".into()));
    }
    let key_len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
    let val_len_raw = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    let expire_at_ms = i64::from_be_bytes(buf[8..16].try_into().unwrap());
    let crc_stored = u32::from_be_bytes(buf[16..20].try_into().unwrap());

    let key_start = HEADER_LEN;
    let key_end = key_start + key_len;
    let value = if val_len_raw == TOMBSTONE {
        None
    } else {
        Some(val_len_raw as usize)
    };
    let val_end = key_end + value.unwrap_or(0);
    if buf.len() < val_end {
        return Err(BitserverError::Engine("truncated record body".into()));
    }
    let key = Bytes::copy_from_slice(&buf[key_start..key_end]);
    let value_bytes = value.map(|_| Bytes::copy_from_slice(&buf[key_end..val_end]));

    let mut crc_input = Vec::with_capacity(key.len() + value_bytes.as_ref().map_or(0, Bytes::len));
    crc_input.extend_from_slice(&key);
    if let Some(v) = &value_bytes {
        crc_input.extend_from_slice(v);
    }
    if CRC32_ALGO.checksum(&crc_input) != crc_stored {
        return Err(BitserverError::Engine("record checksum mismatch".into()));
    }

    Ok(DecodedRecord {
        key,
        value: value_bytes,
        expire_at_ms,
    })
}

fn record_total_len(buf_from_header: &[u8]) -> Option<usize> {
    if buf_from_header.len() < HEADER_LEN {
        return None;
    }
    let key_len = u32::from_be_bytes(buf_from_header[0..4].try_into().unwrap()) as usize;
    let val_len_raw = u32::from_be_bytes(buf_from_header[4..8].try_into().unwrap());
    let val_len = if val_len_raw == TOMBSTONE {
        0
    } else {
        val_len_raw as usize
    };
    Some(HEADER_LEN + key_len + val_len)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[derive(Clone, Copy)]
struct IndexEntry {
    file_id: u64,
    offset: u64,
    expire_at_ms: i64,
}

struct ActiveFile {
    file_id: u64,
    file: File,
    offset: u64,
}

/// A single-process, single-node Bitcask-style engine rooted at `data_dir`.
pub struct BitcaskEngine {
    data_dir: PathBuf,
    index: DashMap<Bytes, IndexEntry>,
    active: Mutex<ActiveFile>,
    sealed_ids: RwLock<BTreeSet<u64>>,
    max_file_size: u64,
    cache_enabled: AtomicBool,
}

impl BitcaskEngine {
    /// Opens (creating if absent) an engine rooted at `data_dir`, replaying every
    /// existing data file in file-id order to rebuild the in-memory index.
    pub fn open(data_dir: impl Into<PathBuf>, max_file_size: u64) -> Result<Self, BitserverError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let mut file_ids = Vec::new();
        for entry in fs::read_dir(&data_dir)? {
            let entry = entry?;
            if let Some(id) = Self::parse_file_name(&entry.file_name()) {
                file_ids.push(id);
            }
        }
        file_ids.sort_unstable();

        let index = DashMap::new();
        for &id in &file_ids {
            Self::replay_file(&data_dir, id, &index)?;
        }

        let active_file_id = file_ids.last().copied().unwrap_or(1);
        let sealed_ids: BTreeSet<u64> = file_ids
            .iter()
            .copied()
            .filter(|&id| id != active_file_id)
            .collect();

        let path = Self::file_path(&data_dir, active_file_id);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let offset = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            data_dir,
            index,
            active: Mutex::new(ActiveFile {
                file_id: active_file_id,
                file,
                offset,
            }),
            sealed_ids: RwLock::new(sealed_ids),
            max_file_size,
            cache_enabled: AtomicBool::new(true),
        })
    }

    fn file_path(data_dir: &Path, file_id: u64) -> PathBuf {
        data_dir.join(format!("{file_id:020}.dat"))
    }

    fn parse_file_name(name: &std::ffi::OsStr) -> Option<u64> {
        let name = name.to_str()?;
        let stem = name.strip_suffix(".dat")?;
        stem.parse::<u64>().ok()
    }

    fn replay_file(
        data_dir: &Path,
        file_id: u64,
        index: &DashMap<Bytes, IndexEntry>,
    ) -> Result<(), BitserverError> {
        let path = Self::file_path(data_dir, file_id);
        let mut buf = Vec::new();
        File::open(&path)?.read_to_end(&mut buf)?;
        let mut offset = 0usize;
        while offset < buf.len() {
            let Some(total) = record_total_len(&buf[offset..]) else {
                break;
            };
            if offset + total > buf.len() {
                break;
            }
            let decoded = decode_record(&buf[offset..offset + total])?;
            match decoded.value {
                Some(_) => {
                    index.insert(
                        decoded.key,
                        IndexEntry {
                            file_id,
                            offset: offset as u64,
                            expire_at_ms: decoded.expire_at_ms,
                        },
                    );
                }
                None => {
                    index.remove(&decoded.key);
                }
            }
            offset += total;
        }
        Ok(())
    }

    fn is_expired(entry: &IndexEntry) -> bool {
        entry.expire_at_ms != 0 && entry.expire_at_ms <= now_ms()
    }

    fn read_record_at(&self, file_id: u64, offset: u64) -> Result<DecodedRecord, BitserverError> {
        let path = self.data_file_path(file_id);
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; HEADER_LEN];
        file.read_exact(&mut header)?;
        let total = record_total_len(&header)
            .ok_or_else(|| BitserverError::Engine("corrupt record header".into()))?;
        let mut buf = vec![0u8; total];
        buf[..HEADER_LEN].copy_from_slice(&header);
        file.read_exact(&mut buf[HEADER_LEN..])?;
        decode_record(&buf)
    }

    fn append(&self, key: &[u8], value: Option<&[u8]>, expire_at_ms: i64) -> Result<(), BitserverError> {
        let encoded = encode_record(key, value, expire_at_ms);
        let mut active = self.active.lock();

        if active.offset > 0 && active.offset + encoded.len() as u64 > self.max_file_size {
            self.seal_active(&mut active)?;
        }

        let file_id = active.file_id;
        let offset = active.offset;
        active.file.write_all(&encoded)?;
        active.file.flush()?;
        active.offset += encoded.len() as u64;
        drop(active);

        match value {
            Some(_) => {
                self.index.insert(
                    Bytes::copy_from_slice(key),
                    IndexEntry {
                        file_id,
                        offset,
                        expire_at_ms,
                    },
                );
            }
            None => {
                self.index.remove(key);
            }
        }
        Ok(())
    }

    fn seal_active(&self, active: &mut ActiveFile) -> Result<(), BitserverError> {
        self.sealed_ids.write().insert(active.file_id);
        let next_id = active.file_id + 1;
        let path = Self::file_path(&self.data_dir, next_id);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        active.file_id = next_id;
        active.file = file;
        active.offset = 0;
        Ok(())
    }
}

impl Engine for BitcaskEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, BitserverError> {
        let Some(entry) = self.index.get(key).map(|e| *e.value()) else {
            return Ok(None);
        };
        if Self::is_expired(&entry) {
            return Ok(None);
        }
        let decoded = self.read_record_at(entry.file_id, entry.offset)?;
        Ok(decoded.value)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), BitserverError> {
        self.append(key, Some(value), 0)
    }

    fn set_with_expire(
        &self,
        key: &[u8],
        value: &[u8],
        expire_at_ms: i64,
    ) -> Result<(), BitserverError> {
        self.append(key, Some(value), expire_at_ms)
    }

    fn del(&self, key: &[u8]) -> Result<bool, BitserverError> {
        let existed = self.index.contains_key(key);
        if existed {
            self.append(key, None, 0)?;
        }
        Ok(existed)
    }

    fn del_local(&self, key: &[u8]) -> Result<bool, BitserverError> {
        // Bypasses nothing at the storage layer: the distinction between a
        // replicated and non-replicated delete lives above the engine, in
        // whether the write ever reaches a slave feeder. At this layer both
        // simply tombstone the key.
        self.del(key)
    }

    fn active_file_id(&self) -> u64 {
        self.active.lock().file_id
    }

    fn next_data_file_id(&self, file_id: u64) -> Option<u64> {
        self.sealed_ids
            .read()
            .range((file_id + 1)..)
            .next()
            .copied()
            .or_else(|| {
                let active_id = self.active_file_id();
                (file_id < active_id).then_some(active_id)
            })
    }

    fn data_file_path(&self, file_id: u64) -> PathBuf {
        Self::file_path(&self.data_dir, file_id)
    }

    fn ref_record(&self, file_id: u64, offset: u64) -> Result<Option<Record>, BitserverError> {
        let path = self.data_file_path(file_id);
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if offset >= len {
            return Ok(None);
        }
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; HEADER_LEN];
        file.read_exact(&mut header)?;
        let total = record_total_len(&header)
            .ok_or_else(|| BitserverError::Engine("corrupt record header".into()))?;
        let mut buf = vec![0u8; total];
        buf[..HEADER_LEN].copy_from_slice(&header);
        file.read_exact(&mut buf[HEADER_LEN..])?;
        Ok(Some(Record {
            file_id,
            offset,
            size: total as u64,
            bytes: Bytes::from(buf),
        }))
    }

    fn sync_file(&self, file_id: u64, offset: u64, bytes: &[u8]) -> Result<(), BitserverError> {
        let path = self.data_file_path(file_id);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        file.flush()?;

        let decoded = decode_record(bytes)?;
        match decoded.value {
            Some(_) => {
                self.index.insert(
                    decoded.key,
                    IndexEntry {
                        file_id,
                        offset,
                        expire_at_ms: decoded.expire_at_ms,
                    },
                );
            }
            None => {
                self.index.remove(&decoded.key);
            }
        }

        let mut active = self.active.lock();
        if file_id > active.file_id || (file_id == active.file_id && offset >= active.offset) {
            if file_id > active.file_id {
                self.sealed_ids.write().insert(active.file_id);
            }
            let new_offset = offset + bytes.len() as u64;
            if file_id != active.file_id || new_offset > active.offset {
                let new_file = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .append(true)
                    .open(self.data_file_path(file_id))?;
                active.file_id = file_id;
                active.file = new_file;
                active.offset = new_offset;
            }
        }
        Ok(())
    }

    fn file_metas(&self) -> Result<Vec<FileMeta>, BitserverError> {
        let ids: Vec<u64> = self.sealed_ids.read().iter().copied().collect();
        let mut metas = Vec::with_capacity(ids.len());
        for id in ids {
            let path = self.data_file_path(id);
            let mut buf = Vec::new();
            File::open(&path)?.read_to_end(&mut buf)?;
            let digest = Md5::digest(&buf);
            metas.push(FileMeta {
                file_id: id,
                md5: digest.into(),
            });
        }
        Ok(metas)
    }

    fn first_key_under_slot(&self, slot: u16) -> Result<Option<Bytes>, BitserverError> {
        for entry in self.index.iter() {
            if Self::is_expired(entry.value()) {
                continue;
            }
            if key_slot(entry.key()) == slot {
                return Ok(Some(entry.key().clone()));
            }
        }
        Ok(None)
    }

    fn all_keys_with_tag(&self, tag: &[u8]) -> Result<Vec<Bytes>, BitserverError> {
        let mut out = Vec::new();
        for entry in self.index.iter() {
            if Self::is_expired(entry.value()) {
                continue;
            }
            if crate::core::slot::hashtag(entry.key()) == tag {
                out.push(entry.key().clone());
            }
        }
        Ok(out)
    }

    fn clear_all(&self) -> Result<(), BitserverError> {
        self.index.clear();
        let mut active = self.active.lock();
        for id in self.sealed_ids.write().drain(..).collect::<Vec<_>>() {
            let _ = fs::remove_file(Self::file_path(&self.data_dir, id));
        }
        let _ = fs::remove_file(Self::file_path(&self.data_dir, active.file_id));
        let path = Self::file_path(&self.data_dir, active.file_id);
        active.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        active.offset = 0;
        Ok(())
    }

    fn merge(&self) {
        // Compaction of sealed files is explicitly out of scope for this
        // crate (SPEC_FULL.md §1); this just seals the current active file so
        // a merge pass would have fully-sealed input to work with.
        let mut active = self.active.lock();
        if active.offset > 0 {
            let _ = self.seal_active(&mut active);
        }
    }

    fn enable_cache(&self, enabled: bool) {
        self.cache_enabled.store(enabled, Ordering::Relaxed);
    }
}
