// src/commands/mod.rs

//! The command registry: a process-wide name→{handler,flags} map, built
//! once at startup (`spec.md` §4.2). Registration panics on a duplicate
//! name, matching spec.md's "fatal configuration error" for that case.

mod admin;
mod kv;
mod replication;
mod slots;

use crate::connection::Connection;
use crate::core::errors::BitserverError;
use crate::core::protocol::RespValue;
use async_trait::async_trait;
use bitflags::bitflags;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

bitflags! {
    /// The only bit the core interprets is `WRITE`, used to enforce
    /// "read-only while a slave" (`spec.md` §4.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u8 {
        const WRITE = 1 << 0;
    }
}

/// Implemented by each command's handler struct (e.g. `kv::Get`).
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Returns `Some(reply)` to send back to the client, or `None` when the
    /// handler has already written its own reply (or handed the connection
    /// off, as `BSYNC` does) and the request loop shouldn't write anything.
    async fn execute(
        &self,
        conn: &mut Connection,
        args: &[Bytes],
    ) -> Result<Option<RespValue>, BitserverError>;
}

/// A process-wide, read-only-after-init name→{handler,flags} map.
pub struct CommandRegistry {
    table: HashMap<&'static str, (Arc<dyn CommandHandler>, CommandFlags)>,
}

impl CommandRegistry {
    pub fn get(&self, name: &str) -> Option<&(Arc<dyn CommandHandler>, CommandFlags)> {
        self.table.get(name)
    }
}

/// One-shot builder; panics on a duplicate registration, matching spec.md's
/// "re-registering the same name is a fatal configuration error".
struct CommandRegistryBuilder {
    table: HashMap<&'static str, (Arc<dyn CommandHandler>, CommandFlags)>,
}

impl CommandRegistryBuilder {
    fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    fn register(mut self, name: &'static str, handler: impl CommandHandler + 'static, flags: CommandFlags) -> Self {
        if self
            .table
            .insert(name, (Arc::new(handler), flags))
            .is_some()
        {
            panic!("duplicate command registration for '{name}'");
        }
        self
    }

    fn build(self) -> CommandRegistry {
        CommandRegistry { table: self.table }
    }
}

const WRITE: CommandFlags = CommandFlags::WRITE;
const READONLY: CommandFlags = CommandFlags::empty();

/// Builds the full command table the core ships (`spec.md` §4.2's list).
/// `crate::core::state::ServerState` is built with a fresh instance of this
/// at startup; tests can build their own for an injectable registry
/// (`spec.md` §9's closing note).
pub fn build_registry() -> CommandRegistry {
    CommandRegistryBuilder::new()
        .register("get", kv::Get, READONLY)
        .register("set", kv::Set, WRITE)
        .register("del", kv::Del, WRITE)
        .register("ping", admin::Ping, READONLY)
        .register("command", admin::CommandCmd, READONLY)
        .register("role", admin::Role, READONLY)
        .register("info", admin::Info, READONLY)
        .register("merge", admin::Merge, WRITE)
        .register("flushall", admin::FlushAll, WRITE)
        .register("slaveof", replication::Slaveof, READONLY)
        .register("bsync", replication::Bsync, READONLY)
        .register("slotshashkey", slots::SlotsHashKey, READONLY)
        .register("slotsinfo", slots::SlotsInfo, READONLY)
        .register("slotsmgrtone", slots::SlotsMgrtOne, WRITE)
        .register("slotsmgrtslot", slots::SlotsMgrtSlot, WRITE)
        .register("slotsmgrttagone", slots::SlotsMgrtTagOne, WRITE)
        .register("slotsmgrttagslot", slots::SlotsMgrtTagSlot, WRITE)
        .register("slotsrestore", slots::SlotsRestore, WRITE)
        .build()
}
