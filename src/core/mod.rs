// src/core/mod.rs

//! The central module containing the core logic and data structures of the
//! server: errors, the wire protocol, slot math, and the shared server
//! state. Command handlers, replication, and slot migration live in their
//! own top-level modules (`crate::commands`, `crate::replication`,
//! `crate::migration`) since they depend on this module rather than the
//! other way around.

pub mod errors;
pub mod protocol;
pub mod slot;
pub mod state;

pub use errors::BitserverError;
pub use protocol::RespValue;
