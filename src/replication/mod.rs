// src/replication/mod.rs

//! Master→slave replication: raw data-file streaming with a handshake that
//! reconciles which sealed files a reconnecting slave already holds
//! (`spec.md` §4.4, §4.5).

pub mod master;
pub mod slave;
