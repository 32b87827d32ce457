// src/core/protocol/mod.rs

//! The wire protocol: a RESP2 codec for ordinary client traffic, and the raw
//! length-prefixed framing BSYNC switches to after its handshake.

pub mod codec;
pub mod framing;
pub mod value;

pub use codec::{RespCodec, encode_to, read_request, read_value, request_from_value};
pub use framing::{read_dollar_line, read_record_frame, write_dollar_line, write_record_frame};
pub use value::{Request, RespValue};
