// src/core/protocol/mod.rs

//! The wire protocol: handshake/frame types and their codec.

mod codec;
mod message;

pub use codec::WireCodec;
pub use message::{Hello, WireMessage};
