//! Core of the `minirpc` runtime.
//!
//! This crate holds everything both ends of a connection agree on: the
//! one-time [`handshake`] that selects a codec, the [`Header`] that frames
//! every request and reply, and the [`codec`] contract with its binary and
//! JSON implementations. The tokio client and server live in the
//! `extensions/` crates and drive these primitives.

pub mod codec;
pub mod constants;
pub mod handshake;

pub use codec::{
    Body, BodySlot, CodecError, CodecReader, CodecType, CodecWriter, Header, new_codec,
};
pub use handshake::{HandshakeError, Options};
