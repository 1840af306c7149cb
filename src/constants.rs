// Handshake related constants

/// Marks a connection as speaking this protocol. Sent in every handshake.
pub const MAGIC_NUMBER: u32 = 0x237658;

/// Upper bound, in bytes, of the JSON handshake line (including the newline).
pub const MAX_HANDSHAKE_LEN: u64 = 4 * 1024;

// Frame related constants

/// Size in bytes of the little-endian length prefix used by length-delimited codecs.
pub const FRAME_LENGTH_FIELD_SIZE: usize = 4;

/// Largest header or body frame a codec will read or write (16 MiB).
///
/// Anything larger is treated as a framing error, which is fatal to the
/// connection.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// Client related constants

/// Capacity of the completion channel created when `go` is invoked without one.
///
/// This value represents the number of *completed calls* the channel can hold
/// before the receive loop waits for the caller to drain it, not a byte size.
pub const DEFAULT_DONE_CAPACITY: usize = 10;
