//! One-time codec negotiation.
//!
//! Before any [`Header`](crate::Header) is exchanged the client sends a single
//! line of JSON describing the protocol magic and the codec it wants. JSON is
//! used regardless of the negotiated codec, since the codec isn't known yet.

use crate::codec::CodecType;
use crate::constants::{MAGIC_NUMBER, MAX_HANDSHAKE_LEN};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Handshake descriptor sent once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    pub magic_number: u32,
    pub codec_type: CodecType,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: CodecType::default(),
        }
    }
}

impl Options {
    pub fn with_codec(codec_type: CodecType) -> Self {
        Self {
            codec_type,
            ..Self::default()
        }
    }
}

/// Wire shape used when reading, so an unknown codec identifier can be
/// reported as such instead of as a generic parse failure.
#[derive(Deserialize)]
struct RawOptions {
    magic_number: u32,
    codec_type: String,
}

#[derive(Debug, Clone, Error)]
pub enum HandshakeError {
    #[error("handshake i/o error: {0}")]
    Io(Arc<io::Error>),

    #[error("connection closed before handshake completed")]
    Closed,

    #[error("handshake exceeds {0} bytes")]
    TooLong(u64),

    #[error("malformed handshake: {0}")]
    Malformed(String),

    #[error("invalid magic number {0:#x}")]
    InvalidMagic(u32),

    #[error("invalid codec type {0}")]
    InvalidCodec(String),

    #[error("number of options is more than 1")]
    TooManyOptions,
}

impl From<io::Error> for HandshakeError {
    fn from(err: io::Error) -> Self {
        HandshakeError::Io(Arc::new(err))
    }
}

/// Resolves caller-supplied options into the descriptor to send.
///
/// No options means the defaults. One option keeps its codec but always
/// carries the protocol magic. More than one is rejected before dialing.
pub fn parse_options(opts: &[Options]) -> Result<Options, HandshakeError> {
    match opts {
        [] => Ok(Options::default()),
        [opt] => Ok(Options {
            magic_number: MAGIC_NUMBER,
            codec_type: opt.codec_type,
        }),
        _ => Err(HandshakeError::TooManyOptions),
    }
}

/// Writes the descriptor as a single JSON line.
pub async fn write_options<W>(writer: &mut W, opt: &Options) -> Result<(), HandshakeError>
where
    W: AsyncWrite + Unpin,
{
    let mut line =
        serde_json::to_vec(opt).map_err(|e| HandshakeError::Malformed(e.to_string()))?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads and validates a descriptor.
///
/// Reads through the caller's buffered reader and stops at the newline, so
/// any frame bytes that arrived in the same segment stay buffered for the
/// codec.
pub async fn read_options<R>(reader: &mut R) -> Result<Options, HandshakeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_HANDSHAKE_LEN)
        .read_until(b'\n', &mut line)
        .await?;

    if read == 0 {
        return Err(HandshakeError::Closed);
    }
    if line.last() != Some(&b'\n') {
        return match read as u64 >= MAX_HANDSHAKE_LEN {
            true => Err(HandshakeError::TooLong(MAX_HANDSHAKE_LEN)),
            false => Err(HandshakeError::Closed),
        };
    }

    let raw: RawOptions =
        serde_json::from_slice(&line).map_err(|e| HandshakeError::Malformed(e.to_string()))?;

    if raw.magic_number != MAGIC_NUMBER {
        return Err(HandshakeError::InvalidMagic(raw.magic_number));
    }

    let codec_type = raw
        .codec_type
        .parse::<CodecType>()
        .map_err(HandshakeError::InvalidCodec)?;

    Ok(Options {
        magic_number: raw.magic_number,
        codec_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_defaults_when_empty() {
        assert_eq!(parse_options(&[]).unwrap(), Options::default());
    }

    #[test]
    fn test_parse_options_forces_magic_number() {
        let opt = Options {
            magic_number: 1,
            codec_type: CodecType::Json,
        };
        let parsed = parse_options(&[opt]).unwrap();
        assert_eq!(parsed.magic_number, MAGIC_NUMBER);
        assert_eq!(parsed.codec_type, CodecType::Json);
    }

    #[test]
    fn test_parse_options_rejects_more_than_one() {
        let opts = [Options::default(), Options::default()];
        assert!(matches!(
            parse_options(&opts),
            Err(HandshakeError::TooManyOptions)
        ));
    }
}
