use super::{CodecError, CodecReader, CodecType, CodecWriter};
use crate::constants::{FRAME_LENGTH_FIELD_SIZE, MAX_FRAME_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Binary codec: every header and every body is one length-prefixed frame.
///
/// ```text
/// +----------------+------------------------+
/// | len: u32 (LE)  | bitcode payload (len)  |
/// +----------------+------------------------+
/// ```
pub struct BitcodeCodec;

impl BitcodeCodec {
    /// Wraps the two halves of a stream.
    pub fn split<R, W>(reader: R, writer: W) -> (BitcodeReader<R>, BitcodeWriter<W>)
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        (
            BitcodeReader { reader },
            BitcodeWriter {
                writer,
                closed: false,
            },
        )
    }

    /// Appends one frame (length prefix followed by payload) to `buf`.
    pub fn encode_frame(buf: &mut Vec<u8>, payload: &[u8]) -> Result<(), CodecError> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        buf.reserve(FRAME_LENGTH_FIELD_SIZE + payload.len());
        buf.extend(&(payload.len() as u32).to_le_bytes());
        buf.extend(payload);
        Ok(())
    }
}

pub struct BitcodeReader<R> {
    reader: R,
}

#[async_trait::async_trait]
impl<R> CodecReader for BitcodeReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn codec_type(&self) -> CodecType {
        CodecType::Bitcode
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.reader.read_u32_le().await? as usize;
        if len > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;
        Ok(payload)
    }
}

pub struct BitcodeWriter<W> {
    writer: W,
    closed: bool,
}

#[async_trait::async_trait]
impl<W> CodecWriter for BitcodeWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn codec_type(&self) -> CodecType {
        CodecType::Bitcode
    }

    async fn write_frames(&mut self, header: &[u8], body: &[u8]) -> Result<(), CodecError> {
        if self.closed {
            return Err(CodecError::WriteAfterClose);
        }

        let mut buf = Vec::new();
        BitcodeCodec::encode_frame(&mut buf, header)?;
        BitcodeCodec::encode_frame(&mut buf, body)?;

        let result = async {
            self.writer.write_all(&buf).await?;
            self.writer.flush().await
        }
        .await;

        if let Err(err) = result {
            tracing::error!("bitcode codec: error writing frame: {}", err);
            let _ = self.close().await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CodecError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.shutdown().await?;
        Ok(())
    }
}
