use super::{CodecError, CodecReader, CodecType, CodecWriter};
use crate::constants::MAX_FRAME_SIZE;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Text codec: every header and every body is one JSON document on its own
/// line. JSON never emits a raw newline inside a document, so `\n` is an
/// unambiguous delimiter.
pub struct JsonCodec;

impl JsonCodec {
    pub fn split<R, W>(reader: R, writer: W) -> (JsonReader<R>, JsonWriter<W>)
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        (
            JsonReader {
                reader,
                line: Vec::new(),
            },
            JsonWriter {
                writer,
                closed: false,
            },
        )
    }
}

pub struct JsonReader<R> {
    reader: R,
    line: Vec<u8>,
}

#[async_trait::async_trait]
impl<R> CodecReader for JsonReader<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn codec_type(&self) -> CodecType {
        CodecType::Json
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>, CodecError> {
        self.line.clear();

        // One extra byte leaves room for the delimiter of a maximum-size document.
        let limit = (MAX_FRAME_SIZE + 1) as u64;
        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.line)
            .await?;

        if read == 0 {
            return Err(CodecError::Closed);
        }

        match self.line.last() {
            Some(b'\n') => {
                self.line.pop();
                Ok(std::mem::take(&mut self.line))
            }
            _ if read as u64 >= limit => Err(CodecError::FrameTooLarge {
                size: read,
                max: MAX_FRAME_SIZE,
            }),
            // Stream ended in the middle of a document.
            _ => Err(CodecError::Closed),
        }
    }
}

pub struct JsonWriter<W> {
    writer: W,
    closed: bool,
}

#[async_trait::async_trait]
impl<W> CodecWriter for JsonWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn codec_type(&self) -> CodecType {
        CodecType::Json
    }

    async fn write_frames(&mut self, header: &[u8], body: &[u8]) -> Result<(), CodecError> {
        if self.closed {
            return Err(CodecError::WriteAfterClose);
        }

        for part in [header, body] {
            if part.len() > MAX_FRAME_SIZE {
                return Err(CodecError::FrameTooLarge {
                    size: part.len(),
                    max: MAX_FRAME_SIZE,
                });
            }
        }

        let mut buf = Vec::with_capacity(header.len() + body.len() + 2);
        buf.extend(header);
        buf.push(b'\n');
        buf.extend(body);
        buf.push(b'\n');

        let result = async {
            self.writer.write_all(&buf).await?;
            self.writer.flush().await
        }
        .await;

        if let Err(err) = result {
            tracing::error!("json codec: error writing frame: {}", err);
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
