use super::{BitcodeCodec, CodecError, CodecType, Header, JsonCodec};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncWrite};

/// Anything a codec can put on the wire as a message body.
///
/// Blanket-implemented for every `Serialize` type, so request arguments and
/// replies never need to implement it by hand.
pub trait Body: Send + Sync {
    fn encode_body(&self, codec_type: CodecType) -> Result<Vec<u8>, CodecError>;
}

impl<T> Body for T
where
    T: Serialize + Send + Sync,
{
    fn encode_body(&self, codec_type: CodecType) -> Result<Vec<u8>, CodecError> {
        codec_type.encode(self)
    }
}

/// A typed destination a codec decodes a body into.
///
/// The core never sees concrete argument or reply types; it only needs
/// something that can be constructed empty, decoded into, and read back.
/// `Option<T>` is that slot: it starts as `None` and becomes `Some` only when
/// a body decodes successfully.
pub trait BodySlot: Send {
    fn decode_body(&mut self, codec_type: CodecType, bytes: &[u8]) -> Result<(), CodecError>;
}

impl<T> BodySlot for Option<T>
where
    T: DeserializeOwned + Send,
{
    fn decode_body(&mut self, codec_type: CodecType, bytes: &[u8]) -> Result<(), CodecError> {
        *self = Some(codec_type.decode(bytes)?);
        Ok(())
    }
}

/// Read half of a codec. Exactly one reader exists per connection.
#[async_trait::async_trait]
pub trait CodecReader: Send {
    fn codec_type(&self) -> CodecType;

    /// Reads the raw bytes of the next frame, header or body alike.
    async fn read_frame(&mut self) -> Result<Vec<u8>, CodecError>;

    async fn read_header(&mut self) -> Result<Header, CodecError> {
        let frame = self.read_frame().await?;

        // A header that does not decode means framing is lost.
        self.codec_type()
            .decode(&frame)
            .map_err(|e| CodecError::MalformedHeader(e.to_string()))
    }

    /// Reads the next body into `body`.
    ///
    /// With `None` the body is still consumed and discarded so the stream
    /// stays aligned on frame boundaries.
    async fn read_body(&mut self, body: Option<&mut dyn BodySlot>) -> Result<(), CodecError> {
        let frame = self.read_frame().await?;
        match body {
            Some(slot) => slot.decode_body(self.codec_type(), &frame),
            None => Ok(()),
        }
    }
}

/// Write half of a codec. Callers serialize access with their own lock.
#[async_trait::async_trait]
pub trait CodecWriter: Send {
    fn codec_type(&self) -> CodecType;

    /// Writes an already encoded header frame and body frame back to back.
    ///
    /// Either both frames are flushed or the writer closes itself and returns
    /// the error.
    async fn write_frames(&mut self, header: &[u8], body: &[u8]) -> Result<(), CodecError>;

    /// Releases the underlying stream. Later writes fail with
    /// [`CodecError::WriteAfterClose`].
    async fn close(&mut self) -> Result<(), CodecError>;

    /// Encodes and writes one message.
    ///
    /// Both parts are encoded before any byte reaches the stream, so an
    /// encode failure leaves the connection untouched.
    async fn write(&mut self, header: &Header, body: &dyn Body) -> Result<(), CodecError> {
        let codec_type = self.codec_type();
        let header_bytes = codec_type.encode(header)?;
        let body_bytes = body.encode_body(codec_type)?;
        self.write_frames(&header_bytes, &body_bytes).await
    }
}

/// Builds the reader and writer halves for the negotiated codec.
pub fn new_codec<R, W>(
    codec_type: CodecType,
    reader: R,
    writer: W,
) -> (Box<dyn CodecReader>, Box<dyn CodecWriter>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    match codec_type {
        CodecType::Bitcode => {
            let (reader, writer) = BitcodeCodec::split(reader, writer);
            (Box::new(reader), Box::new(writer))
        }
        CodecType::Json => {
            let (reader, writer) = JsonCodec::split(reader, writer);
            (Box::new(reader), Box::new(writer))
        }
    }
}
