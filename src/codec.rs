mod bitcode_codec;
mod codec_error;
mod codec_header;
mod codec_traits;
mod codec_type;
mod json_codec;

pub use bitcode_codec::BitcodeCodec;
pub use codec_error::CodecError;
pub use codec_header::Header;
pub use codec_traits::{Body, BodySlot, CodecReader, CodecWriter, new_codec};
pub use codec_type::CodecType;
pub use json_codec::JsonCodec;
