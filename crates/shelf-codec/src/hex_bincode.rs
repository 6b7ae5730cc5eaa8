use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CodecError, CodecResult};
use crate::Codec;

/// Compact binary codec: `bincode`, wrapped in lowercase hex so the result is
/// valid backend text.
///
/// bincode is not self-describing, so types that deserialize via
/// `deserialize_any` (such as `serde_json::Value`) cannot be decoded.
/// Decoding must consume the whole payload; trailing bytes are an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HexBincodeCodec;

/// Fixed-width integers, little endian, no trailing bytes.
fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

impl Codec for HexBincodeCodec {
    fn name(&self) -> &'static str {
        "hex-bincode"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<String> {
        let bytes = options().serialize(value).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(hex::encode(bytes))
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> CodecResult<T> {
        let bytes = hex::decode(text).map_err(|e| CodecError::Decode(e.to_string()))?;
        options()
            .deserialize(&bytes)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }
}
