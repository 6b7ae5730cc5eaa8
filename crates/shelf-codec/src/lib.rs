//! Value encoding strategies for Shelf.
//!
//! Backends store text, so every typed value crosses an explicit
//! encode/decode boundary on its way in and out. The boundary is the
//! [`Codec`] trait; call sites never reach for a serializer directly, which
//! lets an alternate encoding replace the default without touching them.
//!
//! - [`JsonCodec`] -- plain JSON text (the default)
//! - [`HexBincodeCodec`] -- bincode, hex-encoded to stay text-safe

pub mod error;
pub mod hex_bincode;
pub mod json;

pub use error::{CodecError, CodecResult};
pub use hex_bincode::HexBincodeCodec;
pub use json::JsonCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Strategy for turning typed values into stored text and back.
pub trait Codec: Send + Sync {
    /// Short identifier used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Encode `value` into its stored text form.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<String>;

    /// Decode stored text back into a `T`.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> CodecResult<T>;
}
