//! Structured JavaScript values as serialized by Blink and V8.
//!
//! IndexedDB stores each record value as a Blink "serialized script value":
//! a Blink version envelope around V8's tagged value format. Decoding turns
//! the bytes into a [`StructuredValue`] tree; a repeated object appears once
//! and later occurrences are back-references resolved against the tree.

pub mod decoder;
pub mod envelope;
pub mod tags;
pub mod value;

pub use decoder::ValueDecoder;
pub use envelope::{decode_script_value, ScriptValue, Trailer};
pub use tags::{CryptoKeySubTag, HostTag, V8Tag, ViewKind};
pub use value::{
    ArrayBuffer, ArrayBufferView, BigInt, CryptoKey, CryptoKeyType, FileSnapshot, JsArray, JsError,
    JsFile, KeyAlgorithm, PropertyKey, StructuredValue,
};
