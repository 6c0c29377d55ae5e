//! Decoded JavaScript values.

use crate::blink::tags::ViewKind;
use serde::Serialize;
use std::fmt;

/// A JavaScript value decoded from the structured-clone format.
///
/// Shared and cyclic structure is never materialised twice: a repeated
/// object appears as [`StructuredValue::ObjectReference`] holding the
/// identifier of its first occurrence (see [`super::ScriptValue::resolve`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum StructuredValue {
    /// undefined
    Undefined,
    /// null
    Null,
    /// A missing element of a dense array.
    Hole,
    /// true or false
    Bool(bool),
    /// Small integer
    Int32(i32),
    /// Unsigned integer
    Uint32(u32),
    /// Number
    Double(f64),
    /// BigInt
    BigInt(BigInt),
    /// String of any of the three encodings
    String(String),
    /// Date as milliseconds since the Unix epoch
    Date(f64),
    /// RegExp
    RegExp {
        /// Source pattern
        pattern: String,
        /// Flag bits as stored
        flags: u32,
    },
    /// Plain object, properties in serialization order
    Object(Vec<(PropertyKey, StructuredValue)>),
    /// Array
    Array(JsArray),
    /// Map, entries in insertion order
    Map(Vec<(StructuredValue, StructuredValue)>),
    /// Set, elements in insertion order
    Set(Vec<StructuredValue>),
    /// ArrayBuffer (plain or resizable)
    ArrayBuffer(ArrayBuffer),
    /// SharedArrayBuffer, by embedder identifier
    SharedArrayBuffer(u32),
    /// Typed array or DataView
    ArrayBufferView(ArrayBufferView),
    /// new Boolean(..)
    BooleanObject(bool),
    /// new Number(..)
    NumberObject(f64),
    /// Object(bigint)
    BigIntObject(BigInt),
    /// new String(..)
    StringObject(String),
    /// Error object
    Error(JsError),
    /// Blink Blob
    Blob {
        /// Blob UUID
        uuid: String,
        /// MIME type
        mime_type: String,
        /// Size in bytes
        size: u64,
    },
    /// Index into the record's external blob list
    BlobIndex(u32),
    /// Blink File
    File(JsFile),
    /// Index of a File in the record's external blob list
    FileIndex(u32),
    /// FileList
    FileList(Vec<JsFile>),
    /// List of File indexes
    FileListIndex(Vec<u32>),
    /// DOMPoint or DOMPointReadOnly
    DomPoint {
        /// x
        x: f64,
        /// y
        y: f64,
        /// z
        z: f64,
        /// w
        w: f64,
    },
    /// WebCrypto key
    CryptoKey(CryptoKey),
    /// DOMFileSystem
    DomFileSystem {
        /// Storage type as stored (temporary, persistent, isolated, external)
        file_system_type: u32,
        /// File system name
        name: String,
        /// Root URL
        root_url: String,
    },
    /// FileSystemFileHandle
    FileSystemFileHandle {
        /// File name
        name: String,
        /// Index of the transfer token in the record's side data
        token_index: u32,
    },
    /// DOMException
    DomException {
        /// Exception name
        name: String,
        /// Message
        message: String,
        /// Stack, written but unused by Blink
        stack: String,
    },
    /// Reference to the object with this identifier
    ObjectReference(u32),
}

impl StructuredValue {
    /// Returns true for values that receive a back-reference identifier.
    pub fn has_identity(&self) -> bool {
        !matches!(
            self,
            StructuredValue::Undefined
                | StructuredValue::Null
                | StructuredValue::Hole
                | StructuredValue::Bool(_)
                | StructuredValue::Int32(_)
                | StructuredValue::Uint32(_)
                | StructuredValue::Double(_)
                | StructuredValue::BigInt(_)
                | StructuredValue::String(_)
                | StructuredValue::ObjectReference(_)
        )
    }

    /// Appends the nested values that were serialized after this one, in
    /// wire order. A view's buffer is excluded: it precedes the view.
    pub(crate) fn push_children<'a>(&'a self, out: &mut Vec<&'a StructuredValue>) {
        match self {
            StructuredValue::Object(properties) => out.extend(properties.iter().map(|(_, v)| v)),
            StructuredValue::Array(array) => {
                out.extend(array.elements.iter());
                out.extend(array.properties.iter().map(|(_, v)| v));
            }
            StructuredValue::Map(entries) => {
                for (key, value) in entries {
                    out.push(key);
                    out.push(value);
                }
            }
            StructuredValue::Set(elements) => out.extend(elements.iter()),
            StructuredValue::Error(error) => out.extend(error.cause.as_deref()),
            _ => {}
        }
    }

    /// Borrow the string content of a String value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StructuredValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a property of an Object by string key.
    pub fn get(&self, key: &str) -> Option<&StructuredValue> {
        match self {
            StructuredValue::Object(properties) => properties
                .iter()
                .find(|(k, _)| matches!(k, PropertyKey::String(s) if s == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Key of an object or array property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyKey {
    /// Named property
    String(String),
    /// Integer-indexed property
    Index(i64),
    /// Non-integer numeric key
    Number(f64),
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Index(i) => write!(f, "{}", i),
            PropertyKey::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A JavaScript array.
///
/// Dense arrays store every element in `elements`, with [`StructuredValue::Hole`]
/// for missing ones. Sparse arrays leave `elements` empty and store indexed
/// entries among `properties`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsArray {
    /// The array's length property
    pub length: u32,
    /// Dense elements
    pub elements: Vec<StructuredValue>,
    /// Extra (or, for sparse arrays, all) properties
    pub properties: Vec<(PropertyKey, StructuredValue)>,
}

/// An ArrayBuffer and its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayBuffer {
    /// Buffer bytes
    pub data: Vec<u8>,
    /// Maximum length for resizable buffers
    pub max_length: Option<u32>,
}

/// A typed array or DataView over an ArrayBuffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayBufferView {
    /// Element type
    pub kind: ViewKind,
    /// The underlying buffer, inline or as a reference
    pub buffer: Box<StructuredValue>,
    /// Offset into the buffer in bytes
    pub byte_offset: u32,
    /// Length in bytes
    pub byte_length: u32,
    /// View flags (bit 0: length tracking, bit 1: backed by resizable buffer)
    pub flags: u32,
}

impl ArrayBufferView {
    /// View flag: the view tracks the length of a resizable buffer.
    pub const LENGTH_TRACKING: u32 = 1;

    /// The viewed bytes, when the buffer is inline.
    pub fn bytes(&self) -> Option<&[u8]> {
        let StructuredValue::ArrayBuffer(buffer) = self.buffer.as_ref() else {
            return None;
        };
        let start = self.byte_offset as usize;
        buffer.data.get(start..start.checked_add(self.byte_length as usize)?)
    }
}

/// A serialized Error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsError {
    /// Prototype name, `Error` unless a prototype tag was present
    pub name: String,
    /// Message, if present
    pub message: Option<String>,
    /// Stack, if present
    pub stack: Option<String>,
    /// Cause, if present
    pub cause: Option<Box<StructuredValue>>,
}

/// A Blink File.
///
/// `name` and `relative_path` are absent before Blink version 4.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsFile {
    /// Backing path
    pub path: String,
    /// File name
    pub name: Option<String>,
    /// Path relative to a picked directory
    pub relative_path: Option<String>,
    /// Blob UUID
    pub uuid: String,
    /// MIME type
    pub mime_type: String,
    /// Size and modification time, when captured
    pub snapshot: Option<FileSnapshot>,
    /// Whether the page could see the file's path
    pub user_visible: bool,
}

/// Metadata captured when a File was serialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FileSnapshot {
    /// Size in bytes
    pub size: u64,
    /// Last modification, milliseconds since the Unix epoch
    pub last_modified_ms: f64,
}

/// A WebCrypto CryptoKey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CryptoKey {
    /// Algorithm and its parameters
    pub algorithm: KeyAlgorithm,
    /// Secret, public or private
    pub key_type: CryptoKeyType,
    /// Whether the key may be exported
    pub extractable: bool,
    /// Usage bits as stored, extractable bit included
    pub usages: u32,
    /// Raw key material
    pub key_data: Vec<u8>,
}

impl CryptoKey {
    /// Usage bit marking an extractable key.
    pub const EXTRACTABLE: u32 = 1;
}

/// Key kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CryptoKeyType {
    /// Symmetric key
    Secret,
    /// Public half of a key pair
    Public,
    /// Private half of a key pair
    Private,
}

/// Algorithm parameters of a CryptoKey. Ids name WebCrypto algorithms, see
/// [`crypto_algorithm_name`](crate::blink::tags::crypto_algorithm_name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum KeyAlgorithm {
    /// AES-CBC, AES-GCM, AES-CTR or AES-KW
    Aes {
        /// Algorithm id
        id: u32,
        /// Key length in bits
        length_bits: u32,
    },
    /// HMAC
    Hmac {
        /// Hash algorithm id
        hash: u32,
        /// Key length in bits
        length_bits: u32,
    },
    /// RSA with a hash
    RsaHashed {
        /// Algorithm id
        id: u32,
        /// Modulus length in bits
        modulus_length_bits: u32,
        /// Public exponent, big-endian
        public_exponent: Vec<u8>,
        /// Hash algorithm id
        hash: u32,
    },
    /// ECDSA or ECDH
    Ec {
        /// Algorithm id
        id: u32,
        /// 1: P-256, 2: P-384, 3: P-521
        named_curve: u32,
    },
    /// Ed25519
    Ed25519 {
        /// Algorithm id
        id: u32,
    },
    /// HKDF or PBKDF2
    NoParams {
        /// Algorithm id
        id: u32,
    },
}

/// Arbitrary precision integer as stored: sign plus little-endian digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BigInt {
    /// Sign
    pub negative: bool,
    /// Magnitude, little-endian bytes
    pub digits: Vec<u8>,
}

impl BigInt {
    /// Converts to `i128` when the value fits.
    pub fn to_i128(&self) -> Option<i128> {
        let significant = self.digits.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        if significant > 16 {
            return None;
        }
        let mut bytes = [0u8; 16];
        bytes[..significant].copy_from_slice(&self.digits[..significant]);
        let magnitude = u128::from_le_bytes(bytes);
        if self.negative {
            if magnitude > i128::MAX as u128 + 1 {
                return None;
            }
            Some((magnitude as i128).wrapping_neg())
        } else {
            i128::try_from(magnitude).ok()
        }
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(value) = self.to_i128() {
            return write!(f, "{}n", value);
        }
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "0x")?;
        for byte in self.digits.iter().rev() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "n")
    }
}
