//! Serialization tags.
//!
//! Three closed tag sets: V8 value tags, typed-array view kinds, and the
//! Blink host-object tags that follow a V8 host-object marker.

use serde::Serialize;

/// Latest V8 wire format version understood by the decoder.
pub const LATEST_V8_VERSION: u32 = 15;

/// First Blink version whose envelope is written separately from V8's.
pub const MIN_SEPARATE_ENVELOPE_VERSION: u32 = 16;

/// First Blink version that carries a trailer offset in the envelope.
pub const MIN_TRAILER_VERSION: u32 = 21;

/// Version tag shared by the Blink envelope and the V8 header.
pub const VERSION_TAG: u8 = 0xFF;

/// Blink trailer offset tag.
pub const TRAILER_OFFSET_TAG: u8 = 0xFE;

/// V8 value tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum V8Tag {
    /// Header version
    Version = 0xFF,
    /// Ignored padding
    Padding = 0x00,
    /// Object count check, followed by a varint
    VerifyObjectCount = b'?',
    /// Array hole
    TheHole = b'-',
    /// undefined
    Undefined = b'_',
    /// null
    Null = b'0',
    /// true
    True = b'T',
    /// false
    False = b'F',
    /// Zig-zag varint int32
    Int32 = b'I',
    /// Varint uint32
    Uint32 = b'U',
    /// Little-endian double
    Double = b'N',
    /// BigInt bitfield + digits
    BigInt = b'Z',
    /// UTF-8 string
    Utf8String = b'S',
    /// Latin-1 string
    OneByteString = b'"',
    /// UTF-16LE string
    TwoByteString = b'c',
    /// Back-reference by identifier
    ObjectReference = b'^',
    /// Begin object
    BeginJsObject = b'o',
    /// End object, followed by the property count
    EndJsObject = b'{',
    /// Begin sparse array
    BeginSparseJsArray = b'a',
    /// End sparse array
    EndSparseJsArray = b'@',
    /// Begin dense array
    BeginDenseJsArray = b'A',
    /// End dense array
    EndDenseJsArray = b'$',
    /// Date, milliseconds since the epoch
    Date = b'D',
    /// new Boolean(true)
    TrueObject = b'y',
    /// new Boolean(false)
    FalseObject = b'x',
    /// new Number(n)
    NumberObject = b'n',
    /// Object(bigint)
    BigIntObject = b'z',
    /// new String(s)
    StringObject = b's',
    /// RegExp pattern and flags
    RegExp = b'R',
    /// Begin Map
    BeginJsMap = b';',
    /// End Map, followed by twice the entry count
    EndJsMap = b':',
    /// Begin Set
    BeginJsSet = b'\'',
    /// End Set, followed by the element count
    EndJsSet = b',',
    /// ArrayBuffer
    ArrayBuffer = b'B',
    /// Resizable ArrayBuffer
    ResizableArrayBuffer = b'~',
    /// Transferred ArrayBuffer
    ArrayBufferTransfer = b't',
    /// View over the preceding buffer
    ArrayBufferView = b'V',
    /// SharedArrayBuffer by identifier
    SharedArrayBuffer = b'u',
    /// Shared object
    SharedObject = b'p',
    /// Wasm module
    WasmModuleTransfer = b'w',
    /// Embedder object
    HostObject = b'\\',
    /// Wasm memory
    WasmMemoryTransfer = b'm',
    /// Error object
    Error = b'r',
}

impl V8Tag {
    /// Converts a byte into a `V8Tag`.
    pub fn from_u8(value: u8) -> Option<Self> {
        let tag = match value {
            0xFF => V8Tag::Version,
            0x00 => V8Tag::Padding,
            b'?' => V8Tag::VerifyObjectCount,
            b'-' => V8Tag::TheHole,
            b'_' => V8Tag::Undefined,
            b'0' => V8Tag::Null,
            b'T' => V8Tag::True,
            b'F' => V8Tag::False,
            b'I' => V8Tag::Int32,
            b'U' => V8Tag::Uint32,
            b'N' => V8Tag::Double,
            b'Z' => V8Tag::BigInt,
            b'S' => V8Tag::Utf8String,
            b'"' => V8Tag::OneByteString,
            b'c' => V8Tag::TwoByteString,
            b'^' => V8Tag::ObjectReference,
            b'o' => V8Tag::BeginJsObject,
            b'{' => V8Tag::EndJsObject,
            b'a' => V8Tag::BeginSparseJsArray,
            b'@' => V8Tag::EndSparseJsArray,
            b'A' => V8Tag::BeginDenseJsArray,
            b'$' => V8Tag::EndDenseJsArray,
            b'D' => V8Tag::Date,
            b'y' => V8Tag::TrueObject,
            b'x' => V8Tag::FalseObject,
            b'n' => V8Tag::NumberObject,
            b'z' => V8Tag::BigIntObject,
            b's' => V8Tag::StringObject,
            b'R' => V8Tag::RegExp,
            b';' => V8Tag::BeginJsMap,
            b':' => V8Tag::EndJsMap,
            b'\'' => V8Tag::BeginJsSet,
            b',' => V8Tag::EndJsSet,
            b'B' => V8Tag::ArrayBuffer,
            b'~' => V8Tag::ResizableArrayBuffer,
            b't' => V8Tag::ArrayBufferTransfer,
            b'V' => V8Tag::ArrayBufferView,
            b'u' => V8Tag::SharedArrayBuffer,
            b'p' => V8Tag::SharedObject,
            b'w' => V8Tag::WasmModuleTransfer,
            b'\\' => V8Tag::HostObject,
            b'm' => V8Tag::WasmMemoryTransfer,
            b'r' => V8Tag::Error,
            _ => return None,
        };
        Some(tag)
    }
}

/// Element kind of an ArrayBufferView.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewKind {
    /// Int8Array
    Int8Array,
    /// Uint8Array
    Uint8Array,
    /// Uint8ClampedArray
    Uint8ClampedArray,
    /// Int16Array
    Int16Array,
    /// Uint16Array
    Uint16Array,
    /// Int32Array
    Int32Array,
    /// Uint32Array
    Uint32Array,
    /// Float32Array
    Float32Array,
    /// Float64Array
    Float64Array,
    /// BigInt64Array
    BigInt64Array,
    /// BigUint64Array
    BigUint64Array,
    /// DataView
    DataView,
}

impl ViewKind {
    /// Converts the view kind byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        let kind = match value {
            b'b' => ViewKind::Int8Array,
            b'B' => ViewKind::Uint8Array,
            b'C' => ViewKind::Uint8ClampedArray,
            b'w' => ViewKind::Int16Array,
            b'W' => ViewKind::Uint16Array,
            b'd' => ViewKind::Int32Array,
            b'D' => ViewKind::Uint32Array,
            b'f' => ViewKind::Float32Array,
            b'F' => ViewKind::Float64Array,
            b'q' => ViewKind::BigInt64Array,
            b'Q' => ViewKind::BigUint64Array,
            b'?' => ViewKind::DataView,
            _ => return None,
        };
        Some(kind)
    }

    /// Size of one element in bytes.
    pub fn element_size(self) -> u32 {
        match self {
            ViewKind::Int8Array
            | ViewKind::Uint8Array
            | ViewKind::Uint8ClampedArray
            | ViewKind::DataView => 1,
            ViewKind::Int16Array | ViewKind::Uint16Array => 2,
            ViewKind::Int32Array | ViewKind::Uint32Array | ViewKind::Float32Array => 4,
            ViewKind::Float64Array | ViewKind::BigInt64Array | ViewKind::BigUint64Array => 8,
        }
    }
}

/// Blink host-object tags that can be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostTag {
    /// Blob with uuid, type and size
    Blob = b'b',
    /// Index into the record's blob list
    BlobIndex = b'i',
    /// File with path, uuid, type and optional snapshot
    File = b'f',
    /// Index of a File in the record's blob list
    FileIndex = b'e',
    /// List of Files
    FileList = b'l',
    /// List of file indexes
    FileListIndex = b'L',
    /// DOMPoint
    DomPoint = b'Q',
    /// DOMPointReadOnly
    DomPointReadOnly = b'W',
    /// WebCrypto CryptoKey
    CryptoKey = b'K',
    /// DOMFileSystem
    DomFileSystem = b'd',
    /// FileSystemFileHandle
    FileSystemFileHandle = b'n',
    /// DOMException
    DomException = b'x',
}

impl HostTag {
    /// Converts a Blink tag byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'b' => Some(HostTag::Blob),
            b'i' => Some(HostTag::BlobIndex),
            b'f' => Some(HostTag::File),
            b'e' => Some(HostTag::FileIndex),
            b'l' => Some(HostTag::FileList),
            b'L' => Some(HostTag::FileListIndex),
            b'Q' => Some(HostTag::DomPoint),
            b'W' => Some(HostTag::DomPointReadOnly),
            b'K' => Some(HostTag::CryptoKey),
            b'd' => Some(HostTag::DomFileSystem),
            b'n' => Some(HostTag::FileSystemFileHandle),
            b'x' => Some(HostTag::DomException),
            _ => None,
        }
    }

    /// First Blink version that writes this object in its current layout,
    /// for the tags whose older layouts cannot be read.
    pub fn min_blink_version(self) -> Option<u32> {
        match self {
            HostTag::Blob | HostTag::File | HostTag::FileList => Some(3),
            HostTag::BlobIndex | HostTag::FileIndex | HostTag::FileListIndex => Some(6),
            _ => None,
        }
    }
}

/// Key layout following a CryptoKey tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoKeySubTag {
    /// AES: algorithm id, length in bytes
    Aes = 1,
    /// HMAC: length in bytes, hash id
    Hmac = 2,
    /// RSA with hash: id, key type, modulus bits, exponent, hash id
    RsaHashed = 4,
    /// Elliptic curve: id, key type, named curve
    Ec = 5,
    /// Algorithm id only
    NoParams = 6,
    /// Ed25519: id, key type
    Ed25519 = 7,
}

impl CryptoKeySubTag {
    /// Converts a CryptoKey sub-tag byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(CryptoKeySubTag::Aes),
            2 => Some(CryptoKeySubTag::Hmac),
            4 => Some(CryptoKeySubTag::RsaHashed),
            5 => Some(CryptoKeySubTag::Ec),
            6 => Some(CryptoKeySubTag::NoParams),
            7 => Some(CryptoKeySubTag::Ed25519),
            _ => None,
        }
    }
}

/// Name of a WebCrypto algorithm id as Blink stores it.
pub fn crypto_algorithm_name(id: u32) -> Option<&'static str> {
    let name = match id {
        1 => "AES-CBC",
        2 => "HMAC",
        3 => "RSASSA-PKCS1-v1_5",
        5 => "SHA-1",
        6 => "SHA-256",
        7 => "SHA-384",
        8 => "SHA-512",
        9 => "AES-GCM",
        10 => "RSA-OAEP",
        11 => "AES-CTR",
        12 => "AES-KW",
        13 => "RSA-PSS",
        14 => "ECDSA",
        15 => "ECDH",
        16 => "HKDF",
        17 => "PBKDF2",
        18 => "Ed25519",
        _ => return None,
    };
    Some(name)
}

/// Sub-tags inside a serialized Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    /// Prototype is EvalError
    EvalError,
    /// Prototype is RangeError
    RangeError,
    /// Prototype is ReferenceError
    ReferenceError,
    /// Prototype is SyntaxError
    SyntaxError,
    /// Prototype is TypeError
    TypeError,
    /// Prototype is URIError
    UriError,
    /// Message string follows
    Message,
    /// Cause value follows
    Cause,
    /// Stack string follows
    Stack,
    /// End of the error
    End,
}

impl ErrorTag {
    /// Converts an error sub-tag byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        let tag = match value {
            b'E' => ErrorTag::EvalError,
            b'R' => ErrorTag::RangeError,
            b'F' => ErrorTag::ReferenceError,
            b'S' => ErrorTag::SyntaxError,
            b'T' => ErrorTag::TypeError,
            b'U' => ErrorTag::UriError,
            b'm' => ErrorTag::Message,
            b'c' => ErrorTag::Cause,
            b's' => ErrorTag::Stack,
            b'.' => ErrorTag::End,
            _ => return None,
        };
        Some(tag)
    }

    /// Prototype name for the prototype sub-tags.
    pub fn prototype_name(self) -> Option<&'static str> {
        match self {
            ErrorTag::EvalError => Some("EvalError"),
            ErrorTag::RangeError => Some("RangeError"),
            ErrorTag::ReferenceError => Some("ReferenceError"),
            ErrorTag::SyntaxError => Some("SyntaxError"),
            ErrorTag::TypeError => Some("TypeError"),
            ErrorTag::UriError => Some("URIError"),
            ErrorTag::Message | ErrorTag::Cause | ErrorTag::Stack | ErrorTag::End => None,
        }
    }
}
