//! Unified error surface for the codec.
//!
//! Every public entry point returns [`Result<T, AmfError>`]; internal parse
//! errors produced while walking the nom combinators in [`crate::amf0`] and
//! [`crate::amf3`] are folded into this type at the read-module boundary
//! (see [`crate::nom_utils`]) so nothing nom-specific crosses the crate API.

use std::fmt;
use thiserror::Error;

/// Which per-session reference table an out-of-range index pointed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTable {
    /// The object-reference table (AMF0 and AMF3).
    Object,
    /// The string-reference table (AMF3 only).
    String,
    /// The trait-reference table (AMF3 only).
    Trait,
}

impl fmt::Display for RefTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTable::Object => f.write_str("object"),
            RefTable::String => f.write_str("string"),
            RefTable::Trait => f.write_str("trait"),
        }
    }
}

/// Every distinct reportable failure the codec can surface.
#[derive(Debug, Error)]
pub enum AmfError {
    /// The source ran out of bytes in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A marker byte that isn't part of the active version's marker set.
    #[error("unknown type marker 0x{0:02x}")]
    UnknownMarker(u8),

    /// A U29 ran past its 4-byte maximum without terminating. Kept in the
    /// public taxonomy per the wire format's own definition, though the
    /// current reader never constructs it (see `nom_utils::AmfParseErrorKind::MalformedU29`).
    #[error("malformed U29: too many continuation bytes")]
    MalformedU29,

    /// String bytes that did not decode as UTF-8.
    #[error("invalid utf-8 in string payload")]
    InvalidUtf8,

    /// A back-reference pointed at or past the current end of a table.
    #[error("{table} reference {index} out of range")]
    ReferenceOutOfRange {
        /// The table the reference was resolved against.
        table: RefTable,
        /// The offending index.
        index: usize,
    },

    /// A decoded trait's class name has no matching registry entry.
    #[error("unknown type alias `{0}`")]
    UnknownTypeAlias(String),

    /// The encoder was asked to serialize a type with no registry entry.
    #[error("type `{0}` is not registered with the codec")]
    UnregisteredType(String),

    /// A decoded value couldn't be bound onto a data contract member.
    #[error("contract violation on field `{field}`: {reason}")]
    ContractViolation {
        /// The member name the violation occurred on.
        field: String,
        /// Human-readable reason (overflow, missing, not nullable, ...).
        reason: String,
    },

    /// A feature this implementation intentionally doesn't support.
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    /// Recursion went past the configured maximum (default 64).
    #[error("recursion depth exceeded")]
    DepthExceeded,

    /// A framed payload's declared length didn't match bytes consumed.
    #[error("declared payload length {declared} does not match {actual} bytes consumed")]
    LengthMismatch {
        /// The length the envelope claimed.
        declared: u32,
        /// The length actually produced/consumed.
        actual: u32,
    },

    /// The underlying byte sink/source failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate's public surface.
pub type Result<T> = std::result::Result<T, AmfError>;
