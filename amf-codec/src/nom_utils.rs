//! A small `nom` error type that can carry the codec's own failure reasons
//! through the combinator chain, so the read modules never have to smuggle
//! information through `nom::error::ErrorKind` alone.

use crate::error::{AmfError, RefTable};
use nom::error::{ErrorKind, ParseError};
use nom::Err as NomErr;

/// Parser error carried through `amf0::read` and `amf3::read`.
#[derive(Debug, Clone, PartialEq)]
pub struct AmfParseError<I> {
    /// The remaining input at the point of failure.
    pub input: I,
    /// What went wrong.
    pub kind: AmfParseErrorKind,
}

/// The reasons a parse can fail, beyond what `nom::error::ErrorKind` covers.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfParseErrorKind {
    /// Fell through to a generic nom combinator failure (e.g. `take` ran out of bytes).
    Nom(ErrorKind),
    /// A marker byte outside the active version's marker set.
    UnknownMarker(u8),
    /// A U29 exceeded its continuation-byte budget. Part of the public error
    /// taxonomy, but structurally unreachable as implemented: `read_u29`
    /// always stops after the 4th byte, so nothing in `amf0`/`amf3` ever
    /// constructs this variant (see the doc comment on `amf3::read::read_u29`).
    MalformedU29,
    /// A string payload was not valid UTF-8.
    InvalidUtf8,
    /// A back-reference index was at or past the table's current length.
    ReferenceOutOfRange(RefTable, usize),
    /// A feature this implementation declines to support (externalizable traits, reserved markers).
    Unsupported(&'static str),
    /// The recursion-depth budget was exhausted.
    DepthExceeded,
}

impl<I> ParseError<I> for AmfParseError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        AmfParseError {
            input,
            kind: AmfParseErrorKind::Nom(kind),
        }
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Result alias used by every parser in `amf0::read` and `amf3::read`.
pub type AMFResult<'a, T> = nom::IResult<&'a [u8], T, AmfParseError<&'a [u8]>>;

/// Build a `nom::Err::Error` carrying one of our own failure reasons.
pub(crate) fn fail<'a, T>(input: &'a [u8], kind: AmfParseErrorKind) -> AMFResult<'a, T> {
    Err(NomErr::Error(AmfParseError { input, kind }))
}

/// Fold a terminal `nom::Err<AmfParseError>` into the crate's public [`AmfError`].
///
/// This is the boundary mentioned in the component design: callers of
/// [`crate::codec::Codec`] never see a `nom` type.
pub fn to_amf_error(e: NomErr<AmfParseError<&[u8]>>) -> AmfError {
    match e {
        NomErr::Incomplete(_) => AmfError::UnexpectedEof,
        NomErr::Error(err) | NomErr::Failure(err) => match err.kind {
            AmfParseErrorKind::Nom(_) => AmfError::UnexpectedEof,
            AmfParseErrorKind::UnknownMarker(b) => AmfError::UnknownMarker(b),
            AmfParseErrorKind::MalformedU29 => AmfError::MalformedU29,
            AmfParseErrorKind::InvalidUtf8 => AmfError::InvalidUtf8,
            AmfParseErrorKind::ReferenceOutOfRange(table, index) => {
                AmfError::ReferenceOutOfRange { table, index }
            }
            AmfParseErrorKind::Unsupported(feature) => AmfError::Unsupported(feature.to_string()),
            AmfParseErrorKind::DepthExceeded => AmfError::DepthExceeded,
        },
    }
}
