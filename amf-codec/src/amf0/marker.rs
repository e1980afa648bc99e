//! The 13 AMF0 type markers (§4.C), decoded the same way the teacher decodes
//! its `AMFVersion`: a `#[repr(u8)]` enum behind `derive-try-from-primitive`.

use derive_try_from_primitive::TryFromPrimitive;

/// One AMF0 wire marker byte.
#[derive(TryFromPrimitive, Eq, PartialEq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum TypeMarker {
    /// IEEE-754 double.
    Number = 0x00,
    /// Single byte, 0 or 1.
    Boolean = 0x01,
    /// 16-bit length-prefixed UTF-8.
    String = 0x02,
    /// Untyped key/value object, terminated by the empty-key sentinel.
    Object = 0x03,
    /// `null`.
    Null = 0x05,
    /// `undefined`.
    Undefined = 0x06,
    /// 16-bit back-reference into the object table.
    Reference = 0x07,
    /// 32-bit "count" (advisory) + the same body as `Object`.
    EcmaArray = 0x08,
    /// The empty-key + `ObjectEnd` sentinel itself, never a value's own marker.
    ObjectEnd = 0x09,
    /// 32-bit count + that many values.
    StrictArray = 0x0A,
    /// Double (ms since epoch) + 16-bit timezone (always emitted as zero).
    Date = 0x0B,
    /// 32-bit length-prefixed UTF-8.
    LongString = 0x0C,
    /// 32-bit length-prefixed UTF-8 XML markup.
    XmlDocument = 0x0F,
    /// Class name + the same body as `Object`.
    TypedObject = 0x10,
    /// Hands control to the AMF3 codec for exactly one value (§4.E).
    AvmPlus = 0x11,
}
