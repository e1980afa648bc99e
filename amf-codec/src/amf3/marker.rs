//! The 13 AMF3 type markers (§4.D).

use derive_try_from_primitive::TryFromPrimitive;

/// One AMF3 wire marker byte.
#[derive(TryFromPrimitive, Eq, PartialEq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum TypeMarker {
    /// `undefined`.
    Undefined = 0x00,
    /// `null`.
    Null = 0x01,
    /// `false`.
    False = 0x02,
    /// `true`.
    True = 0x03,
    /// U29, reinterpreted as signed 29-bit two's complement.
    Integer = 0x04,
    /// IEEE-754 double.
    Double = 0x05,
    /// Reference-or-inline UTF-8, interned in the string table.
    String = 0x06,
    /// Legacy XML type (`XmlDoc` marker in the spec's naming); content identical to `Xml`.
    XmlDoc = 0x07,
    /// Reference-or-inline double (ms since epoch); no timezone field.
    Date = 0x08,
    /// Reference-or-inline dense array, with an optional associative prefix.
    Array = 0x09,
    /// Reference-or-inline object, with an inline-or-by-reference trait header.
    Object = 0x0A,
    /// E4X XML type; content identical to `XmlDoc`.
    Xml = 0x0B,
    /// Reference-or-inline raw byte string.
    ByteArray = 0x0C,
}
