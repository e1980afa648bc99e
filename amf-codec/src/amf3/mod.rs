//! AMF3 codec (§4.D): the binary, trait-inlining AMF3 wire format with its
//! three reference tables (object, string, trait).

pub mod length;
pub mod marker;
pub mod read;
pub mod write;

pub use marker::TypeMarker;
pub use read::Amf3Decoder;
pub use write::Amf3Encoder;
