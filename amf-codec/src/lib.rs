//! A bidirectional AMF0/AMF3 codec: binary decode/encode with per-session
//! reference tables, an `avmplus-object` version bridge, packet framing, and
//! a typed data-contract binding layer on top of the raw value tree.
//!
//! Start at [`codec::Codec`] — build one with [`codec::Codec::builder`],
//! registering any [`registry::DataContract`] types the graph may contain,
//! then call [`codec::Codec::encode`]/[`codec::Codec::decode`] for single
//! payloads or [`codec::Codec::encode_packet`]/[`codec::Codec::decode_packet`]
//! for framed envelopes.

pub mod amf0;
pub mod amf3;
pub mod binder;
pub mod codec;
pub mod error;
mod nom_utils;
pub mod packet;
pub mod registry;
pub mod session;
pub mod value;

pub use binder::{Binder, Bound};
pub use codec::{AmfVersion, Codec, CodecBuilder, Options};
pub use error::AmfError;
pub use packet::{Packet, PacketHeader, PacketMessage};
pub use registry::{ContractKind, DataContract, Registry, RegistryBuilder};
pub use value::{Element, Trait, TraitFlag, Value};
