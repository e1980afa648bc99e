//! Integration tests for the top-level `Codec`: typed round-trips through a
//! registered `DataContract`, packet framing (S5), and the AMF0/AMF3 version
//! bridge (S6).

use amf_codec::{
    AmfError, AmfVersion, Bound, Codec, ContractKind, DataContract, Options, Packet,
    PacketHeader, PacketMessage, Value,
};
use amf_codec::registry::{coerce_f64, coerce_i32, field, require};

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

impl DataContract for Point {
    fn alias() -> &'static str {
        "com.example.Point"
    }

    fn to_value(&self) -> Value {
        use amf_codec::{Element, Trait};
        Value::Object(
            vec![Element::new("x", self.x), Element::new("y", self.y)],
            Some(Trait::named(Self::alias())),
        )
    }

    fn from_value(value: &Value) -> Result<Self, AmfError> {
        match value {
            Value::Object(elements, _) => Ok(Point {
                x: coerce_i32(require(field(elements, "x"), "x")?, "x")?,
                y: coerce_i32(require(field(elements, "y"), "y")?, "y")?,
            }),
            other => Err(AmfError::ContractViolation {
                field: "Point".to_string(),
                reason: format!("expected an object, got {:?}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Direction {
    North,
    South,
}

impl DataContract for Direction {
    fn alias() -> &'static str {
        "com.example.Direction"
    }

    fn kind() -> ContractKind {
        ContractKind::Enum
    }

    fn to_value(&self) -> Value {
        match self {
            Direction::North => Value::from("north"),
            Direction::South => Value::from("south"),
        }
    }

    fn from_value(value: &Value) -> Result<Self, AmfError> {
        match value {
            Value::String(s) if s == "north" => Ok(Direction::North),
            Value::String(s) if s == "south" => Ok(Direction::South),
            other => Err(AmfError::ContractViolation {
                field: "Direction".to_string(),
                reason: format!("unrecognized direction {:?}", other),
            }),
        }
    }
}

fn amf3_codec() -> Codec {
    Codec::builder()
        .register::<Point>()
        .register::<Direction>()
        .build(Options {
            version: AmfVersion::Amf3,
            allow_version_switch: false,
        })
}

#[test]
fn typed_round_trip_through_registered_contract() {
    let codec = amf3_codec();
    let p = Point { x: 3, y: -4 };
    let bytes = codec.encode(&p, Vec::new()).unwrap();
    let decoded: Point = codec.decode(&bytes).unwrap();
    assert_eq!(decoded, p);
}

#[test]
fn enum_contract_round_trips() {
    let codec = amf3_codec();
    let bytes = codec.encode(&Direction::South, Vec::new()).unwrap();
    let decoded: Direction = codec.decode(&bytes).unwrap();
    assert_eq!(decoded, Direction::South);
}

#[test]
fn decode_as_unregistered_type_fails_closed() {
    struct Unregistered;
    impl DataContract for Unregistered {
        fn alias() -> &'static str {
            "com.example.Unregistered"
        }
        fn to_value(&self) -> Value {
            Value::Null
        }
        fn from_value(_: &Value) -> Result<Self, AmfError> {
            Ok(Unregistered)
        }
    }

    let codec = amf3_codec();
    let bytes = codec.encode_value(&Value::Null, Vec::new()).unwrap();
    let err = codec.decode::<Unregistered>(&bytes).unwrap_err();
    assert!(matches!(err, AmfError::UnregisteredType(_)));
}

#[test]
fn decode_as_rejects_a_value_tagged_with_a_different_registered_type() {
    use amf_codec::{Element, Trait};
    let codec = amf3_codec();
    // Structurally looks like a Point, but the wire trait names Direction.
    let mistagged = Value::Object(
        vec![Element::new("x", 1i32), Element::new("y", 2i32)],
        Some(Trait::named(Direction::alias())),
    );
    let bytes = codec.encode_value(&mistagged, Vec::new()).unwrap();
    let err = codec.decode::<Point>(&bytes).unwrap_err();
    match err {
        AmfError::UnknownTypeAlias(alias) => assert_eq!(alias, Direction::alias()),
        other => panic!("expected UnknownTypeAlias, got {:?}", other),
    }
}

#[test]
fn decode_bound_falls_back_to_anonymous_for_unknown_alias() {
    use amf_codec::{Element, Trait};
    let codec = amf3_codec();
    let anonymous_typed = Value::Object(
        vec![Element::new("z", 9i32)],
        Some(Trait::named("com.example.NotRegistered")),
    );
    let bytes = codec.encode_value(&anonymous_typed, Vec::new()).unwrap();
    match codec.decode_bound(&bytes).unwrap() {
        Bound::Anonymous(_) => {}
        Bound::Typed(_) => panic!("expected an anonymous fallback for an unregistered alias"),
    }
}

#[test]
fn missing_field_is_a_contract_violation() {
    use amf_codec::{Element, Trait};
    let codec = amf3_codec();
    // Missing "y".
    let incomplete = Value::Object(
        vec![Element::new("x", 1i32)],
        Some(Trait::named(Point::alias())),
    );
    let bytes = codec.encode_value(&incomplete, Vec::new()).unwrap();
    let err = codec.decode::<Point>(&bytes).unwrap_err();
    assert!(matches!(err, AmfError::ContractViolation { .. }));
}

#[test]
fn coerce_f64_accepts_int_for_numeric_fields() {
    use amf_codec::Value;
    let v = Value::Int(42);
    assert_eq!(coerce_f64(&v, "n").unwrap(), 42.0);
}

/// S5 — a packet with one header and one message, both AMF0, with an
/// unknown-length ("FFFFFFFF") body on the message.
#[test]
fn s5_packet_round_trip() {
    let codec = Codec::anonymous(Options {
        version: AmfVersion::Amf0,
        allow_version_switch: false,
    });
    let packet = Packet {
        version: AmfVersion::Amf0,
        headers: vec![PacketHeader {
            name: "svc.m".to_string(),
            must_understand: false,
            value: Value::String("/1".to_string()),
        }],
        messages: vec![PacketMessage {
            target_uri: "svc.m".to_string(),
            response_uri: "/1".to_string(),
            value: Value::Null,
        }],
    };
    let bytes = codec.encode_packet(&packet, Vec::new()).unwrap();
    let decoded = codec.decode_packet(&bytes).unwrap();
    assert_eq!(decoded.headers.len(), 1);
    assert_eq!(decoded.headers[0].name, "svc.m");
    assert_eq!(decoded.messages.len(), 1);
    assert_eq!(decoded.messages[0].target_uri, "svc.m");
    assert_eq!(decoded.messages[0].value, Value::Null);
}

#[test]
fn packet_headers_dedupe_keeping_first_position_last_value() {
    let codec = Codec::anonymous(Options {
        version: AmfVersion::Amf3,
        allow_version_switch: false,
    });
    let packet = Packet {
        version: AmfVersion::Amf3,
        headers: vec![
            PacketHeader {
                name: "a".to_string(),
                must_understand: false,
                value: Value::Int(1),
            },
            PacketHeader {
                name: "b".to_string(),
                must_understand: false,
                value: Value::Int(2),
            },
            PacketHeader {
                name: "a".to_string(),
                must_understand: true,
                value: Value::Int(3),
            },
        ],
        messages: vec![],
    };
    let bytes = codec.encode_packet(&packet, Vec::new()).unwrap();
    let decoded = codec.decode_packet(&bytes).unwrap();
    assert_eq!(decoded.headers.len(), 2);
    assert_eq!(decoded.headers[0].name, "a");
    assert_eq!(decoded.headers[0].value, Value::Int(3));
    assert!(decoded.headers[0].must_understand);
    assert_eq!(decoded.headers[1].name, "b");
}

/// S6 — an AMF0 encode of a value with no AMF0 representation bridges to
/// AMF3 via the `AvmPlus` marker when the codec allows it.
#[test]
fn s6_amf0_bridges_bytearray_to_amf3() {
    let codec = Codec::anonymous(Options {
        version: AmfVersion::Amf0,
        allow_version_switch: true,
    });
    let bytes = codec
        .encode_value(&Value::ByteArray(vec![1, 2, 3]), Vec::new())
        .unwrap();
    assert_eq!(bytes[0], 0x11, "expected the AvmPlus bridge marker");
    let decoded = codec.decode_value(&bytes).unwrap();
    assert_eq!(decoded, Value::ByteArray(vec![1, 2, 3]));
}

#[test]
fn bridge_is_refused_without_allow_version_switch() {
    let codec = Codec::anonymous(Options {
        version: AmfVersion::Amf0,
        allow_version_switch: false,
    });
    let err = codec
        .encode_value(&Value::ByteArray(vec![1, 2, 3]), Vec::new())
        .unwrap_err();
    assert!(matches!(err, AmfError::Unsupported(_)));
}
