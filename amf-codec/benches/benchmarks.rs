use amf_codec::{AmfVersion, Codec, Element, Options, Trait, Value};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::rc::Rc;

/// A moderately nested object graph: an array of twenty typed objects, each
/// with a handful of scalar fields and a shared string repeated across every
/// instance, exercising interning on both the string and trait tables.
fn sample_graph() -> Value {
    let trt = Trait {
        type_alias: "com.example.Row".to_string(),
        flags: enumset::EnumSet::empty(),
        members: vec!["id".to_string(), "label".to_string(), "score".to_string()],
    };
    let rows: Vec<Rc<Value>> = (0..20)
        .map(|i| {
            Rc::new(Value::Object(
                vec![
                    Element::new("id", i as i32),
                    Element::new("label", "row-label"),
                    Element::new("score", (i as f64) * 1.5),
                ],
                Some(trt.clone()),
            ))
        })
        .collect();
    Value::Array(rows)
}

fn encode_decode(c: &mut Criterion) {
    let codec = Codec::anonymous(Options {
        version: AmfVersion::Amf3,
        allow_version_switch: false,
    });
    let value = sample_graph();
    let encoded = codec.encode_value(&value, Vec::new()).unwrap();

    c.bench_function("amf3 encode 20-row object graph", |b| {
        b.iter(|| codec.encode_value(black_box(&value), Vec::new()).unwrap())
    });

    c.bench_function("amf3 decode 20-row object graph", |b| {
        b.iter(|| codec.decode_value(black_box(&encoded)).unwrap())
    });
}

criterion_group!(benches, encode_decode);
criterion_main!(benches);
