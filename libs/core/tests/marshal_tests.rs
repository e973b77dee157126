use serde_json::{json, Value as Json};
use tether_core::{marshal, Error, Payload, Value, WireType};

fn roundtrip(native: Json) {
    let value = marshal::encode(&native);
    assert_eq!(marshal::decode(&value), native, "roundtrip of {}", native);
}

#[test]
fn primitives_and_arrays_roundtrip() {
    roundtrip(json!(true));
    roundtrip(json!(42));
    roundtrip(json!(3.14));
    roundtrip(json!("x"));
    roundtrip(json!([1.0, 2.0]));
    roundtrip(json!([1, 2]));
    roundtrip(json!([]));
    roundtrip(json!(["a", "b"]));
}

#[test]
fn encode_picks_variant_from_native_type() {
    assert_eq!(marshal::encode(&json!(true)), Value::Boolean(true));
    assert_eq!(marshal::encode(&json!(42)), Value::Integer(42));
    assert_eq!(marshal::encode(&json!(3.14)), Value::Double(3.14));
    assert_eq!(marshal::encode(&json!("x")), Value::String("x".into()));
    assert_eq!(marshal::encode(&json!([1, 2])), Value::IntegerArray(vec![1, 2]));
    assert_eq!(
        marshal::encode(&json!([true, false])),
        Value::BooleanArray(vec![true, false])
    );
}

#[test]
fn empty_array_is_double_array() {
    assert_eq!(marshal::infer_wire_type(&json!([])), WireType::DoubleArray);
    assert_eq!(marshal::encode(&json!([])), Value::DoubleArray(vec![]));
}

#[test]
fn inference_follows_first_element() {
    assert_eq!(marshal::infer_wire_type(&json!([1.5, 2])), WireType::DoubleArray);
    assert_eq!(marshal::infer_wire_type(&json!([1, 2.5])), WireType::IntegerArray);
    assert_eq!(marshal::infer_wire_type(&json!(["a", 1])), WireType::StringArray);
    assert_eq!(marshal::infer_wire_type(&json!([false])), WireType::BooleanArray);
}

#[test]
fn integers_widen_inside_double_arrays() {
    assert_eq!(
        marshal::encode(&json!([1.5, 2])),
        Value::DoubleArray(vec![1.5, 2.0])
    );
}

#[test]
fn mixed_arrays_fall_back_to_text() {
    assert_eq!(
        marshal::encode(&json!([1, "two", true])),
        Value::StringArray(vec!["1".into(), "two".into(), "true".into()])
    );
    assert_eq!(
        marshal::encode(&json!([[1], [2]])),
        Value::StringArray(vec!["[1]".into(), "[2]".into()])
    );
}

#[test]
fn unknown_shapes_fall_back_to_string() {
    assert_eq!(marshal::infer_wire_type(&Json::Null), WireType::String);
    assert_eq!(marshal::encode(&Json::Null), Value::String("null".into()));

    let object = json!({"x": 1});
    assert_eq!(marshal::infer_wire_type(&object), WireType::String);
    assert_eq!(marshal::encode(&object), Value::String(r#"{"x":1}"#.into()));
}

#[test]
fn encode_as_coerces_to_fixed_topic_type() {
    assert_eq!(
        marshal::encode_as(&json!(2.9), &WireType::Integer),
        Some(Value::Integer(2))
    );
    assert_eq!(
        marshal::encode_as(&json!(2), &WireType::Double),
        Some(Value::Double(2.0))
    );
    assert_eq!(
        marshal::encode_as(&json!(7), &WireType::String),
        Some(Value::String("7".into()))
    );
    assert_eq!(
        marshal::encode_as(&json!(1.5), &WireType::DoubleArray),
        Some(Value::DoubleArray(vec![1.5]))
    );
    assert_eq!(
        marshal::encode_as(&json!([1.9, -1.9]), &WireType::IntegerArray),
        Some(Value::IntegerArray(vec![1, -1]))
    );
}

#[test]
fn encode_as_rejects_impossible_coercions() {
    assert_eq!(marshal::encode_as(&json!("x"), &WireType::Integer), None);
    assert_eq!(marshal::encode_as(&json!([1, 2]), &WireType::Double), None);
    assert_eq!(marshal::encode_as(&json!(1), &WireType::Boolean), None);
    assert_eq!(
        marshal::encode_as(&json!(1), &WireType::Struct("Pose2d".into())),
        None
    );
}

#[test]
fn non_finite_doubles_decode_to_null() {
    assert_eq!(marshal::decode(&Value::Double(f64::NAN)), Json::Null);
    assert_eq!(
        marshal::decode(&Value::DoubleArray(vec![1.0, f64::INFINITY])),
        json!([1.0, null])
    );
}

#[test]
fn wire_type_strings_roundtrip() {
    let tags = [
        WireType::Boolean,
        WireType::Integer,
        WireType::Double,
        WireType::String,
        WireType::BooleanArray,
        WireType::IntegerArray,
        WireType::DoubleArray,
        WireType::StringArray,
        WireType::Struct("Pose2d".into()),
    ];
    for tag in tags {
        let parsed: WireType = tag.to_string().parse().unwrap();
        assert_eq!(parsed, tag);
    }

    assert_eq!(WireType::IntegerArray.to_string(), "int[]");
    assert_eq!(WireType::Struct("Pose2d".into()).to_string(), "struct:Pose2d");
}

#[test]
fn unknown_wire_type_is_rejected() {
    match "float".parse::<WireType>() {
        Err(Error::UnknownWireType(tag)) => assert_eq!(tag, "float"),
        other => panic!("Expected UnknownWireType, got {:?}", other),
    }
    assert!("struct:".parse::<WireType>().is_err());
}

#[test]
fn payload_reports_wire_type() {
    let payload = Payload::from(Value::Integer(1));
    assert_eq!(payload.wire_type(), WireType::Integer);
    assert_eq!(payload.as_value(), Some(&Value::Integer(1)));

    let payload = Payload::Struct {
        type_id: "Pose2d".into(),
        bytes: vec![0; 24],
    };
    assert_eq!(payload.wire_type(), WireType::Struct("Pose2d".into()));
    assert_eq!(payload.as_value(), None);
}
