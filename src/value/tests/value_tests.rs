use super::*;
use proptest::prelude::*;

fn order() -> Value {
    Value::Map(
        ValueMap::new()
            .with("customer", "acme")
            .with("amount", 12i64)
            .with("lines", Value::List(vec![Value::from("a"), Value::from("b")])),
    )
}

#[test]
fn test_binary_survives_json_bridge() {
    let value = Value::Map(ValueMap::new().with("blob", Value::Binary(vec![0, 1, 2, 255])));
    let text = serde_json::to_string(&value).unwrap();
    assert!(text.contains("$binary"));

    let back: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(back, value);
}

#[test]
fn test_map_keeps_insertion_order() {
    let json = order().to_json();
    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["customer", "amount", "lines"]);
}

#[test]
fn test_map_equality_ignores_order() {
    let a = ValueMap::new().with("x", 1i64).with("y", 2i64);
    let b = ValueMap::new().with("y", 2i64).with("x", 1i64);
    assert_eq!(a, b);
}

#[test]
fn test_merge_is_recursive() {
    let mut value = order();
    let update = Value::Map(
        ValueMap::new()
            .with("amount", 15i64)
            .with("address", Value::Map(ValueMap::new().with("city", "Utrecht"))),
    );
    value.merge(&update);

    assert_eq!(value.get("customer"), Some(&Value::from("acme")));
    assert_eq!(value.get("amount"), Some(&Value::from(15i64)));
    assert_eq!(
        value.get("address").and_then(|a| a.get("city")),
        Some(&Value::from("Utrecht"))
    );
}

#[test]
fn test_merge_replaces_non_maps() {
    let mut value = Value::from("old");
    value.merge(&Value::from(3i64));
    assert_eq!(value, Value::from(3i64));
}

#[test]
fn test_truthiness() {
    assert!(!Value::Null.is_truthy());
    assert!(!Value::from(false).is_truthy());
    assert!(!Value::from(0i64).is_truthy());
    assert!(!Value::from("").is_truthy());
    assert!(Value::from("yes").is_truthy());
    assert!(Value::from(2i64).is_truthy());
    assert!(order().is_truthy());
}

#[test]
fn test_typed_round_trip() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Line {
        product: String,
        quantity: u32,
    }

    let line = Line {
        product: "bolt".to_string(),
        quantity: 4,
    };
    let value = Value::from_serde(&line).unwrap();
    assert_eq!(value.get("quantity"), Some(&Value::from(4i64)));
    assert_eq!(value.to_serde::<Line>().unwrap(), line);
}

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::from),
        proptest::collection::vec(any::<u8>(), 0..8).prop_map(Value::Binary),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            proptest::collection::vec(("[a-z]{1,6}", inner), 0..4)
                .prop_map(|entries| Value::Map(entries.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn prop_value_round_trips_through_text(value in arb_value()) {
        let text = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn prop_merge_with_self_is_identity(value in arb_value()) {
        prop_assert_eq!(value.merged_with(&value), value);
    }
}
