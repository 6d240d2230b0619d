//! Property-based test generators using proptest.

use crate::fixtures::Device;
use esorm_gateway::{FilterTerm, Operator};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for field names as users spell them (`ProductId`, `state`).
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9]{0,15}").expect("Invalid regex")
}

/// Strategy for index names.
pub fn index_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,23}").expect("Invalid regex")
}

/// Strategy for filter operators.
pub fn operator_strategy() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Eq),
        Just(Operator::Like),
        Just(Operator::In),
        Just(Operator::Between),
        Just(Operator::Neq),
        Just(Operator::Gt),
        Just(Operator::Gte),
        Just(Operator::Lt),
        Just(Operator::Lte),
        Just(Operator::Exists),
    ]
}

/// Strategy for scalar filter values, null included.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9]{1,12}".prop_map(Value::from),
    ]
}

/// Strategy for filter terms with arbitrary operators and values.
pub fn filter_term_strategy() -> impl Strategy<Value = FilterTerm> {
    (field_name_strategy(), scalar_value_strategy(), operator_strategy())
        .prop_map(|(key, value, op)| FilterTerm::new(key, value, op))
}

/// Strategy for single-line JSON documents, as committed to the batched
/// writer.
pub fn document_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::btree_map("[a-z]{1,8}", scalar_value_strategy(), 1..6).prop_map(|fields| {
        let map: serde_json::Map<String, Value> = fields.into_iter().collect();
        Value::Object(map).to_string().into_bytes()
    })
}

/// Strategy for devices with distinct-looking ids.
pub fn device_strategy() -> impl Strategy<Value = Device> {
    (
        "d[0-9]{1,6}",
        "[a-z ]{1,16}",
        "p[0-9]{1,3}",
        prop_oneof![Just("online"), Just("offline"), Just("noActive")],
    )
        .prop_map(|(id, name, product_id, state)| {
            let mut device = Device::new(&id, &name, &product_id);
            device.state = state.to_string();
            device
        })
}
