//! Property-based test generators using proptest.

use proptest::prelude::*;
use relica_storage::Record;
use serde_json::Value;

/// Strategy for generating record ids.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating field names other than `id`.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z_]{0,11}")
        .expect("Invalid regex")
        .prop_filter("Field name must not be id", |s| s != "id")
}

/// Strategy for generating scalar JSON values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[ -~]{0,24}")
            .expect("Invalid regex")
            .prop_map(Value::from),
    ]
}

/// Strategy for generating records with up to eight scalar fields.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (
        record_id_strategy(),
        prop::collection::btree_map(field_name_strategy(), scalar_value_strategy(), 0..8),
    )
        .prop_map(|(id, fields)| {
            fields
                .into_iter()
                .fold(Record::new(id), |record, (name, value)| record.with_field(name, value))
        })
}

/// Strategy for generating records with distinct ids.
pub fn distinct_records_strategy(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::btree_map(record_id_strategy(), record_strategy(), 0..max).prop_map(
        |by_id| {
            by_id
                .into_iter()
                .map(|(id, record)| Record {
                    id,
                    fields: record.fields,
                })
                .collect()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    proptest! {
        #[test]
        fn records_never_carry_id_field(record in record_strategy()) {
            prop_assert!(!record.id.is_empty());
            prop_assert!(!record.fields.contains_key("id"));
        }

        #[test]
        fn distinct_records_have_unique_ids(records in distinct_records_strategy(16)) {
            let ids: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
            prop_assert_eq!(ids.len(), records.len());
        }
    }
}
