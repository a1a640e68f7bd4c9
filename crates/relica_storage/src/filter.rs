//! Predicate filters for record queries.

use crate::record::Record;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A condition on a single property.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Property equals the value.
    Eq(Value),
    /// Property differs from the value (or is absent).
    Neq(Value),
    /// Property is strictly greater than the value.
    Gt(Value),
    /// Property is greater than or equal to the value.
    Gte(Value),
    /// Property is strictly less than the value.
    Lt(Value),
    /// Property equals one of the values.
    Inq(Vec<Value>),
}

impl Condition {
    /// Evaluates the condition against a property value.
    ///
    /// Absent properties only match `Neq`, or `Eq(Null)`.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual = match actual {
            Some(value) => value,
            None => {
                return match self {
                    Condition::Neq(_) => true,
                    Condition::Eq(expected) => expected.is_null(),
                    _ => false,
                }
            }
        };

        match self {
            Condition::Eq(expected) => values_equal(actual, expected),
            Condition::Neq(expected) => !values_equal(actual, expected),
            Condition::Gt(bound) => compare(actual, bound) == Some(Ordering::Greater),
            Condition::Gte(bound) => matches!(
                compare(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::Lt(bound) => compare(actual, bound) == Some(Ordering::Less),
            Condition::Inq(candidates) => candidates.iter().any(|c| values_equal(actual, c)),
        }
    }
}

/// Orders two scalar values. Mismatched types are unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // 1 and 1.0 are the same number
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// A conjunction of property conditions with an optional result limit.
///
/// # Example
///
/// ```rust
/// use relica_storage::{Filter, Record};
///
/// let filter = Filter::new().where_gt("checkpoint", 3).where_eq("model", "todo");
/// let record = Record::new("c1").with_field("checkpoint", 4).with_field("model", "todo");
/// assert!(filter.matches(&record));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, Condition>,
    limit: Option<usize>,
}

impl Filter {
    /// Creates a filter matching every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the condition on a property.
    #[must_use]
    pub fn with_condition(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.insert(field.into(), condition);
        self
    }

    /// Requires `field == value`.
    #[must_use]
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_condition(field, Condition::Eq(value.into()))
    }

    /// Requires `field != value`.
    #[must_use]
    pub fn where_neq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_condition(field, Condition::Neq(value.into()))
    }

    /// Requires `field > value`.
    #[must_use]
    pub fn where_gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_condition(field, Condition::Gt(value.into()))
    }

    /// Requires `field >= value`.
    #[must_use]
    pub fn where_gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_condition(field, Condition::Gte(value.into()))
    }

    /// Requires `field < value`.
    #[must_use]
    pub fn where_lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_condition(field, Condition::Lt(value.into()))
    }

    /// Requires `field` to equal one of `values`.
    #[must_use]
    pub fn where_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.with_condition(field, Condition::Inq(values))
    }

    /// Caps the number of returned records.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the result limit, if any.
    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    /// Returns the property conditions.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns true if the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Returns true if the record satisfies every condition.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(record.field(field).as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Record {
        Record::new("5")
            .with_field("checkpoint", 3)
            .with_field("model", "todo")
            .with_field("done", true)
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&record()));
        assert!(Filter::new().is_empty());
    }

    #[test]
    fn numeric_comparisons() {
        let r = record();
        assert!(Filter::new().where_gt("checkpoint", 2).matches(&r));
        assert!(!Filter::new().where_gt("checkpoint", 3).matches(&r));
        assert!(Filter::new().where_gte("checkpoint", 3).matches(&r));
        assert!(Filter::new().where_lt("checkpoint", 4).matches(&r));
        assert!(Filter::new().where_gt("checkpoint", -1).matches(&r));
        assert!(Filter::new().where_eq("checkpoint", 3.0).matches(&r));
    }

    #[test]
    fn mismatched_types_never_compare() {
        let r = record();
        assert!(!Filter::new().where_gt("checkpoint", "2").matches(&r));
        assert!(!Filter::new().where_eq("checkpoint", "3").matches(&r));
    }

    #[test]
    fn id_is_filterable() {
        let r = record();
        assert!(Filter::new().where_in("id", ["4", "5"]).matches(&r));
        assert!(!Filter::new().where_in("id", ["4"]).matches(&r));
        assert!(!Filter::new().where_in("id", Vec::<String>::new()).matches(&r));
    }

    #[test]
    fn absent_fields() {
        let r = record();
        assert!(!Filter::new().where_eq("owner", "me").matches(&r));
        assert!(Filter::new().where_neq("owner", "me").matches(&r));
        assert!(Filter::new().where_eq("owner", json!(null)).matches(&r));
        assert!(!Filter::new().where_gt("owner", 1).matches(&r));
    }

    #[test]
    fn conditions_are_conjunctive() {
        let r = record();
        let filter = Filter::new().where_eq("model", "todo").where_eq("done", false);
        assert!(!filter.matches(&r));
        let filter = Filter::new().where_eq("model", "todo").where_eq("done", true);
        assert!(filter.matches(&r));
    }

    #[test]
    fn later_condition_replaces_earlier() {
        let filter = Filter::new().where_eq("model", "a").where_eq("model", "todo");
        assert_eq!(filter.conditions().count(), 1);
        assert!(filter.matches(&record()));
    }
}
