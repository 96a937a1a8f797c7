use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

/// A JSON Schema describing data a step consumes or produces.
#[derive(Clone)]
pub struct Shape {
    schema: Value,
    validator: Option<Arc<jsonschema::Validator>>,
}

impl Shape {
    /// Compile `schema`. Fails with a message when it is not a valid JSON Schema.
    pub fn new(schema: Value) -> Result<Self, String> {
        if is_unconstrained(&schema) {
            return Ok(Self {
                schema,
                validator: None,
            });
        }
        let validator =
            jsonschema::validator_for(&schema).map_err(|e| format!("Invalid JSON schema: {}", e))?;
        Ok(Self {
            schema,
            validator: Some(Arc::new(validator)),
        })
    }

    /// Accepts any value.
    pub fn any() -> Self {
        Self {
            schema: json!({}),
            validator: None,
        }
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn validate(&self, value: &Value) -> Result<(), Vec<String>> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let errors: Vec<String> = validator
            .iter_errors(value)
            .map(|e| format!("{} at {}", e, e.instance_path()))
            .collect();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Top-level `required` property names.
    pub fn required_fields(&self) -> Vec<String> {
        required(self.schema.as_object())
    }

    /// Checks that every value this shape's `producer` can emit is
    /// structurally acceptable to this shape.
    ///
    /// Only `type`, `required`, `properties` and `items` are compared. A side
    /// that leaves a keyword unconstrained never causes a mismatch.
    pub fn check_satisfied_by(&self, producer: &Shape) -> Result<(), String> {
        check_compatible(&self.schema, &producer.schema, "$")
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Shape").field(&self.schema).finish()
    }
}

impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.schema.serialize(serializer)
    }
}

fn is_unconstrained(schema: &Value) -> bool {
    match schema {
        Value::Bool(true) => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn required(schema: Option<&Map<String, Value>>) -> Vec<String> {
    schema
        .and_then(|s| s.get("required"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn types(schema: &Map<String, Value>) -> Option<Vec<String>> {
    match schema.get("type")? {
        Value::String(t) => Some(vec![t.clone()]),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

fn type_accepts(consumer: &[String], produced: &str) -> bool {
    consumer
        .iter()
        .any(|t| t == produced || (t == "number" && produced == "integer"))
}

fn check_compatible(consumer: &Value, producer: &Value, path: &str) -> Result<(), String> {
    let (Some(consumer), Some(producer)) = (consumer.as_object(), producer.as_object()) else {
        return Ok(());
    };

    if let (Some(wanted), Some(given)) = (types(consumer), types(producer))
        && let Some(bad) = given.iter().find(|t| !type_accepts(&wanted, t))
    {
        return Err(format!(
            "{}: produces type '{}' but consumer accepts {}",
            path,
            bad,
            wanted.join(" | ")
        ));
    }

    let producer_props = producer.get("properties").and_then(Value::as_object);
    let producer_constrains_object =
        producer_props.is_some() || producer.contains_key("required");
    if producer_constrains_object {
        let guaranteed = required(Some(producer));
        for field in required(Some(consumer)) {
            if !guaranteed.contains(&field) {
                return Err(format!(
                    "{}: required property '{}' is not guaranteed by the producer",
                    path, field
                ));
            }
        }
    }

    if let (Some(wanted), Some(given)) = (
        consumer.get("properties").and_then(Value::as_object),
        producer_props,
    ) {
        for (name, sub) in wanted {
            if let Some(produced) = given.get(name) {
                check_compatible(sub, produced, &format!("{}.{}", path, name))?;
            }
        }
    }

    if let (Some(wanted), Some(given)) = (consumer.get("items"), producer.get("items")) {
        check_compatible(wanted, given, &format!("{}[]", path))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(v: Value) -> Shape {
        Shape::new(v).unwrap()
    }

    #[test]
    fn integer_output_feeds_number_input() {
        let consumer = shape(json!({ "type": "number" }));
        let producer = shape(json!({ "type": "integer" }));
        assert!(consumer.check_satisfied_by(&producer).is_ok());
        assert!(producer.check_satisfied_by(&consumer).is_err());
    }

    #[test]
    fn optional_producer_field_does_not_satisfy_required_consumer_field() {
        let consumer = shape(json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        }));
        let producer = shape(json!({
            "type": "object",
            "properties": { "name": { "type": "string" } }
        }));
        let err = consumer.check_satisfied_by(&producer).unwrap_err();
        assert!(err.contains("'name'"));
    }

    #[test]
    fn nested_type_conflict_reports_path() {
        let consumer = shape(json!({
            "type": "object",
            "properties": { "meta": { "type": "object", "properties": { "n": { "type": "string" } } } }
        }));
        let producer = shape(json!({
            "type": "object",
            "properties": { "meta": { "type": "object", "properties": { "n": { "type": "integer" } } } }
        }));
        let err = consumer.check_satisfied_by(&producer).unwrap_err();
        assert!(err.starts_with("$.meta.n"));
    }

    #[test]
    fn unconstrained_producer_is_accepted() {
        let consumer = shape(json!({ "type": "object", "required": ["x"] }));
        assert!(consumer.check_satisfied_by(&Shape::any()).is_ok());
    }
}
