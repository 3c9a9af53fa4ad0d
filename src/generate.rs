// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Last-resort response synthesis from the operation's declared response
//! schema, for operations with neither a domain handler nor a canned
//! example.

use serde_json::{json, Map, Value};

use crate::spec::{ApiSpec, CompositeKind, Scalar, ScalarType, Schema};

/// Timestamp used for generated `date-time` values, so that synthesized
/// responses are stable across runs.
const GENERATED_TIMESTAMP: &str = "2023-01-01T00:00:00.000Z";

/// Synthesizes a response body for an operation. Operations that declare
/// no response schema get the smallest plausible envelope.
pub fn response_for(spec: &ApiSpec, schema: Option<&Schema>) -> Value {
    match schema {
        Some(schema) => from_schema(spec, schema, 0),
        None => json!({ "data": {} }),
    }
}

fn from_schema(spec: &ApiSpec, schema: &Schema, depth: usize) -> Value {
    // recursion cap against self-referential documents
    if depth > 8 {
        return Value::Null;
    }
    let schema = spec.resolve_schema(schema);
    match schema {
        Schema::Object { properties, .. } => {
            let mut map = Map::new();
            for (name, property) in properties {
                map.insert(name.clone(), from_schema(spec, property, depth + 1));
            }
            Value::Object(map)
        }
        Schema::Array { items, .. } => match items {
            Some(items) => Value::Array(vec![from_schema(spec, items, depth + 1)]),
            None => Value::Array(Vec::new()),
        },
        Schema::Scalar(scalar) => from_scalar(scalar),
        Schema::Composite { kind, branches } => {
            let pick = match kind {
                // allOf wants the object half; the others take the first
                CompositeKind::AllOf => branches
                    .iter()
                    .find(|b| matches!(spec.resolve_schema(b), Schema::Object { .. })),
                _ => branches.first(),
            };
            pick.map(|b| from_schema(spec, b, depth + 1))
                .unwrap_or(Value::Null)
        }
        Schema::Ref(_) | Schema::Any => Value::Object(Map::new()),
    }
}

fn from_scalar(scalar: &Scalar) -> Value {
    if let Some(example) = &scalar.example {
        return example.clone();
    }
    if let Some(default) = &scalar.default {
        return default.clone();
    }
    if let Some(first) = scalar.enumeration.first() {
        return json!(first);
    }
    match scalar.ty {
        Some(ScalarType::Integer) | Some(ScalarType::Number) => {
            json!(scalar.minimum.unwrap_or(1))
        }
        Some(ScalarType::Boolean) => json!(true),
        _ => match scalar.format.as_deref() {
            Some("date-time") => json!(GENERATED_TIMESTAMP),
            _ => json!("string"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ApiSpec {
        ApiSpec::from_document(&json!({
            "paths": {},
            "components": {"schemas": {
                "Trend": {
                    "type": "object",
                    "properties": {
                        "trend_name": {"type": "string", "example": "#DawnChorus"},
                        "tweet_count": {"type": "integer", "minimum": 0},
                    }
                }
            }}
        }))
        .unwrap()
    }

    #[test]
    fn objects_arrays_and_examples() {
        let schema = Schema::from_value(&json!({
            "type": "object",
            "properties": {
                "data": {
                    "type": "array",
                    "items": {"$ref": "#/components/schemas/Trend"},
                }
            }
        }));
        let generated = response_for(&spec(), Some(&schema));
        assert_eq!(generated["data"][0]["trend_name"], "#DawnChorus");
        assert_eq!(generated["data"][0]["tweet_count"], 0);
    }

    #[test]
    fn enums_and_formats() {
        let schema = Schema::from_value(&json!({
            "type": "object",
            "properties": {
                "state": {"type": "string", "enum": ["live", "ended"]},
                "created_at": {"type": "string", "format": "date-time"},
                "open": {"type": "boolean"},
            }
        }));
        let generated = response_for(&spec(), Some(&schema));
        assert_eq!(generated["state"], "live");
        assert_eq!(generated["created_at"], GENERATED_TIMESTAMP);
        assert_eq!(generated["open"], true);
    }

    #[test]
    fn missing_schema_gets_the_minimal_envelope() {
        assert_eq!(response_for(&spec(), None), json!({"data": {}}));
    }
}
