// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The schema half of the API description: a tagged model of OpenAPI
//! schemas, parsed out of loose JSON once at load time.
//!
//! The reference material passes JSON-shaped maps around everywhere; here a
//! schema is parsed into variants up front so that the validator and the
//! response generator can match on structure instead of poking at maps.

use std::collections::BTreeMap;

use serde_json::Value;

/// A parsed OpenAPI schema node.
#[derive(Clone, Debug, PartialEq)]
pub enum Schema {
    /// An unresolved `$ref`; the target is looked up in the registry's
    /// components when the schema is consulted.
    Ref(String),
    /// `type: object`.
    Object {
        properties: BTreeMap<String, Schema>,
        required: Vec<String>,
    },
    /// `type: array`.
    Array {
        items: Option<Box<Schema>>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    /// A leaf: string / integer / number / boolean, with its constraints.
    Scalar(Scalar),
    /// `allOf` / `oneOf` / `anyOf`; walked until an enum or property set
    /// turns up.
    Composite {
        kind: CompositeKind,
        branches: Vec<Schema>,
    },
    /// A schema the document left empty; accepts anything.
    Any,
}

/// Which composition keyword produced a [`Schema::Composite`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeKind {
    AllOf,
    OneOf,
    AnyOf,
}

/// The primitive type of a [`Scalar`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Integer,
    Number,
    Boolean,
}

/// Constraints carried by a leaf schema.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scalar {
    pub ty: Option<ScalarType>,
    pub format: Option<String>,
    pub pattern: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub default: Option<Value>,
    pub example: Option<Value>,
    /// Enum members, rendered as strings the way they arrive in queries.
    pub enumeration: Vec<String>,
}

impl Schema {
    /// Parses a schema node out of loose JSON. Unknown keywords are
    /// ignored; a shape this parser cannot place becomes [`Schema::Any`].
    pub fn from_value(value: &Value) -> Schema {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => return Schema::Any,
        };

        if let Some(target) = obj.get("$ref").and_then(|r| r.as_str()) {
            return Schema::Ref(target.to_string());
        }

        for (key, kind) in &[
            ("allOf", CompositeKind::AllOf),
            ("oneOf", CompositeKind::OneOf),
            ("anyOf", CompositeKind::AnyOf),
        ] {
            if let Some(branches) = obj.get(*key).and_then(|b| b.as_array()) {
                return Schema::Composite {
                    kind: *kind,
                    branches: branches.iter().map(Schema::from_value).collect(),
                };
            }
        }

        let declared = obj.get("type").and_then(|t| t.as_str());
        match declared {
            Some("object") => {
                let properties = obj
                    .get("properties")
                    .and_then(|p| p.as_object())
                    .map(|props| {
                        props
                            .iter()
                            .map(|(name, schema)| (name.clone(), Schema::from_value(schema)))
                            .collect()
                    })
                    .unwrap_or_default();
                let required = obj
                    .get("required")
                    .and_then(|r| r.as_array())
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(|n| n.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();
                Schema::Object {
                    properties,
                    required,
                }
            }
            Some("array") => Schema::Array {
                items: obj.get("items").map(|i| Box::new(Schema::from_value(i))),
                min_items: obj.get("minItems").and_then(|v| v.as_u64()).map(|v| v as usize),
                max_items: obj.get("maxItems").and_then(|v| v.as_u64()).map(|v| v as usize),
            },
            Some("string") | Some("integer") | Some("number") | Some("boolean") | None => {
                let ty = match declared {
                    Some("string") => Some(ScalarType::String),
                    Some("integer") => Some(ScalarType::Integer),
                    Some("number") => Some(ScalarType::Number),
                    Some("boolean") => Some(ScalarType::Boolean),
                    _ => None,
                };
                // a bare `{enum: [...]}` with no type is still a scalar
                let enumeration: Vec<String> = obj
                    .get("enum")
                    .and_then(|e| e.as_array())
                    .map(|members| members.iter().map(render_enum_member).collect())
                    .unwrap_or_default();
                if ty.is_none() && enumeration.is_empty() && !obj.contains_key("pattern") {
                    return Schema::Any;
                }
                Schema::Scalar(Scalar {
                    ty,
                    format: obj.get("format").and_then(|f| f.as_str()).map(String::from),
                    pattern: obj.get("pattern").and_then(|p| p.as_str()).map(String::from),
                    min_length: obj.get("minLength").and_then(|v| v.as_u64()).map(|v| v as usize),
                    max_length: obj.get("maxLength").and_then(|v| v.as_u64()).map(|v| v as usize),
                    minimum: obj.get("minimum").and_then(|v| v.as_i64()),
                    maximum: obj.get("maximum").and_then(|v| v.as_i64()),
                    default: obj.get("default").cloned(),
                    example: obj.get("example").cloned(),
                    enumeration,
                })
            }
            Some(_) => Schema::Any,
        }
    }

    /// The enum members declared directly on this node, if any.
    pub fn enumeration(&self) -> Option<&[String]> {
        match self {
            Schema::Scalar(scalar) if !scalar.enumeration.is_empty() => {
                Some(&scalar.enumeration)
            }
            _ => None,
        }
    }

    /// The item schema, when this node is an array.
    pub fn items(&self) -> Option<&Schema> {
        match self {
            Schema::Array { items, .. } => items.as_deref(),
            _ => None,
        }
    }
}

fn render_enum_member(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_scalars_with_constraints() {
        let schema = Schema::from_value(&json!({
            "type": "integer",
            "minimum": 5,
            "maximum": 100,
            "default": 10,
        }));
        match schema {
            Schema::Scalar(scalar) => {
                assert_eq!(scalar.ty, Some(ScalarType::Integer));
                assert_eq!(scalar.minimum, Some(5));
                assert_eq!(scalar.maximum, Some(100));
                assert_eq!(scalar.default, Some(json!(10)));
            }
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    #[test]
    fn parses_refs_and_composites() {
        let schema = Schema::from_value(&json!({
            "$ref": "#/components/schemas/Tweet"
        }));
        assert_eq!(schema, Schema::Ref("#/components/schemas/Tweet".into()));

        let schema = Schema::from_value(&json!({
            "allOf": [
                { "$ref": "#/components/schemas/Base" },
                { "type": "object", "properties": {} },
            ]
        }));
        match schema {
            Schema::Composite { kind, branches } => {
                assert_eq!(kind, CompositeKind::AllOf);
                assert_eq!(branches.len(), 2);
            }
            other => panic!("expected composite, got {:?}", other),
        }
    }

    #[test]
    fn bare_enum_is_a_scalar() {
        let schema = Schema::from_value(&json!({ "enum": ["created_at", "id"] }));
        assert_eq!(
            schema.enumeration().unwrap(),
            &["created_at".to_string(), "id".to_string()][..]
        );
    }

    #[test]
    fn object_required_and_properties() {
        let schema = Schema::from_value(&json!({
            "type": "object",
            "required": ["text"],
            "properties": {
                "text": { "type": "string", "maxLength": 280 },
                "reply_settings": { "enum": ["everyone", "following"] },
            }
        }));
        match schema {
            Schema::Object {
                properties,
                required,
            } => {
                assert_eq!(required, vec!["text".to_string()]);
                assert!(properties.contains_key("reply_settings"));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }
}
