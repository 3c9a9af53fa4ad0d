// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Recursive request-body validation against a parsed schema.

use serde_json::Value;

use crate::error::{ValidationError, ValidationErrors};
use crate::spec::{ApiSpec, Scalar, ScalarType, Schema};

/// Walks a JSON body against the schema, appending one error per
/// violation. `path` is the dotted location for the error messages.
pub fn walk(
    spec: &ApiSpec,
    schema: &Schema,
    value: &Value,
    path: &str,
    batch: &mut ValidationErrors,
) {
    let schema = spec.resolve_schema(schema);
    match schema {
        Schema::Object {
            properties,
            required,
        } => {
            let obj = match value.as_object() {
                Some(obj) => obj,
                None => {
                    batch.push(field_error(path, value, "is not an object".to_string()));
                    return;
                }
            };
            for name in required {
                let present = obj.get(name).map_or(false, |v| !v.is_null());
                if !present {
                    batch.push(ValidationError::new(
                        &join(path, name),
                        Vec::new(),
                        format!("The `{}` field is required", join(path, name)),
                    ));
                }
            }
            for (name, property) in properties {
                if let Some(child) = obj.get(name) {
                    if !child.is_null() {
                        walk(spec, property, child, &join(path, name), batch);
                    }
                }
            }
        }
        Schema::Array {
            items,
            min_items,
            max_items,
        } => {
            let array = match value.as_array() {
                Some(array) => array,
                None => {
                    batch.push(field_error(path, value, "is not an array".to_string()));
                    return;
                }
            };
            if let Some(min) = min_items {
                if array.len() < *min {
                    batch.push(field_error(
                        path,
                        value,
                        format!("must contain at least {} items", min),
                    ));
                }
            }
            if let Some(max) = max_items {
                if array.len() > *max {
                    batch.push(field_error(
                        path,
                        value,
                        format!("may contain at most {} items", max),
                    ));
                }
            }
            if let Some(items) = items {
                for (i, item) in array.iter().enumerate() {
                    walk(spec, items, item, &format!("{}.{}", path, i), batch);
                }
            }
        }
        Schema::Scalar(scalar) => check_scalar(scalar, value, path, batch),
        Schema::Composite { branches, .. } => {
            // walked until an enum or property set is found
            if let Some(members) = spec.walk_to_enum(schema) {
                if let Some(text) = value.as_str() {
                    if !members.iter().any(|m| m == text) {
                        batch.push(ValidationError::new(
                            path,
                            vec![text.to_string()],
                            format!(
                                "The `{}` field value [{}] is not one of [{}]",
                                path,
                                text,
                                members.join(",")
                            ),
                        ));
                    }
                }
            } else if let Some(object) = branches.iter().find_map(|b| {
                let resolved = spec.resolve_schema(b);
                matches!(resolved, Schema::Object { .. }).then(|| resolved)
            }) {
                walk(spec, object, value, path, batch);
            }
        }
        Schema::Ref(_) | Schema::Any => {}
    }
}

fn check_scalar(scalar: &Scalar, value: &Value, path: &str, batch: &mut ValidationErrors) {
    if !scalar.enumeration.is_empty() {
        let rendered = render(value);
        if !scalar.enumeration.iter().any(|m| *m == rendered) {
            batch.push(ValidationError::new(
                path,
                vec![rendered.clone()],
                format!(
                    "The `{}` field value [{}] is not one of [{}]",
                    path,
                    rendered,
                    scalar.enumeration.join(",")
                ),
            ));
            return;
        }
    }
    match scalar.ty {
        Some(ScalarType::String) => {
            let text = match value.as_str() {
                Some(text) => text,
                None => {
                    batch.push(field_error(path, value, "is not a string".to_string()));
                    return;
                }
            };
            let length = text.chars().count();
            if let Some(min) = scalar.min_length {
                if length < min {
                    batch.push(field_error(
                        path,
                        value,
                        format!("must be at least {} characters", min),
                    ));
                }
            }
            if let Some(max) = scalar.max_length {
                if length > max {
                    batch.push(field_error(
                        path,
                        value,
                        format!("may be at most {} characters", max),
                    ));
                }
            }
            if let Some(pattern) = &scalar.pattern {
                if let Ok(re) = regex::Regex::new(pattern) {
                    if !re.is_match(text) {
                        batch.push(ValidationError::new(
                            path,
                            vec![text.to_string()],
                            format!("The `{}` field value [{}] is not valid", path, text),
                        ));
                    }
                }
            }
        }
        Some(ScalarType::Integer) | Some(ScalarType::Number) => {
            let number = match value.as_i64() {
                Some(number) => number,
                None => {
                    batch.push(field_error(path, value, "is not a number".to_string()));
                    return;
                }
            };
            if let (Some(min), Some(max)) = (scalar.minimum, scalar.maximum) {
                if number < min || number > max {
                    batch.push(field_error(
                        path,
                        value,
                        format!("is not between {} and {}", min, max),
                    ));
                }
            } else if matches!(scalar.minimum, Some(min) if number < min)
                || matches!(scalar.maximum, Some(max) if number > max)
            {
                batch.push(field_error(path, value, "is out of range".to_string()));
            }
        }
        Some(ScalarType::Boolean) => {
            if !value.is_boolean() {
                batch.push(field_error(path, value, "is not a boolean".to_string()));
            }
        }
        _ => {}
    }
}

fn field_error(path: &str, value: &Value, problem: String) -> ValidationError {
    let rendered = render(value);
    ValidationError::new(
        path,
        vec![rendered.clone()],
        format!("The `{}` field value [{}] {}", path, rendered, problem),
    )
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> ApiSpec {
        ApiSpec::from_document(&json!({"paths": {}})).unwrap()
    }

    fn tweet_body_schema() -> Schema {
        Schema::from_value(&json!({
            "type": "object",
            "required": ["text"],
            "properties": {
                "text": {"type": "string", "minLength": 1, "maxLength": 280},
                "reply_settings": {"type": "string", "enum": ["everyone", "following", "mentionedUsers"]},
                "reply": {
                    "type": "object",
                    "properties": {
                        "in_reply_to_tweet_id": {"type": "string", "pattern": "^[0-9]{1,19}$"}
                    }
                },
                "media": {
                    "type": "object",
                    "properties": {
                        "media_ids": {"type": "array", "items": {"type": "string"}, "minItems": 1, "maxItems": 4}
                    }
                }
            }
        }))
    }

    fn errors_for(body: Value) -> ValidationErrors {
        let mut batch = ValidationErrors::default();
        walk(&spec(), &tweet_body_schema(), &body, "", &mut batch);
        batch
    }

    #[test]
    fn missing_required_field() {
        let batch = errors_for(json!({"reply_settings": "everyone"}));
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].message, "The `text` field is required");
        assert_eq!(batch.errors[0].parameters["text"], json!([]));
    }

    #[test]
    fn length_and_enum_violations() {
        let long = "x".repeat(281);
        let batch = errors_for(json!({"text": long, "reply_settings": "nobody"}));
        assert_eq!(batch.errors.len(), 2);
        assert!(batch.errors[0].message.contains("at most 280 characters"));
        assert!(batch.errors[1].message.contains("not one of"));
    }

    #[test]
    fn nested_objects_and_arrays() {
        let batch = errors_for(json!({
            "text": "ok",
            "reply": {"in_reply_to_tweet_id": "abc"},
            "media": {"media_ids": []},
        }));
        assert_eq!(batch.errors.len(), 2);
        assert!(batch
            .errors
            .iter()
            .any(|e| e.message == "The `reply.in_reply_to_tweet_id` field value [abc] is not valid"));
        assert!(batch
            .errors
            .iter()
            .any(|e| e.message.contains("at least 1 items")));
    }

    #[test]
    fn valid_body_passes_clean() {
        let batch = errors_for(json!({
            "text": "hello world",
            "reply_settings": "everyone",
            "media": {"media_ids": ["3_1"]},
        }));
        assert!(batch.is_empty());
    }
}
