// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Request validation, driven entirely by the spec registry.
//!
//! Validation runs in a fixed order and stops at the first stage that
//! produced errors: path parameters, query parameters, body, field
//! selections, expansions, and finally the per-endpoint business rules.
//! Each stage accumulates everything it finds before stopping, so a
//! request with three bad query parameters reports all three at once.

pub mod body;

use chrono::DateTime;
use serde_json::Value;

use crate::error::{Error, Result, ValidationError, ValidationErrors};
use crate::query::QueryParams;
use crate::spec::{ApiSpec, Parameter, ResolvedOperation, Scalar, ScalarType, Schema};
use crate::store::Store;

/// Runs every validation stage for one resolved request.
pub fn validate(
    spec: &ApiSpec,
    store: &Store,
    resolved: &ResolvedOperation<'_>,
    query: &QueryParams,
    body: Option<&Value>,
) -> Result<()> {
    fn settle(batch: ValidationErrors) -> Result<()> {
        if batch.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(batch))
        }
    }
    settle(path_parameters(spec, resolved))?;
    settle(query_parameters(spec, resolved, query))?;
    settle(request_body(spec, resolved, body))?;
    settle(field_selections(spec, resolved, query))?;
    settle(expansions(spec, resolved, query))?;
    settle(business_rules(store, resolved, body))
}

fn path_parameters(spec: &ApiSpec, resolved: &ResolvedOperation<'_>) -> ValidationErrors {
    let mut batch = ValidationErrors::default();
    for parameter in spec.path_parameters(resolved.item, resolved.operation) {
        let value = match resolved.path_param(&parameter.name) {
            Some(value) => value,
            None => {
                batch.push(ValidationError::new(
                    &parameter.name,
                    Vec::new(),
                    format!("The `{}` path parameter is missing", parameter.name),
                ));
                continue;
            }
        };
        check_value(spec, parameter, value, &mut batch);
    }
    batch
}

fn query_parameters(
    spec: &ApiSpec,
    resolved: &ResolvedOperation<'_>,
    query: &QueryParams,
) -> ValidationErrors {
    let mut batch = ValidationErrors::default();
    let declared = spec.query_parameters(resolved.item, resolved.operation);

    // unknown parameters fail, except field selections and expansions
    for (name, _) in &query.raw {
        let known = declared.iter().any(|p| &p.name == name);
        let tolerated = name.ends_with(".fields") || name == "expansions";
        if !known && !tolerated {
            batch.push(ValidationError::new(
                name,
                Vec::new(),
                format!("The query parameter [{}] is not one this endpoint accepts", name),
            ));
        }
    }

    for parameter in &declared {
        if parameter.name.ends_with(".fields") || parameter.name == "expansions" {
            continue;
        }
        let values = query.get_list(&parameter.name);
        if values.is_empty() {
            if parameter.required && query.get(&parameter.name).is_none() {
                batch.push(ValidationError::new(
                    &parameter.name,
                    Vec::new(),
                    format!("The `{}` query parameter can not be empty", parameter.name),
                ));
            } else if query.get(&parameter.name) == Some("") {
                batch.push(ValidationError::new(
                    &parameter.name,
                    Vec::new(),
                    format!("The `{}` query parameter can not be empty", parameter.name),
                ));
            }
            continue;
        }

        match spec.resolve_schema(&parameter.schema) {
            Schema::Array {
                items,
                min_items,
                max_items,
            } => {
                if let Some(min) = min_items {
                    if values.len() < *min {
                        batch.push(ValidationError::new(
                            &parameter.name,
                            values.clone(),
                            format!(
                                "The `{}` query parameter must contain at least {} items",
                                parameter.name, min
                            ),
                        ));
                    }
                }
                if let Some(max) = max_items {
                    if values.len() > *max {
                        batch.push(ValidationError::new(
                            &parameter.name,
                            values.clone(),
                            format!(
                                "The `{}` query parameter may contain at most {} items",
                                parameter.name, max
                            ),
                        ));
                    }
                }
                if let Some(items) = items {
                    check_grouped_values(spec, &parameter.name, items, &values, &mut batch);
                }
            }
            _ => {
                for value in &values {
                    check_value(spec, parameter, value, &mut batch);
                }
            }
        }
    }
    batch
}

/// Checks a comma-list parameter, grouping every invalid value into one
/// error object the way the production validator reports `ids=`.
fn check_grouped_values(
    spec: &ApiSpec,
    name: &str,
    items: &Schema,
    values: &[String],
    batch: &mut ValidationErrors,
) {
    let mut invalid = Vec::new();
    for value in values {
        let mut probe = ValidationErrors::default();
        check_schema_value(spec, name, items, value, &mut probe);
        if !probe.is_empty() {
            invalid.push(value.clone());
        }
    }
    if !invalid.is_empty() {
        // `ids` and `id` report under the singular key
        let key = if name == "ids" { "id" } else { name };
        let message = format!(
            "The `{}` query parameter value [{}] is not valid",
            key, invalid[0]
        );
        batch.push(ValidationError::new(key, invalid, message));
    }
}

fn check_value(spec: &ApiSpec, parameter: &Parameter, value: &str, batch: &mut ValidationErrors) {
    check_schema_value(spec, &parameter.name, &parameter.schema, value, batch);
}

fn check_schema_value(
    spec: &ApiSpec,
    name: &str,
    schema: &Schema,
    value: &str,
    batch: &mut ValidationErrors,
) {
    let schema = spec.resolve_schema(schema);
    let scalar = match schema {
        Schema::Scalar(scalar) => scalar,
        Schema::Composite { .. } => {
            if let Some(members) = spec.walk_to_enum(schema) {
                if !members.iter().any(|m| m == value) {
                    batch.push(not_one_of(name, value, members));
                }
            }
            return;
        }
        _ => return,
    };
    check_scalar_text(name, scalar, value, batch);
}

fn check_scalar_text(name: &str, scalar: &Scalar, value: &str, batch: &mut ValidationErrors) {
    if !scalar.enumeration.is_empty() {
        if !scalar.enumeration.iter().any(|m| m == value) {
            batch.push(not_one_of(name, value, &scalar.enumeration));
        }
        return;
    }
    match scalar.ty {
        Some(ScalarType::Integer) | Some(ScalarType::Number) => {
            let number = match value.parse::<i64>() {
                Ok(number) => number,
                Err(_) => {
                    batch.push(not_valid(name, value));
                    return;
                }
            };
            match (scalar.minimum, scalar.maximum) {
                (Some(min), Some(max)) if number < min || number > max => {
                    batch.push(ValidationError::new(
                        name,
                        vec![value.to_string()],
                        format!(
                            "The `{}` query parameter value [{}] is not between {} and {}",
                            name, value, min, max
                        ),
                    ));
                }
                (Some(min), None) if number < min => batch.push(not_valid(name, value)),
                (None, Some(max)) if number > max => batch.push(not_valid(name, value)),
                _ => {}
            }
        }
        Some(ScalarType::Boolean) => {
            if value != "true" && value != "false" {
                batch.push(not_valid(name, value));
            }
        }
        _ => {
            if scalar.format.as_deref() == Some("date-time") {
                if DateTime::parse_from_rfc3339(value).is_err() {
                    batch.push(not_valid(name, value));
                }
                return;
            }
            let length = value.chars().count();
            if matches!(scalar.min_length, Some(min) if length < min)
                || matches!(scalar.max_length, Some(max) if length > max)
            {
                batch.push(not_valid(name, value));
                return;
            }
            if let Some(pattern) = &scalar.pattern {
                if let Ok(re) = regex::Regex::new(pattern) {
                    if !re.is_match(value) {
                        batch.push(not_valid(name, value));
                    }
                }
            }
        }
    }
}

fn request_body(
    spec: &ApiSpec,
    resolved: &ResolvedOperation<'_>,
    body: Option<&Value>,
) -> ValidationErrors {
    let mut batch = ValidationErrors::default();
    if !matches!(resolved.method.as_str(), "POST" | "PUT" | "PATCH") {
        return batch;
    }
    let declared = match &resolved.operation.request_body {
        Some(declared) => declared,
        None => return batch,
    };
    let body = match body {
        Some(body) => body,
        None => {
            if declared.required {
                batch.push(ValidationError::new(
                    "body",
                    Vec::new(),
                    "The request body can not be empty".to_string(),
                ));
            }
            return batch;
        }
    };
    body::walk(spec, &declared.schema, body, "", &mut batch);
    batch
}

fn field_selections(
    spec: &ApiSpec,
    resolved: &ResolvedOperation<'_>,
    query: &QueryParams,
) -> ValidationErrors {
    let mut batch = ValidationErrors::default();
    let declared = spec.query_parameters(resolved.item, resolved.operation);
    for (ty, requested) in &query.fields {
        let name = format!("{}.fields", ty);
        let parameter = declared.iter().find(|p| p.name == name);
        let members = match parameter.and_then(|p| spec.walk_to_enum(&p.schema)) {
            Some(members) => members,
            None => continue,
        };
        for value in requested {
            if !members.iter().any(|m| m == value) {
                batch.push(not_one_of(&name, value, members));
            }
        }
    }
    batch
}

fn expansions(
    spec: &ApiSpec,
    resolved: &ResolvedOperation<'_>,
    query: &QueryParams,
) -> ValidationErrors {
    let mut batch = ValidationErrors::default();
    if query.expansions.is_empty() {
        return batch;
    }
    let declared = spec.query_parameters(resolved.item, resolved.operation);
    let members = match declared
        .iter()
        .find(|p| p.name == "expansions")
        .and_then(|p| spec.walk_to_enum(&p.schema))
    {
        Some(members) => members,
        None => return batch,
    };
    for value in &query.expansions {
        if !members.iter().any(|m| m == value) {
            batch.push(not_one_of("expansions", value, members));
        }
    }
    batch
}

/// The per-endpoint rules a schema cannot express.
fn business_rules(
    store: &Store,
    resolved: &ResolvedOperation<'_>,
    body: Option<&Value>,
) -> ValidationErrors {
    let mut batch = ValidationErrors::default();
    if resolved.pattern == crate::links::tweets::LOOKUP && resolved.method == "POST" {
        if let Some(body) = body {
            tweet_creation_rules(store, body, &mut batch);
        }
    }
    batch
}

fn tweet_creation_rules(store: &Store, body: &Value, batch: &mut ValidationErrors) {
    // at most one attachment family per tweet
    let exclusive = [
        "poll",
        "quote_tweet_id",
        "direct_message_deep_link",
        "media",
        "card_uri",
    ];
    let present: Vec<&str> = exclusive
        .iter()
        .filter(|name| {
            body.get(**name)
                .map_or(false, |v| !v.is_null() && v != &Value::String(String::new()))
        })
        .copied()
        .collect();
    if present.len() > 1 {
        batch.push(ValidationError::new(
            present[1],
            Vec::new(),
            format!(
                "The request can only contain one of [{}]",
                exclusive.join(",")
            ),
        ));
        return;
    }

    if let Some(quoted) = body.get("quote_tweet_id").and_then(|v| v.as_str()) {
        if store.get_tweet(quoted).is_none() {
            batch.push(ValidationError::new(
                "quote_tweet_id",
                vec![quoted.to_string()],
                format!("The `quote_tweet_id` value [{}] does not exist", quoted),
            ));
        }
    }
    if let Some(parent) = body
        .get("reply")
        .and_then(|r| r.get("in_reply_to_tweet_id"))
        .and_then(|v| v.as_str())
    {
        if store.get_tweet(parent).is_none() {
            batch.push(ValidationError::new(
                "reply.in_reply_to_tweet_id",
                vec![parent.to_string()],
                format!(
                    "The `reply.in_reply_to_tweet_id` value [{}] does not exist",
                    parent
                ),
            ));
        }
    }
    if let Some(media) = body.get("media") {
        if let Some(ids) = media.get("media_ids").and_then(|v| v.as_array()) {
            for id in ids.iter().filter_map(|v| v.as_str()) {
                let known = store.get_media(id).is_some() || store.get_media_by_key(id).is_some();
                if !known {
                    batch.push(ValidationError::new(
                        "media.media_ids",
                        vec![id.to_string()],
                        format!("The `media.media_ids` value [{}] does not exist", id),
                    ));
                }
            }
        }
        if let Some(tagged) = media.get("tagged_user_ids").and_then(|v| v.as_array()) {
            for id in tagged.iter().filter_map(|v| v.as_str()) {
                if store.get_user(id).is_none() {
                    batch.push(ValidationError::new(
                        "media.tagged_user_ids",
                        vec![id.to_string()],
                        format!("The `media.tagged_user_ids` value [{}] does not exist", id),
                    ));
                }
            }
        }
    }
}

fn not_valid(name: &str, value: &str) -> ValidationError {
    ValidationError::new(
        name,
        vec![value.to_string()],
        format!("The `{}` query parameter value [{}] is not valid", name, value),
    )
}

fn not_one_of(name: &str, value: &str, members: &[String]) -> ValidationError {
    ValidationError::new(
        name,
        vec![value.to_string()],
        format!(
            "The `{}` query parameter value [{}] is not one of [{}]",
            name,
            value,
            members.join(",")
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> ApiSpec {
        let doc = json!({
            "paths": {
                "/2/tweets": {
                    "get": {
                        "parameters": [
                            {
                                "name": "ids", "in": "query", "required": true,
                                "schema": {
                                    "type": "array", "minItems": 1, "maxItems": 100,
                                    "items": {"type": "string", "pattern": "^[0-9]{1,19}$"}
                                }
                            },
                            {
                                "name": "tweet.fields", "in": "query",
                                "schema": {
                                    "type": "array",
                                    "items": {"type": "string", "enum": ["author_id", "created_at", "lang"]}
                                }
                            },
                            {
                                "name": "expansions", "in": "query",
                                "schema": {
                                    "type": "array",
                                    "items": {"type": "string", "enum": ["author_id", "attachments.media_keys"]}
                                }
                            }
                        ],
                        "responses": {"200": {"content": {"application/json": {"schema": {}}}}},
                    },
                    "post": {
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {
                                "type": "object",
                                "required": ["text"],
                                "properties": {"text": {"type": "string", "maxLength": 280}}
                            }}}
                        },
                        "responses": {"201": {"content": {"application/json": {"schema": {}}}}},
                    }
                },
                "/2/tweets/search/recent": {
                    "get": {
                        "parameters": [
                            {"name": "query", "in": "query", "required": true, "schema": {"type": "string", "minLength": 1, "maxLength": 512}},
                            {"name": "max_results", "in": "query", "schema": {"type": "integer", "minimum": 10, "maximum": 100, "default": 10}},
                            {"name": "start_time", "in": "query", "schema": {"type": "string", "format": "date-time"}}
                        ],
                        "responses": {"200": {"content": {"application/json": {"schema": {}}}}},
                    }
                },
            }
        });
        ApiSpec::from_document(&doc).unwrap()
    }

    fn check(method: &str, path_and_query: &str, body: Option<Value>) -> Result<()> {
        let spec = spec();
        let store = Store::seeded();
        let mut parts = path_and_query.splitn(2, '?');
        let path = parts.next().unwrap();
        let query = QueryParams::parse(parts.next());
        let resolved = spec.resolve_operation(method, path).unwrap();
        validate(&spec, &store, &resolved, &query, body.as_ref())
    }

    fn batch_of(result: Result<()>) -> ValidationErrors {
        match result {
            Err(Error::Validation(batch)) => batch,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn invalid_ids_group_under_the_singular_key() {
        let batch = batch_of(check("GET", "/2/tweets?ids=abc,123,xyz", None));
        assert_eq!(batch.errors.len(), 1);
        let error = &batch.errors[0];
        assert_eq!(error.parameters["id"], json!(["abc", "xyz"]));
        assert!(error
            .message
            .starts_with("The `id` query parameter value [abc]"));
    }

    #[test]
    fn missing_required_parameter_message() {
        let batch = batch_of(check("GET", "/2/tweets", None));
        assert_eq!(
            batch.errors[0].message,
            "The `ids` query parameter can not be empty"
        );
        assert_eq!(batch.errors[0].parameters["ids"], json!([]));
    }

    #[test]
    fn unknown_parameters_fail_but_fields_are_tolerated() {
        let batch = batch_of(check(
            "GET",
            "/2/tweets?ids=123&frobnicate=1&user.fields=name",
            None,
        ));
        assert_eq!(batch.errors.len(), 1);
        assert!(batch.errors[0].message.contains("frobnicate"));
    }

    #[test]
    fn integer_bounds_report_the_range() {
        let batch = batch_of(check(
            "GET",
            "/2/tweets/search/recent?query=x&max_results=500",
            None,
        ));
        assert_eq!(
            batch.errors[0].message,
            "The `max_results` query parameter value [500] is not between 10 and 100"
        );
    }

    #[test]
    fn date_time_format_is_checked() {
        let batch = batch_of(check(
            "GET",
            "/2/tweets/search/recent?query=x&start_time=yesterday",
            None,
        ));
        assert!(batch.errors[0].message.contains("start_time"));

        assert!(check(
            "GET",
            "/2/tweets/search/recent?query=x&start_time=2023-06-01T00:00:00Z",
            None
        )
        .is_ok());
    }

    #[test]
    fn field_and_expansion_enums_list_the_valid_values() {
        let batch = batch_of(check(
            "GET",
            "/2/tweets?ids=123&tweet.fields=created_at,nonsense",
            None,
        ));
        assert_eq!(
            batch.errors[0].message,
            "The `tweet.fields` query parameter value [nonsense] is not one of [author_id,created_at,lang]"
        );

        let batch = batch_of(check(
            "GET",
            "/2/tweets?ids=123&expansions=geo.place_id",
            None,
        ));
        assert!(batch.errors[0]
            .message
            .contains("is not one of [author_id,attachments.media_keys]"));
    }

    #[test]
    fn body_stage_runs_for_posts() {
        let batch = batch_of(check("POST", "/2/tweets", Some(json!({}))));
        assert_eq!(batch.errors[0].message, "The `text` field is required");

        let batch = batch_of(check("POST", "/2/tweets", None));
        assert_eq!(batch.errors[0].message, "The request body can not be empty");
    }

    #[test]
    fn exclusive_attachment_rule() {
        let batch = batch_of(check(
            "POST",
            "/2/tweets",
            Some(json!({
                "text": "hi",
                "quote_tweet_id": "123",
                "card_uri": "card://x",
            })),
        ));
        assert!(batch.errors[0].message.contains("can only contain one of"));
    }

    #[test]
    fn referenced_entities_must_exist() {
        let batch = batch_of(check(
            "POST",
            "/2/tweets",
            Some(json!({"text": "hi", "quote_tweet_id": "42424242"})),
        ));
        assert!(batch.errors[0]
            .message
            .contains("The `quote_tweet_id` value [42424242] does not exist"));
    }

    #[test]
    fn valid_requests_pass() {
        assert!(check("GET", "/2/tweets?ids=123,456", None).is_ok());
        assert!(check(
            "GET",
            "/2/tweets?ids=123&tweet.fields=lang&expansions=author_id",
            None
        )
        .is_ok());
        assert!(check("POST", "/2/tweets", Some(json!({"text": "hi"}))).is_ok());
    }
}
