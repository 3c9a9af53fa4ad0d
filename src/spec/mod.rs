// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The spec registry: a parsed OpenAPI 3 document that drives routing,
//! validation, authentication requirements, and response synthesis.
//!
//! The registry is built once at startup from an embedded or on-disk
//! document and never mutated. Routing works directly off the `paths`
//! table: exact path match first, then template matching where `{param}`
//! segments each consume one non-empty segment. One quirk is load-bearing
//! enough to call out here: a template match is *rejected* when the request
//! path's last segment contains an underscore and the template's
//! corresponding segment is a parameter. That guard is what keeps
//! `/2/users/personalized_trends` from resolving to `/2/users/{username}`,
//! and it is applied identically at selection time and validation time.

pub mod schema;

pub use self::schema::{CompositeKind, Scalar, ScalarType, Schema};

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};

/// Where a parameter lives on the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamIn {
    Path,
    Query,
    Header,
}

/// One declared parameter, either inline or resolved from components.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: String,
    pub location: ParamIn,
    pub required: bool,
    pub schema: Schema,
    /// When the document declared this parameter as a bare `$ref`, the
    /// target is carried here until [`ApiSpec::resolve_parameter`] runs.
    pub reference: Option<String>,
}

/// The JSON request body an operation accepts.
#[derive(Clone, Debug)]
pub struct RequestBody {
    pub required: bool,
    pub schema: Schema,
}

/// One declared response: status code pattern, content type, schema.
#[derive(Clone, Debug)]
pub struct ResponseDef {
    pub content_type: Option<String>,
    pub schema: Option<Schema>,
}

/// The authentication scheme families the document can demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemeKind {
    /// App-only bearer token.
    Bearer,
    /// OAuth 1.0a user context.
    OAuth1,
    /// OAuth 2.0 user context.
    OAuth2User,
}

/// One operation (method + path) of the API description.
#[derive(Clone, Debug)]
pub struct Operation {
    pub operation_id: Option<String>,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    pub responses: Vec<(String, ResponseDef)>,
    /// Accepted scheme names, flattened across the security alternatives.
    /// `None` means the operation declared no security at all.
    pub security: Option<Vec<String>>,
}

impl Operation {
    /// The success response (the lowest 2xx code declared).
    pub fn success_response(&self) -> Option<&ResponseDef> {
        self.responses
            .iter()
            .filter(|(code, _)| code.starts_with('2'))
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, def)| def)
    }
}

/// All operations registered under one path pattern.
#[derive(Clone, Debug, Default)]
pub struct PathItem {
    pub parameters: Vec<Parameter>,
    pub operations: Vec<(String, Operation)>,
}

impl PathItem {
    pub fn operation(&self, method: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|(m, _)| m.eq_ignore_ascii_case(method))
            .map(|(_, op)| op)
    }
}

/// A successful path match: the pattern that won and the values bound to
/// its `{param}` segments, in declaration order.
#[derive(Clone, Debug)]
pub struct PathMatch<'a> {
    pub pattern: &'a str,
    pub item: &'a PathItem,
    pub params: Vec<(String, String)>,
}

/// The per-request view of one operation, built once by the dispatcher and
/// handed to the validator, the auth classifier, and the handlers.
#[derive(Clone, Debug)]
pub struct ResolvedOperation<'a> {
    pub pattern: &'a str,
    pub method: String,
    pub item: &'a PathItem,
    pub operation: &'a Operation,
    pub path_params: Vec<(String, String)>,
}

impl<'a> ResolvedOperation<'a> {
    /// Looks up a bound path parameter by name.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// The parsed API description.
#[derive(Debug, Default)]
pub struct ApiSpec {
    paths: Vec<(String, PathItem)>,
    parameters: HashMap<String, Parameter>,
    schemas: HashMap<String, Schema>,
    /// Scheme name -> kind, from `components.securitySchemes`.
    security_schemes: HashMap<String, SchemeKind>,
}

impl ApiSpec {
    /// Parses an OpenAPI 3 document from its JSON source.
    pub fn from_json(source: &str) -> Result<ApiSpec> {
        let doc: Value = serde_json::from_str(source)?;
        Self::from_document(&doc)
    }

    /// Parses an already-loaded document.
    pub fn from_document(doc: &Value) -> Result<ApiSpec> {
        let mut spec = ApiSpec::default();

        if let Some(components) = doc.get("components") {
            if let Some(params) = components.get("parameters").and_then(|p| p.as_object()) {
                for (name, value) in params {
                    spec.parameters
                        .insert(name.clone(), parse_parameter(value));
                }
            }
            if let Some(schemas) = components.get("schemas").and_then(|s| s.as_object()) {
                for (name, value) in schemas {
                    spec.schemas.insert(name.clone(), Schema::from_value(value));
                }
            }
            if let Some(schemes) = components
                .get("securitySchemes")
                .and_then(|s| s.as_object())
            {
                for (name, value) in schemes {
                    spec.security_schemes
                        .insert(name.clone(), parse_security_scheme(value));
                }
            }
        }

        let paths = doc
            .get("paths")
            .and_then(|p| p.as_object())
            .ok_or_else(|| Error::Internal("API description has no paths table".to_string()))?;
        for (pattern, item) in paths {
            spec.paths
                .push((pattern.clone(), parse_path_item(item)));
        }

        Ok(spec)
    }

    /// Number of registered path patterns.
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Iterates all `(pattern, item)` pairs, for diagnostics.
    pub fn paths(&self) -> impl Iterator<Item = (&str, &PathItem)> {
        self.paths.iter().map(|(p, i)| (p.as_str(), i))
    }

    /// Finds the path item serving the given concrete request path.
    ///
    /// Exact matches win. Otherwise each template is tried in declaration
    /// order, with the underscore guard applied to the final segment.
    pub fn match_path<'a>(&'a self, path: &str) -> Option<PathMatch<'a>> {
        let path = normalize(path);

        if let Some((pattern, item)) = self.paths.iter().find(|(p, _)| p.as_str() == path) {
            return Some(PathMatch {
                pattern,
                item,
                params: Vec::new(),
            });
        }

        for (pattern, item) in &self.paths {
            if let Some(params) = match_template(pattern, &path) {
                return Some(PathMatch {
                    pattern,
                    item,
                    params,
                });
            }
        }
        None
    }

    /// Resolves `(method, path)` to the operation serving it.
    pub fn resolve_operation<'a>(
        &'a self,
        method: &str,
        path: &str,
    ) -> Result<ResolvedOperation<'a>> {
        let matched = self
            .match_path(path)
            .ok_or_else(|| Error::RouteNotFound(path.to_string()))?;
        // HEAD is served off the GET operation, like the real frontends.
        let lookup = if method.eq_ignore_ascii_case("HEAD") {
            "GET"
        } else {
            method
        };
        let operation = matched
            .item
            .operation(lookup)
            .ok_or_else(|| Error::RouteNotFound(path.to_string()))?;
        Ok(ResolvedOperation {
            pattern: matched.pattern,
            method: lookup.to_uppercase(),
            item: matched.item,
            operation,
            path_params: matched.params,
        })
    }

    /// Follows `$ref` chains until a concrete schema turns up.
    pub fn resolve_schema<'a>(&'a self, mut schema: &'a Schema) -> &'a Schema {
        // depth cap guards against reference cycles in a hostile document
        for _ in 0..16 {
            match schema {
                Schema::Ref(target) => match self.lookup_schema_ref(target) {
                    Some(next) => schema = next,
                    None => return schema,
                },
                _ => return schema,
            }
        }
        schema
    }

    /// Resolves a `$ref`-only parameter into its components entry.
    pub fn resolve_parameter<'a>(&'a self, parameter: &'a Parameter) -> &'a Parameter {
        if let Some(reference) = &parameter.reference {
            if let Some(name) = reference.strip_prefix("#/components/parameters/") {
                if let Some(resolved) = self.parameters.get(name) {
                    return resolved;
                }
            }
        }
        parameter
    }

    /// Walks composites and refs until a node with an enum turns up.
    pub fn walk_to_enum<'a>(&'a self, schema: &'a Schema) -> Option<&'a [String]> {
        let schema = self.resolve_schema(schema);
        if let Some(members) = schema.enumeration() {
            return Some(members);
        }
        match schema {
            Schema::Composite { branches, .. } => branches
                .iter()
                .find_map(|branch| self.walk_to_enum(branch)),
            Schema::Array { items: Some(items), .. } => self.walk_to_enum(items),
            _ => None,
        }
    }

    /// Walks composites and refs until a property set turns up.
    pub fn walk_to_object<'a>(&'a self, schema: &'a Schema) -> Option<&'a Schema> {
        let schema = self.resolve_schema(schema);
        match schema {
            Schema::Object { .. } => Some(schema),
            Schema::Composite { branches, .. } => branches
                .iter()
                .find_map(|branch| self.walk_to_object(branch)),
            _ => None,
        }
    }

    /// Merges path-level and operation-level parameters; operation-level
    /// entries override path-level ones of the same name.
    pub fn merged_parameters<'a>(
        &'a self,
        item: &'a PathItem,
        operation: &'a Operation,
    ) -> Vec<&'a Parameter> {
        let mut merged: Vec<&Parameter> = Vec::new();
        for parameter in item.parameters.iter().chain(operation.parameters.iter()) {
            let parameter = self.resolve_parameter(parameter);
            if let Some(slot) = merged.iter_mut().find(|p| {
                p.name == parameter.name && p.location == parameter.location
            }) {
                *slot = parameter;
            } else {
                merged.push(parameter);
            }
        }
        merged
    }

    /// The merged query parameters of an operation.
    pub fn query_parameters<'a>(
        &'a self,
        item: &'a PathItem,
        operation: &'a Operation,
    ) -> Vec<&'a Parameter> {
        self.merged_parameters(item, operation)
            .into_iter()
            .filter(|p| p.location == ParamIn::Query)
            .collect()
    }

    /// The merged path parameters of an operation.
    pub fn path_parameters<'a>(
        &'a self,
        item: &'a PathItem,
        operation: &'a Operation,
    ) -> Vec<&'a Parameter> {
        self.merged_parameters(item, operation)
            .into_iter()
            .filter(|p| p.location == ParamIn::Path)
            .collect()
    }

    /// `{minimum, maximum, default}` of the operation's `max_results`
    /// query parameter, when it declares one.
    pub fn max_results_limits(
        &self,
        item: &PathItem,
        operation: &Operation,
    ) -> Option<(i64, i64, i64)> {
        let parameter = self
            .query_parameters(item, operation)
            .into_iter()
            .find(|p| p.name == "max_results")?;
        match self.resolve_schema(&parameter.schema) {
            Schema::Scalar(scalar) => {
                let minimum = scalar.minimum.unwrap_or(1);
                let maximum = scalar.maximum.unwrap_or(100);
                let default = scalar
                    .default
                    .as_ref()
                    .and_then(|d| d.as_i64())
                    .unwrap_or(10);
                Some((minimum, maximum, default))
            }
            _ => None,
        }
    }

    /// The scheme kinds an operation accepts, or `None` when it declares no
    /// security (anything goes, including anonymous).
    pub fn accepted_schemes(&self, operation: &Operation) -> Option<Vec<SchemeKind>> {
        let names = operation.security.as_ref()?;
        Some(
            names
                .iter()
                .filter_map(|name| self.security_schemes.get(name).copied())
                .collect(),
        )
    }

    /// Whether the operation serves a long-lived stream.
    ///
    /// The declared success content type is the single source of truth; the
    /// path-suffix convention is only checked as a debug cross-check.
    pub fn is_streaming(&self, pattern: &str, operation: &Operation) -> bool {
        let streaming = operation
            .success_response()
            .and_then(|def| def.content_type.as_deref())
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .map(|ct| {
                ct == mime::TEXT_EVENT_STREAM || ct.essence_str() == "application/x-ndjson"
            })
            .unwrap_or(false);
        debug_assert_eq!(
            streaming,
            pattern.ends_with("/stream"),
            "content-type and path suffix disagree for {}",
            pattern
        );
        streaming
    }

    fn lookup_schema_ref(&self, target: &str) -> Option<&Schema> {
        target
            .strip_prefix("#/components/schemas/")
            .and_then(|name| self.schemas.get(name))
    }
}

/// Strips the query string and any trailing slash off a request path.
pub fn normalize(path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Matches a concrete path against a `{param}` template, binding parameter
/// values in order. Returns `None` when the shapes disagree or the
/// underscore guard fires on the final segment.
fn match_template(pattern: &str, path: &str) -> Option<Vec<(String, String)>> {
    let pattern_segs: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if pattern_segs.len() != path_segs.len() || pattern_segs.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    let last = pattern_segs.len() - 1;
    for (i, (pat, seg)) in pattern_segs.iter().zip(path_segs.iter()).enumerate() {
        if let Some(name) = template_param(pat) {
            // Literal endpoints like /2/users/personalized_trends would
            // otherwise be swallowed by /2/users/{username}.
            if i == last && seg.contains('_') {
                return None;
            }
            if seg.is_empty() {
                return None;
            }
            params.push((name.to_string(), (*seg).to_string()));
        } else if pat != seg {
            return None;
        }
    }
    Some(params)
}

/// The parameter name inside a `{param}` segment, if the segment is one.
pub fn template_param(segment: &str) -> Option<&str> {
    segment.strip_prefix('{').and_then(|s| s.strip_suffix('}'))
}

fn parse_parameter(value: &Value) -> Parameter {
    if let Some(reference) = value.get("$ref").and_then(|r| r.as_str()) {
        return Parameter {
            name: String::new(),
            location: ParamIn::Query,
            required: false,
            schema: Schema::Any,
            reference: Some(reference.to_string()),
        };
    }
    let location = match value.get("in").and_then(|i| i.as_str()) {
        Some("path") => ParamIn::Path,
        Some("header") => ParamIn::Header,
        _ => ParamIn::Query,
    };
    Parameter {
        name: value
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string(),
        location,
        required: value
            .get("required")
            .and_then(|r| r.as_bool())
            .unwrap_or(location == ParamIn::Path),
        schema: value
            .get("schema")
            .map(Schema::from_value)
            .unwrap_or(Schema::Any),
        reference: None,
    }
}

fn parse_path_item(value: &Value) -> PathItem {
    let mut item = PathItem::default();
    if let Some(params) = value.get("parameters").and_then(|p| p.as_array()) {
        item.parameters = params.iter().map(parse_parameter).collect();
    }
    for method in &["get", "post", "put", "patch", "delete", "head", "options"] {
        if let Some(op) = value.get(*method) {
            item.operations
                .push((method.to_uppercase(), parse_operation(op)));
        }
    }
    item
}

fn parse_operation(value: &Value) -> Operation {
    let parameters = value
        .get("parameters")
        .and_then(|p| p.as_array())
        .map(|params| params.iter().map(parse_parameter).collect())
        .unwrap_or_default();

    let request_body = value.get("requestBody").and_then(|body| {
        let schema = body
            .get("content")
            .and_then(|c| c.as_object())
            .and_then(|c| c.values().next())
            .and_then(|media| media.get("schema"))
            .map(Schema::from_value)?;
        Some(RequestBody {
            required: body
                .get("required")
                .and_then(|r| r.as_bool())
                .unwrap_or(false),
            schema,
        })
    });

    let responses = value
        .get("responses")
        .and_then(|r| r.as_object())
        .map(|responses| {
            responses
                .iter()
                .map(|(code, def)| {
                    let (content_type, schema) = def
                        .get("content")
                        .and_then(|c| c.as_object())
                        .and_then(|c| c.iter().next())
                        .map(|(ct, media)| {
                            (
                                Some(ct.clone()),
                                media.get("schema").map(Schema::from_value),
                            )
                        })
                        .unwrap_or((None, None));
                    (
                        code.clone(),
                        ResponseDef {
                            content_type,
                            schema,
                        },
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let security = value.get("security").and_then(|s| s.as_array()).map(|alts| {
        let mut names = Vec::new();
        for alternative in alts {
            if let Some(obj) = alternative.as_object() {
                for name in obj.keys() {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        names
    });

    Operation {
        operation_id: value
            .get("operationId")
            .and_then(|id| id.as_str())
            .map(String::from),
        parameters,
        request_body,
        responses,
        security,
    }
}

fn parse_security_scheme(value: &Value) -> SchemeKind {
    let ty = value.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let scheme = value.get("scheme").and_then(|s| s.as_str()).unwrap_or("");
    match (ty, scheme) {
        ("http", s) if s.eq_ignore_ascii_case("bearer") => SchemeKind::Bearer,
        ("oauth2", _) => SchemeKind::OAuth2User,
        _ => SchemeKind::OAuth1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_spec() -> ApiSpec {
        let doc = json!({
            "openapi": "3.0.0",
            "paths": {
                "/2/users/me": {
                    "get": {
                        "operationId": "findMyUser",
                        "security": [{"BearerToken": []}, {"OAuth2UserToken": ["users.read"]}],
                        "responses": {"200": {"content": {"application/json": {"schema": {}}}}},
                    }
                },
                "/2/users/personalized_trends": {
                    "get": {
                        "operationId": "personalizedTrends",
                        "responses": {"200": {"content": {"application/json": {"schema": {}}}}},
                    }
                },
                "/2/users/{username}": {
                    "parameters": [
                        {"name": "username", "in": "path", "schema": {"type": "string", "pattern": "^[A-Za-z0-9_]{1,15}$"}}
                    ],
                    "get": {
                        "operationId": "findUserByUsername",
                        "parameters": [
                            {"$ref": "#/components/parameters/UserFieldsParameter"}
                        ],
                        "responses": {"200": {"content": {"application/json": {"schema": {}}}}},
                    }
                },
                "/2/tweets/search/recent": {
                    "get": {
                        "operationId": "tweetsRecentSearch",
                        "parameters": [
                            {"name": "query", "in": "query", "required": true, "schema": {"type": "string", "minLength": 1, "maxLength": 512}},
                            {"name": "max_results", "in": "query", "schema": {"type": "integer", "minimum": 10, "maximum": 100, "default": 10}}
                        ],
                        "responses": {"200": {"content": {"application/json": {"schema": {}}}}},
                    }
                },
                "/2/tweets/search/stream": {
                    "get": {
                        "operationId": "searchStream",
                        "responses": {"200": {"content": {"text/event-stream": {"schema": {}}}}},
                    }
                },
            },
            "components": {
                "parameters": {
                    "UserFieldsParameter": {
                        "name": "user.fields",
                        "in": "query",
                        "schema": {
                            "type": "array",
                            "items": {"type": "string", "enum": ["created_at", "description", "id", "name", "username"]}
                        }
                    }
                },
                "schemas": {
                    "Indirect": {"$ref": "#/components/schemas/Leaf"},
                    "Leaf": {"type": "string", "enum": ["a", "b"]}
                },
                "securitySchemes": {
                    "BearerToken": {"type": "http", "scheme": "bearer"},
                    "OAuth2UserToken": {"type": "oauth2", "flows": {}},
                    "UserToken": {"type": "http", "scheme": "OAuth"}
                }
            }
        });
        ApiSpec::from_document(&doc).unwrap()
    }

    #[test]
    fn exact_match_beats_template() {
        let spec = sample_spec();
        let matched = spec.match_path("/2/users/me").unwrap();
        assert_eq!(matched.pattern, "/2/users/me");
        assert!(matched.params.is_empty());
    }

    #[test]
    fn underscore_guard_protects_literal_siblings() {
        let spec = sample_spec();
        let matched = spec.match_path("/2/users/personalized_trends").unwrap();
        assert_eq!(matched.pattern, "/2/users/personalized_trends");

        // a plain username still lands on the template
        let matched = spec.match_path("/2/users/TwitterDev").unwrap();
        assert_eq!(matched.pattern, "/2/users/{username}");
        assert_eq!(
            matched.params,
            vec![("username".to_string(), "TwitterDev".to_string())]
        );
    }

    #[test]
    fn head_shares_the_get_operation() {
        let spec = sample_spec();
        let resolved = spec.resolve_operation("HEAD", "/2/users/me").unwrap();
        assert_eq!(resolved.method, "GET");
    }

    #[test]
    fn parameter_refs_resolve_through_components() {
        let spec = sample_spec();
        let resolved = spec.resolve_operation("GET", "/2/users/TwitterDev").unwrap();
        let query = spec.query_parameters(resolved.item, resolved.operation);
        let fields = query.iter().find(|p| p.name == "user.fields").unwrap();
        let members = spec.walk_to_enum(&fields.schema).unwrap();
        assert!(members.contains(&"username".to_string()));
    }

    #[test]
    fn max_results_limits_extracted() {
        let spec = sample_spec();
        let resolved = spec
            .resolve_operation("GET", "/2/tweets/search/recent")
            .unwrap();
        assert_eq!(
            spec.max_results_limits(resolved.item, resolved.operation),
            Some((10, 100, 10))
        );
    }

    #[test]
    fn ref_chains_resolve() {
        let spec = sample_spec();
        let indirect = Schema::Ref("#/components/schemas/Indirect".to_string());
        let resolved = spec.resolve_schema(&indirect);
        assert_eq!(resolved.enumeration().unwrap(), &["a".to_string(), "b".to_string()][..]);
    }

    #[test]
    fn streaming_follows_declared_content_type() {
        let spec = sample_spec();
        let resolved = spec
            .resolve_operation("GET", "/2/tweets/search/stream")
            .unwrap();
        assert!(spec.is_streaming(resolved.pattern, resolved.operation));

        let unary = spec.resolve_operation("GET", "/2/users/me").unwrap();
        assert!(!spec.is_streaming(unary.pattern, unary.operation));
    }

    #[test]
    fn accepted_schemes_map_through_components() {
        let spec = sample_spec();
        let resolved = spec.resolve_operation("GET", "/2/users/me").unwrap();
        let schemes = spec.accepted_schemes(resolved.operation).unwrap();
        assert!(schemes.contains(&SchemeKind::Bearer));
        assert!(schemes.contains(&SchemeKind::OAuth2User));

        let open = spec
            .resolve_operation("GET", "/2/users/personalized_trends")
            .unwrap();
        assert!(spec.accepted_schemes(open.operation).is_none());
    }
}
