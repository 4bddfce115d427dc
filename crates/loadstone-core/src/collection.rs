//! The request-collection data model (§3 RequestTemplate / ColumnMapping / DataRow).
//!
//! Parsing the documents these types are loaded from is out of core scope —
//! see [`crate::loaders`] for the `CollectionLoader`/`RowLoader` seams.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Supported HTTP methods for a [`RequestTemplate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

impl Method {
    /// Methods that §4.2 permits carrying a request body.
    pub fn allows_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

/// One ordered key/value pair that may be individually disabled (query params,
/// headers). Order is preserved because §4.2 emits these in collection order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub disabled: bool,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            disabled: false,
        }
    }
}

/// Request body, per §3: none, raw text, url-encoded pairs, or multipart parts.
///
/// Adjacently tagged (`type` + `value`) rather than internally tagged:
/// serde's internal tagging only works cleanly when a variant's payload is
/// itself map-like, which `String`/`Vec<KeyValue>` are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RequestBody {
    Raw(String),
    UrlEncoded(Vec<KeyValue>),
    Multipart(Vec<KeyValue>),
}

/// A single statement in the tiny fixed script grammar (§4.4). Stored verbatim
/// and parsed lazily by [`crate::script`] — this keeps the collection model
/// agnostic to the grammar's evolution.
pub type ScriptStatement = String;

/// One named request in the collection (§3 RequestTemplate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTemplate {
    /// Unique within the collection.
    pub name: String,
    pub method: Method,
    /// Template string with `{{placeholder}}` tokens, possibly a full URI.
    #[serde(default)]
    pub url_raw: String,
    #[serde(default)]
    pub host_parts: Vec<String>,
    #[serde(default)]
    pub path_parts: Vec<String>,
    #[serde(default)]
    pub query_params: Vec<KeyValue>,
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    #[serde(default)]
    pub body: Option<RequestBody>,
    #[serde(default)]
    pub pre_script: Vec<ScriptStatement>,
    #[serde(default)]
    pub post_script: Vec<ScriptStatement>,
}

impl RequestTemplate {
    pub fn new(name: impl Into<String>, method: Method, url_raw: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            url_raw: url_raw.into(),
            host_parts: Vec::new(),
            path_parts: Vec::new(),
            query_params: Vec::new(),
            headers: Vec::new(),
            body: None,
            pre_script: Vec::new(),
            post_script: Vec::new(),
        }
    }

    /// True if this template textually references `{{access_token}}` or sets
    /// an `Authorization` header — used by the Sequence Manager (§4.6) to
    /// decide whether the auth prelude must run first.
    pub fn needs_auth_token(&self) -> bool {
        self.url_raw.contains("{{access_token}}")
            || self
                .headers
                .iter()
                .any(|h| h.key.eq_ignore_ascii_case("authorization"))
    }
}

/// A named collection of request templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestCollection {
    pub name: String,
    pub requests: Vec<RequestTemplate>,
}

impl RequestCollection {
    pub fn find(&self, name: &str) -> Option<&RequestTemplate> {
        self.requests.iter().find(|r| r.name == name)
    }
}

// ---------------------------------------------------------------------------
// Column mapping (§3 ColumnMapping)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Double,
    Boolean,
    Datetime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    None,
    Base64,
    Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRule {
    pub csv_column: String,
    pub placeholder_name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub encoding: Encoding,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub value: String,
}

/// §3 ColumnMapping: ordered column rules plus collection-level globals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub columns: Vec<ColumnRule>,
    #[serde(default)]
    pub globals: Vec<GlobalVariable>,
}

/// §3 DataRow: one CSV row, keyed by column name.
pub type DataRow = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_display_matches_http_verb() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Post.to_string(), "POST");
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn allows_body_only_for_mutating_verbs() {
        assert!(!Method::Get.allows_body());
        assert!(Method::Post.allows_body());
        assert!(Method::Put.allows_body());
        assert!(Method::Patch.allows_body());
        assert!(!Method::Delete.allows_body());
    }

    #[test]
    fn needs_auth_token_detects_url_placeholder() {
        let req = RequestTemplate::new("Get profile", Method::Get, "{{base_url}}/me?token={{access_token}}");
        assert!(req.needs_auth_token());
    }

    #[test]
    fn needs_auth_token_detects_authorization_header() {
        let mut req = RequestTemplate::new("Get profile", Method::Get, "{{base_url}}/me");
        req.headers.push(KeyValue::new("Authorization", "Bearer {{access_token}}"));
        assert!(req.needs_auth_token());
    }

    #[test]
    fn needs_auth_token_false_when_neither_present() {
        let req = RequestTemplate::new("Ping", Method::Get, "{{base_url}}/ping");
        assert!(!req.needs_auth_token());
    }

    #[test]
    fn collection_find_by_name() {
        let collection = RequestCollection {
            name: "Demo".to_string(),
            requests: vec![RequestTemplate::new("Login", Method::Post, "{{base_url}}/login")],
        };
        assert!(collection.find("Login").is_some());
        assert!(collection.find("Missing").is_none());
    }

    #[test]
    fn encoding_default_is_none() {
        assert_eq!(Encoding::default(), Encoding::None);
    }

    #[test]
    fn request_body_raw_round_trips_through_json() {
        let json = r#"{"type":"raw","value":"{\"a\":1}"}"#;
        let body: RequestBody = serde_json::from_str(json).unwrap();
        match body {
            RequestBody::Raw(text) => assert_eq!(text, r#"{"a":1}"#),
            other => panic!("expected Raw, got {other:?}"),
        }
    }

    #[test]
    fn request_body_url_encoded_round_trips_through_json() {
        let json = r#"{"type":"url_encoded","value":[{"key":"a","value":"1","disabled":false}]}"#;
        let body: RequestBody = serde_json::from_str(json).unwrap();
        match body {
            RequestBody::UrlEncoded(pairs) => assert_eq!(pairs.len(), 1),
            other => panic!("expected UrlEncoded, got {other:?}"),
        }
    }

    #[test]
    fn request_template_full_document_parses() {
        let json = r#"{
            "name": "Create",
            "method": "POST",
            "url_raw": "{{base}}/items",
            "headers": [{"key": "Content-Type", "value": "application/json"}],
            "body": {"type": "raw", "value": "{\"name\":\"{{name}}\"}"}
        }"#;
        let template: RequestTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.method, Method::Post);
        assert!(matches!(template.body, Some(RequestBody::Raw(_))));
    }
}
