//! The post-response micro-DSL (§4.4). Six fixed statement forms, dispatched
//! by regex — this is deliberately not a general interpreter (§9).

use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::variables::VariableStore;

static RE_JSON_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^var\s+(\w+)\s*=\s*JSON\.parse\(responseBody\)\.(\w+)\s*;?$"#).unwrap()
});
static RE_JSON_REQUEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^var\s+(\w+)\s*=\s*JSON\.parse\(pm\.request\.body\.raw\)\s*;?$"#).unwrap()
});
static RE_STRINGIFY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^var\s+(\w+)\s*=\s*JSON\.stringify\((\w+)\)\s*;?$"#).unwrap());
static RE_BTOA: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^var\s+(\w+)\s*=\s*btoa\((\w+)\)\s*;?$"#).unwrap());
static RE_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^var\s+(\w+)\s*=\s*"([^"]*)"\s*;?$"#).unwrap());
static RE_SET_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^pm\.collectionVariables\.set\(\s*"([^"]+)"\s*,\s*(\w+)\s*\)\s*;?$"#).unwrap()
});

/// Mutable context a script statement runs against: the VU-local temp map
/// (iteration-scoped), the VU's persistent [`VariableStore`], and the most
/// recent request/response bodies, read-only.
pub struct ScriptContext<'a> {
    pub temp: std::collections::HashMap<String, String>,
    pub store: &'a mut VariableStore,
    pub response_body: &'a str,
    pub request_body: &'a str,
}

/// Run every statement in `statements` against `ctx`, in order. Blank lines
/// and `//` comments are ignored. A statement that fails to parse or
/// evaluate is logged and skipped — never aborts the iteration (§4.4, §7).
pub fn run(statements: &[String], ctx: &mut ScriptContext) {
    for raw in statements {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if !execute_statement(line, ctx) {
            warn!(statement = line, "script statement skipped: unrecognised or failed");
        }
    }
}

fn execute_statement(line: &str, ctx: &mut ScriptContext) -> bool {
    if let Some(caps) = RE_JSON_BODY.captures(line) {
        let target = &caps[1];
        let field = &caps[2];
        return extract_json_field(ctx.response_body, field)
            .map(|value| {
                ctx.temp.insert(target.to_string(), value);
            })
            .is_some();
    }

    if let Some(caps) = RE_JSON_REQUEST.captures(line) {
        let target = &caps[1];
        ctx.temp.insert(target.to_string(), ctx.request_body.to_string());
        return true;
    }

    if let Some(caps) = RE_STRINGIFY.captures(line) {
        let target = &caps[1];
        let source = &caps[2];
        return match ctx.temp.get(source).cloned() {
            Some(value) => {
                ctx.temp.insert(target.to_string(), value);
                true
            }
            None => false,
        };
    }

    if let Some(caps) = RE_BTOA.captures(line) {
        let target = &caps[1];
        let source = &caps[2];
        return match ctx.temp.get(source).cloned() {
            Some(value) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(value.as_bytes());
                ctx.temp.insert(target.to_string(), encoded);
                true
            }
            None => false,
        };
    }

    if let Some(caps) = RE_LITERAL.captures(line) {
        let target = &caps[1];
        let literal = &caps[2];
        ctx.temp.insert(target.to_string(), literal.to_string());
        return true;
    }

    if let Some(caps) = RE_SET_VAR.captures(line) {
        let name = &caps[1];
        let source = &caps[2];
        return match ctx.temp.get(source).cloned() {
            Some(value) => {
                ctx.store.set(name.to_string(), value);
                true
            }
            None => false,
        };
    }

    false
}

/// Extract `field` from `body` parsed as JSON. Strings are returned raw
/// (unquoted); everything else is returned as its textual JSON form.
fn extract_json_field(body: &str, field: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let found = value.as_object()?.get(field)?;
    Some(match found {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_one(line: &str, response_body: &str, request_body: &str) -> (bool, VariableStore) {
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::new(),
            store: &mut store,
            response_body,
            request_body,
        };
        let ok = execute_statement(line, &mut ctx);
        (ok, store)
    }

    #[test]
    fn json_parse_response_body_extracts_string_field_unquoted() {
        let (ok, _) = run_one(
            r#"var X = JSON.parse(responseBody).F;"#,
            r#"{"F":"hello"}"#,
            "",
        );
        assert!(ok);
    }

    #[test]
    fn json_parse_response_body_extracts_number_field_as_text() {
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::new(),
            store: &mut store,
            response_body: r#"{"F":42}"#,
            request_body: "",
        };
        assert!(execute_statement("var X = JSON.parse(responseBody).F", &mut ctx));
        assert_eq!(ctx.temp.get("X"), Some(&"42".to_string()));
    }

    #[test]
    fn json_parse_response_body_missing_field_fails_cleanly() {
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::new(),
            store: &mut store,
            response_body: r#"{"other":1}"#,
            request_body: "",
        };
        assert!(!execute_statement("var X = JSON.parse(responseBody).F", &mut ctx));
    }

    #[test]
    fn json_parse_request_body_stores_raw_text() {
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::new(),
            store: &mut store,
            response_body: "",
            request_body: r#"{"a":1}"#,
        };
        assert!(execute_statement("var X = JSON.parse(pm.request.body.raw)", &mut ctx));
        assert_eq!(ctx.temp.get("X"), Some(&r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn stringify_copies_existing_temp_value() {
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::from([("Y".to_string(), "value".to_string())]),
            store: &mut store,
            response_body: "",
            request_body: "",
        };
        assert!(execute_statement("var X = JSON.stringify(Y)", &mut ctx));
        assert_eq!(ctx.temp.get("X"), Some(&"value".to_string()));
    }

    #[test]
    fn stringify_missing_source_fails() {
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::new(),
            store: &mut store,
            response_body: "",
            request_body: "",
        };
        assert!(!execute_statement("var X = JSON.stringify(Y)", &mut ctx));
    }

    #[test]
    fn btoa_base64_encodes_temp_value() {
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::from([("Y".to_string(), "hi".to_string())]),
            store: &mut store,
            response_body: "",
            request_body: "",
        };
        assert!(execute_statement("var X = btoa(Y)", &mut ctx));
        assert_eq!(ctx.temp.get("X"), Some(&"aGk=".to_string()));
    }

    #[test]
    fn literal_stores_string_contents() {
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::new(),
            store: &mut store,
            response_body: "",
            request_body: "",
        };
        assert!(execute_statement(r#"var X = "abc""#, &mut ctx));
        assert_eq!(ctx.temp.get("X"), Some(&"abc".to_string()));
    }

    #[test]
    fn set_collection_variable_promotes_temp_to_store() {
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::from([("Y".to_string(), "tok123".to_string())]),
            store: &mut store,
            response_body: "",
            request_body: "",
        };
        assert!(execute_statement(r#"pm.collectionVariables.set("access_token", Y)"#, &mut ctx));
        assert_eq!(ctx.store.get("access_token"), Some("tok123"));
    }

    #[test]
    fn unrecognised_statement_returns_false() {
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::new(),
            store: &mut store,
            response_body: "",
            request_body: "",
        };
        assert!(!execute_statement("this is not a statement", &mut ctx));
    }

    #[test]
    fn run_skips_blank_lines_and_comments() {
        let statements = vec![
            "".to_string(),
            "// a comment".to_string(),
            r#"var X = "value""#.to_string(),
        ];
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::new(),
            store: &mut store,
            response_body: "",
            request_body: "",
        };
        run(&statements, &mut ctx);
        assert_eq!(ctx.temp.get("X"), Some(&"value".to_string()));
    }

    #[test]
    fn run_continues_after_unparseable_statement() {
        let statements = vec![
            "garbage statement".to_string(),
            r#"var X = "value""#.to_string(),
        ];
        let mut store = VariableStore::new();
        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::new(),
            store: &mut store,
            response_body: "",
            request_body: "",
        };
        run(&statements, &mut ctx);
        assert_eq!(ctx.temp.get("X"), Some(&"value".to_string()));
    }

    #[test]
    fn running_same_post_script_twice_is_idempotent() {
        let statements = vec![
            r#"var tok = JSON.parse(responseBody).token"#.to_string(),
            r#"pm.collectionVariables.set("access_token", tok)"#.to_string(),
        ];
        let mut store = VariableStore::new();
        {
            let mut ctx = ScriptContext {
                temp: std::collections::HashMap::new(),
                store: &mut store,
                response_body: r#"{"token":"abc"}"#,
                request_body: "",
            };
            run(&statements, &mut ctx);
        }
        let first = store.get("access_token").map(str::to_string);
        {
            let mut ctx = ScriptContext {
                temp: std::collections::HashMap::new(),
                store: &mut store,
                response_body: r#"{"token":"abc"}"#,
                request_body: "",
            };
            run(&statements, &mut ctx);
        }
        assert_eq!(store.get("access_token").map(str::to_string), first);
    }
}
