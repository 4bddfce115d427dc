//! Resolves a [`RequestTemplate`] plus a [`VariableStore`] into the concrete
//! bytes to send on the wire (§4.2).

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::collection::{KeyValue, Method, RequestBody, RequestTemplate};
use crate::variables::VariableStore;

/// A fully-resolved, ready-to-send request.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub name: String,
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<ResolvedBody>,
}

#[derive(Debug, Clone)]
pub enum ResolvedBody {
    Raw { content_type: &'static str, bytes: Vec<u8> },
    UrlEncoded(Vec<(String, String)>),
    Multipart(Vec<(String, String)>),
}

/// Resolve `template` against `vars` (§4.2). `url_raw` wins over synthesizing
/// from `host_parts`/`path_parts`/`query_params` when it is non-empty.
pub fn build_request(template: &RequestTemplate, vars: &VariableStore) -> ResolvedRequest {
    let url = resolve_url(template, vars);
    let headers = resolve_headers(template, vars);
    let body = if template.method.allows_body() {
        template.body.as_ref().map(|b| resolve_body(b, vars))
    } else {
        None
    };

    ResolvedRequest {
        name: template.name.clone(),
        method: template.method,
        url,
        headers,
        body,
    }
}

fn resolve_url(template: &RequestTemplate, vars: &VariableStore) -> String {
    if !template.url_raw.is_empty() {
        return vars.substitute(&template.url_raw);
    }

    let host = template
        .host_parts
        .iter()
        .map(|p| vars.substitute(p))
        .collect::<Vec<_>>()
        .join(".");
    let path = template
        .path_parts
        .iter()
        .map(|p| vars.substitute(p))
        .collect::<Vec<_>>()
        .join("/");

    let mut url = format!("https://{host}/{path}");

    let enabled_params: Vec<(String, String)> = template
        .query_params
        .iter()
        .filter(|p| !p.disabled)
        .map(|p| (vars.substitute(&p.key), vars.substitute(&p.value)))
        .collect();

    if !enabled_params.is_empty() {
        let query = enabled_params
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k, NON_ALPHANUMERIC),
                    utf8_percent_encode(v, NON_ALPHANUMERIC)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        url.push('?');
        url.push_str(&query);
    }

    url
}

fn resolve_headers(template: &RequestTemplate, vars: &VariableStore) -> Vec<(String, String)> {
    template
        .headers
        .iter()
        .filter(|h| !h.disabled)
        .map(|h: &KeyValue| (vars.substitute(&h.key), vars.substitute(&h.value)))
        .collect()
}

fn resolve_body(body: &RequestBody, vars: &VariableStore) -> ResolvedBody {
    match body {
        RequestBody::Raw(text) => {
            let resolved = vars.substitute(text);
            let content_type = if looks_like_json(&resolved) {
                "application/json"
            } else {
                "text/plain"
            };
            ResolvedBody::Raw {
                content_type,
                bytes: resolved.into_bytes(),
            }
        }
        RequestBody::UrlEncoded(pairs) => ResolvedBody::UrlEncoded(
            pairs
                .iter()
                .filter(|p| !p.disabled)
                .map(|p| (vars.substitute(&p.key), vars.substitute(&p.value)))
                .collect(),
        ),
        RequestBody::Multipart(parts) => ResolvedBody::Multipart(
            parts
                .iter()
                .filter(|p| !p.disabled)
                .map(|p| (vars.substitute(&p.key), vars.substitute(&p.value)))
                .collect(),
        ),
    }
}

/// Content-type sniff for a raw body (§4.2): a leading `{`/`[` that also
/// parses as JSON is treated as JSON, everything else as plain text.
fn looks_like_json(s: &str) -> bool {
    matches!(s.trim_start().chars().next(), Some('{') | Some('['))
        && serde_json::from_str::<serde_json::Value>(s).is_ok()
}
