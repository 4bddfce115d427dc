//! Response validation against [`SuccessCriteria`] (§4.3).
//!
//! The JSON path grammar here is deliberately restricted to a leading `$`
//! followed by dot-separated property names — no array indexing, no
//! wildcards. A path that doesn't parse or doesn't resolve simply fails the
//! check it belongs to; it never panics or aborts the run.

use regex::RegexBuilder;

use crate::config::{HeaderCheck, HeaderRule, JsonPathCheck, JsonPathRule, SuccessCriteria};

/// What the HTTP executor hands the validator: the observed outcome of one
/// request, independent of how it was produced.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub elapsed_ms: u64,
}

/// Accumulated verdict: every unmet check is recorded, not just the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub failures: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Evaluate every present field of `criteria` against `ctx`, in the order
/// the fields are declared (§4.3's deterministic rule order).
pub fn evaluate(criteria: &SuccessCriteria, ctx: &ResponseContext) -> ValidationOutcome {
    let mut failures = Vec::new();

    if let Some(codes) = &criteria.accepted_status_codes {
        if !codes.contains(&ctx.status_code) {
            failures.push(format!("status code {} not in accepted set", ctx.status_code));
        }
    }

    if let Some(max_ms) = criteria.max_response_time_ms {
        if ctx.elapsed_ms > max_ms {
            failures.push(format!(
                "response time {}ms exceeded max {}ms",
                ctx.elapsed_ms, max_ms
            ));
        }
    }

    if let Some(pattern) = &criteria.body_regex {
        match RegexBuilder::new(pattern)
            .case_insensitive(true)
            .multi_line(true)
            .build()
        {
            Ok(re) => {
                if !re.is_match(&ctx.body) {
                    failures.push(format!("body did not match regex /{pattern}/"));
                }
            }
            Err(_) => failures.push(format!("invalid body_regex pattern: {pattern}")),
        }
    }

    if let Some(needles) = &criteria.body_must_contain {
        let body_lower = ctx.body.to_lowercase();
        for needle in needles {
            if !body_lower.contains(&needle.to_lowercase()) {
                failures.push(format!("body did not contain required text: {needle}"));
            }
        }
    }

    if let Some(checks) = &criteria.header_checks {
        for check in checks {
            if let Err(reason) = evaluate_header_check(check, &ctx.headers) {
                failures.push(reason);
            }
        }
    }

    if let Some(checks) = &criteria.json_path_checks {
        for check in checks {
            if let Err(reason) = evaluate_json_path_check(check, &ctx.body) {
                failures.push(reason);
            }
        }
    }

    if let Some(min) = criteria.min_body_bytes {
        if (ctx.body.len() as u64) < min {
            failures.push(format!("body size {} below minimum {min}", ctx.body.len()));
        }
    }

    if let Some(max) = criteria.max_body_bytes {
        if (ctx.body.len() as u64) > max {
            failures.push(format!("body size {} above maximum {max}", ctx.body.len()));
        }
    }

    ValidationOutcome { failures }
}

fn evaluate_header_check(check: &HeaderCheck, headers: &[(String, String)]) -> Result<(), String> {
    let found = headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(&check.name));
    match check.rule {
        HeaderRule::Present => {
            if found.is_none() {
                return Err(format!("header {} missing", check.name));
            }
        }
        HeaderRule::Equals => {
            let expected = check.expected.as_deref().unwrap_or("");
            match found {
                Some((_, v)) if v == expected => {}
                _ => return Err(format!("header {} did not equal {expected}", check.name)),
            }
        }
        HeaderRule::Contains => {
            let expected = check.expected.as_deref().unwrap_or("");
            match found {
                Some((_, v)) if v.to_lowercase().contains(&expected.to_lowercase()) => {}
                _ => return Err(format!("header {} did not contain {expected}", check.name)),
            }
        }
        HeaderRule::Regex => {
            let pattern = check.expected.as_deref().unwrap_or("");
            let re = match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => re,
                Err(_) => return Err(format!("invalid header regex pattern: {pattern}")),
            };
            match found {
                Some((_, v)) if re.is_match(v) => {}
                _ => return Err(format!("header {} did not match /{pattern}/", check.name)),
            }
        }
    }
    Ok(())
}

fn evaluate_json_path_check(check: &JsonPathCheck, body: &str) -> Result<(), String> {
    let root: serde_json::Value = serde_json::from_str(body)
        .map_err(|_| format!("body is not valid JSON for path {}", check.path))?;
    let value = navigate(&root, &check.path)
        .ok_or_else(|| format!("json path {} did not resolve", check.path))?;

    match check.rule {
        JsonPathRule::Present => Ok(()),
        JsonPathRule::IsNumber => {
            if value.is_number() {
                Ok(())
            } else {
                Err(format!("json path {} is not a number", check.path))
            }
        }
        JsonPathRule::IsString => {
            if value.is_string() {
                Ok(())
            } else {
                Err(format!("json path {} is not a string", check.path))
            }
        }
        JsonPathRule::Equals => {
            let expected = check.expected.as_deref().unwrap_or("");
            let actual = json_value_to_string(value);
            if actual.to_lowercase() == expected.to_lowercase() {
                Ok(())
            } else {
                Err(format!(
                    "json path {} value {actual} did not equal {expected}",
                    check.path
                ))
            }
        }
        JsonPathRule::Regex => {
            if !value.is_string() {
                return Err(format!(
                    "json path {} is not a string, cannot apply regex",
                    check.path
                ));
            }
            let pattern = check.expected.as_deref().unwrap_or("");
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|_| format!("invalid json_path regex pattern: {pattern}"))?;
            let actual = json_value_to_string(value);
            if re.is_match(&actual) {
                Ok(())
            } else {
                Err(format!("json path {} value did not match /{pattern}/", check.path))
            }
        }
    }
}

/// Dot-separated property navigation from a leading `$`. No array indexing,
/// no wildcards (§4.3, §3 "JSON path grammar").
fn navigate<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let trimmed = path.strip_prefix('$')?;
    let mut current = root;
    for segment in trimmed.split('.') {
        if segment.is_empty() {
            continue;
        }
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn json_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
