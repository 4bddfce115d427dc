//! Variable store and `{{name}}` substitution (§4.1 / §3 ColumnMapping).
//!
//! Precedence, lowest to highest: collection-level globals, column-map
//! globals, the current CSV row (type-coerced and encoded per its
//! [`ColumnRule`]), then anything the script interpreter extracted during
//! this iteration. Later layers overwrite earlier ones by name.

use std::collections::HashMap;

use base64::Engine as _;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::warn;

use crate::collection::{ColumnMapping, DataRow, DataType, Encoding};

/// Resolved name -> string-value table for one virtual-user iteration.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    values: HashMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Merge `other` over `self`, `other` winning on conflicting keys.
    pub fn merge(&mut self, other: &VariableStore) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// Build the base store for one iteration from collection globals, the
    /// column-mapping's own globals, and a freshly-picked data row. Row
    /// values are coerced/encoded per their [`ColumnRule`]; a row missing a
    /// mapped column simply contributes nothing for that placeholder.
    pub fn from_row(mapping: &ColumnMapping, globals: &[(String, String)], row: &DataRow) -> Self {
        let mut store = Self::new();
        for (name, value) in globals {
            store.set(name.clone(), value.clone());
        }
        for g in &mapping.globals {
            store.set(g.name.clone(), g.value.clone());
        }
        for rule in &mapping.columns {
            if let Some(raw) = row.get(&rule.csv_column) {
                let coerced = coerce_value(raw, rule.data_type);
                let encoded = encode_value(&coerced, rule.encoding);
                store.set(rule.placeholder_name.clone(), encoded);
            }
        }
        store
    }

    /// Replace every `{{name}}` occurrence in `template` with its resolved
    /// value. A placeholder with no match in the store is left verbatim —
    /// §4.1 treats an unresolved placeholder as a pass-through, not an error.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let bytes = template.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                if let Some(end) = template[i + 2..].find("}}") {
                    let name = template[i + 2..i + 2 + end].trim();
                    match self.get(name) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&template[i..i + 2 + end + 2]),
                    }
                    i += 2 + end + 2;
                    continue;
                }
            }
            let ch = template[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }
}

/// Coerce a raw CSV cell to the canonical textual form of its declared
/// [`DataType`], ahead of encoding (§4.1). A cell that doesn't fit its
/// declared type falls back to the raw text with a warning rather than
/// failing the iteration.
fn coerce_value(raw: &str, data_type: DataType) -> String {
    match data_type {
        DataType::String => raw.to_string(),
        DataType::Integer => match raw.trim().parse::<i64>() {
            Ok(n) => n.to_string(),
            Err(_) => {
                warn!(value = raw, "failed to coerce column value to integer");
                raw.to_string()
            }
        },
        DataType::Double => match raw.trim().parse::<f64>() {
            Ok(n) => n.to_string(),
            Err(_) => {
                warn!(value = raw, "failed to coerce column value to double");
                raw.to_string()
            }
        },
        DataType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => "true".to_string(),
            "false" => "false".to_string(),
            _ => {
                warn!(value = raw, "failed to coerce column value to boolean");
                raw.to_string()
            }
        },
        DataType::Datetime => match parse_datetime(raw.trim()) {
            Some(date) => date,
            None => {
                warn!(value = raw, "failed to coerce column value to datetime");
                raw.to_string()
            }
        },
    }
}

/// Parse a handful of common datetime shapes and normalize to `YYYY-MM-DD`.
fn parse_datetime(raw: &str) -> Option<String> {
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    None
}

fn encode_value(raw: &str, encoding: Encoding) -> String {
    match encoding {
        Encoding::None => raw.to_string(),
        Encoding::Base64 => base64::engine::general_purpose::STANDARD.encode(raw.as_bytes()),
        Encoding::Url => utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string(),
    }
}
