//! Structural JSON comparator.
//!
//! Both sides are parsed into trees and walked together. Every path that differs gets
//! one explanation line, so a live value that is merely a superset of the stored one
//! is still reported.

use std::any::Any;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use super::{Comparable, CompareError, Kind, Replacements};

/// What to do when neither side parses as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidPolicy {
    /// Two zero-length inputs are equal, anything else is an error.
    #[default]
    EmptyIsEqual,
    /// Always an error.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json {
    raw: Vec<u8>,
    invalid_policy: InvalidPolicy,
}

impl Json {
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Json {
            raw: raw.into(),
            invalid_policy: InvalidPolicy::default(),
        }
    }

    /// Serializes `value` as indented JSON.
    pub fn from_value<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec_pretty(value).map(Json::new)
    }

    pub fn with_invalid_policy(mut self, policy: InvalidPolicy) -> Self {
        self.invalid_policy = policy;
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn parse(&self) -> Option<Value> {
        serde_json::from_slice(&self.raw).ok()
    }
}

impl fmt::Display for Json {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.raw))
    }
}

impl Comparable for Json {
    fn kind(&self) -> Kind {
        Kind::JSON
    }

    fn dump(&self) -> Vec<u8> {
        self.raw.clone()
    }

    fn load(&self, body: &[u8]) -> Result<Box<dyn Comparable>, CompareError> {
        Ok(Box::new(Json {
            raw: body.to_vec(),
            invalid_policy: self.invalid_policy,
        }))
    }

    /// Keys are dotted field paths (`menu.items.0.id`), each set to its replacement string.
    fn replace(&mut self, replacements: &Replacements) {
        if replacements.is_empty() {
            return;
        }
        let Some(mut tree) = self.parse() else {
            tracing::debug!("json replacers skipped, value does not parse");
            return;
        };

        for (path, replacement) in replacements {
            set_path(&mut tree, path, Value::String(replacement.clone()));
        }

        match serde_json::to_vec_pretty(&tree) {
            Ok(raw) => self.raw = raw,
            Err(e) => tracing::debug!("json replacers skipped, cannot serialize: {e}"),
        }
    }

    fn compare_to(&self, other: &dyn Comparable) -> Result<String, CompareError> {
        let Some(peer) = other.as_any().downcast_ref::<Json>() else {
            return Err(CompareError::CannotCompare {
                source_kind: self.kind(),
                target_kind: other.kind(),
            });
        };

        match (self.parse(), peer.parse()) {
            (Some(expected), Some(actual)) => {
                let mut explanation = Vec::new();
                explain("$", &expected, &actual, &mut explanation);
                Ok(explanation.into_iter().map(|line| line + "\n").collect())
            }
            (None, Some(_)) => Err(CompareError::SourceInvalid { kind: self.kind() }),
            (Some(_), None) => Err(CompareError::TargetInvalid { kind: peer.kind() }),
            (None, None) => {
                let both_empty = self.raw.is_empty() && peer.raw.is_empty();
                if both_empty && self.invalid_policy == InvalidPolicy::EmptyIsEqual {
                    Ok(String::new())
                } else {
                    Err(CompareError::BothInvalid { kind: self.kind() })
                }
            }
        }
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn explain(path: &str, expected: &Value, actual: &Value, out: &mut Vec<String>) {
    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => {
            for (key, expected_value) in expected {
                let child = format!("{path}.{key}");
                match actual.get(key) {
                    Some(actual_value) => explain(&child, expected_value, actual_value, out),
                    None => out.push(format!("{child}: missing, expected {expected_value}")),
                }
            }
            for (key, actual_value) in actual {
                if !expected.contains_key(key) {
                    out.push(format!("{path}.{key}: unexpected {actual_value}"));
                }
            }
        }
        (Value::Array(expected), Value::Array(actual)) => {
            for i in 0..expected.len().max(actual.len()) {
                let child = format!("{path}[{i}]");
                match (expected.get(i), actual.get(i)) {
                    (Some(e), Some(a)) => explain(&child, e, a, out),
                    (Some(e), None) => out.push(format!("{child}: missing, expected {e}")),
                    (None, Some(a)) => out.push(format!("{child}: unexpected {a}")),
                    (None, None) => {}
                }
            }
        }
        _ if expected == actual => {}
        _ => out.push(format!("{path}: expected {expected} but got {actual}")),
    }
}

fn set_path(root: &mut Value, path: &str, replacement: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut node = root;
    for segment in parents {
        node = match child_mut(node, segment) {
            Some(child) => child,
            None => return,
        };
    }

    match node {
        Value::Object(map) => {
            map.insert((*last).to_string(), replacement);
        }
        Value::Array(items) => {
            if let Some(item) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *item = replacement;
            }
        }
        _ => {}
    }
}

// missing objects along the path are created, arrays are never grown
fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => Some(
            map.entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
        ),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}
