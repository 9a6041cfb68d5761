//! HTTP response comparator.
//!
//! Status and headers are compared field by field. The body goes to whichever handler
//! is registered for the response's content type, so a JSON body gets a structural
//! diff and a text body a text diff. Unknown content types fall back to byte equality.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{Comparable, CompareError, Json, Kind, ReplacerTable, Replacements, Text};
use crate::store;

/// Builds a comparable out of a response body.
pub type BodyHandler = Arc<dyn Fn(&[u8]) -> Box<dyn Comparable> + Send + Sync>;

pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Clone)]
pub struct HttpResponse {
    status: u16,
    // lower-cased names, sorted values
    headers: BTreeMap<String, Vec<String>>,
    body: Vec<u8>,
    pretty: bool,
    handlers: BTreeMap<String, BodyHandler>,
    header_replacements: Replacements,
    body_replacers: ReplacerTable,
}

#[derive(Deserialize)]
struct DumpedHead {
    #[serde(default)]
    headers: BTreeMap<String, Vec<String>>,
    status: u16,
}

impl HttpResponse {
    pub fn new<I, K, V>(status: u16, headers: I, body: impl Into<Vec<u8>>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut normalized: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers {
            normalized
                .entry(name.as_ref().to_lowercase())
                .or_default()
                .push(value.into());
        }

        HttpResponse {
            status,
            headers: sort_values(normalized),
            body: body.into(),
            pretty: false,
            handlers: default_handlers(false),
            header_replacements: Replacements::new(),
            body_replacers: ReplacerTable::new(),
        }
    }

    /// Colored diffs, and JSON bodies are re-indented when dumped.
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self.handlers.extend(default_handlers(true));
        self
    }

    pub fn register_handler<F>(&mut self, content_type: impl Into<String>, handler: F)
    where
        F: Fn(&[u8]) -> Box<dyn Comparable> + Send + Sync + 'static,
    {
        self.handlers.insert(content_type.into(), Arc::new(handler));
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Media type without parameters, e.g. `application/json` for `application/json; charset=utf-8`.
    pub fn content_type(&self) -> Option<&str> {
        let value = self.headers.get("content-type")?.first()?;
        let media_type = value.split(';').next().unwrap_or_default().trim();
        (!media_type.is_empty()).then_some(media_type)
    }

    fn body_value(&self, handler: &BodyHandler) -> Box<dyn Comparable> {
        let mut value = handler(self.body.as_slice());
        if let Some(replacements) = self.body_replacers.get(&value.kind()) {
            value.replace(replacements);
        }
        value
    }

    fn compare_to_response(&self, peer: &HttpResponse) -> Result<String, CompareError> {
        let mut result = String::new();

        if self.status != peer.status {
            result.push_str(&format!("status: expected {} but got {}\n", self.status, peer.status));
        }

        if self.headers.len() != peer.headers.len() {
            result.push_str(&format!(
                "headers: expected {} headers but got {}\n",
                self.headers.len(),
                peer.headers.len()
            ));
        }
        for (name, expected) in &self.headers {
            match peer.headers.get(name) {
                None => result.push_str(&format!("headers: key {name} is expected but not present\n")),
                // replaced values always match
                Some(_) if self.header_replacements.contains_key(name) => {}
                Some(actual) if actual != expected => result.push_str(&format!(
                    "headers: key {name} has value {} but we expected {}\n",
                    actual.join(", "),
                    expected.join(", ")
                )),
                Some(_) => {}
            }
        }
        for (name, actual) in &peer.headers {
            if !self.headers.contains_key(name) {
                result.push_str(&format!(
                    "headers: key {name} is not expected but present, with value {}\n",
                    actual.join(", ")
                ));
            }
        }

        let handler = match (self.content_type(), peer.content_type()) {
            (Some(expected), Some(actual)) if expected == actual => self.handlers.get(expected),
            _ => None,
        };
        match handler {
            Some(handler) => {
                let expected = self.body_value(handler);
                let actual = peer.body_value(handler);
                let body_diff = expected
                    .compare_to(actual.as_ref())
                    .map_err(|e| CompareError::Body(Box::new(e)))?;
                result.push_str(&body_diff);
            }
            None if self.body != peer.body => {
                result.push_str("body: bodies are different, please inspect them\n");
            }
            None => {}
        }

        Ok(result)
    }

    fn compare_as_text(&self, other: &dyn Comparable) -> Result<String, CompareError> {
        let rendered = self.to_string();
        let expected = if self.pretty {
            Text::pretty(rendered)
        } else {
            Text::new(rendered)
        };
        expected.compare_to(other)
    }

    // handlers and rendering mode carry over to loaded values, replacers do not
    fn loaded_template(&self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: BTreeMap::new(),
            body: Vec::new(),
            pretty: self.pretty,
            handlers: self.handlers.clone(),
            header_replacements: Replacements::new(),
            body_replacers: ReplacerTable::new(),
        }
    }

    fn dumped_body(&self) -> Vec<u8> {
        if !self.pretty || self.content_type() != Some(CONTENT_TYPE_JSON) {
            return self.body.clone();
        }
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(tree) => format!("{tree:#}").into_bytes(),
            Err(_) => self.body.clone(),
        }
    }
}

fn default_handlers(pretty: bool) -> BTreeMap<String, BodyHandler> {
    let text: BodyHandler = if pretty {
        Arc::new(|body: &[u8]| -> Box<dyn Comparable> {
            Box::new(Text::pretty(String::from_utf8_lossy(body)))
        })
    } else {
        Arc::new(|body: &[u8]| -> Box<dyn Comparable> {
            Box::new(Text::new(String::from_utf8_lossy(body)))
        })
    };
    let json: BodyHandler = Arc::new(|body: &[u8]| -> Box<dyn Comparable> { Box::new(Json::new(body)) });

    BTreeMap::from([
        (CONTENT_TYPE_TEXT.to_string(), text),
        (CONTENT_TYPE_JSON.to_string(), json),
    ])
}

fn sort_values(mut headers: BTreeMap<String, Vec<String>>) -> BTreeMap<String, Vec<String>> {
    for values in headers.values_mut() {
        values.sort();
    }
    headers
}

impl fmt::Display for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "STATUS: {}", self.status)?;
        for (name, values) in &self.headers {
            match self.header_replacements.get(name) {
                Some(replacement) => writeln!(f, "{name}: {replacement}")?,
                None => writeln!(f, "{name}: {}", values.join(", "))?,
            }
        }
        writeln!(f)?;
        f.write_str(&String::from_utf8_lossy(&self.body))
    }
}

impl Comparable for HttpResponse {
    fn kind(&self) -> Kind {
        Kind::HTTP_RESPONSE
    }

    fn dump(&self) -> Vec<u8> {
        let headers: BTreeMap<&str, Vec<&str>> = self
            .headers
            .iter()
            .map(|(name, values)| match self.header_replacements.get(name) {
                Some(replacement) => (name.as_str(), vec![replacement.as_str()]),
                None => (name.as_str(), values.iter().map(String::as_str).collect()),
            })
            .collect();
        let head = serde_json::json!({
            "headers": headers,
            "status": self.status,
        });
        let mut dumped = format!("{head:#}").into_bytes();
        dumped.extend_from_slice(store::SEPARATOR);
        dumped.extend_from_slice(&self.dumped_body());
        dumped
    }

    fn load(&self, body: &[u8]) -> Result<Box<dyn Comparable>, CompareError> {
        let load_error = |reason: String| CompareError::Load {
            kind: self.kind(),
            reason,
        };

        if body.is_empty() {
            return Ok(Box::new(HttpResponse {
                status: 0,
                ..self.loaded_template()
            }));
        }

        let (head, payload) = store::split_at_separator(body)
            .ok_or_else(|| load_error("cannot find the separator after the status and headers".into()))?;
        let head: DumpedHead =
            serde_json::from_slice(head).map_err(|e| load_error(format!("decoding status and headers: {e}")))?;

        let headers = head
            .headers
            .into_iter()
            .map(|(name, values)| (name.to_lowercase(), values))
            .collect();

        Ok(Box::new(HttpResponse {
            status: head.status,
            headers: sort_values(headers),
            body: payload.to_vec(),
            ..self.loaded_template()
        }))
    }

    /// Keys are header names; matching headers are rendered with the replacement and skipped when comparing.
    fn replace(&mut self, replacements: &Replacements) {
        self.header_replacements = replacements
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.clone()))
            .collect();
    }

    fn has_subtypes(&self) -> bool {
        true
    }

    fn replace_subtypes(&mut self, table: &ReplacerTable) {
        self.body_replacers = table.clone();
    }

    fn compare_to(&self, other: &dyn Comparable) -> Result<String, CompareError> {
        match other.as_any().downcast_ref::<HttpResponse>() {
            Some(peer) => self.compare_to_response(peer),
            None => self.compare_as_text(other),
        }
    }

    fn extension(&self) -> &'static str {
        "http"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
