//! Position strings: `('#' route ('$' data)?)*`.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use shared::domain::DataMode;
use tracing::warn;

use crate::{
    error::NavigationError,
    route_table::{ResolvedRoute, Route, RouteTable, ANONYMOUS_MARKER},
};

/// Characters left as-is by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// One route to append to a position.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub route: String,
    pub data: Option<Value>,
    pub data_mode: Option<DataMode>,
}

impl Segment {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            data: None,
            data_mode: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_mode(mut self, mode: DataMode) -> Self {
        self.data_mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UrlCodec {
    default_mode: DataMode,
}

impl UrlCodec {
    pub fn new(default_mode: DataMode) -> Self {
        Self { default_mode }
    }

    /// Canonical form: empty or starting with `#`, no empty segments
    /// besides the root, no trailing `#`.
    pub fn normalize(raw: &str) -> String {
        let raw = raw.trim();
        let mut out = String::with_capacity(raw.len() + 1);
        if !raw.is_empty() && !raw.starts_with('#') {
            out.push('#');
        }
        for c in raw.chars() {
            if c == '#' && out.ends_with('#') {
                continue;
            }
            out.push(c);
        }
        if out.ends_with('#') {
            out.pop();
        }
        out
    }

    /// Position without its last segment.
    pub fn parent(position: &str) -> String {
        let position = Self::normalize(position);
        match position.rfind('#') {
            Some(idx) => position[..idx].to_string(),
            None => String::new(),
        }
    }

    /// `#route` followed by the data suffix, if any.
    pub fn encode_segment(
        &self,
        route: Option<&Route>,
        name: &str,
        data: Option<&Value>,
        mode: Option<DataMode>,
    ) -> String {
        let mut out = format!("#{name}");
        let (Some(route), Some(data)) = (route, data) else {
            return out;
        };
        if route.is_default_data(data) || data.is_null() {
            return out;
        }
        out.push('$');
        match mode.unwrap_or(self.default_mode) {
            DataMode::Anonymous => out.push_str(&route.anonymous_id(data)),
            DataMode::Bookmarkable => out.push_str(&encode_data(data)),
        }
        out
    }

    /// Appends `segments` to `current`, or replaces it when the first route
    /// is absolute (`/name`). A segment equal to the last one is skipped.
    pub fn encode_destination(&self, table: &RouteTable, current: &str, segments: &[Segment]) -> String {
        let mut path = Self::normalize(current);
        for (idx, segment) in segments.iter().enumerate() {
            let mut name = segment.route.as_str();
            if idx == 0 {
                if let Some(absolute) = name.strip_prefix('/') {
                    path.clear();
                    name = absolute;
                }
            }
            let route = table.find(name);
            let encoded = self.encode_segment(
                route.as_deref(),
                name,
                segment.data.as_ref(),
                segment.data_mode,
            );
            if last_segment(&path) == Some(encoded.as_str()) {
                continue;
            }
            path.push_str(&encoded);
        }
        Self::normalize(&path)
    }

    pub fn decode(&self, position: &str, table: &RouteTable) -> Result<Vec<ResolvedRoute>, NavigationError> {
        let position = Self::normalize(position);
        let mut routes = Vec::new();

        for (source_index, chunk) in chunks(&position) {
            let Some((route, suffix)) = table.resolve(chunk) else {
                continue;
            };
            let data = match suffix {
                None => route.fallback_data(),
                Some(id) if id.starts_with(ANONYMOUS_MARKER) => {
                    route.anonymous_data(id).ok_or_else(|| NavigationError::AnonymousDataExpired {
                        route: route.pattern().to_string(),
                        id: id.to_string(),
                    })?
                }
                Some(raw) => decode_data(raw),
            };
            routes.push(ResolvedRoute {
                route,
                data,
                source_index,
            });
        }
        Ok(routes)
    }

    /// Re-encodes the segment of `name` with `data`, leaving the others
    /// untouched.
    pub fn rewrite_route_data(
        &self,
        position: &str,
        table: &RouteTable,
        name: &str,
        data: &Value,
    ) -> Result<String, NavigationError> {
        let position = Self::normalize(position);
        let mut found = false;
        let rewritten: Vec<String> = chunks(&position)
            .map(|(_, chunk)| match table.resolve(chunk) {
                Some((route, _)) if route.pattern() == name => {
                    found = true;
                    let encoded = self.encode_segment(Some(&route), name, Some(data), None);
                    encoded[1..].to_string()
                }
                _ => chunk.to_string(),
            })
            .collect();

        if !found {
            return Err(NavigationError::RouteNotInPosition(name.to_string()));
        }
        Ok(Self::normalize(&format!("#{}", rewritten.join("#"))))
    }
}

/// Chunks of a normalized position with their index. The empty root chunk
/// is left out when the next chunk is itself a default route segment
/// (`#$data`).
fn chunks(position: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut parts = position.split('#').enumerate();
    if position.starts_with("#$") {
        parts.next();
    }
    parts
}

fn last_segment(path: &str) -> Option<&str> {
    path.rfind('#').map(|idx| &path[idx..])
}

fn encode_data(data: &Value) -> String {
    let text = match data {
        Value::String(raw) if !needs_quoting(raw) => raw.clone(),
        other => other.to_string(),
    };
    utf8_percent_encode(&text, COMPONENT).to_string()
}

const STRUCTURED: [char; 3] = ['"', '[', '{'];

/// Strings that would read back as something else are JSON-quoted.
fn needs_quoting(raw: &str) -> bool {
    raw.starts_with(STRUCTURED) || parse_scalar(raw).is_some()
}

fn decode_data(raw: &str) -> Value {
    let text = percent_decode_str(raw).decode_utf8_lossy();
    parse_text(&text)
}

fn parse_text(text: &str) -> Value {
    if text.starts_with(STRUCTURED) {
        return serde_json::from_str(text).unwrap_or_else(|err| {
            warn!(error = %err, data = text, "nav: route data looks like JSON but does not parse, keeping it as text");
            Value::String(text.to_string())
        });
    }
    parse_scalar(text).unwrap_or_else(|| Value::String(text.to_string()))
}

fn parse_scalar(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(scalar @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => Some(scalar),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/url_codec_tests.rs"]
mod tests;
