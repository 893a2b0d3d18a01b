//! Flattening of arbitrarily nested JSON documents into named numeric leaves.
//!
//! The walker visits every value below the document root and emits one
//! [`Leaf`] per number or boolean. Objects and arrays extend the key-path,
//! strings that carry a JSON object of their own are decoded and walked in
//! place. Everything else is skipped.
//!
//! Object keys are visited in lexicographic order. When two key-paths
//! normalize to the same metric name, the one visited last wins, which makes
//! collisions deterministic across runs.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{trace, warn};

use crate::normalize::{join_segment, metric_name};

/// Default nesting limit for documents (containers below the root).
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// A single flattened value, ready to be stored as a gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub name: String,
    pub value: f64,
}

/// Errors that abort the walk of a whole document.
#[derive(Debug, Error, PartialEq)]
pub enum FlattenError {
    #[error("document is nested deeper than {limit} levels at '{path}'")]
    DepthExceeded { path: String, limit: usize },
}

/// The kind of a decoded JSON value, as far as flattening is concerned.
#[derive(Debug)]
pub enum JsonKind<'a> {
    Number(f64),
    Bool(bool),
    /// A string that looks like it carries an encoded JSON object.
    Embedded(&'a str),
    Text(&'a str),
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
    Null,
    /// A number `as_f64` declines. Every integer and float converts with
    /// serde_json's default features, so this only shows up when a build
    /// enables `arbitrary_precision`.
    Unsupported(&'a Value),
}

impl<'a> JsonKind<'a> {
    /// Classifies a value.
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(v) => JsonKind::Number(v),
                None => JsonKind::Unsupported(value),
            },
            Value::Bool(b) => JsonKind::Bool(*b),
            Value::String(s) if looks_like_embedded_object(s) => JsonKind::Embedded(s),
            Value::String(s) => JsonKind::Text(s),
            Value::Object(map) => JsonKind::Object(map),
            Value::Array(items) => JsonKind::Array(items),
            Value::Null => JsonKind::Null,
        }
    }
}

/// Some APIs double-encode nested objects as string fields.
fn looks_like_embedded_object(s: &str) -> bool {
    s.len() > 2 && s.trim_start().starts_with('{')
}

/// Recursive document walker with a nesting ceiling.
#[derive(Debug, Clone, Copy)]
pub struct Flattener {
    max_depth: usize,
}

impl Default for Flattener {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl Flattener {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Flattens a whole document, starting with an empty prefix.
    pub fn flatten_document(&self, root: &Map<String, Value>) -> Result<Vec<Leaf>, FlattenError> {
        let mut leaves = Vec::new();
        self.walk_object("", root, 0, &mut leaves)?;
        Ok(leaves)
    }

    /// Flattens any value below `prefix`.
    pub fn flatten(&self, prefix: &str, value: &Value) -> Result<Vec<Leaf>, FlattenError> {
        let mut leaves = Vec::new();
        self.walk(prefix, value, 0, &mut leaves)?;
        Ok(leaves)
    }

    fn walk(
        &self,
        prefix: &str,
        value: &Value,
        depth: usize,
        out: &mut Vec<Leaf>,
    ) -> Result<(), FlattenError> {
        match JsonKind::of(value) {
            JsonKind::Number(v) => emit(prefix, v, out),
            JsonKind::Bool(b) => emit(prefix, if b { 1.0 } else { 0.0 }, out),
            JsonKind::Embedded(raw) => match serde_json::from_str::<Map<String, Value>>(raw) {
                Ok(nested) => {
                    trace!("Extracting embedded JSON document at '{}'", prefix);
                    self.walk_object(prefix, &nested, depth, out)?;
                }
                Err(e) => {
                    warn!("Failed to parse JSON embedded in string '{}': {}", prefix, e);
                }
            },
            JsonKind::Object(map) => self.walk_object(prefix, map, depth, out)?,
            JsonKind::Array(items) => self.walk_array(prefix, items, depth, out)?,
            JsonKind::Text(_) | JsonKind::Null => {}
            JsonKind::Unsupported(raw) => {
                warn!("Skipping '{}': cannot handle value {}", prefix, raw);
            }
        }
        Ok(())
    }

    fn walk_object(
        &self,
        prefix: &str,
        map: &Map<String, Value>,
        depth: usize,
        out: &mut Vec<Leaf>,
    ) -> Result<(), FlattenError> {
        self.check_depth(prefix, depth)?;

        let mut entries: Vec<(&String, &Value)> = map.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

        for (key, value) in entries {
            self.walk(&join_segment(prefix, key), value, depth + 1, out)?;
        }
        Ok(())
    }

    fn walk_array(
        &self,
        prefix: &str,
        items: &[Value],
        depth: usize,
        out: &mut Vec<Leaf>,
    ) -> Result<(), FlattenError> {
        self.check_depth(prefix, depth)?;

        for (index, value) in items.iter().enumerate() {
            self.walk(&join_segment(prefix, &index.to_string()), value, depth + 1, out)?;
        }
        Ok(())
    }

    fn check_depth(&self, prefix: &str, depth: usize) -> Result<(), FlattenError> {
        if depth > self.max_depth {
            return Err(FlattenError::DepthExceeded {
                path: prefix.to_string(),
                limit: self.max_depth,
            });
        }
        Ok(())
    }
}

fn emit(prefix: &str, value: f64, out: &mut Vec<Leaf>) {
    out.push(Leaf {
        name: metric_name(prefix),
        value,
    });
}
