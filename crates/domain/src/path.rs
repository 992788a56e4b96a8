//! Dotted paths into the state tree and the tree operations behind them.
//!
//! The tree is a JSON object. A path such as `connections.hue.online`
//! names a location by walking object keys. Writes create missing
//! intermediate objects and replace any non-object value found on the way.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::StateError;

/// A validated, non-empty dot-separated path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatePath {
    raw: String,
    segments: Vec<String>,
}

impl StatePath {
    /// Parse a dotted path.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidPath`] if the path is empty or has an
    /// empty segment (`a..b`, `.a`, `a.`).
    pub fn parse(raw: &str) -> Result<Self, StateError> {
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if raw.is_empty() || segments.iter().any(String::is_empty) {
            return Err(StateError::InvalidPath(raw.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The individual keys, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The first segment, i.e. the top-level key of the tree.
    #[must_use]
    pub fn top_level(&self) -> &str {
        &self.segments[0]
    }

    /// Whether the path has more than one segment.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }
}

impl FromStr for StatePath {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Borrow the value at `path`, if every segment resolves to an object key.
#[must_use]
pub fn lookup<'a>(tree: &'a Value, path: &StatePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(tree, |node, key| node.as_object()?.get(key))
}

/// Write `value` at `path`, returning the value it replaced.
///
/// Missing intermediate levels are created; a non-object intermediate is
/// replaced by an empty object.
pub fn assign(tree: &mut Value, path: &StatePath, value: Value) -> Option<Value> {
    let (leaf, parents) = path.segments().split_last()?;
    let mut node = tree;
    for key in parents {
        node = ensure_object(node)?
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node)?.insert(leaf.clone(), value)
}

/// Remove the leaf at `path`, returning it.
pub fn detach(tree: &mut Value, path: &StatePath) -> Option<Value> {
    let (leaf, parents) = path.segments().split_last()?;
    let mut node = tree;
    for key in parents {
        node = node.as_object_mut()?.get_mut(key)?;
    }
    node.as_object_mut()?.remove(leaf)
}

/// Turn `node` into an object unless it already is one.
fn ensure_object(node: &mut Value) -> Option<&mut Map<String, Value>> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut()
}
