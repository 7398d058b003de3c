//! Get/set over positionally keyed JSON documents.
//!
//! Numeric path segments address array indices and numeric object keys
//! alike, since these documents mix `{"1": ..}` objects and arrays freely.
//! String-encoded sub-documents are leaves here: decoding one is an explicit
//! [`decode_embedded`] call and writing it back an explicit
//! [`encode_embedded`] call.

use std::fmt;

use core_types::PathError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    Key(String),
    Index(usize),
}

impl PathKey {
    fn parse(segment: &str) -> Self {
        match segment.parse::<usize>() {
            Ok(idx) => Self::Index(idx),
            Err(_) => Self::Key(segment.to_string()),
        }
    }

    fn object_key(&self) -> String {
        match self {
            Self::Key(k) => k.clone(),
            Self::Index(i) => i.to_string(),
        }
    }

    fn array_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Key(k) => k.parse().ok(),
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => f.write_str(k),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DocPath(Vec<PathKey>);

impl DocPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parses `"1.1.2.0.2"`. The empty string is the root.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::root();
        }
        Self(raw.split('.').map(PathKey::parse).collect())
    }

    pub fn keys(&self) -> &[PathKey] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join(&self, other: &DocPath) -> DocPath {
        let mut keys = self.0.clone();
        keys.extend(other.0.iter().cloned());
        DocPath(keys)
    }

    pub fn child(&self, key: PathKey) -> DocPath {
        let mut keys = self.0.clone();
        keys.push(key);
        DocPath(keys)
    }
}

impl From<&str> for DocPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

impl Serialize for DocPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DocPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Segment {
            Index(usize),
            Key(String),
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Dotted(String),
            List(Vec<Segment>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Dotted(s) => DocPath::parse(&s),
            Raw::List(items) => DocPath(
                items
                    .into_iter()
                    .map(|seg| match seg {
                        Segment::Index(i) => PathKey::Index(i),
                        Segment::Key(k) => PathKey::Key(k),
                    })
                    .collect(),
            ),
        })
    }
}

fn step<'a>(node: &'a Value, key: &PathKey) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(&key.object_key()),
        Value::Array(items) => items.get(key.array_index()?),
        _ => None,
    }
}

fn step_mut<'a>(node: &'a mut Value, key: &PathKey, depth: usize) -> Result<&'a mut Value, PathError> {
    match node {
        Value::Object(map) => {
            let k = key.object_key();
            map.get_mut(&k)
                .ok_or(PathError::MissingIntermediate { key: k, depth })
        }
        Value::Array(items) => {
            let len = items.len();
            let idx = key.array_index().ok_or_else(|| PathError::MissingIntermediate {
                key: key.to_string(),
                depth,
            })?;
            items
                .get_mut(idx)
                .ok_or(PathError::IndexOutOfBounds { index: idx, len, depth })
        }
        _ => Err(PathError::NotAContainer { depth }),
    }
}

/// Walks `path`; any missing key, out-of-range index or scalar along the way
/// yields `None`.
pub fn get<'a>(doc: &'a Value, path: &DocPath) -> Option<&'a Value> {
    path.0.iter().try_fold(doc, step)
}

pub fn get_mut<'a>(doc: &'a mut Value, path: &DocPath) -> Option<&'a mut Value> {
    let mut node = doc;
    for (depth, key) in path.0.iter().enumerate() {
        node = step_mut(node, key, depth).ok()?;
    }
    Some(node)
}

/// Writes `value` at `path`. Every intermediate node must already exist. The
/// final key may be new on an object; on an array it must be in range.
pub fn set(doc: &mut Value, path: &DocPath, value: Value) -> Result<(), PathError> {
    let Some((last, parents)) = path.0.split_last() else {
        return Err(PathError::Empty);
    };
    let mut node = doc;
    for (depth, key) in parents.iter().enumerate() {
        node = step_mut(node, key, depth)?;
    }
    let depth = parents.len();
    match node {
        Value::Object(map) => {
            map.insert(last.object_key(), value);
            Ok(())
        }
        Value::Array(items) => {
            let len = items.len();
            let idx = last.array_index().ok_or_else(|| PathError::MissingIntermediate {
                key: last.to_string(),
                depth,
            })?;
            let slot = items
                .get_mut(idx)
                .ok_or(PathError::IndexOutOfBounds { index: idx, len, depth })?;
            *slot = value;
            Ok(())
        }
        _ => Err(PathError::NotAContainer { depth }),
    }
}

/// Parses the string at `path` as a JSON document.
pub fn decode_embedded(doc: &Value, path: &DocPath) -> Option<Value> {
    let raw = get(doc, path)?.as_str()?;
    serde_json::from_str(raw).ok()
}

/// Serializes `sub` back into the string slot at `path`.
pub fn encode_embedded(doc: &mut Value, path: &DocPath, sub: &Value) -> Result<(), PathError> {
    set(doc, path, Value::String(sub.to_string()))
}
