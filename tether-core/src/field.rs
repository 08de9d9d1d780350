//! Field access into opaque domain objects.
//!
//! The cache never parses a domain object's native wire format itself.
//! Instead, the layer that owns the format supplies a [`FieldReader`] over
//! each instance, and the cache pulls key and dependency values out through
//! path expressions.
//!
//! Path grammar: `/`-separated segments, `segment[n]` for 1-based list
//! indexing, and a leading `@` on a segment is accepted for attribute-style
//! names (`@RefId` and `RefId` address the same JSON member).

use serde_json::Value;

/// Read access to named fields of one domain object instance.
pub trait FieldReader {
    /// The scalar value at `path`, if the path resolves to one.
    fn value_at(&self, path: &str) -> Option<String>;

    /// Whether `path` resolves to any node at all, scalar or not.
    ///
    /// The default is adequate for readers that only expose scalar leaves;
    /// readers over structured formats should answer for interior nodes too,
    /// since repeated-dependency probing tests for element presence.
    fn contains(&self, path: &str) -> bool {
        self.value_at(path).is_some()
    }
}

/// [`FieldReader`] over a `serde_json::Value` tree.
pub struct JsonReader {
    root: Value,
}

impl JsonReader {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    fn node_at(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let (name, index) = parse_segment(segment)?;
            let name = name.strip_prefix('@').unwrap_or(name);
            current = current.as_object()?.get(name)?;
            if let Some(index) = index {
                current = current.as_array()?.get(index.checked_sub(1)?)?;
            }
        }
        Some(current)
    }
}

impl FieldReader for JsonReader {
    fn value_at(&self, path: &str) -> Option<String> {
        match self.node_at(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn contains(&self, path: &str) -> bool {
        self.node_at(path).is_some()
    }
}

/// Split `name[3]` into `("name", Some(3))`; plain segments have no index.
fn parse_segment(segment: &str) -> Option<(&str, Option<usize>)> {
    match segment.find('[') {
        None => Some((segment, None)),
        Some(open) => {
            let close = segment.find(']')?;
            if close != segment.len() - 1 || close <= open + 1 {
                return None;
            }
            let index: usize = segment[open + 1..close].parse().ok()?;
            Some((&segment[..open], Some(index)))
        }
    }
}
