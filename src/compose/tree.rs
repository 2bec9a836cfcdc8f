//! Typed view of a composition context
//!
//! A context is decoded once into [`ContextNode`]s so that discovery works on
//! tagged variants instead of inspecting raw JSON at every step.

use std::fmt;

use serde_json::{Map, Value as JsonValue};

use crate::{
    config::Compose,
    core::{ActError, ActResult, Pattern},
};

/// One step of a location inside the context tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    fn key(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

/// Absolute location of a value inside the context tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location(Vec<Segment>);

impl Location {
    pub fn root() -> Self {
        Self::default()
    }

    fn child(&self, segment: Segment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// Extend this location by a dot-delimited path such as `user.name`
    fn join_path(&self, path: &str) -> ActResult<Self> {
        let mut segments = self.0.clone();
        for part in path.split('.') {
            if part.is_empty() {
                return Err(ActError::Parse(format!("Invalid resolve path '{path}'")));
            }
            segments.push(Segment::Key(part.to_string()));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Write `value` at this location, creating intermediate objects as needed.
    ///
    /// Arrays found on the way are indexed by numeric segments and padded with
    /// nulls when too short. Any other non-object is replaced by an object.
    pub fn assign(&self, root: &mut JsonValue, value: JsonValue) {
        assign_at(root, &self.0, value);
    }
}

fn assign_at(node: &mut JsonValue, path: &[Segment], value: JsonValue) {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return;
    };

    // Numeric parts of a dot-path address elements of an existing array.
    if let JsonValue::Array(items) = node {
        let index = match head {
            Segment::Index(i) => Some(*i),
            Segment::Key(key) => key.parse::<usize>().ok(),
        };
        if let Some(i) = index {
            if i >= items.len() {
                items.resize(i + 1, JsonValue::Null);
            }
            return assign_at(&mut items[i], rest, value);
        }
    }

    if !node.is_object() {
        *node = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(map) = node {
        let child = map.entry(head.key()).or_insert(JsonValue::Null);
        assign_at(child, rest, value);
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                // Keys that would read as several segments are quoted
                Segment::Key(key) if key.contains('.') || key.contains('[') => {
                    write!(f, "[{}]", JsonValue::from(key.as_str()))?
                }
                _ if i == 0 => write!(f, "{}", segment.key())?,
                _ => write!(f, ".{}", segment.key())?,
            }
        }
        Ok(())
    }
}

/// A pattern waiting to be resolved, and where its result goes
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionTask {
    pub location: Location,
    pub pattern: Pattern,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextNode {
    /// Rendered as is
    Leaf(JsonValue),
    /// Inline marker: replaced in place by the result of its pattern
    Marker(Pattern),
    /// Resolve map: results are written at paths relative to the parent object
    ResolveMap(Vec<(String, Pattern)>),
    Subtree(Vec<(String, ContextNode)>),
    List(Vec<ContextNode>),
}

impl ContextNode {
    /// Decode a context, validating every pattern it embeds.
    pub fn decode(value: &JsonValue, settings: &Compose) -> ActResult<Self> {
        match value {
            JsonValue::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, child) in map {
                    let node = if *key == settings.resolve_key {
                        Self::decode_resolve_map(key, child)?
                    } else if key.ends_with(settings.marker_suffix.as_str()) {
                        let pattern = Pattern::from_value(child).map_err(|e| {
                            ActError::Parse(format!("Invalid action marker '{key}': {e}"))
                        })?;
                        ContextNode::Marker(pattern)
                    } else {
                        Self::decode(child, settings)?
                    };
                    entries.push((key.clone(), node));
                }
                Ok(ContextNode::Subtree(entries))
            }
            JsonValue::Array(items) => items
                .iter()
                .map(|item| Self::decode(item, settings))
                .collect::<ActResult<Vec<_>>>()
                .map(ContextNode::List),
            other => Ok(ContextNode::Leaf(other.clone())),
        }
    }

    fn decode_resolve_map(key: &str, value: &JsonValue) -> ActResult<Self> {
        let JsonValue::Object(map) = value else {
            return Err(ActError::Parse(format!("'{key}' must map paths to patterns")));
        };
        map.iter()
            .map(|(path, pattern)| {
                Pattern::from_value(pattern)
                    .map(|pattern| (path.clone(), pattern))
                    .map_err(|e| ActError::Parse(format!("Invalid pattern for '{path}': {e}")))
            })
            .collect::<ActResult<Vec<_>>>()
            .map(ContextNode::ResolveMap)
    }

    /// All embedded patterns in discovery order
    pub fn tasks(&self) -> ActResult<Vec<ResolutionTask>> {
        let mut tasks = Vec::new();
        self.collect(&Location::root(), &mut tasks)?;
        Ok(tasks)
    }

    fn collect(&self, here: &Location, tasks: &mut Vec<ResolutionTask>) -> ActResult<()> {
        match self {
            ContextNode::Leaf(_) => {}
            ContextNode::Marker(pattern) => tasks.push(ResolutionTask {
                location: here.clone(),
                pattern: pattern.clone(),
            }),
            ContextNode::ResolveMap(entries) => {
                // Paths are relative to the object holding the resolve map,
                // which is `here` without its last segment.
                let parent = Location(here.0[..here.0.len().saturating_sub(1)].to_vec());
                for (path, pattern) in entries {
                    tasks.push(ResolutionTask {
                        location: parent.join_path(path)?,
                        pattern: pattern.clone(),
                    });
                }
            }
            ContextNode::Subtree(entries) => {
                for (key, node) in entries {
                    node.collect(&here.child(Segment::Key(key.clone())), tasks)?;
                }
            }
            ContextNode::List(items) => {
                for (i, node) in items.iter().enumerate() {
                    node.collect(&here.child(Segment::Index(i)), tasks)?;
                }
            }
        }
        Ok(())
    }

    /// Rebuild plain JSON, dropping resolve maps. Markers keep their pattern
    /// until their result is assigned.
    pub fn into_value(self) -> JsonValue {
        match self {
            ContextNode::Leaf(value) => value,
            ContextNode::Marker(pattern) => pattern.into_value(),
            ContextNode::ResolveMap(_) => JsonValue::Null,
            ContextNode::Subtree(entries) => JsonValue::Object(
                entries
                    .into_iter()
                    .filter(|(_, node)| !matches!(node, ContextNode::ResolveMap(_)))
                    .map(|(key, node)| (key, node.into_value()))
                    .collect(),
            ),
            ContextNode::List(items) => {
                JsonValue::Array(items.into_iter().map(ContextNode::into_value).collect())
            }
        }
    }
}
