//! Flat cache entries and response normalization.
//!
//! A response body is a tree of embedded resources. Before caching, the tree
//! is flattened into an arena keyed by canonical href in which every entry
//! holds only scalars and `{"href": ...}` links to other entries.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::kinds::{KindTable, ResourceKind, Shape};

/// A cached resource: one JSON object whose nested resources are links.
pub type FlatEntry = Map<String, Value>;

pub const HREF: &str = "href";
pub const ITEMS: &str = "items";
pub const CUSTOM_DATA: &str = "customData";

/// Fields that are never written to the cache.
pub const SENSITIVE_FIELDS: &[&str] = &["password"];

/// Path-only identifier of a resource, used as its cache key.
///
/// Scheme, host, query string, fragment and trailing slashes are dropped, so
/// `https://api.example.com/v1/accounts/a1?expand=groups` and `/v1/accounts/a1/`
/// share a key.
pub fn canonical_key(href: &str) -> String {
    let path = match url::Url::parse(href) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => href
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A bare link reference to another resource.
pub fn link(href: &str) -> Value {
    let mut map = Map::new();
    map.insert(HREF.to_string(), Value::String(href.to_string()));
    Value::Object(map)
}

pub fn href_of(map: &Map<String, Value>) -> Option<&str> {
    map.get(HREF).and_then(Value::as_str)
}

/// A body "looks like a resource" when it has an href and at least one other
/// field. A lone href is a link, not a resource.
pub fn is_resource_like(map: &Map<String, Value>) -> bool {
    href_of(map).is_some() && map.len() > 1
}

/// A collection page envelope carries an `items` array.
pub fn is_collection_like(map: &Map<String, Value>) -> bool {
    matches!(map.get(ITEMS), Some(Value::Array(_)))
}

/// Split `.../customData/{key}` into the custom-data href and the property key.
pub fn custom_data_property(href: &str) -> Option<(String, String)> {
    let key = canonical_key(href);
    let (parent, property) = key.rsplit_once('/')?;
    if parent.ends_with(&format!("/{}", CUSTOM_DATA)) && !property.is_empty() {
        Some((parent.to_string(), property.to_string()))
    } else {
        None
    }
}

/// Canonical key of the custom-data entry owned by `parent_href`.
pub fn custom_data_key(parent_href: &str) -> String {
    format!("{}/{}", canonical_key(parent_href), CUSTOM_DATA)
}

/// One normalized resource ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    pub kind: ResourceKind,
    pub key: String,
    pub entry: FlatEntry,
}

/// Normalization failures. Any of these means the response is not cached.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Cannot resolve the resource kind of field '{field}'")]
    UnresolvedKind { field: String },
}

/// Arena of flattened entries produced from one response body.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NormalizedGraph {
    entries: Vec<NormalizedEntry>,
    seen: HashSet<String>,
}

impl NormalizedGraph {
    pub fn entries(&self) -> &[NormalizedEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<NormalizedEntry> {
        self.entries
    }

    pub fn get(&self, key: &str) -> Option<&NormalizedEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Only the first occurrence of an href is kept.
    fn insert(&mut self, entry: NormalizedEntry) {
        if self.seen.insert(entry.key.clone()) {
            self.entries.push(entry);
        }
    }
}

/// Flatten a response body into cacheable entries.
///
/// Works from an explicit worklist, so nesting depth is bounded only by
/// memory. Collection envelopes contribute their items but never an entry of
/// their own.
pub fn normalize(
    shape: Shape,
    body: &Map<String, Value>,
    kinds: &KindTable,
) -> Result<NormalizedGraph, NormalizeError> {
    let mut graph = NormalizedGraph::default();
    let mut work: Vec<(Shape, &Map<String, Value>)> = vec![(shape, body)];

    while let Some((shape, map)) = work.pop() {
        match shape {
            Shape::Collection(element) => {
                if let Some(Value::Array(items)) = map.get(ITEMS) {
                    for item in items {
                        if let Value::Object(item) = item
                            && is_resource_like(item)
                        {
                            work.push((Shape::Instance(element), item));
                        }
                    }
                }
            }
            Shape::Instance(ResourceKind::CustomData) => {
                if let Some(href) = href_of(map) {
                    graph.insert(NormalizedEntry {
                        kind: ResourceKind::CustomData,
                        key: canonical_key(href),
                        entry: strip_sensitive(map.clone()),
                    });
                }
            }
            Shape::Instance(kind) => {
                let Some(href) = href_of(map) else {
                    continue;
                };
                let entry = flatten_instance(map, kinds, &mut work)?;
                graph.insert(NormalizedEntry {
                    kind,
                    key: canonical_key(href),
                    entry,
                });
            }
        }
    }

    Ok(graph)
}

fn flatten_instance<'a>(
    map: &'a Map<String, Value>,
    kinds: &KindTable,
    work: &mut Vec<(Shape, &'a Map<String, Value>)>,
) -> Result<FlatEntry, NormalizeError> {
    let mut flat = FlatEntry::new();

    for (field, value) in map {
        if SENSITIVE_FIELDS.contains(&field.as_str()) {
            continue;
        }

        let flattened = match value {
            Value::Object(nested) if is_resource_like(nested) || is_collection_like(nested) => {
                let href = href_of(nested);
                let shape = kinds.resolve(field, href).ok_or_else(|| {
                    NormalizeError::UnresolvedKind {
                        field: field.clone(),
                    }
                })?;
                work.push((shape, nested));
                match href {
                    Some(href) => link(href),
                    // An anonymous page keeps its paging fields; its items are
                    // cached on their own.
                    None => Value::Object(
                        nested
                            .iter()
                            .filter(|(name, _)| name.as_str() != ITEMS)
                            .map(|(name, value)| (name.clone(), value.clone()))
                            .collect(),
                    ),
                }
            }
            Value::Array(elements) if elements.iter().any(is_embedded_resource) => {
                let mut links = Vec::with_capacity(elements.len());
                for element in elements {
                    match element {
                        Value::Object(nested) if is_resource_like(nested) => {
                            let href = href_of(nested);
                            let kind = kinds
                                .resolve(field, href)
                                .map(Shape::kind)
                                .ok_or_else(|| NormalizeError::UnresolvedKind {
                                    field: field.clone(),
                                })?;
                            work.push((Shape::Instance(kind), nested));
                            links.push(link(href.unwrap_or_default()));
                        }
                        other => links.push(other.clone()),
                    }
                }
                Value::Array(links)
            }
            other => other.clone(),
        };

        flat.insert(field.clone(), flattened);
    }

    Ok(flat)
}

fn is_embedded_resource(value: &Value) -> bool {
    matches!(value, Value::Object(map) if is_resource_like(map))
}

fn strip_sensitive(mut entry: FlatEntry) -> FlatEntry {
    for field in SENSITIVE_FIELDS {
        entry.remove(*field);
    }
    entry
}
