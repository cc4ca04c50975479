//! JSON:API resource envelopes as the sync engine sees them.
//!
//! Transport decoding lives in the outbound upstream adapter; these types are
//! already parsed (numeric ids, structured relationships) so the mapper and
//! orchestrator never touch wire formats.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// A `(type, id)` pointer taken from `relationships.X.data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentifier {
    /// Upstream resource type tag, e.g. `"companies"`.
    pub resource_type: String,
    /// Upstream numeric identifier.
    pub id: i64,
}

impl ResourceIdentifier {
    /// Build an identifier from a type tag and numeric id.
    pub fn new(resource_type: impl Into<String>, id: i64) -> Self {
        Self {
            resource_type: resource_type.into(),
            id,
        }
    }
}

/// Parsed `relationships.X.data` payload.
///
/// A missing or explicit-null reference is represented as [`Reference::None`]
/// and always resolves to a NULL column, never an error.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Reference {
    /// No reference recorded upstream.
    #[default]
    None,
    /// Single related resource.
    One(ResourceIdentifier),
    /// To-many relationship; the row mapper ignores these.
    Many(Vec<ResourceIdentifier>),
}

impl Reference {
    /// Return the single identifier when exactly one is present.
    pub fn as_single(&self) -> Option<&ResourceIdentifier> {
        match self {
            Self::One(identifier) => Some(identifier),
            Self::None | Self::Many(_) => None,
        }
    }
}

/// One JSON:API resource object: `{id, type, attributes, relationships}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceObject {
    /// Upstream numeric identifier; mirrored locally as the primary key.
    pub id: i64,
    /// Upstream resource type tag.
    pub resource_type: String,
    /// Raw attribute map.
    pub attributes: Map<String, Value>,
    /// Parsed relationships keyed by relationship name.
    pub relationships: HashMap<String, Reference>,
}

impl ResourceObject {
    /// Build an empty resource of the given type.
    pub fn new(id: i64, resource_type: impl Into<String>) -> Self {
        Self {
            id,
            resource_type: resource_type.into(),
            attributes: Map::new(),
            relationships: HashMap::new(),
        }
    }

    /// Look up a raw attribute value.
    pub fn attribute(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// Look up a parsed relationship, treating absence as [`Reference::None`].
    pub fn reference(&self, relationship: &str) -> &Reference {
        const ABSENT: &Reference = &Reference::None;
        self.relationships.get(relationship).unwrap_or(ABSENT)
    }
}

/// Pagination cursor metadata returned alongside every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    /// 1-based page number this payload belongs to.
    pub current_page: u32,
    /// Total number of pages for the collection.
    pub total_pages: u32,
}

/// One fetched page: primary `data`, sideloaded `included`, and page meta.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePage {
    /// Primary resource objects for the requested type.
    pub data: Vec<ResourceObject>,
    /// Sideloaded related resources requested via `include`.
    pub included: Vec<ResourceObject>,
    /// Pagination metadata.
    pub meta: PageMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_relationship_reads_as_none() {
        let resource = ResourceObject::new(7, "deals");
        assert_eq!(resource.reference("company"), &Reference::None);
    }

    #[test]
    fn single_reference_exposes_identifier() {
        let mut resource = ResourceObject::new(7, "deals");
        resource.relationships.insert(
            "company".to_owned(),
            Reference::One(ResourceIdentifier::new("companies", 42)),
        );
        let identifier = resource
            .reference("company")
            .as_single()
            .expect("single reference should be present");
        assert_eq!(identifier.id, 42);
        assert_eq!(identifier.resource_type, "companies");
    }

    #[test]
    fn many_reference_is_not_a_single_pointer() {
        let reference = Reference::Many(vec![ResourceIdentifier::new("tasks", 1)]);
        assert!(reference.as_single().is_none());
    }
}
