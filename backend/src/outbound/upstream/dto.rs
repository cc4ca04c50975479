//! Wire DTOs for upstream JSON:API collection payloads.
//!
//! The upstream serialises ids as strings and relationship `data` as either
//! one identifier object, an identifier array, or null. These shapes are
//! normalised here into the parsed domain envelopes so nothing past the
//! adapter touches wire quirks.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::resource::{
    PageMeta, Reference, ResourceIdentifier, ResourceObject, ResourcePage,
};

#[derive(Debug, Deserialize)]
pub(super) struct PageDto {
    data: Vec<ResourceDto>,
    #[serde(default)]
    included: Vec<ResourceDto>,
    meta: Option<MetaDto>,
}

#[derive(Debug, Deserialize)]
struct ResourceDto {
    id: IdDto,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    relationships: HashMap<String, RelationshipDto>,
}

/// Ids arrive as `"123"` on current payloads and as bare numbers on older
/// ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdDto {
    Number(i64),
    Text(String),
}

impl IdDto {
    fn parse(&self) -> Result<i64, String> {
        match self {
            Self::Number(id) => Ok(*id),
            Self::Text(text) => text
                .parse::<i64>()
                .map_err(|_| format!("non-numeric resource id {text:?}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RelationshipDto {
    #[serde(default)]
    data: Option<RelationshipDataDto>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelationshipDataDto {
    One(IdentifierDto),
    Many(Vec<IdentifierDto>),
}

#[derive(Debug, Deserialize)]
struct IdentifierDto {
    id: IdDto,
    #[serde(rename = "type")]
    resource_type: String,
}

#[derive(Debug, Deserialize)]
struct MetaDto {
    #[serde(alias = "current-page")]
    current_page: Option<u32>,
    #[serde(alias = "total-pages")]
    total_pages: Option<u32>,
}

impl PageDto {
    /// Convert the wire payload into the parsed domain page.
    pub(super) fn into_page(self) -> Result<ResourcePage, String> {
        let meta = self.meta.ok_or("payload is missing pagination meta")?;
        let current_page = meta
            .current_page
            .ok_or("pagination meta is missing current_page")?;
        let total_pages = meta
            .total_pages
            .ok_or("pagination meta is missing total_pages")?;
        Ok(ResourcePage {
            data: convert_resources(self.data)?,
            included: convert_resources(self.included)?,
            meta: PageMeta {
                current_page,
                total_pages,
            },
        })
    }
}

fn convert_resources(resources: Vec<ResourceDto>) -> Result<Vec<ResourceObject>, String> {
    resources.into_iter().map(ResourceDto::into_object).collect()
}

impl ResourceDto {
    fn into_object(self) -> Result<ResourceObject, String> {
        let id = self.id.parse()?;
        let mut relationships = HashMap::with_capacity(self.relationships.len());
        for (name, relationship) in self.relationships {
            relationships.insert(name, relationship.into_reference()?);
        }
        Ok(ResourceObject {
            id,
            resource_type: self.resource_type,
            attributes: self.attributes,
            relationships,
        })
    }
}

impl RelationshipDto {
    fn into_reference(self) -> Result<Reference, String> {
        match self.data {
            None => Ok(Reference::None),
            Some(RelationshipDataDto::One(identifier)) => {
                Ok(Reference::One(identifier.into_identifier()?))
            }
            Some(RelationshipDataDto::Many(identifiers)) => Ok(Reference::Many(
                identifiers
                    .into_iter()
                    .map(IdentifierDto::into_identifier)
                    .collect::<Result<_, _>>()?,
            )),
        }
    }
}

impl IdentifierDto {
    fn into_identifier(self) -> Result<ResourceIdentifier, String> {
        Ok(ResourceIdentifier {
            id: self.id.parse()?,
            resource_type: self.resource_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_string_ids_and_relationship_shapes() {
        let body = r#"{
            "data": [
                {
                    "id": "42",
                    "type": "projects",
                    "attributes": { "name": "Relaunch" },
                    "relationships": {
                        "company": { "data": { "id": "7", "type": "companies" } },
                        "project_manager": { "data": null },
                        "tasks": { "data": [ { "id": "1", "type": "tasks" } ] }
                    }
                }
            ],
            "meta": { "current_page": 2, "total_pages": 5 }
        }"#;

        let page: PageDto = serde_json::from_str(body).expect("payload should deserialize");
        let page = page.into_page().expect("payload should convert");

        assert_eq!(page.meta.current_page, 2);
        assert_eq!(page.meta.total_pages, 5);
        let resource = &page.data[0];
        assert_eq!(resource.id, 42);
        assert_eq!(
            resource.reference("company"),
            &Reference::One(ResourceIdentifier::new("companies", 7))
        );
        assert_eq!(resource.reference("project_manager"), &Reference::None);
        assert!(matches!(resource.reference("tasks"), Reference::Many(_)));
    }

    #[test]
    fn missing_pagination_meta_is_a_conversion_error() {
        let body = r#"{ "data": [] }"#;
        let page: PageDto = serde_json::from_str(body).expect("payload should deserialize");
        let error = page.into_page().expect_err("conversion should fail");
        assert!(error.contains("pagination meta"), "error: {error}");
    }

    #[test]
    fn non_numeric_ids_are_rejected() {
        let body = r#"{
            "data": [ { "id": "abc", "type": "projects" } ],
            "meta": { "current_page": 1, "total_pages": 1 }
        }"#;
        let page: PageDto = serde_json::from_str(body).expect("payload should deserialize");
        let error = page.into_page().expect_err("conversion should fail");
        assert!(error.contains("non-numeric"), "error: {error}");
    }

    #[test]
    fn numeric_ids_on_older_payloads_still_decode() {
        let body = r#"{
            "data": [ { "id": 9, "type": "companies" } ],
            "meta": { "current_page": 1, "total_pages": 1 }
        }"#;
        let page: PageDto = serde_json::from_str(body).expect("payload should deserialize");
        let page = page.into_page().expect("payload should convert");
        assert_eq!(page.data[0].id, 9);
    }
}
