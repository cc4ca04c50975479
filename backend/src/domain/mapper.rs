//! Flattens JSON:API resource objects into mirror rows.
//!
//! Mapping is pure: one resource plus the relationship-resolution context in,
//! one flat row (or a row-level failure) out. Foreign keys resolve to a known
//! local id or NULL, never an error; self references that cannot resolve yet
//! are handed back as deferred assignments for the same-type second pass.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};

use super::ports::{ColumnValue, MappedColumn, MappedRow, RowFailure};
use super::registry::{Coercion, EntityDescriptor, EntityKind, PolymorphicMapping};
use super::resource::ResourceObject;

/// Lookup of upstream ids known to exist locally, keyed by entity type.
///
/// Seeded from the store at run start and extended with each entity type's
/// successfully upserted ids as the run progresses in dependency order.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    known: HashMap<EntityKind, HashSet<i64>>,
}

impl ResolutionContext {
    /// Empty context; every reference resolves to NULL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `(kind, id)` exists locally.
    pub fn contains(&self, kind: EntityKind, id: i64) -> bool {
        self.known
            .get(&kind)
            .is_some_and(|ids| ids.contains(&id))
    }

    /// Record ids for one entity type.
    pub fn extend(&mut self, kind: EntityKind, ids: impl IntoIterator<Item = i64>) {
        self.known.entry(kind).or_default().extend(ids);
    }
}

/// A self reference that pointed forward within its own entity type and was
/// written as NULL; the second pass assigns it once the target id exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredReference {
    /// Row carrying the unresolved column.
    pub row_id: i64,
    /// Self-referential column to assign.
    pub column: &'static str,
    /// Upstream id the column should point at.
    pub target_id: i64,
}

/// One successfully mapped resource.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedResource {
    /// Flat row in the descriptor's canonical column order.
    pub row: MappedRow,
    /// Self references awaiting the second pass.
    pub deferred: Vec<DeferredReference>,
}

/// Sentinel stored when a version's diff payload is missing, empty, or
/// malformed.
pub fn no_changes_recorded() -> Value {
    json!({ "no_changes_recorded": true })
}

/// Map one resource into a flat row.
///
/// # Errors
///
/// Returns a [`RowFailure`] when a required attribute is absent or any
/// attribute fails coercion; relationship problems never fail a row.
pub fn map_resource(
    descriptor: &EntityDescriptor,
    resource: &ResourceObject,
    context: &ResolutionContext,
) -> Result<MappedResource, RowFailure> {
    let mut columns = Vec::with_capacity(descriptor.columns().len());
    let mut deferred = Vec::new();

    for attribute in descriptor.attributes {
        let raw = resource.attribute(attribute.field);
        if attribute.coercion == Coercion::ObjectChanges {
            columns.push(MappedColumn {
                name: attribute.column,
                value: ColumnValue::Json(coerce_object_changes(raw)),
            });
            continue;
        }
        let value = match raw {
            None | Some(Value::Null) => {
                if attribute.required {
                    return Err(RowFailure {
                        id: resource.id,
                        reason: format!("missing required attribute `{}`", attribute.field),
                    });
                }
                ColumnValue::Null
            }
            Some(raw_value) => {
                coerce_attribute(raw_value, attribute.coercion).map_err(|reason| RowFailure {
                    id: resource.id,
                    reason: format!("attribute `{}`: {reason}", attribute.field),
                })?
            }
        };
        columns.push(MappedColumn {
            name: attribute.column,
            value,
        });
    }

    for reference in descriptor.references {
        let value = match resource.reference(reference.relationship).as_single() {
            Some(identifier) if context.contains(reference.target, identifier.id) => {
                ColumnValue::BigInt(identifier.id)
            }
            Some(identifier) => {
                if reference.self_referential {
                    deferred.push(DeferredReference {
                        row_id: resource.id,
                        column: reference.column,
                        target_id: identifier.id,
                    });
                }
                ColumnValue::Null
            }
            None => ColumnValue::Null,
        };
        columns.push(MappedColumn {
            name: reference.column,
            value,
        });
    }

    for polymorphic in descriptor.polymorphics {
        map_polymorphic(polymorphic, resource, context, &mut columns);
    }

    Ok(MappedResource {
        row: MappedRow {
            id: resource.id,
            columns,
        },
        deferred,
    })
}

/// Resolve a polymorphic reference into its tag column plus exactly one (or
/// zero) populated FK column among the declared targets.
fn map_polymorphic(
    polymorphic: &PolymorphicMapping,
    resource: &ResourceObject,
    context: &ResolutionContext,
    columns: &mut Vec<MappedColumn>,
) {
    let reference = resource.reference(polymorphic.relationship);
    let selected = reference.as_single().and_then(|identifier| {
        polymorphic
            .targets
            .iter()
            .find(|target| target.type_tag == identifier.resource_type)
            .map(|target| (target, identifier.id))
    });

    let tag_value = selected.map_or(ColumnValue::Null, |(target, _)| {
        ColumnValue::Text(target.type_tag.to_owned())
    });
    columns.push(MappedColumn {
        name: polymorphic.tag_column,
        value: tag_value,
    });

    for target in polymorphic.targets {
        let value = match selected {
            Some((selected_target, id))
                if selected_target.column == target.column
                    && context.contains(target.target, id) =>
            {
                ColumnValue::BigInt(id)
            }
            _ => ColumnValue::Null,
        };
        columns.push(MappedColumn {
            name: target.column,
            value,
        });
    }
}

fn coerce_attribute(raw: &Value, coercion: Coercion) -> Result<ColumnValue, String> {
    match coercion {
        Coercion::Text => coerce_text(raw),
        Coercion::BigInt => coerce_bigint(raw),
        Coercion::Bool => coerce_bool(raw),
        Coercion::Decimal => coerce_decimal(raw),
        Coercion::Timestamp => coerce_timestamp(raw),
        Coercion::Date => coerce_date(raw),
        Coercion::Json => Ok(ColumnValue::Json(raw.clone())),
        // Handled before coercion dispatch; kept total for completeness.
        Coercion::ObjectChanges => Ok(ColumnValue::Json(coerce_object_changes(Some(raw)))),
    }
}

fn coerce_text(raw: &Value) -> Result<ColumnValue, String> {
    match raw {
        Value::String(text) => Ok(ColumnValue::Text(text.clone())),
        Value::Number(number) => Ok(ColumnValue::Text(number.to_string())),
        other => Err(format!("expected text, got {other}")),
    }
}

fn coerce_bigint(raw: &Value) -> Result<ColumnValue, String> {
    match raw {
        Value::Number(number) => number
            .as_i64()
            .map(ColumnValue::BigInt)
            .ok_or_else(|| format!("expected integer, got {number}")),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(ColumnValue::BigInt)
            .map_err(|_| format!("expected integer, got {text:?}")),
        other => Err(format!("expected integer, got {other}")),
    }
}

fn coerce_bool(raw: &Value) -> Result<ColumnValue, String> {
    match raw {
        Value::Bool(flag) => Ok(ColumnValue::Bool(*flag)),
        Value::String(text) if text == "true" => Ok(ColumnValue::Bool(true)),
        Value::String(text) if text == "false" => Ok(ColumnValue::Bool(false)),
        other => Err(format!("expected boolean, got {other}")),
    }
}

fn coerce_decimal(raw: &Value) -> Result<ColumnValue, String> {
    let literal = match raw {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_owned(),
        other => return Err(format!("expected decimal, got {other}")),
    };
    if is_numeric_literal(&literal) {
        Ok(ColumnValue::Decimal(literal))
    } else {
        Err(format!("expected decimal, got {literal:?}"))
    }
}

fn coerce_timestamp(raw: &Value) -> Result<ColumnValue, String> {
    match raw {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|parsed| ColumnValue::Timestamp(parsed.with_timezone(&Utc)))
            .map_err(|error| format!("expected ISO-8601 timestamp, got {text:?}: {error}")),
        other => Err(format!("expected ISO-8601 timestamp, got {other}")),
    }
}

fn coerce_date(raw: &Value) -> Result<ColumnValue, String> {
    match raw {
        Value::String(text) => text
            .parse::<NaiveDate>()
            .map(ColumnValue::Date)
            .map_err(|error| format!("expected ISO-8601 date, got {text:?}: {error}")),
        other => Err(format!("expected ISO-8601 date, got {other}")),
    }
}

/// Version-history diff payloads arrive as a field→`[old, new]` object, a
/// JSON string wrapping one, or garbage; only a non-empty object survives
/// verbatim.
fn coerce_object_changes(raw: Option<&Value>) -> Value {
    let candidate = match raw {
        Some(Value::Object(map)) if !map.is_empty() => return Value::Object(map.clone()),
        Some(Value::String(text)) => serde_json::from_str::<Value>(text).ok(),
        _ => None,
    };
    match candidate {
        Some(Value::Object(map)) if !map.is_empty() => Value::Object(map),
        _ => no_changes_recorded(),
    }
}

fn is_numeric_literal(literal: &str) -> bool {
    let unsigned = literal
        .strip_prefix('-')
        .or_else(|| literal.strip_prefix('+'))
        .unwrap_or(literal);
    if unsigned.is_empty() {
        return false;
    }
    let mut parts = unsigned.splitn(2, '.');
    let integral = parts.next().unwrap_or_default();
    let fractional = parts.next();
    let digits_only = |part: &str| !part.is_empty() && part.bytes().all(|byte| byte.is_ascii_digit());
    digits_only(integral) && fractional.is_none_or(digits_only)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::domain::resource::{Reference, ResourceIdentifier};

    fn project(id: i64) -> ResourceObject {
        let mut resource = ResourceObject::new(id, "projects");
        resource
            .attributes
            .insert("name".to_owned(), json!("Relaunch"));
        resource
    }

    fn with_reference(mut resource: ResourceObject, name: &str, target: &str, id: i64) -> ResourceObject {
        resource.relationships.insert(
            name.to_owned(),
            Reference::One(ResourceIdentifier::new(target, id)),
        );
        resource
    }

    #[test]
    fn known_reference_resolves_to_its_id() {
        let mut context = ResolutionContext::new();
        context.extend(EntityKind::Companies, [42]);
        let resource = with_reference(project(1), "company", "companies", 42);

        let mapped = map_resource(EntityKind::Projects.descriptor(), &resource, &context)
            .expect("row should map");
        assert_eq!(
            mapped.row.value_of("company_id"),
            Some(&ColumnValue::BigInt(42))
        );
        assert!(mapped.deferred.is_empty());
    }

    #[test]
    fn unknown_reference_resolves_to_null_not_an_error() {
        let context = ResolutionContext::new();
        let resource = with_reference(project(1), "company", "companies", 42);

        let mapped = map_resource(EntityKind::Projects.descriptor(), &resource, &context)
            .expect("row should map");
        assert_eq!(mapped.row.value_of("company_id"), Some(&ColumnValue::Null));
    }

    #[test]
    fn missing_relationship_resolves_to_null() {
        let context = ResolutionContext::new();
        let mapped = map_resource(EntityKind::Projects.descriptor(), &project(1), &context)
            .expect("row should map");
        assert_eq!(mapped.row.value_of("company_id"), Some(&ColumnValue::Null));
        assert_eq!(mapped.row.value_of("workflow_id"), Some(&ColumnValue::Null));
    }

    #[test]
    fn forward_self_reference_defers_for_the_second_pass() {
        let mut context = ResolutionContext::new();
        context.extend(EntityKind::Organizations, [1]);
        let mut resource = ResourceObject::new(5, "people");
        resource
            .attributes
            .insert("email".to_owned(), json!("ada@example.com"));
        let resource = with_reference(resource, "manager", "people", 9);

        let mapped = map_resource(EntityKind::People.descriptor(), &resource, &context)
            .expect("row should map");
        assert_eq!(mapped.row.value_of("manager_id"), Some(&ColumnValue::Null));
        assert_eq!(
            mapped.deferred,
            vec![DeferredReference {
                row_id: 5,
                column: "manager_id",
                target_id: 9,
            }]
        );
    }

    #[test]
    fn missing_required_attribute_fails_the_row() {
        let context = ResolutionContext::new();
        let resource = ResourceObject::new(3, "projects");
        let failure = map_resource(EntityKind::Projects.descriptor(), &resource, &context)
            .expect_err("row should fail");
        assert_eq!(failure.id, 3);
        assert!(failure.reason.contains("name"), "reason: {}", failure.reason);
    }

    #[test]
    fn malformed_attribute_fails_the_row() {
        let context = ResolutionContext::new();
        let mut resource = project(4);
        resource
            .attributes
            .insert("created_at".to_owned(), json!("not-a-date"));
        let failure = map_resource(EntityKind::Projects.descriptor(), &resource, &context)
            .expect_err("row should fail");
        assert!(
            failure.reason.contains("created_at"),
            "reason: {}",
            failure.reason
        );
    }

    #[test]
    fn polymorphic_reference_populates_exactly_one_target_column() {
        let mut context = ResolutionContext::new();
        context.extend(EntityKind::People, [11]);
        context.extend(EntityKind::Tasks, [70]);
        let mut resource = ResourceObject::new(200, "comments");
        resource.attributes.insert("body".to_owned(), json!("hi"));
        let resource = with_reference(resource, "commentable", "tasks", 70);

        let mapped = map_resource(EntityKind::Comments.descriptor(), &resource, &context)
            .expect("row should map");
        assert_eq!(
            mapped.row.value_of("commentable_type"),
            Some(&ColumnValue::Text("tasks".to_owned()))
        );
        assert_eq!(mapped.row.value_of("task_id"), Some(&ColumnValue::BigInt(70)));
        assert_eq!(mapped.row.value_of("deal_id"), Some(&ColumnValue::Null));
        assert_eq!(mapped.row.value_of("invoice_id"), Some(&ColumnValue::Null));
    }

    #[test]
    fn undeclared_polymorphic_tag_leaves_the_union_empty() {
        let context = ResolutionContext::new();
        let mut resource = ResourceObject::new(201, "comments");
        resource.attributes.insert("body".to_owned(), json!("hi"));
        let resource = with_reference(resource, "commentable", "payments", 5);

        let mapped = map_resource(EntityKind::Comments.descriptor(), &resource, &context)
            .expect("row should map");
        assert_eq!(
            mapped.row.value_of("commentable_type"),
            Some(&ColumnValue::Null)
        );
        assert_eq!(mapped.row.value_of("task_id"), Some(&ColumnValue::Null));
    }

    #[test]
    fn row_columns_follow_the_descriptor_order() {
        let context = ResolutionContext::new();
        let mapped = map_resource(EntityKind::Projects.descriptor(), &project(1), &context)
            .expect("row should map");
        let expected: Vec<&str> = EntityKind::Projects
            .descriptor()
            .columns()
            .iter()
            .map(|column| column.name)
            .collect();
        let actual: Vec<&str> = mapped.row.columns.iter().map(|column| column.name).collect();
        assert_eq!(actual, expected);
    }

    #[rstest]
    #[case::number(json!(12.5), ColumnValue::Decimal("12.5".to_owned()))]
    #[case::string(json!("99.90"), ColumnValue::Decimal("99.90".to_owned()))]
    #[case::negative(json!("-3.25"), ColumnValue::Decimal("-3.25".to_owned()))]
    fn decimal_coercion_accepts_numbers_and_numeric_strings(
        #[case] raw: Value,
        #[case] expected: ColumnValue,
    ) {
        assert_eq!(coerce_attribute(&raw, Coercion::Decimal), Ok(expected));
    }

    #[rstest]
    #[case::words(json!("twelve"))]
    #[case::double_dot(json!("1.2.3"))]
    #[case::bool(json!(true))]
    fn decimal_coercion_rejects_garbage(#[case] raw: Value) {
        assert!(coerce_attribute(&raw, Coercion::Decimal).is_err());
    }

    #[test]
    fn timestamp_coercion_normalises_to_utc() {
        let coerced = coerce_attribute(&json!("2026-03-01T10:00:00+02:00"), Coercion::Timestamp)
            .expect("timestamp should parse");
        let ColumnValue::Timestamp(parsed) = coerced else {
            panic!("expected timestamp value");
        };
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T08:00:00+00:00");
    }

    #[rstest]
    #[case::missing(None)]
    #[case::null(Some(json!(null)))]
    #[case::empty_object(Some(json!({})))]
    #[case::garbage_string(Some(json!("--- not json")))]
    #[case::array(Some(json!(["old", "new"])))]
    fn version_diff_sentinel_covers_missing_and_malformed_payloads(#[case] raw: Option<Value>) {
        assert_eq!(coerce_object_changes(raw.as_ref()), no_changes_recorded());
    }

    #[test]
    fn version_diff_objects_survive_verbatim() {
        let diff = json!({ "time": [30, 45], "note": [null, "updated"] });
        assert_eq!(coerce_object_changes(Some(&diff)), diff);
    }

    #[test]
    fn version_diff_json_strings_are_unwrapped() {
        let wrapped = json!("{\"time\":[30,45]}");
        assert_eq!(
            coerce_object_changes(Some(&wrapped)),
            json!({ "time": [30, 45] })
        );
    }
}
