//! SQL text builders for the descriptor-driven mirror store.
//!
//! The mirror schema is managed externally, so statements are assembled from
//! the entity registry rather than a compile-time schema DSL. Table and
//! column names come exclusively from `&'static` registry strings; only
//! values travel as bind parameters.

use crate::domain::registry::{ColumnKind, EntityDescriptor};

/// Idempotent insert-or-update for one row.
///
/// `ON CONFLICT ... WHERE ... IS DISTINCT FROM` skips the update when every
/// column already matches, so the statement returns no row for unchanged
/// input. `xmax = 0` distinguishes a fresh insert from an update. The
/// conflict target is the primary key unless the descriptor declares a
/// pair-uniqueness constraint, which then arbitrates instead.
pub(super) fn upsert_statement(descriptor: &EntityDescriptor) -> String {
    let columns = descriptor.columns();
    let mut names = Vec::with_capacity(columns.len() + 1);
    let mut values = Vec::with_capacity(columns.len() + 1);
    names.push("id".to_owned());
    values.push(placeholder(1, ColumnKind::BigInt));
    for (offset, column) in columns.iter().enumerate() {
        names.push(column.name.to_owned());
        values.push(placeholder(offset + 2, column.kind));
    }

    let assignments = columns
        .iter()
        .map(|column| format!("{name} = EXCLUDED.{name}", name = column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let current = columns
        .iter()
        .map(|column| format!("{}.{}", descriptor.table, column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let incoming = columns
        .iter()
        .map(|column| format!("EXCLUDED.{}", column.name))
        .collect::<Vec<_>>()
        .join(", ");

    let conflict_target = descriptor.unique_by.map_or_else(
        || "id".to_owned(),
        |(first, second)| format!("{first}, {second}"),
    );

    format!(
        "INSERT INTO {table} ({names}) VALUES ({values}) \
         ON CONFLICT ({conflict_target}) DO UPDATE SET {assignments} \
         WHERE ({current}) IS DISTINCT FROM ({incoming}) \
         RETURNING (xmax = 0) AS inserted",
        table = descriptor.table,
        names = names.join(", "),
        values = values.join(", "),
    )
}

/// Second-pass assignment of one self-referential column.
pub(super) fn backfill_statement(table: &str, column: &str) -> String {
    format!("UPDATE {table} SET {column} = $2 WHERE id = $1")
}

/// Ids currently mirrored for one table.
pub(super) fn load_ids_statement(table: &str) -> String {
    format!("SELECT id FROM {table} ORDER BY id")
}

/// Row total plus one populated count per declared relationship, aliased
/// `populated_0..n` in registry order.
pub(super) fn relationship_stats_statement(descriptor: &EntityDescriptor) -> String {
    let mut selections = vec!["count(*) AS total".to_owned()];
    for (index, (_, column)) in descriptor.relation_columns().iter().enumerate() {
        selections.push(format!("count({column}) AS populated_{index}"));
    }
    format!(
        "SELECT {selections} FROM {table}",
        selections = selections.join(", "),
        table = descriptor.table,
    )
}

/// Bind-parameter expression for one column.
///
/// Decimals are bound as text and cast server-side so canonical numeric
/// literals never pass through a float.
fn placeholder(index: usize, kind: ColumnKind) -> String {
    match kind {
        ColumnKind::Decimal => format!("(${index}::text)::numeric"),
        ColumnKind::Text
        | ColumnKind::BigInt
        | ColumnKind::Bool
        | ColumnKind::Timestamp
        | ColumnKind::Date
        | ColumnKind::Json => format!("${index}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registry::EntityKind;

    #[test]
    fn upsert_statement_updates_only_changed_rows() {
        let statement = upsert_statement(EntityKind::TaxRates.descriptor());
        assert_eq!(
            statement,
            "INSERT INTO tax_rates (id, name, rate, subsidiary_id) \
             VALUES ($1, $2, ($3::text)::numeric, $4) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, \
             rate = EXCLUDED.rate, subsidiary_id = EXCLUDED.subsidiary_id \
             WHERE (tax_rates.name, tax_rates.rate, tax_rates.subsidiary_id) \
             IS DISTINCT FROM (EXCLUDED.name, EXCLUDED.rate, EXCLUDED.subsidiary_id) \
             RETURNING (xmax = 0) AS inserted"
        );
    }

    #[test]
    fn upsert_statement_covers_polymorphic_union_columns() {
        let statement = upsert_statement(EntityKind::Comments.descriptor());
        assert!(statement.contains("commentable_type"), "{statement}");
        assert!(statement.contains("task_id"), "{statement}");
        assert!(statement.contains("deal_id"), "{statement}");
        assert!(statement.contains("invoice_id"), "{statement}");
    }

    #[test]
    fn custom_field_values_conflict_on_their_value_pair() {
        let statement = upsert_statement(EntityKind::CfDeals.descriptor());
        assert!(
            statement.contains("ON CONFLICT (deal_id, custom_field_id) DO UPDATE SET"),
            "{statement}"
        );
    }

    #[test]
    fn backfill_statement_targets_one_column_by_id() {
        assert_eq!(
            backfill_statement("people", "manager_id"),
            "UPDATE people SET manager_id = $2 WHERE id = $1"
        );
    }

    #[test]
    fn load_ids_statement_orders_deterministically() {
        assert_eq!(
            load_ids_statement("companies"),
            "SELECT id FROM companies ORDER BY id"
        );
    }

    #[test]
    fn relationship_stats_statement_counts_each_relation_column() {
        let statement = relationship_stats_statement(EntityKind::Projects.descriptor());
        assert_eq!(
            statement,
            "SELECT count(*) AS total, count(company_id) AS populated_0, \
             count(project_manager_id) AS populated_1, \
             count(workflow_id) AS populated_2 FROM projects"
        );
    }
}
