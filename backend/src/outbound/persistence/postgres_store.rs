//! PostgreSQL-backed mirror store adapter.
//!
//! Uses the synchronous `postgres` client behind `spawn_blocking`: batches
//! run inside one transaction with a savepoint per row, so a row-level
//! constraint violation rolls back that row alone and surfaces as a
//! [`RowFailure`] while the rest of the batch commits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use postgres::{Client, NoTls, Transaction};

use super::sql;
use crate::domain::ports::{
    ColumnValue, EntityRelationshipStats, MappedRow, MirrorStore, RowFailure, StoreError,
    UpsertOutcome,
};
use crate::domain::registry::{EntityDescriptor, EntityKind};

/// Mirror store over one PostgreSQL connection.
pub struct PostgresMirrorStore {
    client: Arc<Mutex<Client>>,
}

impl PostgresMirrorStore {
    /// Connect to the mirror database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the connection cannot be
    /// established.
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let client = Client::connect(database_url, NoTls)
            .map_err(|error| StoreError::connection(error.to_string()))?;
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }

    fn lock_client(client: &Mutex<Client>) -> MutexGuard<'_, Client> {
        client.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MirrorStore for PostgresMirrorStore {
    async fn load_ids(&self, kind: EntityKind) -> Result<Vec<i64>, StoreError> {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let mut client = Self::lock_client(&client);
            let statement = sql::load_ids_statement(kind.descriptor().table);
            let rows = client
                .query(statement.as_str(), &[])
                .map_err(|error| StoreError::query(error.to_string()))?;
            Ok(rows.into_iter().map(|row| row.get("id")).collect())
        })
        .await
        .map_err(|error| StoreError::query(format!("load_ids task failed: {error}")))?
    }

    async fn upsert(
        &self,
        kind: EntityKind,
        rows: &[MappedRow],
    ) -> Result<UpsertOutcome, StoreError> {
        let client = Arc::clone(&self.client);
        let rows = rows.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut client = Self::lock_client(&client);
            upsert_batch(&mut client, kind.descriptor(), &rows)
        })
        .await
        .map_err(|error| StoreError::query(format!("upsert task failed: {error}")))?
    }

    async fn backfill_references(
        &self,
        kind: EntityKind,
        column: &'static str,
        assignments: &[(i64, i64)],
    ) -> Result<(), StoreError> {
        let client = Arc::clone(&self.client);
        let assignments = assignments.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut client = Self::lock_client(&client);
            let statement = sql::backfill_statement(kind.descriptor().table, column);
            let mut transaction = client
                .transaction()
                .map_err(|error| StoreError::query(error.to_string()))?;
            for (row_id, target_id) in &assignments {
                transaction
                    .execute(statement.as_str(), &[row_id, target_id])
                    .map_err(|error| StoreError::query(error.to_string()))?;
            }
            transaction
                .commit()
                .map_err(|error| StoreError::query(error.to_string()))
        })
        .await
        .map_err(|error| StoreError::query(format!("backfill task failed: {error}")))?
    }

    async fn relationship_stats(
        &self,
        kind: EntityKind,
    ) -> Result<EntityRelationshipStats, StoreError> {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let mut client = Self::lock_client(&client);
            let descriptor = kind.descriptor();
            let statement = sql::relationship_stats_statement(descriptor);
            let row = client
                .query_one(statement.as_str(), &[])
                .map_err(|error| StoreError::query(error.to_string()))?;
            let total: i64 = row.get("total");
            let populated = descriptor
                .relation_columns()
                .into_iter()
                .enumerate()
                .map(|(index, (relationship, _))| {
                    let count: i64 = row.get(index + 1);
                    (relationship, count.max(0) as u64)
                })
                .collect();
            Ok(EntityRelationshipStats {
                total: total.max(0) as u64,
                populated,
            })
        })
        .await
        .map_err(|error| StoreError::query(format!("stats task failed: {error}")))?
    }
}

fn upsert_batch(
    client: &mut Client,
    descriptor: &EntityDescriptor,
    rows: &[MappedRow],
) -> Result<UpsertOutcome, StoreError> {
    let statement = sql::upsert_statement(descriptor);
    let mut transaction = client
        .transaction()
        .map_err(|error| StoreError::query(error.to_string()))?;
    let mut outcome = UpsertOutcome::default();
    for row in rows {
        upsert_row(&mut transaction, &statement, row, &mut outcome)?;
    }
    transaction
        .commit()
        .map_err(|error| StoreError::query(error.to_string()))?;
    Ok(outcome)
}

fn upsert_row(
    transaction: &mut Transaction<'_>,
    statement: &str,
    row: &MappedRow,
    outcome: &mut UpsertOutcome,
) -> Result<(), StoreError> {
    let values: Vec<PgValue<'_>> = row.columns.iter().map(|column| PgValue(&column.value)).collect();
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(values.len() + 1);
    params.push(&row.id);
    for value in &values {
        params.push(value);
    }

    let mut savepoint = transaction
        .savepoint("row_upsert")
        .map_err(|error| StoreError::query(error.to_string()))?;
    match savepoint.query_opt(statement, &params) {
        Ok(returned) => {
            savepoint
                .commit()
                .map_err(|error| StoreError::query(error.to_string()))?;
            match returned {
                Some(returned) if returned.get::<_, bool>("inserted") => outcome.inserted += 1,
                Some(_) => outcome.updated += 1,
                // The conditional update matched nothing: row unchanged.
                None => {}
            }
        }
        Err(error) if is_row_level(&error) => {
            savepoint
                .rollback()
                .map_err(|error| StoreError::query(error.to_string()))?;
            outcome.failed.push(RowFailure {
                id: row.id,
                reason: error.to_string(),
            });
        }
        Err(error) => return Err(StoreError::query(error.to_string())),
    }
    Ok(())
}

/// Whether the failure is scoped to one row's data rather than the batch:
/// SQLSTATE class 22 (data exception) or 23 (integrity constraint).
fn is_row_level(error: &postgres::Error) -> bool {
    error.as_db_error().is_some_and(|db_error| {
        let class = &db_error.code().code()[..2];
        class == "22" || class == "23"
    })
}

/// Bind wrapper delegating to the underlying value's wire encoding.
struct PgValue<'a>(&'a ColumnValue);

impl std::fmt::Debug for PgValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl ToSql for PgValue<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            ColumnValue::Null => Ok(IsNull::Yes),
            ColumnValue::Bool(value) => value.to_sql(ty, out),
            ColumnValue::BigInt(value) => value.to_sql(ty, out),
            // Decimals travel as text; the statement casts server-side.
            ColumnValue::Text(value) | ColumnValue::Decimal(value) => {
                value.as_str().to_sql(ty, out)
            }
            ColumnValue::Timestamp(value) => value.to_sql(ty, out),
            ColumnValue::Date(value) => value.to_sql(ty, out),
            ColumnValue::Json(value) => value.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Parameter types are fixed by the statement's target columns.
        true
    }

    to_sql_checked!();
}
