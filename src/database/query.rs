//! Generic parameterized statements over a table.
//!
//! Column values are always bound parameters. Table and column names cannot
//! be bound, so they are checked against `^[a-z_][a-z0-9_]*$` before they are
//! written into the statement.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Executor, FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

/// A value bound into a generated statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Decimal(BigDecimal),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
    /// Database clock, rendered as `NOW()`
    Now,
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<BigDecimal> for SqlValue {
    fn from(v: BigDecimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(v: JsonValue) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

pub type Column<'a> = (&'a str, SqlValue);

pub fn validate_identifier(identifier: &str) -> Result<&str, DatabaseError> {
    let mut chars = identifier.chars();
    let valid_head = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid_head && valid_tail {
        Ok(identifier)
    } else {
        Err(DatabaseError::new(DatabaseErrorKind::InvalidIdentifier {
            identifier: identifier.to_string(),
        }))
    }
}

fn push_value(builder: &mut QueryBuilder<'static, Postgres>, value: &SqlValue) {
    match value {
        SqlValue::Null => {
            builder.push("NULL");
        }
        SqlValue::Now => {
            builder.push("NOW()");
        }
        SqlValue::Bool(v) => {
            builder.push_bind(*v);
        }
        SqlValue::Int(v) => {
            builder.push_bind(*v);
        }
        SqlValue::Text(v) => {
            builder.push_bind(v.clone());
        }
        SqlValue::Decimal(v) => {
            builder.push_bind(v.clone());
        }
        SqlValue::Uuid(v) => {
            builder.push_bind(*v);
        }
        SqlValue::Timestamp(v) => {
            builder.push_bind(*v);
        }
        SqlValue::Json(v) => {
            builder.push_bind(v.clone());
        }
    }
}

fn push_where(
    builder: &mut QueryBuilder<'static, Postgres>,
    filter: &[Column<'_>],
) -> Result<(), DatabaseError> {
    for (i, (column, value)) in filter.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        builder.push(validate_identifier(column)?);
        if *value == SqlValue::Null {
            builder.push(" IS NULL");
        } else {
            builder.push(" = ");
            push_value(builder, value);
        }
    }
    Ok(())
}

pub fn select_builder(
    table: &str,
    filter: &[Column<'_>],
    order_by: Option<&str>,
) -> Result<QueryBuilder<'static, Postgres>, DatabaseError> {
    let mut builder = QueryBuilder::new("SELECT * FROM ");
    builder.push(validate_identifier(table)?);
    push_where(&mut builder, filter)?;
    if let Some(column) = order_by {
        builder.push(" ORDER BY ");
        builder.push(validate_identifier(column)?);
        builder.push(" DESC");
    }
    Ok(builder)
}

pub fn insert_builder(
    table: &str,
    values: &[Column<'_>],
) -> Result<QueryBuilder<'static, Postgres>, DatabaseError> {
    if values.is_empty() {
        return Err(DatabaseError::new(DatabaseErrorKind::Unknown {
            message: format!("insert into {} without columns", table),
        }));
    }

    let mut builder = QueryBuilder::new("INSERT INTO ");
    builder.push(validate_identifier(table)?);
    builder.push(" (");
    for (i, (column, _)) in values.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(validate_identifier(column)?);
    }
    builder.push(") VALUES (");
    for (i, (_, value)) in values.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        push_value(&mut builder, value);
    }
    builder.push(") RETURNING *");
    Ok(builder)
}

/// Unfiltered updates are refused.
pub fn update_builder(
    table: &str,
    set: &[Column<'_>],
    filter: &[Column<'_>],
) -> Result<QueryBuilder<'static, Postgres>, DatabaseError> {
    if set.is_empty() || filter.is_empty() {
        return Err(DatabaseError::new(DatabaseErrorKind::Unknown {
            message: format!("update of {} needs both columns and a filter", table),
        }));
    }

    let mut builder = QueryBuilder::new("UPDATE ");
    builder.push(validate_identifier(table)?);
    builder.push(" SET ");
    for (i, (column, value)) in set.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(validate_identifier(column)?);
        builder.push(" = ");
        push_value(&mut builder, value);
    }
    push_where(&mut builder, filter)?;
    builder.push(" RETURNING *");
    Ok(builder)
}

pub fn delete_builder(
    table: &str,
    filter: &[Column<'_>],
) -> Result<QueryBuilder<'static, Postgres>, DatabaseError> {
    if filter.is_empty() {
        return Err(DatabaseError::new(DatabaseErrorKind::Unknown {
            message: format!("delete from {} needs a filter", table),
        }));
    }
    let mut builder = QueryBuilder::new("DELETE FROM ");
    builder.push(validate_identifier(table)?);
    push_where(&mut builder, filter)?;
    Ok(builder)
}

pub async fn fetch_one<'c, E, T>(
    executor: E,
    table: &str,
    filter: &[Column<'_>],
) -> Result<Option<T>, DatabaseError>
where
    E: Executor<'c, Database = Postgres>,
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let mut builder = select_builder(table, filter, None)?;
    builder.push(" LIMIT 1");
    builder
        .build_query_as::<T>()
        .fetch_optional(executor)
        .await
        .map_err(DatabaseError::from_sqlx)
}

pub async fn fetch_many<'c, E, T>(
    executor: E,
    table: &str,
    filter: &[Column<'_>],
    order_by: Option<&str>,
) -> Result<Vec<T>, DatabaseError>
where
    E: Executor<'c, Database = Postgres>,
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let mut builder = select_builder(table, filter, order_by)?;
    builder
        .build_query_as::<T>()
        .fetch_all(executor)
        .await
        .map_err(DatabaseError::from_sqlx)
}

pub async fn insert_row<'c, E, T>(
    executor: E,
    table: &str,
    values: &[Column<'_>],
) -> Result<T, DatabaseError>
where
    E: Executor<'c, Database = Postgres>,
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let mut builder = insert_builder(table, values)?;
    builder
        .build_query_as::<T>()
        .fetch_one(executor)
        .await
        .map_err(DatabaseError::from_sqlx)
}

pub async fn update_rows<'c, E, T>(
    executor: E,
    table: &str,
    set: &[Column<'_>],
    filter: &[Column<'_>],
) -> Result<Vec<T>, DatabaseError>
where
    E: Executor<'c, Database = Postgres>,
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let mut builder = update_builder(table, set, filter)?;
    builder
        .build_query_as::<T>()
        .fetch_all(executor)
        .await
        .map_err(DatabaseError::from_sqlx)
}

pub async fn delete_rows<'c, E>(
    executor: E,
    table: &str,
    filter: &[Column<'_>],
) -> Result<u64, DatabaseError>
where
    E: Executor<'c, Database = Postgres>,
{
    let mut builder = delete_builder(table, filter)?;
    let result = builder
        .build()
        .execute(executor)
        .await
        .map_err(DatabaseError::from_sqlx)?;
    Ok(result.rows_affected())
}
