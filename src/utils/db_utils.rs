use crate::error::ApiError;
use crate::validation::FieldErrors;
use crate::utils::pagination::Page;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{Executor, FromRow, PgPool, Postgres};
use tracing::debug;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    NullText,
    NullI64,
    NullF64,
    NullBool,
    NullDate,
}

/// ===============================
/// Column whitelist for PATCH-style updates
/// ===============================
#[derive(Debug, Clone, Copy)]
pub enum ColumnKind {
    Text,
    BigInt,
    Float,
    Bool,
    Date,
    /// Text restricted to a fixed set of values
    OneOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl Column {
    pub const fn required(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind, nullable: false }
    }

    pub const fn nullable(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind, nullable: true }
    }
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

impl SqlUpdate {
    /// Adds a placeholder-free condition to the `WHERE` and returns the updated row.
    pub fn guarded_returning(mut self, condition: &str) -> Self {
        self.sql = format!("{} AND {} RETURNING *", self.sql, condition);
        self
    }
}

fn null_for(kind: ColumnKind) -> SqlValue {
    match kind {
        ColumnKind::BigInt => SqlValue::NullI64,
        ColumnKind::Float => SqlValue::NullF64,
        ColumnKind::Date => SqlValue::NullDate,
        ColumnKind::Bool => SqlValue::NullBool,
        ColumnKind::Text | ColumnKind::OneOf(_) => SqlValue::NullText,
    }
}

fn convert(column: &Column, value: &Value) -> Result<SqlValue, String> {
    if value.is_null() {
        return if column.nullable {
            Ok(null_for(column.kind))
        } else {
            Err("Field cannot be null".to_string())
        };
    }

    match (column.kind, value) {
        (ColumnKind::Text, Value::String(s)) => {
            if s.trim().is_empty() && !column.nullable {
                Err("Field cannot be empty".to_string())
            } else {
                Ok(SqlValue::String(s.trim().to_string()))
            }
        }
        (ColumnKind::OneOf(allowed), Value::String(s)) => {
            if allowed.contains(&s.as_str()) {
                Ok(SqlValue::String(s.clone()))
            } else {
                Err(format!("Must be one of: {}", allowed.join(", ")))
            }
        }
        (ColumnKind::BigInt, Value::Number(n)) => n
            .as_i64()
            .map(SqlValue::I64)
            .ok_or_else(|| "Must be an integer".to_string()),
        (ColumnKind::Float, Value::Number(n)) => n
            .as_f64()
            .map(SqlValue::F64)
            .ok_or_else(|| "Must be a number".to_string()),
        (ColumnKind::Bool, Value::Bool(b)) => Ok(SqlValue::Bool(*b)),
        (ColumnKind::Date, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(SqlValue::Date)
            .map_err(|_| "Must be a date (YYYY-MM-DD)".to_string()),
        (ColumnKind::Text | ColumnKind::OneOf(_), _) => Err("Must be a string".to_string()),
        (ColumnKind::BigInt, _) => Err("Must be an integer".to_string()),
        (ColumnKind::Float, _) => Err("Must be a number".to_string()),
        (ColumnKind::Bool, _) => Err("Must be a boolean".to_string()),
        (ColumnKind::Date, _) => Err("Must be a date (YYYY-MM-DD)".to_string()),
    }
}

/// Payload as a JSON object, or a 400.
pub fn as_object(payload: &Value) -> Result<&Map<String, Value>, ApiError> {
    payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object"))
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only whitelisted columns are accepted; unknown keys and mistyped values are
/// reported per field. `updated_at` is always refreshed.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    columns: &[Column],
    id_value: i64,
) -> Result<SqlUpdate, ApiError> {
    let obj = as_object(payload)?;

    if obj.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    let mut errors = FieldErrors::default();
    let mut assignments = Vec::with_capacity(obj.len() + 1);
    let mut values = Vec::with_capacity(obj.len() + 1);

    for key in obj.keys() {
        if !columns.iter().any(|c| c.name == key) {
            errors.add(key, "Field cannot be updated");
        }
    }

    // Whitelist order keeps the generated SQL stable.
    for column in columns {
        let Some(value) = obj.get(column.name) else {
            continue;
        };

        match convert(column, value) {
            Ok(v) => {
                values.push(v);
                assignments.push(format!("{} = ${}", column.name, values.len()));
            }
            Err(msg) => errors.add(column.name, msg),
        }
    }

    errors.into_result()?;

    assignments.push("updated_at = NOW()".to_string());
    values.push(SqlValue::I64(id_value));

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ${}",
        table,
        assignments.join(", "),
        values.len()
    );

    Ok(SqlUpdate { sql, values })
}

/// Binds every [`SqlValue`] in order onto a `query`, `query_as` or `query_scalar`.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values.iter().cloned() {
            query = match value {
                SqlValue::String(v) => query.bind(v),
                SqlValue::I64(v) => query.bind(v),
                SqlValue::F64(v) => query.bind(v),
                SqlValue::Bool(v) => query.bind(v),
                SqlValue::Date(v) => query.bind(v),
                SqlValue::NullText => query.bind(None::<String>),
                SqlValue::NullI64 => query.bind(None::<i64>),
                SqlValue::NullF64 => query.bind(None::<f64>),
                SqlValue::NullBool => query.bind(None::<bool>),
                SqlValue::NullDate => query.bind(None::<NaiveDate>),
            };
        }
        query
    }};
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'c, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = bind_values!(sqlx::query(&update.sql), update.values);
    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

/// Runs a [`SqlUpdate::guarded_returning`] update; `None` when no row matched.
pub async fn fetch_updated<'c, E, T>(executor: E, update: SqlUpdate) -> Result<Option<T>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let query = bind_values!(sqlx::query_as::<_, T>(&update.sql), update.values);
    query.fetch_optional(executor).await
}

/// Escapes the LIKE wildcards `%` and `_` and the escape character itself.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// ===============================
/// WHERE clause builder for list endpoints
/// ===============================
/// Conditions are written with `?` markers which are renumbered to `$n`.
#[derive(Debug, Default)]
pub struct Filters {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition whose `?` markers bind `values` in order.
    pub fn push(&mut self, condition: &str, values: impl IntoIterator<Item = SqlValue>) {
        let mut sql = String::with_capacity(condition.len() + 4);
        let mut values = values.into_iter();

        for ch in condition.chars() {
            if ch == '?' {
                if let Some(v) = values.next() {
                    self.values.push(v);
                    sql.push_str(&format!("${}", self.values.len()));
                    continue;
                }
            }
            sql.push(ch);
        }

        self.conditions.push(sql);
    }

    pub fn eq(&mut self, column: &str, value: SqlValue) {
        self.push(&format!("{column} = ?"), [value]);
    }

    /// Case-insensitive substring match on any of `columns`. The term matches literally.
    pub fn search(&mut self, columns: &[&str], term: &str) {
        let like = format!("%{}%", escape_like(term.trim()));
        let condition = columns
            .iter()
            .map(|c| format!("{c} ILIKE ? ESCAPE '\\'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.push(
            &format!("({condition})"),
            columns.iter().map(|_| SqlValue::String(like.clone())),
        );
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// Runs the count and the page query for a filtered listing.
pub async fn fetch_page<T>(
    pool: &PgPool,
    columns: &str,
    from: &str,
    filters: &Filters,
    order_by: &str,
    page: Page,
) -> Result<(Vec<T>, i64), sqlx::Error>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM {from} {where_clause}");
    let total: i64 = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(pool)
        .await?;

    let next = filters.values().len();
    let data_sql = format!(
        "SELECT {columns} FROM {from} {where_clause} ORDER BY {order_by} LIMIT ${} OFFSET ${}",
        next + 1,
        next + 2
    );
    debug!(sql = %data_sql, total, page = page.page, per_page = page.per_page, "Fetching page");

    let rows = bind_values!(sqlx::query_as::<_, T>(&data_sql), filters.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok((rows, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[Column] = &[
        Column::required("name", ColumnKind::Text),
        Column::nullable("manager_id", ColumnKind::BigInt),
        Column::required("status", ColumnKind::OneOf(&["planning", "active"])),
        Column::nullable("end_date", ColumnKind::Date),
        Column::required("is_active", ColumnKind::Bool),
    ];

    #[test]
    fn builds_numbered_placeholders() {
        let update = build_update_sql(
            "projects",
            &json!({"name": " Apollo ", "manager_id": 4}),
            COLUMNS,
            12,
        )
        .unwrap();

        assert_eq!(
            update.sql,
            "UPDATE projects SET name = $1, manager_id = $2, updated_at = NOW() WHERE id = $3"
        );
        assert_eq!(
            update.values,
            vec![
                SqlValue::String("Apollo".to_string()),
                SqlValue::I64(4),
                SqlValue::I64(12)
            ]
        );
    }

    #[test]
    fn nulls_only_for_nullable_columns() {
        let update =
            build_update_sql("projects", &json!({"end_date": null}), COLUMNS, 1).unwrap();
        assert_eq!(update.values[0], SqlValue::NullDate);

        assert!(build_update_sql("projects", &json!({"name": null}), COLUMNS, 1).is_err());
    }

    #[test]
    fn unknown_and_mistyped_fields_are_reported_together() {
        let err = build_update_sql(
            "projects",
            &json!({"id": 99, "status": "archived", "is_active": "yes", "end_date": "31/12/2026"}),
            COLUMNS,
            1,
        )
        .unwrap_err();

        match err {
            ApiError::Validation(fields) => {
                assert!(fields.has("id"));
                assert!(fields.has("status"));
                assert!(fields.has("is_active"));
                assert!(fields.has("end_date"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn filters_renumber_placeholders() {
        let mut filters = Filters::new();
        assert_eq!(filters.where_clause(), "");

        filters.eq("role", SqlValue::String("manager".to_string()));
        filters.search(&["first_name", "email"], " ana ");
        filters.push("date >= ?", [SqlValue::Date(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())]);

        assert_eq!(
            filters.where_clause(),
            r"WHERE role = $1 AND (first_name ILIKE $2 ESCAPE '\' OR email ILIKE $3 ESCAPE '\') AND date >= $4"
        );
        assert_eq!(filters.values().len(), 4);
        assert_eq!(filters.values()[1], SqlValue::String("%ana%".to_string()));
    }

    #[test]
    fn empty_or_non_object_payload_is_a_bad_request() {
        assert!(matches!(
            build_update_sql("projects", &json!({}), COLUMNS, 1),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            build_update_sql("projects", &json!([1, 2]), COLUMNS, 1),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn search_terms_match_wildcards_literally() {
        assert_eq!(escape_like("50%_off"), r"50\%\_off");
        assert_eq!(escape_like(r"C:\temp"), r"C:\\temp");
        assert_eq!(escape_like("ana"), "ana");

        let mut filters = Filters::new();
        filters.search(&["email"], " a_b ");
        assert_eq!(filters.values()[0], SqlValue::String(r"%a\_b%".to_string()));
    }

    #[test]
    fn guarded_update_adds_condition_and_returning() {
        let update = build_update_sql("time_entries", &json!({"name": "x"}), COLUMNS, 7)
            .unwrap()
            .guarded_returning("status = 'pending'");
        assert_eq!(
            update.sql,
            "UPDATE time_entries SET name = $1, updated_at = NOW() WHERE id = $2 AND status = 'pending' RETURNING *"
        );
    }
}
