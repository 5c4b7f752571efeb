use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, PgExecutor, Postgres, QueryBuilder, Row};

use crate::error::{map_db_error, AppError};

/// Upper bound on rows returned to a list endpoint. The API exposes no
/// pagination, so this only guards against runaway responses. Aggregate
/// loaders read without a limit so totals cover every row.
pub const MAX_LIST_ROWS: i64 = 10_000;

const ALLOWED_TABLES: &[&str] = &[
    "accounts",
    "consignment_calculations",
    "consignments",
    "customers",
    "expense_accounts",
    "expense_categories",
    "expense_items",
    "expenses",
    "granite_block_parts",
    "granite_blocks",
    "granite_consignments",
    "granite_sales",
    "granite_suppliers",
    "transactions",
    "vendors",
];

/// Builder for the filter map accepted by `list_rows`. Empty or missing
/// values are skipped so optional query parameters can be passed through.
#[derive(Debug, Clone, Default)]
pub struct RowFilters(Map<String, Value>);

impl RowFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: Option<&str>) -> Self {
        if let Some(value) = non_blank(value) {
            self.0.insert(column.to_string(), Value::String(value));
        }
        self
    }

    pub fn flag(mut self, column: &str, value: Option<bool>) -> Self {
        if let Some(flag) = value {
            self.0.insert(column.to_string(), Value::Bool(flag));
        }
        self
    }

    /// Inclusive on both ends.
    pub fn date_range(mut self, column: &str, from: Option<&str>, to: Option<&str>) -> Self {
        if let Some(from) = non_blank(from) {
            self.0.insert(format!("{column}__gte"), Value::String(from));
        }
        if let Some(to) = non_blank(to) {
            self.0.insert(format!("{column}__lte"), Value::String(to));
        }
        self
    }

    pub fn contains(mut self, column: &str, value: Option<&str>) -> Self {
        if let Some(value) = non_blank(value) {
            self.0.insert(format!("{column}__ilike"), Value::String(value));
        }
        self
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

pub async fn list_rows<'e, E>(
    executor: E,
    table: &str,
    filters: &Map<String, Value>,
    order_by: &str,
    ascending: bool,
    limit: Option<i64>,
) -> Result<Vec<Value>, AppError>
where
    E: PgExecutor<'e>,
{
    let limit = limit.map(|value| value.clamp(1, MAX_LIST_ROWS));
    let mut query = build_list_query(table, filters, order_by, ascending, limit)?;
    let rows = query
        .build()
        .fetch_all(executor)
        .await
        .map_err(map_db_error)?;
    if let Some(limit) = limit.filter(|limit| rows.len() as i64 >= *limit) {
        tracing::warn!(table, limit, "List truncated at row limit");
    }
    Ok(read_rows(rows))
}

pub async fn get_row<'e, E>(executor: E, table: &str, row_id: &str) -> Result<Value, AppError>
where
    E: PgExecutor<'e>,
{
    fetch_by_id(executor, table, row_id, false).await
}

/// Same as `get_row` but takes a row lock; only meaningful inside a
/// transaction.
pub async fn get_row_for_update<'e, E>(
    executor: E,
    table: &str,
    row_id: &str,
) -> Result<Value, AppError>
where
    E: PgExecutor<'e>,
{
    fetch_by_id(executor, table, row_id, true).await
}

async fn fetch_by_id<'e, E>(
    executor: E,
    table: &str,
    row_id: &str,
    lock: bool,
) -> Result<Value, AppError>
where
    E: PgExecutor<'e>,
{
    let table_name = validate_table(table)?;
    let id = parse_row_id(table_name, row_id)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE t.id = ").push_bind(id);
    if lock {
        query.push(" FOR UPDATE");
    }

    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| not_found(table_name))
}

pub async fn create_row<'e, E>(
    executor: E,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError>
where
    E: PgExecutor<'e>,
{
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {table_name} record."
        )));
    }
    let mut query = build_insert_query(table_name, payload)?;

    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::Internal(format!("Could not create {table_name} record.")))
}

pub async fn update_row<'e, E>(
    executor: E,
    table: &str,
    row_id: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError>
where
    E: PgExecutor<'e>,
{
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let id = parse_row_id(table_name, row_id)?;
    let mut query = build_update_query(table_name, payload)?;
    query.push(" WHERE t.id = ").push_bind(id);
    query.push(" RETURNING row_to_json(t) AS row");

    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| not_found(table_name))
}

pub async fn delete_row<'e, E>(executor: E, table: &str, row_id: &str) -> Result<Value, AppError>
where
    E: PgExecutor<'e>,
{
    let table_name = validate_table(table)?;
    let id = parse_row_id(table_name, row_id)?;

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query
        .push(table_name)
        .push(" t WHERE t.id = ")
        .push_bind(id)
        .push(" RETURNING row_to_json(t) AS row");

    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| not_found(table_name))
}

fn build_list_query(
    table: &str,
    filters: &Map<String, Value>,
    order_by: &str,
    ascending: bool,
    limit: Option<i64>,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "created_at"
    } else {
        validate_identifier(order_by)?
    };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");

    for (key, value) in filters {
        push_filter_clause(&mut query, key, value)?;
    }

    query.push(" ORDER BY t.").push(order_name);
    query.push(if ascending { " ASC" } else { " DESC" });
    query.push(", t.id ASC");
    if let Some(limit) = limit {
        query.push(" LIMIT ").push_bind(limit);
    }
    Ok(query)
}

// jsonb_populate_record lets PostgreSQL resolve column types (uuid, date,
// numeric, enum) from the table definition.
fn build_insert_query(
    table_name: &str,
    payload: &Map<String, Value>,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let keys = sorted_keys(payload)?;

    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name).push(" (");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(key.as_str());
        }
    }
    query.push(") SELECT ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push("r.");
            separated.push_unseparated(key.as_str());
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query
        .push(") r RETURNING row_to_json(")
        .push(table_name)
        .push(".*) AS row");
    Ok(query)
}

fn build_update_query(
    table_name: &str,
    payload: &Map<String, Value>,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let keys = sorted_keys(payload)?;

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query.push(table_name).push(" t SET ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(key.as_str());
            separated.push_unseparated(" = r.");
            separated.push_unseparated(key.as_str());
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query.push(") r");
    Ok(query)
}

fn sorted_keys(payload: &Map<String, Value>) -> Result<Vec<String>, AppError> {
    let mut keys = Vec::with_capacity(payload.len());
    for key in payload.keys() {
        keys.push(validate_identifier(key)?.to_string());
    }
    keys.sort_unstable();
    Ok(keys)
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect()
}

fn not_found(table_name: &str) -> AppError {
    AppError::NotFound(format!("{table_name} record not found."))
}

fn parse_row_id(table_name: &str, row_id: &str) -> Result<uuid::Uuid, AppError> {
    uuid::Uuid::parse_str(row_id.trim()).map_err(|_| {
        AppError::BadRequest(format!("Invalid {table_name} id '{}'.", row_id.trim()))
    })
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::Internal(format!(
        "Table '{normalized}' is not allowed."
    )))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Identifier cannot be empty.".to_string(),
        ));
    }
    let valid_chars = trimmed.chars().all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    });
    let starts_with_digit = trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit());
    if !valid_chars || starts_with_digit {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone, PartialEq)]
enum ScalarFilter {
    Text(String),
    Uuid(uuid::Uuid),
    Bool(bool),
    I64(i64),
    F64(f64),
    Date(NaiveDate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOperator {
    Eq,
    Gte,
    Lte,
    ILike,
}

/// Filter keys are column names with an optional `__gte`, `__lte` or
/// `__ilike` suffix; anything else is an equality match.
fn parse_filter_key(filter_key: &str) -> Result<(&str, FilterOperator), AppError> {
    if let Some((column, suffix)) = filter_key.rsplit_once("__") {
        let operator = match suffix {
            "gte" => Some(FilterOperator::Gte),
            "lte" => Some(FilterOperator::Lte),
            "ilike" => Some(FilterOperator::ILike),
            _ => None,
        };
        if let Some(operator) = operator {
            return Ok((validate_identifier(column)?, operator));
        }
    }
    Ok((validate_identifier(filter_key)?, FilterOperator::Eq))
}

fn push_filter_clause(
    query: &mut QueryBuilder<Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    if value.is_null() {
        return Ok(());
    }
    let (column, operator) = parse_filter_key(filter_key)?;
    let filter = infer_scalar_filter(column, value)?;

    query.push(" AND t.").push(column);
    match operator {
        FilterOperator::ILike => {
            let pattern = match filter {
                ScalarFilter::Text(text) => format!("%{}%", escape_like(&text)),
                other => scalar_to_text(&other),
            };
            query.push("::text ILIKE ").push_bind(pattern);
        }
        FilterOperator::Eq | FilterOperator::Gte | FilterOperator::Lte => {
            let sql_operator = match operator {
                FilterOperator::Gte => " >= ",
                FilterOperator::Lte => " <= ",
                _ => " = ",
            };
            match filter {
                ScalarFilter::Text(text) => {
                    query.push("::text").push(sql_operator).push_bind(text);
                }
                ScalarFilter::Uuid(id) => {
                    query.push(sql_operator).push_bind(id);
                }
                ScalarFilter::Bool(flag) => {
                    query.push(sql_operator).push_bind(flag);
                }
                ScalarFilter::I64(number) => {
                    query.push(sql_operator).push_bind(number);
                }
                ScalarFilter::F64(number) => {
                    query.push(sql_operator).push_bind(number);
                }
                ScalarFilter::Date(date) => {
                    query.push(sql_operator).push_bind(date);
                }
            }
        }
    }
    Ok(())
}

/// Backslash is PostgreSQL's default LIKE escape character.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn scalar_to_text(value: &ScalarFilter) -> String {
    match value {
        ScalarFilter::Text(text) => text.clone(),
        ScalarFilter::Uuid(id) => id.to_string(),
        ScalarFilter::Bool(flag) => flag.to_string(),
        ScalarFilter::I64(number) => number.to_string(),
        ScalarFilter::F64(number) => number.to_string(),
        ScalarFilter::Date(value) => value.to_string(),
    }
}

fn infer_scalar_filter(column: &str, value: &Value) -> Result<ScalarFilter, AppError> {
    let filter = match value {
        Value::Bool(flag) => ScalarFilter::Bool(*flag),
        Value::Number(number) => number
            .as_i64()
            .map(ScalarFilter::I64)
            .or_else(|| number.as_f64().map(ScalarFilter::F64))
            .unwrap_or_else(|| ScalarFilter::Text(number.to_string())),
        Value::String(text) => {
            let trimmed = text.trim();
            if is_uuid_identifier(column) {
                let parsed = uuid::Uuid::parse_str(trimmed).map_err(|_| {
                    AppError::BadRequest(format!("Invalid {column} '{trimmed}'."))
                })?;
                ScalarFilter::Uuid(parsed)
            } else if is_date_identifier(column) {
                let parsed = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| {
                    AppError::BadRequest(format!(
                        "Invalid date '{trimmed}' for {column}; expected YYYY-MM-DD."
                    ))
                })?;
                ScalarFilter::Date(parsed)
            } else if let Some(flag) =
                parse_bool_text(trimmed).filter(|_| is_flag_identifier(column))
            {
                ScalarFilter::Bool(flag)
            } else {
                ScalarFilter::Text(trimmed.to_string())
            }
        }
        other => ScalarFilter::Text(other.to_string()),
    };
    Ok(filter)
}

fn parse_bool_text(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(true),
        "false" | "f" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn is_uuid_identifier(identifier: &str) -> bool {
    identifier == "id" || identifier.ends_with("_id")
}

fn is_date_identifier(identifier: &str) -> bool {
    identifier == "date" || identifier.ends_with("_date")
}

fn is_flag_identifier(identifier: &str) -> bool {
    identifier.starts_with("is_")
}
