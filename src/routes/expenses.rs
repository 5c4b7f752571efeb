use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    error::AppResult,
    extract::{ApiJson, ApiQuery},
    repository::table_service::{
        create_row, delete_row, get_row, list_rows, update_row, RowFilters, MAX_LIST_ROWS,
    },
    schemas::{
        into_patch, parse_date, remove_nulls, serialize_to_map, validate_input,
        CreateExpenseInput, CreateExpenseItemInput, ExpenseItemsQuery, ExpensesQuery, IdQuery,
        PeriodQuery, UpdateExpenseInput, UpdateExpenseItemInput,
    },
    services::{
        expenses::{
            expense_item_amount, summarize_expenses, ExpenseLookups, ExpenseRow, ExpenseSummary,
            NamedRow,
        },
        rows::{decode_row, decode_rows, lenient_f64},
    },
    state::AppState,
};

const EXPENSES_TABLE: &str = "expenses";
const ITEMS_TABLE: &str = "expense_items";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/expenses",
            get(list_expenses)
                .post(create_expense)
                .put(update_expense)
                .delete(delete_expense),
        )
        .route("/expenses/summary", get(expense_summary))
        .route(
            "/expense-items",
            get(list_expense_items)
                .post(create_expense_item)
                .put(update_expense_item)
                .delete(delete_expense_item),
        )
}

#[derive(Debug, Deserialize)]
struct StoredItem {
    #[serde(default, deserialize_with = "lenient_f64")]
    quantity: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    unit_price: f64,
}

async fn list_expenses(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ExpensesQuery>,
) -> AppResult<Json<Value>> {
    let filters = RowFilters::new()
        .eq("category_id", query.category_id.as_deref())
        .eq("vendor_id", query.vendor_id.as_deref())
        .eq("account_id", query.account_id.as_deref())
        .date_range("expense_date", query.from.as_deref(), query.to.as_deref());
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let rows = list_rows(
        pool,
        EXPENSES_TABLE,
        filters.as_map(),
        "expense_date",
        false,
        Some(MAX_LIST_ROWS),
    )
    .await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_expense(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateExpenseInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    parse_date("expense_date", &payload.expense_date)?;
    let pool = state.write_pool()?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, EXPENSES_TABLE, &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_expense(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateExpenseInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    if let Some(expense_date) = payload.expense_date.as_deref() {
        parse_date("expense_date", expense_date)?;
    }
    let pool = state.write_pool()?;

    let (id, patch) = into_patch(&payload)?;
    let updated = update_row(pool, EXPENSES_TABLE, &id, &patch).await?;
    Ok(Json(updated))
}

async fn delete_expense(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.write_pool()?;
    let deleted = delete_row(pool, EXPENSES_TABLE, &query.id).await?;
    Ok(Json(deleted))
}

pub async fn load_expense_summary(
    pool: &PgPool,
    from: Option<&str>,
    to: Option<&str>,
) -> AppResult<ExpenseSummary> {
    let filters = RowFilters::new().date_range("expense_date", from, to);
    let expenses: Vec<ExpenseRow> = decode_rows(
        EXPENSES_TABLE,
        list_rows(pool, EXPENSES_TABLE, filters.as_map(), "expense_date", true, None).await?,
    );
    let categories = load_names(pool, "expense_categories").await?;
    let vendors = load_names(pool, "vendors").await?;
    let accounts = load_names(pool, "expense_accounts").await?;

    Ok(summarize_expenses(
        &expenses,
        ExpenseLookups {
            categories: &categories,
            vendors: &vendors,
            accounts: &accounts,
        },
    ))
}

async fn load_names(pool: &PgPool, table: &str) -> AppResult<Vec<NamedRow>> {
    let rows = list_rows(pool, table, &Map::new(), "name", true, None).await?;
    Ok(decode_rows(table, rows))
}

async fn expense_summary(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> AppResult<Json<ExpenseSummary>> {
    let Some(pool) = state.read_pool() else {
        return Ok(Json(ExpenseSummary::default()));
    };
    let summary = load_expense_summary(pool, query.from.as_deref(), query.to.as_deref()).await?;
    Ok(Json(summary))
}

async fn list_expense_items(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ExpenseItemsQuery>,
) -> AppResult<Json<Value>> {
    let filters = RowFilters::new().eq("expense_id", query.expense_id.as_deref());
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let rows = list_rows(
        pool,
        ITEMS_TABLE,
        filters.as_map(),
        "created_at",
        true,
        Some(MAX_LIST_ROWS),
    )
    .await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_expense_item(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateExpenseItemInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    let pool = state.write_pool()?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert(
        "amount".to_string(),
        json!(expense_item_amount(payload.quantity, payload.unit_price)),
    );
    let created = create_row(pool, ITEMS_TABLE, &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_expense_item(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateExpenseItemInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = state.write_pool()?;
    let (id, mut patch) = into_patch(&payload)?;

    if payload.quantity.is_some() || payload.unit_price.is_some() {
        let existing: StoredItem = decode_row(ITEMS_TABLE, get_row(pool, ITEMS_TABLE, &id).await?)?;
        let amount = expense_item_amount(
            payload.quantity.unwrap_or(existing.quantity),
            payload.unit_price.unwrap_or(existing.unit_price),
        );
        patch.insert("amount".to_string(), json!(amount));
    }

    let updated = update_row(pool, ITEMS_TABLE, &id, &patch).await?;
    Ok(Json(updated))
}

async fn delete_expense_item(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.write_pool()?;
    let deleted = delete_row(pool, ITEMS_TABLE, &query.id).await?;
    Ok(Json(deleted))
}
