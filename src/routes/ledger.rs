use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    extract::{ApiJson, ApiQuery},
    repository::table_service::{
        create_row, delete_row, get_row, list_rows, update_row, RowFilters, MAX_LIST_ROWS,
    },
    schemas::{
        into_patch, parse_date, remove_nulls, serialize_to_map, validate_input,
        ConsignmentsQuery, CreateConsignmentInput, CreateTransactionInput, IdQuery,
        TransactionsQuery, UpdateConsignmentInput, UpdateTransactionInput,
    },
    services::{
        receivables::{resolve_consignment_total, LedgerConsignment},
        rows::decode_row,
    },
    state::AppState,
};

pub const CONSIGNMENTS_TABLE: &str = "consignments";
pub const TRANSACTIONS_TABLE: &str = "transactions";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/consignments",
            get(list_consignments)
                .post(create_consignment)
                .put(update_consignment)
                .delete(delete_consignment),
        )
        .route(
            "/transactions",
            get(list_transactions)
                .post(create_transaction)
                .put(update_transaction)
                .delete(delete_transaction),
        )
}

async fn list_consignments(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ConsignmentsQuery>,
) -> AppResult<Json<Value>> {
    let filters = RowFilters::new()
        .eq("customer_id", query.customer_id.as_deref())
        .date_range("date", query.from.as_deref(), query.to.as_deref());
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let rows = list_rows(
        pool,
        CONSIGNMENTS_TABLE,
        filters.as_map(),
        "date",
        false,
        Some(MAX_LIST_ROWS),
    )
    .await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_consignment(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateConsignmentInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    parse_date("date", &payload.date)?;
    let total = resolve_consignment_total(
        payload.total,
        payload.rtgs_expected,
        payload.cash_expected,
    )?;
    let pool = state.write_pool()?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert("total".to_string(), json!(total));
    let created = create_row(pool, CONSIGNMENTS_TABLE, &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// The split invariant is checked against the stored row merged with the
/// patch, so partial updates cannot break it.
async fn update_consignment(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateConsignmentInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    if let Some(date) = payload.date.as_deref() {
        parse_date("date", date)?;
    }
    let pool = state.write_pool()?;
    let (id, mut patch) = into_patch(&payload)?;

    let touches_amounts = payload.total.is_some()
        || payload.rtgs_expected.is_some()
        || payload.cash_expected.is_some();
    if touches_amounts {
        let existing: LedgerConsignment =
            decode_row(CONSIGNMENTS_TABLE, get_row(pool, CONSIGNMENTS_TABLE, &id).await?)?;
        let rtgs_expected = payload.rtgs_expected.unwrap_or(existing.rtgs_expected);
        let cash_expected = payload.cash_expected.unwrap_or(existing.cash_expected);
        // A split change without a new total re-derives the total.
        let total = resolve_consignment_total(payload.total, rtgs_expected, cash_expected)?;
        patch.insert("total".to_string(), json!(total));
    }

    let updated = update_row(pool, CONSIGNMENTS_TABLE, &id, &patch).await?;
    Ok(Json(updated))
}

async fn delete_consignment(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.write_pool()?;
    let deleted = delete_row(pool, CONSIGNMENTS_TABLE, &query.id).await?;
    Ok(Json(deleted))
}

async fn list_transactions(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TransactionsQuery>,
) -> AppResult<Json<Value>> {
    let filters = RowFilters::new()
        .eq("customer_id", query.customer_id.as_deref())
        .eq("mode", query.mode.map(|mode| mode.as_str()))
        .eq("account_id", query.account_id.as_deref())
        .date_range("date", query.from.as_deref(), query.to.as_deref());
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let rows = list_rows(
        pool,
        TRANSACTIONS_TABLE,
        filters.as_map(),
        "date",
        false,
        Some(MAX_LIST_ROWS),
    )
    .await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_transaction(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateTransactionInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    parse_date("date", &payload.date)?;
    let pool = state.write_pool()?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, TRANSACTIONS_TABLE, &record).await?;
    tracing::info!(
        customer_id = %payload.customer_id,
        mode = payload.mode.as_str(),
        amount = payload.amount,
        "Payment recorded"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_transaction(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateTransactionInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    if let Some(date) = payload.date.as_deref() {
        parse_date("date", date)?;
    }
    let pool = state.write_pool()?;

    let (id, patch) = into_patch(&payload)?;
    let updated = update_row(pool, TRANSACTIONS_TABLE, &id, &patch).await?;
    Ok(Json(updated))
}

async fn delete_transaction(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.write_pool()?;
    let deleted = delete_row(pool, TRANSACTIONS_TABLE, &query.id).await?;
    Ok(Json(deleted))
}
