use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    extract::{ApiJson, ApiQuery},
    repository::table_service::{
        create_row, delete_row, get_row, list_rows, update_row, RowFilters, MAX_LIST_ROWS,
    },
    schemas::{
        into_patch, parse_date, remove_nulls, serialize_to_map, validate_input, BlockPartsQuery,
        BlocksQuery, CreateBlockInput, CreateBlockPartInput, CreateGraniteConsignmentInput,
        GraniteConsignmentsQuery, IdQuery, UpdateBlockInput, UpdateBlockPartInput,
        UpdateGraniteConsignmentInput,
    },
    services::{
        granite::{
            block_part_counters, elavance, total_expenditure, BlockRow, GraniteConsignmentRow,
        },
        rows::{decode_row, round2},
        sales::{update_block_part, PARTS_TABLE},
    },
    state::AppState,
};

pub const CONSIGNMENTS_TABLE: &str = "granite_consignments";
pub const BLOCKS_TABLE: &str = "granite_blocks";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/granite/consignments",
            get(list_consignments)
                .post(create_consignment)
                .put(update_consignment)
                .delete(delete_consignment),
        )
        .route(
            "/granite/blocks",
            get(list_blocks)
                .post(create_block)
                .put(update_block)
                .delete(delete_block),
        )
        .route(
            "/granite/block-parts",
            get(list_block_parts)
                .post(create_block_part)
                .put(update_block_part_handler)
                .delete(delete_block_part),
        )
}

async fn list_consignments(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<GraniteConsignmentsQuery>,
) -> AppResult<Json<Value>> {
    let filters = RowFilters::new()
        .eq("supplier_id", query.supplier_id.as_deref())
        .date_range("arrival_date", query.from.as_deref(), query.to.as_deref());
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let rows = list_rows(
        pool,
        CONSIGNMENTS_TABLE,
        filters.as_map(),
        "arrival_date",
        false,
        Some(MAX_LIST_ROWS),
    )
    .await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_consignment(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateGraniteConsignmentInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    parse_date("arrival_date", &payload.arrival_date)?;
    let pool = state.write_pool()?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert(
        "total_expenditure".to_string(),
        json!(round2(total_expenditure(
            payload.payment_cash,
            payload.payment_upi,
            payload.transport_cost,
        ))),
    );
    let created = create_row(pool, CONSIGNMENTS_TABLE, &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_consignment(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateGraniteConsignmentInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    if let Some(arrival_date) = payload.arrival_date.as_deref() {
        parse_date("arrival_date", arrival_date)?;
    }
    let pool = state.write_pool()?;
    let (id, mut patch) = into_patch(&payload)?;

    let touches_payments = payload.payment_cash.is_some()
        || payload.payment_upi.is_some()
        || payload.transport_cost.is_some();
    if touches_payments {
        let existing: GraniteConsignmentRow =
            decode_row(CONSIGNMENTS_TABLE, get_row(pool, CONSIGNMENTS_TABLE, &id).await?)?;
        let total = total_expenditure(
            payload.payment_cash.unwrap_or(existing.payment_cash),
            payload.payment_upi.unwrap_or(existing.payment_upi),
            payload.transport_cost.unwrap_or(existing.transport_cost),
        );
        patch.insert("total_expenditure".to_string(), json!(round2(total)));
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

async fn list_blocks(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BlocksQuery>,
) -> AppResult<Json<Value>> {
    let filters = RowFilters::new()
        .eq("consignment_id", query.consignment_id.as_deref())
        .eq("status", query.status.map(|status| status.as_str()));
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let rows = list_rows(
        pool,
        BLOCKS_TABLE,
        filters.as_map(),
        "block_no",
        true,
        Some(MAX_LIST_ROWS),
    )
    .await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_block(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateBlockInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    ensure_net_within_gross(payload.gross_measurement, payload.net_measurement)?;
    payload.status.ensure_initial()?;
    let pool = state.write_pool()?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert(
        "elavance".to_string(),
        json!(round2(elavance(
            payload.gross_measurement,
            payload.net_measurement
        ))),
    );
    let created = create_row(pool, BLOCKS_TABLE, &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_block(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateBlockInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = state.write_pool()?;
    let (id, mut patch) = into_patch(&payload)?;

    let existing: BlockRow = decode_row(BLOCKS_TABLE, get_row(pool, BLOCKS_TABLE, &id).await?)?;
    if let Some(next) = payload.status {
        existing.status.ensure_transition(next)?;
    }
    let gross = payload.gross_measurement.unwrap_or(existing.gross_measurement);
    let net = payload.net_measurement.unwrap_or(existing.net_measurement);
    ensure_net_within_gross(gross, net)?;

    patch.insert("elavance".to_string(), json!(round2(elavance(gross, net))));

    let updated = update_row(pool, BLOCKS_TABLE, &id, &patch).await?;
    if let Some(next) = payload.status.filter(|next| *next != existing.status) {
        tracing::info!(
            block_id = %id,
            from = existing.status.as_str(),
            to = next.as_str(),
            "Block status changed"
        );
    }
    Ok(Json(updated))
}

async fn delete_block(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.write_pool()?;
    let deleted = delete_row(pool, BLOCKS_TABLE, &query.id).await?;
    Ok(Json(deleted))
}

async fn list_block_parts(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BlockPartsQuery>,
) -> AppResult<Json<Value>> {
    let filters = RowFilters::new()
        .eq("block_id", query.block_id.as_deref())
        .flag("is_available", query.is_available);
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let rows = list_rows(
        pool,
        PARTS_TABLE,
        filters.as_map(),
        "part_name",
        true,
        Some(MAX_LIST_ROWS),
    )
    .await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_block_part(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateBlockPartInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    let pool = state.write_pool()?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.extend(block_part_counters(payload.sqft, 0.0));
    let created = create_row(pool, PARTS_TABLE, &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_block_part_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateBlockPartInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = state.write_pool()?;
    let updated = update_block_part(pool, &payload).await?;
    Ok(Json(updated))
}

async fn delete_block_part(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.write_pool()?;
    let deleted = delete_row(pool, PARTS_TABLE, &query.id).await?;
    Ok(Json(deleted))
}

fn ensure_net_within_gross(gross: f64, net: f64) -> Result<(), AppError> {
    if net > gross {
        return Err(AppError::BadRequest(format!(
            "net_measurement ({net}) cannot exceed gross_measurement ({gross})."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::ensure_net_within_gross;

    #[test]
    fn net_may_not_exceed_gross() {
        assert!(ensure_net_within_gross(12.0, 10.5).is_ok());
        assert!(ensure_net_within_gross(10.0, 10.0).is_ok());
        assert!(ensure_net_within_gross(10.0, 10.5).is_err());
    }
}
