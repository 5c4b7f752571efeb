use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    error::AppResult,
    extract::{ApiJson, ApiQuery},
    repository::table_service::{list_rows, RowFilters, MAX_LIST_ROWS},
    routes::granite::{BLOCKS_TABLE, CONSIGNMENTS_TABLE},
    schemas::{
        validate_input, ConsignmentSummaryQuery, CreateSaleInput, IdQuery, PeriodQuery,
        SalesQuery, TopBuyersQuery, UpdateSaleInput,
    },
    services::{
        granite::{
            granite_totals, rank_buyers, summarize_consignments, BlockPartRow, BlockRow,
            GraniteConsignmentRow, GraniteSnapshot, GraniteTotals, SaleRow, DEFAULT_TOP_BUYERS,
        },
        rows::decode_rows,
        sales::{amend_sale, delete_sale, record_sale, PARTS_TABLE, SALES_TABLE},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/granite/sales",
            get(list_sales)
                .post(create_sale)
                .put(update_sale)
                .delete(remove_sale),
        )
        .route("/granite/buyers/top", get(top_buyers))
        .route("/granite/summary", get(granite_summary))
        .route("/granite/consignments/summary", get(consignment_summary))
}

/// Owned rows behind a `GraniteSnapshot`.
#[derive(Default)]
pub struct GraniteData {
    pub consignments: Vec<GraniteConsignmentRow>,
    pub blocks: Vec<BlockRow>,
    pub parts: Vec<BlockPartRow>,
    pub sales: Vec<SaleRow>,
}

impl GraniteData {
    pub fn snapshot(&self) -> GraniteSnapshot<'_> {
        GraniteSnapshot {
            consignments: &self.consignments,
            blocks: &self.blocks,
            parts: &self.parts,
            sales: &self.sales,
        }
    }
}

/// Production figures are all-time; only sales honour the date window.
pub async fn load_granite(
    pool: &PgPool,
    from: Option<&str>,
    to: Option<&str>,
) -> AppResult<GraniteData> {
    let no_filters = Map::new();
    let consignments =
        list_rows(pool, CONSIGNMENTS_TABLE, &no_filters, "arrival_date", true, None).await?;
    let blocks = list_rows(pool, BLOCKS_TABLE, &no_filters, "created_at", true, None).await?;
    let parts = list_rows(pool, PARTS_TABLE, &no_filters, "created_at", true, None).await?;
    let sales = load_sales(pool, from, to).await?;

    Ok(GraniteData {
        consignments: decode_rows(CONSIGNMENTS_TABLE, consignments),
        blocks: decode_rows(BLOCKS_TABLE, blocks),
        parts: decode_rows(PARTS_TABLE, parts),
        sales,
    })
}

pub async fn load_sales(
    pool: &PgPool,
    from: Option<&str>,
    to: Option<&str>,
) -> AppResult<Vec<SaleRow>> {
    let filters = RowFilters::new().date_range("sale_date", from, to);
    let rows = list_rows(pool, SALES_TABLE, filters.as_map(), "sale_date", true, None).await?;
    Ok(decode_rows(SALES_TABLE, rows))
}

async fn list_sales(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SalesQuery>,
) -> AppResult<Json<Value>> {
    let filters = RowFilters::new()
        .eq("block_part_id", query.block_part_id.as_deref())
        .contains("buyer_name", query.buyer_name.as_deref())
        .date_range("sale_date", query.from.as_deref(), query.to.as_deref());
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let rows = list_rows(
        pool,
        SALES_TABLE,
        filters.as_map(),
        "sale_date",
        false,
        Some(MAX_LIST_ROWS),
    )
    .await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_sale(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateSaleInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    let pool = state.write_pool()?;
    let created = record_sale(pool, &payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_sale(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateSaleInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = state.write_pool()?;
    let updated = amend_sale(pool, &payload).await?;
    Ok(Json(updated))
}

async fn remove_sale(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.write_pool()?;
    let deleted = delete_sale(pool, &query.id).await?;
    Ok(Json(deleted))
}

async fn top_buyers(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TopBuyersQuery>,
) -> AppResult<Json<Value>> {
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let sales = load_sales(pool, query.from.as_deref(), query.to.as_deref()).await?;
    let ranking = rank_buyers(
        &sales,
        query.sort_by.unwrap_or_default(),
        query.limit.unwrap_or(DEFAULT_TOP_BUYERS),
    );
    Ok(Json(json!(ranking)))
}

async fn granite_summary(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> AppResult<Json<GraniteTotals>> {
    let data = match state.read_pool() {
        Some(pool) => load_granite(pool, query.from.as_deref(), query.to.as_deref()).await?,
        None => GraniteData::default(),
    };
    Ok(Json(granite_totals(&data.snapshot())))
}

async fn consignment_summary(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ConsignmentSummaryQuery>,
) -> AppResult<Json<Value>> {
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let mut data = load_granite(pool, None, None).await?;
    if let Some(consignment_id) = query
        .consignment_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        data.consignments
            .retain(|consignment| consignment.id == consignment_id);
    }
    Ok(Json(json!(summarize_consignments(&data.snapshot()))))
}

#[cfg(test)]
mod tests {
    use super::GraniteData;
    use crate::services::granite::granite_totals;

    #[test]
    fn empty_data_gives_zeroed_totals() {
        let totals = granite_totals(&GraniteData::default().snapshot());
        assert_eq!(totals.consignment_count, 0);
        assert_eq!(totals.figures.revenue, 0.0);
        assert_eq!(totals.figures.avg_cost_per_sqft, 0.0);
        assert!(totals.blocks_by_status.is_empty());
    }
}
