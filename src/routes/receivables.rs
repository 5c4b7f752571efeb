use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    error::AppResult,
    extract::ApiQuery,
    repository::table_service::{get_row, list_rows, RowFilters},
    routes::ledger::{CONSIGNMENTS_TABLE, TRANSACTIONS_TABLE},
    schemas::{ConsignmentsQuery, PeriodQuery, StatementQuery},
    services::{
        receivables::{
            customer_statement, receivables_by_customer, summarize_receivables, CustomerRef,
            LedgerConsignment, LedgerTransaction, ReceivablesSummary,
        },
        rows::decode_rows,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/receivables", get(get_receivables))
        .route("/receivables/customers", get(get_customer_receivables))
        .route("/customers/statement", get(get_customer_statement))
}

/// Consignments and payments for one customer (or everyone), restricted to
/// an inclusive date window.
pub struct LedgerSnapshot {
    pub consignments: Vec<LedgerConsignment>,
    pub transactions: Vec<LedgerTransaction>,
}

impl LedgerSnapshot {
    pub fn empty() -> Self {
        Self {
            consignments: Vec::new(),
            transactions: Vec::new(),
        }
    }

    pub fn summary(&self) -> ReceivablesSummary {
        summarize_receivables(&self.consignments, &self.transactions)
    }
}

pub async fn load_ledger(
    pool: &PgPool,
    customer_id: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> AppResult<LedgerSnapshot> {
    let filters = RowFilters::new()
        .eq("customer_id", customer_id)
        .date_range("date", from, to);

    let consignments = list_rows(
        pool,
        CONSIGNMENTS_TABLE,
        filters.as_map(),
        "date",
        true,
        None,
    )
    .await?;
    let transactions = list_rows(
        pool,
        TRANSACTIONS_TABLE,
        filters.as_map(),
        "date",
        true,
        None,
    )
    .await?;

    Ok(LedgerSnapshot {
        consignments: decode_rows(CONSIGNMENTS_TABLE, consignments),
        transactions: decode_rows(TRANSACTIONS_TABLE, transactions),
    })
}

async fn get_receivables(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ConsignmentsQuery>,
) -> AppResult<Json<ReceivablesSummary>> {
    let Some(pool) = state.read_pool() else {
        return Ok(Json(ReceivablesSummary::default()));
    };
    let ledger = load_ledger(
        pool,
        query.customer_id.as_deref(),
        query.from.as_deref(),
        query.to.as_deref(),
    )
    .await?;
    Ok(Json(ledger.summary()))
}

async fn get_customer_receivables(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> AppResult<Json<Value>> {
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let customers: Vec<CustomerRef> = decode_rows(
        "customers",
        list_rows(pool, "customers", &Map::new(), "name", true, None).await?,
    );
    let ledger = load_ledger(pool, None, query.from.as_deref(), query.to.as_deref()).await?;

    let breakdown =
        receivables_by_customer(&customers, &ledger.consignments, &ledger.transactions);
    Ok(Json(json!(breakdown)))
}

async fn get_customer_statement(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StatementQuery>,
) -> AppResult<Json<Value>> {
    let Some(pool) = state.read_pool() else {
        return Ok(Json(json!({
            "customer": Value::Null,
            "summary": ReceivablesSummary::default(),
            "lines": [],
        })));
    };
    let customer = get_row(pool, "customers", &query.customer_id).await?;
    let ledger = load_ledger(
        pool,
        Some(query.customer_id.as_str()),
        query.from.as_deref(),
        query.to.as_deref(),
    )
    .await?;

    Ok(Json(json!({
        "customer": customer,
        "summary": ledger.summary(),
        "lines": customer_statement(&ledger.consignments, &ledger.transactions),
    })))
}
