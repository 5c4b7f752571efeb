use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{
    error::AppResult,
    extract::ApiQuery,
    routes::{
        expenses::load_expense_summary,
        receivables::{load_ledger, LedgerSnapshot},
        sales::{load_granite, GraniteData},
    },
    schemas::PeriodQuery,
    services::{
        expenses::ExpenseSummary,
        granite::{
            granite_totals, rank_buyers, BuyerRanking, BuyerSort, GraniteTotals,
            DEFAULT_TOP_BUYERS,
        },
        receivables::ReceivablesSummary,
        rows::round2,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

#[derive(Debug, Serialize)]
struct Dashboard {
    receivables: ReceivablesSummary,
    granite: GraniteTotals,
    top_buyers: Vec<BuyerRanking>,
    expense_total: f64,
    net_operating_profit: f64,
}

impl Dashboard {
    fn build(ledger: &LedgerSnapshot, granite: &GraniteData, expenses: &ExpenseSummary) -> Self {
        let totals = granite_totals(&granite.snapshot());
        let net_operating_profit = round2(totals.figures.profit - expenses.total_amount);
        Self {
            receivables: ledger.summary(),
            top_buyers: rank_buyers(&granite.sales, BuyerSort::Amount, DEFAULT_TOP_BUYERS),
            granite: totals,
            expense_total: expenses.total_amount,
            net_operating_profit,
        }
    }
}

async fn dashboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> AppResult<Json<Dashboard>> {
    let (from, to) = (query.from.as_deref(), query.to.as_deref());
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Dashboard::build(
            &LedgerSnapshot::empty(),
            &GraniteData::default(),
            &ExpenseSummary::default(),
        )));
    };

    let ledger = load_ledger(pool, None, from, to).await?;
    let granite = load_granite(pool, from, to).await?;
    let expenses = load_expense_summary(pool, from, to).await?;
    Ok(Json(Dashboard::build(&ledger, &granite, &expenses)))
}

#[cfg(test)]
mod tests {
    use super::Dashboard;
    use crate::{
        routes::{receivables::LedgerSnapshot, sales::GraniteData},
        services::{expenses::ExpenseSummary, granite::SaleRow},
    };

    #[test]
    fn operating_profit_subtracts_expenses_from_sales_profit() {
        let granite = GraniteData {
            sales: vec![SaleRow {
                block_part_id: "p1".to_string(),
                buyer_name: "Kaveri Traders".to_string(),
                sqft_sold: 100.0,
                rate_per_sqft: 150.0,
                cost_per_sqft: 100.0,
            }],
            ..GraniteData::default()
        };
        let expenses = ExpenseSummary {
            total_amount: 1_200.0,
            count: 2,
            ..ExpenseSummary::default()
        };

        let dashboard = Dashboard::build(&LedgerSnapshot::empty(), &granite, &expenses);
        assert_eq!(dashboard.granite.figures.profit, 5_000.0);
        assert_eq!(dashboard.net_operating_profit, 3_800.0);
        assert_eq!(dashboard.top_buyers.len(), 1);
        assert_eq!(dashboard.receivables.receivable_total, 0.0);
    }
}
