use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::services::{
    block_status::BlockStatus,
    rows::{lenient_f64, round2, safe_div},
};

pub const DEFAULT_TOP_BUYERS: usize = 5;
pub const MAX_TOP_BUYERS: usize = 50;

/// Tolerance for comparing square-foot quantities.
pub const SQFT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraniteConsignmentRow {
    pub id: String,
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    pub consignment_number: Option<String>,
    #[serde(default)]
    pub arrival_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub payment_cash: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub payment_upi: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub transport_cost: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_sqft_produced: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub raw_material_cost_per_sqft: f64,
}

impl GraniteConsignmentRow {
    /// Recomputed from the payment fields rather than trusting the stored
    /// copy.
    pub fn total_expenditure(&self) -> f64 {
        total_expenditure(self.payment_cash, self.payment_upi, self.transport_cost)
    }

    pub fn avg_cost_per_sqft(&self) -> f64 {
        avg_cost_per_sqft(self.total_expenditure(), self.total_sqft_produced)
    }

    /// Cost a sale inherits when it does not name one.
    pub fn default_sale_cost_per_sqft(&self) -> f64 {
        if self.raw_material_cost_per_sqft > 0.0 {
            self.raw_material_cost_per_sqft
        } else {
            self.avg_cost_per_sqft()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockRow {
    pub id: String,
    pub consignment_id: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gross_measurement: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub net_measurement: f64,
    #[serde(default)]
    pub status: BlockStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockPartRow {
    pub id: String,
    pub block_id: String,
    #[serde(default)]
    pub part_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sqft: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sold_sqft: f64,
}

impl BlockPartRow {
    pub fn remaining_sqft(&self) -> f64 {
        self.sqft - self.sold_sqft
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleRow {
    pub block_part_id: String,
    #[serde(default)]
    pub buyer_name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sqft_sold: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rate_per_sqft: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cost_per_sqft: f64,
}

impl SaleRow {
    pub fn total_selling_price(&self) -> f64 {
        self.rate_per_sqft * self.sqft_sold
    }

    pub fn profit(&self) -> f64 {
        sale_profit(self.rate_per_sqft, self.cost_per_sqft, self.sqft_sold)
    }
}

pub fn total_expenditure(payment_cash: f64, payment_upi: f64, transport_cost: f64) -> f64 {
    payment_cash + payment_upi + transport_cost
}

pub fn avg_cost_per_sqft(total_expenditure: f64, total_sqft_produced: f64) -> f64 {
    if total_sqft_produced <= 0.0 {
        return 0.0;
    }
    safe_div(total_expenditure, total_sqft_produced)
}

pub fn elavance(gross_measurement: f64, net_measurement: f64) -> f64 {
    gross_measurement - net_measurement
}

/// Negative when selling below cost; losses are reported, not clamped.
pub fn sale_profit(rate_per_sqft: f64, cost_per_sqft: f64, sqft_sold: f64) -> f64 {
    (rate_per_sqft - cost_per_sqft) * sqft_sold
}

/// Server-managed counters written to `granite_block_parts` whenever the
/// size or the sold quantity of a part changes.
pub fn block_part_counters(sqft: f64, sold_sqft: f64) -> Map<String, Value> {
    let remaining = sqft - sold_sqft;
    let mut counters = Map::new();
    counters.insert("sold_sqft".to_string(), json!(round2(sold_sqft)));
    counters.insert("remaining_sqft".to_string(), json!(round2(remaining)));
    counters.insert("is_available".to_string(), json!(remaining > SQFT_EPSILON));
    counters
}

/// Everything the aggregator needs, fetched flat and joined here.
#[derive(Debug, Clone, Copy)]
pub struct GraniteSnapshot<'a> {
    pub consignments: &'a [GraniteConsignmentRow],
    pub blocks: &'a [BlockRow],
    pub parts: &'a [BlockPartRow],
    pub sales: &'a [SaleRow],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductionFigures {
    pub total_expenditure: f64,
    pub total_sqft_produced: f64,
    pub avg_cost_per_sqft: f64,
    pub block_count: usize,
    pub gross_measurement: f64,
    pub net_measurement: f64,
    pub elavance: f64,
    pub part_sqft: f64,
    pub sold_sqft: f64,
    pub remaining_sqft: f64,
    pub sale_count: usize,
    pub revenue: f64,
    pub cost_of_sales: f64,
    pub profit: f64,
    pub profit_per_sqft: f64,
    pub margin_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsignmentSummary {
    pub consignment_id: String,
    pub consignment_number: Option<String>,
    pub supplier_id: Option<String>,
    pub arrival_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub figures: ProductionFigures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraniteTotals {
    pub consignment_count: usize,
    #[serde(flatten)]
    pub figures: ProductionFigures,
    pub blocks_by_status: BTreeMap<BlockStatus, usize>,
}

#[derive(Debug, Default)]
struct Accumulator {
    total_expenditure: f64,
    total_sqft_produced: f64,
    block_count: usize,
    gross_measurement: f64,
    net_measurement: f64,
    part_sqft: f64,
    part_remaining_sqft: f64,
    sold_sqft: f64,
    sale_count: usize,
    revenue: f64,
    cost_of_sales: f64,
}

impl Accumulator {
    fn add_consignment(&mut self, consignment: &GraniteConsignmentRow) {
        self.total_expenditure += consignment.total_expenditure();
        self.total_sqft_produced += consignment.total_sqft_produced;
    }

    fn add_block(&mut self, block: &BlockRow) {
        self.block_count += 1;
        self.gross_measurement += block.gross_measurement;
        self.net_measurement += block.net_measurement;
    }

    fn add_part(&mut self, part: &BlockPartRow) {
        self.part_sqft += part.sqft;
        self.part_remaining_sqft += part.remaining_sqft();
    }

    fn add_sale(&mut self, sale: &SaleRow) {
        self.sale_count += 1;
        self.sold_sqft += sale.sqft_sold;
        self.revenue += sale.total_selling_price();
        self.cost_of_sales += sale.cost_per_sqft * sale.sqft_sold;
    }

    fn finish(self) -> ProductionFigures {
        let profit = self.revenue - self.cost_of_sales;
        ProductionFigures {
            total_expenditure: round2(self.total_expenditure),
            total_sqft_produced: round2(self.total_sqft_produced),
            avg_cost_per_sqft: round2(avg_cost_per_sqft(
                self.total_expenditure,
                self.total_sqft_produced,
            )),
            block_count: self.block_count,
            gross_measurement: round2(self.gross_measurement),
            net_measurement: round2(self.net_measurement),
            elavance: round2(elavance(self.gross_measurement, self.net_measurement)),
            part_sqft: round2(self.part_sqft),
            sold_sqft: round2(self.sold_sqft),
            remaining_sqft: round2(self.part_remaining_sqft),
            sale_count: self.sale_count,
            revenue: round2(self.revenue),
            cost_of_sales: round2(self.cost_of_sales),
            profit: round2(profit),
            profit_per_sqft: round2(safe_div(profit, self.sold_sqft)),
            margin_percent: round2(safe_div(profit * 100.0, self.revenue)),
        }
    }
}

/// Resolves part → block → consignment for every sale; unresolvable rows
/// are left out of per-consignment figures.
struct Joins<'a> {
    block_consignment: HashMap<&'a str, &'a str>,
    part_block: HashMap<&'a str, &'a str>,
}

impl<'a> Joins<'a> {
    fn new(snapshot: &GraniteSnapshot<'a>) -> Self {
        Self {
            block_consignment: snapshot
                .blocks
                .iter()
                .map(|block| (block.id.as_str(), block.consignment_id.as_str()))
                .collect(),
            part_block: snapshot
                .parts
                .iter()
                .map(|part| (part.id.as_str(), part.block_id.as_str()))
                .collect(),
        }
    }

    fn part_consignment(&self, part_id: &str) -> Option<&'a str> {
        let block_id = self.part_block.get(part_id)?;
        self.block_consignment.get(block_id).copied()
    }
}

pub fn summarize_consignments(snapshot: &GraniteSnapshot<'_>) -> Vec<ConsignmentSummary> {
    let joins = Joins::new(snapshot);
    let mut accumulators: HashMap<&str, Accumulator> = snapshot
        .consignments
        .iter()
        .map(|consignment| {
            let mut acc = Accumulator::default();
            acc.add_consignment(consignment);
            (consignment.id.as_str(), acc)
        })
        .collect();

    for block in snapshot.blocks {
        if let Some(acc) = accumulators.get_mut(block.consignment_id.as_str()) {
            acc.add_block(block);
        }
    }
    for part in snapshot.parts {
        let consignment_id = joins.block_consignment.get(part.block_id.as_str());
        if let Some(acc) = consignment_id.and_then(|id| accumulators.get_mut(id)) {
            acc.add_part(part);
        }
    }
    for sale in snapshot.sales {
        let consignment_id = joins.part_consignment(&sale.block_part_id);
        if let Some(acc) = consignment_id.and_then(|id| accumulators.get_mut(id)) {
            acc.add_sale(sale);
        }
    }

    snapshot
        .consignments
        .iter()
        .filter_map(|consignment| {
            let acc = accumulators.remove(consignment.id.as_str())?;
            Some(ConsignmentSummary {
                consignment_id: consignment.id.clone(),
                consignment_number: consignment.consignment_number.clone(),
                supplier_id: consignment.supplier_id.clone(),
                arrival_date: consignment.arrival_date,
                figures: acc.finish(),
            })
        })
        .collect()
}

/// Figures across everything in the snapshot. Unlike the per-consignment
/// view, orphan blocks, parts and sales still count here.
pub fn granite_totals(snapshot: &GraniteSnapshot<'_>) -> GraniteTotals {
    let mut acc = Accumulator::default();
    snapshot
        .consignments
        .iter()
        .for_each(|item| acc.add_consignment(item));
    snapshot.blocks.iter().for_each(|item| acc.add_block(item));
    snapshot.parts.iter().for_each(|item| acc.add_part(item));
    snapshot.sales.iter().for_each(|item| acc.add_sale(item));

    let mut blocks_by_status = BTreeMap::new();
    for block in snapshot.blocks {
        *blocks_by_status.entry(block.status).or_insert(0) += 1;
    }

    GraniteTotals {
        consignment_count: snapshot.consignments.len(),
        figures: acc.finish(),
        blocks_by_status,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyerSort {
    #[default]
    Amount,
    Profit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyerRanking {
    pub buyer_name: String,
    pub sales_count: usize,
    pub sqft_purchased: f64,
    pub total_amount: f64,
    pub total_profit: f64,
    pub avg_rate: f64,
}

/// Groups sales by buyer (trimmed, case-insensitive; the first spelling
/// seen is kept) and returns the top `limit` by the chosen measure.
pub fn rank_buyers(sales: &[SaleRow], sort: BuyerSort, limit: usize) -> Vec<BuyerRanking> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, BuyerRanking> = HashMap::new();

    for sale in sales {
        let display = sale.buyer_name.trim();
        if display.is_empty() {
            continue;
        }
        let key = display.to_lowercase();
        let entry = totals.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            BuyerRanking {
                buyer_name: display.to_string(),
                sales_count: 0,
                sqft_purchased: 0.0,
                total_amount: 0.0,
                total_profit: 0.0,
                avg_rate: 0.0,
            }
        });
        entry.sales_count += 1;
        entry.sqft_purchased += sale.sqft_sold;
        entry.total_amount += sale.total_selling_price();
        entry.total_profit += sale.profit();
    }

    let mut ranking = order
        .into_iter()
        .filter_map(|key| totals.remove(&key))
        .map(|mut buyer| {
            buyer.avg_rate = round2(safe_div(buyer.total_amount, buyer.sqft_purchased));
            buyer.sqft_purchased = round2(buyer.sqft_purchased);
            buyer.total_amount = round2(buyer.total_amount);
            buyer.total_profit = round2(buyer.total_profit);
            buyer
        })
        .collect::<Vec<_>>();

    ranking.sort_by(|left, right| {
        let (left_key, right_key) = match sort {
            BuyerSort::Amount => (left.total_amount, right.total_amount),
            BuyerSort::Profit => (left.total_profit, right.total_profit),
        };
        right_key
            .total_cmp(&left_key)
            .then_with(|| left.buyer_name.cmp(&right.buyer_name))
    });
    ranking.truncate(limit.clamp(1, MAX_TOP_BUYERS));
    ranking
}
