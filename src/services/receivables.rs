use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    services::rows::{lenient_f64, round2},
};

/// Largest gap tolerated between a consignment total and its RTGS/cash split.
pub const SPLIT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMode {
    #[serde(alias = "rtgs", alias = "Rtgs")]
    Rtgs,
    #[serde(alias = "cash", alias = "Cash")]
    Cash,
}

impl PaymentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rtgs => "RTGS",
            Self::Cash => "CASH",
        }
    }
}

/// Expected amounts recorded against a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConsignment {
    #[serde(default)]
    pub id: String,
    pub customer_id: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rtgs_expected: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cash_expected: f64,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// A payment received from a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerTransaction {
    #[serde(default)]
    pub id: String,
    pub customer_id: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub mode: PaymentMode,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: f64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Expected vs received totals. Receivables are signed: a negative value
/// is an overpayment and is reported as such, never clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReceivablesSummary {
    pub expected_total: f64,
    pub expected_rtgs: f64,
    pub expected_cash: f64,
    pub received_rtgs: f64,
    pub received_cash: f64,
    pub received_total: f64,
    pub receivable_rtgs: f64,
    pub receivable_cash: f64,
    pub receivable_total: f64,
    pub overpaid: bool,
    pub consignment_count: usize,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerReceivables {
    pub customer_id: String,
    pub customer_name: String,
    #[serde(flatten)]
    pub summary: ReceivablesSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementEntryKind {
    Consignment,
    Payment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementLine {
    pub date: Option<NaiveDate>,
    pub kind: StatementEntryKind,
    pub reference_id: String,
    pub mode: Option<PaymentMode>,
    pub description: Option<String>,
    pub debit: f64,
    pub credit: f64,
    pub balance: f64,
}

pub fn summarize_receivables(
    consignments: &[LedgerConsignment],
    transactions: &[LedgerTransaction],
) -> ReceivablesSummary {
    let expected_total: f64 = consignments.iter().map(|item| item.total).sum();
    let expected_rtgs: f64 = consignments.iter().map(|item| item.rtgs_expected).sum();
    let expected_cash: f64 = consignments.iter().map(|item| item.cash_expected).sum();

    let received = |mode: PaymentMode| -> f64 {
        transactions
            .iter()
            .filter(|item| item.mode == mode)
            .map(|item| item.amount)
            .sum()
    };
    let received_rtgs = received(PaymentMode::Rtgs);
    let received_cash = received(PaymentMode::Cash);
    let received_total = received_rtgs + received_cash;
    let receivable_total = expected_total - received_total;

    ReceivablesSummary {
        expected_total: round2(expected_total),
        expected_rtgs: round2(expected_rtgs),
        expected_cash: round2(expected_cash),
        received_rtgs: round2(received_rtgs),
        received_cash: round2(received_cash),
        received_total: round2(received_total),
        receivable_rtgs: round2(expected_rtgs - received_rtgs),
        receivable_cash: round2(expected_cash - received_cash),
        receivable_total: round2(receivable_total),
        overpaid: round2(receivable_total) < 0.0,
        consignment_count: consignments.len(),
        transaction_count: transactions.len(),
    }
}

/// One summary per customer, including customers with no activity, ordered
/// by outstanding amount (largest first) then name. Rows referring to an
/// unknown customer still get their own entry with an empty name.
pub fn receivables_by_customer(
    customers: &[CustomerRef],
    consignments: &[LedgerConsignment],
    transactions: &[LedgerTransaction],
) -> Vec<CustomerReceivables> {
    let mut consignments_by_customer: HashMap<&str, Vec<LedgerConsignment>> = HashMap::new();
    for item in consignments {
        consignments_by_customer
            .entry(item.customer_id.as_str())
            .or_default()
            .push(item.clone());
    }
    let mut transactions_by_customer: HashMap<&str, Vec<LedgerTransaction>> = HashMap::new();
    for item in transactions {
        transactions_by_customer
            .entry(item.customer_id.as_str())
            .or_default()
            .push(item.clone());
    }

    let mut names: Vec<(String, String)> = customers
        .iter()
        .map(|customer| (customer.id.clone(), customer.name.clone()))
        .collect();
    let orphan_ids = consignments_by_customer
        .keys()
        .chain(transactions_by_customer.keys())
        .filter(|id| !customers.iter().any(|customer| customer.id == **id))
        .map(|id| (*id).to_string())
        .collect::<std::collections::BTreeSet<_>>();
    names.extend(orphan_ids.into_iter().map(|id| (id, String::new())));

    let mut result = names
        .into_iter()
        .map(|(customer_id, customer_name)| {
            let summary = summarize_receivables(
                consignments_by_customer
                    .get(customer_id.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
                transactions_by_customer
                    .get(customer_id.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
            );
            CustomerReceivables {
                customer_id,
                customer_name,
                summary,
            }
        })
        .collect::<Vec<_>>();

    result.sort_by(|left, right| {
        right
            .summary
            .receivable_total
            .total_cmp(&left.summary.receivable_total)
            .then_with(|| left.customer_name.cmp(&right.customer_name))
    });
    result
}

/// Merges consignments (debits) and payments (credits) into a date-ordered
/// ledger with a running balance. On the same date consignments come first.
pub fn customer_statement(
    consignments: &[LedgerConsignment],
    transactions: &[LedgerTransaction],
) -> Vec<StatementLine> {
    let mut lines = consignments
        .iter()
        .map(|item| StatementLine {
            date: item.date,
            kind: StatementEntryKind::Consignment,
            reference_id: item.id.clone(),
            mode: None,
            description: item.remarks.clone(),
            debit: item.total,
            credit: 0.0,
            balance: 0.0,
        })
        .chain(transactions.iter().map(|item| StatementLine {
            date: item.date,
            kind: StatementEntryKind::Payment,
            reference_id: item.id.clone(),
            mode: Some(item.mode),
            description: item.note.clone(),
            debit: 0.0,
            credit: item.amount,
            balance: 0.0,
        }))
        .collect::<Vec<_>>();

    // Stable sort keeps the fetch order within a (date, kind) bucket.
    lines.sort_by_key(|line| (line.date, line.kind == StatementEntryKind::Payment));

    let mut balance = 0.0;
    for line in &mut lines {
        balance += line.debit - line.credit;
        line.debit = round2(line.debit);
        line.credit = round2(line.credit);
        line.balance = round2(balance);
    }
    lines
}

/// Returns the total to store for a consignment: the given one when it
/// matches the split, the split itself when none was given.
pub fn resolve_consignment_total(
    total: Option<f64>,
    rtgs_expected: f64,
    cash_expected: f64,
) -> Result<f64, AppError> {
    let split = round2(rtgs_expected + cash_expected);
    match total {
        None => Ok(split),
        Some(total) if (total - split).abs() <= SPLIT_TOLERANCE => Ok(total),
        Some(total) => Err(AppError::BadRequest(format!(
            "total ({total}) must equal rtgs_expected + cash_expected ({split})."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        customer_statement, receivables_by_customer, resolve_consignment_total,
        summarize_receivables, CustomerRef,
        LedgerConsignment, LedgerTransaction, PaymentMode, StatementEntryKind,
    };
    use chrono::NaiveDate;
    use serde_json::json;

    fn date(day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 4, day)
    }

    fn consignment(customer_id: &str, day: u32, rtgs: f64, cash: f64) -> LedgerConsignment {
        LedgerConsignment {
            id: format!("c-{customer_id}-{day}"),
            customer_id: customer_id.to_string(),
            date: date(day),
            total: rtgs + cash,
            rtgs_expected: rtgs,
            cash_expected: cash,
            remarks: None,
        }
    }

    fn payment(customer_id: &str, day: u32, mode: PaymentMode, amount: f64) -> LedgerTransaction {
        LedgerTransaction {
            id: format!("t-{customer_id}-{day}"),
            customer_id: customer_id.to_string(),
            date: date(day),
            mode,
            amount,
            note: None,
        }
    }

    #[test]
    fn sums_expected_and_received_by_mode() {
        let consignments = vec![
            consignment("a", 1, 60_000.0, 40_000.0),
            consignment("a", 5, 10_000.0, 0.0),
        ];
        let transactions = vec![
            payment("a", 2, PaymentMode::Rtgs, 50_000.0),
            payment("a", 3, PaymentMode::Cash, 15_000.0),
            payment("a", 6, PaymentMode::Rtgs, 5_000.0),
        ];

        let summary = summarize_receivables(&consignments, &transactions);
        assert_eq!(summary.expected_total, 110_000.0);
        assert_eq!(summary.expected_rtgs, 70_000.0);
        assert_eq!(summary.expected_cash, 40_000.0);
        assert_eq!(summary.received_rtgs, 55_000.0);
        assert_eq!(summary.received_cash, 15_000.0);
        assert_eq!(summary.receivable_rtgs, 15_000.0);
        assert_eq!(summary.receivable_cash, 25_000.0);
        assert_eq!(
            summary.receivable_total,
            summary.expected_total - (summary.received_rtgs + summary.received_cash)
        );
        assert!(!summary.overpaid);
    }

    #[test]
    fn overpayment_stays_negative() {
        let consignments = vec![consignment("a", 1, 0.0, 1_000.0)];
        let transactions = vec![payment("a", 2, PaymentMode::Cash, 1_500.0)];

        let summary = summarize_receivables(&consignments, &transactions);
        assert_eq!(summary.receivable_cash, -500.0);
        assert_eq!(summary.receivable_total, -500.0);
        assert!(summary.overpaid);
    }

    #[test]
    fn empty_inputs_give_zeroes() {
        let summary = summarize_receivables(&[], &[]);
        assert_eq!(summary.expected_total, 0.0);
        assert_eq!(summary.receivable_total, 0.0);
        assert!(!summary.overpaid);
    }

    #[test]
    fn per_customer_breakdown_adds_up_to_the_total() {
        let customers = vec![
            CustomerRef { id: "a".to_string(), name: "Anand Granites".to_string() },
            CustomerRef { id: "b".to_string(), name: "Bharat Stones".to_string() },
            CustomerRef { id: "c".to_string(), name: "Chola Exports".to_string() },
        ];
        let consignments = vec![
            consignment("a", 1, 1_000.0, 500.0),
            consignment("b", 1, 4_000.0, 0.0),
        ];
        let transactions = vec![
            payment("a", 2, PaymentMode::Rtgs, 1_000.0),
            payment("b", 3, PaymentMode::Rtgs, 1_000.0),
        ];

        let breakdown = receivables_by_customer(&customers, &consignments, &transactions);
        assert_eq!(breakdown.len(), 3);
        assert_eq!(breakdown[0].customer_name, "Bharat Stones");
        assert_eq!(breakdown[0].summary.receivable_total, 3_000.0);
        assert_eq!(breakdown[1].customer_name, "Anand Granites");
        assert_eq!(breakdown[2].summary.expected_total, 0.0);

        let overall = summarize_receivables(&consignments, &transactions);
        let summed: f64 = breakdown
            .iter()
            .map(|entry| entry.summary.receivable_total)
            .sum();
        assert_eq!(summed, overall.receivable_total);
    }

    #[test]
    fn statement_runs_a_balance_in_date_order() {
        let consignments = vec![consignment("a", 3, 700.0, 300.0), consignment("a", 1, 500.0, 0.0)];
        let transactions = vec![
            payment("a", 3, PaymentMode::Cash, 200.0),
            payment("a", 2, PaymentMode::Rtgs, 500.0),
        ];

        let lines = customer_statement(&consignments, &transactions);
        let balances = lines.iter().map(|line| line.balance).collect::<Vec<_>>();
        assert_eq!(balances, vec![500.0, 0.0, 1_000.0, 800.0]);
        assert_eq!(lines[2].kind, StatementEntryKind::Consignment);
        assert_eq!(lines[3].mode, Some(PaymentMode::Cash));
    }

    #[test]
    fn decodes_rows_from_the_store() {
        let row = json!({
            "id": "t1",
            "customer_id": "a",
            "date": "2024-04-02",
            "mode": "RTGS",
            "amount": "2500.50",
            "account_id": null,
            "note": "part payment"
        });
        let decoded: LedgerTransaction = serde_json::from_value(row).expect("decodes");
        assert_eq!(decoded.mode, PaymentMode::Rtgs);
        assert_eq!(decoded.amount, 2500.5);
        assert_eq!(decoded.date, date(2));
    }

    #[test]
    fn consignment_total_must_match_the_split() {
        let derived = resolve_consignment_total(None, 60_000.0, 40_000.0).expect("derived");
        assert_eq!(derived, 100_000.0);

        let close = resolve_consignment_total(Some(100_000.005), 60_000.0, 40_000.0)
            .expect("within tolerance");
        assert_eq!(close, 100_000.005);
        assert!(resolve_consignment_total(Some(90_000.0), 60_000.0, 40_000.0).is_err());
    }
}
