use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::services::rows::{lenient_f64, round2};

const UNCATEGORIZED: &str = "Uncategorized";
const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseRow {
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub expense_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: f64,
}

/// Any lookup row (category, vendor, account) reduced to id and name.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedRow {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseGroup {
    pub id: Option<String>,
    pub name: String,
    pub count: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotal {
    pub month: String,
    pub count: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpenseSummary {
    pub total_amount: f64,
    pub count: usize,
    pub by_category: Vec<ExpenseGroup>,
    pub by_vendor: Vec<ExpenseGroup>,
    pub by_account: Vec<ExpenseGroup>,
    pub by_month: Vec<MonthTotal>,
}

/// Lookup tables used to name the groups.
#[derive(Debug, Clone, Copy)]
pub struct ExpenseLookups<'a> {
    pub categories: &'a [NamedRow],
    pub vendors: &'a [NamedRow],
    pub accounts: &'a [NamedRow],
}

pub fn expense_item_amount(quantity: f64, unit_price: f64) -> f64 {
    round2(quantity * unit_price)
}

pub fn summarize_expenses(expenses: &[ExpenseRow], lookups: ExpenseLookups<'_>) -> ExpenseSummary {
    let total_amount: f64 = expenses.iter().map(|expense| expense.amount).sum();

    let mut by_month: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    for expense in expenses {
        let Some(date) = expense.expense_date else {
            continue;
        };
        let bucket = by_month.entry(date.format("%Y-%m").to_string()).or_default();
        bucket.0 += 1;
        bucket.1 += expense.amount;
    }

    ExpenseSummary {
        total_amount: round2(total_amount),
        count: expenses.len(),
        by_category: group_by(
            expenses,
            |expense| expense.category_id.as_deref(),
            lookups.categories,
            UNCATEGORIZED,
        ),
        by_vendor: group_by(
            expenses,
            |expense| expense.vendor_id.as_deref(),
            lookups.vendors,
            UNKNOWN,
        ),
        by_account: group_by(
            expenses,
            |expense| expense.account_id.as_deref(),
            lookups.accounts,
            UNKNOWN,
        ),
        by_month: by_month
            .into_iter()
            .map(|(month, (count, amount))| MonthTotal {
                month,
                count,
                amount: round2(amount),
            })
            .collect(),
    }
}

fn group_by<'a, F>(
    expenses: &'a [ExpenseRow],
    key: F,
    names: &[NamedRow],
    fallback: &str,
) -> Vec<ExpenseGroup>
where
    F: Fn(&'a ExpenseRow) -> Option<&'a str>,
{
    let name_of = names
        .iter()
        .map(|row| (row.id.as_str(), row.name.as_str()))
        .collect::<HashMap<_, _>>();

    let mut groups: HashMap<Option<&str>, (usize, f64)> = HashMap::new();
    for expense in expenses {
        let group_key = key(expense).map(str::trim).filter(|id| !id.is_empty());
        let bucket = groups.entry(group_key).or_default();
        bucket.0 += 1;
        bucket.1 += expense.amount;
    }

    let mut result = groups
        .into_iter()
        .map(|(id, (count, amount))| {
            let name = id
                .and_then(|id| name_of.get(id).copied())
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(fallback)
                .to_string();
            ExpenseGroup {
                id: id.map(ToOwned::to_owned),
                name,
                count,
                amount: round2(amount),
            }
        })
        .collect::<Vec<_>>();

    result.sort_by(|left, right| {
        right
            .amount
            .total_cmp(&left.amount)
            .then_with(|| left.name.cmp(&right.name))
    });
    result
}

#[cfg(test)]
mod tests {
    use super::{expense_item_amount, summarize_expenses, ExpenseLookups, ExpenseRow, NamedRow};
    use chrono::NaiveDate;

    fn named(id: &str, name: &str) -> NamedRow {
        NamedRow {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn expense(
        category: Option<&str>,
        vendor: Option<&str>,
        month: u32,
        amount: f64,
    ) -> ExpenseRow {
        ExpenseRow {
            category_id: category.map(ToOwned::to_owned),
            vendor_id: vendor.map(ToOwned::to_owned),
            account_id: None,
            expense_date: NaiveDate::from_ymd_opt(2024, month, 10),
            amount,
        }
    }

    #[test]
    fn groups_by_category_vendor_and_month() {
        let categories = vec![named("diesel", "Diesel"), named("wages", "Wages")];
        let vendors = vec![named("v1", "Indian Oil")];
        let expenses = vec![
            expense(Some("diesel"), Some("v1"), 1, 4_000.0),
            expense(Some("diesel"), Some("v1"), 2, 3_500.0),
            expense(Some("wages"), None, 2, 12_000.0),
            expense(None, None, 3, 250.0),
        ];

        let summary = summarize_expenses(
            &expenses,
            ExpenseLookups {
                categories: &categories,
                vendors: &vendors,
                accounts: &[],
            },
        );

        assert_eq!(summary.total_amount, 19_750.0);
        assert_eq!(summary.count, 4);

        let names = summary
            .by_category
            .iter()
            .map(|group| (group.name.as_str(), group.amount))
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![("Wages", 12_000.0), ("Diesel", 7_500.0), ("Uncategorized", 250.0)]
        );

        assert_eq!(summary.by_vendor[0].name, "Unknown");
        assert_eq!(summary.by_vendor[0].amount, 12_250.0);
        assert_eq!(summary.by_vendor[1].name, "Indian Oil");

        let months = summary
            .by_month
            .iter()
            .map(|month| month.month.as_str())
            .collect::<Vec<_>>();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
        assert_eq!(summary.by_month[1].amount, 15_500.0);
    }

    #[test]
    fn item_amount_is_quantity_times_price() {
        assert_eq!(expense_item_amount(3.0, 12.5), 37.5);
        assert_eq!(expense_item_amount(0.0, 99.0), 0.0);
    }
}
