use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::{
    error::AppError,
    services::{
        block_status::BlockStatus, calculator::CalculatorInput, granite::BuyerSort,
        receivables::PaymentMode,
    },
};

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::BadRequest(format!("Validation failed: {errors}")))
}

pub fn serialize_to_map<T>(value: &T) -> Map<String, Value>
where
    T: Serialize,
{
    let json = serde_json::to_value(value).unwrap_or_else(|_| Value::Object(Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(mut map: Map<String, Value>) -> Map<String, Value> {
    map.retain(|_, value| !value.is_null());
    map
}

/// Splits an update body into the target id and the remaining non-null
/// columns.
pub fn into_patch<T>(value: &T) -> Result<(String, Map<String, Value>), AppError>
where
    T: Serialize,
{
    let mut patch = remove_nulls(serialize_to_map(value));
    let id = patch
        .remove("id")
        .and_then(|id| id.as_str().map(str::trim).map(ToOwned::to_owned))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("id is required.".to_string()))?;
    Ok((id, patch))
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(format!(
            "{field} must be a date in YYYY-MM-DD format."
        ))
    })
}

/// Text is trimmed before validation, so whitespace-only names fail
/// `length(min = 1)`.
fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(String::deserialize(deserializer)?.trim().to_string())
}

fn trimmed_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(|text| text.trim().to_string()))
}

fn default_account_type_bank() -> String {
    "bank".to_string()
}
fn default_quantity_one() -> f64 {
    1.0
}

// ===== Paths & shared queries =====

#[derive(Debug, Clone, Deserialize)]
pub struct IdQuery {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

// ===== Customers & accounts =====

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateCustomerInput {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateCustomerInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateAccountInput {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default = "default_account_type_bank")]
    pub account_type: String,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateAccountInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub account_type: Option<String>,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
}

// ===== Customer ledger =====

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateConsignmentInput {
    pub customer_id: String,
    pub date: String,
    #[validate(range(min = 0.0))]
    pub total: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub rtgs_expected: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub cash_expected: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateConsignmentInput {
    pub id: String,
    pub customer_id: Option<String>,
    pub date: Option<String>,
    #[validate(range(min = 0.0))]
    pub total: Option<f64>,
    #[validate(range(min = 0.0))]
    pub rtgs_expected: Option<f64>,
    #[validate(range(min = 0.0))]
    pub cash_expected: Option<f64>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsignmentsQuery {
    pub customer_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateTransactionInput {
    pub customer_id: String,
    pub date: String,
    pub mode: PaymentMode,
    pub account_id: Option<String>,
    #[validate(range(exclusive_min = 0.0))]
    pub amount: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateTransactionInput {
    pub id: String,
    pub customer_id: Option<String>,
    pub date: Option<String>,
    pub mode: Option<PaymentMode>,
    pub account_id: Option<String>,
    #[validate(range(exclusive_min = 0.0))]
    pub amount: Option<f64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionsQuery {
    pub customer_id: Option<String>,
    pub mode: Option<PaymentMode>,
    pub account_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatementQuery {
    pub customer_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

// ===== Granite =====

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateSupplierInput {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateSupplierInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateGraniteConsignmentInput {
    pub supplier_id: String,
    pub consignment_number: Option<String>,
    pub arrival_date: String,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub payment_cash: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub payment_upi: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub transport_cost: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub total_sqft_produced: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub raw_material_cost_per_sqft: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateGraniteConsignmentInput {
    pub id: String,
    pub supplier_id: Option<String>,
    pub consignment_number: Option<String>,
    pub arrival_date: Option<String>,
    #[validate(range(min = 0.0))]
    pub payment_cash: Option<f64>,
    #[validate(range(min = 0.0))]
    pub payment_upi: Option<f64>,
    #[validate(range(min = 0.0))]
    pub transport_cost: Option<f64>,
    #[validate(range(min = 0.0))]
    pub total_sqft_produced: Option<f64>,
    #[validate(range(min = 0.0))]
    pub raw_material_cost_per_sqft: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraniteConsignmentsQuery {
    pub supplier_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsignmentSummaryQuery {
    pub consignment_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateBlockInput {
    pub consignment_id: String,
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 64))]
    pub block_no: String,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub gross_measurement: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub net_measurement: f64,
    #[serde(default)]
    pub status: BlockStatus,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateBlockInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 64))]
    pub block_no: Option<String>,
    #[validate(range(min = 0.0))]
    pub gross_measurement: Option<f64>,
    #[validate(range(min = 0.0))]
    pub net_measurement: Option<f64>,
    pub status: Option<BlockStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlocksQuery {
    pub consignment_id: Option<String>,
    pub status: Option<BlockStatus>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateBlockPartInput {
    pub block_id: String,
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 16))]
    pub part_name: String,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub slabs_count: i32,
    #[validate(range(min = 0.0))]
    pub sqft: f64,
    #[validate(range(min = 0.0))]
    pub thickness: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateBlockPartInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 16))]
    pub part_name: Option<String>,
    #[validate(range(min = 0))]
    pub slabs_count: Option<i32>,
    #[validate(range(min = 0.0))]
    pub sqft: Option<f64>,
    #[validate(range(min = 0.0))]
    pub thickness: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockPartsQuery {
    pub block_id: Option<String>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateSaleInput {
    pub block_part_id: String,
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 255))]
    pub buyer_name: String,
    pub sale_date: Option<String>,
    #[validate(range(exclusive_min = 0.0))]
    pub sqft_sold: f64,
    #[validate(range(min = 0.0))]
    pub rate_per_sqft: f64,
    #[validate(range(min = 0.0))]
    pub cost_per_sqft: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateSaleInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 255))]
    pub buyer_name: Option<String>,
    pub sale_date: Option<String>,
    #[validate(range(exclusive_min = 0.0))]
    pub sqft_sold: Option<f64>,
    #[validate(range(min = 0.0))]
    pub rate_per_sqft: Option<f64>,
    #[validate(range(min = 0.0))]
    pub cost_per_sqft: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SalesQuery {
    pub block_part_id: Option<String>,
    pub buyer_name: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopBuyersQuery {
    pub limit: Option<usize>,
    pub sort_by: Option<BuyerSort>,
    pub from: Option<String>,
    pub to: Option<String>,
}

// ===== Expenses =====

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateExpenseCategoryInput {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateExpenseCategoryInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateVendorInput {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateVendorInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateExpenseAccountInput {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateExpenseAccountInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateExpenseInput {
    pub category_id: Option<String>,
    pub vendor_id: Option<String>,
    pub account_id: Option<String>,
    pub expense_date: String,
    #[validate(range(min = 0.0))]
    pub amount: f64,
    pub payment_mode: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateExpenseInput {
    pub id: String,
    pub category_id: Option<String>,
    pub vendor_id: Option<String>,
    pub account_id: Option<String>,
    pub expense_date: Option<String>,
    #[validate(range(min = 0.0))]
    pub amount: Option<f64>,
    pub payment_mode: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpensesQuery {
    pub category_id: Option<String>,
    pub vendor_id: Option<String>,
    pub account_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateExpenseItemInput {
    pub expense_id: String,
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[serde(default = "default_quantity_one")]
    #[validate(range(min = 0.0))]
    pub quantity: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub unit_price: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateExpenseItemInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 500))]
    pub description: Option<String>,
    #[validate(range(min = 0.0))]
    pub quantity: Option<f64>,
    #[validate(range(min = 0.0))]
    pub unit_price: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseItemsQuery {
    pub expense_id: Option<String>,
}

// ===== Consignment calculator =====

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateCalculationInput {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub notes: Option<String>,
    #[serde(flatten)]
    #[validate(nested)]
    pub inputs: CalculatorInput,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateCalculationInput {
    pub id: String,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub notes: Option<String>,
    pub total_blocks: Option<f64>,
    pub avg_meters_per_block: Option<f64>,
    pub cost_per_meter: Option<f64>,
    pub loading_charges: Option<f64>,
    pub transport_charges: Option<f64>,
    pub commission_charges: Option<f64>,
    pub polish_percentage: Option<f64>,
    pub laputra_percentage: Option<f64>,
    pub whiteline_percentage: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::{
        into_patch, parse_date, validate_input, CreateBlockInput, CreateSaleInput,
        CreateTransactionInput, UpdateCustomerInput, UpdateSaleInput,
    };
    use crate::services::block_status::BlockStatus;
    use crate::error::AppError;
    use crate::services::receivables::PaymentMode;
    use serde_json::json;

    #[test]
    fn patch_drops_nulls_and_extracts_id() {
        let payload = UpdateCustomerInput {
            id: " 550e8400-e29b-41d4-a716-446655440000 ".to_string(),
            name: Some("Tirumala Granites".to_string()),
            phone: None,
            address: None,
        };
        let (id, patch) = into_patch(&payload).expect("patch");
        assert_eq!(id, "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("name"), Some(&json!("Tirumala Granites")));
    }

    #[test]
    fn patch_requires_id() {
        let payload = UpdateCustomerInput {
            id: "  ".to_string(),
            name: None,
            phone: None,
            address: None,
        };
        assert!(matches!(into_patch(&payload), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn transaction_mode_accepts_either_case() {
        let input: CreateTransactionInput = serde_json::from_value(json!({
            "customer_id": "550e8400-e29b-41d4-a716-446655440000",
            "date": "2024-05-01",
            "mode": "cash",
            "amount": 1200
        }))
        .expect("decodes");
        assert_eq!(input.mode, PaymentMode::Cash);

        let rejected = serde_json::from_value::<CreateTransactionInput>(json!({
            "customer_id": "550e8400-e29b-41d4-a716-446655440000",
            "date": "2024-05-01",
            "mode": "CHEQUE",
            "amount": 1200
        }));
        assert!(rejected.is_err());
    }

    #[test]
    fn parses_iso_dates_only() {
        assert!(parse_date("date", "2024-02-29").is_ok());
        assert!(parse_date("date", "29/02/2024").is_err());
    }

    #[test]
    fn names_are_trimmed_before_validation() {
        let sale: CreateSaleInput = serde_json::from_value(json!({
            "block_part_id": "550e8400-e29b-41d4-a716-446655440000",
            "buyer_name": "  Kaveri Traders ",
            "sqft_sold": 40,
            "rate_per_sqft": 150
        }))
        .expect("decodes");
        assert_eq!(sale.buyer_name, "Kaveri Traders");
        assert!(validate_input(&sale).is_ok());

        let blank: CreateSaleInput = serde_json::from_value(json!({
            "block_part_id": "550e8400-e29b-41d4-a716-446655440000",
            "buyer_name": "   ",
            "sqft_sold": 40,
            "rate_per_sqft": 150
        }))
        .expect("decodes");
        assert!(matches!(validate_input(&blank), Err(AppError::BadRequest(_))));

        let rename: UpdateSaleInput = serde_json::from_value(json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "buyer_name": " \t "
        }))
        .expect("decodes");
        assert_eq!(rename.buyer_name.as_deref(), Some(""));
        assert!(validate_input(&rename).is_err());

        let untouched: UpdateSaleInput = serde_json::from_value(json!({
            "id": "550e8400-e29b-41d4-a716-446655440000"
        }))
        .expect("decodes");
        assert!(untouched.buyer_name.is_none());
        assert!(validate_input(&untouched).is_ok());
    }

    #[test]
    fn block_status_defaults_to_raw() {
        let block: CreateBlockInput = serde_json::from_value(json!({
            "consignment_id": "550e8400-e29b-41d4-a716-446655440000",
            "block_no": " B-12 "
        }))
        .expect("decodes");
        assert_eq!(block.block_no, "B-12");
        assert_eq!(block.status, BlockStatus::Raw);
    }
}
