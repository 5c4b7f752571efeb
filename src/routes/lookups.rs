use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    extract::{ApiJson, ApiQuery},
    repository::table_service::{create_row, delete_row, list_rows, update_row, MAX_LIST_ROWS},
    schemas::{
        into_patch, remove_nulls, serialize_to_map, validate_input, CreateAccountInput,
        CreateCustomerInput, CreateExpenseAccountInput, CreateExpenseCategoryInput,
        CreateSupplierInput, CreateVendorInput, IdQuery, UpdateAccountInput, UpdateCustomerInput,
        UpdateExpenseAccountInput, UpdateExpenseCategoryInput, UpdateSupplierInput,
        UpdateVendorInput,
    },
    state::AppState,
};

/// A name-keyed reference table with plain create / update / delete and an
/// alphabetical listing.
trait LookupTable: Send + Sync + 'static {
    const TABLE: &'static str;
    type Create: DeserializeOwned + Serialize + Validate + Send + 'static;
    type Update: DeserializeOwned + Serialize + Validate + Send + 'static;

    /// Per-table checks on the outgoing record.
    fn prepare(_record: &mut Map<String, Value>) -> AppResult<()> {
        Ok(())
    }
}

struct Customers;
impl LookupTable for Customers {
    const TABLE: &'static str = "customers";
    type Create = CreateCustomerInput;
    type Update = UpdateCustomerInput;
}

struct Accounts;
impl LookupTable for Accounts {
    const TABLE: &'static str = "accounts";
    type Create = CreateAccountInput;
    type Update = UpdateAccountInput;

    fn prepare(record: &mut Map<String, Value>) -> AppResult<()> {
        let Some(account_type) = record.get("account_type").and_then(Value::as_str) else {
            return Ok(());
        };
        let normalized = account_type.trim().to_ascii_lowercase();
        if normalized != "bank" && normalized != "cash" {
            return Err(AppError::BadRequest(format!(
                "Invalid account_type '{account_type}'. Expected bank or cash."
            )));
        }
        record.insert("account_type".to_string(), Value::String(normalized));
        Ok(())
    }
}

struct Suppliers;
impl LookupTable for Suppliers {
    const TABLE: &'static str = "granite_suppliers";
    type Create = CreateSupplierInput;
    type Update = UpdateSupplierInput;
}

struct ExpenseCategories;
impl LookupTable for ExpenseCategories {
    const TABLE: &'static str = "expense_categories";
    type Create = CreateExpenseCategoryInput;
    type Update = UpdateExpenseCategoryInput;
}

struct Vendors;
impl LookupTable for Vendors {
    const TABLE: &'static str = "vendors";
    type Create = CreateVendorInput;
    type Update = UpdateVendorInput;
}

struct ExpenseAccounts;
impl LookupTable for ExpenseAccounts {
    const TABLE: &'static str = "expense_accounts";
    type Create = CreateExpenseAccountInput;
    type Update = UpdateExpenseAccountInput;
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(lookup_router::<Customers>("/customers"))
        .merge(lookup_router::<Accounts>("/accounts"))
        .merge(lookup_router::<Suppliers>("/granite/suppliers"))
        .merge(lookup_router::<ExpenseCategories>("/expense-categories"))
        .merge(lookup_router::<Vendors>("/vendors"))
        .merge(lookup_router::<ExpenseAccounts>("/expense-accounts"))
}

fn lookup_router<L: LookupTable>(path: &str) -> Router<AppState> {
    Router::new().route(
        path,
        get(list_lookup::<L>)
            .post(create_lookup::<L>)
            .put(update_lookup::<L>)
            .delete(delete_lookup::<L>),
    )
}

async fn list_lookup<L: LookupTable>(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let rows = list_rows(pool, L::TABLE, &Map::new(), "name", true, Some(MAX_LIST_ROWS)).await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_lookup<L: LookupTable>(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<L::Create>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    let pool = state.write_pool()?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    L::prepare(&mut record)?;
    let created = create_row(pool, L::TABLE, &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_lookup<L: LookupTable>(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<L::Update>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = state.write_pool()?;

    let (id, mut patch) = into_patch(&payload)?;
    L::prepare(&mut patch)?;
    let updated = update_row(pool, L::TABLE, &id, &patch).await?;
    Ok(Json(updated))
}

async fn delete_lookup<L: LookupTable>(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.write_pool()?;
    let deleted = delete_row(pool, L::TABLE, &query.id).await?;
    Ok(Json(deleted))
}

#[cfg(test)]
mod tests {
    use super::{Accounts, LookupTable};
    use serde_json::{json, Map, Value};

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn account_type_is_normalized_or_rejected() {
        let mut bank = record(json!({ "name": "HDFC Current", "account_type": " Bank " }));
        Accounts::prepare(&mut bank).expect("bank is valid");
        assert_eq!(bank.get("account_type"), Some(&json!("bank")));

        let mut cheque = record(json!({ "name": "Cheque", "account_type": "cheque" }));
        assert!(Accounts::prepare(&mut cheque).is_err());
    }
}
