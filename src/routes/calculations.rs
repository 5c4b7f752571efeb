use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde_json::{json, Map, Value};

use crate::{
    error::AppResult,
    extract::{ApiJson, ApiQuery},
    repository::table_service::{
        create_row, delete_row, get_row, list_rows, update_row, MAX_LIST_ROWS,
    },
    schemas::{
        into_patch, remove_nulls, serialize_to_map, validate_input, CreateCalculationInput,
        IdQuery, UpdateCalculationInput,
    },
    services::{
        calculator::{calculate, CalculatorBreakdown, CalculatorInput},
        rows::number_from_value,
    },
    state::AppState,
};

const CALCULATIONS_TABLE: &str = "consignment_calculations";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/consignment-calculations",
            get(list_calculations)
                .post(create_calculation)
                .put(update_calculation)
                .delete(delete_calculation),
        )
        .route("/consignment-calculations/preview", post(preview_calculation))
}

async fn preview_calculation(
    ApiJson(input): ApiJson<CalculatorInput>,
) -> AppResult<Json<CalculatorBreakdown>> {
    input.check()?;
    Ok(Json(calculate(&input)))
}

async fn list_calculations(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let Some(pool) = state.read_pool() else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let rows = list_rows(
        pool,
        CALCULATIONS_TABLE,
        &Map::new(),
        "created_at",
        false,
        Some(MAX_LIST_ROWS),
    )
    .await?;
    Ok(Json(Value::Array(rows)))
}

async fn create_calculation(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateCalculationInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validate_input(&payload)?;
    payload.inputs.check()?;
    let pool = state.write_pool()?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.extend(stored_outputs(&calculate(&payload.inputs)));
    let created = create_row(pool, CALCULATIONS_TABLE, &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Inputs not in the body keep their stored value; outputs are always
/// recomputed from the merged inputs.
async fn update_calculation(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateCalculationInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = state.write_pool()?;
    let (id, mut patch) = into_patch(&payload)?;

    let existing = get_row(pool, CALCULATIONS_TABLE, &id).await?;
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch.clone());
    let inputs = inputs_from_row(&merged);
    inputs.check()?;

    patch.extend(stored_outputs(&calculate(&inputs)));
    let updated = update_row(pool, CALCULATIONS_TABLE, &id, &patch).await?;
    Ok(Json(updated))
}

async fn delete_calculation(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.write_pool()?;
    let deleted = delete_row(pool, CALCULATIONS_TABLE, &query.id).await?;
    Ok(Json(deleted))
}

fn inputs_from_row(row: &Map<String, Value>) -> CalculatorInput {
    let field = |name: &str| number_from_value(row.get(name));
    CalculatorInput {
        total_blocks: field("total_blocks"),
        avg_meters_per_block: field("avg_meters_per_block"),
        cost_per_meter: field("cost_per_meter"),
        loading_charges: field("loading_charges"),
        transport_charges: field("transport_charges"),
        commission_charges: field("commission_charges"),
        polish_percentage: field("polish_percentage"),
        laputra_percentage: field("laputra_percentage"),
        whiteline_percentage: field("whiteline_percentage"),
    }
}

fn stored_outputs(breakdown: &CalculatorBreakdown) -> Map<String, Value> {
    let mut outputs = Map::new();
    outputs.insert("total_sqft".to_string(), json!(breakdown.total_sqft));
    outputs.insert("raw_material_cost".to_string(), json!(breakdown.raw_material_cost));
    outputs.insert("polish_cost".to_string(), json!(breakdown.polish.cost));
    outputs.insert("laputra_cost".to_string(), json!(breakdown.laputra.cost));
    outputs.insert("whiteline_cost".to_string(), json!(breakdown.whiteline.cost));
    outputs.insert("processing_cost".to_string(), json!(breakdown.processing_cost));
    outputs.insert("total_cost".to_string(), json!(breakdown.total_cost));
    outputs.insert("cost_per_sqft".to_string(), json!(breakdown.cost_per_sqft));
    outputs
}

#[cfg(test)]
mod tests {
    use super::{inputs_from_row, stored_outputs};
    use crate::services::calculator::calculate;
    use serde_json::json;

    #[test]
    fn merged_row_reads_numeric_text_and_nulls() {
        let row = json!({
            "name": "Chimakurthy lot",
            "total_blocks": 10,
            "avg_meters_per_block": "2.0",
            "cost_per_meter": 1000.0,
            "loading_charges": null,
        });
        let inputs = inputs_from_row(row.as_object().expect("object"));
        assert_eq!(inputs.total_blocks, 10.0);
        assert_eq!(inputs.avg_meters_per_block, 2.0);
        assert_eq!(inputs.loading_charges, 0.0);

        let outputs = stored_outputs(&calculate(&inputs));
        assert_eq!(outputs.get("total_sqft"), Some(&json!(6_000.0)));
        assert_eq!(outputs.get("total_cost"), Some(&json!(20_000.0)));
    }
}
