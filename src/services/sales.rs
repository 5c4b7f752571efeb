use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx::{PgConnection, PgPool};

use crate::{
    error::{map_db_error, AppError, AppResult},
    repository::table_service::{
        create_row, delete_row, get_row, get_row_for_update, update_row,
    },
    schemas::{
        into_patch, parse_date, remove_nulls, serialize_to_map, CreateSaleInput,
        UpdateBlockPartInput, UpdateSaleInput,
    },
    services::{
        granite::{
            block_part_counters, sale_profit, BlockPartRow, BlockRow, GraniteConsignmentRow,
            SaleRow, SQFT_EPSILON,
        },
        rows::{decode_row, round2},
    },
};

pub const SALES_TABLE: &str = "granite_sales";
pub const PARTS_TABLE: &str = "granite_block_parts";
const BLOCKS_TABLE: &str = "granite_blocks";
const CONSIGNMENTS_TABLE: &str = "granite_consignments";

/// Records a sale and moves the sold quantity onto its block part. The
/// part row stays locked until commit so concurrent sales cannot both
/// pass the availability check.
pub async fn record_sale(pool: &PgPool, input: &CreateSaleInput) -> AppResult<Value> {
    if let Some(sale_date) = input.sale_date.as_deref() {
        parse_date("sale_date", sale_date)?;
    }

    let mut tx = pool.begin().await.map_err(map_db_error)?;

    let part: BlockPartRow = decode_row(
        PARTS_TABLE,
        get_row_for_update(&mut *tx, PARTS_TABLE, &input.block_part_id).await?,
    )?;
    let sold_sqft = sold_after_change(&part, input.sqft_sold)?;

    let cost_per_sqft = match input.cost_per_sqft {
        Some(cost) => cost,
        None => inherited_cost_per_sqft(&mut *tx, &part).await?,
    };

    update_row(
        &mut *tx,
        PARTS_TABLE,
        &part.id,
        &block_part_counters(part.sqft, sold_sqft),
    )
    .await?;

    let mut record = remove_nulls(serialize_to_map(input));
    if !record.contains_key("sale_date") {
        record.insert(
            "sale_date".to_string(),
            json!(Utc::now().date_naive().to_string()),
        );
    }
    record.extend(sale_totals(
        input.rate_per_sqft,
        cost_per_sqft,
        input.sqft_sold,
    ));

    let sale = create_row(&mut *tx, SALES_TABLE, &record).await?;
    tx.commit().await.map_err(map_db_error)?;

    tracing::info!(
        block_part_id = %part.id,
        sqft_sold = input.sqft_sold,
        remaining_sqft = round2(part.sqft - sold_sqft),
        "Granite sale recorded"
    );
    Ok(sale)
}

/// Applies an edited sale. A change in `sqft_sold` is moved onto the block
/// part under the same lock as `record_sale`.
pub async fn amend_sale(pool: &PgPool, input: &UpdateSaleInput) -> AppResult<Value> {
    let (sale_id, mut patch) = into_patch(input)?;
    if let Some(sale_date) = input.sale_date.as_deref() {
        parse_date("sale_date", sale_date)?;
    }

    let mut tx = pool.begin().await.map_err(map_db_error)?;

    let existing: SaleRow = decode_row(
        SALES_TABLE,
        get_row_for_update(&mut *tx, SALES_TABLE, &sale_id).await?,
    )?;
    let sqft_sold = input.sqft_sold.unwrap_or(existing.sqft_sold);
    let rate_per_sqft = input.rate_per_sqft.unwrap_or(existing.rate_per_sqft);
    let cost_per_sqft = input.cost_per_sqft.unwrap_or(existing.cost_per_sqft);

    let delta = sqft_sold - existing.sqft_sold;
    if delta.abs() > SQFT_EPSILON {
        let part: BlockPartRow = decode_row(
            PARTS_TABLE,
            get_row_for_update(&mut *tx, PARTS_TABLE, &existing.block_part_id).await?,
        )?;
        let sold_sqft = sold_after_change(&part, delta)?;
        update_row(
            &mut *tx,
            PARTS_TABLE,
            &part.id,
            &block_part_counters(part.sqft, sold_sqft),
        )
        .await?;
    }

    patch.extend(sale_totals(rate_per_sqft, cost_per_sqft, sqft_sold));

    let sale = update_row(&mut *tx, SALES_TABLE, &sale_id, &patch).await?;
    tx.commit().await.map_err(map_db_error)?;
    Ok(sale)
}

/// Deletes a sale and gives its square feet back to the block part. A part
/// that no longer exists is skipped.
pub async fn delete_sale(pool: &PgPool, sale_id: &str) -> AppResult<Value> {
    let mut tx = pool.begin().await.map_err(map_db_error)?;

    let existing: SaleRow = decode_row(
        SALES_TABLE,
        get_row_for_update(&mut *tx, SALES_TABLE, sale_id).await?,
    )?;

    match get_row_for_update(&mut *tx, PARTS_TABLE, &existing.block_part_id).await {
        Ok(row) => {
            let part: BlockPartRow = decode_row(PARTS_TABLE, row)?;
            let sold_sqft = (part.sold_sqft - existing.sqft_sold).max(0.0);
            update_row(
                &mut *tx,
                PARTS_TABLE,
                &part.id,
                &block_part_counters(part.sqft, sold_sqft),
            )
            .await?;
        }
        Err(AppError::NotFound(_)) => {
            tracing::warn!(
                sale_id,
                block_part_id = %existing.block_part_id,
                "Deleting sale whose block part is gone"
            );
        }
        Err(error) => return Err(error),
    }

    let deleted = delete_row(&mut *tx, SALES_TABLE, sale_id).await?;
    tx.commit().await.map_err(map_db_error)?;
    Ok(deleted)
}

/// Updates a block part. `sold_sqft` is owned by the sale path, so a resize
/// may never drop `sqft` below what has already been sold.
pub async fn update_block_part(pool: &PgPool, input: &UpdateBlockPartInput) -> AppResult<Value> {
    let (part_id, mut patch) = into_patch(input)?;

    let mut tx = pool.begin().await.map_err(map_db_error)?;

    let part: BlockPartRow = decode_row(
        PARTS_TABLE,
        get_row_for_update(&mut *tx, PARTS_TABLE, &part_id).await?,
    )?;
    let sqft = input.sqft.unwrap_or(part.sqft);
    ensure_covers_sold(sqft, part.sold_sqft)?;

    patch.extend(block_part_counters(sqft, part.sold_sqft));
    let updated = update_row(&mut *tx, PARTS_TABLE, &part_id, &patch).await?;
    tx.commit().await.map_err(map_db_error)?;
    Ok(updated)
}

/// Sold quantity of `part` after adding `delta` square feet (negative when
/// a sale shrinks).
fn sold_after_change(part: &BlockPartRow, delta: f64) -> Result<f64, AppError> {
    let sold_sqft = (part.sold_sqft + delta).max(0.0);
    if sold_sqft > part.sqft + SQFT_EPSILON {
        return Err(AppError::BadRequest(format!(
            "Only {} sqft remaining on block part {}; cannot sell {} sqft.",
            round2(part.remaining_sqft().max(0.0)),
            part.part_name.as_deref().unwrap_or(part.id.as_str()),
            round2(delta)
        )));
    }
    Ok(sold_sqft)
}

fn ensure_covers_sold(sqft: f64, sold_sqft: f64) -> Result<(), AppError> {
    if sqft + SQFT_EPSILON < sold_sqft {
        return Err(AppError::BadRequest(format!(
            "sqft ({sqft}) cannot be less than the {} sqft already sold.",
            round2(sold_sqft)
        )));
    }
    Ok(())
}

fn sale_totals(rate_per_sqft: f64, cost_per_sqft: f64, sqft_sold: f64) -> Map<String, Value> {
    let mut totals = Map::new();
    totals.insert("cost_per_sqft".to_string(), json!(cost_per_sqft));
    totals.insert(
        "total_selling_price".to_string(),
        json!(round2(rate_per_sqft * sqft_sold)),
    );
    totals.insert(
        "total_profit".to_string(),
        json!(round2(sale_profit(rate_per_sqft, cost_per_sqft, sqft_sold))),
    );
    totals
}

async fn inherited_cost_per_sqft(
    conn: &mut PgConnection,
    part: &BlockPartRow,
) -> Result<f64, AppError> {
    let block: BlockRow = decode_row(
        BLOCKS_TABLE,
        get_row(&mut *conn, BLOCKS_TABLE, &part.block_id).await?,
    )?;
    let consignment: GraniteConsignmentRow = decode_row(
        CONSIGNMENTS_TABLE,
        get_row(&mut *conn, CONSIGNMENTS_TABLE, &block.consignment_id).await?,
    )?;
    Ok(consignment.default_sale_cost_per_sqft())
}

#[cfg(test)]
mod tests {
    use super::{ensure_covers_sold, sale_totals, sold_after_change};
    use crate::{error::AppError, services::granite::BlockPartRow};
    use serde_json::json;

    fn part(sqft: f64, sold_sqft: f64) -> BlockPartRow {
        BlockPartRow {
            id: "p1".to_string(),
            block_id: "b1".to_string(),
            part_name: Some("A".to_string()),
            sqft,
            sold_sqft,
        }
    }

    #[test]
    fn sells_up_to_the_remaining_sqft() {
        assert_eq!(sold_after_change(&part(250.0, 100.0), 150.0).expect("fits"), 250.0);
        assert!(matches!(
            sold_after_change(&part(250.0, 100.0), 150.5),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn shrinking_a_sale_gives_sqft_back() {
        assert_eq!(sold_after_change(&part(250.0, 100.0), -40.0).expect("fits"), 60.0);
        assert_eq!(sold_after_change(&part(250.0, 10.0), -40.0).expect("floor"), 0.0);
    }

    #[test]
    fn resize_cannot_undercut_sold_sqft() {
        assert!(ensure_covers_sold(100.0, 100.0).is_ok());
        assert!(ensure_covers_sold(99.0, 100.0).is_err());
    }

    #[test]
    fn totals_follow_rate_cost_and_quantity() {
        let totals = sale_totals(150.0, 100.0, 100.0);
        assert_eq!(totals.get("total_selling_price"), Some(&json!(15_000.0)));
        assert_eq!(totals.get("total_profit"), Some(&json!(5_000.0)));

        let loss = sale_totals(90.0, 100.0, 10.0);
        assert_eq!(loss.get("total_profit"), Some(&json!(-100.0)));
    }
}
