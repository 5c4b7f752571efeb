use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

use crate::error::AppError;

/// Numeric columns arrive from `row_to_json` as JSON numbers, but NULLs and
/// text-encoded numerics from hand-written rows read as zero.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(number_from_value(value.as_ref()))
}

pub fn number_from_value(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if number.is_finite() {
        number
    } else {
        0.0
    }
}

/// Decodes fetched rows, skipping (and logging) any that do not match the
/// expected shape so one bad row cannot blank a whole dashboard.
pub fn decode_rows<T>(table: &str, rows: Vec<Value>) -> Vec<T>
where
    T: DeserializeOwned,
{
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                tracing::warn!(table, error = %error, "Skipping undecodable row");
                None
            }
        })
        .collect()
}

pub fn decode_row<T>(table: &str, row: Value) -> Result<T, AppError>
where
    T: DeserializeOwned,
{
    serde_json::from_value::<T>(row).map_err(|error| {
        AppError::Internal(format!("Stored {table} record is malformed: {error}"))
    })
}

/// Divides, answering zero instead of NaN or infinity.
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    let result = numerator / denominator;
    if result.is_finite() {
        result
    } else {
        0.0
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{decode_rows, lenient_f64, number_from_value, round2, safe_div};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default, deserialize_with = "lenient_f64")]
        amount: f64,
    }

    #[test]
    fn reads_numbers_leniently() {
        assert_eq!(number_from_value(Some(&json!(12.5))), 12.5);
        assert_eq!(number_from_value(Some(&json!(" 40 "))), 40.0);
        assert_eq!(number_from_value(Some(&json!("n/a"))), 0.0);
        assert_eq!(number_from_value(None), 0.0);
    }

    #[test]
    fn skips_rows_that_do_not_decode() {
        let rows = vec![
            json!({ "name": "a", "amount": "10" }),
            json!({ "amount": 5 }),
            json!({ "name": "c", "amount": null }),
        ];
        let decoded: Vec<Sample> = decode_rows("samples", rows);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].name, "a");
        assert_eq!(decoded[0].amount, 10.0);
        assert_eq!(decoded[1].amount, 0.0);
    }

    #[test]
    fn division_never_yields_nan() {
        assert_eq!(safe_div(10.0, 0.0), 0.0);
        assert_eq!(safe_div(0.0, 0.0), 0.0);
        assert_eq!(safe_div(10.0, 4.0), 2.5);
        assert_eq!(round2(2.345_6), 2.35);
    }
}
