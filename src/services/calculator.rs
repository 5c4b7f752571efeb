use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::AppError,
    services::rows::{round2, safe_div},
};

/// Square feet of finished slab expected per cubic metre of block.
pub const SQFT_PER_CUBIC_METER: f64 = 300.0;

pub const POLISH_RATE_PER_SQFT: f64 = 25.0;
pub const LAPUTRA_RATE_PER_SQFT: f64 = 30.0;
pub const WHITELINE_RATE_PER_SQFT: f64 = 25.0;

/// Editable inputs of the what-if consignment calculator.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Validate)]
pub struct CalculatorInput {
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub total_blocks: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub avg_meters_per_block: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub cost_per_meter: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub loading_charges: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub transport_charges: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub commission_charges: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0))]
    pub polish_percentage: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0))]
    pub laputra_percentage: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0))]
    pub whiteline_percentage: f64,
}

impl CalculatorInput {
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()
            .map_err(|errors| AppError::BadRequest(format!("Validation failed: {errors}")))?;
        let split = self.polish_percentage + self.laputra_percentage + self.whiteline_percentage;
        if split > 100.0 + 1e-9 {
            return Err(AppError::BadRequest(format!(
                "Processing percentages add up to {split}; they cannot exceed 100."
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProcessingStream {
    pub percentage: f64,
    pub rate_per_sqft: f64,
    pub sqft: f64,
    pub cost: f64,
}

impl ProcessingStream {
    fn new(total_sqft: f64, percentage: f64, rate_per_sqft: f64) -> Self {
        let sqft = total_sqft * percentage / 100.0;
        Self {
            percentage,
            rate_per_sqft,
            sqft: round2(sqft),
            cost: round2(sqft * rate_per_sqft),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CalculatorBreakdown {
    pub total_sqft: f64,
    pub block_cost: f64,
    pub raw_material_cost: f64,
    pub polish: ProcessingStream,
    pub laputra: ProcessingStream,
    pub whiteline: ProcessingStream,
    pub processing_cost: f64,
    pub total_cost: f64,
    pub cost_per_sqft: f64,
}

pub fn calculate(input: &CalculatorInput) -> CalculatorBreakdown {
    let volume = input.total_blocks * input.avg_meters_per_block;
    let total_sqft = volume * SQFT_PER_CUBIC_METER;
    let block_cost = volume * input.cost_per_meter;
    let raw_material_cost =
        block_cost + input.loading_charges + input.transport_charges + input.commission_charges;

    let polish = ProcessingStream::new(total_sqft, input.polish_percentage, POLISH_RATE_PER_SQFT);
    let laputra =
        ProcessingStream::new(total_sqft, input.laputra_percentage, LAPUTRA_RATE_PER_SQFT);
    let whiteline = ProcessingStream::new(
        total_sqft,
        input.whiteline_percentage,
        WHITELINE_RATE_PER_SQFT,
    );
    let processing_cost = polish.cost + laputra.cost + whiteline.cost;
    let total_cost = raw_material_cost + processing_cost;

    CalculatorBreakdown {
        total_sqft: round2(total_sqft),
        block_cost: round2(block_cost),
        raw_material_cost: round2(raw_material_cost),
        polish,
        laputra,
        whiteline,
        processing_cost: round2(processing_cost),
        total_cost: round2(total_cost),
        cost_per_sqft: round2(safe_div(total_cost, total_sqft)),
    }
}

#[cfg(test)]
mod tests {
    use super::{calculate, CalculatorInput};

    #[test]
    fn converts_block_volume_to_sqft_and_cost() {
        let input = CalculatorInput {
            total_blocks: 10.0,
            avg_meters_per_block: 2.0,
            cost_per_meter: 1_000.0,
            ..CalculatorInput::default()
        };
        let result = calculate(&input);
        assert_eq!(result.total_sqft, 6_000.0);
        assert_eq!(result.block_cost, 20_000.0);
        assert_eq!(result.raw_material_cost, 20_000.0);
        assert_eq!(result.total_cost, 20_000.0);
    }

    #[test]
    fn adds_charges_and_processing_streams() {
        let input = CalculatorInput {
            total_blocks: 10.0,
            avg_meters_per_block: 2.0,
            cost_per_meter: 1_000.0,
            loading_charges: 1_500.0,
            transport_charges: 2_500.0,
            commission_charges: 1_000.0,
            polish_percentage: 50.0,
            laputra_percentage: 30.0,
            whiteline_percentage: 20.0,
        };
        let result = calculate(&input);
        assert_eq!(result.raw_material_cost, 25_000.0);
        assert_eq!(result.polish.sqft, 3_000.0);
        assert_eq!(result.polish.cost, 75_000.0);
        assert_eq!(result.laputra.sqft, 1_800.0);
        assert_eq!(result.laputra.cost, 54_000.0);
        assert_eq!(result.whiteline.sqft, 1_200.0);
        assert_eq!(result.whiteline.cost, 30_000.0);
        assert_eq!(result.processing_cost, 159_000.0);
        assert_eq!(result.total_cost, 184_000.0);
        assert_eq!(result.cost_per_sqft, 30.67);
    }

    #[test]
    fn zero_blocks_cost_nothing_per_sqft() {
        let result = calculate(&CalculatorInput::default());
        assert_eq!(result.total_sqft, 0.0);
        assert_eq!(result.cost_per_sqft, 0.0);
    }

    #[test]
    fn rejects_bad_percentages() {
        let over = CalculatorInput {
            polish_percentage: 60.0,
            laputra_percentage: 50.0,
            ..CalculatorInput::default()
        };
        assert!(over.check().is_err());

        let negative = CalculatorInput {
            loading_charges: -1.0,
            ..CalculatorInput::default()
        };
        assert!(negative.check().is_err());

        let fine = CalculatorInput {
            polish_percentage: 40.0,
            laputra_percentage: 40.0,
            whiteline_percentage: 20.0,
            ..CalculatorInput::default()
        };
        assert!(fine.check().is_ok());
    }
}
