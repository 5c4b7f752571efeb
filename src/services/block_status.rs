use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Processing stage of a granite block.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockStatus {
    #[default]
    #[serde(alias = "raw")]
    Raw,
    #[serde(alias = "cutting")]
    Cutting,
    #[serde(alias = "cut")]
    Cut,
    #[serde(alias = "processed")]
    Processed,
    #[serde(alias = "sold")]
    Sold,
}

impl BlockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::Cutting => "CUTTING",
            Self::Cut => "CUT",
            Self::Processed => "PROCESSED",
            Self::Sold => "SOLD",
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use BlockStatus::{Cut, Cutting, Processed, Raw, Sold};

        self == next
            || matches!(
                (self, next),
                (Raw, Cutting)
                    | (Cutting, Cut)
                    | (Cutting, Processed)
                    | (Cut, Processed)
                    | (Cut, Sold)
                    | (Processed, Sold)
            )
    }

    pub fn ensure_transition(self, next: Self) -> Result<(), AppError> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        Err(AppError::BadRequest(format!(
            "Block status cannot move from {} to {}.",
            self.as_str(),
            next.as_str()
        )))
    }

    /// Blocks enter the pipeline as RAW; later stages are reached only
    /// through `ensure_transition`.
    pub fn ensure_initial(self) -> Result<(), AppError> {
        if self == Self::Raw {
            return Ok(());
        }
        Err(AppError::BadRequest(format!(
            "New blocks start as RAW, not {}.",
            self.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::BlockStatus;

    #[test]
    fn follows_the_cutting_pipeline() {
        assert!(BlockStatus::Raw.can_transition_to(BlockStatus::Cutting));
        assert!(BlockStatus::Cutting.can_transition_to(BlockStatus::Cut));
        assert!(BlockStatus::Cutting.can_transition_to(BlockStatus::Processed));
        assert!(BlockStatus::Cut.can_transition_to(BlockStatus::Processed));
        assert!(BlockStatus::Cut.can_transition_to(BlockStatus::Sold));
        assert!(BlockStatus::Processed.can_transition_to(BlockStatus::Sold));
        assert!(BlockStatus::Sold.can_transition_to(BlockStatus::Sold));
    }

    #[test]
    fn rejects_skips_and_reversals() {
        assert!(!BlockStatus::Raw.can_transition_to(BlockStatus::Sold));
        assert!(!BlockStatus::Raw.can_transition_to(BlockStatus::Cut));
        assert!(!BlockStatus::Sold.can_transition_to(BlockStatus::Raw));
        assert!(!BlockStatus::Processed.can_transition_to(BlockStatus::Cutting));
        assert!(BlockStatus::Raw.ensure_transition(BlockStatus::Sold).is_err());
    }

    #[test]
    fn new_blocks_must_start_raw() {
        assert!(BlockStatus::Raw.ensure_initial().is_ok());
        assert!(BlockStatus::Sold.ensure_initial().is_err());
        assert!(BlockStatus::Cut.ensure_initial().is_err());
    }

    #[test]
    fn accepts_either_case_on_the_wire() {
        let cut: BlockStatus = serde_json::from_value(serde_json::json!("cut")).expect("valid");
        assert_eq!(cut, BlockStatus::Cut);
        assert!(serde_json::from_value::<BlockStatus>(serde_json::json!("POLISHED")).is_err());
        assert_eq!(
            serde_json::to_value(BlockStatus::Processed).expect("serializes"),
            serde_json::json!("PROCESSED")
        );
    }
}
