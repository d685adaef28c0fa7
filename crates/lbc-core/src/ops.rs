use crate::error::{Error, Result};
use crate::reagent::Reagent;
use std::fmt;

/// One recorded action on one well.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Fill { volume: f64, reagent: Reagent },
    Mix,
    Image,
}

impl Operation {
    pub fn fill(volume: f64, reagent: Reagent) -> Result<Self> {
        validate_volume(volume)?;
        Ok(Operation::Fill { volume, reagent })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Fill { .. } => "fill",
            Operation::Mix => "mix",
            Operation::Image => "image",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Fill { volume, reagent } => write!(f, "Fill({}, {})", volume, reagent),
            Operation::Mix => f.write_str("Mix"),
            Operation::Image => f.write_str("Image"),
        }
    }
}

/// Volumes are microlitres and must be positive and finite.
pub fn validate_volume(volume: f64) -> Result<()> {
    if !volume.is_finite() || volume <= 0.0 {
        return Err(Error::validation(format!(
            "fill volume must be a positive finite number, got {}",
            volume
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reagent::{RED_DYE, WATER};

    #[test]
    fn fill_rejects_non_positive_and_non_finite_volumes() {
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = Operation::fill(bad, WATER).expect_err("volume must be rejected");
            assert_eq!(err.kind(), "validation_error", "volume {}", bad);
        }
    }

    #[test]
    fn display_matches_recorded_shape() {
        let op = Operation::fill(80.0, RED_DYE).expect("fill");
        assert_eq!(op.to_string(), "Fill(80, red_dye)");
        assert_eq!(op.kind(), "fill");
        assert_eq!(Operation::Mix.to_string(), "Mix");
        assert_eq!(Operation::Image.kind(), "image");
    }
}
