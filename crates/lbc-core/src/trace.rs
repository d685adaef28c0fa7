use crate::error::{Error, Result};
use crate::ops::{validate_volume, Operation};

/// One addressed well of a finalized trace and its operations in call order.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedWell {
    index: usize,
    ops: Vec<Operation>,
}

impl TracedWell {
    pub fn new(index: usize, ops: Vec<Operation>) -> Self {
        Self { index, ops }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }
}

/// The immutable record produced by one tracing session.
///
/// Well indices are unique and contiguous from 0, so `well_count` always
/// equals the number of wells, including allocated wells that never
/// received an operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trace {
    wells: Vec<TracedWell>,
}

impl Trace {
    /// Builds a trace from wells supplied by the caller, checking the index
    /// and volume invariants that a tracing session guarantees by construction.
    pub fn new(wells: Vec<TracedWell>) -> Result<Self> {
        for (position, well) in wells.iter().enumerate() {
            if well.index != position {
                return Err(Error::validation(format!(
                    "well indices must be contiguous from 0: expected {}, found {}",
                    position, well.index
                )));
            }
            for op in &well.ops {
                if let Operation::Fill { volume, .. } = op {
                    validate_volume(*volume)?;
                }
            }
        }
        Ok(Self { wells })
    }

    pub(crate) fn from_recorded(recorded: Vec<Vec<Operation>>) -> Self {
        let wells = recorded
            .into_iter()
            .enumerate()
            .map(|(index, ops)| TracedWell { index, ops })
            .collect();
        Self { wells }
    }

    pub fn wells(&self) -> &[TracedWell] {
        &self.wells
    }

    pub fn well(&self, index: usize) -> Option<&TracedWell> {
        self.wells.get(index)
    }

    pub fn well_count(&self) -> usize {
        self.wells.len()
    }

    pub fn op_count(&self) -> usize {
        self.wells.iter().map(|w| w.ops.len()).sum()
    }

    /// True when no well received any operation.
    pub fn is_empty(&self) -> bool {
        self.op_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reagent::WATER;

    #[test]
    fn new_rejects_gaps_in_indices() {
        let wells = vec![
            TracedWell::new(0, vec![Operation::Mix]),
            TracedWell::new(2, vec![Operation::Image]),
        ];
        let err = Trace::new(wells).expect_err("gap must be rejected");
        assert!(err.to_string().contains("expected 1, found 2"), "{}", err);
    }

    #[test]
    fn new_rejects_invalid_fill_volume() {
        let wells = vec![TracedWell::new(
            0,
            vec![Operation::Fill {
                volume: -1.0,
                reagent: WATER,
            }],
        )];
        assert!(matches!(Trace::new(wells), Err(Error::Validation(_))));
    }

    #[test]
    fn counts_include_untouched_wells() {
        let trace = Trace::new(vec![
            TracedWell::new(0, vec![Operation::Mix, Operation::Image]),
            TracedWell::new(1, vec![]),
        ])
        .expect("trace");
        assert_eq!(trace.well_count(), 2);
        assert_eq!(trace.op_count(), 2);
        assert!(!trace.is_empty());
        assert!(Trace::default().is_empty());
    }
}
