use crate::error::{Error, Result};
use crate::ops::Operation;
use crate::reagent::Reagent;
use crate::tracer::{active_session, Session};
use std::fmt;
use std::iter::FusedIterator;
use std::ops::Range;
use std::rc::Rc;

/// Handle to one allocated well. Each call appends exactly one operation and
/// hands back the same handle, so calls chain.
#[derive(Clone)]
pub struct Well {
    index: usize,
    session: Rc<Session>,
}

impl Well {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn fill(&self, volume: f64, reagent: impl Into<Reagent>) -> Result<&Self> {
        let op = Operation::fill(volume, reagent.into())?;
        self.session.record(self.index, op)?;
        Ok(self)
    }

    pub fn mix(&self) -> Result<&Self> {
        self.session.record(self.index, Operation::Mix)?;
        Ok(self)
    }

    pub fn image(&self) -> Result<&Self> {
        self.session.record(self.index, Operation::Image)?;
        Ok(self)
    }

    /// Operations recorded on this well so far.
    pub fn ops(&self) -> Vec<Operation> {
        self.session.ops(self.index)
    }
}

impl fmt::Debug for Well {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Well")
            .field("index", &self.index)
            .field("ops", &self.ops())
            .finish()
    }
}

/// Finite, single-pass sequence of freshly allocated wells.
#[derive(Debug)]
pub struct Wells {
    session: Rc<Session>,
    indices: Range<usize>,
}

impl Iterator for Wells {
    type Item = Well;

    fn next(&mut self) -> Option<Well> {
        let index = self.indices.next()?;
        Some(Well {
            index,
            session: Rc::clone(&self.session),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

impl ExactSizeIterator for Wells {}

impl FusedIterator for Wells {}

/// Allocates `count` wells in the active tracing session.
///
/// The indices are reserved when this is called, continuing from the previous
/// allocation in the same session, whether or not the sequence is drained.
pub fn wells(count: usize) -> Result<Wells> {
    let session = active_session()?;
    if count == 0 {
        return Err(Error::validation("wells() count must be a positive integer"));
    }
    let indices = session.allocate(count)?;
    Ok(Wells { session, indices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reagent::{Dye, RED_DYE, WATER};
    use crate::tracer::trace;

    #[test]
    fn wells_outside_session_is_rejected() {
        let err = wells(1).expect_err("no session");
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("outside of an active tracing session"));
    }

    #[test]
    fn wells_yields_exactly_count_handles() {
        trace(|| -> Result<()> {
            for n in [1usize, 4, 96] {
                let batch = wells(n)?;
                assert_eq!(batch.len(), n);
                assert_eq!(batch.count(), n);
            }
            Ok(())
        })
        .expect("trace");
    }

    #[test]
    fn partly_drained_wells_report_remaining_range() {
        trace(|| -> Result<()> {
            let mut batch = wells(3)?;
            batch.next();
            assert!(format!("{:?}", batch).contains("indices: 1..3"));
            Ok(())
        })
        .expect("trace");
    }

    #[test]
    fn zero_count_is_rejected() {
        let result = trace(|| -> Result<()> {
            wells(0)?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn fill_returns_same_handle() {
        trace(|| -> Result<()> {
            let well = wells(1)?.next().ok_or_else(|| Error::state("empty"))?;
            let chained = well.fill(80.0, RED_DYE)?;
            assert!(std::ptr::eq(chained, &well));
            Ok(())
        })
        .expect("trace");
    }

    #[test]
    fn fill_rejects_bad_volume_without_recording() {
        trace(|| -> Result<()> {
            let well = wells(1)?.next().ok_or_else(|| Error::state("empty"))?;
            assert!(matches!(well.fill(0.0, WATER), Err(Error::Validation(_))));
            assert!(matches!(well.fill(-5.0, WATER), Err(Error::Validation(_))));
            assert!(well.ops().is_empty());
            Ok(())
        })
        .expect("trace");
    }

    #[test]
    fn repeated_operations_are_kept_in_call_order() {
        let trace = trace(|| -> Result<()> {
            let well = wells(1)?.next().ok_or_else(|| Error::state("empty"))?;
            well.mix()?.mix()?.fill(5.0, Dye::Blue)?.image()?.mix()?;
            Ok(())
        })
        .expect("trace");
        let kinds: Vec<&str> = trace.wells()[0].ops().iter().map(|op| op.kind()).collect();
        assert_eq!(kinds, vec!["mix", "mix", "fill", "image", "mix"]);
    }

    #[test]
    fn undrained_allocation_still_reserves_indices() {
        let trace = trace(|| -> Result<()> {
            let mut first = wells(4)?;
            first.next();
            let next = wells(1)?.next().map(|w| w.index());
            assert_eq!(next, Some(4));
            Ok(())
        })
        .expect("trace");
        assert_eq!(trace.well_count(), 5);
        assert!(trace.is_empty());
    }

    #[test]
    fn custom_reagents_are_accepted() {
        let trace = trace(|| -> Result<()> {
            let glucose = Reagent::new("glucose")?;
            for well in wells(2)? {
                well.fill(12.5, &glucose)?;
            }
            Ok(())
        })
        .expect("trace");
        assert_eq!(trace.op_count(), 2);
    }
}
