//! Experiment tracing for the biocompute service.
//!
//! Caller code describes liquid-handling work through ordinary calls on
//! [`Well`] handles obtained from [`wells`]. Nothing is executed: [`trace`]
//! runs the code under a capture session and returns an immutable [`Trace`]
//! that [`codec`] turns into the submission payload.
//!
//! ```
//! use lbc_core::{trace, wells, Error, RED_DYE};
//!
//! let experiment = trace(|| -> Result<(), Error> {
//!     for well in wells(2)? {
//!         well.fill(80.0, RED_DYE)?.mix()?.image()?;
//!     }
//!     Ok(())
//! })?;
//! assert_eq!(experiment.well_count(), 2);
//! # Ok::<(), Error>(())
//! ```

pub mod codec;
pub mod error;
pub mod models;
pub mod ops;
pub mod reagent;
pub mod trace;
pub mod tracer;
pub mod well;

pub use error::{Error, Result};
pub use models::{
    ExperimentStatus, ExperimentSummary, JobStatus, LeaderboardEntry, SubmissionResult,
    TargetImage, WellResult,
};
pub use ops::Operation;
pub use reagent::{Dye, Reagent, BLUE_DYE, BUILTIN_REAGENTS, GREEN_DYE, RED_DYE, WATER};
pub use trace::{Trace, TracedWell};
pub use tracer::{is_tracing, trace};
pub use well::{wells, Well, Wells};
