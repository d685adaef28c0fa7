//! Blocking HTTP client for submitting traced experiments and reading
//! results, leaderboards and challenge targets.

pub mod cache;
pub mod client;
pub mod config;
pub mod policy;

pub use cache::{cache_key, CacheEntry, SubmissionCache};
pub use client::{Client, ClientOptions, TraceSource};
pub use config::{Config, DEFAULT_BASE_URL, DEFAULT_CHALLENGE_ID};
pub use policy::{poll_until, PollPolicy, RetryPolicy};

pub use lbc_core::{
    trace, wells, Error, ExperimentStatus, JobStatus, LeaderboardEntry, Result, SubmissionResult,
    TargetImage, Trace, Well,
};
