//! # Operational Defaults
//!
//! Default operational boundaries for the dispatch core. Every value can
//! be overridden through [`crate::config::CourierConfig`].

/// Total attempts for a tracking write before the error surfaces.
pub const DEFAULT_TRACKING_RETRY_ATTEMPTS: u32 = 5;

/// Base delay for tracking-write backoff; the n-th retry waits
/// `base * n`.
pub const DEFAULT_TRACKING_RETRY_BASE_DELAY_MS: u64 = 200;

/// Concurrently executing dispatches per worker pool.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

/// Queue poll delay when every monitored channel is empty.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Poll interval of the bounded retry-until-status helper.
pub const DEFAULT_RETRY_CHECK_INTERVAL_MS: u64 = 1_000;
