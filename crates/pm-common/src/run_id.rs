//! Sweep run id.
//!
//! One ULID per process, attached to the recompute span and copied into each
//! [`RecomputeReport`](crate::RecomputeReport) so a printed report can be
//! traced back to its log lines.

use once_cell::sync::Lazy;
use ulid::Ulid;

static RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

pub fn get() -> &'static str {
    &RUN_ID
}
