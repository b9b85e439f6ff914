//! Exit code policy for schemapull.
//!
//! - `0` = success (schema written, printed, or already up to date)
//! - `10` = general operational failure
//! - `11` = connection failure (any connectivity error code)
//! - `12` = configuration error (bad flags, schema file or connection string)
//! - `130` = interrupted by Ctrl+C
//!
//! Automation should read the error code in `--json` output for detail; the
//! exit code only says which class of problem stopped the run.

use crate::error_codes::{ErrorCategory, PullError};

/// Exit code: general operational failure
pub const OPERATIONAL_FAILURE: i32 = 10;

/// Exit code: connection failure
pub const CONNECTION_FAILURE: i32 = 11;

/// Exit code: configuration error
pub const CONFIG_ERROR: i32 = 12;

/// Exit code: interrupted by Ctrl+C (SIGINT)
pub const INTERRUPTED: i32 = 130;

/// Pick the exit code for a classified failure.
///
/// Code-less failures are configuration problems (provider mismatch, missing
/// datasource) unless they came from somewhere unexpected, which callers signal
/// by passing `operational = true`.
pub fn for_error(err: &PullError, operational: bool) -> i32 {
    match err.code.map(|c| c.category()) {
        Some(ErrorCategory::Connectivity) => CONNECTION_FAILURE,
        Some(ErrorCategory::Configuration) => CONFIG_ERROR,
        None if operational => OPERATIONAL_FAILURE,
        None => CONFIG_ERROR,
    }
}
