//! Subcommand implementations.

pub mod inspect;
pub mod locate;
pub mod run;

use std::ffi::OsStr;

use keel_runtime::{parse_path_list, ResourceRoot, ScanPolicy};

/// Expand `-p` values into roots, keeping command-line order.
pub fn parse_roots(paths: &[String]) -> Vec<ResourceRoot> {
    paths
        .iter()
        .flat_map(|value| parse_path_list(OsStr::new(value)))
        .collect()
}

pub fn scan_policy(skip_unavailable: bool) -> ScanPolicy {
    if skip_unavailable {
        ScanPolicy::SkipUnavailable
    } else {
        ScanPolicy::FailFast
    }
}
