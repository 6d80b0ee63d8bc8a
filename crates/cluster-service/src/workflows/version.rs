//! `version`: prints the program version.

use std::io::Write;

use crate::errors::Doing;

use super::WorkflowResult;

/// Commit the binary was built from, when the build provided one.
const BUILD_COMMIT: Option<&str> = option_env!("GIT_COMMIT");

/// Commits shorter than this are not worth showing.
const MIN_COMMIT_LEN: usize = 8;

/// Version string, suffixed with the build commit when known.
pub(crate) fn version_string(commit: Option<&str>) -> String {
    let version = env!("CARGO_PKG_VERSION");
    match commit {
        Some(commit) if commit.len() >= MIN_COMMIT_LEN => format!("{version}-{commit}"),
        _ => version.to_owned(),
    }
}

/// Prints the version on `out`.
pub(crate) fn print_version<W: Write>(out: &mut W) -> WorkflowResult {
    writeln!(out, "{}", version_string(BUILD_COMMIT)).doing("printing version")
}
