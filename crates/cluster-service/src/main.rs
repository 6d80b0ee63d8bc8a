//! Entrypoint for the `ipfs-cluster-service` binary.
//!
//! Delegates to [`cluster_service::run`] with the process streams. Standard
//! error is left unlocked because background threads log to it.

use std::io::{self, StdinLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdin: StdinLock<'_> = io::stdin().lock();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    cluster_service::run(std::env::args_os(), &mut stdin, &mut stdout, &mut stderr)
}
