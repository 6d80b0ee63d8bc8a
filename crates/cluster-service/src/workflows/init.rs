//! `init`: writes a fresh default configuration.

use std::io::{BufRead, Write};

use tracing::info;

use cluster_config::{ClusterConfig, ClusterSecret, ConfigError, ConfigRegistry};

use crate::PROGRAM_NAME;
use crate::context::{IoStreams, ProcessContext};
use crate::errors::{Doing, ServiceError, WorkflowError};

use super::{WORKFLOW_TARGET, WorkflowResult};

const SECRET_PROMPT: &str = "Enter cluster secret (32-byte hex string): ";

/// Generates defaults for every component and saves them.
///
/// The secret is prompted for with `custom_secret`, otherwise taken from the
/// environment, otherwise generated. An existing file is only replaced when
/// forced.
pub(crate) fn init<R: BufRead, W: Write, E: Write>(
    context: &ProcessContext,
    io: &mut IoStreams<'_, R, W, E>,
    custom_secret: bool,
    force: bool,
) -> WorkflowResult {
    let secret = provided_secret(context, io, custom_secret)?;

    let mut registry = ConfigRegistry::standard();
    registry
        .populate_defaults()
        .doing("generating default configuration")?;
    if let Some(secret) = secret {
        registry
            .get_mut::<ClusterConfig>()
            .doing("generating default configuration")?
            .secret = secret;
    }

    let path = context.config_path();
    registry
        .save(path, force || context.force())
        .map_err(|error| match error {
            refused @ ConfigError::AlreadyExists { .. } => WorkflowError::new(
                "saving new configuration",
                ServiceError::ConfigExists { source: refused },
            ),
            other => WorkflowError::new("saving new configuration", other),
        })?;
    info!(target: WORKFLOW_TARGET, path = %path.display(), "configuration written");
    writeln!(
        io.stderr,
        "{PROGRAM_NAME} configuration written to {}",
        path.display()
    )
    .doing("saving new configuration")
}

fn provided_secret<R: BufRead, W: Write, E: Write>(
    context: &ProcessContext,
    io: &mut IoStreams<'_, R, W, E>,
    custom_secret: bool,
) -> WorkflowResult<Option<ClusterSecret>> {
    let input = if custom_secret {
        io.read_value(SECRET_PROMPT)
            .doing("reading user-provided secret")?
    } else if let Some(secret) = context.env_secret() {
        secret.to_owned()
    } else {
        return Ok(None);
    };
    ClusterSecret::decode(&input)
        .map(Some)
        .doing("parsing user-provided secret")
}
