use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    Json,
    /// Human-readable single line output.
    #[default]
    Compact,
}

/// Operator-facing log levels accepted by `--loglevel`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogLevel {
    /// Only unrecoverable failures.
    Critical,
    /// Errors.
    Error,
    /// Warnings and errors.
    #[strum(to_string = "warning", serialize = "warn")]
    Warning,
    /// Informational lifecycle messages.
    #[default]
    Info,
    /// Everything, including component internals.
    Debug,
}

impl LogLevel {
    /// Filter directive understood by `tracing-subscriber`.
    ///
    /// `tracing` has no level above `error`, so `critical` shares it.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Critical | Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Errors encountered while parsing a [`LogFormat`] or [`LogLevel`] from text.
pub type LogSelectorParseError = strum::ParseError;
