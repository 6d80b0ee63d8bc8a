//! Stepwise upgrades of older state payloads to the current format.
//!
//! Each step rewrites a payload of version `from` into version `from + 1`.
//! Payloads are always `{"pins": [...]}` objects; only the shape of the pin
//! entries differs between versions.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::state::STATE_VERSION;

/// Errors raised while migrating a payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    /// No step starts at this version.
    #[error("no migration path from state version {from}")]
    NoPath {
        /// Version without an outgoing step.
        from: u32,
    },
    /// The payload does not have the shape its version promises.
    #[error("state payload of version {version} is malformed: {reason}")]
    Malformed {
        /// Version the payload claimed.
        version: u32,
        /// Description of the mismatch.
        reason: String,
    },
}

struct Migration {
    from: u32,
    apply: fn(Vec<Value>) -> Result<Vec<Value>, String>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        from: 1,
        apply: cids_to_pins,
    },
    Migration {
        from: 2,
        apply: add_names,
    },
    Migration {
        from: 3,
        apply: split_replication_factor,
    },
];

/// Rewrites `payload` from `version` to [`STATE_VERSION`].
///
/// A payload already at the current version is returned unchanged.
///
/// # Errors
///
/// Fails when a step is missing or the payload is malformed for its version.
pub fn migrate(version: u32, payload: Value) -> Result<Value, MigrationError> {
    let mut current = version;
    let mut value = payload;
    while current < STATE_VERSION {
        let step = MIGRATIONS
            .iter()
            .find(|migration| migration.from == current)
            .ok_or(MigrationError::NoPath { from: current })?;
        let pins = take_pins(current, value)?;
        let pins = (step.apply)(pins).map_err(|reason| MigrationError::Malformed {
            version: current,
            reason,
        })?;
        value = wrap_pins(pins);
        current += 1;
    }
    Ok(value)
}

fn take_pins(version: u32, payload: Value) -> Result<Vec<Value>, MigrationError> {
    let malformed = |reason: &str| MigrationError::Malformed {
        version,
        reason: reason.to_owned(),
    };
    let Value::Object(mut object) = payload else {
        return Err(malformed("payload is not an object"));
    };
    match object.remove("pins") {
        Some(Value::Array(pins)) => Ok(pins),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(_) => Err(malformed("pins is not a list")),
    }
}

fn wrap_pins(pins: Vec<Value>) -> Value {
    let mut object = Map::new();
    object.insert("pins".to_owned(), Value::Array(pins));
    Value::Object(object)
}

fn pin_object(pin: Value) -> Result<Map<String, Value>, String> {
    match pin {
        Value::Object(object) => Ok(object),
        other => Err(format!("expected a pin object, found {other}")),
    }
}

fn cids_to_pins(pins: Vec<Value>) -> Result<Vec<Value>, String> {
    pins.into_iter()
        .map(|pin| {
            let Value::String(cid) = pin else {
                return Err(format!("expected a content identifier, found {pin}"));
            };
            let mut object = Map::new();
            object.insert("cid".to_owned(), Value::String(cid));
            object.insert("replication_factor".to_owned(), Value::from(-1));
            object.insert("allocations".to_owned(), Value::Array(Vec::new()));
            Ok(Value::Object(object))
        })
        .collect()
}

fn add_names(pins: Vec<Value>) -> Result<Vec<Value>, String> {
    pins.into_iter()
        .map(|pin| {
            let mut object = pin_object(pin)?;
            object
                .entry("name")
                .or_insert_with(|| Value::String(String::new()));
            Ok(Value::Object(object))
        })
        .collect()
}

fn split_replication_factor(pins: Vec<Value>) -> Result<Vec<Value>, String> {
    pins.into_iter()
        .map(|pin| {
            let mut object = pin_object(pin)?;
            let factor = object
                .remove("replication_factor")
                .unwrap_or_else(|| Value::from(-1));
            if !factor.is_i64() {
                return Err(format!("replication_factor {factor} is not an integer"));
            }
            object.insert("replication_factor_min".to_owned(), factor.clone());
            object.insert("replication_factor_max".to_owned(), factor);
            Ok(Value::Object(object))
        })
        .collect()
}
