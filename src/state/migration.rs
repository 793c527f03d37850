//! Schema Migrations
//!
//! Checkpoint payloads carry `_schema_version`; loaders migrate lower
//! versions forward before deserializing. Migrations are additive-only:
//! each is a total function on the JSON value that adds fields with
//! defaults and bumps the version by exactly one.
//!
//! History:
//! - v0 → v1: add `seen_urls` as an empty set (v0 runs predate run-wide
//!   URL deduplication; a legacy run that carried duplicates will have
//!   its citations renumbered on the next synthesize pass)
//! - v1 → v2: add `errors` accumulator and per-page `flagged` marker

use serde_json::{Value, json};

use crate::constants::checkpoint::SCHEMA_VERSION;
use crate::types::{FathomError, Result};

/// Read the embedded schema version; version 0 if absent.
pub fn schema_version(value: &Value) -> u32 {
    value
        .get("_schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32
}

/// Migrate a raw checkpoint payload to the current schema version.
pub fn migrate_to_current(mut value: Value) -> Result<Value> {
    loop {
        let version = schema_version(&value);
        if version == SCHEMA_VERSION {
            return Ok(value);
        }
        if version > SCHEMA_VERSION {
            return Err(FathomError::Migration {
                from: version,
                reason: format!(
                    "checkpoint schema v{} is newer than supported v{}",
                    version, SCHEMA_VERSION
                ),
            });
        }
        value = migrate_one(value, version)?;
    }
}

/// Apply a single migration step `version → version + 1`.
fn migrate_one(mut value: Value, version: u32) -> Result<Value> {
    let obj = value.as_object_mut().ok_or_else(|| FathomError::Migration {
        from: version,
        reason: "checkpoint payload is not a JSON object".to_string(),
    })?;

    match version {
        0 => {
            obj.entry("seen_urls").or_insert_with(|| json!([]));
        }
        1 => {
            obj.entry("errors").or_insert_with(|| json!([]));
            if let Some(pages) = obj.get_mut("scraped_pages").and_then(Value::as_array_mut) {
                for page in pages {
                    if let Some(page_obj) = page.as_object_mut() {
                        page_obj.entry("flagged").or_insert(json!(false));
                    }
                }
            }
        }
        other => {
            return Err(FathomError::Migration {
                from: other,
                reason: "no migration registered for this version".to_string(),
            });
        }
    }

    value["_schema_version"] = json!(version + 1);
    Ok(value)
}
