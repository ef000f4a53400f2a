//! Configurable field descriptors advertised by checkpoint stores
//!
//! A configuration-resolution layer reads these specs to surface the
//! user-facing options of a store and to build the [`CheckpointConfig`]
//! passed into every store call. Every store advertises at least the two
//! fields returned by [`base_config_specs`].

use crate::checkpoint::CheckpointConfig;
use crate::error::{CheckpointError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Field ID of the thread identifier
pub const THREAD_ID_FIELD: &str = "thread_id";

/// Field ID of the point-in-time selector
pub const THREAD_TS_FIELD: &str = "thread_ts";

/// Field ID of the exact checkpoint selector
pub const CHECKPOINT_ID_FIELD: &str = "checkpoint_id";

/// Declarative description of one selectable configuration field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurableFieldSpec {
    /// Key under which the value is supplied
    pub id: String,

    /// Type annotation shown to users
    pub annotation: String,

    /// Display name
    pub name: Option<String>,

    /// Human-readable description
    pub description: Option<String>,

    /// Value used when none is supplied
    pub default: Value,

    /// Whether the value is shared across a whole run
    pub is_shared: bool,

    /// IDs of fields this one depends on
    pub dependencies: Option<Vec<String>>,
}

impl ConfigurableFieldSpec {
    /// Create a spec with a `null` default, not shared, no dependencies
    pub fn new(id: impl Into<String>, annotation: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            annotation: annotation.into(),
            name: None,
            description: None,
            default: Value::Null,
            is_shared: false,
            dependencies: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the default value
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    /// Mark the field as shared across a run
    pub fn shared(mut self) -> Self {
        self.is_shared = true;
        self
    }

    /// Set the fields this one depends on
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    /// The supplied value for this field, or its default
    pub fn resolve<'a>(&'a self, values: &'a HashMap<String, Value>) -> &'a Value {
        values.get(&self.id).unwrap_or(&self.default)
    }
}

/// Thread identifier field: shared, defaults to the empty string
pub fn thread_id_spec() -> ConfigurableFieldSpec {
    ConfigurableFieldSpec::new(THREAD_ID_FIELD, "String")
        .with_name("Thread ID")
        .with_description("Identity under which a run's checkpoints are stored and looked up.")
        .with_default(Value::String(String::new()))
        .shared()
}

/// Point-in-time field: shared, defaults to `null` (latest checkpoint)
pub fn thread_ts_spec() -> ConfigurableFieldSpec {
    ConfigurableFieldSpec::new(THREAD_TS_FIELD, "Option<DateTime<Utc>>")
        .with_name("Thread Timestamp")
        .with_description(
            "Read the latest checkpoint saved at or before this RFC 3339 instant. \
             None selects the most recent checkpoint.",
        )
        .shared()
}

/// The two fields every checkpoint store advertises
pub fn base_config_specs() -> Vec<ConfigurableFieldSpec> {
    vec![thread_id_spec(), thread_ts_spec()]
}

impl CheckpointConfig {
    /// Build a locator from resolved configuration values
    ///
    /// Missing fields take their spec default. `checkpoint_id` is accepted
    /// as an exact selector and every other key lands in `extra`.
    pub fn from_configurable(values: &HashMap<String, Value>) -> Result<Self> {
        let thread_id = match thread_id_spec().resolve(values) {
            Value::String(id) => id.clone(),
            other => {
                return Err(CheckpointError::Invalid(format!(
                    "{THREAD_ID_FIELD} must be a string, got {other}"
                )))
            }
        };

        let thread_ts = match thread_ts_spec().resolve(values) {
            Value::Null => None,
            Value::String(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| {
                        CheckpointError::Invalid(format!("{THREAD_TS_FIELD} '{raw}': {e}"))
                    })?
                    .with_timezone(&Utc),
            ),
            other => {
                return Err(CheckpointError::Invalid(format!(
                    "{THREAD_TS_FIELD} must be an RFC 3339 string or null, got {other}"
                )))
            }
        };

        let checkpoint_id = match values.get(CHECKPOINT_ID_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(other) => {
                return Err(CheckpointError::Invalid(format!(
                    "{CHECKPOINT_ID_FIELD} must be a string, got {other}"
                )))
            }
        };

        let extra = values
            .iter()
            .filter(|(key, _)| {
                ![THREAD_ID_FIELD, THREAD_TS_FIELD, CHECKPOINT_ID_FIELD].contains(&key.as_str())
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            thread_id,
            thread_ts,
            checkpoint_id,
            extra,
        })
    }
}
