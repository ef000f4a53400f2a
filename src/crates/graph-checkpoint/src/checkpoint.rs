//! Core checkpoint data structures for state persistence and time-travel
//!
//! This module defines the types exchanged between the execution engine and a
//! checkpoint store: **[`Checkpoint`]**, **[`CheckpointMetadata`]**,
//! **[`CheckpointConfig`]** and **[`CheckpointTuple`]**.
//!
//! # Overview
//!
//! - **State Snapshots** - Channel values at the end of a superstep
//! - **Version Tracking** - A counter per channel, bumped on every write
//! - **Versions Seen** - Per node, the channel versions it last consumed
//! - **Provenance** - Source, step number and writes that produced a snapshot
//! - **Lineage** - Parent links between tuples, one history per thread
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CheckpointTuple                                             │
//! │  ┌────────────────────────────────────────┐                 │
//! │  │  CheckpointConfig (locator)            │                 │
//! │  │  • thread_id: "user-123"               │                 │
//! │  │  • thread_ts: 2024-01-01T12:00:00Z     │                 │
//! │  │  • checkpoint_id: "uuid-abc"           │                 │
//! │  └────────────────────────────────────────┘                 │
//! │  ┌────────────────────────────────────────┐                 │
//! │  │  Checkpoint                            │                 │
//! │  │  • v: 1                                 │                 │
//! │  │  • channel_values: {"messages": [...]}  │                 │
//! │  │  • channel_versions: {"messages": 5}    │                 │
//! │  │  • versions_seen: {                     │                 │
//! │  │      "agent": {"messages": 4}           │                 │
//! │  │    }                                    │                 │
//! │  └────────────────────────────────────────┘                 │
//! │  ┌────────────────────────────────────────┐                 │
//! │  │  CheckpointMetadata                    │                 │
//! │  │  • source: loop, step: 5               │                 │
//! │  │  • writes: {"agent": {...}}            │                 │
//! │  └────────────────────────────────────────┘                 │
//! │  parent_config: Option<CheckpointConfig>                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! A checkpoint produced through [`Checkpoint::write_channel`] and
//! [`Checkpoint::mark_seen`] always satisfies:
//!
//! 1. every key of `channel_values` is a key of `channel_versions`;
//! 2. `versions_seen[node][channel] <= channel_versions[channel]`.
//!
//! [`Checkpoint::validate`] checks both; stores call it before persisting.
//!
//! # Copy Semantics
//!
//! [`Checkpoint::copy`] shares channel value references (`Arc<V>`) because
//! values are replaced wholesale on write, never mutated in place. The
//! `versions_seen` map is mutated in place by the engine, so it is rebuilt
//! with [`StructuralClone`].
//!
//! ```rust
//! use graph_checkpoint::Checkpoint;
//! use serde_json::json;
//!
//! let mut base: Checkpoint = Checkpoint::empty();
//! base.write_channel("messages", json!(["hello"]));
//! base.mark_seen("agent", "messages");
//!
//! let mut next = base.copy();
//! next.write_channel("messages", json!(["hello", "world"]));
//! next.mark_seen("agent", "messages");
//!
//! assert_eq!(base.get("messages"), Some(&json!(["hello"])));
//! assert_eq!(base.versions_seen["agent"]["messages"].0, 1);
//! assert_eq!(next.versions_seen["agent"]["messages"].0, 2);
//! ```
//!
//! # Checkpoint Sources
//!
//! | Source | When Created | Step |
//! |--------|--------------|------|
//! | `Input` | Run invoked with external input | `-1` |
//! | `Loop` | After each superstep | `0, 1, 2, ...` |
//! | `Update` | Manual, out-of-band state edit | step it was applied at |

use crate::error::{CheckpointError, Result};
use crate::structural::StructuralClone;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Monotonic per-channel version counter
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelVersion(pub u64);

impl ChannelVersion {
    /// Version assigned to a channel on its first write
    pub const INITIAL: ChannelVersion = ChannelVersion(1);

    /// Get the next version
    pub fn next(self) -> Self {
        ChannelVersion(self.0 + 1)
    }
}

impl fmt::Display for ChannelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StructuralClone for ChannelVersion {
    fn structural_clone(&self) -> Self {
        *self
    }
}

/// Mapping from channel name to version
pub type ChannelVersions = HashMap<String, ChannelVersion>;

/// State snapshot at a given point in time
///
/// `V` is the channel value type. It defaults to `serde_json::Value`; the
/// checkpoint layer never inspects values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<V = Value> {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// Creation time, for display and debugging only
    pub ts: DateTime<Utc>,

    /// The values of the channels at the time of the checkpoint
    pub channel_values: HashMap<String, Arc<V>>,

    /// The versions of the channels at the time of the checkpoint
    pub channel_versions: ChannelVersions,

    /// Map from node name to map from channel name to version seen
    pub versions_seen: HashMap<String, ChannelVersions>,
}

impl<V> Checkpoint<V> {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a checkpoint from existing state
    pub fn new(
        channel_values: HashMap<String, V>,
        channel_versions: ChannelVersions,
        versions_seen: HashMap<String, ChannelVersions>,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            ts: Utc::now(),
            channel_values: channel_values
                .into_iter()
                .map(|(channel, value)| (channel, Arc::new(value)))
                .collect(),
            channel_versions,
            versions_seen,
        }
    }

    /// Create an empty checkpoint
    pub fn empty() -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            ts: Utc::now(),
            channel_values: HashMap::new(),
            channel_versions: HashMap::new(),
            versions_seen: HashMap::new(),
        }
    }

    /// Copy this checkpoint
    ///
    /// `channel_values` and `channel_versions` are copied one level deep: the
    /// maps are new, the value `Arc`s are shared. `versions_seen` is rebuilt
    /// structurally so that neither side can observe the other's mutations.
    pub fn copy(&self) -> Self {
        Self {
            v: self.v,
            ts: self.ts,
            channel_values: self.channel_values.clone(),
            channel_versions: self.channel_versions.clone(),
            versions_seen: self.versions_seen.structural_clone(),
        }
    }

    /// Stamp the checkpoint with the current time
    ///
    /// [`copy`](Self::copy) keeps the source's `ts`; the engine calls this on
    /// the copy it carries into a new step.
    pub fn touch(&mut self) -> &mut Self {
        self.ts = Utc::now();
        self
    }

    /// Current value of a channel
    pub fn get(&self, channel: &str) -> Option<&V> {
        self.channel_values.get(channel).map(Arc::as_ref)
    }

    /// Current version of a channel
    pub fn version(&self, channel: &str) -> Option<ChannelVersion> {
        self.channel_versions.get(channel).copied()
    }

    /// Replace a channel's value and bump its version
    ///
    /// Returns the new version.
    pub fn write_channel(&mut self, channel: impl Into<String>, value: V) -> ChannelVersion {
        let channel = channel.into();
        let version = self
            .version(&channel)
            .map_or(ChannelVersion::INITIAL, ChannelVersion::next);
        self.channel_versions.insert(channel.clone(), version);
        self.channel_values.insert(channel, Arc::new(value));
        version
    }

    /// Record that `node` has consumed the current version of `channel`
    ///
    /// Returns the recorded version, or `None` if the channel was never
    /// written.
    pub fn mark_seen(&mut self, node: impl Into<String>, channel: &str) -> Option<ChannelVersion> {
        let version = self.version(channel)?;
        self.versions_seen
            .entry(node.into())
            .or_default()
            .insert(channel.to_string(), version);
        Some(version)
    }

    /// Channels written since `node` last saw them, sorted by name
    pub fn updated_since(&self, node: &str) -> Vec<String> {
        let seen = self.versions_seen.get(node);
        let mut channels: Vec<String> = self
            .channel_versions
            .iter()
            .filter(|(channel, version)| {
                seen.and_then(|s| s.get(channel.as_str()))
                    .map_or(true, |seen_version| seen_version < *version)
            })
            .map(|(channel, _)| channel.clone())
            .collect();
        channels.sort();
        channels
    }

    /// Check the value/version invariants
    pub fn validate(&self) -> Result<()> {
        if let Some(channel) = self
            .channel_values
            .keys()
            .find(|channel| !self.channel_versions.contains_key(channel.as_str()))
        {
            return Err(CheckpointError::Invalid(format!(
                "channel '{channel}' has a value but no version"
            )));
        }

        for (node, seen) in &self.versions_seen {
            for (channel, seen_version) in seen {
                match self.channel_versions.get(channel) {
                    Some(current) if seen_version <= current => {}
                    current => {
                        return Err(CheckpointError::Invalid(format!(
                            "node '{node}' saw version {seen_version} of channel '{channel}', \
                             current version is {}",
                            current.map_or_else(|| "unset".to_string(), |v| v.to_string())
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Metadata source type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Checkpoint created from an input to a run invocation
    Input,
    /// Checkpoint created from inside the execution loop
    Loop,
    /// Checkpoint created from a manual state update
    Update,
}

impl CheckpointSource {
    /// Serialized name
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointSource::Input => "input",
            CheckpointSource::Loop => "loop",
            CheckpointSource::Update => "update",
        }
    }
}

impl fmt::Display for CheckpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata<V = Value> {
    /// The source of the checkpoint
    pub source: CheckpointSource,

    /// The step number of the checkpoint
    /// -1 for the first "input" checkpoint
    /// 0 for the first "loop" checkpoint
    /// n for the nth checkpoint afterwards
    pub step: i64,

    /// Values written by each node during the transition to this checkpoint
    #[serde(default = "HashMap::new")]
    pub writes: HashMap<String, V>,

    /// Additional custom metadata
    #[serde(default = "HashMap::new")]
    pub extra: HashMap<String, Value>,
}

impl<V> CheckpointMetadata<V> {
    /// Create metadata for an arbitrary source and step
    pub fn new(source: CheckpointSource, step: i64) -> Self {
        Self {
            source,
            step,
            writes: HashMap::new(),
            extra: HashMap::new(),
        }
    }

    /// Metadata for the initial checkpoint of a run
    pub fn input() -> Self {
        Self::new(CheckpointSource::Input, -1)
    }

    /// Metadata for the checkpoint written after superstep `step`
    pub fn loop_step(step: i64) -> Self {
        Self::new(CheckpointSource::Loop, step)
    }

    /// Metadata for a manual state edit applied at `step`
    pub fn update(step: i64) -> Self {
        Self::new(CheckpointSource::Update, step)
    }

    /// Set all node writes
    pub fn with_writes(mut self, writes: HashMap<String, V>) -> Self {
        self.writes = writes;
        self
    }

    /// Record the value written by one node
    pub fn with_write(mut self, node: impl Into<String>, value: V) -> Self {
        self.writes.insert(node.into(), value);
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether every filter entry matches
    ///
    /// `source` and `step` match the corresponding fields; any other key is
    /// looked up in `extra`.
    pub fn matches(&self, filter: &HashMap<String, Value>) -> bool {
        filter.iter().all(|(key, expected)| match key.as_str() {
            "source" => expected.as_str() == Some(self.source.as_str()),
            "step" => expected.as_i64() == Some(self.step),
            _ => self.extra.get(key) == Some(expected),
        })
    }
}

/// Locator identifying a thread and, optionally, a point in its history
///
/// With neither `thread_ts` nor `checkpoint_id` set, the locator selects the
/// latest checkpoint of the thread.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Thread ID for grouping related checkpoints
    #[serde(default)]
    pub thread_id: String,

    /// Select the latest checkpoint saved at or before this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<DateTime<Utc>>,

    /// Backend-assigned checkpoint ID, takes precedence over `thread_ts`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,

    /// Backend-specific fields
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointConfig {
    /// Locator for the latest checkpoint of a thread
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            ..Self::default()
        }
    }

    /// Set the point-in-time selector
    pub fn with_thread_ts(mut self, thread_ts: DateTime<Utc>) -> Self {
        self.thread_ts = Some(thread_ts);
        self
    }

    /// Set the checkpoint ID
    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    /// Add a backend-specific field
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Same thread, selectors cleared
    pub fn latest(&self) -> Self {
        Self {
            thread_id: self.thread_id.clone(),
            thread_ts: None,
            checkpoint_id: None,
            extra: self.extra.clone(),
        }
    }
}

/// A tuple containing a checkpoint and its associated data
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointTuple<V = Value> {
    /// Locator of this checkpoint
    pub config: CheckpointConfig,

    /// The checkpoint itself
    pub checkpoint: Checkpoint<V>,

    /// Metadata associated with the checkpoint
    pub metadata: Option<CheckpointMetadata<V>>,

    /// Locator of the checkpoint this one was derived from
    pub parent_config: Option<CheckpointConfig>,
}

impl<V> CheckpointTuple<V> {
    /// Create a new checkpoint tuple
    pub fn new(config: CheckpointConfig, checkpoint: Checkpoint<V>) -> Self {
        Self {
            config,
            checkpoint,
            metadata: None,
            parent_config: None,
        }
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: CheckpointMetadata<V>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Set the parent configuration
    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }
}
