//! In-memory checkpoint storage for development and testing
//!
//! This module provides **[`InMemoryCheckpointSaver`]**, a reference
//! implementation of the [`CheckpointSaver`] trait that keeps every thread's
//! history in a `tokio::sync::RwLock<HashMap>`. It is ideal for development,
//! tests and short-lived single-process runs where persistence across
//! restarts is not required.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  InMemoryCheckpointSaver<S: SerializerProtocol>              │
//! │                                                               │
//! │  Arc<RwLock<HashMap<thread_id, ThreadLog>>>                   │
//! │    thread_id: "session-1"                                     │
//! │      ├─ [0] step -1  saved_at t0                              │
//! │      ├─ [1] step 0   saved_at t1 > t0   parent → [0]          │
//! │      └─ [2] step 1   saved_at t2 > t1   parent → [1]          │
//! │                                                               │
//! │  StoredCheckpoint:                                            │
//! │    • config (thread_id, thread_ts = saved_at, checkpoint_id)  │
//! │    • checkpoint / metadata encoded with S                     │
//! │    • parent_config                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Checkpoints are stored encoded, so nothing the caller does after `save`
//! can reach the persisted copy. `saved_at` is strictly increasing within a
//! thread and serves as the `thread_ts` position of each entry.
//!
//! # Point-in-Time Selection
//!
//! A locator with `thread_ts` selects the entry with the greatest
//! `(saved_at, step, insertion index)` among those saved at or before it.
//!
//! # Quick Start
//!
//! ```rust
//! use graph_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, InMemoryCheckpointSaver,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> graph_checkpoint::Result<()> {
//! let saver = InMemoryCheckpointSaver::new();
//! let config = CheckpointConfig::new("session-1");
//!
//! let mut checkpoint: Checkpoint = Checkpoint::empty();
//! checkpoint.write_channel("count", json!(0));
//! let config = saver.save(&config, checkpoint, CheckpointMetadata::input()).await?;
//!
//! let current: Checkpoint = saver.fetch_current(&config).await?.expect("just saved");
//! assert_eq!(current.get("count"), Some(&json!(0)));
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! 1. **No Persistence** - All data lost on restart
//! 2. **Single Process** - Cannot share across processes
//! 3. **Memory Bound** - Limited by available RAM
//! 4. **No Retention** - Nothing is evicted unless `delete_thread()` or `clear()` is called

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    error::{CheckpointError, Result},
    serializer::{JsonSerializer, SerializerProtocol},
    traits::{CheckpointSaver, CheckpointStream, HistoryOptions},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage entry for in-memory checkpoints
#[derive(Debug)]
struct StoredCheckpoint {
    config: CheckpointConfig,
    saved_at: DateTime<Utc>,
    step: i64,
    format_version: i32,
    checkpoint: Vec<u8>,
    metadata: Vec<u8>,
    parent_config: Option<CheckpointConfig>,
}

impl StoredCheckpoint {
    fn decode<V, S>(&self, serializer: &S) -> Result<CheckpointTuple<V>>
    where
        V: DeserializeOwned,
        S: SerializerProtocol,
    {
        Ok(CheckpointTuple {
            config: self.config.clone(),
            checkpoint: serializer.loads(&self.checkpoint)?,
            metadata: Some(serializer.loads(&self.metadata)?),
            parent_config: self.parent_config.clone(),
        })
    }
}

/// One thread's history
///
/// `generation` is unique per thread incarnation: a thread deleted and then
/// saved to again gets a new one.
#[derive(Debug)]
struct ThreadLog {
    generation: u64,
    entries: Vec<Arc<StoredCheckpoint>>,
}

#[derive(Debug, Default)]
struct Threads {
    logs: HashMap<String, ThreadLog>,
    next_generation: u64,
}

impl Threads {
    fn entries(&self, thread_id: &str) -> &[Arc<StoredCheckpoint>] {
        self.logs
            .get(thread_id)
            .map(|log| log.entries.as_slice())
            .unwrap_or_default()
    }

    fn log_mut(&mut self, thread_id: &str) -> &mut ThreadLog {
        let next_generation = &mut self.next_generation;
        self.logs.entry(thread_id.to_string()).or_insert_with(|| {
            *next_generation += 1;
            ThreadLog {
                generation: *next_generation,
                entries: Vec::new(),
            }
        })
    }
}

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage = Arc<RwLock<Threads>>;

/// Index of the entry `config` selects within one thread's history
fn select(entries: &[Arc<StoredCheckpoint>], config: &CheckpointConfig) -> Option<usize> {
    if let Some(checkpoint_id) = &config.checkpoint_id {
        return entries
            .iter()
            .position(|entry| entry.config.checkpoint_id.as_ref() == Some(checkpoint_id));
    }

    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| config.thread_ts.map_or(true, |ts| entry.saved_at <= ts))
        .max_by_key(|(index, entry)| (entry.saved_at, entry.step, *index))
        .map(|(index, _)| index)
}

/// In-memory checkpoint saver implementation
///
/// This is a reference implementation that stores all checkpoints in memory.
/// The codec `S` is injected at construction; [`new`](Self::new) uses
/// [`JsonSerializer`].
///
/// Clones share the same storage.
///
/// # Example
///
/// ```rust
/// use graph_checkpoint::{BincodeSerializer, InMemoryCheckpointSaver};
///
/// let json_backed = InMemoryCheckpointSaver::new();
/// let compact = InMemoryCheckpointSaver::with_serializer(BincodeSerializer::new());
/// # let _ = (json_backed, compact);
/// ```
pub struct InMemoryCheckpointSaver<S = JsonSerializer> {
    storage: CheckpointStorage,
    serializer: Arc<S>,
}

impl InMemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver using the JSON codec
    pub fn new() -> Self {
        Self::with_serializer(JsonSerializer::new())
    }
}

impl Default for InMemoryCheckpointSaver {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for InMemoryCheckpointSaver<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            serializer: Arc::clone(&self.serializer),
        }
    }
}

impl<S: SerializerProtocol> fmt::Debug for InMemoryCheckpointSaver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCheckpointSaver")
            .field("codec", &self.serializer.format())
            .finish_non_exhaustive()
    }
}

impl<S: SerializerProtocol> InMemoryCheckpointSaver<S> {
    /// Create a saver that encodes checkpoints with `serializer`
    pub fn with_serializer(serializer: S) -> Self {
        Self {
            storage: Arc::new(RwLock::new(Threads::default())),
            serializer: Arc::new(serializer),
        }
    }

    /// Get the number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.logs.len()
    }

    /// Get the total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .logs
            .values()
            .map(|log| log.entries.len())
            .sum()
    }

    /// Delete a thread's whole history
    ///
    /// Returns `true` if the thread existed.
    pub async fn delete_thread(&self, thread_id: &str) -> bool {
        let removed = self.storage.write().await.logs.remove(thread_id).is_some();
        tracing::debug!(thread_id, removed, "Deleted checkpoint thread");
        removed
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.logs.clear();
    }
}

#[async_trait]
impl<V, S> CheckpointSaver<V> for InMemoryCheckpointSaver<S>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: SerializerProtocol + 'static,
{
    async fn fetch_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple<V>>> {
        let entry = {
            let storage = self.storage.read().await;
            let entries = storage.entries(&config.thread_id);
            select(entries, config).map(|index| Arc::clone(&entries[index]))
        };

        match entry {
            Some(entry) => {
                tracing::debug!(
                    thread_id = %config.thread_id,
                    checkpoint_id = ?entry.config.checkpoint_id,
                    step = entry.step,
                    "Resolved checkpoint"
                );
                entry.decode(&*self.serializer).map(Some)
            }
            None => {
                tracing::debug!(thread_id = %config.thread_id, "No checkpoint for locator");
                Ok(None)
            }
        }
    }

    async fn fetch_history(
        &self,
        config: &CheckpointConfig,
        options: HistoryOptions,
    ) -> Result<CheckpointStream<V>> {
        let thread_id = config.thread_id.clone();

        // Everything at or past `end` is excluded; entries appended later
        // land past it too. The walk is bound to the thread incarnation seen
        // here.
        let (generation, end) = {
            let storage = self.storage.read().await;
            let generation = storage.logs.get(&thread_id).map(|log| log.generation);
            let entries = storage.entries(&thread_id);
            let end = match &options.before {
                Some(before) => select(entries, before).unwrap_or(0),
                None => entries.len(),
            };
            (generation, end)
        };
        tracing::debug!(%thread_id, candidates = end, limit = ?options.limit, "Listing checkpoints");

        let storage = Arc::clone(&self.storage);
        let serializer = Arc::clone(&self.serializer);
        let HistoryOptions { filter, limit, .. } = options;

        let stream = async_stream::try_stream! {
            let mut cursor = end;
            let mut emitted = 0usize;

            while cursor > 0 && limit.map_or(true, |limit| emitted < limit) {
                cursor -= 1;

                // The lock is held only while fetching one entry.
                let entry = {
                    let storage = storage.read().await;
                    storage
                        .logs
                        .get(&thread_id)
                        .filter(|log| Some(log.generation) == generation)
                        .and_then(|log| log.entries.get(cursor))
                        .cloned()
                };
                let entry = match entry {
                    Some(entry) => entry,
                    // Thread deleted (or deleted and recreated) mid-iteration.
                    None => break,
                };

                let tuple: CheckpointTuple<V> = entry.decode(&*serializer)?;
                let keep = match (&filter, &tuple.metadata) {
                    (Some(filter), Some(metadata)) => metadata.matches(filter),
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                if keep {
                    emitted += 1;
                    yield tuple;
                }
            }
        };

        Ok(Box::pin(stream))
    }

    #[tracing::instrument(
        skip_all,
        fields(thread_id = %config.thread_id, source = %metadata.source, step = metadata.step)
    )]
    async fn save(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint<V>,
        metadata: CheckpointMetadata<V>,
    ) -> Result<CheckpointConfig> {
        if config.thread_id.is_empty() {
            tracing::warn!("Rejecting checkpoint without thread_id");
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }
        if let Err(e) = checkpoint.validate() {
            tracing::warn!(error = %e, "Rejecting inconsistent checkpoint");
            return Err(e);
        }

        let encoded_checkpoint = self.serializer.dumps(&checkpoint)?;
        let encoded_metadata = self.serializer.dumps(&metadata)?;

        let mut storage = self.storage.write().await;
        let entries = storage.entries(&config.thread_id);
        let parent = select(entries, config).map(|index| Arc::clone(&entries[index]));
        let last_saved_at = entries.last().map(|entry| entry.saved_at);

        if let (Some(checkpoint_id), None) = (&config.checkpoint_id, &parent) {
            tracing::warn!(%checkpoint_id, "Rejecting save from unknown checkpoint");
            return Err(CheckpointError::Invalid(format!(
                "checkpoint '{checkpoint_id}' does not exist in thread '{}'",
                config.thread_id
            )));
        }

        if let Some(parent) = &parent {
            if checkpoint.v < parent.format_version {
                tracing::warn!(
                    version = checkpoint.v,
                    parent_version = parent.format_version,
                    "Rejecting format version downgrade"
                );
                return Err(CheckpointError::Invalid(format!(
                    "format version {} is older than parent's {}",
                    checkpoint.v, parent.format_version
                )));
            }
        }

        let mut saved_at = Utc::now();
        if let Some(last) = last_saved_at {
            if saved_at <= last {
                saved_at = last + Duration::microseconds(1);
            }
        }

        let checkpoint_id = Uuid::new_v4().to_string();
        let encoded_checkpoint_len = encoded_checkpoint.len();
        let saved_config = CheckpointConfig {
            thread_id: config.thread_id.clone(),
            thread_ts: Some(saved_at),
            checkpoint_id: Some(checkpoint_id.clone()),
            extra: config.extra.clone(),
        };

        storage
            .log_mut(&config.thread_id)
            .entries
            .push(Arc::new(StoredCheckpoint {
                config: saved_config.clone(),
                saved_at,
                step: metadata.step,
                format_version: checkpoint.v,
                checkpoint: encoded_checkpoint,
                metadata: encoded_metadata,
                parent_config: parent.as_ref().map(|parent| parent.config.clone()),
            }));

        tracing::debug!(
            %checkpoint_id,
            codec = self.serializer.format(),
            bytes = encoded_checkpoint_len,
            parent_id = ?parent.as_ref().and_then(|p| p.config.checkpoint_id.as_deref()),
            "Saved checkpoint"
        );

        Ok(saved_config)
    }
}
