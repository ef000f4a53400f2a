//! Checkpoint store contract for custom backend implementations
//!
//! This module defines the **[`CheckpointSaver`]** trait, the contract every
//! checkpoint persistence backend satisfies, plus the stream and option types
//! used by history queries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Execution Engine                                            │
//! │  • run start:    fetch_tuple(locator)                        │
//! │  • each step:    locator = save(locator, checkpoint, meta)   │
//! │  • inspection:   fetch_history(locator, options)             │
//! └───────────────┬─────────────────────────────────────────────┘
//!                 │ CheckpointSaver trait
//!                 ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Backend                                             │
//! │  • InMemoryCheckpointSaver (reference)                       │
//! │  • PostgreSQL / SQLite / Redis / custom                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Method Reference
//!
//! | Method | Required | Notes |
//! |--------|----------|-------|
//! | [`fetch_tuple`](CheckpointSaver::fetch_tuple) | yes | latest, at/before `thread_ts`, or exact `checkpoint_id` |
//! | [`fetch_history`](CheckpointSaver::fetch_history) | yes | lazy, most-recent-first |
//! | [`save`](CheckpointSaver::save) | yes | appends, never overwrites |
//! | [`fetch_current`](CheckpointSaver::fetch_current) | provided | `fetch_tuple(..).checkpoint` |
//! | [`fetch_lineage`](CheckpointSaver::fetch_lineage) | provided | follows parent links |
//! | [`config_specs`](CheckpointSaver::config_specs) | provided | extend, never drop the base two |
//!
//! # Consistency
//!
//! - A missing thread or checkpoint is `Ok(None)` / an empty stream, never an
//!   error.
//! - After `save` returns, `fetch_tuple` and `fetch_history` on that thread
//!   observe the new checkpoint.
//! - A single logical writer per thread is assumed. Stores do not reconcile
//!   concurrent saves to the same thread from independent callers.
//! - Readers may run alongside the writer and may observe a slightly older
//!   snapshot.
//! - Storage failures surface as [`CheckpointError::Storage`](crate::CheckpointError::Storage)
//!   with no retry at this layer.
//!
//! # Implementing a Backend
//!
//! ```rust,ignore
//! use graph_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointStream,
//!     CheckpointTuple, HistoryOptions, Result,
//! };
//! use async_trait::async_trait;
//!
//! struct PostgresCheckpointSaver {
//!     pool: sqlx::PgPool,
//! }
//!
//! #[async_trait]
//! impl CheckpointSaver for PostgresCheckpointSaver {
//!     async fn fetch_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
//!         // SELECT ... WHERE thread_id = $1 AND saved_at <= $2
//!         // ORDER BY saved_at DESC, step DESC LIMIT 1
//!         todo!()
//!     }
//!
//!     async fn fetch_history(
//!         &self,
//!         config: &CheckpointConfig,
//!         options: HistoryOptions,
//!     ) -> Result<CheckpointStream> {
//!         // Stream rows from a cursor; dropping the stream closes it.
//!         todo!()
//!     }
//!
//!     async fn save(
//!         &self,
//!         config: &CheckpointConfig,
//!         checkpoint: Checkpoint,
//!         metadata: CheckpointMetadata,
//!     ) -> Result<CheckpointConfig> {
//!         // INSERT (never UPSERT) and return the new row's locator
//!         todo!()
//!     }
//! }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    configurable::{base_config_specs, ConfigurableFieldSpec},
    error::{CheckpointError, Result},
};
use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;

/// Type alias for async stream of checkpoint tuples
pub type CheckpointStream<V = Value> =
    Pin<Box<dyn Stream<Item = Result<CheckpointTuple<V>>> + Send + 'static>>;

/// Narrowing options for [`CheckpointSaver::fetch_history`]
///
/// The default enumerates the whole thread.
#[derive(Debug, Clone, Default)]
pub struct HistoryOptions {
    /// Metadata entries that must all match (see [`CheckpointMetadata::matches`])
    pub filter: Option<HashMap<String, Value>>,

    /// Only checkpoints strictly older than the one this locator selects
    pub before: Option<CheckpointConfig>,

    /// Maximum number of tuples to yield
    pub limit: Option<usize>,
}

impl HistoryOptions {
    /// Options that enumerate the whole thread, newest first
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a metadata entry
    pub fn with_filter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.filter
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Start below the checkpoint `config` selects
    pub fn with_before(mut self, config: CheckpointConfig) -> Self {
        self.before = Some(config);
        self
    }

    /// Cap the number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Core trait for implementing checkpoint storage backends
///
/// `V` is the channel value type carried by checkpoints and metadata writes.
///
/// ## Required Methods
///
/// - `fetch_tuple` - Retrieve one checkpoint
/// - `fetch_history` - Stream a thread's checkpoints
/// - `save` - Persist a new checkpoint
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` so one store can serve many
/// concurrent runs.
#[async_trait]
pub trait CheckpointSaver<V = Value>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Retrieve a checkpoint tuple for the locator.
    ///
    /// - `checkpoint_id` set: that exact checkpoint
    /// - `thread_ts` set: the latest checkpoint saved at or before it, ties
    ///   broken deterministically by the backend
    /// - neither: the latest checkpoint of the thread
    ///
    /// Returns `Ok(None)` when nothing matches.
    async fn fetch_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple<V>>>;

    /// Fetch just the checkpoint for the locator
    ///
    /// `None` exactly when [`fetch_tuple`](Self::fetch_tuple) returns `None`.
    async fn fetch_current(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint<V>>> {
        Ok(self.fetch_tuple(config).await?.map(|tuple| tuple.checkpoint))
    }

    /// Stream the thread's checkpoints, most recent first.
    ///
    /// The stream is pull-driven: each item may wait on backend I/O, and
    /// dropping the stream early must release any backend cursor. An unknown
    /// thread yields an empty stream. Selectors on `config` are ignored; use
    /// [`HistoryOptions::before`] to page.
    async fn fetch_history(
        &self,
        config: &CheckpointConfig,
        options: HistoryOptions,
    ) -> Result<CheckpointStream<V>>;

    /// Persist a checkpoint chained from the one `config` selects.
    ///
    /// Every call appends a new entry to the thread; nothing is overwritten.
    /// The tuple's `parent_config` is the locator of whatever
    /// [`fetch_tuple`](Self::fetch_tuple) resolved `config` to, or `None` for
    /// the first checkpoint of a thread. A `checkpoint_id` that selects
    /// nothing is rejected rather than starting a new root.
    ///
    /// Returns the locator of the new checkpoint. Pass it to the next `save`
    /// to extend the lineage.
    async fn save(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint<V>,
        metadata: CheckpointMetadata<V>,
    ) -> Result<CheckpointConfig>;

    /// Walk parent links from the checkpoint `config` selects back to the
    /// root of its lineage.
    ///
    /// The first element is the selected checkpoint. Empty when nothing
    /// matches.
    async fn fetch_lineage(&self, config: &CheckpointConfig) -> Result<Vec<CheckpointTuple<V>>> {
        let mut lineage: Vec<CheckpointTuple<V>> = Vec::new();
        let mut next = self.fetch_tuple(config).await?;

        while let Some(tuple) = next {
            let parent = tuple.parent_config.clone();
            lineage.push(tuple);

            next = match parent {
                Some(parent) => {
                    if lineage.iter().any(|seen| seen.config == parent) {
                        return Err(CheckpointError::Invalid(format!(
                            "parent links of thread '{}' form a cycle",
                            config.thread_id
                        )));
                    }
                    self.fetch_tuple(&parent).await?
                }
                None => None,
            };
        }

        Ok(lineage)
    }

    /// Configuration fields this store understands
    fn config_specs(&self) -> Vec<ConfigurableFieldSpec> {
        base_config_specs()
    }
}
