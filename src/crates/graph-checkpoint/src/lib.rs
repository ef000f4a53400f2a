//! # graph-checkpoint - State Persistence for Step-Based Execution
//!
//! **Trait-based checkpoint abstractions** for persisting and restoring the
//! state of a step-based execution engine. A checkpoint is a versioned
//! snapshot of every channel value, captured after each completed step and
//! grouped under a thread identity.
//!
//! ## Overview
//!
//! Checkpoints enable:
//!
//! - **Resume** - Pick a run up from its latest checkpoint
//! - **Time-Travel Inspection** - Read the state at any earlier point
//! - **Audit Trails** - Walk a thread's full lineage with provenance metadata
//!
//! ## Core Concepts
//!
//! ### 1. Checkpoint
//!
//! A [`Checkpoint`] holds:
//! - **Channel values** - Current value of every named channel
//! - **Channel versions** - A monotonically increasing [`ChannelVersion`] per channel
//! - **Versions seen** - The last version of each channel every node observed
//!
//! [`Checkpoint::copy`] is cheap: channel values are shared through `Arc`,
//! while the nested `versions_seen` map is rebuilt with [`structural_clone`].
//!
//! ### 2. Metadata and Lineage
//!
//! Every saved checkpoint carries [`CheckpointMetadata`] (where it came from,
//! which step, what each node wrote) and a parent link. The parent is the
//! checkpoint the save's locator selected, so the history of a thread forms a
//! chain that can branch under manual edits.
//!
//! ### 3. CheckpointSaver Trait
//!
//! [`CheckpointSaver`] is the contract for persistence backends:
//!
//! - **`fetch_tuple()`** - Retrieve a checkpoint with its metadata and parent
//! - **`fetch_history()`** - Lazily stream a thread's checkpoints, newest first
//! - **`save()`** - Append a checkpoint and return its locator
//! - **`fetch_current()`** - Provided on top of `fetch_tuple()`
//! - **`config_specs()`** - The configurable fields the store understands
//!
//! ### 4. Codec
//!
//! Backends encode through a [`SerializerProtocol`] injected at construction.
//! [`JsonSerializer`] is the default; [`BincodeSerializer`] is a compact
//! option for concrete value types.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graph_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, InMemoryCheckpointSaver,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = InMemoryCheckpointSaver::new();
//!     let mut config = CheckpointConfig::new("thread-123");
//!
//!     let mut state: Checkpoint = Checkpoint::empty();
//!     config = saver.save(&config, state.copy(), CheckpointMetadata::input()).await?;
//!
//!     for step in 0..3 {
//!         state.write_channel("count", json!(step));
//!         state.mark_seen("counter", "count");
//!         config = saver
//!             .save(&config, state.copy(), CheckpointMetadata::loop_step(step))
//!             .await?;
//!     }
//!
//!     let resumed: Option<Checkpoint> = saver.fetch_current(&config.latest()).await?;
//!     println!("Resumed at: {:?}", resumed.and_then(|c| c.get("count").cloned()));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                Execution Engine (consumer)              │
//! │  • fetch_current() once at run start                    │
//! │  • save() after each completed step                     │
//! └────────────────────┬────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │           CheckpointSaver Trait (This Crate)            │
//! │  • fetch_tuple() / fetch_current()                      │
//! │  • fetch_history()                                      │
//! │  • save()                                               │
//! └────────────────────┬────────────────────────────────────┘
//!                      │ Implemented by
//!         ┌────────────┴────────────┬──────────────┐
//!         ▼                         ▼              ▼
//!  ┌──────────────┐    ┌─────────────────┐  ┌─────────┐
//!  │  In-Memory   │    │  PostgreSQL     │  │ Custom  │
//!  │ (Reference)  │    │  SQLite, ...    │  │         │
//!  └──────────────┘    └─────────────────┘  └─────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`checkpoint`] - [`Checkpoint`], [`CheckpointConfig`], [`CheckpointMetadata`], [`CheckpointTuple`]
//! - [`traits`] - [`CheckpointSaver`] trait, [`HistoryOptions`] and [`CheckpointStream`]
//! - [`memory`] - [`InMemoryCheckpointSaver`] reference implementation
//! - [`configurable`] - [`ConfigurableFieldSpec`] and the base field specs
//! - [`serializer`] - Codecs for stored checkpoints
//! - [`structural`] - Deep copy of nested containers
//! - [`error`] - [`CheckpointError`] types
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and spans but never installs a
//! subscriber.

pub mod checkpoint;
pub mod configurable;
pub mod error;
pub mod memory;
pub mod serializer;
pub mod structural;
pub mod traits;

// Re-export main types
pub use checkpoint::{
    ChannelVersion, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata,
    CheckpointSource, CheckpointTuple,
};
pub use configurable::{
    base_config_specs, ConfigurableFieldSpec, CHECKPOINT_ID_FIELD, THREAD_ID_FIELD,
    THREAD_TS_FIELD,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use structural::{structural_clone, StructuralClone};
pub use traits::{CheckpointSaver, CheckpointStream, HistoryOptions};
