//! A toy step loop persisting its state after every step
//!
//! Two nodes share a `count` channel: `incrementer` bumps it whenever
//! `doubler` has produced a new value, and `doubler` doubles it whenever
//! `incrementer` has. Each node runs only when a channel it reads changed
//! since it last looked, which is what `versions_seen` tracks.
//!
//! The run stops halfway, resumes from the store, then reads an older
//! checkpoint back by timestamp.
//!
//! ```text
//! RUST_LOG=graph_checkpoint=debug cargo run --example step_loop
//! ```

use futures::TryStreamExt;
use graph_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointTuple,
    HistoryOptions, InMemoryCheckpointSaver, Result,
};
use serde_json::{json, Value};

const NODES: [&str; 2] = ["incrementer", "doubler"];

fn apply(node: &str, count: i64) -> i64 {
    match node {
        "incrementer" => count + 1,
        _ => count * 2,
    }
}

/// Run up to `steps` steps, saving a checkpoint after each.
async fn run(
    saver: &InMemoryCheckpointSaver,
    thread_id: &str,
    steps: i64,
) -> Result<CheckpointConfig> {
    let mut config = CheckpointConfig::new(thread_id);

    let resumed: Option<CheckpointTuple> = saver.fetch_tuple(&config).await?;
    let (mut state, mut step) = match resumed {
        Some(CheckpointTuple {
            config: saved,
            checkpoint,
            metadata,
            ..
        }) => {
            let step = metadata.map_or(-1, |m| m.step);
            tracing::info!(thread_id, step, "Resuming from checkpoint");
            config = saved;
            (checkpoint, step + 1)
        }
        None => {
            let mut state: Checkpoint = Checkpoint::empty();
            state.write_channel("count", json!(1));
            config = saver
                .save(&config, state.copy(), CheckpointMetadata::input())
                .await?;
            (state, 0)
        }
    };

    let stop = step + steps;
    while step < stop {
        let mut metadata = CheckpointMetadata::loop_step(step);
        state.touch();

        for node in NODES {
            let fresh = state.updated_since(node);
            if fresh.is_empty() && state.versions_seen.contains_key(node) {
                continue;
            }
            let count = state.get("count").and_then(Value::as_i64).unwrap_or_default();
            let next = apply(node, count);
            state.write_channel("count", json!(next));
            // Each node reacts to the other's writes, not its own.
            state.mark_seen(node, "count");
            metadata = metadata.with_write(node, json!(next));
        }

        config = saver.save(&config, state.copy(), metadata).await?;
        step += 1;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let saver = InMemoryCheckpointSaver::new();

    let halfway = run(&saver, "demo", 3).await?;
    tracing::info!(checkpoint_id = ?halfway.checkpoint_id, "Stopped after three steps");

    let latest = run(&saver, "demo", 3).await?;

    let history: Vec<CheckpointTuple> = saver
        .fetch_history(&latest, HistoryOptions::new())
        .await?
        .try_collect()
        .await?;
    for tuple in &history {
        let metadata = tuple.metadata.as_ref();
        println!(
            "{:>3} {:<6} count={}",
            metadata.map_or(0, |m| m.step),
            metadata.map_or("?", |m| m.source.as_str()),
            tuple.checkpoint.get("count").unwrap_or(&Value::Null),
        );
    }

    if let Some(ts) = halfway.thread_ts {
        let past = CheckpointConfig::new("demo").with_thread_ts(ts);
        let then: Option<Checkpoint> = saver.fetch_current(&past).await?;
        println!(
            "count at {ts}: {}",
            then.as_ref()
                .and_then(|c| c.get("count"))
                .unwrap_or(&Value::Null)
        );
    }

    let lineage: Vec<CheckpointTuple> = saver.fetch_lineage(&latest).await?;
    println!("lineage length: {}", lineage.len());

    Ok(())
}
