//! Store contract checks run against the in-memory backend and a backend
//! whose storage medium always fails.

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use graph_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointError, CheckpointMetadata, CheckpointSaver,
    CheckpointSource, CheckpointStream, CheckpointTuple, HistoryOptions, InMemoryCheckpointSaver,
    Result, THREAD_ID_FIELD, THREAD_TS_FIELD,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counter_state(count: i64) -> Checkpoint {
    let mut checkpoint = Checkpoint::empty();
    checkpoint.write_channel("count", json!(count));
    checkpoint.mark_seen("counter", "count");
    checkpoint
}

async fn collect_history(
    saver: &impl CheckpointSaver,
    config: &CheckpointConfig,
    options: HistoryOptions,
) -> Vec<CheckpointTuple> {
    saver
        .fetch_history(config, options)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn save_then_fetch_returns_what_was_saved() {
    let saver = InMemoryCheckpointSaver::new();
    let locator_a = CheckpointConfig::new("session");
    let checkpoint = counter_state(1);
    let metadata = CheckpointMetadata::input().with_write("__start__", json!({"count": 1}));

    let locator_b = saver
        .save(&locator_a, checkpoint.clone(), metadata.clone())
        .await
        .unwrap();

    let tuple: CheckpointTuple = saver.fetch_tuple(&locator_b).await.unwrap().unwrap();
    assert_eq!(tuple.checkpoint, checkpoint);
    assert_eq!(tuple.metadata, Some(metadata));
    // locator_a had no prior state
    assert_eq!(tuple.parent_config, None);
}

#[tokio::test]
async fn parent_resolves_to_locators_prior_state() {
    let saver = InMemoryCheckpointSaver::new();
    let first = saver
        .save(&CheckpointConfig::new("session"), counter_state(0), CheckpointMetadata::input())
        .await
        .unwrap();

    // A bare thread locator resolves to the latest checkpoint.
    let prior: CheckpointTuple = saver
        .fetch_tuple(&CheckpointConfig::new("session"))
        .await
        .unwrap()
        .unwrap();
    let second = saver
        .save(
            &CheckpointConfig::new("session"),
            counter_state(1),
            CheckpointMetadata::loop_step(0),
        )
        .await
        .unwrap();

    let tuple: CheckpointTuple = saver.fetch_tuple(&second).await.unwrap().unwrap();
    assert_eq!(tuple.parent_config, Some(prior.config));
    assert_eq!(tuple.parent_config, Some(first));
}

#[tokio::test]
async fn sequential_saves_list_newest_first() {
    let saver = InMemoryCheckpointSaver::new();
    let first = saver
        .save(&CheckpointConfig::new("session"), counter_state(0), CheckpointMetadata::input())
        .await
        .unwrap();
    let second = saver
        .save(&first, counter_state(1), CheckpointMetadata::loop_step(0))
        .await
        .unwrap();

    let history = collect_history(&saver, &second, HistoryOptions::new()).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].config, second);
    assert_eq!(history[1].config, first);
    assert_ne!(history[0].config.checkpoint_id, history[1].config.checkpoint_id);
}

#[tokio::test]
async fn unknown_thread_is_absent_not_an_error() {
    let saver = InMemoryCheckpointSaver::new();
    saver
        .save(&CheckpointConfig::new("other"), counter_state(0), CheckpointMetadata::input())
        .await
        .unwrap();

    let config = CheckpointConfig::new("never-saved");
    let tuple: Option<CheckpointTuple> = saver.fetch_tuple(&config).await.unwrap();
    assert!(tuple.is_none());
    assert!(collect_history(&saver, &config, HistoryOptions::new())
        .await
        .is_empty());
}

#[tokio::test]
async fn fetch_current_agrees_with_fetch_tuple() {
    let saver = InMemoryCheckpointSaver::new();
    let mut config = CheckpointConfig::new("session");
    let mut locators = vec![CheckpointConfig::new("missing"), config.clone()];
    for step in 0..3 {
        config = saver
            .save(&config, counter_state(step), CheckpointMetadata::loop_step(step))
            .await
            .unwrap();
        locators.push(config.clone());
    }
    locators.push(CheckpointConfig::new("session").with_checkpoint_id("no-such-id"));

    for locator in &locators {
        let tuple: Option<CheckpointTuple> = saver.fetch_tuple(locator).await.unwrap();
        let current: Option<Checkpoint> = saver.fetch_current(locator).await.unwrap();
        assert_eq!(current, tuple.map(|t| t.checkpoint), "locator {locator:?}");
    }
}

#[tokio::test]
async fn config_specs_advertise_thread_fields() {
    let saver = InMemoryCheckpointSaver::new();
    let specs = CheckpointSaver::<Value>::config_specs(&saver);

    let thread_id = specs.iter().find(|s| s.id == THREAD_ID_FIELD).unwrap();
    assert!(thread_id.is_shared);
    assert_eq!(thread_id.default, json!(""));
    assert!(thread_id.dependencies.is_none());

    let thread_ts = specs.iter().find(|s| s.id == THREAD_TS_FIELD).unwrap();
    assert!(thread_ts.is_shared);
    assert_eq!(thread_ts.default, Value::Null);
    assert!(thread_ts.dependencies.is_none());
}

#[tokio::test]
async fn locator_built_from_configurable_values() {
    let saver = InMemoryCheckpointSaver::new();
    let saved = saver
        .save(&CheckpointConfig::new("session"), counter_state(7), CheckpointMetadata::input())
        .await
        .unwrap();

    let mut values = HashMap::new();
    values.insert(THREAD_ID_FIELD.to_string(), json!("session"));
    values.insert(
        THREAD_TS_FIELD.to_string(),
        json!(saved.thread_ts.unwrap().to_rfc3339()),
    );
    let config = CheckpointConfig::from_configurable(&values).unwrap();

    let current: Checkpoint = saver.fetch_current(&config).await.unwrap().unwrap();
    assert_eq!(current.get("count"), Some(&json!(7)));
}

#[tokio::test]
async fn point_in_time_reads_older_state() {
    let saver = InMemoryCheckpointSaver::new();
    let mut config = CheckpointConfig::new("session");
    let mut saved = Vec::new();
    for step in 0..4 {
        config = saver
            .save(&config, counter_state(step * 10), CheckpointMetadata::loop_step(step))
            .await
            .unwrap();
        saved.push(config.clone());
    }

    for (step, locator) in saved.iter().enumerate() {
        let at = CheckpointConfig::new("session").with_thread_ts(locator.thread_ts.unwrap());
        let current: Checkpoint = saver.fetch_current(&at).await.unwrap().unwrap();
        assert_eq!(current.get("count"), Some(&json!(step as i64 * 10)));
    }

    // checkpoint_id wins over thread_ts
    let mixed = saved[0].clone().with_thread_ts(saved[3].thread_ts.unwrap());
    let tuple: CheckpointTuple = saver.fetch_tuple(&mixed).await.unwrap().unwrap();
    assert_eq!(tuple.config, saved[0]);
}

#[tokio::test]
async fn saving_from_an_older_locator_branches() {
    let saver = InMemoryCheckpointSaver::new();
    let root = saver
        .save(&CheckpointConfig::new("session"), counter_state(0), CheckpointMetadata::input())
        .await
        .unwrap();
    let main = saver
        .save(&root, counter_state(1), CheckpointMetadata::loop_step(0))
        .await
        .unwrap();

    let edited = saver
        .save(&root, counter_state(99), CheckpointMetadata::update(0))
        .await
        .unwrap();

    let tuple: CheckpointTuple = saver.fetch_tuple(&edited).await.unwrap().unwrap();
    assert_eq!(tuple.parent_config, Some(root.clone()));

    let lineage: Vec<CheckpointTuple> = saver.fetch_lineage(&edited).await.unwrap();
    let ids: Vec<_> = lineage.iter().map(|t| t.config.clone()).collect();
    assert_eq!(ids, vec![edited.clone(), root]);

    // The branch is the newest entry; the original step stays in history.
    let history = collect_history(&saver, &edited, HistoryOptions::new()).await;
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].config, edited);
    assert_eq!(history[1].config, main);
    assert_eq!(
        history[0].metadata.as_ref().unwrap().source,
        CheckpointSource::Update
    );
}

#[tokio::test]
async fn history_can_be_abandoned_early() {
    let saver = InMemoryCheckpointSaver::new();
    let mut config = CheckpointConfig::new("session");
    for step in 0..10 {
        config = saver
            .save(&config, counter_state(step), CheckpointMetadata::loop_step(step))
            .await
            .unwrap();
    }

    let mut stream: CheckpointStream = saver
        .fetch_history(&config, HistoryOptions::new())
        .await
        .unwrap();
    let newest = stream.next().await.unwrap().unwrap();
    assert_eq!(newest.metadata.unwrap().step, 9);
    drop(stream);

    saver.delete_thread("session").await;
    assert_eq!(saver.checkpoint_count().await, 0);
}

#[tokio::test]
async fn history_pages_with_before() {
    let saver = InMemoryCheckpointSaver::new();
    let mut config = CheckpointConfig::new("session");
    for step in 0..7 {
        config = saver
            .save(&config, counter_state(step), CheckpointMetadata::loop_step(step))
            .await
            .unwrap();
    }

    let mut pages = Vec::new();
    let mut options = HistoryOptions::new().with_limit(3);
    loop {
        let page = collect_history(&saver, &config, options.clone()).await;
        let Some(last) = page.last() else { break };
        options = options.with_before(last.config.clone());
        pages.push(
            page.iter()
                .map(|t| t.metadata.as_ref().unwrap().step)
                .collect::<Vec<_>>(),
        );
    }

    assert_eq!(pages, vec![vec![6, 5, 4], vec![3, 2, 1], vec![0]]);
}

#[tokio::test]
async fn copy_shares_values_but_isolates_versions_seen() {
    let original = counter_state(5);
    let mut copied = original.copy();
    assert_eq!(copied, original);

    copied.write_channel("count", json!(6));
    copied.mark_seen("counter", "count");
    copied.mark_seen("printer", "count");

    assert_eq!(original.get("count"), Some(&json!(5)));
    assert_eq!(original.versions_seen.len(), 1);
    assert_eq!(original.versions_seen["counter"]["count"].0, 1);
    assert_eq!(copied.versions_seen["counter"]["count"].0, 2);
}

/// Backend whose storage medium fails on every call
#[derive(Default)]
struct UnreachableStore {
    calls: AtomicUsize,
}

impl UnreachableStore {
    fn fail(&self) -> CheckpointError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        CheckpointError::Storage("connection refused".to_string())
    }
}

#[async_trait]
impl CheckpointSaver for UnreachableStore {
    async fn fetch_tuple(&self, _config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        Err(self.fail())
    }

    async fn fetch_history(
        &self,
        _config: &CheckpointConfig,
        _options: HistoryOptions,
    ) -> Result<CheckpointStream> {
        // Opening succeeds; the first pull hits the medium.
        let error = self.fail();
        Ok(Box::pin(stream::once(async move {
            Err::<CheckpointTuple, _>(error)
        })))
    }

    async fn save(
        &self,
        _config: &CheckpointConfig,
        _checkpoint: Checkpoint,
        _metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        Err(self.fail())
    }
}

#[tokio::test]
async fn storage_errors_propagate_unchanged() {
    let store = UnreachableStore::default();
    let config = CheckpointConfig::new("session");

    let err = store.fetch_current(&config).await.unwrap_err();
    assert!(matches!(err, CheckpointError::Storage(ref msg) if msg == "connection refused"));

    let err = store.fetch_lineage(&config).await.unwrap_err();
    assert!(matches!(err, CheckpointError::Storage(_)));

    let err = store
        .save(&config, Checkpoint::empty(), CheckpointMetadata::input())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckpointError::Storage(_)));

    let mut history = store
        .fetch_history(&config, HistoryOptions::new())
        .await
        .unwrap();
    assert!(matches!(
        history.next().await,
        Some(Err(CheckpointError::Storage(_)))
    ));

    assert_eq!(store.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn stores_work_behind_a_trait_object() {
    let stores: Vec<Box<dyn CheckpointSaver>> = vec![
        Box::new(InMemoryCheckpointSaver::new()),
        Box::new(UnreachableStore::default()),
    ];

    let results: Vec<bool> = futures::future::join_all(
        stores
            .iter()
            .map(|store| async move { store.fetch_tuple(&CheckpointConfig::new("t")).await.is_ok() }),
    )
    .await;
    assert_eq!(results, vec![true, false]);
}
