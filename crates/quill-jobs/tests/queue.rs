//! Integration tests for the durable classification task queue.

use std::sync::Arc;
use std::time::Duration;

use quill_cluster::ClassificationEngine;
use quill_core::{ClusteringConfig, EmbeddingBackend, TaskStatus};
use quill_db::{
    ClusterRepository, Database, EmbeddingRepository, NoteRepository, TaskRepository,
};
use quill_inference::MockInferenceBackend;
use quill_jobs::{QueueEvent, TaskQueue};
use uuid::Uuid;

async fn test_db() -> Database {
    Database::connect_in_memory()
        .await
        .expect("in-memory database should connect")
}

fn fast_config() -> ClusteringConfig {
    ClusteringConfig::default().with_inter_task_delay_ms(0)
}

fn queue(db: &Database, mock: &MockInferenceBackend, config: ClusteringConfig) -> TaskQueue {
    let engine = Arc::new(ClassificationEngine::new(
        db.clone(),
        Arc::new(mock.clone()) as Arc<dyn EmbeddingBackend>,
        config.clone(),
    ));
    TaskQueue::new(db.clone(), engine, config)
}

async fn seed_notes(db: &Database, contents: &[&str]) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(contents.len());
    for content in contents {
        ids.push(db.notes.insert(content).await.unwrap());
    }
    ids
}

/// Wait until no tasks are pending or in flight and the worker has stopped.
async fn wait_idle(queue: &TaskQueue, db: &Database) {
    for _ in 0..500 {
        let stats = db.tasks.stats().await.unwrap();
        if stats.pending == 0 && stats.processing == 0 && !queue.is_processing() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue did not settle in time");
}

#[tokio::test]
async fn enqueue_alone_drives_the_task_to_completion() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["grocery list"]).await;
    let mock = MockInferenceBackend::new();
    let queue = queue(&db, &mock, fast_config());

    // No explicit process call: enqueueing kicks the worker.
    queue.enqueue_note(ids[0]).await.unwrap();
    wait_idle(&queue, &db).await;

    let stats = db.tasks.stats().await.unwrap();
    assert_eq!(stats.done, 1);
    assert_eq!(db.embeddings.count().await.unwrap(), 1);
    assert_eq!(db.clusters.stats().await.unwrap().count, 1);
}

#[tokio::test]
async fn enqueue_deduplicates_pending_tasks() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["busy work", "grocery list"]).await;
    let mock = MockInferenceBackend::new().with_latency_ms(100);
    let queue = queue(&db, &mock, fast_config());

    // Occupy the worker so the second note stays pending.
    queue.enqueue_note(ids[0]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let first = queue.enqueue_note(ids[1]).await.unwrap();
    let second = queue.enqueue_note(ids[1]).await.unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(db.tasks.stats().await.unwrap().pending, 1);

    wait_idle(&queue, &db).await;
    assert_eq!(db.tasks.stats().await.unwrap().done, 2);
}

#[tokio::test]
async fn note_can_be_requeued_after_its_task_finishes() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["grocery list"]).await;
    let mock = MockInferenceBackend::new();
    let queue = queue(&db, &mock, fast_config());

    queue.enqueue_note(ids[0]).await.unwrap();
    wait_idle(&queue, &db).await;

    assert!(queue.enqueue_note(ids[0]).await.unwrap().is_some());
    wait_idle(&queue, &db).await;
    assert_eq!(db.tasks.stats().await.unwrap().done, 2);
}

#[tokio::test]
async fn tasks_are_processed_in_enqueue_order() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["first note", "second note", "third note"]).await;
    let mock = MockInferenceBackend::new();
    let queue = queue(&db, &mock, fast_config());

    for id in &ids {
        queue.enqueue_note(*id).await.unwrap();
    }
    wait_idle(&queue, &db).await;

    assert_eq!(db.tasks.stats().await.unwrap().done, 3);
    let embed_inputs: Vec<String> = mock
        .get_calls()
        .into_iter()
        .filter(|c| c.operation == "embed_text")
        .map(|c| c.input)
        .collect();
    assert_eq!(embed_inputs, vec!["first note", "second note", "third note"]);
}

#[tokio::test]
async fn failed_task_does_not_stop_the_worker() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["will fail", "will succeed"]).await;
    let mock = MockInferenceBackend::new();
    let queue = queue(&db, &mock, fast_config());

    // The first claimed task hits the scripted failure.
    mock.fail_next_embeds(1);
    for id in &ids {
        queue.enqueue_note(*id).await.unwrap();
    }
    wait_idle(&queue, &db).await;

    let stats = db.tasks.stats().await.unwrap();
    assert_eq!(stats.error, 1);
    assert_eq!(stats.done, 1);

    let failed = db
        .tasks
        .list_recent(10)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.status == TaskStatus::Error)
        .expect("one task should be in error state");
    assert_eq!(failed.note_id, ids[0]);
    assert!(failed.error.is_some());
}

#[tokio::test]
async fn drain_prunes_finished_tasks_beyond_keep_limit() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["one", "two", "three", "four"]).await;
    let mock = MockInferenceBackend::new();
    let mut config = fast_config();
    config.keep_finished_tasks = 2;
    let queue = queue(&db, &mock, config);

    for id in &ids {
        queue.enqueue_note(*id).await.unwrap();
    }
    wait_idle(&queue, &db).await;

    // All four notes were classified; only the two most recent terminal
    // rows survive the post-drain cleanup.
    assert_eq!(db.embeddings.count().await.unwrap(), 4);
    let stats = db.tasks.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.done, 2);
}

#[tokio::test]
async fn status_reports_queue_cluster_and_embedding_counts() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["alpha", "beta"]).await;
    let mock = MockInferenceBackend::new().with_latency_ms(50);
    let queue = queue(&db, &mock, fast_config());

    for id in &ids {
        queue.enqueue_note(*id).await.unwrap();
    }
    let busy = queue.status().await.unwrap();
    assert!(busy.is_processing);
    assert_eq!(busy.queue.total, 2);

    wait_idle(&queue, &db).await;

    let settled = queue.status().await.unwrap();
    assert!(!settled.is_processing);
    assert_eq!(settled.queue.pending, 0);
    assert_eq!(settled.queue.done, 2);
    assert_eq!(settled.embeddings.count, 2);
    assert_eq!(settled.clusters.total_notes, 2);
}

#[tokio::test]
async fn events_trace_the_task_lifecycle() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["solo note"]).await;
    let mock = MockInferenceBackend::new();
    let queue = queue(&db, &mock, fast_config());
    let mut events = queue.subscribe();

    let task_id = queue.enqueue_note(ids[0]).await.unwrap().unwrap();

    match events.recv().await.unwrap() {
        QueueEvent::Enqueued {
            task_id: t,
            note_id,
        } => {
            assert_eq!(t, task_id);
            assert_eq!(note_id, ids[0]);
        }
        other => panic!("expected Enqueued, got {:?}", other),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        QueueEvent::TaskStarted { .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        QueueEvent::TaskCompleted { .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        QueueEvent::Drained { processed: 1 }
    ));
}

#[tokio::test]
async fn failure_event_carries_the_error_message() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["doomed"]).await;
    let mock = MockInferenceBackend::new();
    let queue = queue(&db, &mock, fast_config());
    let mut events = queue.subscribe();

    mock.fail_next_embeds(1);
    queue.enqueue_note(ids[0]).await.unwrap();

    let mut saw_failure = false;
    loop {
        match events.recv().await.unwrap() {
            QueueEvent::TaskFailed { note_id, error, .. } => {
                assert_eq!(note_id, ids[0]);
                assert!(!error.is_empty());
                saw_failure = true;
            }
            QueueEvent::Drained { .. } => break,
            _ => continue,
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn only_one_worker_drains_at_a_time() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["slow one", "slow two"]).await;
    let mock = MockInferenceBackend::new().with_latency_ms(60);
    let queue = queue(&db, &mock, fast_config());

    for id in &ids {
        queue.enqueue_note(*id).await.unwrap();
    }

    assert!(queue.is_processing());
    assert!(!queue.process_queue());
    assert_eq!(queue.run_until_drained().await.unwrap(), 0);

    wait_idle(&queue, &db).await;
    assert_eq!(db.tasks.stats().await.unwrap().done, 2);
}

#[tokio::test]
async fn process_queue_recovers_tasks_left_from_an_earlier_run() {
    let db = test_db().await;
    let ids = seed_notes(&db, &["leftover note"]).await;
    let mock = MockInferenceBackend::new();

    // A task persisted by a previous process, with no enqueue this run.
    db.tasks.enqueue_deduplicated(ids[0]).await.unwrap();

    let queue = queue(&db, &mock, fast_config());
    assert_eq!(db.tasks.stats().await.unwrap().pending, 1);
    assert!(queue.process_queue());

    wait_idle(&queue, &db).await;
    assert_eq!(db.tasks.stats().await.unwrap().done, 1);
    assert_eq!(db.embeddings.count().await.unwrap(), 1);
}
