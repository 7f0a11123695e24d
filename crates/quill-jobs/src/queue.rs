//! Single-worker classification task queue.
//!
//! Tasks are processed strictly in enqueue order by one drain loop at a
//! time; a swap on the processing flag keeps concurrent triggers from
//! spawning parallel workers. A failed task stays in `error` state. The
//! queue never retries on its own, it just keeps going with the next task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use quill_cluster::ClassificationEngine;
use quill_core::{
    defaults, ClassificationStatus, ClusterRepository, ClusteringConfig, EmbeddingRepository,
    EmbeddingStats, Result, TaskRepository,
};
use quill_db::Database;

/// Queue lifecycle events published on a broadcast channel.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A task was added to the queue.
    Enqueued { task_id: Uuid, note_id: Uuid },
    /// Enqueue was a no-op because a pending task for the note exists.
    Deduplicated { note_id: Uuid },
    /// A task was claimed by the worker.
    TaskStarted { task_id: Uuid, note_id: Uuid },
    /// A task finished successfully.
    TaskCompleted { task_id: Uuid, note_id: Uuid },
    /// A task failed terminally (no automatic retry).
    TaskFailed {
        task_id: Uuid,
        note_id: Uuid,
        error: String,
    },
    /// The worker drained the queue and stopped.
    Drained { processed: usize },
}

/// Durable FIFO queue of classification tasks with a single background
/// worker.
#[derive(Clone)]
pub struct TaskQueue {
    db: Database,
    engine: Arc<ClassificationEngine>,
    config: ClusteringConfig,
    is_processing: Arc<AtomicBool>,
    events: broadcast::Sender<QueueEvent>,
}

struct ProcessingGuard(Arc<AtomicBool>);

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TaskQueue {
    /// Create a queue over the given store and engine.
    pub fn new(db: Database, engine: Arc<ClassificationEngine>, config: ClusteringConfig) -> Self {
        let (events, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            db,
            engine,
            config,
            is_processing: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Subscribe to queue lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Enqueue a classification task for a note and kick the worker if it
    /// is idle. Idempotent while a pending task for the same note exists.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "queue", op = "enqueue", note_id = %note_id))]
    pub async fn enqueue_note(&self, note_id: Uuid) -> Result<Option<Uuid>> {
        match self.db.tasks.enqueue_deduplicated(note_id).await? {
            Some(task_id) => {
                let _ = self.events.send(QueueEvent::Enqueued { task_id, note_id });
                self.process_queue();
                Ok(Some(task_id))
            }
            None => {
                let _ = self.events.send(QueueEvent::Deduplicated { note_id });
                Ok(None)
            }
        }
    }

    /// Whether the worker is currently draining the queue.
    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    /// Start the background worker if it is not already running. Returns
    /// true when a new worker was spawned. Enqueueing kicks this
    /// automatically; calling it directly drains tasks left pending by an
    /// earlier process (startup recovery).
    pub fn process_queue(&self) -> bool {
        if self.is_processing.swap(true, Ordering::SeqCst) {
            return false;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            loop {
                let guard = ProcessingGuard(queue.is_processing.clone());
                let outcome = queue.drain().await;
                drop(guard);
                if let Err(e) = outcome {
                    warn!(
                        subsystem = "jobs",
                        component = "queue",
                        error = %e,
                        "Queue worker stopped on store error"
                    );
                    return;
                }
                // A task enqueued between the final empty claim and the flag
                // release would otherwise sit pending until the next trigger.
                match queue.db.tasks.stats().await {
                    Ok(stats) if stats.pending > 0 => {
                        if queue.is_processing.swap(true, Ordering::SeqCst) {
                            return;
                        }
                    }
                    _ => return,
                }
            }
        });
        true
    }

    /// Drain the queue on the current task, returning the number of tasks
    /// processed. Returns 0 immediately when a worker is already active.
    pub async fn run_until_drained(&self) -> Result<usize> {
        if self.is_processing.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }
        let _guard = ProcessingGuard(self.is_processing.clone());
        self.drain().await
    }

    /// Snapshot of queue, cluster, and embedding statistics.
    pub async fn status(&self) -> Result<ClassificationStatus> {
        Ok(ClassificationStatus {
            is_processing: self.is_processing(),
            queue: self.db.tasks.stats().await?,
            clusters: self.db.clusters.stats().await?,
            embeddings: EmbeddingStats {
                count: self.db.embeddings.count().await?,
            },
        })
    }

    /// Worker loop body. Caller holds the processing flag.
    async fn drain(&self) -> Result<usize> {
        let mut processed = 0usize;

        while let Some(task) = self.db.tasks.claim_next().await? {
            let _ = self.events.send(QueueEvent::TaskStarted {
                task_id: task.id,
                note_id: task.note_id,
            });

            match self.engine.classify_note(task.note_id).await {
                Ok(cluster_id) => {
                    self.db.tasks.complete(task.id).await?;
                    debug!(
                        subsystem = "jobs",
                        component = "queue",
                        task_id = %task.id,
                        note_id = %task.note_id,
                        cluster_id = %cluster_id,
                        "Task completed"
                    );
                    let _ = self.events.send(QueueEvent::TaskCompleted {
                        task_id: task.id,
                        note_id: task.note_id,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    self.db.tasks.fail(task.id, &message).await?;
                    warn!(
                        subsystem = "jobs",
                        component = "queue",
                        task_id = %task.id,
                        note_id = %task.note_id,
                        error = %message,
                        "Task failed"
                    );
                    let _ = self.events.send(QueueEvent::TaskFailed {
                        task_id: task.id,
                        note_id: task.note_id,
                        error: message,
                    });
                }
            }
            processed += 1;

            // Throttle between tasks so bursts do not saturate the
            // embedding provider.
            if self.config.inter_task_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.inter_task_delay_ms)).await;
            }
        }

        let pruned = self
            .db
            .tasks
            .cleanup(self.config.keep_finished_tasks)
            .await?;
        info!(
            subsystem = "jobs",
            component = "queue",
            op = "drained",
            processed,
            pruned,
            "Queue drained"
        );
        let _ = self.events.send(QueueEvent::Drained { processed });
        Ok(processed)
    }
}
