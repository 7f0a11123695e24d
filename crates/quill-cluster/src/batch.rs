//! Bulk batch classification (preview-then-confirm path).
//!
//! A coarser, LLM-tag-based grouping strategy offered alongside the
//! embedding engine's `reclassify_all`. The note set is partitioned into
//! fixed-size batches; each batch is tagged by the model with bounded
//! retries, and every completed batch's result is persisted before the
//! next one starts. That ordering is the resumability contract: a paused
//! or crashed run continues from `current_batch` with all earlier results
//! intact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use quill_core::{
    defaults, BatchResult, BatchStateRepository, BatchStatus, BatchTaskState, ClusteringConfig,
    Error, Note, NotePreview, Result, TagAssignment, TagBackend, TopicGroup,
};
use quill_db::Database;

use crate::pause::PauseToken;

/// Runner for the bulk batch-classification task.
pub struct BatchClassifier {
    db: Database,
    tagger: Arc<dyn TagBackend>,
    config: ClusteringConfig,
    pause: PauseToken,
    running: Arc<AtomicBool>,
    state_tx: watch::Sender<BatchTaskState>,
}

/// Clears the running flag when a run exits, on every path.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BatchClassifier {
    /// Create a batch classifier over the given store and tag backend.
    pub fn new(db: Database, tagger: Arc<dyn TagBackend>, config: ClusteringConfig) -> Self {
        let (state_tx, _) = watch::channel(BatchTaskState::idle());
        Self {
            db,
            tagger,
            config,
            pause: PauseToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            state_tx,
        }
    }

    /// Subscribe to persisted-state snapshots as the run progresses.
    pub fn subscribe(&self) -> watch::Receiver<BatchTaskState> {
        self.state_tx.subscribe()
    }

    /// Request a cooperative pause. The in-flight batch completes; the
    /// runner stops before starting the next one.
    pub fn pause(&self) {
        self.pause.pause();
        info!(
            subsystem = "cluster",
            component = "batch",
            op = "pause",
            "Batch classification pause requested"
        );
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Load the persisted task state.
    pub async fn state(&self) -> Result<BatchTaskState> {
        self.db.batch.load().await
    }

    /// Load all cached per-batch results, in batch order.
    pub async fn cached_results(&self) -> Result<Vec<BatchResult>> {
        self.db.batch.load_results().await
    }

    /// Start (or resume) batch classification over `notes`.
    ///
    /// A paused task over the same note count and batch layout resumes from
    /// its saved `current_batch`; anything else starts fresh and clears
    /// prior cached results. Errors if a run is already active or `notes`
    /// is empty.
    #[instrument(skip(self, notes), fields(subsystem = "cluster", component = "batch", op = "start", input_count = notes.len()))]
    pub async fn start(&self, notes: &[Note]) -> Result<BatchTaskState> {
        if notes.is_empty() {
            return Err(Error::Validation("No notes to classify".into()));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Task("Batch classification already running".into()));
        }
        let _guard = RunGuard(self.running.clone());
        self.pause.resume();

        let total_batches = notes.len().div_ceil(self.config.tag_batch_size) as i64;
        let mut state = self.db.batch.load().await?;

        // Saved batch indices only line up with the current slicing when the
        // batch size is unchanged; otherwise resuming would skip or re-tag
        // notes.
        if state.status == BatchStatus::Paused
            && state.total_notes == notes.len() as i64
            && state.total_batches == total_batches
        {
            info!(
                current_batch = state.current_batch,
                total_batches = state.total_batches,
                "Resuming paused batch classification"
            );
            state.status = BatchStatus::Running;
        } else {
            self.db.batch.clear_results().await?;
            state = BatchTaskState {
                status: BatchStatus::Running,
                total_notes: notes.len() as i64,
                processed_notes: 0,
                current_batch: 0,
                total_batches,
                error: None,
                started_at: Some(chrono::Utc::now()),
                completed_at: None,
                retry_count: 0,
            };
            info!(total_batches, "Starting batch classification");
        }
        self.db.batch.save(&state).await?;
        self.state_tx.send_replace(state.clone());

        self.run_batches(notes, state).await
    }

    /// Retry a failed task, continuing from the batch that failed. All
    /// previously completed batch results are preserved.
    #[instrument(skip(self, notes), fields(subsystem = "cluster", component = "batch", op = "retry"))]
    pub async fn retry(&self, notes: &[Note]) -> Result<BatchTaskState> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Task("Batch classification already running".into()));
        }
        let _guard = RunGuard(self.running.clone());
        self.pause.resume();

        let mut state = self.db.batch.load().await?;
        if state.status != BatchStatus::Error {
            return Err(Error::Task(format!(
                "No failed batch task to retry (status: {})",
                state.status.as_str()
            )));
        }
        if state.total_notes != notes.len() as i64 {
            return Err(Error::Task(format!(
                "Note count changed since failure ({} vs {})",
                state.total_notes,
                notes.len()
            )));
        }
        let total_batches = notes.len().div_ceil(self.config.tag_batch_size) as i64;
        if state.total_batches != total_batches {
            return Err(Error::Task(format!(
                "Batch size changed since failure ({} vs {} batches)",
                state.total_batches, total_batches
            )));
        }

        info!(
            current_batch = state.current_batch,
            total_batches = state.total_batches,
            "Retrying failed batch classification"
        );
        state.status = BatchStatus::Running;
        state.error = None;
        state.retry_count = 0;
        self.db.batch.save(&state).await?;
        self.state_tx.send_replace(state.clone());

        self.run_batches(notes, state).await
    }

    /// Reset the task to idle and drop all cached results.
    pub async fn clear(&self) -> Result<()> {
        if self.is_running() {
            return Err(Error::Task(
                "Cannot clear while batch classification is running".into(),
            ));
        }
        self.db.batch.clear_results().await?;
        let state = BatchTaskState::idle();
        self.db.batch.save(&state).await?;
        self.state_tx.send_replace(state);
        Ok(())
    }

    /// Aggregate all cached batch results into proposed topic groups.
    pub async fn grouped_results(&self) -> Result<Vec<TopicGroup>> {
        let results = self.cached_results().await?;
        let assignments: Vec<TagAssignment> = results
            .into_iter()
            .flat_map(|r| r.assignments)
            .collect();
        Ok(merge_and_group_results(
            &assignments,
            self.config.min_topic_size,
        ))
    }

    async fn run_batches(
        &self,
        notes: &[Note],
        mut state: BatchTaskState,
    ) -> Result<BatchTaskState> {
        let batch_size = self.config.tag_batch_size;

        while state.current_batch < state.total_batches {
            if self.pause.is_paused() {
                state.status = BatchStatus::Paused;
                self.db.batch.save(&state).await?;
                self.state_tx.send_replace(state.clone());
                info!(
                    current_batch = state.current_batch,
                    "Batch classification paused"
                );
                return Ok(state);
            }

            let batch_index = state.current_batch;
            let start = batch_index as usize * batch_size;
            let end = (start + batch_size).min(notes.len());
            let previews: Vec<NotePreview> = notes[start..end]
                .iter()
                .map(|n| NotePreview::from_content(n.id, &n.content, self.config.preview_max_chars))
                .collect();

            match self.run_one_batch(batch_index, &previews, &mut state).await? {
                BatchOutcome::Completed => {
                    state.processed_notes += previews.len() as i64;
                    state.current_batch += 1;
                    self.db.batch.save(&state).await?;
                    self.state_tx.send_replace(state.clone());
                }
                BatchOutcome::Failed(message) => {
                    state.status = BatchStatus::Error;
                    state.error = Some(message);
                    self.db.batch.save(&state).await?;
                    self.state_tx.send_replace(state.clone());
                    return Ok(state);
                }
            }
        }

        state.status = BatchStatus::Completed;
        state.completed_at = Some(chrono::Utc::now());
        self.db.batch.save(&state).await?;
        self.state_tx.send_replace(state.clone());
        info!(
            total_batches = state.total_batches,
            processed = state.processed_notes,
            "Batch classification completed"
        );
        Ok(state)
    }

    /// Run one batch with bounded retries. The result is persisted before
    /// returning `Completed`.
    async fn run_one_batch(
        &self,
        batch_index: i64,
        previews: &[NotePreview],
        state: &mut BatchTaskState,
    ) -> Result<BatchOutcome> {
        let max_attempts = self.config.batch_max_retries.max(1);

        for attempt in 1..=max_attempts {
            match self.tagger.tag_notes(previews).await {
                Ok(assignments) => {
                    self.db
                        .batch
                        .save_result(&BatchResult {
                            batch_index,
                            assignments,
                        })
                        .await?;
                    debug!(
                        batch_index,
                        notes = previews.len(),
                        attempt,
                        "Batch tagged"
                    );
                    return Ok(BatchOutcome::Completed);
                }
                Err(e) => {
                    warn!(
                        batch_index,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Batch tagging attempt failed"
                    );
                    state.retry_count += 1;
                    self.db.batch.save(state).await?;
                    if attempt < max_attempts {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.batch_retry_delay_ms,
                        ))
                        .await;
                    } else {
                        return Ok(BatchOutcome::Failed(format!(
                            "Batch {} failed after {} attempts: {}",
                            batch_index, max_attempts, e
                        )));
                    }
                }
            }
        }
        unreachable!("retry loop always returns");
    }
}

enum BatchOutcome {
    Completed,
    Failed(String),
}

/// Aggregate per-note tag assignments into proposed topic groups.
///
/// Notes are grouped by tag (case-insensitive); a note may appear under
/// several topics but never twice within one. Groups are sorted by
/// descending size, then every group smaller than `min_topic_size` (plus
/// any group literally tagged "other") is folded into a single catch-all
/// group appended at the end.
pub fn merge_and_group_results(
    assignments: &[TagAssignment],
    min_topic_size: usize,
) -> Vec<TopicGroup> {
    // Keyed by lowercased tag; display name keeps the first-seen casing.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (String, Vec<Uuid>)> = HashMap::new();

    for assignment in assignments {
        for tag in &assignment.tags {
            let key = tag.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            let entry = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                (tag.trim().to_string(), Vec::new())
            });
            if !entry.1.contains(&assignment.note_id) {
                entry.1.push(assignment.note_id);
            }
        }
    }

    let mut named: Vec<(String, TopicGroup)> = order
        .into_iter()
        .filter_map(|key| {
            let (name, note_ids) = groups.remove(&key)?;
            Some((key, TopicGroup { name, note_ids }))
        })
        .collect();
    named.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut result = Vec::new();
    let mut catch_all: Vec<Uuid> = Vec::new();
    for (key, group) in named {
        if group.len() < min_topic_size || key == "other" {
            for note_id in group.note_ids {
                if !catch_all.contains(&note_id) {
                    catch_all.push(note_id);
                }
            }
        } else {
            result.push(group);
        }
    }

    if !catch_all.is_empty() {
        result.push(TopicGroup {
            name: defaults::CATCH_ALL_TOPIC.to_string(),
            note_ids: catch_all,
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(note_id: Uuid, tags: &[&str]) -> TagAssignment {
        TagAssignment {
            note_id,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_grouping_by_tag_case_insensitive() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let groups = merge_and_group_results(
            &[
                assignment(a, &["Cooking"]),
                assignment(b, &["cooking"]),
            ],
            2,
        );

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Cooking");
        assert_eq!(groups[0].note_ids, vec![a, b]);
    }

    #[test]
    fn test_note_may_appear_in_multiple_groups_but_not_twice_in_one() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let groups = merge_and_group_results(
            &[
                assignment(a, &["cooking", "health", "cooking"]),
                assignment(b, &["cooking", "health"]),
            ],
            2,
        );

        assert_eq!(groups.len(), 2);
        for group in &groups {
            assert_eq!(group.len(), 2);
        }
    }

    #[test]
    fn test_groups_sorted_by_descending_size() {
        let notes: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let mut assignments = vec![
            assignment(notes[0], &["small"]),
            assignment(notes[1], &["small"]),
        ];
        for note in &notes {
            assignments.push(assignment(*note, &["big"]));
        }

        let groups = merge_and_group_results(&assignments, 2);
        assert_eq!(groups[0].name, "big");
        assert_eq!(groups[0].len(), 5);
        assert_eq!(groups[1].name, "small");
    }

    #[test]
    fn test_small_groups_fold_into_catch_all() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let groups = merge_and_group_results(
            &[
                assignment(a, &["travel"]),
                assignment(b, &["travel"]),
                assignment(c, &["singleton"]),
            ],
            2,
        );

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "travel");
        assert_eq!(groups[1].name, defaults::CATCH_ALL_TOPIC);
        assert_eq!(groups[1].note_ids, vec![c]);
    }

    #[test]
    fn test_other_tag_always_folds() {
        let notes: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let assignments: Vec<TagAssignment> = notes
            .iter()
            .map(|n| assignment(*n, &["Other"]))
            .collect();

        let groups = merge_and_group_results(&assignments, 2);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, defaults::CATCH_ALL_TOPIC);
        assert_eq!(groups[0].len(), 3);
    }

    #[test]
    fn test_empty_assignments_yield_no_groups() {
        assert!(merge_and_group_results(&[], 2).is_empty());
    }
}
