//! Incremental classification engine.
//!
//! One note at a time: embed, upsert, join the nearest cluster when its
//! centroid is similar enough, otherwise open a new singleton cluster.
//! Two maintenance passes keep the partition healthy: oversized clusters
//! are bisected, and the closest cluster pair is merged when nearly
//! coincident. A full-corpus rebuild (`reclassify_all`) replays the same
//! join-or-create logic after regenerating every embedding in batches.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use quill_core::{
    Cluster, ClusterRepository, ClusteringConfig, EmbeddingBackend, EmbeddingRepository, Error,
    Note, NoteRepository, ReclassifyProgress, ReclassifyReport, Result, Vector,
};
use quill_db::Database;

use crate::naming::{derive_cluster_name, derive_cluster_name_from_members};
use crate::vector::{centroid, cosine_similarity, find_nearest_cluster};

/// The incremental semantic clustering engine.
///
/// All cluster-store mutation is serialized through an internal mutex, so
/// the incremental path and a concurrently invoked `reclassify_all` cannot
/// interleave read-modify-write sequences on the same clusters.
pub struct ClassificationEngine {
    db: Database,
    embedder: Arc<dyn EmbeddingBackend>,
    config: ClusteringConfig,
    store_lock: Mutex<()>,
    progress: watch::Sender<ReclassifyProgress>,
}

impl ClassificationEngine {
    /// Create an engine over the given store and embedding backend.
    pub fn new(db: Database, embedder: Arc<dyn EmbeddingBackend>, config: ClusteringConfig) -> Self {
        let (progress, _) = watch::channel(ReclassifyProgress::default());
        Self {
            db,
            embedder,
            config,
            store_lock: Mutex::new(()),
            progress,
        }
    }

    /// Subscribe to reclassification progress updates.
    pub fn subscribe_progress(&self) -> watch::Receiver<ReclassifyProgress> {
        self.progress.subscribe()
    }

    /// Classify a single note: embed it and place it in the cluster
    /// partition. Returns the id of the cluster the note ended up in.
    #[instrument(skip(self), fields(subsystem = "cluster", component = "engine", op = "classify_note", note_id = %note_id))]
    pub async fn classify_note(&self, note_id: Uuid) -> Result<Uuid> {
        let start = Instant::now();

        // A missing note and an empty note are the same caller mistake here:
        // nothing to classify.
        let note = match self.db.notes.fetch(note_id).await {
            Ok(note) => note,
            Err(Error::NoteNotFound(id)) => {
                return Err(Error::Validation(format!(
                    "Note {} does not exist, nothing to classify",
                    id
                )))
            }
            Err(e) => return Err(e),
        };
        if note.content.trim().is_empty() {
            return Err(Error::Validation(format!(
                "Note {} has no content to classify",
                note_id
            )));
        }

        let vector = self.embedder.embed_text(&note.content).await?;
        self.db
            .embeddings
            .upsert(note_id, &vector, self.embedder.model_name())
            .await?;

        let _guard = self.store_lock.lock().await;
        let cluster_id = self
            .assign_note_locked(note_id, &note.content, &vector)
            .await?;
        self.merge_check_locked().await?;

        info!(
            cluster_id = %cluster_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Note classified"
        );
        Ok(cluster_id)
    }

    /// Remove a note's embedding and strip it from any cluster membership.
    /// Clusters emptied by the removal are deleted.
    #[instrument(skip(self), fields(subsystem = "cluster", component = "engine", op = "cleanup_note", note_id = %note_id))]
    pub async fn cleanup_note(&self, note_id: Uuid) -> Result<()> {
        self.db.embeddings.delete(note_id).await?;

        let _guard = self.store_lock.lock().await;
        for mut cluster in self.db.clusters.list_all().await? {
            if !cluster.remove_note(note_id) {
                continue;
            }
            if cluster.is_empty() {
                self.db.clusters.delete(cluster.id).await?;
                debug!(cluster_id = %cluster.id, "Emptied cluster removed");
            } else {
                self.recompute_centroid(&mut cluster).await?;
                self.db.clusters.upsert(&cluster).await?;
            }
        }
        Ok(())
    }

    /// Full-corpus rebuild: regenerate every embedding, then replay the
    /// join-or-create logic over all notes in original order, finishing
    /// with one merge pass.
    ///
    /// Destructive to existing cluster assignments; callers must invoke it
    /// explicitly. A corpus with zero non-empty notes yields
    /// `success: false` without touching existing clusters.
    #[instrument(skip(self), fields(subsystem = "cluster", component = "engine", op = "reclassify_all"))]
    pub async fn reclassify_all(&self) -> Result<ReclassifyReport> {
        let start = Instant::now();

        let notes = self.db.notes.list_all().await?;
        let valid: Vec<Note> = notes
            .into_iter()
            .filter(|n| !n.content.trim().is_empty())
            .collect();
        let total = valid.len();

        if total == 0 {
            let clusters = self.db.clusters.stats().await?.count as usize;
            warn!("Reclassification requested with no valid notes");
            return Ok(ReclassifyReport {
                success: false,
                total: 0,
                completed: 0,
                errors: 0,
                clusters,
                error: Some("No notes with content to classify".to_string()),
            });
        }

        let _guard = self.store_lock.lock().await;
        self.db.clusters.clear().await?;

        // Phase 1 (~80% of progress): regenerate embeddings in batches,
        // falling back to throttled per-note calls when a batch call fails.
        let mut vectors: HashMap<Uuid, Vector> = HashMap::new();
        let mut failed: HashSet<Uuid> = HashSet::new();
        let mut embedded = 0usize;

        for chunk in valid.chunks(self.config.embed_batch_size) {
            let texts: Vec<String> = chunk.iter().map(|n| n.content.clone()).collect();
            match self.embedder.embed_texts(&texts).await {
                Ok(batch) if batch.len() == chunk.len() => {
                    for (note, vector) in chunk.iter().zip(batch) {
                        self.db
                            .embeddings
                            .upsert(note.id, &vector, self.embedder.model_name())
                            .await?;
                        vectors.insert(note.id, vector);
                    }
                }
                Ok(batch) => {
                    warn!(
                        expected = chunk.len(),
                        received = batch.len(),
                        "Batch embedding count mismatch, falling back to per-note calls"
                    );
                    self.embed_fallback(chunk, &mut vectors, &mut failed).await?;
                }
                Err(e) => {
                    warn!(error = %e, "Batch embedding failed, falling back to per-note calls");
                    self.embed_fallback(chunk, &mut vectors, &mut failed).await?;
                }
            }

            embedded += chunk.len();
            self.progress.send_replace(ReclassifyProgress {
                completed: embedded * 4 / 5,
                total,
            });
        }

        // Phase 2 (~20%): replay join-or-create in original note order,
        // then consolidate once.
        let mut completed = 0usize;
        let mut replayed = 0usize;
        for note in &valid {
            replayed += 1;
            let Some(vector) = vectors.get(&note.id) else {
                continue;
            };
            match self.assign_note_locked(note.id, &note.content, vector).await {
                Ok(_) => completed += 1,
                Err(e) => {
                    warn!(note_id = %note.id, error = %e, "Replay classification failed");
                    failed.insert(note.id);
                }
            }
            self.progress.send_replace(ReclassifyProgress {
                completed: (4 * total + replayed) / 5,
                total,
            });
        }
        self.merge_check_locked().await?;

        let clusters = self.db.clusters.stats().await?.count as usize;
        self.progress
            .send_replace(ReclassifyProgress { completed: total, total });

        info!(
            total,
            completed,
            errors = failed.len(),
            cluster_count = clusters,
            duration_ms = start.elapsed().as_millis() as u64,
            "Reclassification complete"
        );
        Ok(ReclassifyReport {
            success: true,
            total,
            completed,
            errors: failed.len(),
            clusters,
            error: None,
        })
    }

    async fn embed_fallback(
        &self,
        chunk: &[Note],
        vectors: &mut HashMap<Uuid, Vector>,
        failed: &mut HashSet<Uuid>,
    ) -> Result<()> {
        for note in chunk {
            match self.embedder.embed_text(&note.content).await {
                Ok(vector) => {
                    self.db
                        .embeddings
                        .upsert(note.id, &vector, self.embedder.model_name())
                        .await?;
                    vectors.insert(note.id, vector);
                }
                Err(e) => {
                    warn!(note_id = %note.id, error = %e, "Per-note embedding failed");
                    failed.insert(note.id);
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(
                self.config.embed_fallback_delay_ms,
            ))
            .await;
        }
        Ok(())
    }

    /// Join-or-create placement for one embedded note. Caller holds the
    /// store lock.
    async fn assign_note_locked(
        &self,
        note_id: Uuid,
        content: &str,
        vector: &Vector,
    ) -> Result<Uuid> {
        let clusters = self.db.clusters.list_all().await?;

        let nearest = find_nearest_cluster(vector, &clusters);
        if let Some(n) = nearest {
            if n.similarity >= self.config.similarity_threshold {
                let mut cluster = clusters[n.index].clone();
                cluster.add_note(note_id);
                self.recompute_centroid(&mut cluster).await?;
                cluster.updated_at = chrono::Utc::now();
                self.db.clusters.upsert(&cluster).await?;

                debug!(
                    cluster_id = %cluster.id,
                    similarity = n.similarity,
                    members = cluster.len(),
                    "Note joined existing cluster"
                );

                let cluster_id = cluster.id;
                if cluster.len() > self.config.max_cluster_size {
                    self.split_cluster_locked(cluster).await?;
                }
                return Ok(cluster_id);
            }
        }

        let name = derive_cluster_name(
            content,
            self.config.name_max_tokens,
            self.config.name_max_chars,
        );
        let cluster = Cluster::new(name, vector.clone(), vec![note_id]);
        self.db.clusters.upsert(&cluster).await?;

        debug!(
            cluster_id = %cluster.id,
            name = %cluster.name,
            "New singleton cluster created"
        );
        Ok(cluster.id)
    }

    /// Bisect an oversized cluster around its two most distant member
    /// embeddings. A single bisection only; if a half is still oversized,
    /// the next insertion into it triggers another split.
    async fn split_cluster_locked(&self, cluster: Cluster) -> Result<()> {
        if cluster.len() < self.config.min_split_size {
            return Ok(());
        }

        let embeddings = self.db.embeddings.get_many(&cluster.note_ids).await?;
        let by_note: HashMap<Uuid, &Vector> =
            embeddings.iter().map(|e| (e.note_id, &e.vector)).collect();
        if by_note.len() < 2 {
            warn!(
                cluster_id = %cluster.id,
                members = cluster.len(),
                embedded = by_note.len(),
                "Split skipped, too few member embeddings"
            );
            return Ok(());
        }

        // Seeds: the pair of member embeddings with maximum pairwise
        // distance (1 - cosine).
        let embedded: Vec<(Uuid, &Vector)> = cluster
            .note_ids
            .iter()
            .filter_map(|id| by_note.get(id).map(|v| (*id, *v)))
            .collect();
        let mut seed_a = embedded[0].0;
        let mut seed_b = embedded[1].0;
        let mut max_distance = f32::MIN;
        for i in 0..embedded.len() {
            for j in (i + 1)..embedded.len() {
                let distance = 1.0 - cosine_similarity(embedded[i].1, embedded[j].1);
                if distance > max_distance {
                    max_distance = distance;
                    seed_a = embedded[i].0;
                    seed_b = embedded[j].0;
                }
            }
        }
        let vec_a = by_note[&seed_a];
        let vec_b = by_note[&seed_b];

        // Partition: ties favor the first seed; members with a dangling
        // embedding stay with the original cluster.
        let mut group_a: Vec<Uuid> = Vec::new();
        let mut group_b: Vec<Uuid> = Vec::new();
        for note_id in &cluster.note_ids {
            if *note_id == seed_b {
                group_b.push(*note_id);
                continue;
            }
            match by_note.get(note_id) {
                Some(vector) => {
                    if cosine_similarity(vector, vec_a) >= cosine_similarity(vector, vec_b) {
                        group_a.push(*note_id);
                    } else {
                        group_b.push(*note_id);
                    }
                }
                None => group_a.push(*note_id),
            }
        }

        let name_a = self.name_from_member_notes(&group_a).await;
        let name_b = self.name_from_member_notes(&group_b).await;

        let mut original = cluster;
        original.name = name_a;
        original.note_ids = group_a;
        self.recompute_centroid(&mut original).await?;
        original.updated_at = chrono::Utc::now();
        self.db.clusters.upsert(&original).await?;

        let mut sibling = Cluster::new(name_b, Vec::new(), group_b);
        self.recompute_centroid(&mut sibling).await?;
        self.db.clusters.upsert(&sibling).await?;

        info!(
            cluster_id = %original.id,
            sibling_id = %sibling.id,
            left = original.len(),
            right = sibling.len(),
            "Oversized cluster split"
        );
        Ok(())
    }

    /// One consolidation pass: merge the closest cluster pair when their
    /// centroid similarity reaches the merge threshold. At most one merge
    /// per call; later insertions keep consolidating over time.
    async fn merge_check_locked(&self) -> Result<bool> {
        let clusters = self.db.clusters.list_all().await?;
        if clusters.len() < 2 {
            return Ok(false);
        }

        let mut best: Option<(usize, usize, f32)> = None;
        for i in 0..clusters.len() {
            if clusters[i].centroid.is_empty() {
                continue;
            }
            for j in (i + 1)..clusters.len() {
                if clusters[j].centroid.is_empty() {
                    continue;
                }
                let similarity =
                    cosine_similarity(&clusters[i].centroid, &clusters[j].centroid);
                if best.map_or(true, |(_, _, s)| similarity > s) {
                    best = Some((i, j, similarity));
                }
            }
        }

        let Some((i, j, similarity)) = best else {
            return Ok(false);
        };
        if similarity < self.config.merge_threshold {
            return Ok(false);
        }

        let mut survivor = clusters[i].clone();
        let absorbed = &clusters[j];
        for note_id in &absorbed.note_ids {
            survivor.add_note(*note_id);
        }
        self.recompute_centroid(&mut survivor).await?;
        survivor.updated_at = chrono::Utc::now();
        self.db.clusters.upsert(&survivor).await?;
        self.db.clusters.delete(absorbed.id).await?;

        info!(
            cluster_id = %survivor.id,
            absorbed_id = %absorbed.id,
            similarity,
            members = survivor.len(),
            "Near-duplicate clusters merged"
        );
        Ok(true)
    }

    /// Recompute a cluster's centroid from its members' stored embeddings.
    /// Members with no embedding are excluded rather than treated as an
    /// error; deletions and reclassification can leave transient dangling
    /// references.
    async fn recompute_centroid(&self, cluster: &mut Cluster) -> Result<()> {
        let embeddings = self.db.embeddings.get_many(&cluster.note_ids).await?;
        if embeddings.len() < cluster.note_ids.len() {
            warn!(
                cluster_id = %cluster.id,
                members = cluster.note_ids.len(),
                embedded = embeddings.len(),
                "Cluster references notes with no embedding"
            );
        }
        let refs: Vec<&Vector> = embeddings.iter().map(|e| &e.vector).collect();
        cluster.centroid = centroid(&refs);
        Ok(())
    }

    async fn name_from_member_notes(&self, note_ids: &[Uuid]) -> String {
        let mut texts = Vec::new();
        for note_id in note_ids.iter().take(5) {
            if let Ok(note) = self.db.notes.fetch(*note_id).await {
                texts.push(note.content);
            }
        }
        derive_cluster_name_from_members(
            texts.iter().map(|s| s.as_str()),
            self.config.name_max_tokens,
            self.config.name_max_chars,
        )
    }
}
