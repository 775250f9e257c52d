//! Archival worker pipeline
//!
//! A fixed pool of workers drains a bounded job queue. Each (asset, kind)
//! pair is archived at most once: an in-flight set claimed at trigger time
//! suppresses duplicates submitted before the first upload lands, and a
//! record re-read inside the job skips work that already completed.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::archive::telegram::DurableStore;
use crate::db::store::RecordStore;
use crate::types::MediaKind;

/// One archival unit of work
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub asset_id: String,
    pub kind: MediaKind,
    /// Origin download URL; expiring, so workers use it promptly
    pub source_url: String,
    pub quality_label: String,
}

impl ArchiveJob {
    /// Deduplication key; one archival per (asset, kind)
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.asset_id, self.kind.as_str())
    }
}

/// Configuration for the archival pipeline
pub struct ArchivalConfig {
    /// Number of worker tasks
    pub worker_count: usize,
    /// Maximum queued jobs before triggers are dropped
    pub max_queue_size: usize,
}

impl Default for ArchivalConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            max_queue_size: 64,
        }
    }
}

/// Background archival pipeline
pub struct ArchivalPipeline {
    job_tx: mpsc::Sender<ArchiveJob>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ArchivalPipeline {
    /// Create the pipeline and start its workers
    pub fn new(
        config: ArchivalConfig,
        store: Arc<dyn RecordStore>,
        durable: Arc<dyn DurableStore>,
    ) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<ArchiveJob>(config.max_queue_size);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        info!(
            "Starting archival pipeline with {} workers (queue {})",
            config.worker_count, config.max_queue_size
        );

        for i in 0..config.worker_count {
            let job_rx = Arc::clone(&job_rx);
            let in_flight = Arc::clone(&in_flight);
            let store = Arc::clone(&store);
            let durable = Arc::clone(&durable);

            tokio::spawn(async move {
                worker_task(i, job_rx, in_flight, store, durable).await;
            });
        }

        Self { job_tx, in_flight }
    }

    /// Submit a job unless the same (asset, kind) is already queued or
    /// running. Never blocks the caller; a full queue drops the trigger.
    pub async fn trigger(&self, job: ArchiveJob) {
        let key = job.dedup_key();

        // Claim before submitting so a concurrent trigger for the same pair
        // sees the claim rather than racing the queue
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(key.clone()) {
                debug!(key = %key, "Archival already in flight, dropping trigger");
                return;
            }
        }

        if let Err(e) = self.job_tx.try_send(job) {
            warn!(key = %key, "Archival queue full, dropping trigger: {}", e);
            self.in_flight.lock().await.remove(&key);
        }
    }

    /// Number of (asset, kind) pairs currently queued or uploading
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

/// Worker task that drains the shared job queue
async fn worker_task(
    worker_id: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<ArchiveJob>>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    store: Arc<dyn RecordStore>,
    durable: Arc<dyn DurableStore>,
) {
    info!("Archival worker {} started", worker_id);

    loop {
        let job = {
            let mut rx = job_rx.lock().await;
            match rx.recv().await {
                Some(job) => job,
                None => {
                    info!("Archival worker {} shutting down (channel closed)", worker_id);
                    return;
                }
            }
        };

        let key = job.dedup_key();
        debug!(worker_id, key = %key, "Archival worker picked up job");

        // Failures are logged and swallowed; archival never surfaces to
        // request paths, and the next resolution can retry
        if let Err(e) = run_job(&job, store.as_ref(), durable.as_ref()).await {
            error!(key = %key, "Archival failed: {}", e);
        }

        in_flight.lock().await.remove(&key);
    }
}

/// Execute one archival job end to end
async fn run_job(
    job: &ArchiveJob,
    store: &dyn RecordStore,
    durable: &dyn DurableStore,
) -> crate::types::Result<()> {
    // Re-read the record; a previous run may have archived this pair already
    let record = match store.find_by_asset_id(&job.asset_id).await? {
        Some(record) => record,
        None => {
            warn!(asset_id = %job.asset_id, "No record for archival job, skipping");
            return Ok(());
        }
    };

    if record.durable_for(job.kind).is_some() {
        debug!(
            asset_id = %job.asset_id,
            kind = %job.kind,
            "Already archived, skipping"
        );
        return Ok(());
    }

    let filename = build_filename(&record.title, &job.asset_id, job.kind, &job.quality_label);
    let caption = build_caption(&record.title, job.kind, &job.quality_label);

    let receipt = durable.upload(&job.source_url, &filename, &caption).await?;

    store
        .set_durable(
            &job.asset_id,
            job.kind,
            &receipt.durable_url,
            &job.quality_label,
            receipt.message_handle,
        )
        .await?;

    info!(
        asset_id = %job.asset_id,
        kind = %job.kind,
        quality = %job.quality_label,
        "Archived durable copy"
    );

    Ok(())
}

/// Build an upload filename from the asset title.
///
/// Keeps alphanumerics, spaces, hyphens, and underscores, truncated to 50
/// characters so storage backends with name limits accept it.
fn build_filename(title: &str, asset_id: &str, kind: MediaKind, quality_label: &str) -> String {
    let safe: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .take(50)
        .collect();
    let safe = safe.trim();
    let base = if safe.is_empty() { asset_id } else { safe };

    match kind {
        MediaKind::Video => format!("{}_{}_{}p.mp4", base, asset_id, quality_label),
        MediaKind::Audio => {
            let ext = if quality_label == "m4a" { "m4a" } else { "mp3" };
            format!("{}_{}_{}kbps.{}", base, asset_id, quality_label, ext)
        }
    }
}

/// Build the storage-chat caption shown alongside the upload
fn build_caption(title: &str, kind: MediaKind, quality_label: &str) -> String {
    match kind {
        MediaKind::Video => format!("🎬 {}\n📹 {}p Video", title, quality_label),
        MediaKind::Audio => format!("🎬 {}\n🎵 {} Audio", title, quality_label),
    }
}
