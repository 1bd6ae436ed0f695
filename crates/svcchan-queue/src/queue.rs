//! The job queue itself: a collector task that polls the store on a timer and N worker tasks that
//! each own a buffered `related_id`-affine input channel.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use svcchan_store::Store;
use svcchan_types::jobs::JobType;
use svcchan_types::model::{Job, JobCreator, RelatedType};

use crate::error::QueueError;
use crate::registry::HandlerRegistry;

/// Tuning for the collector and worker pool.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Number of worker tasks (default: CPU count).
    pub workers: usize,
    /// How often the collector polls the store.
    pub collect_period: Duration,
    /// Maximum rows fetched per collector tick.
    pub collect_jobs: i64,
    /// Bound of each worker's input channel.
    pub worker_channel_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            collect_period: Duration::from_secs(2),
            collect_jobs: 64,
            worker_channel_capacity: 256,
        }
    }
}

/// The durable job queue. One instance per daemon; `process` may only be
/// in flight once at a time.
pub struct Queue {
    store: Store,
    registry: HandlerRegistry,
    config: QueueConfig,
    processing: AtomicBool,
}

/// A handle returned by [`Queue::process`]; await [`ProcessHandle::close`]
/// to request shutdown and wait for drain, or poll
/// [`ProcessHandle::wait`] to observe a fatal error without asking to stop.
pub struct ProcessHandle {
    cancel: CancellationToken,
    result_rx: oneshot::Receiver<Result<(), QueueError>>,
}

impl ProcessHandle {
    /// Signals the collector and workers to stop, waits for the current
    /// in-flight job on each worker to drain, then returns.
    pub async fn close(self) -> Result<(), QueueError> {
        self.cancel.cancel();
        self.result_rx.await.unwrap_or(Ok(()))
    }

    /// Waits for the queue to stop on its own (normally only happens on a
    /// fatal `handler-not-found` error) without requesting shutdown.
    pub async fn wait(self) -> Result<(), QueueError> {
        self.result_rx.await.unwrap_or(Ok(()))
    }
}

impl Queue {
    /// Builds a queue bound to `store`, dispatching through `registry`.
    pub fn new(store: Store, registry: HandlerRegistry, config: QueueConfig) -> Self {
        crate::metrics::install();
        Self {
            store,
            registry,
            config,
            processing: AtomicBool::new(false),
        }
    }

    /// Inserts a new active job. Fails with [`QueueError::Duplicate`] when the type is not `duplicated`
    /// and an active job of the same `(related_id, job_type)` already exists.
    pub async fn add(
        &self,
        job_type: JobType,
        related_type: RelatedType,
        related_id: Uuid,
        created_by: JobCreator,
        payload: serde_json::Value,
    ) -> Result<Uuid, QueueError> {
        let cfg = svcchan_types::jobs::config_for(job_type.as_str())
            .ok_or_else(|| QueueError::UnknownJobType(job_type.as_str().to_string()))?;
        self.store
            .add_job(
                job_type.as_str(),
                related_type,
                related_id,
                created_by,
                payload,
                cfg.duplicated,
            )
            .await
            .map_err(|e| match e {
                svcchan_store::StoreError::Duplicate {
                    related_id,
                    job_type,
                } => QueueError::Duplicate {
                    related_id,
                    job_type,
                },
                other => QueueError::Store(other),
            })
    }

    /// Starts the collector and worker pool, running until [`ProcessHandle::close`]
    /// or a fatal error. Fails with [`QueueError::AlreadyProcessing`] if a
    /// previous call is still active.
    pub fn process(self: &Arc<Self>) -> Result<ProcessHandle, QueueError> {
        if self.processing.swap(true, Ordering::SeqCst) {
            return Err(QueueError::AlreadyProcessing);
        }

        let (fatal_tx, mut fatal_rx) = mpsc::channel::<QueueError>(1);
        let (done_tx, done_rx) = mpsc::channel::<Uuid>(self.config.worker_channel_capacity);
        let cancel = CancellationToken::new();
        let (result_tx, result_rx) = oneshot::channel();

        let mut worker_txs = Vec::with_capacity(self.config.workers);
        let mut worker_handles: Vec<JoinHandle<()>> = Vec::with_capacity(self.config.workers);
        for idx in 0..self.config.workers {
            let (tx, rx) = mpsc::channel::<Uuid>(self.config.worker_channel_capacity);
            worker_txs.push(tx);
            let queue = self.clone();
            let done_tx = done_tx.clone();
            let fatal_tx = fatal_tx.clone();
            let span = info_span!("queue_worker", worker = idx);
            worker_handles.push(tokio::spawn(
                worker_loop(queue, rx, done_tx, fatal_tx).instrument(span),
            ));
        }
        drop(done_tx);
        drop(fatal_tx);

        let queue = self.clone();
        let collector_cancel = cancel.clone();
        let collector_handle = tokio::spawn(
            collector_loop(queue, worker_txs, done_rx, collector_cancel)
                .instrument(info_span!("queue_collector")),
        );

        // A fatal error from any worker cancels the token so the collector
        // and its siblings drain just as they would on an explicit
        // `ProcessHandle::close`; the supervisor below only has to wait for
        // everything to finish and report which of the two happened.
        let fatal_cell = Arc::new(std::sync::Mutex::new(None::<QueueError>));
        {
            let fatal_cell = fatal_cell.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Some(err) = fatal_rx.recv().await {
                    *fatal_cell.lock().expect("fatal cell poisoned") = Some(err);
                    cancel.cancel();
                }
            });
        }

        let processing_flag = self.clone();
        tokio::spawn(async move {
            let _ = collector_handle.await;
            for handle in worker_handles {
                let _ = handle.await;
            }
            let outcome = match fatal_cell.lock().expect("fatal cell poisoned").take() {
                Some(err) => Err(err),
                None => Ok(()),
            };
            processing_flag.processing.store(false, Ordering::SeqCst);
            let _ = result_tx.send(outcome);
        });

        Ok(ProcessHandle { cancel, result_rx })
    }
}

async fn collector_loop(
    queue: Arc<Queue>,
    worker_txs: Vec<mpsc::Sender<Uuid>>,
    mut done_rx: mpsc::Receiver<Uuid>,
    cancel: CancellationToken,
) {
    let mut in_flight: HashSet<Uuid> = HashSet::new();
    let mut interval = tokio::time::interval(queue.config.collect_period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("collector received close, draining workers");
                break;
            }
            _ = interval.tick() => {
                match queue.store.collect_active_job_ids(queue.config.collect_jobs).await {
                    Ok(ids) => {
                        for (id, related_id) in ids {
                            if !in_flight.insert(id) {
                                continue;
                            }
                            let idx = worker_index(related_id, worker_txs.len());
                            if worker_txs[idx].send(id).await.is_err() {
                                in_flight.remove(&id);
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to collect jobs"),
                }
            }
            Some(id) = done_rx.recv() => {
                in_flight.remove(&id);
            }
        }
    }

    drop(worker_txs);
    while done_rx.recv().await.is_some() {}
}

async fn worker_loop(
    queue: Arc<Queue>,
    mut input_rx: mpsc::Receiver<Uuid>,
    done_tx: mpsc::Sender<Uuid>,
    fatal_tx: mpsc::Sender<QueueError>,
) {
    while let Some(id) = input_rx.recv().await {
        match process_one(&queue.store, &queue.registry, id).await {
            Ok(()) => {}
            Err(err @ QueueError::HandlerNotFound(_)) => {
                warn!(job_id = %id, error = %err, "fatal: no handler for job type");
                let _ = fatal_tx.send(err).await;
            }
            Err(err) => {
                warn!(job_id = %id, error = %err, "job processing failed");
            }
        }
        let _ = done_tx.send(id).await;
    }
}

/// Runs one collected job id to completion: refetch, validate, dispatch to
/// its handler, and apply the retry/terminal-state rule.
async fn process_one(store: &Store, registry: &HandlerRegistry, id: Uuid) -> Result<(), QueueError> {
    let Some(job) = store.fetch_job(id).await? else {
        return Ok(());
    };
    if !matches!(job.status, svcchan_types::jobs::JobStatus::Active) {
        return Ok(());
    }

    let handler = registry
        .get(&job.job_type)
        .ok_or_else(|| QueueError::HandlerNotFound(job.job_type.clone()))?;

    debug!(job_id = %id, job_type = %job.job_type, related_id = %job.related_id, "invoking handler");
    let outcome = handler.handle(&job).await;

    if !store.confirm_still_active(id).await? {
        debug!(job_id = %id, "job canceled during handling, dropping outcome");
        return Ok(());
    }

    apply_outcome(store, &job, outcome).await
}

async fn apply_outcome(store: &Store, job: &Job, outcome: Result<(), String>) -> Result<(), QueueError> {
    match outcome {
        Ok(()) => {
            store.complete_job(job.id.as_uuid()).await?;
            crate::metrics::observe(&job.job_type, "done");
        }
        Err(reason) => {
            let cfg = svcchan_types::jobs::config_for(&job.job_type);
            let try_limit = cfg.map(|c| c.try_limit).unwrap_or(0);
            let try_period = cfg
                .map(|c| c.try_period)
                .unwrap_or_else(|| Duration::from_secs(10));

            if try_limit > 0 && job.try_count + 1 >= try_limit {
                warn!(job_id = %job.id, job_type = %job.job_type, reason = %reason, "retry budget exhausted");
                store.fail_job(job.id.as_uuid()).await?;
                crate::metrics::observe(&job.job_type, "failed");
            } else {
                warn!(job_id = %job.id, job_type = %job.job_type, reason = %reason, "retrying job");
                let bump = try_limit > 0;
                let delay = chrono::Duration::from_std(try_period).unwrap_or(chrono::Duration::seconds(10));
                store
                    .retry_job(job.id.as_uuid(), Utc::now() + delay, bump)
                    .await?;
                crate::metrics::observe(&job.job_type, "retried");
            }
        }
    }
    Ok(())
}

fn worker_index(id: Uuid, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() as usize) % workers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_index_is_deterministic_and_in_range() {
        let id = Uuid::new_v4();
        let first = worker_index(id, 8);
        let second = worker_index(id, 8);
        assert_eq!(first, second);
        assert!(first < 8);
    }

    #[test]
    fn worker_index_routes_same_entity_to_same_worker() {
        let related_id = Uuid::new_v4();
        assert_eq!(worker_index(related_id, 4), worker_index(related_id, 4));
    }

    #[test]
    fn collected_pairs_route_by_related_id_not_job_id() {
        // Two distinct jobs for the same channel must hash to the same
        // worker even though their own job ids differ; routing on the job
        // id instead of related_id would scatter them across workers.
        let related_id = Uuid::new_v4();
        let collected = vec![(Uuid::new_v4(), related_id), (Uuid::new_v4(), related_id)];
        let workers = 8;
        let indices: Vec<usize> = collected
            .iter()
            .map(|(_, related_id)| worker_index(*related_id, workers))
            .collect();
        assert_eq!(indices[0], indices[1]);
    }
}
