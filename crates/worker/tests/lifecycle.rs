//! End-to-end worker pool tests against an in-memory broker, store, and
//! storage provider, with a scripted transform engine.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pixelift_broker::{BrokerChannel, InMemoryBroker};
use pixelift_cloud::{MemoryProvider, StorageError, StorageProvider};
use pixelift_core::envelope::{InputRef, JobEnvelope};
use pixelift_core::lane::Lane;
use pixelift_core::options::{JobOptions, OutputFormat, SubmitOptions};
use pixelift_core::record::{JobRecord, JobStatus};
use pixelift_core::types::JobId;
use pixelift_engine::{
    AcceleratorContext, NoopAccelerator, ResourceGuard, Transform, TransformError,
    TransformErrorKind, TransformOutput,
};
use pixelift_store::ResultStore;
use pixelift_worker::{WorkerConfig, WorkerDeps, WorkerPool};

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

enum Script {
    /// Deterministic success.
    Succeed,
    /// Always fail with the given kind.
    Fail(TransformErrorKind),
    /// Fail with a retryable kind for the first `n` calls, then succeed.
    TransientTimes(u32),
}

struct ScriptedEngine {
    script: Script,
    calls: AtomicU32,
}

impl ScriptedEngine {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn success_output(lane: Lane, input: &InputRef) -> TransformOutput {
        let scale = match lane {
            Lane::Upscale => 4.0,
            Lane::Face => 1.0,
        };
        TransformOutput {
            bytes: b"transformed".to_vec(),
            width: (input.width as f64 * scale) as u32,
            height: (input.height as f64 * scale) as u32,
            scale_factor: scale,
            face_count: match lane {
                Lane::Face => Some(1),
                Lane::Upscale => None,
            },
        }
    }
}

#[async_trait]
impl Transform for ScriptedEngine {
    async fn transform(
        &self,
        lane: Lane,
        input: &InputRef,
        _options: &JobOptions,
    ) -> Result<TransformOutput, TransformError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        match &self.script {
            Script::Succeed => Ok(Self::success_output(lane, input)),
            Script::Fail(kind) => Err(TransformError::new(*kind, "scripted failure")),
            Script::TransientTimes(n) => {
                if call <= *n {
                    Err(TransformError::new(
                        TransformErrorKind::ResourceExhausted,
                        "scripted transient failure",
                    ))
                } else {
                    Ok(Self::success_output(lane, input))
                }
            }
        }
    }
}

/// Engine that flags itself in flight for the duration of each call.
struct SlowEngine {
    in_flight: Arc<AtomicBool>,
}

#[async_trait]
impl Transform for SlowEngine {
    async fn transform(
        &self,
        lane: Lane,
        input: &InputRef,
        _options: &JobOptions,
    ) -> Result<TransformOutput, TransformError> {
        self.in_flight.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.in_flight.store(false, Ordering::SeqCst);
        Ok(ScriptedEngine::success_output(lane, input))
    }
}

/// Accelerator that records whether a transform was mid-flight when a
/// cache clear ran.
struct WatchingAccelerator {
    in_flight: Arc<AtomicBool>,
    overlapped: AtomicBool,
}

#[async_trait]
impl AcceleratorContext for WatchingAccelerator {
    async fn clear_cache(&self) -> Result<(), TransformError> {
        if self.in_flight.load(Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Storage provider that always fails, counting attempts.
#[derive(Default)]
struct FailingStorage {
    attempts: AtomicU32,
}

#[async_trait]
impl StorageProvider for FailingStorage {
    async fn upload(
        &self,
        _bytes: &[u8],
        _path: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(StorageError::Upload("scripted upload failure".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    broker: Arc<InMemoryBroker>,
    store: Arc<ResultStore>,
    accelerator: Arc<NoopAccelerator>,
    pool: WorkerPool,
}

fn start(engine: Arc<dyn Transform>, storage: Arc<dyn StorageProvider>, config: WorkerConfig) -> Harness {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(ResultStore::new());
    let accelerator = Arc::new(NoopAccelerator::new());
    let guard = Arc::new(ResourceGuard::new(
        Arc::clone(&accelerator) as Arc<dyn pixelift_engine::AcceleratorContext>
    ));

    let pool = WorkerPool::start(
        config,
        WorkerDeps {
            broker: Arc::clone(&broker) as Arc<dyn BrokerChannel>,
            store: Arc::clone(&store),
            engine,
            storage,
            guard,
        },
    );

    Harness {
        broker,
        store,
        accelerator,
        pool,
    }
}

fn envelope(lane: Lane) -> JobEnvelope {
    let submitted = match lane {
        Lane::Upscale => SubmitOptions {
            format: Some(OutputFormat::Webp),
            ..Default::default()
        },
        Lane::Face => SubmitOptions::default(),
    };
    let options = JobOptions::for_lane(lane, submitted).unwrap();
    JobEnvelope::new(
        lane,
        InputRef {
            fingerprint: pixelift_core::fingerprint::fingerprint(b"input image"),
            bytes: b"input image".to_vec(),
            width: 100,
            height: 80,
            filename: Some("photo.png".to_string()),
        },
        options,
    )
}

/// Create the record, push the envelope, return the job id — the
/// dispatcher's submission sequence.
async fn submit(harness: &Harness, envelope: JobEnvelope) -> JobId {
    let job_id = envelope.job_id;
    harness
        .store
        .create(job_id, envelope.lane)
        .await
        .expect("record should be creatable");
    harness
        .broker
        .push(envelope)
        .await
        .expect("push should succeed");
    job_id
}

async fn wait_terminal(store: &ResultStore, job_id: JobId) -> JobRecord {
    for _ in 0..500 {
        let record = store.get(job_id).await.expect("record should exist");
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

async fn wait_in_flight_drained(broker: &InMemoryBroker) {
    for _ in 0..500 {
        if broker.in_flight_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("broker deliveries were never settled");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upscale_job_completes_with_webp_output_and_4x_scale() {
    let engine = ScriptedEngine::new(Script::Succeed);
    let storage = Arc::new(MemoryProvider::new());
    let harness = start(
        Arc::clone(&engine) as Arc<dyn Transform>,
        Arc::clone(&storage) as Arc<dyn StorageProvider>,
        WorkerConfig::default(),
    );

    let job_id = submit(&harness, envelope(Lane::Upscale)).await;
    let record = wait_terminal(&harness.store, job_id).await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.attempt_count, 1);
    let result = record.result.expect("completed record carries a result");
    assert_eq!(result.output_format, OutputFormat::Webp);
    assert_eq!(result.scale_factor, 4.0);
    assert_eq!(result.original_width, 100);
    assert_eq!(result.original_height, 80);
    assert_eq!(result.output_width, 400);
    assert_eq!(result.output_height, 320);
    assert_eq!(result.output_url, format!("memory://upscale/{job_id}.webp"));
    assert!(result.face_count.is_none());

    // The output actually landed in storage.
    assert_eq!(
        storage.get(&format!("upscale/{job_id}.webp")).await.unwrap(),
        b"transformed"
    );

    wait_in_flight_drained(&harness.broker).await;
    harness.pool.shutdown().await;
}

#[tokio::test]
async fn face_job_with_no_face_fails_terminally_without_retry() {
    let engine = ScriptedEngine::new(Script::Fail(TransformErrorKind::NoFaceDetected));
    let harness = start(
        Arc::clone(&engine) as Arc<dyn Transform>,
        Arc::new(MemoryProvider::new()),
        WorkerConfig::default(),
    );

    let job_id = submit(&harness, envelope(Lane::Face)).await;
    let record = wait_terminal(&harness.store, job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("no_face_detected"));
    assert_eq!(record.attempt_count, 1);
    assert_eq!(engine.calls(), 1);
    assert!(record.result.is_none());

    harness.pool.shutdown().await;
}

#[tokio::test]
async fn persistent_transient_failure_exhausts_retries() {
    let engine = ScriptedEngine::new(Script::Fail(TransformErrorKind::ResourceExhausted));
    let config = WorkerConfig {
        max_retries: 2,
        ..Default::default()
    };
    let harness = start(
        Arc::clone(&engine) as Arc<dyn Transform>,
        Arc::new(MemoryProvider::new()),
        config,
    );

    let job_id = submit(&harness, envelope(Lane::Upscale)).await;
    let record = wait_terminal(&harness.store, job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("retries_exhausted"));
    // Exactly max_retries + 1 attempts were made.
    assert_eq!(engine.calls(), 3);
    assert_eq!(record.attempt_count, 3);

    harness.pool.shutdown().await;
}

#[tokio::test]
async fn transient_failure_recovers_on_a_later_attempt() {
    let engine = ScriptedEngine::new(Script::TransientTimes(1));
    let harness = start(
        Arc::clone(&engine) as Arc<dyn Transform>,
        Arc::new(MemoryProvider::new()),
        WorkerConfig::default(),
    );

    let job_id = submit(&harness, envelope(Lane::Face)).await;
    let record = wait_terminal(&harness.store, job_id).await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.attempt_count, 2);
    assert_eq!(engine.calls(), 2);
    let result = record.result.unwrap();
    assert_eq!(result.scale_factor, 1.0);
    assert_eq!(result.face_count, Some(1));

    harness.pool.shutdown().await;
}

#[tokio::test]
async fn accelerator_cache_is_cleared_after_every_attempt() {
    let engine = ScriptedEngine::new(Script::TransientTimes(2));
    let harness = start(
        Arc::clone(&engine) as Arc<dyn Transform>,
        Arc::new(MemoryProvider::new()),
        WorkerConfig::default(),
    );

    let job_id = submit(&harness, envelope(Lane::Upscale)).await;
    wait_terminal(&harness.store, job_id).await;
    wait_in_flight_drained(&harness.broker).await;

    // Three attempts (two transient failures + one success), one cache
    // clear per attempt regardless of outcome.
    assert_eq!(engine.calls(), 3);
    assert_eq!(harness.accelerator.clear_count(), 3);

    harness.pool.shutdown().await;
}

#[tokio::test]
async fn upload_failure_fails_the_job_without_rerunning_the_transform() {
    let engine = ScriptedEngine::new(Script::Succeed);
    let storage = Arc::new(FailingStorage::default());
    let config = WorkerConfig {
        upload_retries: 2,
        ..Default::default()
    };
    let harness = start(
        Arc::clone(&engine) as Arc<dyn Transform>,
        Arc::clone(&storage) as Arc<dyn StorageProvider>,
        config,
    );

    let job_id = submit(&harness, envelope(Lane::Upscale)).await;
    let record = wait_terminal(&harness.store, job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("upload_error"));
    // Only the upload step is retried.
    assert_eq!(engine.calls(), 1);
    assert_eq!(storage.attempts.load(Ordering::Relaxed), 3);

    harness.pool.shutdown().await;
}

#[tokio::test]
async fn duplicate_broker_delivery_executes_the_job_once() {
    let engine = ScriptedEngine::new(Script::Succeed);
    let harness = start(
        Arc::clone(&engine) as Arc<dyn Transform>,
        Arc::new(MemoryProvider::new()),
        WorkerConfig::default(),
    );

    // One record, but the envelope is delivered twice.
    let dup = envelope(Lane::Upscale);
    let job_id = submit(&harness, dup.clone()).await;
    harness.broker.push(dup).await.unwrap();

    let record = wait_terminal(&harness.store, job_id).await;
    wait_in_flight_drained(&harness.broker).await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.attempt_count, 1);
    assert_eq!(engine.calls(), 1);

    harness.pool.shutdown().await;
}

#[tokio::test]
async fn cache_clear_never_runs_during_the_other_lanes_transform() {
    let in_flight = Arc::new(AtomicBool::new(false));
    let engine = Arc::new(SlowEngine {
        in_flight: Arc::clone(&in_flight),
    });
    let accelerator = Arc::new(WatchingAccelerator {
        in_flight,
        overlapped: AtomicBool::new(false),
    });
    let guard = Arc::new(ResourceGuard::new(
        Arc::clone(&accelerator) as Arc<dyn AcceleratorContext>
    ));

    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(ResultStore::new());
    let pool = WorkerPool::start(
        WorkerConfig::default(),
        WorkerDeps {
            broker: Arc::clone(&broker) as Arc<dyn BrokerChannel>,
            store: Arc::clone(&store),
            engine,
            storage: Arc::new(MemoryProvider::new()),
            guard,
        },
    );

    // Interleave slow jobs across both lanes so one lane's post-job cache
    // clear races the other lane's transform on the shared accelerator.
    let mut job_ids = Vec::new();
    for _ in 0..3 {
        for lane in Lane::all() {
            let env = envelope(lane);
            job_ids.push(env.job_id);
            store.create(env.job_id, lane).await.unwrap();
            broker.push(env).await.unwrap();
        }
    }

    for job_id in job_ids {
        let record = wait_terminal(&store, job_id).await;
        assert_eq!(record.status, JobStatus::Completed);
    }

    assert!(
        !accelerator.overlapped.load(Ordering::SeqCst),
        "cache clear observed a transform in flight on the shared accelerator"
    );

    pool.shutdown().await;
}

#[tokio::test]
async fn idle_pool_shuts_down_promptly() {
    let engine = ScriptedEngine::new(Script::Succeed);
    let harness = start(
        engine as Arc<dyn Transform>,
        Arc::new(MemoryProvider::new()),
        WorkerConfig::default(),
    );

    tokio::time::timeout(Duration::from_secs(2), harness.pool.shutdown())
        .await
        .expect("idle pool should drain immediately");
}
