//! End-to-end orchestration tests against fake workers and an in-memory
//! object store.

use async_trait::async_trait;
use edgequake_edgeprint::store::{object_exists, write_object};
use edgequake_edgeprint::workers::{
    DirectResponse, MergeRequest, MergeResponse, RenderRequest, RenderResponse, SliceRequest,
    SliceResponse, SplitRequest, SplitResponse,
};
use edgequake_edgeprint::{
    create_store, plan_chunks, Chunk, CleanupReport, DirectProcessor, FailureKind, JobRequest,
    JobState, LayoutMode, MergingWorker, Orchestrator, PipelineConfig, PipelineOutcome,
    PipelineProgressCallback, ProcessingMethod, RenderingWorker, Session, SharedStore, SliceSet,
    SlicingWorker, SplittingWorker, Stage, StoreLocation, TreatmentName, WorkerError, Workers,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const PAGES_PER_CHUNK: usize = 40;

// ── Fake worker service ──────────────────────────────────────────────────

#[derive(Default)]
struct Behaviour {
    /// Slicer rejects the job outright.
    fail_slice: bool,
    /// Splitter rejects the job.
    fail_split: bool,
    /// Chunk index whose rendering fails.
    fail_render: Option<usize>,
    /// Later chunks finish first.
    reverse_completion: bool,
    /// Page count the merger reports instead of the requested one.
    merged_pages: Option<usize>,
    /// Primary treatment gets one fragment fewer than there are chunks.
    short_slices: bool,
    /// Splitter leaves a one-page gap between the first two chunks.
    gap_in_split: bool,
    /// Slicer reports a fragment path the store cannot delete.
    undeletable_fragment: bool,
}

struct FakeService {
    store: SharedStore,
    behaviour: Behaviour,
    slice_requests: Mutex<Vec<SliceRequest>>,
    split_calls: AtomicUsize,
    render_calls: AtomicUsize,
    merge_requests: Mutex<Vec<MergeRequest>>,
    direct_calls: AtomicUsize,
}

impl FakeService {
    fn new(store: SharedStore, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            store,
            behaviour,
            slice_requests: Mutex::new(Vec::new()),
            split_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            merge_requests: Mutex::new(Vec::new()),
            direct_calls: AtomicUsize::new(0),
        })
    }

    async fn put(&self, path: &str) -> Result<(), WorkerError> {
        write_object(self.store.as_ref(), path, b"artifact".to_vec())
            .await
            .map_err(|e| WorkerError::Rejected(e.to_string()))
    }

    fn merged_paths(&self) -> Vec<String> {
        self.merge_requests.lock().unwrap()[0]
            .processed_chunk_paths
            .clone()
    }
}

#[async_trait]
impl SlicingWorker for FakeService {
    async fn slice(&self, req: &SliceRequest) -> Result<SliceResponse, WorkerError> {
        self.slice_requests.lock().unwrap().push(req.clone());
        if self.behaviour.fail_slice {
            return Err(WorkerError::Rejected("treatment image is not a PNG".into()));
        }
        let session = Session::from_id(req.session_id.clone());
        let chunks = plan_chunks(req.total_pages, PAGES_PER_CHUNK).len();

        let mut slices = BTreeMap::new();
        for &treatment in req.treatment_image_paths.keys() {
            let count = if self.behaviour.short_slices && treatment == TreatmentName::Primary {
                chunks - 1
            } else {
                chunks
            };
            let mut paths = Vec::new();
            for i in 0..count {
                let path = session.slice_path(treatment, i);
                self.put(&path).await?;
                paths.push(path);
            }
            if self.behaviour.undeletable_fragment {
                paths.push(format!("{}/slices/../escape.png", session));
                paths.remove(0);
            }
            slices.insert(treatment, paths);
        }
        Ok(SliceResponse {
            sliced_paths: SliceSet::new(slices),
        })
    }
}

#[async_trait]
impl SplittingWorker for FakeService {
    async fn split(&self, req: &SplitRequest) -> Result<SplitResponse, WorkerError> {
        self.split_calls.fetch_add(1, Ordering::SeqCst);
        if self.behaviour.fail_split {
            return Err(WorkerError::Transport("connection reset".into()));
        }
        let session = Session::from_id(req.session_id.clone());
        let mut chunks = Vec::new();
        for (i, range) in plan_chunks(req.total_pages, PAGES_PER_CHUNK)
            .into_iter()
            .enumerate()
        {
            let path = session.chunk_path(i);
            self.put(&path).await?;
            let start_page = if self.behaviour.gap_in_split && i == 1 {
                range.start_page + 1
            } else {
                range.start_page
            };
            chunks.push(Chunk {
                index: i,
                start_page,
                end_page: range.end_page,
                source_path: path,
                processed_path: None,
            });
        }
        // Hand them back out of order; the orchestrator sorts by index.
        chunks.reverse();
        let total_chunks = chunks.len();
        Ok(SplitResponse {
            chunks,
            total_chunks,
        })
    }
}

#[async_trait]
impl RenderingWorker for FakeService {
    async fn render(&self, req: &RenderRequest) -> Result<RenderResponse, WorkerError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        if self.behaviour.reverse_completion {
            let delay = (req.total_chunks - req.chunk_index) as u64 * 20;
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.behaviour.fail_render == Some(req.chunk_index) {
            return Err(WorkerError::Rejected(format!(
                "chunk {} is corrupt",
                req.chunk_index
            )));
        }
        let path = Session::from_id(req.session_id.clone()).processed_path(req.chunk_index);
        self.put(&path).await?;
        Ok(RenderResponse {
            processed_chunk_path: path,
        })
    }
}

#[async_trait]
impl MergingWorker for FakeService {
    async fn merge(&self, req: &MergeRequest) -> Result<MergeResponse, WorkerError> {
        self.merge_requests.lock().unwrap().push(req.clone());
        self.put(&req.output_path).await?;
        Ok(MergeResponse {
            total_pages: self.behaviour.merged_pages.unwrap_or(req.total_pages),
        })
    }
}

#[async_trait]
impl DirectProcessor for FakeService {
    async fn process(&self, req: &JobRequest) -> Result<DirectResponse, WorkerError> {
        self.direct_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DirectResponse {
            output_url: format!("https://cdn.example/{}", req.output_path),
            total_pages: req.total_pages,
        })
    }
}

// ── Event recorder ───────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    transitions: Mutex<Vec<(JobState, JobState)>>,
    cleanups: AtomicUsize,
    completions: AtomicUsize,
    chunk_errors: AtomicUsize,
    chunk_completions: AtomicUsize,
}

impl PipelineProgressCallback for Recorder {
    fn on_state_change(&self, from: JobState, to: JobState) {
        self.transitions.lock().unwrap().push((from, to));
    }

    fn on_chunk_complete(&self, _index: usize, _total: usize) {
        self.chunk_completions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_chunk_error(&self, _index: usize, _total: usize, _error: &str) {
        self.chunk_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cleanup_complete(&self, _report: &CleanupReport) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }

    fn on_job_complete(&self, _outcome: &PipelineOutcome) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

struct Harness {
    store: SharedStore,
    service: Arc<FakeService>,
    recorder: Arc<Recorder>,
    orchestrator: Orchestrator,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness_with(behaviour: Behaviour, purge: bool) -> Harness {
    init_tracing();
    let store = create_store(&StoreLocation::Memory).unwrap();
    let service = FakeService::new(store.clone(), behaviour);
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .purge_chunk_artifacts(purge)
        .progress_callback(recorder.clone() as Arc<dyn PipelineProgressCallback>)
        .build()
        .unwrap();
    let orchestrator = Orchestrator::new(Workers::from_shared(service.clone()), store.clone(), config);
    Harness {
        store,
        service,
        recorder,
        orchestrator,
    }
}

fn harness(behaviour: Behaviour) -> Harness {
    harness_with(behaviour, false)
}

fn job(total_pages: usize) -> JobRequest {
    JobRequest {
        source_path: "uploads/book.pdf".into(),
        treatments: BTreeMap::from([(TreatmentName::Primary, "uploads/edge.png".into())]),
        total_pages,
        trim_size: Default::default(),
        bleed_mode: Default::default(),
        layout_mode: LayoutMode::SingleSurface,
        output_path: "job-42/output.pdf".into(),
    }
}

async fn exists(store: &SharedStore, path: &str) -> bool {
    object_exists(store.as_ref(), path).await.unwrap()
}

// ── Chunked path ─────────────────────────────────────────────────────────

#[tokio::test]
async fn chunked_job_of_120_pages_renders_three_chunks() {
    let h = harness(Behaviour::default());
    let outcome = h.orchestrator.run(&job(120)).await;

    let s = outcome.success().expect("job should succeed");
    assert_eq!(s.processing_method, ProcessingMethod::Chunked);
    assert_eq!(s.chunks_processed, Some(3));
    assert_eq!(s.total_pages, 120);
    assert_eq!(s.output_url, "job-42/output.pdf");

    assert_eq!(h.service.render_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.recorder.chunk_completions.load(Ordering::SeqCst), 3);
    assert_eq!(
        h.service.merged_paths(),
        vec![
            "job-42/processed/0000.pdf",
            "job-42/processed/0001.pdf",
            "job-42/processed/0002.pdf",
        ]
    );

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["chunksProcessed"], 3);
    assert_eq!(json["processingMethod"], "chunked");
}

#[tokio::test]
async fn merge_order_follows_index_when_chunks_finish_in_reverse() {
    let h = harness(Behaviour {
        reverse_completion: true,
        ..Default::default()
    });
    let outcome = h.orchestrator.run(&job(200)).await;
    assert!(outcome.is_success());

    let merged = h.service.merged_paths();
    assert_eq!(merged.len(), 5);
    let expected: Vec<String> = (0..5).map(|i| format!("job-42/processed/{i:04}.pdf")).collect();
    assert_eq!(merged, expected);
}

#[tokio::test]
async fn state_machine_walks_every_stage_in_order() {
    let h = harness(Behaviour::default());
    h.orchestrator.run(&job(120)).await;

    let transitions = h.recorder.transitions.lock().unwrap().clone();
    let states: Vec<JobState> = transitions.iter().map(|(_, to)| *to).collect();
    assert_eq!(
        states,
        vec![
            JobState::Slicing,
            JobState::Splitting,
            JobState::Rendering,
            JobState::Merging,
            JobState::CleaningUp,
            JobState::Succeeded,
        ]
    );
    assert_eq!(transitions[0].0, JobState::Idle);
}

#[tokio::test]
async fn success_deletes_fragments_but_keeps_chunks_and_output() {
    let h = harness(Behaviour::default());
    assert!(h.orchestrator.run(&job(120)).await.is_success());

    assert!(!exists(&h.store, "job-42/slices/primary/0000.png").await);
    assert!(!exists(&h.store, "job-42/slices/primary/0002.png").await);
    assert!(exists(&h.store, "job-42/chunks/0000.pdf").await);
    assert!(exists(&h.store, "job-42/processed/0001.pdf").await);
    assert!(exists(&h.store, "job-42/output.pdf").await);
    assert_eq!(h.recorder.cleanups.load(Ordering::SeqCst), 1);

    let outcome = h.orchestrator.run(&job(120)).await;
    let report = outcome.success().unwrap().cleanup.clone().unwrap();
    assert_eq!(report.deleted, 3);
    assert_eq!(report.already_gone, 0);
}

#[tokio::test]
async fn purge_also_deletes_chunk_artifacts() {
    let h = harness_with(Behaviour::default(), true);
    assert!(h.orchestrator.run(&job(120)).await.is_success());

    assert!(!exists(&h.store, "job-42/chunks/0000.pdf").await);
    assert!(!exists(&h.store, "job-42/processed/0002.pdf").await);
    assert!(exists(&h.store, "job-42/output.pdf").await);
}

#[tokio::test]
async fn single_surface_sends_only_primary_to_slicer() {
    let h = harness(Behaviour::default());
    let mut request = job(120);
    request
        .treatments
        .insert(TreatmentName::SecondaryA, "uploads/top.png".into());
    assert!(h.orchestrator.run(&request).await.is_success());

    let sent = h.service.slice_requests.lock().unwrap()[0].clone();
    assert_eq!(sent.session_id, "job-42");
    assert_eq!(
        sent.treatment_image_paths.keys().copied().collect::<Vec<_>>(),
        vec![TreatmentName::Primary]
    );
}

#[tokio::test]
async fn multi_surface_slices_every_treatment() {
    let h = harness(Behaviour::default());
    let mut request = job(120);
    request.layout_mode = LayoutMode::MultiSurface;
    request
        .treatments
        .insert(TreatmentName::SecondaryB, "uploads/bottom.png".into());
    assert!(h.orchestrator.run(&request).await.is_success());

    let sent = h.service.slice_requests.lock().unwrap()[0].clone();
    assert_eq!(sent.treatment_image_paths.len(), 2);
    assert!(!exists(&h.store, "job-42/slices/secondary-b/0001.png").await);
}

// ── Failures ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_failed_chunk_fails_the_job_at_rendering() {
    let h = harness(Behaviour {
        fail_render: Some(1),
        ..Default::default()
    });
    let outcome = h.orchestrator.run(&job(120)).await;

    let f = outcome.failure().expect("job should fail");
    assert_eq!(f.failed_stage, Stage::Rendering);
    assert_eq!(f.kind, FailureKind::StageInvocation);
    assert!(f.error.contains("chunk 1"), "got: {}", f.error);

    assert!(h.service.merge_requests.lock().unwrap().is_empty());
    assert_eq!(h.recorder.chunk_errors.load(Ordering::SeqCst), 1);
    assert_eq!(h.recorder.cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(h.recorder.completions.load(Ordering::SeqCst), 1);
    assert!(!exists(&h.store, "job-42/slices/primary/0000.png").await);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["failedStage"], "rendering");
}

#[tokio::test]
async fn failure_moves_straight_to_failed_state() {
    let h = harness(Behaviour {
        fail_render: Some(0),
        ..Default::default()
    });
    h.orchestrator.run(&job(120)).await;

    let transitions = h.recorder.transitions.lock().unwrap().clone();
    assert_eq!(
        transitions.last().copied(),
        Some((JobState::Rendering, JobState::Failed))
    );
    assert!(!transitions
        .iter()
        .any(|(_, to)| *to == JobState::CleaningUp));
}

#[tokio::test]
async fn slicer_failure_stops_before_splitting() {
    let h = harness(Behaviour {
        fail_slice: true,
        ..Default::default()
    });
    let outcome = h.orchestrator.run(&job(120)).await;

    let f = outcome.failure().expect("job should fail");
    assert_eq!(f.failed_stage, Stage::Slicing);
    assert_eq!(f.kind, FailureKind::StageInvocation);
    assert!(f.error.contains("not a PNG"), "got: {}", f.error);

    assert_eq!(h.service.split_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.service.render_calls.load(Ordering::SeqCst), 0);
    assert!(h.service.merge_requests.lock().unwrap().is_empty());
    assert_eq!(h.recorder.cleanups.load(Ordering::SeqCst), 1);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["failedStage"], "slicing");
    assert_eq!(json["errorKind"], "stage-invocation");
}

#[tokio::test]
async fn splitter_failure_still_deletes_fragments() {
    let h = harness(Behaviour {
        fail_split: true,
        ..Default::default()
    });
    let outcome = h.orchestrator.run(&job(120)).await;

    let f = outcome.failure().expect("job should fail");
    assert_eq!(f.failed_stage, Stage::Splitting);
    assert_eq!(f.kind, FailureKind::StageInvocation);

    assert_eq!(h.service.split_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.service.render_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.recorder.cleanups.load(Ordering::SeqCst), 1);
    for i in 0..3 {
        let fragment = format!("job-42/slices/primary/{i:04}.png");
        assert!(!exists(&h.store, &fragment).await, "{fragment} left behind");
    }
    assert_eq!(
        h.recorder.transitions.lock().unwrap().last().copied(),
        Some((JobState::Splitting, JobState::Failed))
    );
}

#[tokio::test]
async fn merged_page_count_mismatch_is_a_merging_violation() {
    let h = harness(Behaviour {
        merged_pages: Some(119),
        ..Default::default()
    });
    let outcome = h.orchestrator.run(&job(120)).await;

    let f = outcome.failure().expect("job should fail");
    assert_eq!(f.failed_stage, Stage::Merging);
    assert_eq!(f.kind, FailureKind::ContractViolation);
    assert!(f.error.contains("119"), "got: {}", f.error);
    assert_eq!(h.recorder.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fragment_count_mismatch_fails_before_rendering() {
    let h = harness(Behaviour {
        short_slices: true,
        ..Default::default()
    });
    let outcome = h.orchestrator.run(&job(120)).await;

    let f = outcome.failure().expect("job should fail");
    assert_eq!(f.failed_stage, Stage::Splitting);
    assert_eq!(f.kind, FailureKind::ContractViolation);
    assert_eq!(h.service.render_calls.load(Ordering::SeqCst), 0);
    assert!(!exists(&h.store, "job-42/slices/primary/0000.png").await);
}

#[tokio::test]
async fn split_with_gap_is_a_splitting_violation() {
    let h = harness(Behaviour {
        gap_in_split: true,
        ..Default::default()
    });
    let outcome = h.orchestrator.run(&job(120)).await;

    let f = outcome.failure().expect("job should fail");
    assert_eq!(f.failed_stage, Stage::Splitting);
    assert!(f.error.contains("gap"), "got: {}", f.error);
}

#[tokio::test]
async fn cleanup_failure_does_not_change_success() {
    let h = harness(Behaviour {
        undeletable_fragment: true,
        ..Default::default()
    });
    let outcome = h.orchestrator.run(&job(120)).await;

    let s = outcome.success().expect("cleanup problems must not fail the job");
    let report = s.cleanup.as_ref().unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(report.deleted >= 2);
    assert_eq!(h.recorder.cleanups.load(Ordering::SeqCst), 1);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["cleanup"]["failures"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_request_fails_validation_without_calling_workers() {
    let h = harness(Behaviour::default());
    let mut request = job(120);
    request.output_path = request.source_path.clone();
    let outcome = h.orchestrator.run(&request).await;

    assert_eq!(outcome.failed_stage(), Some(Stage::Validation));
    assert!(h.service.slice_requests.lock().unwrap().is_empty());
    assert_eq!(h.service.direct_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.recorder.cleanups.load(Ordering::SeqCst), 0);
    assert_eq!(h.recorder.completions.load(Ordering::SeqCst), 1);
}

// ── Direct path ──────────────────────────────────────────────────────────

#[tokio::test]
async fn small_job_goes_to_direct_delegate_once() {
    let h = harness(Behaviour::default());
    let outcome = h.orchestrator.run(&job(30)).await;

    let s = outcome.success().expect("job should succeed");
    assert_eq!(s.processing_method, ProcessingMethod::Direct);
    assert_eq!(s.output_url, "https://cdn.example/job-42/output.pdf");
    assert_eq!(s.chunks_processed, None);

    assert_eq!(h.service.direct_calls.load(Ordering::SeqCst), 1);
    assert!(h.service.slice_requests.lock().unwrap().is_empty());
    assert_eq!(h.service.split_calls.load(Ordering::SeqCst), 0);
    assert!(h.recorder.transitions.lock().unwrap().is_empty());
    assert_eq!(h.recorder.cleanups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn threshold_page_count_is_still_direct() {
    let h = harness(Behaviour::default());
    let at = h.orchestrator.run(&job(50)).await;
    assert_eq!(at.success().unwrap().processing_method, ProcessingMethod::Direct);

    let above = h.orchestrator.run(&job(51)).await;
    let s = above.success().unwrap();
    assert_eq!(s.processing_method, ProcessingMethod::Chunked);
    assert_eq!(s.chunks_processed, Some(2));
    assert_eq!(h.service.direct_calls.load(Ordering::SeqCst), 1);
}
