//! Best-effort deletion of a chunked job's intermediate artifacts.
//!
//! Runs exactly once per chunked job, after success or after failure. A
//! deletion that fails is logged and recorded in the [`CleanupReport`]; it
//! never changes the job's outcome.

use crate::chunk::{Chunk, SliceSet};
use crate::error::PartialCleanupError;
use crate::job::JobRequest;
use crate::outcome::CleanupReport;
use crate::store::delete_object;
use futures::stream::{self, StreamExt};
use object_store::ObjectStore;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Deletions in flight at once.
const CLEANUP_CONCURRENCY: usize = 16;

/// Intermediate artifacts a job has produced so far.
///
/// Filled in as each stage reports back, so a job that fails midway still
/// knows what to delete.
#[derive(Debug, Clone, Default)]
pub struct JobArtifacts {
    pub slices: SliceSet,
    pub chunks: Vec<Chunk>,
    /// Processed chunk path by chunk index.
    pub processed: BTreeMap<usize, String>,
}

impl JobArtifacts {
    /// Paths to delete. Fragments always; chunk documents and processed
    /// chunks only when `purge_chunks` is set. The job's source and output
    /// are never included.
    pub fn targets(&self, request: &JobRequest, purge_chunks: bool) -> Vec<String> {
        let mut targets: BTreeSet<&str> = self.slices.paths().collect();
        if purge_chunks {
            targets.extend(self.chunks.iter().map(|c| c.source_path.as_str()));
            targets.extend(self.processed.values().map(String::as_str));
        }
        targets
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .filter(|p| *p != request.source_path && *p != request.output_path)
            .map(str::to_string)
            .collect()
    }
}

/// Delete `targets`, collecting every failure.
pub async fn delete_artifacts(store: &dyn ObjectStore, targets: Vec<String>) -> CleanupReport {
    let attempted = targets.len();
    if attempted == 0 {
        debug!("Nothing to clean up");
        return CleanupReport::default();
    }

    let results: Vec<Result<bool, PartialCleanupError>> = stream::iter(targets.into_iter().map(
        |path| async move {
            match delete_object(store, &path).await {
                Ok(existed) => Ok(existed),
                Err(e) => Err(PartialCleanupError {
                    path,
                    detail: e.to_string(),
                }),
            }
        },
    ))
    .buffer_unordered(CLEANUP_CONCURRENCY)
    .collect()
    .await;

    let mut report = CleanupReport {
        attempted,
        ..Default::default()
    };
    for result in results {
        match result {
            Ok(true) => report.deleted += 1,
            Ok(false) => report.already_gone += 1,
            Err(f) => report.failures.push(f),
        }
    }
    report.failures.sort_by(|a, b| a.path.cmp(&b.path));
    for f in &report.failures {
        warn!("Cleanup: {}", f);
    }
    if report.already_gone > 0 {
        warn!(
            "Cleanup: {} of {} artifact(s) were not in the store",
            report.already_gone, report.attempted
        );
    }
    info!(
        "Cleanup deleted {}/{} intermediate artifact(s)",
        report.deleted, report.attempted
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TreatmentName;
    use crate::store::{create_store, object_exists, write_object, StoreLocation};

    fn request() -> JobRequest {
        JobRequest {
            source_path: "uploads/book.pdf".into(),
            treatments: BTreeMap::new(),
            total_pages: 80,
            trim_size: Default::default(),
            bleed_mode: Default::default(),
            layout_mode: Default::default(),
            output_path: "job/output.pdf".into(),
        }
    }

    fn artifacts() -> JobArtifacts {
        JobArtifacts {
            slices: SliceSet::new(BTreeMap::from([(
                TreatmentName::Primary,
                vec!["job/slices/primary/0000.png".into(), "job/slices/primary/0001.png".into()],
            )])),
            chunks: vec![Chunk {
                index: 0,
                start_page: 1,
                end_page: 40,
                source_path: "job/chunks/0000.pdf".into(),
                processed_path: None,
            }],
            processed: BTreeMap::from([
                (0, "job/processed/0000.pdf".to_string()),
                // A renderer that wrote straight to the output must not lose it.
                (1, "job/output.pdf".to_string()),
            ]),
        }
    }

    #[test]
    fn fragments_only_by_default() {
        let targets = artifacts().targets(&request(), false);
        assert_eq!(
            targets,
            vec!["job/slices/primary/0000.png", "job/slices/primary/0001.png"]
        );
    }

    #[test]
    fn purge_adds_chunks_but_never_output() {
        let targets = artifacts().targets(&request(), true);
        assert_eq!(targets.len(), 4);
        assert!(targets.contains(&"job/chunks/0000.pdf".to_string()));
        assert!(targets.contains(&"job/processed/0000.pdf".to_string()));
        assert!(!targets.contains(&"job/output.pdf".to_string()));
    }

    #[tokio::test]
    async fn deletes_targets_and_reports() {
        let store = create_store(&StoreLocation::Memory).unwrap();
        for p in ["job/slices/primary/0000.png", "job/slices/primary/0001.png"] {
            write_object(store.as_ref(), p, vec![1, 2, 3]).await.unwrap();
        }
        let targets = artifacts().targets(&request(), false);
        let report = delete_artifacts(store.as_ref(), targets).await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.already_gone, 0);
        assert!(report.is_clean());
        assert!(!object_exists(store.as_ref(), "job/slices/primary/0000.png")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_targets_are_not_counted_as_deleted() {
        let store = create_store(&StoreLocation::Memory).unwrap();
        write_object(store.as_ref(), "job-42/slices/primary/0001.png", vec![1])
            .await
            .unwrap();
        let targets = (0..3)
            .map(|i| format!("job-42/slices/primary/{i:04}.png"))
            .collect();
        let report = delete_artifacts(store.as_ref(), targets).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.already_gone, 2);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn unparseable_path_is_recorded_not_raised() {
        let store = create_store(&StoreLocation::Memory).unwrap();
        write_object(store.as_ref(), "job/a.png", vec![1]).await.unwrap();
        let report =
            delete_artifacts(store.as_ref(), vec!["job/../escape.png".into(), "job/a.png".into()])
                .await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "job/../escape.png");
    }

    #[tokio::test]
    async fn empty_target_list_is_clean() {
        let store = create_store(&StoreLocation::Memory).unwrap();
        let report = delete_artifacts(store.as_ref(), Vec::new()).await;
        assert_eq!(report, CleanupReport::default());
    }
}
