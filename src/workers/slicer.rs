//! In-process slicing worker: cut treatment images into per-chunk strips.
//!
//! A treatment image shows the whole edge of the book block. Each leaf
//! (two pages) owns an equal-width vertical strip of it, so the fragment
//! for a chunk is the strip spanning that chunk's leaves:
//!
//! ```text
//! image width W, L leaves, chunk covering leaves a..=b
//! x0 = a·W / L        x1 = (b + 1)·W / L
//! ```
//!
//! Decoding, cropping and PNG-encoding are CPU-bound, so they run under
//! `spawn_blocking`; only the store reads and writes are awaited on the
//! async runtime.

use super::{SliceRequest, SliceResponse, SlicingWorker};
use crate::chunk::{plan_chunks, PageRange, SliceSet};
use crate::error::WorkerError;
use crate::job::{Session, TreatmentName};
use crate::store::{delete_object, read_object, write_object, SharedStore};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::{debug, info, warn};

/// Slices treatment images stored in the shared object store.
pub struct ImageSlicer {
    store: SharedStore,
    pages_per_chunk: usize,
}

impl ImageSlicer {
    /// `pages_per_chunk` must match the splitting worker's chunk size.
    pub fn new(store: SharedStore, pages_per_chunk: usize) -> Self {
        Self {
            store,
            pages_per_chunk: pages_per_chunk.max(1),
        }
    }

    async fn slice_treatment(
        &self,
        session: &Session,
        treatment: TreatmentName,
        image_path: &str,
        ranges: &[PageRange],
        total_pages: usize,
    ) -> Result<Vec<String>, WorkerError> {
        let bytes = read_object(self.store.as_ref(), image_path)
            .await
            .map_err(|e| WorkerError::Rejected(e.to_string()))?;

        let owned_ranges = ranges.to_vec();
        let fragments = tokio::task::spawn_blocking(move || {
            cut_fragments(&bytes, &owned_ranges, total_pages)
        })
        .await
        .map_err(|e| WorkerError::Rejected(format!("slicing task panicked: {e}")))?
        .map_err(|e| {
            WorkerError::Rejected(format!("cannot slice treatment '{treatment}' ({image_path}): {e}"))
        })?;

        let mut written = Vec::with_capacity(fragments.len());
        for (index, png) in fragments.into_iter().enumerate() {
            let path = session.slice_path(treatment, index);
            if let Err(e) = write_object(self.store.as_ref(), &path, png).await {
                self.discard(&written).await;
                return Err(WorkerError::Rejected(e.to_string()));
            }
            written.push(path);
        }
        debug!(
            "Sliced '{}' into {} fragments for session {}",
            treatment,
            written.len(),
            session
        );
        Ok(written)
    }

    /// Best-effort removal of fragments written before a failure.
    async fn discard(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = delete_object(self.store.as_ref(), path).await {
                warn!("Could not discard fragment {}: {}", path, e);
            }
        }
    }
}

#[async_trait]
impl SlicingWorker for ImageSlicer {
    async fn slice(&self, request: &SliceRequest) -> Result<SliceResponse, WorkerError> {
        if request.total_pages == 0 {
            return Err(WorkerError::Rejected("totalPages must be ≥ 1".into()));
        }
        let session = Session::from_id(request.session_id.clone());
        let ranges = plan_chunks(request.total_pages, self.pages_per_chunk);
        info!(
            "Slicing {} treatment(s) into {} fragments each",
            request.treatment_image_paths.len(),
            ranges.len()
        );

        let mut slices: BTreeMap<TreatmentName, Vec<String>> = BTreeMap::new();
        for (&treatment, path) in &request.treatment_image_paths {
            if !request.page_layout_mode.applies_to(treatment) {
                warn!(
                    "Treatment '{}' is not used by {:?} layout; skipping",
                    treatment, request.page_layout_mode
                );
                continue;
            }
            match self
                .slice_treatment(&session, treatment, path, &ranges, request.total_pages)
                .await
            {
                Ok(paths) => {
                    slices.insert(treatment, paths);
                }
                Err(e) => {
                    for done in slices.values() {
                        self.discard(done).await;
                    }
                    return Err(e);
                }
            }
        }

        Ok(SliceResponse {
            sliced_paths: SliceSet::new(slices),
        })
    }
}

/// Horizontal pixel span `[x0, x1)` of the strip for `range`.
///
/// Always at least one pixel wide, even when the image has fewer columns
/// than the book has leaves.
pub fn strip_span(range: &PageRange, total_pages: usize, width: u32) -> (u32, u32) {
    let leaves = total_pages.div_ceil(2).max(1) as u64;
    let width = u64::from(width.max(1));
    let (first, last) = range.leaves();
    let x0 = (first as u64 * width / leaves).min(width - 1);
    let x1 = ((last as u64 + 1) * width / leaves).clamp(x0 + 1, width);
    (x0 as u32, x1 as u32)
}

/// Decode `image_bytes` and encode one PNG strip per range.
fn cut_fragments(
    image_bytes: &[u8],
    ranges: &[PageRange],
    total_pages: usize,
) -> Result<Vec<Vec<u8>>, image::ImageError> {
    let img = image::load_from_memory(image_bytes)?;
    let (width, height) = (img.width(), img.height());

    ranges
        .iter()
        .map(|range| {
            let (x0, x1) = strip_span(range, total_pages, width);
            encode_png(&img.crop_imm(x0, 0, x1 - x0, height))
        })
        .collect()
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
