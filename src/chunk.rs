//! Chunk and slice-set metadata for the chunked path.
//!
//! Chunks are the unit of parallel work: each covers one contiguous,
//! 1-indexed, inclusive page range. Ordinal index is the only ordering key
//! used for reassembly; arrival order of rendered chunks never matters.

use crate::job::TreatmentName;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A contiguous page range, 1-indexed, end inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRange {
    pub start_page: usize,
    pub end_page: usize,
}

impl PageRange {
    pub fn len(&self) -> usize {
        (self.end_page + 1).saturating_sub(self.start_page)
    }

    pub fn is_empty(&self) -> bool {
        self.end_page < self.start_page
    }

    /// Leaves (sheets, two pages each) touched by this range, 0-indexed and
    /// inclusive. Page `p` sits on leaf `(p - 1) / 2`.
    pub fn leaves(&self) -> (usize, usize) {
        ((self.start_page - 1) / 2, (self.end_page - 1) / 2)
    }
}

/// Split `1..=total_pages` into consecutive ranges of at most
/// `pages_per_chunk` pages.
pub fn plan_chunks(total_pages: usize, pages_per_chunk: usize) -> Vec<PageRange> {
    let size = pages_per_chunk.max(1);
    (0..total_pages.div_ceil(size))
        .map(|i| PageRange {
            start_page: i * size + 1,
            end_page: ((i + 1) * size).min(total_pages),
        })
        .collect()
}

/// One page range of the source document, as produced by the splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// 0-based ordinal; contiguous across a job.
    pub index: usize,
    pub start_page: usize,
    /// Inclusive.
    pub end_page: usize,
    /// Object-store path of the extracted chunk document.
    #[serde(rename = "chunkPath")]
    pub source_path: String,
    /// Object-store path of the rendered chunk, once stage 3 has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_path: Option<String>,
}

impl Chunk {
    pub fn range(&self) -> PageRange {
        PageRange {
            start_page: self.start_page,
            end_page: self.end_page,
        }
    }
}

/// Check that `chunks` (already sorted by index) are numbered `0..n` and
/// cover `1..=total_pages` exactly once.
///
/// Returns a human-readable description of the first violation found.
pub fn validate_chunks(chunks: &[Chunk], total_pages: usize) -> Result<(), String> {
    if chunks.is_empty() {
        return Err("splitter returned no chunks".into());
    }

    let mut next_page = 1;
    let mut paths = HashSet::with_capacity(chunks.len());
    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.index != position {
            return Err(format!(
                "chunk indices are not contiguous from 0: expected {position}, found {}",
                chunk.index
            ));
        }
        if chunk.start_page > chunk.end_page {
            return Err(format!(
                "chunk {} has an inverted range {}–{}",
                chunk.index, chunk.start_page, chunk.end_page
            ));
        }
        if chunk.start_page != next_page {
            let kind = if chunk.start_page > next_page { "gap" } else { "overlap" };
            return Err(format!(
                "{kind} before chunk {}: expected it to start at page {next_page}, starts at {}",
                chunk.index, chunk.start_page
            ));
        }
        if !paths.insert(chunk.source_path.as_str()) {
            return Err(format!(
                "chunk {} reuses path '{}'",
                chunk.index, chunk.source_path
            ));
        }
        next_page = chunk.end_page + 1;
    }

    if next_page != total_pages + 1 {
        return Err(format!(
            "chunks cover pages 1–{} but the document has {total_pages}",
            next_page - 1
        ));
    }
    Ok(())
}

/// Per-treatment, per-chunk image fragments produced by the slicer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SliceSet(BTreeMap<TreatmentName, Vec<String>>);

impl SliceSet {
    pub fn new(slices: BTreeMap<TreatmentName, Vec<String>>) -> Self {
        Self(slices)
    }

    pub fn get(&self, treatment: TreatmentName) -> Option<&[String]> {
        self.0.get(&treatment).map(Vec::as_slice)
    }

    pub fn treatments(&self) -> impl Iterator<Item = TreatmentName> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every fragment path, in treatment then ordinal order.
    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.values().flatten().map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<TreatmentName, Vec<String>> {
        &self.0
    }

    /// Entries must match the treatments that were sent to the slicer.
    pub fn check_entries(
        &self,
        expected: impl IntoIterator<Item = TreatmentName>,
    ) -> Result<(), String> {
        let expected: BTreeSet<TreatmentName> = expected.into_iter().collect();
        if let Some(missing) = expected.iter().find(|t| !self.0.contains_key(*t)) {
            return Err(format!("no fragments returned for treatment '{missing}'"));
        }
        if let Some(extra) = self.treatments().find(|t| !expected.contains(t)) {
            return Err(format!(
                "fragments returned for treatment '{extra}', which was not supplied"
            ));
        }
        Ok(())
    }

    /// Each treatment's fragment count must equal the chunk count.
    pub fn check_lengths(&self, chunk_count: usize) -> Result<(), String> {
        for (treatment, fragments) in &self.0 {
            if fragments.len() != chunk_count {
                return Err(format!(
                    "treatment '{treatment}' has {} fragments but the document was split into {chunk_count} chunks",
                    fragments.len()
                ));
            }
        }
        Ok(())
    }
}
