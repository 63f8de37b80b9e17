//! Strategy selection: direct for small documents, chunked for large ones.

use crate::outcome::ProcessingMethod;

/// Choose how to process a document of `total_pages` pages.
///
/// Pure and deterministic. `threshold` is the largest page count handled
/// directly, so a document of exactly `threshold` pages is not chunked.
pub fn select_strategy(total_pages: usize, threshold: usize) -> ProcessingMethod {
    if total_pages <= threshold {
        ProcessingMethod::Direct
    } else {
        ProcessingMethod::Chunked
    }
}
