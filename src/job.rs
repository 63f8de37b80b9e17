//! Job requests and the session namespace that scopes their artifacts.
//!
//! A [`JobRequest`] is immutable once accepted: the orchestrator validates
//! it, derives a [`Session`] from its destination, and from then on only
//! reads it.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bleed added on the outer and vertical edges, in inches.
pub const BLEED_INCHES: f64 = 0.125;
/// PostScript points per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Name of one of the (up to three) treatment images of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TreatmentName {
    /// Fore-edge image; the only treatment used by single-surface jobs.
    Primary,
    /// Top-edge image.
    SecondaryA,
    /// Bottom-edge image.
    SecondaryB,
}

impl TreatmentName {
    pub const ALL: [TreatmentName; 3] = [
        TreatmentName::Primary,
        TreatmentName::SecondaryA,
        TreatmentName::SecondaryB,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TreatmentName::Primary => "primary",
            TreatmentName::SecondaryA => "secondary-a",
            TreatmentName::SecondaryB => "secondary-b",
        }
    }
}

impl fmt::Display for TreatmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TreatmentName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" | "side" => Ok(TreatmentName::Primary),
            "secondary-a" | "top" => Ok(TreatmentName::SecondaryA),
            "secondary-b" | "bottom" => Ok(TreatmentName::SecondaryB),
            other => Err(PipelineError::InvalidRequest(format!(
                "unknown treatment '{other}' (expected primary, secondary-a or secondary-b)"
            ))),
        }
    }
}

/// How the bleed area of each output page is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BleedMode {
    /// Grow every page by the standard bleed and shift content inward. (default)
    #[default]
    #[serde(alias = "add_bleed")]
    AddBleed,
    /// The source already carries bleed; page size is kept.
    Existing,
}

impl BleedMode {
    pub fn bleed_points(self) -> f64 {
        match self {
            BleedMode::AddBleed => BLEED_INCHES * POINTS_PER_INCH,
            BleedMode::Existing => 0.0,
        }
    }
}

/// Which page edges receive a treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    /// Fore-edge only. (default)
    #[default]
    #[serde(alias = "side-only")]
    SingleSurface,
    /// Fore-edge plus top and bottom edges.
    #[serde(alias = "all-edges")]
    MultiSurface,
}

impl LayoutMode {
    pub fn applies_to(self, treatment: TreatmentName) -> bool {
        match self {
            LayoutMode::SingleSurface => treatment == TreatmentName::Primary,
            LayoutMode::MultiSurface => true,
        }
    }
}

/// Trim size of the finished page, in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimSize {
    pub width_in: f64,
    pub height_in: f64,
}

impl Default for TrimSize {
    fn default() -> Self {
        Self {
            width_in: 5.0,
            height_in: 8.0,
        }
    }
}

impl TrimSize {
    /// Output page `(width, height)` in points for the given bleed mode.
    ///
    /// Bleed is added once horizontally (outer edge; the spine side never
    /// bleeds) and twice vertically.
    pub fn page_box(&self, bleed: BleedMode) -> (f64, f64) {
        let b = bleed.bleed_points();
        (
            self.width_in * POINTS_PER_INCH + b,
            self.height_in * POINTS_PER_INCH + 2.0 * b,
        )
    }
}

/// One compositing job, as accepted from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// Object-store path of the source document.
    #[serde(rename = "sourceDocumentPath")]
    pub source_path: String,
    /// Treatment images by name; absent names were not supplied.
    #[serde(rename = "treatmentImagePaths", default)]
    pub treatments: BTreeMap<TreatmentName, String>,
    /// Declared page count of the source document.
    pub total_pages: usize,
    #[serde(default)]
    pub trim_size: TrimSize,
    #[serde(default)]
    pub bleed_mode: BleedMode,
    #[serde(rename = "pageLayoutMode", default)]
    pub layout_mode: LayoutMode,
    /// Object-store path the final document is written to.
    pub output_path: String,
}

impl JobRequest {
    /// Check the request before any worker is invoked.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.total_pages == 0 {
            return Err(PipelineError::InvalidRequest(
                "totalPages must be ≥ 1".into(),
            ));
        }
        if self.source_path.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "sourceDocumentPath is empty".into(),
            ));
        }
        if self.output_path.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("outputPath is empty".into()));
        }
        if self.output_path == self.source_path {
            return Err(PipelineError::InvalidRequest(format!(
                "outputPath '{}' would overwrite the source document",
                self.output_path
            )));
        }
        if let Some((name, _)) = self.treatments.iter().find(|(_, p)| p.trim().is_empty()) {
            return Err(PipelineError::InvalidRequest(format!(
                "treatment '{name}' has an empty path"
            )));
        }
        if !(self.trim_size.width_in > 0.0 && self.trim_size.height_in > 0.0) {
            return Err(PipelineError::InvalidRequest(format!(
                "trim size must be positive, got {}×{} in",
                self.trim_size.width_in, self.trim_size.height_in
            )));
        }
        Ok(())
    }

    /// Treatments the layout mode actually uses.
    pub fn applicable_treatments(&self) -> BTreeMap<TreatmentName, String> {
        self.treatments
            .iter()
            .filter(|(name, _)| self.layout_mode.applies_to(**name))
            .map(|(name, path)| (*name, path.clone()))
            .collect()
    }
}

/// Storage namespace for one job's intermediate artifacts.
///
/// Derived from the destination path's leading segment, so the same
/// destination always maps to the same session and two jobs writing to
/// different destinations never share intermediate paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session(String);

impl Session {
    pub fn from_destination(output_path: &str) -> Result<Self, PipelineError> {
        let mut segments = output_path
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != ".");
        let first = segments.next().ok_or_else(|| {
            PipelineError::InvalidRequest(format!("cannot derive a session from '{output_path}'"))
        })?;

        let id = if segments.next().is_some() {
            first
        } else {
            // Bare file name: use its stem.
            first.rsplit_once('.').map_or(first, |(stem, _)| stem)
        };

        if id.is_empty() || id == ".." {
            return Err(PipelineError::InvalidRequest(format!(
                "cannot derive a session from '{output_path}'"
            )));
        }
        Ok(Session(id.to_string()))
    }

    /// Wrap an id that was already derived, e.g. one received over the wire.
    pub fn from_id(id: impl Into<String>) -> Self {
        Session(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn slice_path(&self, treatment: TreatmentName, index: usize) -> String {
        format!("{}/slices/{}/{:04}.png", self.0, treatment, index)
    }

    pub fn chunk_path(&self, index: usize) -> String {
        format!("{}/chunks/{:04}.pdf", self.0, index)
    }

    pub fn processed_path(&self, index: usize) -> String {
        format!("{}/processed/{:04}.pdf", self.0, index)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
