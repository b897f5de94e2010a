//! Pipeline stages and their progress checkpoints.
//!
//! Each pipeline walks its stages in declaration order, so the progress recorded in
//! `processing.progress` never decreases within one run.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A stage that can be written to `processing.stage` / `processing.progress`.
pub trait PipelineStage: Display + Send + Sync {
    /// Progress percentage (0-100) reported while in this stage.
    fn progress(&self) -> u8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageStage {
    Created,
    Downloaded,
    VariantsReady,
    DerivativesReady,
    OriginalDeleted,
    Done,
}

impl ImageStage {
    pub const ALL: [ImageStage; 6] = [
        ImageStage::Created,
        ImageStage::Downloaded,
        ImageStage::VariantsReady,
        ImageStage::DerivativesReady,
        ImageStage::OriginalDeleted,
        ImageStage::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStage::Created => "created",
            ImageStage::Downloaded => "downloaded",
            ImageStage::VariantsReady => "variants_ready",
            ImageStage::DerivativesReady => "derivatives_ready",
            ImageStage::OriginalDeleted => "original_deleted",
            ImageStage::Done => "done",
        }
    }
}

impl PipelineStage for ImageStage {
    fn progress(&self) -> u8 {
        match self {
            ImageStage::Created => 20,
            ImageStage::Downloaded => 35,
            ImageStage::VariantsReady => 55,
            ImageStage::DerivativesReady => 75,
            ImageStage::OriginalDeleted => 85,
            ImageStage::Done => 100,
        }
    }
}

impl Display for ImageStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Video pipeline stages.
///
/// `Transcoded` carries the nominal checkpoint: `completed` renditions out of `total`,
/// labelled with the height that sits at that position in ascending order. The
/// label is not necessarily the rendition that finished last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoStage {
    Created,
    Downloaded,
    Metadata,
    PosterGenerated,
    PosterUploaded,
    Transcoded {
        height: u32,
        completed: usize,
        total: usize,
    },
    OriginalDeleted,
    Done,
}

impl VideoStage {
    /// Checkpoint reached after `completed` of `heights` finished.
    ///
    /// `heights` must be sorted ascending; `completed` is 1-based.
    pub fn transcoded(heights: &[u32], completed: usize) -> Self {
        let total = heights.len().max(1);
        let completed = completed.clamp(1, total);
        VideoStage::Transcoded {
            height: heights.get(completed - 1).copied().unwrap_or_default(),
            completed,
            total,
        }
    }

    fn rank(&self) -> (u8, usize) {
        match self {
            VideoStage::Transcoded { completed, .. } => (self.progress(), *completed),
            other => (other.progress(), 0),
        }
    }
}

impl PipelineStage for VideoStage {
    fn progress(&self) -> u8 {
        match self {
            VideoStage::Created => 10,
            VideoStage::Downloaded => 20,
            VideoStage::Metadata => 30,
            VideoStage::PosterGenerated => 40,
            VideoStage::PosterUploaded => 50,
            // 60/70/80 for three renditions
            VideoStage::Transcoded {
                completed, total, ..
            } => {
                let total = (*total).max(1);
                let completed = (*completed).min(total);
                (50 + 30 * completed / total) as u8
            }
            VideoStage::OriginalDeleted => 90,
            VideoStage::Done => 100,
        }
    }
}

impl PartialOrd for VideoStage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VideoStage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Display for VideoStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VideoStage::Created => write!(f, "created"),
            VideoStage::Downloaded => write!(f, "downloaded"),
            VideoStage::Metadata => write!(f, "metadata"),
            VideoStage::PosterGenerated => write!(f, "poster_generated"),
            VideoStage::PosterUploaded => write!(f, "poster_uploaded"),
            VideoStage::Transcoded { height, .. } => write!(f, "transcoded_{}", height),
            VideoStage::OriginalDeleted => write!(f, "original_deleted"),
            VideoStage::Done => write!(f, "done"),
        }
    }
}
