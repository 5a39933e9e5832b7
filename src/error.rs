use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Conditions that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("need at least two frames to stitch, got {count}")]
    InsufficientInput { count: usize },

    #[error("could not read image at '{}'", path.display())]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Conditions that are recorded and logged but never stop a run.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PipelineWarning {
    #[error("frame {frame_index}: overlap covers the whole frame (crop at {crop_start}, height {frame_height}), appending it unmodified")]
    DegenerateOverlap {
        frame_index: usize,
        crop_start: u32,
        frame_height: u32,
    },

    #[error("frame {frame_index}: match score {score:.3} below acceptance threshold")]
    LowConfidenceMatch { frame_index: usize, score: f32 },

    #[error("no top border found in rows {search_start}..{search_end}")]
    BoundaryNotFound { search_start: u32, search_end: u32 },

    #[error("block {block_index}: {field} has no confident signal, using fallback")]
    FieldDetectionAmbiguity { block_index: usize, field: String },
}

impl PipelineWarning {
    pub fn ambiguity(block_index: usize, field: impl Into<String>) -> Self {
        Self::FieldDetectionAmbiguity {
            block_index,
            field: field.into(),
        }
    }
}
