use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{debug, info};
use serde::Serialize;

use crate::config::StitchConfig;
use crate::error::{PipelineError, PipelineWarning};
use crate::imaging::{bottom_rows, center_crop_width, crop_rows_from, to_gray, vconcat};

pub mod matching;
pub mod trim;

use matching::{MatchResult, match_template};

/// One captured screenshot, oldest first in a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    path: Option<PathBuf>,
    image: RgbImage,
}

impl Frame {
    pub fn from_image(image: RgbImage) -> Self {
        Self { path: None, image }
    }

    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let image = image::open(path)
            .map_err(|source| PipelineError::UnreadableImage {
                path: path.to_path_buf(),
                source,
            })?
            .into_rgb8();

        Ok(Self {
            path: Some(path.to_path_buf()),
            image,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

pub fn load_frames(paths: &[PathBuf]) -> Result<Vec<Frame>, PipelineError> {
    paths.iter().map(|path| Frame::open(path)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StitchStep {
    pub frame_index: usize,
    pub match_result: Option<MatchResult>,
    pub crop_start: u32,
    pub appended_rows: u32,
    pub degenerate: bool,
}

#[derive(Debug, Clone)]
pub struct StitchResult {
    pub image: RgbImage,
    pub last_match_score: Option<f32>,
    pub steps: Vec<StitchStep>,
    pub warnings: Vec<PipelineWarning>,
    /// Trailing frames removed by the quality gate, last dropped first.
    pub dropped: Vec<Frame>,
    pub attempts: usize,
}

pub struct Stitcher {
    config: StitchConfig,
}

impl Stitcher {
    pub fn new(config: StitchConfig) -> Self {
        Self { config }
    }

    /// Folds `frames` into one tall image, appending only the part of every
    /// frame that lies below its overlap with the accumulated image.
    pub fn stitch(&self, frames: &[Frame]) -> Result<StitchResult, PipelineError> {
        if frames.len() < 2 {
            return Err(PipelineError::InsufficientInput {
                count: frames.len(),
            });
        }

        info!(
            "stitching {} frames, template {}px, search {:?}",
            frames.len(),
            self.config.template_height,
            self.config.search_height
        );

        let mut accumulator = frames[0].image().clone();
        let mut last_match_score = None;
        let mut steps = vec![];
        let mut warnings = vec![];

        for (frame_index, frame) in frames.iter().enumerate().skip(1) {
            let width = accumulator.width().min(frame.image().width());
            accumulator = center_crop_width(&accumulator, width);
            let next = center_crop_width(frame.image(), width);

            let step = self.overlap(&accumulator, &next, frame_index);
            last_match_score = step.match_result.map(|m| m.score);

            if step.degenerate {
                let warning = PipelineWarning::DegenerateOverlap {
                    frame_index,
                    crop_start: step.crop_start,
                    frame_height: next.height(),
                };
                debug!("{warning}");
                warnings.push(warning);
                accumulator = vconcat(&accumulator, &next);
            } else {
                accumulator = vconcat(&accumulator, &crop_rows_from(&next, step.crop_start));
            }

            debug!(
                "frame {frame_index}: score {:?}, crop at {}, +{} rows",
                last_match_score, step.crop_start, step.appended_rows
            );
            steps.push(step);
        }

        Ok(StitchResult {
            image: accumulator,
            last_match_score,
            steps,
            warnings,
            dropped: vec![],
            attempts: 1,
        })
    }

    fn overlap(&self, accumulator: &RgbImage, next: &RgbImage, frame_index: usize) -> StitchStep {
        let template_height = self.config.template_height.min(accumulator.height());
        let template = to_gray(&bottom_rows(accumulator, template_height));

        let search_height = self
            .config
            .search_height
            .map_or(next.height(), |h| h.min(next.height()));
        let search_area = to_gray(&crop_top(next, search_height));

        let match_result = match_template(&search_area, &template);
        let crop_start = match_result.map_or(next.height(), |m| m.row + template_height);

        // A crop at or past the bottom edge would append nothing.
        let degenerate = crop_start >= next.height();
        let appended_rows = if degenerate {
            next.height()
        } else {
            next.height() - crop_start
        };

        StitchStep {
            frame_index,
            match_result,
            crop_start,
            appended_rows,
            degenerate,
        }
    }

    /// Stitches, and while the last frame matches below the acceptance score,
    /// drops it as a duplicate capture and stitches again. Bounded by
    /// `max_attempts` and by never going below two frames.
    pub fn stitch_with_quality_gate(
        &self,
        mut frames: Vec<Frame>,
    ) -> Result<StitchResult, PipelineError> {
        let mut dropped = vec![];
        let mut low_confidence = vec![];
        let mut attempts = 0;

        loop {
            attempts += 1;
            let mut result = self.stitch(&frames)?;

            if let Some(score) = result.last_match_score {
                if score < self.config.acceptance_score {
                    let warning = PipelineWarning::LowConfidenceMatch {
                        frame_index: frames.len() - 1,
                        score,
                    };
                    debug!("{warning}");
                    low_confidence.push(warning);

                    if attempts < self.config.max_attempts && frames.len() > 2 {
                        if let Some(frame) = frames.pop() {
                            info!("dropping frame {} and retrying", frames.len());
                            dropped.push(frame);
                        }
                        continue;
                    }
                }
            }

            low_confidence.append(&mut result.warnings);
            result.warnings = low_confidence;
            result.dropped = dropped;
            result.attempts = attempts;
            return Ok(result);
        }
    }
}

fn crop_top(image: &RgbImage, rows: u32) -> RgbImage {
    image::imageops::crop_imm(image, 0, 0, image.width(), rows.min(image.height())).to_image()
}
