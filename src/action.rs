use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use futures::future::join_all;
use image::{DynamicImage, GrayImage, RgbImage, imageops};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::classify::{AmountSample, TransactionType, classify_amount};
use crate::config::{ClassifierConfig, OcrConfig, PipelineConfig};
use crate::detect::{TransactionBlock, block_mask, draw_blocks, find_blocks};
use crate::error::PipelineWarning;
use crate::event::{PipelineStep, emit_info, emit_warning};
use crate::imaging::to_gray;
use crate::layout::{BlockLayout, FieldBox, FieldLocator, MaskSet, draw_layouts};
use crate::normalize::{parse_amount, parse_booking_date, patch_decimal_separator};
use crate::ocr::{OcrRequest, TextRecognizer};
use crate::stitch::trim::trim_top_border;
use crate::stitch::{Frame, Stitcher, load_frames};

pub const THRESHOLD_DEBUG_IMAGE: &str = "ocr_threshold.png";
pub const RESULT_DEBUG_IMAGE: &str = "ocr_result.png";

/// One transaction row read from the stitched image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedItem {
    pub date: String,
    pub name: String,
    pub category: String,
    pub price: String,
    pub tag: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub color_sample: Option<String>,
    pub amount: Option<f64>,
    pub booking_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub first_date: Option<String>,
    pub items: Vec<ExtractedItem>,
}

pub struct PipelineOutput {
    pub image: RgbImage,
    pub last_match_score: Option<f32>,
    /// Row of the removed top border, if any.
    pub border: Option<u32>,
    pub blocks: Vec<TransactionBlock>,
    pub result: ExtractionResult,
    pub warnings: Vec<PipelineWarning>,
    pub dropped: Vec<Frame>,
}

/// OCR text of one block before the date is carried forward.
#[derive(Debug, Clone, Default)]
struct BlockReading {
    /// `None` when no date header was expected above the block.
    date: Option<String>,
    name: String,
    category: String,
    price: String,
    tag: String,
    sample: Option<AmountSample>,
}

pub struct Pipeline {
    config: PipelineConfig,
    recognizer: Arc<dyn TextRecognizer>,
    debug_dir: Option<PathBuf>,
    year: i32,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let recognizer = config.ocr.backend.recognizer();
        Self {
            config,
            recognizer,
            debug_dir: None,
            year: Utc::now().year(),
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Writes the block mask and annotated result images into `dir`.
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    /// Year assumed for booking dates printed without one.
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    pub async fn run_paths(&self, paths: &[PathBuf]) -> Result<PipelineOutput> {
        emit_info(
            PipelineStep::Load,
            format!("loading {} frames", paths.len()),
            Some(json!({ "frames": paths })),
        );
        let frames = load_frames(paths)?;
        self.run(frames).await
    }

    pub async fn run(&self, frames: Vec<Frame>) -> Result<PipelineOutput> {
        let mut warnings = vec![];

        let stitched = Stitcher::new(self.config.stitch.clone()).stitch_with_quality_gate(frames)?;
        for warning in &stitched.warnings {
            emit_warning(PipelineStep::Stitch, warning);
        }
        emit_info(
            PipelineStep::Stitch,
            format!("stitched image is {} px high", stitched.image.height()),
            Some(json!({
                "height": stitched.image.height(),
                "lastMatchScore": stitched.last_match_score,
                "attempts": stitched.attempts,
                "dropped": stitched.dropped.len(),
                "steps": stitched.steps,
            })),
        );
        warnings.extend(stitched.warnings);

        let (image, border) = trim_top_border(stitched.image, &self.config.trim);
        match border {
            Some(row) => emit_info(
                PipelineStep::Trim,
                format!("removed top border ending at row {row}"),
                Some(json!({ "border": row, "height": image.height() })),
            ),
            None => {
                let warning = PipelineWarning::BoundaryNotFound {
                    search_start: self.config.trim.search_start,
                    search_end: self.config.trim.search_end,
                };
                emit_warning(PipelineStep::Trim, &warning);
                warnings.push(warning);
            }
        }

        let (blocks, result, extract_warnings) = self.extract(&image).await?;
        warnings.extend(extract_warnings);

        Ok(PipelineOutput {
            image,
            last_match_score: stitched.last_match_score,
            border,
            blocks,
            result,
            warnings,
            dropped: stitched.dropped,
        })
    }

    /// Detects the transaction blocks on a stitched image and reads them.
    pub async fn extract(
        &self,
        image: &RgbImage,
    ) -> Result<(Vec<TransactionBlock>, ExtractionResult, Vec<PipelineWarning>)> {
        let layout_config = &self.config.layout;
        let masks = MaskSet::new(to_gray(image), &layout_config.mask_sources());

        let mask = block_mask(masks.gray(), &self.config.detect);
        let blocks = find_blocks(&mask, &self.config.detect);
        emit_info(
            PipelineStep::Detect,
            format!("found {} transaction blocks", blocks.len()),
            Some(json!({ "blocks": blocks })),
        );
        self.save_debug_image(THRESHOLD_DEBUG_IMAGE, &DynamicImage::ImageLuma8(mask))?;

        let locator = FieldLocator::new(layout_config, &masks);
        let first_date_box = locator.locate_first_date();
        let (layouts, mut warnings) = locator.locate(&blocks);
        for warning in &warnings {
            emit_warning(PipelineStep::Ocr, warning);
        }

        let gray = Arc::new(masks.gray().clone());
        let color = Arc::new(image.clone());

        let first_date = match first_date_box {
            Some(field) => {
                let gray = gray.clone();
                let recognizer = self.recognizer.clone();
                let request = OcrRequest::text(&self.config.ocr);
                let text = tokio::task::spawn_blocking(move || {
                    read_field(&gray, &field, recognizer.as_ref(), &request)
                })
                .await
                .context("first date OCR task failed")?;
                Some(text).filter(|t| !t.is_empty())
            }
            None => None,
        };

        let tasks = layouts.iter().cloned().map(|layout| {
            let gray = gray.clone();
            let color = color.clone();
            let recognizer = self.recognizer.clone();
            let ocr_config = self.config.ocr.clone();
            let classify_config = self.config.classify.clone();
            tokio::task::spawn_blocking(move || {
                read_block(
                    &gray,
                    &color,
                    &layout,
                    recognizer.as_ref(),
                    &ocr_config,
                    &classify_config,
                )
            })
        });
        let readings = join_all(tasks)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .context("block OCR task failed")?;

        let mut current_date = first_date.clone().unwrap_or_default();
        let items = readings
            .into_iter()
            .enumerate()
            .map(|(index, reading)| {
                if let Some(date) = reading.date.filter(|d| !d.is_empty()) {
                    current_date = date;
                }

                let transaction_type = match reading.sample {
                    Some(sample) => sample.sign,
                    None => {
                        let warning = PipelineWarning::ambiguity(index, "sign");
                        emit_warning(PipelineStep::Ocr, &warning);
                        warnings.push(warning);
                        TransactionType::from_text(&reading.price)
                    }
                };

                debug!(
                    "item {index}: {} | {} | {} | {} | {current_date}",
                    reading.name, reading.category, reading.price, reading.tag
                );

                ExtractedItem {
                    date: current_date.clone(),
                    amount: parse_amount(&reading.price, transaction_type),
                    booking_date: parse_booking_date(&current_date, self.year),
                    name: reading.name,
                    category: reading.category,
                    price: reading.price,
                    tag: reading.tag,
                    transaction_type,
                    color_sample: reading.sample.map(|s| s.hex()),
                }
            })
            .collect_vec();

        let mut annotated = image.clone();
        draw_blocks(&mut annotated, &blocks);
        draw_layouts(&mut annotated, first_date_box.as_ref(), &layouts, layout_config);
        self.save_debug_image(RESULT_DEBUG_IMAGE, &DynamicImage::ImageRgb8(annotated))?;

        emit_info(
            PipelineStep::Ocr,
            format!("extracted {} items", items.len()),
            Some(json!({ "items": items.len(), "firstDate": first_date })),
        );

        Ok((blocks, ExtractionResult { first_date, items }, warnings))
    }

    fn save_debug_image(&self, name: &str, image: &DynamicImage) -> Result<()> {
        let Some(dir) = &self.debug_dir else {
            return Ok(());
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create debug dir {}", dir.display()))?;
        let path = dir.join(name);
        image
            .save(&path)
            .with_context(|| format!("could not write {}", path.display()))?;
        debug!("saved {}", path.display());
        Ok(())
    }
}

/// Crops the field from `gray` and recognizes it. Empty fields and OCR
/// failures read as an empty string.
fn read_field(
    gray: &GrayImage,
    field: &FieldBox,
    recognizer: &dyn TextRecognizer,
    request: &OcrRequest,
) -> String {
    let Some((x, y, w, h)) = field.clip(gray.width(), gray.height()) else {
        return String::new();
    };
    let crop = imageops::crop_imm(gray, x, y, w, h).to_image();

    match recognizer.recognize(&DynamicImage::ImageLuma8(crop), request) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("OCR failed for {field:?}: {e:#}");
            String::new()
        }
    }
}

fn read_block(
    gray: &GrayImage,
    color: &RgbImage,
    layout: &BlockLayout,
    recognizer: &dyn TextRecognizer,
    ocr: &OcrConfig,
    classify: &ClassifierConfig,
) -> BlockReading {
    let text = OcrRequest::text(ocr);
    let read = |field: &FieldBox| read_field(gray, field, recognizer, &text);

    let price = read_field(gray, &layout.price, recognizer, &OcrRequest::price(ocr));
    let price = if price.is_empty() {
        price
    } else {
        patch_decimal_separator(&price)
    };

    let sample = layout
        .price
        .clip(color.width(), color.height())
        .and_then(|(x, y, w, h)| {
            classify_amount(&imageops::crop_imm(color, x, y, w, h).to_image(), classify)
        });

    BlockReading {
        date: layout.date.as_ref().map(read),
        name: read(&layout.name),
        category: read(&layout.category),
        price,
        tag: layout.tag.as_ref().map(read).unwrap_or_default(),
        sample,
    }
}

/// All `*.png` files in `dir`, sorted by file name.
pub fn list_frame_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("could not read frame directory {}", dir.display()))?;

    let paths = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        })
        .sorted()
        .collect_vec();

    info!("found {} frames in {}", paths.len(), dir.display());
    Ok(paths)
}

/// Deletes the files of frames the quality gate dropped.
pub fn remove_dropped_frames(dropped: &[Frame]) -> Result<usize> {
    let mut removed = 0;
    for path in dropped.iter().filter_map(Frame::path) {
        fs::remove_file(path).with_context(|| format!("could not remove {}", path.display()))?;
        info!("removed dropped frame {}", path.display());
        removed += 1;
    }
    Ok(removed)
}

/// Writes the stitched image and the extracted items as pretty JSON.
pub fn save_outputs(output: &PipelineOutput, image_path: &Path, items_path: &Path) -> Result<()> {
    for parent in [image_path.parent(), items_path.parent()]
        .into_iter()
        .flatten()
        .filter(|p| !p.as_os_str().is_empty())
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("could not create {}", parent.display()))?;
    }

    output
        .image
        .save(image_path)
        .with_context(|| format!("could not write {}", image_path.display()))?;

    let json = serde_json::to_string_pretty(&output.result)?;
    fs::write(items_path, json)
        .with_context(|| format!("could not write {}", items_path.display()))?;

    emit_info(
        PipelineStep::Save,
        format!(
            "saved {} and {} items to {}",
            image_path.display(),
            output.result.items.len(),
            items_path.display()
        ),
        None,
    );
    Ok(())
}
