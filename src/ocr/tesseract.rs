use std::collections::HashMap;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use rusty_tesseract::{Args, Image};

use crate::ocr::{OcrRequest, TextRecognizer};

/// Field crops come from screenshots without density metadata.
const DEFAULT_DPI: i32 = 300;

pub struct TesseractRecognizer;

impl TesseractRecognizer {
    fn args(request: &OcrRequest) -> Args {
        let config_variables = request
            .whitelist
            .iter()
            .map(|w| ("tessedit_char_whitelist".to_string(), w.clone()))
            .collect::<HashMap<_, _>>();

        Args {
            lang: request.lang.clone(),
            config_variables,
            dpi: Some(DEFAULT_DPI),
            psm: request.psm,
            oem: request.oem,
        }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &DynamicImage, request: &OcrRequest) -> Result<String> {
        let file = tempfile::Builder::new()
            .prefix("field_")
            .suffix(".png")
            .tempfile()
            .context("could not create temporary OCR image")?;
        image
            .save_with_format(file.path(), ImageFormat::Png)
            .context("could not write temporary OCR image")?;

        let path = file.path().to_string_lossy().to_string();
        let image = Image::from_path(&path)?;
        let text = rusty_tesseract::image_to_string(&image, &Self::args(request))?;

        Ok(text.trim().to_string())
    }
}
