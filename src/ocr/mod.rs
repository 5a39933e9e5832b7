use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};

use crate::config::OcrConfig;

pub mod tesseract;

/// Engine parameters for one recognition call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OcrRequest {
    pub lang: String,
    /// Restricts the recognized characters.
    pub whitelist: Option<String>,
    pub psm: Option<i32>,
    pub oem: Option<i32>,
}

impl OcrRequest {
    /// Free text fields: name, category, tag and dates.
    pub fn text(config: &OcrConfig) -> Self {
        Self {
            lang: config.lang.clone(),
            whitelist: None,
            psm: Some(config.text_psm),
            oem: None,
        }
    }

    /// Single-line amount restricted to digits, separators and currency signs.
    pub fn price(config: &OcrConfig) -> Self {
        Self {
            lang: config.lang.clone(),
            whitelist: Some(config.price_whitelist.clone()),
            psm: Some(config.price_psm),
            oem: Some(config.price_oem),
        }
    }
}

/// Turns a cropped field image into text.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage, request: &OcrRequest) -> Result<String>;
}

#[derive(
    Debug, Clone, PartialEq, strum::Display, EnumString, EnumIter, Serialize, Deserialize, Default,
)]
pub enum OcrBackend {
    #[strum(ascii_case_insensitive)]
    #[default]
    Tesseract,
}

impl OcrBackend {
    pub fn recognizer(&self) -> Arc<dyn TextRecognizer> {
        match self {
            OcrBackend::Tesseract => Arc::new(tesseract::TesseractRecognizer),
        }
    }
}
