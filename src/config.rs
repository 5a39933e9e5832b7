use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ocr::OcrBackend;
use crate::scan::Direction;

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub stitch: StitchConfig,
    pub trim: TrimConfig,
    pub detect: DetectConfig,
    pub layout: LayoutConfig,
    pub classify: ClassifierConfig,
    pub ocr: OcrConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("could not parse config {}", path.display()))
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct StitchConfig {
    /// Rows taken from the bottom of the accumulator as correlation probe.
    pub template_height: u32,
    /// Only the top rows of the next frame are searched. `None` searches the
    /// whole frame.
    pub search_height: Option<u32>,
    /// Last-frame scores below this are treated as duplicate captures.
    pub acceptance_score: f32,
    pub max_attempts: usize,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            template_height: 170,
            search_height: None,
            acceptance_score: 0.85,
            max_attempts: 5,
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct TrimConfig {
    pub search_start: u32,
    pub search_end: u32,
    /// Rows with a lower standard deviation are border candidates.
    pub flatness_threshold: f64,
    /// The row below a candidate must be this much busier.
    pub contrast_margin: f64,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            search_start: 10,
            search_end: 300,
            flatness_threshold: 20.0,
            contrast_margin: 30.0,
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct DetectConfig {
    /// Gray values above this belong to a transaction card.
    pub white_threshold: u8,
    pub min_block_area: f64,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            white_threshold: 253,
            min_block_area: 50_000.0,
        }
    }
}

/// Raster a field is scanned on.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum MaskSource {
    Gray,
    Binary(u8),
    BinaryInv(u8),
}

/// Scan parameters of one field, relative to its anchor.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
pub struct FieldSpec {
    pub dx: i32,
    pub dy: i32,
    pub height: u32,
    pub direction: Direction,
    pub stop_run: u32,
    pub source: MaskSource,
}

impl FieldSpec {
    pub const fn new(
        dx: i32,
        dy: i32,
        height: u32,
        direction: Direction,
        stop_run: u32,
        source: MaskSource,
    ) -> Self {
        Self {
            dx,
            dy,
            height,
            direction,
            stop_run,
            source,
        }
    }
}

/// Offsets are tuned to one fixed app layout.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct LayoutConfig {
    /// Absolute position of the date header above the first card.
    pub first_date: FieldSpec,
    pub date: FieldSpec,
    /// A date header is expected when a card starts more than `height + date_gap`
    /// below the previous one.
    pub date_gap: i32,
    pub name: FieldSpec,
    pub category: FieldSpec,
    pub tag: FieldSpec,
    pub tag_ink_threshold: usize,
    pub tag_margin: i32,
    /// Name moves up by this when a tag is present.
    pub tag_name_lift: i32,
    pub price: FieldSpec,
    pub price_probe: FieldSpec,
    pub price_probe_ink_threshold: usize,
    pub price_margin: i32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        use Direction::{Leftward, Rightward};
        use MaskSource::{Binary, BinaryInv, Gray};

        Self {
            first_date: FieldSpec::new(1350, 9, 26, Rightward, 12, BinaryInv(190)),
            date: FieldSpec::new(20, -33, 26, Rightward, 12, Gray),
            date_gap: 20,
            name: FieldSpec::new(98, 20, 35, Rightward, 12, Binary(220)),
            category: FieldSpec::new(98, 59, 35, Rightward, 12, Binary(190)),
            tag: FieldSpec::new(102, 56, 38, Rightward, 3, Binary(253)),
            tag_ink_threshold: 3_333,
            tag_margin: 3,
            tag_name_lift: 5,
            price: FieldSpec::new(725, 35, 40, Leftward, 12, Binary(190)),
            price_probe: FieldSpec::new(733, 35, 40, Leftward, 3, Binary(253)),
            price_probe_ink_threshold: 333,
            price_margin: 3,
        }
    }
}

impl LayoutConfig {
    pub fn mask_sources(&self) -> Vec<MaskSource> {
        let mut sources = vec![];
        for spec in [
            &self.first_date,
            &self.date,
            &self.name,
            &self.category,
            &self.tag,
            &self.price,
            &self.price_probe,
        ] {
            if !sources.contains(&spec.source) {
                sources.push(spec.source);
            }
        }
        sources
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Fraction cropped from every side before sampling.
    pub border_fraction: f32,
    /// CIELAB chroma below which a pixel counts as gray/white.
    pub neutral_chroma: f32,
    /// Colored pixels must make up this share of the region to be used alone.
    pub min_colored_fraction: f32,
    pub expense_rgb: [u8; 3],
    pub income_rgb: [u8; 3],
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            border_fraction: 0.15,
            neutral_chroma: 12.0,
            min_colored_fraction: 0.05,
            expense_rgb: [229, 57, 53],
            income_rgb: [46, 158, 91],
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct OcrConfig {
    pub backend: OcrBackend,
    pub lang: String,
    pub text_psm: i32,
    pub price_psm: i32,
    pub price_oem: i32,
    pub price_whitelist: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::default(),
            lang: "deu".to_string(),
            text_psm: 6,
            price_psm: 7,
            price_oem: 3,
            price_whitelist: "-−0123456789,. €$".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "stitch": { "template_height": 120 }, "detect": { "min_block_area": 1000.0 } }"#;

        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.stitch.template_height, 120);
        assert_eq!(config.stitch.acceptance_score, 0.85);
        assert_eq!(config.detect.min_block_area, 1000.0);
        assert_eq!(config.detect.white_threshold, 253);
        assert_eq!(config.layout, LayoutConfig::default());
    }

    #[test]
    fn config_roundtrips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = PipelineConfig::default();
        config.layout.price.dx = 700;
        config.ocr.lang = "eng".to_string();

        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(PipelineConfig::load(&dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn mask_sources_are_deduplicated() {
        let sources = LayoutConfig::default().mask_sources();

        assert_eq!(
            sources,
            vec![
                MaskSource::BinaryInv(190),
                MaskSource::Gray,
                MaskSource::Binary(220),
                MaskSource::Binary(190),
                MaskSource::Binary(253),
            ]
        );
    }
}
