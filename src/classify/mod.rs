use image::{RgbImage, imageops};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::config::ClassifierConfig;

pub mod lab;

use lab::Lab;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionType {
    Expense,
    Income,
}

impl TransactionType {
    /// Fallback when the price colour is inconclusive: a leading `+` means
    /// income, anything else an expense.
    pub fn from_text(text: &str) -> Self {
        match text.trim_start().chars().next() {
            Some('+') => TransactionType::Income,
            _ => TransactionType::Expense,
        }
    }
}

/// Representative colour of a price region and the sign it implies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountSample {
    pub sign: TransactionType,
    pub color: [u8; 3],
    pub expense_distance: f32,
    pub income_distance: f32,
}

impl AmountSample {
    pub fn hex(&self) -> String {
        let [r, g, b] = self.color;
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

fn inner_region(region: &RgbImage, fraction: f32) -> RgbImage {
    let (w, h) = region.dimensions();
    let dx = (w as f32 * fraction) as u32;
    let dy = (h as f32 * fraction) as u32;
    if w <= 2 * dx || h <= 2 * dy {
        return region.clone();
    }
    imageops::crop_imm(region, dx, dy, w - 2 * dx, h - 2 * dy).to_image()
}

fn median(mut values: Vec<f32>) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Classifies a cropped price region by its dominant colour. `None` when the
/// region is empty or both reference colours are equally close.
pub fn classify_amount(region: &RgbImage, config: &ClassifierConfig) -> Option<AmountSample> {
    if region.width() == 0 || region.height() == 0 {
        return None;
    }

    let inner = inner_region(region, config.border_fraction);
    let pixels = inner.pixels().map(|p| Lab::from_rgb(p.0)).collect_vec();

    let colored = pixels
        .iter()
        .copied()
        .filter(|lab| lab.chroma() >= config.neutral_chroma)
        .collect_vec();
    let min_colored = ((pixels.len() as f32 * config.min_colored_fraction).ceil() as usize).max(1);
    let samples = if colored.len() >= min_colored {
        colored
    } else {
        pixels
    };

    let representative = Lab {
        l: median(samples.iter().map(|p| p.l).collect())?,
        a: median(samples.iter().map(|p| p.a).collect())?,
        b: median(samples.iter().map(|p| p.b).collect())?,
    };

    let expense_distance = representative.distance(&Lab::from_rgb(config.expense_rgb));
    let income_distance = representative.distance(&Lab::from_rgb(config.income_rgb));
    if !expense_distance.is_finite() || !income_distance.is_finite() {
        return None;
    }

    let sign = if expense_distance < income_distance {
        TransactionType::Expense
    } else if income_distance < expense_distance {
        TransactionType::Income
    } else {
        return None;
    };

    Some(AmountSample {
        sign,
        color: representative.to_rgb(),
        expense_distance,
        income_distance,
    })
}
