use image::{GrayImage, Rgb, RgbImage};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};

use crate::config::DetectConfig;
use crate::imaging::threshold_binary;

/// A white card on the stitched image, one per transaction row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransactionBlock {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    pub area: f64,
}

impl TransactionBlock {
    fn from_contour(contour: &Contour<i32>) -> Option<Self> {
        let (min_x, max_x) = contour.points.iter().map(|p| p.x).minmax().into_option()?;
        let (min_y, max_y) = contour.points.iter().map(|p| p.y).minmax().into_option()?;

        Some(Self {
            x: min_x,
            y: min_y,
            w: (max_x - min_x + 1) as u32,
            h: (max_y - min_y + 1) as u32,
            area: polygon_area(contour),
        })
    }

    pub fn get_rect(&self) -> Rect {
        Rect::at(self.x, self.y).of_size(self.w.max(1), self.h.max(1))
    }
}

/// Shoelace area of the closed contour polygon.
fn polygon_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .circular_tuple_windows()
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    twice.abs() as f64 / 2.0
}

/// Binary mask in which transaction cards are foreground.
pub fn block_mask(gray: &GrayImage, config: &DetectConfig) -> GrayImage {
    threshold_binary(gray, config.white_threshold)
}

/// Outermost contours of `mask` larger than the configured area, top to
/// bottom.
pub fn find_blocks(mask: &GrayImage, config: &DetectConfig) -> Vec<TransactionBlock> {
    let contours = find_contours::<i32>(mask);
    let total = contours.len();

    let blocks = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(TransactionBlock::from_contour)
        .filter(|b| b.area > config.min_block_area)
        .sorted_by_key(|b| (b.y, b.x))
        .collect_vec();

    info!("found {} transaction blocks in {total} contours", blocks.len());
    blocks
}

pub fn draw_blocks(img: &mut RgbImage, blocks: &[TransactionBlock]) {
    let blue = Rgb([0, 0, 255]);

    for block in blocks {
        draw_hollow_rect_mut(img, block.get_rect(), blue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn page(cards: &[(u32, u32, u32, u32)]) -> GrayImage {
        let mut gray = GrayImage::from_pixel(400, 600, Luma([230]));
        for &(x, y, w, h) in cards {
            for py in y..y + h {
                for px in x..x + w {
                    gray.put_pixel(px, py, Luma([255]));
                }
            }
            // dark text inside the card
            for py in y + 10..y + 20 {
                for px in x + 10..x + 60 {
                    gray.put_pixel(px, py, Luma([20]));
                }
            }
        }
        gray
    }

    #[test]
    fn cards_are_found_top_to_bottom() {
        let gray = page(&[(20, 300, 300, 100), (20, 50, 300, 100), (30, 450, 200, 100)]);
        let config = DetectConfig {
            min_block_area: 15_000.0,
            ..DetectConfig::default()
        };

        let blocks = find_blocks(&block_mask(&gray, &config), &config);

        let positions = blocks.iter().map(|b| (b.x, b.y, b.w, b.h)).collect_vec();
        assert_eq!(
            positions,
            vec![(20, 50, 300, 100), (20, 300, 300, 100), (30, 450, 200, 100)]
        );
        assert_eq!(blocks[0].area, 299.0 * 99.0);
    }

    #[test]
    fn small_contours_are_filtered() {
        let gray = page(&[(20, 50, 300, 100), (20, 300, 100, 50)]);
        let config = DetectConfig {
            min_block_area: 15_000.0,
            ..DetectConfig::default()
        };

        let blocks = find_blocks(&block_mask(&gray, &config), &config);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].y, 50);
    }

    #[test]
    fn text_holes_do_not_shrink_the_area() {
        let gray = page(&[(0, 0, 400, 200)]);
        let config = DetectConfig::default();

        let blocks = find_blocks(&block_mask(&gray, &config), &config);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].area, 399.0 * 199.0);
    }

    #[test]
    fn blank_page_has_no_blocks() {
        let gray = GrayImage::from_pixel(100, 100, Luma([200]));
        let config = DetectConfig::default();

        assert!(find_blocks(&block_mask(&gray, &config), &config).is_empty());
    }
}
