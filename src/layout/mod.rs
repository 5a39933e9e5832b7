use std::collections::HashMap;

use image::{GrayImage, Rgb, RgbImage};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{FieldSpec, LayoutConfig, MaskSource};
use crate::detect::TransactionBlock;
use crate::error::PipelineWarning;
use crate::imaging::{threshold_binary, threshold_binary_inv};
use crate::scan::{Direction, count_ink, draw_scan, scan};

/// Crop rectangle handed to OCR for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FieldBox {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl FieldBox {
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// The part of the box inside a `width` x `height` image, as `(x, y, w, h)`.
    pub fn clip(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let left = i64::from(self.x).max(0);
        let top = i64::from(self.y).max(0);
        let right = (i64::from(self.x) + i64::from(self.w)).min(i64::from(width));
        let bottom = (i64::from(self.y) + i64::from(self.h)).min(i64::from(height));
        if right <= left || bottom <= top {
            return None;
        }
        Some((
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

/// Field boxes of one transaction block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockLayout {
    pub index: usize,
    pub block: TransactionBlock,
    /// Only set when a date header is expected above the block.
    pub date: Option<FieldBox>,
    pub name: FieldBox,
    pub category: FieldBox,
    pub price: FieldBox,
    pub tag: Option<FieldBox>,
    pub tag_ink: usize,
}

/// Gray image plus every thresholded variant the layout scans on.
pub struct MaskSet {
    gray: GrayImage,
    masks: HashMap<MaskSource, GrayImage>,
}

impl MaskSet {
    pub fn new(gray: GrayImage, sources: &[MaskSource]) -> Self {
        let masks = sources
            .iter()
            .filter_map(|&source| {
                let mask = match source {
                    MaskSource::Gray => return None,
                    MaskSource::Binary(t) => threshold_binary(&gray, t),
                    MaskSource::BinaryInv(t) => threshold_binary_inv(&gray, t),
                };
                Some((source, mask))
            })
            .collect();

        Self { gray, masks }
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn get(&self, source: MaskSource) -> &GrayImage {
        match source {
            MaskSource::Gray => &self.gray,
            other => self.masks.get(&other).unwrap_or(&self.gray),
        }
    }
}

/// Scan run for one field, kept so it can be drawn later.
#[derive(Debug, Clone, Copy)]
struct FieldScan {
    start_x: i32,
    start_y: i32,
    spec: FieldSpec,
    length: u32,
}

impl FieldScan {
    fn field_box(&self) -> FieldBox {
        let x = match self.spec.direction {
            Direction::Rightward => self.start_x,
            Direction::Leftward => self.start_x - self.length as i32,
        };
        FieldBox {
            x,
            y: self.start_y,
            w: self.length,
            h: self.spec.height,
        }
    }
}

pub struct FieldLocator<'a> {
    config: &'a LayoutConfig,
    masks: &'a MaskSet,
}

impl<'a> FieldLocator<'a> {
    pub fn new(config: &'a LayoutConfig, masks: &'a MaskSet) -> Self {
        Self { config, masks }
    }

    fn run(&self, spec: FieldSpec, anchor: (i32, i32), shift: (i32, i32)) -> FieldScan {
        let (anchor_x, anchor_y) = anchor;
        let (shift_x, shift_y) = shift;
        let start_x = anchor_x + spec.dx + shift_x;
        let start_y = anchor_y + spec.dy + shift_y;
        let length = scan(
            self.masks.get(spec.source),
            start_x,
            start_y,
            spec.height,
            spec.direction,
            spec.stop_run,
        );
        FieldScan {
            start_x,
            start_y,
            spec,
            length,
        }
    }

    /// Date header above the first card, at an absolute position.
    pub fn locate_first_date(&self) -> Option<FieldBox> {
        let first = self.run(self.config.first_date, (0, 0), (0, 0));
        (first.length > 0).then(|| first.field_box())
    }

    /// Locates every field of every block. Blocks must be sorted by `y`.
    pub fn locate(
        &self,
        blocks: &[TransactionBlock],
    ) -> (Vec<BlockLayout>, Vec<PipelineWarning>) {
        let mut previous_y = 0;
        let mut warnings = vec![];

        let layouts = blocks
            .iter()
            .enumerate()
            .map(|(index, block)| {
                let layout = self.locate_block(index, block, previous_y, &mut warnings);
                previous_y = block.y;
                layout
            })
            .collect();

        (layouts, warnings)
    }

    fn locate_block(
        &self,
        index: usize,
        block: &TransactionBlock,
        previous_y: i32,
        warnings: &mut Vec<PipelineWarning>,
    ) -> BlockLayout {
        let config = self.config;
        let (x, y) = (block.x, block.y);

        let date = (y - previous_y > block.h as i32 + config.date_gap)
            .then(|| self.run(config.date, (x, y), (0, 0)).field_box());

        // A tag pill under the name pushes the category right and the name up.
        let tag_scan = self.run(config.tag, (x, y), (0, 0));
        let tag_box = tag_scan.field_box();
        let tag_ink = count_ink(
            self.masks.get(config.tag.source),
            tag_box.x,
            tag_box.y,
            tag_box.w,
            tag_box.h,
        );
        let tag = (tag_ink > config.tag_ink_threshold).then_some(tag_box);
        let (name_lift, category_shift) = match tag {
            Some(tag) => (config.tag_name_lift, tag.w as i32 + config.tag_margin),
            None => (0, 0),
        };

        // Ink right of the price means a currency glyph collides with it.
        let probe = self.run(config.price_probe, (x, y), (0, 0));
        let probe_ink = count_ink(
            self.masks.get(config.price_probe.source),
            probe.start_x,
            probe.start_y,
            probe.length,
            config.price_probe.height,
        );
        let price_shift = if probe_ink > config.price_probe_ink_threshold {
            probe.length as i32 + config.price_margin
        } else {
            0
        };

        let price = self.run(config.price, (x, y), (-price_shift, 0)).field_box();
        let name = self.run(config.name, (x, y), (0, -name_lift)).field_box();
        let category = self.run(config.category, (x, y), (category_shift, 0)).field_box();

        for (field, field_box) in [("name", &name), ("category", &category), ("price", &price)] {
            if field_box.is_empty() {
                let warning = PipelineWarning::ambiguity(index, field);
                debug!("{warning}");
                warnings.push(warning);
            }
        }

        debug!(
            "block {index} at ({x}, {y}): tag ink {tag_ink}, probe ink {probe_ink}, price {price:?}"
        );

        BlockLayout {
            index,
            block: *block,
            date,
            name,
            category,
            price,
            tag,
            tag_ink,
        }
    }
}

/// Draws a field box as its scan would, with the trailing-run inset.
pub fn draw_field(img: &mut RgbImage, field: &FieldBox, direction: Direction) {
    let red = Rgb([255, 0, 0]);
    let start_x = match direction {
        Direction::Rightward => field.x,
        Direction::Leftward => field.x + field.w as i32,
    };
    draw_scan(img, start_x, field.y, field.h, direction, field.w, red);
}

pub fn draw_layouts(
    img: &mut RgbImage,
    first_date: Option<&FieldBox>,
    layouts: &[BlockLayout],
    config: &LayoutConfig,
) {
    if let Some(first_date) = first_date {
        draw_field(img, first_date, config.first_date.direction);
    }
    for layout in layouts {
        if let Some(date) = &layout.date {
            draw_field(img, date, config.date.direction);
        }
        if let Some(tag) = &layout.tag {
            draw_field(img, tag, config.tag.direction);
        }
        draw_field(img, &layout.name, config.name.direction);
        draw_field(img, &layout.category, config.category.direction);
        draw_field(img, &layout.price, config.price.direction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::to_gray;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const BACKGROUND: Rgb<u8> = Rgb([240, 240, 240]);
    const TEXT: Rgb<u8> = Rgb([30, 30, 30]);

    fn fill(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
        for py in y..(y + h).min(img.height()) {
            for px in x..(x + w).min(img.width()) {
                img.put_pixel(px, py, color);
            }
        }
    }

    fn block(x: i32, y: i32) -> TransactionBlock {
        TransactionBlock {
            x,
            y,
            w: 760,
            h: 120,
            area: 90_000.0,
        }
    }

    fn card_page(cards: &[i32]) -> RgbImage {
        let mut img = RgbImage::from_pixel(800, 1000, BACKGROUND);
        for &y in cards {
            fill(&mut img, 20, y as u32, 760, 120, WHITE);
        }
        img
    }

    fn locate(img: &RgbImage, blocks: &[TransactionBlock]) -> Vec<BlockLayout> {
        let config = LayoutConfig::default();
        let masks = MaskSet::new(to_gray(img), &config.mask_sources());
        FieldLocator::new(&config, &masks).locate(blocks).0
    }

    #[test]
    fn plain_card_fields() {
        let mut img = card_page(&[100]);
        // name text 150px wide at x + 98
        fill(&mut img, 118, 125, 150, 20, TEXT);
        // category text 80px wide at x + 98
        fill(&mut img, 118, 165, 80, 20, TEXT);
        // price text ending at x + 720
        fill(&mut img, 700, 140, 40, 25, TEXT);

        let layout = &locate(&img, &[block(20, 100)])[0];

        assert_eq!(layout.name, FieldBox { x: 118, y: 120, w: 162, h: 35 });
        assert_eq!(layout.category, FieldBox { x: 118, y: 159, w: 92, h: 35 });
        assert_eq!(layout.price, FieldBox { x: 745 - 58, y: 135, w: 58, h: 40 });
        // category text reaches into the tag probe but stays below the threshold
        assert_eq!(layout.tag, None);
        assert_eq!(layout.tag_ink, 76 * 20);
    }

    #[test]
    fn tag_shifts_name_and_category() {
        let mut img = card_page(&[100]);
        // dark tag pill 120px wide at x + 102, y + 56
        fill(&mut img, 122, 156, 120, 38, TEXT);

        let layout = &locate(&img, &[block(20, 100)])[0];

        let tag = layout.tag.unwrap();
        assert_eq!(tag, FieldBox { x: 122, y: 156, w: 123, h: 38 });
        assert_eq!(layout.tag_ink, 120 * 38);
        assert_eq!(layout.name.y, 115);
        assert_eq!(layout.category.x, 118 + 123 + 3);
    }

    #[test]
    fn small_tag_probe_is_ignored() {
        let mut img = card_page(&[100]);
        fill(&mut img, 122, 156, 20, 10, TEXT);

        let layout = &locate(&img, &[block(20, 100)])[0];

        assert_eq!(layout.tag, None);
        assert_eq!(layout.tag_ink, 200);
        assert_eq!(layout.name.y, 120);
    }

    #[test]
    fn currency_glyph_widens_price_leftward() {
        let mut img = card_page(&[100]);
        // glyph straddling the probe column x + 733
        fill(&mut img, 745, 135, 20, 40, TEXT);
        fill(&mut img, 690, 140, 40, 25, TEXT);

        let layout = &locate(&img, &[block(20, 100)])[0];

        // probe: 9 ink columns then 3 blank ones, so the price moves 12 + 3 left
        let shifted_start = 745 - (12 + 3);
        assert_eq!(layout.price.x + layout.price.w as i32, shifted_start);
    }

    #[test]
    fn date_only_between_distant_blocks() {
        let img = card_page(&[200, 340, 600]);
        let blocks = [block(20, 200), block(20, 340), block(20, 600)];

        let layouts = locate(&img, &blocks);

        assert!(layouts[0].date.is_some());
        assert!(layouts[1].date.is_none());
        assert!(layouts[2].date.is_some());
        assert_eq!(layouts[2].date.unwrap().y, 567);
    }

    #[test]
    fn first_date_outside_image_is_none() {
        let img = card_page(&[100]);
        let config = LayoutConfig::default();
        let masks = MaskSet::new(to_gray(&img), &config.mask_sources());

        assert_eq!(FieldLocator::new(&config, &masks).locate_first_date(), None);
    }

    #[test]
    fn first_date_on_inverted_mask() {
        let mut img = RgbImage::from_pixel(1600, 200, Rgb([90, 40, 160]));
        fill(&mut img, 1350, 12, 60, 18, WHITE);
        let config = LayoutConfig::default();
        let masks = MaskSet::new(to_gray(&img), &config.mask_sources());

        let date = FieldLocator::new(&config, &masks).locate_first_date().unwrap();

        assert_eq!(date, FieldBox { x: 1350, y: 9, w: 72, h: 26 });
    }

    #[test]
    fn first_date_is_drawn_with_the_blocks() {
        let mut img = RgbImage::from_pixel(1600, 300, BACKGROUND);
        let config = LayoutConfig::default();
        let first_date = FieldBox { x: 1350, y: 9, w: 72, h: 26 };

        draw_layouts(&mut img, Some(&first_date), &[], &config);

        let red = Rgb([255, 0, 0]);
        assert_eq!(*img.get_pixel(1350, 9), red);
        assert_eq!(*img.get_pixel(1350 + 72 - 4, 35), red);
        assert_eq!(*img.get_pixel(1380, 20), BACKGROUND);
    }

    #[test]
    fn empty_fields_are_reported() {
        // every field anchor lies right of the image
        let img = RgbImage::from_pixel(90, 100, BACKGROUND);
        let config = LayoutConfig::default();
        let masks = MaskSet::new(to_gray(&img), &config.mask_sources());

        let (layouts, warnings) = FieldLocator::new(&config, &masks).locate(&[block(0, 0)]);

        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].name.w, 0);
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn clip_keeps_boxes_inside_image() {
        let field = FieldBox { x: -5, y: 90, w: 20, h: 20 };

        assert_eq!(field.clip(100, 100), Some((0, 90, 15, 10)));
        assert_eq!(FieldBox { x: 100, y: 0, w: 5, h: 5 }.clip(100, 100), None);
        assert_eq!(FieldBox::default().clip(100, 100), None);
    }
}
