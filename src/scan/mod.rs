use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

/// Rightward scans treat anything darker than this as ink.
const DARK_INK_THRESHOLD: u8 = 100;

/// Columns of the trailing ink-free run excluded from drawn rectangles.
const DRAW_INSET: i32 = 4;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, Default,
)]
pub enum Direction {
    #[default]
    Rightward,
    Leftward,
}

impl Direction {
    fn step(self) -> i32 {
        match self {
            Direction::Rightward => 1,
            Direction::Leftward => -1,
        }
    }

    /// Rightward scans run on thresholded or gray masks and accept any dark
    /// pixel; leftward scans only count pure black.
    pub fn is_ink(self, value: u8) -> bool {
        match self {
            Direction::Rightward => value < DARK_INK_THRESHOLD,
            Direction::Leftward => value == 0,
        }
    }
}

/// Grows a window from `start_x` in `direction` while the vertical strip
/// `start_y..start_y + height` keeps showing ink. Stops after `stop_run`
/// consecutive ink-free columns or at the image border.
///
/// Returns the number of columns advanced, trailing ink-free run included.
pub fn scan(
    source: &GrayImage,
    start_x: i32,
    start_y: i32,
    height: u32,
    direction: Direction,
    stop_run: u32,
) -> u32 {
    let Some((top, bottom)) = clamp_rows(source, start_y, height) else {
        return 0;
    };

    let width = source.width() as i32;
    let mut length = 0_u32;
    let mut blank_run = 0_u32;

    while blank_run < stop_run {
        let x = start_x + direction.step() * length as i32;
        if x < 0 || x >= width {
            break;
        }

        let has_ink = (top..bottom).any(|y| direction.is_ink(source.get_pixel(x as u32, y)[0]));
        if has_ink {
            blank_run = 0;
        } else {
            blank_run += 1;
        }
        length += 1;
    }

    length
}

/// Counts pure black pixels inside the rectangle, clipped to the image.
pub fn count_ink(source: &GrayImage, x: i32, y: i32, width: u32, height: u32) -> usize {
    let Some((top, bottom)) = clamp_rows(source, y, height) else {
        return 0;
    };
    let left = x.max(0) as u32;
    let right = (x as i64 + width as i64).clamp(0, source.width() as i64) as u32;

    (top..bottom)
        .flat_map(|row| (left..right).map(move |col| (col, row)))
        .filter(|&(col, row)| source.get_pixel(col, row)[0] == 0)
        .count()
}

/// Draws the rectangle covered by a scan of `length` columns, minus the
/// trailing ink-free inset.
pub fn draw_scan(
    destination: &mut RgbImage,
    start_x: i32,
    start_y: i32,
    height: u32,
    direction: Direction,
    length: u32,
    color: Rgb<u8>,
) {
    let length = length as i32;
    let (x1, x2) = match direction {
        Direction::Rightward => (start_x, start_x + length - DRAW_INSET),
        Direction::Leftward => (start_x - length + DRAW_INSET, start_x),
    };
    if x2 <= x1 {
        return;
    }

    let rect = Rect::at(x1, start_y).of_size((x2 - x1 + 1) as u32, height + 1);
    draw_hollow_rect_mut(destination, rect, color);
}

fn clamp_rows(source: &GrayImage, start_y: i32, height: u32) -> Option<(u32, u32)> {
    let top = start_y.max(0) as i64;
    let bottom = (start_y as i64 + height as i64).min(source.height() as i64);
    if height == 0 || bottom <= top {
        return None;
    }
    Some((top as u32, bottom as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blank(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    fn with_ink(mut image: GrayImage, columns: std::ops::Range<u32>, value: u8) -> GrayImage {
        for x in columns {
            for y in 0..image.height() {
                image.put_pixel(x, y, Luma([value]));
            }
        }
        image
    }

    #[test]
    fn blank_strip_stops_after_exactly_stop_run_columns() {
        let image = blank(100, 20);

        assert_eq!(scan(&image, 10, 0, 20, Direction::Rightward, 12), 12);
        assert_eq!(scan(&image, 50, 0, 20, Direction::Leftward, 12), 12);
        assert_eq!(scan(&image, 10, 0, 20, Direction::Rightward, 1), 1);
    }

    #[test]
    fn ink_resets_the_blank_run() {
        let image = with_ink(blank(100, 20), 20..30, 0);

        // 10 ink columns starting at the anchor, then 12 blank ones.
        assert_eq!(scan(&image, 20, 0, 20, Direction::Rightward, 12), 22);
        // 10 blank, 10 ink, 12 blank going left from column 39.
        assert_eq!(scan(&image, 39, 0, 20, Direction::Leftward, 12), 32);
    }

    #[test]
    fn gap_shorter_than_stop_run_is_bridged() {
        let image = with_ink(with_ink(blank(100, 10), 10..15, 0), 20..25, 0);

        // 5 ink, 5 blank, 5 ink, 6 blank
        assert_eq!(scan(&image, 10, 0, 10, Direction::Rightward, 6), 21);
        // the 5 column gap ends a scan with a stop run of 5
        assert_eq!(scan(&image, 10, 0, 10, Direction::Rightward, 5), 10);
    }

    #[test]
    fn ink_predicates_differ_by_direction() {
        let image = with_ink(blank(60, 10), 20..30, 50);

        // gray 50 is ink for rightward scans only
        assert_eq!(scan(&image, 20, 0, 10, Direction::Rightward, 4), 14);
        assert_eq!(scan(&image, 29, 0, 10, Direction::Leftward, 4), 4);
    }

    #[test]
    fn scan_stops_at_image_border() {
        let image = blank(40, 10);

        assert_eq!(scan(&image, 39, 0, 10, Direction::Rightward, 12), 1);
        assert_eq!(scan(&image, 0, 0, 10, Direction::Leftward, 12), 1);

        let inked = with_ink(blank(40, 10), 0..40, 0);
        assert_eq!(scan(&inked, 35, 0, 10, Direction::Rightward, 12), 5);
        assert_eq!(scan(&inked, 3, 0, 10, Direction::Leftward, 12), 4);
    }

    #[test]
    fn malformed_inputs_degrade_to_zero() {
        let image = blank(40, 10);

        assert_eq!(scan(&image, 5, 0, 0, Direction::Rightward, 12), 0);
        assert_eq!(scan(&image, 40, 0, 10, Direction::Rightward, 12), 0);
        assert_eq!(scan(&image, -1, 0, 10, Direction::Leftward, 12), 0);
        assert_eq!(scan(&image, 5, 50, 10, Direction::Rightward, 12), 0);
    }

    #[test]
    fn strip_is_clipped_to_image_rows() {
        let mut image = blank(40, 10);
        image.put_pixel(5, 9, Luma([0]));

        // strip reaching below the image still sees the ink in the last row
        assert_eq!(scan(&image, 5, 8, 30, Direction::Rightward, 2), 3);
    }

    #[test]
    fn count_ink_clips_to_bounds() {
        let image = with_ink(blank(20, 10), 0..5, 0);

        assert_eq!(count_ink(&image, 0, 0, 5, 10), 50);
        assert_eq!(count_ink(&image, -10, -10, 100, 100), 50);
        assert_eq!(count_ink(&image, 5, 0, 10, 10), 0);
        assert_eq!(count_ink(&image, 30, 0, 10, 10), 0);
    }

    #[test]
    fn draw_scan_uses_inset() {
        let mut canvas = RgbImage::from_pixel(50, 20, Rgb([255, 255, 255]));
        let red = Rgb([255, 0, 0]);

        draw_scan(&mut canvas, 10, 2, 5, Direction::Rightward, 14, red);

        assert_eq!(canvas.get_pixel(10, 2), &red);
        assert_eq!(canvas.get_pixel(20, 7), &red);
        assert_eq!(canvas.get_pixel(21, 2), &Rgb([255, 255, 255]));

        let mut canvas = RgbImage::from_pixel(50, 20, Rgb([255, 255, 255]));
        draw_scan(&mut canvas, 10, 2, 5, Direction::Leftward, 3, red);
        assert!(canvas.pixels().all(|p| p == &Rgb([255, 255, 255])));
    }
}
