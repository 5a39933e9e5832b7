use image::RgbImage;

use crate::config::TrimConfig;
use crate::imaging::crop_rows_from;

/// Population standard deviation over every channel value of one row.
fn row_std(image: &RgbImage, y: u32) -> f64 {
    let stride = image.width() as usize * 3;
    let start = y as usize * stride;
    let row = &image.as_raw()[start..start + stride];
    if row.is_empty() {
        return 0.0;
    }

    let n = row.len() as f64;
    let mean = row.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = row
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt()
}

/// First row in the search window that is flat while the row below it is
/// busy. Content starts right after it.
pub fn find_top_border(image: &RgbImage, config: &TrimConfig) -> Option<u32> {
    let end = config.search_end.min(image.height());

    (config.search_start..end)
        .take_while(|&y| y + 1 < image.height())
        .find(|&y| {
            let std = row_std(image, y);
            std < config.flatness_threshold
                && row_std(image, y + 1) > std + config.contrast_margin
        })
}

/// Removes a flat chrome band at the top. Returns the image unchanged when no
/// border is found.
pub fn trim_top_border(image: RgbImage, config: &TrimConfig) -> (RgbImage, Option<u32>) {
    match find_top_border(&image, config) {
        Some(y) => (crop_rows_from(&image, y + 1), Some(y)),
        None => (image, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn noisy(x: u32, y: u32) -> Rgb<u8> {
        let h = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)).wrapping_mul(97);
        let v = (h >> 8) as u8;
        Rgb([v, v.wrapping_add(85), v.wrapping_add(170)])
    }

    fn banded(band_rows: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(50, height, |x, y| {
            if y < band_rows {
                Rgb([240, 240, 240])
            } else {
                noisy(x, y)
            }
        })
    }

    #[test]
    fn flat_band_is_removed() {
        let image = banded(40, 200);

        let (trimmed, border) = trim_top_border(image.clone(), &TrimConfig::default());

        assert_eq!(border, Some(39));
        assert_eq!(trimmed.height(), 160);
        assert_eq!(trimmed.get_pixel(7, 0), image.get_pixel(7, 40));
    }

    #[test]
    fn band_ending_before_search_start_is_ignored() {
        let image = banded(5, 200);

        let (trimmed, border) = trim_top_border(image.clone(), &TrimConfig::default());

        assert_eq!(border, None);
        assert_eq!(trimmed, image);
    }

    #[test]
    fn band_ending_after_search_window_is_ignored() {
        let image = banded(320, 400);

        assert_eq!(find_top_border(&image, &TrimConfig::default()), None);
    }

    #[test]
    fn trimming_is_idempotent() {
        let config = TrimConfig::default();
        let (once, _) = trim_top_border(banded(40, 200), &config);

        let (twice, border) = trim_top_border(once.clone(), &config);

        assert_eq!(border, None);
        assert_eq!(twice, once);
    }

    #[test]
    fn tiny_images_are_left_alone() {
        let image = RgbImage::from_pixel(4, 3, Rgb([0, 0, 0]));

        let (trimmed, border) = trim_top_border(image.clone(), &TrimConfig::default());

        assert_eq!(border, None);
        assert_eq!(trimmed, image);
        assert_eq!(
            trim_top_border(RgbImage::new(0, 0), &TrimConfig::default()).1,
            None
        );
    }
}
