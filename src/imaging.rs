use image::{GrayImage, ImageBuffer, Luma, RgbImage, imageops};

/// Converts to 8-bit gray with the BT.601 weights the layout thresholds were
/// tuned against.
pub fn to_gray(raw: &RgbImage) -> GrayImage {
    ImageBuffer::from_fn(raw.width(), raw.height(), |x, y| {
        let [r, g, b] = raw.get_pixel(x, y).0;
        let gray = f32::from(r) * 0.299 + f32::from(g) * 0.587 + f32::from(b) * 0.114;
        Luma([gray.round().clamp(0.0, 255.0) as u8])
    })
}

/// pixel > threshold -> 255, else 0
pub fn threshold_binary(gray: &GrayImage, threshold: u8) -> GrayImage {
    map_luma(gray, |v| if v > threshold { 255 } else { 0 })
}

/// pixel > threshold -> 0, else 255
pub fn threshold_binary_inv(gray: &GrayImage, threshold: u8) -> GrayImage {
    map_luma(gray, |v| if v > threshold { 0 } else { 255 })
}

fn map_luma(gray: &GrayImage, f: impl Fn(u8) -> u8) -> GrayImage {
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([f(gray.get_pixel(x, y)[0])])
    })
}

/// Crops equally from both sides down to `width`.
pub fn center_crop_width(image: &RgbImage, width: u32) -> RgbImage {
    if image.width() <= width {
        return image.clone();
    }
    let offset = (image.width() - width) / 2;
    imageops::crop_imm(image, offset, 0, width, image.height()).to_image()
}

/// Crops rows `start..` of the image.
pub fn crop_rows_from(image: &RgbImage, start: u32) -> RgbImage {
    let start = start.min(image.height());
    imageops::crop_imm(image, 0, start, image.width(), image.height() - start).to_image()
}

/// Crops the bottom `rows` rows.
pub fn bottom_rows(image: &RgbImage, rows: u32) -> RgbImage {
    let rows = rows.min(image.height());
    crop_rows_from(image, image.height() - rows)
}

/// Stacks `bottom` below `top`. Both images must have the same width.
pub fn vconcat(top: &RgbImage, bottom: &RgbImage) -> RgbImage {
    let mut combined = RgbImage::new(top.width(), top.height() + bottom.height());
    imageops::replace(&mut combined, top, 0, 0);
    imageops::replace(&mut combined, bottom, 0, i64::from(top.height()));
    combined
}
