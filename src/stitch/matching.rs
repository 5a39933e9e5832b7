use image::GrayImage;
use serde::Serialize;

/// Best placement of a template inside a search image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult {
    pub row: u32,
    pub col: u32,
    /// Zero-mean normalized cross-correlation in `[-1, 1]`.
    pub score: f32,
}

/// Summed-area tables of pixel values and their squares.
struct Integral {
    width: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let width = image.width() as usize + 1;
        let height = image.height() as usize + 1;
        let mut sum = vec![0.0; width * height];
        let mut sq_sum = vec![0.0; width * height];

        for y in 1..height {
            let mut row_sum = 0.0;
            let mut row_sq_sum = 0.0;
            for x in 1..width {
                let v = f64::from(image.get_pixel(x as u32 - 1, y as u32 - 1)[0]);
                row_sum += v;
                row_sq_sum += v * v;
                sum[y * width + x] = sum[(y - 1) * width + x] + row_sum;
                sq_sum[y * width + x] = sq_sum[(y - 1) * width + x] + row_sq_sum;
            }
        }

        Self { width, sum, sq_sum }
    }

    fn window(&self, table: &[f64], x: usize, y: usize, w: usize, h: usize) -> f64 {
        let at = |x: usize, y: usize| table[y * self.width + x];
        at(x + w, y + h) - at(x, y + h) - at(x + w, y) + at(x, y)
    }
}

/// Slides `template` over `image` and returns the placement with the highest
/// zero-mean normalized cross-correlation. The first maximum in row-major
/// order wins. `None` when the template does not fit.
pub fn match_template(image: &GrayImage, template: &GrayImage) -> Option<MatchResult> {
    let (iw, ih) = (image.width() as usize, image.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    let n = (tw * th) as f64;
    let t_mean = template.as_raw().iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let centered: Vec<f64> = template
        .as_raw()
        .iter()
        .map(|&v| f64::from(v) - t_mean)
        .collect();
    let t_norm: f64 = centered.iter().map(|v| v * v).sum();

    let integral = Integral::new(image);
    let pixels = image.as_raw();
    let mut best: Option<MatchResult> = None;

    for row in 0..=(ih - th) {
        for col in 0..=(iw - tw) {
            let sum = integral.window(&integral.sum, col, row, tw, th);
            let sq_sum = integral.window(&integral.sq_sum, col, row, tw, th);
            let variance = (sq_sum - sum * sum / n).max(0.0);

            // The template is zero-mean, so the window mean drops out.
            let mut cross = 0.0;
            for ty in 0..th {
                let image_row = &pixels[(row + ty) * iw + col..(row + ty) * iw + col + tw];
                let template_row = &centered[ty * tw..(ty + 1) * tw];
                cross += image_row
                    .iter()
                    .zip(template_row)
                    .map(|(&p, &t)| f64::from(p) * t)
                    .sum::<f64>();
            }

            let denominator = (t_norm * variance).sqrt();
            let score = if denominator > f64::EPSILON {
                (cross / denominator).clamp(-1.0, 1.0) as f32
            } else {
                0.0
            };

            if best.is_none_or(|b| score > b.score) {
                best = Some(MatchResult {
                    row: row as u32,
                    col: col as u32,
                    score,
                });
            }
        }
    }

    best
}
