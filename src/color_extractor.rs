use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use log::{debug, warn};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

/// Longest side, in pixels, an image is reduced to before sampling.
pub const SAMPLE_MAX_SIDE: u32 = 120;
/// Share of rows, counted from the bottom edge, that feed the average.
pub const BOTTOM_BAND_FRACTION: f64 = 0.35;
/// How far each channel is pulled toward the color's own luminance.
pub const DESATURATION: f64 = 0.14;
/// Luminance is capped here before the final darkening step.
pub const LUMINANCE_CEILING: f64 = 0.15;
/// How far the capped color is pulled toward black.
pub const DARKEN_AMOUNT: f64 = 0.48;
/// Channel multiplier for the far end of the gradient.
pub const GRADIENT_END_FACTOR: f64 = 0.55;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };

    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn from_f32_triple([r, g, b]: [f32; 3]) -> Self {
        Self::new(r as f64, g as f64, b as f64)
    }

    pub fn to_f32_triple(&self) -> [f32; 3] {
        [self.r as f32, self.g as f32, self.b as f32]
    }

    pub fn to_css(&self) -> String {
        let [r, g, b] = self.to_bytes();
        format!("rgb({}, {}, {})", r, g, b)
    }

    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.to_bytes();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    fn to_bytes(&self) -> [u8; 3] {
        let q = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }

    /// Perceptual brightness with ITU-R BT.601 weights.
    pub fn luminance(&self) -> f64 {
        0.299 * self.r + 0.587 * self.g + 0.114 * self.b
    }

    /// Multiply every channel by `factor`.
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            r: self.r * factor,
            g: self.g * factor,
            b: self.b * factor,
        }
    }

    /// Blend toward black by `amount` (0.0 keeps the color, 1.0 is black).
    pub fn darken(&self, amount: f64) -> Self {
        self.scale(1.0 - amount)
    }

    /// Blend each channel toward the color's luminance by `amount`.
    /// Luminance is preserved since the weights sum to one.
    pub fn desaturate(&self, amount: f64) -> Self {
        let l = self.luminance();
        let mix = |c: f64| c * (1.0 - amount) + l * amount;
        Self {
            r: mix(self.r),
            g: mix(self.g),
            b: mix(self.b),
        }
    }

    /// Scale the color down uniformly so its luminance does not exceed `ceiling`.
    pub fn cap_luminance(&self, ceiling: f64) -> Self {
        let l = self.luminance();
        if l > ceiling {
            self.scale(ceiling / l)
        } else {
            *self
        }
    }
}

/// A background pair: `base` sits next to the photo, `gradient_end` at the far edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientColors {
    pub base: Rgb,
    pub gradient_end: Rgb,
}

impl GradientColors {
    pub fn from_base(base: Rgb) -> Self {
        Self {
            base,
            gradient_end: base.scale(GRADIENT_END_FACTOR),
        }
    }

    /// Dark gray used when a photo yields no colors.
    pub fn neutral() -> Self {
        Self::from_base(Rgb::new(0.11, 0.11, 0.12))
    }
}

pub struct ColorExtractor;

impl ColorExtractor {
    pub fn derive_from_file<P: AsRef<Path>>(path: P) -> Option<GradientColors> {
        let path = path.as_ref();
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                warn!("cannot decode {} for color extraction: {}", path.display(), e);
                return None;
            }
        };
        Self::derive_colors(&img)
    }

    /// Derive colors from a raw RGBA8 buffer. A buffer shorter than
    /// `width * height * 4` bytes yields `None`.
    pub fn derive_from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Option<GradientColors> {
        if width == 0 || height == 0 {
            return None;
        }
        let buffer = RgbaImage::from_raw(width, height, pixels)?;
        Self::derive_from_buffer(&buffer)
    }

    /// Derive an accessible background pair from the bottom band of `img`.
    pub fn derive_colors(img: &DynamicImage) -> Option<GradientColors> {
        let (w, h) = (img.width(), img.height());
        if w == 0 || h == 0 {
            return None;
        }
        // Only the capped bitmap is ever converted to RGBA8.
        let (nw, nh) = sample_dimensions(w, h);
        let sampled = if (nw, nh) == (w, h) {
            img.to_rgba8()
        } else {
            imageops::resize(img, nw, nh, FilterType::Nearest)
        };
        Self::derive_from_buffer(&sampled)
    }

    /// Run `derive_from_file` on a worker thread. The receiver yields exactly one value.
    pub fn derive_in_background(path: PathBuf) -> mpsc::Receiver<Option<GradientColors>> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(Self::derive_from_file(&path));
        });
        rx
    }

    /// Desaturate, cap and darken a mean color into a background pair.
    pub fn accessible_pair(mean: Rgb) -> GradientColors {
        let capped = mean
            .desaturate(DESATURATION)
            .cap_luminance(LUMINANCE_CEILING);
        GradientColors::from_base(capped.darken(DARKEN_AMOUNT))
    }

    fn derive_from_buffer(buffer: &RgbaImage) -> Option<GradientColors> {
        let sampled = downscale(buffer)?;
        let mean = bottom_band_mean(&sampled)?;
        let colors = Self::accessible_pair(mean);
        debug!(
            "sampled {}x{}, mean {}, base {}",
            sampled.width(),
            sampled.height(),
            mean.to_hex(),
            colors.base.to_hex()
        );
        Some(colors)
    }
}

/// Size that fits inside `SAMPLE_MAX_SIDE` with the same aspect ratio. Never upscales.
fn sample_dimensions(width: u32, height: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= SAMPLE_MAX_SIDE {
        return (width, height);
    }
    let ratio = SAMPLE_MAX_SIDE as f64 / longest as f64;
    let fit = |side: u32| ((side as f64 * ratio).round() as u32).clamp(1, SAMPLE_MAX_SIDE);
    (fit(width), fit(height))
}

fn downscale(buffer: &RgbaImage) -> Option<Cow<'_, RgbaImage>> {
    let (w, h) = buffer.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let (nw, nh) = sample_dimensions(w, h);
    if (nw, nh) == (w, h) {
        return Some(Cow::Borrowed(buffer));
    }
    Some(Cow::Owned(imageops::resize(buffer, nw, nh, FilterType::Nearest)))
}

/// Mean color of the bottom `BOTTOM_BAND_FRACTION` of rows, at least one row.
fn bottom_band_mean(img: &RgbaImage) -> Option<Rgb> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let band_rows = ((h as f64 * BOTTOM_BAND_FRACTION).round() as u32).clamp(1, h);

    let mut r_total = 0u64;
    let mut g_total = 0u64;
    let mut b_total = 0u64;
    let mut count = 0u64;

    for y in (h - band_rows)..h {
        for x in 0..w {
            let rgba = img.get_pixel(x, y).0;
            r_total += rgba[0] as u64;
            g_total += rgba[1] as u64;
            b_total += rgba[2] as u64;
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }

    let avg = |total: u64| total as f64 / count as f64 / 255.0;
    Some(Rgb::new(avg(r_total), avg(g_total), avg(b_total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn solid(w: u32, h: u32, px: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, image::Rgb(px)))
    }

    /// `top` fills the first `top_rows` rows, `bottom` the rest.
    fn two_tone(w: u32, h: u32, top_rows: u32, top: [u8; 3], bottom: [u8; 3]) -> DynamicImage {
        let img = RgbImage::from_fn(w, h, |_, y| {
            if y < top_rows {
                image::Rgb(top)
            } else {
                image::Rgb(bottom)
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    fn assert_close(actual: Rgb, expected: Rgb, tol: f64) {
        assert!(
            (actual.r - expected.r).abs() < tol
                && (actual.g - expected.g).abs() < tol
                && (actual.b - expected.b).abs() < tol,
            "{:?} != {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn solid_red_follows_derivation() {
        let colors = ColorExtractor::derive_colors(&solid(10, 10, [255, 0, 0])).unwrap();
        // Values follow the stated constants: desaturating toward luminance
        // keeps it at 0.299, so (0.90186, 0.04186, 0.04186) is capped by
        // 0.15 / 0.299, then darkened by 0.52.
        assert_close(colors.base, Rgb::new(0.235268, 0.010920, 0.010920), 1e-4);
        assert_close(colors.gradient_end, Rgb::new(0.129397, 0.006006, 0.006006), 1e-4);
    }

    #[test]
    fn black_image_stays_black() {
        let colors = ColorExtractor::derive_colors(&solid(32, 16, [0, 0, 0])).unwrap();
        assert_eq!(colors.base, Rgb::BLACK);
        assert_eq!(colors.gradient_end, Rgb::BLACK);
    }

    #[test]
    fn dim_color_is_not_scaled_up() {
        // luminance well under the ceiling, only desaturation and darkening apply
        let colors = ColorExtractor::derive_colors(&solid(4, 4, [51, 51, 51])).unwrap();
        assert_close(colors.base, Rgb::new(0.2 * 0.52, 0.2 * 0.52, 0.2 * 0.52), 1e-9);
    }

    #[test]
    fn zero_area_images_yield_nothing() {
        assert!(ColorExtractor::derive_colors(&DynamicImage::new_rgb8(0, 10)).is_none());
        assert!(ColorExtractor::derive_colors(&DynamicImage::new_rgb8(10, 0)).is_none());
        assert!(ColorExtractor::derive_from_rgba8(0, 0, Vec::new()).is_none());
    }

    #[test]
    fn short_buffer_is_unreadable() {
        assert!(ColorExtractor::derive_from_rgba8(4, 4, vec![255; 10]).is_none());
        assert!(ColorExtractor::derive_from_rgba8(2, 2, vec![255; 16]).is_some());
    }

    #[test]
    fn only_bottom_band_is_sampled() {
        let img = two_tone(100, 100, 65, [0, 0, 255], [255, 0, 0]);
        let from_two_tone = ColorExtractor::derive_colors(&img).unwrap();
        let from_red = ColorExtractor::derive_colors(&solid(100, 100, [255, 0, 0])).unwrap();
        assert_eq!(from_two_tone, from_red);
    }

    #[test]
    fn bottom_band_survives_downscale() {
        // top 65% blue, bottom 35% red, sampled at 60x120
        let img = two_tone(200, 400, 260, [0, 0, 255], [255, 0, 0]);
        let from_two_tone = ColorExtractor::derive_colors(&img).unwrap();
        let from_red = ColorExtractor::derive_colors(&solid(200, 400, [255, 0, 0])).unwrap();
        assert_close(from_two_tone.base, from_red.base, 1e-9);
    }

    #[test]
    fn large_rgb_image_is_resized_before_conversion() {
        let rgb = RgbImage::from_fn(640, 400, |x, y| {
            image::Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 256) as u8])
        });
        let img = DynamicImage::ImageRgb8(rgb);
        let (w, h) = (img.width(), img.height());

        let from_image = ColorExtractor::derive_colors(&img).unwrap();
        let from_buffer =
            ColorExtractor::derive_from_rgba8(w, h, img.to_rgba8().into_raw()).unwrap();
        assert_eq!(from_image, from_buffer);
    }

    #[test]
    fn output_is_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(300, 180, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        }));
        let first = ColorExtractor::derive_colors(&img).unwrap();
        for _ in 0..3 {
            assert_eq!(ColorExtractor::derive_colors(&img).unwrap(), first);
        }
    }

    #[test]
    fn channels_stay_in_range_and_under_ceiling() {
        let samples = [
            [255, 255, 255],
            [255, 0, 0],
            [0, 255, 0],
            [0, 0, 255],
            [255, 255, 0],
            [12, 200, 130],
            [1, 1, 1],
        ];
        for px in samples {
            let colors = ColorExtractor::derive_colors(&solid(7, 5, px)).unwrap();
            for c in [colors.base, colors.gradient_end] {
                for ch in [c.r, c.g, c.b] {
                    assert!((0.0..=1.0).contains(&ch), "{:?} out of range for {:?}", c, px);
                }
            }
            let before_darkening = colors.base.scale(1.0 / (1.0 - DARKEN_AMOUNT));
            assert!(before_darkening.luminance() <= LUMINANCE_CEILING + 1e-9);
        }
    }

    #[test]
    fn gradient_end_is_scaled_base() {
        let colors = ColorExtractor::derive_colors(&solid(9, 9, [40, 180, 220])).unwrap();
        assert_eq!(colors.gradient_end.r, colors.base.r * GRADIENT_END_FACTOR);
        assert_eq!(colors.gradient_end.g, colors.base.g * GRADIENT_END_FACTOR);
        assert_eq!(colors.gradient_end.b, colors.base.b * GRADIENT_END_FACTOR);
    }

    #[test]
    fn sample_dimensions_keep_aspect() {
        assert_eq!(sample_dimensions(100, 50), (100, 50));
        assert_eq!(sample_dimensions(1200, 600), (120, 60));
        assert_eq!(sample_dimensions(600, 1200), (60, 120));
        assert_eq!(sample_dimensions(10_000, 10), (120, 1));
    }

    #[test]
    fn desaturate_preserves_luminance() {
        let c = Rgb::new(0.9, 0.2, 0.4);
        assert!((c.desaturate(DESATURATION).luminance() - c.luminance()).abs() < 1e-12);
    }

    #[test]
    fn hex_and_css_rendering() {
        let c = Rgb::new(1.0, 0.5, 0.0);
        assert_eq!(c.to_hex(), "#ff8000");
        assert_eq!(c.to_css(), "rgb(255, 128, 0)");
    }

    #[test]
    fn background_derivation_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        solid(20, 20, [255, 0, 0]).save(&path).unwrap();

        let rx = ColorExtractor::derive_in_background(path.clone());
        let colors = rx.recv().unwrap().unwrap();
        assert_eq!(Some(colors), ColorExtractor::derive_from_file(&path));

        let missing = ColorExtractor::derive_in_background(dir.path().join("nope.png"));
        assert!(missing.recv().unwrap().is_none());
    }
}
