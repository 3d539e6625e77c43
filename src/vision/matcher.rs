//! Template matching
//!
//! Locates named reference images in a frame using zero-mean normalized
//! cross-correlation. Large templates are searched coarse-to-fine first: a
//! full search on a downscaled frame, then an exact search around the coarse
//! peak. A refined peak below the threshold falls back to the exact search
//! over the whole frame, so fine texture lost by downscaling is still found.

use std::collections::HashMap;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image};

use super::VisionError;
use crate::config::Point;

/// Default acceptance threshold for a match
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Largest downscale factor used for the coarse search
const MAX_COARSE_FACTOR: u32 = 4;

/// Templates whose short side is below this many pixels per factor step are
/// searched at full resolution only
const COARSE_MIN_SIDE: u32 = 8;

/// Variance below which a window counts as flat
const FLAT_VARIANCE: f64 = 1e-6;

/// A located template
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// Center of the matched window
    pub x: i32,
    pub y: i32,
    /// Correlation at the best offset
    pub confidence: f32,
}

impl MatchResult {
    /// Center of the match as a tap target
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Whether a correlation score is accepted by a threshold (inclusive)
pub fn accepts(score: f32, threshold: f32) -> bool {
    score >= threshold
}

/// Zero-mean pixel values of a raster, ready for correlation
#[derive(Debug, Clone)]
struct Patch {
    width: u32,
    height: u32,
    values: Vec<f64>,
    mean: f64,
    energy: f64,
}

impl Patch {
    fn new(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let n = f64::from(width * height).max(1.0);
        let mean = image.pixels().map(|p| f64::from(p[0])).sum::<f64>() / n;
        let values: Vec<f64> = image.pixels().map(|p| f64::from(p[0]) - mean).collect();
        let energy = values.iter().map(|v| v * v).sum();

        Self {
            width,
            height,
            values,
            mean,
            energy,
        }
    }

    fn len(&self) -> f64 {
        f64::from(self.width * self.height)
    }
}

/// Integral images of a frame, for constant-time window sums
struct WindowSums {
    sum: Image<Luma<u64>>,
    squares: Image<Luma<u64>>,
}

impl WindowSums {
    fn new(frame: &GrayImage) -> Self {
        Self {
            sum: integral_image::<_, u64>(frame),
            squares: integral_squared_image::<_, u64>(frame),
        }
    }

    fn window(integral: &Image<Luma<u64>>, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let a = integral.get_pixel(x, y)[0];
        let b = integral.get_pixel(x + w, y)[0];
        let c = integral.get_pixel(x, y + h)[0];
        let d = integral.get_pixel(x + w, y + h)[0];
        ((d + a) - b - c) as f64
    }
}

/// Combine correlation terms into a score in [-1, 1].
///
/// Two flat rasters score 1.0 when they share their level; a flat raster
/// against a textured one scores 0.0.
fn normalized(numerator: f64, var_a: f64, var_b: f64, mean_a: f64, mean_b: f64) -> f32 {
    match (var_a <= FLAT_VARIANCE, var_b <= FLAT_VARIANCE) {
        (true, true) => {
            if (mean_a - mean_b).abs() < 0.5 {
                1.0
            } else {
                0.0
            }
        }
        (true, false) | (false, true) => 0.0,
        (false, false) => (numerator / (var_a * var_b).sqrt()).clamp(-1.0, 1.0) as f32,
    }
}

/// Correlation of the patch against the frame window at (x, y)
fn score_at(frame: &GrayImage, sums: &WindowSums, patch: &Patch, x: u32, y: u32) -> f32 {
    let n = patch.len();
    let (w, h) = (patch.width, patch.height);
    let s = WindowSums::window(&sums.sum, x, y, w, h);
    let s2 = WindowSums::window(&sums.squares, x, y, w, h);
    let variance = (s2 - s * s / n).max(0.0);

    let stride = frame.width() as usize;
    let raw = frame.as_raw();
    let mut numerator = 0.0;
    for j in 0..h as usize {
        let start = (y as usize + j) * stride + x as usize;
        let row = &raw[start..start + w as usize];
        let weights = &patch.values[j * w as usize..(j + 1) * w as usize];
        numerator += row
            .iter()
            .zip(weights)
            .map(|(&p, &t)| f64::from(p) * t)
            .sum::<f64>();
    }

    normalized(numerator, variance, patch.energy, s / n, patch.mean)
}

/// Best offset of the patch within the given ranges (inclusive bounds)
fn search(
    frame: &GrayImage,
    sums: &WindowSums,
    patch: &Patch,
    (x0, x1): (u32, u32),
    (y0, y1): (u32, u32),
) -> Option<(u32, u32, f32)> {
    let mut best: Option<(u32, u32, f32)> = None;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let score = score_at(frame, sums, patch, x, y);
            let better = match best {
                Some((_, _, b)) => score > b,
                None => true,
            };
            if better {
                best = Some((x, y, score));
            }
        }
    }
    best
}

/// Correlation between two same-sized rasters.
///
/// Rasters of different dimensions score 0.0.
pub fn correlation(a: &GrayImage, b: &GrayImage) -> f32 {
    if a.dimensions() != b.dimensions() || a.width() == 0 || a.height() == 0 {
        return 0.0;
    }

    let (mut sa, mut sb, mut saa, mut sbb, mut sab) = (0u64, 0u64, 0u64, 0u64, 0u64);
    for (&pa, &pb) in a.as_raw().iter().zip(b.as_raw()) {
        let (pa, pb) = (u64::from(pa), u64::from(pb));
        sa += pa;
        sb += pb;
        saa += pa * pa;
        sbb += pb * pb;
        sab += pa * pb;
    }

    let n = f64::from(a.width() * a.height());
    let (sa, sb) = (sa as f64, sb as f64);
    let var_a = (saa as f64 - sa * sa / n).max(0.0);
    let var_b = (sbb as f64 - sb * sb / n).max(0.0);
    let numerator = sab as f64 - sa * sb / n;

    normalized(numerator, var_a, var_b, sa / n, sb / n)
}

/// A named reference image with its acceptance threshold
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    threshold: f32,
    full: Patch,
    /// Downscale factor and downscaled patch for the coarse pass
    coarse: Option<(u32, Patch)>,
}

impl Template {
    /// Create a template from a raster
    pub fn new(name: impl Into<String>, image: &GrayImage, threshold: f32) -> Self {
        let (w, h) = image.dimensions();
        let factor = (w.min(h) / COARSE_MIN_SIDE).min(MAX_COARSE_FACTOR);
        let coarse = (factor >= 2).then(|| {
            let small = imageops::resize(image, w / factor, h / factor, FilterType::Triangle);
            (factor, Patch::new(&small))
        });

        Self {
            name: name.into(),
            threshold,
            full: Patch::new(image),
            coarse,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.full.width, self.full.height)
    }

    /// Best-scoring window in the frame, accepted or not.
    ///
    /// Returns the window center and its score, or `None` when the template
    /// does not fit in the frame. A coarse-to-fine peak is only trusted when
    /// it reaches the threshold; otherwise the whole frame is searched at
    /// full resolution.
    pub fn locate(&self, frame: &GrayImage) -> Option<MatchResult> {
        let (fw, fh) = frame.dimensions();
        let (tw, th) = self.dimensions();
        if tw == 0 || th == 0 || tw > fw || th > fh {
            return None;
        }
        let (max_x, max_y) = (fw - tw, fh - th);
        let sums = WindowSums::new(frame);

        if let Some((cx, cy, factor)) = self.coarse_peak(frame) {
            let xs = (cx.saturating_sub(factor), (cx + factor).min(max_x));
            let ys = (cy.saturating_sub(factor), (cy + factor).min(max_y));
            let refined = search(frame, &sums, &self.full, xs, ys)?;
            if accepts(refined.2, self.threshold) {
                return Some(self.centered(refined));
            }
            log::trace!(
                "Coarse peak of {} scored {:.3}, searching full frame",
                self.name,
                refined.2
            );
        }

        search(frame, &sums, &self.full, (0, max_x), (0, max_y)).map(|best| self.centered(best))
    }

    fn centered(&self, (x, y, confidence): (u32, u32, f32)) -> MatchResult {
        let (tw, th) = self.dimensions();
        MatchResult {
            x: (x + tw / 2) as i32,
            y: (y + th / 2) as i32,
            confidence,
        }
    }

    /// Peak of the downscaled search, mapped back to full-resolution offsets
    fn coarse_peak(&self, frame: &GrayImage) -> Option<(u32, u32, u32)> {
        let (factor, patch) = self.coarse.as_ref()?;
        let (fw, fh) = frame.dimensions();
        let (sw, sh) = (fw / factor, fh / factor);
        if patch.width > sw || patch.height > sh {
            return None;
        }

        let small = imageops::resize(frame, sw, sh, FilterType::Triangle);
        let sums = WindowSums::new(&small);
        let (x, y, _) = search(
            &small,
            &sums,
            patch,
            (0, sw - patch.width),
            (0, sh - patch.height),
        )?;

        Some((x * factor, y * factor, *factor))
    }
}

/// Named templates, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: HashMap<String, Template>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<dir>/<name>.png` for every name.
    ///
    /// Any missing or unreadable asset fails the whole load.
    pub fn load(dir: &Path, names: &[&str], threshold: f32) -> Result<Self, VisionError> {
        let mut library = Self::new();

        for &name in names {
            let path = dir.join(format!("{}.png", name));
            if !path.is_file() {
                return Err(VisionError::MissingTemplate {
                    name: name.to_string(),
                    path: path.display().to_string(),
                });
            }

            let image = image::open(&path)
                .map_err(|e| VisionError::InvalidTemplate {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?
                .to_luma8();
            if image.width() == 0 || image.height() == 0 {
                return Err(VisionError::InvalidTemplate {
                    name: name.to_string(),
                    reason: "empty image".to_string(),
                });
            }

            log::debug!("Loaded template {} ({}x{})", name, image.width(), image.height());
            library.insert(Template::new(name, &image, threshold));
        }

        Ok(library)
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Locates named templates in frames
#[derive(Debug, Clone)]
pub struct VisualMatcher {
    library: TemplateLibrary,
}

impl VisualMatcher {
    pub fn new(library: TemplateLibrary) -> Self {
        Self { library }
    }

    /// Find a template in a frame.
    ///
    /// Returns the center of the best window when its correlation reaches
    /// the template threshold.
    pub fn find(&self, frame: &GrayImage, name: &str) -> Option<MatchResult> {
        let Some(template) = self.library.get(name) else {
            log::error!("Template {} is not loaded", name);
            return None;
        };

        let best = template.locate(frame)?;
        log::trace!("Analyzing image {} - {:.3}", name, best.confidence);

        accepts(best.confidence, template.threshold).then_some(best)
    }

    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blocks, noise, paste};

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(accepts(0.7, DEFAULT_THRESHOLD));
        assert!(accepts(0.95, DEFAULT_THRESHOLD));
        assert!(!accepts(0.699_999, DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_finds_embedded_template() {
        let pattern = noise(12, 12, 2);
        let mut frame = noise(96, 128, 1);
        paste(&mut frame, &pattern, 30, 40);

        let mut library = TemplateLibrary::new();
        library.insert(Template::new("button", &pattern, DEFAULT_THRESHOLD));
        let matcher = VisualMatcher::new(library);

        let found = matcher.find(&frame, "button").unwrap();
        assert_eq!((found.x, found.y), (36, 46));
        assert!(found.confidence > 0.99);
    }

    #[test]
    fn test_absent_template_is_not_matched() {
        let pattern = noise(12, 12, 2);
        let frame = noise(96, 128, 1);

        let template = Template::new("button", &pattern, DEFAULT_THRESHOLD);
        let best = template.locate(&frame).unwrap();
        assert!(best.confidence < DEFAULT_THRESHOLD);

        let mut library = TemplateLibrary::new();
        library.insert(template);
        assert!(VisualMatcher::new(library).find(&frame, "button").is_none());
    }

    #[test]
    fn test_match_requires_score_at_threshold() {
        let pattern = noise(12, 12, 2);
        let mut frame = noise(96, 128, 1);
        paste(&mut frame, &pattern, 10, 10);

        let score = Template::new("t", &pattern, 0.0)
            .locate(&frame)
            .unwrap()
            .confidence;

        // A threshold equal to the achieved score still matches
        let mut library = TemplateLibrary::new();
        library.insert(Template::new("exact", &pattern, score));
        library.insert(Template::new("above", &pattern, score + 1e-3));
        let matcher = VisualMatcher::new(library);

        assert!(matcher.find(&frame, "exact").is_some());
        assert!(matcher.find(&frame, "above").is_none());
    }

    #[test]
    fn test_coarse_to_fine_search() {
        let pattern = blocks(48, 40, 4, 9);
        let mut frame = blocks(240, 200, 4, 3);
        paste(&mut frame, &pattern, 120, 56);

        let template = Template::new("banner", &pattern, DEFAULT_THRESHOLD);
        assert!(template.coarse.is_some());

        let found = template.locate(&frame).unwrap();
        assert_eq!((found.x, found.y), (120 + 24, 56 + 20));
        assert!(found.confidence > 0.99);
    }

    #[test]
    fn test_fine_texture_found_when_downscaling_blurs_it() {
        // 1-px checkerboard averages to flat grey at any downscale factor
        let checker = GrayImage::from_fn(32, 32, |x, y| {
            Luma([if (x + y) % 2 == 0 { 0 } else { 255 }])
        });
        let mut frame = noise(200, 200, 7);
        paste(&mut frame, &checker, 20, 30);
        paste(&mut frame, &GrayImage::from_pixel(32, 32, Luma([127])), 140, 164);

        let template = Template::new("stripes", &checker, DEFAULT_THRESHOLD);
        assert!(template.coarse.is_some());

        let mut library = TemplateLibrary::new();
        library.insert(template);
        let found = VisualMatcher::new(library).find(&frame, "stripes").unwrap();
        assert_eq!((found.x, found.y), (36, 46));
        assert!(found.confidence > 0.99);
    }

    #[test]
    fn test_template_larger_than_frame() {
        let template = Template::new("big", &noise(50, 50, 1), DEFAULT_THRESHOLD);
        assert!(template.locate(&noise(20, 20, 1)).is_none());
    }

    #[test]
    fn test_unknown_template_is_no_match() {
        let matcher = VisualMatcher::new(TemplateLibrary::new());
        assert!(matcher.find(&noise(20, 20, 1), "nothing").is_none());
    }

    #[test]
    fn test_correlation_of_frames() {
        let a = noise(40, 30, 5);
        assert!(correlation(&a, &a) > 0.999);
        assert!(correlation(&a, &noise(40, 30, 6)).abs() < 0.3);
        assert_eq!(correlation(&a, &noise(30, 40, 5)), 0.0);
    }

    #[test]
    fn test_flat_rasters() {
        let grey = GrayImage::from_pixel(10, 10, Luma([128]));
        let black = GrayImage::from_pixel(10, 10, Luma([0]));
        assert_eq!(correlation(&grey, &grey), 1.0);
        assert_eq!(correlation(&grey, &black), 0.0);
        assert_eq!(correlation(&grey, &noise(10, 10, 1)), 0.0);
    }

    #[test]
    fn test_missing_asset_is_fatal() {
        let dir = std::env::temp_dir().join("warden-missing-templates");
        let result = TemplateLibrary::load(&dir, &["is-in-battle"], DEFAULT_THRESHOLD);
        assert!(matches!(result, Err(VisionError::MissingTemplate { .. })));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = std::env::temp_dir().join(format!("warden-templates-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        noise(16, 16, 4).save(dir.join("close-battle-button.png")).unwrap();

        let library =
            TemplateLibrary::load(&dir, &["close-battle-button"], DEFAULT_THRESHOLD).unwrap();
        assert_eq!(library.len(), 1);
        assert_eq!(
            library.get("close-battle-button").unwrap().dimensions(),
            (16, 16)
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
