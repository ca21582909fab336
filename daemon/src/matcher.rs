/// Template-match outcomes and scoring.
///
/// A reference image is located in a grayscale screen capture by zero-mean normalized
/// cross-correlation over a sampled grid of template pixels.  A cheap coarse pass over a
/// handful of samples rejects most candidate positions before the full score is computed.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::GrayImage;

/// Upper bound on the number of template pixels compared per candidate position.
const MAX_SAMPLES: usize = 400;
/// Number of samples in the coarse rejection pass.
const COARSE_SAMPLES: usize = 24;
/// Coarse scores this far below the threshold skip the full comparison.
const COARSE_SLACK: f64 = 0.25;
/// Scores at or above this are treated as exact and end the search early.
const EXACT_SCORE: f32 = 0.999;
const EPSILON: f64 = 1e-6;

/// Axis-aligned screen rectangle in absolute desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Center point, rounded toward the top-left on odd sizes.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

/// Why a scan could not produce a verdict.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MatchError {
    #[error("reference image not found: {}", .0.display())]
    ImageNotFound(PathBuf),
    #[error("failed to decode reference image {}: {message}", .path.display())]
    ImageDecode { path: PathBuf, message: String },
    #[error("screen capture failed: {0}")]
    Capture(String),
    #[error("matcher worker failed: {0}")]
    Worker(String),
}

/// Outcome of one template-match attempt. `NotFound` is the normal steady state.
#[derive(Debug, Clone)]
pub enum MatchResult {
    Found(Region),
    NotFound,
    TransientError(MatchError),
}

/// Locates a reference image on screen.
///
/// Implementations are synchronous and bounded; callers treat one call as an atomic step.
pub trait ScreenMatcher: Send + Sync {
    fn locate(&self, template: &Path, confidence: f32) -> MatchResult;
}

/// Runs one `locate` on the blocking pool.  Capture and search never occupy an async
/// worker, and a task aborted while waiting here never resumes past the lookup.
pub async fn locate_blocking(
    matcher: Arc<dyn ScreenMatcher>,
    template: PathBuf,
    confidence: f32,
) -> MatchResult {
    match tokio::task::spawn_blocking(move || matcher.locate(&template, confidence)).await {
        Ok(result) => result,
        Err(e) => MatchResult::TransientError(MatchError::Worker(e.to_string())),
    }
}

/// Best position of a template inside a screen image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    /// Top-left corner relative to the searched image.
    pub region: Region,
    pub score: f32,
}

/// The threshold is inclusive: a score equal to `confidence` is a match.
pub fn is_match(score: f32, confidence: f32) -> bool {
    score >= confidence
}

/// Searches `screen` for `template`, returning the highest-scoring position whose score
/// reaches `confidence`.
pub fn find_template(
    screen: &GrayImage,
    template: &GrayImage,
    confidence: f32,
) -> Option<TemplateMatch> {
    let (tw, th) = template.dimensions();
    let (sw, sh) = screen.dimensions();
    if tw == 0 || th == 0 || tw > sw || th > sh {
        return None;
    }

    let points = sample_grid(tw, th);
    let full = SampledTemplate::new(template, points.clone());
    let coarse_stride = (points.len() / COARSE_SAMPLES).max(1);
    let coarse = SampledTemplate::new(
        template,
        points.into_iter().step_by(coarse_stride).collect(),
    );
    let coarse_floor = f64::from(confidence) - COARSE_SLACK;

    let mut best: Option<TemplateMatch> = None;
    for oy in 0..=(sh - th) {
        for ox in 0..=(sw - tw) {
            if coarse.score(screen, ox, oy) < coarse_floor {
                continue;
            }
            let score = full.score(screen, ox, oy) as f32;
            if !is_match(score, confidence) {
                continue;
            }
            if best.map_or(true, |b| score > b.score) {
                best = Some(TemplateMatch {
                    region: Region::new(ox as i32, oy as i32, tw, th),
                    score,
                });
                if score >= EXACT_SCORE {
                    return best;
                }
            }
        }
    }
    best
}

/// Evenly spaced template coordinates, at most roughly [`MAX_SAMPLES`] of them.
fn sample_grid(width: u32, height: u32) -> Vec<(u32, u32)> {
    let area = (width as usize) * (height as usize);
    let step = ((area as f64 / MAX_SAMPLES as f64).sqrt().ceil() as usize).max(1);
    let mut points = Vec::new();
    for y in (0..height).step_by(step) {
        for x in (0..width).step_by(step) {
            points.push((x, y));
        }
    }
    points
}

/// Precomputed template samples for one scoring pass.
struct SampledTemplate {
    points: Vec<(u32, u32)>,
    values: Vec<f64>,
    centered: Vec<f64>,
    norm: f64,
}

impl SampledTemplate {
    fn new(template: &GrayImage, points: Vec<(u32, u32)>) -> Self {
        let values: Vec<f64> = points
            .iter()
            .map(|&(x, y)| f64::from(template.get_pixel(x, y)[0]))
            .collect();
        let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
        let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();
        let norm = centered.iter().map(|c| c * c).sum::<f64>().sqrt();
        Self {
            points,
            values,
            centered,
            norm,
        }
    }

    fn score(&self, screen: &GrayImage, ox: u32, oy: u32) -> f64 {
        if self.norm < EPSILON {
            return self.flat_score(screen, ox, oy);
        }
        let n = self.points.len() as f64;
        let (mut sum, mut sum_sq, mut dot) = (0.0, 0.0, 0.0);
        for (&(x, y), c) in self.points.iter().zip(&self.centered) {
            let s = f64::from(screen.get_pixel(ox + x, oy + y)[0]);
            sum += s;
            sum_sq += s * s;
            dot += c * s;
        }
        let variance = sum_sq - sum * sum / n;
        if variance < EPSILON {
            return 0.0;
        }
        dot / (self.norm * variance.sqrt())
    }

    /// Uniform templates carry no correlation signal; compare intensities directly.
    fn flat_score(&self, screen: &GrayImage, ox: u32, oy: u32) -> f64 {
        let total: f64 = self
            .points
            .iter()
            .zip(&self.values)
            .map(|(&(x, y), t)| (f64::from(screen.get_pixel(ox + x, oy + y)[0]) - t).abs())
            .sum();
        1.0 - total / (self.points.len().max(1) as f64 * 255.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{imageops, Luma};

    /// Deterministic textured image so that only the true position correlates.
    fn noise_image(width: u32, height: u32, seed: u32) -> GrayImage {
        let mut state = seed.wrapping_mul(2_654_435_761).max(1);
        GrayImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            Luma([(state >> 24) as u8])
        })
    }

    // ── Region ────────────────────────────────────────────────────────────────

    #[test]
    fn region_center_of_even_box() {
        assert_eq!(Region::new(100, 100, 50, 50).center(), (125, 125));
    }

    #[test]
    fn region_center_of_odd_box_rounds_down() {
        assert_eq!(Region::new(0, 10, 5, 3).center(), (2, 11));
    }

    #[test]
    fn region_offset_moves_origin_only() {
        let r = Region::new(10, 20, 30, 40).offset(-1920, 5);
        assert_eq!(r, Region::new(-1910, 25, 30, 40));
    }

    // ── is_match ──────────────────────────────────────────────────────────────

    #[test]
    fn threshold_is_inclusive() {
        assert!(is_match(0.7, 0.7));
        assert!(is_match(0.71, 0.7));
        assert!(!is_match(0.69, 0.7));
    }

    // ── find_template ─────────────────────────────────────────────────────────

    #[test]
    fn finds_cropped_patch_at_its_origin() {
        let screen = noise_image(200, 150, 7);
        let template = imageops::crop_imm(&screen, 57, 41, 30, 20).to_image();

        let found = find_template(&screen, &template, 0.9).expect("patch should be found");
        assert_eq!(found.region, Region::new(57, 41, 30, 20));
        assert!(found.score > 0.99);
    }

    #[test]
    fn unrelated_texture_is_not_found() {
        let screen = noise_image(160, 120, 3);
        let template = noise_image(24, 16, 99);
        assert!(find_template(&screen, &template, 0.9).is_none());
    }

    #[test]
    fn template_larger_than_screen_is_not_found() {
        let screen = noise_image(20, 20, 1);
        let template = noise_image(21, 5, 2);
        assert!(find_template(&screen, &template, 0.1).is_none());
    }

    #[test]
    fn empty_template_is_not_found() {
        let screen = noise_image(20, 20, 1);
        assert!(find_template(&screen, &GrayImage::new(0, 0), 0.5).is_none());
    }

    #[test]
    fn uniform_template_matches_uniform_block() {
        let mut screen = noise_image(120, 90, 11);
        for y in 30..45 {
            for x in 60..80 {
                screen.put_pixel(x, y, Luma([128]));
            }
        }
        let template = GrayImage::from_pixel(20, 15, Luma([128]));

        let found = find_template(&screen, &template, 0.95).expect("block should be found");
        assert_eq!(found.region, Region::new(60, 30, 20, 15));
    }

    #[test]
    fn brightness_shift_still_correlates() {
        let screen = noise_image(100, 80, 21);
        let mut template = imageops::crop_imm(&screen, 10, 12, 16, 16).to_image();
        for p in template.pixels_mut() {
            p[0] = p[0] / 2 + 40;
        }
        let found = find_template(&screen, &template, 0.9).expect("scaled patch should match");
        assert_eq!(found.region.x, 10);
        assert_eq!(found.region.y, 12);
    }

    // ── locate_blocking ───────────────────────────────────────────────────────

    struct CrashingMatcher;

    impl ScreenMatcher for CrashingMatcher {
        fn locate(&self, _template: &Path, _confidence: f32) -> MatchResult {
            panic!("capture backend crashed");
        }
    }

    struct FixedMatcher(Region);

    impl ScreenMatcher for FixedMatcher {
        fn locate(&self, _template: &Path, _confidence: f32) -> MatchResult {
            MatchResult::Found(self.0)
        }
    }

    #[tokio::test]
    async fn blocking_lookup_returns_matcher_verdict() {
        let region = Region::new(5, 6, 7, 8);
        let result =
            locate_blocking(Arc::new(FixedMatcher(region)), "accept.png".into(), 0.9).await;
        assert!(matches!(result, MatchResult::Found(r) if r == region));
    }

    #[tokio::test]
    async fn crashed_lookup_is_a_transient_error() {
        let result = locate_blocking(Arc::new(CrashingMatcher), "accept.png".into(), 0.9).await;
        assert!(matches!(
            result,
            MatchResult::TransientError(MatchError::Worker(_))
        ));
    }

    #[test]
    fn sample_grid_is_bounded() {
        let points = sample_grid(400, 300);
        assert!(points.len() <= MAX_SAMPLES * 2);
        assert!(points.iter().all(|&(x, y)| x < 400 && y < 300));
        assert_eq!(sample_grid(3, 2).len(), 6);
    }
}
