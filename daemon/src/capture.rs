/// Screen capture and on-screen template lookup.
///
/// The primary monitor is grabbed with `xcap`, converted to grayscale and searched with
/// [`find_template`].  Reference images are decoded once and cached until their
/// modification time changes, so replacing an image on disk takes effect on the next scan.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use image::{DynamicImage, GrayImage};
use tracing::debug;

use crate::matcher::{find_template, MatchError, MatchResult, ScreenMatcher};

/// A grayscale screen grab plus the desktop position of its top-left pixel.
pub struct Screenshot {
    pub origin: (i32, i32),
    pub image: GrayImage,
}

/// Captures the primary monitor (or the first monitor when none is flagged primary).
pub fn capture_primary() -> Result<Screenshot, MatchError> {
    let monitors = xcap::Monitor::all().map_err(|e| MatchError::Capture(e.to_string()))?;
    let primary = monitors
        .iter()
        .position(|m| m.is_primary().unwrap_or(false))
        .unwrap_or(0);
    let monitor = monitors
        .get(primary)
        .ok_or_else(|| MatchError::Capture("no monitors available".to_string()))?;

    let origin = (
        monitor.x().map_err(|e| MatchError::Capture(e.to_string()))?,
        monitor.y().map_err(|e| MatchError::Capture(e.to_string()))?,
    );
    let frame = monitor
        .capture_image()
        .map_err(|e| MatchError::Capture(e.to_string()))?;
    Ok(Screenshot {
        origin,
        image: DynamicImage::ImageRgba8(frame).into_luma8(),
    })
}

struct CachedTemplate {
    modified: Option<SystemTime>,
    image: Arc<GrayImage>,
}

/// [`ScreenMatcher`] backed by a live screen capture.
#[derive(Default)]
pub struct ScreenTemplateMatcher {
    templates: Mutex<HashMap<PathBuf, CachedTemplate>>,
}

impl ScreenTemplateMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the decoded template at `path`, decoding it again if the file changed.
    fn template(&self, path: &Path) -> Result<Arc<GrayImage>, MatchError> {
        let metadata =
            std::fs::metadata(path).map_err(|_| MatchError::ImageNotFound(path.to_path_buf()))?;
        let modified = metadata.modified().ok();

        let mut cache = self.templates.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(path) {
            if cached.modified == modified {
                return Ok(Arc::clone(&cached.image));
            }
        }

        let image = image::open(path)
            .map_err(|e| MatchError::ImageDecode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
            .into_luma8();
        debug!(
            "Loaded reference image {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        let image = Arc::new(image);
        cache.insert(
            path.to_path_buf(),
            CachedTemplate {
                modified,
                image: Arc::clone(&image),
            },
        );
        Ok(image)
    }
}

impl ScreenMatcher for ScreenTemplateMatcher {
    fn locate(&self, template: &Path, confidence: f32) -> MatchResult {
        let template = match self.template(template) {
            Ok(t) => t,
            Err(e) => return MatchResult::TransientError(e),
        };
        let screenshot = match capture_primary() {
            Ok(s) => s,
            Err(e) => return MatchResult::TransientError(e),
        };
        match find_template(&screenshot.image, &template, confidence) {
            Some(found) => {
                debug!(score = found.score, "Template matched");
                let (dx, dy) = screenshot.origin;
                MatchResult::Found(found.region.offset(dx, dy))
            }
            None => MatchResult::NotFound,
        }
    }
}
