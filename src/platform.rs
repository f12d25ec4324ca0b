//! Host collaborators the wallpaper pipeline depends on.
//!
//! The pipeline never talks to the desktop directly. It asks a
//! `WallpaperSource` for the current image, a `DisplayMetrics` for the
//! viewport, and a `PreferenceStore` for the blur radius. All three are
//! queried from the update worker, so they must be `Send + Sync`.

use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::DEFAULT_BLUR_RADIUS_PREF;
use crate::error::{BlurError, Result};
use crate::image_loader;

/// Screen dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Supplies the current desktop wallpaper.
pub trait WallpaperSource: Send + Sync {
    fn current_wallpaper(&self) -> Result<DynamicImage>;

    /// Animated (live) wallpapers cannot be captured as a still image; the
    /// blur is disabled while one is active.
    fn is_live(&self) -> bool {
        false
    }
}

/// Supplies the current screen size.
pub trait DisplayMetrics: Send + Sync {
    fn screen_size(&self) -> Result<ScreenSize>;
}

/// Supplies the persisted blur radius preference.
pub trait PreferenceStore: Send + Sync {
    fn blur_radius_pref(&self) -> f32;
}

/// Wallpaper read from an image file on every request.
#[derive(Debug, Clone)]
pub struct FileWallpaperSource {
    path: PathBuf,
}

impl FileWallpaperSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl WallpaperSource for FileWallpaperSource {
    fn current_wallpaper(&self) -> Result<DynamicImage> {
        debug!(path = ?self.path, "Loading wallpaper");
        image_loader::open_wallpaper(&self.path)
    }
}

/// Wallpaper held in memory. The image can be swapped at runtime.
#[derive(Debug, Clone, Default)]
pub struct StaticWallpaper {
    image: Arc<RwLock<Option<DynamicImage>>>,
}

impl StaticWallpaper {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(RwLock::new(Some(image))),
        }
    }

    /// A source with no wallpaper set.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&self, image: Option<DynamicImage>) {
        *self.image.write() = image;
    }
}

impl WallpaperSource for StaticWallpaper {
    fn current_wallpaper(&self) -> Result<DynamicImage> {
        self.image
            .read()
            .clone()
            .ok_or_else(|| BlurError::Wallpaper("no wallpaper set".into()))
    }
}

/// Display with a fixed, known size.
#[derive(Debug, Clone, Copy)]
pub struct FixedDisplay(pub ScreenSize);

impl DisplayMetrics for FixedDisplay {
    fn screen_size(&self) -> Result<ScreenSize> {
        let ScreenSize { width, height } = self.0;
        if width == 0 || height == 0 {
            return Err(BlurError::Display(format!("invalid screen size {width}x{height}")));
        }
        Ok(self.0)
    }
}

/// Preference store holding a single radius value in memory.
#[derive(Debug)]
pub struct FixedPreference(RwLock<f32>);

impl FixedPreference {
    pub fn new(radius: f32) -> Self {
        Self(RwLock::new(radius))
    }

    pub fn set(&self, radius: f32) {
        *self.0.write() = radius;
    }
}

impl Default for FixedPreference {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_RADIUS_PREF)
    }
}

impl PreferenceStore for FixedPreference {
    fn blur_radius_pref(&self) -> f32 {
        *self.0.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn test_fixed_display_rejects_zero() {
        assert!(FixedDisplay(ScreenSize::new(0, 100)).screen_size().is_err());
        assert_eq!(
            FixedDisplay(ScreenSize::new(10, 20)).screen_size().unwrap(),
            ScreenSize::new(10, 20)
        );
    }

    #[test]
    fn test_static_wallpaper_swap() {
        let source = StaticWallpaper::empty();
        assert!(matches!(
            source.current_wallpaper(),
            Err(BlurError::Wallpaper(_))
        ));

        source.set(Some(DynamicImage::ImageRgba8(RgbaImage::new(3, 4))));
        let img = source.current_wallpaper().unwrap();
        assert_eq!((img.width(), img.height()), (3, 4));
        assert!(!source.is_live());
    }

    #[test]
    fn test_fixed_preference() {
        let pref = FixedPreference::default();
        assert_eq!(pref.blur_radius_pref(), 75.0);
        pref.set(12.5);
        assert_eq!(pref.blur_radius_pref(), 12.5);
    }
}
