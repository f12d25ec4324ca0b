//! Downsample, blur, upscale.
//!
//! Blurring a full-screen bitmap at a large radius is too slow to redo on
//! every wallpaper change, so the image is shrunk by `downsample_factor`
//! (no filtering), blurred at the small size, and scaled back up with
//! bilinear filtering. The final upscale is where edge antialiasing is lost.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::trace;

use crate::config::DEFAULT_DOWNSAMPLE_FACTOR;
use crate::error::Result;

/// Smallest radius a kernel accepts.
pub const MIN_BLUR_RADIUS: u32 = 1;

/// Largest radius a kernel accepts.
pub const MAX_BLUR_RADIUS: u32 = 25;

/// A blur primitive operating on an already-downsampled image.
///
/// Implementations must return an image with the input's dimensions.
/// `radius` is already clamped to `MIN_BLUR_RADIUS..=MAX_BLUR_RADIUS`.
pub trait BlurKernel: Send + Sync {
    fn blur(&self, image: &RgbaImage, radius: u32) -> Result<RgbaImage>;
}

/// CPU Gaussian blur from the `image` crate.
///
/// Radius maps to sigma as `0.4·r + 0.6`, the same curve mobile blur
/// intrinsics use, so a given radius looks comparable.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianKernel;

impl GaussianKernel {
    #[allow(clippy::cast_precision_loss)]
    pub fn sigma(radius: u32) -> f32 {
        radius as f32 * 0.4 + 0.6
    }
}

impl BlurKernel for GaussianKernel {
    fn blur(&self, image: &RgbaImage, radius: u32) -> Result<RgbaImage> {
        Ok(imageops::blur(image, Self::sigma(radius)))
    }
}

/// Derive the kernel radius from a full-resolution radius preference.
#[allow(clippy::cast_possible_truncation)]
pub fn radius_from_pref(pref: f32, downsample_factor: u32) -> u32 {
    let factor = downsample_factor.max(1);
    // Saturating float cast: NaN becomes 0, negatives 0, huge values u32::MAX.
    let radius = pref as u32 / factor;
    radius.clamp(MIN_BLUR_RADIUS, MAX_BLUR_RADIUS)
}

#[derive(Clone)]
pub struct BlurEngine {
    /// Shrink factor applied before the kernel runs; at least 1.
    downsample_factor: u32,
    kernel: Arc<dyn BlurKernel>,
}

impl BlurEngine {
    pub fn new(downsample_factor: u32, kernel: Arc<dyn BlurKernel>) -> Self {
        Self {
            downsample_factor: downsample_factor.max(1),
            kernel,
        }
    }

    pub fn downsample_factor(&self) -> u32 {
        self.downsample_factor
    }

    /// Blur `image` and return a bitmap of the same size.
    pub fn blur(&self, image: &RgbaImage, radius: u32) -> Result<RgbaImage> {
        let (width, height) = image.dimensions();
        let small_width = (width / self.downsample_factor).max(1);
        let small_height = (height / self.downsample_factor).max(1);

        trace!(
            width,
            height,
            small_width,
            small_height,
            radius,
            "Blurring wallpaper"
        );

        let small = imageops::resize(image, small_width, small_height, FilterType::Nearest);
        let blurred = self.kernel.blur(&small, radius)?;

        Ok(imageops::resize(&blurred, width, height, FilterType::Triangle))
    }
}

impl Default for BlurEngine {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNSAMPLE_FACTOR, Arc::new(GaussianKernel))
    }
}

impl std::fmt::Debug for BlurEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlurEngine")
            .field("downsample_factor", &self.downsample_factor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlurError;
    use image::Rgba;
    use parking_lot::Mutex;

    /// Records the sizes and radii it was called with.
    #[derive(Default)]
    struct RecordingKernel {
        calls: Mutex<Vec<((u32, u32), u32)>>,
    }

    impl BlurKernel for RecordingKernel {
        fn blur(&self, image: &RgbaImage, radius: u32) -> Result<RgbaImage> {
            self.calls.lock().push((image.dimensions(), radius));
            Ok(image.clone())
        }
    }

    struct FailingKernel;

    impl BlurKernel for FailingKernel {
        fn blur(&self, _image: &RgbaImage, _radius: u32) -> Result<RgbaImage> {
            Err(BlurError::Kernel("no accelerator".into()))
        }
    }

    #[test]
    fn test_radius_from_pref_default() {
        // 75 / 8 = 9
        assert_eq!(radius_from_pref(75.0, 8), 9);
    }

    #[test]
    fn test_radius_from_pref_always_in_range() {
        for pref in [-10.0, 0.0, 0.5, 7.9, 8.0, 75.0, 199.0, 200.0, 1e9, f32::NAN] {
            for factor in [0, 1, 2, 8, 16] {
                let r = radius_from_pref(pref, factor);
                assert!(
                    (MIN_BLUR_RADIUS..=MAX_BLUR_RADIUS).contains(&r),
                    "pref {pref} factor {factor} gave {r}"
                );
            }
        }
        assert_eq!(radius_from_pref(1000.0, 8), MAX_BLUR_RADIUS);
        assert_eq!(radius_from_pref(3.0, 8), MIN_BLUR_RADIUS);
    }

    #[test]
    fn test_blur_downsamples_before_kernel() {
        let kernel = Arc::new(RecordingKernel::default());
        let engine = BlurEngine::new(8, kernel.clone());
        let image = RgbaImage::from_pixel(200, 150, Rgba([10, 20, 30, 255]));

        let out = engine.blur(&image, 9).unwrap();

        assert_eq!(out.dimensions(), (200, 150));
        assert_eq!(*kernel.calls.lock(), vec![((25, 18), 9)]);
    }

    #[test]
    fn test_blur_tiny_image_keeps_one_pixel() {
        let kernel = Arc::new(RecordingKernel::default());
        let engine = BlurEngine::new(8, kernel.clone());
        let out = engine
            .blur(&RgbaImage::from_pixel(3, 5, Rgba([0, 0, 0, 255])), 1)
            .unwrap();
        assert_eq!(out.dimensions(), (3, 5));
        assert_eq!(kernel.calls.lock()[0].0, (1, 1));
    }

    #[test]
    fn test_gaussian_blur_preserves_size_and_flat_color() {
        let engine = BlurEngine::default();
        let image = RgbaImage::from_pixel(64, 48, Rgba([100, 150, 200, 255]));
        let out = engine.blur(&image, 9).unwrap();
        assert_eq!(out.dimensions(), (64, 48));

        let p = out.get_pixel(32, 24);
        for (channel, expected) in [100u8, 150, 200, 255].iter().enumerate() {
            assert!((i16::from(p[channel]) - i16::from(*expected)).abs() <= 2);
        }
    }

    #[test]
    fn test_gaussian_blur_smooths_edges() {
        let engine = BlurEngine::new(1, Arc::new(GaussianKernel));
        let mut image = RgbaImage::from_pixel(40, 1, Rgba([0, 0, 0, 255]));
        for x in 20..40 {
            image.put_pixel(x, 0, Rgba([255, 255, 255, 255]));
        }
        let out = engine.blur(&image, 5).unwrap();
        let edge = out.get_pixel(20, 0)[0];
        assert!(edge > 0 && edge < 255);
    }

    #[test]
    fn test_kernel_failure_propagates() {
        let engine = BlurEngine::new(8, Arc::new(FailingKernel));
        let err = engine.blur(&RgbaImage::new(16, 16), 4).unwrap_err();
        assert!(matches!(err, BlurError::Kernel(_)));
    }

    #[test]
    fn test_zero_factor_is_clamped() {
        assert_eq!(BlurEngine::new(0, Arc::new(GaussianKernel)).downsample_factor(), 1);
    }
}
