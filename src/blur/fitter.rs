//! Fit a wallpaper to the screen.
//!
//! The wallpaper is upscaled uniformly until it covers the viewport in both
//! dimensions, then placed on a viewport-sized canvas. It is centered along
//! the axis that did not limit the scale; along the limiting axis it may
//! overflow and gets clipped by the canvas. Images that already cover the
//! screen are returned untouched, so this never downscales.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::debug;

use crate::error::{BlurError, Result};
use crate::platform::ScreenSize;

/// How a source image will be placed on the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPlan {
    /// Uniform upscale factor. Always greater than 1 when a plan exists.
    pub factor: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Top-left of the scaled image on the canvas. May be negative.
    pub x: i64,
    pub y: i64,
}

/// Compute the placement for a `src_width`×`src_height` image.
///
/// Returns `None` when the source already covers the viewport.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn plan(src_width: u32, src_height: u32, screen: ScreenSize) -> Option<FitPlan> {
    let ScreenSize { width, height } = screen;

    let width_factor = if width > src_width {
        width as f32 / src_width as f32
    } else {
        0.0
    };
    let height_factor = if height > src_height {
        height as f32 / src_height as f32
    } else {
        0.0
    };

    let factor = width_factor.max(height_factor);
    if factor <= 0.0 {
        return None;
    }

    let scaled_width = (src_width as f32 * factor) as u32;
    let scaled_height = (src_height as f32 * factor) as u32;

    let (x, y) = if width_factor > height_factor {
        (0, (i64::from(height) - i64::from(scaled_height)) / 2)
    } else {
        ((i64::from(width) - i64::from(scaled_width)) / 2, 0)
    };

    Some(FitPlan {
        factor,
        scaled_width,
        scaled_height,
        x,
        y,
    })
}

/// Upscale and center `image` so it exactly covers `screen`.
pub fn fit_to_screen(image: RgbaImage, screen: ScreenSize) -> Result<RgbaImage> {
    let (src_width, src_height) = image.dimensions();
    if src_width == 0 || src_height == 0 {
        return Err(BlurError::EmptyImage {
            width: src_width,
            height: src_height,
        });
    }

    let Some(plan) = plan(src_width, src_height, screen) else {
        debug!(src_width, src_height, "Wallpaper already covers the screen");
        return Ok(image);
    };

    debug!(
        src_width,
        src_height,
        factor = plan.factor,
        x = plan.x,
        y = plan.y,
        "Upscaling wallpaper to screen"
    );

    let scaled = imageops::resize(
        &image,
        plan.scaled_width,
        plan.scaled_height,
        FilterType::Nearest,
    );

    let mut canvas = RgbaImage::new(screen.width, screen.height);
    imageops::replace(&mut canvas, &scaled, plan.x, plan.y);
    Ok(canvas)
}
