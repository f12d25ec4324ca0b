//! Tint colour, placeholder bitmap and the vibrancy overlay.

use image::{Rgba, RgbaImage};

/// Translucent white, packed as `0xAARRGGBB`.
pub const TINT_COLOR: u32 = 0x45FF_FFFF;

/// The tint colour as an RGBA pixel.
pub fn tint_pixel() -> Rgba<u8> {
    argb_to_rgba(TINT_COLOR)
}

pub fn argb_to_rgba(argb: u32) -> Rgba<u8> {
    let [a, r, g, b] = argb.to_be_bytes();
    Rgba([r, g, b, a])
}

/// A solid-tint bitmap shown while the blur is computed.
pub fn create_placeholder(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, tint_pixel())
}

/// Composite `color` over `wallpaper` with a lighten blend.
///
/// Premultiplied lighten: `Sc + Dc − min(Sc·Da, Dc·Sa)` for colour and
/// `Sa + Da − Sa·Da` for alpha.
pub fn apply_vibrancy(wallpaper: &RgbaImage, color: Rgba<u8>) -> RgbaImage {
    let sa = f32::from(color[3]) / 255.0;
    let src: [f32; 3] = std::array::from_fn(|i| f32::from(color[i]) / 255.0 * sa);

    let mut out = wallpaper.clone();
    for pixel in out.pixels_mut() {
        let da = f32::from(pixel[3]) / 255.0;
        let out_a = sa + da - sa * da;
        for (i, sc) in src.iter().copied().enumerate() {
            let dc = f32::from(pixel[i]) / 255.0 * da;
            let blended = sc + dc - (sc * da).min(dc * sa);
            let straight = if out_a > 0.0 { blended / out_a } else { 0.0 };
            pixel[i] = to_channel(straight);
        }
        pixel[3] = to_channel(out_a);
    }
    out
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
