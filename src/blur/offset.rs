/// Convert a normalized scroll fraction into a horizontal pixel offset.
///
/// A wallpaper no wider than the screen gets a fixed centering offset. A wider
/// one pans with the scroll position: centered at `0.5`, pinned to the left
/// edge at `0.0` and to the right edge at `1.0`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn wallpaper_offset(fraction: f32, screen_width: u32, wallpaper_width: u32) -> f32 {
    let available = i64::from(screen_width) - i64::from(wallpaper_width);
    let mut x_pixels = available / 2;

    if available < 0 {
        x_pixels += (available as f32 * (fraction - 0.5) + 0.5) as i64;
    }

    -(x_pixels as f32)
}
