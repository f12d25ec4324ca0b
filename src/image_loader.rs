use std::io::Cursor;
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use image::{DynamicImage, ImageFormat};

use crate::error::{BlurError, Result};

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| BlurError::Wallpaper(format!("{}: {e}", path.display())))
}

fn decode_error(path: &Path, source: image::ImageError) -> BlurError {
    BlurError::Decode {
        path: path.to_path_buf(),
        source,
    }
}

/// Decode a wallpaper file. Animated GIFs contribute their first frame.
pub fn open_wallpaper(path: &Path) -> Result<DynamicImage> {
    let bytes = read_bytes(path)?;
    let format = image::guess_format(&bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(|e| decode_error(path, e))?;
        let mut frames = decoder.into_frames();
        return match frames.next() {
            Some(frame) => {
                let frame = frame.map_err(|e| decode_error(path, e))?;
                Ok(DynamicImage::ImageRgba8(frame.into_buffer()))
            }
            None => Err(BlurError::Wallpaper(format!(
                "GIF has no frames: {}",
                path.display()
            ))),
        };
    }

    let decoded = match format {
        Some(fmt) => image::load_from_memory_with_format(&bytes, fmt),
        None => image::load_from_memory(&bytes),
    };
    decoded.map_err(|e| decode_error(path, e))
}
