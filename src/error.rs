use std::path::PathBuf;

/// Errors produced while building the blurred wallpaper.
#[derive(Debug, thiserror::Error)]
pub enum BlurError {
    #[error("no wallpaper available: {0}")]
    Wallpaper(String),

    #[error("failed to decode wallpaper {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image has zero size ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("display metrics unavailable: {0}")]
    Display(String),

    #[error("blur kernel failed: {0}")]
    Kernel(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("failed to spawn update worker")]
    Spawn(#[source] std::io::Error),

    #[error("wallpaper update panicked: {0}")]
    Panicked(String),

    #[error("update worker is no longer running")]
    WorkerGone,
}

pub type Result<T> = std::result::Result<T, BlurError>;
