pub mod blur;
pub mod config;
pub mod error;
pub mod image_loader;
pub mod platform;

pub use error::{BlurError, Result};
