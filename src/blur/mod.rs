//! Blurred wallpaper for translucent launcher surfaces.
//!
//! This module provides:
//! - `BlurWallpaperProvider` - Publishes the placeholder and blurred wallpaper to listeners
//! - `BlurEngine` - Downsample, blur, upscale
//! - `UpdateWorker` - Background thread running the update pipeline
//! - `BlurDrawable` - Paints the wallpaper behind a surface with parallax

pub mod drawable;
pub mod engine;
pub mod fitter;
pub mod listeners;
pub mod offset;
pub mod pipeline;
pub mod provider;
pub mod tint;
pub mod worker;

pub use drawable::BlurDrawable;
pub use engine::{BlurEngine, BlurKernel, GaussianKernel};
pub use listeners::{Subscription, WallpaperListener};
pub use provider::{BlurWallpaperProvider, ProviderBuilder};
