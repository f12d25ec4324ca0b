//! One wallpaper update, from fetching the source image to the blurred result.
//!
//! The pipeline does not own any published state. It reports progress through
//! a callback so the same code can run inline on the owner thread or on the
//! update worker, whose events are forwarded over a channel.

use std::sync::Arc;

use image::RgbaImage;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::engine::{radius_from_pref, BlurEngine};
use super::{fitter, tint};
use crate::error::Result;
use crate::platform::{DisplayMetrics, PreferenceStore, ScreenSize, WallpaperSource};

/// Switches that may change while the provider is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Master switch; a live wallpaper overrides it.
    pub enabled: bool,
    /// Lighten with the tint before blurring.
    pub vibrancy: bool,
}

/// Progress of an update, in publication order.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// The wallpaper was fitted and a placeholder of the same size is ready.
    /// Any previously published wallpaper is stale from this point on.
    Placeholder {
        placeholder: Arc<RgbaImage>,
        /// Viewport the wallpaper was fitted to.
        screen: ScreenSize,
        /// Radius the kernel is about to use.
        blur_radius: u32,
    },
    /// The blurred wallpaper is ready.
    Wallpaper(Arc<RgbaImage>),
}

/// Everything an update needs. Shared between the provider and its worker.
pub struct UpdateContext {
    source: Arc<dyn WallpaperSource>,
    display: Arc<dyn DisplayMetrics>,
    /// Re-read at the start of every update.
    preferences: Arc<dyn PreferenceStore>,
    engine: BlurEngine,
    /// Toggled from the owner thread while the worker may be reading.
    options: RwLock<PipelineOptions>,
}

impl UpdateContext {
    pub fn new(
        source: Arc<dyn WallpaperSource>,
        display: Arc<dyn DisplayMetrics>,
        preferences: Arc<dyn PreferenceStore>,
        engine: BlurEngine,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            display,
            preferences,
            engine,
            options: RwLock::new(options),
        }
    }

    pub fn options(&self) -> PipelineOptions {
        *self.options.read()
    }

    pub fn set_options(&self, options: PipelineOptions) {
        *self.options.write() = options;
    }

    pub fn engine(&self) -> &BlurEngine {
        &self.engine
    }

    /// The feature is on and the current wallpaper can be captured.
    pub fn is_enabled(&self) -> bool {
        self.options.read().enabled && !self.source.is_live()
    }

    /// Current radius for the kernel, read from the preference store.
    pub fn blur_radius(&self) -> u32 {
        radius_from_pref(
            self.preferences.blur_radius_pref(),
            self.engine.downsample_factor(),
        )
    }

    /// Run one update, reporting each publication through `publish`.
    ///
    /// Returns `Ok(false)` without publishing anything when disabled. An error
    /// ends the update at the failing step; events already published stay.
    pub fn run(&self, mut publish: impl FnMut(UpdateEvent)) -> Result<bool> {
        if !self.is_enabled() {
            trace!("Wallpaper blur disabled, skipping update");
            return Ok(false);
        }
        let options = self.options();

        let blur_radius = self.blur_radius();
        let wallpaper = self.source.current_wallpaper()?.into_rgba8();
        let screen = self.display.screen_size()?;
        let fitted = fitter::fit_to_screen(wallpaper, screen)?;
        let (width, height) = fitted.dimensions();

        debug!(width, height, blur_radius, "Publishing placeholder");
        publish(UpdateEvent::Placeholder {
            placeholder: Arc::new(tint::create_placeholder(width, height)),
            screen,
            blur_radius,
        });

        let fitted = if options.vibrancy {
            tint::apply_vibrancy(&fitted, tint::tint_pixel())
        } else {
            fitted
        };

        let blurred = self.engine.blur(&fitted, blur_radius)?;
        debug!(width, height, "Publishing blurred wallpaper");
        publish(UpdateEvent::Wallpaper(Arc::new(blurred)));

        Ok(true)
    }
}
