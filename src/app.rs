use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use image::RgbaImage;
use tracing::{debug, info, warn};

use wallblur::blur::{BlurWallpaperProvider, WallpaperListener};
use wallblur::config::SettingsStore;
use wallblur::platform::{
    FileWallpaperSource, FixedDisplay, FixedPreference, PreferenceStore, ScreenSize,
};

/// Render a blurred, screen-sized copy of a wallpaper.
#[derive(Debug, Parser)]
#[command(name = "wallblur", version)]
pub struct Args {
    /// Wallpaper image to blur.
    pub wallpaper: PathBuf,

    /// Screen width in pixels.
    #[arg(long)]
    pub width: u32,

    /// Screen height in pixels.
    #[arg(long)]
    pub height: u32,

    /// Where to write the blurred wallpaper.
    #[arg(short, long, default_value = "wallpaper-blurred.png")]
    pub output: PathBuf,

    /// Also write the tint placeholder.
    #[arg(long)]
    pub placeholder_output: Option<PathBuf>,

    /// Also write what a full-screen surface shows at `--offset`.
    #[arg(long)]
    pub view_output: Option<PathBuf>,

    /// Scroll fraction (0.0 - 1.0) used for `--view-output`.
    #[arg(long, default_value_t = 0.5)]
    pub offset: f32,

    /// Settings file (defaults to the user config directory).
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Blur radius preference, overriding the settings file.
    #[arg(long)]
    pub radius: Option<f32>,

    /// Downsample factor, overriding the settings file.
    #[arg(long)]
    pub downsample: Option<u32>,

    /// Lighten the wallpaper with the tint before blurring.
    #[arg(long)]
    pub vibrancy: bool,

    /// Run even if the blur is disabled in settings.
    #[arg(long)]
    pub force: bool,

    /// Give up waiting for the blur after this many seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

/// Logs provider events.
struct EventLog {
    wallpaper_changes: usize,
}

impl WallpaperListener for EventLog {
    fn on_wallpaper_changed(&mut self) {
        self.wallpaper_changes += 1;
        debug!(count = self.wallpaper_changes, "Wallpaper changed");
    }

    fn on_offset_changed(&mut self, offset: f32) {
        debug!(offset, "Offset changed");
    }
}

pub struct WallblurApp {
    args: Args,
}

impl WallblurApp {
    pub fn new(args: Args) -> Self {
        Self { args }
    }

    pub fn run(&self) -> Result<i32> {
        let args = &self.args;

        let store = match &args.settings {
            Some(path) => SettingsStore::new(path.clone()),
            None => SettingsStore::open_default()?,
        };
        let mut settings = store.load();
        settings.vibrancy |= args.vibrancy;
        if let Some(factor) = args.downsample {
            settings.downsample_factor = factor;
        }
        if args.force {
            settings.enabled = true;
        }
        debug!(path = ?store.path(), ?settings, "Loaded settings");

        let preferences: Arc<dyn PreferenceStore> = match args.radius {
            Some(radius) => Arc::new(FixedPreference::new(radius)),
            None => Arc::new(store),
        };

        let mut provider = BlurWallpaperProvider::builder(
            Arc::new(FileWallpaperSource::new(args.wallpaper.clone())),
            Arc::new(FixedDisplay(ScreenSize::new(args.width, args.height))),
        )
        .preferences(preferences)
        .settings(&settings)
        .build()
        .context("Failed to start wallpaper provider")?;

        if !provider.is_enabled() {
            warn!("Wallpaper blur is disabled; enable it in settings or pass --force");
            return Ok(1);
        }

        provider.register(Box::new(EventLog {
            wallpaper_changes: 0,
        }));

        provider.update_async();
        let idle = provider
            .wait_for_update(Duration::from_secs(args.timeout_secs))
            .context("Update worker stopped unexpectedly")?;
        if !idle {
            bail!("Timed out waiting for the blurred wallpaper");
        }

        let Some(wallpaper) = provider.wallpaper() else {
            bail!("Failed to blur {:?}", args.wallpaper);
        };

        save(&wallpaper, &args.output)?;
        info!(
            path = ?args.output,
            width = wallpaper.width(),
            height = wallpaper.height(),
            radius = provider.blur_radius(),
            "Saved blurred wallpaper"
        );

        if let Some(path) = &args.placeholder_output {
            if let Some(placeholder) = provider.placeholder() {
                save(&placeholder, path)?;
                info!(?path, "Saved placeholder");
            }
        }

        if let Some(path) = &args.view_output {
            provider.set_wallpaper_offset(args.offset);
            let drawable = provider.create_drawable();
            let mut canvas = RgbaImage::new(args.width, args.height);
            drawable.draw(&mut canvas, 0, 0);
            save(&canvas, path)?;
            info!(?path, offset = provider.offset(), "Saved screen view");
        }

        Ok(0)
    }
}

fn save(image: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    image
        .save(path)
        .with_context(|| format!("Failed to write image: {:?}", path))
}
