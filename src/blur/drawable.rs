//! Drawable handle that paints the blurred wallpaper behind a surface.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use image::imageops;
use image::RgbaImage;

use super::listeners::{Subscription, WallpaperListener};
use super::provider::Published;

#[derive(Debug, Default)]
struct DrawableState {
    /// Last parallax offset received from the provider.
    offset: Cell<f32>,
    /// Last transparency mode received from the provider.
    use_transparency: Cell<bool>,
    /// Bumped on every wallpaper change so hosts know to repaint.
    generation: Cell<u64>,
}

/// Listener half of a drawable, registered with the provider.
///
/// Holds the drawable's state weakly, so dropping the drawable is enough to
/// retire the sink on the next broadcast.
pub(crate) struct DrawableSink {
    state: Weak<DrawableState>,
}

impl WallpaperListener for DrawableSink {
    fn on_wallpaper_changed(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.generation.set(state.generation.get() + 1);
        }
    }

    fn on_offset_changed(&mut self, offset: f32) {
        if let Some(state) = self.state.upgrade() {
            state.offset.set(offset);
        }
    }

    fn on_transparency_mode_changed(&mut self, use_transparency: bool) {
        if let Some(state) = self.state.upgrade() {
            state.use_transparency.set(use_transparency);
        }
    }

    fn is_alive(&self) -> bool {
        self.state.strong_count() > 0
    }
}

/// Paints the current wallpaper (or its placeholder) for a surface placed
/// somewhere on screen, following the parallax offset.
pub struct BlurDrawable {
    /// The provider's published bitmaps, read at draw time.
    published: Rc<RefCell<Published>>,
    /// Shared with the sink; the only strong reference.
    state: Rc<DrawableState>,
    /// Requested radius, or zero to follow the provider.
    radius: f32,
    /// Whether this surface may switch to the live background.
    allow_transparency: bool,
    /// Registration of the sink, set once bound.
    subscription: Option<Subscription>,
}

impl BlurDrawable {
    pub(crate) fn new(
        published: Rc<RefCell<Published>>,
        radius: f32,
        allow_transparency: bool,
    ) -> (Self, DrawableSink) {
        let state = Rc::new(DrawableState::default());
        let sink = DrawableSink {
            state: Rc::downgrade(&state),
        };
        let drawable = Self {
            published,
            state,
            radius,
            allow_transparency,
            subscription: None,
        };
        (drawable, sink)
    }

    pub(crate) fn bind(mut self, subscription: Subscription) -> Self {
        self.subscription = Some(subscription);
        self
    }

    pub fn subscription(&self) -> Option<Subscription> {
        self.subscription
    }

    /// Radius this drawable was created with, or the provider's when unset.
    pub fn blur_radius(&self) -> f32 {
        if self.radius > 0.0 {
            self.radius
        } else {
            #[allow(clippy::cast_precision_loss)]
            let radius = self.published.borrow().blur_radius as f32;
            radius
        }
    }

    pub fn allows_transparency(&self) -> bool {
        self.allow_transparency
    }

    pub fn offset(&self) -> f32 {
        self.state.offset.get()
    }

    /// Number of wallpaper changes seen since creation.
    pub fn generation(&self) -> u64 {
        self.state.generation.get()
    }

    /// The surface should show the live background instead of the blur.
    pub fn is_transparent(&self) -> bool {
        self.allow_transparency && self.state.use_transparency.get()
    }

    /// Blend the visible slice of the wallpaper onto `canvas`, whose top-left
    /// corner sits at (`left`, `top`) in screen coordinates.
    ///
    /// Falls back to the placeholder while the blur is computed. Returns false
    /// when nothing was drawn.
    #[allow(clippy::cast_possible_truncation)]
    pub fn draw(&self, canvas: &mut RgbaImage, left: i64, top: i64) -> bool {
        if self.is_transparent() {
            return false;
        }

        let published = self.published.borrow();
        let (image, x) = match (&published.wallpaper, &published.placeholder) {
            (Some(wallpaper), _) => (wallpaper, -(self.offset().round() as i64) - left),
            (None, Some(placeholder)) => (placeholder, -left),
            (None, None) => return false,
        };

        imageops::overlay(canvas, &**image, x, -top);
        true
    }
}
