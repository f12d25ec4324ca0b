//! The blurred wallpaper provider.
//!
//! Owns the published bitmaps, the parallax offset and the listener list.
//! It lives on a single owner thread (it is `!Send`); the update worker only
//! computes bitmaps and the owner applies them in `dispatch_pending` or
//! `wait_for_update`. Concurrent `update_async` calls are coalesced: while one
//! update is in flight, further requests collapse into a single rerun.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use tracing::{debug, error, info, trace, warn};

use super::drawable::BlurDrawable;
use super::engine::{BlurEngine, BlurKernel, GaussianKernel};
use super::listeners::{ListenerRegistry, Subscription, WallpaperListener};
use super::offset::wallpaper_offset;
use super::pipeline::{PipelineOptions, UpdateContext, UpdateEvent};
use super::tint::TINT_COLOR;
use super::worker::{UpdateWorker, WorkerMessage};
use crate::config::{Settings, DEFAULT_DOWNSAMPLE_FACTOR};
use crate::error::{BlurError, Result};
use crate::platform::{DisplayMetrics, FixedPreference, PreferenceStore, WallpaperSource};

/// State visible to consumers. Bitmaps are replaced, never mutated.
#[derive(Debug, Default)]
pub(crate) struct Published {
    /// Blurred wallpaper; cleared when a new placeholder goes up.
    pub wallpaper: Option<Arc<RgbaImage>>,
    /// Tint-coloured stand-in, same size as the fitted wallpaper.
    pub placeholder: Option<Arc<RgbaImage>>,
    /// Viewport width used by the offset translator.
    pub screen_width: u32,
    /// Radius derived at the start of the latest update.
    pub blur_radius: u32,
    /// Current parallax offset in pixels.
    pub offset: f32,
}

pub struct BlurWallpaperProvider {
    /// Collaborators and switches, shared with the worker.
    context: Arc<UpdateContext>,
    /// Background thread running async updates.
    worker: UpdateWorker,
    /// Observers, notified on the owner thread.
    listeners: ListenerRegistry,
    /// State read by accessors and drawables.
    published: Rc<RefCell<Published>>,
    /// An async update was requested and has not finished.
    in_flight: bool,
    /// Another update was requested while one was in flight.
    rerun: bool,
}

impl BlurWallpaperProvider {
    pub fn builder(
        source: Arc<dyn WallpaperSource>,
        display: Arc<dyn DisplayMetrics>,
    ) -> ProviderBuilder {
        ProviderBuilder::new(source, display)
    }

    fn new(context: UpdateContext) -> Result<Self> {
        let context = Arc::new(context);
        let worker = UpdateWorker::spawn(Arc::clone(&context))?;
        let published = Published {
            blur_radius: context.blur_radius(),
            ..Default::default()
        };

        Ok(Self {
            context,
            worker,
            listeners: ListenerRegistry::new(),
            published: Rc::new(RefCell::new(published)),
            in_flight: false,
            rerun: false,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.context.is_enabled()
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut options = self.context.options();
        options.enabled = enabled;
        self.context.set_options(options);
        info!(enabled, "Wallpaper blur toggled");
    }

    pub fn set_vibrancy(&self, vibrancy: bool) {
        let mut options = self.context.options();
        options.vibrancy = vibrancy;
        self.context.set_options(options);
    }

    pub fn tint_color(&self) -> u32 {
        TINT_COLOR
    }

    /// The blurred wallpaper, or `None` while an update is in progress.
    pub fn wallpaper(&self) -> Option<Arc<RgbaImage>> {
        self.published.borrow().wallpaper.clone()
    }

    pub fn placeholder(&self) -> Option<Arc<RgbaImage>> {
        self.published.borrow().placeholder.clone()
    }

    pub fn blur_radius(&self) -> u32 {
        self.published.borrow().blur_radius
    }

    pub fn downsample_factor(&self) -> u32 {
        self.context.engine().downsample_factor()
    }

    pub fn offset(&self) -> f32 {
        self.published.borrow().offset
    }

    /// True while a background update has been requested and not finished.
    pub fn is_updating(&self) -> bool {
        self.in_flight
    }

    pub fn register(&mut self, listener: Box<dyn WallpaperListener>) -> Subscription {
        let offset = self.offset();
        self.listeners.register(listener, offset)
    }

    pub fn unregister(&mut self, subscription: Subscription) -> bool {
        self.listeners.unregister(subscription)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn create_drawable(&mut self) -> BlurDrawable {
        self.create_drawable_with(0.0, false)
    }

    /// Create a drawable bound to this provider. A `radius` of zero uses the
    /// provider's radius.
    pub fn create_drawable_with(&mut self, radius: f32, allow_transparency: bool) -> BlurDrawable {
        let (drawable, sink) =
            BlurDrawable::new(Rc::clone(&self.published), radius, allow_transparency);
        let subscription = self.register(Box::new(sink));
        drawable.bind(subscription)
    }

    /// Unregister a drawable created by this provider.
    pub fn release_drawable(&mut self, drawable: BlurDrawable) -> bool {
        drawable
            .subscription()
            .is_some_and(|subscription| self.unregister(subscription))
    }

    /// Update the parallax offset from a scroll fraction in `0.0..=1.0`.
    ///
    /// Ignored while disabled or before a blurred wallpaper is published.
    pub fn set_wallpaper_offset(&mut self, fraction: f32) {
        if !self.is_enabled() {
            return;
        }

        let offset = {
            let published = self.published.borrow();
            let Some(wallpaper) = published.wallpaper.as_ref() else {
                return;
            };
            wallpaper_offset(fraction, published.screen_width, wallpaper.width())
        };

        trace!(fraction, offset, "Wallpaper offset changed");
        self.published.borrow_mut().offset = offset;
        self.listeners.notify_offset_changed(offset);
    }

    pub fn set_use_transparency(&mut self, use_transparency: bool) {
        self.listeners
            .notify_transparency_mode_changed(use_transparency);
    }

    /// Run an update on the calling thread.
    ///
    /// Returns `Ok(false)` when disabled. On error, whatever was published
    /// before the failing step stays published.
    pub fn update_now(&mut self) -> Result<bool> {
        self.refresh_blur_radius();
        let context = Arc::clone(&self.context);
        context.run(|event| self.apply_event(event))
    }

    /// Request an update on the worker. Results are applied by
    /// `dispatch_pending` or `wait_for_update`.
    pub fn update_async(&mut self) {
        self.refresh_blur_radius();
        if !self.is_enabled() {
            trace!("Wallpaper blur disabled, ignoring update request");
            return;
        }
        if self.in_flight {
            trace!("Update already running, coalescing request");
            self.rerun = true;
            return;
        }

        match self.worker.request() {
            Ok(()) => self.in_flight = true,
            Err(e) => error!(error = %e, "Failed to request wallpaper update"),
        }
    }

    /// Apply everything the worker has produced so far. Returns the number
    /// of messages handled.
    ///
    /// If the worker has stopped, the pending update is abandoned so that
    /// `is_updating` does not stay true forever.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.worker.try_recv() {
                Ok(Some(message)) => {
                    self.handle_message(message);
                    handled += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    self.abandon_update(&e);
                    break;
                }
            }
        }
        handled
    }

    /// Block until no update is in flight or `timeout` elapses, applying
    /// messages as they arrive. Returns true if the provider went idle.
    pub fn wait_for_update(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        while self.in_flight {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            match self.worker.recv_timeout(remaining) {
                Ok(Some(message)) => self.handle_message(message),
                Ok(None) => return Ok(false),
                Err(e) => {
                    self.abandon_update(&e);
                    return Err(e);
                }
            }
        }
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn published_for_test(&self) -> &Rc<RefCell<Published>> {
        &self.published
    }

    fn refresh_blur_radius(&self) {
        let blur_radius = self.context.blur_radius();
        let mut published = self.published.borrow_mut();
        if published.blur_radius != blur_radius {
            debug!(from = published.blur_radius, to = blur_radius, "Blur radius changed");
            published.blur_radius = blur_radius;
        }
    }

    fn abandon_update(&mut self, error: &BlurError) {
        if self.in_flight {
            error!(%error, "Wallpaper update worker stopped mid-update");
        }
        self.in_flight = false;
        self.rerun = false;
    }

    fn handle_message(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Event(event) => self.apply_event(event),
            WorkerMessage::Finished(result) => {
                self.in_flight = false;
                match result {
                    Ok(ran) => debug!(ran, "Wallpaper update finished"),
                    Err(e) => warn!(error = %e, "Wallpaper update failed"),
                }
                if std::mem::take(&mut self.rerun) {
                    self.update_async();
                }
            }
        }
    }

    fn apply_event(&mut self, event: UpdateEvent) {
        {
            let mut published = self.published.borrow_mut();
            match event {
                UpdateEvent::Placeholder {
                    placeholder,
                    screen,
                    blur_radius,
                } => {
                    published.wallpaper = None;
                    published.placeholder = Some(placeholder);
                    published.screen_width = screen.width;
                    published.blur_radius = blur_radius;
                }
                UpdateEvent::Wallpaper(wallpaper) => {
                    published.wallpaper = Some(wallpaper);
                }
            }
        }
        self.listeners.notify_wallpaper_changed();
    }
}

/// Builder for `BlurWallpaperProvider`.
pub struct ProviderBuilder {
    source: Arc<dyn WallpaperSource>,
    display: Arc<dyn DisplayMetrics>,
    /// Blur radius preference (default: fixed 75).
    preferences: Arc<dyn PreferenceStore>,
    /// Blur kernel (default: Gaussian).
    kernel: Arc<dyn BlurKernel>,
    downsample_factor: u32,
    options: PipelineOptions,
}

impl ProviderBuilder {
    pub fn new(source: Arc<dyn WallpaperSource>, display: Arc<dyn DisplayMetrics>) -> Self {
        Self {
            source,
            display,
            preferences: Arc::new(FixedPreference::default()),
            kernel: Arc::new(GaussianKernel),
            downsample_factor: DEFAULT_DOWNSAMPLE_FACTOR,
            options: PipelineOptions::default(),
        }
    }

    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn kernel(mut self, kernel: Arc<dyn BlurKernel>) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn downsample_factor(mut self, factor: u32) -> Self {
        self.downsample_factor = factor;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.options.enabled = enabled;
        self
    }

    pub fn vibrancy(mut self, vibrancy: bool) -> Self {
        self.options.vibrancy = vibrancy;
        self
    }

    /// Take the feature switches and downsample factor from `settings`.
    pub fn settings(self, settings: &Settings) -> Self {
        self.enabled(settings.enabled)
            .vibrancy(settings.vibrancy)
            .downsample_factor(settings.downsample_factor)
    }

    pub fn build(self) -> Result<BlurWallpaperProvider> {
        let engine = BlurEngine::new(self.downsample_factor, self.kernel);
        let context = UpdateContext::new(
            self.source,
            self.display,
            self.preferences,
            engine,
            self.options,
        );
        BlurWallpaperProvider::new(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blur::listeners::tests::{Event, Recorder};
    use crate::blur::pipeline::tests::solid_wallpaper;
    use crate::platform::{FixedDisplay, ScreenSize, StaticWallpaper};
    use std::sync::atomic::{AtomicBool, Ordering};

    const WAIT: Duration = Duration::from_secs(10);

    type Log = Rc<RefCell<Vec<(&'static str, Event)>>>;

    fn provider(
        source: StaticWallpaper,
        screen: ScreenSize,
        enabled: bool,
    ) -> BlurWallpaperProvider {
        BlurWallpaperProvider::builder(Arc::new(source), Arc::new(FixedDisplay(screen)))
            .enabled(enabled)
            .build()
            .unwrap()
    }

    fn record(provider: &mut BlurWallpaperProvider, name: &'static str, log: &Log) -> Subscription {
        provider.register(Box::new(Recorder {
            name,
            log: Rc::clone(log),
        }))
    }

    fn wallpaper_events(log: &Log) -> usize {
        log.borrow()
            .iter()
            .filter(|(_, e)| *e == Event::Wallpaper)
            .count()
    }

    #[test]
    fn test_defaults() {
        let p = provider(StaticWallpaper::empty(), ScreenSize::new(10, 10), false);
        assert!(!p.is_enabled());
        assert_eq!(p.blur_radius(), 9);
        assert_eq!(p.downsample_factor(), 8);
        assert_eq!(p.offset(), 0.0);
        assert_eq!(p.tint_color(), 0x45FF_FFFF);
        assert!(p.wallpaper().is_none());
        assert!(p.placeholder().is_none());
    }

    #[test]
    fn test_register_before_any_update_gets_zero_offset() {
        let log = Log::default();
        let mut p = provider(StaticWallpaper::empty(), ScreenSize::new(10, 10), false);
        record(&mut p, "a", &log);
        assert_eq!(*log.borrow(), vec![("a", Event::Offset(0.0))]);
    }

    #[test]
    fn test_update_now_publishes_twice() {
        let log = Log::default();
        let mut p = provider(
            StaticWallpaper::new(solid_wallpaper(100, 100)),
            ScreenSize::new(200, 150),
            true,
        );
        record(&mut p, "a", &log);
        log.borrow_mut().clear();

        assert!(p.update_now().unwrap());

        assert_eq!(
            *log.borrow(),
            vec![("a", Event::Wallpaper), ("a", Event::Wallpaper)]
        );
        let wallpaper = p.wallpaper().unwrap();
        let placeholder = p.placeholder().unwrap();
        assert_eq!(wallpaper.dimensions(), (200, 150));
        assert_eq!(wallpaper.dimensions(), placeholder.dimensions());
    }

    #[test]
    fn test_disabled_update_is_silent() {
        let log = Log::default();
        let mut p = provider(
            StaticWallpaper::new(solid_wallpaper(10, 10)),
            ScreenSize::new(10, 10),
            false,
        );
        record(&mut p, "a", &log);
        log.borrow_mut().clear();

        assert!(!p.update_now().unwrap());
        p.update_async();
        assert!(!p.is_updating());
        assert!(p.wait_for_update(Duration::from_millis(10)).unwrap());
        assert_eq!(p.dispatch_pending(), 0);

        p.set_wallpaper_offset(0.25);
        assert!(log.borrow().is_empty());
        assert_eq!(p.offset(), 0.0);
    }

    #[test]
    fn test_update_async_publishes_placeholder_then_wallpaper() {
        let log = Log::default();
        let mut p = provider(
            StaticWallpaper::new(solid_wallpaper(64, 64)),
            ScreenSize::new(64, 64),
            true,
        );
        record(&mut p, "a", &log);
        log.borrow_mut().clear();

        p.update_async();
        assert!(p.is_updating());
        assert!(p.wait_for_update(WAIT).unwrap());

        assert_eq!(wallpaper_events(&log), 2);
        assert!(p.wallpaper().is_some());
        assert!(p.placeholder().is_some());
    }

    #[test]
    fn test_concurrent_requests_are_coalesced() {
        let log = Log::default();
        let mut p = provider(
            StaticWallpaper::new(solid_wallpaper(64, 64)),
            ScreenSize::new(64, 64),
            true,
        );
        record(&mut p, "a", &log);
        log.borrow_mut().clear();

        p.update_async();
        p.update_async();
        p.update_async();
        assert!(p.wait_for_update(WAIT).unwrap());

        // One update plus a single rerun, two publications each.
        assert_eq!(wallpaper_events(&log), 4);
        assert!(!p.is_updating());
    }

    #[test]
    fn test_failed_update_keeps_previous_state() {
        let source = StaticWallpaper::new(solid_wallpaper(32, 32));
        let mut p = provider(source.clone(), ScreenSize::new(32, 32), true);
        assert!(p.update_now().unwrap());
        let before = p.wallpaper().unwrap();

        source.set(None);
        assert!(p.update_now().is_err());
        assert!(Arc::ptr_eq(&before, &p.wallpaper().unwrap()));

        p.update_async();
        assert!(p.wait_for_update(WAIT).unwrap());
        assert!(Arc::ptr_eq(&before, &p.wallpaper().unwrap()));
    }

    #[test]
    fn test_offset_requires_published_wallpaper() {
        let log = Log::default();
        let mut p = provider(
            StaticWallpaper::new(solid_wallpaper(100, 50)),
            ScreenSize::new(50, 50),
            true,
        );
        record(&mut p, "a", &log);
        log.borrow_mut().clear();

        p.set_wallpaper_offset(0.0);
        assert!(log.borrow().is_empty());

        // 100x50 already covers 50x50, so the wallpaper stays 100 wide.
        p.update_now().unwrap();
        log.borrow_mut().clear();

        p.set_wallpaper_offset(0.5);
        p.set_wallpaper_offset(0.0);
        assert_eq!(
            *log.borrow(),
            vec![("a", Event::Offset(25.0)), ("a", Event::Offset(0.0))]
        );
        assert_eq!(p.offset(), 0.0);
    }

    #[test]
    fn test_late_listener_gets_current_offset() {
        let log = Log::default();
        let mut p = provider(
            StaticWallpaper::new(solid_wallpaper(100, 50)),
            ScreenSize::new(50, 50),
            true,
        );
        p.update_now().unwrap();
        p.set_wallpaper_offset(0.5);

        record(&mut p, "late", &log);
        assert_eq!(*log.borrow(), vec![("late", Event::Offset(25.0))]);
    }

    #[test]
    fn test_transparency_broadcast_and_unregister() {
        let log = Log::default();
        let mut p = provider(StaticWallpaper::empty(), ScreenSize::new(10, 10), false);
        let a = record(&mut p, "a", &log);
        record(&mut p, "b", &log);
        log.borrow_mut().clear();

        assert!(p.unregister(a));
        p.set_use_transparency(true);
        assert_eq!(*log.borrow(), vec![("b", Event::Transparency(true))]);
    }

    #[test]
    fn test_toggle_enabled_at_runtime() {
        let p = provider(StaticWallpaper::empty(), ScreenSize::new(10, 10), false);
        p.set_enabled(true);
        assert!(p.is_enabled());
        p.set_enabled(false);
        assert!(!p.is_enabled());
    }

    /// Panics on its first call, then blurs normally.
    struct PanicOnce(AtomicBool);

    impl BlurKernel for PanicOnce {
        fn blur(&self, image: &RgbaImage, radius: u32) -> Result<RgbaImage> {
            if !self.0.swap(true, Ordering::SeqCst) {
                panic!("kernel exploded");
            }
            GaussianKernel.blur(image, radius)
        }
    }

    #[test]
    fn test_panicking_update_does_not_wedge_provider() {
        let log = Log::default();
        let mut p = BlurWallpaperProvider::builder(
            Arc::new(StaticWallpaper::new(solid_wallpaper(32, 32))),
            Arc::new(FixedDisplay(ScreenSize::new(32, 32))),
        )
        .kernel(Arc::new(PanicOnce(AtomicBool::new(false))))
        .enabled(true)
        .build()
        .unwrap();
        record(&mut p, "a", &log);
        log.borrow_mut().clear();

        p.update_async();
        assert!(p.wait_for_update(WAIT).unwrap());
        assert!(!p.is_updating());
        assert!(p.placeholder().is_some());
        assert!(p.wallpaper().is_none());

        // The next request runs again and completes.
        p.update_async();
        assert!(p.is_updating());
        assert!(p.wait_for_update(WAIT).unwrap());
        assert!(p.wallpaper().is_some());
        assert_eq!(wallpaper_events(&log), 3);
    }

    #[test]
    fn test_stopped_worker_clears_in_flight() {
        let mut p = provider(
            StaticWallpaper::new(solid_wallpaper(8, 8)),
            ScreenSize::new(8, 8),
            true,
        );
        p.worker.shutdown();
        p.in_flight = true;
        p.rerun = true;

        assert_eq!(p.dispatch_pending(), 0);
        assert!(!p.is_updating());

        p.in_flight = true;
        assert!(matches!(
            p.wait_for_update(WAIT),
            Err(BlurError::WorkerGone)
        ));
        assert!(!p.is_updating());

        // Requests to a stopped worker are refused, not queued forever.
        p.update_async();
        assert!(!p.is_updating());
    }

    #[test]
    fn test_blur_radius_refreshed_when_update_fails() {
        let prefs = Arc::new(FixedPreference::default());
        let source = StaticWallpaper::empty();
        let mut p = BlurWallpaperProvider::builder(
            Arc::new(source.clone()),
            Arc::new(FixedDisplay(ScreenSize::new(16, 16))),
        )
        .preferences(prefs.clone())
        .enabled(true)
        .build()
        .unwrap();
        assert_eq!(p.blur_radius(), 9);

        prefs.set(160.0);
        assert!(p.update_now().is_err());
        assert_eq!(p.blur_radius(), 20);

        prefs.set(40.0);
        p.update_async();
        assert!(p.wait_for_update(WAIT).unwrap());
        assert_eq!(p.blur_radius(), 5);

        p.set_enabled(false);
        prefs.set(200.0);
        assert!(!p.update_now().unwrap());
        assert_eq!(p.blur_radius(), 25);
    }
}
