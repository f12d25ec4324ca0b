//! Observers of the blurred wallpaper.
//!
//! Listeners are notified in registration order. A listener that panics is
//! logged and skipped; the rest of the broadcast still runs.

use std::panic::{self, AssertUnwindSafe};

use tracing::{error, trace};

/// Receives wallpaper, parallax and transparency updates.
///
/// Callbacks run on the thread that owns the provider.
pub trait WallpaperListener {
    /// The placeholder or the blurred wallpaper was replaced.
    fn on_wallpaper_changed(&mut self);

    /// The horizontal parallax offset changed, in pixels.
    fn on_offset_changed(&mut self, offset: f32);

    fn on_transparency_mode_changed(&mut self, _use_transparency: bool) {}

    /// False once whatever the listener reports to is gone. Dead listeners
    /// are dropped from the registry instead of being notified.
    fn is_alive(&self) -> bool {
        true
    }
}

/// Handle returned by `register`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    /// Registration order is notification order.
    listeners: Vec<(Subscription, Box<dyn WallpaperListener>)>,
    /// Next subscription id; ids are never reused.
    next_id: u64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener and immediately hand it `current_offset`.
    pub fn register(
        &mut self,
        mut listener: Box<dyn WallpaperListener>,
        current_offset: f32,
    ) -> Subscription {
        self.prune();
        let subscription = Subscription(self.next_id);
        self.next_id += 1;

        guarded(subscription, "offset", || {
            listener.on_offset_changed(current_offset);
        });
        self.listeners.push((subscription, listener));

        trace!(?subscription, count = self.listeners.len(), "Listener registered");
        subscription
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unregister(&mut self, subscription: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != subscription);
        let removed = self.listeners.len() != before;
        trace!(?subscription, removed, "Listener unregistered");
        removed
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.listeners.iter().filter(|(_, l)| l.is_alive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_wallpaper_changed(&mut self) {
        self.broadcast("wallpaper", |l| l.on_wallpaper_changed());
    }

    pub fn notify_offset_changed(&mut self, offset: f32) {
        self.broadcast("offset", |l| l.on_offset_changed(offset));
    }

    pub fn notify_transparency_mode_changed(&mut self, use_transparency: bool) {
        self.broadcast("transparency", |l| {
            l.on_transparency_mode_changed(use_transparency);
        });
    }

    fn prune(&mut self) {
        let before = self.listeners.len();
        self.listeners.retain(|(_, listener)| listener.is_alive());
        let pruned = before - self.listeners.len();
        if pruned > 0 {
            trace!(pruned, count = self.listeners.len(), "Dropped dead listeners");
        }
    }

    fn broadcast(&mut self, event: &'static str, mut f: impl FnMut(&mut dyn WallpaperListener)) {
        self.prune();
        for (subscription, listener) in &mut self.listeners {
            guarded(*subscription, event, || f(&mut **listener));
        }
    }
}

fn guarded(subscription: Subscription, event: &'static str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(?subscription, event, "Wallpaper listener panicked");
    }
}
