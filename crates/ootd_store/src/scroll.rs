//! Visibility-edge trigger for incremental loading.
//!
//! The host reports sentinel geometry whenever layout or scroll position
//! changes; the trigger fires once per transition from hidden to visible.

use std::fmt;
use tracing::debug;

/// Identity of a rendered sentinel element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SentinelId(u64);

impl SentinelId {
    /// Wraps a host-assigned element id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SentinelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sentinel#{}", self.0)
    }
}

/// Visible region of the scroll container, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Scroll offset of the top edge.
    pub top: f64,
    /// Height of the visible region.
    pub height: f64,
}

impl Viewport {
    /// Creates a viewport.
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Vertical extent of a sentinel, in the same coordinates as [`Viewport`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentinelRect {
    /// Top edge.
    pub top: f64,
    /// Height; zero for a marker element.
    pub height: f64,
}

impl SentinelRect {
    /// Creates a rect.
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Trigger tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollConfig {
    /// Pixels the viewport is grown by on both edges.
    pub root_margin: f64,
    /// Visible fraction of the sentinel required to count as intersecting.
    pub threshold: f64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            root_margin: 100.0,
            threshold: 0.1,
        }
    }
}

impl ScrollConfig {
    /// Sets the root margin.
    pub fn with_root_margin(mut self, margin: f64) -> Self {
        self.root_margin = margin;
        self
    }

    /// Sets the threshold, clamped to `0.0..=1.0`.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Returns true if `rect` counts as visible in `viewport`.
    pub fn is_intersecting(&self, rect: SentinelRect, viewport: Viewport) -> bool {
        let root_top = viewport.top - self.root_margin;
        let root_bottom = viewport.bottom() + self.root_margin;

        if rect.height <= 0.0 {
            return rect.top >= root_top && rect.top <= root_bottom;
        }

        let overlap = rect.bottom().min(root_bottom) - rect.top.max(root_top);
        if overlap < 0.0 {
            return false;
        }
        let ratio = overlap / rect.height;
        if self.threshold <= 0.0 {
            // Edge-adjacent counts at threshold zero.
            return true;
        }
        ratio >= self.threshold
    }
}

/// Fires a callback when the observed sentinel becomes visible.
///
/// At most one sentinel is observed at a time. Reports for any other
/// sentinel are ignored, so a stale element from a previous render can
/// never trigger a load.
pub struct ScrollTrigger {
    config: ScrollConfig,
    observed: Option<SentinelId>,
    intersecting: bool,
    on_visible: Box<dyn FnMut() + Send>,
}

impl ScrollTrigger {
    /// Creates a trigger that calls `on_visible` on each visibility edge.
    pub fn new<F>(config: ScrollConfig, on_visible: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self {
            config,
            observed: None,
            intersecting: false,
            on_visible: Box::new(on_visible),
        }
    }

    /// Config in use.
    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    /// Starts observing `sentinel`, releasing any previous one.
    pub fn observe(&mut self, sentinel: SentinelId) {
        if let Some(previous) = self.observed.replace(sentinel) {
            debug!(%previous, %sentinel, "replacing scroll observer");
        }
        self.intersecting = false;
    }

    /// Stops observing. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(previous) = self.observed.take() {
            debug!(%previous, "scroll observer released");
        }
        self.intersecting = false;
    }

    /// Currently observed sentinel.
    pub fn observed(&self) -> Option<SentinelId> {
        self.observed
    }

    /// Number of live observers, zero or one.
    pub fn active_observers(&self) -> usize {
        usize::from(self.observed.is_some())
    }

    /// Last computed visibility of the observed sentinel.
    pub fn is_intersecting(&self) -> bool {
        self.intersecting
    }

    /// Feeds new geometry for `sentinel`.
    ///
    /// Returns true if the callback fired.
    pub fn on_intersection(&mut self, sentinel: SentinelId, rect: SentinelRect, viewport: Viewport) -> bool {
        if self.observed != Some(sentinel) {
            return false;
        }
        let now = self.config.is_intersecting(rect, viewport);
        let was = std::mem::replace(&mut self.intersecting, now);
        if now && !was {
            debug!(%sentinel, "sentinel visible");
            (self.on_visible)();
            return true;
        }
        false
    }
}

impl fmt::Debug for ScrollTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrollTrigger")
            .field("config", &self.config)
            .field("observed", &self.observed)
            .field("intersecting", &self.intersecting)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(config: ScrollConfig) -> (ScrollTrigger, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        let trigger = ScrollTrigger::new(config, move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        (trigger, count)
    }

    const VIEW: Viewport = Viewport { top: 0.0, height: 800.0 };

    #[test]
    fn fires_once_per_edge() {
        let (mut trigger, count) = counting(ScrollConfig::default());
        let s = SentinelId::new(1);
        trigger.observe(s);

        assert!(!trigger.on_intersection(s, SentinelRect::new(2000.0, 10.0), VIEW));
        assert!(trigger.on_intersection(s, SentinelRect::new(850.0, 10.0), VIEW));
        // Still visible: no second call.
        assert!(!trigger.on_intersection(s, SentinelRect::new(700.0, 10.0), VIEW));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        trigger.on_intersection(s, SentinelRect::new(2000.0, 10.0), VIEW);
        assert!(trigger.on_intersection(s, SentinelRect::new(400.0, 10.0), VIEW));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn margin_extends_viewport() {
        let config = ScrollConfig::default();
        assert!(config.is_intersecting(SentinelRect::new(890.0, 10.0), VIEW));
        assert!(!config.is_intersecting(SentinelRect::new(901.0, 10.0), VIEW));
        assert!(config.is_intersecting(SentinelRect::new(-100.0, 10.0), VIEW));
    }

    #[test]
    fn threshold_requires_fraction() {
        let config = ScrollConfig::default().with_root_margin(0.0).with_threshold(0.5);
        // 40 of 100 px visible.
        assert!(!config.is_intersecting(SentinelRect::new(760.0, 100.0), VIEW));
        // 60 of 100 px visible.
        assert!(config.is_intersecting(SentinelRect::new(740.0, 100.0), VIEW));
    }

    #[test]
    fn zero_height_sentinel() {
        let config = ScrollConfig::default().with_root_margin(0.0).with_threshold(1.0);
        assert!(config.is_intersecting(SentinelRect::new(800.0, 0.0), VIEW));
        assert!(!config.is_intersecting(SentinelRect::new(801.0, 0.0), VIEW));
    }

    #[test]
    fn stale_sentinel_ignored() {
        let (mut trigger, count) = counting(ScrollConfig::default());
        trigger.observe(SentinelId::new(1));
        trigger.observe(SentinelId::new(2));
        assert_eq!(trigger.active_observers(), 1);

        assert!(!trigger.on_intersection(SentinelId::new(1), SentinelRect::new(0.0, 10.0), VIEW));
        assert!(trigger.on_intersection(SentinelId::new(2), SentinelRect::new(0.0, 10.0), VIEW));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disconnect_releases() {
        let (mut trigger, count) = counting(ScrollConfig::default());
        let s = SentinelId::new(7);
        trigger.observe(s);
        trigger.disconnect();
        trigger.disconnect();
        assert_eq!(trigger.active_observers(), 0);
        assert!(!trigger.on_intersection(s, SentinelRect::new(0.0, 10.0), VIEW));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reobserve_resets_edge() {
        let (mut trigger, count) = counting(ScrollConfig::default());
        let s = SentinelId::new(3);
        trigger.observe(s);
        trigger.on_intersection(s, SentinelRect::new(0.0, 10.0), VIEW);
        trigger.observe(s);
        trigger.on_intersection(s, SentinelRect::new(0.0, 10.0), VIEW);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
