//! Sticky auto-scroll.
//!
//! A view follows new content only if the reader was already near the
//! bottom before the redraw; scrolling up to read earlier output opts out.

use std::sync::atomic::{AtomicU32, Ordering};

/// A scrollable container, measured in pixels.
pub trait ScrollViewport: Send + Sync {
    fn scroll_height(&self) -> u32;
    fn scroll_top(&self) -> u32;
    fn client_height(&self) -> u32;
    fn set_scroll_top(&self, top: u32);
}

/// Whether the viewport is within `threshold_px` of its bottom edge.
pub fn is_near_bottom(viewport: &dyn ScrollViewport, threshold_px: u32) -> bool {
    let visible_bottom = viewport.scroll_top().saturating_add(viewport.client_height());
    viewport.scroll_height().saturating_sub(visible_bottom) <= threshold_px
}

pub fn scroll_to_bottom(viewport: &dyn ScrollViewport) {
    viewport.set_scroll_top(viewport.scroll_height());
}

/// Run `update`, then follow the content down if the viewport was near the
/// bottom beforehand.
pub fn with_sticky_scroll<T>(
    viewport: &dyn ScrollViewport,
    threshold_px: u32,
    update: impl FnOnce() -> T,
) -> T {
    let stick = is_near_bottom(viewport, threshold_px);
    let out = update();
    if stick {
        scroll_to_bottom(viewport);
    }
    out
}

/// An in-memory viewport for headless rendering and tests.
#[derive(Debug, Default)]
pub struct VirtualViewport {
    scroll_height: AtomicU32,
    scroll_top: AtomicU32,
    client_height: AtomicU32,
}

impl VirtualViewport {
    pub fn new(client_height: u32) -> Self {
        Self {
            client_height: AtomicU32::new(client_height),
            ..Self::default()
        }
    }

    /// Content grew (or shrank) to `height`.
    pub fn set_content_height(&self, height: u32) {
        self.scroll_height.store(height, Ordering::Relaxed);
    }
}

impl ScrollViewport for VirtualViewport {
    fn scroll_height(&self) -> u32 {
        self.scroll_height.load(Ordering::Relaxed)
    }

    fn scroll_top(&self) -> u32 {
        self.scroll_top.load(Ordering::Relaxed)
    }

    fn client_height(&self) -> u32 {
        self.client_height.load(Ordering::Relaxed)
    }

    fn set_scroll_top(&self, top: u32) {
        self.scroll_top.store(top, Ordering::Relaxed);
    }
}
