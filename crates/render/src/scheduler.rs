//! Coalesced redraws.
//!
//! While text streams in, every fragment asks for a redraw. The scheduler
//! keeps at most one timer pending: the first request in a burst arms it,
//! later requests only replace the text that will be drawn. When it fires
//! the target is re-rendered once and the viewport follows the new content
//! if it was near the bottom before the redraw.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::document::{DocumentTree, MessageId, RenderReport};
use crate::error::RenderError;
use crate::scroll::{self, ScrollViewport};

pub const DEFAULT_REDRAW_DELAY: Duration = Duration::from_millis(60);
pub const DEFAULT_SCROLL_THRESHOLD_PX: u32 = 180;

#[derive(Default)]
struct Pending {
    target: Option<(MessageId, String)>,
    timer: Option<JoinHandle<()>>,
    renders: usize,
}

struct Shared {
    tree: DocumentTree,
    delay: Duration,
    threshold_px: u32,
    viewport: Option<Arc<dyn ScrollViewport>>,
    pending: Mutex<Pending>,
}

/// Rate-limited redraws of one [`DocumentTree`].
#[derive(Clone)]
pub struct RenderScheduler {
    shared: Arc<Shared>,
}

impl RenderScheduler {
    pub fn new(tree: DocumentTree) -> Self {
        Self::with_timing(tree, DEFAULT_REDRAW_DELAY, DEFAULT_SCROLL_THRESHOLD_PX)
    }

    pub fn with_timing(tree: DocumentTree, delay: Duration, threshold_px: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                tree,
                delay,
                threshold_px,
                viewport: None,
                pending: Mutex::new(Pending::default()),
            }),
        }
    }

    /// Attach the viewport to keep scrolled. Call before the first request.
    pub fn with_viewport(self, viewport: Arc<dyn ScrollViewport>) -> Self {
        let shared = Shared {
            tree: self.shared.tree.clone(),
            delay: self.shared.delay,
            threshold_px: self.shared.threshold_px,
            viewport: Some(viewport),
            pending: Mutex::new(Pending::default()),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn tree(&self) -> &DocumentTree {
        &self.shared.tree
    }

    /// Ask for `text` to be drawn into `target`. Arms the timer only if none
    /// is pending; otherwise just replaces the text.
    pub async fn request(&self, target: MessageId, text: impl Into<String>) {
        let mut pending = self.shared.pending.lock().await;
        pending.target = Some((target, text.into()));

        if pending.timer.is_some() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(shared.delay).await;
            if let Err(e) = shared.fire().await {
                warn!(error = %e, "Scheduled redraw failed");
            }
        }));
    }

    /// Draw any pending text now and disarm the timer.
    pub async fn flush(&self) -> Result<Option<RenderReport>, RenderError> {
        let target = {
            let mut pending = self.shared.pending.lock().await;
            if let Some(timer) = pending.timer.take() {
                timer.abort();
            }
            pending.target.take()
        };

        match target {
            Some((id, text)) => self.shared.draw(id, &text).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drop any pending redraw without drawing it.
    pub async fn cancel(&self) {
        let mut pending = self.shared.pending.lock().await;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.target = None;
    }

    pub async fn is_pending(&self) -> bool {
        self.shared.pending.lock().await.timer.is_some()
    }

    /// Number of redraws performed so far.
    pub async fn render_count(&self) -> usize {
        self.shared.pending.lock().await.renders
    }
}

impl Shared {
    async fn fire(&self) -> Result<(), RenderError> {
        let target = {
            let mut pending = self.pending.lock().await;
            pending.timer = None;
            pending.target.take()
        };

        if let Some((id, text)) = target {
            self.draw(id, &text).await?;
        }
        Ok(())
    }

    async fn draw(&self, id: MessageId, text: &str) -> Result<RenderReport, RenderError> {
        let stick = self
            .viewport
            .as_deref()
            .is_some_and(|v| scroll::is_near_bottom(v, self.threshold_px));

        let report = self.tree.render_into(id, text).await?;
        self.pending.lock().await.renders += 1;
        trace!(message = id, chars = text.len(), stick, "Redraw");

        if stick {
            if let Some(viewport) = self.viewport.as_deref() {
                scroll::scroll_to_bottom(viewport);
            }
        }
        Ok(report)
    }
}
