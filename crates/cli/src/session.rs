//! A chat session: one conversation, one rendered document.
//!
//! The exchange runner publishes [`ExchangeEvent`]s; a relay task turns
//! them into scheduled redraws of the current assistant message. When the
//! exchange ends the pending redraw is flushed and the message finalized,
//! or replaced by an error message if the exchange failed.

use std::sync::Arc;
use std::time::Duration;

use chatloom_agent::{ExchangeEvent, ExchangeOutcome, ExchangeRunner};
use chatloom_config::RenderConfig;
use chatloom_core::message::Conversation;
use chatloom_render::{DocumentTree, MessageId, RenderScheduler, ScrollViewport};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The rendered result of one successful turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub outcome: ExchangeOutcome,
    /// Assistant message holding the rendered answer.
    pub message: MessageId,
}

pub struct ChatSession {
    runner: ExchangeRunner,
    scheduler: RenderScheduler,
    conversation: Conversation,
}

impl ChatSession {
    pub fn new(runner: ExchangeRunner, scheduler: RenderScheduler) -> Self {
        Self {
            runner,
            scheduler,
            conversation: Conversation::new(),
        }
    }

    /// Build the scheduler from the `[render]` section of the configuration.
    pub fn from_config(runner: ExchangeRunner, config: &RenderConfig) -> Self {
        let scheduler = RenderScheduler::with_timing(
            DocumentTree::new(),
            Duration::from_millis(config.redraw_delay_ms),
            config.scroll_threshold_px,
        );
        Self::new(runner, scheduler)
    }

    pub fn with_viewport(mut self, viewport: Arc<dyn ScrollViewport>) -> Self {
        self.scheduler = self.scheduler.with_viewport(viewport);
        self
    }

    pub fn runner(&self) -> &ExchangeRunner {
        &self.runner
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn tree(&self) -> &DocumentTree {
        self.scheduler.tree()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Send one user message and render the exchange it starts.
    ///
    /// Every event is forwarded to `observer` after it has been scheduled
    /// for drawing. On failure the partial answer is finalized, an error
    /// message is appended to the document and the error is returned.
    pub async fn send(
        &mut self,
        text: &str,
        observer: Option<mpsc::UnboundedSender<ExchangeEvent>>,
    ) -> Result<Turn, chatloom_core::Error> {
        self.tree().push_user(text).await.settle().await;
        let message = self.tree().push_assistant().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let relay = tokio::spawn(relay(self.scheduler.clone(), message, rx, observer));

        let result = self.runner.run(&mut self.conversation, text, Some(&tx)).await;
        drop(tx);
        if let Err(e) = relay.await {
            warn!(error = %e, "Render relay task failed");
        }

        match self.scheduler.flush().await {
            Ok(Some(report)) => report.settle().await,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Final redraw failed"),
        }

        match result {
            Ok(outcome) => {
                self.complete(message, &outcome.document).await;
                Ok(Turn { outcome, message })
            }
            Err(e) => {
                if let Err(render_err) = self.tree().finalize_with_error(message, &e.to_string()).await {
                    warn!(error = %render_err, "Could not render exchange error");
                }
                Err(e)
            }
        }
    }

    /// Draw the final document text and close the message.
    async fn complete(&self, message: MessageId, document: &str) {
        match self.tree().render_into(message, document).await {
            Ok(report) => report.settle().await,
            Err(e) => warn!(error = %e, "Final render failed"),
        }
        if let Err(e) = self.tree().finalize(message).await {
            warn!(error = %e, "Finalize failed");
        }
    }
}

async fn relay(
    scheduler: RenderScheduler,
    target: MessageId,
    mut rx: mpsc::UnboundedReceiver<ExchangeEvent>,
    observer: Option<mpsc::UnboundedSender<ExchangeEvent>>,
) {
    while let Some(event) = rx.recv().await {
        if let ExchangeEvent::TextChanged { document, .. } = &event {
            scheduler.request(target, document.clone()).await;
        } else {
            debug!(event = event.event_type(), "Exchange event");
        }

        if let Some(observer) = &observer {
            // A closed observer only stops forwarding; drawing continues.
            let _ = observer.send(event);
        }
    }
}
