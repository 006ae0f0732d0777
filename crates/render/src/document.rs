//! The rendered conversation.
//!
//! A [`DocumentTree`] holds one body per message. Assistant bodies are
//! re-rendered from their full accumulated text on every pass; math slots
//! are painted from the shared [`MathCache`] immediately when possible and
//! otherwise by a background task once the formula has been rendered, into
//! every slot with that key across the whole tree.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::annotation::{self, AnnotationKind, AnnotationSegment};
use crate::error::RenderError;
use crate::markup::{escape_html, markdown_to_html};
use crate::math::{self, MathCache, MathRenderer, MathSegment, TexSourceRenderer};

pub type MessageId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    User,
    Assistant,
}

impl Author {
    fn class(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
enum Fragment {
    Html(String),
    Math {
        key: String,
        raw: String,
        tex: String,
        display: bool,
        painted: Option<String>,
    },
}

impl Fragment {
    fn write_to(&self, out: &mut String) {
        match self {
            Self::Html(html) => out.push_str(html),
            Self::Math {
                key,
                raw,
                tex,
                display,
                painted,
            } => {
                let content = painted.clone().unwrap_or_else(|| escape_html(raw));
                if *display {
                    out.push_str(&format!(
                        "<div class=\"math-block-wrap\" data-math-key=\"{}\" data-tex=\"{}\">\
                         <div class=\"math-render\">{content}</div></div>",
                        escape_html(key),
                        escape_html(tex)
                    ));
                } else {
                    out.push_str(&format!(
                        "<span class=\"math-slot\" data-math-key=\"{}\">{content}</span>",
                        escape_html(key)
                    ));
                }
            }
        }
    }
}

/// Open/closed state of each disclosure block, by kind and ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Disclosure {
    reasoning: Vec<bool>,
    tools: Vec<bool>,
}

impl Disclosure {
    fn list(&self, kind: AnnotationKind) -> &[bool] {
        match kind {
            AnnotationKind::Reasoning => &self.reasoning,
            AnnotationKind::Tool => &self.tools,
        }
    }

    fn list_mut(&mut self, kind: AnnotationKind) -> &mut Vec<bool> {
        match kind {
            AnnotationKind::Reasoning => &mut self.reasoning,
            AnnotationKind::Tool => &mut self.tools,
        }
    }

    fn get(&self, kind: AnnotationKind, ordinal: usize) -> Option<bool> {
        self.list(kind).get(ordinal).copied()
    }

    fn close_all(&mut self) {
        self.reasoning.iter_mut().for_each(|open| *open = false);
        self.tools.iter_mut().for_each(|open| *open = false);
    }
}

#[derive(Debug)]
struct MessageBody {
    author: Author,
    source: String,
    fragments: Vec<Fragment>,
    disclosure: Disclosure,
    finalized: bool,
}

/// How block open states are chosen for one composition.
enum Openness<'a> {
    /// Re-resolve from each block's state and the previous pass.
    Resolve(&'a Disclosure),
    /// Reuse these exact states (manual toggles, finalization).
    Fixed(&'a Disclosure),
}

/// Outcome of one render pass.
#[derive(Debug)]
pub struct RenderReport {
    pub message: MessageId,
    pub math_slots: usize,
    /// Slots painted from the cache during the pass.
    pub painted: usize,
    /// Background renders started for uncached keys.
    pub pending: Vec<JoinHandle<()>>,
}

impl RenderReport {
    /// Wait for every background math render started by this pass.
    pub async fn settle(self) {
        for handle in self.pending {
            let _ = handle.await;
        }
    }
}

#[derive(Debug, Default)]
struct TreeInner {
    messages: Vec<MessageBody>,
}

/// Shared, cloneable handle to the rendered conversation.
#[derive(Clone)]
pub struct DocumentTree {
    inner: Arc<RwLock<TreeInner>>,
    cache: Arc<MathCache>,
    renderer: Arc<dyn MathRenderer>,
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentTree {
    /// A tree backed by the process-wide math cache.
    pub fn new() -> Self {
        Self::with_renderer(MathCache::global(), Arc::new(TexSourceRenderer))
    }

    pub fn with_renderer(cache: Arc<MathCache>, renderer: Arc<dyn MathRenderer>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TreeInner::default())),
            cache,
            renderer,
        }
    }

    /// Append a user message, rendered once and final.
    pub async fn push_user(&self, markdown: &str) -> RenderReport {
        let id = self.push(Author::User).await;
        let report = self.render_pass(id, markdown).await;
        if let Some(body) = self.inner.write().await.messages.get_mut(id) {
            body.finalized = true;
        }
        report.unwrap_or_else(|_| RenderReport::empty(id))
    }

    /// Append an empty assistant message to stream into.
    pub async fn push_assistant(&self) -> MessageId {
        self.push(Author::Assistant).await
    }

    async fn push(&self, author: Author) -> MessageId {
        let mut inner = self.inner.write().await;
        inner.messages.push(MessageBody {
            author,
            source: String::new(),
            fragments: Vec::new(),
            disclosure: Disclosure::default(),
            finalized: false,
        });
        inner.messages.len() - 1
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.messages.is_empty()
    }

    /// Re-render a message from its full accumulated text.
    pub async fn render_into(&self, id: MessageId, text: &str) -> Result<RenderReport, RenderError> {
        self.render_pass(id, text).await
    }

    async fn render_pass(&self, id: MessageId, text: &str) -> Result<RenderReport, RenderError> {
        let mut inner = self.inner.write().await;
        let body = inner
            .messages
            .get_mut(id)
            .ok_or(RenderError::UnknownMessage(id))?;

        let previous = std::mem::take(&mut body.disclosure);
        let (fragments, disclosure, segments) = compose(text, Openness::Resolve(&previous), &self.cache);
        body.source = text.to_string();
        body.fragments = fragments;
        body.disclosure = disclosure;

        let painted = count_painted(&body.fragments);
        let pending = self.spawn_math(&segments);

        trace!(message = id, math = segments.len(), painted, "Rendered message");
        Ok(RenderReport {
            message: id,
            math_slots: segments.len(),
            painted,
            pending,
        })
    }

    /// Start a background render for every uncached key in this pass.
    fn spawn_math(&self, segments: &[MathSegment]) -> Vec<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, math stays as source");
            return Vec::new();
        };

        let mut seen = HashSet::new();
        segments
            .iter()
            .filter(|seg| self.cache.get(&seg.key).is_none() && seen.insert(seg.key.clone()))
            .map(|seg| {
                let render = self.cache.request(seg, Arc::clone(&self.renderer));
                let tree = self.clone();
                let key = seg.key.clone();
                runtime.spawn(async move {
                    if let Some(markup) = render.await {
                        tree.paint(&key, &markup).await;
                    }
                })
            })
            .collect()
    }

    /// Paint `markup` into every slot keyed `key`. Returns the slot count.
    pub async fn paint(&self, key: &str, markup: &str) -> usize {
        let mut inner = self.inner.write().await;
        let mut count = 0;
        for body in &mut inner.messages {
            for fragment in &mut body.fragments {
                if let Fragment::Math { key: k, painted, .. } = fragment {
                    if k == key {
                        *painted = Some(markup.to_string());
                        count += 1;
                    }
                }
            }
        }
        count
    }

    /// Record a manual open/close of one block and redraw with it.
    pub async fn set_disclosure(
        &self,
        id: MessageId,
        kind: AnnotationKind,
        ordinal: usize,
        open: bool,
    ) -> Result<(), RenderError> {
        let mut inner = self.inner.write().await;
        let body = inner
            .messages
            .get_mut(id)
            .ok_or(RenderError::UnknownMessage(id))?;

        let list = body.disclosure.list_mut(kind);
        if list.len() <= ordinal {
            list.resize(ordinal + 1, true);
        }
        list[ordinal] = open;
        self.recompose_fixed(body);
        Ok(())
    }

    /// Close every disclosure block in the message and mark it final.
    pub async fn finalize(&self, id: MessageId) -> Result<(), RenderError> {
        let mut inner = self.inner.write().await;
        let body = inner
            .messages
            .get_mut(id)
            .ok_or(RenderError::UnknownMessage(id))?;
        body.disclosure.close_all();
        body.finalized = true;
        self.recompose_fixed(body);
        Ok(())
    }

    /// Finalize whatever was rendered so far and append an error message.
    pub async fn finalize_with_error(&self, id: MessageId, message: &str) -> Result<MessageId, RenderError> {
        self.finalize(id).await?;
        let error_id = self.push(Author::Assistant).await;
        let text = format!("**Error:** {message}");
        self.render_pass(error_id, &text).await?;
        self.finalize(error_id).await?;
        Ok(error_id)
    }

    fn recompose_fixed(&self, body: &mut MessageBody) {
        let (fragments, disclosure, _) = compose(&body.source, Openness::Fixed(&body.disclosure), &self.cache);
        body.fragments = carry_paint(fragments, &body.fragments);
        body.disclosure = disclosure;
    }

    /// Open state of one block as currently rendered.
    pub async fn is_open(&self, id: MessageId, kind: AnnotationKind, ordinal: usize) -> Option<bool> {
        let inner = self.inner.read().await;
        inner.messages.get(id)?.disclosure.get(kind, ordinal)
    }

    /// The inner markup of one message body.
    pub async fn message_html(&self, id: MessageId) -> Option<String> {
        let inner = self.inner.read().await;
        let body = inner.messages.get(id)?;
        let mut out = String::new();
        for fragment in &body.fragments {
            fragment.write_to(&mut out);
        }
        Some(out)
    }

    /// Serialize the whole conversation.
    pub async fn to_html(&self) -> String {
        let inner = self.inner.read().await;
        let mut out = String::from("<div class=\"chat\">\n");
        for (id, body) in inner.messages.iter().enumerate() {
            let finalized = if body.finalized { " finalized" } else { "" };
            out.push_str(&format!(
                "<div class=\"message {}{finalized}\" data-message-id=\"{id}\"><div class=\"msg-body\">",
                body.author.class()
            ));
            for fragment in &body.fragments {
                fragment.write_to(&mut out);
            }
            out.push_str("</div></div>\n");
        }
        out.push_str("</div>\n");
        out
    }
}

impl RenderReport {
    fn empty(message: MessageId) -> Self {
        Self {
            message,
            math_slots: 0,
            painted: 0,
            pending: Vec::new(),
        }
    }
}

fn count_painted(fragments: &[Fragment]) -> usize {
    fragments
        .iter()
        .filter(|f| matches!(f, Fragment::Math { painted: Some(_), .. }))
        .count()
}

/// Keep paint from the previous fragments for keys the cache has not seen
/// (slots painted directly through [`DocumentTree::paint`]).
fn carry_paint(mut fragments: Vec<Fragment>, previous: &[Fragment]) -> Vec<Fragment> {
    for fragment in &mut fragments {
        if let Fragment::Math { key, painted: painted @ None, .. } = fragment {
            *painted = previous.iter().find_map(|p| match p {
                Fragment::Math {
                    key: k,
                    painted: Some(markup),
                    ..
                } if k == key => Some(markup.clone()),
                _ => None,
            });
        }
    }
    fragments
}

// ── Composition ───────────────────────────────────────────────────────────

/// Full pipeline for one body: annotations → math → markdown → blocks → slots.
fn compose(text: &str, openness: Openness<'_>, cache: &MathCache) -> (Vec<Fragment>, Disclosure, Vec<MathSegment>) {
    let annotated = annotation::extract(text);
    let math = math::extract(&annotated.text);
    let mut html = markdown_to_html(&math.text);

    let mut disclosure = Disclosure::default();
    for kind in [AnnotationKind::Tool, AnnotationKind::Reasoning] {
        for (ordinal, segment) in annotated.segments(kind).iter().enumerate() {
            let open = match &openness {
                Openness::Resolve(previous) => {
                    annotation::resolve_open(segment.state.as_ref(), previous.get(kind, ordinal))
                }
                Openness::Fixed(fixed) => fixed.get(kind, ordinal).unwrap_or(true),
            };
            disclosure.list_mut(kind).push(open);
            html = swap_block(&html, &annotation::placeholder(kind, ordinal), &block(segment, open));
        }
    }

    let fragments = split_math(&html, &math.segments, cache);
    (fragments, disclosure, math.segments)
}

fn block(segment: &AnnotationSegment, open: bool) -> String {
    match segment.kind {
        AnnotationKind::Reasoning => annotation::reasoning_block(segment, open),
        AnnotationKind::Tool => annotation::tool_block(segment, open),
    }
}

/// Replace a placeholder with block markup, unwrapping a paragraph that
/// holds nothing else.
fn swap_block(html: &str, placeholder: &str, block: &str) -> String {
    let wrapped = format!("<p>{placeholder}</p>");
    html.replace(&wrapped, block).replace(placeholder, block)
}

fn split_math(html: &str, segments: &[MathSegment], cache: &MathCache) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut rest = html;

    for (ordinal, segment) in segments.iter().enumerate() {
        let placeholder = math::placeholder(ordinal);
        let Some(at) = rest.find(&placeholder) else {
            // Markdown copies placeholder text through verbatim, code spans
            // included, so a miss only happens if a later segment was
            // emitted ahead of this one.
            continue;
        };

        let mut before = &rest[..at];
        let mut after = &rest[at + placeholder.len()..];
        if segment.display && before.ends_with("<p>") && after.starts_with("</p>") {
            before = &before[..before.len() - "<p>".len()];
            after = &after["</p>".len()..];
        }

        if !before.is_empty() {
            fragments.push(Fragment::Html(before.to_string()));
        }
        fragments.push(Fragment::Math {
            key: segment.key.clone(),
            raw: segment.raw.clone(),
            tex: segment.tex.clone(),
            display: segment.display,
            painted: cache.get(&segment.key),
        });
        rest = after;
    }

    if !rest.is_empty() {
        fragments.push(Fragment::Html(rest.to_string()));
    }
    fragments
}
