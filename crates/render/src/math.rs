//! Math segments and the process-wide render cache.
//!
//! Four delimiter conventions are recognised: `$$…$$` and `\[…\]` (display),
//! `$…$` and `\(…\)` (inline). Each match becomes an ordinal placeholder and
//! a key derived from its TeX source plus a display/inline tag, so a formula
//! repeated anywhere in the conversation renders once.

use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::annotation::{PH_CLOSE, PH_OPEN};
use crate::error::RenderError;
use crate::markup::escape_html;
use crate::scan::ForwardFind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSegment {
    pub key: String,
    /// The matched text, delimiters included; shown until a render lands.
    pub raw: String,
    pub tex: String,
    pub display: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MathExtracted {
    pub text: String,
    pub segments: Vec<MathSegment>,
}

/// `m_D_…` for display math, `m_I_…` for inline, then 16 hex digits of
/// the SHA-256 of the TeX source.
pub fn math_key(tex: &str, display: bool) -> String {
    let digest = Sha256::digest(tex.as_bytes());
    let mut key = String::from(if display { "m_D_" } else { "m_I_" });
    for byte in &digest[..8] {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

pub fn placeholder(ordinal: usize) -> String {
    format!("{PH_OPEN}MATH{ordinal}{PH_CLOSE}")
}

/// The four delimiter pairs, in match priority order: (open, close, display).
const DELIMITERS: [(&str, &str, bool); 4] = [
    ("$$", "$$", true),
    ("$", "$", false),
    ("\\[", "\\]", true),
    ("\\(", "\\)", false),
];

/// Per-pass search state: the next occurrence of each closing delimiter.
struct MathScanner {
    closers: [ForwardFind; 4],
}

impl MathScanner {
    fn new() -> Self {
        Self {
            closers: DELIMITERS.map(|(_, close, _)| ForwardFind::new(close)),
        }
    }

    /// Find the span whose opener starts at `at`; returns the TeX content,
    /// the display flag and the offset just past the closer. A failed `$$`
    /// falls back to inline `$`.
    fn span_at<'a>(&mut self, text: &'a str, at: usize) -> Option<(&'a str, bool, usize)> {
        let s = &text[at..];
        for (i, (open, close, display)) in DELIMITERS.iter().copied().enumerate() {
            if !s.starts_with(open) {
                continue;
            }
            let body = at + open.len();
            let span = self.closers[i].next_from(text, body).and_then(|end| {
                let tex = &text[body..end];
                let single_line = open == "$";
                if tex.trim().is_empty() || (single_line && tex.contains('\n')) {
                    None
                } else {
                    Some((tex, display, end + close.len()))
                }
            });
            match span {
                Some(found) => return Some(found),
                None if open == "$$" => continue,
                None => return None,
            }
        }
        None
    }
}

/// Replace complete math spans with placeholders, left to right.
pub fn extract(text: &str) -> MathExtracted {
    let mut out = MathExtracted::default();
    let mut scanner = MathScanner::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find(['$', '\\']) {
        let at = pos + offset;
        out.text.push_str(&text[pos..at]);

        match scanner.span_at(text, at) {
            Some((tex, display, end)) => {
                out.text.push_str(&placeholder(out.segments.len()));
                out.segments.push(MathSegment {
                    key: math_key(tex, display),
                    raw: text[at..end].to_string(),
                    tex: tex.to_string(),
                    display,
                });
                pos = end;
            }
            None => {
                // Both delimiter leads are one byte wide.
                out.text.push_str(&text[at..at + 1]);
                pos = at + 1;
            }
        }
    }

    out.text.push_str(&text[pos..]);
    out
}

// ── Renderer ──────────────────────────────────────────────────────────────

/// Turns TeX into display markup.
#[async_trait]
pub trait MathRenderer: Send + Sync {
    async fn render(&self, tex: &str, display: bool) -> Result<String, RenderError>;
}

/// Emits the TeX source wrapped in MathJax-style delimiters for client-side
/// typesetting. Used when no typesetting engine is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct TexSourceRenderer;

#[async_trait]
impl MathRenderer for TexSourceRenderer {
    async fn render(&self, tex: &str, display: bool) -> Result<String, RenderError> {
        let tex = tex.trim();
        Ok(if display {
            format!("<div class=\"math-tex\">\\[{}\\]</div>", escape_html(tex))
        } else {
            format!("<span class=\"math-tex\">\\({}\\)</span>", escape_html(tex))
        })
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────

pub type RenderFuture = Shared<BoxFuture<'static, Option<String>>>;

/// Key → rendered markup, plus the renders currently running.
///
/// Entries are write-once and never evicted. A key has at most one render
/// in flight; concurrent requests share it.
#[derive(Default)]
pub struct MathCache {
    entries: DashMap<String, String>,
    inflight: DashMap<String, RenderFuture>,
}

static GLOBAL: LazyLock<Arc<MathCache>> = LazyLock::new(|| Arc::new(MathCache::new()));

impl MathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache shared by every document.
    pub fn global() -> Arc<MathCache> {
        Arc::clone(&GLOBAL)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|markup| markup.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Markup for `segment`, rendering it if nobody has yet.
    ///
    /// Resolves to `None` when the renderer fails; the failure is not cached,
    /// so a later pass may try again.
    pub fn request(self: &Arc<Self>, segment: &MathSegment, renderer: Arc<dyn MathRenderer>) -> RenderFuture {
        if let Some(markup) = self.get(&segment.key) {
            return ready(Some(markup));
        }

        match self.inflight.entry(segment.key.clone()) {
            Entry::Occupied(running) => running.get().clone(),
            Entry::Vacant(slot) => {
                // A render may have landed between the lookup and the entry lock.
                if let Some(markup) = self.get(&segment.key) {
                    return ready(Some(markup));
                }

                let cache = Arc::clone(self);
                let key = segment.key.clone();
                let tex = segment.tex.clone();
                let display = segment.display;

                let render = async move {
                    let markup = match renderer.render(&tex, display).await {
                        Ok(markup) => {
                            cache.entries.insert(key.clone(), markup.clone());
                            Some(markup)
                        }
                        Err(e) => {
                            debug!(key = %key, error = %e, "Math render failed");
                            None
                        }
                    };
                    cache.inflight.remove(&key);
                    markup
                }
                .boxed()
                .shared();

                slot.insert(render.clone());
                render
            }
        }
    }
}

fn ready(markup: Option<String>) -> RenderFuture {
    futures::future::ready(markup).boxed().shared()
}
