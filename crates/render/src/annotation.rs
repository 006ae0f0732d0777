//! Inline reasoning / tool annotations.
//!
//! Accumulated text may carry `<think …>…</think>` (or `<reasoning …>…</reasoning>`)
//! and `<tool …>…</tool>` spans. [`extract`] replaces each complete span with an
//! ordinal placeholder in one left-to-right pass; after markdown conversion the
//! placeholders are swapped for collapsible disclosure blocks.
//!
//! An opening tag without its closing tag stays literal text, which keeps
//! half-streamed spans visible until they complete.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::markup::escape_html;
use crate::scan::ForwardFind;

/// Private-use delimiters; they survive markdown conversion untouched.
pub(crate) const PH_OPEN: char = '\u{E000}';
pub(crate) const PH_CLOSE: char = '\u{E001}';

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(id|state|name)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute pattern is hardcoded and must be valid")
});

static TOOL_IO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*INPUT:\s*\n(.*?)\n\s*\nOUTPUT:\s*\n(.*?)\s*$")
        .expect("tool io pattern is hardcoded and must be valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Reasoning,
    Tool,
}

impl AnnotationKind {
    fn label(self) -> &'static str {
        match self {
            Self::Reasoning => "THINK",
            Self::Tool => "TOOL",
        }
    }
}

/// The `state` attribute. Absence is modelled as `None` on the segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationState {
    Live,
    Done,
    Other(String),
}

impl AnnotationState {
    fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "" => None,
            "live" => Some(Self::Live),
            "done" => Some(Self::Done),
            _ => Some(Self::Other(lowered)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Live => "live",
            Self::Done => "done",
            Self::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSegment {
    pub kind: AnnotationKind,
    pub id: Option<String>,
    pub state: Option<AnnotationState>,
    /// Tool name; only meaningful for [`AnnotationKind::Tool`].
    pub name: Option<String>,
    pub inner: String,
}

/// Text with annotation spans replaced by placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    pub reasoning: Vec<AnnotationSegment>,
    pub tools: Vec<AnnotationSegment>,
}

impl Extracted {
    pub fn segments(&self, kind: AnnotationKind) -> &[AnnotationSegment] {
        match kind {
            AnnotationKind::Reasoning => &self.reasoning,
            AnnotationKind::Tool => &self.tools,
        }
    }
}

/// Placeholder text for the `ordinal`-th segment of a kind.
pub fn placeholder(kind: AnnotationKind, ordinal: usize) -> String {
    format!("{PH_OPEN}{}{ordinal}{PH_CLOSE}", kind.label())
}

const FAMILIES: [(&str, &str, AnnotationKind); 3] = [
    ("think", "</think>", AnnotationKind::Reasoning),
    ("reasoning", "</reasoning>", AnnotationKind::Reasoning),
    ("tool", "</tool>", AnnotationKind::Tool),
];

/// Scan `text` once, left to right, pulling out complete annotation spans.
pub fn extract(text: &str) -> Extracted {
    let mut out = Extracted::default();
    let mut scanner = SpanScanner::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('<') {
        let lt = pos + offset;
        out.text.push_str(&text[pos..lt]);

        match scanner.span_at(text, lt) {
            Some((segment, end)) => {
                let list = match segment.kind {
                    AnnotationKind::Reasoning => &mut out.reasoning,
                    AnnotationKind::Tool => &mut out.tools,
                };
                out.text.push_str(&placeholder(segment.kind, list.len()));
                list.push(segment);
                pos = end;
            }
            None => {
                out.text.push('<');
                pos = lt + 1;
            }
        }
    }

    out.text.push_str(&text[pos..]);
    out
}

/// Per-pass search state: where the next `>` and each family's closer are.
struct SpanScanner {
    tag_end: ForwardFind,
    closers: [ForwardFind; 3],
}

impl SpanScanner {
    fn new() -> Self {
        Self {
            tag_end: ForwardFind::new(">"),
            closers: FAMILIES.map(|(_, close, _)| ForwardFind::new(close)),
        }
    }

    /// Try to match one complete span starting at `lt` (a `<`). Returns the
    /// segment and the offset just past its closing tag.
    fn span_at(&mut self, text: &str, lt: usize) -> Option<(AnnotationSegment, usize)> {
        let s = &text[lt..];
        let family = FAMILIES.iter().position(|(tag, _, _)| {
            s[1..].starts_with(tag)
                && s[1 + tag.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| !(c.is_alphanumeric() || c == '_'))
        })?;
        let (tag, close, kind) = FAMILIES[family];

        let open_end = self.tag_end.next_from(text, lt)?;
        let attrs = &text[lt + 1 + tag.len()..open_end];

        let body_start = open_end + 1;
        let inner_end = self.closers[family].next_from(text, body_start)?;
        let inner = &text[body_start..inner_end];
        Some((parse_segment(kind, attrs, inner), inner_end + close.len()))
    }
}

fn parse_segment(kind: AnnotationKind, attrs: &str, inner: &str) -> AnnotationSegment {
    let mut id = None;
    let mut state = None;
    let mut name = None;
    for caps in ATTR_RE.captures_iter(attrs) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let slot = match caps[1].to_ascii_lowercase().as_str() {
            "id" => &mut id,
            "state" => &mut state,
            _ => &mut name,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    AnnotationSegment {
        kind,
        id: id.filter(|v: &String| !v.is_empty()),
        state: state.as_deref().and_then(AnnotationState::parse),
        name: name.filter(|v: &String| !v.is_empty()),
        inner: inner.to_string(),
    }
}

// ── Disclosure blocks ─────────────────────────────────────────────────────

/// Whether a block starts open: `done` closes, any other explicit state
/// opens, and an unspecified state keeps the previous pass's choice.
pub fn resolve_open(state: Option<&AnnotationState>, previous: Option<bool>) -> bool {
    match state {
        Some(AnnotationState::Done) => false,
        Some(_) => true,
        None => previous.unwrap_or(true),
    }
}

fn common_attrs(segment: &AnnotationSegment, open: bool) -> String {
    let mut attrs = String::new();
    if open {
        attrs.push_str(" open");
    }
    if let Some(id) = &segment.id {
        attrs.push_str(&format!(" data-block-id=\"{}\"", escape_html(id)));
    }
    if let Some(state) = &segment.state {
        attrs.push_str(&format!(" data-state=\"{}\"", escape_html(state.as_str())));
    }
    attrs
}

/// Markup for a reasoning span. The inner text is shown verbatim.
pub fn reasoning_block(segment: &AnnotationSegment, open: bool) -> String {
    format!(
        "<details class=\"think-block\"{}><summary>Reasoning</summary>\
         <div class=\"think-content\"><code>{}</code></div></details>",
        common_attrs(segment, open),
        escape_html(segment.inner.trim())
    )
}

/// Split a tool span into its input and output panes. Text without the
/// `INPUT:` / `OUTPUT:` layout is treated as output only.
pub fn split_tool_io(inner: &str) -> (String, String) {
    let raw = inner.trim();
    match TOOL_IO_RE.captures(raw) {
        Some(caps) => (
            caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
            caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
        ),
        None => (String::new(), raw.to_string()),
    }
}

fn tool_pane(pane: &str, title: &str, text: &str) -> String {
    let text = escape_html(text);
    format!(
        "<div class=\"tool-pane\" data-pane=\"{pane}\"><div class=\"tool-pane-head\">\
         <span class=\"tool-pane-title\">{title}</span>\
         <button type=\"button\" class=\"tool-pane-copy\" data-copy=\"{text}\">Copy</button>\
         </div><pre class=\"tool-pane-body\"><code>{text}</code></pre></div>"
    )
}

/// Markup for a tool span, with copyable input and output panes.
pub fn tool_block(segment: &AnnotationSegment, open: bool) -> String {
    let (input, output) = split_tool_io(&segment.inner);
    let name = segment.name.as_deref().unwrap_or("tool");
    format!(
        "<details class=\"tool-block\"{}><summary>Tool: {}</summary>\
         <div class=\"tool-content\"><div class=\"tool-io\">{}{}</div></div></details>",
        common_attrs(segment, open),
        escape_html(name),
        tool_pane("input", "Input", &input),
        tool_pane("output", "Output", &output)
    )
}
