//! Forward search shared by the span extractors.

/// Next-occurrence lookup for one needle over a single left-to-right pass.
///
/// Callers must ask with non-decreasing `from` offsets. A hit at or past
/// `from` is reused without searching, and a miss is final for the rest of
/// the pass, so the whole pass reads each byte at most once per needle.
#[derive(Debug)]
pub(crate) struct ForwardFind {
    needle: &'static str,
    last: Option<Option<usize>>,
}

impl ForwardFind {
    pub(crate) fn new(needle: &'static str) -> Self {
        Self { needle, last: None }
    }

    /// Absolute offset of the first occurrence at or after `from`.
    pub(crate) fn next_from(&mut self, text: &str, from: usize) -> Option<usize> {
        match self.last {
            Some(None) => return None,
            Some(Some(at)) if at >= from => return Some(at),
            _ => {}
        }
        let found = text.get(from..)?.find(self.needle).map(|i| from + i);
        self.last = Some(found);
        found
    }
}
