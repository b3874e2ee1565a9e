use std::fmt;

/// Identifier of a tracked browser process.
///
/// Ids are assigned from a per-catalog monotonic counter and rendered as
/// `browser-N` at the RPC boundary. They are never reused, so a stale id
/// from a closed resource can only miss, not alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrowserId(pub(crate) u64);

/// Identifier of a browser context within a tracked browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) u64);

/// Identifier of a page within a tracked context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(pub(crate) u64);

impl fmt::Display for BrowserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "browser-{}", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page-{}", self.0)
    }
}

impl BrowserId {
    /// Parse a `browser-N` wire string
    pub fn parse(s: &str) -> Option<Self> {
        s.strip_prefix("browser-")?.parse().ok().map(BrowserId)
    }
}

impl ContextId {
    /// Parse a `context-N` wire string
    pub fn parse(s: &str) -> Option<Self> {
        s.strip_prefix("context-")?.parse().ok().map(ContextId)
    }
}

impl PageId {
    /// Parse a `page-N` wire string
    pub fn parse(s: &str) -> Option<Self> {
        s.strip_prefix("page-")?.parse().ok().map(PageId)
    }
}
