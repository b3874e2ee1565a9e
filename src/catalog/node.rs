use crate::config::ContextConfig;
use crate::engine::{BrowserClient, BrowserHandle, ContextClient, PageClient};
use crate::error::{PilothouseError, Result};

use super::ids::{BrowserId, ContextId, PageId};

/// One tracked browser process and everything opened inside it.
///
/// The process handle lives in an `Option` so release can only happen once:
/// whichever close path detaches the node takes the handle out with it.
pub(crate) struct BrowserNode {
    pub id: BrowserId,
    pub handle: Option<BrowserHandle>,
    pub client: BrowserClient,
    pub contexts: Vec<ContextNode>,
    pub alive: bool,
}

impl BrowserNode {
    pub fn new(id: BrowserId, handle: BrowserHandle) -> Self {
        let client = handle.client();
        Self {
            id,
            handle: Some(handle),
            client,
            contexts: Vec::new(),
            alive: true,
        }
    }

    pub fn context(&self, id: ContextId) -> Option<&ContextNode> {
        self.contexts.iter().find(|c| c.id == id)
    }
}

/// One isolated browser context. The back-reference to the owning browser is
/// an id, not an owning edge.
pub(crate) struct ContextNode {
    pub id: ContextId,
    pub browser: BrowserId,
    pub client: ContextClient,
    pub config: ContextConfig,
    pub pages: Vec<PageNode>,
}

impl ContextNode {
    pub fn page(&self, id: PageId) -> Option<&PageNode> {
        self.pages.iter().find(|p| p.id == id)
    }
}

/// One open page. `url` is a best-effort cache refreshed from engine
/// target-info events; the engine stays authoritative.
pub(crate) struct PageNode {
    pub id: PageId,
    pub context: ContextId,
    pub client: PageClient,
    pub url: Option<String>,
    pub alive: bool,
}

/// The current selection at each nesting level.
///
/// Components may be empty top-down (a browser active with no context yet)
/// but a set component always names a live node whose parent is the
/// component above it. Every mutation re-checks this via
/// [`validate`](Self::validate).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ActivePath {
    pub browser: Option<BrowserId>,
    pub context: Option<ContextId>,
    pub page: Option<PageId>,
}

impl ActivePath {
    pub fn clear(&mut self) {
        *self = ActivePath::default();
    }

    /// Check the never-dangling invariant against the current tree.
    pub fn validate(&self, browsers: &[BrowserNode]) -> Result<()> {
        let fail = |what: &str| {
            Err(PilothouseError::InternalInconsistency(format!(
                "active path names {what} absent from the catalog"
            )))
        };

        let browser = match self.browser {
            Some(id) => match browsers.iter().find(|b| b.id == id) {
                Some(node) => node,
                None => return fail("a browser"),
            },
            None => {
                if self.context.is_some() || self.page.is_some() {
                    return fail("a context or page with no browser");
                }
                return Ok(());
            }
        };

        let context = match self.context {
            Some(id) => match browser.context(id) {
                Some(node) => node,
                None => return fail("a context"),
            },
            None => {
                if self.page.is_some() {
                    return fail("a page with no context");
                }
                return Ok(());
            }
        };
        if context.browser != browser.id {
            return fail("a context with a mismatched parent");
        }

        match self.page {
            Some(id) => match context.page(id) {
                Some(node) if node.context == context.id => Ok(()),
                Some(_) => fail("a page with a mismatched parent"),
                None => fail("a page"),
            },
            None => Ok(()),
        }
    }
}
