//! The session catalog: every browser, context, and page this server has
//! opened, plus the single active selection at each level.
//!
//! One mutex guards the tree and the active path together — the
//! never-dangling invariant spans both, so they change under the same
//! critical section. Engine I/O never runs while the lock is held.

use tokio::sync::{Mutex, Notify};

use crate::config::ContextConfig;
use crate::engine::{BrowserClient, BrowserHandle, ContextClient, PageClient};
use crate::error::{PilothouseError, Result};

use super::ids::{BrowserId, ContextId, PageId};
use super::node::{ActivePath, BrowserNode, ContextNode, PageNode};

pub struct Catalog {
    pub(super) inner: Mutex<CatalogInner>,
    /// Woken whenever a page joins the catalog; switch-page waits on this.
    pub(super) page_added: Notify,
}

pub(super) struct CatalogInner {
    pub browsers: Vec<BrowserNode>,
    pub active: ActivePath,
    next_id: u64,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CatalogInner {
                browsers: Vec::new(),
                active: ActivePath::default(),
                next_id: 1,
            }),
            page_added: Notify::new(),
        }
    }

    /// Track a freshly launched browser. It becomes the active browser only
    /// if none is active; context and page selections are never touched.
    pub async fn add_browser(&self, handle: BrowserHandle) -> Result<BrowserId> {
        let mut inner = self.inner.lock().await;
        let id = BrowserId(inner.next_id());
        inner.browsers.push(BrowserNode::new(id, handle));
        if inner.active.browser.is_none() {
            inner.active.browser = Some(id);
        }
        inner.validate_active()?;
        Ok(id)
    }

    /// Track a context created inside `browser_id`. Becomes the active
    /// context only if its parent is the active browser and no context is
    /// selected under it yet.
    pub async fn add_context(
        &self,
        browser_id: BrowserId,
        client: ContextClient,
        config: ContextConfig,
    ) -> Result<ContextId> {
        let mut inner = self.inner.lock().await;
        let id = ContextId(inner.next_id());

        let active_browser = inner.active.browser;
        let browser = inner
            .browser_mut(browser_id)
            .filter(|b| b.alive)
            .ok_or_else(|| PilothouseError::NotFound(browser_id.to_string()))?;
        browser.contexts.push(ContextNode {
            id,
            browser: browser_id,
            client,
            config,
            pages: Vec::new(),
        });

        if active_browser == Some(browser_id) && inner.active.context.is_none() {
            inner.active.context = Some(id);
        }
        inner.validate_active()?;
        Ok(id)
    }

    /// Track a page attached inside `context_id`. Becomes the active page
    /// only if its parent is the active context and no page is selected
    /// under it yet. Wakes any switch-page waiters.
    pub async fn add_page(
        &self,
        context_id: ContextId,
        client: PageClient,
        url: Option<String>,
    ) -> Result<PageId> {
        let id = {
            let mut inner = self.inner.lock().await;
            let id = PageId(inner.next_id());

            let active_context = inner.active.context;
            let Some((b, c)) = inner.locate_context(context_id) else {
                return Err(PilothouseError::NotFound(context_id.to_string()));
            };
            inner.browsers[b].contexts[c].pages.push(PageNode {
                id,
                context: context_id,
                client,
                url,
                alive: true,
            });

            if active_context == Some(context_id) && inner.active.page.is_none() {
                inner.active.page = Some(id);
            }
            inner.validate_active()?;
            id
        };

        self.page_added.notify_waiters();
        Ok(id)
    }

    /// The active browser, or `NoActiveResource`.
    pub async fn active_browser(&self) -> Result<(BrowserId, BrowserClient)> {
        let inner = self.inner.lock().await;
        let id = inner
            .active
            .browser
            .ok_or(PilothouseError::NoActiveResource("browser"))?;
        let node = inner.browser(id).ok_or_else(|| dangling(id))?;
        Ok((id, node.client.clone()))
    }

    /// The active context with the configuration it was created from.
    pub async fn active_context(&self) -> Result<(ContextId, ContextClient, ContextConfig)> {
        let inner = self.inner.lock().await;
        let id = inner
            .active
            .context
            .ok_or(PilothouseError::NoActiveResource("context"))?;
        let (b, c) = inner.locate_context(id).ok_or_else(|| dangling(id))?;
        let node = &inner.browsers[b].contexts[c];
        Ok((id, node.client.clone(), node.config.clone()))
    }

    /// The active page, or `NoActiveResource`.
    pub async fn active_page(&self) -> Result<(PageId, PageClient)> {
        let inner = self.inner.lock().await;
        let id = inner
            .active
            .page
            .ok_or(PilothouseError::NoActiveResource("page"))?;
        let (b, c, p) = inner.locate_page(id).ok_or_else(|| dangling(id))?;
        let node = &inner.browsers[b].contexts[c].pages[p];
        if !node.alive {
            return Err(dangling(id));
        }
        Ok((id, node.client.clone()))
    }

    /// Whether an engine target is already tracked. Used to coalesce
    /// explicit page creation with engine target-created events.
    pub async fn contains_target(&self, target_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.find_target(target_id).is_some()
    }

    /// Refresh a page's cached URL from an engine target-info event.
    pub async fn update_page_url(&self, target_id: &str, url: &str) {
        let mut inner = self.inner.lock().await;
        if let Some((b, c, p)) = inner.find_target(target_id) {
            inner.browsers[b].contexts[c].pages[p].url = Some(url.to_string());
        }
    }

    /// Map an engine context id back to a tracked context of `browser_id`.
    pub async fn resolve_context(
        &self,
        browser_id: BrowserId,
        engine_context_id: Option<&str>,
    ) -> Option<(ContextId, ContextClient)> {
        let engine_context_id = engine_context_id?;
        let inner = self.inner.lock().await;
        let browser = inner.browser(browser_id)?;
        browser
            .contexts
            .iter()
            .find(|c| c.client.context_id() == engine_context_id)
            .map(|c| (c.id, c.client.clone()))
    }

    /// Ids of all tracked browsers, in creation order.
    pub async fn browser_ids(&self) -> Vec<BrowserId> {
        let inner = self.inner.lock().await;
        inner.browsers.iter().map(|b| b.id).collect()
    }

    /// Total number of tracked nodes, for diagnostics.
    pub async fn len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .browsers
            .iter()
            .map(|b| 1 + b.contexts.iter().map(|c| 1 + c.pages.len()).sum::<usize>())
            .sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.browsers.is_empty()
    }
}

fn dangling(id: impl std::fmt::Display) -> PilothouseError {
    PilothouseError::InternalInconsistency(format!("active path names missing node {id}"))
}

impl CatalogInner {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn browser(&self, id: BrowserId) -> Option<&BrowserNode> {
        self.browsers.iter().find(|b| b.id == id)
    }

    pub fn browser_mut(&mut self, id: BrowserId) -> Option<&mut BrowserNode> {
        self.browsers.iter_mut().find(|b| b.id == id)
    }

    pub fn locate_context(&self, id: ContextId) -> Option<(usize, usize)> {
        self.browsers.iter().enumerate().find_map(|(b, browser)| {
            browser
                .contexts
                .iter()
                .position(|c| c.id == id)
                .map(|c| (b, c))
        })
    }

    pub fn locate_page(&self, id: PageId) -> Option<(usize, usize, usize)> {
        self.browsers.iter().enumerate().find_map(|(b, browser)| {
            browser.contexts.iter().enumerate().find_map(|(c, context)| {
                context.pages.iter().position(|p| p.id == id).map(|p| (b, c, p))
            })
        })
    }

    pub fn find_target(&self, target_id: &str) -> Option<(usize, usize, usize)> {
        self.browsers.iter().enumerate().find_map(|(b, browser)| {
            browser.contexts.iter().enumerate().find_map(|(c, context)| {
                context
                    .pages
                    .iter()
                    .position(|p| p.client.target_id() == target_id)
                    .map(|p| (b, c, p))
            })
        })
    }

    /// Find a page by wire id within one browser, across its contexts.
    pub fn find_page_in_browser(
        &self,
        browser_id: BrowserId,
        identifier: &str,
    ) -> Option<(ContextId, PageId)> {
        let browser = self.browser(browser_id)?;
        for context in &browser.contexts {
            for page in &context.pages {
                if page.alive && page.id.to_string() == identifier {
                    return Some((page.context, page.id));
                }
            }
        }
        None
    }

    pub fn validate_active(&self) -> Result<()> {
        self.active.validate(&self.browsers)
    }
}
