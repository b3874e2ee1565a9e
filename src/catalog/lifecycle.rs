//! Close operations and out-of-band death handling.
//!
//! Explicit closes and engine-reported closes funnel into the same detach
//! routines, so a node is removed at most once no matter which path gets
//! there first. Detach and active-path repair happen under the catalog
//! lock; engine release runs afterwards on handles taken out of the nodes.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::{EngineEvent, PageClient};
use crate::error::Result;

use super::ids::{BrowserId, ContextId, PageId};
use super::node::{BrowserNode, ContextNode, PageNode};
use super::tree::{Catalog, CatalogInner};

impl Catalog {
    /// Close one page. Closing an id that is already gone is success — the
    /// resource being absent is the desired end state.
    pub async fn close_page(&self, id: PageId) -> Result<()> {
        let detached = {
            let mut inner = self.inner.lock().await;
            let node = inner.detach_page(id);
            inner.validate_active()?;
            node
        };

        if let Some(page) = detached {
            release_page(&page.client).await;
        }
        Ok(())
    }

    /// Close one context and everything inside it.
    pub async fn close_context(&self, id: ContextId) -> Result<()> {
        let detached = {
            let mut inner = self.inner.lock().await;
            let node = inner.detach_context(id);
            inner.validate_active()?;
            node
        };

        if let Some(context) = detached {
            for page in &context.pages {
                release_page(&page.client).await;
            }
            if let Err(e) = context.client.dispose().await {
                tracing::debug!("context {} dispose: {}", context.client.context_id(), e);
            }
        }
        Ok(())
    }

    /// Close one browser and its whole subtree. If it was the active
    /// browser the entire active path empties; no other browser is promoted
    /// — redirecting calls to a different browser silently would be a
    /// correctness hazard for the calling test.
    pub async fn close_browser(&self, id: BrowserId) -> Result<()> {
        let detached = {
            let mut inner = self.inner.lock().await;
            let node = inner.detach_browser(id);
            inner.validate_active()?;
            node
        };

        if let Some(mut browser) = detached {
            if let Some(handle) = browser.handle.take() {
                handle.shutdown().await;
            }
        }
        Ok(())
    }

    /// Close every browser. No-op on an empty catalog.
    pub async fn close_all_browsers(&self) -> Result<()> {
        for id in self.browser_ids().await {
            self.close_browser(id).await?;
        }
        Ok(())
    }

    /// Engine reported a page died without an explicit close. Unknown
    /// targets are ignored — the explicit close already won the race.
    pub async fn notify_page_closed(&self, target_id: &str) {
        let mut inner = self.inner.lock().await;
        let id = match inner.find_target(target_id) {
            Some((b, c, p)) => Some(inner.browsers[b].contexts[c].pages[p].id),
            None => None,
        };
        if let Some(id) = id {
            let _ = inner.detach_page(id);
            if let Err(e) = inner.validate_active() {
                tracing::error!("after external page close: {}", e);
            }
        }
    }

    /// Engine connection died — the browser process is gone. The engine
    /// side needs no release beyond reaping the child.
    pub async fn notify_browser_closed(&self, id: BrowserId) {
        let detached = {
            let mut inner = self.inner.lock().await;
            let node = inner.detach_browser(id);
            if let Err(e) = inner.validate_active() {
                tracing::error!("after external browser close: {}", e);
            }
            node
        };

        if let Some(mut browser) = detached {
            if let Some(handle) = browser.handle.take() {
                handle.shutdown().await;
            }
        }
    }

    /// Track a page the engine opened on its own (popup, `window.open`).
    /// Returns `None` when the target is already tracked.
    pub async fn ingest_page(
        &self,
        context_id: ContextId,
        client: PageClient,
        url: Option<String>,
    ) -> Result<Option<PageId>> {
        {
            let inner = self.inner.lock().await;
            if inner.find_target(client.target_id()).is_some() {
                return Ok(None);
            }
        }
        self.add_page(context_id, client, url).await.map(Some)
    }
}

async fn release_page(page: &PageClient) {
    if let Err(e) = page.close().await {
        tracing::debug!("page {} close: {}", page.target_id(), e);
    }
}

/// Translate one browser's engine events into catalog updates. Runs until
/// the connection dies; connection loss is treated as the browser closing
/// out-of-band.
pub fn spawn_event_pump(
    catalog: Arc<Catalog>,
    browser_id: BrowserId,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::TargetCreated {
                    target_id,
                    kind,
                    url,
                    browser_context_id,
                    opener_id,
                } => {
                    // Only pages the engine opened on its own. Explicitly
                    // created targets have no opener and are tracked by
                    // their caller.
                    if kind != "page" || opener_id.is_none() {
                        continue;
                    }
                    let Some((context_id, context)) = catalog
                        .resolve_context(browser_id, browser_context_id.as_deref())
                        .await
                    else {
                        continue;
                    };
                    if catalog.contains_target(&target_id).await {
                        continue;
                    }
                    match context.attach(&target_id).await {
                        Ok(page) => {
                            let url = (!url.is_empty()).then_some(url);
                            if let Err(e) = catalog.ingest_page(context_id, page, url).await {
                                tracing::debug!("popup {} not tracked: {}", target_id, e);
                            }
                        }
                        Err(e) => {
                            tracing::debug!("attach to popup {} failed: {}", target_id, e);
                        }
                    }
                }
                EngineEvent::TargetDestroyed { target_id } => {
                    catalog.notify_page_closed(&target_id).await;
                }
                EngineEvent::TargetInfoChanged { target_id, url } => {
                    catalog.update_page_url(&target_id, &url).await;
                }
                EngineEvent::ConnectionLost => {
                    tracing::info!("{} engine connection lost", browser_id);
                    catalog.notify_browser_closed(browser_id).await;
                    break;
                }
            }
        }
    })
}

impl CatalogInner {
    pub(super) fn detach_page(&mut self, id: PageId) -> Option<PageNode> {
        let (b, c, p) = self.locate_page(id)?;
        let mut node = self.browsers[b].contexts[c].pages.remove(p);
        node.alive = false;
        if self.active.page == Some(id) {
            self.active.page = None;
        }
        Some(node)
    }

    pub(super) fn detach_context(&mut self, id: ContextId) -> Option<ContextNode> {
        let (b, c) = self.locate_context(id)?;
        let node = self.browsers[b].contexts.remove(c);
        // Pages of this context can only be active while the context is
        if self.active.context == Some(id) {
            self.active.context = None;
            self.active.page = None;
        }
        Some(node)
    }

    pub(super) fn detach_browser(&mut self, id: BrowserId) -> Option<BrowserNode> {
        let pos = self.browsers.iter().position(|b| b.id == id)?;
        let mut node = self.browsers.remove(pos);
        node.alive = false;
        if self.active.browser == Some(id) {
            self.active.clear();
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{add_context, add_page, seeded};
    use super::*;
    use crate::engine::BrowserHandle;
    use crate::error::PilothouseError;

    #[tokio::test]
    async fn closing_a_page_clears_only_the_page_component() {
        let (catalog, _, _, page) = seeded().await;

        catalog.close_page(page).await.unwrap();

        assert!(matches!(
            catalog.active_page().await,
            Err(PilothouseError::NoActiveResource("page"))
        ));
        assert!(catalog.active_context().await.is_ok());
        assert!(catalog.active_browser().await.is_ok());
    }

    #[tokio::test]
    async fn close_page_is_idempotent() {
        let (catalog, _, _, page) = seeded().await;

        catalog.close_page(page).await.unwrap();
        catalog.close_page(page).await.unwrap();
        catalog.close_page(PageId(999)).await.unwrap();
    }

    #[tokio::test]
    async fn closing_a_context_clears_context_and_page() {
        let (catalog, _, ctx, _) = seeded().await;
        add_page(&catalog, ctx, "t-2").await;

        catalog.close_context(ctx).await.unwrap();

        assert!(catalog.active_context().await.is_err());
        assert!(catalog.active_page().await.is_err());
        assert!(catalog.active_browser().await.is_ok());
        assert_eq!(catalog.len().await, 1); // just the browser
    }

    #[tokio::test]
    async fn closing_a_browser_removes_the_whole_subtree() {
        let (catalog, browser, ctx, _) = seeded().await;
        add_page(&catalog, ctx, "t-2").await;
        let other_ctx = add_context(&catalog, browser, "ctx-2").await;
        add_page(&catalog, other_ctx, "t-3").await;

        assert_eq!(catalog.len().await, 6);
        catalog.close_browser(browser).await.unwrap();
        assert_eq!(catalog.len().await, 0);
    }

    #[tokio::test]
    async fn closing_the_active_browser_promotes_nothing() {
        let (catalog, browser, _, _) = seeded().await;
        catalog.add_browser(BrowserHandle::detached()).await.unwrap();

        catalog.close_browser(browser).await.unwrap();

        // The other browser is still in the catalog but not active
        assert_eq!(catalog.browser_ids().await.len(), 1);
        assert!(matches!(
            catalog.active_browser().await,
            Err(PilothouseError::NoActiveResource("browser"))
        ));
    }

    #[tokio::test]
    async fn closing_an_inactive_browser_leaves_the_selection_alone() {
        let (catalog, active, _, _) = seeded().await;
        let other = catalog.add_browser(BrowserHandle::detached()).await.unwrap();

        catalog.close_browser(other).await.unwrap();

        let (still_active, _) = catalog.active_browser().await.unwrap();
        assert_eq!(still_active, active);
        assert!(catalog.active_page().await.is_ok());
    }

    #[tokio::test]
    async fn close_all_browsers_empties_catalog_and_path() {
        let (catalog, _, _, _) = seeded().await;
        let second = catalog.add_browser(BrowserHandle::detached()).await.unwrap();
        let ctx = add_context(&catalog, second, "ctx-b").await;
        add_page(&catalog, ctx, "t-b").await;

        catalog.close_all_browsers().await.unwrap();

        assert!(catalog.is_empty().await);
        assert!(catalog.active_browser().await.is_err());
        assert!(catalog.active_context().await.is_err());
        assert!(catalog.active_page().await.is_err());

        // And again on the already-empty catalog
        catalog.close_all_browsers().await.unwrap();
    }

    #[tokio::test]
    async fn external_page_close_repairs_the_active_path() {
        let (catalog, _, _, _) = seeded().await;

        catalog.notify_page_closed("t-1").await;

        assert!(catalog.active_page().await.is_err());
        assert!(catalog.active_context().await.is_ok());
    }

    #[tokio::test]
    async fn external_close_of_unknown_target_is_ignored() {
        let (catalog, _, _, page) = seeded().await;

        catalog.notify_page_closed("t-unknown").await;

        let (active, _) = catalog.active_page().await.unwrap();
        assert_eq!(active, page);
    }

    #[tokio::test]
    async fn external_close_coalesces_with_explicit_close() {
        let (catalog, _, _, page) = seeded().await;

        catalog.close_page(page).await.unwrap();
        catalog.notify_page_closed("t-1").await;

        assert_eq!(catalog.len().await, 2);
    }

    #[tokio::test]
    async fn external_browser_close_empties_the_path() {
        let (catalog, browser, _, _) = seeded().await;

        catalog.notify_browser_closed(browser).await;

        assert!(catalog.is_empty().await);
        assert!(catalog.active_browser().await.is_err());
    }

    #[tokio::test]
    async fn ingest_page_deduplicates_by_target() {
        let (catalog, _, ctx, _) = seeded().await;

        let duplicate = catalog
            .ingest_page(ctx, PageClient::detached("t-1"), None)
            .await
            .unwrap();
        assert!(duplicate.is_none());

        let fresh = catalog
            .ingest_page(ctx, PageClient::detached("t-popup"), Some("about:blank".into()))
            .await
            .unwrap();
        assert!(fresh.is_some());
        assert_eq!(catalog.len().await, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn external_close_racing_get_active_never_dangles() {
        for _ in 0..100 {
            let (catalog, _, _, _) = seeded().await;
            let catalog = Arc::new(catalog);

            let closer = {
                let catalog = catalog.clone();
                tokio::spawn(async move { catalog.notify_page_closed("t-1").await })
            };
            let reader = {
                let catalog = catalog.clone();
                tokio::spawn(async move { catalog.active_page().await })
            };

            closer.await.unwrap();
            // Either the page was still tracked, or the reader saw a clean miss;
            // a dangling handle surfaces as InternalInconsistency and fails here.
            match reader.await.unwrap() {
                Ok(_) | Err(PilothouseError::NoActiveResource(_)) => {}
                Err(e) => panic!("reader observed {e}"),
            }

            assert!(catalog.active_page().await.is_err());
        }
    }

    #[tokio::test]
    async fn event_pump_removes_destroyed_targets() {
        let (catalog, browser, _, _) = seeded().await;
        let catalog = Arc::new(catalog);

        let (tx, rx) = mpsc::unbounded_channel();
        let pump = spawn_event_pump(catalog.clone(), browser, rx);

        tx.send(EngineEvent::TargetInfoChanged {
            target_id: "t-1".into(),
            url: "https://example.com/a".into(),
        })
        .unwrap();
        tx.send(EngineEvent::TargetDestroyed {
            target_id: "t-1".into(),
        })
        .unwrap();
        tx.send(EngineEvent::ConnectionLost).unwrap();

        pump.await.unwrap();

        assert!(catalog.is_empty().await);
        assert!(catalog.active_browser().await.is_err());
    }
}
