//! Point-in-time view of the whole catalog, for diagnostics and the
//! `getBrowserCatalog` RPC.

use serde::Serialize;

use super::tree::Catalog;

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub browsers: Vec<BrowserSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowserSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub active: bool,
    pub contexts: Vec<ContextSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub active: bool,
    pub pages: Vec<PageSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Catalog {
    /// Capture the full tree with active markers in one locked pass. Pure
    /// read: no side effects, and concurrent mutations are seen either
    /// entirely or not at all.
    pub async fn snapshot(&self) -> CatalogSnapshot {
        let inner = self.inner.lock().await;
        let active = inner.active;

        CatalogSnapshot {
            browsers: inner
                .browsers
                .iter()
                .map(|browser| BrowserSnapshot {
                    id: browser.id.to_string(),
                    kind: "browser",
                    active: active.browser == Some(browser.id),
                    contexts: browser
                        .contexts
                        .iter()
                        .map(|context| ContextSnapshot {
                            id: context.id.to_string(),
                            kind: "context",
                            active: active.context == Some(context.id),
                            pages: context
                                .pages
                                .iter()
                                .map(|page| PageSnapshot {
                                    id: page.id.to_string(),
                                    kind: "page",
                                    active: active.page == Some(page.id),
                                    url: page.url.clone(),
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testutil::{add_context, add_page, seeded};
    use super::*;
    use crate::catalog::Catalog;
    use crate::engine::{BrowserHandle, PageClient};

    /// Active markers must form one consistent root-to-leaf chain.
    fn assert_well_formed(snapshot: &CatalogSnapshot) {
        let active_browsers: Vec<_> = snapshot.browsers.iter().filter(|b| b.active).collect();
        assert!(active_browsers.len() <= 1);

        for browser in &snapshot.browsers {
            let active_contexts: Vec<_> = browser.contexts.iter().filter(|c| c.active).collect();
            assert!(active_contexts.len() <= 1);
            if !browser.active {
                assert!(active_contexts.is_empty());
            }
            for context in &browser.contexts {
                let active_pages: Vec<_> = context.pages.iter().filter(|p| p.active).collect();
                assert!(active_pages.len() <= 1);
                if !context.active {
                    assert!(active_pages.is_empty());
                }
            }
        }
    }

    #[tokio::test]
    async fn empty_catalog_snapshots_to_empty_tree() {
        let catalog = Catalog::new();
        let snapshot = catalog.snapshot().await;

        assert!(snapshot.browsers.is_empty());
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            serde_json::json!({ "browsers": [] })
        );
    }

    #[tokio::test]
    async fn snapshot_mirrors_nesting_and_active_markers() {
        let (catalog, browser, ctx, page) = seeded().await;
        add_page(&catalog, ctx, "t-2").await;
        add_context(&catalog, browser, "ctx-2").await;
        catalog.add_browser(BrowserHandle::detached()).await.unwrap();

        let snapshot = catalog.snapshot().await;
        assert_well_formed(&snapshot);

        assert_eq!(snapshot.browsers.len(), 2);
        let first = &snapshot.browsers[0];
        assert!(first.active);
        assert_eq!(first.id, browser.to_string());
        assert_eq!(first.contexts.len(), 2);
        assert!(first.contexts[0].active);
        assert!(!first.contexts[1].active);
        assert_eq!(first.contexts[0].pages.len(), 2);
        assert!(first.contexts[0].pages[0].active);
        assert_eq!(first.contexts[0].pages[0].id, page.to_string());
        assert!(!snapshot.browsers[1].active);
    }

    #[tokio::test]
    async fn snapshot_serializes_with_type_tags() {
        let (catalog, _, _, _) = seeded().await;
        catalog.update_page_url("t-1", "https://example.com/").await;

        let json = serde_json::to_value(catalog.snapshot().await).unwrap();
        let browser = &json["browsers"][0];
        assert_eq!(browser["type"], "browser");
        assert_eq!(browser["contexts"][0]["type"], "context");
        let page = &browser["contexts"][0]["pages"][0];
        assert_eq!(page["type"], "page");
        assert_eq!(page["url"], "https://example.com/");
        assert_eq!(page["active"], true);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn snapshot_never_sees_a_half_linked_node() {
        let (catalog, _, ctx, _) = seeded().await;
        let catalog = Arc::new(catalog);

        let adder = {
            let catalog = catalog.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    catalog
                        .add_page(ctx, PageClient::detached(&format!("t-add-{i}")), None)
                        .await
                        .unwrap();
                }
            })
        };

        let mut last_count = 1;
        while !adder.is_finished() {
            let snapshot = catalog.snapshot().await;
            assert_well_formed(&snapshot);

            let count = snapshot.browsers[0].contexts[0].pages.len();
            // Page count only grows, one fully-linked page at a time
            assert!(count >= last_count);
            last_count = count;
        }
        adder.await.unwrap();

        assert_eq!(catalog.snapshot().await.browsers[0].contexts[0].pages.len(), 51);
    }
}
