//! Switching the active selection.
//!
//! Every switch rewrites the active path in one critical section, so a
//! concurrent reader sees either the old selection or the new one, never a
//! mix. `switch_page` is the only operation allowed to wait: the lock is
//! dropped while suspended and re-acquired to recheck on every wakeup.

use std::time::Duration;

use crate::error::{PilothouseError, Result};

use super::ids::{BrowserId, ContextId, PageId};
use super::tree::Catalog;

impl Catalog {
    /// Select the browser at `index` in catalog order. Clears the context
    /// and page selections — they belonged to the previous browser.
    pub async fn switch_browser(&self, index: usize) -> Result<BrowserId> {
        let mut inner = self.inner.lock().await;
        let len = inner.browsers.len();
        let id = inner
            .browsers
            .get(index)
            .map(|b| b.id)
            .ok_or(PilothouseError::IndexOutOfRange { index, len })?;

        inner.active.browser = Some(id);
        inner.active.context = None;
        inner.active.page = None;
        inner.validate_active()?;
        Ok(id)
    }

    /// Select the context at `index` within the active browser. Clears the
    /// page selection.
    pub async fn switch_context(&self, index: usize) -> Result<ContextId> {
        let mut inner = self.inner.lock().await;
        let browser_id = inner
            .active
            .browser
            .ok_or(PilothouseError::NoActiveResource("browser"))?;
        let browser = inner.browser(browser_id).ok_or_else(|| {
            PilothouseError::InternalInconsistency(format!(
                "active path names missing node {browser_id}"
            ))
        })?;

        let len = browser.contexts.len();
        let id = browser
            .contexts
            .get(index)
            .map(|c| c.id)
            .ok_or(PilothouseError::IndexOutOfRange { index, len })?;

        inner.active.context = Some(id);
        inner.active.page = None;
        inner.validate_active()?;
        Ok(id)
    }

    /// Select a page by its wire id (`page-N`), searching every context of
    /// the active browser. If the page is not there yet, wait up to
    /// `timeout` for it to appear — pages open asynchronously through
    /// popups. On success the context selection follows the page's owner.
    pub async fn switch_page(&self, identifier: &str, timeout: Duration) -> Result<PageId> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before the recheck so a page added between
            // the unlock and the await cannot be missed.
            let notified = self.page_added.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock().await;
                let browser_id = inner
                    .active
                    .browser
                    .ok_or(PilothouseError::NoActiveResource("browser"))?;

                if let Some((context_id, page_id)) =
                    inner.find_page_in_browser(browser_id, identifier)
                {
                    inner.active.context = Some(context_id);
                    inner.active.page = Some(page_id);
                    inner.validate_active()?;
                    return Ok(page_id);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(PilothouseError::Timeout(format!(
                    "page {} did not appear within {}ms",
                    identifier,
                    timeout.as_millis()
                )));
            }
        }
    }
}
