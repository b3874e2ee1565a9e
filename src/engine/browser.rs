use std::time::Duration;

use serde_json::{json, Value};
use tokio::process::Child;

use crate::config::ContextConfig;
use crate::error::{PilothouseError, Result};

use super::cdp::CdpConnection;
use super::page::PageClient;

/// Owned handle to one browser process: the OS child plus its CDP
/// connection. Lives inside the catalog; [`shutdown`](Self::shutdown)
/// consumes it, so release cannot happen twice.
pub struct BrowserHandle {
    child: Option<Child>,
    conn: CdpConnection,
    cdp_port: u16,
}

impl BrowserHandle {
    pub fn new(child: Option<Child>, conn: CdpConnection, cdp_port: u16) -> Self {
        Self {
            child,
            conn,
            cdp_port,
        }
    }

    /// Cheap engine-facing view handed out by the catalog.
    pub fn client(&self) -> BrowserClient {
        BrowserClient {
            conn: self.conn.clone(),
        }
    }

    pub fn cdp_port(&self) -> u16 {
        self.cdp_port
    }

    /// Ask the engine to close, then reap the process. Errors are expected
    /// when the browser already died; the handle is spent either way.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.conn.call("Browser.close", json!({})).await {
            tracing::debug!("Browser.close: {}", e);
        }
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(Duration::from_secs(3), child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::debug!("browser on port {} did not exit, killing", self.cdp_port);
                    let _ = child.kill().await;
                }
            }
        }
    }

    /// A handle with no process and a dead connection, for catalog tests.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            child: None,
            conn: CdpConnection::disconnected(),
            cdp_port: 0,
        }
    }
}

/// Clonable view of a browser used for context creation.
#[derive(Clone)]
pub struct BrowserClient {
    conn: CdpConnection,
}

impl BrowserClient {
    /// Create an isolated browser context and grant its configured
    /// permissions.
    pub async fn create_context(&self, config: &ContextConfig) -> Result<ContextClient> {
        let result = self
            .conn
            .call(
                "Target.createBrowserContext",
                json!({ "disposeOnDetach": false }),
            )
            .await?;
        let context_id = result
            .get("browserContextId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PilothouseError::CdpError("createBrowserContext returned no id".to_string())
            })?
            .to_string();

        if !config.permissions.is_empty() {
            self.conn
                .call(
                    "Browser.grantPermissions",
                    json!({
                        "browserContextId": context_id,
                        "permissions": config.permissions,
                    }),
                )
                .await?;
        }

        Ok(ContextClient {
            conn: self.conn.clone(),
            context_id,
        })
    }

    /// Enable target discovery so the connection reports created and
    /// destroyed targets. Called once right after attach.
    pub async fn enable_target_events(&self) -> Result<()> {
        self.conn
            .call("Target.setDiscoverTargets", json!({ "discover": true }))
            .await?;
        Ok(())
    }
}

/// Clonable view of one browser context.
#[derive(Clone)]
pub struct ContextClient {
    conn: CdpConnection,
    context_id: String,
}

impl ContextClient {
    /// Engine-side context identifier.
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Open a page in this context and attach to it.
    pub async fn create_page(&self, url: &str) -> Result<PageClient> {
        let result = self
            .conn
            .call(
                "Target.createTarget",
                json!({ "url": url, "browserContextId": self.context_id }),
            )
            .await?;
        let target_id = result
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| PilothouseError::CdpError("createTarget returned no id".to_string()))?
            .to_string();

        self.attach(&target_id).await
    }

    /// Attach to an existing target (e.g. a popup) with a flattened session.
    pub async fn attach(&self, target_id: &str) -> Result<PageClient> {
        let result = self
            .conn
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PilothouseError::CdpError("attachToTarget returned no session".to_string())
            })?
            .to_string();

        Ok(PageClient::new(
            self.conn.clone(),
            target_id.to_string(),
            session_id,
        ))
    }

    /// Tear the context down engine-side. Pages inside it die with it.
    pub async fn dispose(&self) -> Result<()> {
        self.conn
            .call(
                "Target.disposeBrowserContext",
                json!({ "browserContextId": self.context_id }),
            )
            .await?;
        Ok(())
    }

    /// All cookies visible to this context.
    pub async fn cookies(&self) -> Result<Value> {
        let result = self
            .conn
            .call(
                "Storage.getCookies",
                json!({ "browserContextId": self.context_id }),
            )
            .await?;
        Ok(result.get("cookies").cloned().unwrap_or_else(|| json!([])))
    }

    /// Set one cookie. `cookie` follows the CDP cookie parameter shape
    /// (name, value, and either url or domain/path).
    pub async fn set_cookie(&self, cookie: Value) -> Result<()> {
        self.conn
            .call(
                "Storage.setCookies",
                json!({ "cookies": [cookie], "browserContextId": self.context_id }),
            )
            .await?;
        Ok(())
    }

    pub async fn clear_cookies(&self) -> Result<()> {
        self.conn
            .call(
                "Storage.clearCookies",
                json!({ "browserContextId": self.context_id }),
            )
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn detached(context_id: &str) -> Self {
        Self {
            conn: CdpConnection::disconnected(),
            context_id: context_id.to_string(),
        }
    }
}
