use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};

use crate::config::{ContextConfig, Viewport};
use crate::error::{PilothouseError, Result};

use super::cdp::CdpConnection;

/// Clonable view of one attached page target. Every operation is a single
/// session-scoped CDP call (or a short fixed sequence of them); the catalog
/// decides which page these land on.
#[derive(Clone)]
pub struct PageClient {
    conn: CdpConnection,
    target_id: String,
    session_id: String,
}

impl PageClient {
    pub fn new(conn: CdpConnection, target_id: String, session_id: String) -> Self {
        Self {
            conn,
            target_id,
            session_id,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    async fn command(&self, method: &str, params: Value) -> Result<Value> {
        self.conn
            .call_in_session(&self.session_id, method, params)
            .await
    }

    /// Apply the owning context's capability set to this page.
    pub async fn apply_config(&self, config: &ContextConfig) -> Result<()> {
        if let Some(Viewport { width, height }) = config.viewport {
            self.command(
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": width,
                    "height": height,
                    "deviceScaleFactor": 1,
                    "mobile": false,
                }),
            )
            .await?;
        }
        if let Some(ref locale) = config.locale {
            self.command("Emulation.setLocaleOverride", json!({ "locale": locale }))
                .await?;
        }
        if let Some(ref timezone) = config.timezone_id {
            self.command(
                "Emulation.setTimezoneOverride",
                json!({ "timezoneId": timezone }),
            )
            .await?;
        }
        if let Some(ref user_agent) = config.user_agent {
            self.command(
                "Network.setUserAgentOverride",
                json!({ "userAgent": user_agent }),
            )
            .await?;
        }
        if !config.java_script_enabled {
            self.command(
                "Emulation.setScriptExecutionDisabled",
                json!({ "value": true }),
            )
            .await?;
        }
        Ok(())
    }

    /// Close the target. Fails harmlessly when the page is already gone.
    pub async fn close(&self) -> Result<()> {
        self.conn
            .call("Target.closeTarget", json!({ "targetId": self.target_id }))
            .await?;
        Ok(())
    }

    /// Navigate and report the engine's navigation error, if any.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let result = self.command("Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            if !error_text.is_empty() {
                return Err(PilothouseError::CdpError(format!(
                    "navigation to {url} failed: {error_text}"
                )));
            }
        }
        Ok(())
    }

    pub async fn reload(&self) -> Result<()> {
        self.command("Page.reload", json!({})).await?;
        Ok(())
    }

    /// Go back in history; no-op at the start of history.
    pub async fn go_back(&self) -> Result<()> {
        self.navigate_history(-1).await
    }

    /// Go forward in history; no-op at the end of history.
    pub async fn go_forward(&self) -> Result<()> {
        self.navigate_history(1).await
    }

    async fn navigate_history(&self, delta: i64) -> Result<()> {
        let history = self
            .command("Page.getNavigationHistory", json!({}))
            .await?;
        let current = history
            .get("currentIndex")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let entries = history.get("entries").and_then(Value::as_array);

        if let Some(entries) = entries {
            let target = current + delta;
            if target >= 0 {
                if let Some(entry) = entries.get(target as usize) {
                    if let Some(entry_id) = entry.get("id").and_then(Value::as_i64) {
                        self.command(
                            "Page.navigateToHistoryEntry",
                            json!({ "entryId": entry_id }),
                        )
                        .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate an expression and return its value.
    pub async fn eval(&self, expression: &str) -> Result<Value> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let message = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| exception.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("JavaScript exception");
            return Err(PilothouseError::JavaScriptError(message.to_string()));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    pub async fn url(&self) -> Result<String> {
        let value = self.eval("document.location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn title(&self) -> Result<String> {
        let value = self.eval("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// JavaScript that defines `__findElement(selector)`, resolving CSS
    /// selectors and XPath expressions (leading `//`).
    fn find_element_js() -> &'static str {
        r#"
        function __findElement(selector) {
            if (selector.startsWith('//') || selector.startsWith('(//')) {
                const result = document.evaluate(
                    selector, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
                return result.singleNodeValue;
            }
            return document.querySelector(selector);
        }
        "#
    }

    /// Scroll an element into view and return its center coordinates.
    async fn element_center(&self, selector: &str) -> Result<(f64, f64)> {
        let selector_json = serde_json::to_string(selector)?;
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("const el = __findElement({selector_json});"),
            "if (!el) return null;",
            "el.scrollIntoView({ behavior: 'instant', block: 'center', inline: 'center' });",
            "const rect = el.getBoundingClientRect();",
            "return { x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };",
            "})()",
        ]
        .join("\n");

        let coords = self.eval(&js).await?;
        if coords.is_null() {
            return Err(PilothouseError::ElementNotFound(selector.to_string()));
        }

        let x = coords
            .get("x")
            .and_then(Value::as_f64)
            .ok_or_else(|| PilothouseError::Other("invalid element coordinates".to_string()))?;
        let y = coords
            .get("y")
            .and_then(Value::as_f64)
            .ok_or_else(|| PilothouseError::Other("invalid element coordinates".to_string()))?;
        Ok((x, y))
    }

    /// Click an element. Moves the mouse first so the browser updates its
    /// hit-test target before the press lands.
    pub async fn click(&self, selector: &str) -> Result<()> {
        let (x, y) = self.element_center(selector).await?;

        self.command(
            "Input.dispatchMouseEvent",
            json!({ "type": "mouseMoved", "x": x, "y": y }),
        )
        .await?;
        self.command(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mousePressed",
                "x": x,
                "y": y,
                "button": "left",
                "clickCount": 1,
            }),
        )
        .await?;
        self.command(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mouseReleased",
                "x": x,
                "y": y,
                "button": "left",
                "clickCount": 1,
            }),
        )
        .await?;
        Ok(())
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        let selector_json = serde_json::to_string(selector)?;
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("const el = __findElement({selector_json});"),
            "if (!el) return false;",
            "el.focus();",
            "return true;",
            "})()",
        ]
        .join("\n");

        let focused = self.eval(&js).await?;
        if !focused.as_bool().unwrap_or(false) {
            return Err(PilothouseError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    /// Type text into an element, appending to its current value.
    pub async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.focus(selector).await?;

        for c in text.chars() {
            self.command(
                "Input.dispatchKeyEvent",
                json!({ "type": "keyDown", "text": c.to_string() }),
            )
            .await?;
            self.command(
                "Input.dispatchKeyEvent",
                json!({ "type": "keyUp", "text": c.to_string() }),
            )
            .await?;
        }
        Ok(())
    }

    /// Replace an input's value and fire input/change events.
    pub async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let selector_json = serde_json::to_string(selector)?;
        let text_json = serde_json::to_string(text)?;
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("const el = __findElement({selector_json});"),
            "if (!el) return false;",
            "el.focus();",
            &format!("el.value = {text_json};"),
            "el.dispatchEvent(new Event('input', { bubbles: true }));",
            "el.dispatchEvent(new Event('change', { bubbles: true }));",
            "return true;",
            "})()",
        ]
        .join("\n");

        let filled = self.eval(&js).await?;
        if !filled.as_bool().unwrap_or(false) {
            return Err(PilothouseError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    /// Press a named key. Virtual key codes follow the Windows VK standard,
    /// which CDP treats as cross-platform.
    pub async fn press(&self, key: &str) -> Result<()> {
        let (key_value, code, text, vk) = match key.to_lowercase().as_str() {
            "enter" | "return" => ("Enter", "Enter", "\r", 13),
            "tab" => ("Tab", "Tab", "\t", 9),
            "escape" | "esc" => ("Escape", "Escape", "", 27),
            "backspace" => ("Backspace", "Backspace", "", 8),
            "delete" => ("Delete", "Delete", "", 46),
            "arrowup" | "up" => ("ArrowUp", "ArrowUp", "", 38),
            "arrowdown" | "down" => ("ArrowDown", "ArrowDown", "", 40),
            "arrowleft" | "left" => ("ArrowLeft", "ArrowLeft", "", 37),
            "arrowright" | "right" => ("ArrowRight", "ArrowRight", "", 39),
            "home" => ("Home", "Home", "", 36),
            "end" => ("End", "End", "", 35),
            "pageup" => ("PageUp", "PageUp", "", 33),
            "pagedown" => ("PageDown", "PageDown", "", 34),
            "space" => (" ", "Space", " ", 32),
            _ => (key, key, key, 0),
        };

        let mut key_down = json!({
            "type": "keyDown",
            "key": key_value,
            "code": code,
            "windowsVirtualKeyCode": vk,
        });
        if !text.is_empty() {
            key_down["text"] = json!(text);
        }

        self.command("Input.dispatchKeyEvent", key_down).await?;
        self.command(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": key_value,
                "code": code,
                "windowsVirtualKeyCode": vk,
            }),
        )
        .await?;
        Ok(())
    }

    /// Capture a PNG screenshot of the viewport, or of the whole document
    /// when `full_page` is set.
    pub async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let params = if full_page {
            let metrics = self.command("Page.getLayoutMetrics", json!({})).await?;
            let content = metrics
                .get("cssContentSize")
                .or_else(|| metrics.get("contentSize"))
                .ok_or_else(|| {
                    PilothouseError::CdpError("no content size in layout metrics".to_string())
                })?;
            let width = content.get("width").and_then(Value::as_f64).unwrap_or(1280.0);
            let height = content.get("height").and_then(Value::as_f64).unwrap_or(720.0);

            json!({
                "format": "png",
                "clip": { "x": 0, "y": 0, "width": width, "height": height, "scale": 1 },
                "captureBeyondViewport": true,
            })
        } else {
            json!({ "format": "png" })
        };

        let result = self.command("Page.captureScreenshot", params).await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| PilothouseError::CdpError("no screenshot data".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| PilothouseError::Other(format!("screenshot decode failed: {e}")))
    }

    /// Page HTML, or the outer HTML of a selector.
    pub async fn html(&self, selector: Option<&str>) -> Result<String> {
        let js = match selector {
            Some(sel) => {
                let sel_json = serde_json::to_string(sel)?;
                [
                    "(function() {",
                    Self::find_element_js(),
                    &format!("const el = __findElement({sel_json});"),
                    "return el ? el.outerHTML : null;",
                    "})()",
                ]
                .join("\n")
            }
            None => "document.documentElement.outerHTML".to_string(),
        };

        match self.eval(&js).await? {
            Value::String(s) => Ok(s),
            Value::Null => Err(PilothouseError::ElementNotFound(
                selector.unwrap_or("document").to_string(),
            )),
            other => Ok(other.to_string()),
        }
    }

    /// Visible text of the page, or of a selector.
    pub async fn text(&self, selector: Option<&str>) -> Result<String> {
        let js = match selector {
            Some(sel) => {
                let sel_json = serde_json::to_string(sel)?;
                [
                    "(function() {",
                    Self::find_element_js(),
                    &format!("const el = __findElement({sel_json});"),
                    "return el ? el.innerText : null;",
                    "})()",
                ]
                .join("\n")
            }
            None => "document.body.innerText".to_string(),
        };

        match self.eval(&js).await? {
            Value::String(s) => Ok(s),
            Value::Null => Err(PilothouseError::ElementNotFound(
                selector.unwrap_or("body").to_string(),
            )),
            other => Ok(other.to_string()),
        }
    }

    /// Poll until a selector matches or the deadline passes.
    pub async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<()> {
        let selector_json = serde_json::to_string(selector)?;
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("return __findElement({selector_json}) !== null;"),
            "})()",
        ]
        .join("\n");

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = self.eval(&js).await?;
            if found.as_bool().unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PilothouseError::Timeout(format!(
                    "element '{}' not found within {}ms",
                    selector,
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// A client whose calls all fail, for catalog tests.
    #[cfg(test)]
    pub(crate) fn detached(target_id: &str) -> Self {
        Self {
            conn: CdpConnection::disconnected(),
            target_id: target_id.to_string(),
            session_id: format!("session-{target_id}"),
        }
    }
}
