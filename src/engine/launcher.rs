use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use tokio::process::{Child, Command};
use tokio::time::sleep;

use crate::config::Config;
use crate::error::{PilothouseError, Result};

use super::discovery::discover_browser;

/// Launches a browser with CDP enabled on an ephemeral port.
///
/// The port is requested as 0 and read back from the DevToolsActivePort
/// file the browser writes into its user data dir, so concurrent launches
/// never collide.
pub struct BrowserLauncher {
    executable: PathBuf,
    headless: bool,
    user_data_dir: PathBuf,
    extra_args: Vec<String>,
}

impl BrowserLauncher {
    pub fn from_config(
        config: &Config,
        headless: Option<bool>,
        executable: Option<&str>,
    ) -> Result<Self> {
        let executable = discover_browser(executable.or(config.browser.executable.as_deref()))?;

        let nonce: u32 = rand::thread_rng().gen();
        let user_data_dir = config.data_dir().join(format!("browser-{nonce:08x}"));

        Ok(Self {
            executable,
            headless: headless.unwrap_or(config.browser.headless),
            user_data_dir,
            extra_args: config.browser.extra_args.clone(),
        })
    }

    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "--remote-debugging-port=0".to_string(),
            format!("--user-data-dir={}", self.user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-infobars".to_string(),
            "--disable-save-password-bubble".to_string(),
        ];

        if self.headless {
            args.push("--headless=new".to_string());
        }

        args.extend(self.extra_args.clone());
        args.push("about:blank".to_string());
        args
    }

    fn launch(&self) -> Result<Child> {
        std::fs::create_dir_all(&self.user_data_dir)?;

        let args = self.build_args();
        tracing::debug!(
            "launching browser: {:?} with args: {:?}",
            self.executable,
            args
        );

        Command::new(&self.executable)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                PilothouseError::BrowserLaunchFailed(format!(
                    "failed to launch {}: {}",
                    self.executable.display(),
                    e
                ))
            })
    }

    /// Launch the browser and wait until CDP is reachable.
    ///
    /// Returns the child process, the debugging port, and the browser-level
    /// WebSocket URL.
    pub async fn launch_and_wait(&self) -> Result<(Child, u16, String)> {
        let mut child = self.launch()?;

        let port = match self.wait_for_devtools_port(&mut child).await {
            Ok(port) => port,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };
        let ws_url = match self.wait_for_cdp(port).await {
            Ok(url) => url,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };

        tracing::info!("browser ready on port {}", port);
        Ok((child, port, ws_url))
    }

    /// Poll the DevToolsActivePort file for the chosen port.
    async fn wait_for_devtools_port(&self, child: &mut Child) -> Result<u16> {
        let port_file = self.user_data_dir.join("DevToolsActivePort");

        for _ in 0..40 {
            sleep(Duration::from_millis(250)).await;

            if let Some(status) = child.try_wait()? {
                return Err(PilothouseError::BrowserLaunchFailed(format!(
                    "browser exited during startup ({status})"
                )));
            }

            if let Ok(content) = std::fs::read_to_string(&port_file) {
                if let Some(port) = content.lines().next().and_then(|l| l.parse().ok()) {
                    return Ok(port);
                }
            }
        }

        Err(PilothouseError::BrowserLaunchFailed(
            "timeout waiting for DevToolsActivePort".to_string(),
        ))
    }

    /// Poll /json/version until CDP answers with the WebSocket URL.
    async fn wait_for_cdp(&self, port: u16) -> Result<String> {
        let url = format!("http://127.0.0.1:{port}/json/version");

        // Bypass any configured proxy for localhost
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        for i in 0..20 {
            sleep(Duration::from_millis(250)).await;

            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response.json().await.map_err(|e| {
                        PilothouseError::CdpConnectionFailed(format!(
                            "failed to parse CDP version response: {e}"
                        ))
                    })?;

                    if let Some(ws_url) = json.get("webSocketDebuggerUrl").and_then(|v| v.as_str())
                    {
                        tracing::debug!("CDP ready at: {}", ws_url);
                        return Ok(ws_url.to_string());
                    }
                }
                Ok(_) => {
                    tracing::debug!("CDP not ready yet (attempt {})", i + 1);
                }
                Err(e) => {
                    tracing::debug!("CDP connection attempt {} failed: {}", i + 1, e);
                }
            }
        }

        Err(PilothouseError::CdpConnectionFailed(
            "timeout waiting for CDP to be ready".to_string(),
        ))
    }

    pub fn user_data_dir(&self) -> &PathBuf {
        &self.user_data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserConfig;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            browser: BrowserConfig {
                data_dir: Some(dir.to_string_lossy().to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn headless_override_wins_over_config() {
        let dir = tempfile::tempdir().unwrap();
        let exe = tempfile::NamedTempFile::new().unwrap();
        let exe_path = exe.path().to_string_lossy().to_string();

        let mut config = test_config(dir.path());
        config.browser.headless = true;

        let launcher = BrowserLauncher::from_config(&config, Some(false), Some(&exe_path)).unwrap();
        assert!(!launcher.build_args().iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn launch_args_request_ephemeral_port() {
        let dir = tempfile::tempdir().unwrap();
        let exe = tempfile::NamedTempFile::new().unwrap();
        let exe_path = exe.path().to_string_lossy().to_string();

        let launcher =
            BrowserLauncher::from_config(&test_config(dir.path()), None, Some(&exe_path)).unwrap();
        let args = launcher.build_args();

        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-data-dir=")));
        assert!(args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn each_launcher_gets_its_own_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let exe = tempfile::NamedTempFile::new().unwrap();
        let exe_path = exe.path().to_string_lossy().to_string();
        let config = test_config(dir.path());

        let a = BrowserLauncher::from_config(&config, None, Some(&exe_path)).unwrap();
        let b = BrowserLauncher::from_config(&config, None, Some(&exe_path)).unwrap();
        assert_ne!(a.user_data_dir(), b.user_data_dir());
    }
}
