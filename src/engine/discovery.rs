use std::path::PathBuf;

use crate::error::{PilothouseError, Result};

/// Locate a Chromium-family executable.
///
/// Order: explicit override, PATH lookup, then well-known install paths.
pub fn discover_browser(executable: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = executable {
        let expanded = PathBuf::from(shellexpand::tilde(path).to_string());
        if expanded.exists() {
            return Ok(expanded);
        }
        return Err(PilothouseError::BrowserLaunchFailed(format!(
            "configured browser not found at: {}",
            expanded.display()
        )));
    }

    for name in PATH_NAMES {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    for candidate in install_paths() {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(PilothouseError::BrowserNotFound)
}

const PATH_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "brave-browser",
    "microsoft-edge",
];

#[cfg(target_os = "macos")]
fn install_paths() -> Vec<PathBuf> {
    [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(target_os = "windows")]
fn install_paths() -> Vec<PathBuf> {
    [
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn install_paths() -> Vec<PathBuf> {
    [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/brave-browser",
        "/usr/bin/microsoft-edge",
        "/snap/bin/chromium",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}
