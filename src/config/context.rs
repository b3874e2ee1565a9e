use serde::{Deserialize, Serialize};

/// Capability set a browser context is created with.
///
/// Kept verbatim on the context node after creation so diagnostics and
/// context recreation can see exactly what was requested. Values are not
/// re-validated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Viewport applied to every page in the context
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// BCP-47 locale, e.g. "de-DE"
    pub locale: Option<String>,

    /// IANA timezone, e.g. "Europe/Berlin"
    pub timezone_id: Option<String>,

    /// User agent override
    pub user_agent: Option<String>,

    /// Permissions granted to every origin, e.g. "geolocation"
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Whether JavaScript is enabled (page-level emulation)
    #[serde(default = "default_javascript_enabled")]
    pub java_script_enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

fn default_javascript_enabled() -> bool {
    true
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            viewport: None,
            locale: None,
            timezone_id: None,
            user_agent: None,
            permissions: Vec::new(),
            java_script_enabled: true,
        }
    }
}
