use anyhow::{Context, Result};
use medinexus_core::providers::{CredentialResolver, GeminiConfig, google, mask_secret};
use medinexus_core::sequencer::{DEFAULT_GREETING, SessionConfig};
use medinexus_core::{AgentId, DispatcherConfig, RouterConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedinexusConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub dispatcher: DispatcherSection,
    #[serde(default)]
    pub session: SessionSection,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Optional; the environment is consulted when empty
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

fn default_base_url() -> String {
    google::DEFAULT_BASE_URL.to_string()
}
fn default_model() -> String {
    google::DEFAULT_MODEL.to_string()
}
fn default_timeout_secs() -> u64 {
    google::DEFAULT_TIMEOUT_SECS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_output_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSection {
    #[serde(default = "default_router_temperature")]
    pub temperature: f32,
    #[serde(default = "default_fallback_agent")]
    pub fallback_agent: AgentId,
}

fn default_router_temperature() -> f32 {
    0.1
}
fn default_fallback_agent() -> AgentId {
    AgentId::PatientInfo
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            temperature: default_router_temperature(),
            fallback_agent: default_fallback_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSection {
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_history_window() -> usize {
    6
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Empty disables the greeting
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".medinexus")
}

impl MedinexusConfig {
    /// Load from `custom_path`, or from `~/.medinexus/config.toml`.
    ///
    /// A missing default file yields the built-in defaults; a missing custom
    /// file is an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(path) => path.clone(),
            None => {
                let path = config_dir().join("config.toml");
                if !path.exists() {
                    info!(
                        "No config at {}, using defaults. Run `medinexus init` to create one.",
                        path.display()
                    );
                    return Ok(Self::default());
                }
                path
            }
        };

        check_permissions(&path)?;

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `medinexus init` first.",
                path.display()
            )
        })?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        if !config.gateway.api_key.is_empty() && !config.gateway.api_key.contains("${") {
            warn!(
                "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{GEMINI_API_KEY}}\""
            );
        }

        Ok(config)
    }

    /// Expand allowlisted environment variables, then parse TOML
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        Ok(toml::from_str(&expanded)?)
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            base_url: self.gateway.base_url.clone(),
            model: self.gateway.model.clone(),
            timeout: Duration::from_secs(self.gateway.timeout_secs),
            max_output_tokens: self.gateway.max_output_tokens,
        }
    }

    /// Credential resolver over the config value and the process environment
    pub fn credentials(&self) -> CredentialResolver {
        let configured = Some(self.gateway.api_key.clone()).filter(|key| !key.trim().is_empty());
        CredentialResolver::from_env(configured)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            temperature: self.router.temperature,
            fallback_agent: self.router.fallback_agent,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            history_window: self.dispatcher.history_window,
            temperature: self.dispatcher.temperature,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let greeting = self.session.greeting.trim();
        SessionConfig {
            greeting: (!greeting.is_empty()).then(|| greeting.to_string()),
            ..SessionConfig::default()
        }
    }

    /// Copy safe to print: secrets are masked
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if !copy.gateway.api_key.is_empty() {
            copy.gateway.api_key = mask_secret(&copy.gateway.api_key);
        }
        copy
    }
}

/// Refuse config files readable by group or other (Unix only)
fn check_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(anyhow::anyhow!(
                    "Config file {:?} has overly permissive permissions ({:o}). \
                     It may contain secrets. Fix with: chmod 600 {:?}",
                    path,
                    mode & 0o777,
                    path
                ));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &["API_KEY", "GEMINI_API_KEY", "GOOGLE_AI_API_KEY", "HOME", "USER"];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while let Some(start) = result[pos..].find("${") {
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Left as-is so the credential resolver treats it as unset
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, content: &str, mode: u32) -> PathBuf {
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        }
        #[cfg(not(unix))]
        let _ = mode;
        path
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = MedinexusConfig::parse("").unwrap();
        assert!(cfg.gateway.api_key.is_empty());
        assert_eq!(cfg.gateway.model, "gemini-2.5-flash");
        assert_eq!(cfg.gateway.timeout_secs, 120);
        assert_eq!(cfg.router.temperature, 0.1);
        assert_eq!(cfg.router.fallback_agent, AgentId::PatientInfo);
        assert_eq!(cfg.dispatcher.history_window, 6);
        assert_eq!(cfg.session.greeting, DEFAULT_GREETING);
    }

    #[test]
    fn test_default_template_parses() {
        let cfg = MedinexusConfig::parse(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(cfg.gateway.base_url, google::DEFAULT_BASE_URL);
        assert_eq!(cfg.dispatcher.history_window, 6);
    }

    #[test]
    fn test_sections_override_defaults() {
        let cfg = MedinexusConfig::parse(
            r#"
[gateway]
model = "gemini-2.5-pro"
timeout_secs = 30

[router]
fallback_agent = "BILLING"

[dispatcher]
history_window = 10
temperature = 0.7

[session]
greeting = ""
"#,
        )
        .unwrap();
        assert_eq!(cfg.gemini_config().model, "gemini-2.5-pro");
        assert_eq!(cfg.gemini_config().timeout, Duration::from_secs(30));
        assert_eq!(cfg.router_config().fallback_agent, AgentId::Billing);
        assert_eq!(cfg.dispatcher_config().history_window, 10);
        assert_eq!(cfg.dispatcher_config().temperature, Some(0.7));
        assert!(cfg.session_config().greeting.is_none());
    }

    #[test]
    fn test_unknown_agent_rejected() {
        assert!(MedinexusConfig::parse("[router]\nfallback_agent = \"PHARMACY\"").is_err());
    }

    #[test]
    fn test_unlisted_env_var_not_expanded() {
        let expanded = expand_env_vars("api_key = \"${SOME_OTHER_SECRET}\"");
        assert_eq!(expanded, "api_key = \"${SOME_OTHER_SECRET}\"");
    }

    #[test]
    fn test_allowlisted_env_var_expanded() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(expand_env_vars("dir = \"${HOME}/x\""), format!("dir = \"{}/x\"", home));
        assert_eq!(expand_env_vars("unterminated ${HOME"), "unterminated ${HOME");
    }

    #[test]
    fn test_debug_and_masked_hide_key() {
        let cfg = MedinexusConfig::parse("[gateway]\napi_key = \"AIzaSyD-secret-value-1234\"").unwrap();
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("secret-value"));

        let printed = toml::to_string_pretty(&cfg.masked()).unwrap();
        assert!(!printed.contains("secret-value"));
        assert!(printed.contains("AIz...1234"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(&dir, "[dispatcher]\nhistory_window = 4\n", 0o600);
        let cfg = MedinexusConfig::load(&Some(path)).unwrap();
        assert_eq!(cfg.dispatcher.history_window, 4);
    }

    #[test]
    fn test_missing_custom_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = MedinexusConfig::load(&Some(dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("medinexus init"));
    }

    #[cfg(unix)]
    #[test]
    fn test_world_readable_file_refused() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(&dir, "", 0o644);
        let err = MedinexusConfig::load(&Some(path)).unwrap_err();
        assert!(err.to_string().contains("chmod 600"));
    }
}
