//! API credential resolution
//!
//! All credential sources are consulted in one place, in a fixed order,
//! the first time a gateway needs a key. The outcome is cached for the
//! lifetime of the resolver.

use std::sync::OnceLock;
use tracing::{info, warn};

/// Environment variables consulted after the config value, in order
pub const CREDENTIAL_ENV_VARS: &[&str] = &["API_KEY", "GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// An API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiKey").field(&mask_secret(&self.0)).finish()
    }
}

/// Where a resolved key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Env(&'static str),
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => write!(f, "config file"),
            Self::Env(name) => write!(f, "${}", name),
        }
    }
}

/// Resolve a key: the configured value first, then [`CREDENTIAL_ENV_VARS`].
///
/// Blank values and unexpanded `${VAR}` placeholders are skipped.
pub fn resolve_credential(
    configured: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<(ApiKey, CredentialSource)> {
    if let Some(value) = configured.and_then(usable) {
        return Some((ApiKey::new(value), CredentialSource::Config));
    }
    CREDENTIAL_ENV_VARS.iter().copied().find_map(|name| {
        env(name)
            .as_deref()
            .and_then(usable)
            .map(|value| (ApiKey::new(value), CredentialSource::Env(name)))
    })
}

fn usable(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() || value.contains("${") {
        None
    } else {
        Some(value)
    }
}

/// Lazily resolves the API key exactly once
pub struct CredentialResolver {
    configured: Option<String>,
    env: EnvLookup,
    resolved: OnceLock<Option<ApiKey>>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field(
                "configured",
                &self.configured.as_deref().map(mask_secret),
            )
            .field("resolved", &self.resolved.get().map(Option::is_some))
            .finish()
    }
}

impl CredentialResolver {
    /// Resolver over the process environment
    pub fn from_env(configured: Option<String>) -> Self {
        Self::with_env_lookup(configured, |name| std::env::var(name).ok())
    }

    /// Resolver with a custom environment lookup
    pub fn with_env_lookup(
        configured: Option<String>,
        env: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            configured,
            env: Box::new(env),
            resolved: OnceLock::new(),
        }
    }

    /// Resolver that always yields `key`
    pub fn fixed(key: impl Into<String>) -> Self {
        Self::with_env_lookup(Some(key.into()), |_| None)
    }

    /// Resolver that never finds a key
    pub fn none() -> Self {
        Self::with_env_lookup(None, |_| None)
    }

    /// The key, resolving it on first use
    pub fn get(&self) -> Option<&ApiKey> {
        self.resolved
            .get_or_init(|| {
                match resolve_credential(self.configured.as_deref(), &self.env) {
                    Some((key, source)) => {
                        info!("API credential resolved from {}", source);
                        Some(key)
                    }
                    None => {
                        warn!(
                            "No API credential found (checked config and {})",
                            CREDENTIAL_ENV_VARS.join(", ")
                        );
                        None
                    }
                }
            })
            .as_ref()
    }
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_config_value_wins() {
        let env = env_of(&[("API_KEY", "from-env")]);
        let (key, source) = resolve_credential(Some("from-config"), env).unwrap();
        assert_eq!(key.expose(), "from-config");
        assert_eq!(source, CredentialSource::Config);
    }

    #[test]
    fn test_env_precedence() {
        let env = env_of(&[("GOOGLE_AI_API_KEY", "third"), ("GEMINI_API_KEY", "second")]);
        let (key, source) = resolve_credential(None, env).unwrap();
        assert_eq!(key.expose(), "second");
        assert_eq!(source, CredentialSource::Env("GEMINI_API_KEY"));
    }

    #[test]
    fn test_placeholder_and_blank_are_skipped() {
        let env = env_of(&[("API_KEY", "   "), ("GOOGLE_AI_API_KEY", "real")]);
        let (key, source) = resolve_credential(Some("${GEMINI_API_KEY}"), env).unwrap();
        assert_eq!(key.expose(), "real");
        assert_eq!(source, CredentialSource::Env("GOOGLE_AI_API_KEY"));
    }

    #[test]
    fn test_nothing_found() {
        assert!(resolve_credential(Some(""), env_of(&[])).is_none());
    }

    #[test]
    fn test_resolver_consults_sources_once() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let counter = lookups.clone();
        let resolver = CredentialResolver::with_env_lookup(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        });
        assert!(resolver.get().is_none());
        let after_first = lookups.load(Ordering::SeqCst);
        assert_eq!(after_first, CREDENTIAL_ENV_VARS.len());
        assert!(resolver.get().is_none());
        assert_eq!(lookups.load(Ordering::SeqCst), after_first);
    }

    #[test]
    fn test_fixed_and_none() {
        assert_eq!(CredentialResolver::fixed("abc").get().unwrap().expose(), "abc");
        assert!(CredentialResolver::none().get().is_none());
    }

    #[test]
    fn test_debug_hides_key() {
        let key = ApiKey::new("AIza-very-secret-key");
        let debug = format!("{:?}", key);
        assert!(!debug.contains("very-secret"));
        let resolver = CredentialResolver::fixed("AIza-very-secret-key");
        assert!(!format!("{:?}", resolver).contains("very-secret"));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("AIzaSyABCDEF1234"), "AIz...1234");
    }
}
