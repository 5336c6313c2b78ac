//! Credential resolution with placeholder detection.
//!
//! Providers are activated only when a real credential is found. Lookups go
//! through a [`CredentialResolver`], which checks a local override store
//! first and an environment-style configuration source second. Values such as
//! `demo`, `your_api_key` or templated defaults (`${POLYGON_API_KEY}`) count as
//! absent.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A source of configuration values keyed by name.
pub trait CredentialSource: Send + Sync {
    /// Returns the raw value stored under `key`, if any.
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads values from the process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl CredentialSource for ProcessEnv {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl CredentialSource for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// In-process override store, e.g. keys entered by a user at runtime.
#[derive(Default)]
pub struct LocalOverrides {
    values: RwLock<HashMap<String, String>>,
}

impl fmt::Debug for LocalOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .values
            .read()
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("LocalOverrides").field("keys", &keys).finish()
    }
}

impl LocalOverrides {
    /// Creates an empty override store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut values = self.values.write().unwrap_or_else(|p| p.into_inner());
        values.insert(key.into(), value.into());
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) -> Option<String> {
        let mut values = self.values.write().unwrap_or_else(|p| p.into_inner());
        values.remove(key)
    }
}

impl CredentialSource for LocalOverrides {
    fn lookup(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|p| p.into_inner());
        values.get(key).cloned()
    }
}

/// Where to look for one provider's credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CredentialKey {
    /// Key in the local override store.
    pub override_key: &'static str,
    /// Key in the environment-style configuration.
    pub env_key: &'static str,
    /// Whether the provider accepts the literal `demo` key.
    pub allow_demo: bool,
}

/// Resolves credentials from an override store, then a configuration source.
#[derive(Clone)]
pub struct CredentialResolver {
    overrides: Arc<dyn CredentialSource>,
    env: Arc<dyn CredentialSource>,
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new(Arc::new(LocalOverrides::new()), Arc::new(ProcessEnv))
    }
}

impl CredentialResolver {
    /// Creates a resolver over the given sources.
    #[must_use]
    pub fn new(overrides: Arc<dyn CredentialSource>, env: Arc<dyn CredentialSource>) -> Self {
        Self { overrides, env }
    }

    /// Returns the first usable credential for `key`.
    ///
    /// A placeholder in the override store does not shadow a real value in
    /// the configuration source.
    #[must_use]
    pub fn resolve(&self, key: &CredentialKey) -> Option<String> {
        [
            self.overrides.lookup(key.override_key),
            self.env.lookup(key.env_key),
        ]
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .find(|v| !is_placeholder(v) || (key.allow_demo && v.eq_ignore_ascii_case("demo")))
    }
}

/// Returns true for empty, demo, or templated credential values.
#[must_use]
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    if v.is_empty() {
        return true;
    }

    let lower = v.to_ascii_lowercase();
    if matches!(
        lower.as_str(),
        "demo" | "test" | "changeme" | "none" | "null" | "undefined" | "xxx"
    ) {
        return true;
    }
    if lower.starts_with("your_") || lower.starts_with("your-") || lower.contains("api_key_here")
    {
        return true;
    }

    (v.starts_with("${") && v.ends_with('}'))
        || (v.starts_with("{{") && v.ends_with("}}"))
        || (v.starts_with('<') && v.ends_with('>'))
}
