//! Provider registry with a permanent synthetic fallback.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use feeds_core::{CredentialKey, CredentialResolver, FeedError, Provider, ProviderKind, Result};
use feeds_synthetic::SyntheticProvider;

/// Id under which the synthetic provider is always registered.
pub const FALLBACK_PROVIDER_ID: &str = "mock";

/// Where the Polygon API key is looked up.
pub const POLYGON_CREDENTIAL: CredentialKey = CredentialKey {
    override_key: "polygon",
    env_key: "POLYGON_API_KEY",
    allow_demo: false,
};

/// Summary of one registered provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Registry id.
    pub id: String,
    /// Name the provider reports.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Synthetic or live.
    pub kind: ProviderKind,
    /// Whether streaming subscriptions are offered.
    pub supports_streaming: bool,
}

/// Inputs to [`ProviderRegistry::bootstrap`] beyond credentials.
#[derive(Clone, Debug, Default)]
pub struct BootstrapOptions {
    /// Polygon configuration used when a key resolves.
    #[cfg(feature = "polygon")]
    pub polygon: feeds_polygon::PolygonConfig,
    /// Host bridge; registers the `bridge` provider when present.
    #[cfg(feature = "bridge")]
    pub bridge: Option<Arc<dyn feeds_bridge::HostBridge>>,
}

/// Registry mapping provider ids to shared provider instances.
///
/// The synthetic provider is registered under [`FALLBACK_PROVIDER_ID`] at
/// construction and can be neither replaced nor removed, so
/// [`get_or_fallback`](Self::get_or_fallback) always yields a usable provider.
///
/// # Example
///
/// ```rust
/// use feeds::{FALLBACK_PROVIDER_ID, ProviderRegistry};
///
/// let registry = ProviderRegistry::new();
/// assert!(registry.contains(FALLBACK_PROVIDER_ID));
/// assert_eq!(registry.get_or_fallback("polygon").name(), "mock");
/// ```
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, Arc<dyn Provider>>>,
    fallback: Arc<dyn Provider>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Create a registry holding only the synthetic fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fallback(SyntheticProvider::new())
    }

    /// Create a registry with a specific synthetic fallback instance.
    #[must_use]
    pub fn with_fallback(fallback: SyntheticProvider) -> Self {
        let fallback: Arc<dyn Provider> = Arc::new(fallback);
        let mut providers = BTreeMap::new();
        providers.insert(FALLBACK_PROVIDER_ID.to_string(), Arc::clone(&fallback));
        Self {
            providers: RwLock::new(providers),
            fallback,
        }
    }

    /// Create a registry and register every provider whose prerequisites are met.
    ///
    /// Polygon is registered when its credential resolves, the bridge provider
    /// when a host bridge is supplied. A provider that fails to construct is
    /// logged and skipped.
    #[must_use]
    pub fn bootstrap(resolver: &CredentialResolver, options: BootstrapOptions) -> Self {
        let registry = Self::new();

        #[cfg(feature = "polygon")]
        registry.register_polygon(resolver, options.polygon);
        #[cfg(not(feature = "polygon"))]
        let _ = resolver;

        #[cfg(feature = "bridge")]
        if let Some(bridge) = options.bridge {
            registry.register_isolated(
                feeds_bridge::BRIDGE_PROVIDER_NAME,
                Ok(feeds_bridge::BridgeProvider::new(bridge)),
            );
        }
        #[cfg(not(any(feature = "polygon", feature = "bridge")))]
        let _ = options;

        info!(providers = ?registry.ids(), "Provider registry ready");
        registry
    }

    #[cfg(feature = "polygon")]
    fn register_polygon(
        &self,
        resolver: &CredentialResolver,
        config: feeds_polygon::PolygonConfig,
    ) {
        match resolver.resolve(&POLYGON_CREDENTIAL) {
            Some(key) => self.register_isolated(
                feeds_polygon::POLYGON_PROVIDER_NAME,
                feeds_polygon::PolygonProvider::with_config(key, config),
            ),
            None => debug!(provider = "polygon", "No credential configured, skipping"),
        }
    }

    /// Register a freshly built provider; failures are logged, never raised.
    #[cfg(any(feature = "polygon", feature = "bridge"))]
    fn register_isolated<P: Provider + 'static>(&self, id: &str, built: Result<P>) {
        match built.and_then(|p| self.register(id, Arc::new(p))) {
            Ok(()) => info!(provider = id, "Registered provider"),
            Err(e) => warn!(provider = id, error = %e, "Skipping provider"),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn Provider>>> {
        self.providers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn Provider>>> {
        self.providers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `provider` under `id`, replacing any previous entry.
    pub fn register(&self, id: impl Into<String>, provider: Arc<dyn Provider>) -> Result<()> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(FeedError::InvalidParameter("provider id is empty".to_string()));
        }
        if id == FALLBACK_PROVIDER_ID {
            return Err(FeedError::InvalidParameter(format!(
                "'{FALLBACK_PROVIDER_ID}' is reserved for the fallback provider"
            )));
        }

        debug!(id = %id, provider = provider.name(), "Registering provider");
        if self.write().insert(id.clone(), provider).is_some() {
            warn!(id = %id, "Replaced existing provider");
        }
        Ok(())
    }

    /// Remove the provider registered under `id`. The fallback stays.
    pub fn unregister(&self, id: &str) -> Option<Arc<dyn Provider>> {
        if id == FALLBACK_PROVIDER_ID {
            return None;
        }
        self.write().remove(id)
    }

    /// Look up a provider by id.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Provider>> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| FeedError::UnknownProvider(id.to_string()))
    }

    /// Look up a provider by id, falling back to the synthetic provider.
    #[must_use]
    pub fn get_or_fallback(&self, id: &str) -> Arc<dyn Provider> {
        self.get(id).unwrap_or_else(|_| {
            debug!(id, fallback = FALLBACK_PROVIDER_ID, "Provider not registered, using fallback");
            self.fallback()
        })
    }

    /// The synthetic fallback provider.
    #[must_use]
    pub fn fallback(&self) -> Arc<dyn Provider> {
        Arc::clone(&self.fallback)
    }

    /// True when a provider is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Summaries of every registered provider, sorted by id.
    #[must_use]
    pub fn list(&self) -> Vec<ProviderInfo> {
        self.read()
            .iter()
            .map(|(id, p)| ProviderInfo {
                id: id.clone(),
                name: p.name().to_string(),
                description: p.description().to_string(),
                kind: p.kind(),
                supports_streaming: p.supports_streaming(),
            })
            .collect()
    }

    /// Registered providers of kind [`ProviderKind::Live`].
    #[must_use]
    pub fn live_providers(&self) -> Vec<(String, Arc<dyn Provider>)> {
        self.read()
            .iter()
            .filter(|(_, p)| p.kind() == ProviderKind::Live)
            .map(|(id, p)| (id.clone(), Arc::clone(p)))
            .collect()
    }
}
