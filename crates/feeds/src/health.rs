//! Aggregate health of the registered live providers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use feeds_core::Provider;

use crate::registry::ProviderRegistry;

/// Overall health across live providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every live provider passed.
    Healthy,
    /// Some, but not all, live providers passed.
    Degraded,
    /// No live provider passed, or none is registered.
    Unhealthy,
}

impl HealthStatus {
    /// Aggregate `passed` out of `total` checks.
    #[must_use]
    pub const fn from_counts(passed: usize, total: usize) -> Self {
        if passed == 0 {
            Self::Unhealthy
        } else if passed == total {
            Self::Healthy
        } else {
            Self::Degraded
        }
    }
}

/// Result of checking one provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    /// Registry id.
    pub id: String,
    /// True when the provider is available and authenticated.
    pub healthy: bool,
    /// Why the check failed, when it raised an error.
    pub error: Option<String>,
}

/// Outcome of a health sweep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Aggregate status.
    pub status: HealthStatus,
    /// Per-provider results, sorted by id.
    pub providers: Vec<ProviderHealth>,
    /// When the sweep ran.
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Number of providers that passed.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.providers.iter().filter(|p| p.healthy).count()
    }
}

/// Check every live provider concurrently and aggregate the results.
///
/// The synthetic fallback is skipped. A check that errors or panics counts as
/// failed and never aborts the sweep.
pub async fn check_health(registry: &ProviderRegistry) -> HealthReport {
    let checked_at = Utc::now();
    let live = registry.live_providers();

    let handles = live.iter().map(|(_, provider)| {
        let provider = Arc::clone(provider);
        tokio::spawn(async move { probe(provider.as_ref()).await })
    });
    let outcomes = join_all(handles).await;

    let providers: Vec<ProviderHealth> = live
        .iter()
        .zip(outcomes)
        .map(|((id, _), outcome)| {
            let (healthy, error) = outcome
                .unwrap_or_else(|e| (false, Some(format!("health check aborted: {e}"))));
            if let Some(error) = &error {
                warn!(provider = %id, error = %error, "Health check failed");
            }
            ProviderHealth {
                id: id.clone(),
                healthy,
                error,
            }
        })
        .collect();

    let passed = providers.iter().filter(|p| p.healthy).count();
    let status = HealthStatus::from_counts(passed, providers.len());
    debug!(?status, passed, total = providers.len(), "Health sweep complete");

    HealthReport {
        status,
        providers,
        checked_at,
    }
}

async fn probe(provider: &dyn Provider) -> (bool, Option<String>) {
    if !provider.is_available().await {
        return (false, None);
    }
    provider
        .is_authenticated()
        .await
        .map_or_else(|e| (false, Some(e.to_string())), |ok| (ok, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use feeds_core::{
        FeedError, FinancialsSnapshot, KpiSnapshot, PricePoint, PriceRange, ProviderKind, Result,
        Symbol,
    };

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Pass,
        Unavailable,
        Rejected,
        Errors,
        Panics,
    }

    #[derive(Debug)]
    struct StubProvider(Behavior);

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn description(&self) -> &str {
            "Health check stub"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Live
        }

        async fn get_prices(
            &self,
            _symbol: &Symbol,
            _range: PriceRange,
        ) -> Result<Vec<PricePoint>> {
            Err(FeedError::NotSupported("stub".to_string()))
        }

        async fn get_kpis(&self, _symbol: &Symbol) -> Result<KpiSnapshot> {
            Err(FeedError::NotSupported("stub".to_string()))
        }

        async fn get_financials(&self, _symbol: &Symbol) -> Result<FinancialsSnapshot> {
            Err(FeedError::NotSupported("stub".to_string()))
        }

        async fn is_available(&self) -> bool {
            !matches!(self.0, Behavior::Unavailable)
        }

        async fn is_authenticated(&self) -> Result<bool> {
            match self.0 {
                Behavior::Pass => Ok(true),
                Behavior::Unavailable | Behavior::Rejected => Ok(false),
                Behavior::Errors => Err(FeedError::Transport("connection reset".to_string())),
                Behavior::Panics => panic!("probe exploded"),
            }
        }

        async fn last_update(&self, _symbol: &Symbol) -> Option<DateTime<Utc>> {
            None
        }
    }

    fn registry(behaviors: &[Behavior]) -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        for (i, b) in behaviors.iter().enumerate() {
            registry
                .register(format!("p{i}"), Arc::new(StubProvider(*b)))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_aggregation_rule() {
        assert_eq!(HealthStatus::from_counts(0, 0), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from_counts(0, 3), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from_counts(1, 3), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_counts(3, 3), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_one_of_three_passing_is_degraded() {
        let registry = registry(&[Behavior::Pass, Behavior::Unavailable, Behavior::Rejected]);
        let report = check_health(&registry).await;

        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.providers.len(), 3);
        assert_eq!(report.passed(), 1);
        assert!(report.providers.iter().all(|p| p.id != "mock"));
    }

    #[tokio::test]
    async fn test_all_passing_is_healthy() {
        let registry = registry(&[Behavior::Pass, Behavior::Pass]);
        assert_eq!(check_health(&registry).await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_errors_and_panics_count_as_failures() {
        let registry = registry(&[Behavior::Errors, Behavior::Panics, Behavior::Rejected]);
        let report = check_health(&registry).await;

        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.providers.len(), 3);
        assert!(report.providers[0].error.as_deref().unwrap().contains("connection reset"));
        assert!(report.providers[1].error.is_some());
        assert!(report.providers[2].error.is_none());
    }

    #[tokio::test]
    async fn test_no_live_providers_is_unhealthy() {
        let report = check_health(&ProviderRegistry::new()).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.providers.is_empty());
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let registry = registry(&[Behavior::Pass]);
        let json = serde_json::to_value(check_health(&registry).await).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["providers"][0]["healthy"], true);
        assert!(json["checkedAt"].is_string());
    }
}
