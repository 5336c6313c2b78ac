#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Unified market data provider interface.
//!
//! This crate re-exports core types and provider implementations, and
//! provides a [`ProviderRegistry`] that maps provider ids to instances with
//! the synthetic `mock` provider always available as a fallback.
//!
//! # Features
//!
//! - `polygon` - Polygon.io REST and streaming provider
//! - `bridge` - Host application bridge provider
//!
//! # Example
//!
//! ```rust,ignore
//! use feeds::{BootstrapOptions, CredentialResolver, PriceRange, ProviderRegistry, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> feeds::Result<()> {
//!     let resolver = CredentialResolver::default();
//!     let registry = ProviderRegistry::bootstrap(&resolver, BootstrapOptions::default());
//!
//!     let provider = registry.get_or_fallback("polygon");
//!     let prices = provider.get_prices(&Symbol::new("AAPL"), PriceRange::OneYear).await?;
//!     println!("{} points from {}", prices.len(), provider.name());
//!
//!     let report = feeds::check_health(&registry).await;
//!     println!("{:?}", report.status);
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use feeds_core::*;

// Providers
#[cfg(feature = "bridge")]
pub use feeds_bridge::{BridgeProvider, HostBridge};
#[cfg(feature = "polygon")]
pub use feeds_polygon::{PolygonConfig, PolygonProvider};
pub use feeds_synthetic::SyntheticProvider;

mod health;
mod registry;
pub use health::{HealthReport, HealthStatus, ProviderHealth, check_health};
pub use registry::{
    BootstrapOptions, FALLBACK_PROVIDER_ID, POLYGON_CREDENTIAL, ProviderInfo, ProviderRegistry,
};
