#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for market data feeds.
//!
//! This crate provides the foundations every adapter builds on:
//!
//! - [`Provider`](provider::Provider) - Uniform adapter contract
//! - [`validate`](validate::validate) - Trust-boundary validation of raw payloads
//! - [`RateLimiter`](rate_limit::RateLimiter) - Per-adapter request spacing
//! - [`CredentialResolver`](credentials::CredentialResolver) - Credential lookup
//! - [`FeedError`](error::FeedError) - Error taxonomy

/// Credential lookup with placeholder detection.
pub mod credentials;
/// Error types for feed operations.
pub mod error;
/// Provider trait for fetching market data.
pub mod provider;
/// Price ranges and bar timespans.
pub mod range;
/// Minimum-interval rate limiting.
pub mod rate_limit;
/// Canonical data types (Symbol, PricePoint, KpiSnapshot, etc.).
pub mod types;
/// Payload validation.
pub mod validate;

// Re-export commonly used items at crate root
pub use credentials::{
    CredentialKey, CredentialResolver, CredentialSource, LocalOverrides, ProcessEnv,
};
pub use error::{FeedError, Result};
pub use provider::{Provider, ProviderKind};
pub use range::{PriceRange, RangeWindow, Timespan};
pub use rate_limit::{RatePermit, RateLimiter};
pub use types::{
    Aggregate, FinancialsSnapshot, KpiSnapshot, PricePoint, Quote, Symbol, Trade, VolPoint,
    VolSurface,
};
pub use validate::{Canonical, PayloadKind, Validate};
