//! Domain Layer - Trading entities and the reconciliation core.
//!
//! Pure types and algorithms with no I/O. Everything here is synchronous
//! and driven by the application layer.

/// Orders, trades, holdings and instruments.
pub mod trading;

/// The optimistic-apply-then-reconcile store.
pub mod reconciliation;

/// Slice-based publish/subscribe.
pub mod subscription;
