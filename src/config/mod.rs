//! Connection configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConnectionConfig`] | Immutable per-session parameters |
//! | [`ConnectionConfigBuilder`] | Fluent, validating builder |
//! | [`Credential`] | Auth token with redacted `Debug` |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for connection configuration.
pub mod builder;

/// Connection parameters and defaults.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionConfigBuilder;
pub use options::{ConnectionConfig, Credential};
