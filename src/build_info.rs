//! Information about the build of this crate.

/// Client ID used when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "kafka-lag";
