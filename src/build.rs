//! Build information baked in by the build script.

/// Short git commit hash of the build, or "unknown".
pub const GIT_HASH: &str = env!("DBABSTRACT_GIT_HASH");

/// Build timestamp in RFC3339 format.
pub const BUILD_TIME_UTC: &str = env!("DBABSTRACT_BUILD_TIME_UTC");

/// `rustc --version` output of the compiler used.
pub const RUSTC_VERSION: &str = env!("DBABSTRACT_RUSTC_VERSION");
