//! Structured logging for applications embedding the database facade.
//!
//! Passwords handed to [`Connection::open`](crate::Connection::open) are
//! registered here so that connection strings echoed into log lines never
//! carry them in clear text.

use aho_corasick::AhoCorasick;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};

static REDACTION_REGISTRY: Lazy<DashMap<String, ()>> = Lazy::new(DashMap::new);

/// Install a `tracing` subscriber writing JSON lines to stderr.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling it more
/// than once is harmless; only the first subscriber is kept.
pub fn init_logging() {
    let env_filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .json()
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Remember a credential so [`redact`] can mask it.
pub fn register_for_redaction(value: &str) {
    if !value.is_empty() && !REDACTION_REGISTRY.contains_key(value) {
        REDACTION_REGISTRY.insert(value.to_string(), ());
        debug!("registered credential for log redaction");
    }
}

pub fn register_secret_for_redaction(secret: &SecretString) {
    register_for_redaction(secret.expose_secret());
}

/// Replace every registered credential in `input` with `[REDACTED]`.
pub fn redact(input: &str) -> String {
    if REDACTION_REGISTRY.is_empty() {
        return input.to_string();
    }

    let patterns: Vec<String> = REDACTION_REGISTRY
        .iter()
        .map(|entry| entry.key().clone())
        .collect();

    match AhoCorasick::new(&patterns) {
        Ok(ac) => {
            let replacements = vec!["[REDACTED]"; ac.patterns_len()];
            ac.replace_all(input, &replacements)
        }
        Err(e) => {
            error!("failed to build redaction automaton: {}", e);
            input.to_string()
        }
    }
}

/// Log through `tracing` after masking registered credentials.
#[macro_export]
macro_rules! safe_log {
    (error, $($arg:tt)+) => {{
        let msg = format!($($arg)+);
        ::tracing::error!("{}", $crate::logging::redact(&msg));
    }};
    (warn, $($arg:tt)+) => {{
        let msg = format!($($arg)+);
        ::tracing::warn!("{}", $crate::logging::redact(&msg));
    }};
    (info, $($arg:tt)+) => {{
        let msg = format!($($arg)+);
        ::tracing::info!("{}", $crate::logging::redact(&msg));
    }};
    (debug, $($arg:tt)+) => {{
        let msg = format!($($arg)+);
        ::tracing::debug!("{}", $crate::logging::redact(&msg));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_credentials_are_masked() {
        register_for_redaction("hunter2-logging-test");
        let line = redact("DSN=test;UID=app;PWD=hunter2-logging-test");
        assert_eq!(line, "DSN=test;UID=app;PWD=[REDACTED]");
    }

    #[test]
    fn empty_values_are_ignored() {
        register_for_redaction("");
        assert!(!REDACTION_REGISTRY.contains_key(""));
    }

    #[test]
    fn secret_strings_register_their_value() {
        let secret = SecretString::new("s3cr3t-logging-test".to_string());
        register_secret_for_redaction(&secret);
        assert!(redact("password=s3cr3t-logging-test").contains("[REDACTED]"));
    }
}
