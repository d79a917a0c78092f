//! Tracer configuration.
//!
//! [`TracerConfig`] is a point-in-time snapshot of the settings the finish
//! protocol consults. It is re-fetched from the [`ConfigProvider`] on
//! every finish event, so a live provider may change values between calls
//! with no consistency guarantee across a single trace's lifetime.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Enables generation of 128-bit trace identifiers for trace roots.
pub(crate) const ENV_128_BIT_TRACEID_ENABLED: &str = "DD_TRACE_128_BIT_TRACEID_GENERATION_ENABLED";
/// Enables flushing finished spans before the whole trace completes.
pub(crate) const ENV_PARTIAL_FLUSH_ENABLED: &str = "DD_TRACE_PARTIAL_FLUSH_ENABLED";
/// Minimum number of finished spans required to trigger a partial flush.
pub(crate) const ENV_PARTIAL_FLUSH_MIN_SPANS: &str = "DD_TRACE_PARTIAL_FLUSH_MIN_SPANS";
/// Default minimum number of finished spans for a partial flush.
pub(crate) const DEFAULT_PARTIAL_FLUSH_MIN_SPANS: usize = 1_000;
/// The service name reported for spans that don't set their own.
pub(crate) const ENV_SERVICE: &str = "DD_SERVICE";
/// Enables computing a default `peer.service` tag for outbound spans.
pub(crate) const ENV_PEER_SERVICE_DEFAULTS: &str = "DD_TRACE_PEER_SERVICE_DEFAULTS_ENABLED";
/// Comma-separated `from:to` pairs remapping resolved `peer.service` values.
pub(crate) const ENV_PEER_SERVICE_MAPPING: &str = "DD_TRACE_PEER_SERVICE_MAPPING";

/// A snapshot of the live tracer settings consulted by the finish protocol.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct TracerConfig {
    /// The globally configured service name.
    pub service: String,

    /// Whether trace roots generate a time-derived upper trace-id half.
    pub trace_128_bit_id_enabled: bool,

    /// Whether finished spans may be flushed before the trace completes.
    pub partial_flush_enabled: bool,

    /// Number of finished spans required before a partial flush fires.
    pub partial_flush_min_spans: usize,

    /// Whether outbound spans get a computed default `peer.service`.
    pub peer_service_defaults: bool,

    /// User-configured remappings applied to resolved `peer.service` values.
    pub peer_service_mappings: HashMap<String, String>,
}

impl Default for TracerConfig {
    /// Create the default configuration, overridden by environment
    /// variables where set.
    fn default() -> Self {
        let mut config = TracerConfig {
            service: String::new(),
            trace_128_bit_id_enabled: true,
            partial_flush_enabled: false,
            partial_flush_min_spans: DEFAULT_PARTIAL_FLUSH_MIN_SPANS,
            peer_service_defaults: false,
            peer_service_mappings: HashMap::new(),
        };

        if let Ok(service) = env::var(ENV_SERVICE) {
            config.service = service;
        }

        if let Some(enabled) = bool_env(ENV_128_BIT_TRACEID_ENABLED) {
            config.trace_128_bit_id_enabled = enabled;
        }

        if let Some(enabled) = bool_env(ENV_PARTIAL_FLUSH_ENABLED) {
            config.partial_flush_enabled = enabled;
        }

        if let Some(min_spans) = env::var(ENV_PARTIAL_FLUSH_MIN_SPANS)
            .ok()
            .and_then(|v| usize::from_str(&v).ok())
        {
            config.partial_flush_min_spans = min_spans;
        }

        if let Some(enabled) = bool_env(ENV_PEER_SERVICE_DEFAULTS) {
            config.peer_service_defaults = enabled;
        }

        if let Ok(mapping) = env::var(ENV_PEER_SERVICE_MAPPING) {
            config.peer_service_mappings = parse_mappings(&mapping);
        }

        config
    }
}

fn bool_env(key: &str) -> Option<bool> {
    let raw = env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

fn parse_mappings(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (from, to) = pair.split_once(':')?;
            let (from, to) = (from.trim(), to.trim());
            if from.is_empty() || to.is_empty() {
                return None;
            }
            Some((from.to_string(), to.to_string()))
        })
        .collect()
}

/// Live configuration, sampled by the finish protocol once per finish
/// event.
pub trait ConfigProvider: Send + Sync + fmt::Debug {
    /// The current settings snapshot.
    fn tracer_config(&self) -> TracerConfig;
}

/// A [`ConfigProvider`] that always returns the same settings.
#[derive(Clone, Debug, Default)]
pub struct FixedConfig(pub TracerConfig);

impl ConfigProvider for FixedConfig {
    fn tracer_config(&self) -> TracerConfig {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_without_env() {
        let env_vars = vec![
            ENV_SERVICE,
            ENV_128_BIT_TRACEID_ENABLED,
            ENV_PARTIAL_FLUSH_ENABLED,
            ENV_PARTIAL_FLUSH_MIN_SPANS,
            ENV_PEER_SERVICE_DEFAULTS,
            ENV_PEER_SERVICE_MAPPING,
        ];

        let config = temp_env::with_vars_unset(env_vars, TracerConfig::default);

        assert_eq!(config.service, "");
        assert!(config.trace_128_bit_id_enabled);
        assert!(!config.partial_flush_enabled);
        assert_eq!(
            config.partial_flush_min_spans,
            DEFAULT_PARTIAL_FLUSH_MIN_SPANS
        );
        assert!(!config.peer_service_defaults);
        assert!(config.peer_service_mappings.is_empty());
    }

    #[test]
    fn config_overridden_by_env() {
        let env_vars = vec![
            (ENV_SERVICE, Some("billing")),
            (ENV_128_BIT_TRACEID_ENABLED, Some("false")),
            (ENV_PARTIAL_FLUSH_ENABLED, Some("true")),
            (ENV_PARTIAL_FLUSH_MIN_SPANS, Some("50")),
            (ENV_PEER_SERVICE_DEFAULTS, Some("1")),
            (ENV_PEER_SERVICE_MAPPING, Some("old-db:payments-db, a:b")),
        ];

        let config = temp_env::with_vars(env_vars, TracerConfig::default);

        assert_eq!(config.service, "billing");
        assert!(!config.trace_128_bit_id_enabled);
        assert!(config.partial_flush_enabled);
        assert_eq!(config.partial_flush_min_spans, 50);
        assert!(config.peer_service_defaults);
        assert_eq!(
            config.peer_service_mappings.get("old-db").map(String::as_str),
            Some("payments-db")
        );
        assert_eq!(
            config.peer_service_mappings.get("a").map(String::as_str),
            Some("b")
        );
    }

    #[test]
    fn malformed_env_values_fall_back_to_defaults() {
        let env_vars = vec![
            (ENV_PARTIAL_FLUSH_ENABLED, Some("yes")),
            (ENV_PARTIAL_FLUSH_MIN_SPANS, Some("many")),
        ];

        let config = temp_env::with_vars(env_vars, TracerConfig::default);

        assert!(!config.partial_flush_enabled);
        assert_eq!(
            config.partial_flush_min_spans,
            DEFAULT_PARTIAL_FLUSH_MIN_SPANS
        );
    }
}
