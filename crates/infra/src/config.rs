//! Process configuration loaded from the environment.
//!
//! Marketplace feature flags are data in the marketplace registry, not
//! process configuration; only scheduling and numbering live here.

use std::time::Duration;

use tracing::warn;

pub const SWEEP_INTERVAL_VAR: &str = "TRADEDESK_SWEEP_INTERVAL_SECS";
pub const REPAIR_INTERVAL_VAR: &str = "TRADEDESK_REPAIR_INTERVAL_SECS";
pub const QUOTE_PREFIX_VAR: &str = "TRADEDESK_QUOTE_NUMBER_PREFIX";
pub const ORDER_PREFIX_VAR: &str = "TRADEDESK_ORDER_NUMBER_PREFIX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How often the quote expiry sweeper runs.
    pub sweep_interval: Duration,
    /// How often accepted quotes without an order are reconciled.
    pub repair_interval: Duration,
    pub quote_number_prefix: String,
    pub order_number_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            repair_interval: Duration::from_secs(300),
            quote_number_prefix: "QT".to_string(),
            order_number_prefix: "PO".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Malformed values fall back to the
    /// default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            sweep_interval: secs(&lookup, SWEEP_INTERVAL_VAR, defaults.sweep_interval),
            repair_interval: secs(&lookup, REPAIR_INTERVAL_VAR, defaults.repair_interval),
            quote_number_prefix: prefix(&lookup, QUOTE_PREFIX_VAR, defaults.quote_number_prefix),
            order_number_prefix: prefix(&lookup, ORDER_PREFIX_VAR, defaults.order_number_prefix),
        }
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Duration::from_secs(n),
        _ => {
            warn!(key, value = %raw, default_secs = default.as_secs(), "invalid interval; using default");
            default
        }
    }
}

fn prefix(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: String) -> String {
    let Some(raw) = lookup(key) else {
        return default;
    };
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        trimmed.to_ascii_uppercase()
    } else {
        warn!(key, value = %raw, default = %default, "invalid number prefix; using default");
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_variables_use_defaults() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])), EngineConfig::default());
    }

    #[test]
    fn valid_values_override_defaults() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            (SWEEP_INTERVAL_VAR, "15"),
            (REPAIR_INTERVAL_VAR, " 600 "),
            (QUOTE_PREFIX_VAR, "rfq"),
        ]));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(15));
        assert_eq!(cfg.repair_interval, Duration::from_secs(600));
        assert_eq!(cfg.quote_number_prefix, "RFQ");
        assert_eq!(cfg.order_number_prefix, "PO");
    }

    #[test]
    fn malformed_values_fall_back() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            (SWEEP_INTERVAL_VAR, "0"),
            (REPAIR_INTERVAL_VAR, "soon"),
            (ORDER_PREFIX_VAR, "P-O"),
        ]));
        assert_eq!(cfg, EngineConfig::default());
    }
}
