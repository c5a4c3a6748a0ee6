//! Configuration management for the application service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The binary loads `.env` first; business logic only ever sees the
//! resulting [`AppConfig`].

use crate::role::RoleConfig;
use filplus_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address lists for role resolution.
    pub roles: RoleConfig,
    /// Bound on every blockchain / pull-request call, in milliseconds.
    pub collaborator_timeout_ms: u64,
    /// Retries after a retryable command failure.
    pub command_max_retries: usize,
    /// First retry delay, in milliseconds.
    pub command_retry_initial_delay_ms: u64,
    /// Event bus topic for application events.
    pub events_topic: String,
    /// Worker tasks applying events to the read model.
    pub projection_workers: usize,
    /// Threshold used when RKH approval starts without one.
    pub rkh_approval_threshold: u32,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            roles: RoleConfig::default(),
            collaborator_timeout_ms: 10_000,
            command_max_retries: 3,
            command_retry_initial_delay_ms: 50,
            events_topic: "application-events".to_string(),
            projection_workers: 8,
            rkh_approval_threshold: 2,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparsable values fall back to [`AppConfig::default`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let list = |key: &str| lookup(key).map(|raw| RoleConfig::parse_list(&raw)).unwrap_or_default();
        Self {
            roles: RoleConfig {
                governance_review_addresses: list("GOVERNANCE_REVIEW_ADDRESSES"),
                rkh_addresses: list("RKH_ADDRESSES"),
                ma_addresses: list("MA_ADDRESSES"),
            },
            collaborator_timeout_ms: parsed(&lookup, "COLLABORATOR_TIMEOUT_MS")
                .unwrap_or(defaults.collaborator_timeout_ms),
            command_max_retries: parsed(&lookup, "COMMAND_MAX_RETRIES").unwrap_or(defaults.command_max_retries),
            command_retry_initial_delay_ms: parsed(&lookup, "COMMAND_RETRY_INITIAL_DELAY_MS")
                .unwrap_or(defaults.command_retry_initial_delay_ms),
            events_topic: lookup("APPLICATION_EVENTS_TOPIC")
                .filter(|topic| !topic.trim().is_empty())
                .unwrap_or(defaults.events_topic),
            projection_workers: parsed(&lookup, "PROJECTION_WORKERS")
                .filter(|workers| *workers > 0)
                .unwrap_or(defaults.projection_workers),
            rkh_approval_threshold: parsed(&lookup, "RKH_APPROVAL_THRESHOLD")
                .filter(|threshold| *threshold > 0)
                .unwrap_or(defaults.rkh_approval_threshold),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// Collaborator call bound.
    #[must_use]
    pub const fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Retry policy for the command bus.
    #[must_use]
    pub fn command_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.command_max_retries)
            .initial_delay(Duration::from_millis(self.command_retry_initial_delay_ms))
            .build()
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(AppConfig::from_source(source(&[])), AppConfig::default());
    }

    #[test]
    fn values_are_read_and_lists_normalized() {
        let config = AppConfig::from_source(source(&[
            ("GOVERNANCE_REVIEW_ADDRESSES", "F1Gov, f1gov2"),
            ("RKH_ADDRESSES", "f1rkh"),
            ("COLLABORATOR_TIMEOUT_MS", "250"),
            ("COMMAND_MAX_RETRIES", "5"),
            ("APPLICATION_EVENTS_TOPIC", "apps"),
            ("RKH_APPROVAL_THRESHOLD", "3"),
            ("PROJECTION_WORKERS", "2"),
        ]));
        assert_eq!(config.roles.governance_review_addresses, vec!["f1gov", "f1gov2"]);
        assert_eq!(config.roles.rkh_addresses, vec!["f1rkh"]);
        assert!(config.roles.ma_addresses.is_empty());
        assert_eq!(config.collaborator_timeout(), Duration::from_millis(250));
        assert_eq!(config.command_retry_policy().max_retries, 5);
        assert_eq!(config.events_topic, "apps");
        assert_eq!(config.rkh_approval_threshold, 3);
        assert_eq!(config.projection_workers, 2);
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let config = AppConfig::from_source(source(&[
            ("COLLABORATOR_TIMEOUT_MS", "soon"),
            ("RKH_APPROVAL_THRESHOLD", "0"),
            ("PROJECTION_WORKERS", "0"),
        ]));
        assert_eq!(config.collaborator_timeout_ms, 10_000);
        assert_eq!(config.rkh_approval_threshold, 2);
        assert_eq!(config.projection_workers, 8);
    }
}
