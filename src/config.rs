use serde::{Deserialize, Serialize};

use crate::security::audit::AuditConfig;
use crate::security::rate_limit::RateLimitConfig;

/// Configuration consumed from the environment by the embedding process and
/// passed in. The role hierarchy and the workflow transition table are fixed
/// in code and deliberately absent here.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub rate_limit: RateLimitConfig,
    pub audit: AuditConfig,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let config = Self {
            rate_limit: RateLimitConfig::from_env(),
            audit: AuditConfig::from_env(),
        };
        log::debug!(
            "core config loaded: rate window {}s, {} req/window, audit {}",
            config.rate_limit.window_secs,
            config.rate_limit.max_requests,
            if config.audit.enabled { "on" } else { "off" }
        );
        config
    }
}

/// Serializable view for diagnostics endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_enabled: bool,
    pub audit_enabled: bool,
    pub audit_buffer_size: usize,
}

impl From<&CoreConfig> for ConfigSummary {
    fn from(config: &CoreConfig) -> Self {
        Self {
            rate_limit_window_secs: config.rate_limit.window_secs,
            rate_limit_max_requests: config.rate_limit.max_requests,
            rate_limit_enabled: config.rate_limit.enabled,
            audit_enabled: config.audit.enabled,
            audit_buffer_size: config.audit.buffer_size,
        }
    }
}
