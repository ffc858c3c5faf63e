//! # Operator Configuration
//!
//! Operator-level settings loaded from environment variables.

use crate::constants::*;
use std::path::PathBuf;
use std::time::Duration;

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Requeue after an unexpected reconciliation error when backoff is unavailable (seconds)
    pub reconciliation_error_requeue_secs: u64,
    /// Watch stream backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Watch stream backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Fibonacci backoff bounds for reconciliation errors (seconds)
    pub error_backoff_min_secs: u64,
    pub error_backoff_max_secs: u64,
    /// Requeue while a referenced instance is not ready (seconds)
    pub not_ready_requeue_secs: u64,
    /// Requeue after remote API or network failures (seconds)
    pub transient_requeue_secs: u64,
    /// Requeue after unresolvable credentials or configuration (seconds)
    pub unsatisfied_requeue_secs: u64,
    /// Requeue while managed resources roll out (seconds)
    pub deploying_requeue_secs: u64,
    /// Periodic resync of converged resources (seconds)
    pub ready_resync_secs: u64,
    /// Polling interval of in-progress tests (seconds)
    pub test_poll_interval_secs: u64,
    /// Delay before a completed test's retention policy is applied (seconds)
    pub retention_check_delay_secs: u64,
    /// Remote API timeouts (seconds)
    pub remote_connect_timeout_secs: u64,
    pub remote_request_timeout_secs: u64,
    /// Directory overriding the embedded defaults documents
    pub defaults_dir: Option<PathBuf>,
    /// Namespace where the operator is deployed
    pub operator_namespace: String,
    /// Maximum concurrent reconciliations per kind
    pub max_concurrent_reconciliations: u16,
    /// Metrics and probe server port
    pub metrics_port: u16,
    /// Server startup timeout (seconds)
    pub server_startup_timeout_secs: u64,
    /// Server readiness poll interval (milliseconds)
    pub server_poll_interval_ms: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            error_backoff_min_secs: DEFAULT_ERROR_BACKOFF_MIN_SECS,
            error_backoff_max_secs: DEFAULT_ERROR_BACKOFF_MAX_SECS,
            not_ready_requeue_secs: DEFAULT_NOT_READY_REQUEUE_SECS,
            transient_requeue_secs: DEFAULT_TRANSIENT_REQUEUE_SECS,
            unsatisfied_requeue_secs: DEFAULT_UNSATISFIED_REQUEUE_SECS,
            deploying_requeue_secs: DEFAULT_DEPLOYING_REQUEUE_SECS,
            ready_resync_secs: DEFAULT_READY_RESYNC_SECS,
            test_poll_interval_secs: DEFAULT_TEST_POLL_INTERVAL_SECS,
            retention_check_delay_secs: DEFAULT_RETENTION_CHECK_DELAY_SECS,
            remote_connect_timeout_secs: DEFAULT_REMOTE_CONNECT_TIMEOUT_SECS,
            remote_request_timeout_secs: DEFAULT_REMOTE_REQUEST_TIMEOUT_SECS,
            defaults_dir: None,
            operator_namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            max_concurrent_reconciliations: 10,
            metrics_port: DEFAULT_METRICS_PORT,
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            reconciliation_error_requeue_secs: env_var_or_default(
                "RECONCILIATION_ERROR_REQUEUE_SECS",
                DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            ),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            error_backoff_min_secs: env_var_or_default(
                "ERROR_BACKOFF_MIN_SECS",
                DEFAULT_ERROR_BACKOFF_MIN_SECS,
            ),
            error_backoff_max_secs: env_var_or_default(
                "ERROR_BACKOFF_MAX_SECS",
                DEFAULT_ERROR_BACKOFF_MAX_SECS,
            ),
            not_ready_requeue_secs: env_var_or_default(
                "NOT_READY_REQUEUE_SECS",
                DEFAULT_NOT_READY_REQUEUE_SECS,
            ),
            transient_requeue_secs: env_var_or_default(
                "TRANSIENT_REQUEUE_SECS",
                DEFAULT_TRANSIENT_REQUEUE_SECS,
            ),
            unsatisfied_requeue_secs: env_var_or_default(
                "UNSATISFIED_REQUEUE_SECS",
                DEFAULT_UNSATISFIED_REQUEUE_SECS,
            ),
            deploying_requeue_secs: env_var_or_default(
                "DEPLOYING_REQUEUE_SECS",
                DEFAULT_DEPLOYING_REQUEUE_SECS,
            ),
            ready_resync_secs: env_var_or_default("READY_RESYNC_SECS", DEFAULT_READY_RESYNC_SECS),
            test_poll_interval_secs: env_var_or_default(
                "TEST_POLL_INTERVAL_SECS",
                DEFAULT_TEST_POLL_INTERVAL_SECS,
            ),
            retention_check_delay_secs: env_var_or_default(
                "RETENTION_CHECK_DELAY_SECS",
                DEFAULT_RETENTION_CHECK_DELAY_SECS,
            ),
            remote_connect_timeout_secs: env_var_or_default(
                "REMOTE_CONNECT_TIMEOUT_SECS",
                DEFAULT_REMOTE_CONNECT_TIMEOUT_SECS,
            ),
            remote_request_timeout_secs: env_var_or_default(
                "REMOTE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REMOTE_REQUEST_TIMEOUT_SECS,
            ),
            defaults_dir: std::env::var("DEFAULTS_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            operator_namespace: env_var_or_default_str("POD_NAMESPACE", DEFAULT_OPERATOR_NAMESPACE),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                10,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            server_startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            server_poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
        }
    }

    pub fn not_ready_requeue(&self) -> Duration {
        Duration::from_secs(self.not_ready_requeue_secs)
    }

    pub fn transient_requeue(&self) -> Duration {
        Duration::from_secs(self.transient_requeue_secs)
    }

    pub fn unsatisfied_requeue(&self) -> Duration {
        Duration::from_secs(self.unsatisfied_requeue_secs)
    }

    pub fn deploying_requeue(&self) -> Duration {
        Duration::from_secs(self.deploying_requeue_secs)
    }

    pub fn ready_resync(&self) -> Duration {
        Duration::from_secs(self.ready_resync_secs)
    }

    pub fn test_poll_interval(&self) -> Duration {
        Duration::from_secs(self.test_poll_interval_secs)
    }

    pub fn retention_check_delay(&self) -> Duration {
        Duration::from_secs(self.retention_check_delay_secs)
    }

    pub fn remote_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_connect_timeout_secs)
    }

    pub fn remote_request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_request_timeout_secs)
    }

    pub fn reconciliation_error_requeue(&self) -> Duration {
        Duration::from_secs(self.reconciliation_error_requeue_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
