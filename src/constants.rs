//! # Constants
//!
//! Default values and well-known names used across the operator.

/// Microcks version used when `spec.version` is unset
pub const DEFAULT_MICROCKS_VERSION: &str = "1.10.1";

/// Field manager for server-side apply
pub const FIELD_MANAGER: &str = "microcks-operator";

/// Finalizer guarding cleanup of every kind owned by the operator
pub const FINALIZER: &str = "microcks.io/finalizer";

/// Satellite annotation naming the target Microcks instance
pub const INSTANCE_ANNOTATION: &str = "microcks.io/instance";

/// Satellite annotation overriding the instance namespace
pub const INSTANCE_NAMESPACE_ANNOTATION: &str = "microcks.io/instance-namespace";

/// Satellite annotation naming a Secret with explicit service account credentials
pub const SERVICE_ACCOUNT_SECRET_ANNOTATION: &str = "microcks.io/service-account-secret";

/// Keys of the explicit service account Secret
pub const SERVICE_ACCOUNT_PRINCIPAL_KEY: &str = "principal";
pub const SERVICE_ACCOUNT_SECRET_KEY: &str = "secret";

/// Key of the generated realm document inside the `<name>-keycloak-config` Secret
pub const REALM_CONFIG_KEY: &str = "microcks-realm.json";

/// Realm client the operator authenticates as when `keycloak.serviceAccount` is unset
pub const DEFAULT_SERVICE_ACCOUNT: &str = "microcks-serviceaccount";

/// Bearer token used when the instance runs without authentication
pub const ANONYMOUS_TOKEN: &str = "<anonymous-admin-token>";

/// Port of the Microcks and Keycloak services
pub const MICROCKS_HTTP_PORT: i32 = 8080;
pub const MICROCKS_GRPC_PORT: i32 = 9090;
pub const KEYCLOAK_HTTP_PORT: i32 = 8080;
pub const POSTMAN_HTTP_PORT: i32 = 3000;
pub const MONGODB_PORT: i32 = 27017;
pub const ASYNC_MINION_HTTP_PORT: i32 = 8081;

/// Default reconciliation error requeue interval (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Default exponential backoff start (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default watch restart delay after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default watch restart delay after stream ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Requeue while a referenced instance is not ready yet (seconds)
pub const DEFAULT_NOT_READY_REQUEUE_SECS: u64 = 5;

/// Requeue after a remote API or network failure (seconds)
pub const DEFAULT_TRANSIENT_REQUEUE_SECS: u64 = 10;

/// Requeue after a credential or configuration requirement failed (seconds)
pub const DEFAULT_UNSATISFIED_REQUEUE_SECS: u64 = 300;

/// Requeue while managed resources roll out (seconds)
pub const DEFAULT_DEPLOYING_REQUEUE_SECS: u64 = 10;

/// Periodic resync of converged resources (seconds)
pub const DEFAULT_READY_RESYNC_SECS: u64 = 300;

/// Polling interval of an in-progress test (seconds)
pub const DEFAULT_TEST_POLL_INTERVAL_SECS: u64 = 2;

/// Delay between recording a test outcome and applying its retention policy (seconds)
pub const DEFAULT_RETENTION_CHECK_DELAY_SECS: u64 = 3;

/// Remote API connect timeout (seconds)
pub const DEFAULT_REMOTE_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Remote API request timeout (seconds)
pub const DEFAULT_REMOTE_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fibonacci backoff bounds for unexpected reconciliation errors (seconds)
pub const DEFAULT_ERROR_BACKOFF_MIN_SECS: u64 = 5;
pub const DEFAULT_ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// Default metrics/probe server port
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default server poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default namespace of the operator deployment
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "microcks-system";
