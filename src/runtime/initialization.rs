//! # Initialization
//!
//! Operator startup: rustls, tracing, metrics, the probe server, the
//! Kubernetes client and the shared reconciler context.

use crate::client::MicrocksClientFactory;
use crate::compose::{Composer, DirectoryDefaults};
use crate::config::OperatorConfig;
use crate::controller::reconciler::{microcks, Reconciler, WatchRegistry};
use crate::controller::server::{start_server, ServerState};
use crate::crd::Microcks;
use crate::observability;
use crate::store::KubeStore;
use anyhow::{Context, Result};
use futures::channel::mpsc::UnboundedReceiver;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};

/// Everything the watch loop needs once startup is complete
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
    /// Change triggers emitted by the watch registry
    pub triggers: UnboundedReceiver<ObjectRef<Microcks>>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
/// - Reconcile existing `Microcks` instances
///
/// # Errors
///
/// Returns an error if any startup step fails.
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "microcks_operator=info".into()),
        )
        .init();

    info!("Starting Microcks Operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let config = Arc::new(OperatorConfig::from_env());
    info!("Operator configuration: {:?}", config);

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_listening(&server_state, &server_handle, &config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let composer = match &config.defaults_dir {
        Some(dir) => {
            info!("Loading defaults from {}", dir.display());
            Composer::new(Arc::new(DirectoryDefaults::load(dir)?))
        }
        None => Composer::default(),
    };
    let remote = MicrocksClientFactory::new(&config)
        .context("Failed to build the Microcks API client")?;
    let (watches, triggers) =
        WatchRegistry::new(Duration::from_secs(config.watch_restart_delay_secs));

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeStore::new(client.clone())),
        Arc::new(remote),
        composer,
        Arc::new(watches),
        Arc::clone(&config),
    ));

    reconcile_existing_instances(&client, &reconciler)
        .instrument(info_span!(
            "controller.startup.reconcile_existing",
            resource.kind = microcks::KIND
        ))
        .await;

    server_state.mark_ready();
    info!("Operator initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
        triggers,
    })
}

/// Wait for the HTTP server to bind its port
async fn wait_for_server_listening(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &OperatorConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.server_startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.server_poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.listening() {
            info!("HTTP server is listening");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to start within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Reconcile `Microcks` instances created before the operator started
///
/// Failures are logged and left to the watch loop.
async fn reconcile_existing_instances(client: &Client, reconciler: &Arc<Reconciler>) {
    let instances: Api<Microcks> = Api::all(client.clone());
    let list = match instances.list(&ListParams::default()).await {
        Ok(list) => list,
        Err(e) => {
            error!("Microcks CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - the watch loop will retry");
            return;
        }
    };

    if list.items.is_empty() {
        info!("No existing Microcks instances found, watch will pick up new ones");
        return;
    }

    let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in &list.items {
        by_namespace
            .entry(item.namespace().unwrap_or_default())
            .or_default()
            .push(item.name_any());
    }
    info!(
        "Found {} existing Microcks instances in {} namespaces",
        list.items.len(),
        by_namespace.len()
    );
    for (namespace, mut names) in by_namespace {
        names.sort();
        info!("  {}: {}", namespace, names.join(", "));
    }

    for item in list.items {
        let name = item.name_any();
        let namespace = item.namespace().unwrap_or_default();
        info!(
            trigger_source = "startup",
            "Reconciling existing instance {}/{}", namespace, name
        );
        if let Err(e) = microcks::reconcile(Arc::new(item), Arc::clone(reconciler)).await {
            error!(
                resource.name = name.as_str(),
                resource.namespace = namespace.as_str(),
                error = %e,
                "reconciliation.error"
            );
        }
    }
}
