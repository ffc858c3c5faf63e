//! # Watch Loop
//!
//! Runs one kube-runtime `Controller` per managed kind and restarts a
//! controller whose stream ends while the operator is still running.
//!
//! The `Microcks` controller also owns the workloads it produces and is
//! re-triggered by the watch registry when a Strimzi object changes.

use crate::controller::reconciler::{
    api_source, microcks, secret_source, test_run, Reconciler, ReconcilerError,
};
use crate::controller::server::ServerState;
use crate::crd::{APISource, Microcks, SecretSource, Test};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::channel::mpsc::UnboundedReceiver;
use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn, Instrument};

/// Selects the objects produced for any instance
const MANAGED_SELECTOR: &str = "app.kubernetes.io/part-of=microcks";

/// Run the controllers until a shutdown signal is received
///
/// # Errors
///
/// Returns an error only if the loop cannot be set up.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    triggers: UnboundedReceiver<ObjectRef<Microcks>>,
) -> Result<(), anyhow::Error> {
    info!("Starting controller watch loops...");

    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_state.mark_not_ready();
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    // Controllers restart independently; each restart subscribes again
    let (dependency_changes, _) = broadcast::channel::<()>(16);
    tokio::spawn(forward_triggers(triggers, dependency_changes.clone()));

    let microcks_client = client.clone();
    let instances = drive(
        microcks::KIND,
        move || {
            let owned = watcher::Config::default().labels(MANAGED_SELECTOR);
            Controller::new(
                Api::<Microcks>::all(microcks_client.clone()),
                watcher::Config::default().any_semantic(),
            )
            .owns(Api::<Deployment>::all(microcks_client.clone()), owned.clone())
            .owns(Api::<Service>::all(microcks_client.clone()), owned.clone())
            .owns(Api::<Secret>::all(microcks_client.clone()), owned.clone())
            .owns(Api::<ConfigMap>::all(microcks_client.clone()), owned)
            .reconcile_all_on(trigger_stream(dependency_changes.subscribe()))
        },
        microcks::reconcile,
        Arc::clone(&reconciler),
        Arc::clone(&server_state),
    );

    let api_sources_client = client.clone();
    let api_sources = drive(
        api_source::KIND,
        move || {
            Controller::new(
                Api::<APISource>::all(api_sources_client.clone()),
                watcher::Config::default().any_semantic(),
            )
        },
        api_source::reconcile,
        Arc::clone(&reconciler),
        Arc::clone(&server_state),
    );

    let secret_sources_client = client.clone();
    let secret_sources = drive(
        secret_source::KIND,
        move || {
            Controller::new(
                Api::<SecretSource>::all(secret_sources_client.clone()),
                watcher::Config::default().any_semantic(),
            )
        },
        secret_source::reconcile,
        Arc::clone(&reconciler),
        Arc::clone(&server_state),
    );

    let tests_client = client;
    let tests = drive(
        test_run::KIND,
        move || {
            Controller::new(
                Api::<Test>::all(tests_client.clone()),
                watcher::Config::default().any_semantic(),
            )
        },
        test_run::reconcile,
        reconciler,
        server_state,
    );

    tokio::join!(instances, api_sources, secret_sources, tests);

    info!("Controllers stopped gracefully");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM, the signals `shutdown_on_signal` reacts to
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Turn watch-registry triggers into reconcile-all signals
async fn forward_triggers(
    mut triggers: UnboundedReceiver<ObjectRef<Microcks>>,
    sender: broadcast::Sender<()>,
) {
    while let Some(owner) = triggers.next().await {
        debug!(
            trigger_source = "watched-dependency",
            "Dependency of {} changed", owner
        );
        // No subscriber while the controller restarts; the restart reconciles everything anyway
        let _ = sender.send(());
    }
}

fn trigger_stream(receiver: broadcast::Receiver<()>) -> impl Stream<Item = ()> + Send + Sync + 'static {
    futures::stream::unfold(receiver, |mut receiver| async move {
        match receiver.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => Some(((), receiver)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    })
}

/// Run one controller, restarting it when its stream ends
async fn drive<K, B, R, Fut>(
    kind: &'static str,
    build: B,
    reconcile: R,
    ctx: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
    B: Fn() -> Controller<K>,
    R: Fn(Arc<K>, Arc<Reconciler>) -> Fut + Clone,
    Fut: Future<Output = Result<Action, ReconcilerError>> + Send + 'static,
{
    let config = Arc::clone(&ctx.config);
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.backoff_start_ms));

    loop {
        if !server_state.ready() {
            info!("Shutdown requested, exiting {} watch loop", kind);
            break;
        }

        let backoff = Arc::clone(&backoff_duration_ms);
        let stream_config = Arc::clone(&config);
        info!("Starting {} controller...", kind);
        build()
            .with_config(
                controller::Config::default().concurrency(config.max_concurrent_reconciliations),
            )
            .shutdown_on_signal()
            .run(
                reconcile.clone(),
                move |obj, error, ctx| handle_reconciliation_error(kind, &obj, error, &ctx),
                Arc::clone(&ctx),
            )
            .filter_map(move |event| {
                let backoff = Arc::clone(&backoff);
                let config = Arc::clone(&stream_config);
                async move {
                    match event {
                        Ok((object, action)) => {
                            backoff.store(config.backoff_start_ms, Ordering::Relaxed);
                            debug!(resource.name = %object, action = ?action, "watch.event.reconciled");
                            Some(())
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                kind,
                                &error_string,
                                &backoff,
                                config.backoff_max_ms,
                                config.watch_restart_delay_secs,
                            )
                            .await
                        }
                    }
                }
            })
            .for_each(|()| futures::future::ready(()))
            .instrument(info_span!("controller.watch", resource.kind = kind))
            .await;

        if !server_state.ready() {
            info!("Shutdown requested, exiting {} watch loop", kind);
            break;
        }

        let delay_secs = config.watch_restart_delay_after_end_secs;
        warn!(
            "{} controller stream ended, restarting in {} seconds...",
            kind, delay_secs
        );
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
    }
}
