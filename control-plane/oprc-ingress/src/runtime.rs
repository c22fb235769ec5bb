use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    cluster::{KubeIngressClient, WatchCache},
    config::IngressCtrlConfig,
    controller::{
        IngressController, reconcile::Reconciler, retry::RetryPolicy,
        router::EventRouter,
    },
    queue::WorkQueue,
    templates::IngressTemplate,
    web::{Readiness, run_http_server},
};

pub const QUEUE_NAME: &str = "ingressManager";
pub const FIELD_MANAGER: &str = "oprc-ingress";

/// Compute the HTTP bind address based on config.
pub fn compute_http_addr(cfg: &IngressCtrlConfig) -> SocketAddr {
    ([0, 0, 0, 0], cfg.http_port).into()
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        res = tokio::signal::ctrl_c() => {
                            if let Err(e) = res {
                                error!(error = %e, "unable to listen for shutdown signal");
                            }
                        }
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "unable to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "unable to listen for shutdown signal");
            }
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });
}

/// Serve the health endpoint in the background. If the server stops with an
/// error, the whole process is asked to shut down.
pub fn spawn_http_server(
    addr: SocketAddr,
    ready: Readiness,
    shutdown: CancellationToken,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let res = run_http_server(addr, ready, shutdown.clone()).await;
        if let Err(e) = &res {
            error!(%addr, error = %e, "health endpoint failed; shutting down");
            shutdown.cancel();
        }
        res
    })
}

/// Periodically enqueue everything in the cache.
pub async fn resync_loop(
    router: Arc<EventRouter>,
    cache: WatchCache,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                router.resync(&cache.services.state(), &cache.ingresses.state());
            }
        }
    }
}

/// Start the watches, wait for them to sync, then run the controller and the
/// health endpoint until a shutdown signal arrives.
pub async fn run_all(client: Client, cfg: IngressCtrlConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let ready = Readiness::default();
    let http =
        spawn_http_server(compute_http_addr(&cfg), ready.clone(), shutdown.clone());

    let queue = WorkQueue::new(QUEUE_NAME, cfg.rate_limit.build());
    let router = Arc::new(EventRouter::new(
        queue.clone(),
        cfg.enqueue_on_source_delete,
    ));
    let (cache, informers) =
        WatchCache::start(client.clone(), &cfg.k8s_namespace, router.clone())
            .await?;

    tokio::select! {
        res = cache.wait_until_ready() => res?,
        _ = shutdown.cancelled() => {
            informers.iter().for_each(|t| t.abort());
            return http.await?;
        }
    }
    ready.mark_ready();
    info!(pending = queue.len(), "caches synced; starting controller");

    let reconciler = Reconciler::new(
        Arc::new(cache.services.clone()),
        Arc::new(cache.ingresses.clone()),
        Arc::new(KubeIngressClient::new(client, FIELD_MANAGER)),
        IngressTemplate::from(&cfg.template),
        cfg.marker_annotation.clone(),
    );
    let controller = Arc::new(IngressController::new(
        queue,
        reconciler,
        RetryPolicy::new(cfg.max_retries),
        cfg.workers,
        cfg.worker_restart_delay(),
    ));

    if let Some(interval) = cfg.resync_interval() {
        info!(interval_secs = interval.as_secs(), "periodic resync enabled");
        tokio::spawn(resync_loop(router, cache.clone(), interval, shutdown.clone()));
    }

    controller.run(shutdown).await;
    informers.iter().for_each(|t| t.abort());
    http.await?
}
