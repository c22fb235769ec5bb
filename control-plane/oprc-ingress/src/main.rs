use anyhow::Context;
use envconfig::Envconfig;
use kube::Client;
use oprc_ingress::{config::IngressCtrlConfig, init_tracing, runtime};
use tracing::{debug, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    install_crypto_provider();

    let cfg = IngressCtrlConfig::init_from_env()?.normalize();
    info!(
        namespace = %cfg.k8s_namespace,
        workers = cfg.workers,
        marker = %cfg.marker_annotation,
        "starting ingress controller"
    );
    debug!(?cfg, "effective configuration");

    let client = Client::try_default()
        .await
        .context("unable to build a kubernetes client")?;
    runtime::run_all(client, cfg).await
}

/// kube talks TLS through rustls, which needs a process-wide provider.
fn install_crypto_provider() {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}
