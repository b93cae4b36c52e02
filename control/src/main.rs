use anyhow::{Context, Result};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_informers::apis::metrics::gather_informer_metrics;
use gateway_informers::{
    Clientset, InformerConfig, ResourceEventHandler, Selector, SharedInformerFactory,
};
use kube::ResourceExt;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Logs every GatewayClass change seen by the informer
struct LoggingHandler;

impl ResourceEventHandler<GatewayClass> for LoggingHandler {
    fn on_add(&self, gc: &Arc<GatewayClass>, is_initial_list: bool) {
        if !is_initial_list {
            info!(
                name = %gc.name_any(),
                controller = %gc.spec.controller_name,
                "GatewayClass added"
            );
        }
    }

    fn on_update(&self, old: &Arc<GatewayClass>, new: &Arc<GatewayClass>) {
        if is_unchanged(old, new) {
            return;
        }
        info!(
            name = %new.name_any(),
            resource_version = %new.resource_version().unwrap_or_default(),
            "GatewayClass updated"
        );
    }

    fn on_delete(&self, gc: &Arc<GatewayClass>) {
        info!(name = %gc.name_any(), "GatewayClass deleted");
    }
}

/// Resyncs and relists redeliver objects the server has not changed
fn is_unchanged(old: &GatewayClass, new: &GatewayClass) -> bool {
    old.resource_version().is_some() && old.resource_version() == new.resource_version()
}

/// GatewayClass informer - caches cluster GatewayClasses and logs changes
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (needed for Kubernetes TLS client)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok(); // Ignore error if already installed

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = InformerConfig::from_env().context("invalid informer configuration")?;
    info!(
        resync_secs = config.resync_period_secs,
        label_selector = config.label_selector.as_deref().unwrap_or(""),
        field_selector = config.field_selector.as_deref().unwrap_or(""),
        "🦀 Starting GatewayClass informer"
    );

    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let mut builder =
        SharedInformerFactory::builder(Arc::new(Clientset::new(client)), config.resync_period());
    if let Some(tweak) = config.tweak() {
        builder = builder.tweak_list_options(tweak);
    }
    let factory = builder.build();

    let gateway_classes = factory.gateway_classes();
    gateway_classes
        .informer()
        .add_event_handler(Arc::new(LoggingHandler));
    let lister = gateway_classes.lister();

    factory.start();

    let synced = factory
        .wait_for_cache_sync(config.cache_sync_timeout())
        .await;
    for (resource, ok) in &synced {
        if !ok {
            warn!(resource = %resource, "Cache did not sync in time, continuing to watch");
        }
    }

    let mut cached = lister.list(&Selector::default());
    cached.sort_by_key(|gc| gc.name_any());
    info!(count = cached.len(), "✅ GatewayClass cache synced");
    for gc in &cached {
        info!(
            name = %gc.name_any(),
            controller = %gc.spec.controller_name,
            "   cached GatewayClass"
        );
    }

    info!("Press Ctrl-C to exit.");
    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    factory.shutdown().await;

    match gather_informer_metrics() {
        Ok(metrics) => info!("Final informer metrics:\n{}", metrics),
        Err(e) => warn!("Failed to gather informer metrics: {}", e),
    }

    Ok(())
}
