//! GatewayClass informer
//!
//! Type-specific glue between the Gateway API clientset and the shared
//! informer machinery: which list/watch calls to issue, and which object
//! type the cache holds.

use super::lister::GatewayClassLister;
use crate::client::{GatewayInterface, TweakListOptions};
use crate::factory::{InformerFactory, SharedInformerFactory};
use crate::informer::{namespace_indexers, Indexers, ListWatch, SharedIndexInformer};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use std::sync::Arc;
use std::time::Duration;

/// Build an independent GatewayClass informer
///
/// Prefer [`GatewayClassInformer::informer`] from a factory; independent
/// informers hold their own cache and their own watch connection.
pub fn new_gateway_class_informer(
    client: Arc<dyn GatewayInterface>,
    resync_period: Duration,
    indexers: Indexers<GatewayClass>,
) -> SharedIndexInformer<GatewayClass> {
    new_filtered_gateway_class_informer(client, resync_period, indexers, None)
}

/// Build an independent GatewayClass informer whose list and watch options
/// pass through `tweak` first
pub fn new_filtered_gateway_class_informer(
    client: Arc<dyn GatewayInterface>,
    resync_period: Duration,
    indexers: Indexers<GatewayClass>,
    tweak: Option<TweakListOptions>,
) -> SharedIndexInformer<GatewayClass> {
    let list_watch = ListWatch::for_client(client.gateway_classes(), tweak);
    SharedIndexInformer::new(list_watch, resync_period, indexers)
}

/// Access to the shared GatewayClass informer and lister
#[derive(Clone)]
pub struct GatewayClassInformer<F = SharedInformerFactory> {
    factory: F,
    tweak: Option<TweakListOptions>,
}

impl<F: InformerFactory> GatewayClassInformer<F> {
    pub fn new(factory: F, tweak: Option<TweakListOptions>) -> Self {
        Self { factory, tweak }
    }

    /// The factory-shared informer, created on first use with the
    /// namespace indexer
    pub fn informer(&self) -> Arc<SharedIndexInformer<GatewayClass>> {
        let tweak = self.tweak.clone();
        self.factory.informer_for(move |client, resync_period| {
            new_filtered_gateway_class_informer(client, resync_period, namespace_indexers(), tweak)
        })
    }

    pub fn lister(&self) -> GatewayClassLister {
        GatewayClassLister::new(self.informer().indexer())
    }
}
