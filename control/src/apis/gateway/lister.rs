//! GatewayClass lister
//!
//! Read-only lookups over the informer cache. Results are shared with the
//! cache and must not be mutated; clone before modifying.

use crate::error::{InformerError, Result};
use crate::informer::Indexer;
use crate::selector::{Selector, SelectorExt};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use kube::ResourceExt;
use std::sync::Arc;

#[derive(Clone)]
pub struct GatewayClassLister {
    indexer: Indexer<GatewayClass>,
}

impl GatewayClassLister {
    pub fn new(indexer: Indexer<GatewayClass>) -> Self {
        Self { indexer }
    }

    /// All cached GatewayClasses whose labels match `selector`
    pub fn list(&self, selector: &Selector) -> Vec<Arc<GatewayClass>> {
        self.indexer
            .list()
            .into_iter()
            .filter(|gc| selector.matches(gc.labels()))
            .collect()
    }

    /// Cached GatewayClass by name
    pub fn get(&self, name: &str) -> Result<Arc<GatewayClass>> {
        self.indexer
            .get_by_key(name)
            .ok_or_else(|| InformerError::NotFound {
                kind: "GatewayClass".to_string(),
                name: name.to_string(),
            })
    }
}
