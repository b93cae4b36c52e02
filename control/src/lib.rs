//! Shared informers for the Gateway API
//!
//! A GatewayClass informer keeps a local, indexed cache of the cluster's
//! GatewayClasses in sync through list/watch, fans change notifications
//! out to registered handlers, and exposes a typed lister over the cache.
//! Informers are shared per resource type through [`SharedInformerFactory`].

pub mod apis;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod informer;
pub mod selector;

#[cfg(test)]
mod testing;

pub use apis::gateway::gateway_class::{
    new_filtered_gateway_class_informer, new_gateway_class_informer, GatewayClassInformer,
};
pub use apis::gateway::lister::GatewayClassLister;
pub use client::{Clientset, GatewayInterface, ListOptions, ResourceClient, TweakListOptions};
pub use config::InformerConfig;
pub use error::{InformerError, Result};
pub use factory::{InformerFactory, SharedInformerFactory};
pub use informer::{ResourceEventHandler, SharedIndexInformer};
pub use selector::{parse_selector, Selector};
