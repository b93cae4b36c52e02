//! Typed clientset for the Gateway API group
//!
//! Exposes the list/watch REST calls the informers need. Each resource
//! client takes [`ListOptions`] and returns whatever the API server (or the
//! transport) returns, without retry or translation.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use kube::api::{Api, ListParams, ObjectList, WatchEvent, WatchParams};
use kube::Client;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Stream of raw watch events as returned by the API server
pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>, kube::Error>>;

/// Hook that rewrites list options before every list and watch call
///
/// Typically used to narrow a shared informer with label or field selectors.
pub type TweakListOptions = Arc<dyn Fn(&mut ListOptions) + Send + Sync>;

/// Query options for list and watch requests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    /// Version to list at or watch from
    pub resource_version: Option<String>,
    /// Server-side timeout for the request
    pub timeout_seconds: Option<u32>,
    pub limit: Option<u32>,
    pub continue_token: Option<String>,
    pub allow_watch_bookmarks: bool,
}

impl ListOptions {
    /// Build list parameters for a `LIST` request
    pub fn to_list_params(&self) -> ListParams {
        let mut params = ListParams::default();
        params.label_selector = self.label_selector.clone();
        params.field_selector = self.field_selector.clone();
        params.resource_version = self.resource_version.clone();
        params.timeout = self.timeout_seconds;
        params.limit = self.limit;
        params.continue_token = self.continue_token.clone();
        params
    }

    /// Build watch parameters for a `WATCH` request
    pub fn to_watch_params(&self) -> WatchParams {
        let mut params = WatchParams::default();
        params.label_selector = self.label_selector.clone();
        params.field_selector = self.field_selector.clone();
        params.timeout = self.timeout_seconds;
        params.bookmarks = self.allow_watch_bookmarks;
        params
    }

    /// Resource version a watch starts from ("0" means any)
    pub fn watch_version(&self) -> &str {
        self.resource_version.as_deref().unwrap_or("0")
    }
}

/// List/watch capability for a single resource type
#[async_trait]
pub trait ResourceClient<K: Clone>: Send + Sync {
    async fn list(&self, options: &ListOptions) -> Result<ObjectList<K>, kube::Error>;

    async fn watch(&self, options: &ListOptions) -> Result<WatchStream<K>, kube::Error>;
}

/// Gateway API group (v1) client capability
pub trait GatewayInterface: Send + Sync {
    fn gateway_classes(&self) -> Arc<dyn ResourceClient<GatewayClass>>;
}

/// Resource client backed by a kube [`Api`]
pub struct KubeResourceClient<K> {
    api: Api<K>,
}

impl<K> KubeResourceClient<K>
where
    K: kube::Resource<Scope = k8s_openapi::ClusterResourceScope>,
    K::DynamicType: Default,
{
    /// Client for a cluster-scoped resource
    pub fn cluster(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl<K> ResourceClient<K> for KubeResourceClient<K>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn list(&self, options: &ListOptions) -> Result<ObjectList<K>, kube::Error> {
        debug!(?options, "LIST {}", self.api.resource_url());
        self.api.list(&options.to_list_params()).await
    }

    async fn watch(&self, options: &ListOptions) -> Result<WatchStream<K>, kube::Error> {
        debug!(?options, "WATCH {}", self.api.resource_url());
        let stream = self
            .api
            .watch(&options.to_watch_params(), options.watch_version())
            .await?;
        Ok(stream.boxed())
    }
}

/// Clientset over a shared kube [`Client`]
#[derive(Clone)]
pub struct Clientset {
    client: Client,
}

impl Clientset {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl GatewayInterface for Clientset {
    fn gateway_classes(&self) -> Arc<dyn ResourceClient<GatewayClass>> {
        Arc::new(KubeResourceClient::<GatewayClass>::cluster(
            self.client.clone(),
        ))
    }
}
