//! List/watch function pair for a single resource type

use crate::apis::metrics::{record_list_request, record_watch_request};
use crate::client::{ListOptions, ResourceClient, TweakListOptions, WatchStream};
use futures::future::BoxFuture;
use futures::FutureExt;
use kube::api::ObjectList;
use std::sync::Arc;

pub type ListFuture<K> = BoxFuture<'static, Result<ObjectList<K>, kube::Error>>;
pub type WatchFuture<K> = BoxFuture<'static, Result<WatchStream<K>, kube::Error>>;

type ListFn<K> = Box<dyn Fn(ListOptions) -> ListFuture<K> + Send + Sync>;
type WatchFn<K> = Box<dyn Fn(ListOptions) -> WatchFuture<K> + Send + Sync>;

/// The list and watch operations an informer is driven by
///
/// Errors are returned exactly as the underlying transport produced them.
pub struct ListWatch<K: Clone> {
    resource: String,
    list_fn: ListFn<K>,
    watch_fn: WatchFn<K>,
}

impl<K> ListWatch<K>
where
    K: kube::Resource<DynamicType = ()> + Clone + Send + 'static,
{
    pub fn new<L, W>(list_fn: L, watch_fn: W) -> Self
    where
        L: Fn(ListOptions) -> ListFuture<K> + Send + Sync + 'static,
        W: Fn(ListOptions) -> WatchFuture<K> + Send + Sync + 'static,
    {
        Self {
            resource: K::kind(&()).to_string(),
            list_fn: Box::new(list_fn),
            watch_fn: Box::new(watch_fn),
        }
    }

    /// Build the pair over a resource client
    ///
    /// When `tweak` is set it rewrites the options of every list and watch
    /// call before dispatch.
    pub fn for_client(
        client: Arc<dyn ResourceClient<K>>,
        tweak: Option<TweakListOptions>,
    ) -> Self {
        let list_client = client.clone();
        let list_tweak = tweak.clone();
        let list_fn = move |mut options: ListOptions| -> ListFuture<K> {
            if let Some(tweak) = &list_tweak {
                tweak(&mut options);
            }
            let client = list_client.clone();
            async move { client.list(&options).await }.boxed()
        };

        let watch_fn = move |mut options: ListOptions| -> WatchFuture<K> {
            if let Some(tweak) = &tweak {
                tweak(&mut options);
            }
            let client = client.clone();
            async move { client.watch(&options).await }.boxed()
        };

        Self::new(list_fn, watch_fn)
    }
}

impl<K: Clone> ListWatch<K> {
    /// Kind of the resource this pair lists and watches
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub async fn list(&self, options: ListOptions) -> Result<ObjectList<K>, kube::Error> {
        let result = (self.list_fn)(options).await;
        record_list_request(&self.resource, result.is_ok());
        result
    }

    pub async fn watch(&self, options: ListOptions) -> Result<WatchStream<K>, kube::Error> {
        let result = (self.watch_fn)(options).await;
        record_watch_request(&self.resource, result.is_ok());
        result
    }
}
