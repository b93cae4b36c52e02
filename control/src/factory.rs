//! Shared informer factory
//!
//! Hands out one informer per resource type so every consumer shares the
//! same cache and the same watch connection.
//!
//! ## Usage
//!
//! ```ignore
//! use gateway_informers::client::Clientset;
//! use gateway_informers::factory::SharedInformerFactory;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let client = kube::Client::try_default().await?;
//! let factory = SharedInformerFactory::new(Arc::new(Clientset::new(client)), Duration::from_secs(300));
//!
//! let gateway_classes = factory.gateway_classes();
//! let lister = gateway_classes.lister();
//!
//! factory.start();
//! factory.wait_for_cache_sync(Duration::from_secs(30)).await;
//! let rauta = lister.get("rauta")?;
//! ```

use crate::apis::gateway::gateway_class::GatewayClassInformer;
use crate::client::{GatewayInterface, TweakListOptions};
use crate::error::Result;
use crate::informer::{InformerResource, SharedIndexInformer};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Capability to obtain shared informers
///
/// `informer_for` returns the informer already registered for `K`, or
/// builds one with `new_informer` from the factory's client and the resync
/// period in effect for `K`.
pub trait InformerFactory: Clone + Send + Sync + 'static {
    fn informer_for<K, F>(&self, new_informer: F) -> Arc<SharedIndexInformer<K>>
    where
        K: InformerResource,
        F: FnOnce(Arc<dyn GatewayInterface>, Duration) -> SharedIndexInformer<K>;

    /// Options hook applied to every informer the factory builds
    fn tweak_list_options(&self) -> Option<TweakListOptions>;
}

/// Type-erased handle the factory uses to run informers
trait RunnableInformer: Send + Sync {
    fn resource(&self) -> &str;

    fn run_boxed(self: Arc<Self>) -> BoxFuture<'static, Result<()>>;

    fn wait_for_sync_boxed(self: Arc<Self>, timeout: Duration) -> BoxFuture<'static, bool>;
}

impl<K: InformerResource> RunnableInformer for SharedIndexInformer<K> {
    fn resource(&self) -> &str {
        SharedIndexInformer::resource(self)
    }

    fn run_boxed(self: Arc<Self>) -> BoxFuture<'static, Result<()>> {
        self.run().boxed()
    }

    fn wait_for_sync_boxed(self: Arc<Self>, timeout: Duration) -> BoxFuture<'static, bool> {
        async move { self.wait_for_sync(timeout).await.is_ok() }.boxed()
    }
}

struct RegisteredInformer {
    informer: Arc<dyn Any + Send + Sync>,
    runner: Arc<dyn RunnableInformer>,
    started: bool,
}

struct FactoryInner {
    client: Arc<dyn GatewayInterface>,
    default_resync: Duration,
    custom_resync: HashMap<TypeId, Duration>,
    tweak: Option<TweakListOptions>,
    informers: Mutex<HashMap<TypeId, RegisteredInformer>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Mutex poisoned, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

/// Builder for [`SharedInformerFactory`]
pub struct SharedInformerFactoryBuilder {
    client: Arc<dyn GatewayInterface>,
    default_resync: Duration,
    custom_resync: HashMap<TypeId, Duration>,
    tweak: Option<TweakListOptions>,
}

impl SharedInformerFactoryBuilder {
    /// Resync period for a single resource type
    pub fn custom_resync<K: InformerResource>(mut self, resync: Duration) -> Self {
        self.custom_resync.insert(TypeId::of::<K>(), resync);
        self
    }

    /// Options hook applied to every list and watch of every informer
    pub fn tweak_list_options(mut self, tweak: TweakListOptions) -> Self {
        self.tweak = Some(tweak);
        self
    }

    pub fn build(self) -> SharedInformerFactory {
        SharedInformerFactory {
            inner: Arc::new(FactoryInner {
                client: self.client,
                default_resync: self.default_resync,
                custom_resync: self.custom_resync,
                tweak: self.tweak,
                informers: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }
}

/// Factory sharing informers across consumers
///
/// Cheap to clone; clones share the same informers.
#[derive(Clone)]
pub struct SharedInformerFactory {
    inner: Arc<FactoryInner>,
}

impl SharedInformerFactory {
    pub fn new(client: Arc<dyn GatewayInterface>, default_resync: Duration) -> Self {
        Self::builder(client, default_resync).build()
    }

    pub fn builder(
        client: Arc<dyn GatewayInterface>,
        default_resync: Duration,
    ) -> SharedInformerFactoryBuilder {
        SharedInformerFactoryBuilder {
            client,
            default_resync,
            custom_resync: HashMap::new(),
            tweak: None,
        }
    }

    /// GatewayClass informer and lister access
    pub fn gateway_classes(&self) -> GatewayClassInformer<Self> {
        GatewayClassInformer::new(self.clone(), self.inner.tweak.clone())
    }

    /// Spawn every registered informer that is not running yet
    ///
    /// Must be called from within a tokio runtime. Informers requested after
    /// `start` need another call to `start`.
    pub fn start(&self) {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            warn!("Informer factory is shutting down, not starting informers");
            return;
        }

        let mut informers = lock(&self.inner.informers);
        let mut tasks = lock(&self.inner.tasks);
        for registered in informers.values_mut().filter(|r| !r.started) {
            let runner = registered.runner.clone();
            let resource = runner.resource().to_string();
            info!(resource = %resource, "Starting shared informer");

            tasks.push(tokio::spawn(async move {
                if let Err(e) = runner.run_boxed().await {
                    error!(resource = %resource, "Informer error: {}", e);
                }
            }));
            registered.started = true;
        }
    }

    /// Wait for every started informer to sync
    ///
    /// Returns the sync result per resource kind.
    pub async fn wait_for_cache_sync(&self, timeout: Duration) -> HashMap<String, bool> {
        let runners: Vec<Arc<dyn RunnableInformer>> = lock(&self.inner.informers)
            .values()
            .filter(|r| r.started)
            .map(|r| r.runner.clone())
            .collect();

        let waits = runners.into_iter().map(|runner| async move {
            let resource = runner.resource().to_string();
            let synced = runner.wait_for_sync_boxed(timeout).await;
            (resource, synced)
        });

        futures::future::join_all(waits).await.into_iter().collect()
    }

    /// Stop all informers and wait for their tasks to finish
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);

        let tasks: Vec<JoinHandle<()>> = lock(&self.inner.tasks).drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Informer task failed: {}", e);
                }
            }
        }

        info!("Informer factory shut down");
    }
}

impl InformerFactory for SharedInformerFactory {
    fn informer_for<K, F>(&self, new_informer: F) -> Arc<SharedIndexInformer<K>>
    where
        K: InformerResource,
        F: FnOnce(Arc<dyn GatewayInterface>, Duration) -> SharedIndexInformer<K>,
    {
        let type_id = TypeId::of::<K>();
        let mut informers = lock(&self.inner.informers);

        if let Some(registered) = informers.get(&type_id) {
            if let Ok(informer) = registered.informer.clone().downcast::<SharedIndexInformer<K>>() {
                return informer;
            }
        }

        let resync = self
            .inner
            .custom_resync
            .get(&type_id)
            .copied()
            .unwrap_or(self.inner.default_resync);
        let informer = Arc::new(new_informer(self.inner.client.clone(), resync));

        informers.insert(
            type_id,
            RegisteredInformer {
                informer: informer.clone(),
                runner: informer.clone(),
                started: false,
            },
        );
        informer
    }

    fn tweak_list_options(&self) -> Option<TweakListOptions> {
        self.inner.tweak.clone()
    }
}
