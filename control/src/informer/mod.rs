//! Shared index informer
//!
//! Drives a [`ListWatch`] into a kube reflector store and fans cache changes
//! out to registered handlers.
//!
//! ## How It Works
//!
//! 1. `list_watch_stream` lists, then watches from the list resourceVersion
//! 2. Errors are paced by `WatchStreamExt::default_backoff`
//! 3. Each event is applied to the reflector `Writer`, then dispatched as
//!    add/update/delete; a full list is dispatched once all of it is in the
//!    cache, with deletes for objects that vanished
//! 4. Every `resync_period` (when non-zero) the whole cache is redelivered as
//!    updates with `old == new`

pub mod indexer;
pub mod list_watch;
pub mod stream;

pub use indexer::{
    meta_namespace_index_func, meta_namespace_key, namespace_indexers, IndexFunc, Indexer,
    Indexers, NAMESPACE_INDEX,
};
pub use list_watch::ListWatch;
pub use stream::list_watch_stream;

use crate::apis::metrics::{record_informer_event, record_stream_error, set_store_objects};
use crate::error::{InformerError, Result};
use futures::StreamExt;
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Resource types an informer can cache
pub trait InformerResource:
    kube::Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static
{
}

impl<K> InformerResource for K where
    K: kube::Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static
{
}

/// Receives cache notifications
///
/// Callbacks run on the informer task; keep them short.
pub trait ResourceEventHandler<K>: Send + Sync {
    fn on_add(&self, _obj: &Arc<K>, _is_initial_list: bool) {}

    /// Also called on resync, with `old` and `new` the same object
    fn on_update(&self, _old: &Arc<K>, _new: &Arc<K>) {}

    fn on_delete(&self, _obj: &Arc<K>) {}
}

/// Objects cached before a relist, keyed by reference
type Snapshot<K> = HashMap<ObjectRef<K>, Arc<K>>;

/// A list in progress: what the cache held before it, and each listed
/// object with its previous version
struct Relist<K: InformerResource> {
    previous: Snapshot<K>,
    listed: Vec<(ObjectRef<K>, Option<Arc<K>>)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Mutex poisoned, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

fn safe_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during read, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

fn safe_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during write, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

/// Informer with a shared cache, index view and event handlers
///
/// Handler callbacks, including the cache replay for handlers added after
/// the initial sync, only ever run on the informer task, one event at a
/// time and after the event has been applied to the cache.
pub struct SharedIndexInformer<K: InformerResource> {
    resource: String,
    list_watch: Arc<ListWatch<K>>,
    resync_period: Duration,
    store: Store<K>,
    /// Taken by `run`; `None` once the informer has started
    writer: Mutex<Option<Writer<K>>>,
    indexers: Arc<RwLock<Indexers<K>>>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler<K>>>>,
    /// Registered but not yet adopted by the informer task
    new_handlers: Mutex<Vec<Arc<dyn ResourceEventHandler<K>>>>,
    handler_added: Notify,
    synced: watch::Sender<bool>,
}

impl<K: InformerResource> SharedIndexInformer<K> {
    pub fn new(list_watch: ListWatch<K>, resync_period: Duration, indexers: Indexers<K>) -> Self {
        let writer = Writer::<K>::default();
        let store = writer.as_reader();

        Self {
            resource: list_watch.resource().to_string(),
            list_watch: Arc::new(list_watch),
            resync_period,
            store,
            writer: Mutex::new(Some(writer)),
            indexers: Arc::new(RwLock::new(indexers)),
            handlers: RwLock::new(Vec::new()),
            new_handlers: Mutex::new(Vec::new()),
            handler_added: Notify::new(),
            synced: watch::Sender::new(false),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn list_watch(&self) -> &Arc<ListWatch<K>> {
        &self.list_watch
    }

    pub fn resync_period(&self) -> Duration {
        self.resync_period
    }

    /// Reader over the cache
    pub fn store(&self) -> Store<K> {
        self.store.clone()
    }

    pub fn indexer(&self) -> Indexer<K> {
        Indexer::new(self.store.clone(), self.indexers.clone())
    }

    pub fn is_started(&self) -> bool {
        lock(&self.writer).is_none()
    }

    /// True once the first full list is in the cache and has been
    /// delivered to handlers
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Register a handler
    ///
    /// The informer task picks the handler up before its next event. If the
    /// cache has synced by then, the handler first receives the cached
    /// objects as initial adds. Safe to call from inside a callback.
    pub fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler<K>>) {
        lock(&self.new_handlers).push(handler);
        self.handler_added.notify_one();
    }

    /// Add index functions; only allowed before the informer starts
    pub fn add_indexers(&self, new_indexers: Indexers<K>) -> Result<()> {
        if self.is_started() {
            return Err(InformerError::AlreadyStarted);
        }

        let mut indexers = safe_write(&self.indexers);
        if let Some(name) = new_indexers.keys().find(|name| indexers.contains_key(*name)) {
            return Err(InformerError::IndexerConflict(format!(
                "indexer {:?} already exists",
                name
            )));
        }
        indexers.extend(new_indexers);
        Ok(())
    }

    /// Wait until [`has_synced`](Self::has_synced) turns true
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<()> {
        let mut synced = self.synced.subscribe();
        let wait = async move {
            while !*synced.borrow_and_update() {
                if synced.changed().await.is_err() {
                    return false;
                }
            }
            true
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(true) => Ok(()),
            _ => Err(InformerError::CacheSyncTimeout),
        }
    }

    /// Run the informer until its event stream ends
    ///
    /// Returns `AlreadyStarted` if called more than once.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut writer = lock(&self.writer)
            .take()
            .ok_or(InformerError::AlreadyStarted)?;

        info!(
            resource = %self.resource,
            resync_period = ?self.resync_period,
            "Starting informer"
        );

        let stream = list_watch_stream(self.list_watch.clone()).default_backoff();
        futures::pin_mut!(stream);

        let mut resync = resync_interval(self.resync_period);
        let mut relist: Option<Relist<K>> = None;
        self.adopt_handlers();

        loop {
            tokio::select! {
                biased;

                _ = self.handler_added.notified() => self.adopt_handlers(),
                event = stream.next() => match event {
                    Some(Ok(event)) => self.process(&mut writer, &mut relist, event),
                    Some(Err(e)) => {
                        warn!(resource = %self.resource, "Informer list/watch error: {}", e);
                        record_stream_error(&self.resource);
                    }
                    None => break,
                },
                _ = tick(&mut resync) => self.resync(),
            }
        }

        info!(resource = %self.resource, "Informer stopped");
        Ok(())
    }

    /// Move newly registered handlers into the dispatch list, replaying the
    /// cache to them once synced
    fn adopt_handlers(&self) {
        let added: Vec<_> = lock(&self.new_handlers).drain(..).collect();
        if added.is_empty() {
            return;
        }

        if self.has_synced() {
            let objects = self.store.state();
            debug!(
                resource = %self.resource,
                handlers = added.len(),
                objects = objects.len(),
                "Replaying cache to new handlers"
            );
            for handler in &added {
                for obj in &objects {
                    handler.on_add(obj, true);
                }
            }
        }
        safe_write(&self.handlers).extend(added);
    }

    fn process(
        &self,
        writer: &mut Writer<K>,
        relist: &mut Option<Relist<K>>,
        event: watcher::Event<K>,
    ) {
        match &event {
            watcher::Event::Init => {
                let previous = self
                    .store
                    .state()
                    .into_iter()
                    .map(|obj| (ObjectRef::from_obj(obj.as_ref()), obj))
                    .collect();
                *relist = Some(Relist {
                    previous,
                    listed: Vec::new(),
                });
                writer.apply_watcher_event(&event);
            }
            watcher::Event::InitApply(obj) => {
                // Buffered by the writer until InitDone; handlers hear about
                // it once it is visible in the cache
                writer.apply_watcher_event(&event);
                if let Some(relist) = relist.as_mut() {
                    let key = ObjectRef::from_obj(obj);
                    let old = relist.previous.remove(&key);
                    relist.listed.push((key, old));
                }
            }
            watcher::Event::InitDone => {
                writer.apply_watcher_event(&event);
                let first_list = !self.has_synced();
                if let Some(Relist { previous, listed }) = relist.take() {
                    for (key, old) in listed {
                        let Some(new) = self.store.get(&key) else {
                            continue;
                        };
                        match old {
                            Some(old) => self.dispatch_update(&old, &new),
                            None => self.dispatch_add(&new, first_list),
                        }
                    }
                    for obj in previous.values() {
                        self.dispatch_delete(obj);
                    }
                }
                if first_list {
                    self.synced.send_replace(true);
                    info!(
                        resource = %self.resource,
                        objects = self.store.len(),
                        "Informer cache synced"
                    );
                }
            }
            watcher::Event::Apply(obj) => {
                let key = ObjectRef::from_obj(obj);
                let old = self.store.get(&key);
                writer.apply_watcher_event(&event);

                let new = self
                    .store
                    .get(&key)
                    .unwrap_or_else(|| Arc::new(obj.clone()));
                match old {
                    Some(old) => self.dispatch_update(&old, &new),
                    None => self.dispatch_add(&new, false),
                }
            }
            watcher::Event::Delete(obj) => {
                writer.apply_watcher_event(&event);
                self.dispatch_delete(&Arc::new(obj.clone()));
            }
        }

        set_store_objects(&self.resource, self.store.len());
    }

    fn handlers(&self) -> Vec<Arc<dyn ResourceEventHandler<K>>> {
        safe_read(&self.handlers).clone()
    }

    fn dispatch_add(&self, obj: &Arc<K>, is_initial_list: bool) {
        debug!(resource = %self.resource, name = %obj.name_any(), "Added");
        record_informer_event(&self.resource, "add");
        for handler in self.handlers() {
            handler.on_add(obj, is_initial_list);
        }
    }

    fn dispatch_update(&self, old: &Arc<K>, new: &Arc<K>) {
        debug!(resource = %self.resource, name = %new.name_any(), "Updated");
        record_informer_event(&self.resource, "update");
        for handler in self.handlers() {
            handler.on_update(old, new);
        }
    }

    fn dispatch_delete(&self, obj: &Arc<K>) {
        debug!(resource = %self.resource, name = %obj.name_any(), "Deleted");
        record_informer_event(&self.resource, "delete");
        for handler in self.handlers() {
            handler.on_delete(obj);
        }
    }

    fn resync(&self) {
        if !self.has_synced() {
            return;
        }

        let objects = self.store.state();
        debug!(resource = %self.resource, objects = objects.len(), "Resync");
        let handlers = self.handlers();
        for obj in &objects {
            record_informer_event(&self.resource, "resync");
            for handler in &handlers {
                handler.on_update(obj, obj);
            }
        }
    }
}

fn resync_interval(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending::<()>().await,
    }
}
