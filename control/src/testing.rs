//! Test doubles for the Gateway API clientset

use crate::client::{GatewayInterface, ListOptions, ResourceClient, WatchStream};
use async_trait::async_trait;
use futures::StreamExt;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use kube::api::{ObjectList, WatchEvent};
use kube::core::ErrorResponse;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

type WatchScript = Result<Vec<Result<WatchEvent<GatewayClass>, kube::Error>>, kube::Error>;

/// A recorded list or watch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(ListOptions),
    Watch(ListOptions),
}

#[derive(Default)]
struct Scripts {
    lists: VecDeque<Result<ObjectList<GatewayClass>, kube::Error>>,
    watches: VecDeque<WatchScript>,
    calls: Vec<Call>,
}

/// Scripted GatewayClass client
///
/// Lists and watches pop responses in order. Once the list script is
/// exhausted lists fail with 503; once the watch script is exhausted watches
/// return a stream that never yields. Scripted watch streams end after their
/// last event.
#[derive(Clone, Default)]
pub struct FakeGatewayClient {
    scripts: Arc<Mutex<Scripts>>,
}

impl FakeGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_list(&self, response: Result<ObjectList<GatewayClass>, kube::Error>) {
        self.scripts.lock().unwrap().lists.push_back(response);
    }

    pub fn push_watch(&self, events: Vec<Result<WatchEvent<GatewayClass>, kube::Error>>) {
        self.scripts.lock().unwrap().watches.push_back(Ok(events));
    }

    pub fn push_watch_error(&self, error: kube::Error) {
        self.scripts.lock().unwrap().watches.push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.scripts.lock().unwrap().calls.clone()
    }

    pub fn resource_client(&self) -> Arc<dyn ResourceClient<GatewayClass>> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl ResourceClient<GatewayClass> for FakeGatewayClient {
    async fn list(&self, options: &ListOptions) -> Result<ObjectList<GatewayClass>, kube::Error> {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.calls.push(Call::List(options.clone()));
        scripts
            .lists
            .pop_front()
            .unwrap_or_else(|| Err(api_error(503, "ServiceUnavailable")))
    }

    async fn watch(&self, options: &ListOptions) -> Result<WatchStream<GatewayClass>, kube::Error> {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.calls.push(Call::Watch(options.clone()));
        match scripts.watches.pop_front() {
            Some(Ok(events)) => Ok(futures::stream::iter(events).boxed()),
            Some(Err(e)) => Err(e),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

impl GatewayInterface for FakeGatewayClient {
    fn gateway_classes(&self) -> Arc<dyn ResourceClient<GatewayClass>> {
        self.resource_client()
    }
}

pub fn gateway_class(name: &str, controller_name: &str, resource_version: &str) -> GatewayClass {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "GatewayClass",
        "metadata": {
            "name": name,
            "resourceVersion": resource_version,
        },
        "spec": { "controllerName": controller_name },
    }))
    .expect("GatewayClass fixture should deserialize")
}

pub fn with_labels(mut gateway_class: GatewayClass, labels: &[(&str, &str)]) -> GatewayClass {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    gateway_class.metadata.labels = Some(labels);
    gateway_class
}

pub fn object_list(
    items: Vec<GatewayClass>,
    resource_version: &str,
    continue_token: Option<&str>,
) -> ObjectList<GatewayClass> {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "GatewayClassList",
        "metadata": {
            "resourceVersion": resource_version,
            "continue": continue_token,
        },
        "items": items,
    }))
    .expect("GatewayClassList fixture should deserialize")
}

pub fn error_response(code: u16, reason: &str) -> ErrorResponse {
    serde_json::from_value(json!({
        "status": "Failure",
        "message": format!("{} ({})", reason, code),
        "reason": reason,
        "code": code,
    }))
    .expect("ErrorResponse fixture should deserialize")
}

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(error_response(code, reason))
}

/// Watch error the API server sends for an expired resourceVersion
pub fn gone() -> WatchEvent<GatewayClass> {
    WatchEvent::Error(error_response(410, "Expired"))
}

pub fn bookmark(resource_version: &str) -> WatchEvent<GatewayClass> {
    serde_json::from_value(json!({
        "type": "BOOKMARK",
        "object": {
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "GatewayClass",
            "metadata": { "resourceVersion": resource_version },
        },
    }))
    .expect("Bookmark fixture should deserialize")
}
