//! List-then-watch event stream
//!
//! Turns a [`ListWatch`] into the `watcher::Event` stream the kube reflector
//! consumes:
//!
//! ```text
//! Empty ──list (all pages)──► Listed(rv) ──watch(rv)──► Watching(rv)
//!   ▲                            ▲                          │
//!   └──────── 410 Gone ──────────┼──────────────────────────┤
//!                                └── stream ended / failed ─┘
//! ```
//!
//! Errors are yielded and the stream carries on; pacing retries is left to
//! the consumer (`WatchStreamExt::default_backoff`).

use super::list_watch::ListWatch;
use crate::client::{ListOptions, WatchStream};
use futures::{Stream, StreamExt};
use kube::api::WatchEvent;
use kube::runtime::watcher;
use kube::ResourceExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Server-side watch timeout; kept under the API server's 295s cap
const WATCH_TIMEOUT_SECS: u32 = 290;

/// HTTP status the API server uses for an expired resourceVersion
const GONE: u16 = 410;

enum State<K> {
    Empty,
    Listed {
        resource_version: String,
    },
    Watching {
        resource_version: String,
        stream: WatchStream<K>,
    },
}

/// Stream of watcher events produced from a list/watch pair
pub fn list_watch_stream<K>(
    list_watch: Arc<ListWatch<K>>,
) -> impl Stream<Item = watcher::Result<watcher::Event<K>>> + Send
where
    K: kube::Resource + Clone + Send + Sync + 'static,
{
    futures::stream::unfold(
        (list_watch, State::Empty, VecDeque::new()),
        |(list_watch, mut state, mut pending)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (list_watch, state, pending)));
                }

                let (error, next) = step(&list_watch, state, &mut pending).await;
                state = next;
                if let Some(error) = error {
                    return Some((Err(error), (list_watch, state, pending)));
                }
            }
        },
    )
}

async fn step<K>(
    list_watch: &ListWatch<K>,
    state: State<K>,
    pending: &mut VecDeque<watcher::Event<K>>,
) -> (Option<watcher::Error>, State<K>)
where
    K: kube::Resource + Clone + Send + Sync + 'static,
{
    match state {
        State::Empty => match list_all(list_watch).await {
            Ok((objects, resource_version)) => {
                debug!(
                    resource = list_watch.resource(),
                    objects = objects.len(),
                    %resource_version,
                    "Initial list complete"
                );
                pending.push_back(watcher::Event::Init);
                pending.extend(objects.into_iter().map(watcher::Event::InitApply));
                pending.push_back(watcher::Event::InitDone);
                (None, State::Listed { resource_version })
            }
            Err(error) => (Some(error), State::Empty),
        },

        State::Listed { resource_version } => {
            let options = ListOptions {
                resource_version: Some(resource_version.clone()),
                timeout_seconds: Some(WATCH_TIMEOUT_SECS),
                allow_watch_bookmarks: true,
                ..Default::default()
            };
            match list_watch.watch(options).await {
                Ok(stream) => (
                    None,
                    State::Watching {
                        resource_version,
                        stream,
                    },
                ),
                Err(e) => (
                    Some(watcher::Error::WatchStartFailed(e)),
                    State::Listed { resource_version },
                ),
            }
        }

        State::Watching {
            mut resource_version,
            mut stream,
        } => match stream.next().await {
            Some(Ok(WatchEvent::Added(obj))) | Some(Ok(WatchEvent::Modified(obj))) => {
                if let Some(version) = obj.resource_version() {
                    resource_version = version;
                }
                pending.push_back(watcher::Event::Apply(obj));
                (
                    None,
                    State::Watching {
                        resource_version,
                        stream,
                    },
                )
            }
            Some(Ok(WatchEvent::Deleted(obj))) => {
                if let Some(version) = obj.resource_version() {
                    resource_version = version;
                }
                pending.push_back(watcher::Event::Delete(obj));
                (
                    None,
                    State::Watching {
                        resource_version,
                        stream,
                    },
                )
            }
            Some(Ok(WatchEvent::Bookmark(bookmark))) => (
                None,
                State::Watching {
                    resource_version: bookmark.metadata.resource_version,
                    stream,
                },
            ),
            Some(Ok(WatchEvent::Error(err))) => {
                let next = if err.code == GONE {
                    debug!(
                        resource = list_watch.resource(),
                        %resource_version,
                        "Resource version expired, relisting"
                    );
                    State::Empty
                } else {
                    State::Watching {
                        resource_version,
                        stream,
                    }
                };
                (Some(watcher::Error::WatchError(err)), next)
            }
            Some(Err(e)) => (
                Some(watcher::Error::WatchFailed(e)),
                State::Listed { resource_version },
            ),
            None => {
                debug!(
                    resource = list_watch.resource(),
                    %resource_version,
                    "Watch closed, restarting"
                );
                (None, State::Listed { resource_version })
            }
        },
    }
}

/// List every page and return the objects with the list resourceVersion
async fn list_all<K: Clone>(list_watch: &ListWatch<K>) -> watcher::Result<(Vec<K>, String)> {
    let mut objects = Vec::new();
    let mut options = ListOptions::default();

    loop {
        let page = list_watch
            .list(options.clone())
            .await
            .map_err(watcher::Error::InitialListFailed)?;
        objects.extend(page.items);

        match page.metadata.continue_.filter(|token| !token.is_empty()) {
            Some(token) => options.continue_token = Some(token),
            None => {
                let resource_version = page
                    .metadata
                    .resource_version
                    .filter(|version| !version.is_empty())
                    .ok_or(watcher::Error::NoResourceVersion)?;
                return Ok((objects, resource_version));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        api_error, bookmark, gateway_class, gone, object_list, Call, FakeGatewayClient,
    };
    use gateway_api::apis::standard::gatewayclasses::GatewayClass;

    fn event_name(event: &watcher::Event<GatewayClass>) -> String {
        match event {
            watcher::Event::Init => "init".to_string(),
            watcher::Event::InitApply(gc) => format!("init-apply:{}", gc.name_any()),
            watcher::Event::InitDone => "init-done".to_string(),
            watcher::Event::Apply(gc) => format!("apply:{}", gc.name_any()),
            watcher::Event::Delete(gc) => format!("delete:{}", gc.name_any()),
        }
    }

    fn stream_for(fake: &FakeGatewayClient) -> impl Stream<Item = watcher::Result<watcher::Event<GatewayClass>>> {
        let list_watch = Arc::new(ListWatch::for_client(fake.resource_client(), None));
        list_watch_stream(list_watch)
    }

    #[tokio::test]
    async fn test_initial_list_then_watch_events() {
        let fake = FakeGatewayClient::new();
        fake.push_list(Ok(object_list(
            vec![
                gateway_class("rauta", "rauta.io/gateway-controller", "5"),
                gateway_class("nginx", "nginx.org/controller", "6"),
            ],
            "10",
            None,
        )));
        fake.push_watch(vec![
            Ok(WatchEvent::Added(gateway_class("envoy", "envoy.io/controller", "11"))),
            Ok(WatchEvent::Deleted(gateway_class("nginx", "nginx.org/controller", "12"))),
        ]);

        let events: Vec<String> = stream_for(&fake)
            .take(6)
            .map(|event| event_name(&event.expect("Event should be Ok")))
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                "init",
                "init-apply:rauta",
                "init-apply:nginx",
                "init-done",
                "apply:envoy",
                "delete:nginx",
            ]
        );

        let calls = fake.calls();
        assert_eq!(calls[0], Call::List(ListOptions::default()));
        assert_eq!(
            calls[1],
            Call::Watch(ListOptions {
                resource_version: Some("10".to_string()),
                timeout_seconds: Some(WATCH_TIMEOUT_SECS),
                allow_watch_bookmarks: true,
                ..Default::default()
            })
        );
    }

    #[tokio::test]
    async fn test_list_follows_continue_tokens() {
        let fake = FakeGatewayClient::new();
        fake.push_list(Ok(object_list(
            vec![gateway_class("a", "rauta.io/gateway-controller", "1")],
            "20",
            Some("page-2"),
        )));
        fake.push_list(Ok(object_list(
            vec![gateway_class("b", "rauta.io/gateway-controller", "2")],
            "20",
            None,
        )));

        let events: Vec<String> = stream_for(&fake)
            .take(4)
            .map(|event| event_name(&event.expect("Event should be Ok")))
            .collect()
            .await;

        assert_eq!(events, vec!["init", "init-apply:a", "init-apply:b", "init-done"]);
        assert_eq!(
            fake.calls()[1],
            Call::List(ListOptions {
                continue_token: Some("page-2".to_string()),
                ..Default::default()
            })
        );
    }

    #[tokio::test]
    async fn test_watch_restarts_from_last_seen_version() {
        let fake = FakeGatewayClient::new();
        fake.push_list(Ok(object_list(vec![], "5", None)));
        fake.push_watch(vec![
            Ok(WatchEvent::Modified(gateway_class("rauta", "rauta.io/gateway-controller", "8"))),
            Ok(bookmark("20")),
        ]);
        fake.push_watch(vec![Ok(WatchEvent::Added(gateway_class(
            "envoy",
            "envoy.io/controller",
            "21",
        )))]);

        let events: Vec<String> = stream_for(&fake)
            .take(4)
            .map(|event| event_name(&event.expect("Event should be Ok")))
            .collect()
            .await;
        assert_eq!(events, vec!["init", "init-done", "apply:rauta", "apply:envoy"]);

        let watches: Vec<Option<String>> = fake
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Watch(options) => Some(options.resource_version),
                Call::List(_) => None,
            })
            .collect();
        // Second watch resumes from the bookmark
        assert_eq!(watches[0].as_deref(), Some("5"));
        assert_eq!(watches[1].as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn test_gone_triggers_relist() {
        let fake = FakeGatewayClient::new();
        fake.push_list(Ok(object_list(
            vec![gateway_class("rauta", "rauta.io/gateway-controller", "5")],
            "10",
            None,
        )));
        fake.push_watch(vec![Ok(gone())]);
        fake.push_list(Ok(object_list(vec![], "40", None)));

        let mut stream = Box::pin(stream_for(&fake));
        let mut names = Vec::new();
        for _ in 0..6 {
            match stream.next().await {
                Some(Ok(event)) => names.push(event_name(&event)),
                Some(Err(_)) => names.push("error".to_string()),
                None => break,
            }
        }
        assert_eq!(
            names,
            vec![
                "init",
                "init-apply:rauta",
                "init-done",
                "error",
                "init",
                "init-done",
            ]
        );

        let calls = fake.calls();
        let lists = calls.iter().filter(|c| matches!(c, Call::List(_))).count();
        assert_eq!(lists, 2, "410 should force a second list");
    }

    #[tokio::test]
    async fn test_gone_error_is_surfaced() {
        let fake = FakeGatewayClient::new();
        fake.push_list(Ok(object_list(vec![], "10", None)));
        fake.push_watch(vec![Ok(gone())]);

        let mut stream = Box::pin(stream_for(&fake));
        assert!(matches!(stream.next().await, Some(Ok(watcher::Event::Init))));
        assert!(matches!(stream.next().await, Some(Ok(watcher::Event::InitDone))));
        match stream.next().await {
            Some(Err(watcher::Error::WatchError(response))) => assert_eq!(response.code, 410),
            other => panic!("Expected watch error, got {:?}", other.map(|r| r.is_ok())),
        }
    }

    #[tokio::test]
    async fn test_list_error_passed_through() {
        let fake = FakeGatewayClient::new();
        fake.push_list(Err(api_error(403, "Forbidden")));

        let mut stream = Box::pin(stream_for(&fake));
        match stream.next().await {
            Some(Err(watcher::Error::InitialListFailed(kube::Error::Api(response)))) => {
                assert_eq!(response.code, 403);
            }
            other => panic!("Expected list failure, got {:?}", other.map(|r| r.is_ok())),
        }
    }

    #[tokio::test]
    async fn test_missing_resource_version_rejected() {
        let fake = FakeGatewayClient::new();
        fake.push_list(Ok(object_list(vec![], "", None)));

        let mut stream = Box::pin(stream_for(&fake));
        assert!(matches!(
            stream.next().await,
            Some(Err(watcher::Error::NoResourceVersion))
        ));
    }

    #[tokio::test]
    async fn test_watch_start_failure_retries_watch_not_list() {
        let fake = FakeGatewayClient::new();
        fake.push_list(Ok(object_list(vec![], "10", None)));
        fake.push_watch_error(api_error(500, "InternalError"));

        let mut stream = Box::pin(stream_for(&fake));
        assert!(matches!(stream.next().await, Some(Ok(watcher::Event::Init))));
        assert!(matches!(stream.next().await, Some(Ok(watcher::Event::InitDone))));
        assert!(matches!(
            stream.next().await,
            Some(Err(watcher::Error::WatchStartFailed(_)))
        ));

        // Next poll starts a new watch from the same version; it hangs
        let next = tokio::time::timeout(std::time::Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err(), "Fake watch should hang once scripts run out");

        let calls = fake.calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::List(_))).count(), 1);
        assert_eq!(
            calls.last(),
            Some(&Call::Watch(ListOptions {
                resource_version: Some("10".to_string()),
                timeout_seconds: Some(WATCH_TIMEOUT_SECS),
                allow_watch_bookmarks: true,
                ..Default::default()
            }))
        );
    }
}
