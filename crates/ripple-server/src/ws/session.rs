//! Per-connection session lifecycle.
//!
//! One session drives one upgraded WebSocket through
//! `Connecting → Upgraded → ReadLoopActive → Closing → Closed`:
//!
//! - the **read loop** (primary task) decodes inbound frames into event
//!   requests, hands them to the event service, and queues the resulting
//!   patch batch back to the originating connection; malformed frames are
//!   logged and skipped, never fatal
//! - the **relay** (secondary task) forwards patch batches published to
//!   the connection's topic; it runs until the cancellation token is
//!   signaled when the read loop exits, so no background task outlives
//!   its connection
//! - the **writer** drains the outbound queue into the socket and owns
//!   the heartbeat ping/pong liveness check
//!
//! Failure semantics: a handler error morphs a sanitized message into the
//! error-display target instead of closing the connection; a write error
//! on one connection never affects sibling subscribers of its topic.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use parking_lot::Mutex;
use ripple_core::event::Origin;
use ripple_events::bus::{Bus, BusSubscription};
use ripple_events::service::EventService;
use ripple_patch::{PatchPipeline, encode_batch};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain::strategies::InboundEvent;
use crate::request::ServerRequest;
use crate::ws::connection::{ClientConnection, SessionState};
use crate::ws::hub::ConnectionHub;

/// Resolves the broadcast topic for an upgrading connection.
///
/// Supplied by the routing layer; returning `None` leaves the connection
/// without a subscription (direct responses still work).
pub trait TopicResolver: Send + Sync {
    /// The topic for this upgrade request, if any.
    fn resolve(&self, request: &ServerRequest) -> Option<String>;
}

struct FnTopicResolver<F>(F);

impl<F> TopicResolver for FnTopicResolver<F>
where
    F: Fn(&ServerRequest) -> Option<String> + Send + Sync,
{
    fn resolve(&self, request: &ServerRequest) -> Option<String> {
        (self.0)(request)
    }
}

/// Wrap a closure as a topic resolver.
pub fn topic_fn<F>(f: F) -> Arc<dyn TopicResolver>
where
    F: Fn(&ServerRequest) -> Option<String> + Send + Sync + 'static,
{
    Arc::new(FnTopicResolver(f))
}

/// Collaborators and tuning for every session.
pub struct SessionDeps {
    /// Event pipeline.
    pub service: Arc<EventService>,
    /// Patch rendering.
    pub pipeline: Arc<PatchPipeline>,
    /// Connection registry.
    pub hub: Arc<ConnectionHub>,
    /// Broadcast bus.
    pub bus: Arc<dyn Bus>,
    /// Topic assignment.
    pub topic_resolver: Arc<dyn TopicResolver>,
    /// Outbound queue capacity per connection.
    pub queue_capacity: usize,
    /// Heartbeat ping interval; zero disables the heartbeat.
    pub heartbeat_interval: Duration,
    /// Consecutive missed pongs before the connection is considered dead.
    pub heartbeat_max_missed: u32,
}

impl SessionDeps {
    /// Assemble deps with default tuning and no topic resolution.
    pub fn new(
        service: Arc<EventService>,
        pipeline: Arc<PatchPipeline>,
        hub: Arc<ConnectionHub>,
        bus: Arc<dyn Bus>,
    ) -> Self {
        Self {
            service,
            pipeline,
            hub,
            bus,
            topic_resolver: topic_fn(|_| None),
            queue_capacity: 64,
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_max_missed: 3,
        }
    }

    /// Set the topic resolver.
    #[must_use]
    pub fn with_topic_resolver(mut self, resolver: Arc<dyn TopicResolver>) -> Self {
        self.topic_resolver = resolver;
        self
    }

    /// Set the outbound queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the heartbeat tuning.
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, max_missed: u32) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_max_missed = max_missed;
        self
    }
}

/// Decode one inbound frame and run it through the event service.
///
/// Returns the serialized batch to write back, or `None` for malformed
/// frames (logged and skipped).
pub(crate) async fn process_frame(
    deps: &SessionDeps,
    connection_id: &str,
    session_id: &str,
    path: &str,
    text: &str,
) -> Option<Arc<String>> {
    let inbound: InboundEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            counter!("ws_malformed_frames_total").increment(1);
            warn!(conn_id = %connection_id, error = %err, "malformed frame, skipping");
            return None;
        }
    };

    let request = inbound.into_request(session_id.to_owned(), Origin::socket(path, connection_id));
    let batch = match deps.service.process_event(request).await {
        // A bare HTML body is the direct-render path: wrap it as a morph
        // of the conventional content target.
        Ok(response)
            if response.dom_events.is_empty()
                && response.redirect.is_none()
                && response.field_errors.is_empty()
                && !response.body.is_empty() =>
        {
            deps.pipeline
                .finalize(vec![deps.pipeline.morph_content(response.body)])
        }
        Ok(response) => deps.pipeline.patches_from_response(&response),
        Err(err) => {
            debug!(conn_id = %connection_id, code = err.code(), "event failed, sending error banner");
            vec![deps.pipeline.error_banner(&err.user_message())]
        }
    };

    match encode_batch(&batch) {
        Ok(json) => Some(Arc::new(json)),
        Err(err) => {
            warn!(conn_id = %connection_id, error = %err, "failed to encode batch");
            None
        }
    }
}

/// Relay bus messages to the connection until cancelled or saturated.
pub(crate) async fn relay_loop(
    mut subscription: BusSubscription,
    connection: Arc<ClientConnection>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            message = subscription.recv() => {
                let Some(message) = message else { break };
                let payload = match serde_json::to_string(&message.payload) {
                    Ok(json) => Arc::new(json),
                    Err(err) => {
                        warn!(conn_id = %connection.id, error = %err, "unserializable bus payload");
                        continue;
                    }
                };
                if !connection.send(payload) {
                    counter!("ws_broadcast_drops_total").increment(1);
                    if connection.is_saturated() {
                        warn!(conn_id = %connection.id, drops = connection.drop_count(),
                            "disconnecting slow subscriber");
                        cancel.cancel();
                        break;
                    }
                    warn!(conn_id = %connection.id, drops = connection.drop_count(),
                        "dropped broadcast for slow subscriber");
                }
            }
        }
    }
    debug!(conn_id = %connection.id, topic = %subscription.topic(), "relay stopped");
}

/// Drain the outbound queue into the socket; own the heartbeat.
async fn writer_loop(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<String>>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
    heartbeat_max_missed: u32,
    last_pong: Arc<Mutex<Instant>>,
) {
    // A zero interval disables the heartbeat entirely.
    let ping_every = if heartbeat_interval.is_zero() {
        Duration::from_secs(86_400)
    } else {
        heartbeat_interval
    };
    let mut ticker = interval_at(Instant::now() + ping_every, ping_every);
    let dead_after = ping_every * (heartbeat_max_missed.max(1) + 1);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            payload = outbound.recv() => {
                let Some(payload) = payload else { break };
                if let Err(err) = sink.send(Message::Text(payload.as_str().into())).await {
                    debug!(error = %err, "socket write failed");
                    cancel.cancel();
                    break;
                }
            }
            _ = ticker.tick() => {
                if !heartbeat_interval.is_zero()
                    && last_pong.lock().elapsed() > dead_after
                {
                    info!("heartbeat timed out, closing connection");
                    cancel.cancel();
                    break;
                }
                if let Err(err) = sink.send(Message::Ping(Bytes::new())).await {
                    debug!(error = %err, "ping failed");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

/// Drive one upgraded socket through its full lifecycle.
pub async fn run_session(socket: WebSocket, request: ServerRequest, deps: Arc<SessionDeps>) {
    let connection_id = Uuid::now_v7().to_string();
    let (outbound_tx, outbound_rx) = mpsc::channel(deps.queue_capacity);
    let connection = Arc::new(ClientConnection::new(connection_id.clone(), outbound_tx));

    let session_id = request
        .session_id()
        .unwrap_or_else(|| format!("anon-{connection_id}"));
    connection.bind_session(&session_id);

    connection.set_state(SessionState::Upgraded);
    let topic = deps.topic_resolver.resolve(&request);
    if let Some(topic) = &topic {
        connection.bind_topic(topic);
    }
    deps.hub.add(Arc::clone(&connection)).await;
    info!(conn_id = %connection_id, session_id = %session_id, topic = ?topic, "session started");

    let cancel = CancellationToken::new();
    let last_pong = Arc::new(Mutex::new(Instant::now()));
    let (sink, mut stream) = socket.split();

    let writer = tokio::spawn(writer_loop(
        sink,
        outbound_rx,
        cancel.clone(),
        deps.heartbeat_interval,
        deps.heartbeat_max_missed,
        Arc::clone(&last_pong),
    ));

    let relay = topic.as_ref().map(|topic| {
        tokio::spawn(relay_loop(
            deps.bus.subscribe(topic),
            Arc::clone(&connection),
            cancel.clone(),
        ))
    });

    connection.set_state(SessionState::ReadLoopActive);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(payload) =
                            process_frame(&deps, &connection_id, &session_id, &request.path, text.as_str()).await
                        {
                            if !connection.send(payload) && connection.is_saturated() {
                                warn!(conn_id = %connection_id, "outbound queue saturated, closing");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        *last_pong.lock() = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping frames: nothing to do
                    Some(Err(err)) => {
                        debug!(conn_id = %connection_id, error = %err, "read failed");
                        break;
                    }
                }
            }
        }
    }

    connection.set_state(SessionState::Closing);
    cancel.cancel();
    deps.hub.remove(&connection_id).await;
    if let Some(relay) = relay {
        let _ = relay.await;
    }
    let _ = writer.await;
    connection.set_state(SessionState::Closed);
    info!(conn_id = %connection_id, "session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::errors::RippleError;
    use ripple_core::event::{BusMessage, DomEvent, EventResponse};
    use ripple_events::{DefaultValidator, EventRegistry, MemoryBus, handler_fn};
    use ripple_patch::TableResolver;
    use serde_json::json;

    fn deps_with(registry: Arc<EventRegistry>, bus: Arc<MemoryBus>) -> SessionDeps {
        let mut resolver = TableResolver::new();
        resolver.define("count", "<span>{{n}}</span>");
        let service = Arc::new(EventService::new(
            registry,
            Arc::new(DefaultValidator::new()),
            Arc::clone(&bus) as Arc<dyn Bus>,
        ));
        SessionDeps::new(
            service,
            Arc::new(PatchPipeline::new(Arc::new(resolver))),
            Arc::new(ConnectionHub::new()),
            bus,
        )
    }

    fn registry_with_inc() -> Arc<EventRegistry> {
        let registry = Arc::new(EventRegistry::new());
        registry
            .register(
                "inc",
                handler_fn(|_req| async {
                    Ok(EventResponse::ok().with_dom_event(DomEvent::update(
                        "inc",
                        "#count",
                        "count",
                        json!({"n": 1}),
                    )))
                }),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn frame_produces_patch_batch() {
        let deps = deps_with(registry_with_inc(), Arc::new(MemoryBus::new()));
        let payload = process_frame(&deps, "c1", "s1", "/counter", r#"{"id":"inc"}"#)
            .await
            .expect("batch");
        let batch: Vec<serde_json::Value> = serde_json::from_str(&payload).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1]["selector"], "#count");
        assert_eq!(batch[1]["value"], "<span>1</span>");
    }

    #[tokio::test]
    async fn bare_body_response_morphs_the_content_target() {
        let registry = Arc::new(EventRegistry::new());
        registry
            .register(
                "inc",
                handler_fn(|_req| async { Ok(EventResponse::with_body("<span>1</span>")) }),
            )
            .unwrap();
        let deps = deps_with(registry, Arc::new(MemoryBus::new()));

        let payload = process_frame(&deps, "c1", "s1", "/counter", r#"{"id":"inc"}"#)
            .await
            .expect("batch");
        let batch: Vec<serde_json::Value> = serde_json::from_str(&payload).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1]["op"], "morph");
        assert_eq!(batch[1]["selector"], "#ripple-content");
        assert_eq!(batch[1]["value"], "<span>1</span>");
    }

    #[tokio::test]
    async fn malformed_frame_skipped() {
        let deps = deps_with(registry_with_inc(), Arc::new(MemoryBus::new()));
        assert!(process_frame(&deps, "c1", "s1", "/", "{not json").await.is_none());
        assert!(process_frame(&deps, "c1", "s1", "/", "").await.is_none());
    }

    #[tokio::test]
    async fn handler_failure_sends_sanitized_banner_not_disconnect() {
        let registry = Arc::new(EventRegistry::new());
        registry
            .register(
                "boom",
                handler_fn(|_req| async {
                    Err(RippleError::processing(std::io::Error::other(
                        "secret internal detail",
                    )))
                }),
            )
            .unwrap();
        let deps = deps_with(registry, Arc::new(MemoryBus::new()));

        let payload = process_frame(&deps, "c1", "s1", "/", r#"{"id":"boom"}"#)
            .await
            .expect("error banner batch");
        assert!(!payload.contains("secret internal detail"));
        let batch: Vec<serde_json::Value> = serde_json::from_str(&payload).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0]["selector"], "#ripple-error");
    }

    #[tokio::test]
    async fn unknown_event_sends_banner() {
        let deps = deps_with(Arc::new(EventRegistry::new()), Arc::new(MemoryBus::new()));
        let payload = process_frame(&deps, "c1", "s1", "/", r#"{"id":"ghost"}"#)
            .await
            .expect("banner");
        let batch: Vec<serde_json::Value> = serde_json::from_str(&payload).unwrap();
        assert_eq!(batch[0]["selector"], "#ripple-error");
    }

    #[tokio::test]
    async fn relay_delivers_published_batches_in_order() {
        let bus = Arc::new(MemoryBus::new());
        let (tx, mut rx) = mpsc::channel(8);
        let connection = Arc::new(ClientConnection::new("c1".into(), tx));
        let cancel = CancellationToken::new();

        let relay = tokio::spawn(relay_loop(
            bus.subscribe("room:1"),
            Arc::clone(&connection),
            cancel.clone(),
        ));

        for n in 0..3 {
            let _ = bus
                .publish(BusMessage::new("room:1", json!([{"op": "reload", "n": n}])))
                .await
                .unwrap();
        }

        for n in 0..3 {
            let payload = rx.recv().await.unwrap();
            let batch: serde_json::Value = serde_json::from_str(&payload).unwrap();
            assert_eq!(batch[0]["n"], n);
        }

        cancel.cancel();
        relay.await.unwrap();
    }

    #[tokio::test]
    async fn two_relays_same_topic_receive_identical_batches() {
        let bus = Arc::new(MemoryBus::new());
        let cancel = CancellationToken::new();

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let conn_a = Arc::new(ClientConnection::new("a".into(), tx_a));
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let conn_b = Arc::new(ClientConnection::new("b".into(), tx_b));

        let relay_a = tokio::spawn(relay_loop(bus.subscribe("room:1"), conn_a, cancel.clone()));
        let relay_b = tokio::spawn(relay_loop(bus.subscribe("room:1"), conn_b, cancel.clone()));

        let delivered = bus
            .publish(BusMessage::new("room:1", json!([{"op": "reload"}])))
            .await
            .unwrap();
        assert_eq!(delivered, 2);

        let a = rx_a.recv().await.unwrap();
        let b = rx_b.recv().await.unwrap();
        assert_eq!(*a, *b);

        cancel.cancel();
        relay_a.await.unwrap();
        relay_b.await.unwrap();
    }

    #[tokio::test]
    async fn dead_subscriber_does_not_block_survivor() {
        let bus = Arc::new(MemoryBus::new());
        let cancel = CancellationToken::new();

        // Dead: its outbound receiver is dropped immediately.
        let (tx_dead, rx_dead) = mpsc::channel(1);
        drop(rx_dead);
        let conn_dead = Arc::new(ClientConnection::new("dead".into(), tx_dead));
        let dead_cancel = CancellationToken::new();
        let relay_dead = tokio::spawn(relay_loop(
            bus.subscribe("room:1"),
            conn_dead,
            dead_cancel.clone(),
        ));

        let (tx_live, mut rx_live) = mpsc::channel(8);
        let conn_live = Arc::new(ClientConnection::new("live".into(), tx_live));
        let relay_live = tokio::spawn(relay_loop(
            bus.subscribe("room:1"),
            conn_live,
            cancel.clone(),
        ));

        let _ = bus
            .publish(BusMessage::new("room:1", json!([{"op": "reload"}])))
            .await
            .unwrap();

        let payload = rx_live.recv().await.unwrap();
        assert!(payload.contains("reload"));

        cancel.cancel();
        dead_cancel.cancel();
        relay_live.await.unwrap();
        relay_dead.await.unwrap();
    }

    #[tokio::test]
    async fn saturated_subscriber_cancels_its_own_session() {
        let bus = Arc::new(MemoryBus::new());
        let cancel = CancellationToken::new();

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let connection = Arc::new(ClientConnection::new("slow".into(), tx));
        // Pre-saturate the drop counter right up to the threshold.
        for _ in 0..super::super::connection::MAX_TOTAL_DROPS {
            let _ = connection.send(Arc::new("x".into()));
        }

        let relay = tokio::spawn(relay_loop(
            bus.subscribe("room:1"),
            Arc::clone(&connection),
            cancel.clone(),
        ));

        let _ = bus
            .publish(BusMessage::new("room:1", json!([])))
            .await
            .unwrap();

        relay.await.unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn relay_stops_when_cancelled() {
        let bus = Arc::new(MemoryBus::new());
        let (tx, _rx) = mpsc::channel(1);
        let connection = Arc::new(ClientConnection::new("c".into(), tx));
        let cancel = CancellationToken::new();

        let relay = tokio::spawn(relay_loop(
            bus.subscribe("room:1"),
            connection,
            cancel.clone(),
        ));
        cancel.cancel();
        relay.await.unwrap();
    }

    #[tokio::test]
    async fn topic_fn_resolver() {
        let resolver = topic_fn(|request: &ServerRequest| Some(format!("page:{}", request.path)));
        let topic = resolver.resolve(&ServerRequest::new("GET", "/board"));
        assert_eq!(topic, Some("page:/board".to_owned()));
    }

    #[tokio::test]
    async fn deps_builder_clamps_queue_capacity() {
        let deps = deps_with(Arc::new(EventRegistry::new()), Arc::new(MemoryBus::new()))
            .with_queue_capacity(0)
            .with_heartbeat(Duration::from_secs(5), 2);
        assert_eq!(deps.queue_capacity, 1);
        assert_eq!(deps.heartbeat_interval, Duration::from_secs(5));
    }
}
