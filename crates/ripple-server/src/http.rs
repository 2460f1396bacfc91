//! Axum integration.
//!
//! Every inbound request is adapted into the transport-independent
//! [`ServerRequest`] and dispatched through the handler chain. The chain
//! stays authoritative for strategy selection: when it answers with the
//! 101 marker, this layer performs the actual WebSocket upgrade and
//! starts the session.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::chain::HandlerChain;
use crate::request::{ServerRequest, ServerResponse};
use crate::ws::session::{SessionDeps, run_session};

/// Maximum buffered request body size (1 MiB).
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state behind the router.
pub struct AppState {
    /// Strategy pipeline.
    pub chain: Arc<HandlerChain>,
    /// Session collaborators for upgraded connections.
    pub session_deps: Arc<SessionDeps>,
    /// Prometheus handle for `/metrics`; `None` disables the endpoint.
    pub prometheus: Option<PrometheusHandle>,
}

/// Build the router: `/healthz`, `/metrics`, everything else through the
/// chain.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .fallback(entry)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Adapt, dispatch, and (for upgrades) switch protocols.
async fn entry(State(state): State<Arc<AppState>>, request: Request) -> Response {
    // Peel off the upgrade handshake before buffering the body; on
    // non-upgrade requests extraction simply fails and we move on.
    let (mut parts, body) = request.into_parts();
    let upgrade = <WebSocketUpgrade as FromRequestParts<()>>::from_request_parts(&mut parts, &())
        .await
        .ok();
    let request = Request::from_parts(parts, body);

    let server_request = match adapt_request(request).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.chain.handle(server_request.clone()).await {
        Ok(response) if response.status == 101 => {
            let Some(upgrade) = upgrade else {
                // The upgrade strategy matched but the handshake headers
                // were incomplete.
                return (StatusCode::BAD_REQUEST, "websocket handshake required").into_response();
            };
            let deps = Arc::clone(&state.session_deps);
            upgrade.on_upgrade(move |socket| run_session(socket, server_request, deps))
        }
        Ok(response) => adapt_response(response),
        Err(err) => {
            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, err.to_string()).into_response()
        }
    }
}

/// Axum request → transport-independent request.
async fn adapt_request(request: Request) -> Result<ServerRequest, Response> {
    let (parts, body) = request.into_parts();

    let mut server_request = ServerRequest::new(parts.method.as_str(), parts.uri.path());
    if let Some(query) = parts.uri.query() {
        server_request.query = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
    }
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            let _ = server_request
                .headers
                .insert(name.as_str().to_lowercase(), value.to_owned());
        }
    }

    match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => {
            server_request.body = bytes;
            Ok(server_request)
        }
        Err(err) => {
            warn!(error = %err, "failed to buffer request body");
            Err((StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response())
        }
    }
}

/// Transport-independent response → axum response.
fn adapt_response(response: ServerResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::strategies::{PageHandler, PageSource, PageSpec};
    use crate::ws::hub::ConnectionHub;
    use ripple_events::{DefaultValidator, EventRegistry, EventService, MemoryBus};
    use ripple_patch::{PatchPipeline, TableResolver, TemplateRef};
    use serde_json::json;
    use tower::ServiceExt;

    struct OnePage;

    impl PageSource for OnePage {
        fn page(&self, path: &str) -> Option<PageSpec> {
            (path == "/").then(|| PageSpec {
                template: TemplateRef::Raw("<h1>home</h1>".into()),
                data: json!({}),
            })
        }
    }

    fn test_router() -> Router {
        let resolver = Arc::new(TableResolver::new());
        let bus = Arc::new(MemoryBus::new());
        let service = Arc::new(EventService::new(
            Arc::new(EventRegistry::new()),
            Arc::new(DefaultValidator::new()),
            Arc::clone(&bus) as Arc<dyn ripple_events::Bus>,
        ));
        let pipeline = Arc::new(PatchPipeline::new(Arc::clone(&resolver) as Arc<dyn ripple_patch::TemplateResolver>));
        let deps = Arc::new(SessionDeps::new(
            Arc::clone(&service),
            pipeline,
            Arc::new(ConnectionHub::new()),
            bus,
        ));

        let chain = Arc::new(HandlerChain::new());
        chain.add(Arc::new(PageHandler::new(Arc::new(OnePage), resolver)));

        router(AppState {
            chain,
            session_deps: deps,
            prometheus: None,
        })
    }

    #[tokio::test]
    async fn healthz_responds_ok() {
        let router = test_router();
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_disabled_is_404() {
        let router = test_router();
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fallback_dispatches_through_chain() {
        let router = test_router();
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<h1>home</h1>");
    }

    #[tokio::test]
    async fn chain_error_maps_to_status() {
        let router = test_router();
        // POST matches no strategy in this chain.
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/nothing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"no handler for POST /nothing");
    }

    #[tokio::test]
    async fn query_and_headers_adapted() {
        let request = axum::http::Request::builder()
            .uri("/page?session=s1&x=2")
            .header("X-Custom", "Value")
            .body(Body::empty())
            .unwrap();
        let adapted = adapt_request(request).await.unwrap();
        assert_eq!(adapted.query_value("session"), Some("s1"));
        assert_eq!(adapted.query_value("x"), Some("2"));
        assert_eq!(adapted.header("x-custom"), Some("Value"));
    }
}
