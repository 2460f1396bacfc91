//! The four request strategies.
//!
//! | Strategy | Owns | Priority |
//! |----------|------|----------|
//! | [`UpgradeHandler`] | WebSocket upgrade GETs | 10 |
//! | [`EventPostHandler`] | structured-event POSTs (JSON body / event header) | 20 |
//! | [`FormPostHandler`] | urlencoded form POSTs (no-JS fallback) | 30 |
//! | [`PageHandler`] | plain GET page renders | 90 |
//!
//! Priorities leave gaps so applications can slot their own strategies
//! between the built-ins.

use std::sync::Arc;

use async_trait::async_trait;
use ripple_core::errors::Result;
use ripple_core::event::{EventRequest, Origin, Params};
use ripple_events::EventService;
use ripple_patch::render::render_fragment;
use ripple_patch::{PatchPipeline, TemplateRef, TemplateResolver, encode_batch};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::chain::RequestHandler;
use crate::request::{EVENT_HEADER, ServerRequest, ServerResponse};

/// Session id used when a request carries none.
///
/// Session identity derivation is an upstream concern; the pipeline only
/// needs a non-empty opaque value.
const ANONYMOUS_SESSION: &str = "anonymous";

// ─────────────────────────────────────────────────────────────────────────────
// UpgradeHandler
// ─────────────────────────────────────────────────────────────────────────────

/// Claims WebSocket upgrade requests.
///
/// The chain stays transport-independent: this strategy only emits the
/// 101 marker; the HTTP layer performs the actual protocol switch and
/// starts the session (see `http::entry`).
#[derive(Clone, Copy, Debug, Default)]
pub struct UpgradeHandler;

#[async_trait]
impl RequestHandler for UpgradeHandler {
    fn name(&self) -> &str {
        "websocket-upgrade"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn supports(&self, request: &ServerRequest) -> bool {
        request.is_websocket_upgrade()
    }

    async fn handle(&self, _request: ServerRequest) -> Result<ServerResponse> {
        Ok(ServerResponse::switching_protocols())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventPostHandler
// ─────────────────────────────────────────────────────────────────────────────

/// Wire shape of a structured-event POST body (and of WebSocket frames —
/// the session layer reuses this).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Event id.
    #[serde(default)]
    pub id: String,
    /// Target selector, if the client sent one.
    #[serde(default)]
    pub target: Option<String>,
    /// Element key, for list-item scoped updates.
    #[serde(default)]
    pub element_key: Option<String>,
    /// Event parameters.
    #[serde(default)]
    pub params: Params,
}

impl InboundEvent {
    /// Build the pipeline request for this inbound event.
    #[must_use]
    pub fn into_request(self, session_id: String, origin: Origin) -> EventRequest {
        EventRequest {
            id: self.id,
            target: self.target,
            element_key: self.element_key,
            session_id,
            params: self.params,
            origin,
        }
    }
}

/// Claims structured-event POSTs and answers with a patch batch.
pub struct EventPostHandler {
    service: Arc<EventService>,
    pipeline: Arc<PatchPipeline>,
}

impl EventPostHandler {
    /// Build the strategy.
    pub fn new(service: Arc<EventService>, pipeline: Arc<PatchPipeline>) -> Self {
        Self { service, pipeline }
    }
}

#[async_trait]
impl RequestHandler for EventPostHandler {
    fn name(&self) -> &str {
        "event-json"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn supports(&self, request: &ServerRequest) -> bool {
        request.method == "POST"
            && (request.header(EVENT_HEADER).is_some()
                || request.content_type() == Some("application/json"))
    }

    async fn handle(&self, request: ServerRequest) -> Result<ServerResponse> {
        let mut inbound: InboundEvent = match serde_json::from_slice(&request.body) {
            Ok(event) => event,
            Err(err) => {
                warn!(path = %request.path, error = %err, "malformed event body");
                let batch = vec![self.pipeline.error_banner("malformed event payload")];
                return Ok(patch_response(400, &batch));
            }
        };
        // The header names the event when the body does not.
        if inbound.id.is_empty() {
            if let Some(header_id) = request.header(EVENT_HEADER) {
                inbound.id = header_id.to_owned();
            }
        }

        let session_id = request
            .session_id()
            .unwrap_or_else(|| ANONYMOUS_SESSION.to_owned());
        let origin = Origin::http(request.method.clone(), request.path.clone());
        let event_request = inbound.into_request(session_id, origin);

        match self.service.process_event(event_request).await {
            Ok(response) => {
                let status = response.status_code;
                let patches = self.pipeline.patches_from_response(&response);
                Ok(patch_response(status, &patches))
            }
            Err(err) => {
                let batch = vec![self.pipeline.error_banner(&err.user_message())];
                Ok(patch_response(err.status_code(), &batch))
            }
        }
    }
}

/// Serialize a batch into a JSON response.
fn patch_response(status: u16, patches: &[ripple_patch::Patch]) -> ServerResponse {
    match encode_batch(patches) {
        Ok(body) => ServerResponse::json(status, body),
        Err(err) => {
            warn!(error = %err, "failed to encode patch batch");
            ServerResponse::json(500, "[]")
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FormPostHandler
// ─────────────────────────────────────────────────────────────────────────────

/// Form parameter naming the event id.
const FORM_EVENT_PARAM: &str = "event";

/// Claims urlencoded form POSTs — the no-JS fallback path.
///
/// The event id comes from the `event` form field; the remaining fields
/// become the event parameters in submission order. Responses follow
/// plain-HTTP semantics: a redirect becomes a real 3xx, field errors a
/// 422 with the handler's body, success a 200.
pub struct FormPostHandler {
    service: Arc<EventService>,
}

impl FormPostHandler {
    /// Build the strategy.
    pub fn new(service: Arc<EventService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl RequestHandler for FormPostHandler {
    fn name(&self) -> &str {
        "form-post"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn supports(&self, request: &ServerRequest) -> bool {
        request.method == "POST"
            && request.content_type() == Some("application/x-www-form-urlencoded")
    }

    async fn handle(&self, request: ServerRequest) -> Result<ServerResponse> {
        let mut event_id = String::new();
        let mut params = Params::new();
        for (key, value) in url::form_urlencoded::parse(&request.body) {
            if key == FORM_EVENT_PARAM {
                event_id = value.into_owned();
            } else {
                params.insert(key.into_owned(), Value::String(value.into_owned()));
            }
        }

        let session_id = request
            .session_id()
            .unwrap_or_else(|| ANONYMOUS_SESSION.to_owned());
        let event_request = EventRequest {
            id: event_id,
            target: None,
            element_key: None,
            session_id,
            params,
            origin: Origin::http(request.method.clone(), request.path.clone()),
        };

        match self.service.process_event(event_request).await {
            Ok(response) => {
                if let Some(redirect) = &response.redirect {
                    return Ok(ServerResponse::redirect(
                        redirect.url.clone(),
                        redirect.status_code,
                    ));
                }
                if !response.field_errors.is_empty() {
                    return Ok(ServerResponse::html(response.body).with_status(422));
                }
                let mut out = ServerResponse::html(response.body).with_status(response.status_code);
                for (name, value) in &response.headers {
                    out = out.with_header(name.to_lowercase(), value.clone());
                }
                Ok(out)
            }
            Err(err) => Ok(ServerResponse::html(ripple_patch::minify::escape_text(
                &err.user_message(),
            ))
            .with_status(err.status_code())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PageHandler
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves a path to a renderable page.
///
/// Supplied by the routing layer; the strategy only renders what the
/// source returns.
pub trait PageSource: Send + Sync {
    /// The page for a path, or `None` for 404.
    fn page(&self, path: &str) -> Option<PageSpec>;
}

/// One renderable page.
#[derive(Clone, Debug)]
pub struct PageSpec {
    /// Template to render.
    pub template: TemplateRef,
    /// Data the template renders against.
    pub data: Value,
}

/// Claims plain GETs and renders full documents.
///
/// Runs last: every non-upgrade GET lands here, and unresolvable paths
/// answer 404. A render failure degrades to a 500 document — it never
/// propagates as a chain error.
pub struct PageHandler {
    pages: Arc<dyn PageSource>,
    resolver: Arc<dyn TemplateResolver>,
}

impl PageHandler {
    /// Build the strategy.
    pub fn new(pages: Arc<dyn PageSource>, resolver: Arc<dyn TemplateResolver>) -> Self {
        Self { pages, resolver }
    }
}

#[async_trait]
impl RequestHandler for PageHandler {
    fn name(&self) -> &str {
        "page-get"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn supports(&self, request: &ServerRequest) -> bool {
        request.method == "GET" && !request.is_websocket_upgrade()
    }

    async fn handle(&self, request: ServerRequest) -> Result<ServerResponse> {
        let Some(spec) = self.pages.page(&request.path) else {
            return Ok(ServerResponse::not_found("page not found"));
        };
        match render_fragment(self.resolver.as_ref(), &spec.template, &spec.data) {
            Ok(html) => Ok(ServerResponse::html(html)),
            Err(err) => {
                warn!(path = %request.path, error = %err, "page render failed");
                Ok(ServerResponse::html("<h1>render error</h1>").with_status(500))
            }
        }
    }
}
