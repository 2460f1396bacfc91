//! Event request/response data model.
//!
//! One inbound browser action becomes exactly one [`EventRequest`], which is
//! immutable after construction and consumed by exactly one handler
//! invocation. The handler produces one [`EventResponse`], which may carry
//! zero or many [`DomEvent`]s (client-visible effects) and
//! [`BusMessage`]s (broadcast fan-out).
//!
//! All of this is transport-independent: the same types flow whether the
//! event arrived over the WebSocket read loop or an HTTP POST.

use std::collections::HashMap;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Params — insertion-ordered key→value map
// ─────────────────────────────────────────────────────────────────────────────

/// Insertion-ordered key→value parameter map.
///
/// Form bodies and JSON event payloads preserve the order keys arrived in;
/// duplicate keys keep the last value but retain the original position.
/// Serializes as a JSON object in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    /// Create an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert a key→value pair, replacing an existing key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a value by key and coerce it to a string slice.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Whether the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = Params;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a JSON object of event parameters")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Params, A::Error> {
                let mut params = Params::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    params.insert(key, value);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(ParamsVisitor)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventRequest
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of the transport request an event originated from.
///
/// The full request stays in the transport layer; the pipeline only needs
/// enough to log, validate, and route.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    /// Request method (`GET`, `POST`, or `WS` for socket frames).
    pub method: String,
    /// Request path.
    pub path: String,
    /// Originating connection, when the event arrived over a socket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

impl Origin {
    /// Origin for an event decoded from a WebSocket frame.
    #[must_use]
    pub fn socket(path: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            method: "WS".into(),
            path: path.into(),
            connection_id: Some(connection_id.into()),
        }
    }

    /// Origin for an event carried by an HTTP request.
    #[must_use]
    pub fn http(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            connection_id: None,
        }
    }

    /// Whether the origin carries enough context to process an event.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.method.is_empty() && !self.path.is_empty()
    }
}

/// One inbound browser action.
///
/// Created per inbound message, immutable after construction, consumed by
/// exactly one handler invocation. A request always carries a non-empty
/// `id` once validated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    /// Event id — the registry key.
    pub id: String,
    /// CSS selector the event targets, if the client sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Key of the originating element, for list-item scoped updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_key: Option<String>,
    /// Opaque session identifier.
    pub session_id: String,
    /// Insertion-ordered event parameters.
    #[serde(default)]
    pub params: Params,
    /// Where the event came from.
    #[serde(default)]
    pub origin: Origin,
}

impl EventRequest {
    /// Build a request with just an id and session (common in tests and
    /// lifecycle probes).
    #[must_use]
    pub fn new(id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: None,
            element_key: None,
            session_id: session_id.into(),
            params: Params::new(),
            origin: Origin::default(),
        }
    }

    /// Attach an origin.
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Attach parameters.
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Attach a target selector.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DomEvent
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of client-visible effect a [`DomEvent`] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomEventKind {
    /// Replace or augment content.
    Update,
    /// Show an error state.
    Error,
    /// Show an in-progress state while slow work completes.
    Pending,
}

/// One client-visible effect, independent of how it was produced
/// (direct response vs. broadcast).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomEvent {
    /// Event id this effect belongs to.
    pub id: String,
    /// Effect kind.
    pub kind: DomEventKind,
    /// CSS selector the effect targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Element key, for list-item scoped updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_key: Option<String>,
    /// Effect payload. By convention carries either `template` + `data`
    /// (render a named fragment) or `html` (ship a literal fragment).
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
}

impl DomEvent {
    /// An update effect rendering a named template fragment.
    #[must_use]
    pub fn update(
        id: impl Into<String>,
        target: impl Into<String>,
        template: impl Into<String>,
        data: Value,
    ) -> Self {
        let mut payload = serde_json::Map::new();
        let _ = payload.insert("template".into(), Value::String(template.into()));
        let _ = payload.insert("data".into(), data);
        Self {
            id: id.into(),
            kind: DomEventKind::Update,
            target: Some(target.into()),
            element_key: None,
            data: payload,
        }
    }

    /// An update effect shipping a literal HTML fragment.
    #[must_use]
    pub fn update_html(
        id: impl Into<String>,
        target: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        let mut payload = serde_json::Map::new();
        let _ = payload.insert("html".into(), Value::String(html.into()));
        Self {
            id: id.into(),
            kind: DomEventKind::Update,
            target: Some(target.into()),
            element_key: None,
            data: payload,
        }
    }

    /// An error effect with a user-facing message.
    #[must_use]
    pub fn error(id: impl Into<String>, target: Option<String>, message: impl Into<String>) -> Self {
        let mut payload = serde_json::Map::new();
        let _ = payload.insert("message".into(), Value::String(message.into()));
        Self {
            id: id.into(),
            kind: DomEventKind::Error,
            target,
            element_key: None,
            data: payload,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BusMessage / Redirect / EventResponse
// ─────────────────────────────────────────────────────────────────────────────

/// One message bound for a topic on the publish/subscribe bus.
///
/// The payload is a batch of already-serialized patch operations (a JSON
/// array) or any caller-defined JSON; the bus does not interpret it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMessage {
    /// Topic to publish to.
    pub topic: String,
    /// Opaque JSON payload fanned out to every subscriber.
    pub payload: Value,
}

impl BusMessage {
    /// Build a message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// A redirect instruction attached to an event response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    /// Destination URL.
    pub url: String,
    /// HTTP status for the plain-HTTP path (e.g. 303).
    pub status_code: u16,
}

/// The result of processing one [`EventRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    /// HTTP-equivalent status.
    pub status_code: u16,
    /// Response headers for the plain-HTTP path.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Response body for the plain-HTTP path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// Client-visible effects, in generation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dom_events: Vec<DomEvent>,
    /// Messages to publish to the bus after the handler returns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bus_messages: Vec<BusMessage>,
    /// Redirect, when the handler wants navigation instead of patching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
    /// Per-field validation problems, keyed by form field name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub field_errors: HashMap<String, String>,
}

impl Default for EventResponse {
    fn default() -> Self {
        Self::ok()
    }
}

impl EventResponse {
    /// An empty 200 response.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            headers: HashMap::new(),
            body: String::new(),
            dom_events: Vec::new(),
            bus_messages: Vec::new(),
            redirect: None,
            field_errors: HashMap::new(),
        }
    }

    /// A 200 response with a body (used by the plain-HTTP fallback path).
    #[must_use]
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::ok()
        }
    }

    /// Append a DOM event.
    #[must_use]
    pub fn with_dom_event(mut self, event: DomEvent) -> Self {
        self.dom_events.push(event);
        self
    }

    /// Append a bus message.
    #[must_use]
    pub fn with_bus_message(mut self, message: BusMessage) -> Self {
        self.bus_messages.push(message);
        self
    }

    /// Attach a redirect.
    #[must_use]
    pub fn with_redirect(mut self, url: impl Into<String>, status_code: u16) -> Self {
        self.redirect = Some(Redirect {
            url: url.into(),
            status_code,
        });
        self
    }

    /// Attach a field error.
    #[must_use]
    pub fn with_field_error(
        mut self,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let _ = self.field_errors.insert(field.into(), message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_preserve_insertion_order() {
        let mut params = Params::new();
        params.insert("z", json!(1));
        params.insert("a", json!(2));
        params.insert("m", json!(3));
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn params_replace_keeps_position() {
        let mut params = Params::new();
        params.insert("first", json!(1));
        params.insert("second", json!(2));
        params.insert("first", json!(10));
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["first", "second"]);
        assert_eq!(params.get("first"), Some(&json!(10)));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn params_serde_round_trip_in_order() {
        let mut params = Params::new();
        params.insert("qty", json!("3"));
        params.insert("sku", json!("A-1"));
        let encoded = serde_json::to_string(&params).unwrap();
        assert_eq!(encoded, r#"{"qty":"3","sku":"A-1"}"#);
        let decoded: Params = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn params_get_str() {
        let mut params = Params::new();
        params.insert("name", json!("ada"));
        params.insert("count", json!(2));
        assert_eq!(params.get_str("name"), Some("ada"));
        assert_eq!(params.get_str("count"), None);
        assert_eq!(params.get_str("missing"), None);
    }

    #[test]
    fn event_request_wire_shape() {
        let req = EventRequest::new("inc", "sess-1")
            .with_target("#count")
            .with_origin(Origin::socket("/counter", "conn-1"));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], "inc");
        assert_eq!(json["target"], "#count");
        assert_eq!(json["sessionId"], "sess-1");
        assert_eq!(json["origin"]["connectionId"], "conn-1");
        assert!(json.get("elementKey").is_none());
    }

    #[test]
    fn event_request_decodes_with_defaults() {
        let req: EventRequest =
            serde_json::from_value(json!({"id": "inc", "sessionId": "s1"})).unwrap();
        assert_eq!(req.id, "inc");
        assert!(req.params.is_empty());
        assert!(req.origin.method.is_empty());
    }

    #[test]
    fn origin_completeness() {
        assert!(Origin::http("GET", "/x").is_complete());
        assert!(Origin::socket("/x", "c1").is_complete());
        assert!(!Origin::default().is_complete());
    }

    #[test]
    fn dom_event_update_payload() {
        let event = DomEvent::update("inc", "#count", "count-fragment", json!({"n": 3}));
        assert_eq!(event.kind, DomEventKind::Update);
        assert_eq!(event.data["template"], "count-fragment");
        assert_eq!(event.data["data"]["n"], 3);
    }

    #[test]
    fn dom_event_kind_wire_strings() {
        assert_eq!(
            serde_json::to_value(DomEventKind::Update).unwrap(),
            json!("update")
        );
        assert_eq!(
            serde_json::to_value(DomEventKind::Error).unwrap(),
            json!("error")
        );
        assert_eq!(
            serde_json::to_value(DomEventKind::Pending).unwrap(),
            json!("pending")
        );
    }

    #[test]
    fn response_builder_accumulates() {
        let resp = EventResponse::ok()
            .with_dom_event(DomEvent::update_html("inc", "#count", "<span>1</span>"))
            .with_bus_message(BusMessage::new("room:1", json!([])))
            .with_field_error("email", "required");
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.dom_events.len(), 1);
        assert_eq!(resp.bus_messages.len(), 1);
        assert_eq!(resp.field_errors["email"], "required");
    }

    #[test]
    fn response_redirect_serializes_camel_case() {
        let resp = EventResponse::ok().with_redirect("/checkout", 303);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["redirect"]["url"], "/checkout");
        assert_eq!(json["redirect"]["statusCode"], 303);
    }

    #[test]
    fn empty_response_fields_skipped_on_wire() {
        let json = serde_json::to_value(EventResponse::ok()).unwrap();
        assert!(json.get("domEvents").is_none());
        assert!(json.get("busMessages").is_none());
        assert!(json.get("fieldErrors").is_none());
        assert!(json.get("body").is_none());
    }
}
