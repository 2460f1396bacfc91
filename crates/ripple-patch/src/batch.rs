//! Patch batch assembly.
//!
//! [`PatchPipeline`] converts the DOM events on an [`EventResponse`] into
//! wire-ready patches:
//!
//! - update/pending events render their fragment (named template or raw
//!   HTML) through the resolver and minifier
//! - error events morph a sanitized message into their target (or the
//!   conventional error selector)
//! - field errors morph into per-field `#<field>-error` targets
//! - a redirect becomes a `navigate` patch
//!
//! Two policies live here. **Error clearing**: a batch that does not
//! explicitly target the error selector gets an error-clearing `morph` for
//! that selector prepended, so the error banner is cleared on every
//! successful round whether or not the caller thought to clear it.
//! **Partial failure**: an event whose fragment fails to render is dropped
//! from the batch (logged); the rest of the batch still ships.

use std::sync::Arc;

use ripple_core::errors::GENERIC_USER_MESSAGE;
use ripple_core::event::{DomEvent, DomEventKind, EventResponse};
use serde_json::Value;
use tracing::warn;

use crate::minify::escape_text;
use crate::op::{ContentMode, Patch};
use crate::render::{TemplateRef, TemplateResolver, render_fragment};

/// Conventional selector of the error-display target.
pub const DEFAULT_ERROR_SELECTOR: &str = "#ripple-error";
/// Conventional selector of the main content target.
pub const DEFAULT_CONTENT_SELECTOR: &str = "#ripple-content";

/// Turns event responses into finalized patch batches.
pub struct PatchPipeline {
    resolver: Arc<dyn TemplateResolver>,
    error_selector: String,
    content_selector: String,
}

impl PatchPipeline {
    /// Build a pipeline with the conventional selectors.
    #[must_use]
    pub fn new(resolver: Arc<dyn TemplateResolver>) -> Self {
        Self {
            resolver,
            error_selector: DEFAULT_ERROR_SELECTOR.to_owned(),
            content_selector: DEFAULT_CONTENT_SELECTOR.to_owned(),
        }
    }

    /// Override the conventional selectors (from settings).
    #[must_use]
    pub fn with_selectors(
        mut self,
        error_selector: impl Into<String>,
        content_selector: impl Into<String>,
    ) -> Self {
        self.error_selector = error_selector.into();
        self.content_selector = content_selector.into();
        self
    }

    /// The error-display selector in effect.
    #[must_use]
    pub fn error_selector(&self) -> &str {
        &self.error_selector
    }

    /// The content selector in effect.
    #[must_use]
    pub fn content_selector(&self) -> &str {
        &self.content_selector
    }

    /// Convert a response's effects into a finalized batch.
    #[must_use]
    pub fn patches_from_response(&self, response: &EventResponse) -> Vec<Patch> {
        let mut patches: Vec<Patch> = response
            .dom_events
            .iter()
            .filter_map(|event| self.patch_for_event(event))
            .collect();

        // Field errors target per-field selectors; sorted for a stable
        // batch order.
        let mut fields: Vec<(&String, &String)> = response.field_errors.iter().collect();
        fields.sort();
        for (field, message) in fields {
            patches.push(Patch::Morph {
                selector: format!("#{field}-error"),
                value: escape_text(message),
            });
        }

        if let Some(redirect) = &response.redirect {
            patches.push(Patch::Navigate {
                value: redirect.url.clone(),
            });
        }

        self.finalize(patches)
    }

    /// Prepend an error-clearing morph unless the batch already targets
    /// the error selector.
    #[must_use]
    pub fn finalize(&self, mut patches: Vec<Patch>) -> Vec<Patch> {
        let targets_error = patches
            .iter()
            .any(|p| p.selector() == Some(self.error_selector.as_str()));
        if !targets_error {
            patches.insert(0, self.clear_error());
        }
        patches
    }

    /// The error-clearing morph.
    #[must_use]
    pub fn clear_error(&self) -> Patch {
        Patch::Morph {
            selector: self.error_selector.clone(),
            value: String::new(),
        }
    }

    /// A sanitized error banner for the error-display target.
    #[must_use]
    pub fn error_banner(&self, message: &str) -> Patch {
        Patch::Morph {
            selector: self.error_selector.clone(),
            value: escape_text(message),
        }
    }

    /// Wrap rendered page HTML as a morph of the content target.
    #[must_use]
    pub fn morph_content(&self, html: impl Into<String>) -> Patch {
        Patch::Morph {
            selector: self.content_selector.clone(),
            value: html.into(),
        }
    }

    /// Render DOM events into a finalized batch as a JSON value — the
    /// conventional bus payload for broadcast updates.
    #[must_use]
    pub fn broadcast_payload(&self, events: &[DomEvent]) -> Value {
        let patches: Vec<Patch> = events
            .iter()
            .filter_map(|event| self.patch_for_event(event))
            .collect();
        serde_json::to_value(self.finalize(patches)).unwrap_or_else(|_| Value::Array(Vec::new()))
    }

    /// Convert one DOM event into a patch, or drop it.
    fn patch_for_event(&self, event: &DomEvent) -> Option<Patch> {
        match event.kind {
            DomEventKind::Error => {
                let message = event
                    .data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(GENERIC_USER_MESSAGE);
                let selector = event
                    .target
                    .clone()
                    .unwrap_or_else(|| self.error_selector.clone());
                Some(Patch::Morph {
                    selector,
                    value: escape_text(message),
                })
            }
            DomEventKind::Update | DomEventKind::Pending => self.content_patch(event),
        }
    }

    fn content_patch(&self, event: &DomEvent) -> Option<Patch> {
        let Some(selector) = event.target.clone() else {
            warn!(event_id = %event.id, "dropping content event without target selector");
            return None;
        };

        // `store` payloads bypass rendering entirely.
        if let Some(state) = event.data.get("store") {
            return Some(Patch::Store {
                selector,
                value: state.clone(),
            });
        }

        let mode = match event.data.get("op").and_then(Value::as_str) {
            None => ContentMode::Morph,
            Some(raw) => match ContentMode::parse(raw) {
                Some(mode) => mode,
                None => {
                    warn!(event_id = %event.id, op = raw, "unknown content op, defaulting to morph");
                    ContentMode::Morph
                }
            },
        };

        let template = if let Some(name) = event.data.get("template").and_then(Value::as_str) {
            TemplateRef::Named(name.to_owned())
        } else if let Some(html) = event.data.get("html").and_then(Value::as_str) {
            TemplateRef::Raw(html.to_owned())
        } else {
            warn!(event_id = %event.id, "dropping content event without template or html payload");
            return None;
        };

        let data = event.data.get("data").cloned().unwrap_or(Value::Null);
        match render_fragment(self.resolver.as_ref(), &template, &data) {
            Ok(html) => Some(Patch::content(mode, selector, html)),
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "dropping patch whose fragment failed to render");
                None
            }
        }
    }
}
