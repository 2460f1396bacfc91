//! Event request validation.
//!
//! Validation runs before registry lookup and short-circuits the pipeline
//! with `VALIDATION_ERROR` on failure. The seam is pluggable and
//! no-op-safe; the default implementation checks the structural fields
//! every request must carry plus per-event required-parameter rules.

use std::collections::HashMap;

use ripple_core::errors::{Result, RippleError};
use ripple_core::event::EventRequest;

/// Pluggable validation seam for the event service.
pub trait EventValidator: Send + Sync {
    /// Check one request. `Err` must be [`RippleError::Validation`].
    fn validate(&self, request: &EventRequest) -> Result<()>;
}

/// Accepts every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopValidator;

impl EventValidator for NoopValidator {
    fn validate(&self, _request: &EventRequest) -> Result<()> {
        Ok(())
    }
}

/// Structural checks plus per-event required-parameter whitelists.
///
/// Rules are registered once at startup and immutable afterwards; the
/// validator is then shared by reference. Registering the same event id
/// twice is a startup wiring conflict and panics immediately rather than
/// surfacing as confusing behavior at request time.
#[derive(Debug, Default)]
pub struct DefaultValidator {
    required_params: HashMap<String, Vec<String>>,
}

impl DefaultValidator {
    /// Create a validator with no per-event rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the given parameter keys for an event id.
    ///
    /// # Panics
    ///
    /// Panics if the event id already has a rule set.
    #[must_use]
    pub fn require(mut self, event_id: impl Into<String>, params: &[&str]) -> Self {
        let event_id = event_id.into();
        assert!(
            !self.required_params.contains_key(&event_id),
            "duplicate required-parameter rules for event {event_id:?}"
        );
        let _ = self.required_params.insert(
            event_id,
            params.iter().map(|&p| p.to_owned()).collect(),
        );
        self
    }

    /// Number of events with parameter rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.required_params.len()
    }
}

impl EventValidator for DefaultValidator {
    fn validate(&self, request: &EventRequest) -> Result<()> {
        if request.id.is_empty() {
            return Err(RippleError::validation("event id is required"));
        }
        if request.session_id.is_empty() {
            return Err(RippleError::validation("session id is required"));
        }
        if !request.origin.is_complete() {
            return Err(RippleError::validation(
                "originating request context is required",
            ));
        }

        if let Some(required) = self.required_params.get(&request.id) {
            let mut field_errors = HashMap::new();
            for key in required {
                if !request.params.contains_key(key) {
                    let _ = field_errors.insert(key.clone(), "required".to_owned());
                }
            }
            if !field_errors.is_empty() {
                let mut missing: Vec<&str> =
                    field_errors.keys().map(String::as_str).collect();
                missing.sort_unstable();
                return Err(RippleError::Validation {
                    message: format!("missing required parameters: {}", missing.join(", ")),
                    field_errors,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ripple_core::event::{Origin, Params};
    use serde_json::json;

    fn complete_request(id: &str) -> EventRequest {
        EventRequest::new(id, "sess-1").with_origin(Origin::socket("/counter", "c1"))
    }

    #[test]
    fn noop_accepts_anything() {
        let request = EventRequest::new("", "");
        assert!(NoopValidator.validate(&request).is_ok());
    }

    #[test]
    fn complete_request_passes() {
        assert!(DefaultValidator::new().validate(&complete_request("inc")).is_ok());
    }

    #[test]
    fn missing_id_fails() {
        let err = DefaultValidator::new()
            .validate(&complete_request(""))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn missing_session_fails() {
        let mut request = complete_request("inc");
        request.session_id = String::new();
        let err = DefaultValidator::new().validate(&request).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn missing_origin_fails() {
        let request = EventRequest::new("inc", "sess-1");
        let err = DefaultValidator::new().validate(&request).unwrap_err();
        assert_matches!(err, RippleError::Validation { ref message, .. }
            if message.contains("originating request"));
    }

    #[test]
    fn required_params_enforced() {
        let validator = DefaultValidator::new().require("add-to-cart", &["sku", "qty"]);

        let mut params = Params::new();
        params.insert("sku", json!("A-1"));
        let request = complete_request("add-to-cart").with_params(params);

        let err = validator.validate(&request).unwrap_err();
        assert_matches!(err, RippleError::Validation { ref message, ref field_errors }
            if message.contains("qty") && field_errors.contains_key("qty"));
    }

    #[test]
    fn required_params_satisfied() {
        let validator = DefaultValidator::new().require("add-to-cart", &["sku"]);
        let mut params = Params::new();
        params.insert("sku", json!("A-1"));
        let request = complete_request("add-to-cart").with_params(params);
        assert!(validator.validate(&request).is_ok());
    }

    #[test]
    fn rules_only_apply_to_their_event() {
        let validator = DefaultValidator::new().require("add-to-cart", &["sku"]);
        assert!(validator.validate(&complete_request("inc")).is_ok());
    }

    #[test]
    #[should_panic(expected = "duplicate required-parameter rules")]
    fn duplicate_rule_registration_panics_at_startup() {
        let _ = DefaultValidator::new()
            .require("inc", &["a"])
            .require("inc", &["b"]);
    }

    #[test]
    fn multiple_missing_params_reported_sorted() {
        let validator = DefaultValidator::new().require("save", &["zeta", "alpha"]);
        let err = validator.validate(&complete_request("save")).unwrap_err();
        assert_matches!(err, RippleError::Validation { ref message, .. }
            if message == "missing required parameters: alpha, zeta");
    }
}
