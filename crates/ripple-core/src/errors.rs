//! Error taxonomy for the live-update pipeline.
//!
//! Every failure mode in the pipeline maps to one [`RippleError`] variant
//! with a stable machine code (see [`RippleError::code`]). Codes are part of
//! the wire contract: clients and fallback paths branch on them, so they
//! never change even when messages are reworded.
//!
//! User-facing text is always produced through [`RippleError::user_message`],
//! which never leaks internal error detail to the browser.

use std::collections::HashMap;

use thiserror::Error;

/// Fallback text shown to the browser when an error carries no
/// user-facing message of its own.
pub const GENERIC_USER_MESSAGE: &str = "something went wrong, please try again";

/// Stable machine code: malformed or incomplete event request.
pub const CODE_VALIDATION: &str = "VALIDATION_ERROR";
/// Stable machine code: no handler registered for the event id.
pub const CODE_HANDLER_NOT_FOUND: &str = "HANDLER_NOT_FOUND";
/// Stable machine code: handler executed but raised an error.
pub const CODE_PROCESSING: &str = "PROCESSING_ERROR";
/// Stable machine code: no chain handler claims the request.
pub const CODE_NO_HANDLER: &str = "NO_HANDLER";
/// Stable machine code: chain has handlers but all are disabled.
pub const CODE_NO_ENABLED_HANDLER: &str = "NO_ENABLED_HANDLER";
/// Stable machine code: template resolution or minification failed.
pub const CODE_RENDER: &str = "RENDER_ERROR";

/// Pipeline error hierarchy.
///
/// Variants mirror the failure taxonomy of the event pipeline: validation
/// and handler-lookup failures are recoverable and returned to the caller
/// structurally; processing errors wrap the handler's failure with the
/// cause preserved; dispatch-level failures carry the stable strings that
/// callers use to decide on a fallback path.
#[derive(Debug, Error)]
pub enum RippleError {
    /// The event request is structurally invalid (HTTP 400 equivalent).
    #[error("validation failed: {message}")]
    Validation {
        /// What was missing or malformed.
        message: String,
        /// Per-field problems, keyed by parameter name.
        field_errors: HashMap<String, String>,
    },

    /// No handler is registered for the event id (HTTP 404 equivalent).
    ///
    /// Often non-fatal: optional lifecycle events (e.g. an on-load hook)
    /// probe for a handler and treat absence as "nothing to do".
    #[error("no event handler registered for {id:?}")]
    HandlerNotFound {
        /// The unmatched event id.
        id: String,
    },

    /// A handler executed and failed (HTTP 500 equivalent).
    ///
    /// The original failure is preserved as the source so the cause chain
    /// stays diagnosable; `user_message`, if set, is the only text that
    /// may reach the browser.
    #[error("event handler failed: {source}")]
    Processing {
        /// Sanitized text safe to show to the browser, if the handler
        /// attached one.
        user_message: Option<String>,
        /// The handler's failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No chain handler claims this request shape.
    ///
    /// The message string is stable and asserted by tests and fallbacks.
    #[error("no handler for {method} {path}")]
    NoHandler {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// The chain contains handlers but every one is disabled.
    ///
    /// Distinct from [`RippleError::NoHandler`] so callers can tell a
    /// misconfigured chain apart from an unroutable request.
    #[error("no enabled handler in chain")]
    NoEnabledHandler,

    /// Template resolution or minification failed.
    ///
    /// Degrades to a dropped patch operation or an inline error banner,
    /// never to a closed connection.
    #[error("render failed for template {template:?}: {message}")]
    Render {
        /// The template that failed to render.
        template: String,
        /// What went wrong.
        message: String,
    },
}

impl RippleError {
    /// Construct a validation error with no per-field detail.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field_errors: HashMap::new(),
        }
    }

    /// Construct a processing error wrapping a handler failure.
    pub fn processing(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Processing {
            user_message: None,
            source: Box::new(source),
        }
    }

    /// Construct a processing error that carries text safe to show the
    /// browser alongside the wrapped cause.
    pub fn processing_with_message(
        user_message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            user_message: Some(user_message.into()),
            source: Box::new(source),
        }
    }

    /// The stable machine code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => CODE_VALIDATION,
            Self::HandlerNotFound { .. } => CODE_HANDLER_NOT_FOUND,
            Self::Processing { .. } => CODE_PROCESSING,
            Self::NoHandler { .. } => CODE_NO_HANDLER,
            Self::NoEnabledHandler => CODE_NO_ENABLED_HANDLER,
            Self::Render { .. } => CODE_RENDER,
        }
    }

    /// The HTTP status equivalent for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::HandlerNotFound { .. } | Self::NoHandler { .. } => 404,
            Self::Processing { .. } | Self::NoEnabledHandler | Self::Render { .. } => 500,
        }
    }

    /// Text safe to show in the browser's error target.
    ///
    /// Validation messages describe the user's input and pass through.
    /// Processing errors only expose a message the handler explicitly
    /// attached; everything else falls back to the generic default. The
    /// internal error text never reaches this method's return value.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::Processing {
                user_message: Some(msg),
                ..
            } => msg.clone(),
            _ => GENERIC_USER_MESSAGE.to_owned(),
        }
    }

    /// Whether this error is recoverable from the caller's perspective.
    ///
    /// Recoverable errors return structured responses; the connection and
    /// the chain keep running.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::HandlerNotFound { .. } | Self::Render { .. }
        )
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, RippleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[derive(Debug, Error)]
    #[error("db connection refused")]
    struct FakeDbError;

    #[test]
    fn codes_are_stable() {
        assert_eq!(RippleError::validation("x").code(), "VALIDATION_ERROR");
        assert_eq!(
            RippleError::HandlerNotFound { id: "inc".into() }.code(),
            "HANDLER_NOT_FOUND"
        );
        assert_eq!(RippleError::processing(FakeDbError).code(), "PROCESSING_ERROR");
        assert_eq!(
            RippleError::NoHandler {
                method: "GET".into(),
                path: "/x".into()
            }
            .code(),
            "NO_HANDLER"
        );
        assert_eq!(RippleError::NoEnabledHandler.code(), "NO_ENABLED_HANDLER");
        assert_eq!(
            RippleError::Render {
                template: "row".into(),
                message: "m".into()
            }
            .code(),
            "RENDER_ERROR"
        );
    }

    #[test]
    fn no_handler_message_is_stable() {
        let err = RippleError::NoHandler {
            method: "POST".into(),
            path: "/cart".into(),
        };
        assert_eq!(err.to_string(), "no handler for POST /cart");
    }

    #[test]
    fn no_enabled_handler_message_is_stable() {
        assert_eq!(
            RippleError::NoEnabledHandler.to_string(),
            "no enabled handler in chain"
        );
    }

    #[test]
    fn processing_preserves_cause() {
        let err = RippleError::processing(FakeDbError);
        let source = std::error::Error::source(&err).expect("cause preserved");
        assert_eq!(source.to_string(), "db connection refused");
    }

    #[test]
    fn user_message_never_leaks_internal_error() {
        let err = RippleError::processing(FakeDbError);
        let msg = err.user_message();
        assert!(!msg.contains("db connection"));
        assert_eq!(msg, GENERIC_USER_MESSAGE);
    }

    #[test]
    fn user_message_uses_attached_text() {
        let err = RippleError::processing_with_message("cart is empty", FakeDbError);
        assert_eq!(err.user_message(), "cart is empty");
    }

    #[test]
    fn validation_message_passes_through() {
        let err = RippleError::validation("missing event id");
        assert_eq!(err.user_message(), "missing event id");
    }

    #[test]
    fn status_codes() {
        assert_eq!(RippleError::validation("x").status_code(), 400);
        assert_eq!(
            RippleError::HandlerNotFound { id: "x".into() }.status_code(),
            404
        );
        assert_eq!(RippleError::processing(FakeDbError).status_code(), 500);
        assert_eq!(RippleError::NoEnabledHandler.status_code(), 500);
    }

    #[test]
    fn recoverability() {
        assert!(RippleError::validation("x").is_recoverable());
        assert!(RippleError::HandlerNotFound { id: "x".into() }.is_recoverable());
        assert!(!RippleError::processing(FakeDbError).is_recoverable());
        assert!(!RippleError::NoEnabledHandler.is_recoverable());
    }

    #[test]
    fn validation_with_field_errors() {
        let mut fields = HashMap::new();
        let _ = fields.insert("email".to_owned(), "required".to_owned());
        let err = RippleError::Validation {
            message: "invalid form".into(),
            field_errors: fields,
        };
        assert_matches!(err, RippleError::Validation { ref field_errors, .. } if field_errors.len() == 1);
    }
}
