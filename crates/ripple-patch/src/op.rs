//! Patch operation vocabulary and canonical JSON encoding.
//!
//! The vocabulary is total and explicit: every DOM mutation the engine can
//! ask a browser to perform is one [`Patch`] variant. Content-bearing
//! operations (`morph`, `after`, `before`, `append`, `prepend`) always
//! carry a rendered HTML fragment — the type makes a missing value
//! unrepresentable. Browser clients dispatch on the exact `op` strings, so
//! the rename set below is a compatibility contract.
//!
//! Wire shape, one JSON object per operation, batches as a JSON array:
//!
//! ```json
//! {"op":"morph","selector":"#list","value":"<ul>...</ul>"}
//! {"op":"store","selector":"cart","value":{"count":3}}
//! {"op":"reload"}
//! {"op":"navigate","value":"/checkout"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a content-bearing patch positions its fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Morph the target in place (default).
    Morph,
    /// Insert after the target.
    After,
    /// Insert before the target.
    Before,
    /// Append inside the target.
    Append,
    /// Prepend inside the target.
    Prepend,
}

impl ContentMode {
    /// Parse a mode from its wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "morph" => Some(Self::Morph),
            "after" => Some(Self::After),
            "before" => Some(Self::Before),
            "append" => Some(Self::Append),
            "prepend" => Some(Self::Prepend),
            _ => None,
        }
    }
}

/// One wire-level DOM mutation instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Patch {
    /// Morph the target element to the rendered fragment.
    Morph {
        /// Target CSS selector.
        selector: String,
        /// Rendered HTML fragment.
        value: String,
    },
    /// Insert the fragment after the target element.
    After {
        /// Target CSS selector.
        selector: String,
        /// Rendered HTML fragment.
        value: String,
    },
    /// Insert the fragment before the target element.
    Before {
        /// Target CSS selector.
        selector: String,
        /// Rendered HTML fragment.
        value: String,
    },
    /// Append the fragment inside the target element.
    Append {
        /// Target CSS selector.
        selector: String,
        /// Rendered HTML fragment.
        value: String,
    },
    /// Prepend the fragment inside the target element.
    Prepend {
        /// Target CSS selector.
        selector: String,
        /// Rendered HTML fragment.
        value: String,
    },
    /// Remove the target element.
    Remove {
        /// Target CSS selector.
        selector: String,
    },
    /// Reload the page.
    Reload,
    /// Store arbitrary JSON under a client-side key.
    Store {
        /// Client-side store key (not a CSS selector).
        selector: String,
        /// Arbitrary JSON payload.
        value: Value,
    },
    /// Reset a form element.
    ResetForm {
        /// Form selector; `None` resets the event's originating form.
        #[serde(skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
    /// Navigate the browser to a URL.
    Navigate {
        /// Destination URL.
        value: String,
    },
}

impl Patch {
    /// Build a content patch in the given mode.
    #[must_use]
    pub fn content(mode: ContentMode, selector: impl Into<String>, value: impl Into<String>) -> Self {
        let selector = selector.into();
        let value = value.into();
        match mode {
            ContentMode::Morph => Self::Morph { selector, value },
            ContentMode::After => Self::After { selector, value },
            ContentMode::Before => Self::Before { selector, value },
            ContentMode::Append => Self::Append { selector, value },
            ContentMode::Prepend => Self::Prepend { selector, value },
        }
    }

    /// The wire `op` string.
    #[must_use]
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Morph { .. } => "morph",
            Self::After { .. } => "after",
            Self::Before { .. } => "before",
            Self::Append { .. } => "append",
            Self::Prepend { .. } => "prepend",
            Self::Remove { .. } => "remove",
            Self::Reload => "reload",
            Self::Store { .. } => "store",
            Self::ResetForm { .. } => "resetForm",
            Self::Navigate { .. } => "navigate",
        }
    }

    /// The selector this patch addresses, if any.
    #[must_use]
    pub fn selector(&self) -> Option<&str> {
        match self {
            Self::Morph { selector, .. }
            | Self::After { selector, .. }
            | Self::Before { selector, .. }
            | Self::Append { selector, .. }
            | Self::Prepend { selector, .. }
            | Self::Remove { selector }
            | Self::Store { selector, .. } => Some(selector),
            Self::ResetForm { selector } => selector.as_deref(),
            Self::Reload | Self::Navigate { .. } => None,
        }
    }

    /// Whether this patch carries a rendered HTML fragment.
    #[must_use]
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            Self::Morph { .. }
                | Self::After { .. }
                | Self::Before { .. }
                | Self::Append { .. }
                | Self::Prepend { .. }
        )
    }
}

/// Encode a batch of patches as the canonical JSON array.
pub fn encode_batch(patches: &[Patch]) -> serde_json::Result<String> {
    serde_json::to_string(patches)
}

/// Decode a JSON array back into patches.
pub fn decode_batch(json: &str) -> serde_json::Result<Vec<Patch>> {
    serde_json::from_str(json)
}
