//! # ripple-patch
//!
//! The wire-level DOM mutation protocol and the pipeline that produces it.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `op` | The [`Patch`] operation vocabulary and its canonical JSON encoding |
//! | `minify` | Whitespace-collapsing HTML pass applied to every rendered fragment |
//! | `render` | [`render::TemplateResolver`] seam + fragment render pipeline |
//! | `batch` | [`batch::PatchPipeline`]: DOM events → patch batches, error-clear prepend, partial-failure drops |
//!
//! ## Data Flow
//!
//! `EventResponse.dom_events` → `batch` (resolve template → minify →
//! patch value) → JSON array on the wire.

#![deny(unsafe_code)]

pub mod batch;
pub mod minify;
pub mod op;
pub mod render;

pub use batch::PatchPipeline;
pub use op::{ContentMode, Patch, decode_batch, encode_batch};
pub use render::{TableResolver, TemplateRef, TemplateResolver};
