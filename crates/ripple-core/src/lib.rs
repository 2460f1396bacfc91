//! # ripple-core
//!
//! Foundation types and errors for the Ripple live-view engine.
//!
//! This crate provides the shared vocabulary that all other Ripple crates
//! depend on:
//!
//! - **Events**: [`event::EventRequest`] for one inbound browser action,
//!   [`event::EventResponse`] for its result, [`event::DomEvent`] for one
//!   client-visible effect
//! - **Params**: [`event::Params`] — the insertion-ordered key→value map
//!   carried by every event request
//! - **Errors**: [`errors::RippleError`] hierarchy via `thiserror`, with
//!   stable machine codes and sanitized user-facing messages
//! - **Logging**: [`logging::init_tracing`] subscriber bootstrap
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other ripple crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod event;
pub mod logging;
