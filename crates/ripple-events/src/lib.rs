//! # ripple-events
//!
//! The event-processing half of the live-update pipeline.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `registry` | Thread-safe event-id → handler storage, optional route scoping |
//! | `validator` | Pluggable request validation (structural + per-event params) |
//! | `service` | [`service::EventService`]: validate → locate → execute → publish → record |
//! | `bus` | Publish/subscribe [`bus::Bus`] seam + in-memory implementation |
//! | `metrics` | Mutex-guarded event counters and latency accumulator |
//!
//! ## Data Flow
//!
//! `EventRequest` → `service` (validation, registry lookup, handler
//! execution) → `EventResponse`; attached bus messages fan out through
//! `bus` on the way back.

#![deny(unsafe_code)]

pub mod bus;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod validator;

pub use bus::{Bus, BusError, BusSubscription, MemoryBus};
pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use registry::{EventHandler, EventRegistry, HandlerRegistry, handler_fn};
pub use service::EventService;
pub use validator::{DefaultValidator, EventValidator, NoopValidator};
