//! The event-processing service.
//!
//! [`EventService::process_event`] turns one [`EventRequest`] into one
//! [`EventResponse`] through five stages:
//!
//! 1. **Validate** — pluggable validator; failure short-circuits before
//!    any registry lookup happens.
//! 2. **Locate** — registry lookup by event id (route scope first).
//! 3. **Execute** — invoke the handler; handler errors are wrapped as
//!    processing errors with the cause preserved.
//! 4. **Publish** — forward attached bus messages; publish failures are
//!    logged, never propagated — the direct response still succeeds.
//! 5. **Record** — counters and latency, both in the facade metrics and
//!    the service's own snapshot accumulator.
//!
//! The service is safe for concurrent invocation across independent
//! requests and imposes no timeout of its own; deadline policy belongs to
//! the handler or an enclosing context.

use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use ripple_core::errors::{Result, RippleError};
use ripple_core::event::{EventRequest, EventResponse};
use tracing::{debug, warn};

use crate::bus::Bus;
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::registry::HandlerRegistry;
use crate::validator::EventValidator;

/// Validate → locate → execute → publish → record.
pub struct EventService {
    registry: Arc<dyn HandlerRegistry>,
    validator: Arc<dyn EventValidator>,
    bus: Arc<dyn Bus>,
    metrics: ServiceMetrics,
}

impl EventService {
    /// Assemble a service from its collaborators.
    pub fn new(
        registry: Arc<dyn HandlerRegistry>,
        validator: Arc<dyn EventValidator>,
        bus: Arc<dyn Bus>,
    ) -> Self {
        Self {
            registry,
            validator,
            bus,
            metrics: ServiceMetrics::new(),
        }
    }

    /// Process one event request.
    pub async fn process_event(&self, request: EventRequest) -> Result<EventResponse> {
        let started = Instant::now();
        let event_id = request.id.clone();

        if let Err(err) = self.validator.validate(&request) {
            counter!("events_failed_total", "stage" => "validate").increment(1);
            self.metrics.record_failure(started.elapsed());
            return Err(err);
        }

        let route = if request.origin.path.is_empty() {
            None
        } else {
            Some(request.origin.path.as_str())
        };
        let Some(handler) = self.registry.resolve(route, &event_id) else {
            counter!("events_failed_total", "stage" => "locate").increment(1);
            self.metrics.record_failure(started.elapsed());
            return Err(RippleError::HandlerNotFound { id: event_id });
        };

        let response = match handler.handle(request).await {
            Ok(response) => response,
            Err(err) => {
                counter!("events_failed_total", "stage" => "execute").increment(1);
                self.metrics.record_failure(started.elapsed());
                let wrapped = match err {
                    already @ RippleError::Processing { .. } => already,
                    other => RippleError::processing(other),
                };
                return Err(wrapped);
            }
        };

        for message in &response.bus_messages {
            if let Err(err) = self.bus.publish(message.clone()).await {
                // Best-effort fan-out: the direct response still succeeds.
                counter!("events_publish_failures_total").increment(1);
                warn!(event_id = %event_id, topic = %message.topic, error = %err,
                    "bus publish failed, continuing");
            }
        }

        let latency = started.elapsed();
        counter!("events_processed_total").increment(1);
        self.metrics.record_success(latency);
        debug!(event_id = %event_id, latency_ms = latency.as_millis() as u64, "event processed");
        Ok(response)
    }

    /// Current counter snapshot.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
