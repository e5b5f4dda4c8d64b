//! Beacon Emitter - transports for computed diffs
//!
//! The routing table computes messages; these adapters put them on the
//! wire. [`NatsEmitter`] publishes registry messages on the bus subjects
//! the HTTP routers and the service-discovery peer listen on;
//! [`RoutingApiEmitter`] POSTs TCP route mappings to the routing API.
//!
//! Failure policy: a publish failure is logged and the remaining messages
//! still go out - the next emit tick re-converges, so nothing here retries.

mod error;
mod nats;
mod routing_api;

pub use error::{EmitError, Result};
pub use nats::NatsEmitter;
pub use routing_api::RoutingApiEmitter;
